use std::sync::Arc;

use async_trait::async_trait;

use crate::collab::ProgressSink;
use crate::executor::{Event, EventSink};

/// Adapts the event stream to a [`ProgressSink`] and forwards every event to
/// `base`.
pub struct ProgressEventSink {
    sink: Arc<dyn ProgressSink>,
    base: Arc<dyn EventSink>,
}

impl ProgressEventSink {
    pub fn new(sink: Arc<dyn ProgressSink>, base: Arc<dyn EventSink>) -> Self {
        Self { sink, base }
    }
}

#[async_trait]
impl EventSink for ProgressEventSink {
    async fn emit(&self, event: Event) {
        match &event {
            Event::ChunkStarted { chunk, .. } => self.sink.on_chunk_start(chunk).await,
            Event::ChunkFailed { chunk, message, .. } => self.sink.on_chunk_error(message, chunk).await,
            Event::ProgressUpdated { progress } => self.sink.on_progress(progress).await,
            _ => {}
        }
        self.base.emit(event).await;
    }
}
