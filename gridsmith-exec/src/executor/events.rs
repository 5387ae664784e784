use async_trait::async_trait;
use gridsmith_core::{Chunk, ErrorFamily};
use serde_json::json;
use tracing::{info, warn};

use crate::executor::state::SessionState;
use crate::executor::types::Progress;

#[derive(Debug, Clone)]
pub enum Event {
    SessionStarted {
        session_id: String,
        intent: String,
    },
    SessionFinished {
        session_id: String,
        state: SessionState,
        reason: Option<String>,
    },
    ChunkStarted {
        session_id: String,
        chunk: Chunk,
        attempt: u32,
    },
    ChunkCorrected {
        session_id: String,
        chunk_id: String,
        rules: Vec<&'static str>,
        round: u32,
    },
    SimulationFailed {
        session_id: String,
        chunk_id: String,
        message: String,
    },
    ChunkSucceeded {
        session_id: String,
        chunk_id: String,
        attempt: u32,
        duration_ms: u64,
    },
    ChunkFailed {
        session_id: String,
        chunk: Chunk,
        attempt: u32,
        message: String,
        category: ErrorFamily,
    },
    ChunkSkipped {
        session_id: String,
        chunk_id: String,
        signature: String,
    },
    RetryScheduled {
        session_id: String,
        chunk_id: String,
        delay_ms: u64,
        consecutive_failures: u32,
        total_retries: u32,
    },
    ProgressUpdated {
        progress: Progress,
    },
}

#[async_trait]
pub trait EventSink: Send + Sync {
    async fn emit(&self, event: Event);
}

pub struct CompositeEventSink {
    sinks: Vec<Box<dyn EventSink>>,
}

impl Default for CompositeEventSink {
    fn default() -> Self {
        Self::new()
    }
}

impl CompositeEventSink {
    pub fn new() -> Self {
        Self { sinks: Vec::new() }
    }

    pub fn add(&mut self, sink: Box<dyn EventSink>) {
        self.sinks.push(sink);
    }
}

#[async_trait]
impl EventSink for CompositeEventSink {
    async fn emit(&self, event: Event) {
        for sink in &self.sinks {
            let event_clone = event.clone();
            sink.emit(event_clone).await;
        }
    }
}

/// One JSON object per line on stdout.
pub struct StdoutEventSink;

#[async_trait]
impl EventSink for StdoutEventSink {
    async fn emit(&self, event: Event) {
        let json = match event {
            Event::SessionStarted { session_id, intent } => {
                json!({ "type": "session.started", "session_id": session_id, "intent": intent })
            }
            Event::SessionFinished { session_id, state, reason } => {
                json!({ "type": "session.finished", "session_id": session_id, "state": state.as_str(), "reason": reason })
            }
            Event::ChunkStarted { session_id, chunk, attempt } => {
                json!({ "type": "chunk.started", "session_id": session_id, "chunk_id": chunk.id, "kind": chunk.kind.as_str(), "attempt": attempt })
            }
            Event::ChunkCorrected { session_id, chunk_id, rules, round } => {
                json!({ "type": "chunk.corrected", "session_id": session_id, "chunk_id": chunk_id, "rules": rules, "round": round })
            }
            Event::SimulationFailed { session_id, chunk_id, message } => {
                json!({ "type": "simulation.failed", "session_id": session_id, "chunk_id": chunk_id, "message": message })
            }
            Event::ChunkSucceeded { session_id, chunk_id, attempt, duration_ms } => {
                json!({ "type": "chunk.succeeded", "session_id": session_id, "chunk_id": chunk_id, "attempt": attempt, "duration_ms": duration_ms })
            }
            Event::ChunkFailed { session_id, chunk, attempt, message, category } => {
                json!({ "type": "chunk.failed", "session_id": session_id, "chunk_id": chunk.id, "attempt": attempt, "message": message, "category": category.as_str() })
            }
            Event::ChunkSkipped { session_id, chunk_id, signature } => {
                json!({ "type": "chunk.skipped", "session_id": session_id, "chunk_id": chunk_id, "signature": signature })
            }
            Event::RetryScheduled { session_id, chunk_id, delay_ms, consecutive_failures, total_retries } => {
                json!({ "type": "retry.scheduled", "session_id": session_id, "chunk_id": chunk_id, "delay_ms": delay_ms, "consecutive_failures": consecutive_failures, "total_retries": total_retries })
            }
            Event::ProgressUpdated { progress } => {
                json!({ "type": "progress", "session_id": progress.session_id, "state": progress.state.as_str(), "completed": progress.completed_count, "failed": progress.failed_count, "skipped": progress.skipped_count, "percent": progress.percent_complete() })
            }
        };
        println!("{}", serde_json::to_string(&json).unwrap_or_default());
    }
}

/// Logs the interesting events through `tracing`.
pub struct TracingEventSink;

#[async_trait]
impl EventSink for TracingEventSink {
    async fn emit(&self, event: Event) {
        match event {
            Event::SessionStarted { session_id, intent } => {
                info!(%session_id, %intent, "session started");
            }
            Event::SessionFinished { session_id, state, reason } => {
                info!(%session_id, %state, reason = reason.as_deref(), "session finished");
            }
            Event::ChunkFailed { session_id, chunk, attempt, message, category } => {
                warn!(%session_id, chunk_id = %chunk.id, attempt, %category, %message, "chunk failed");
            }
            Event::ChunkSkipped { session_id, chunk_id, signature } => {
                warn!(%session_id, %chunk_id, %signature, "chunk skipped on persistent failure");
            }
            Event::RetryScheduled { session_id, chunk_id, delay_ms, .. } => {
                info!(%session_id, %chunk_id, delay_ms, "retry scheduled");
            }
            _ => {}
        }
    }
}

pub struct NoOpEventSink;

#[async_trait]
impl EventSink for NoOpEventSink {
    async fn emit(&self, _event: Event) {}
}
