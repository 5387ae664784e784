use crate::executor::{Event, EventSink, SessionState};
use async_trait::async_trait;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;

#[derive(Debug, Clone, Default)]
pub struct SessionMetrics {
    pub session_id: String,
    pub intent: String,
    pub state: String,
    pub started_at: Option<Instant>,
    pub finished_at: Option<Instant>,
    pub total_duration: Option<Duration>,
    pub chunks_started: usize,
    pub chunks_succeeded: usize,
    pub chunks_failed: usize,
    pub chunks_skipped: usize,
    pub corrections: usize,
    pub simulation_failures: usize,
    pub retries: usize,
}

impl SessionMetrics {
    pub fn new(session_id: String, intent: String) -> Self {
        Self {
            session_id,
            intent,
            started_at: Some(Instant::now()),
            ..Default::default()
        }
    }

    pub fn record_chunk_started(&mut self) {
        self.chunks_started += 1;
    }

    pub fn record_chunk_success(&mut self) {
        self.chunks_succeeded += 1;
    }

    pub fn record_chunk_failure(&mut self) {
        self.chunks_failed += 1;
    }

    pub fn record_skip(&mut self) {
        self.chunks_skipped += 1;
    }

    pub fn record_correction(&mut self) {
        self.corrections += 1;
    }

    pub fn record_simulation_failure(&mut self) {
        self.simulation_failures += 1;
    }

    pub fn record_retry(&mut self) {
        self.retries += 1;
    }

    pub fn finish(&mut self, state: SessionState) {
        self.state = state.as_str().to_string();
        self.finished_at = Some(Instant::now());
        if let (Some(started), Some(finished)) = (self.started_at, self.finished_at) {
            self.total_duration = Some(finished.duration_since(started));
        }
    }

    pub fn to_json(&self) -> serde_json::Value {
        serde_json::json!({
            "session_id": self.session_id,
            "intent": self.intent,
            "state": self.state,
            "duration_ms": self.total_duration.map(|d| d.as_millis() as u64),
            "chunks": {
                "started": self.chunks_started,
                "succeeded": self.chunks_succeeded,
                "failed": self.chunks_failed,
                "skipped": self.chunks_skipped,
            },
            "corrections": self.corrections,
            "simulation_failures": self.simulation_failures,
            "retries": self.retries,
        })
    }
}

pub struct MetricsCollector {
    metrics: Arc<Mutex<SessionMetrics>>,
}

impl Default for MetricsCollector {
    fn default() -> Self {
        Self::new(String::new(), String::new())
    }
}

impl MetricsCollector {
    pub fn new(session_id: String, intent: String) -> Self {
        Self {
            metrics: Arc::new(Mutex::new(SessionMetrics::new(session_id, intent))),
        }
    }

    async fn begin(&self, session_id: String, intent: String) {
        *self.metrics.lock().await = SessionMetrics::new(session_id, intent);
    }

    pub async fn record_chunk_started(&self) {
        self.metrics.lock().await.record_chunk_started();
    }

    pub async fn record_chunk_success(&self) {
        self.metrics.lock().await.record_chunk_success();
    }

    pub async fn record_chunk_failure(&self) {
        self.metrics.lock().await.record_chunk_failure();
    }

    pub async fn record_skip(&self) {
        self.metrics.lock().await.record_skip();
    }

    pub async fn record_correction(&self) {
        self.metrics.lock().await.record_correction();
    }

    pub async fn record_simulation_failure(&self) {
        self.metrics.lock().await.record_simulation_failure();
    }

    pub async fn record_retry(&self) {
        self.metrics.lock().await.record_retry();
    }

    pub async fn finish(&self, state: SessionState) {
        self.metrics.lock().await.finish(state);
    }

    pub async fn get_metrics(&self) -> SessionMetrics {
        self.metrics.lock().await.clone()
    }
}

pub struct MetricsEventSink {
    collector: Arc<MetricsCollector>,
    base: Arc<dyn EventSink>,
}

impl MetricsEventSink {
    pub fn new(collector: Arc<MetricsCollector>, base: Arc<dyn EventSink>) -> Self {
        Self { collector, base }
    }
}

#[async_trait]
impl EventSink for MetricsEventSink {
    async fn emit(&self, event: Event) {
        match &event {
            Event::SessionStarted { session_id, intent } => {
                self.collector.begin(session_id.clone(), intent.clone()).await;
            }
            Event::ChunkStarted { .. } => {
                self.collector.record_chunk_started().await;
            }
            Event::ChunkSucceeded { .. } => {
                self.collector.record_chunk_success().await;
            }
            Event::ChunkFailed { .. } => {
                self.collector.record_chunk_failure().await;
            }
            Event::ChunkSkipped { .. } => {
                self.collector.record_skip().await;
            }
            Event::ChunkCorrected { .. } => {
                self.collector.record_correction().await;
            }
            Event::SimulationFailed { .. } => {
                self.collector.record_simulation_failure().await;
            }
            Event::RetryScheduled { .. } => {
                self.collector.record_retry().await;
            }
            Event::SessionFinished { state, .. } => {
                self.collector.finish(*state).await;
            }
            _ => {}
        }

        self.base.emit(event).await;
    }
}
