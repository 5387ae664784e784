use gridsmith_core::ErrorFamily;
use serde::{Deserialize, Serialize};

use crate::executor::state::SessionState;
use crate::sandbox::DocumentSnapshot;

/// One execution attempt against the real target.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecutionOutcome {
    pub chunk_id: String,
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
    pub duration_ms: u64,
    /// 1-based attempt number for this chunk id.
    pub attempt: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category: Option<ErrorFamily>,
    /// The failure matched a persistent signature and the chunk was passed over.
    #[serde(default)]
    pub skipped: bool,
    #[serde(default)]
    pub timed_out: bool,
}

impl ExecutionOutcome {
    pub fn succeeded(chunk_id: &str, attempt: u32, duration_ms: u64) -> Self {
        Self {
            chunk_id: chunk_id.to_string(),
            success: true,
            error_message: None,
            duration_ms,
            attempt,
            category: None,
            skipped: false,
            timed_out: false,
        }
    }

    pub fn failed(chunk_id: &str, attempt: u32, duration_ms: u64, message: impl Into<String>) -> Self {
        let message = message.into();
        Self {
            chunk_id: chunk_id.to_string(),
            success: false,
            category: Some(gridsmith_core::classify_error(&message)),
            error_message: Some(message),
            duration_ms,
            attempt,
            skipped: false,
            timed_out: false,
        }
    }
}

/// Per-session counters. Mutated only by the orchestrator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Progress {
    pub session_id: String,
    pub state: SessionState,
    pub stage: u32,
    /// Expected chunk count, as reported by the generator when it knows.
    pub total_chunks: u32,
    pub completed_count: u32,
    pub failed_count: u32,
    pub skipped_count: u32,
    pub consecutive_failures: u32,
    /// Never reset within a session.
    pub total_retries: u32,
    pub history: Vec<ExecutionOutcome>,
}

impl Progress {
    pub fn new(session_id: impl Into<String>) -> Self {
        Self {
            session_id: session_id.into(),
            state: SessionState::Idle,
            stage: 0,
            total_chunks: 0,
            completed_count: 0,
            failed_count: 0,
            skipped_count: 0,
            consecutive_failures: 0,
            total_retries: 0,
            history: Vec::new(),
        }
    }

    pub fn percent_complete(&self) -> f64 {
        if self.state == SessionState::Completed {
            return 100.0;
        }
        if self.total_chunks == 0 {
            return 0.0;
        }
        let done = self.completed_count + self.skipped_count;
        (f64::from(done) / f64::from(self.total_chunks) * 100.0).min(100.0)
    }

    /// Share of real executions that succeeded.
    pub fn success_rate(&self) -> f64 {
        let attempts = self.completed_count + self.failed_count;
        if attempts == 0 {
            return 0.0;
        }
        f64::from(self.completed_count) / f64::from(attempts)
    }

    pub fn last_outcome(&self) -> Option<&ExecutionOutcome> {
        self.history.last()
    }

    /// Attempts so far for `chunk_id`.
    pub fn attempts_for(&self, chunk_id: &str) -> u32 {
        self.history.iter().filter(|o| o.chunk_id == chunk_id).count() as u32
    }
}

/// Final account of a session returned by `run_session`.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionReport {
    pub session_id: String,
    pub intent: String,
    pub success: bool,
    pub final_state: SessionState,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub abort_reason: Option<String>,
    pub progress: Progress,
    pub snapshot: DocumentSnapshot,
    pub suggestions: Vec<String>,
}
