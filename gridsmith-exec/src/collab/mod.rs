//! Contracts for everything the orchestrator drives but does not own.

mod memory;
mod scripted;

use async_trait::async_trait;
use gridsmith_core::Chunk;
use serde::{Deserialize, Serialize};

use crate::error::{GeneratorError, TargetError};
use crate::executor::{ExecutionOutcome, Progress};
use crate::sandbox::DocumentSnapshot;

pub use memory::MemoryTarget;
pub use scripted::ScriptedGenerator;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChunkRequest {
    pub session_id: String,
    pub intent: String,
    pub snapshot: DocumentSnapshot,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_outcome: Option<ExecutionOutcome>,
    /// Set when asking for a regenerated version of a chunk that failed.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub retry_of: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChunkResponse {
    pub completed: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub chunk: Option<Chunk>,
    /// The generator's own view of the build, used for stage and totals.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub progress: Option<Progress>,
}

impl ChunkResponse {
    pub fn chunk(chunk: Chunk) -> Self {
        Self {
            completed: false,
            chunk: Some(chunk),
            progress: None,
        }
    }

    pub fn completed() -> Self {
        Self {
            completed: true,
            chunk: None,
            progress: None,
        }
    }

    pub fn exhausted() -> Self {
        Self {
            completed: false,
            chunk: None,
            progress: None,
        }
    }
}

/// Produces chunk source text. Calling `next_chunk` twice with the same
/// request must be safe.
#[async_trait]
pub trait ChunkGenerator: Send + Sync {
    async fn begin_session(&self, _session_id: &str, _intent: &str) -> Result<(), GeneratorError> {
        Ok(())
    }

    async fn next_chunk(&self, request: &ChunkRequest) -> Result<ChunkResponse, GeneratorError>;
}

#[async_trait]
pub trait SnapshotProvider: Send + Sync {
    async fn snapshot(&self) -> DocumentSnapshot;
}

/// The live document. `execute` mutates it.
#[async_trait]
pub trait TargetRuntime: Send + Sync {
    async fn execute(&self, source: &str) -> Result<(), TargetError>;
}

/// Fire-and-forget UI notifications.
#[async_trait]
pub trait ProgressSink: Send + Sync {
    async fn on_progress(&self, progress: &Progress);
    async fn on_chunk_start(&self, chunk: &Chunk);
    async fn on_chunk_error(&self, message: &str, chunk: &Chunk);
}
