use std::collections::VecDeque;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::Mutex;
use tracing::debug;

use crate::collab::{SnapshotProvider, TargetRuntime};
use crate::error::TargetError;
use crate::sandbox::{DocumentSnapshot, Sandbox, SandboxConfig, WorkbookModel};

/// An in-memory document that executes chunks with the sandbox interpreter
/// and keeps the resulting workbook when they complete.
///
/// Shape rules are the sandbox's own, so a chunk the sandbox rejects fails
/// here too. Failures can be queued to stand in for a flaky host.
pub struct MemoryTarget {
    state: Mutex<TargetState>,
    config: SandboxConfig,
    delay: Option<Duration>,
}

#[derive(Default)]
struct TargetState {
    model: WorkbookModel,
    injected: VecDeque<TargetError>,
    executed: Vec<String>,
}

impl Default for MemoryTarget {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryTarget {
    pub fn new() -> Self {
        Self::from_model(WorkbookModel::new())
    }

    pub fn from_snapshot(snapshot: &DocumentSnapshot) -> Self {
        Self::from_model(WorkbookModel::from_snapshot(snapshot))
    }

    fn from_model(model: WorkbookModel) -> Self {
        Self {
            state: Mutex::new(TargetState {
                model,
                ..TargetState::default()
            }),
            config: SandboxConfig::default(),
            delay: None,
        }
    }

    pub fn with_config(mut self, config: SandboxConfig) -> Self {
        self.config = config;
        self
    }

    /// Every execution waits this long before running.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// The next executions fail with these errors, in order, without running.
    pub async fn inject_failures(&self, errors: impl IntoIterator<Item = TargetError>) {
        self.state.lock().await.injected.extend(errors);
    }

    /// Sources passed to `execute`, including failed ones.
    pub async fn executed(&self) -> Vec<String> {
        self.state.lock().await.executed.clone()
    }

    pub async fn execution_count(&self) -> usize {
        self.state.lock().await.executed.len()
    }
}

#[async_trait]
impl TargetRuntime for MemoryTarget {
    async fn execute(&self, source: &str) -> Result<(), TargetError> {
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        let mut state = self.state.lock().await;
        state.executed.push(source.to_string());
        if let Some(err) = state.injected.pop_front() {
            debug!(error = %err, "memory target injected failure");
            return Err(err);
        }
        let sandbox = Sandbox::over(state.model.clone()).with_config(self.config);
        match sandbox.commit(source) {
            Ok((model, report)) => {
                debug!(operations = report.operations.len(), "memory target committed");
                state.model = model;
                Ok(())
            }
            Err(report) => Err(TargetError::Execution(
                report
                    .first_error()
                    .unwrap_or("execution failed")
                    .to_string(),
            )),
        }
    }
}

#[async_trait]
impl SnapshotProvider for MemoryTarget {
    async fn snapshot(&self) -> DocumentSnapshot {
        self.state.lock().await.model.snapshot()
    }
}
