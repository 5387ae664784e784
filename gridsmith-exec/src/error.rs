use thiserror::Error;

use crate::executor::SessionState;

/// A failure raised by the real target while executing a chunk.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TargetError {
    #[error("{0}")]
    Execution(String),
    #[error("runtime API unavailable: {0}")]
    Unavailable(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum GeneratorError {
    #[error("generator transport error: {0}")]
    Transport(String),
    #[error("generator rejected the request: {0}")]
    Rejected(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    #[error("invalid config: {field} {problem}")]
    Invalid { field: &'static str, problem: String },
}

#[derive(Debug, Error)]
pub enum OrchestratorError {
    #[error("session already running: {0}")]
    DuplicateSession(String),
    #[error("illegal state transition {from} -> {to}")]
    IllegalTransition { from: SessionState, to: SessionState },
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Generator(#[from] GeneratorError),
}
