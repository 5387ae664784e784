#![forbid(unsafe_code)]

pub mod collab;
pub mod config;
pub mod error;
pub mod executor;
pub mod ledger;
pub mod retry;
pub mod sandbox;

pub use crate::collab::{
    ChunkGenerator, ChunkRequest, ChunkResponse, MemoryTarget, ProgressSink, ScriptedGenerator,
    SnapshotProvider, TargetRuntime,
};
pub use crate::config::OrchestratorConfig;
pub use crate::error::{ConfigError, GeneratorError, OrchestratorError, TargetError};
pub use crate::executor::{
    CompositeEventSink, Event, EventSink, ExecutionOutcome, MetricsCollector, MetricsEventSink,
    NoOpEventSink, Orchestrator, Progress, ProgressEventSink, SessionMetrics, SessionReport,
    SessionState, StdoutEventSink, TracingEventSink,
};
pub use crate::ledger::{LedgerEntry, LedgerStats, OutcomeLedger};
pub use crate::retry::{decide_retry, AbortReason, PersistentSignatures, RetryConfig, RetryDecision};
pub use crate::sandbox::{
    check_bulk_shape, DocumentSnapshot, OperationKind, OperationRecord, Sandbox, SandboxConfig,
    SandboxError, ShapeError, SheetSnapshot, SimulationReport, WorkbookModel,
};
