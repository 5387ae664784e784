pub mod events;
pub mod metrics;
mod orchestrator;
pub mod progress;
mod state;
mod types;

pub use events::{CompositeEventSink, Event, EventSink, NoOpEventSink, StdoutEventSink, TracingEventSink};
pub use metrics::{MetricsCollector, MetricsEventSink, SessionMetrics};
pub use orchestrator::Orchestrator;
pub use progress::ProgressEventSink;
pub use state::SessionState;
pub use types::{ExecutionOutcome, Progress, SessionReport};
