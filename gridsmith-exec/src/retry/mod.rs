mod config;
mod decision;
mod signatures;

pub use config::RetryConfig;
pub use decision::{decide_retry, AbortReason, RetryDecision};
pub use signatures::PersistentSignatures;

pub(crate) use config::duration_ms;
