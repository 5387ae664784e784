use clap::{Args, ValueEnum};

use crate::output::OutputFormat;

#[derive(Debug, Args, Clone)]
pub struct OutputArgs {
    #[arg(long, value_enum, default_value_t = OutputFormat::Text, global = true)]
    pub format: OutputFormat,
    #[arg(long, short, global = true)]
    pub quiet: bool,
}

/// Overrides applied on top of the loaded orchestrator config.
#[derive(Debug, Args, Clone, Default)]
pub struct RetryArgs {
    #[arg(long)]
    pub max_consecutive_failures: Option<u32>,
    #[arg(long)]
    pub max_total_retries: Option<u32>,
    /// Per-chunk execution timeout.
    #[arg(long)]
    pub timeout_ms: Option<u64>,
    /// Base backoff delay between retries.
    #[arg(long)]
    pub backoff_ms: Option<u64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum EventsMode {
    /// One JSON line per event on stdout.
    Stdout,
    /// Events as log records, filtered by GRIDSMITH_LOG.
    Tracing,
    None,
}
