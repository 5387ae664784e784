use std::path::PathBuf;

use clap::Subcommand;

use crate::{EventsMode, OutputArgs, RetryArgs};

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Statically check a script and list its errors, warnings and fixable issues.
    Validate {
        path: PathBuf,
        #[command(flatten)]
        output: OutputArgs,
    },
    /// Apply the standard rewrite rules and show what changed.
    Correct {
        path: PathBuf,
        /// Overwrite the file with the corrected text.
        #[arg(long)]
        write: bool,
        #[command(flatten)]
        output: OutputArgs,
    },
    /// Rehearse a script against an in-memory workbook.
    Simulate {
        path: PathBuf,
        /// Sheets present before the script runs (default: Sheet1).
        #[arg(long = "sheet", value_name = "NAME")]
        sheets: Vec<String>,
        #[command(flatten)]
        output: OutputArgs,
    },
    /// Run a full session over a directory or list of chunk files.
    Build {
        #[arg(required = true)]
        paths: Vec<PathBuf>,
        #[arg(long, default_value = "build workbook")]
        intent: String,
        /// Orchestrator config as JSON or YAML.
        #[arg(long)]
        config: Option<PathBuf>,
        #[arg(long, value_enum, default_value_t = EventsMode::Tracing)]
        events: EventsMode,
        #[command(flatten)]
        retry: RetryArgs,
        #[command(flatten)]
        output: OutputArgs,
    },
}
