//! Mock Sandbox: rehearses a chunk against an in-memory workbook.
//!
//! Chunks are parsed and evaluated by a small restricted interpreter; nothing
//! is ever handed to a host evaluator. Every mutating host call is recorded as
//! an [`OperationRecord`] and applied to a private copy of the workbook, so
//! later statements observe earlier ones (a sheet added on line 2 can be
//! fetched on line 3) without touching any shared state.

mod ast;
mod builtins;
mod host;
mod interp;
pub mod model;
mod parser;
pub mod shape;
mod value;

use std::time::Instant;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

pub use model::{
    DocumentSnapshot, OperationKind, OperationRecord, SheetModel, SheetSnapshot, WorkbookModel,
};
pub use shape::{check_bulk_shape, ShapeError};

use interp::{Budget, Interp};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct SandboxConfig {
    /// Statements and calls evaluated before the run is cut off.
    pub max_steps: u64,
    pub max_call_depth: usize,
    /// Syntactic nesting (blocks, brackets, operators) accepted before a
    /// chunk is rejected as a syntax error.
    pub max_nesting: usize,
}

impl Default for SandboxConfig {
    fn default() -> Self {
        Self {
            max_steps: 200_000,
            max_call_depth: 64,
            max_nesting: 128,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SandboxError {
    #[error("SyntaxError: {message} (line {line})")]
    Syntax { line: usize, message: String },
    #[error("{0}")]
    Runtime(String),
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SimulationReport {
    pub success: bool,
    pub operations: Vec<OperationRecord>,
    /// The first raised message, when the run failed.
    pub errors: Vec<String>,
    /// `Sheet!Address` of every range written, in first-touch order.
    pub ranges_touched: Vec<String>,
    pub duration_ms: u64,
    pub steps: u64,
}

impl SimulationReport {
    pub fn first_error(&self) -> Option<&str> {
        self.errors.first().map(String::as_str)
    }
}

#[derive(Debug, Clone, Default)]
pub struct Sandbox {
    seed: WorkbookModel,
    config: SandboxConfig,
}

impl Sandbox {
    /// A sandbox over a fresh workbook holding only `Sheet1`.
    pub fn new() -> Self {
        Self::default()
    }

    pub fn seeded(snapshot: &DocumentSnapshot) -> Self {
        Self::over(WorkbookModel::from_snapshot(snapshot))
    }

    pub fn over(model: WorkbookModel) -> Self {
        Self {
            seed: model,
            config: SandboxConfig::default(),
        }
    }

    pub fn with_config(mut self, config: SandboxConfig) -> Self {
        self.config = config;
        self
    }

    pub fn sheet_names(&self) -> Vec<String> {
        self.seed.sheet_names()
    }

    /// Runs `source` in isolation. The seed workbook is never modified.
    pub fn simulate(&self, source: &str) -> SimulationReport {
        self.run(source).0
    }

    /// Runs `source` and, when it completes, hands back the workbook as the
    /// run left it. Targets built on the in-memory model commit this.
    pub fn commit(&self, source: &str) -> Result<(WorkbookModel, SimulationReport), SimulationReport> {
        match self.run(source) {
            (report, Some(model)) if report.success => Ok((model, report)),
            (report, _) => Err(report),
        }
    }

    fn run(&self, source: &str) -> (SimulationReport, Option<WorkbookModel>) {
        let started = Instant::now();
        let program = match parser::parse_program(source, self.config.max_nesting) {
            Ok(p) => p,
            Err(e) => {
                let err = SandboxError::Syntax {
                    line: e.line,
                    message: e.message,
                };
                let report = SimulationReport {
                    success: false,
                    operations: Vec::new(),
                    errors: vec![err.to_string()],
                    ranges_touched: Vec::new(),
                    duration_ms: elapsed_ms(started),
                    steps: 0,
                };
                return (report, None);
            }
        };

        let budget = Budget {
            max_steps: self.config.max_steps,
            max_depth: self.config.max_call_depth,
        };
        let mut interp = Interp::new(self.seed.clone(), budget);
        let outcome = interp.run(&program).map_err(SandboxError::Runtime);
        let report = SimulationReport {
            success: outcome.is_ok(),
            operations: std::mem::take(&mut interp.operations),
            errors: outcome.err().map(|e| e.to_string()).into_iter().collect(),
            ranges_touched: std::mem::take(&mut interp.touched),
            duration_ms: elapsed_ms(started),
            steps: interp.steps,
        };
        debug!(
            success = report.success,
            operations = report.operations.len(),
            steps = report.steps,
            error = report.first_error(),
            "sandbox simulation finished"
        );
        let model = std::mem::take(&mut interp.model);
        (report, Some(model))
    }
}

fn elapsed_ms(started: Instant) -> u64 {
    u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX)
}
