use std::path::Path;

use gridsmith_exec::{DocumentSnapshot, Sandbox, SheetSnapshot, SimulationReport};

use crate::exit_codes;
use crate::output::{print_result, OutputFormat};
use crate::utils::read_source;
use crate::OutputArgs;

pub fn simulate_cmd(path: &Path, sheets: &[String], output: OutputArgs) -> i32 {
    let Some(source) = read_source(path, &output) else {
        return exit_codes::RUNTIME_ERROR;
    };

    let report = sandbox_for(sheets).simulate(&source);
    if output.format == OutputFormat::Text && !output.quiet {
        print_text(&report);
    } else {
        print_result(output.format, output.quiet, &report);
    }

    if report.success {
        exit_codes::SUCCESS
    } else {
        exit_codes::RUN_FAILED
    }
}

fn sandbox_for(sheets: &[String]) -> Sandbox {
    if sheets.is_empty() {
        return Sandbox::new();
    }
    let snapshot = DocumentSnapshot {
        sheets: sheets
            .iter()
            .map(|name| SheetSnapshot {
                name: name.clone(),
                ..SheetSnapshot::default()
            })
            .collect(),
        active_sheet: None,
    };
    Sandbox::seeded(&snapshot)
}

fn print_text(report: &SimulationReport) {
    match report.first_error() {
        None => println!(
            "ok: {} operations in {} steps",
            report.operations.len(),
            report.steps
        ),
        Some(error) => println!(
            "failed after {} operations: {error}",
            report.operations.len()
        ),
    }
    for op in &report.operations {
        println!("  {} {}", op.kind.as_str(), op.qualified_address());
    }
}
