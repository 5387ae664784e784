use std::path::Path;

use gridsmith_core::{validate, ValidationReport};
use serde::Serialize;

use crate::exit_codes;
use crate::output::{print_result, OutputFormat};
use crate::utils::read_source;
use crate::OutputArgs;

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct ValidateResult {
    valid: bool,
    #[serde(flatten)]
    report: ValidationReport,
}

pub fn validate_cmd(path: &Path, output: OutputArgs) -> i32 {
    let Some(source) = read_source(path, &output) else {
        return exit_codes::RUNTIME_ERROR;
    };

    let report = validate(&source);
    let valid = report.is_valid();
    if output.format == OutputFormat::Text && !output.quiet {
        print_text(path, &report);
    } else {
        print_result(output.format, output.quiet, &ValidateResult { valid, report });
    }

    if valid {
        exit_codes::SUCCESS
    } else {
        exit_codes::VALIDATION_FAILED
    }
}

fn print_text(path: &Path, report: &ValidationReport) {
    if report.is_valid() {
        println!("ok: {} passed validation", path.display());
    } else {
        println!("invalid: {}", path.display());
    }
    for (label, items) in [
        ("error", &report.errors),
        ("warning", &report.warnings),
        ("fixable", &report.fixable_issues),
        ("suggestion", &report.suggestions),
    ] {
        for item in items {
            println!("  {label}: {item}");
        }
    }
}
