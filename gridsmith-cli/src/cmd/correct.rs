use std::path::Path;

use gridsmith_core::{Corrector, ScriptLimits, Validator};
use serde::Serialize;

use crate::exit_codes;
use crate::output::{print_error, print_result, OutputFormat};
use crate::utils::read_source;
use crate::OutputArgs;

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct CorrectResult {
    changed: bool,
    applied: Vec<&'static str>,
    valid_after: bool,
    source: String,
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    written: bool,
}

pub fn correct_cmd(path: &Path, write: bool, output: OutputArgs) -> i32 {
    let Some(source) = read_source(path, &output) else {
        return exit_codes::RUNTIME_ERROR;
    };

    let limits = ScriptLimits::default();
    let correction = Corrector::standard(limits).correct(&source);
    let valid_after = Validator::default().validate(&correction.source).is_valid();

    let written = write && correction.changed();
    if written {
        if let Err(e) = std::fs::write(path, &correction.source) {
            print_error(
                output.format,
                output.quiet,
                &format!("failed to write {}: {e}", path.display()),
            );
            return exit_codes::RUNTIME_ERROR;
        }
    }

    if output.format == OutputFormat::Text && !output.quiet {
        if correction.changed() {
            eprintln!("applied: {}", correction.applied.join(", "));
        } else {
            eprintln!("no rule applied");
        }
        if written {
            eprintln!("wrote {}", path.display());
        } else {
            print!("{}", correction.source);
        }
    } else {
        print_result(
            output.format,
            output.quiet,
            &CorrectResult {
                changed: correction.changed(),
                applied: correction.applied,
                valid_after,
                source: correction.source,
                written,
            },
        );
    }

    if valid_after {
        exit_codes::SUCCESS
    } else {
        exit_codes::VALIDATION_FAILED
    }
}
