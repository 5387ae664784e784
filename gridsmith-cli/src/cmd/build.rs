use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use gridsmith_exec::{
    EventSink, MemoryTarget, MetricsCollector, MetricsEventSink, NoOpEventSink, Orchestrator,
    OrchestratorConfig, ScriptedGenerator, SessionReport, StdoutEventSink, TracingEventSink,
};
use serde::Serialize;
use tracing::info;
use uuid::Uuid;

use crate::exit_codes;
use crate::output::{print_error, print_result, OutputFormat};
use crate::utils::{chunk_id, collect_chunk_files, load_config};
use crate::{EventsMode, OutputArgs, RetryArgs};

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct BuildResult {
    #[serde(flatten)]
    report: SessionReport,
    metrics: serde_json::Value,
}

pub async fn build_cmd(
    paths: &[PathBuf],
    intent: &str,
    config_path: Option<&Path>,
    events: EventsMode,
    retry: RetryArgs,
    output: OutputArgs,
) -> i32 {
    let mut config = match config_path.map(load_config).transpose() {
        Ok(c) => c.unwrap_or_default(),
        Err(e) => {
            print_error(output.format, output.quiet, &e);
            return exit_codes::RUNTIME_ERROR;
        }
    };
    apply_overrides(&mut config, &retry);

    let files = match collect_chunk_files(paths) {
        Ok(f) if f.is_empty() => {
            print_error(output.format, output.quiet, "no chunk files found");
            return exit_codes::RUNTIME_ERROR;
        }
        Ok(f) => f,
        Err(e) => {
            print_error(output.format, output.quiet, &e);
            return exit_codes::RUNTIME_ERROR;
        }
    };
    let mut chunks = Vec::with_capacity(files.len());
    for file in &files {
        match std::fs::read_to_string(file) {
            Ok(source) => chunks.push((chunk_id(file), source)),
            Err(e) => {
                print_error(
                    output.format,
                    output.quiet,
                    &format!("failed to read {}: {e}", file.display()),
                );
                return exit_codes::RUNTIME_ERROR;
            }
        }
    }

    let session_id = Uuid::new_v4().to_string();
    let base: Arc<dyn EventSink> = match events {
        EventsMode::Stdout => Arc::new(StdoutEventSink),
        EventsMode::Tracing => Arc::new(TracingEventSink),
        EventsMode::None => Arc::new(NoOpEventSink),
    };
    let collector = Arc::new(MetricsCollector::new(session_id.clone(), intent.to_string()));
    let sink = Arc::new(MetricsEventSink::new(Arc::clone(&collector), base));

    let target = Arc::new(MemoryTarget::new().with_config(config.sandbox));
    let generator = Arc::new(ScriptedGenerator::from_named(chunks));
    let orchestrator = match Orchestrator::new(config, generator, target.clone(), target, sink) {
        Ok(o) => o,
        Err(e) => {
            print_error(output.format, output.quiet, &e.to_string());
            return exit_codes::RUNTIME_ERROR;
        }
    };

    info!(%session_id, chunks = files.len(), "starting build");
    let report = match orchestrator.run_session(&session_id, intent).await {
        Ok(r) => r,
        Err(e) => {
            print_error(output.format, output.quiet, &e.to_string());
            return exit_codes::RUNTIME_ERROR;
        }
    };
    let success = report.success;

    if output.format == OutputFormat::Text && !output.quiet && events != EventsMode::Stdout {
        print_text(&report);
    } else {
        let metrics = collector.get_metrics().await.to_json();
        print_result(output.format, output.quiet, &BuildResult { report, metrics });
    }

    if success {
        exit_codes::SUCCESS
    } else {
        exit_codes::RUN_FAILED
    }
}

fn apply_overrides(config: &mut OrchestratorConfig, retry: &RetryArgs) {
    if let Some(n) = retry.max_consecutive_failures {
        config.retry.max_consecutive_failures = n;
    }
    if let Some(n) = retry.max_total_retries {
        config.retry.max_total_retries = n;
    }
    if let Some(ms) = retry.timeout_ms {
        config.chunk_timeout = Duration::from_millis(ms);
    }
    if let Some(ms) = retry.backoff_ms {
        config.retry.base_delay = Duration::from_millis(ms);
        config.retry.max_delay = config.retry.max_delay.max(config.retry.base_delay);
    }
}

fn print_text(report: &SessionReport) {
    let progress = &report.progress;
    println!(
        "{}: session {} ({} completed, {} failed, {} skipped, {:.0}%)",
        report.final_state,
        report.session_id,
        progress.completed_count,
        progress.failed_count,
        progress.skipped_count,
        progress.percent_complete()
    );
    if let Some(reason) = &report.abort_reason {
        println!("  reason: {reason}");
    }
    for outcome in &progress.history {
        match &outcome.error_message {
            None => println!("  ok    {} (attempt {})", outcome.chunk_id, outcome.attempt),
            Some(message) => println!(
                "  {}  {} (attempt {}): {message}",
                if outcome.skipped { "skip" } else { "fail" },
                outcome.chunk_id,
                outcome.attempt
            ),
        }
    }
    for sheet in &report.snapshot.sheets {
        println!(
            "  sheet {}: {} values, {} formulas",
            sheet.name,
            sheet.values.len(),
            sheet.formulas.len()
        );
    }
    for suggestion in &report.suggestions {
        println!("  hint: {suggestion}");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backoff_override_keeps_config_valid() {
        let mut config = OrchestratorConfig::default();
        let retry = RetryArgs {
            backoff_ms: Some(60_000),
            max_total_retries: Some(2),
            ..RetryArgs::default()
        };
        apply_overrides(&mut config, &retry);
        assert_eq!(config.retry.base_delay, Duration::from_secs(60));
        assert_eq!(config.retry.max_total_retries, 2);
        assert!(config.validate().is_ok());
    }
}
