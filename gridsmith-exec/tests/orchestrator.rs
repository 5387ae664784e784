use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use gridsmith_core::Chunk;
use gridsmith_exec::{
    ChunkGenerator, ChunkRequest, ChunkResponse, Event, EventSink, GeneratorError, MemoryTarget,
    MetricsCollector, MetricsEventSink, NoOpEventSink, Orchestrator, OrchestratorConfig,
    OrchestratorError, Progress, ProgressEventSink, ProgressSink, RetryConfig, ScriptedGenerator,
    SessionState, TargetError, TargetRuntime,
};
use serde_json::json;
use tokio::sync::Mutex;

fn wrapped(body: &str) -> String {
    format!(
        "await Excel.run(async (context) => {{\n  const sheet = context.workbook.worksheets.getActiveWorksheet();\n{body}\n  await context.sync();\n}});\n"
    )
}

fn generator(bodies: &[(&str, &str)]) -> ScriptedGenerator {
    ScriptedGenerator::from_named(bodies.iter().map(|(id, body)| (*id, wrapped(body))))
}

fn orchestrator(
    config: OrchestratorConfig,
    gen: ScriptedGenerator,
    target: Arc<MemoryTarget>,
    sink: Arc<dyn EventSink>,
) -> Orchestrator {
    Orchestrator::new(config, Arc::new(gen), target.clone(), target, sink).unwrap()
}

fn failing(message: &str, n: usize) -> Vec<TargetError> {
    (0..n).map(|_| TargetError::Execution(message.to_string())).collect()
}

#[tokio::test(start_paused = true)]
async fn completes_and_applies_every_chunk() {
    let target = Arc::new(MemoryTarget::new());
    let gen = generator(&[
        ("header", r#"  sheet.getRange("A1:B1").values = [["Item", "Amount"]];"#),
        ("data", r#"  sheet.getRange("A2:B2").values = [["Rent", 1200]];"#),
    ]);
    let orch = orchestrator(OrchestratorConfig::default(), gen, target.clone(), Arc::new(NoOpEventSink));

    let report = orch.run_session("s1", "budget table").await.unwrap();
    assert!(report.success);
    assert_eq!(report.final_state, SessionState::Completed);
    assert_eq!(report.progress.completed_count, 2);
    assert_eq!(report.progress.percent_complete(), 100.0);
    let sheet = report.snapshot.sheet("Sheet1").unwrap();
    assert_eq!(sheet.values["B2"], json!(1200));
    assert!(orch.get_progress("s1").await.is_none());
}

#[tokio::test(start_paused = true)]
async fn one_level_values_are_corrected_before_execution() {
    let target = Arc::new(MemoryTarget::new());
    let gen = generator(&[("row", r#"  sheet.getRange("A1:C1").values = ["a", "b", "c"];"#)]);
    let orch = orchestrator(OrchestratorConfig::default(), gen, target.clone(), Arc::new(NoOpEventSink));

    let report = orch.run_session("s", "").await.unwrap();
    assert!(report.success, "{:?}", report.abort_reason);
    assert_eq!(target.execution_count().await, 1);
    let executed = target.executed().await;
    assert!(executed[0].contains(r#"[["a", "b", "c"]]"#), "{}", executed[0]);
    assert_eq!(report.snapshot.sheets[0].values["C1"], json!("c"));
}

#[tokio::test(start_paused = true)]
async fn aborts_after_third_consecutive_failure() {
    let target = Arc::new(MemoryTarget::new());
    target.inject_failures(failing("GeneralException: the host crashed", 4)).await;
    let gen = generator(&[("only", r#"  sheet.getRange("A1").values = [[1]];"#)]);
    let orch = orchestrator(OrchestratorConfig::default(), gen, target.clone(), Arc::new(NoOpEventSink));

    let report = orch.run_session("s", "").await.unwrap();
    assert_eq!(report.final_state, SessionState::Aborted);
    assert!(!report.success);
    assert_eq!(target.execution_count().await, 3);
    assert_eq!(report.progress.failed_count, 3);
    assert_eq!(report.progress.consecutive_failures, 3);
    assert!(report.abort_reason.unwrap().contains("3 consecutive failures"));
}

#[tokio::test(start_paused = true)]
async fn circuit_breaker_bounds_total_attempts() {
    let target = Arc::new(MemoryTarget::new());
    target.inject_failures(failing("GeneralException: flaky", 50)).await;
    let gen = generator(&[
        ("a", r#"  sheet.getRange("A1").values = [[1]];"#),
        ("b", r#"  sheet.getRange("A2").values = [[2]];"#),
    ]);
    let config = OrchestratorConfig {
        retry: RetryConfig {
            max_consecutive_failures: 100,
            max_total_retries: 4,
            ..RetryConfig::default()
        },
        ..OrchestratorConfig::default()
    };
    let orch = orchestrator(config, gen, target.clone(), Arc::new(NoOpEventSink));

    let report = orch.run_session("s", "").await.unwrap();
    assert_eq!(report.final_state, SessionState::Aborted);
    assert_eq!(target.execution_count().await, 4);
    assert_eq!(report.progress.total_retries, 4);
    assert!(report.abort_reason.unwrap().contains("total retries"));
}

#[tokio::test(start_paused = true)]
async fn success_resets_consecutive_but_not_total() {
    let target = Arc::new(MemoryTarget::new());
    target.inject_failures(failing("GeneralException: flaky", 2)).await;
    let gen = generator(&[
        ("a", r#"  sheet.getRange("A1").values = [[1]];"#),
        ("b", r#"  sheet.getRange("A2").values = [[2]];"#),
    ]);
    let orch = orchestrator(OrchestratorConfig::default(), gen, target.clone(), Arc::new(NoOpEventSink));

    let report = orch.run_session("s", "").await.unwrap();
    assert!(report.success);
    assert_eq!(report.progress.consecutive_failures, 0);
    assert_eq!(report.progress.total_retries, 2);
    assert_eq!(report.progress.attempts_for("a"), 3);
    assert_eq!(report.progress.attempts_for("b"), 1);
}

#[tokio::test(start_paused = true)]
async fn persistent_failures_skip_without_retry() {
    let target = Arc::new(MemoryTarget::new());
    target
        .inject_failures(failing("Request was rate limited, slow down", 1))
        .await;
    let gen = generator(&[
        ("a", r#"  sheet.getRange("A1").values = [[1]];"#),
        ("b", r#"  sheet.getRange("A2").values = [[2]];"#),
    ]);
    let orch = orchestrator(OrchestratorConfig::default(), gen, target.clone(), Arc::new(NoOpEventSink));

    let started = tokio::time::Instant::now();
    let report = orch.run_session("s", "").await.unwrap();
    assert!(report.success);
    assert_eq!(target.execution_count().await, 2);
    assert_eq!(report.progress.attempts_for("a"), 1);
    assert_eq!(report.progress.skipped_count, 1);
    assert_eq!(report.progress.consecutive_failures, 0);
    assert_eq!(report.progress.total_retries, 0);
    assert!(report.progress.history[0].skipped);
    // no backoff was waited out
    assert!(started.elapsed() < Duration::from_millis(500));
}

#[tokio::test(start_paused = true)]
async fn persistent_failure_skips_even_at_the_breaker_limit() {
    let target = Arc::new(MemoryTarget::new());
    let mut failures = failing("GeneralException: flaky", 1);
    failures.extend(failing("Request was rate limited, slow down", 1));
    target.inject_failures(failures).await;
    let gen = generator(&[
        ("a", r#"  sheet.getRange("A1").values = [[1]];"#),
        ("b", r#"  sheet.getRange("A2").values = [[2]];"#),
    ]);
    let config = OrchestratorConfig {
        retry: RetryConfig {
            max_consecutive_failures: 2,
            ..RetryConfig::default()
        },
        ..OrchestratorConfig::default()
    };
    let orch = orchestrator(config, gen, target.clone(), Arc::new(NoOpEventSink));

    let report = orch.run_session("s", "").await.unwrap();
    assert!(report.success, "{:?}", report.abort_reason);
    assert_eq!(report.progress.attempts_for("a"), 2);
    assert_eq!(report.progress.skipped_count, 1);
    assert_eq!(report.progress.total_retries, 1);
    assert!(!report.progress.history[0].skipped);
    assert!(report.progress.history[1].skipped);
}

#[tokio::test(start_paused = true)]
async fn execution_timeout_counts_as_failure() {
    let target = Arc::new(MemoryTarget::new().with_delay(Duration::from_secs(60)));
    let gen = generator(&[("slow", r#"  sheet.getRange("A1").values = [[1]];"#)]);
    let config = OrchestratorConfig {
        chunk_timeout: Duration::from_secs(1),
        ..OrchestratorConfig::default()
    };
    let orch = orchestrator(config, gen, target.clone(), Arc::new(NoOpEventSink));

    let report = orch.run_session("s", "").await.unwrap();
    assert_eq!(report.final_state, SessionState::Aborted);
    let first = &report.progress.history[0];
    assert!(first.timed_out);
    assert_eq!(first.category, Some(gridsmith_core::ErrorFamily::Timeout));
}

#[tokio::test(start_paused = true)]
async fn failed_chunk_is_regenerated_by_the_generator() {
    let target = Arc::new(MemoryTarget::new());
    // the reference-error rules find nothing to change here, so the retry
    // has to come from the generator
    target
        .inject_failures(failing("ReferenceError: totals is not defined", 1))
        .await;
    let gen = generator(&[("a", r#"  sheet.getRange("A1").values = [["first"]];"#)])
        .with_variant("a", wrapped(r#"  sheet.getRange("A1").values = [["second"]];"#));
    let orch = orchestrator(OrchestratorConfig::default(), gen, target.clone(), Arc::new(NoOpEventSink));

    let report = orch.run_session("s", "").await.unwrap();
    assert!(report.success);
    assert_eq!(report.snapshot.sheets[0].values["A1"], json!("second"));
    assert_eq!(report.progress.attempts_for("a"), 2);
}

struct Exhausted;

#[async_trait]
impl ChunkGenerator for Exhausted {
    async fn next_chunk(&self, _request: &ChunkRequest) -> Result<ChunkResponse, GeneratorError> {
        Ok(ChunkResponse::exhausted())
    }
}

#[tokio::test(start_paused = true)]
async fn no_chunk_available_ends_unsuccessfully() {
    let target = Arc::new(MemoryTarget::new());
    let orch = Orchestrator::new(
        OrchestratorConfig::default(),
        Arc::new(Exhausted),
        target.clone(),
        target,
        Arc::new(NoOpEventSink),
    )
    .unwrap();
    assert!(!orch.start("s", "anything").await);
}

struct Broken {
    calls: AtomicUsize,
}

#[async_trait]
impl ChunkGenerator for Broken {
    async fn next_chunk(&self, _request: &ChunkRequest) -> Result<ChunkResponse, GeneratorError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Err(GeneratorError::Transport("connection reset".into()))
    }
}

#[tokio::test(start_paused = true)]
async fn generator_errors_trip_the_same_breaker() {
    let target = Arc::new(MemoryTarget::new());
    let gen = Arc::new(Broken { calls: AtomicUsize::new(0) });
    let orch = Orchestrator::new(
        OrchestratorConfig::default(),
        gen.clone(),
        target.clone(),
        target.clone(),
        Arc::new(NoOpEventSink),
    )
    .unwrap();
    let report = orch.run_session("s", "").await.unwrap();
    assert_eq!(report.final_state, SessionState::Aborted);
    assert_eq!(gen.calls.load(Ordering::SeqCst), 3);
    assert_eq!(target.execution_count().await, 0);
}

#[tokio::test(start_paused = true)]
async fn stop_aborts_between_chunks() {
    let target = Arc::new(MemoryTarget::new().with_delay(Duration::from_secs(1)));
    let gen = generator(&[
        ("a", r#"  sheet.getRange("A1").values = [[1]];"#),
        ("b", r#"  sheet.getRange("A2").values = [[2]];"#),
        ("c", r#"  sheet.getRange("A3").values = [[3]];"#),
        ("d", r#"  sheet.getRange("A4").values = [[4]];"#),
        ("e", r#"  sheet.getRange("A5").values = [[5]];"#),
    ]);
    let orch = Arc::new(orchestrator(
        OrchestratorConfig::default(),
        gen,
        target.clone(),
        Arc::new(NoOpEventSink),
    ));

    let running = {
        let orch = Arc::clone(&orch);
        tokio::spawn(async move { orch.run_session("build", "five rows").await })
    };
    tokio::time::sleep(Duration::from_millis(1500)).await;

    let progress = orch.get_progress("build").await.unwrap();
    assert!(!progress.state.is_terminal());
    assert!(matches!(
        orch.run_session("build", "again").await,
        Err(OrchestratorError::DuplicateSession(_))
    ));
    assert!(orch.stop("build").await);

    let report = running.await.unwrap().unwrap();
    assert_eq!(report.final_state, SessionState::Aborted);
    assert_eq!(report.abort_reason.as_deref(), Some("stopped"));
    let executed = target.execution_count().await;
    assert!((1..5).contains(&executed), "{executed}");
    assert_eq!(report.progress.completed_count as usize, executed);
    assert!(!orch.stop("build").await);
}

#[tokio::test(start_paused = true)]
async fn metrics_follow_the_event_stream() {
    let target = Arc::new(MemoryTarget::new());
    target.inject_failures(failing("GeneralException: once", 1)).await;
    let gen = generator(&[
        ("a", r#"  sheet.getRange("A1").values = [[1]];"#),
        ("b", r#"  sheet.getRange("A2:B2").values = ["x", "y"];"#),
    ]);
    let collector = Arc::new(MetricsCollector::default());
    let sink = Arc::new(MetricsEventSink::new(collector.clone(), Arc::new(NoOpEventSink)));
    let orch = orchestrator(OrchestratorConfig::default(), gen, target, sink);

    assert!(orch.start("m", "metrics").await);
    let metrics = collector.get_metrics().await;
    assert_eq!(metrics.session_id, "m");
    assert_eq!(metrics.state, "completed");
    assert_eq!(metrics.chunks_started, 3);
    assert_eq!(metrics.chunks_succeeded, 2);
    assert_eq!(metrics.chunks_failed, 1);
    assert_eq!(metrics.retries, 1);
    assert!(metrics.corrections >= 1);
    assert_eq!(metrics.to_json()["chunks"]["failed"], 1);
}

#[derive(Default)]
struct RecordingSink {
    calls: Mutex<Vec<String>>,
}

#[async_trait]
impl ProgressSink for RecordingSink {
    async fn on_progress(&self, progress: &Progress) {
        self.calls.lock().await.push(format!("progress:{}", progress.state));
    }

    async fn on_chunk_start(&self, chunk: &Chunk) {
        self.calls.lock().await.push(format!("start:{}", chunk.id));
    }

    async fn on_chunk_error(&self, message: &str, chunk: &Chunk) {
        self.calls.lock().await.push(format!("error:{}:{message}", chunk.id));
    }
}

#[tokio::test(start_paused = true)]
async fn progress_sink_receives_chunk_notifications() {
    let target = Arc::new(MemoryTarget::new());
    target.inject_failures(failing("Permission denied: sheet is protected", 1)).await;
    let gen = generator(&[
        ("a", r#"  sheet.getRange("A1").values = [[1]];"#),
        ("b", r#"  sheet.getRange("A2").values = [[2]];"#),
    ]);
    let recorder = Arc::new(RecordingSink::default());
    let sink = Arc::new(ProgressEventSink::new(recorder.clone(), Arc::new(NoOpEventSink)));
    let orch = orchestrator(OrchestratorConfig::default(), gen, target, sink);

    assert!(orch.start("p", "").await);
    let calls = recorder.calls.lock().await;
    assert_eq!(calls[0], "start:a");
    assert!(calls[1].starts_with("error:a:Permission denied"));
    assert!(calls.contains(&"start:b".to_string()));
    assert_eq!(calls.last().unwrap(), "progress:completed");

    let stats = orch.ledger_stats().await;
    assert_eq!(stats.failures, 1);
    assert_eq!(stats.successes, 1);
}

#[derive(Default)]
struct EventLog {
    events: Mutex<Vec<Event>>,
}

#[async_trait]
impl EventSink for EventLog {
    async fn emit(&self, event: Event) {
        self.events.lock().await.push(event);
    }
}

/// Accepts whatever it is given.
#[derive(Default)]
struct Permissive {
    executed: Mutex<Vec<String>>,
}

#[async_trait]
impl TargetRuntime for Permissive {
    async fn execute(&self, source: &str) -> Result<(), TargetError> {
        self.executed.lock().await.push(source.to_string());
        Ok(())
    }
}

#[tokio::test(start_paused = true)]
async fn failed_rehearsal_still_executes_and_is_ledgered() {
    let snapshots = Arc::new(MemoryTarget::new());
    let target = Arc::new(Permissive::default());
    let log = Arc::new(EventLog::default());
    let gen = generator(&[("a", r#"  sheet.getRange("A1").values = [[helperValue]];"#)]);
    let orch = Orchestrator::new(
        OrchestratorConfig::default(),
        Arc::new(gen),
        snapshots,
        target.clone(),
        log.clone(),
    )
    .unwrap();

    let report = orch.run_session("s", "").await.unwrap();
    assert!(report.success, "{:?}", report.abort_reason);
    let executed = target.executed.lock().await;
    assert_eq!(executed.len(), 1);
    assert!(executed[0].contains("[[helperValue]]"));

    let stats = orch.ledger_stats().await;
    assert_eq!(stats.failures, 1);
    assert_eq!(stats.successes, 1);
    let events = log.events.lock().await;
    assert!(events.iter().any(|e| matches!(
        e,
        Event::SimulationFailed { chunk_id, message, .. }
            if chunk_id == "a" && message.contains("helperValue")
    )));
}

#[tokio::test(start_paused = true)]
async fn rehearsal_correction_is_what_executes() {
    let target = Arc::new(MemoryTarget::new());
    let log = Arc::new(EventLog::default());
    let gen = generator(&[("row", r#"  sheet.getRange("A1:C1").values = ["a", "b", "c"];"#)]);
    // no static rounds, so only the rehearsal can catch the one-level write
    let config = OrchestratorConfig {
        max_correction_rounds: 0,
        ..OrchestratorConfig::default()
    };
    let orch = orchestrator(config, gen, target.clone(), log.clone());

    let report = orch.run_session("s", "").await.unwrap();
    assert!(report.success, "{:?}", report.abort_reason);
    assert_eq!(target.execution_count().await, 1);
    let executed = target.executed().await;
    assert!(executed[0].contains(r#"[["a", "b", "c"]]"#), "{}", executed[0]);
    assert_eq!(report.snapshot.sheets[0].values["B1"], json!("b"));

    let events = log.events.lock().await;
    assert!(events
        .iter()
        .any(|e| matches!(e, Event::SimulationFailed { chunk_id, .. } if chunk_id == "row")));
    assert!(events.iter().any(|e| matches!(
        e,
        Event::ChunkCorrected { rules, round: 1, .. } if rules.contains(&"dimension_wrap")
    )));
    let stats = orch.ledger_stats().await;
    assert_eq!(stats.failures, 0);
    assert_eq!(stats.successes, 1);
}
