use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;

use gridsmith_core::{
    classify_error, clean_generated_source, correct_and_revalidate, Chunk, Corrector, Validator,
};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::collab::{ChunkGenerator, ChunkRequest, SnapshotProvider, TargetRuntime};
use crate::config::OrchestratorConfig;
use crate::error::OrchestratorError;
use crate::executor::events::{Event, EventSink};
use crate::executor::state::SessionState;
use crate::executor::types::{ExecutionOutcome, Progress, SessionReport};
use crate::ledger::{LedgerStats, OutcomeLedger};
use crate::retry::{decide_retry, RetryDecision};
use crate::sandbox::Sandbox;

type Rng = Arc<dyn Fn() -> u64 + Send + Sync>;

/// Drives sessions one chunk at a time: request, validate, correct,
/// simulate, execute, report.
///
/// Several sessions may run at once on a shared orchestrator, but each
/// session is strictly sequential. The ledger is shared by all of them.
pub struct Orchestrator {
    config: OrchestratorConfig,
    generator: Arc<dyn ChunkGenerator>,
    snapshots: Arc<dyn SnapshotProvider>,
    target: Arc<dyn TargetRuntime>,
    event_sink: Arc<dyn EventSink>,
    validator: Validator,
    corrector: Corrector,
    ledger: Mutex<OutcomeLedger>,
    sessions: Mutex<HashMap<String, SessionEntry>>,
    rng: Rng,
}

struct SessionEntry {
    progress: Progress,
    stop: Arc<AtomicBool>,
}

/// Loop-local state for one running session.
struct Session {
    id: String,
    intent: String,
    progress: Progress,
    stop: Arc<AtomicBool>,
    last_outcome: Option<ExecutionOutcome>,
    retry_of: Option<String>,
    /// A corrected chunk to retry without asking the generator.
    pending: Option<Chunk>,
    chunks_pulled: u32,
}

enum Verdict {
    Continue,
    Finish(SessionState, Option<String>),
}

enum Pulled {
    Chunk(Chunk),
    Again,
    Finish(SessionState, Option<String>),
}

impl Orchestrator {
    pub fn new(
        config: OrchestratorConfig,
        generator: Arc<dyn ChunkGenerator>,
        snapshots: Arc<dyn SnapshotProvider>,
        target: Arc<dyn TargetRuntime>,
        event_sink: Arc<dyn EventSink>,
    ) -> Result<Self, OrchestratorError> {
        config.validate()?;
        Ok(Self {
            validator: Validator::new(config.policy.clone(), config.limits),
            corrector: Corrector::standard(config.limits),
            ledger: Mutex::new(OutcomeLedger::new(config.ledger_capacity, config.excerpt_len)),
            sessions: Mutex::new(HashMap::new()),
            rng: Arc::new(|| fastrand::u64(..)),
            config,
            generator,
            snapshots,
            target,
            event_sink,
        })
    }

    /// Replaces the jitter source.
    pub fn with_rng(mut self, rng: impl Fn() -> u64 + Send + Sync + 'static) -> Self {
        self.rng = Arc::new(rng);
        self
    }

    pub fn config(&self) -> &OrchestratorConfig {
        &self.config
    }

    /// Runs a session to its end and reports whether it completed.
    pub async fn start(&self, session_id: &str, intent: &str) -> bool {
        match self.run_session(session_id, intent).await {
            Ok(report) => report.success,
            Err(e) => {
                warn!(%session_id, error = %e, "session could not run");
                false
            }
        }
    }

    /// Asks a running session to stop before its next chunk. Returns false
    /// when no such session is running.
    pub async fn stop(&self, session_id: &str) -> bool {
        match self.sessions.lock().await.get(session_id) {
            Some(entry) => {
                entry.stop.store(true, Ordering::SeqCst);
                info!(%session_id, "stop requested");
                true
            }
            None => false,
        }
    }

    /// Progress of a running session. Finished sessions are forgotten.
    pub async fn get_progress(&self, session_id: &str) -> Option<Progress> {
        self.sessions
            .lock()
            .await
            .get(session_id)
            .map(|e| e.progress.clone())
    }

    pub async fn ledger_stats(&self) -> LedgerStats {
        self.ledger.lock().await.stats()
    }

    pub async fn ledger_suggestions(&self) -> Vec<String> {
        self.ledger.lock().await.suggestions()
    }

    pub async fn run_session(&self, session_id: &str, intent: &str) -> Result<SessionReport, OrchestratorError> {
        let stop = Arc::new(AtomicBool::new(false));
        {
            let mut sessions = self.sessions.lock().await;
            if sessions.contains_key(session_id) {
                return Err(OrchestratorError::DuplicateSession(session_id.to_string()));
            }
            sessions.insert(
                session_id.to_string(),
                SessionEntry {
                    progress: Progress::new(session_id),
                    stop: Arc::clone(&stop),
                },
            );
        }

        let mut session = Session {
            id: session_id.to_string(),
            intent: intent.to_string(),
            progress: Progress::new(session_id),
            stop,
            last_outcome: None,
            retry_of: None,
            pending: None,
            chunks_pulled: 0,
        };
        let result = self.drive(&mut session).await;
        self.sessions.lock().await.remove(session_id);

        let (state, reason) = result?;
        self.event_sink
            .emit(Event::SessionFinished {
                session_id: session.id.clone(),
                state,
                reason: reason.clone(),
            })
            .await;
        info!(
            session_id = %session.id,
            %state,
            completed = session.progress.completed_count,
            failed = session.progress.failed_count,
            skipped = session.progress.skipped_count,
            "session finished"
        );
        Ok(SessionReport {
            session_id: session.id,
            intent: session.intent,
            success: state == SessionState::Completed,
            final_state: state,
            abort_reason: reason,
            snapshot: self.snapshots.snapshot().await,
            suggestions: self.ledger_suggestions().await,
            progress: session.progress,
        })
    }

    async fn drive(&self, s: &mut Session) -> Result<(SessionState, Option<String>), OrchestratorError> {
        self.generator.begin_session(&s.id, &s.intent).await?;
        self.event_sink
            .emit(Event::SessionStarted {
                session_id: s.id.clone(),
                intent: s.intent.clone(),
            })
            .await;

        loop {
            if s.stop.load(Ordering::SeqCst) {
                return self.finish(s, SessionState::Aborted, Some("stopped".into())).await;
            }

            let chunk = match s.pending.take() {
                Some(chunk) => {
                    self.transition(s, SessionState::Validating).await?;
                    chunk
                }
                None => {
                    if s.chunks_pulled >= self.config.max_chunks_per_session {
                        let reason = format!("chunk limit of {} reached", self.config.max_chunks_per_session);
                        return self.finish(s, SessionState::Aborted, Some(reason)).await;
                    }
                    match self.request(s).await? {
                        Pulled::Chunk(chunk) => chunk,
                        Pulled::Again => continue,
                        Pulled::Finish(state, reason) => return self.finish(s, state, reason).await,
                    }
                }
            };
            if let Verdict::Finish(state, reason) = self.process(s, chunk).await? {
                return self.finish(s, state, reason).await;
            }
        }
    }

    /// Requesting. Anything but a chunk leaves the session in Reporting.
    async fn request(&self, s: &mut Session) -> Result<Pulled, OrchestratorError> {
        self.transition(s, SessionState::Requesting).await?;
        let request = ChunkRequest {
            session_id: s.id.clone(),
            intent: s.intent.clone(),
            snapshot: self.snapshots.snapshot().await,
            last_outcome: s.last_outcome.clone(),
            retry_of: s.retry_of.clone(),
        };
        let response = match self.generator.next_chunk(&request).await {
            Ok(r) => r,
            Err(e) => {
                warn!(session_id = %s.id, error = %e, "generator request failed");
                self.transition(s, SessionState::Reporting).await?;
                let chunk_id = s.retry_of.clone().unwrap_or_default();
                let decision = self.decide(s, false);
                return Ok(match self.on_failure(s, &chunk_id, decision, None).await {
                    Verdict::Continue => Pulled::Again,
                    Verdict::Finish(state, reason) => Pulled::Finish(state, reason),
                });
            }
        };

        if let Some(hint) = &response.progress {
            s.progress.stage = hint.stage;
            s.progress.total_chunks = hint.total_chunks;
        }
        if response.completed {
            self.transition(s, SessionState::Reporting).await?;
            return Ok(Pulled::Finish(SessionState::Completed, None));
        }
        let Some(chunk) = response.chunk else {
            self.transition(s, SessionState::Reporting).await?;
            return Ok(Pulled::Finish(
                SessionState::Aborted,
                Some("generator returned no chunk".into()),
            ));
        };
        s.chunks_pulled += 1;
        s.retry_of = None;
        self.transition(s, SessionState::Validating).await?;
        let source = clean_generated_source(&chunk.source_text);
        Ok(Pulled::Chunk(chunk.with_source(source)))
    }

    /// Validating through Reporting for one chunk.
    async fn process(&self, s: &mut Session, chunk: Chunk) -> Result<Verdict, OrchestratorError> {
        let source = self.correct_statically(s, &chunk).await?;
        let source = self.rehearse(s, &chunk, source).await?;

        self.transition(s, SessionState::Executing).await?;
        let attempt = s.progress.attempts_for(&chunk.id) + 1;
        let chunk = chunk.with_source(source);
        self.event_sink
            .emit(Event::ChunkStarted {
                session_id: s.id.clone(),
                chunk: chunk.clone(),
                attempt,
            })
            .await;
        let outcome = self.execute(&chunk, attempt).await;

        self.transition(s, SessionState::Reporting).await?;
        Ok(self.report(s, &chunk, outcome).await)
    }

    /// Validating and bounded Correcting. Returns the text to rehearse.
    async fn correct_statically(&self, s: &mut Session, chunk: &Chunk) -> Result<String, OrchestratorError> {
        let mut current = chunk.source_text.clone();
        let report = self.validator.validate(&current);
        if !report.needs_correction() {
            self.transition(s, SessionState::Simulating).await?;
            return Ok(current);
        }

        for round in 1..=self.config.max_correction_rounds {
            self.transition(s, SessionState::Correcting).await?;
            let revision = correct_and_revalidate(&self.corrector, &self.validator, &current);
            let changed = revision.source != current;
            if changed {
                debug!(chunk_id = %chunk.id, round, rules = ?revision.applied, "chunk corrected");
                self.event_sink
                    .emit(Event::ChunkCorrected {
                        session_id: s.id.clone(),
                        chunk_id: chunk.id.clone(),
                        rules: revision.applied.clone(),
                        round,
                    })
                    .await;
                current = revision.source;
            }
            if !changed || !revision.report.needs_correction() {
                break;
            }
        }
        self.transition(s, SessionState::Simulating).await?;
        Ok(current)
    }

    /// Simulating. Advisory: a failing rehearsal gets one targeted
    /// correction and is then executed regardless.
    async fn rehearse(&self, s: &mut Session, chunk: &Chunk, source: String) -> Result<String, OrchestratorError> {
        let snapshot = self.snapshots.snapshot().await;
        let sandbox = Sandbox::seeded(&snapshot).with_config(self.config.sandbox);
        let first = sandbox.simulate(&source);
        let Some(message) = first.first_error().map(str::to_string) else {
            return Ok(source);
        };

        self.event_sink
            .emit(Event::SimulationFailed {
                session_id: s.id.clone(),
                chunk_id: chunk.id.clone(),
                message: message.clone(),
            })
            .await;
        let family = classify_error(&message);
        let targeted = Corrector::targeted(family, self.config.limits).correct(&source);
        let (kept, message, operations) = if targeted.changed() {
            let second = sandbox.simulate(&targeted.source);
            let before = self.validator.validate(&source).score();
            let after = self.validator.validate(&targeted.source).score();
            if second.success || after <= before {
                self.event_sink
                    .emit(Event::ChunkCorrected {
                        session_id: s.id.clone(),
                        chunk_id: chunk.id.clone(),
                        rules: targeted.applied.clone(),
                        round: self.config.max_correction_rounds + 1,
                    })
                    .await;
            }
            if second.success {
                debug!(chunk_id = %chunk.id, %family, "targeted correction fixed rehearsal");
                return Ok(targeted.source);
            }
            let message = second.first_error().unwrap_or(&message).to_string();
            if after <= before {
                (targeted.source, message, second.operations.len())
            } else {
                (source, message, first.operations.len())
            }
        } else {
            (source, message, first.operations.len())
        };

        self.ledger.lock().await.record_failure(
            &chunk.id,
            &kept,
            &message,
            classify_error(&message),
            operations,
        );
        Ok(kept)
    }

    /// Executing, under the per-chunk timeout.
    async fn execute(&self, chunk: &Chunk, attempt: u32) -> ExecutionOutcome {
        let started = Instant::now();
        let result = tokio::time::timeout(self.config.chunk_timeout, self.target.execute(&chunk.source_text)).await;
        let elapsed = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX);
        match result {
            Ok(Ok(())) => ExecutionOutcome::succeeded(&chunk.id, attempt, elapsed),
            Ok(Err(e)) => ExecutionOutcome::failed(&chunk.id, attempt, elapsed, e.to_string()),
            Err(_) => {
                let mut outcome = ExecutionOutcome::failed(
                    &chunk.id,
                    attempt,
                    elapsed,
                    format!(
                        "chunk execution timed out after {}ms",
                        self.config.chunk_timeout.as_millis()
                    ),
                );
                outcome.timed_out = true;
                outcome
            }
        }
    }

    /// Reporting: classify the outcome and decide what comes next.
    async fn report(&self, s: &mut Session, chunk: &Chunk, mut outcome: ExecutionOutcome) -> Verdict {
        let verdict = if outcome.success {
            s.progress.completed_count += 1;
            s.progress.consecutive_failures = 0;
            s.progress.stage = s.progress.stage.max(chunk.stage);
            self.ledger.lock().await.record_success(
                &chunk.id,
                &chunk.source_text,
                chunk.estimated_operations(),
                outcome.duration_ms,
            );
            self.event_sink
                .emit(Event::ChunkSucceeded {
                    session_id: s.id.clone(),
                    chunk_id: chunk.id.clone(),
                    attempt: outcome.attempt,
                    duration_ms: outcome.duration_ms,
                })
                .await;
            s.retry_of = None;
            Verdict::Continue
        } else {
            let message = outcome.error_message.clone().unwrap_or_default();
            let category = outcome.category.unwrap_or_else(|| classify_error(&message));
            s.progress.failed_count += 1;
            self.ledger.lock().await.record_failure(
                &chunk.id,
                &chunk.source_text,
                &message,
                category,
                chunk.estimated_operations(),
            );
            self.event_sink
                .emit(Event::ChunkFailed {
                    session_id: s.id.clone(),
                    chunk: chunk.clone(),
                    attempt: outcome.attempt,
                    message: message.clone(),
                    category,
                })
                .await;

            let signature = self.config.persistent_signatures.matching(&message);
            let decision = self.decide(s, signature.is_some());
            outcome.skipped = matches!(decision, RetryDecision::Skip);
            let verdict = self.on_failure(s, &chunk.id, decision, signature).await;
            if !outcome.skipped && matches!(verdict, Verdict::Continue) {
                let fixed = Corrector::targeted(category, self.config.limits).correct(&chunk.source_text);
                if fixed.changed() {
                    s.pending = Some(chunk.with_source(fixed.source));
                } else {
                    s.retry_of = Some(chunk.id.clone());
                }
            }
            verdict
        };

        s.progress.history.push(outcome.clone());
        s.last_outcome = Some(outcome);
        self.publish(s).await;
        verdict
    }

    /// Persistent failures skip the chunk without touching the breakers.
    /// Anything else counts against both before the decision is made.
    fn decide(&self, s: &mut Session, persistent: bool) -> RetryDecision {
        if !persistent {
            s.progress.consecutive_failures += 1;
            s.progress.total_retries += 1;
        }
        decide_retry(
            &self.config.retry,
            s.progress.consecutive_failures,
            s.progress.total_retries,
            persistent,
            || (self.rng)(),
        )
    }

    /// Acts on a retry decision: abort, skip past the chunk, or wait out
    /// the backoff.
    async fn on_failure(
        &self,
        s: &mut Session,
        chunk_id: &str,
        decision: RetryDecision,
        signature: Option<&str>,
    ) -> Verdict {
        match decision {
            RetryDecision::Abort { reason } => {
                Verdict::Finish(SessionState::Aborted, Some(format!("circuit breaker tripped: {reason}")))
            }
            RetryDecision::Skip => {
                s.progress.skipped_count += 1;
                s.retry_of = None;
                self.event_sink
                    .emit(Event::ChunkSkipped {
                        session_id: s.id.clone(),
                        chunk_id: chunk_id.to_string(),
                        signature: signature.unwrap_or_default().to_string(),
                    })
                    .await;
                Verdict::Continue
            }
            RetryDecision::Retry { delay } => {
                let delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX);
                self.event_sink
                    .emit(Event::RetryScheduled {
                        session_id: s.id.clone(),
                        chunk_id: chunk_id.to_string(),
                        delay_ms,
                        consecutive_failures: s.progress.consecutive_failures,
                        total_retries: s.progress.total_retries,
                    })
                    .await;
                self.publish(s).await;
                tokio::time::sleep(delay).await;
                Verdict::Continue
            }
        }
    }

    async fn transition(&self, s: &mut Session, to: SessionState) -> Result<(), OrchestratorError> {
        s.progress.state.validate_transition(to)?;
        s.progress.state = to;
        if let Some(entry) = self.sessions.lock().await.get_mut(&s.id) {
            entry.progress.state = to;
        }
        Ok(())
    }

    async fn finish(
        &self,
        s: &mut Session,
        state: SessionState,
        reason: Option<String>,
    ) -> Result<(SessionState, Option<String>), OrchestratorError> {
        if s.progress.state != state {
            self.transition(s, state).await?;
        }
        if let Some(reason) = &reason {
            warn!(session_id = %s.id, %reason, "session aborted");
        }
        self.publish(s).await;
        Ok((state, reason))
    }

    async fn publish(&self, s: &Session) {
        if let Some(entry) = self.sessions.lock().await.get_mut(&s.id) {
            entry.progress = s.progress.clone();
        }
        self.event_sink
            .emit(Event::ProgressUpdated {
                progress: s.progress.clone(),
            })
            .await;
    }
}
