// Run orchestration
//
// Sequences intake, generation and evaluation for one note. Each stage runs
// under its own retry policy and per-attempt deadline. Run-level failures are
// reported as `RunOutcome::Failed`, never as `Err`.

pub mod reconcile;
pub mod retry;

use chrono::{DateTime, Utc};
use futures::future::join_all;
use goalsmith_abstraction::Model;
use goalsmith_models::ModelFactory;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{Semaphore, broadcast};
use tokio::time::timeout;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::agents::{GoalGenerator, GoalJudge};
use crate::config::{AgentConfig, GoalsmithConfig, RunOverrides};
use crate::domain::{ClinicalNote, Judgment, SmartGoal};
use crate::error::{Disposition, PipelineError, Result, Stage};
use crate::events::{EventSink, RuntimeEvent};
use crate::runtime::{AgentRuntime, InvocationStats};
use crate::tools::builtin::{FETCH_NOTE, NoteStore, expect_note};
use crate::tools::{EnvCredentialProvider, IntakeCaller, ToolGateway, ToolRegistry};

pub use reconcile::reconcile;
pub use retry::RetryPolicy;

/// Where the note for a run comes from.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NoteInput {
    /// The note itself.
    Inline(ClinicalNote),
    /// A reference resolved through `fetch_note`.
    Reference(String),
}

/// One unit of work for the orchestrator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunRequest {
    /// Note to generate goals for.
    pub note: NoteInput,
    /// Per-run overrides for both agents.
    #[serde(default)]
    pub overrides: RunOverrides,
}

impl RunRequest {
    /// Request for an inline note.
    pub fn inline(note: ClinicalNote) -> Self {
        Self { note: NoteInput::Inline(note), overrides: RunOverrides::default() }
    }

    /// Request for a note reference.
    pub fn reference(reference: impl Into<String>) -> Self {
        Self { note: NoteInput::Reference(reference.into()), overrides: RunOverrides::default() }
    }

    /// Sets per-run overrides.
    #[must_use]
    pub fn with_overrides(mut self, overrides: RunOverrides) -> Self {
        self.overrides = overrides;
        self
    }
}

/// Counters for one stage.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StageTelemetry {
    /// Attempts made, including the first.
    pub attempts: u32,
    /// Tool calls made across all attempts.
    pub tool_calls: u32,
    /// Tool rounds across all attempts.
    pub tool_rounds: u32,
    /// Wall time spent in the stage, backoff included.
    pub duration_ms: u64,
}

impl StageTelemetry {
    fn record(&mut self, stats: InvocationStats) {
        self.tool_calls += stats.tool_calls;
        self.tool_rounds += stats.tool_rounds;
    }
}

/// Counters for one run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunTelemetry {
    pub intake: StageTelemetry,
    pub generation: StageTelemetry,
    pub evaluation: StageTelemetry,
    /// Goals dropped for an unmatched condition tag.
    pub dropped_goals: usize,
    pub total_duration_ms: u64,
}

impl RunTelemetry {
    /// Tool calls made by the run, intake included.
    pub const fn tool_calls(&self) -> u32 {
        self.intake.tool_calls + self.generation.tool_calls + self.evaluation.tool_calls
    }
}

/// Final artifact of a successful run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunArtifact {
    pub run_id: String,
    pub note: ClinicalNote,
    /// Goals in generation order.
    pub goals: Vec<SmartGoal>,
    /// One judgment per goal, in goal order.
    pub judgments: Vec<Judgment>,
    pub telemetry: RunTelemetry,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
}

/// A run that did not produce an artifact.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FailedRun {
    pub run_id: String,
    /// Set once the note is known.
    pub note_id: Option<String>,
    /// Stage the failure is attributed to.
    pub stage: Stage,
    pub error: PipelineError,
    pub telemetry: RunTelemetry,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
}

/// Result of [`Orchestrator::run`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum RunOutcome {
    Completed(RunArtifact),
    Failed(FailedRun),
}

impl RunOutcome {
    /// Whether the run produced an artifact.
    pub const fn is_completed(&self) -> bool {
        matches!(self, Self::Completed(_))
    }

    pub fn run_id(&self) -> &str {
        match self {
            Self::Completed(artifact) => &artifact.run_id,
            Self::Failed(failed) => &failed.run_id,
        }
    }

    pub const fn artifact(&self) -> Option<&RunArtifact> {
        match self {
            Self::Completed(artifact) => Some(artifact),
            Self::Failed(_) => None,
        }
    }

    pub const fn failure(&self) -> Option<&FailedRun> {
        match self {
            Self::Completed(_) => None,
            Self::Failed(failed) => Some(failed),
        }
    }

    pub const fn telemetry(&self) -> &RunTelemetry {
        match self {
            Self::Completed(artifact) => &artifact.telemetry,
            Self::Failed(failed) => &failed.telemetry,
        }
    }
}

/// Supplies a model for an agent config.
pub trait ModelProvider: Send + Sync {
    /// Model for `config`. Called once per agent per run.
    ///
    /// # Errors
    /// `Config` when the model cannot be built from `config`.
    fn model_for(&self, config: &AgentConfig) -> Result<Arc<dyn Model>>;
}

/// Builds models through [`ModelFactory`].
#[derive(Debug, Clone, Copy, Default)]
pub struct FactoryModelProvider;

impl ModelProvider for FactoryModelProvider {
    fn model_for(&self, config: &AgentConfig) -> Result<Arc<dyn Model>> {
        let model: Arc<dyn Model> = ModelFactory::create(config.model_config()).map_err(|e| PipelineError::Config {
            reason: format!("cannot create {} model '{}': {e}", config.role, config.model_id),
        })?;
        Ok(model)
    }
}

/// Progress of a run, kept outside `execute` so failures can be attributed.
struct RunProgress {
    stage: Stage,
    note_id: Option<String>,
    telemetry: RunTelemetry,
}

fn elapsed_ms(since: Instant) -> u64 {
    u64::try_from(since.elapsed().as_millis()).unwrap_or(u64::MAX)
}

/// Runs the two-agent pipeline.
pub struct Orchestrator {
    config: Arc<GoalsmithConfig>,
    gateway: ToolGateway,
    models: Arc<dyn ModelProvider>,
    events: EventSink,
    retry: RetryPolicy,
}

impl std::fmt::Debug for Orchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Orchestrator")
            .field("gateway", &self.gateway)
            .field("retry", &self.retry)
            .finish_non_exhaustive()
    }
}

impl Orchestrator {
    /// Creates an orchestrator over an existing gateway and model provider.
    pub fn new(config: Arc<GoalsmithConfig>, gateway: ToolGateway, models: Arc<dyn ModelProvider>) -> Self {
        let retry = RetryPolicy::from_config(&config.pipeline);
        Self { config, gateway, models, events: EventSink::new(), retry }
    }

    /// Creates an orchestrator with built-in and configured remote tools,
    /// environment credentials and factory-built models.
    ///
    /// # Errors
    /// `Config` when the tool registry cannot be built.
    pub fn from_config(config: GoalsmithConfig) -> Result<Self> {
        let registry = ToolRegistry::from_config(&config, NoteStore::new())?;
        let gateway = ToolGateway::new(Arc::new(registry), Arc::new(EnvCredentialProvider), config.tools.timeout());
        Ok(Self::new(Arc::new(config), gateway, Arc::new(FactoryModelProvider)))
    }

    /// Streams runtime events to `event_tx` as well as the log.
    #[must_use]
    pub fn with_event_sender(mut self, event_tx: broadcast::Sender<RuntimeEvent>) -> Self {
        self.events = EventSink::with_sender(event_tx);
        self
    }

    pub fn config(&self) -> &GoalsmithConfig {
        &self.config
    }

    pub const fn gateway(&self) -> &ToolGateway {
        &self.gateway
    }

    pub const fn retry_policy(&self) -> &RetryPolicy {
        &self.retry
    }

    /// Runs one note through generation and evaluation.
    pub async fn run(&self, request: RunRequest, cancel: CancellationToken) -> RunOutcome {
        let run_id = uuid::Uuid::new_v4().to_string();
        let started_at = Utc::now();
        let clock = Instant::now();
        info!(correlation_id = %run_id, "Run started");

        let mut progress = RunProgress { stage: Stage::Intake, note_id: None, telemetry: RunTelemetry::default() };
        let result = self.execute(&run_id, request, &cancel, &mut progress).await;
        progress.telemetry.total_duration_ms = elapsed_ms(clock);
        let finished_at = Utc::now();

        let outcome = match result {
            Ok((note, goals, judgments)) => {
                info!(
                    correlation_id = %run_id,
                    note_id = %note.note_id,
                    goals = goals.len(),
                    duration_ms = progress.telemetry.total_duration_ms,
                    "Run completed"
                );
                RunOutcome::Completed(RunArtifact {
                    run_id: run_id.clone(),
                    note,
                    goals,
                    judgments,
                    telemetry: progress.telemetry,
                    started_at,
                    finished_at,
                })
            }
            Err(err) => {
                error!(
                    correlation_id = %run_id,
                    stage = %progress.stage,
                    error_code = err.code(),
                    error = %err,
                    "Run failed"
                );
                RunOutcome::Failed(FailedRun {
                    run_id: run_id.clone(),
                    note_id: progress.note_id,
                    stage: progress.stage,
                    error: err,
                    telemetry: progress.telemetry,
                    started_at,
                    finished_at,
                })
            }
        };

        self.events.emit(RuntimeEvent::RunFinished { correlation_id: run_id, succeeded: outcome.is_completed() });
        outcome
    }

    /// Runs every request, at most `max_concurrent_runs` at a time.
    ///
    /// Outcomes come back in input order. Each run gets a child of `cancel`.
    pub async fn run_batch(&self, requests: Vec<RunRequest>, cancel: CancellationToken) -> Vec<RunOutcome> {
        let concurrency = self.config.pipeline.max_concurrent_runs.max(1);
        let semaphore = Arc::new(Semaphore::new(concurrency));
        info!(total_runs = requests.len(), concurrency, "Starting batch");

        let runs = requests.into_iter().enumerate().map(|(index, request)| {
            let semaphore = Arc::clone(&semaphore);
            let token = cancel.child_token();
            async move { self.run_in_slot(index, &semaphore, request, token).await }
        });
        let outcomes = join_all(runs).await;

        let completed = outcomes.iter().filter(|o| o.is_completed()).count();
        info!(completed, failed = outcomes.len() - completed, "Batch finished");
        outcomes
    }

    /// Runs one batch entry once a slot is free. A closed semaphore fails the
    /// run without starting it.
    async fn run_in_slot(
        &self,
        index: usize,
        semaphore: &Semaphore,
        request: RunRequest,
        cancel: CancellationToken,
    ) -> RunOutcome {
        let _permit = match semaphore.acquire().await {
            Ok(permit) => permit,
            Err(e) => {
                error!(index, "Failed to acquire run slot: {}", e);
                return self.not_started(PipelineError::Cancelled);
            }
        };
        debug!(index, "Batch run started");
        self.run(request, cancel).await
    }

    fn not_started(&self, error: PipelineError) -> RunOutcome {
        let run_id = uuid::Uuid::new_v4().to_string();
        let now = Utc::now();
        self.events.emit(RuntimeEvent::RunFinished { correlation_id: run_id.clone(), succeeded: false });
        RunOutcome::Failed(FailedRun {
            run_id,
            note_id: None,
            stage: Stage::Intake,
            error,
            telemetry: RunTelemetry::default(),
            started_at: now,
            finished_at: now,
        })
    }

    async fn execute(
        &self,
        run_id: &str,
        request: RunRequest,
        cancel: &CancellationToken,
        progress: &mut RunProgress,
    ) -> Result<(ClinicalNote, Vec<SmartGoal>, Vec<Judgment>)> {
        let note = match request.note {
            NoteInput::Inline(note) => note,
            NoteInput::Reference(reference) => self.resolve_note(run_id, &reference, cancel, progress).await?,
        };
        progress.note_id = Some(note.note_id.clone());

        progress.stage = Stage::Generation;
        let generator_config = Arc::new(self.config.agents.generator.with_overrides(&request.overrides));
        let generator = GoalGenerator::new(self.runtime(generator_config)?);
        let output = {
            let (generator, note) = (&generator, &note);
            self.run_stage(Stage::Generation, run_id, cancel, &mut progress.telemetry.generation, move || async move {
                let mut stats = InvocationStats::default();
                let result = generator.generate(note, run_id, cancel, &mut stats).await;
                (result, stats)
            })
            .await?
        };
        progress.telemetry.dropped_goals = output.dropped_goals;
        let goals = output.goals;

        progress.stage = Stage::Evaluation;
        let judge_config = Arc::new(self.config.agents.judge.with_overrides(&request.overrides));
        let judge = GoalJudge::new(self.runtime(judge_config)?, self.config.scoring.clone());
        let judgments = {
            let (judge, note, goals) = (&judge, &note, goals.as_slice());
            self.run_stage(Stage::Evaluation, run_id, cancel, &mut progress.telemetry.evaluation, move || async move {
                let mut stats = InvocationStats::default();
                let result = match judge.evaluate(note, goals, run_id, cancel, &mut stats).await {
                    Ok(judgments) => reconcile(goals, judgments),
                    Err(e) => Err(e),
                };
                (result, stats)
            })
            .await?
        };

        Ok((note, goals, judgments))
    }

    async fn resolve_note(
        &self,
        run_id: &str,
        reference: &str,
        cancel: &CancellationToken,
        progress: &mut RunProgress,
    ) -> Result<ClinicalNote> {
        let caller = IntakeCaller::new(&self.config.pipeline.intake_tools);
        let args = json!({ "data_source": reference });
        let (caller, args, gateway) = (&caller, &args, &self.gateway);
        self.run_stage(Stage::Intake, run_id, cancel, &mut progress.telemetry.intake, move || async move {
            let stats = InvocationStats { tool_calls: 1, tool_rounds: 0 };
            let result = match gateway.call(caller, FETCH_NOTE, args, run_id).await {
                Ok(outcome) => expect_note(&outcome, reference),
                Err(e) => Err(e),
            };
            (result, stats)
        })
        .await
    }

    /// Fresh runtime for one agent of one run.
    fn runtime(&self, config: Arc<AgentConfig>) -> Result<AgentRuntime> {
        let model = self.models.model_for(&config)?;
        Ok(AgentRuntime::new(config, model, self.gateway.clone(), self.events.clone()))
    }

    /// Runs `attempt` under the retry policy and the per-attempt deadline.
    async fn run_stage<T, F, Fut>(
        &self,
        stage: Stage,
        run_id: &str,
        cancel: &CancellationToken,
        telemetry: &mut StageTelemetry,
        attempt: F,
    ) -> Result<T>
    where
        F: Fn() -> Fut,
        Fut: Future<Output = (Result<T>, InvocationStats)>,
    {
        let stage_timeout = self.config.pipeline.stage_timeout();
        let started = Instant::now();
        let mut attempt_number = 0;

        let result = loop {
            attempt_number += 1;
            telemetry.attempts = attempt_number;
            debug!(correlation_id = %run_id, stage = %stage, attempt = attempt_number, "Stage attempt started");

            let outcome = tokio::select! {
                biased;
                () = cancel.cancelled() => Err(PipelineError::Cancelled),
                timed = timeout(stage_timeout, attempt()) => match timed {
                    Ok((result, stats)) => {
                        telemetry.record(stats);
                        result
                    }
                    Err(_) => Err(PipelineError::StageTimeout {
                        stage,
                        timeout_ms: u64::try_from(stage_timeout.as_millis()).unwrap_or(u64::MAX),
                    }),
                },
            };

            let err = match outcome {
                Ok(value) => break Ok(value),
                Err(err) => err,
            };

            match err.disposition() {
                Disposition::Retryable if self.retry.allows_retry_after(attempt_number) => {
                    self.events.emit(RuntimeEvent::StageRetry {
                        correlation_id: run_id.to_string(),
                        stage,
                        attempt: attempt_number,
                        error: err.to_string(),
                    });
                    let delay = self.retry.calculate_delay(attempt_number - 1);
                    if let Err(e) = self.backoff(delay, cancel).await {
                        break Err(e);
                    }
                }
                Disposition::Retryable => {
                    warn!(correlation_id = %run_id, stage = %stage, attempts = attempt_number, "Retry budget exhausted");
                    break Err(PipelineError::StageFailed { stage, last_error: Box::new(err) });
                }
                Disposition::FailFast | Disposition::Fatal => break Err(err),
            }
        };

        telemetry.duration_ms = elapsed_ms(started);
        result
    }

    async fn backoff(&self, delay: Duration, cancel: &CancellationToken) -> Result<()> {
        debug!(delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX), "Retrying after backoff");
        tokio::select! {
            biased;
            () = cancel.cancelled() => Err(PipelineError::Cancelled),
            () = tokio::time::sleep(delay) => Ok(()),
        }
    }
}
