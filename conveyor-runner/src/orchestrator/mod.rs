//! Deployment orchestrator
//!
//! Drives one run through the stage table:
//! - Stages execute strictly in order, one at a time
//! - A skipped stage is recorded and never affects the run status
//! - A failed required stage ends the pipeline; later stages are not attempted
//! - Cleanup runs exactly once at the end of every run
//!
//! Each stage maps collaborator errors onto the [`StageError`] taxonomy. The
//! run state machine in [`RunState`] tracks progress and the final
//! [`RunReport`] carries per-stage results and the run's log entries.

mod stage;

pub use stage::{SkipCondition, Stage, pipeline_stages};

use chrono::Utc;
use conveyor_core::StageError;
use conveyor_core::config::DeployConfig;
use conveyor_core::domain::{
    PipelineContext, RunReport, RunState, RunStatus, StageKind, StageResult,
};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};
use tracing::{debug, error, info, warn};

use crate::collaborators::{CollaboratorError, Collaborators, ProbeResult, RemoveOutcome};
use crate::deploy::DeploySpec;
use crate::process::tail;
use crate::retry::{RetryPolicy, retry_fixed};
use crate::service::{InMemoryLogBuffer, LogBufferService};

/// Lines of test output kept in a test failure
const TEST_OUTPUT_LINES: usize = 20;

/// Shared flag requesting cancellation of a run
///
/// Checked before every stage except cleanup.
#[derive(Debug, Clone, Default)]
pub struct CancelFlag(Arc<AtomicBool>);

impl CancelFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Per-run settings taken from the configuration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunSettings {
    pub source_dir: String,
    pub test_command: Vec<String>,
    pub verify_delay: Duration,
    pub replicas: u32,
    pub rollback_on_failure: bool,
    pub prune: bool,
}

impl RunSettings {
    pub fn from_config(config: &DeployConfig) -> Self {
        Self {
            source_dir: config.source_dir.clone(),
            test_command: config.test.command.clone(),
            verify_delay: Duration::from_secs(config.verify.delay_seconds),
            replicas: config.app.replicas,
            rollback_on_failure: config.strategy.rollback_on_failure(),
            prune: config.cleanup.prune,
        }
    }
}

/// Runs the stage table against a set of collaborators
pub struct Orchestrator {
    stages: Vec<Stage>,
    settings: RunSettings,
    collaborators: Collaborators,
    cancel: CancelFlag,
}

/// Outcome of a run before it is turned into a report
struct RunProgress {
    state: RunState,
    stages: Vec<StageResult>,
    failure: Option<(StageKind, StageError)>,
    verification_attempts: u32,
}

impl Orchestrator {
    /// Creates an orchestrator for a validated configuration
    pub fn new(config: &DeployConfig, collaborators: Collaborators) -> Self {
        Self {
            stages: pipeline_stages(&config.scan),
            settings: RunSettings::from_config(config),
            collaborators,
            cancel: CancelFlag::new(),
        }
    }

    /// Uses `cancel` to stop the run between stages
    pub fn with_cancel_flag(mut self, cancel: CancelFlag) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn stages(&self) -> &[Stage] {
        &self.stages
    }

    pub fn strategy(&self) -> &'static str {
        self.collaborators.target.strategy()
    }

    /// Executes a full run
    ///
    /// Never returns an error: every failure is captured in the report.
    pub async fn run(&self, ctx: &PipelineContext) -> RunReport {
        let started_at = Utc::now();
        let logs = InMemoryLogBuffer::new();

        info!(
            "Starting run {} for branch '{}' ({} -> {})",
            ctx.run_id(),
            ctx.branch(),
            ctx.registry_image(),
            ctx.environment()
        );
        logs.info(
            None,
            format!(
                "Run {} started: branch '{}', environment {}, tag {}",
                ctx.run_id(),
                ctx.branch(),
                ctx.environment(),
                ctx.tag()
            ),
        );

        let mut progress = self.run_stages(ctx, &logs).await;

        let cleanup = self.cleanup(ctx, &logs).await;
        progress.stages.push(cleanup);
        let final_state = progress.state.finish();

        let (status, failed_stage, error) = match progress.failure {
            Some((stage, err)) => (RunStatus::Failed, Some(stage), Some(err.to_string())),
            None => (RunStatus::Success, None, None),
        };

        let report = RunReport {
            run_id: ctx.run_id(),
            started_at,
            finished_at: Utc::now(),
            status,
            final_state,
            branch: ctx.branch().to_string(),
            environment: ctx.environment(),
            image: ctx.registry_image().to_string(),
            tag: ctx.tag().to_string(),
            failed_stage,
            error,
            verification_attempts: progress.verification_attempts,
            stages: progress.stages,
            logs: Vec::new(),
        };

        match report.status {
            RunStatus::Success => {
                info!("Run {} succeeded: {}", report.run_id, report.summary());
                logs.info(None, report.summary());
            }
            RunStatus::Failed => {
                error!("Run {} failed: {}", report.run_id, report.summary());
                logs.error(None, report.summary());
            }
        }

        RunReport {
            logs: logs.drain(),
            ..report
        }
    }

    /// Walks the stage table up to the first failure of a required stage
    async fn run_stages(&self, ctx: &PipelineContext, logs: &InMemoryLogBuffer) -> RunProgress {
        let mut progress = RunProgress {
            state: RunState::Pending,
            stages: Vec::with_capacity(self.stages.len() + 1),
            failure: None,
            verification_attempts: 0,
        };

        for (idx, stage) in self.stages.iter().enumerate() {
            let name = stage.kind.name();

            if self.cancel.is_cancelled() {
                let err = StageError::Cancelled(name.to_string());
                warn!("{}", err);
                logs.error(Some(name), err.to_string());
                progress
                    .stages
                    .push(StageResult::failed(stage.kind, stage.required, &err, 0));
                progress.state = progress.state.fail();
                progress.failure = Some((stage.kind, err));
                break;
            }

            if let Some(condition) = stage.skip_for(ctx) {
                info!("Skipping stage '{}': {}", name, condition.reason());
                logs.info(Some(name), format!("Skipped: {}", condition.reason()));
                progress
                    .stages
                    .push(StageResult::skipped(stage.kind, stage.required));
                progress.state = progress.state.advance(stage.kind, true);
                continue;
            }

            info!(
                "Executing stage {}/{}: {}",
                idx + 1,
                self.stages.len(),
                name
            );
            logs.info(Some(name), "Started".to_string());

            let started = Instant::now();
            let outcome = self
                .execute(stage.kind, ctx, logs, &mut progress.verification_attempts)
                .await;
            let duration_ms = started.elapsed().as_millis() as u64;

            match outcome {
                Ok(()) => {
                    logs.info(Some(name), format!("Completed in {}ms", duration_ms));
                    progress.stages.push(StageResult::success(
                        stage.kind,
                        stage.required,
                        duration_ms,
                    ));
                    progress.state = progress.state.advance(stage.kind, false);
                }
                Err(err) if !stage.required => {
                    warn!("Non-required stage '{}' failed: {}", name, err);
                    logs.warn(Some(name), format!("Failed (not required): {}", err));
                    progress.stages.push(StageResult::failed(
                        stage.kind,
                        stage.required,
                        &err,
                        duration_ms,
                    ));
                    progress.state = progress.state.advance(stage.kind, false);
                }
                Err(err) => {
                    error!("Stage '{}' failed: {}", name, err);
                    logs.error(Some(name), err.to_string());
                    progress.stages.push(StageResult::failed(
                        stage.kind,
                        stage.required,
                        &err,
                        duration_ms,
                    ));
                    progress.state = progress.state.fail();

                    if matches!(err, StageError::VerificationFailure { .. }) {
                        self.rollback(ctx, logs).await;
                    }

                    progress.failure = Some((stage.kind, err));
                    break;
                }
            }
        }

        progress
    }

    async fn execute(
        &self,
        stage: StageKind,
        ctx: &PipelineContext,
        logs: &InMemoryLogBuffer,
        verification_attempts: &mut u32,
    ) -> Result<(), StageError> {
        match stage {
            StageKind::Checkout => self.checkout(ctx).await,
            StageKind::Build => self.build(ctx).await,
            StageKind::Test => self.test(ctx, logs).await,
            StageKind::Scan => self.scan(ctx).await,
            StageKind::Push => self.push(ctx).await,
            StageKind::Deploy => self.deploy(ctx).await,
            StageKind::Verify => {
                let (result, attempts) = self.verify(ctx, logs).await;
                *verification_attempts = attempts;
                result
            }
            // Cleanup is not part of the stage table
            StageKind::Cleanup => Ok(()),
        }
    }

    async fn checkout(&self, ctx: &PipelineContext) -> Result<(), StageError> {
        self.collaborators
            .source
            .checkout(ctx.revision())
            .await
            .map_err(|e| StageError::CheckoutFailure(e.to_string()))
    }

    /// Builds the local image and adds the registry names
    async fn build(&self, ctx: &PipelineContext) -> Result<(), StageError> {
        let builder = &self.collaborators.builder;
        let to_failure = |e: CollaboratorError| StageError::BuildFailure(e.to_string());

        let built = builder
            .build(&self.settings.source_dir, &ctx.local_image())
            .await
            .map_err(to_failure)?;

        builder
            .tag(&built, &ctx.registry_image())
            .await
            .map_err(to_failure)?;
        builder
            .tag(&built, &ctx.registry_latest())
            .await
            .map_err(to_failure)?;

        Ok(())
    }

    async fn test(&self, ctx: &PipelineContext, logs: &InMemoryLogBuffer) -> Result<(), StageError> {
        let outcome = self
            .collaborators
            .tests
            .run_in_container(&ctx.local_image(), &self.settings.test_command)
            .await
            .map_err(|e| StageError::TestFailure {
                exit_code: -1,
                output: e.to_string(),
            })?;

        if outcome.passed() {
            return Ok(());
        }

        let output = tail(&outcome.output, TEST_OUTPUT_LINES);
        for line in output.lines() {
            logs.error(Some(StageKind::Test.name()), line.to_string());
        }

        Err(StageError::TestFailure {
            exit_code: outcome.exit_code,
            output,
        })
    }

    async fn scan(&self, ctx: &PipelineContext) -> Result<(), StageError> {
        self.collaborators
            .scanner
            .scan(&ctx.local_image())
            .await
            .map_err(|e| StageError::ScanFailure(e.to_string()))
    }

    /// Pushes the build tag and the latest alias
    async fn push(&self, ctx: &PipelineContext) -> Result<(), StageError> {
        let registry = &self.collaborators.registry;
        let to_failure = |e: CollaboratorError| StageError::PushDenied(e.to_string());

        let session = registry
            .authenticate(ctx.registry_credential())
            .await
            .map_err(to_failure)?;

        for image in [ctx.registry_image(), ctx.registry_latest()] {
            registry.push(&image, &session).await.map_err(to_failure)?;
        }

        Ok(())
    }

    fn deploy_spec(&self, ctx: &PipelineContext) -> DeploySpec {
        DeploySpec {
            image: ctx.registry_image(),
            environment: ctx.environment(),
            port: ctx.port(),
            replicas: self.settings.replicas,
            name: ctx.container_name().to_string(),
        }
    }

    async fn deploy(&self, ctx: &PipelineContext) -> Result<(), StageError> {
        let target = &self.collaborators.target;
        let spec = self.deploy_spec(ctx);

        info!(
            "Deploying {} to {} using the {} strategy",
            spec.image,
            spec.environment,
            target.strategy()
        );

        target
            .deploy(&spec)
            .await
            .map_err(|e| StageError::DeployFailure(e.to_string()))?;
        target.await_rollout(&spec).await.map_err(rollout_failure)?;

        Ok(())
    }

    /// Probes the service until it answers or the attempts run out
    ///
    /// Returns the stage result and the number of probes made.
    async fn verify(
        &self,
        ctx: &PipelineContext,
        logs: &InMemoryLogBuffer,
    ) -> (Result<(), StageError>, u32) {
        let policy = RetryPolicy::verification(self.settings.verify_delay);
        let prober = &self.collaborators.prober;
        let url = ctx.health_url();
        let stage = Some(StageKind::Verify.name());

        let outcome = retry_fixed(policy, move |attempt| async move {
            let result = prober.probe(url).await;
            match &result {
                ProbeResult::Reachable => {
                    logs.info(
                        stage,
                        format!("Attempt {}/{}: {} reachable", attempt, policy.attempts, url),
                    );
                }
                ProbeResult::Unreachable(reason) => {
                    warn!(
                        "Verification attempt {}/{} failed: {}",
                        attempt, policy.attempts, reason
                    );
                    logs.warn(
                        stage,
                        format!(
                            "Attempt {}/{}: {} unreachable: {}",
                            attempt, policy.attempts, url, reason
                        ),
                    );
                }
            }
            result.is_reachable()
        })
        .await;

        let result = if outcome.succeeded {
            Ok(())
        } else {
            Err(StageError::VerificationFailure {
                attempts: outcome.attempts,
                url: url.to_string(),
            })
        };

        (result, outcome.attempts)
    }

    /// Reverts the deployment after failed verification, when configured
    ///
    /// The outcome is only logged.
    async fn rollback(&self, ctx: &PipelineContext, logs: &InMemoryLogBuffer) {
        if !self.settings.rollback_on_failure {
            return;
        }

        let target = &self.collaborators.target;
        let stage = Some(StageKind::Deploy.name());

        match target.rollback(&self.deploy_spec(ctx)).await {
            Ok(true) => {
                info!("Rolled back {} deployment", target.strategy());
                logs.warn(stage, "Rolled back to the previous version".to_string());
            }
            Ok(false) => {
                info!("The {} strategy cannot roll back", target.strategy());
                logs.warn(
                    stage,
                    format!("Rollback not supported by the {} strategy", target.strategy()),
                );
            }
            Err(e) => {
                warn!("Rollback failed: {}", e);
                logs.error(stage, format!("Rollback failed: {}", e));
            }
        }
    }

    /// Removes the images built by this run
    ///
    /// Always runs and never fails the run. A missing image counts as removed
    /// and an image still used by the deployed container is kept.
    async fn cleanup(&self, ctx: &PipelineContext, logs: &InMemoryLogBuffer) -> StageResult {
        let name = StageKind::Cleanup.name();
        let builder = &self.collaborators.builder;
        let started = Instant::now();
        let mut problems = Vec::new();

        info!("Executing stage: {}", name);

        for image in [ctx.registry_latest(), ctx.registry_image(), ctx.local_image()] {
            match builder.remove(&image).await {
                Ok(RemoveOutcome::InUse) => {
                    debug!("Keeping {}: a running container uses it", image);
                }
                Ok(_) => {}
                Err(e) => problems.push(format!("{}: {}", image, e)),
            }
        }

        if self.settings.prune {
            if let Err(e) = builder.prune().await {
                problems.push(format!("prune: {}", e));
            }
        }

        let duration_ms = started.elapsed().as_millis() as u64;

        if problems.is_empty() {
            logs.info(Some(name), format!("Completed in {}ms", duration_ms));
            return StageResult::success(StageKind::Cleanup, false, duration_ms);
        }

        let err = StageError::CleanupFailure(problems.join("; "));
        warn!("{}", err);
        logs.warn(Some(name), err.to_string());
        StageResult::failed(StageKind::Cleanup, false, &err, duration_ms)
    }
}

/// Maps a rollout wait error onto the stage taxonomy
///
/// Only the rollout wait reports a rollout timeout; any other deploy error,
/// including a command timeout, is a plain deploy failure.
fn rollout_failure(err: CollaboratorError) -> StageError {
    match err {
        CollaboratorError::Timeout {
            operation,
            after_secs,
        } => StageError::RolloutTimeout {
            deployment: operation,
            timeout_secs: after_secs,
        },
        other => StageError::DeployFailure(other.to_string()),
    }
}
