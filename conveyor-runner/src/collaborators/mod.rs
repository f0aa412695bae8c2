//! Collaborators
//!
//! The external systems a run drives: source control, image builder, test
//! runner, scanner, registry, deployment target and liveness prober. The
//! orchestrator only sees the traits defined here; the implementations in the
//! submodules drive the corresponding command line tools through a
//! [`CommandRunner`].

mod engine;
mod git;
mod probe;
mod trivy;

pub use engine::{ContainerEngine, CredentialLookup, resolve_credential};
pub use git::GitCheckout;
pub use probe::{AlwaysReachable, HttpProber};
pub use trivy::TrivyScanner;

use async_trait::async_trait;
use conveyor_core::config::DeployConfig;
use conveyor_core::domain::ImageRef;
use std::sync::Arc;
use thiserror::Error;

use crate::deploy::{DRY_RUN_TASK_DEFINITION, DeploymentTarget, build_target};
use crate::process::{CommandRunner, DryRunRunner};

/// Errors reported by collaborators
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CollaboratorError {
    /// The tool could not be started
    #[error("failed to run '{program}': {message}")]
    Spawn { program: String, message: String },

    /// The tool ran and reported failure
    #[error("'{command}' exited with code {exit_code}: {detail}")]
    CommandFailed {
        command: String,
        exit_code: i32,
        detail: String,
    },

    /// The operation did not complete in time
    #[error("'{operation}' timed out after {after_secs}s")]
    Timeout { operation: String, after_secs: u64 },

    /// Authentication or authorization was refused
    #[error("access denied: {0}")]
    Denied(String),

    /// The tool succeeded but its output could not be used
    #[error("unexpected output from '{command}': {detail}")]
    UnexpectedOutput { command: String, detail: String },

    /// A credential reference could not be resolved
    #[error("credential '{0}' is not available")]
    MissingCredential(String),
}

/// Checks out the source revision
#[async_trait]
pub trait SourceControl: Send + Sync {
    /// Checks out `revision`, or keeps the current workspace when `None`
    async fn checkout(&self, revision: Option<&str>) -> Result<(), CollaboratorError>;
}

/// Result of removing an image
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RemoveOutcome {
    Removed,
    NotFound,
    /// A container still uses the image, so it was kept
    InUse,
}

/// Builds, tags and removes images
#[async_trait]
pub trait ImageBuilder: Send + Sync {
    /// Builds `source` into `image`, returning the built reference
    async fn build(&self, source: &str, image: &ImageRef) -> Result<ImageRef, CollaboratorError>;

    /// Adds `alias` as another name for `image`
    async fn tag(&self, image: &ImageRef, alias: &ImageRef) -> Result<(), CollaboratorError>;

    async fn remove(&self, image: &ImageRef) -> Result<RemoveOutcome, CollaboratorError>;

    /// Removes dangling images
    async fn prune(&self) -> Result<(), CollaboratorError>;
}

/// Exit code and combined output of a test command
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TestOutcome {
    pub exit_code: i32,
    pub output: String,
}

impl TestOutcome {
    pub fn passed(&self) -> bool {
        self.exit_code == 0
    }
}

/// Runs the test command inside the built image
#[async_trait]
pub trait TestRunner: Send + Sync {
    async fn run_in_container(
        &self,
        image: &ImageRef,
        command: &[String],
    ) -> Result<TestOutcome, CollaboratorError>;
}

/// Scans an image for vulnerabilities
#[async_trait]
pub trait Scanner: Send + Sync {
    async fn scan(&self, image: &ImageRef) -> Result<(), CollaboratorError>;
}

/// An authenticated registry session
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegistrySession {
    pub registry: String,
    pub username: String,
}

/// Registry client
#[async_trait]
pub trait Registry: Send + Sync {
    /// Authenticates with the opaque credential reference
    async fn authenticate(&self, credential: &str) -> Result<RegistrySession, CollaboratorError>;

    async fn push(&self, image: &ImageRef, session: &RegistrySession)
    -> Result<(), CollaboratorError>;
}

/// Result of a single liveness probe
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProbeResult {
    Reachable,
    Unreachable(String),
}

impl ProbeResult {
    pub fn is_reachable(&self) -> bool {
        matches!(self, ProbeResult::Reachable)
    }
}

/// Checks whether the deployed service answers
#[async_trait]
pub trait LivenessProber: Send + Sync {
    async fn probe(&self, url: &str) -> ProbeResult;
}

/// The full set of collaborators a run uses
#[derive(Clone)]
pub struct Collaborators {
    pub source: Arc<dyn SourceControl>,
    pub builder: Arc<dyn ImageBuilder>,
    pub tests: Arc<dyn TestRunner>,
    pub scanner: Arc<dyn Scanner>,
    pub registry: Arc<dyn Registry>,
    pub target: Arc<dyn DeploymentTarget>,
    pub prober: Arc<dyn LivenessProber>,
}

impl Collaborators {
    /// Wires the command line collaborators for a configuration
    ///
    /// # Arguments
    /// * `config` - Validated deployment configuration
    /// * `runner` - Executes every external command
    /// * `prober` - Liveness prober used by the verify stage
    pub fn from_config(
        config: &DeployConfig,
        runner: Arc<dyn CommandRunner>,
        prober: Arc<dyn LivenessProber>,
    ) -> Self {
        let engine = ContainerEngine::new(config.engine, config.registry.host(), runner.clone());
        Self::wire(config, runner, prober, engine)
    }

    /// Collaborators that log every external command instead of running it
    ///
    /// Probes always succeed, registry credentials resolve to placeholders and
    /// ECS task definition lookups return a placeholder definition.
    pub fn dry_run(config: &DeployConfig) -> Self {
        let runner: Arc<dyn CommandRunner> = Arc::new(
            DryRunRunner::new().answer("describe-task-definition", DRY_RUN_TASK_DEFINITION),
        );
        let engine = ContainerEngine::new(config.engine, config.registry.host(), runner.clone())
            .with_credential_lookup(|_| Some("dry-run".to_string()));
        Self::wire(config, runner, Arc::new(AlwaysReachable), engine)
    }

    fn wire(
        config: &DeployConfig,
        runner: Arc<dyn CommandRunner>,
        prober: Arc<dyn LivenessProber>,
        engine: ContainerEngine,
    ) -> Self {
        let engine = Arc::new(engine);

        Self {
            source: Arc::new(GitCheckout::new(runner.clone(), &config.source_dir)),
            builder: engine.clone(),
            tests: engine.clone(),
            scanner: Arc::new(TrivyScanner::new(runner.clone(), &config.scan.severity)),
            registry: engine,
            target: build_target(&config.strategy, config.engine, runner),
            prober,
        }
    }
}
