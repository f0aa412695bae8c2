//! Deployment targets
//!
//! One implementation per deployment strategy. The strategy is chosen from
//! the configuration once, when the collaborators are wired; a run only ever
//! talks to the single target it was given.

mod container;
mod ecs;
mod kubernetes;
mod swarm;

pub use container::ContainerDeployment;
pub use ecs::{DRY_RUN_TASK_DEFINITION, EcsDeployment, retarget_task_definition};
pub use kubernetes::KubernetesDeployment;
pub use swarm::SwarmDeployment;

use async_trait::async_trait;
use conveyor_core::config::{Engine, StrategyConfig};
use conveyor_core::domain::{Environment, ImageRef};
use std::sync::Arc;
use std::time::Duration;

use crate::collaborators::CollaboratorError;
use crate::process::CommandRunner;

/// What to deploy and where
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeploySpec {
    pub image: ImageRef,
    pub environment: Environment,
    pub port: u16,
    pub replicas: u32,
    /// Container or service base name
    pub name: String,
}

impl DeploySpec {
    /// Base name qualified with the environment (e.g. `web-staging`)
    pub fn qualified_name(&self) -> String {
        format!("{}-{}", self.name, self.environment)
    }
}

/// A deployment strategy
#[async_trait]
pub trait DeploymentTarget: Send + Sync {
    /// Strategy name for logs and reports
    fn strategy(&self) -> &'static str;

    /// Deploys the image
    ///
    /// Returns only once the external system reports the new version as
    /// active, or fails.
    async fn deploy(&self, spec: &DeploySpec) -> Result<(), CollaboratorError>;

    /// Waits for the rollout started by [`deploy`](Self::deploy) to complete
    ///
    /// Only rolling updates have a separate rollout; other strategies are
    /// complete when `deploy` returns.
    async fn await_rollout(&self, _spec: &DeploySpec) -> Result<(), CollaboratorError> {
        Ok(())
    }

    /// Reverts to the previously deployed version
    ///
    /// Returns `false` when the strategy cannot roll back.
    async fn rollback(&self, _spec: &DeploySpec) -> Result<bool, CollaboratorError> {
        Ok(false)
    }
}

/// Builds the deployment target for a strategy
pub fn build_target(
    strategy: &StrategyConfig,
    engine: Engine,
    runner: Arc<dyn CommandRunner>,
) -> Arc<dyn DeploymentTarget> {
    match strategy {
        StrategyConfig::Container { network } => {
            Arc::new(ContainerDeployment::new(engine, network.clone(), runner))
        }
        StrategyConfig::Kubernetes {
            deployment,
            container,
            namespace,
            rollout_timeout_seconds,
            ..
        } => Arc::new(KubernetesDeployment::new(
            deployment,
            container.as_deref(),
            namespace.as_deref(),
            Duration::from_secs(*rollout_timeout_seconds),
            runner,
        )),
        StrategyConfig::Swarm { service, .. } => Arc::new(SwarmDeployment::new(service, runner)),
        StrategyConfig::Ecs {
            cluster,
            service,
            container,
            region,
        } => Arc::new(EcsDeployment::new(
            cluster,
            service,
            container.as_deref(),
            region.as_deref(),
            runner,
        )),
    }
}
