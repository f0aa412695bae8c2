//! Rolling update of a Kubernetes deployment
//!
//! The image of one container in the deployment is replaced with
//! `kubectl set image`, then `kubectl rollout status` waits for the cluster
//! to report the rollout complete. Waiting is bounded: running out of time is
//! reported as [`CollaboratorError::Timeout`].

use async_trait::async_trait;
use conveyor_core::config::StrategyConfig;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

use super::{DeploySpec, DeploymentTarget};
use crate::collaborators::CollaboratorError;
use crate::process::{CommandRunner, CommandSpec};

/// Extra time given to kubectl beyond its own rollout timeout
const KUBECTL_GRACE: Duration = Duration::from_secs(30);

pub struct KubernetesDeployment {
    deployment: String,
    container: String,
    namespace: Option<String>,
    rollout_timeout: Duration,
    runner: Arc<dyn CommandRunner>,
}

impl KubernetesDeployment {
    /// Creates a rolling update target
    ///
    /// # Arguments
    /// * `deployment` - Deployment name
    /// * `container` - Container in the pod spec, defaults to the deployment name
    /// * `namespace` - Namespace, defaults to the environment name
    /// * `rollout_timeout` - Bound on waiting for the rollout
    /// * `runner` - Command runner
    pub fn new(
        deployment: &str,
        container: Option<&str>,
        namespace: Option<&str>,
        rollout_timeout: Duration,
        runner: Arc<dyn CommandRunner>,
    ) -> Self {
        Self {
            deployment: deployment.to_string(),
            container: container.unwrap_or(deployment).to_string(),
            namespace: namespace.map(str::to_string),
            rollout_timeout,
            runner,
        }
    }

    fn resource(&self) -> String {
        format!("deployment/{}", self.deployment)
    }

    fn kubectl(&self, spec: &DeploySpec) -> CommandSpec {
        let namespace = StrategyConfig::namespace_for(self.namespace.as_deref(), spec.environment);
        CommandSpec::new("kubectl").args(["--namespace".to_string(), namespace])
    }

    fn timeout_error(&self) -> CollaboratorError {
        CollaboratorError::Timeout {
            operation: self.resource(),
            after_secs: self.rollout_timeout.as_secs(),
        }
    }
}

/// Whether kubectl output reports an expired rollout wait
fn is_rollout_timeout(detail: &str) -> bool {
    let detail = detail.to_lowercase();
    detail.contains("timed out waiting") || detail.contains("exceeded its progress deadline")
}

#[async_trait]
impl DeploymentTarget for KubernetesDeployment {
    fn strategy(&self) -> &'static str {
        "kubernetes"
    }

    async fn deploy(&self, spec: &DeploySpec) -> Result<(), CollaboratorError> {
        info!(
            "Updating {} container {} to {} in {}",
            self.resource(),
            self.container,
            spec.image,
            spec.environment
        );

        let command = self
            .kubectl(spec)
            .args(["set", "image"])
            .arg(self.resource())
            .arg(format!("{}={}", self.container, spec.image));

        self.runner.run(&command).await?.check(&command)?;
        Ok(())
    }

    async fn await_rollout(&self, spec: &DeploySpec) -> Result<(), CollaboratorError> {
        info!(
            "Waiting up to {}s for rollout of {}",
            self.rollout_timeout.as_secs(),
            self.resource()
        );

        let command = self
            .kubectl(spec)
            .args(["rollout", "status"])
            .arg(self.resource())
            .arg(format!("--timeout={}s", self.rollout_timeout.as_secs()))
            .timeout(self.rollout_timeout + KUBECTL_GRACE);

        let output = match self.runner.run(&command).await {
            Ok(output) => output,
            Err(CollaboratorError::Timeout { .. }) => return Err(self.timeout_error()),
            Err(e) => return Err(e),
        };

        if !output.success() && is_rollout_timeout(&output.detail()) {
            warn!("Rollout of {} timed out", self.resource());
            return Err(self.timeout_error());
        }
        output.check(&command)?;

        info!("Rollout of {} complete", self.resource());
        Ok(())
    }

    async fn rollback(&self, spec: &DeploySpec) -> Result<bool, CollaboratorError> {
        warn!("Rolling back {}", self.resource());

        let command = self
            .kubectl(spec)
            .args(["rollout", "undo"])
            .arg(self.resource());

        self.runner.run(&command).await?.check(&command)?;
        Ok(true)
    }
}
