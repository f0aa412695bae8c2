//! Docker Swarm service update

use async_trait::async_trait;
use std::sync::Arc;
use tracing::{info, warn};

use super::{DeploySpec, DeploymentTarget};
use crate::collaborators::CollaboratorError;
use crate::process::{CommandRunner, CommandSpec};

pub struct SwarmDeployment {
    service: String,
    runner: Arc<dyn CommandRunner>,
}

impl SwarmDeployment {
    pub fn new(service: &str, runner: Arc<dyn CommandRunner>) -> Self {
        Self {
            service: service.to_string(),
            runner,
        }
    }

    fn service_name(&self, spec: &DeploySpec) -> String {
        format!("{}-{}", self.service, spec.environment)
    }
}

#[async_trait]
impl DeploymentTarget for SwarmDeployment {
    fn strategy(&self) -> &'static str {
        "swarm"
    }

    async fn deploy(&self, spec: &DeploySpec) -> Result<(), CollaboratorError> {
        let service = self.service_name(spec);
        info!("Updating service {} to {}", service, spec.image);

        // --detach=false blocks until the update converges
        let command = CommandSpec::new("docker")
            .args(["service", "update", "--image"])
            .arg(spec.image.to_string())
            .arg("--replicas")
            .arg(spec.replicas.to_string())
            .args(["--with-registry-auth", "--detach=false"])
            .arg(service);

        self.runner.run(&command).await?.check(&command)?;
        Ok(())
    }

    async fn rollback(&self, spec: &DeploySpec) -> Result<bool, CollaboratorError> {
        let service = self.service_name(spec);
        warn!("Rolling back service {}", service);

        let command = CommandSpec::new("docker")
            .args(["service", "rollback", "--detach=false"])
            .arg(service);

        self.runner.run(&command).await?.check(&command)?;
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::process::CommandOutput;
    use crate::test_support::RecordingRunner;
    use conveyor_core::domain::{Environment, ImageRef, ImageTag};

    fn spec() -> DeploySpec {
        DeploySpec {
            image: ImageRef::new(
                "registry.example.com/shop/web",
                ImageTag::from_build_number(7).unwrap(),
            ),
            environment: Environment::Staging,
            port: 3000,
            replicas: 3,
            name: "web".to_string(),
        }
    }

    #[tokio::test]
    async fn test_update_and_rollback() {
        let runner = Arc::new(RecordingRunner::new());
        let target = SwarmDeployment::new("shop", runner.clone());

        target.deploy(&spec()).await.unwrap();
        assert!(target.rollback(&spec()).await.unwrap());

        assert_eq!(
            runner.command_lines(),
            vec![
                "docker service update --image registry.example.com/shop/web:7 --replicas 3 --with-registry-auth --detach=false shop-staging",
                "docker service rollback --detach=false shop-staging",
            ]
        );
    }

    #[tokio::test]
    async fn test_update_failure() {
        let runner = Arc::new(RecordingRunner::new());
        runner.respond(Ok(CommandOutput::failed(1, "service shop-staging not found")));

        let err = SwarmDeployment::new("shop", runner)
            .deploy(&spec())
            .await
            .unwrap_err();
        assert!(err.to_string().contains("not found"));
    }
}
