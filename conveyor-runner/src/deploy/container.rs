//! Single-host container deployment
//!
//! Replaces the running container for an environment:
//! - Force-removing the previous container (a missing one is fine)
//! - Starting the new image detached with the application port published
//! - Confirming the engine reports the container as running

use async_trait::async_trait;
use conveyor_core::config::Engine;
use std::sync::Arc;
use tracing::{debug, info};

use super::{DeploySpec, DeploymentTarget};
use crate::collaborators::CollaboratorError;
use crate::process::{CommandRunner, CommandSpec};

pub struct ContainerDeployment {
    engine: Engine,
    network: Option<String>,
    runner: Arc<dyn CommandRunner>,
}

impl ContainerDeployment {
    pub fn new(engine: Engine, network: Option<String>, runner: Arc<dyn CommandRunner>) -> Self {
        Self {
            engine,
            network,
            runner,
        }
    }

    fn command(&self) -> CommandSpec {
        CommandSpec::new(self.engine.program())
    }
}

#[async_trait]
impl DeploymentTarget for ContainerDeployment {
    fn strategy(&self) -> &'static str {
        "container"
    }

    async fn deploy(&self, spec: &DeploySpec) -> Result<(), CollaboratorError> {
        let name = spec.qualified_name();
        info!("Replacing container {} with {}", name, spec.image);

        // Removal of a container that does not exist fails; that is expected
        let remove = self.command().args(["rm", "--force", name.as_str()]);
        let removed = self.runner.run(&remove).await?;
        debug!("Previous container removal exit_code={}", removed.exit_code);

        let mut run = self
            .command()
            .args(["run", "--detach", "--name", name.as_str()])
            .args(["--restart", "unless-stopped"])
            .arg("--publish")
            .arg(format!("{}:{}", spec.port, spec.port))
            .arg("--env")
            .arg(format!("APP_ENV={}", spec.environment));
        if let Some(network) = &self.network {
            run = run.args(["--network", network.as_str()]);
        }
        let run = run.arg(spec.image.to_string());

        let started = self.runner.run(&run).await?.check(&run)?;
        info!("Container {} started: {}", name, started.stdout.trim());

        let inspect = self.command().args([
            "container",
            "inspect",
            "--format",
            "{{.State.Running}}",
            name.as_str(),
        ]);
        let state = self.runner.run(&inspect).await?.check(&inspect)?;

        if state.stdout.trim() != "true" {
            return Err(CollaboratorError::CommandFailed {
                command: inspect.to_string(),
                exit_code: state.exit_code,
                detail: format!("container {} is not running", name),
            });
        }

        Ok(())
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
                ImageTag::from_build_number(42).unwrap(),
            ),
            environment: Environment::Production,
            port: 3000,
            replicas: 1,
            name: "web".to_string(),
        }
    }

    #[tokio::test]
    async fn test_deploy_replaces_container() {
        let runner = Arc::new(RecordingRunner::new());
        runner.respond(Ok(CommandOutput::failed(1, "no such container")));
        runner.respond(Ok(CommandOutput::ok("c0ffee\n")));
        runner.respond(Ok(CommandOutput::ok("true\n")));

        let target = ContainerDeployment::new(Engine::Docker, Some("edge".to_string()), runner.clone());
        target.deploy(&spec()).await.unwrap();

        assert_eq!(
            runner.command_lines(),
            vec![
                "docker rm --force web-production",
                "docker run --detach --name web-production --restart unless-stopped --publish 3000:3000 --env APP_ENV=production --network edge registry.example.com/shop/web:42",
                "docker container inspect --format {{.State.Running}} web-production",
            ]
        );
    }

    #[tokio::test]
    async fn test_deploy_fails_when_not_running() {
        let runner = Arc::new(RecordingRunner::new());
        runner.respond(Ok(CommandOutput::ok("")));
        runner.respond(Ok(CommandOutput::ok("c0ffee\n")));
        runner.respond(Ok(CommandOutput::ok("false\n")));

        let target = ContainerDeployment::new(Engine::Podman, None, runner);
        let err = target.deploy(&spec()).await.unwrap_err();
        assert!(err.to_string().contains("is not running"));
    }

    #[tokio::test]
    async fn test_deploy_fails_when_run_fails() {
        let runner = Arc::new(RecordingRunner::new());
        runner.respond(Ok(CommandOutput::ok("")));
        runner.respond(Ok(CommandOutput::failed(125, "port is already allocated")));

        let target = ContainerDeployment::new(Engine::Docker, None, runner.clone());
        assert!(target.deploy(&spec()).await.is_err());
        assert_eq!(runner.calls().len(), 2);
    }

    #[tokio::test]
    async fn test_container_cannot_roll_back() {
        let runner = Arc::new(RecordingRunner::new());
        let target = ContainerDeployment::new(Engine::Docker, None, runner);
        assert!(!target.rollback(&spec()).await.unwrap());
    }
}
