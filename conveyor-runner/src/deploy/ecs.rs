//! AWS ECS service deployment
//!
//! Pins the service to the new image and waits until ECS reports it stable:
//! - Looks up the task definition the service currently runs
//! - Registers a new revision with the application container's image replaced
//! - Points the service at that revision and waits for `services-stable`

use async_trait::async_trait;
use conveyor_core::domain::ImageRef;
use serde_json::Value;
use std::sync::Arc;
use tracing::{debug, info};

use super::{DeploySpec, DeploymentTarget};
use crate::collaborators::CollaboratorError;
use crate::process::{CommandRunner, CommandSpec};

/// Task definition returned for `describe-task-definition` in dry runs
pub const DRY_RUN_TASK_DEFINITION: &str =
    r#"{"family":"dry-run","containerDefinitions":[{"name":"app","image":"dry-run"}]}"#;

/// Fields `describe-task-definition` returns that `register-task-definition` rejects
const READ_ONLY_FIELDS: [&str; 8] = [
    "taskDefinitionArn",
    "revision",
    "status",
    "requiresAttributes",
    "compatibilities",
    "registeredAt",
    "registeredBy",
    "deregisteredAt",
];

pub struct EcsDeployment {
    cluster: String,
    service: String,
    container: String,
    region: Option<String>,
    runner: Arc<dyn CommandRunner>,
}

impl EcsDeployment {
    /// Creates an ECS target
    ///
    /// `container` names the container definition to update and defaults to
    /// the service base name.
    pub fn new(
        cluster: &str,
        service: &str,
        container: Option<&str>,
        region: Option<&str>,
        runner: Arc<dyn CommandRunner>,
    ) -> Self {
        Self {
            cluster: cluster.to_string(),
            service: service.to_string(),
            container: container.unwrap_or(service).to_string(),
            region: region.map(str::to_string),
            runner,
        }
    }

    fn aws(&self) -> CommandSpec {
        let command = CommandSpec::new("aws").arg("ecs");
        match &self.region {
            Some(region) => command.args(["--region", region.as_str()]),
            None => command,
        }
    }

    async fn text(&self, command: &CommandSpec) -> Result<String, CollaboratorError> {
        let output = self.runner.run(command).await?.check(command)?;
        let value = output.stdout.trim();

        if value.is_empty() || value == "None" {
            return Err(CollaboratorError::UnexpectedOutput {
                command: command.to_string(),
                detail: "empty response".to_string(),
            });
        }
        Ok(value.to_string())
    }

    /// Registers a revision of the service's task definition running `image`
    async fn register_revision(
        &self,
        service: &str,
        image: &ImageRef,
    ) -> Result<String, CollaboratorError> {
        let current = self
            .aws()
            .args(["describe-services", "--cluster", self.cluster.as_str()])
            .args(["--services", service])
            .args(["--query", "services[0].taskDefinition", "--output", "text"]);
        let current_arn = self.text(&current).await?;
        debug!("Service {} runs {}", service, current_arn);

        let describe = self
            .aws()
            .args(["describe-task-definition", "--task-definition"])
            .arg(current_arn.as_str())
            .args(["--query", "taskDefinition", "--output", "json"]);
        let definition = self.runner.run(&describe).await?.check(&describe)?;

        let input = retarget_task_definition(&definition.stdout, &self.container, image)
            .map_err(|detail| CollaboratorError::UnexpectedOutput {
                command: describe.to_string(),
                detail,
            })?;

        let register = self
            .aws()
            .args(["register-task-definition", "--cli-input-json", "file:///dev/stdin"])
            .args(["--query", "taskDefinition.taskDefinitionArn", "--output", "text"])
            .stdin(input);
        let arn = self.text(&register).await?;

        info!("Registered {} for {}", arn, image);
        Ok(arn)
    }
}

/// Rewrites a described task definition into registration input for `image`
///
/// The container definition named `container` gets the new image; a task
/// definition with a single container uses that container whatever its name.
pub fn retarget_task_definition(
    definition: &str,
    container: &str,
    image: &ImageRef,
) -> Result<String, String> {
    let mut definition: Value =
        serde_json::from_str(definition).map_err(|e| format!("invalid task definition: {}", e))?;

    let fields = definition
        .as_object_mut()
        .ok_or_else(|| "task definition is not an object".to_string())?;
    for field in READ_ONLY_FIELDS {
        fields.remove(field);
    }

    let containers = fields
        .get_mut("containerDefinitions")
        .and_then(Value::as_array_mut)
        .ok_or_else(|| "task definition has no container definitions".to_string())?;

    let index = match containers
        .iter()
        .position(|c| c.get("name").and_then(Value::as_str) == Some(container))
    {
        Some(index) => index,
        None if containers.len() == 1 => 0,
        None => return Err(format!("no container definition named '{}'", container)),
    };

    let target = containers[index]
        .as_object_mut()
        .ok_or_else(|| "container definition is not an object".to_string())?;
    target.insert("image".to_string(), Value::String(image.to_string()));

    serde_json::to_string(&definition).map_err(|e| e.to_string())
}

#[async_trait]
impl DeploymentTarget for EcsDeployment {
    fn strategy(&self) -> &'static str {
        "ecs"
    }

    async fn deploy(&self, spec: &DeploySpec) -> Result<(), CollaboratorError> {
        let service = spec.qualified_name();
        info!(
            "Deploying {} to ECS service {} in cluster {}",
            spec.image, service, self.cluster
        );

        let task_definition = self.register_revision(&service, &spec.image).await?;

        let update = self
            .aws()
            .args(["update-service", "--cluster", self.cluster.as_str()])
            .args(["--service", service.as_str()])
            .args(["--task-definition", task_definition.as_str()])
            .arg("--desired-count")
            .arg(spec.replicas.to_string());
        self.runner.run(&update).await?.check(&update)?;

        let wait = self
            .aws()
            .args(["wait", "services-stable", "--cluster", self.cluster.as_str()])
            .args(["--services", service.as_str()]);
        self.runner.run(&wait).await?.check(&wait)?;

        info!("ECS service {} is stable on {}", service, task_definition);
        Ok(())
    }
}
