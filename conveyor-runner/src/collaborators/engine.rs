//! Container engine collaborator
//!
//! Drives the docker or podman CLI for everything that touches images:
//! - Building and tagging the application image
//! - Running the test command in a throwaway container
//! - Registry login and push
//! - Removing images during cleanup

use async_trait::async_trait;
use conveyor_core::config::Engine;
use conveyor_core::domain::ImageRef;
use std::sync::Arc;
use tracing::{debug, info};

use super::{
    CollaboratorError, ImageBuilder, Registry, RegistrySession, RemoveOutcome, TestOutcome,
    TestRunner,
};
use crate::process::{CommandRunner, CommandSpec};

/// Resolves environment-style variable names to values
pub type CredentialLookup = Arc<dyn Fn(&str) -> Option<String> + Send + Sync>;

/// Container engine driven through its CLI
pub struct ContainerEngine {
    engine: Engine,
    registry: String,
    runner: Arc<dyn CommandRunner>,
    lookup: CredentialLookup,
}

impl ContainerEngine {
    /// Creates an engine collaborator
    ///
    /// # Arguments
    /// * `engine` - docker or podman
    /// * `registry` - Registry host used for login
    /// * `runner` - Command runner
    pub fn new(engine: Engine, registry: &str, runner: Arc<dyn CommandRunner>) -> Self {
        Self {
            engine,
            registry: registry.to_string(),
            runner,
            lookup: Arc::new(|name: &str| std::env::var(name).ok()),
        }
    }

    /// Replaces the process environment as the source of credentials
    pub fn with_credential_lookup(
        mut self,
        lookup: impl Fn(&str) -> Option<String> + Send + Sync + 'static,
    ) -> Self {
        self.lookup = Arc::new(lookup);
        self
    }

    fn command(&self) -> CommandSpec {
        CommandSpec::new(self.engine.program())
    }
}

/// Resolves a credential reference to a username and password
///
/// A reference `NAME` resolves through `NAME_USR` and `NAME_PSW`, the
/// variables CI servers bind for username/password credentials.
pub fn resolve_credential(
    reference: &str,
    lookup: impl Fn(&str) -> Option<String>,
) -> Result<(String, String), CollaboratorError> {
    let username = lookup(&format!("{}_USR", reference));
    let password = lookup(&format!("{}_PSW", reference));

    match (username, password) {
        (Some(user), Some(pass)) if !user.is_empty() && !pass.is_empty() => Ok((user, pass)),
        _ => Err(CollaboratorError::MissingCredential(reference.to_string())),
    }
}

/// Whether registry output describes an authentication problem
fn is_auth_failure(detail: &str) -> bool {
    let detail = detail.to_lowercase();
    ["unauthorized", "denied", "authentication required", "forbidden"]
        .iter()
        .any(|needle| detail.contains(needle))
}

/// Whether engine output says a container still uses the image
fn is_image_in_use(detail: &str) -> bool {
    let detail = detail.to_lowercase();
    ["conflict", "is using its referenced image", "image is in use"]
        .iter()
        .any(|needle| detail.contains(needle))
}

/// Whether engine output describes a missing image
fn is_missing_image(detail: &str) -> bool {
    let detail = detail.to_lowercase();
    ["no such image", "image not known", "not found"]
        .iter()
        .any(|needle| detail.contains(needle))
}

#[async_trait]
impl ImageBuilder for ContainerEngine {
    async fn build(&self, source: &str, image: &ImageRef) -> Result<ImageRef, CollaboratorError> {
        info!("Building image {} from {}", image, source);

        let command = self
            .command()
            .args(["build", "--tag"])
            .arg(image.to_string())
            .arg(source);

        self.runner.run(&command).await?.check(&command)?;
        Ok(image.clone())
    }

    async fn tag(&self, image: &ImageRef, alias: &ImageRef) -> Result<(), CollaboratorError> {
        debug!("Tagging {} as {}", image, alias);

        let command = self
            .command()
            .arg("tag")
            .arg(image.to_string())
            .arg(alias.to_string());

        self.runner.run(&command).await?.check(&command)?;
        Ok(())
    }

    async fn remove(&self, image: &ImageRef) -> Result<RemoveOutcome, CollaboratorError> {
        let command = self.command().args(["image", "rm"]).arg(image.to_string());
        let output = self.runner.run(&command).await?;

        if output.success() {
            debug!("Removed image {}", image);
            return Ok(RemoveOutcome::Removed);
        }
        if is_missing_image(&output.stderr) {
            debug!("Image {} already gone", image);
            return Ok(RemoveOutcome::NotFound);
        }
        if is_image_in_use(&output.stderr) {
            debug!("Image {} is used by a container, keeping it", image);
            return Ok(RemoveOutcome::InUse);
        }

        output.check(&command).map(|_| RemoveOutcome::Removed)
    }

    async fn prune(&self) -> Result<(), CollaboratorError> {
        let command = self.command().args(["image", "prune", "--force"]);
        self.runner.run(&command).await?.check(&command)?;
        Ok(())
    }
}

#[async_trait]
impl TestRunner for ContainerEngine {
    async fn run_in_container(
        &self,
        image: &ImageRef,
        command: &[String],
    ) -> Result<TestOutcome, CollaboratorError> {
        info!("Running tests in {}", image);

        let spec = self
            .command()
            .args(["run", "--rm"])
            .arg(image.to_string())
            .args(command.iter().cloned());

        let output = self.runner.run(&spec).await?;

        let mut combined = output.stdout;
        if !output.stderr.is_empty() {
            if !combined.is_empty() && !combined.ends_with('\n') {
                combined.push('\n');
            }
            combined.push_str(&output.stderr);
        }

        Ok(TestOutcome {
            exit_code: output.exit_code,
            output: combined,
        })
    }
}

#[async_trait]
impl Registry for ContainerEngine {
    async fn authenticate(&self, credential: &str) -> Result<RegistrySession, CollaboratorError> {
        let (username, password) = resolve_credential(credential, |name| (self.lookup)(name))?;

        info!("Logging in to {} as {}", self.registry, username);

        let command = self
            .command()
            .arg("login")
            .arg(&self.registry)
            .args(["--username", username.as_str(), "--password-stdin"])
            .stdin(password);

        let output = self.runner.run(&command).await?;
        if !output.success() && is_auth_failure(&output.stderr) {
            return Err(CollaboratorError::Denied(output.detail()));
        }
        output.check(&command)?;

        Ok(RegistrySession {
            registry: self.registry.clone(),
            username,
        })
    }

    async fn push(
        &self,
        image: &ImageRef,
        session: &RegistrySession,
    ) -> Result<(), CollaboratorError> {
        info!("Pushing {} to {}", image, session.registry);

        let command = self.command().arg("push").arg(image.to_string());
        let output = self.runner.run(&command).await?;

        if !output.success() && is_auth_failure(&output.stderr) {
            return Err(CollaboratorError::Denied(output.detail()));
        }
        output.check(&command)?;
        Ok(())
    }
}
