//! Run context
//!
//! The immutable configuration bag every stage of a run reads from. It is
//! built once from the run parameters and the deployment configuration and
//! never changes afterwards; all fields are private and only exposed through
//! accessors.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::environment::{Environment, Trigger};
use super::image::{ImageRef, ImageTag};
use crate::config::DeployConfig;
use crate::error::ConfigError;

/// Inputs identifying one run, as exported by the CI server
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunParameters {
    pub branch: String,
    pub build_number: u64,
    /// Source revision to check out; `None` uses the workspace as-is
    pub revision: Option<String>,
    /// Change request id; present only for pull request builds
    pub change_id: Option<String>,
}

/// Immutable per-run context
#[derive(Debug, Clone, Serialize)]
pub struct PipelineContext {
    run_id: Uuid,
    image_name: String,
    tag: ImageTag,
    registry_host: String,
    registry_credential: String,
    branch: String,
    environment: Environment,
    trigger: Trigger,
    revision: Option<String>,
    port: u16,
    container_name: String,
    health_url: String,
}

impl PipelineContext {
    /// Builds the context for a run
    ///
    /// The configuration is validated first; the tag is derived from the
    /// build number and the environment from the branch.
    pub fn new(params: RunParameters, config: &DeployConfig) -> Result<Self, ConfigError> {
        config.validate()?;

        let tag = ImageTag::from_build_number(params.build_number)?;
        let environment = Environment::from_branch(&params.branch);
        let trigger = Trigger::from_change_id(params.change_id.as_deref());

        let container_name = config
            .app
            .container_name
            .clone()
            .unwrap_or_else(|| default_container_name(&config.image));

        let health_url = config.app.health_url.clone().unwrap_or_else(|| {
            format!(
                "http://localhost:{}{}",
                config.app.port, config.app.health_path
            )
        });

        let revision = params
            .revision
            .map(|r| r.trim().to_string())
            .filter(|r| !r.is_empty());

        Ok(Self {
            run_id: Uuid::new_v4(),
            image_name: config.image.clone(),
            tag,
            registry_host: config.registry.host().to_string(),
            registry_credential: config.registry.credential.clone(),
            branch: params.branch,
            environment,
            trigger,
            revision,
            port: config.app.port,
            container_name,
            health_url,
        })
    }

    pub fn run_id(&self) -> Uuid {
        self.run_id
    }

    pub fn image_name(&self) -> &str {
        &self.image_name
    }

    pub fn tag(&self) -> &ImageTag {
        &self.tag
    }

    pub fn registry_host(&self) -> &str {
        &self.registry_host
    }

    /// Opaque credential reference, passed to the registry client unmodified
    pub fn registry_credential(&self) -> &str {
        &self.registry_credential
    }

    pub fn branch(&self) -> &str {
        &self.branch
    }

    pub fn environment(&self) -> Environment {
        self.environment
    }

    pub fn trigger(&self) -> &Trigger {
        &self.trigger
    }

    pub fn revision(&self) -> Option<&str> {
        self.revision.as_deref()
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    pub fn container_name(&self) -> &str {
        &self.container_name
    }

    pub fn health_url(&self) -> &str {
        &self.health_url
    }

    /// Image as built locally (`<image>:<tag>`)
    pub fn local_image(&self) -> ImageRef {
        ImageRef::new(self.image_name.clone(), self.tag.clone())
    }

    /// Image as pushed to the registry (`<registry>/<image>:<tag>`)
    pub fn registry_image(&self) -> ImageRef {
        ImageRef::new(
            format!("{}/{}", self.registry_host, self.image_name),
            self.tag.clone(),
        )
    }

    /// Registry image under the `latest` alias
    pub fn registry_latest(&self) -> ImageRef {
        self.registry_image().with_tag(ImageTag::latest())
    }
}

/// Last path segment of the image name
fn default_container_name(image: &str) -> String {
    image.rsplit('/').next().unwrap_or(image).to_string()
}
