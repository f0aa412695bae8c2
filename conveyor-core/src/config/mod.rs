//! Deployment configuration
//!
//! The structure a `conveyor.lua` file evaluates to. Every section except
//! `image`, `registry` and `strategy` has defaults, so a minimal file only
//! names the image, where it is pushed and how it is deployed.

mod strategy;

pub use strategy::StrategyConfig;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// Number of liveness probes made after a deploy
pub const VERIFY_ATTEMPTS: u32 = 3;

/// Complete deployment configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeployConfig {
    /// Image name without registry or tag (e.g. `shop/web`)
    pub image: String,

    /// Container engine used for build, test, push and cleanup
    #[serde(default)]
    pub engine: Engine,

    /// Build context directory
    #[serde(default = "default_source_dir")]
    pub source_dir: String,

    pub registry: RegistryConfig,

    #[serde(default)]
    pub app: AppConfig,

    #[serde(default)]
    pub test: TestConfig,

    #[serde(default)]
    pub scan: ScanConfig,

    #[serde(default)]
    pub verify: VerifyConfig,

    pub strategy: StrategyConfig,

    #[serde(default)]
    pub cleanup: CleanupConfig,

    /// Upper bound for any single external command
    #[serde(default = "default_command_timeout")]
    pub command_timeout_seconds: u64,
}

impl DeployConfig {
    /// Validates the configuration
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.image.trim().is_empty() {
            return Err(ConfigError::MissingField("image"));
        }
        if !self
            .image
            .chars()
            .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || matches!(c, '/' | '.' | '_' | '-'))
        {
            return Err(ConfigError::invalid(
                "image",
                "may only contain lowercase letters, digits, '/', '.', '_' and '-'",
            ));
        }
        if self.source_dir.trim().is_empty() {
            return Err(ConfigError::MissingField("source_dir"));
        }
        if self.command_timeout_seconds == 0 {
            return Err(ConfigError::invalid(
                "command_timeout_seconds",
                "must be greater than 0",
            ));
        }

        self.registry.validate()?;
        self.app.validate()?;
        self.test.validate()?;
        self.scan.validate()?;
        self.verify.validate()?;
        self.strategy.validate()?;

        Ok(())
    }
}

/// Container engine CLI
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Engine {
    #[default]
    Docker,
    Podman,
}

impl Engine {
    /// Name of the engine executable
    pub fn program(&self) -> &'static str {
        match self {
            Engine::Docker => "docker",
            Engine::Podman => "podman",
        }
    }
}

/// Registry the built image is pushed to
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegistryConfig {
    /// Registry URL (e.g. `https://registry.example.com` or `ghcr.io/acme`)
    pub url: String,

    /// Opaque credential reference handed to the registry client
    pub credential: String,
}

impl RegistryConfig {
    fn validate(&self) -> Result<(), ConfigError> {
        if self.url.trim().is_empty() {
            return Err(ConfigError::MissingField("registry.url"));
        }
        if self.host().is_empty() {
            return Err(ConfigError::invalid("registry.url", "no registry host"));
        }
        if self.credential.trim().is_empty() {
            return Err(ConfigError::MissingField("registry.credential"));
        }
        Ok(())
    }

    /// Registry host and path prefix without scheme or trailing slash
    pub fn host(&self) -> &str {
        let url = self.url.trim();
        url.strip_prefix("https://")
            .or_else(|| url.strip_prefix("http://"))
            .unwrap_or(url)
            .trim_end_matches('/')
    }
}

/// The deployed application
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// Port the application listens on
    pub port: u16,

    /// Container or service base name; defaults to the last image path segment
    pub container_name: Option<String>,

    /// Path probed after deploy
    pub health_path: String,

    /// Full probe URL; overrides `http://localhost:<port><health_path>`
    pub health_url: Option<String>,

    /// Desired replica count for strategies that support it
    pub replicas: u32,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            port: 3000,
            container_name: None,
            health_path: "/".to_string(),
            health_url: None,
            replicas: 1,
        }
    }
}

impl AppConfig {
    fn validate(&self) -> Result<(), ConfigError> {
        if self.port == 0 {
            return Err(ConfigError::invalid("app.port", "must be greater than 0"));
        }
        if self
            .container_name
            .as_deref()
            .is_some_and(|name| name.trim().is_empty())
        {
            return Err(ConfigError::invalid("app.container_name", "cannot be empty"));
        }
        if !self.health_path.starts_with('/') {
            return Err(ConfigError::invalid("app.health_path", "must start with '/'"));
        }
        if self
            .health_url
            .as_deref()
            .is_some_and(|url| !url.starts_with("http://") && !url.starts_with("https://"))
        {
            return Err(ConfigError::invalid(
                "app.health_url",
                "must start with http:// or https://",
            ));
        }
        if self.replicas == 0 {
            return Err(ConfigError::invalid("app.replicas", "must be greater than 0"));
        }
        Ok(())
    }
}

/// Test stage settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TestConfig {
    /// Command run inside the built image, as an argument vector
    pub command: Vec<String>,
}

impl Default for TestConfig {
    fn default() -> Self {
        Self {
            command: vec!["npm".to_string(), "test".to_string()],
        }
    }
}

impl TestConfig {
    fn validate(&self) -> Result<(), ConfigError> {
        match self.command.first() {
            Some(program) if !program.trim().is_empty() => Ok(()),
            _ => Err(ConfigError::MissingField("test.command")),
        }
    }
}

/// Scan stage settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScanConfig {
    /// Skip the scan stage entirely when false
    pub enabled: bool,

    /// Findings are reported but do not fail the run
    pub advisory: bool,

    /// Comma separated severities that fail the scan
    pub severity: String,
}

impl Default for ScanConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            advisory: false,
            severity: "HIGH,CRITICAL".to_string(),
        }
    }
}

impl ScanConfig {
    fn validate(&self) -> Result<(), ConfigError> {
        if self.enabled && self.severity.trim().is_empty() {
            return Err(ConfigError::MissingField("scan.severity"));
        }
        Ok(())
    }
}

/// Post-deploy verification settings
///
/// The attempt count is fixed at [`VERIFY_ATTEMPTS`]; only the delay and the
/// per-probe timeout are tunable.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct VerifyConfig {
    /// Fixed wait before every probe
    pub delay_seconds: u64,

    /// Timeout of a single probe request
    pub probe_timeout_seconds: u64,
}

impl Default for VerifyConfig {
    fn default() -> Self {
        Self {
            delay_seconds: 10,
            probe_timeout_seconds: 5,
        }
    }
}

impl VerifyConfig {
    fn validate(&self) -> Result<(), ConfigError> {
        if self.probe_timeout_seconds == 0 {
            return Err(ConfigError::invalid(
                "verify.probe_timeout_seconds",
                "must be greater than 0",
            ));
        }
        Ok(())
    }
}

/// Cleanup stage settings
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CleanupConfig {
    /// Also prune dangling images
    pub prune: bool,
}

fn default_source_dir() -> String {
    ".".to_string()
}

fn default_command_timeout() -> u64 {
    1800
}
