//! Configuration module
//!
//! CLI settings and the run parameters CI servers export as environment
//! variables.

use anyhow::Result;
use clap::Args;
use conveyor_core::config::DeployConfig;
use conveyor_core::domain::RunParameters;
use std::path::PathBuf;
use tracing::debug;

/// CLI configuration
#[derive(Debug, Clone)]
pub struct Config {
    /// Path of `conveyor.lua`
    pub config_path: PathBuf,
}

impl Config {
    /// Loads and validates the deployment configuration
    pub fn load_deploy_config(&self) -> Result<DeployConfig> {
        debug!("Loading configuration from {}", self.config_path.display());

        conveyor_lua::load_config(&self.config_path)
    }
}

/// Parameters identifying a run
#[derive(Args, Debug, Clone)]
pub struct RunArgs {
    /// Branch being built
    #[arg(long, env = "BRANCH_NAME")]
    pub branch: String,

    /// Build counter; becomes the image tag
    #[arg(long, env = "BUILD_NUMBER")]
    pub build_number: u64,

    /// Revision to check out; the workspace is used as-is when omitted
    #[arg(long, env = "GIT_COMMIT")]
    pub revision: Option<String>,

    /// Change request id; marks a pull request build
    #[arg(long, env = "CHANGE_ID")]
    pub change_id: Option<String>,
}

impl From<RunArgs> for RunParameters {
    fn from(args: RunArgs) -> Self {
        RunParameters {
            branch: args.branch,
            build_number: args.build_number,
            revision: args.revision,
            change_id: args.change_id,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_load_deploy_config() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(conveyor_lua::STARTER_CONFIG.as_bytes())
            .unwrap();

        let config = Config {
            config_path: file.path().to_path_buf(),
        };
        let deploy = config.load_deploy_config().unwrap();
        assert_eq!(deploy.image, "shop/web");
    }

    #[test]
    fn test_missing_config_names_path() {
        let config = Config {
            config_path: PathBuf::from("/nonexistent/conveyor.lua"),
        };
        let err = config.load_deploy_config().unwrap_err();
        assert!(format!("{:#}", err).contains("/nonexistent/conveyor.lua"));
    }

    #[test]
    fn test_run_args_into_parameters() {
        let params: RunParameters = RunArgs {
            branch: "main".to_string(),
            build_number: 42,
            revision: Some("abc".to_string()),
            change_id: None,
        }
        .into();
        assert_eq!(params.build_number, 42);
        assert_eq!(params.revision.as_deref(), Some("abc"));
    }
}
