//! Deployment strategy selection

use serde::{Deserialize, Serialize};

use crate::domain::Environment;
use crate::error::ConfigError;

/// Default bound on waiting for a cluster rollout
pub const DEFAULT_ROLLOUT_TIMEOUT_SECS: u64 = 300;

/// The one deployment strategy a configuration uses
///
/// Exactly one variant is chosen per configuration file; a run never
/// switches strategies.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum StrategyConfig {
    /// Replace a single container on the local host
    Container {
        /// Extra network to attach the container to
        #[serde(default)]
        network: Option<String>,
    },

    /// Rolling update of a cluster deployment via kubectl
    Kubernetes {
        deployment: String,
        /// Container inside the pod spec; defaults to the deployment name
        #[serde(default)]
        container: Option<String>,
        /// Namespace; defaults to the environment name
        #[serde(default)]
        namespace: Option<String>,
        #[serde(default = "default_rollout_timeout")]
        rollout_timeout_seconds: u64,
        #[serde(default)]
        rollback_on_failure: bool,
    },

    /// Service update on a swarm cluster
    Swarm {
        /// Service base name; the environment is appended
        service: String,
        #[serde(default)]
        rollback_on_failure: bool,
    },

    /// Managed cloud container service update (ECS)
    Ecs {
        cluster: String,
        /// Service base name; the environment is appended
        service: String,
        /// Container definition to update; defaults to the service base name
        #[serde(default)]
        container: Option<String>,
        #[serde(default)]
        region: Option<String>,
    },
}

impl StrategyConfig {
    pub fn name(&self) -> &'static str {
        match self {
            StrategyConfig::Container { .. } => "container",
            StrategyConfig::Kubernetes { .. } => "kubernetes",
            StrategyConfig::Swarm { .. } => "swarm",
            StrategyConfig::Ecs { .. } => "ecs",
        }
    }

    /// Whether a failed verification should roll the deployment back
    pub fn rollback_on_failure(&self) -> bool {
        match self {
            StrategyConfig::Kubernetes {
                rollback_on_failure,
                ..
            }
            | StrategyConfig::Swarm {
                rollback_on_failure,
                ..
            } => *rollback_on_failure,
            _ => false,
        }
    }

    /// Kubernetes namespace for an environment
    pub fn namespace_for(namespace: Option<&str>, environment: Environment) -> String {
        namespace
            .map(str::to_string)
            .unwrap_or_else(|| environment.as_str().to_string())
    }

    pub(crate) fn validate(&self) -> Result<(), ConfigError> {
        match self {
            StrategyConfig::Container { network } => {
                if network.as_deref().is_some_and(|n| n.trim().is_empty()) {
                    return Err(ConfigError::invalid("strategy.network", "cannot be empty"));
                }
            }
            StrategyConfig::Kubernetes {
                deployment,
                rollout_timeout_seconds,
                ..
            } => {
                if deployment.trim().is_empty() {
                    return Err(ConfigError::MissingField("strategy.deployment"));
                }
                if *rollout_timeout_seconds == 0 {
                    return Err(ConfigError::invalid(
                        "strategy.rollout_timeout_seconds",
                        "must be greater than 0",
                    ));
                }
            }
            StrategyConfig::Swarm { service, .. } => {
                if service.trim().is_empty() {
                    return Err(ConfigError::MissingField("strategy.service"));
                }
            }
            StrategyConfig::Ecs {
                cluster, service, ..
            } => {
                if cluster.trim().is_empty() {
                    return Err(ConfigError::MissingField("strategy.cluster"));
                }
                if service.trim().is_empty() {
                    return Err(ConfigError::MissingField("strategy.service"));
                }
            }
        }
        Ok(())
    }
}

fn default_rollout_timeout() -> u64 {
    DEFAULT_ROLLOUT_TIMEOUT_SECS
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_kubernetes_defaults() {
        let strategy: StrategyConfig =
            serde_json::from_value(json!({ "kind": "kubernetes", "deployment": "web" })).unwrap();

        match &strategy {
            StrategyConfig::Kubernetes {
                rollout_timeout_seconds,
                rollback_on_failure,
                namespace,
                ..
            } => {
                assert_eq!(*rollout_timeout_seconds, 300);
                assert!(!rollback_on_failure);
                assert!(namespace.is_none());
            }
            other => panic!("unexpected strategy {:?}", other),
        }
        assert_eq!(strategy.name(), "kubernetes");
        assert!(strategy.validate().is_ok());
    }

    #[test]
    fn test_unknown_kind_rejected() {
        let result: Result<StrategyConfig, _> =
            serde_json::from_value(json!({ "kind": "nomad", "job": "web" }));
        assert!(result.is_err());
    }

    #[test]
    fn test_strategy_validation() {
        let swarm = StrategyConfig::Swarm {
            service: " ".to_string(),
            rollback_on_failure: true,
        };
        assert!(swarm.validate().is_err());

        let ecs = StrategyConfig::Ecs {
            cluster: "prod".to_string(),
            service: "web".to_string(),
            container: None,
            region: None,
        };
        assert!(ecs.validate().is_ok());
        assert!(!ecs.rollback_on_failure());
    }

    #[test]
    fn test_namespace_for() {
        assert_eq!(
            StrategyConfig::namespace_for(None, Environment::Production),
            "production"
        );
        assert_eq!(
            StrategyConfig::namespace_for(Some("shop"), Environment::Staging),
            "shop"
        );
    }
}
