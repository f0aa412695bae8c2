//! Error types for Conveyor runs

use thiserror::Error;

/// Why a stage failed
///
/// Every variant except [`StageError::CleanupFailure`] is fatal for the run
/// when raised by a required stage. Cleanup failures are only logged.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StageError {
    #[error("checkout failed: {0}")]
    CheckoutFailure(String),

    #[error("image build failed: {0}")]
    BuildFailure(String),

    #[error("tests failed (exit code {exit_code}): {output}")]
    TestFailure { exit_code: i32, output: String },

    #[error("image scan failed: {0}")]
    ScanFailure(String),

    #[error("registry push denied: {0}")]
    PushDenied(String),

    #[error("deployment failed: {0}")]
    DeployFailure(String),

    #[error("rollout of '{deployment}' did not complete within {timeout_secs}s")]
    RolloutTimeout {
        deployment: String,
        timeout_secs: u64,
    },

    #[error("{url} unreachable after {attempts} verification attempt(s)")]
    VerificationFailure { attempts: u32, url: String },

    #[error("cleanup failed: {0}")]
    CleanupFailure(String),

    #[error("run cancelled before stage '{0}'")]
    Cancelled(String),
}

impl StageError {
    /// Stable name of the failure class, used in reports
    pub fn kind(&self) -> &'static str {
        match self {
            StageError::CheckoutFailure(_) => "CheckoutFailure",
            StageError::BuildFailure(_) => "BuildFailure",
            StageError::TestFailure { .. } => "TestFailure",
            StageError::ScanFailure(_) => "ScanFailure",
            StageError::PushDenied(_) => "PushDenied",
            StageError::DeployFailure(_) | StageError::RolloutTimeout { .. } => "DeployFailure",
            StageError::VerificationFailure { .. } => "VerificationFailure",
            StageError::CleanupFailure(_) => "CleanupFailure",
            StageError::Cancelled(_) => "Cancelled",
        }
    }
}

/// Invalid configuration or run parameters
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    #[error("invalid image tag '{tag}': {reason}")]
    InvalidTag { tag: String, reason: &'static str },

    #[error("build number must be greater than 0")]
    InvalidBuildNumber,

    #[error("missing required field '{0}'")]
    MissingField(&'static str),

    #[error("invalid value for '{field}': {reason}")]
    InvalidValue {
        field: &'static str,
        reason: String,
    },
}

impl ConfigError {
    pub fn invalid(field: &'static str, reason: impl Into<String>) -> Self {
        Self::InvalidValue {
            field,
            reason: reason.into(),
        }
    }
}
