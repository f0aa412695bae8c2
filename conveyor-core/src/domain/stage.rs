//! Stage domain types

use serde::{Deserialize, Serialize};

use crate::error::StageError;

/// The stages of a run, in execution order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StageKind {
    Checkout,
    Build,
    Test,
    Scan,
    Push,
    Deploy,
    Verify,
    Cleanup,
}

impl StageKind {
    /// Stages that form the pipeline proper; cleanup runs after them
    pub const PIPELINE: [StageKind; 7] = [
        StageKind::Checkout,
        StageKind::Build,
        StageKind::Test,
        StageKind::Scan,
        StageKind::Push,
        StageKind::Deploy,
        StageKind::Verify,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            StageKind::Checkout => "checkout",
            StageKind::Build => "build",
            StageKind::Test => "test",
            StageKind::Scan => "scan",
            StageKind::Push => "push",
            StageKind::Deploy => "deploy",
            StageKind::Verify => "verify",
            StageKind::Cleanup => "cleanup",
        }
    }
}

impl std::fmt::Display for StageKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// Outcome of a single stage
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StageStatus {
    Success,
    Failed,
    Skipped,
}

impl std::fmt::Display for StageStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StageStatus::Success => write!(f, "success"),
            StageStatus::Failed => write!(f, "failed"),
            StageStatus::Skipped => write!(f, "skipped"),
        }
    }
}

/// Per-stage entry of the run report
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StageResult {
    pub stage: StageKind,
    pub status: StageStatus,
    /// Whether a failure of this stage fails the run
    pub required: bool,
    /// Failure class, e.g. `TestFailure`
    pub error_kind: Option<String>,
    /// Failure detail including the collaborator error
    pub error: Option<String>,
    pub duration_ms: u64,
}

impl StageResult {
    pub fn success(stage: StageKind, required: bool, duration_ms: u64) -> Self {
        Self {
            stage,
            status: StageStatus::Success,
            required,
            error_kind: None,
            error: None,
            duration_ms,
        }
    }

    pub fn failed(stage: StageKind, required: bool, error: &StageError, duration_ms: u64) -> Self {
        Self {
            stage,
            status: StageStatus::Failed,
            required,
            error_kind: Some(error.kind().to_string()),
            error: Some(error.to_string()),
            duration_ms,
        }
    }

    pub fn skipped(stage: StageKind, required: bool) -> Self {
        Self {
            stage,
            status: StageStatus::Skipped,
            required,
            error_kind: None,
            error: None,
            duration_ms: 0,
        }
    }
}
