//! Run state machine and report

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::environment::Environment;
use super::log::LogEntry;
use super::stage::{StageKind, StageResult, StageStatus};

/// Progress of a run
///
/// ```text
/// Pending -> CheckedOut -> Built -> Tested -> Scanned -> {Pushed | PushSkipped}
///         -> Deployed -> Verified -> Done
/// ```
///
/// A required stage failure moves any non-terminal state to `Failed`; after
/// cleanup a failed run ends in `DoneFailed`. `Done` and `DoneFailed` are
/// the only terminal states.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunState {
    Pending,
    CheckedOut,
    Built,
    Tested,
    Scanned,
    Pushed,
    PushSkipped,
    Deployed,
    Verified,
    Failed,
    Done,
    DoneFailed,
}

impl RunState {
    /// State after a stage completed without a run-failing error
    ///
    /// `skipped` distinguishes a bypassed stage from a completed one. Only a
    /// skipped push has its own state; other skips leave the state where it
    /// is, except a disabled scan which still passes the scan gate. Stages
    /// arriving out of order do not move the state.
    pub fn advance(self, stage: StageKind, skipped: bool) -> RunState {
        use RunState::*;

        match (self, stage, skipped) {
            (Pending, StageKind::Checkout, _) => CheckedOut,
            (CheckedOut, StageKind::Build, _) => Built,
            (Built, StageKind::Test, _) => Tested,
            (Tested, StageKind::Scan, _) => Scanned,
            (Scanned, StageKind::Push, false) => Pushed,
            (Scanned, StageKind::Push, true) => PushSkipped,
            (Pushed, StageKind::Deploy, false) => Deployed,
            (Deployed, StageKind::Verify, false) => Verified,
            (state, _, _) => state,
        }
    }

    /// State after a required stage failed
    pub fn fail(self) -> RunState {
        match self {
            RunState::Done | RunState::DoneFailed => self,
            _ => RunState::Failed,
        }
    }

    /// Terminal state once cleanup has run
    pub fn finish(self) -> RunState {
        match self {
            RunState::Failed | RunState::DoneFailed => RunState::DoneFailed,
            _ => RunState::Done,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, RunState::Done | RunState::DoneFailed)
    }
}

/// Final status of a run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RunStatus {
    Success,
    Failed,
}

impl std::fmt::Display for RunStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RunStatus::Success => write!(f, "success"),
            RunStatus::Failed => write!(f, "failed"),
        }
    }
}

/// Report emitted at the end of every run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunReport {
    pub run_id: Uuid,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub status: RunStatus,
    pub final_state: RunState,
    pub branch: String,
    pub environment: Environment,
    /// Image reference deployed (or that would have been deployed)
    pub image: String,
    pub tag: String,
    /// Stage that failed the run
    pub failed_stage: Option<StageKind>,
    /// Error that failed the run
    pub error: Option<String>,
    /// Liveness probes issued by the verify stage
    pub verification_attempts: u32,
    pub stages: Vec<StageResult>,
    pub logs: Vec<LogEntry>,
}

impl RunReport {
    pub fn is_success(&self) -> bool {
        self.status == RunStatus::Success
    }

    /// Result entry for a stage, if the stage was reached
    pub fn stage(&self, stage: StageKind) -> Option<&StageResult> {
        self.stages.iter().find(|r| r.stage == stage)
    }

    /// Status of a stage, if the stage was reached
    pub fn stage_status(&self, stage: StageKind) -> Option<StageStatus> {
        self.stage(stage).map(|r| r.status)
    }

    /// One-line human summary
    pub fn summary(&self) -> String {
        let deploy_skipped = self.stage_status(StageKind::Deploy) == Some(StageStatus::Skipped);

        match self.status {
            RunStatus::Success if deploy_skipped => format!(
                "built {} (tag {}) for {} (push and deploy skipped: change request)",
                self.image, self.tag, self.environment
            ),
            RunStatus::Success => format!(
                "deployed {} (tag {}) to {}",
                self.image, self.tag, self.environment
            ),
            RunStatus::Failed => format!(
                "failed at stage '{}': {}",
                self.failed_stage.map(|s| s.name()).unwrap_or("unknown"),
                self.error.as_deref().unwrap_or("unknown error")
            ),
        }
    }
}
