//! Stage table
//!
//! The fixed sequence of stages a run walks through, with the flags that
//! decide whether a stage runs and whether its failure ends the run.

use conveyor_core::config::ScanConfig;
use conveyor_core::domain::{PipelineContext, StageKind};

/// Why a stage may be bypassed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipCondition {
    /// Bypassed for pull/change request builds
    ChangeRequest,
    /// Turned off in the configuration
    Disabled,
}

impl SkipCondition {
    pub fn applies(&self, ctx: &PipelineContext) -> bool {
        match self {
            SkipCondition::ChangeRequest => ctx.trigger().is_change_request(),
            SkipCondition::Disabled => true,
        }
    }

    pub fn reason(&self) -> &'static str {
        match self {
            SkipCondition::ChangeRequest => "change request build",
            SkipCondition::Disabled => "disabled in configuration",
        }
    }
}

/// One entry of the stage table
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Stage {
    pub kind: StageKind,
    /// A failure of a required stage fails the run
    pub required: bool,
    pub skip: Option<SkipCondition>,
}

impl Stage {
    fn required(kind: StageKind) -> Self {
        Self {
            kind,
            required: true,
            skip: None,
        }
    }

    fn skipped_when(mut self, condition: SkipCondition) -> Self {
        self.skip = Some(condition);
        self
    }

    /// The skip condition that applies to this run, if any
    pub fn skip_for(&self, ctx: &PipelineContext) -> Option<SkipCondition> {
        self.skip.filter(|condition| condition.applies(ctx))
    }
}

/// Builds the stage table, cleanup excluded
pub fn pipeline_stages(scan: &ScanConfig) -> Vec<Stage> {
    let mut scan_stage = Stage::required(StageKind::Scan);
    scan_stage.required = !scan.advisory;
    if !scan.enabled {
        scan_stage = scan_stage.skipped_when(SkipCondition::Disabled);
    }

    vec![
        Stage::required(StageKind::Checkout),
        Stage::required(StageKind::Build),
        Stage::required(StageKind::Test),
        scan_stage,
        Stage::required(StageKind::Push).skipped_when(SkipCondition::ChangeRequest),
        Stage::required(StageKind::Deploy).skipped_when(SkipCondition::ChangeRequest),
        Stage::required(StageKind::Verify).skipped_when(SkipCondition::ChangeRequest),
    ]
}
