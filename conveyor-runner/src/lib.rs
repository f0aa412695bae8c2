//! Conveyor Runner
//!
//! Executes deployment runs:
//! - Orchestrator: stage table, run state machine and final report
//! - Collaborators: the external tools a run drives, behind traits
//! - Deploy: one deployment target per strategy
//! - Process: structured command execution with timeouts
//! - Retry: the bounded fixed-delay retry used by verification
//! - Services: per-run log buffering

pub mod collaborators;
pub mod deploy;
pub mod orchestrator;
pub mod process;
pub mod retry;
pub mod service;

#[cfg(test)]
mod test_support;

pub use collaborators::Collaborators;
pub use orchestrator::{CancelFlag, Orchestrator};
pub use process::{CommandRunner, DryRunRunner, ProcessRunner};
