//! Core domain types
//!
//! These types describe a single deployment run: the immutable context it
//! operates on, the stages it executes and the report it produces. They are
//! shared between the runner (which produces them) and the CLI (which renders
//! them).

pub mod context;
pub mod environment;
pub mod image;
pub mod log;
pub mod run;
pub mod stage;

pub use context::{PipelineContext, RunParameters};
pub use environment::{Environment, Trigger};
pub use image::{ImageRef, ImageTag};
pub use log::{LogEntry, LogLevel};
pub use run::{RunReport, RunState, RunStatus};
pub use stage::{StageKind, StageResult, StageStatus};
