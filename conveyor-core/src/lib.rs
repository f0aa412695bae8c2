//! Conveyor Core
//!
//! Core types for the Conveyor deployment orchestrator.
//!
//! This crate contains:
//! - Domain types: run context, stages, run state and the final report
//! - Configuration: the deployment configuration loaded from `conveyor.lua`
//! - Errors: the stage failure taxonomy and configuration errors
//!
//! Nothing in here performs I/O. Execution lives in `conveyor-runner`.

pub mod config;
pub mod domain;
pub mod error;

pub use error::{ConfigError, StageError};
