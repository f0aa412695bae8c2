//! Conveyor Lua configuration
//!
//! Deployments are described in a `conveyor.lua` file that returns a table.
//! This crate evaluates that file in a restricted sandbox and turns the
//! result into a validated [`DeployConfig`].

pub mod loader;
pub mod sandbox;
pub mod template;

pub use loader::{load_config, parse_config};
pub use sandbox::create_sandbox;
pub use template::STARTER_CONFIG;

pub use conveyor_core::config::DeployConfig;
