//! Env command handler

use anyhow::Result;
use colored::*;
use conveyor_core::domain::Environment;
use std::process::ExitCode;

/// Print the environment selected for `branch`
pub fn handle_env_command(branch: &str) -> Result<ExitCode> {
    let environment = Environment::from_branch(branch);
    println!("{} -> {}", branch, environment.to_string().cyan().bold());
    Ok(ExitCode::SUCCESS)
}
