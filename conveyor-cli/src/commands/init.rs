//! Init command handler
//!
//! Writes a commented starter `conveyor.lua`.

use anyhow::{Context, Result};
use colored::*;
use std::fs;
use std::path::Path;
use std::process::ExitCode;

use crate::config::Config;

pub fn handle_init_command(force: bool, config: &Config) -> Result<ExitCode> {
    write_starter_config(&config.config_path, force)?;

    println!(
        "{} {}",
        "Created".green(),
        config.config_path.display().to_string().cyan()
    );
    println!();
    println!("{}", "Next steps:".bold());
    println!("  1. Set the image, registry and deployment strategy");
    println!("  2. Check the plan with {}", "conveyor plan --branch main --build-number 1".cyan());

    Ok(ExitCode::SUCCESS)
}

/// Write the starter configuration to `path`
///
/// An existing file is only replaced when `force` is set.
fn write_starter_config(path: &Path, force: bool) -> Result<()> {
    if path.exists() && !force {
        anyhow::bail!(
            "{} already exists (use --force to overwrite)",
            path.display()
        );
    }

    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create directory {}", parent.display()))?;
    }

    fs::write(path, conveyor_lua::STARTER_CONFIG)
        .with_context(|| format!("Failed to write {}", path.display()))?;

    Ok(())
}
