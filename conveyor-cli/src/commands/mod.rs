//! Commands module
//!
//! Defines all CLI commands and their handlers.

mod env;
mod init;
mod plan;
mod run;

use anyhow::Result;
use clap::Subcommand;
use std::process::ExitCode;

use crate::config::{Config, RunArgs};
use crate::output::OutputFormat;

/// Top-level CLI commands
#[derive(Subcommand)]
pub enum Commands {
    /// Run the pipeline
    Run {
        #[command(flatten)]
        args: RunArgs,

        /// Log external commands instead of running them
        #[arg(long)]
        dry_run: bool,

        /// Report format
        #[arg(long, value_enum, default_value = "text")]
        output: OutputFormat,
    },
    /// Show what a run would do without executing anything
    Plan {
        #[command(flatten)]
        args: RunArgs,

        /// Plan format
        #[arg(long, value_enum, default_value = "text")]
        output: OutputFormat,
    },
    /// Show the environment a branch deploys to
    Env {
        /// Branch name
        branch: String,
    },
    /// Write a starter configuration file
    Init {
        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },
}

/// Handle a CLI command
///
/// Routes the command to the appropriate handler module.
///
/// # Returns
/// The process exit code; failed runs exit with 1
pub async fn handle_command(command: Commands, config: &Config) -> Result<ExitCode> {
    match command {
        Commands::Run {
            args,
            dry_run,
            output,
        } => run::handle_run_command(args, dry_run, output, config).await,
        Commands::Plan { args, output } => plan::handle_plan_command(args, output, config),
        Commands::Env { branch } => env::handle_env_command(&branch),
        Commands::Init { force } => init::handle_init_command(force, config),
    }
}
