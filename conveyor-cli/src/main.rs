//! Conveyor CLI
//!
//! Runs the build, test, scan, push, deploy and verify pipeline for one
//! revision, as described by a `conveyor.lua` file.

mod commands;
mod config;
mod output;

use anyhow::Result;
use clap::Parser;
use commands::{Commands, handle_command};
use config::Config;
use std::process::ExitCode;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(name = "conveyor")]
#[command(about = "Conveyor deployment pipeline", long_about = None)]
struct Cli {
    /// Path of the deployment configuration
    #[arg(
        long,
        short,
        global = true,
        env = "CONVEYOR_CONFIG",
        default_value = "conveyor.lua"
    )]
    config: String,

    #[command(subcommand)]
    command: Commands,
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    // Diagnostics go to stderr so reports on stdout stay machine readable
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "conveyor_cli=info,conveyor_runner=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let cli = Cli::parse();

    let config = Config {
        config_path: cli.config.into(),
    };

    handle_command(cli.command, &config).await
}
