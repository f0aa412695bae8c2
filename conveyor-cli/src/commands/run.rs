//! Run command handler
//!
//! Loads the configuration, wires the collaborators and executes one run.
//! Ctrl-C requests cancellation; the current stage finishes, cleanup runs and
//! the run is reported as cancelled.

use anyhow::{Context, Result};
use conveyor_core::domain::PipelineContext;
use conveyor_runner::collaborators::{Collaborators, HttpProber};
use conveyor_runner::{CancelFlag, Orchestrator, ProcessRunner};
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

use crate::config::{Config, RunArgs};
use crate::output::{OutputFormat, print_report};

pub async fn handle_run_command(
    args: RunArgs,
    dry_run: bool,
    output: OutputFormat,
    config: &Config,
) -> Result<ExitCode> {
    let deploy = config.load_deploy_config()?;
    let ctx = PipelineContext::new(args.into(), &deploy).context("Invalid run parameters")?;

    let collaborators = if dry_run {
        info!("Dry run: external commands are logged, not executed");
        Collaborators::dry_run(&deploy)
    } else {
        let runner = Arc::new(ProcessRunner::new(Duration::from_secs(
            deploy.command_timeout_seconds,
        )));
        let prober = Arc::new(
            HttpProber::new(Duration::from_secs(deploy.verify.probe_timeout_seconds))
                .context("Failed to create liveness prober")?,
        );
        Collaborators::from_config(&deploy, runner, prober)
    };

    let cancel = CancelFlag::new();
    let signal_handle = spawn_cancel_on_ctrl_c(cancel.clone());

    let orchestrator = Orchestrator::new(&deploy, collaborators).with_cancel_flag(cancel);
    info!(
        "Run {}: {} stages, {} strategy",
        ctx.run_id(),
        orchestrator.stages().len(),
        orchestrator.strategy()
    );

    let report = orchestrator.run(&ctx).await;
    signal_handle.abort();

    print_report(&report, output)?;

    Ok(if report.is_success() {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    })
}

/// Sets `cancel` on the first Ctrl-C
fn spawn_cancel_on_ctrl_c(cancel: CancelFlag) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                warn!("Interrupt received, cancelling after the current stage");
                cancel.cancel();
            }
            Err(e) => warn!("Failed to listen for Ctrl-C: {}", e),
        }
    })
}
