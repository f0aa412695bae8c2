//! Plan command handler
//!
//! Resolves the context and stage table for a run and prints them without
//! executing anything.

use anyhow::{Context, Result};
use colored::*;
use conveyor_core::domain::{PipelineContext, StageKind};
use conveyor_runner::orchestrator::pipeline_stages;
use serde::Serialize;
use std::process::ExitCode;

use crate::config::{Config, RunArgs};
use crate::output::OutputFormat;

/// A run as it would execute
#[derive(Debug, Serialize)]
struct Plan<'a> {
    context: &'a PipelineContext,
    strategy: &'static str,
    image: String,
    stages: Vec<PlannedStage>,
}

#[derive(Debug, Serialize)]
struct PlannedStage {
    stage: StageKind,
    required: bool,
    /// Why the stage would be skipped
    skip_reason: Option<&'static str>,
}

pub fn handle_plan_command(
    args: RunArgs,
    output: OutputFormat,
    config: &Config,
) -> Result<ExitCode> {
    let deploy = config.load_deploy_config()?;
    let ctx = PipelineContext::new(args.into(), &deploy).context("Invalid run parameters")?;

    let mut stages: Vec<PlannedStage> = pipeline_stages(&deploy.scan)
        .iter()
        .map(|stage| PlannedStage {
            stage: stage.kind,
            required: stage.required,
            skip_reason: stage.skip_for(&ctx).map(|c| c.reason()),
        })
        .collect();
    stages.push(PlannedStage {
        stage: StageKind::Cleanup,
        required: false,
        skip_reason: None,
    });

    let plan = Plan {
        context: &ctx,
        strategy: deploy.strategy.name(),
        image: ctx.registry_image().to_string(),
        stages,
    };

    match output {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&plan)?),
        OutputFormat::Text => print_plan(&plan),
    }

    Ok(ExitCode::SUCCESS)
}

fn print_plan(plan: &Plan<'_>) {
    let ctx = plan.context;

    println!("{}", "Plan:".bold());
    println!("  Branch:      {}", ctx.branch());
    println!("  Environment: {}", ctx.environment().to_string().cyan());
    println!("  Image:       {}", plan.image.cyan());
    println!("  Strategy:    {}", plan.strategy);
    println!("  Health URL:  {}", ctx.health_url());
    if ctx.trigger().is_change_request() {
        println!("  Trigger:     {}", "change request".yellow());
    }

    println!("\n{}", "Stages:".bold());
    for (idx, stage) in plan.stages.iter().enumerate() {
        let note = match stage.skip_reason {
            Some(reason) => format!("skipped: {}", reason).dimmed(),
            None if !stage.required => "runs, failure tolerated".yellow(),
            None => "runs".green(),
        };
        println!("  {}. {:<9} {}", idx + 1, stage.stage.name(), note);
    }
}
