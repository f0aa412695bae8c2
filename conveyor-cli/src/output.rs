//! Report rendering
//!
//! Human-readable colored output for terminals and JSON for machines.

use anyhow::Result;
use clap::ValueEnum;
use colored::*;
use conveyor_core::domain::{LogEntry, LogLevel, RunReport, RunStatus, StageResult, StageStatus};

/// How results are written to stdout
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    Text,
    Json,
}

/// Print a run report in the requested format
pub fn print_report(report: &RunReport, format: OutputFormat) -> Result<()> {
    match format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(report)?),
        OutputFormat::Text => print_report_text(report),
    }
    Ok(())
}

fn print_report_text(report: &RunReport) {
    println!("{}", "Run Report:".bold());
    println!("  Run ID:      {}", report.run_id.to_string().cyan());
    println!("  Branch:      {}", report.branch);
    println!("  Environment: {}", report.environment.to_string().cyan());
    println!("  Image:       {}", report.image);
    println!("  Status:      {}", colorize_status(report.status));
    println!(
        "  Duration:    {}s",
        report
            .finished_at
            .signed_duration_since(report.started_at)
            .num_seconds()
    );
    if report.verification_attempts > 0 {
        println!("  Verified in: {} attempt(s)", report.verification_attempts);
    }

    println!("\n{}", "Stages:".bold());
    for stage in &report.stages {
        println!("  {}", stage_line(stage));
    }

    if !report.logs.is_empty() {
        println!("\n{}", "Logs:".bold());
        println!("{}", "─".repeat(80).dimmed());
        for log in &report.logs {
            print_log_entry(log);
        }
        println!("{}", "─".repeat(80).dimmed());
    }

    println!();
    match report.status {
        RunStatus::Success => println!("{} {}", "✓".green(), report.summary().green().bold()),
        RunStatus::Failed => println!("{} {}", "✗".red(), report.summary().red().bold()),
    }
}

/// One stage as a report line
pub fn stage_line(stage: &StageResult) -> String {
    let marker = match stage.status {
        StageStatus::Success => "✓".green(),
        StageStatus::Failed if stage.required => "✗".red(),
        StageStatus::Failed => "!".yellow(),
        StageStatus::Skipped => "-".dimmed(),
    };

    let mut line = format!(
        "{} {:<9} {}",
        marker,
        stage.stage.name(),
        colorize_stage_status(stage.status)
    );
    if stage.status != StageStatus::Skipped {
        line.push_str(&format!(" ({}ms)", stage.duration_ms).dimmed().to_string());
    }
    if let Some(error) = &stage.error {
        line.push_str(&format!("\n      {}", error.red()));
    }
    line
}

/// Print a log entry
fn print_log_entry(log: &LogEntry) {
    let level_str = log.level.to_string();
    let level_colored = match log.level {
        LogLevel::Debug => level_str.dimmed(),
        LogLevel::Info => level_str.cyan(),
        LogLevel::Warning => level_str.yellow(),
        LogLevel::Error => level_str.red(),
    };

    let stage = log
        .stage
        .as_deref()
        .map(|s| format!("[{}] ", s))
        .unwrap_or_default();

    println!(
        "{} [{}] {}{}",
        log.timestamp.format("%H:%M:%S").to_string().dimmed(),
        level_colored,
        stage.dimmed(),
        log.message
    );
}

fn colorize_status(status: RunStatus) -> ColoredString {
    match status {
        RunStatus::Success => status.to_string().green(),
        RunStatus::Failed => status.to_string().red(),
    }
}

fn colorize_stage_status(status: StageStatus) -> ColoredString {
    match status {
        StageStatus::Success => status.to_string().green(),
        StageStatus::Failed => status.to_string().red(),
        StageStatus::Skipped => status.to_string().dimmed(),
    }
}
