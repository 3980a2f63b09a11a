//! CLI output formatting

use crate::{
    core::{ExecutionStatus, ExecutionSummary, HealState, StatusReport},
    execution::ExecutionEvent,
};
use console::Emoji;
use indicatif::{ProgressBar, ProgressStyle};
use std::time::Duration;

// Re-export style
pub use console::style;

// Emojis for output
pub static CHECK: Emoji<'_, '_> = Emoji("✅ ", "✓ ");
pub static CROSS: Emoji<'_, '_> = Emoji("❌ ", "✗ ");
pub static SPINNER: Emoji<'_, '_> = Emoji("⏳ ", "~ ");
pub static INFO: Emoji<'_, '_> = Emoji("ℹ️  ", "i ");
pub static WARN: Emoji<'_, '_> = Emoji("⚠️  ", "! ");
pub static ROCKET: Emoji<'_, '_> = Emoji("🚀 ", "> ");
pub static WRENCH: Emoji<'_, '_> = Emoji("🔧 ", "* ");

/// Spinner shown while waiting on an execution
pub fn create_spinner(message: impl Into<String>) -> ProgressBar {
    let spinner = ProgressBar::new_spinner();
    let style = ProgressStyle::default_spinner()
        .template("{spinner:.green} [{elapsed_precise}] {msg}")
        .unwrap_or_else(|_| ProgressStyle::default_spinner());
    spinner.set_style(style);
    spinner.set_message(message.into());
    spinner.enable_steady_tick(Duration::from_millis(100));
    spinner
}

/// Format an execution status for display
pub fn format_status(status: ExecutionStatus) -> String {
    match status {
        ExecutionStatus::Pending => style("PENDING").dim().to_string(),
        ExecutionStatus::Running => style("RUNNING").yellow().to_string(),
        ExecutionStatus::Success => style("SUCCESS").green().to_string(),
        ExecutionStatus::Failed => style("FAILED").red().to_string(),
        ExecutionStatus::Cancelled => style("CANCELLED").yellow().to_string(),
        ExecutionStatus::Skipped => style("SKIPPED").dim().to_string(),
    }
}

/// Format an auto-heal outcome for display
pub fn format_heal(heal: &HealState) -> String {
    match heal {
        HealState::InProgress => style("healing").yellow().to_string(),
        HealState::NoMatchingPattern => style("no known fix").dim().to_string(),
        HealState::FixesFailed { pattern } => {
            format!("{} ({})", style("fixes failed").red(), pattern)
        }
        HealState::DepthLimitReached => style("heal limit reached").yellow().to_string(),
        HealState::Resubmitted { pattern, execution_id } => format!(
            "{} ({}) as {}",
            style("fixed and resubmitted").green(),
            pattern,
            style(execution_id).dim()
        ),
        HealState::ResubmitFailed { pattern, error } => {
            format!("{} ({}): {}", style("resubmit failed").red(), pattern, error)
        }
    }
}

/// First characters of an execution id
fn short_id(id: &str) -> &str {
    id.char_indices().nth(8).map_or(id, |(end, _)| &id[..end])
}

/// Format execution summary for display
pub fn format_execution_summary(summary: &ExecutionSummary) -> String {
    let status_icon = match summary.status {
        ExecutionStatus::Success => CHECK,
        ExecutionStatus::Failed => CROSS,
        ExecutionStatus::Running => SPINNER,
        _ => INFO,
    };

    let duration = summary
        .ended_at
        .and_then(|end| end.signed_duration_since(summary.started_at).to_std().ok())
        .map(format_duration)
        .unwrap_or_else(|| "-".to_string());

    format!(
        "{} {} - {} - {} ({} steps, {})",
        status_icon,
        style(short_id(&summary.execution_id)).dim(),
        style(&summary.pipeline_name).bold(),
        format_status(summary.status),
        summary.steps_total,
        style(duration).cyan()
    )
}

/// One-line report of a finished execution
pub fn format_report(report: &StatusReport) -> String {
    let mut line = format!(
        "{} {} {}",
        style(&report.pipeline_name).bold(),
        style(&report.id).dim(),
        format_status(report.status)
    );
    if let Some(heal) = &report.heal {
        line.push_str(&format!(" - {}", format_heal(heal)));
    }
    line
}

/// Format an execution event for display
pub fn format_execution_event(event: &ExecutionEvent) -> String {
    match event {
        ExecutionEvent::ExecutionStarted {
            execution_id,
            pipeline_name,
        } => format!(
            "{} Starting pipeline {} ({})",
            ROCKET,
            style(pipeline_name).bold(),
            style(short_id(execution_id)).dim()
        ),
        ExecutionEvent::StepStarted { step, attempt, .. } => {
            if *attempt > 1 {
                format!("{} {} (attempt {})", SPINNER, style(step).cyan(), style(attempt).dim())
            } else {
                format!("{} {}", SPINNER, style(step).cyan())
            }
        }
        ExecutionEvent::StepRetrying {
            step,
            retry,
            max_retries,
            delay,
            ..
        } => format!(
            "{} {} retry {}/{} in {}",
            WARN,
            style(step).yellow(),
            retry,
            max_retries,
            format_duration(*delay)
        ),
        ExecutionEvent::StepCompleted { step, .. } => format!("{} {}", CHECK, style(step).green()),
        ExecutionEvent::StepFailed { step, error, .. } => {
            format!("{} {}: {}", CROSS, style(step).red(), style(error).dim())
        }
        ExecutionEvent::StepSoftPassed { step, .. } => format!(
            "{} {} failed, continuing ({})",
            WARN,
            style(step).yellow(),
            style("continue_on_error").dim()
        ),
        ExecutionEvent::ExecutionFinished {
            execution_id,
            status,
            error,
        } => {
            let status_str = match (status, error) {
                (ExecutionStatus::Success, _) => {
                    format!("{} completed", style("successfully").green())
                }
                (_, Some(error)) => format!("{}: {}", format_status(*status), style(error).dim()),
                (_, None) => format_status(*status),
            };
            format!(
                "{} Pipeline ({}) {}",
                INFO,
                style(short_id(execution_id)).dim(),
                status_str
            )
        }
        ExecutionEvent::HealFinished {
            execution_id,
            outcome,
        } => format!(
            "{} Auto-heal ({}): {}",
            WRENCH,
            style(short_id(execution_id)).dim(),
            format_heal(outcome)
        ),
    }
}

/// Format log lines with truncation
pub fn format_logs(lines: &[String], max_lines: usize) -> String {
    if lines.len() <= max_lines {
        return lines.join("\n");
    }

    let skipped = lines.len() - max_lines;
    format!(
        "{}... ({} earlier lines)\n{}",
        style("[truncated]").dim(),
        skipped,
        lines[skipped..].join("\n")
    )
}

pub fn format_duration(duration: Duration) -> String {
    let secs = duration.as_secs();
    if secs == 0 {
        format!("{}ms", duration.as_millis())
    } else if secs < 60 {
        format!("{}s", secs)
    } else if secs < 3600 {
        format!("{}m {}s", secs / 60, secs % 60)
    } else {
        format!("{}h {}m {}s", secs / 3600, (secs % 3600) / 60, secs % 60)
    }
}
