//! CLI output formatting

use crate::execution::ExecutionEvent;
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
pub static ROCKET: Emoji<'_, '_> = Emoji("🚀 ", "> ");
pub static EYES: Emoji<'_, '_> = Emoji("👀 ", "* ");

/// Create a spinner for a running pipeline
pub fn create_spinner() -> ProgressBar {
    let spinner = ProgressBar::new_spinner();
    spinner.set_style(
        ProgressStyle::default_spinner()
            .template("{spinner:.green} [{elapsed_precise}] {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner()),
    );
    spinner.enable_steady_tick(Duration::from_millis(100));
    spinner
}

/// Format an execution event for display
pub fn format_execution_event(event: &ExecutionEvent) -> String {
    match event {
        ExecutionEvent::RunStarted {
            run_id, pipeline, ..
        } => format!(
            "{} Starting pipeline {} ({})",
            ROCKET,
            style(pipeline).bold(),
            style(&run_id.to_string()[..8]).dim()
        ),
        ExecutionEvent::StageStarted { stage, kind, .. } => {
            format!("{} {} {}", SPINNER, style(kind).dim(), style(stage).cyan())
        }
        ExecutionEvent::StageCompleted {
            stage, elapsed, ..
        } => format!(
            "{} {} {}",
            CHECK,
            style(stage).green(),
            style(format_duration(*elapsed)).dim()
        ),
        ExecutionEvent::StageFailed { stage, error, .. } => {
            format!("{} {}: {}", CROSS, style(stage).red(), style(error).dim())
        }
        ExecutionEvent::RunCompleted {
            run_id,
            pipeline,
            failures,
            ..
        } => {
            let status = if *failures == 0 {
                format!("completed {}", style("successfully").green())
            } else {
                format!("completed with {} failed stages", style(failures).red())
            };
            format!(
                "{} {} ({}) {}",
                INFO,
                style(pipeline).bold(),
                style(&run_id.to_string()[..8]).dim(),
                status
            )
        }
        ExecutionEvent::RebuildTriggered { pipeline, paths } => format!(
            "{} {} files changed, rebuilding {}",
            EYES,
            style(paths.len()).cyan(),
            style(pipeline).bold()
        ),
    }
}

/// Human-readable duration
pub fn format_duration(duration: Duration) -> String {
    let millis = duration.as_millis();
    if millis < 1000 {
        format!("{}ms", millis)
    } else if millis < 60_000 {
        format!("{:.1}s", duration.as_secs_f64())
    } else {
        let secs = duration.as_secs();
        format!("{}m {}s", secs / 60, secs % 60)
    }
}
