//! CLI output formatting

use crate::{
    core::{ExecutionStatus, JobStatus, Pipeline, StepAction, StepStatus},
    execution::ExecutionEvent,
    persistence::ExecutionSummary,
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
pub static SKIP: Emoji<'_, '_> = Emoji("⏭️  ", "- ");

/// Create a progress bar counting finished jobs
pub fn create_progress_bar(total: usize) -> ProgressBar {
    let progress = ProgressBar::new(total as u64);
    let style = ProgressStyle::default_bar()
        .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} jobs {msg}")
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("#>-");
    progress.set_style(style);
    progress.enable_steady_tick(Duration::from_millis(100));
    progress
}

/// Format an execution status for display
pub fn format_status(status: ExecutionStatus) -> String {
    match status {
        ExecutionStatus::Pending => style("PENDING").dim().to_string(),
        ExecutionStatus::Running => style("RUNNING").yellow().to_string(),
        ExecutionStatus::Succeeded => style("SUCCEEDED").green().to_string(),
        ExecutionStatus::Failed => style("FAILED").red().to_string(),
    }
}

/// Format a job status for display
pub fn format_job_status(status: JobStatus) -> String {
    match status {
        JobStatus::Pending => style("PENDING").dim().to_string(),
        JobStatus::Running => style("RUNNING").yellow().to_string(),
        JobStatus::Succeeded => style("SUCCEEDED").green().to_string(),
        JobStatus::Failed => style("FAILED").red().to_string(),
        JobStatus::Skipped => style("SKIPPED").dim().to_string(),
    }
}

/// Format execution summary for display
pub fn format_execution_summary(summary: &ExecutionSummary) -> String {
    let status_icon = match summary.status {
        ExecutionStatus::Succeeded => CHECK,
        ExecutionStatus::Failed => CROSS,
        ExecutionStatus::Running => SPINNER,
        ExecutionStatus::Pending => INFO,
    };

    format!(
        "{} {} - {} - {} ({} ok, {} failed, {} skipped of {}) - {}",
        status_icon,
        style(short_id(&summary.execution_id.to_string())).dim(),
        style(&summary.pipeline_name).bold(),
        format_status(summary.status),
        summary.succeeded_jobs,
        summary.failed_jobs,
        summary.skipped_jobs,
        summary.total_jobs,
        style(summary.started_at.format("%Y-%m-%d %H:%M:%S")).dim()
    )
}

fn short_id(id: &str) -> &str {
    id.get(..8).unwrap_or(id)
}

/// Format an execution event for display
pub fn format_execution_event(event: &ExecutionEvent) -> String {
    match event {
        ExecutionEvent::PipelineStarted {
            execution_id,
            pipeline_name,
            total_jobs,
        } => format!(
            "{} Starting pipeline {} with {} jobs ({})",
            ROCKET,
            style(pipeline_name).bold(),
            total_jobs,
            style(short_id(&execution_id.to_string())).dim()
        ),
        ExecutionEvent::JobStarted { job_id } => {
            format!("{} {}", SPINNER, style(job_id).cyan().bold())
        }
        ExecutionEvent::JobSkipped { job_id, reason } => {
            format!("{} {} skipped: {}", SKIP, style(job_id).dim(), style(reason).dim())
        }
        ExecutionEvent::StepStarted { job_id, step_id, kind } => format!(
            "   {} {}/{} ({})",
            SPINNER,
            style(job_id).dim(),
            style(step_id).cyan(),
            kind
        ),
        ExecutionEvent::StepFinished {
            job_id,
            step_id,
            status,
            exit_code,
            ..
        } => {
            let code = exit_code.map(|c| format!(" exit {}", c)).unwrap_or_default();
            match status {
                StepStatus::Succeeded => format!("   {} {}/{}", CHECK, style(job_id).dim(), style(step_id).green()),
                StepStatus::Tolerated => format!(
                    "   {} {}/{} failed{} (continue_on_error)",
                    WARN,
                    style(job_id).dim(),
                    style(step_id).yellow(),
                    code
                ),
                StepStatus::Failed => format!(
                    "   {} {}/{} failed{}",
                    CROSS,
                    style(job_id).dim(),
                    style(step_id).red(),
                    code
                ),
                StepStatus::Skipped => format!("   {} {}/{}", SKIP, style(job_id).dim(), style(step_id).dim()),
            }
        }
        ExecutionEvent::StepSkipped { job_id, step_id } => format!(
            "   {} {}/{} skipped",
            SKIP,
            style(job_id).dim(),
            style(step_id).dim()
        ),
        ExecutionEvent::FallbackTriggered {
            job_id,
            from_step,
            to_step,
        } => format!(
            "   {} {}: {} failed, trying {}",
            INFO,
            style(job_id).dim(),
            style(from_step).yellow(),
            style(to_step).cyan()
        ),
        ExecutionEvent::CacheRestored { job_id, key, exact } => format!(
            "   {} {}: cache {} {}",
            INFO,
            style(job_id).dim(),
            if *exact { "hit" } else { "partial hit" },
            style(key).dim()
        ),
        ExecutionEvent::CacheMissed { job_id, key } => format!(
            "   {} {}: cache miss {}",
            INFO,
            style(job_id).dim(),
            style(key).dim()
        ),
        ExecutionEvent::CacheSaved { job_id, key } => format!(
            "   {} {}: cache saved {}",
            INFO,
            style(job_id).dim(),
            style(key).dim()
        ),
        ExecutionEvent::ArtifactUploaded { job_id, name, files } => format!(
            "   {} {}: uploaded artifact {} ({} files)",
            INFO,
            style(job_id).dim(),
            style(name).cyan(),
            files
        ),
        ExecutionEvent::JobFinished { job_id, status } => {
            let icon = if *status == JobStatus::Succeeded { CHECK } else { CROSS };
            format!("{} {} {}", icon, style(job_id).bold(), format_job_status(*status))
        }
        ExecutionEvent::PipelineCompleted { execution_id, status } => format!(
            "{} Pipeline ({}) {}",
            INFO,
            style(short_id(&execution_id.to_string())).dim(),
            format_status(*status)
        ),
    }
}

/// Format step output with truncation
pub fn format_output(output: &str, max_lines: usize) -> String {
    let lines: Vec<&str> = output.lines().collect();

    if lines.len() <= max_lines {
        output.to_string()
    } else {
        let truncated = lines[..max_lines].join("\n");
        format!(
            "{}\n{}... ({} more lines)",
            truncated,
            style("[truncated]").dim(),
            lines.len() - max_lines
        )
    }
}

/// Render the job graph stage by stage
pub fn format_graph(pipeline: &Pipeline) -> String {
    let mut out = String::new();
    for (index, stage) in pipeline.stages().iter().enumerate() {
        out.push_str(&format!("{}\n", style(format!("Stage {}", index + 1)).bold()));
        for job_id in stage {
            let Some(job) = pipeline.job(job_id) else { continue };

            let mut line = format!("  {}", style(&job.id).cyan());
            if !job.dependencies.is_empty() {
                line.push_str(&format!(" <- {}", job.dependencies.join(", ")));
            }
            if job.run_always {
                line.push_str(&format!(" {}", style("[run_always]").yellow()));
            }
            out.push_str(&line);
            out.push('\n');

            for step in &job.steps {
                let mut flags = Vec::new();
                if step.continue_on_error {
                    flags.push("continue_on_error");
                }
                if step.always {
                    flags.push("always");
                }
                if step.fallback.is_some() {
                    flags.push("fallback");
                }
                let detail = match &step.action {
                    StepAction::Run { script } => script.lines().next().unwrap_or_default().to_string(),
                    StepAction::RestoreCache(spec) => format!("cache {}", spec.path.display()),
                    StepAction::Upload(spec) => format!("upload {}", spec.name),
                };
                let flags = if flags.is_empty() {
                    String::new()
                } else {
                    format!(" [{}]", flags.join(", "))
                };
                out.push_str(&format!(
                    "    - {}: {}{}\n",
                    step.id,
                    style(detail).dim(),
                    style(flags).dim()
                ));
            }
        }
    }
    out
}
