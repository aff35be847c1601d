//! Execution engine - drives the task runner with terminal reporting

use anyhow::{Context as AnyhowContext, Result};
use colored::Colorize;
use indicatif::{ProgressBar, ProgressStyle};
use taskgraph::{RunDelegate, RunOptions, RunSummary, Task, TaskGraph, TaskOutput};

use crate::Context;

/// Reports task outcomes through `log` and advances the progress bar
pub struct LogDelegate {
    progress: ProgressBar,
}

impl LogDelegate {
    pub fn new(progress: ProgressBar) -> Self {
        Self { progress }
    }

    fn report(&self, f: impl FnOnce()) {
        self.progress.suspend(f);
    }
}

impl<T: Task> RunDelegate<T> for LogDelegate {
    fn on_task_started(&self, task: &T) {
        self.progress.set_message(task.key().to_string());
    }

    fn on_task_succeeded(&self, task: &T, _output: &TaskOutput) {
        self.report(|| log::info!("task {} succeeded", task.key()));
        self.progress.inc(1);
    }

    fn on_task_failed(&self, task: &T, error: &anyhow::Error) {
        self.report(|| log::error!("failed executing task {}. Reason: {error:#}", task.key()));
        self.progress.inc(1);
    }

    fn on_task_skipped(&self, task: &T, failed: &T) {
        self.report(|| {
            log::error!(
                "skip executing task {}. Reason: dependency {} has failed.",
                task.key(),
                failed.key()
            );
        });
        self.progress.inc(1);
    }

    fn on_circular_dependency(&self, tasks: &[&T]) {
        let keys: Vec<String> = tasks.iter().map(|t| t.key().to_string()).collect();
        self.report(|| log::error!("circular dependency between tasks {}", keys.join(", ")));
    }

    fn on_self_dependency(&self, task: &T) {
        self.report(|| log::error!("task {} has dependency on self", task.key()));
    }

    fn on_tolerance_exceeded(&self, failed: usize, tolerance: usize) {
        self.report(|| {
            log::error!(
                "number failed tasks {failed} exceeded tolerance for failed tasks {tolerance}"
            );
        });
    }
}

fn progress_bar(ctx: &Context, len: usize) -> Result<ProgressBar> {
    if ctx.quiet {
        return Ok(ProgressBar::hidden());
    }
    let pb = ProgressBar::new(len as u64);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("{spinner:.green} [{bar:40.cyan/blue}] {pos}/{len} {msg}")
            .context("Invalid progress template")?
            .progress_chars("=>-"),
    );
    Ok(pb)
}

/// Run every task of `graph` and print a summary
///
/// Task failures within tolerance are part of the returned summary; structural
/// problems and an exceeded tolerance are errors.
pub async fn execute<T>(ctx: &Context, graph: &TaskGraph<T>, options: &RunOptions) -> Result<RunSummary>
where
    T: Task,
    T::Key: 'static,
{
    if graph.is_empty() {
        return Ok(RunSummary::default());
    }

    let progress = progress_bar(ctx, graph.len())?;
    let delegate = LogDelegate::new(progress.clone());

    let result = taskgraph::run(graph, options, &delegate).await;
    progress.finish_and_clear();

    let summary = result?;
    if !ctx.quiet {
        print_summary(&summary);
    }
    Ok(summary)
}

/// Confirm with user, unless `yes` was given
pub fn confirm_proceed(yes: bool) -> Result<bool> {
    use dialoguer::Confirm;

    if yes {
        return Ok(true);
    }

    let confirmed = Confirm::new()
        .with_prompt("Continue?")
        .default(true)
        .interact()?;

    Ok(confirmed)
}

/// Print final summary
fn print_summary(summary: &RunSummary) {
    println!();
    if summary.is_success() {
        println!("  {} Update completed successfully!", "✓".green().bold());
    } else {
        println!("  {} Update completed with errors", "⚠".yellow().bold());
    }

    if summary.succeeded > 0 {
        println!("    • {} tasks succeeded", summary.succeeded);
    }
    if summary.skipped > 0 {
        println!("    • {} tasks skipped", summary.skipped);
    }
    if summary.failed > 0 {
        println!("    • {} {} failed", summary.failed, "tasks".red());
    }
}
