use anyhow::{Context as AnyhowContext, Result, bail};
use async_trait::async_trait;
use colored::Colorize;
use orgbinder::{PluginBinder, PluginExecutor, PluginTarget, PluginWorkload, TaskAction};
use std::sync::Arc;
use tokio::process::Command;

use super::{Session, after_flush};
use crate::Context;
use crate::cli::WorkloadArgs;
use crate::engine;
use crate::template::WorkloadFile;
use crate::ui;

/// Runs workload commands through `sh -c`
///
/// Commands see the target and workload through `ORGFORM_*` variables.
pub struct ShellExecutor {
    command: String,
    delete_command: Option<String>,
}

impl ShellExecutor {
    pub fn new(command: String, delete_command: Option<String>) -> Self {
        Self {
            command,
            delete_command,
        }
    }

    async fn sh(
        &self,
        command: &str,
        action: &str,
        workload: &PluginWorkload,
        target: &PluginTarget,
    ) -> Result<()> {
        log::debug!("Running `{command}` for {} in {target}", workload.name);
        let output = Command::new("sh")
            .arg("-c")
            .arg(command)
            .env("ORGFORM_ACTION", action)
            .env("ORGFORM_WORKLOAD_TYPE", &workload.plugin_type)
            .env("ORGFORM_WORKLOAD_NAME", &workload.name)
            .env("ORGFORM_WORKLOAD_HASH", &workload.hash)
            .env("ORGFORM_ACCOUNT_ID", &target.account_id)
            .env("ORGFORM_REGION", &target.region)
            .env("ORGFORM_PARAMETERS", workload.definition["parameters"].to_string())
            .output()
            .await
            .with_context(|| format!("Failed to run `{command}`"))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            bail!("`{command}` exited with {}: {}", output.status, stderr.trim());
        }
        Ok(())
    }
}

#[async_trait]
impl PluginExecutor for ShellExecutor {
    async fn perform_create_or_update(
        &self,
        workload: &PluginWorkload,
        target: &PluginTarget,
    ) -> Result<()> {
        self.sh(&self.command, "deploy", workload, target).await
    }

    async fn perform_delete(&self, workload: &PluginWorkload, target: &PluginTarget) -> Result<()> {
        match &self.delete_command {
            Some(command) => self.sh(command, "delete", workload, target).await,
            None => {
                log::warn!(
                    "No delete command for {}; forgetting {target} without cleanup",
                    workload.name
                );
                Ok(())
            }
        }
    }
}

fn display_changes(workload: &PluginWorkload, changes: &[(PluginTarget, TaskAction)]) {
    if changes.is_empty() {
        println!();
        println!("  {} No changes needed", "✓".green());
        return;
    }

    println!();
    println!("{} {}", workload.plugin_type.bold(), workload.name.bold());
    for (target, action) in changes {
        let symbol = match action {
            TaskAction::Create => "+".green(),
            TaskAction::Delete => "-".red(),
            _ => "~".yellow(),
        };
        println!("  {symbol} {target}");
    }
}

pub async fn run(ctx: &Context, args: &WorkloadArgs) -> Result<()> {
    let mut session = Session::open(ctx)?;
    let file = WorkloadFile::load(&args.definition)?;
    let options = session.settings.run_options(
        args.run.max_concurrent_tasks,
        args.run.failed_tasks_tolerance,
    );

    let workload = file.workload();
    let executor = Arc::new(ShellExecutor::new(
        file.command.clone(),
        file.delete_command.clone(),
    ));
    let binder = PluginBinder::new(
        workload.clone(),
        file.targets.clone(),
        Arc::new(session.shared.clone()),
        executor,
    );

    let changes = binder.changes();
    if !ctx.quiet {
        ui::header(&format!("Workload {}", args.definition.display()));
        display_changes(&workload, &changes);
    }
    if changes.is_empty() {
        return Ok(());
    }
    if !engine::confirm_proceed(args.yes)? {
        ui::warn("Aborted");
        return Ok(());
    }

    let graph = binder.enum_tasks();
    let result = engine::execute(ctx, &graph, &options).await;
    let summary = after_flush(result, session.flush())?;
    if summary.failed > 0 {
        bail!("{} of {} targets failed", summary.failed, graph.len());
    }
    Ok(())
}
