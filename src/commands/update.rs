use anyhow::Result;
use orgbinder::{OrgTaskKey, StateAccessor};

use super::{Session, after_flush, never_started};
use crate::Context;
use crate::cli::UpdateArgs;
use crate::engine::{self, differ};
use crate::{template, ui};

pub async fn run(ctx: &Context, args: &UpdateArgs) -> Result<()> {
    let mut session = Session::open(ctx)?;
    let template = template::load(&args.template)?;
    let options = session.settings.run_options(
        args.run.max_concurrent_tasks,
        args.run.failed_tasks_tolerance,
    );
    let serialized = template.to_json()?;
    let binder = session.bind(&template)?;

    if let Some(account_id) = template.master_account_id() {
        session.shared.set_master_account_id(account_id.to_string());
    }

    let rows = differ::compute_rows(&binder.bindings());
    if !ctx.quiet {
        ui::header(&format!("Update from {}", args.template.display()));
        differ::display_diff(&rows);
    }

    let graph = binder.enum_tasks();
    if !graph.is_empty() && !engine::confirm_proceed(args.yes)? {
        ui::warn("Aborted");
        return Ok(());
    }

    let result = engine::execute(ctx, &graph, &options).await;
    if never_started::<OrgTaskKey, _>(&result) {
        return result.map(|_| ());
    }
    // Committed hashes are kept after partial failures while the previous
    // template is not, so the next run diffs those resources against an older
    // definition. TODO: record per-resource definitions alongside the hash.
    if let Ok(summary) = &result
        && summary.failed == 0
    {
        session.shared.set_previous_template(serialized);
    }

    let summary = after_flush(result, session.flush())?;
    if summary.failed > 0 {
        anyhow::bail!("{} of {} tasks failed", summary.failed, graph.len());
    }
    Ok(())
}
