use anyhow::Result;

use super::Session;
use crate::Context;
use crate::cli::PlanArgs;
use crate::engine::differ;
use crate::{template, ui};

pub fn run(ctx: &Context, args: &PlanArgs) -> Result<()> {
    let session = Session::open(ctx)?;
    let template = template::load(&args.template)?;
    let binder = session.bind(&template)?;

    ui::header(&format!("Plan for {}", args.template.display()));
    let rows = differ::compute_rows(&binder.bindings());
    differ::display_diff(&rows);

    if args.tasks {
        differ::display_tasks(&binder.enum_tasks());
    }
    Ok(())
}
