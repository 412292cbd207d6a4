use super::{Report, delete_records};
use crate::Context;
use crate::state::State;
use crate::ui;
use anyhow::Result;
use reconcile::{ProcessLock, Reconciler};

pub fn run(ctx: &Context, yes: bool) -> Result<()> {
    let state_path = &ctx.settings.state_file;
    let mut state = State::load(state_path)?;
    if state.is_empty() {
        ui::info("No managed entities in the state file");
        return Ok(());
    }

    ui::header("Destroy");
    for record in state.teardown() {
        ui::kv("delete", &record.target().to_string());
    }
    println!();
    if !yes && !super::confirm("Delete these entities from Cobbler?")? {
        ui::info("Cancelled");
        return Ok(());
    }

    let client = super::connect(ctx)?;
    let lock = ProcessLock::new();
    let reconciler = super::reconciler(ctx, &client, &lock);

    let report = destroy_all(&reconciler, &mut state, ctx.quiet);
    state.save(state_path)?;
    report.finish()
}

/// Delete every recorded entity, dependents first.
///
/// Records of entities that fail to delete stay in the state.
pub fn destroy_all(reconciler: &Reconciler<'_>, state: &mut State, quiet: bool) -> Report {
    let mut report = Report::default();
    let records = state.teardown();
    delete_records(reconciler, state, records, &mut report, quiet);
    report
}
