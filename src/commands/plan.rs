use crate::Context;
use crate::manifest::Manifest;
use crate::state::State;
use crate::ui;
use anyhow::Result;
use reconcile::{Action, NoLock, Reconciler, Summary, Target};
use std::path::Path;

/// Changes apply would make, in execution order
#[derive(Debug, Default)]
pub struct Plan {
    pub changes: Vec<(Action, Target)>,
}

impl Plan {
    pub fn has_changes(&self) -> bool {
        self.changes.iter().any(|(action, _)| action.is_change())
    }

    pub fn summary(&self) -> Summary {
        let mut summary = Summary::default();
        for (action, _) in &self.changes {
            summary.add(*action);
        }
        summary
    }

    pub fn print(&self, quiet: bool) {
        for (action, target) in &self.changes {
            if quiet && !action.is_change() {
                continue;
            }
            ui::change(*action, target);
        }
    }
}

/// Read every declared entity and decide what to do with it.
///
/// Records the manifest no longer declares are planned for deletion.
pub fn build(reconciler: &Reconciler<'_>, manifest: &Manifest, state: &State) -> Result<Plan> {
    let mut plan = Plan::default();
    for desired in &manifest.entities {
        let prior = state.get(desired.kind, &desired.name);
        let action = reconciler.plan(desired, prior)?;
        plan.changes.push((action, desired.target()));
    }
    for orphan in state.orphans(manifest) {
        plan.changes.push((Action::Deleted, orphan.target()));
    }
    Ok(plan)
}

pub fn run(ctx: &Context, manifest_path: &Path) -> Result<()> {
    let manifest = Manifest::load(manifest_path)?;
    let state = State::load(&ctx.settings.state_file)?;
    let client = super::connect(ctx)?;
    // Planning never mutates, so nothing needs serializing
    let lock = NoLock;
    let reconciler = super::reconciler(ctx, &client, &lock);

    ui::header("Plan");
    let plan = build(&reconciler, &manifest, &state)?;
    plan.print(ctx.quiet);

    println!();
    if plan.has_changes() {
        ui::info(&format!("Plan: {}", ui::format_summary(&plan.summary())));
    } else {
        ui::success("Cobbler matches the manifest");
    }
    Ok(())
}
