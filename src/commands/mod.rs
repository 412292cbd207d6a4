pub mod apply;
pub mod destroy;
pub mod plan;
pub mod show;

use crate::Context;
use crate::state::State;
use crate::ui;
use anyhow::{Context as _, Result};
use cobblerkit::Client;
use reconcile::{
    Action, ExclusiveSection, RemoteClient, Reconciler, ResourceData, Summary, Target,
};
use std::fmt::Display;

/// Log in to Cobbler with the resolved settings
pub fn connect(ctx: &Context) -> Result<Client> {
    let options = ctx.settings.connect_options()?;
    log::info!("Connecting to {}", options.url);
    Client::connect(&options).with_context(|| format!("Could not log in to {}", options.url))
}

/// Reconciler configured from the settings
pub fn reconciler<'a>(
    ctx: &Context,
    client: &'a dyn RemoteClient,
    section: &'a dyn ExclusiveSection,
) -> Reconciler<'a> {
    Reconciler::new(client, section)
        .with_behaviors(ctx.settings.behaviors())
        .with_policy(ctx.settings.interface_policy)
}

/// Confirm with user
pub fn confirm(prompt: &str) -> Result<bool> {
    let confirmed = dialoguer::Confirm::new()
        .with_prompt(prompt)
        .default(false)
        .interact()?;
    Ok(confirmed)
}

/// What a batch of reconciliations did
#[derive(Debug, Default)]
pub struct Report {
    pub summary: Summary,
    pub failures: Vec<(Target, String)>,
}

impl Report {
    pub fn add(&mut self, action: Action, target: &Target, quiet: bool) {
        if !quiet {
            ui::change(action, target);
        }
        self.summary.add(action);
    }

    pub fn fail(&mut self, target: Target, err: impl Display) {
        let message = err.to_string();
        ui::error(&message);
        self.summary.failed += 1;
        self.failures.push((target, message));
    }

    pub fn is_success(&self) -> bool {
        self.summary.is_success()
    }

    /// Print the summary and turn failures into an error
    pub fn finish(&self) -> Result<()> {
        ui::summary(&self.summary);
        if self.is_success() {
            return Ok(());
        }
        for (target, _) in &self.failures {
            ui::dim(&format!("failed: {target}"));
        }
        anyhow::bail!(
            "{} of {} entities failed",
            self.summary.failed,
            self.summary.total()
        )
    }
}

/// Delete `records` in the given order and drop them from the state.
///
/// An entity that is already gone counts as deleted.
pub fn delete_records(
    reconciler: &Reconciler<'_>,
    state: &mut State,
    records: Vec<ResourceData>,
    report: &mut Report,
    quiet: bool,
) {
    for record in records {
        let target = record.target();
        match reconciler.delete(record.kind, &record.name) {
            Ok(outcome) => report.add(outcome.action, &target, quiet),
            Err(e) if e.is_not_found() => {
                log::info!("{target} was already gone");
                report.add(Action::Deleted, &target, quiet);
            }
            Err(e) => {
                report.fail(target, e);
                continue;
            }
        }
        state.remove(record.kind, &record.name);
    }
}
