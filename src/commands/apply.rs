use super::{Report, delete_records};
use crate::Context;
use crate::cli::ApplyArgs;
use crate::manifest::Manifest;
use crate::state::State;
use crate::{progress, ui};
use anyhow::{Context as _, Result};
use rayon::prelude::*;
use reconcile::{EntityKind, Outcome, ProcessLock, Reconciler, ResourceData, Target};

pub fn run(ctx: &Context, args: &ApplyArgs) -> Result<()> {
    let manifest = Manifest::load(&args.manifest)?;
    let state_path = &ctx.settings.state_file;
    let mut state = State::load(state_path)?;
    let client = super::connect(ctx)?;
    let lock = ProcessLock::new();
    let reconciler = super::reconciler(ctx, &client, &lock);

    ui::header("Plan");
    let plan = super::plan::build(&reconciler, &manifest, &state)?;
    plan.print(ctx.quiet);
    if !plan.has_changes() {
        println!();
        ui::success("Cobbler matches the manifest");
        return Ok(());
    }

    println!();
    ui::info(&format!("Plan: {}", ui::format_summary(&plan.summary())));
    if !args.yes && !super::confirm("Apply these changes?")? {
        ui::info("Cancelled");
        return Ok(());
    }

    ui::header("Applying");
    let result = execute(&reconciler, &manifest, &mut state, args.jobs, ctx.quiet);
    // Whatever succeeded is recorded, even when the run failed part-way
    state.save(state_path)?;
    result?.finish()
}

/// Reconcile the manifest against Cobbler and record the results in `state`.
///
/// Every kind but systems runs one at a time in dependency order, and the
/// run stops at the first failure. Systems then reconcile on a pool of
/// `jobs` threads. Orphaned records are deleted only
/// when everything else succeeded.
pub fn execute(
    reconciler: &Reconciler<'_>,
    manifest: &Manifest,
    state: &mut State,
    jobs: usize,
    quiet: bool,
) -> Result<Report> {
    let mut report = Report::default();

    let (systems, others): (Vec<&ResourceData>, Vec<&ResourceData>) = manifest
        .entities
        .iter()
        .partition(|e| e.kind == EntityKind::System);

    for desired in others {
        let target = desired.target();
        let result = reconciler.reconcile(desired, state.get(desired.kind, &desired.name));
        record(state, &mut report, target, result, quiet);
        if !report.is_success() {
            log::warn!("Stopping before dependent entities");
            return Ok(report);
        }
    }

    if !systems.is_empty() {
        let results = reconcile_systems(reconciler, &systems, state, jobs, quiet)?;
        for (target, result) in results {
            record(state, &mut report, target, result, quiet);
        }
    }

    let orphans = state.orphans(manifest);
    if !report.is_success() {
        if !orphans.is_empty() {
            log::warn!("Skipping {} deletions after failures", orphans.len());
        }
        return Ok(report);
    }
    delete_records(reconciler, state, orphans, &mut report, quiet);

    Ok(report)
}

type Reconciled = (Target, reconcile::Result<Outcome>);

/// Reconcile systems in parallel, returning results in manifest order
fn reconcile_systems(
    reconciler: &Reconciler<'_>,
    systems: &[&ResourceData],
    state: &State,
    jobs: usize,
    quiet: bool,
) -> Result<Vec<Reconciled>> {
    let pb = if quiet {
        progress::hidden()
    } else {
        progress::bar(systems.len() as u64, "Systems")
    };

    let pool = rayon::ThreadPoolBuilder::new()
        .num_threads(jobs.max(1))
        .build()
        .context("Failed to create system thread pool")?;

    let results: Vec<Reconciled> = pool.install(|| {
        systems
            .par_iter()
            .map(|desired| {
                let target = desired.target();
                pb.set_message(target.name.clone());
                let result = reconciler.reconcile(desired, state.get(desired.kind, &desired.name));
                pb.inc(1);
                (target, result)
            })
            .collect()
    });

    pb.finish_and_clear();
    Ok(results)
}

fn record(
    state: &mut State,
    report: &mut Report,
    target: Target,
    result: reconcile::Result<Outcome>,
    quiet: bool,
) {
    match result {
        Ok(outcome) => {
            report.add(outcome.action, &target, quiet);
            match outcome.state {
                Some(record) => state.upsert(record),
                None => state.remove(target.kind, &target.name),
            }
        }
        Err(e) => report.fail(target, e),
    }
}
