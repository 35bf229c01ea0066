//! Stack commands
//!
//! - `plan` - Synthesize a stack and show the ordered plan
//! - `graph` - Show the dependency graph and waves
//! - `validate` - Check a stack without printing the plan
//! - `outputs` - Show outputs resolved against recorded state
//! - `diff` - Preview what apply would change
//! - `apply` - Provision the plan and record state

use anyhow::{Context as AnyhowContext, Result};
use declarative::{ExecuteOptions, Plan, PriorState, compute_diffs};
use std::collections::BTreeSet;
use std::path::PathBuf;

use crate::Context;
use crate::cli::{ApplyArgs, GraphArgs, GraphFormat, OutputFormat, PlanArgs, StackArgs, StateArgs};
use crate::engine::{SimulatedProvisioner, differ, executor, planner};
use crate::paths;
use crate::state::StackState;
use crate::ui;

// ============================================================================
// Plan / Graph / Validate
// ============================================================================

pub fn plan(ctx: &Context, args: PlanArgs) -> Result<()> {
    let loaded = planner::load(&args.stack.file, args.target.as_deref())?;

    match args.format {
        OutputFormat::Json => println!("{}", planner::plan_json(&loaded.synthesis)?),
        OutputFormat::Text => planner::display_plan(&loaded.synthesis, ctx.verbose > 0),
    }
    Ok(())
}

pub fn graph(_ctx: &Context, args: GraphArgs) -> Result<()> {
    let loaded = planner::load(&args.stack.file, None)?;
    let plan = &loaded.synthesis.plan;

    match args.format {
        GraphFormat::Text => planner::display_graph(&loaded.stack, plan),
        GraphFormat::Json => println!("{}", planner::graph_json(&loaded.stack, plan)?),
        GraphFormat::Dot => print!("{}", planner::graph_dot(&loaded.stack, plan)),
    }
    Ok(())
}

pub fn validate(ctx: &Context, args: StackArgs) -> Result<()> {
    let loaded = planner::load(&args.file, None)?;
    let plan = &loaded.synthesis.plan;

    if !ctx.quiet {
        ui::success(&format!(
            "Stack '{}' is valid: {} in {}, {}",
            plan.stack,
            ui::count(plan.len(), "resource"),
            ui::count(plan.waves.len(), "wave"),
            ui::count(loaded.synthesis.outputs.len(), "output")
        ));
        for (id, external) in loaded.stack.overrides().iter() {
            ui::dim(&format!("{id} is addressed as {external}"));
        }
    }
    Ok(())
}

// ============================================================================
// State-backed commands
// ============================================================================

/// Stack synthesis plus the state recorded for it
struct Session {
    loaded: planner::Loaded,
    state_path: PathBuf,
    state: StackState,
}

fn open(args: &StateArgs) -> Result<Session> {
    let loaded = planner::load(&args.stack.file, args.target.as_deref())?;
    let name = loaded.stack.name().to_string();
    let state_path = paths::state_file(args.state.as_deref(), &name)?;
    let state = StackState::load(&state_path, &name)?;
    Ok(Session {
        loaded,
        state_path,
        state,
    })
}

impl Session {
    /// Prior state limited to what the (possibly targeted) plan covers
    fn prior(&self, targeted: bool) -> PriorState {
        if targeted {
            scoped_prior(&self.state.prior, &self.loaded.synthesis.plan)
        } else {
            self.state.prior.clone()
        }
    }
}

/// Keep only recorded resources whose address is in `plan`, so a targeted
/// run never deletes resources outside its target.
fn scoped_prior(prior: &PriorState, plan: &Plan) -> PriorState {
    let addresses: BTreeSet<String> = plan.entries.iter().map(|e| e.address()).collect();
    PriorState {
        resources: prior
            .resources
            .iter()
            .filter(|(address, _)| addresses.contains(*address))
            .map(|(address, resource)| (address.clone(), resource.clone()))
            .collect(),
    }
}

/// Fold a targeted run's state back into the full recorded state.
fn merge_scoped(full: &PriorState, scoped_before: &PriorState, after: PriorState) -> PriorState {
    let mut merged = full.clone();
    for address in scoped_before.resources.keys() {
        merged.remove(address);
    }
    merged.resources.extend(after.resources);
    merged
}

pub fn outputs(ctx: &Context, args: StateArgs) -> Result<()> {
    let session = open(&args)?;
    let synthesis = &session.loaded.synthesis;
    let prior = session.prior(args.target.is_some());

    let opts = ExecuteOptions {
        dry_run: true,
        verbose: ctx.verbose > 0,
        ..ExecuteOptions::default()
    };
    let execution = declarative::execute_simple(
        synthesis,
        &prior,
        &opts,
        &SimulatedProvisioner::for_synthesis(synthesis),
    )?;
    let rows = planner::output_rows(&synthesis.outputs, Some(&execution.outputs));

    match args.format {
        OutputFormat::Json => println!(
            "{}",
            serde_json::to_string_pretty(&rows).context("Failed to serialize outputs")?
        ),
        OutputFormat::Text => {
            ui::header(&format!("Outputs: {}", synthesis.plan.stack));
            planner::display_outputs(&rows);
            if rows.iter().any(|r| !r.known) {
                println!();
                ui::info("Some outputs are only known after apply");
            }
        }
    }
    Ok(())
}

pub fn diff(ctx: &Context, args: StateArgs) -> Result<()> {
    let session = open(&args)?;
    let prior = session.prior(args.target.is_some());
    let diffs = compute_diffs(&session.loaded.synthesis.plan, &prior);

    match args.format {
        OutputFormat::Json => println!(
            "{}",
            serde_json::to_string_pretty(&diffs).context("Failed to serialize diff")?
        ),
        OutputFormat::Text => {
            ui::header(&format!("Diff: {}", session.loaded.synthesis.plan.stack));
            ui::kv("State", &session.state_path.display().to_string());
            differ::display_diff(&diffs, ctx.verbose > 0);
        }
    }
    Ok(())
}

pub fn apply(ctx: &Context, args: ApplyArgs) -> Result<()> {
    let ApplyArgs {
        state: state_args,
        dry_run,
        yes,
        jobs,
    } = args;

    let mut session = open(&state_args)?;
    let synthesis = &session.loaded.synthesis;
    let targeted = state_args.target.is_some();
    let prior = session.prior(targeted);

    ui::header(&format!("Applying {}", synthesis.plan.stack));
    if dry_run {
        ui::warn("Dry run - no changes will be made");
    }

    let diffs = compute_diffs(&synthesis.plan, &prior);
    differ::display_diff(&diffs, ctx.verbose > 0);

    let opts = ExecuteOptions {
        dry_run,
        jobs,
        verbose: ctx.verbose > 0,
    };
    let provisioner = SimulatedProvisioner::for_synthesis(synthesis);
    let execution = executor::run(synthesis, &prior, &opts, &provisioner, yes, ctx.quiet)?;

    if dry_run {
        println!();
        ui::info("Dry run - no changes made");
        return Ok(());
    }
    if execution.results.is_empty() {
        // Declined, or nothing to change.
        if execution.summary.skipped > 0 {
            println!();
            ui::error("Aborted");
        }
        return Ok(());
    }

    executor::print_problems(&execution);
    executor::print_summary(&execution.summary);

    let fingerprint = synthesis.plan.fingerprint();
    let recorded = if targeted {
        merge_scoped(&session.state.prior, &prior, execution.state)
    } else {
        execution.state
    };
    session.state.update(recorded, &fingerprint);
    session.state.save(&session.state_path)?;
    log::info!("state written to {}", session.state_path.display());

    let rows = planner::output_rows(&synthesis.outputs, Some(&execution.outputs));
    if !rows.is_empty() && !ctx.quiet {
        ui::section("Outputs");
        planner::display_outputs(&rows);
    }

    if !execution.summary.is_success() {
        anyhow::bail!("{} failed", ui::count(execution.summary.failed, "resource"));
    }
    Ok(())
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use declarative::Stack;

    fn plan(ids: &[&str]) -> Plan {
        let mut stack = Stack::new("t");
        for id in ids {
            stack.resource("thing").id(*id).create().unwrap();
        }
        stack.synthesize().unwrap().plan
    }

    #[test]
    fn test_scoped_prior_keeps_planned_addresses() {
        let full = PriorState::from_plan(&plan(&["a", "b", "c"]));
        let scoped = scoped_prior(&full, &plan(&["b"]));
        let addresses: Vec<_> = scoped.resources.keys().map(String::as_str).collect();
        assert_eq!(addresses, vec!["thing.b"]);
    }

    #[test]
    fn test_merge_scoped_keeps_untargeted_resources() {
        let full = PriorState::from_plan(&plan(&["a", "b"]));
        let scoped = scoped_prior(&full, &plan(&["b"]));
        let after = PriorState::from_plan(&plan(&["b", "d"]));

        let merged = merge_scoped(&full, &scoped, after);
        let addresses: Vec<_> = merged.resources.keys().map(String::as_str).collect();
        assert_eq!(addresses, vec!["thing.a", "thing.b", "thing.d"]);
    }
}
