//! Execution engine - provisions a plan wave by wave
//!
//! Each wave is provisioned in parallel on a rayon pool. Attributes reported
//! by the provisioner are recorded and substituted into the placeholders of
//! later waves and of the outputs.

use crate::context::{AutoConfirm, ConfirmCallback, NoProgress, ProgressCallback};
use crate::diff::{DiffAction, PriorState, ResourceDiff, compute_diffs, known_values, lookup_known};
use crate::planner::PlanEntry;
use crate::resolved::{Placeholder, ResolvedValue};
use crate::resource::ResourceMode;
use crate::synth::Synthesis;
use crate::types::{ApplyResult, ExecuteOptions, ExecuteSummary};
use anyhow::Result;
use rayon::prelude::*;
use std::collections::{BTreeMap, HashMap, HashSet};

/// Attribute values keyed by attribute name.
pub type Attributes = BTreeMap<String, ResolvedValue>;

/// Work handed to a [`Provisioner`] for one resource.
#[derive(Debug, Clone, PartialEq)]
pub struct ProvisionRequest {
    pub id: String,
    pub external_name: String,
    pub kind: String,
    pub mode: ResourceMode,
    pub action: DiffAction,
    /// Config with every known placeholder substituted
    pub config: Attributes,
}

/// What a provisioner reports back.
#[derive(Debug, Clone, PartialEq)]
pub struct Provisioned {
    pub outcome: ApplyResult,
    /// Attributes computed by the provider (`id`, `principal_id`, ...)
    pub attributes: Attributes,
}

/// The external provisioning executor.
///
/// Implementations talk to the actual provider. Calls within a wave run
/// concurrently.
pub trait Provisioner: Send + Sync {
    /// Create, update, replace or read one resource
    fn provision(&self, request: &ProvisionRequest) -> Result<Provisioned>;

    /// Destroy a resource that is no longer declared
    fn destroy(&self, external_name: &str, kind: &str) -> Result<()> {
        anyhow::bail!("cannot destroy {kind} '{external_name}': not supported by this provisioner")
    }
}

/// Outcome of [`execute`].
#[derive(Debug, Clone, Default)]
pub struct Execution {
    pub summary: ExecuteSummary,
    /// Per-resource results in plan order (address, result)
    pub results: Vec<(String, ApplyResult)>,
    /// Known attributes per internal id
    pub attributes: BTreeMap<String, Attributes>,
    /// Outputs with every known placeholder substituted
    pub outputs: BTreeMap<String, ResolvedValue>,
    /// State to record for the next run
    pub state: PriorState,
}

/// Execute a synthesized stack against a provisioner
///
/// # Arguments
/// * `synthesis` - The plan and outputs to realize
/// * `prior` - State recorded by the previous run
/// * `opts` - Execution options (dry_run, jobs, verbose)
/// * `provisioner` - Talks to the provider
/// * `progress` - Progress callback
/// * `confirm` - Confirmation callback
pub fn execute<V, P, C>(
    synthesis: &Synthesis,
    prior: &PriorState,
    opts: &ExecuteOptions,
    provisioner: &V,
    progress: &mut P,
    confirm: &mut C,
) -> Result<Execution>
where
    V: Provisioner,
    P: ProgressCallback,
    C: ConfirmCallback,
{
    let plan = &synthesis.plan;
    let diffs = compute_diffs(plan, prior);
    let total_changes = diffs.iter().filter(|d| d.is_change()).count();

    let mut known = known_values(plan.entries.iter(), prior);
    let mut execution = Execution {
        state: prior.clone(),
        ..Execution::default()
    };

    if total_changes == 0 {
        log::info!("no changes to apply");
        execution.outputs = resolve_outputs(synthesis, &known);
        execution.attributes = known;
        return Ok(execution);
    }

    // Confirm before proceeding (unless dry_run)
    if !opts.dry_run && !confirm.confirm("Apply changes?")? {
        execution.summary.skipped = total_changes;
        return Ok(execution);
    }

    if opts.dry_run {
        log::info!("dry run: {total_changes} change(s) not applied");
        execution.outputs = resolve_outputs(synthesis, &known);
        execution.attributes = known;
        return Ok(execution);
    }

    let pool = rayon::ThreadPoolBuilder::new()
        .num_threads(opts.jobs.max(1))
        .build()
        .map_err(|e| anyhow::anyhow!("Failed to create thread pool: {e}"))?;

    let actions: HashMap<&str, &ResourceDiff> = diffs
        .iter()
        .filter_map(|d| d.id.as_deref().map(|id| (id, d)))
        .collect();
    let mut blocked: HashSet<String> = HashSet::new();
    let mut results: HashMap<String, ApplyResult> = HashMap::new();

    for (index, wave) in plan.waves.iter().enumerate() {
        progress.on_wave_start(index, wave.len());
        log::debug!("wave {index}: {}", wave.join(", "));

        let mut requests = Vec::new();
        for id in wave {
            let Some(entry) = plan.entry(id) else {
                continue;
            };
            let action = actions.get(id.as_str()).map_or(DiffAction::Create, |d| d.action);

            if let Some(dep) = entry.depends_on.iter().find(|d| blocked.contains(*d)) {
                let result = ApplyResult::Skipped {
                    reason: format!("dependency '{dep}' did not complete"),
                };
                progress.on_resource_complete(id, &result);
                blocked.insert(id.clone());
                results.insert(id.clone(), result);
                continue;
            }
            if action == DiffAction::NoChange {
                progress.on_resource_complete(id, &ApplyResult::NoChange);
                results.insert(id.clone(), ApplyResult::NoChange);
                continue;
            }

            if let Some(previous) = actions.get(id.as_str()).and_then(|d| d.replaces.as_ref()) {
                // The old address goes before its replacement is created.
                if let Err(e) = provisioner.destroy(&previous.external_name, &previous.kind) {
                    let result = ApplyResult::Failed {
                        error: format!("{e:#}"),
                    };
                    progress.on_resource_complete(id, &result);
                    blocked.insert(id.clone());
                    results.insert(id.clone(), result);
                    continue;
                }
                execution
                    .state
                    .remove(&format!("{}.{}", previous.kind, previous.external_name));
            }

            progress.on_resource_start(id, &entry.external_name);
            if opts.verbose {
                log::info!("{action} {}", entry.address());
            }
            requests.push(build_request(entry, action, &known));
        }

        let outcomes: Vec<(ProvisionRequest, Result<Provisioned>)> = pool.install(|| {
            requests
                .into_par_iter()
                .map(|request| {
                    let outcome = provisioner.provision(&request);
                    (request, outcome)
                })
                .collect()
        });

        for (request, outcome) in outcomes {
            let result = match outcome {
                Ok(provisioned) if provisioned.outcome.is_success() => {
                    let attrs = known.entry(request.id.clone()).or_default();
                    attrs.extend(request.config.clone().into_iter().filter(|(_, v)| v.is_concrete()));
                    attrs.extend(provisioned.attributes);
                    execution.state.record(
                        entry_of(synthesis, &request.id)?,
                        ResolvedValue::Map(request.config).to_json(),
                        attrs.iter().map(|(k, v)| (k.clone(), v.to_json())).collect(),
                    );
                    provisioned.outcome
                }
                Ok(provisioned) => {
                    blocked.insert(request.id.clone());
                    provisioned.outcome
                }
                Err(e) => {
                    log::warn!("{} failed: {e:#}", request.external_name);
                    blocked.insert(request.id.clone());
                    ApplyResult::Failed {
                        error: format!("{e:#}"),
                    }
                }
            };
            if opts.verbose {
                log::info!("{}.{}: {result:?}", request.kind, request.external_name);
            }
            progress.on_resource_complete(&request.id, &result);
            results.insert(request.id, result);
        }
        progress.on_wave_complete();
    }

    for entry in &plan.entries {
        if let Some(result) = results.remove(&entry.id) {
            execution.summary.add_result(&result);
            execution.results.push((entry.address(), result));
        }
    }

    // Resources no longer declared go last, after their dependents moved on.
    for diff in diffs.iter().filter(|d| d.action == DiffAction::Delete) {
        if opts.verbose {
            log::info!("delete {}", diff.address);
        }
        progress.on_resource_start(&diff.address, &diff.external_name);
        let result = match provisioner.destroy(&diff.external_name, &diff.kind) {
            Ok(()) => {
                execution.state.remove(&diff.address);
                ApplyResult::Deleted
            }
            Err(e) => ApplyResult::Failed {
                error: format!("{e:#}"),
            },
        };
        progress.on_resource_complete(&diff.address, &result);
        execution.summary.add_result(&result);
        execution.results.push((diff.address.clone(), result));
    }

    execution.outputs = resolve_outputs(synthesis, &known);
    execution.attributes = known;
    Ok(execution)
}

/// Execute without progress reporting or confirmation
pub fn execute_simple<V: Provisioner>(
    synthesis: &Synthesis,
    prior: &PriorState,
    opts: &ExecuteOptions,
    provisioner: &V,
) -> Result<Execution> {
    execute(
        synthesis,
        prior,
        opts,
        provisioner,
        &mut NoProgress,
        &mut AutoConfirm,
    )
}

fn entry_of<'a>(synthesis: &'a Synthesis, id: &str) -> Result<&'a PlanEntry> {
    synthesis
        .plan
        .entry(id)
        .ok_or_else(|| anyhow::anyhow!("resource '{id}' is not in the plan"))
}

fn build_request(
    entry: &PlanEntry,
    action: DiffAction,
    known: &BTreeMap<String, Attributes>,
) -> ProvisionRequest {
    let lookup = |p: &Placeholder| lookup_known(known, p);
    ProvisionRequest {
        id: entry.id.clone(),
        external_name: entry.external_name.clone(),
        kind: entry.kind.clone(),
        mode: entry.mode,
        action,
        config: entry
            .config
            .iter()
            .map(|(k, v)| (k.clone(), v.substitute(&lookup)))
            .collect(),
    }
}

fn resolve_outputs(
    synthesis: &Synthesis,
    known: &BTreeMap<String, Attributes>,
) -> BTreeMap<String, ResolvedValue> {
    let lookup = |p: &Placeholder| lookup_known(known, p);
    synthesis
        .outputs
        .iter()
        .map(|(name, output)| (name.clone(), output.value.substitute(&lookup)))
        .collect()
}
