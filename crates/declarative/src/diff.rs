//! Diff computation - a plan against previously recorded state

use crate::planner::{Plan, PlanEntry};
use crate::resolved::{Placeholder, ResolvedValue, TemplatePart};
use crate::resource::ResourceMode;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

/// What a resource looked like after the last apply.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PriorResource {
    /// Internal id at the time it was recorded
    pub id: String,
    pub kind: String,
    pub external_name: String,
    #[serde(default)]
    pub mode: ResourceMode,
    /// Config as applied (JSON object)
    pub config: serde_json::Value,
    /// Attributes reported by the provisioner
    #[serde(default)]
    pub attributes: BTreeMap<String, serde_json::Value>,
}

/// Recorded state, keyed by address (`kind.external_name`).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PriorState {
    #[serde(default)]
    pub resources: BTreeMap<String, PriorResource>,
}

impl PriorState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record every entry of a plan as if it had been applied unchanged.
    pub fn from_plan(plan: &Plan) -> Self {
        let mut state = Self::new();
        for entry in &plan.entries {
            state.record(entry, entry.config_json(), BTreeMap::new());
        }
        state
    }

    /// Record (or replace) one resource.
    pub fn record(
        &mut self,
        entry: &PlanEntry,
        config: serde_json::Value,
        attributes: BTreeMap<String, serde_json::Value>,
    ) {
        self.resources.insert(
            entry.address(),
            PriorResource {
                id: entry.id.clone(),
                kind: entry.kind.clone(),
                external_name: entry.external_name.clone(),
                mode: entry.mode,
                config,
                attributes,
            },
        );
    }

    pub fn get(&self, address: &str) -> Option<&PriorResource> {
        self.resources.get(address)
    }

    pub fn remove(&mut self, address: &str) -> Option<PriorResource> {
        self.resources.remove(address)
    }

    pub fn len(&self) -> usize {
        self.resources.len()
    }

    pub fn is_empty(&self) -> bool {
        self.resources.is_empty()
    }
}

/// Planned action for one resource.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DiffAction {
    Create,
    Update,
    Replace,
    Delete,
    /// Data source lookup
    Read,
    NoChange,
}

impl DiffAction {
    /// Symbol used when rendering a diff
    pub fn symbol(self) -> &'static str {
        match self {
            Self::Create => "+",
            Self::Update => "~",
            Self::Replace => "-/+",
            Self::Delete => "-",
            Self::Read => "<=",
            Self::NoChange => " ",
        }
    }
}

impl fmt::Display for DiffAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::Create => "create",
            Self::Update => "update",
            Self::Replace => "replace",
            Self::Delete => "delete",
            Self::Read => "read",
            Self::NoChange => "no change",
        };
        f.write_str(label)
    }
}

/// A diff between recorded and planned state of a resource
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ResourceDiff {
    /// `kind.external_name`
    pub address: String,
    pub external_name: String,
    /// Internal id, `None` for deletions
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    pub kind: String,
    pub action: DiffAction,
    /// Recorded resource this one replaces (renamed or re-kinded)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub replaces: Option<PriorResource>,
    /// Top-level config keys with a changed value anywhere beneath them
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub changed_keys: Vec<String>,
    /// Recorded config
    #[serde(skip_serializing_if = "Option::is_none")]
    pub before: Option<serde_json::Value>,
    /// Planned config with known values filled in (the rest as `${kind.name.attr}`)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub after: Option<serde_json::Value>,
}

impl ResourceDiff {
    /// Check if this diff changes infrastructure
    pub fn is_change(&self) -> bool {
        matches!(
            self.action,
            DiffAction::Create | DiffAction::Update | DiffAction::Replace | DiffAction::Delete
        )
    }

    fn for_entry(
        entry: &PlanEntry,
        config: BTreeMap<String, ResolvedValue>,
        prior: Option<&PriorResource>,
        moved: Option<&PriorResource>,
        changing: &BTreeSet<&str>,
    ) -> Self {
        let (action, changed_keys) = match (prior, moved) {
            _ if entry.mode == ResourceMode::Data => (DiffAction::Read, Vec::new()),
            (Some(prior), _) => {
                let changed = changed_keys(&config, &prior.config, changing);
                if changed.is_empty() {
                    (DiffAction::NoChange, changed)
                } else {
                    (DiffAction::Update, changed)
                }
            }
            (None, Some(_)) => (DiffAction::Replace, Vec::new()),
            (None, None) => (DiffAction::Create, Vec::new()),
        };
        let replaces = (action == DiffAction::Replace).then(|| moved.cloned()).flatten();

        Self {
            address: entry.address(),
            external_name: entry.external_name.clone(),
            id: Some(entry.id.clone()),
            kind: entry.kind.clone(),
            action,
            changed_keys,
            before: prior.or(replaces.as_ref()).map(|p| p.config.clone()),
            replaces,
            after: Some(ResolvedValue::Map(config).to_json()),
        }
    }
}

/// Top-level keys whose planned value differs anywhere from the recorded one.
///
/// Keys only present in the recorded config count as removed.
fn changed_keys(
    planned: &BTreeMap<String, ResolvedValue>,
    recorded: &serde_json::Value,
    changing: &BTreeSet<&str>,
) -> Vec<String> {
    let null = serde_json::Value::Null;
    let recorded = recorded.as_object();
    let get = |key: &str| recorded.and_then(|r| r.get(key)).unwrap_or(&null);

    let mut keys: BTreeSet<&str> = planned.keys().map(String::as_str).collect();
    if let Some(recorded) = recorded {
        keys.extend(recorded.keys().map(String::as_str));
    }

    keys.into_iter()
        .filter(|key| match planned.get(*key) {
            Some(value) => differs(value, get(key), changing),
            None => !get(key).is_null(),
        })
        .map(str::to_string)
        .collect()
}

/// Compare a planned value with its recorded JSON, descending into maps and
/// lists.
///
/// A leaf still deferred differs when it reads a node in `changing`. A
/// template also differs when its literal text no longer fits the recorded
/// string.
fn differs(planned: &ResolvedValue, recorded: &serde_json::Value, changing: &BTreeSet<&str>) -> bool {
    let reads_changing = || {
        planned
            .placeholders()
            .iter()
            .any(|p| changing.contains(p.node.as_str()))
    };
    match planned {
        ResolvedValue::Map(entries) => {
            let Some(object) = recorded.as_object() else {
                return true;
            };
            entries.iter().any(|(key, value)| {
                differs(value, object.get(key).unwrap_or(&serde_json::Value::Null), changing)
            }) || object
                .iter()
                .any(|(key, value)| !entries.contains_key(key) && !value.is_null())
        }
        ResolvedValue::List(items) => match recorded.as_array() {
            Some(array) if array.len() == items.len() => items
                .iter()
                .zip(array)
                .any(|(item, value)| differs(item, value, changing)),
            _ => true,
        },
        ResolvedValue::Deferred(_) => reads_changing(),
        ResolvedValue::Template(parts) => {
            reads_changing() || !recorded.as_str().is_some_and(|text| literals_fit(parts, text))
        }
        _ => planned.to_json() != *recorded,
    }
}

/// Whether the literal parts of a template appear in `text` in order,
/// anchored at both ends.
fn literals_fit(parts: &[TemplatePart], text: &str) -> bool {
    let last = parts.len().saturating_sub(1);
    let mut rest = text;
    for (index, part) in parts.iter().enumerate() {
        let TemplatePart::Literal(literal) = part else {
            continue;
        };
        if index == 0 {
            match rest.strip_prefix(literal.as_str()) {
                Some(tail) => rest = tail,
                None => return false,
            }
        } else if index == last {
            return rest.ends_with(literal.as_str());
        } else {
            match rest.find(literal.as_str()) {
                Some(at) => rest = &rest[at + literal.len()..],
                None => return false,
            }
        }
    }
    true
}

/// Values known before anything runs, per internal id: the attributes
/// recorded for resources that already exist, overlaid with concrete
/// planned config values.
pub(crate) fn known_values<'a>(
    entries: impl Iterator<Item = &'a PlanEntry>,
    prior: &PriorState,
) -> BTreeMap<String, BTreeMap<String, ResolvedValue>> {
    entries
        .map(|entry| {
            let mut attrs: BTreeMap<String, ResolvedValue> = prior
                .get(&entry.address())
                .map(|recorded| {
                    recorded
                        .attributes
                        .iter()
                        .map(|(k, v)| (k.clone(), ResolvedValue::from_json(v)))
                        .collect()
                })
                .unwrap_or_default();
            attrs.extend(
                entry
                    .config
                    .iter()
                    .filter(|(_, v)| v.is_concrete())
                    .map(|(k, v)| (k.clone(), v.clone())),
            );
            (entry.id.clone(), attrs)
        })
        .collect()
}

/// Find the value a placeholder stands for, following dotted paths into
/// nested attributes.
pub(crate) fn lookup_known(
    known: &BTreeMap<String, BTreeMap<String, ResolvedValue>>,
    placeholder: &Placeholder,
) -> Option<ResolvedValue> {
    let attrs = known.get(&placeholder.node)?;
    if let Some(value) = attrs.get(&placeholder.attribute) {
        return Some(value.clone());
    }
    let (head, rest) = placeholder.attribute.split_once('.')?;
    attrs.get(head)?.lookup(rest).cloned()
}

/// Compute diffs for every plan entry, then deletions.
///
/// Entries come out in plan order. Placeholders are filled from known
/// values before comparing, so only leaves that stay unknown are skipped.
/// A planned resource with no record at its address, whose internal id was
/// recorded under an address no longer planned, replaces that record.
/// Remaining recorded managed resources that are no longer planned follow as
/// deletions in address order.
pub fn compute_diffs(plan: &Plan, prior: &PriorState) -> Vec<ResourceDiff> {
    let planned: BTreeSet<String> = plan.entries.iter().map(PlanEntry::address).collect();
    let stale: BTreeMap<&str, &PriorResource> = prior
        .resources
        .iter()
        .filter(|(address, res)| !planned.contains(*address) && res.mode == ResourceMode::Managed)
        .map(|(_, res)| (res.id.as_str(), res))
        .collect();

    let known = known_values(plan.entries.iter(), prior);
    let lookup = |p: &Placeholder| lookup_known(&known, p);

    // Plan order puts dependencies first, so `changing` is complete for
    // everything an entry reads.
    let mut changing: BTreeSet<&str> = BTreeSet::new();
    let mut diffs: Vec<ResourceDiff> = Vec::with_capacity(plan.entries.len());
    for entry in &plan.entries {
        let config = entry
            .config
            .iter()
            .map(|(k, v)| (k.clone(), v.substitute(&lookup)))
            .collect();
        let diff = ResourceDiff::for_entry(
            entry,
            config,
            prior.get(&entry.address()),
            stale.get(entry.id.as_str()).copied(),
            &changing,
        );
        if matches!(diff.action, DiffAction::Create | DiffAction::Replace) {
            changing.insert(entry.id.as_str());
        }
        diffs.push(diff);
    }

    let replaced: BTreeSet<String> = diffs
        .iter()
        .filter_map(|d| d.replaces.as_ref())
        .map(|p| format!("{}.{}", p.kind, p.external_name))
        .collect();

    diffs.extend(
        prior
            .resources
            .iter()
            .filter(|(address, res)| {
                !planned.contains(*address)
                    && !replaced.contains(*address)
                    && res.mode == ResourceMode::Managed
            })
            .map(|(address, res)| ResourceDiff {
                address: address.clone(),
                external_name: res.external_name.clone(),
                id: None,
                kind: res.kind.clone(),
                action: DiffAction::Delete,
                replaces: None,
                changed_keys: Vec::new(),
                before: Some(res.config.clone()),
                after: None,
            }),
    );

    diffs
}

/// Diff summary statistics
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DiffSummary {
    pub creates: usize,
    pub updates: usize,
    pub replaces: usize,
    pub deletes: usize,
    pub reads: usize,
    pub unchanged: usize,
}

impl DiffSummary {
    /// Create a summary from a list of diffs
    pub fn from_diffs(diffs: &[ResourceDiff]) -> Self {
        let mut summary = Self::default();
        for diff in diffs {
            match diff.action {
                DiffAction::Create => summary.creates += 1,
                DiffAction::Update => summary.updates += 1,
                DiffAction::Replace => summary.replaces += 1,
                DiffAction::Delete => summary.deletes += 1,
                DiffAction::Read => summary.reads += 1,
                DiffAction::NoChange => summary.unchanged += 1,
            }
        }
        summary
    }

    /// Total number of changes
    pub fn total(&self) -> usize {
        self.creates + self.updates + self.replaces + self.deletes
    }

    /// Check if there are any changes
    pub fn has_changes(&self) -> bool {
        self.total() > 0
    }
}

/// Group diffs by resource kind
pub fn group_by_kind(diffs: &[ResourceDiff]) -> BTreeMap<&str, Vec<&ResourceDiff>> {
    let mut groups: BTreeMap<&str, Vec<&ResourceDiff>> = BTreeMap::new();
    for diff in diffs {
        groups.entry(diff.kind.as_str()).or_default().push(diff);
    }
    groups
}
