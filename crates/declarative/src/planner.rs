//! Provisioning plans - the ordered output of synthesis

use crate::resolved::ResolvedValue;
use crate::resource::ResourceMode;
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};

/// One resource in plan order, config fully resolved.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PlanEntry {
    /// Internal id
    pub id: String,
    pub kind: String,
    pub mode: ResourceMode,
    /// Name the executor addresses the resource by
    pub external_name: String,
    /// Direct dependencies (internal ids), in plan order
    pub depends_on: Vec<String>,
    /// Config with references replaced by values or placeholders
    pub config: BTreeMap<String, ResolvedValue>,
}

impl PlanEntry {
    /// Whether every config value is known at synthesis time.
    pub fn is_concrete(&self) -> bool {
        self.config.values().all(ResolvedValue::is_concrete)
    }

    /// Address the executor tracks the resource by: `kind.external_name`.
    pub fn address(&self) -> String {
        format!("{}.{}", self.kind, self.external_name)
    }

    /// Config as a JSON object (placeholders rendered as `${kind.name.attr}`).
    pub fn config_json(&self) -> serde_json::Value {
        serde_json::Value::Object(
            self.config
                .iter()
                .map(|(k, v)| (k.clone(), v.to_json()))
                .collect(),
        )
    }
}

/// Backend settings after resolution.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PlannedBackend {
    pub kind: String,
    pub settings: BTreeMap<String, ResolvedValue>,
}

/// Provider configuration after resolution.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PlannedProvider {
    pub name: String,
    pub config: BTreeMap<String, ResolvedValue>,
}

/// A deterministic, ordered provisioning plan.
///
/// For every dependency edge `a -> b`, `a` appears before `b` in
/// [`entries`](Self::entries), and in a strictly earlier wave.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Plan {
    pub stack: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub backend: Option<PlannedBackend>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub providers: Vec<PlannedProvider>,
    pub entries: Vec<PlanEntry>,
    /// Internal ids grouped into waves that may be provisioned in parallel
    pub waves: Vec<Vec<String>>,
}

impl Plan {
    /// Look up an entry by internal id.
    pub fn entry(&self, id: &str) -> Option<&PlanEntry> {
        self.entries.iter().find(|e| e.id == id)
    }

    /// Position of an entry in plan order.
    pub fn position(&self, id: &str) -> Option<usize> {
        self.entries.iter().position(|e| e.id == id)
    }

    /// Index of the wave containing `id`.
    pub fn wave_of(&self, id: &str) -> Option<usize> {
        self.waves.iter().position(|w| w.iter().any(|i| i == id))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// BLAKE3 digest of the plan's canonical JSON form.
    ///
    /// Re-synthesizing an unchanged stack yields the same fingerprint.
    pub fn fingerprint(&self) -> String {
        let bytes = serde_json::to_vec(self).unwrap_or_default();
        blake3::hash(&bytes).to_hex().to_string()
    }

    /// Restrict the plan to the resources matching `target` plus everything
    /// they transitively depend on.
    ///
    /// Target format: `id`, external name, `kind`, or `kind.name`.
    pub fn filter_by_target(self, target: Option<&str>) -> Self {
        let Some(target) = target else {
            return self;
        };
        let (kind, name) = parse_target(target);

        let mut keep: BTreeSet<String> = self
            .entries
            .iter()
            .filter(|e| matches_filter(e, kind.as_deref(), name.as_deref()))
            .map(|e| e.id.clone())
            .collect();

        // Entries are in dependency order, so walking backwards pulls in
        // every dependency of a kept entry.
        for entry in self.entries.iter().rev() {
            if keep.contains(&entry.id) {
                keep.extend(entry.depends_on.iter().cloned());
            }
        }

        Self {
            entries: self
                .entries
                .into_iter()
                .filter(|e| keep.contains(&e.id))
                .collect(),
            waves: self
                .waves
                .into_iter()
                .map(|w| w.into_iter().filter(|id| keep.contains(id)).collect::<Vec<_>>())
                .filter(|w| !w.is_empty())
                .collect(),
            ..self
        }
    }
}

/// Parse a target string like "kind.name" into (kind, name)
fn parse_target(target: &str) -> (Option<String>, Option<String>) {
    match target.split_once('.') {
        Some((kind, name)) if !name.contains('.') => {
            (Some(kind.to_string()), Some(name.to_string()))
        }
        Some(_) => (None, Some(target.to_string())),
        None => (None, Some(target.to_string())),
    }
}

/// Check if an entry matches the filter criteria
fn matches_filter(entry: &PlanEntry, kind: Option<&str>, name: Option<&str>) -> bool {
    match (kind, name) {
        (Some(kind), Some(name)) => {
            entry.kind == kind && (entry.id == name || entry.external_name == name)
        }
        (None, Some(name)) => entry.id == name || entry.external_name == name || entry.kind == name,
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(id: &str, kind: &str, depends_on: &[&str]) -> PlanEntry {
        PlanEntry {
            id: id.into(),
            kind: kind.into(),
            mode: ResourceMode::Managed,
            external_name: id.into(),
            depends_on: depends_on.iter().map(|d| d.to_string()).collect(),
            config: BTreeMap::new(),
        }
    }

    fn plan() -> Plan {
        Plan {
            stack: "test".into(),
            backend: None,
            providers: Vec::new(),
            entries: vec![
                entry("rg", "resource_group", &[]),
                entry("acr", "container_registry", &[]),
                entry("identity", "identity", &["rg"]),
                entry("role", "role_assignment", &["identity", "acr"]),
                entry("logs", "workspace", &["rg"]),
            ],
            waves: vec![
                vec!["rg".into(), "acr".into()],
                vec!["identity".into(), "logs".into()],
                vec!["role".into()],
            ],
        }
    }

    #[test]
    fn test_parse_target() {
        assert_eq!(parse_target("rg"), (None, Some("rg".to_string())));
        assert_eq!(
            parse_target("identity.mi"),
            (Some("identity".to_string()), Some("mi".to_string()))
        );
        assert_eq!(parse_target("a.b.c"), (None, Some("a.b.c".to_string())));
    }

    #[test]
    fn test_filter_by_target_keeps_dependencies() {
        let filtered = plan().filter_by_target(Some("role"));
        let ids: Vec<_> = filtered.entries.iter().map(|e| e.id.as_str()).collect();
        assert_eq!(ids, vec!["rg", "acr", "identity", "role"]);
        assert_eq!(filtered.waves.len(), 3);
        assert_eq!(filtered.wave_of("identity"), Some(1));
    }

    #[test]
    fn test_filter_by_kind() {
        let filtered = plan().filter_by_target(Some("workspace"));
        let ids: Vec<_> = filtered.entries.iter().map(|e| e.id.as_str()).collect();
        assert_eq!(ids, vec!["rg", "logs"]);

        let unchanged = plan().filter_by_target(None);
        assert_eq!(unchanged, plan());
    }

    #[test]
    fn test_fingerprint_tracks_content() {
        let a = plan();
        let mut b = plan();
        assert_eq!(a.fingerprint(), b.fingerprint());

        b.entries[0].external_name = "renamed".into();
        assert_ne!(a.fingerprint(), b.fingerprint());
    }
}
