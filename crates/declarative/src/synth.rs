//! Synthesizer - turns a stack into an ordered plan and output map
//!
//! Phases:
//! 1. validate every reference and `depends_on` target
//! 2. build the dependency graph
//! 3. reject cycles (three-color DFS, full path reported)
//! 4. order with Kahn's algorithm, ties broken by construction order
//! 5. resolve each node's config in plan order
//! 6. resolve outputs, backend and provider settings
//!
//! Resolution policy: a reference becomes the concrete value found at the
//! attribute path of the target's already-resolved config. Anything else
//! (computed attributes like `id`, attributes the config does not set, or
//! values that are themselves still deferred) becomes a [`Placeholder`] the
//! executor fills in later. Unknown attribute names therefore pass through
//! to the provider rather than failing synthesis.
//!
//! Synthesis is pure: no I/O, no shared state.

use crate::error::{Error, Result};
use crate::graph::{DependencyGraph, flatten_waves};
use crate::planner::{Plan, PlanEntry, PlannedBackend, PlannedProvider};
use crate::reference::AttributeRef;
use crate::resolved::{Placeholder, ResolvedValue, TemplatePart};
use crate::stack::Stack;
use crate::value::{Part, Value};
use serde::Serialize;
use std::collections::{BTreeMap, HashMap};

/// An output after resolution.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ResolvedOutput {
    /// Human-facing label: `<external_name>.<attribute>` for a direct
    /// reference, the output name otherwise
    pub label: String,
    pub value: ResolvedValue,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub sensitive: bool,
}

/// Resolved outputs keyed by output name.
pub type OutputMap = BTreeMap<String, ResolvedOutput>;

/// Result of synthesizing a stack.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Synthesis {
    pub plan: Plan,
    pub outputs: OutputMap,
}

/// Synthesize `stack` into a plan and output map.
pub fn synthesize(stack: &Stack) -> Result<Synthesis> {
    log::debug!(
        "synthesizing stack {} ({} resources, {} outputs)",
        stack.name(),
        stack.nodes().len(),
        stack.outputs().len()
    );

    validate(stack)?;

    let graph = DependencyGraph::build(stack.nodes());
    log::debug!("dependency graph has {} edges", graph.edges().len());

    let waves = graph.waves()?;
    let order = flatten_waves(&waves);

    let mut resolver = Resolver::new(stack);
    let mut entries = Vec::with_capacity(order.len());
    let position: HashMap<&str, usize> = order.iter().enumerate().map(|(i, id)| (*id, i)).collect();

    for id in &order {
        let Some(node) = stack.node(id) else {
            return Err(Error::UnknownNode { id: id.to_string() });
        };
        let config = resolver.resolve_map(node.config());
        log::trace!("resolved {id}: {} fields", config.len());
        resolver.resolved.insert(node.id(), ResolvedValue::Map(config.clone()));

        let mut depends_on: Vec<String> = graph
            .dependencies(id)
            .into_iter()
            .map(str::to_string)
            .collect();
        depends_on.sort_by_key(|dep| position.get(dep.as_str()).copied().unwrap_or(usize::MAX));

        entries.push(PlanEntry {
            id: node.id().to_string(),
            kind: node.kind().to_string(),
            mode: node.mode(),
            external_name: stack.external_name(node.id()).to_string(),
            depends_on,
            config,
        });
    }

    let outputs = stack
        .outputs()
        .iter()
        .map(|(name, decl)| {
            let label = match &decl.value {
                Value::Ref(r) => format!("{}.{}", stack.external_name(&r.target), r.attribute),
                _ => name.to_string(),
            };
            let resolved = ResolvedOutput {
                label,
                value: resolver.resolve(&decl.value),
                description: decl.description.clone(),
                sensitive: decl.sensitive,
            };
            (name.to_string(), resolved)
        })
        .collect();

    let backend = stack.backend().map(|b| PlannedBackend {
        kind: b.kind.clone(),
        settings: resolver.resolve_map(&b.settings),
    });
    let providers = stack
        .providers()
        .iter()
        .map(|p| PlannedProvider {
            name: p.name.clone(),
            config: resolver.resolve_map(&p.config),
        })
        .collect();

    let plan = Plan {
        stack: stack.name().to_string(),
        backend,
        providers,
        entries,
        waves: waves
            .into_iter()
            .map(|w| w.into_iter().map(str::to_string).collect())
            .collect(),
    };
    log::debug!("plan has {} entries in {} waves", plan.len(), plan.waves.len());

    Ok(Synthesis { plan, outputs })
}

/// Check references, explicit dependencies and external names.
fn validate(stack: &Stack) -> Result<()> {
    let check_ref = |holder: &str, r: &AttributeRef| -> Result<()> {
        if stack.contains(&r.target) {
            Ok(())
        } else {
            Err(Error::UnresolvedReference {
                node: holder.to_string(),
                target: r.target.clone(),
                attribute: Some(r.attribute.clone()),
            })
        }
    };
    let check_map = |holder: &str, map: &BTreeMap<String, Value>| -> Result<()> {
        map.values()
            .flat_map(Value::references)
            .try_for_each(|r| check_ref(holder, r))
    };

    // The executor addresses resources by kind and external name.
    let mut addresses: HashMap<(&str, &str), &str> = HashMap::new();

    for node in stack.nodes() {
        check_map(node.id(), node.config())?;

        if let Some(missing) = node.depends_on().iter().find(|d| !stack.contains(d)) {
            return Err(Error::UnresolvedReference {
                node: node.id().to_string(),
                target: missing.clone(),
                attribute: None,
            });
        }

        let name = stack.external_name(node.id());
        if let Some(first) = addresses.insert((node.kind(), name), node.id()) {
            return Err(Error::DuplicateExternalName {
                name: format!("{}.{name}", node.kind()),
                first: first.to_string(),
                second: node.id().to_string(),
            });
        }
    }

    for (name, decl) in stack.outputs().iter() {
        for r in decl.value.references() {
            check_ref(&format!("output.{name}"), r)?;
        }
    }
    if let Some(backend) = stack.backend() {
        check_map("backend", &backend.settings)?;
    }
    for provider in stack.providers() {
        check_map(&format!("provider.{}", provider.name), &provider.config)?;
    }

    Ok(())
}

/// Resolves values against configs resolved so far.
struct Resolver<'a> {
    stack: &'a Stack,
    resolved: HashMap<&'a str, ResolvedValue>,
}

impl<'a> Resolver<'a> {
    fn new(stack: &'a Stack) -> Self {
        Self {
            stack,
            resolved: HashMap::new(),
        }
    }

    fn resolve_map(&self, map: &BTreeMap<String, Value>) -> BTreeMap<String, ResolvedValue> {
        map.iter()
            .map(|(k, v)| (k.clone(), self.resolve(v)))
            .collect()
    }

    fn resolve(&self, value: &Value) -> ResolvedValue {
        match value {
            Value::Null => ResolvedValue::Null,
            Value::Bool(b) => ResolvedValue::Bool(*b),
            Value::Integer(n) => ResolvedValue::Integer(*n),
            Value::Number(n) => ResolvedValue::Number(*n),
            Value::String(s) => ResolvedValue::String(s.clone()),
            Value::List(items) => ResolvedValue::List(items.iter().map(|v| self.resolve(v)).collect()),
            Value::Map(entries) => ResolvedValue::Map(self.resolve_map(entries)),
            Value::Ref(r) => self.resolve_ref(r),
            Value::Interpolated(parts) => {
                let parts = parts
                    .iter()
                    .map(|part| match part {
                        Part::Literal(s) => TemplatePart::Literal(s.clone()),
                        Part::Ref(r) => match self.resolve_ref(r) {
                            ResolvedValue::Deferred(p) => TemplatePart::Deferred(p),
                            concrete => TemplatePart::Literal(concrete.to_text()),
                        },
                    })
                    .collect();
                ResolvedValue::from_template(parts)
            }
        }
    }

    fn resolve_ref(&self, r: &AttributeRef) -> ResolvedValue {
        let known = self
            .resolved
            .get(r.target.as_str())
            .and_then(|config| config.lookup(&r.attribute))
            .filter(|v| v.is_concrete());

        match known {
            Some(value) => value.clone(),
            None => ResolvedValue::Deferred(Placeholder {
                node: r.target.clone(),
                kind: self
                    .stack
                    .node(&r.target)
                    .map_or("", |n| n.kind())
                    .to_string(),
                external_name: self.stack.external_name(&r.target).to_string(),
                attribute: r.attribute.clone(),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resource::ResourceMode;

    /// rg, identity (refs rg.location), registry, role (refs identity and registry)
    fn scenario() -> Stack {
        let mut stack = Stack::new("scenario");
        let rg = stack
            .resource("resource-group")
            .id("rg")
            .set("location", "eastus")
            .set("name", "devops-task-rg")
            .create()
            .unwrap();
        let identity = stack
            .resource("user-assigned-identity")
            .id("identity")
            .set("location", rg.attr("location"))
            .set("resource_group_name", rg.attr("name"))
            .create()
            .unwrap();
        let registry = stack
            .data("container-registry")
            .id("registry")
            .set("name", "devopstask001")
            .create()
            .unwrap();
        stack
            .resource("role-assignment")
            .id("roleAssignment")
            .set("principal_id", identity.attr("principal_id"))
            .set("scope", registry.attr("id"))
            .set("role_definition_name", "acrpull")
            .create()
            .unwrap();
        stack
    }

    fn order(synthesis: &Synthesis) -> Vec<&str> {
        synthesis.plan.entries.iter().map(|e| e.id.as_str()).collect()
    }

    #[test]
    fn test_scenario_order() {
        let synthesis = scenario().synthesize().unwrap();
        let order = order(&synthesis);
        // Roots keep construction order.
        assert_eq!(order, ["rg", "registry", "identity", "roleAssignment"]);
        assert_eq!(
            synthesis.plan.waves,
            vec![
                vec!["rg".to_string(), "registry".to_string()],
                vec!["identity".to_string()],
                vec!["roleAssignment".to_string()],
            ]
        );
    }

    #[test]
    fn test_every_edge_respected() {
        let synthesis = scenario().synthesize().unwrap();
        let plan = &synthesis.plan;
        for entry in &plan.entries {
            let pos = plan.position(&entry.id).unwrap();
            let wave = plan.wave_of(&entry.id).unwrap();
            for dep in &entry.depends_on {
                assert!(plan.position(dep).unwrap() < pos);
                assert!(plan.wave_of(dep).unwrap() < wave);
            }
        }
    }

    #[test]
    fn test_resolution_concrete_and_deferred() {
        let synthesis = scenario().synthesize().unwrap();
        let identity = synthesis.plan.entry("identity").unwrap();
        assert_eq!(identity.config["location"], ResolvedValue::from("eastus"));
        assert_eq!(
            identity.config["resource_group_name"],
            ResolvedValue::from("devops-task-rg")
        );
        assert!(identity.is_concrete());

        let role = synthesis.plan.entry("roleAssignment").unwrap();
        assert_eq!(
            role.config["principal_id"],
            ResolvedValue::Deferred(Placeholder {
                node: "identity".into(),
                kind: "user-assigned-identity".into(),
                external_name: "identity".into(),
                attribute: "principal_id".into(),
            })
        );
        assert_eq!(role.config["scope"].to_text(), "${container-registry.registry.id}");
        assert_eq!(synthesis.plan.entry("registry").unwrap().mode, ResourceMode::Data);
    }

    #[test]
    fn test_resynthesis_is_identical() {
        let stack = scenario();
        let first = stack.synthesize().unwrap();
        let second = stack.synthesize().unwrap();
        assert_eq!(first, second);
        assert_eq!(first.plan.fingerprint(), second.plan.fingerprint());
    }

    #[test]
    fn test_unresolved_reference_names_target() {
        let mut stack = scenario();
        stack
            .resource("container-app")
            .id("app")
            .set("environment_id", AttributeRef::new("missing_env", "id"))
            .create()
            .unwrap();

        let err = stack.synthesize().unwrap_err();
        assert_eq!(
            err,
            Error::UnresolvedReference {
                node: "app".into(),
                target: "missing_env".into(),
                attribute: Some("id".into()),
            }
        );
    }

    #[test]
    fn test_unknown_depends_on() {
        let mut stack = Stack::new("test");
        stack.resource("thing").id("a").depends_on("ghost").create().unwrap();
        assert!(matches!(
            stack.synthesize(),
            Err(Error::UnresolvedReference { attribute: None, .. })
        ));
    }

    #[test]
    fn test_unresolved_output_reference() {
        let mut stack = scenario();
        stack
            .declare_output("url", AttributeRef::new("app", "fqdn"))
            .unwrap();
        assert!(matches!(
            stack.synthesize(),
            Err(Error::UnresolvedReference { node, .. }) if node == "output.url"
        ));
    }

    #[test]
    fn test_cycle_fails_with_closed_path() {
        let mut stack = Stack::new("test");
        stack
            .resource("thing")
            .id("a")
            .set("x", AttributeRef::new("c", "id"))
            .create()
            .unwrap();
        stack
            .resource("thing")
            .id("b")
            .set("x", AttributeRef::new("a", "id"))
            .create()
            .unwrap();
        stack
            .resource("thing")
            .id("c")
            .set("x", AttributeRef::new("b", "id"))
            .create()
            .unwrap();

        let Err(Error::CyclicDependency { cycle }) = stack.synthesize() else {
            panic!("expected a cycle");
        };
        assert_eq!(cycle, vec!["a", "b", "c", "a"]);
        let graph = DependencyGraph::build(stack.nodes());
        for pair in cycle.windows(2) {
            assert!(graph.has_edge(&pair[0], &pair[1]));
        }
    }

    #[test]
    fn test_explicit_depends_on_orders_without_reference() {
        let mut stack = Stack::new("test");
        stack.resource("thing").id("late").depends_on("rg").create().unwrap();
        stack.resource("resource-group").id("rg").create().unwrap();

        let synthesis = stack.synthesize().unwrap();
        assert_eq!(order(&synthesis), vec!["rg", "late"]);
        assert_eq!(synthesis.plan.entry("late").unwrap().depends_on, vec!["rg"]);
    }

    #[test]
    fn test_override_changes_only_external_name() {
        let base = scenario().synthesize().unwrap();

        let mut renamed = scenario();
        renamed.override_name("registry", "acr").unwrap();
        let synthesis = renamed.synthesize().unwrap();

        assert_eq!(order(&base), order(&synthesis));
        assert_eq!(synthesis.plan.entry("registry").unwrap().external_name, "acr");
        for (a, b) in base.plan.entries.iter().zip(&synthesis.plan.entries) {
            if a.id != "registry" && a.id != "roleAssignment" {
                assert_eq!(a, b);
            }
        }
        // The placeholder keeps its internal id and shows the new name.
        let scope = &synthesis.plan.entry("roleAssignment").unwrap().config["scope"];
        assert_eq!(scope.to_text(), "${container-registry.acr.id}");
        assert_eq!(scope.placeholders()[0].node, "registry");
    }

    #[test]
    fn test_duplicate_external_name_rejected() {
        let mut stack = scenario();
        stack.resource("resource-group").id("rg2").create().unwrap();
        stack.override_name("rg2", "rg").unwrap();
        assert_eq!(
            stack.synthesize().unwrap_err(),
            Error::DuplicateExternalName {
                name: "resource-group.rg".into(),
                first: "rg".into(),
                second: "rg2".into(),
            }
        );
    }

    #[test]
    fn test_external_name_shared_across_kinds() {
        let mut stack = Stack::new("test");
        let mi = stack.resource("user-assigned-identity").id("containerapp").create().unwrap();
        stack
            .resource("role-assignment")
            .id("containerapp_5")
            .depends_on(&mi)
            .create()
            .unwrap();
        stack.resource("container-app").id("containerapp_7").create().unwrap();
        stack.override_name("containerapp_5", "containerapp").unwrap();
        stack.override_name("containerapp_7", "containerapp").unwrap();

        let synthesis = stack.synthesize().unwrap();
        let addresses: Vec<_> = synthesis.plan.entries.iter().map(PlanEntry::address).collect();
        assert_eq!(
            addresses,
            vec![
                "user-assigned-identity.containerapp",
                "container-app.containerapp",
                "role-assignment.containerapp",
            ]
        );
    }

    #[test]
    fn test_interpolation_and_chained_resolution() {
        let mut stack = Stack::new("test");
        let acr = stack
            .data("container-registry")
            .id("acr")
            .set("login_server", "devopstask001.azurecr.io")
            .create()
            .unwrap();
        let mirror = stack
            .resource("thing")
            .id("mirror")
            .set("server", acr.attr("login_server"))
            .create()
            .unwrap();
        stack
            .resource("container-app")
            .id("app")
            .set(
                "template",
                Value::list([Value::map([(
                    "image",
                    Value::parse_str("${mirror.server}/django-todolist:v2").unwrap(),
                )])]),
            )
            .set("identity", Value::parse_str("id=${mirror.id}").unwrap())
            .create()
            .unwrap();
        let _ = mirror;

        let synthesis = stack.synthesize().unwrap();
        let app = synthesis.plan.entry("app").unwrap();
        assert_eq!(
            app.config["template"].lookup("0.image"),
            Some(&ResolvedValue::from("devopstask001.azurecr.io/django-todolist:v2"))
        );
        assert_eq!(app.config["identity"].to_text(), "id=${thing.mirror.id}");
        assert!(!app.config["identity"].is_concrete());
    }

    #[test]
    fn test_outputs_use_external_name_in_label() {
        let mut stack = Stack::new("test");
        let app = stack.resource("container-app").id("containerapp_7").create().unwrap();
        stack.override_name("containerapp_7", "containerapp").unwrap();
        stack
            .declare_output("azurerm_container_app_url", app.attr("latest_revision_fqdn"))
            .unwrap();
        stack.declare_output("region", "eastus").unwrap();

        let synthesis = stack.synthesize().unwrap();
        let url = &synthesis.outputs["azurerm_container_app_url"];
        assert_eq!(url.label, "containerapp.latest_revision_fqdn");
        assert_eq!(
            url.value.to_text(),
            "${container-app.containerapp.latest_revision_fqdn}"
        );
        assert_eq!(synthesis.outputs["region"].label, "region");
        assert_eq!(synthesis.outputs["region"].value, ResolvedValue::from("eastus"));
    }

    #[test]
    fn test_empty_stack() {
        let synthesis = Stack::new("empty").synthesize().unwrap();
        assert!(synthesis.plan.is_empty());
        assert!(synthesis.plan.waves.is_empty());
        assert!(synthesis.outputs.is_empty());
    }

    #[test]
    fn test_long_chain_synthesizes() {
        let mut stack = Stack::new("chain");
        stack.resource("thing").id("n0").create().unwrap();
        for i in 1..20_000 {
            stack
                .resource("thing")
                .id(format!("n{i}"))
                .depends_on(format!("n{}", i - 1))
                .create()
                .unwrap();
        }

        let plan = stack.synthesize().unwrap().plan;
        assert_eq!(plan.len(), 20_000);
        assert_eq!(plan.waves.len(), 20_000);
        assert_eq!(plan.entries[19_999].depends_on, vec!["n19998"]);
    }
}
