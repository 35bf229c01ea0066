//! Simulated provisioner
//!
//! Stands in for a cloud provider: every request succeeds and computed
//! attributes are derived from a BLAKE3 digest of the resource address, so
//! repeated applies of the same stack report the same values.

use anyhow::Result;
use declarative::{
    ApplyResult, Attributes, DiffAction, Placeholder, ProvisionRequest, Provisioned, Provisioner,
    ResolvedValue, ResourceMode, Synthesis,
};
use std::collections::{BTreeMap, BTreeSet};

/// Provisioner that fabricates the attributes a plan asks for
#[derive(Debug, Default)]
pub struct SimulatedProvisioner {
    /// Attribute paths read through placeholders, per internal id
    wanted: BTreeMap<String, BTreeSet<String>>,
}

impl SimulatedProvisioner {
    /// Collect every attribute the plan's placeholders and outputs read.
    pub fn for_synthesis(synthesis: &Synthesis) -> Self {
        let mut wanted: BTreeMap<String, BTreeSet<String>> = BTreeMap::new();
        let mut want = |p: &Placeholder| {
            wanted
                .entry(p.node.clone())
                .or_default()
                .insert(p.attribute.clone());
        };

        for entry in &synthesis.plan.entries {
            for value in entry.config.values() {
                value.placeholders().into_iter().for_each(&mut want);
            }
        }
        for output in synthesis.outputs.values() {
            output.value.placeholders().into_iter().for_each(&mut want);
        }

        Self { wanted }
    }
}

/// Deterministic value for `attribute` of the resource at `kind.name`.
fn fabricate(kind: &str, name: &str, attribute: &str) -> String {
    let digest = blake3::hash(format!("{kind}.{name}.{attribute}").as_bytes()).to_hex();
    let short = &digest.as_str()[..12];
    match attribute {
        "id" => format!("/stackplan/{kind}/{name}"),
        attr if attr.ends_with("fqdn") || attr.ends_with("login_server") => {
            format!("{name}-{short}.example.net")
        }
        _ => short.to_string(),
    }
}

impl Provisioner for SimulatedProvisioner {
    fn provision(&self, request: &ProvisionRequest) -> Result<Provisioned> {
        let mut attributes = Attributes::new();
        attributes.insert(
            "id".to_string(),
            ResolvedValue::String(fabricate(&request.kind, &request.external_name, "id")),
        );
        for attribute in self.wanted.get(&request.id).into_iter().flatten() {
            if request.config.contains_key(attribute) {
                continue;
            }
            attributes.insert(
                attribute.clone(),
                ResolvedValue::String(fabricate(&request.kind, &request.external_name, attribute)),
            );
        }

        let outcome = match (request.mode, request.action) {
            (ResourceMode::Data, _) | (_, DiffAction::Read) => ApplyResult::Read,
            (_, DiffAction::Create) => ApplyResult::Created,
            (_, DiffAction::Update) => ApplyResult::Updated,
            (_, DiffAction::Replace) => ApplyResult::Replaced,
            (_, DiffAction::Delete | DiffAction::NoChange) => ApplyResult::NoChange,
        };
        log::debug!("simulated {} {}.{}", request.action, request.kind, request.external_name);

        Ok(Provisioned {
            outcome,
            attributes,
        })
    }

    fn destroy(&self, external_name: &str, kind: &str) -> Result<()> {
        log::debug!("simulated destroy {kind}.{external_name}");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use declarative::{ExecuteOptions, PriorState, Stack, execute_simple};

    fn synthesis() -> Synthesis {
        let mut stack = Stack::new("sim");
        let rg = stack
            .resource("resource-group")
            .id("rg")
            .set("location", "eastus")
            .create()
            .unwrap();
        let mi = stack
            .resource("user-assigned-identity")
            .id("mi")
            .set("location", rg.attr("location"))
            .create()
            .unwrap();
        let app = stack
            .resource("container-app")
            .id("app")
            .set("identity", mi.attr("id"))
            .set("principal", mi.attr("principal_id"))
            .create()
            .unwrap();
        stack
            .declare_output("url", app.attr("latest_revision_fqdn"))
            .unwrap();
        stack.synthesize().unwrap()
    }

    #[test]
    fn test_wanted_attributes_collected() {
        let provisioner = SimulatedProvisioner::for_synthesis(&synthesis());
        assert_eq!(
            provisioner.wanted["mi"],
            BTreeSet::from(["id".to_string(), "principal_id".to_string()])
        );
        assert!(provisioner.wanted["app"].contains("latest_revision_fqdn"));
        assert!(!provisioner.wanted.contains_key("rg"));
    }

    #[test]
    fn test_fabricated_values_are_stable() {
        assert_eq!(fabricate("a", "b", "id"), "/stackplan/a/b");
        assert_eq!(fabricate("a", "b", "principal_id"), fabricate("a", "b", "principal_id"));
        assert_ne!(fabricate("a", "b", "principal_id"), fabricate("a", "c", "principal_id"));
        assert!(fabricate("app", "web", "latest_revision_fqdn").starts_with("web-"));
    }

    #[test]
    fn test_simulated_apply_resolves_everything() {
        let synthesis = synthesis();
        let provisioner = SimulatedProvisioner::for_synthesis(&synthesis);
        let execution = execute_simple(
            &synthesis,
            &PriorState::new(),
            &ExecuteOptions::default(),
            &provisioner,
        )
        .unwrap();

        assert_eq!(execution.summary.created, 3);
        assert!(execution.outputs["url"].is_concrete());
        assert!(execution.outputs["url"].to_text().ends_with(".example.net"));

        let again = execute_simple(
            &synthesis,
            &execution.state,
            &ExecuteOptions::default(),
            &provisioner,
        )
        .unwrap();
        assert_eq!(again.summary.total_changes(), 0);
        assert_eq!(again.outputs, execution.outputs);
    }
}
