//! Synthesis and plan display

use anyhow::{Context as AnyhowContext, Result};
use colored::Colorize;
use declarative::{
    DependencyGraph, OutputMap, Plan, PlanEntry, ResolvedValue, ResourceMode, Stack, Synthesis,
};
use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt::Write as _;
use std::path::Path;

use crate::document;
use crate::ui;

/// A loaded stack with its synthesis, narrowed to a target
pub struct Loaded {
    pub stack: Stack,
    pub synthesis: Synthesis,
}

/// Load a stack document, synthesize it and apply the target filter.
pub fn load(path: &Path, target: Option<&str>) -> Result<Loaded> {
    let stack = document::load_stack(path)?;
    let mut synthesis = stack
        .synthesize()
        .with_context(|| format!("Could not synthesize stack '{}'", stack.name()))?;

    if let Some(target) = target {
        synthesis.plan = synthesis.plan.filter_by_target(Some(target));
        if synthesis.plan.is_empty() {
            anyhow::bail!("No resources match target '{target}'");
        }
        log::info!("target {target} selects {} resources", synthesis.plan.len());
    }

    Ok(Loaded { stack, synthesis })
}

// ============================================================================
// Plan
// ============================================================================

/// Print the plan wave by wave, with resolved config.
pub fn display_plan(synthesis: &Synthesis, verbose: bool) {
    let plan = &synthesis.plan;

    ui::header(&format!("Plan: {}", plan.stack));
    ui::kv("Resources", &plan.len().to_string());
    ui::kv("Waves", &plan.waves.len().to_string());
    ui::kv("Fingerprint", &plan.fingerprint()[..16]);
    if let Some(backend) = &plan.backend {
        ui::kv("Backend", &backend.kind);
    }
    if !plan.providers.is_empty() {
        let names: Vec<_> = plan.providers.iter().map(|p| p.name.as_str()).collect();
        ui::kv("Providers", &names.join(", "));
    }

    for (index, wave) in plan.waves.iter().enumerate() {
        ui::section(&format!("Wave {}", index + 1));
        for id in wave {
            if let Some(entry) = plan.entry(id) {
                print_entry(entry, verbose);
            }
        }
    }

    if !synthesis.outputs.is_empty() {
        ui::section("Outputs");
        for row in output_rows(&synthesis.outputs, None) {
            print_output(&row);
        }
    }

    let deferred = plan.entries.iter().filter(|e| !e.is_concrete()).count();
    println!();
    if deferred > 0 {
        ui::info(&format!(
            "{} with values known only after apply",
            ui::count(deferred, "resource")
        ));
    }
}

/// Plan and masked outputs as JSON.
pub fn plan_json(synthesis: &Synthesis) -> Result<String> {
    #[derive(Serialize)]
    struct View<'a> {
        fingerprint: String,
        plan: &'a Plan,
        outputs: Vec<OutputRow>,
    }

    let view = View {
        fingerprint: synthesis.plan.fingerprint(),
        plan: &synthesis.plan,
        outputs: output_rows(&synthesis.outputs, None),
    };
    serde_json::to_string_pretty(&view).context("Failed to serialize plan")
}

fn print_entry(entry: &PlanEntry, verbose: bool) {
    let tag = match entry.mode {
        ResourceMode::Managed => String::new(),
        ResourceMode::Data => format!(" {}", "(data)".blue()),
    };
    let alias = if entry.id == entry.external_name {
        String::new()
    } else {
        format!(" {}", format!("[{}]", entry.id).dimmed())
    };
    println!("  {}{}{}", entry.address().bold(), tag, alias);

    if !entry.depends_on.is_empty() {
        println!(
            "      {} {}",
            "after".dimmed(),
            entry.depends_on.join(", ").dimmed()
        );
    }

    for (key, value) in &entry.config {
        println!("      {} = {}", key, render_value(value, verbose));
    }
}

/// Render a config value; deferred values are highlighted.
fn render_value(value: &ResolvedValue, verbose: bool) -> String {
    let json = value.to_json();
    let text = if verbose {
        serde_json::to_string_pretty(&json).unwrap_or_else(|_| json.to_string())
    } else {
        json.to_string()
    };
    if value.is_concrete() {
        text
    } else {
        text.yellow().to_string()
    }
}

// ============================================================================
// Outputs
// ============================================================================

/// One output as printed or emitted as JSON
#[derive(Debug, Serialize, PartialEq)]
pub struct OutputRow {
    pub name: String,
    pub label: String,
    pub value: serde_json::Value,
    pub known: bool,
    pub sensitive: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

/// Build output rows, preferring executed values over synthesized ones.
/// Sensitive values are masked.
pub fn output_rows(
    outputs: &OutputMap,
    executed: Option<&BTreeMap<String, ResolvedValue>>,
) -> Vec<OutputRow> {
    outputs
        .iter()
        .map(|(name, output)| {
            let value = executed
                .and_then(|values| values.get(name))
                .unwrap_or(&output.value);
            let json = if output.sensitive {
                serde_json::Value::String(ui::MASKED.to_string())
            } else {
                value.to_json()
            };
            OutputRow {
                name: name.clone(),
                label: output.label.clone(),
                value: json,
                known: value.is_concrete(),
                sensitive: output.sensitive,
                description: output.description.clone(),
            }
        })
        .collect()
}

fn print_output(row: &OutputRow) {
    let value = match &row.value {
        serde_json::Value::String(s) => s.clone(),
        other => other.to_string(),
    };
    let value = if row.sensitive {
        value.dimmed().to_string()
    } else if row.known {
        value
    } else {
        value.yellow().to_string()
    };
    println!("  {} = {}", row.name.bold(), value);
    if row.label != row.name {
        ui::dim(&format!("  from {}", row.label));
    }
    if let Some(description) = &row.description {
        ui::dim(&format!("  {description}"));
    }
}

/// Print outputs as text.
pub fn display_outputs(rows: &[OutputRow]) {
    if rows.is_empty() {
        ui::info("No outputs declared");
        return;
    }
    for row in rows {
        print_output(row);
    }
}

// ============================================================================
// Graph
// ============================================================================

#[derive(Debug, Serialize)]
struct GraphNode<'a> {
    id: &'a str,
    address: String,
    wave: usize,
}

#[derive(Debug, Serialize)]
struct GraphView<'a> {
    stack: &'a str,
    nodes: Vec<GraphNode<'a>>,
    edges: Vec<(&'a str, &'a str)>,
    waves: &'a [Vec<String>],
}

fn graph_view<'a>(graph: &'a DependencyGraph, plan: &'a Plan) -> GraphView<'a> {
    GraphView {
        stack: &plan.stack,
        nodes: plan
            .entries
            .iter()
            .map(|e| GraphNode {
                id: &e.id,
                address: e.address(),
                wave: plan.wave_of(&e.id).unwrap_or_default(),
            })
            .collect(),
        edges: graph.edges(),
        waves: &plan.waves,
    }
}

/// Print the dependency graph as indented text.
pub fn display_graph(stack: &Stack, plan: &Plan) {
    let graph = DependencyGraph::build(stack.nodes());

    ui::header(&format!("Graph: {}", plan.stack));
    for (index, wave) in plan.waves.iter().enumerate() {
        ui::section(&format!("Wave {}", index + 1));
        for id in wave {
            let deps = graph.dependencies(id);
            if deps.is_empty() {
                println!("  {}", id.bold());
            } else {
                println!("  {} {} {}", id.bold(), "←".dimmed(), deps.join(", ").dimmed());
            }
        }
    }
    println!();
    ui::dim(&format!("{} edges", graph.edges().len()));
}

/// Dependency graph as JSON.
pub fn graph_json(stack: &Stack, plan: &Plan) -> Result<String> {
    let graph = DependencyGraph::build(stack.nodes());
    serde_json::to_string_pretty(&graph_view(&graph, plan)).context("Failed to serialize graph")
}

/// Dependency graph in Graphviz DOT format, edges pointing from
/// dependency to dependent.
pub fn graph_dot(stack: &Stack, plan: &Plan) -> String {
    let graph = DependencyGraph::build(stack.nodes());
    let mut out = String::new();

    let _ = writeln!(out, "digraph \"{}\" {{", plan.stack);
    let _ = writeln!(out, "  rankdir=LR;");
    for entry in &plan.entries {
        let shape = match entry.mode {
            ResourceMode::Managed => "box",
            ResourceMode::Data => "ellipse",
        };
        let _ = writeln!(
            out,
            "  \"{}\" [label=\"{}\", shape={shape}];",
            entry.id,
            entry.address()
        );
    }
    for (before, after) in graph.edges() {
        if plan.entry(before).is_some() && plan.entry(after).is_some() {
            let _ = writeln!(out, "  \"{before}\" -> \"{after}\";");
        }
    }
    out.push_str("}\n");
    out
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn stack() -> Stack {
        let mut stack = Stack::new("demo");
        let rg = stack
            .resource("resource-group")
            .id("rg")
            .set("location", "eastus")
            .create()
            .unwrap();
        let acr = stack.data("container-registry").id("acr").create().unwrap();
        let mi = stack
            .resource("user-assigned-identity")
            .id("mi")
            .set("location", rg.attr("location"))
            .create()
            .unwrap();
        stack
            .resource("role-assignment")
            .id("role")
            .set("principal_id", mi.attr("principal_id"))
            .set("scope", acr.attr("id"))
            .create()
            .unwrap();
        stack
            .output("principal")
            .value(mi.attr("principal_id"))
            .sensitive()
            .declare()
            .unwrap();
        stack.declare_output("where", rg.attr("location")).unwrap();
        stack
    }

    #[test]
    fn test_dot_lists_edges_in_plan() {
        let stack = stack();
        let plan = stack.synthesize().unwrap().plan;
        let dot = graph_dot(&stack, &plan);

        assert!(dot.starts_with("digraph \"demo\" {"));
        assert!(dot.contains("\"rg\" -> \"mi\";"));
        assert!(dot.contains("\"acr\" -> \"role\";"));
        assert!(dot.contains("\"acr\" [label=\"container-registry.acr\", shape=ellipse];"));
        assert!(dot.ends_with("}\n"));
    }

    #[test]
    fn test_graph_json_has_waves() {
        let stack = stack();
        let plan = stack.synthesize().unwrap().plan;
        let json: serde_json::Value = serde_json::from_str(&graph_json(&stack, &plan).unwrap()).unwrap();

        assert_eq!(json["waves"][0], serde_json::json!(["rg", "acr"]));
        assert_eq!(json["nodes"][3]["wave"], 2);
        assert_eq!(json["edges"].as_array().unwrap().len(), 3);
    }

    #[test]
    fn test_output_rows_mask_sensitive() {
        let synthesis = stack().synthesize().unwrap();
        let rows = output_rows(&synthesis.outputs, None);

        let principal = rows.iter().find(|r| r.name == "principal").unwrap();
        assert!(principal.sensitive);
        assert!(!principal.known);
        assert_eq!(principal.value, serde_json::json!(ui::MASKED));

        let location = rows.iter().find(|r| r.name == "where").unwrap();
        assert!(location.known);
        assert_eq!(location.value, serde_json::json!("eastus"));
        assert_eq!(location.label, "rg.location");
    }

    #[test]
    fn test_output_rows_prefer_executed_values() {
        let synthesis = stack().synthesize().unwrap();
        let executed = BTreeMap::from([(
            "where".to_string(),
            ResolvedValue::String("westeurope".into()),
        )]);
        let rows = output_rows(&synthesis.outputs, Some(&executed));
        let location = rows.iter().find(|r| r.name == "where").unwrap();
        assert_eq!(location.value, serde_json::json!("westeurope"));
    }

    #[test]
    fn test_plan_json_masks_outputs() {
        let synthesis = stack().synthesize().unwrap();
        let json: serde_json::Value =
            serde_json::from_str(&plan_json(&synthesis).unwrap()).unwrap();

        assert_eq!(json["fingerprint"], synthesis.plan.fingerprint());
        assert_eq!(json["plan"]["entries"][0]["id"], "rg");
        assert_eq!(json["outputs"][0]["name"], "principal");
        assert_eq!(json["outputs"][0]["value"], ui::MASKED);
    }

    #[test]
    fn test_load_with_unknown_target_fails() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("stack.toml");
        fs::write(
            &path,
            "name = \"t\"\n[[resources]]\nid = \"rg\"\nkind = \"resource-group\"\n",
        )
        .unwrap();

        assert_eq!(load(&path, None).unwrap().synthesis.plan.len(), 1);
        let err = load(&path, Some("nothing")).err().unwrap();
        assert!(err.to_string().contains("nothing"));
    }
}
