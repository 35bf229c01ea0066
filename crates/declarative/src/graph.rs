//! Dependency graph over resource nodes
//!
//! Edges come from two places:
//! - attribute references found anywhere in a node's config
//! - explicit `depends_on` declarations
//!
//! An edge `a -> b` means `a` is provisioned before `b`. Nodes are indexed
//! by construction order, which is also the tie-break key for ordering.

use crate::error::{Error, Result};
use crate::resource::ResourceNode;
use std::collections::{BTreeSet, HashMap};

/// Directed graph of provisioning constraints.
#[derive(Debug, Clone, Default)]
pub struct DependencyGraph {
    ids: Vec<String>,
    index: HashMap<String, usize>,
    /// successors[a] = nodes that must come after a
    successors: Vec<BTreeSet<usize>>,
    /// predecessors[b] = nodes b depends on
    predecessors: Vec<BTreeSet<usize>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Mark {
    Unvisited,
    InProgress,
    Done,
}

impl DependencyGraph {
    /// Build the graph from nodes in construction order.
    ///
    /// Dependencies on ids that are not among `nodes` are ignored; the
    /// synthesizer rejects them before building.
    pub fn build(nodes: &[ResourceNode]) -> Self {
        let ids: Vec<String> = nodes.iter().map(|n| n.id().to_string()).collect();
        let index: HashMap<String, usize> = ids
            .iter()
            .enumerate()
            .map(|(i, id)| (id.clone(), i))
            .collect();

        let mut successors = vec![BTreeSet::new(); nodes.len()];
        let mut predecessors = vec![BTreeSet::new(); nodes.len()];

        for (to, node) in nodes.iter().enumerate() {
            for dep in node.dependency_ids() {
                if let Some(&from) = index.get(dep) {
                    successors[from].insert(to);
                    predecessors[to].insert(from);
                }
            }
        }

        Self {
            ids,
            index,
            successors,
            predecessors,
        }
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    /// All edges as `(before, after)` pairs, in construction order.
    pub fn edges(&self) -> Vec<(&str, &str)> {
        self.successors
            .iter()
            .enumerate()
            .flat_map(|(from, tos)| {
                tos.iter()
                    .map(move |&to| (self.ids[from].as_str(), self.ids[to].as_str()))
            })
            .collect()
    }

    pub fn has_edge(&self, before: &str, after: &str) -> bool {
        match (self.index.get(before), self.index.get(after)) {
            (Some(&from), Some(&to)) => self.successors[from].contains(&to),
            _ => false,
        }
    }

    /// Direct dependencies of `id`, in construction order.
    pub fn dependencies(&self, id: &str) -> Vec<&str> {
        self.neighbours(id, &self.predecessors)
    }

    /// Direct dependents of `id`, in construction order.
    pub fn dependents(&self, id: &str) -> Vec<&str> {
        self.neighbours(id, &self.successors)
    }

    fn neighbours<'a>(&'a self, id: &str, table: &'a [BTreeSet<usize>]) -> Vec<&'a str> {
        self.index
            .get(id)
            .map(|&i| table[i].iter().map(|&j| self.ids[j].as_str()).collect())
            .unwrap_or_default()
    }

    /// Every node reachable from `id` along edges (excluding `id`).
    pub fn transitive_dependents(&self, id: &str) -> BTreeSet<&str> {
        self.reachable(id, &self.successors)
    }

    /// Every node `id` transitively depends on (excluding `id`).
    pub fn transitive_dependencies(&self, id: &str) -> BTreeSet<&str> {
        self.reachable(id, &self.predecessors)
    }

    fn reachable<'a>(&'a self, id: &str, table: &[BTreeSet<usize>]) -> BTreeSet<&'a str> {
        let mut seen = BTreeSet::new();
        let Some(&start) = self.index.get(id) else {
            return BTreeSet::new();
        };
        let mut stack = vec![start];
        while let Some(current) = stack.pop() {
            for &next in &table[current] {
                if seen.insert(next) {
                    stack.push(next);
                }
            }
        }
        seen.into_iter()
            .filter(|&i| i != start)
            .map(|i| self.ids[i].as_str())
            .collect()
    }

    /// Find a cycle with a three-color depth-first search.
    ///
    /// Returns the ids along the cycle, starting and ending with the same
    /// id, so that each consecutive pair is an edge. The search keeps its
    /// own stack of successor iterators, so chain length is bounded by
    /// memory rather than by the thread stack.
    pub fn find_cycle(&self) -> Option<Vec<String>> {
        let mut marks = vec![Mark::Unvisited; self.len()];

        for start in 0..self.len() {
            if marks[start] != Mark::Unvisited {
                continue;
            }
            marks[start] = Mark::InProgress;
            // path[i] is the node whose successors frames[i] walks.
            let mut path = vec![start];
            let mut frames = vec![self.successors[start].iter()];

            while let Some(frame) = frames.last_mut() {
                let Some(&next) = frame.next() else {
                    frames.pop();
                    if let Some(done) = path.pop() {
                        marks[done] = Mark::Done;
                    }
                    continue;
                };
                match marks[next] {
                    Mark::InProgress => {
                        // Back-edge: next is on the current path.
                        let from = path.iter().position(|&p| p == next).unwrap_or(0);
                        let mut cycle: Vec<String> =
                            path[from..].iter().map(|&i| self.ids[i].clone()).collect();
                        cycle.push(self.ids[next].clone());
                        return Some(cycle);
                    }
                    Mark::Unvisited => {
                        marks[next] = Mark::InProgress;
                        path.push(next);
                        frames.push(self.successors[next].iter());
                    }
                    Mark::Done => {}
                }
            }
        }
        None
    }

    /// Group nodes into waves with Kahn's algorithm, processed layer by
    /// layer: a wave holds every node whose dependencies all sit in earlier
    /// waves. Nodes within a wave keep construction order, so the result is
    /// deterministic.
    ///
    /// Plan order is wave-major: with roots `a` and `c` and `b` depending on
    /// `a`, the order is `a, c, b` even though `b` was declared before `c`.
    pub fn waves(&self) -> Result<Vec<Vec<&str>>> {
        if let Some(cycle) = self.find_cycle() {
            return Err(Error::CyclicDependency { cycle });
        }

        let mut in_degree: Vec<usize> = self.predecessors.iter().map(BTreeSet::len).collect();
        let mut frontier: BTreeSet<usize> = in_degree
            .iter()
            .enumerate()
            .filter(|&(_, &degree)| degree == 0)
            .map(|(i, _)| i)
            .collect();

        let mut waves: Vec<Vec<&str>> = Vec::new();
        let mut placed = 0;
        while !frontier.is_empty() {
            let mut next = BTreeSet::new();
            for &node in &frontier {
                for &after in &self.successors[node] {
                    in_degree[after] -= 1;
                    if in_degree[after] == 0 {
                        next.insert(after);
                    }
                }
            }
            placed += frontier.len();
            waves.push(frontier.iter().map(|&i| self.ids[i].as_str()).collect());
            frontier = next;
        }

        if placed != self.len() {
            // Unreachable once find_cycle passed; report what is left.
            let cycle = (0..self.len())
                .filter(|&i| in_degree[i] > 0)
                .map(|i| self.ids[i].clone())
                .collect();
            return Err(Error::CyclicDependency { cycle });
        }

        Ok(waves)
    }

    /// Topological order: the waves, flattened.
    ///
    /// For every edge `a -> b`, `a` comes before `b`. Callers that also need
    /// the waves should flatten them with [`flatten_waves`] instead.
    pub fn topological_order(&self) -> Result<Vec<&str>> {
        Ok(flatten_waves(&self.waves()?))
    }
}

/// Plan order from waves: wave by wave, construction order within a wave.
pub fn flatten_waves<'a>(waves: &[Vec<&'a str>]) -> Vec<&'a str> {
    waves.iter().flatten().copied().collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stack::Stack;

    fn stack_with_edges(ids: &[&str], edges: &[(&str, &str)]) -> Stack {
        let mut stack = Stack::new("test");
        for id in ids {
            let mut builder = stack.resource("thing").id(*id);
            for (before, after) in edges {
                if after == id {
                    builder = builder.depends_on(before);
                }
            }
            builder.create().unwrap();
        }
        stack
    }

    #[test]
    fn test_edges_from_references_and_depends_on() {
        let mut stack = Stack::new("test");
        let rg = stack
            .resource("resource-group")
            .id("rg")
            .set("location", "eastus")
            .create()
            .unwrap();
        stack
            .resource("identity")
            .id("identity")
            .set("location", rg.attr("location"))
            .create()
            .unwrap();
        stack
            .resource("workspace")
            .id("logs")
            .depends_on(&rg)
            .create()
            .unwrap();

        let graph = DependencyGraph::build(stack.nodes());
        assert_eq!(graph.edges(), vec![("rg", "identity"), ("rg", "logs")]);
        assert!(graph.has_edge("rg", "logs"));
        assert!(!graph.has_edge("logs", "rg"));
        assert_eq!(graph.dependents("rg"), vec!["identity", "logs"]);
        assert_eq!(graph.dependencies("identity"), vec!["rg"]);
    }

    #[test]
    fn test_topological_order_breaks_ties_by_construction() {
        let stack = stack_with_edges(&["c", "a", "b", "d"], &[("b", "c"), ("c", "d")]);
        let graph = DependencyGraph::build(stack.nodes());
        // a and b are free; c waits for b, d waits for c
        assert_eq!(graph.topological_order().unwrap(), vec!["a", "b", "c", "d"]);
    }

    #[test]
    fn test_cycle_is_reported_as_closed_path() {
        let stack = stack_with_edges(&["a", "b", "c"], &[("a", "b"), ("b", "c"), ("c", "a")]);
        let graph = DependencyGraph::build(stack.nodes());

        let cycle = graph.find_cycle().unwrap();
        assert_eq!(cycle.first(), cycle.last());
        for pair in cycle.windows(2) {
            assert!(graph.has_edge(&pair[0], &pair[1]), "{pair:?} is not an edge");
        }
        assert!(matches!(
            graph.topological_order(),
            Err(Error::CyclicDependency { .. })
        ));
    }

    #[test]
    fn test_self_reference_is_a_cycle() {
        let mut stack = Stack::new("test");
        stack
            .resource("thing")
            .id("a")
            .set("name", crate::AttributeRef::new("a", "id"))
            .create()
            .unwrap();
        let graph = DependencyGraph::build(stack.nodes());
        assert_eq!(graph.find_cycle(), Some(vec!["a".to_string(), "a".to_string()]));
    }

    #[test]
    fn test_waves() {
        let stack = stack_with_edges(
            &["rg", "registry", "identity", "role"],
            &[("rg", "identity"), ("identity", "role"), ("registry", "role")],
        );
        let graph = DependencyGraph::build(stack.nodes());
        assert_eq!(
            graph.waves().unwrap(),
            vec![vec!["rg", "registry"], vec!["identity"], vec!["role"]]
        );
    }

    #[test]
    fn test_transitive_dependents() {
        let stack = stack_with_edges(
            &["rg", "identity", "role", "other"],
            &[("rg", "identity"), ("identity", "role")],
        );
        let graph = DependencyGraph::build(stack.nodes());
        assert_eq!(
            graph.transitive_dependents("rg").into_iter().collect::<Vec<_>>(),
            vec!["identity", "role"]
        );
        assert_eq!(
            graph.transitive_dependencies("role").into_iter().collect::<Vec<_>>(),
            vec!["identity", "rg"]
        );
        assert!(graph.transitive_dependents("other").is_empty());
    }

    #[test]
    fn test_plan_order_is_wave_major() {
        let stack = stack_with_edges(&["a", "b", "c"], &[("a", "b")]);
        let graph = DependencyGraph::build(stack.nodes());
        assert_eq!(graph.waves().unwrap(), vec![vec!["a", "c"], vec!["b"]]);
        assert_eq!(graph.topological_order().unwrap(), vec!["a", "c", "b"]);
    }

    fn chain(len: usize) -> Stack {
        let mut stack = Stack::new("test");
        stack.resource("thing").id("n0").create().unwrap();
        for i in 1..len {
            stack
                .resource("thing")
                .id(format!("n{i}"))
                .depends_on(format!("n{}", i - 1))
                .create()
                .unwrap();
        }
        stack
    }

    #[test]
    fn test_long_chain_orders_without_recursion() {
        let stack = chain(20_000);
        let graph = DependencyGraph::build(stack.nodes());

        assert_eq!(graph.find_cycle(), None);
        let order = graph.topological_order().unwrap();
        assert_eq!(order.len(), 20_000);
        assert_eq!(order.first(), Some(&"n0"));
        assert_eq!(order.last(), Some(&"n19999"));
        assert_eq!(graph.waves().unwrap().len(), 20_000);
    }

    #[test]
    fn test_long_cycle_is_found() {
        // Every node waits for the one before it; n0 waits for the last.
        let mut stack = Stack::new("test");
        for i in 0..20_000 {
            stack
                .resource("thing")
                .id(format!("n{i}"))
                .depends_on(format!("n{}", (i + 19_999) % 20_000))
                .create()
                .unwrap();
        }
        let graph = DependencyGraph::build(stack.nodes());
        assert_eq!(graph.edges().len(), 20_000);

        let cycle = graph.find_cycle().unwrap();
        assert_eq!(cycle.len(), 20_001);
        assert_eq!(cycle.first(), cycle.last());
    }
}
