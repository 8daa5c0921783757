//! Dependency graphs: activities under precedence, gateways still implicit
//!
//! A dependency graph may have several initial and several end nodes. Each
//! declared activity maps to exactly one task node.

use crate::{Graph, LoopConstraint, NodeId, ProcessError, ProcessResult, Walk};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

/// A multi-source, multi-sink graph of activities
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct DependencyGraph {
    graph: Graph,
    initial: BTreeSet<NodeId>,
    activities: BTreeMap<String, NodeId>,
}

impl DependencyGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add an activity, or return the node it already has
    pub fn add_activity(&mut self, name: &str) -> NodeId {
        if let Some(id) = self.activities.get(name) {
            return *id;
        }
        let id = self.graph.add_task(name);
        self.activities.insert(name.to_string(), id);
        id
    }

    /// Link two existing activities. Returns false if the edge existed.
    pub fn add_precedence(&mut self, before: &str, after: &str) -> ProcessResult<bool> {
        let from = self.require(before)?;
        let to = self.require(after)?;
        self.graph.link(from, to)
    }

    pub fn node_for(&self, name: &str) -> Option<NodeId> {
        self.activities.get(name).copied()
    }

    fn require(&self, name: &str) -> ProcessResult<NodeId> {
        self.node_for(name)
            .ok_or_else(|| ProcessError::UnknownActivity(name.to_string()))
    }

    pub fn contains_activity(&self, name: &str) -> bool {
        self.activities.contains_key(name)
    }

    /// Activity names mapped to their nodes
    pub fn activities(&self) -> &BTreeMap<String, NodeId> {
        &self.activities
    }

    pub fn graph(&self) -> &Graph {
        &self.graph
    }

    pub fn graph_mut(&mut self) -> &mut Graph {
        &mut self.graph
    }

    pub fn initial_nodes(&self) -> &BTreeSet<NodeId> {
        &self.initial
    }

    /// Nodes of end kind or without children
    pub fn end_nodes(&self) -> BTreeSet<NodeId> {
        self.graph
            .node_ids()
            .filter(|id| {
                self.graph.children(*id).is_empty()
                    || self.graph.element(*id).map(|e| e.is_end()).unwrap_or(false)
            })
            .collect()
    }

    /// Recompute the canonical initial nodes.
    ///
    /// Parentless nodes come first. A declared loop that none of them
    /// reaches would otherwise be lost, so its first present member is
    /// added as an entry.
    pub fn recompute_initial_nodes(&mut self, loops: &[LoopConstraint]) {
        let mut initial = self.graph.sources();

        let mut covered = BTreeSet::new();
        let walk = Walk::forward(&self.graph);
        for id in &initial {
            walk.visit(*id, &mut covered);
        }

        for l in loops {
            let Some(entry) = l.activities.iter().find_map(|name| self.node_for(name)) else {
                continue;
            };
            if !covered.contains(&entry) {
                walk.visit(entry, &mut covered);
                initial.insert(entry);
            }
        }

        // Anything still unreachable sits on an undeclared cycle; give it an entry.
        for id in self.graph.node_ids().collect::<Vec<_>>() {
            if !covered.contains(&id) {
                walk.visit(id, &mut covered);
                initial.insert(id);
            }
        }

        self.initial = initial;
    }

    /// Edges as activity-name pairs, for comparisons and diagnostics
    pub fn edges_by_name(&self) -> BTreeSet<(String, String)> {
        self.graph
            .edges()
            .into_iter()
            .map(|(a, b)| (self.graph.label(a), self.graph.label(b)))
            .collect()
    }

    /// Drop a node from the activity map and the graph
    pub fn remove(&mut self, id: NodeId) -> ProcessResult<()> {
        self.graph.remove(id)?;
        self.activities.retain(|_, node| *node != id);
        self.initial.remove(&id);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_add_activity_is_idempotent() {
        let mut dg = DependencyGraph::new();
        let a = dg.add_activity("A");
        assert_eq!(dg.add_activity("A"), a);
        assert_eq!(dg.graph().len(), 1);
    }

    #[test]
    fn test_precedence_requires_known_activities() {
        let mut dg = DependencyGraph::new();
        dg.add_activity("A");
        assert!(matches!(
            dg.add_precedence("A", "B"),
            Err(ProcessError::UnknownActivity(name)) if name == "B"
        ));
    }

    #[test]
    fn test_initial_nodes_are_sources() {
        let mut dg = DependencyGraph::new();
        let a = dg.add_activity("A");
        dg.add_activity("B");
        let c = dg.add_activity("C");
        dg.add_precedence("A", "B").unwrap();
        dg.recompute_initial_nodes(&[]);
        assert_eq!(dg.initial_nodes(), &[a, c].into_iter().collect());
        assert_eq!(dg.end_nodes().len(), 2);
    }

    #[test]
    fn test_unreachable_loop_gets_entry() {
        let mut dg = DependencyGraph::new();
        let a = dg.add_activity("A");
        let b = dg.add_activity("B");
        dg.add_precedence("A", "B").unwrap();
        dg.add_precedence("B", "A").unwrap();
        dg.recompute_initial_nodes(&[LoopConstraint::new(["B", "A"])]);
        assert_eq!(dg.initial_nodes(), &[b].into_iter().collect());
        assert!(!dg.initial_nodes().contains(&a));
    }

    #[test]
    fn test_edges_by_name() {
        let mut dg = DependencyGraph::new();
        dg.add_activity("A");
        dg.add_activity("B");
        dg.add_precedence("A", "B").unwrap();
        let edges = dg.edges_by_name();
        assert!(edges.contains(&("A".to_string(), "B".to_string())));
    }
}
