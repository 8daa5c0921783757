//! Execution semantics: how each node forwards its tokens
//!
//! The simulator is one implementation parameterized by a policy. The same
//! stepping, branching and verdict logic serves raw dependency graphs and
//! full gateway graphs.

use crate::{SimulationError, SimulationResult};
use process_types::{ElementKind, GatewayKind, GatewayRole, Graph, NodeId};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// What a node does with the tokens it holds
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum Firing {
    /// Move every token to the single child
    Forward,
    /// Move every token to exactly one child; each child is its own branch
    Choose,
    /// Copy the tokens onto every child
    Duplicate,
    /// Fire once per full set of tokens, one from each parent
    Synchronize,
    /// Keep the tokens; this is a terminal node
    Absorb,
}

/// A token-forwarding policy
pub trait ExecutionSemantics {
    /// Nodes that receive an initial token. Each one starts its own branch.
    fn entries(&self, graph: &Graph) -> SimulationResult<Vec<NodeId>>;

    /// How `node` fires
    fn firing(&self, graph: &Graph, node: NodeId) -> Firing;

    /// Whether tokens may legitimately rest on `node`
    fn is_end(&self, graph: &Graph, node: NodeId) -> bool {
        graph.children(node).is_empty()
            || graph.element(node).map(|e| e.is_end()).unwrap_or(false)
    }
}

// ── Gateway graphs ───────────────────────────────────────────────────

/// Semantics of an explicit gateway graph, read from element kinds
#[derive(Clone, Copy, Debug, Default)]
pub struct GatewaySemantics;

impl GatewaySemantics {
    pub fn new() -> Self {
        Self
    }
}

impl ExecutionSemantics for GatewaySemantics {
    fn entries(&self, graph: &Graph) -> SimulationResult<Vec<NodeId>> {
        let starts: Vec<NodeId> = graph
            .node_ids()
            .filter(|id| graph.element(*id).map(|e| e.is_start()).unwrap_or(false))
            .collect();
        if starts.is_empty() {
            return Err(SimulationError::NoEntryNode);
        }
        Ok(starts)
    }

    fn firing(&self, graph: &Graph, node: NodeId) -> Firing {
        if self.is_end(graph, node) {
            return Firing::Absorb;
        }
        match graph.element(node).map(|e| &e.kind) {
            Some(ElementKind::Gateway { kind, role }) => match (kind, role) {
                (GatewayKind::Exclusive, GatewayRole::Split) => Firing::Choose,
                (GatewayKind::Parallel, GatewayRole::Split) => Firing::Duplicate,
                (GatewayKind::Parallel, GatewayRole::Merge) => Firing::Synchronize,
                (GatewayKind::Exclusive, GatewayRole::Merge) => Firing::Forward,
            },
            Some(_) => Firing::Forward,
            None => Firing::Absorb,
        }
    }
}

// ── Dependency graphs ────────────────────────────────────────────────

/// Semantics of a dependency graph with implicit gateways.
///
/// Fan-out is read as an exclusive choice and fan-in as a plain merge.
/// Every initial node is simulated as its own entry.
#[derive(Clone, Debug, Default)]
pub struct DependencySemantics {
    initial: BTreeSet<NodeId>,
}

impl DependencySemantics {
    pub fn new(initial: BTreeSet<NodeId>) -> Self {
        Self { initial }
    }
}

impl ExecutionSemantics for DependencySemantics {
    fn entries(&self, graph: &Graph) -> SimulationResult<Vec<NodeId>> {
        let entries: Vec<NodeId> = if self.initial.is_empty() {
            graph.sources().into_iter().collect()
        } else {
            self.initial.iter().copied().filter(|id| graph.contains(*id)).collect()
        };
        if entries.is_empty() {
            return Err(SimulationError::NoEntryNode);
        }
        Ok(entries)
    }

    fn firing(&self, graph: &Graph, node: NodeId) -> Firing {
        match graph.children(node).len() {
            0 => Firing::Absorb,
            1 => Firing::Forward,
            _ => Firing::Choose,
        }
    }
}
