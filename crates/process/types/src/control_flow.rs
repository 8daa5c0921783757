//! Control-flow graphs: rooted, gateway-explicit execution graphs
//!
//! This is the synthesis output. It also defines the in-memory
//! [`ProcessModel`] hand-off consumed by diagram export.

use crate::{CopyMode, Graph, GatewayKind, GatewayRole, NodeId, NodeKind, NodeMap, ProcessError, ProcessResult, Walk};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

/// A graph with a single designated start event
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ControlFlowGraph {
    graph: Graph,
    start: NodeId,
}

impl ControlFlowGraph {
    /// Wrap a graph, checking that `start` is a start event
    pub fn from_parts(graph: Graph, start: NodeId) -> ProcessResult<Self> {
        match graph.element(start) {
            Some(e) if e.is_start() => Ok(Self { graph, start }),
            _ => Err(ProcessError::MissingStart),
        }
    }

    pub fn into_parts(self) -> (Graph, NodeId) {
        (self.graph, self.start)
    }

    pub fn graph(&self) -> &Graph {
        &self.graph
    }

    pub fn graph_mut(&mut self) -> &mut Graph {
        &mut self.graph
    }

    pub fn start(&self) -> NodeId {
        self.start
    }

    /// End events plus any node without children, reachable from start
    pub fn end_nodes(&self) -> BTreeSet<NodeId> {
        Walk::forward(&self.graph)
            .reachable(self.start)
            .into_iter()
            .filter(|id| self.is_end_node(*id))
            .collect()
    }

    pub fn is_end_node(&self, id: NodeId) -> bool {
        self.graph.children(id).is_empty()
            || self.graph.element(id).map(|e| e.is_end()).unwrap_or(false)
    }

    /// Declared activities in arena order
    pub fn tasks(&self) -> Vec<NodeId> {
        self.graph
            .node_ids()
            .filter(|id| {
                self.graph
                    .element(*id)
                    .and_then(|e| e.activity_name())
                    .is_some()
            })
            .collect()
    }

    /// Nodes whose element is a gateway of the given flavour
    pub fn gateways(&self, kind: GatewayKind, role: GatewayRole) -> Vec<NodeId> {
        self.graph
            .node_ids()
            .filter(|id| {
                self.graph
                    .element(*id)
                    .map(|e| e.is_gateway_of(kind, role))
                    .unwrap_or(false)
            })
            .collect()
    }

    /// Number of parallel split and merge gateways
    pub fn parallel_gateway_count(&self) -> usize {
        self.gateways(GatewayKind::Parallel, GatewayRole::Split).len()
            + self.gateways(GatewayKind::Parallel, GatewayRole::Merge).len()
    }

    /// Copy everything reachable from start into a compact arena
    pub fn compact(&self) -> (ControlFlowGraph, NodeMap) {
        let (graph, map) = self.graph.structural_copy(&[self.start], CopyMode::Weak);
        // The start node is always the first one copied.
        let start = map.get(&self.start).copied().unwrap_or(NodeId(0));
        (Self { graph, start }, map)
    }

    /// Check the structural rules of a finished graph.
    ///
    /// Exactly one start, at least one end, everything reachable from start,
    /// fan-out only at splits and fan-in only at merges.
    pub fn validate(&self) -> ProcessResult<()> {
        self.graph.check_consistency()?;

        let starts: Vec<NodeId> = self
            .graph
            .node_ids()
            .filter(|id| self.graph.element(*id).map(|e| e.is_start()).unwrap_or(false))
            .collect();
        if starts != [self.start] {
            return Err(ProcessError::ValidationError(format!(
                "Expected exactly one start event, found {}",
                starts.len()
            )));
        }
        if !self.graph.parents(self.start).is_empty() {
            return Err(ProcessError::ValidationError(
                "Start event must not have incoming flows".into(),
            ));
        }

        let reachable = Walk::forward(&self.graph).reachable(self.start);
        if let Some(orphan) = self.graph.node_ids().find(|id| !reachable.contains(id)) {
            return Err(ProcessError::ValidationError(format!(
                "Node '{}' is not reachable from start",
                self.graph.label(orphan)
            )));
        }

        if self.end_nodes().is_empty() {
            return Err(ProcessError::ValidationError("No end node".into()));
        }

        for id in self.graph.node_ids() {
            let Some(element) = self.graph.element(id) else {
                continue;
            };
            if element.is_end() && !self.graph.children(id).is_empty() {
                return Err(ProcessError::ValidationError(format!(
                    "End event {} has outgoing flows",
                    id
                )));
            }
            if self.graph.children(id).len() > 1 && !element.is_split() {
                return Err(ProcessError::ValidationError(format!(
                    "Implicit fan-out at '{}'",
                    self.graph.label(id)
                )));
            }
            if self.graph.parents(id).len() > 1 && !element.is_merge() {
                return Err(ProcessError::ValidationError(format!(
                    "Implicit fan-in at '{}'",
                    self.graph.label(id)
                )));
            }
        }
        Ok(())
    }

    /// Export the tagged node and edge lists
    pub fn to_model(&self) -> ProcessModel {
        let reachable = Walk::forward(&self.graph).reachable(self.start);
        let nodes = self
            .graph
            .node_ids()
            .filter(|id| reachable.contains(id))
            .filter_map(|id| {
                self.graph.element(id).map(|e| ModelNode {
                    id,
                    kind: e.node_kind(),
                    label: e.to_string(),
                })
            })
            .collect();
        let edges = self
            .graph
            .edges()
            .into_iter()
            .filter(|(s, _)| reachable.contains(s))
            .map(|(source, target)| ModelEdge { source, target })
            .collect();
        ProcessModel {
            start: self.start,
            ends: self.end_nodes().into_iter().collect(),
            nodes,
            edges,
        }
    }

    pub fn stats(&self) -> GraphStats {
        let mut by_kind = BTreeMap::new();
        for id in self.graph.node_ids() {
            if let Some(e) = self.graph.element(id) {
                *by_kind.entry(e.node_kind()).or_insert(0) += 1;
            }
        }
        GraphStats {
            nodes: self.graph.len(),
            edges: self.graph.edge_count(),
            by_kind,
        }
    }
}

// ── Export ───────────────────────────────────────────────────────────

/// One exported node
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModelNode {
    pub id: NodeId,
    pub kind: NodeKind,
    pub label: String,
}

/// One exported sequence flow
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModelEdge {
    pub source: NodeId,
    pub target: NodeId,
}

/// Tagged node and edge lists plus the declared end nodes
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProcessModel {
    pub start: NodeId,
    pub ends: Vec<NodeId>,
    pub nodes: Vec<ModelNode>,
    pub edges: Vec<ModelEdge>,
}

impl ProcessModel {
    pub fn node(&self, id: NodeId) -> Option<&ModelNode> {
        self.nodes.iter().find(|n| n.id == id)
    }

    /// Nodes with the given label
    pub fn find(&self, label: &str) -> Vec<&ModelNode> {
        self.nodes.iter().filter(|n| n.label == label).collect()
    }

    pub fn successors(&self, id: NodeId) -> Vec<NodeId> {
        self.edges
            .iter()
            .filter(|e| e.source == id)
            .map(|e| e.target)
            .collect()
    }

    pub fn predecessors(&self, id: NodeId) -> Vec<NodeId> {
        self.edges
            .iter()
            .filter(|e| e.target == id)
            .map(|e| e.source)
            .collect()
    }
}

/// Node counts per kind plus the edge count
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GraphStats {
    pub nodes: usize,
    pub edges: usize,
    pub by_kind: BTreeMap<NodeKind, usize>,
}

impl GraphStats {
    pub fn count(&self, kind: NodeKind) -> usize {
        self.by_kind.get(&kind).copied().unwrap_or(0)
    }

    pub fn gateways(&self) -> usize {
        [
            NodeKind::ExclusiveSplit,
            NodeKind::ExclusiveMerge,
            NodeKind::ParallelSplit,
            NodeKind::ParallelMerge,
        ]
        .into_iter()
        .map(|k| self.count(k))
        .sum()
    }
}
