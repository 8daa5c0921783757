//! Candidate graphs explored by the synthesis search

use crate::explicit::gateway;
use process_types::{ControlFlowGraph, GatewayKind, GatewayRole, Graph, NodeId, ProcessResult};
use std::collections::{BTreeMap, BTreeSet};

/// A control-flow graph plus the parallel split → merge pairings made
/// while building it
#[derive(Clone, Debug)]
pub struct Candidate {
    pub cfg: ControlFlowGraph,
    pairs: BTreeMap<NodeId, NodeId>,
}

impl Candidate {
    pub fn new(cfg: ControlFlowGraph) -> Self {
        Self {
            cfg,
            pairs: BTreeMap::new(),
        }
    }

    pub fn graph(&self) -> &Graph {
        self.cfg.graph()
    }

    pub fn graph_mut(&mut self) -> &mut Graph {
        self.cfg.graph_mut()
    }

    /// Record that `merge` closes the region opened by `split`
    pub fn pair(&mut self, split: NodeId, merge: NodeId) {
        self.pairs.insert(split, merge);
    }

    pub fn paired_merge(&self, split: NodeId) -> Option<NodeId> {
        self.pairs.get(&split).copied()
    }

    pub fn paired_split(&self, merge: NodeId) -> Option<NodeId> {
        self.pairs
            .iter()
            .find(|(_, m)| **m == merge)
            .map(|(s, _)| *s)
    }

    pub fn pairs(&self) -> &BTreeMap<NodeId, NodeId> {
        &self.pairs
    }

    /// Every parallel split and merge, used as the memo key of the search
    pub fn parallel_gateways(&self) -> BTreeSet<NodeId> {
        let graph = self.graph();
        graph
            .node_ids()
            .filter(|id| {
                graph
                    .element(*id)
                    .and_then(|e| e.gateway())
                    .map(|(kind, _)| kind == GatewayKind::Parallel)
                    .unwrap_or(false)
            })
            .collect()
    }

    pub fn is_parallel(&self, node: NodeId, role: GatewayRole) -> bool {
        self.graph().is_gateway_of(node, GatewayKind::Parallel, role)
    }

    /// Copy with `gateway` (and its paired counterpart) turned exclusive
    pub fn demote(&self, gateway_node: NodeId) -> ProcessResult<Candidate> {
        let mut next = self.clone();
        let partner = self
            .paired_merge(gateway_node)
            .or_else(|| self.paired_split(gateway_node));
        for node in std::iter::once(gateway_node).chain(partner) {
            let Some((GatewayKind::Parallel, role)) = next.graph().element(node).and_then(|e| e.gateway())
            else {
                continue;
            };
            next.graph_mut().set_kind(node, gateway(GatewayKind::Exclusive, role))?;
        }
        next.pairs.retain(|s, m| *s != gateway_node && *m != gateway_node);
        Ok(next)
    }
}
