//! Cleanup rewrites applied to finished graphs
//!
//! Synthesis leaves behind gateways that only forward into another gateway
//! of the same flavour, placeholder tasks, and gateways that ended up with
//! a single incoming and a single outgoing flow. These passes remove them
//! without changing the execution semantics.

use crate::{Graph, NodeId, ProcessResult};
use serde::{Deserialize, Serialize};

/// What a cleanup run removed
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CleanupStats {
    pub gateways_merged: usize,
    pub placeholders_removed: usize,
    pub trivial_gateways_removed: usize,
}

impl CleanupStats {
    pub fn total(&self) -> usize {
        self.gateways_merged + self.placeholders_removed + self.trivial_gateways_removed
    }
}

/// Run every cleanup pass until the graph stops changing
pub fn cleanup(graph: &mut Graph) -> ProcessResult<CleanupStats> {
    let mut stats = CleanupStats::default();
    loop {
        let round = CleanupStats {
            placeholders_removed: remove_placeholders(graph)?,
            gateways_merged: merge_adjacent_gateways(graph)?,
            trivial_gateways_removed: remove_trivial_gateways(graph)?,
        };
        if round.total() == 0 {
            break;
        }
        stats.gateways_merged += round.gateways_merged;
        stats.placeholders_removed += round.placeholders_removed;
        stats.trivial_gateways_removed += round.trivial_gateways_removed;
    }
    tracing::debug!(
        merged = stats.gateways_merged,
        placeholders = stats.placeholders_removed,
        trivial = stats.trivial_gateways_removed,
        "Cleanup finished"
    );
    Ok(stats)
}

/// Fold adjacent gateways of the same kind and role into one.
///
/// A split whose only parent is a split of the same kind hands its children
/// to that parent. A merge whose only child is a merge of the same kind
/// hands its parents to that child.
pub fn merge_adjacent_gateways(graph: &mut Graph) -> ProcessResult<usize> {
    let mut merged = 0;
    while let Some((keep, absorb)) = next_adjacent_pair(graph) {
        let is_split = graph.element(keep).map(|e| e.is_split()).unwrap_or(false);
        if is_split {
            graph.unlink(keep, absorb);
            graph.move_children(absorb, keep)?;
        } else {
            graph.unlink(absorb, keep);
            graph.move_parents(absorb, keep)?;
        }
        graph.remove(absorb)?;
        merged += 1;
    }
    Ok(merged)
}

/// Find `(keep, absorb)` for the next foldable gateway pair
fn next_adjacent_pair(graph: &Graph) -> Option<(NodeId, NodeId)> {
    for (parent, child) in graph.edges() {
        if parent == child {
            continue;
        }
        let (Some(p), Some(c)) = (graph.element(parent), graph.element(child)) else {
            continue;
        };
        let (Some(pg), Some(cg)) = (p.gateway(), c.gateway()) else {
            continue;
        };
        if pg != cg {
            continue;
        }
        if p.is_split() && graph.parents(child).len() == 1 {
            let overlap = graph
                .children(child)
                .iter()
                .any(|n| *n == parent || graph.has_edge(parent, *n));
            if !overlap {
                return Some((parent, child));
            }
        }
        if p.is_merge() && graph.children(parent).len() == 1 {
            let overlap = graph
                .parents(parent)
                .iter()
                .any(|n| *n == child || graph.has_edge(*n, child));
            if !overlap {
                return Some((child, parent));
            }
        }
    }
    None
}

/// Splice out synchronization and dummy tasks with one parent and one child.
/// A placeholder with several parents still joins them and is kept.
pub fn remove_placeholders(graph: &mut Graph) -> ProcessResult<usize> {
    let candidates: Vec<NodeId> = graph
        .node_ids()
        .filter(|id| graph.element(*id).map(|e| e.is_placeholder()).unwrap_or(false))
        .collect();
    let mut removed = 0;
    for id in candidates {
        if can_splice(graph, id) {
            graph.splice_out(id)?;
            removed += 1;
        }
    }
    Ok(removed)
}

/// Splice out gateways left with one parent and one child.
///
/// Skipped when the parent already links to the child, since splicing would
/// collapse two distinct flows into one edge.
pub fn remove_trivial_gateways(graph: &mut Graph) -> ProcessResult<usize> {
    let candidates: Vec<NodeId> = graph
        .node_ids()
        .filter(|id| graph.element(*id).map(|e| e.is_gateway()).unwrap_or(false))
        .collect();
    let mut removed = 0;
    for id in candidates {
        if can_splice(graph, id) {
            graph.splice_out(id)?;
            removed += 1;
        }
    }
    Ok(removed)
}

/// One parent, one child, no self edge, and no existing parent → child edge
fn can_splice(graph: &Graph, id: NodeId) -> bool {
    let parents = graph.parents(id);
    let children = graph.children(id);
    if parents.len() != 1 || children.len() != 1 || parents.contains(&id) || children.contains(&id) {
        return false;
    }
    match (parents.iter().next(), children.iter().next()) {
        (Some(p), Some(c)) => !graph.has_edge(*p, *c),
        _ => false,
    }
}
