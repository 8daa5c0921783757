//! Merge promotion
//!
//! An exclusive merge whose inputs descend from different children of one
//! parallel split passes on every token it receives, so whatever follows it
//! runs once per incoming branch. Such merges (or the affected subset of their inputs) are turned into
//! parallel merges, and the change is kept only if the oracle agrees.

use crate::candidate::Candidate;
use crate::explicit::gateway;
use process_simulator::{simulate, SimulationConfig};
use process_types::{GatewayKind, GatewayRole, Graph, NodeId, ProcessResult, Walk};
use std::collections::{BTreeMap, BTreeSet};

/// Promote exclusive merges fed by a common parallel split. Returns the
/// number of promotions kept.
pub fn promote_merges(candidate: &mut Candidate, simulation: &SimulationConfig) -> ProcessResult<usize> {
    let merges: Vec<NodeId> = candidate
        .cfg
        .gateways(GatewayKind::Exclusive, GatewayRole::Merge);
    let mut promoted = 0;

    for merge in merges {
        let Some((split, inputs)) = shared_split(candidate.graph(), merge) else {
            continue;
        };
        if candidate.paired_merge(split).is_some() {
            continue;
        }

        let mut trial = candidate.clone();
        let all_parents = inputs.len() == trial.graph().parents(merge).len();
        let pm = if all_parents {
            trial
                .graph_mut()
                .set_kind(merge, gateway(GatewayKind::Parallel, GatewayRole::Merge))?;
            merge
        } else {
            let graph = trial.graph_mut();
            let pm = graph.add(gateway(GatewayKind::Parallel, GatewayRole::Merge));
            for input in &inputs {
                graph.unlink(*input, merge);
                graph.link(*input, pm)?;
            }
            graph.link(pm, merge)?;
            pm
        };
        trial.pair(split, pm);

        let sound = simulate(&trial.cfg, simulation)
            .map(|report| report.is_sound())
            .unwrap_or(false);
        if sound {
            tracing::debug!(
                merge = %candidate.graph().label(merge),
                inputs = inputs.len(),
                "Exclusive merge promoted"
            );
            *candidate = trial;
            promoted += 1;
        } else {
            tracing::debug!(merge = %candidate.graph().label(merge), "Promotion rejected by simulation");
        }
    }

    tracing::info!(promoted, "Merge promotion complete");
    Ok(promoted)
}

/// The first parallel split reached, through distinct children, by at
/// least two inputs of `merge`, together with those inputs
fn shared_split(graph: &Graph, merge: NodeId) -> Option<(NodeId, Vec<NodeId>)> {
    // split → (child → input)
    let mut by_split: BTreeMap<NodeId, BTreeMap<NodeId, Vec<NodeId>>> = BTreeMap::new();
    for parent in graph.parents(merge) {
        if let Some((split, child)) = nearest_parallel_split(graph, merge, *parent) {
            by_split
                .entry(split)
                .or_default()
                .entry(child)
                .or_default()
                .push(*parent);
        }
    }
    by_split.into_iter().find_map(|(split, children)| {
        let distinct: Vec<NodeId> = children
            .values()
            .filter(|inputs| inputs.len() == 1)
            .map(|inputs| inputs[0])
            .collect();
        (distinct.len() >= 2).then_some((split, distinct))
    })
}

/// Nearest parallel split above `node` without crossing an exclusive split
/// or `merge`, plus the one child of that split leading down to `node`
fn nearest_parallel_split(graph: &Graph, merge: NodeId, node: NodeId) -> Option<(NodeId, NodeId)> {
    let blocked: Vec<NodeId> = std::iter::once(merge)
        .chain(
            graph
                .node_ids()
                .filter(|id| graph.is_gateway_of(*id, GatewayKind::Exclusive, GatewayRole::Split)),
        )
        .collect();
    let distances = Walk::backward(graph).blocking(blocked.iter().copied()).distances(node);
    let split = distances
        .iter()
        .filter(|(id, _)| graph.is_gateway_of(**id, GatewayKind::Parallel, GatewayRole::Split))
        .min_by_key(|(id, d)| (**d, **id))
        .map(|(id, _)| *id)?;

    let avoid: BTreeSet<NodeId> = blocked.into_iter().chain(std::iter::once(split)).collect();
    let mut leading = graph
        .children(split)
        .iter()
        .copied()
        .filter(|child| graph.can_reach_avoiding(*child, node, &avoid));
    match (leading.next(), leading.next()) {
        (Some(child), None) => Some((split, child)),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use process_types::ControlFlowGraph;

    /// start → ps → {A, B} → xm → C → end
    fn split_into_exclusive_merge() -> (Candidate, NodeId) {
        let mut g = Graph::new();
        let start = g.add_start();
        let ps = g.add_gateway(GatewayKind::Parallel, GatewayRole::Split);
        let a = g.add_task("A");
        let b = g.add_task("B");
        let xm = g.add_gateway(GatewayKind::Exclusive, GatewayRole::Merge);
        let c = g.add_task("C");
        let end = g.add_end();
        for (x, y) in [(start, ps), (ps, a), (ps, b), (a, xm), (b, xm), (xm, c), (c, end)] {
            g.link(x, y).unwrap();
        }
        (Candidate::new(ControlFlowGraph::from_parts(g, start).unwrap()), xm)
    }

    #[test]
    fn test_merge_after_parallel_split_is_promoted() {
        let (mut candidate, xm) = split_into_exclusive_merge();
        let promoted = promote_merges(&mut candidate, &SimulationConfig::default()).unwrap();
        assert_eq!(promoted, 1);
        assert!(candidate.is_parallel(xm, GatewayRole::Merge));
        assert_eq!(candidate.pairs().len(), 1);
        assert!(simulate(&candidate.cfg, &SimulationConfig::default()).unwrap().is_sound());
    }

    #[test]
    fn test_merge_behind_exclusive_split_untouched() {
        let mut g = Graph::new();
        let start = g.add_start();
        let xs = g.add_gateway(GatewayKind::Exclusive, GatewayRole::Split);
        let a = g.add_task("A");
        let b = g.add_task("B");
        let xm = g.add_gateway(GatewayKind::Exclusive, GatewayRole::Merge);
        let end = g.add_end();
        for (x, y) in [(start, xs), (xs, a), (xs, b), (a, xm), (b, xm), (xm, end)] {
            g.link(x, y).unwrap();
        }
        let mut candidate = Candidate::new(ControlFlowGraph::from_parts(g, start).unwrap());
        assert_eq!(promote_merges(&mut candidate, &SimulationConfig::default()).unwrap(), 0);
        assert!(candidate.parallel_gateways().is_empty());
    }
}
