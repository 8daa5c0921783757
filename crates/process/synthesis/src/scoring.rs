//! Parallelism scoring
//!
//! Structural alternatives are compared on how much concurrency they
//! expose. The metric is collected once and handed to a pluggable
//! [`ParallelismScore`] strategy.

use crate::ScoringWeights;
use process_types::{ActivityPair, ActivityPairSet, GatewayKind, GatewayRole, Graph, NodeId, Walk};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// What a scoring strategy looks at
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScoreMetrics {
    /// Activity pairs that may run concurrently
    pub concurrent_pairs: usize,
    /// Of those, pairs that were declared parallel
    pub declared_parallel_pairs: usize,
    /// Parallel gateways (splits plus merges, or parallel groups before splicing)
    pub parallel_gateways: usize,
}

impl ScoreMetrics {
    pub fn from_pairs(
        pairs: &BTreeSet<ActivityPair>,
        declared: &ActivityPairSet,
        parallel_gateways: usize,
    ) -> Self {
        Self {
            concurrent_pairs: pairs.len(),
            declared_parallel_pairs: pairs
                .iter()
                .filter(|p| declared.contains(&p.first, &p.second))
                .count(),
            parallel_gateways,
        }
    }
}

/// A strategy ranking structural alternatives; higher is better
pub trait ParallelismScore {
    fn score(&self, metrics: &ScoreMetrics) -> i64;
}

/// Concurrency count plus a weighted bonus for declared-parallel pairs
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct WeightedScore {
    weights: ScoringWeights,
}

impl WeightedScore {
    pub fn new(weights: ScoringWeights) -> Self {
        Self { weights }
    }
}

impl ParallelismScore for WeightedScore {
    fn score(&self, metrics: &ScoreMetrics) -> i64 {
        self.weights.concurrency * metrics.concurrent_pairs as i64
            + self.weights.declared_parallel * metrics.declared_parallel_pairs as i64
    }
}

impl<F> ParallelismScore for F
where
    F: Fn(&ScoreMetrics) -> i64,
{
    fn score(&self, metrics: &ScoreMetrics) -> i64 {
        self(metrics)
    }
}

// ── Concurrency analysis ─────────────────────────────────────────────

/// Activity pairs a finished graph lets run concurrently.
///
/// For every parallel split, the activities reachable from one child but
/// not from another are concurrent with those reachable only from the
/// other. Activities every child reaches lie after the merge.
pub fn concurrent_pairs(graph: &Graph) -> BTreeSet<ActivityPair> {
    let mut pairs = BTreeSet::new();
    for split in graph.node_ids() {
        if !graph.is_gateway_of(split, GatewayKind::Parallel, GatewayRole::Split) {
            continue;
        }
        let regions: Vec<BTreeSet<String>> = graph
            .children(split)
            .iter()
            .map(|child| activities_in(graph, &Walk::forward(graph).blocking([split]).reachable(*child)))
            .collect();
        for (i, left) in regions.iter().enumerate() {
            for right in &regions[i + 1..] {
                for a in left.difference(right) {
                    for b in right.difference(left) {
                        pairs.insert(ActivityPair::new(a.clone(), b.clone()));
                    }
                }
            }
        }
    }
    pairs
}

/// Score inputs for a finished graph
pub fn graph_metrics(graph: &Graph, declared: &ActivityPairSet) -> ScoreMetrics {
    let gateways = graph
        .node_ids()
        .filter(|id| {
            graph
                .element(*id)
                .and_then(|e| e.gateway())
                .map(|(kind, _)| kind == GatewayKind::Parallel)
                .unwrap_or(false)
        })
        .count();
    ScoreMetrics::from_pairs(&concurrent_pairs(graph), declared, gateways)
}

pub(crate) fn activities_in(graph: &Graph, nodes: &BTreeSet<NodeId>) -> BTreeSet<String> {
    nodes
        .iter()
        .filter_map(|n| graph.element(*n).and_then(|e| e.activity_name()))
        .map(str::to_string)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parallel_diamond() -> Graph {
        let mut g = Graph::new();
        let ps = g.add_gateway(GatewayKind::Parallel, GatewayRole::Split);
        let a = g.add_task("A");
        let b = g.add_task("B");
        let c = g.add_task("C");
        let pm = g.add_gateway(GatewayKind::Parallel, GatewayRole::Merge);
        let d = g.add_task("D");
        for (x, y) in [(ps, a), (ps, b), (b, c), (a, pm), (c, pm), (pm, d)] {
            g.link(x, y).unwrap();
        }
        g
    }

    #[test]
    fn test_concurrent_pairs_exclude_after_merge() {
        let pairs = concurrent_pairs(&parallel_diamond());
        let expected: BTreeSet<ActivityPair> =
            [ActivityPair::new("A", "B"), ActivityPair::new("A", "C")].into_iter().collect();
        assert_eq!(pairs, expected);
    }

    #[test]
    fn test_weighted_score() {
        let declared: ActivityPairSet = [ActivityPair::new("B", "A")].into_iter().collect();
        let metrics = graph_metrics(&parallel_diamond(), &declared);
        assert_eq!(metrics.concurrent_pairs, 2);
        assert_eq!(metrics.declared_parallel_pairs, 1);
        assert_eq!(metrics.parallel_gateways, 2);
        assert_eq!(WeightedScore::new(ScoringWeights::default()).score(&metrics), 7);
    }

    #[test]
    fn test_closure_as_score() {
        let only_gateways = |m: &ScoreMetrics| m.parallel_gateways as i64;
        let metrics = ScoreMetrics {
            parallel_gateways: 4,
            ..Default::default()
        };
        assert_eq!(only_gateways.score(&metrics), 4);
    }
}
