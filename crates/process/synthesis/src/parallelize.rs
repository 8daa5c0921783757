//! Parallel splitting
//!
//! Every exclusive split of the initial control-flow graph is examined once.
//! Its branches are regrouped into the best-scoring valid arrangement and
//! the parallel groups of that arrangement are spliced in, each closed by a
//! parallel merge at the group's sync point.

use crate::analysis::SplitAnalysis;
use crate::arrangement::{arrangements, best, evaluate, greedy_arrangements, Arrangement, Evaluated};
use crate::candidate::Candidate;
use crate::explicit::gateway;
use crate::scoring::{activities_in, ParallelismScore};
use crate::SynthesisConfig;
use process_types::{
    ActivityPairSet, ConstraintSet, GatewayKind, GatewayRole, Graph, NodeId, ProcessResult, Walk,
};
use std::collections::BTreeSet;

/// Counters from the parallel splitting pass
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ParallelizeStats {
    pub splits_examined: usize,
    pub arrangements_scored: usize,
    pub parallel_groups: usize,
}

/// An arrangement resolved against the graph before splicing
#[derive(Clone, Debug)]
enum Plan {
    Branch(NodeId),
    Exclusive(Vec<Plan>),
    Parallel { sync: Option<NodeId>, children: Vec<Plan> },
}

impl Plan {
    fn resolve(arrangement: &Arrangement, analysis: &SplitAnalysis<'_>) -> Self {
        match arrangement {
            Arrangement::Branch(b) => Plan::Branch(*b),
            Arrangement::Exclusive(children) => {
                Plan::Exclusive(children.iter().map(|c| Plan::resolve(c, analysis)).collect())
            }
            Arrangement::Parallel(children) => Plan::Parallel {
                sync: analysis.group_sync(&arrangement.leaves()),
                children: children.iter().map(|c| Plan::resolve(c, analysis)).collect(),
            },
        }
    }
}

/// Spliced structure: the node each plan entry now hangs from
struct Built {
    entry: NodeId,
    sync: Option<Option<NodeId>>,
    children: Vec<Built>,
}

/// Run the parallel splitting pass over `candidate`
pub fn parallelize(
    candidate: &mut Candidate,
    constraints: &ConstraintSet,
    config: &SynthesisConfig,
    scorer: &dyn ParallelismScore,
) -> ProcessResult<ParallelizeStats> {
    let exclusions = constraints.mutual_exclusions();
    let declared = constraints.declared_parallels();
    let mut stats = ParallelizeStats::default();

    for split in exclusive_splits(candidate.graph(), candidate.cfg.start()) {
        let graph = candidate.graph();
        if !graph.is_gateway_of(split, GatewayKind::Exclusive, GatewayRole::Split)
            || graph.children(split).len() < 2
        {
            continue;
        }
        stats.splits_examined += 1;

        let plan = {
            let analysis = SplitAnalysis::new(candidate.graph(), split, &exclusions, config.max_paths);
            let options = if analysis.branches().len() > config.max_search_branches {
                tracing::debug!(
                    split = %candidate.graph().label(split),
                    branches = analysis.branches().len(),
                    "Split too wide for exhaustive search, grouping greedily"
                );
                greedy_arrangements(&analysis)
            } else {
                arrangements(analysis.branches(), config.max_arrangements)
            };
            let evaluated: Vec<Evaluated> = options
                .iter()
                .filter_map(|a| evaluate(a, &analysis, &declared, scorer))
                .collect();
            stats.arrangements_scored += evaluated.len();

            let Some(chosen) = best(evaluated) else {
                tracing::debug!(split = %candidate.graph().label(split), "Split stays exclusive");
                continue;
            };
            tracing::debug!(
                split = %candidate.graph().label(split),
                score = chosen.score,
                groups = chosen.metrics.parallel_gateways,
                "Arrangement chosen"
            );
            Plan::resolve(&chosen.arrangement, &analysis)
        };

        stats.parallel_groups += splice(candidate, split, &plan, &declared)?;
    }

    tracing::info!(
        splits = stats.splits_examined,
        scored = stats.arrangements_scored,
        groups = stats.parallel_groups,
        "Parallel splitting complete"
    );
    Ok(stats)
}

/// Exclusive splits in breadth-first order from `start`
fn exclusive_splits(graph: &Graph, start: NodeId) -> Vec<NodeId> {
    let mut ordered: Vec<(usize, NodeId)> = Walk::forward(graph)
        .distances(start)
        .into_iter()
        .filter(|(id, _)| graph.is_gateway_of(*id, GatewayKind::Exclusive, GatewayRole::Split))
        .map(|(id, d)| (d, id))
        .collect();
    ordered.sort();
    ordered.into_iter().map(|(_, id)| id).collect()
}

// ── Splicing ─────────────────────────────────────────────────────────

/// Splice the parallel groups of `plan` under `split`. Returns the number
/// of parallel groups created.
fn splice(
    candidate: &mut Candidate,
    split: NodeId,
    plan: &Plan,
    declared: &ActivityPairSet,
) -> ProcessResult<usize> {
    let Plan::Exclusive(children) = plan else {
        return Ok(0);
    };
    let mut groups = 0;
    for child in children {
        if !matches!(child, Plan::Parallel { .. }) {
            continue;
        }
        let built = build(candidate.graph_mut(), split, split, child)?;
        groups += close(candidate, &built, declared)?;
    }
    Ok(groups)
}

/// Hang `plan` under `parent`, moving its branches away from `split`
fn build(graph: &mut Graph, split: NodeId, parent: NodeId, plan: &Plan) -> ProcessResult<Built> {
    match plan {
        Plan::Branch(branch) => {
            graph.unlink(split, *branch);
            graph.link(parent, *branch)?;
            Ok(Built {
                entry: *branch,
                sync: None,
                children: Vec::new(),
            })
        }
        Plan::Exclusive(children) => {
            let xs = graph.add(gateway(GatewayKind::Exclusive, GatewayRole::Split));
            graph.link(parent, xs)?;
            let children = children
                .iter()
                .map(|c| build(graph, split, xs, c))
                .collect::<ProcessResult<Vec<_>>>()?;
            Ok(Built {
                entry: xs,
                sync: None,
                children,
            })
        }
        Plan::Parallel { sync, children } => {
            let ps = graph.add(gateway(GatewayKind::Parallel, GatewayRole::Split));
            graph.link(parent, ps)?;
            let children = children
                .iter()
                .map(|c| build(graph, split, ps, c))
                .collect::<ProcessResult<Vec<_>>>()?;
            Ok(Built {
                entry: ps,
                sync: Some(*sync),
                children,
            })
        }
    }
}

/// Close parallel groups innermost first. Returns how many were closed.
fn close(candidate: &mut Candidate, built: &Built, declared: &ActivityPairSet) -> ProcessResult<usize> {
    let mut closed = 0;
    for child in &built.children {
        closed += close(candidate, child, declared)?;
    }
    let Some(sync) = built.sync else {
        return Ok(closed);
    };
    let entries: Vec<NodeId> = built.children.iter().map(|c| c.entry).collect();
    let merge = match sync {
        Some(point) => Some(merge_at(candidate.graph_mut(), point, &entries)?),
        None => reconverge(candidate.graph_mut(), built.entry, &entries, declared)?,
    };
    if let Some(merge) = merge {
        tracing::debug!(
            split = %candidate.graph().label(built.entry),
            merge = %candidate.graph().label(merge),
            "Parallel group closed"
        );
        candidate.pair(built.entry, merge);
    }
    Ok(closed + 1)
}

/// Insert a parallel merge in front of `sync` taking one input per entry
fn merge_at(graph: &mut Graph, sync: NodeId, entries: &[NodeId]) -> ProcessResult<NodeId> {
    let avoid: BTreeSet<NodeId> = [sync].into_iter().collect();
    let parents: Vec<NodeId> = graph.parents(sync).iter().copied().collect();
    let mut claimed: BTreeSet<NodeId> = BTreeSet::new();
    let mut inputs: Vec<Vec<NodeId>> = Vec::new();

    for entry in entries {
        let attributed: Vec<NodeId> = parents
            .iter()
            .copied()
            .filter(|p| !claimed.contains(p) && graph.can_reach_avoiding(*entry, *p, &avoid))
            .collect();
        claimed.extend(attributed.iter().copied());
        if !attributed.is_empty() {
            inputs.push(attributed);
        }
    }

    let pm = graph.add(gateway(GatewayKind::Parallel, GatewayRole::Merge));
    for group in inputs {
        let input = match group.as_slice() {
            [single] => {
                graph.unlink(*single, sync);
                *single
            }
            _ => {
                let xm = graph.add(gateway(GatewayKind::Exclusive, GatewayRole::Merge));
                for parent in &group {
                    graph.unlink(*parent, sync);
                    graph.link(*parent, xm)?;
                }
                xm
            }
        };
        graph.link(input, pm)?;
    }
    graph.link(pm, sync)?;
    Ok(pm)
}

/// Join divergent children on a fresh end event.
///
/// Only done when a declared-parallel pair spans two children and every
/// child runs into exactly one end event of its own.
fn reconverge(
    graph: &mut Graph,
    split: NodeId,
    entries: &[NodeId],
    declared: &ActivityPairSet,
) -> ProcessResult<Option<NodeId>> {
    let walk_regions: Vec<BTreeSet<NodeId>> = entries
        .iter()
        .map(|e| Walk::forward(graph).blocking([split]).reachable(*e))
        .collect();
    let activities: Vec<BTreeSet<String>> = walk_regions
        .iter()
        .map(|r| activities_in(graph, r))
        .collect();
    let spans = activities.iter().enumerate().any(|(i, left)| {
        activities[i + 1..].iter().any(|right| {
            left.iter()
                .any(|a| right.iter().any(|b| declared.contains(a, b)))
        })
    });
    if !spans {
        return Ok(None);
    }

    let mut ends = Vec::new();
    for region in &walk_regions {
        let region_ends: Vec<NodeId> = region
            .iter()
            .copied()
            .filter(|n| graph.element(*n).map(|e| e.is_end()).unwrap_or(false))
            .collect();
        match region_ends.as_slice() {
            [end] if !ends.contains(end) => ends.push(*end),
            _ => return Ok(None),
        }
    }

    let pm = graph.add(gateway(GatewayKind::Parallel, GatewayRole::Merge));
    for end in ends {
        let parents: Vec<NodeId> = graph.parents(end).iter().copied().collect();
        let input = match parents.as_slice() {
            [single] => *single,
            _ => {
                let xm = graph.add(gateway(GatewayKind::Exclusive, GatewayRole::Merge));
                for parent in &parents {
                    graph.link(*parent, xm)?;
                }
                xm
            }
        };
        graph.remove(end)?;
        graph.link(input, pm)?;
    }
    let end = graph.add_end();
    graph.link(pm, end)?;
    Ok(Some(pm))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{build_dependency_graph, reduce, to_control_flow, ScoringWeights, WeightedScore};
    use process_simulator::{simulate, SimulationConfig};

    fn parallelized(set: &ConstraintSet) -> (Candidate, ParallelizeStats) {
        let mut dg = build_dependency_graph(set).unwrap();
        reduce(&mut dg).unwrap();
        let mut candidate = Candidate::new(to_control_flow(&dg).unwrap());
        let scorer = WeightedScore::new(ScoringWeights::default());
        let stats = parallelize(&mut candidate, set, &SynthesisConfig::default(), &scorer).unwrap();
        (candidate, stats)
    }

    #[test]
    fn test_diamond_becomes_parallel_region() {
        let set = ConstraintSet::new()
            .precedence("A", "B")
            .precedence("A", "C")
            .precedence("B", "D")
            .precedence("C", "D");
        let (candidate, stats) = parallelized(&set);
        assert_eq!(stats.parallel_groups, 1);
        assert_eq!(candidate.pairs().len(), 1);

        let graph = candidate.graph();
        let b = graph.find_task("B").unwrap();
        let c = graph.find_task("C").unwrap();
        let ps = *graph.parents(b).iter().next().unwrap();
        assert!(graph.is_gateway_of(ps, GatewayKind::Parallel, GatewayRole::Split));
        assert_eq!(graph.parents(c).iter().next(), Some(&ps));
        let pm = candidate.paired_merge(ps).unwrap();
        assert!(graph.has_edge(b, pm));
        assert!(graph.has_edge(c, pm));

        let report = simulate(&candidate.cfg, &SimulationConfig::default()).unwrap();
        assert!(report.is_sound());
    }

    #[test]
    fn test_fan_out_without_join_has_no_merge() {
        let set = ConstraintSet::new().precedence("A", "B").precedence("A", "C");
        let (candidate, stats) = parallelized(&set);
        assert_eq!(stats.parallel_groups, 1);
        assert!(candidate.pairs().is_empty());
        assert_eq!(candidate.cfg.end_nodes().len(), 2);
        let report = simulate(&candidate.cfg, &SimulationConfig::default()).unwrap();
        assert!(report.is_sound());
    }

    #[test]
    fn test_declared_parallel_reconverges() {
        let set = ConstraintSet::new().parallel("A", "B");
        let (candidate, _) = parallelized(&set);
        let graph = candidate.graph();
        assert_eq!(candidate.cfg.end_nodes().len(), 1);
        assert_eq!(candidate.pairs().len(), 1);
        let (ps, pm) = candidate.pairs().iter().next().map(|(s, m)| (*s, *m)).unwrap();
        assert!(graph.is_gateway_of(ps, GatewayKind::Parallel, GatewayRole::Split));
        assert!(graph.is_gateway_of(pm, GatewayKind::Parallel, GatewayRole::Merge));
        assert_eq!(graph.parents(pm).len(), 2);
    }

    #[test]
    fn test_choice_stays_exclusive() {
        let set = ConstraintSet::new().choice("A", "B");
        let (candidate, stats) = parallelized(&set);
        assert_eq!(stats.splits_examined, 1);
        assert_eq!(stats.parallel_groups, 0);
        assert!(candidate.parallel_gateways().is_empty());
    }
}
