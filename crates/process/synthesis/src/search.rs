//! Oracle-driven candidate search
//!
//! Candidates are explored depth-first. A sound candidate is kept; an
//! unsound one is demoted one parallel gateway at a time, starting with the
//! gateways its verdict implicates. Every visited gateway configuration is
//! remembered so no configuration is simulated twice.

use crate::candidate::Candidate;
use crate::scoring::{graph_metrics, ParallelismScore, ScoreMetrics};
use crate::{SynthesisConfig, SynthesisError, SynthesisResult};
use process_simulator::{settle, simulate, Verdict};
use process_types::{ActivityPairSet, GatewayRole, NodeId};
use std::collections::BTreeSet;

/// A simulated candidate
#[derive(Clone, Debug)]
pub struct Scored {
    pub candidate: Candidate,
    pub verdict: Verdict,
    pub metrics: ScoreMetrics,
    pub score: i64,
}

impl Scored {
    fn beats(&self, other: &Scored) -> bool {
        (self.score, self.metrics.parallel_gateways) > (other.score, other.metrics.parallel_gateways)
    }

    /// Among unsafe candidates a proven verdict outranks an unverified one
    fn prefer_over(&self, other: &Scored) -> bool {
        match (self.verdict.is_unverified(), other.verdict.is_unverified()) {
            (false, true) => true,
            (true, false) => false,
            _ => self.beats(other),
        }
    }
}

/// Result of the search
#[derive(Clone, Debug)]
pub struct SearchOutcome {
    /// The best sound candidate, or the best unsafe one when none is sound
    pub chosen: Scored,
    pub explored: usize,
    pub accepted: usize,
    pub demotions: usize,
}

/// Search for the most parallel sound candidate reachable by demotion
pub fn search(
    initial: Candidate,
    declared: &ActivityPairSet,
    config: &SynthesisConfig,
    scorer: &dyn ParallelismScore,
) -> SynthesisResult<SearchOutcome> {
    let mut stack = vec![initial];
    let mut seen: BTreeSet<BTreeSet<NodeId>> = BTreeSet::new();
    let mut best_sound: Option<Scored> = None;
    let mut best_unsafe: Option<Scored> = None;
    let (mut explored, mut accepted, mut demotions) = (0, 0, 0);

    while let Some(candidate) = stack.pop() {
        if !seen.insert(candidate.parallel_gateways()) {
            continue;
        }
        if explored >= config.max_candidates {
            tracing::debug!(explored, "Candidate limit reached");
            break;
        }
        explored += 1;

        let verdict = settle(simulate(&candidate.cfg, &config.simulation))?;
        let order = demotion_order(&candidate, &verdict);
        if verdict.is_sound() {
            accepted += 1;
            let scored = score(candidate, verdict, declared, scorer);
            tracing::debug!(score = scored.score, "Sound candidate");
            if best_sound.as_ref().map_or(true, |best| scored.beats(best)) {
                best_sound = Some(scored);
            }
            continue;
        }

        tracing::debug!(verdict = %verdict, "Unsound candidate");
        let scored = score(candidate.clone(), verdict, declared, scorer);
        if best_unsafe.as_ref().map_or(true, |best| scored.prefer_over(best)) {
            best_unsafe = Some(scored);
        }

        for gateway in order.into_iter().rev() {
            stack.push(candidate.demote(gateway)?);
            demotions += 1;
        }
    }

    let chosen = match (best_sound, best_unsafe) {
        (Some(sound), _) => sound,
        (None, Some(unsafe_candidate)) => {
            tracing::warn!(
                verdict = %unsafe_candidate.verdict,
                "No sound candidate found, keeping the best unsafe one"
            );
            unsafe_candidate
        }
        (None, None) => return Err(SynthesisError::NoCandidate),
    };
    tracing::info!(explored, accepted, demotions, score = chosen.score, "Candidate search complete");
    Ok(SearchOutcome {
        chosen,
        explored,
        accepted,
        demotions,
    })
}

fn score(
    candidate: Candidate,
    verdict: Verdict,
    declared: &ActivityPairSet,
    scorer: &dyn ParallelismScore,
) -> Scored {
    let metrics = graph_metrics(candidate.graph(), declared);
    let score = scorer.score(&metrics);
    Scored {
        candidate,
        verdict,
        metrics,
        score,
    }
}

/// Parallel gateways to demote, most implicated first: stranded parallel
/// merges, then parallel splits the failing trace passed through (latest
/// first), then every other parallel gateway
fn demotion_order(candidate: &Candidate, verdict: &Verdict) -> Vec<NodeId> {
    let mut order: Vec<NodeId> = Vec::new();
    let push = |node: NodeId, order: &mut Vec<NodeId>| {
        if !order.contains(&node) {
            order.push(node);
        }
    };

    for node in verdict.implicated() {
        if candidate.is_parallel(node, GatewayRole::Merge) {
            push(node, &mut order);
        }
    }
    for ledger in verdict.trace().iter().rev() {
        for node in ledger.occupied() {
            if candidate.is_parallel(node, GatewayRole::Split) {
                push(node, &mut order);
            }
        }
    }
    for node in candidate.parallel_gateways() {
        push(node, &mut order);
    }
    order
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{ScoringWeights, WeightedScore};
    use process_types::{ControlFlowGraph, GatewayKind, Graph};

    fn weighted() -> WeightedScore {
        WeightedScore::new(ScoringWeights::default())
    }

    /// start → ps → {A, B}; A → pm; B → xs → {pm, other}; pm → C → end.
    /// Choosing `other` strands the token waiting at pm.
    fn stranded_merge() -> Candidate {
        let mut g = Graph::new();
        let start = g.add_start();
        let ps = g.add_gateway(GatewayKind::Parallel, GatewayRole::Split);
        let a = g.add_task("A");
        let b = g.add_task("B");
        let xs = g.add_gateway(GatewayKind::Exclusive, GatewayRole::Split);
        let pm = g.add_gateway(GatewayKind::Parallel, GatewayRole::Merge);
        let c = g.add_task("C");
        let end = g.add_end();
        let other = g.add_end();
        for (x, y) in [
            (start, ps),
            (ps, a),
            (ps, b),
            (a, pm),
            (b, xs),
            (xs, pm),
            (xs, other),
            (pm, c),
            (c, end),
        ] {
            g.link(x, y).unwrap();
        }
        let mut candidate = Candidate::new(ControlFlowGraph::from_parts(g, start).unwrap());
        candidate.pair(ps, pm);
        candidate
    }

    #[test]
    fn test_sound_candidate_accepted_directly() {
        let mut g = Graph::new();
        let start = g.add_start();
        let ps = g.add_gateway(GatewayKind::Parallel, GatewayRole::Split);
        let a = g.add_task("A");
        let b = g.add_task("B");
        let pm = g.add_gateway(GatewayKind::Parallel, GatewayRole::Merge);
        let end = g.add_end();
        for (x, y) in [(start, ps), (ps, a), (ps, b), (a, pm), (b, pm), (pm, end)] {
            g.link(x, y).unwrap();
        }
        let mut candidate = Candidate::new(ControlFlowGraph::from_parts(g, start).unwrap());
        candidate.pair(ps, pm);

        let outcome = search(candidate, &ActivityPairSet::new(), &SynthesisConfig::default(), &weighted()).unwrap();
        assert_eq!(outcome.explored, 1);
        assert_eq!(outcome.accepted, 1);
        assert!(outcome.chosen.verdict.is_sound());
        assert_eq!(outcome.chosen.metrics.concurrent_pairs, 1);
    }

    #[test]
    fn test_deadlock_demoted_to_sound() {
        let outcome = search(
            stranded_merge(),
            &ActivityPairSet::new(),
            &SynthesisConfig::default(),
            &weighted(),
        )
        .unwrap();
        assert!(outcome.chosen.verdict.is_sound());
        assert!(outcome.chosen.candidate.parallel_gateways().is_empty());
        assert!(outcome.demotions >= 1);
        assert!(outcome.explored >= 2);
    }

    #[test]
    fn test_demotion_order_starts_with_stranded_merge() {
        let candidate = stranded_merge();
        let report = simulate(&candidate.cfg, &SynthesisConfig::default().simulation).unwrap();
        assert!(report.verdict.is_deadlock());
        let order = demotion_order(&candidate, &report.verdict);
        let pm = *candidate.pairs().values().next().unwrap();
        assert_eq!(order.first(), Some(&pm));
        assert_eq!(order.len(), 2);
    }

    #[test]
    fn test_branch_limit_keeps_unverified_candidate() {
        let config = SynthesisConfig::default()
            .with_simulation(process_simulator::SimulationConfig::default().with_max_branches(1));
        let outcome = search(stranded_merge(), &ActivityPairSet::new(), &config, &weighted()).unwrap();
        assert!(outcome.chosen.verdict.is_unverified());
        assert_eq!(outcome.accepted, 0);
        assert!(outcome.explored >= 2);
    }

    #[test]
    fn test_candidate_limit_still_returns_best() {
        let config = SynthesisConfig::default().with_max_candidates(1);
        let outcome = search(stranded_merge(), &ActivityPairSet::new(), &config, &weighted()).unwrap();
        assert_eq!(outcome.explored, 1);
        assert!(outcome.chosen.verdict.is_deadlock());
    }
}
