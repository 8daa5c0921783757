//! The synthesis pipeline
//!
//! ```text
//! ConstraintSet
//!   → dependency graph (build, reduce, synchronize)
//!   → control-flow graph with explicit exclusive gateways
//!   → parallel splitting → merge promotion → loop splicing
//!   → oracle-driven demotion search
//!   → cleanup, compaction, final verdict
//! ```

use crate::loops::splice_loops;
use crate::parallelize::parallelize;
use crate::promotion::promote_merges;
use crate::scoring::{graph_metrics, ParallelismScore, WeightedScore};
use crate::search::search;
use crate::{
    build_dependency_graph, reduce, synchronize_flows, to_control_flow, Candidate, SynthesisConfig,
    SynthesisReport, SynthesisResult,
};
use process_simulator::{settle, simulate, simulate_dependency, Verdict};
use process_types::{cleanup, ConstraintSet, ControlFlowGraph, ProcessModel};

/// A finished control-flow graph with its verdict
#[derive(Clone, Debug)]
pub struct Synthesis {
    pub graph: ControlFlowGraph,
    pub verdict: Verdict,
    pub report: SynthesisReport,
}

impl Synthesis {
    pub fn is_sound(&self) -> bool {
        self.verdict.is_sound()
    }

    /// Serializable node and edge listing of the graph
    pub fn model(&self) -> ProcessModel {
        self.graph.to_model()
    }
}

/// Builds control-flow graphs from constraint sets
pub struct Synthesizer<P = WeightedScore> {
    config: SynthesisConfig,
    scorer: P,
}

impl Synthesizer<WeightedScore> {
    /// A synthesizer scoring with the configured weights
    pub fn new(config: SynthesisConfig) -> Self {
        let scorer = WeightedScore::new(config.scoring);
        Self { config, scorer }
    }
}

impl<P: ParallelismScore> Synthesizer<P> {
    /// Replace the parallelism score
    pub fn with_scorer<Q: ParallelismScore>(self, scorer: Q) -> Synthesizer<Q> {
        Synthesizer {
            config: self.config,
            scorer,
        }
    }

    pub fn config(&self) -> &SynthesisConfig {
        &self.config
    }

    /// Run the whole pipeline.
    ///
    /// Fails only when the constraints cannot form a dependency graph. An
    /// unsafe or unverified result is returned with its verdict rather than
    /// as an error.
    pub fn synthesize(&self, constraints: &ConstraintSet) -> SynthesisResult<Synthesis> {
        let mut report = SynthesisReport::default();

        // ── Dependency graph ──
        let mut dg = build_dependency_graph(constraints)?;
        report.activities = dg.activities().len();
        report.dependency_edges = dg.graph().edge_count();

        let reduction = reduce(&mut dg)?;
        report.removed_edges = reduction.removed_edges;
        report.severed_cycles = reduction.severed_cycles;
        report.sync_tasks = synchronize_flows(&mut dg)?;

        report.baseline = match settle(simulate_dependency(&dg, &self.config.simulation)) {
            Ok(baseline) => Some(baseline),
            Err(e) => {
                tracing::debug!(error = %e, "Dependency graph could not be simulated");
                None
            }
        };

        // ── Gateways ──
        let mut candidate = Candidate::new(to_control_flow(&dg)?);

        let split = parallelize(&mut candidate, constraints, &self.config, &self.scorer)?;
        report.splits_examined = split.splits_examined;
        report.arrangements_scored = split.arrangements_scored;
        report.parallel_groups = split.parallel_groups;

        report.merges_promoted = promote_merges(&mut candidate, &self.config.simulation)?;

        let loops = splice_loops(&mut candidate, constraints)?;
        report.loops_spliced = loops.spliced;
        report.loop_diagnostics = loops.diagnostics;

        // ── Search ──
        let declared = constraints.declared_parallels();
        let outcome = search(candidate, &declared, &self.config, &self.scorer)?;
        report.candidates_explored = outcome.explored;
        report.candidates_accepted = outcome.accepted;
        report.demotions = outcome.demotions;

        // ── Finish ──
        let mut chosen = outcome.chosen.candidate;
        let tidy = cleanup(chosen.graph_mut())?;
        report.gateways_merged = tidy.gateways_merged;
        report.placeholders_removed = tidy.placeholders_removed;
        report.trivial_gateways_removed = tidy.trivial_gateways_removed;

        let (graph, _) = chosen.cfg.compact();
        if let Err(e) = graph.validate() {
            tracing::warn!(error = %e, "Synthesized graph failed structural validation");
        }
        let verdict = settle(simulate(&graph, &self.config.simulation))?;

        report.metrics = graph_metrics(graph.graph(), &declared);
        report.score = self.scorer.score(&report.metrics);
        report.parallel_gateways = graph.parallel_gateway_count();

        if verdict.is_sound() {
            tracing::info!(
                nodes = graph.graph().len(),
                parallel_gateways = report.parallel_gateways,
                score = report.score,
                "Synthesis complete"
            );
        } else {
            tracing::warn!(
                verdict = %verdict.describe(graph.graph()),
                "Synthesis produced an unsafe graph"
            );
        }

        Ok(Synthesis {
            graph,
            verdict,
            report,
        })
    }
}

/// Synthesize with the default weighted score
pub fn synthesize(constraints: &ConstraintSet, config: &SynthesisConfig) -> SynthesisResult<Synthesis> {
    Synthesizer::new(config.clone()).synthesize(constraints)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ScoreMetrics;

    #[test]
    fn test_report_counts_phases() {
        let set = ConstraintSet::new()
            .precedence("A", "B")
            .precedence("A", "C")
            .precedence("B", "D")
            .precedence("C", "D")
            .precedence("A", "D");
        let synthesis = synthesize(&set, &SynthesisConfig::default()).unwrap();
        assert!(synthesis.is_sound());
        let report = &synthesis.report;
        assert_eq!(report.activities, 4);
        assert_eq!(report.dependency_edges, 5);
        assert_eq!(report.removed_edges, 1);
        assert_eq!(report.parallel_groups, 1);
        assert_eq!(report.baseline, Some(Verdict::Sound));
        assert_eq!(report.parallel_gateways, 2);
        assert_eq!(report.metrics.concurrent_pairs, 1);
    }

    #[test]
    fn test_custom_scorer_is_used() {
        let set = ConstraintSet::new().precedence("A", "B").precedence("A", "C");
        let synthesizer = Synthesizer::new(SynthesisConfig::default())
            .with_scorer(|m: &ScoreMetrics| 100 * m.concurrent_pairs as i64);
        let synthesis = synthesizer.synthesize(&set).unwrap();
        assert_eq!(synthesis.report.score, 100);
    }

    #[test]
    fn test_invalid_constraints_fail() {
        assert!(synthesize(&ConstraintSet::new(), &SynthesisConfig::default()).is_err());
    }
}
