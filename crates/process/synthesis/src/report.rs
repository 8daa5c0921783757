//! Synthesis reports

use crate::scoring::ScoreMetrics;
use process_simulator::Verdict;
use serde::{Deserialize, Serialize};

/// A loop constraint that could not be realised
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoopDiagnostic {
    pub activities: Vec<String>,
    pub reason: String,
}

impl std::fmt::Display for LoopDiagnostic {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "loop [{}]: {}", self.activities.join(", "), self.reason)
    }
}

/// What each synthesis phase did
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SynthesisReport {
    // ── Construction ──
    pub activities: usize,
    pub dependency_edges: usize,
    pub removed_edges: usize,
    pub severed_cycles: usize,
    pub sync_tasks: usize,
    /// Verdict on the dependency graph itself, before gateways exist
    pub baseline: Option<Verdict>,

    // ── Parallel splitting ──
    pub splits_examined: usize,
    pub arrangements_scored: usize,
    pub parallel_groups: usize,
    pub merges_promoted: usize,

    // ── Loops ──
    pub loops_spliced: usize,
    pub loop_diagnostics: Vec<LoopDiagnostic>,

    // ── Search ──
    pub candidates_explored: usize,
    pub candidates_accepted: usize,
    pub demotions: usize,

    // ── Result ──
    pub metrics: ScoreMetrics,
    pub score: i64,
    pub parallel_gateways: usize,
    pub gateways_merged: usize,
    pub placeholders_removed: usize,
    pub trivial_gateways_removed: usize,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_diagnostic_display() {
        let diagnostic = LoopDiagnostic {
            activities: vec!["A".into(), "B".into()],
            reason: "no exit point".into(),
        };
        assert_eq!(diagnostic.to_string(), "loop [A, B]: no exit point");
    }

    #[test]
    fn test_report_serializes() {
        let report = SynthesisReport {
            activities: 3,
            baseline: Some(Verdict::Sound),
            ..Default::default()
        };
        let json = serde_json::to_string(&report).unwrap();
        let back: SynthesisReport = serde_json::from_str(&json).unwrap();
        assert_eq!(back, report);
    }
}
