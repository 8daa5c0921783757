//! Synthesis configuration

use process_simulator::SimulationConfig;
use serde::{Deserialize, Serialize};

/// Weights of the default parallelism score
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScoringWeights {
    /// Per pair of tasks that may run concurrently
    pub concurrency: i64,
    /// Extra weight per concurrent pair that was declared parallel
    pub declared_parallel: i64,
}

impl Default for ScoringWeights {
    fn default() -> Self {
        Self {
            concurrency: 1,
            declared_parallel: 5,
        }
    }
}

/// Search bounds and scoring for one synthesis run
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SynthesisConfig {
    /// Limits for every oracle call
    pub simulation: SimulationConfig,
    /// Loop-free paths enumerated per branch before giving up on it
    pub max_paths: usize,
    /// Branches of one exclusive split searched exhaustively; larger splits
    /// fall back to a greedy grouping
    pub max_search_branches: usize,
    /// Structural alternatives generated per split
    pub max_arrangements: usize,
    /// Candidate graphs simulated during the demotion search
    pub max_candidates: usize,
    pub scoring: ScoringWeights,
}

impl Default for SynthesisConfig {
    fn default() -> Self {
        Self {
            simulation: SimulationConfig::default(),
            max_paths: 256,
            max_search_branches: 6,
            max_arrangements: 2048,
            max_candidates: 64,
            scoring: ScoringWeights::default(),
        }
    }
}

impl SynthesisConfig {
    pub fn with_simulation(mut self, simulation: SimulationConfig) -> Self {
        self.simulation = simulation;
        self
    }

    pub fn with_max_candidates(mut self, max: usize) -> Self {
        self.max_candidates = max;
        self
    }

    pub fn with_max_search_branches(mut self, max: usize) -> Self {
        self.max_search_branches = max;
        self
    }

    pub fn with_scoring(mut self, scoring: ScoringWeights) -> Self {
        self.scoring = scoring;
        self
    }
}
