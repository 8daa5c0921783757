//! Simulation limits

use serde::{Deserialize, Serialize};

/// Bounds applied to one simulation run
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SimulationConfig {
    /// Occurrence count at which a node is considered to repeat without bound
    pub repetition_bound: usize,
    /// Maximum number of branches explored before giving up
    pub max_branches: usize,
    /// Maximum rounds per branch, and per drain
    pub max_rounds: usize,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            repetition_bound: 3,
            max_branches: 4096,
            max_rounds: 512,
        }
    }
}

impl SimulationConfig {
    pub fn with_repetition_bound(mut self, bound: usize) -> Self {
        self.repetition_bound = bound;
        self
    }

    pub fn with_max_branches(mut self, max: usize) -> Self {
        self.max_branches = max;
        self
    }

    pub fn with_max_rounds(mut self, max: usize) -> Self {
        self.max_rounds = max;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = SimulationConfig::default();
        assert_eq!(config.repetition_bound, 3);
        assert_eq!(config.max_branches, 4096);
    }

    #[test]
    fn test_partial_deserialize_keeps_defaults() {
        let config: SimulationConfig = serde_json::from_str(r#"{"max_rounds": 10}"#).unwrap();
        assert_eq!(config.max_rounds, 10);
        assert_eq!(config.repetition_bound, 3);
    }
}
