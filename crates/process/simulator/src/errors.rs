//! Error types for the process simulator

use process_types::{NodeId, ProcessError};

/// Errors that stop a simulation before it reaches a verdict
#[derive(Debug, thiserror::Error)]
pub enum SimulationError {
    #[error("Graph has no entry node to place the initial token on")]
    NoEntryNode,

    #[error("Node {0} has several outgoing flows but no gateway to route them")]
    AmbiguousRouting(NodeId),

    #[error("Exploration limit exceeded after {branches} branches")]
    ExplorationLimit { branches: usize },

    #[error("Graph error: {0}")]
    Graph(#[from] ProcessError),
}

/// Result type alias for simulation operations
pub type SimulationResult<T> = Result<T, SimulationError>;
