//! Error types for the process graph layer

use crate::NodeId;

/// Errors that can occur while building or manipulating process graphs
#[derive(Debug, thiserror::Error)]
pub enum ProcessError {
    #[error("Node not found: {0}")]
    NodeNotFound(NodeId),

    #[error("Unknown activity: {0}")]
    UnknownActivity(String),

    #[error("Constraint set contains no precedence, choice, parallel or loop relation")]
    EmptyConstraintSet,

    #[error("Precedence constraints are disconnected: {} pair(s) could not be attached", pending.len())]
    DisconnectedConstraints { pending: Vec<(String, String)> },

    #[error("Precedence cycle not declared as a loop: {}", activities.join(", "))]
    UndeclaredCycle { activities: Vec<String> },

    #[error("Invalid link: {from} -> {to}")]
    InvalidLink { from: NodeId, to: NodeId },

    #[error("Control-flow graph has no start event")]
    MissingStart,

    #[error("Process graph validation error: {0}")]
    ValidationError(String),
}

/// Result type alias for process graph operations
pub type ProcessResult<T> = Result<T, ProcessError>;
