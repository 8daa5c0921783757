//! Error types for gateway synthesis

use process_simulator::SimulationError;
use process_types::ProcessError;

/// Errors that abort synthesis.
///
/// Unsafe candidates are not errors: when no candidate passes the
/// simulator, the best one is returned together with its verdict.
#[derive(Debug, thiserror::Error)]
pub enum SynthesisError {
    #[error("Constraint set cannot be turned into a dependency graph: {0}")]
    Construction(#[from] ProcessError),

    #[error("Simulation failed: {0}")]
    Simulation(#[from] SimulationError),

    #[error("No candidate graph could be evaluated")]
    NoCandidate,
}

/// Result type alias for synthesis operations
pub type SynthesisResult<T> = Result<T, SynthesisError>;
