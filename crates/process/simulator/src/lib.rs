//! Process Simulator
//!
//! A token-passing interpreter used both to verify a finished control-flow
//! graph and as the oracle that drives synthesis backtracking.
//!
//! # Key Concepts
//!
//! - **TokenLedger**: tokens per node, keyed by the predecessor that sent
//!   them. A parallel merge consumes one token from every parent per firing.
//! - **ExecutionSemantics**: a policy describing how each node forwards its
//!   tokens. [`GatewaySemantics`] reads gateway kinds;
//!   [`DependencySemantics`] treats implicit fan-out as a choice and
//!   implicit fan-in as a merge.
//! - **Branches**: every exclusive choice forks the simulation. A branch is
//!   finalized once it revisits a ledger it has already seen, then drained
//!   toward end nodes and classified. Branches that rejoin in the same
//!   state are explored once.
//!
//! # Verdicts
//!
//! - **Deadlock**: a finalized branch leaves tokens on a non-end node.
//! - **Livelock**: a node's occurrence counter reaches the repetition bound,
//!   or the leftover tokens are trapped on a cycle with no exit.
//! - **Unverified**: exploration hit the branch limit; see [`settle`].
//!
//! Exploration order is fixed, so the reported branch is reproducible.

#![deny(unsafe_code)]

mod config;
mod errors;
mod ledger;
mod semantics;
mod simulator;
mod verdict;

pub use config::*;
pub use errors::*;
pub use ledger::*;
pub use semantics::*;
pub use simulator::*;
pub use verdict::*;
