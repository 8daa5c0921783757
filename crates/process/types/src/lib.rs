//! Process Graph Domain Types
//!
//! Process synthesis works on two flavours of the same directed graph:
//!
//! - **DependencyGraph**: activities under precedence only. It may have
//!   several initial and several end nodes, and fan-out / fan-in is still
//!   implicit.
//! - **ControlFlowGraph**: a rooted, gateway-annotated execution graph with
//!   a single start event, explicit exclusive / parallel split and merge
//!   gateways, and end events.
//!
//! # Key Concepts
//!
//! - **Graph**: an arena of [`Node`]s indexed by [`NodeId`]. Adjacency is
//!   stored on both sides (`children` / `parents`) and every mutation keeps
//!   the two in sync.
//! - **Element**: the process element a node wraps (task, gateway, event).
//!   Elements carry an [`ElementId`]; weak copies share it, deep copies
//!   allocate a fresh one.
//! - **ConstraintSet**: the structured relations produced upstream
//!   (precedence, choice, parallel, loop) that drive synthesis.
//!
//! # Design Principles
//!
//! 1. No reference cycles: nodes live in an arena, edges are index sets.
//! 2. All traversals are iterative and visited-set guarded, the graphs are
//!    generally cyclic.
//! 3. Identity is deterministic. Ordered sets everywhere, so every walk,
//!    every copy and every simulation visits nodes in the same order.

#![deny(unsafe_code)]

mod cleanup;
mod constraints;
mod control_flow;
mod dependency;
mod element;
mod errors;
mod graph;
mod traversal;

pub use cleanup::*;
pub use constraints::*;
pub use control_flow::*;
pub use dependency::*;
pub use element::*;
pub use errors::*;
pub use graph::*;
pub use traversal::*;
