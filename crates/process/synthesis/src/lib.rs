//! Gateway Synthesis
//!
//! Turns a [`ConstraintSet`](process_types::ConstraintSet) of activities and
//! their relations into a control-flow graph with explicit exclusive and
//! parallel gateways, checked by the token simulator.
//!
//! # Pipeline
//!
//! 1. **Dependency graph**: precedence pairs are folded into a graph,
//!    redundant edges are reduced away (cycles survive), and many-to-many
//!    crossings are routed through synchronization tasks.
//! 2. **Explicit gateways**: start and end events are added, and every
//!    implicit fan-out or fan-in gets an exclusive gateway.
//! 3. **Parallel splitting**: the branches of each exclusive split are
//!    regrouped into the best-scoring valid arrangement of exclusive and
//!    parallel groups.
//! 4. **Merge promotion** and **loop splicing** repair what splitting left
//!    behind and realise declared loops.
//! 5. **Search**: candidates are simulated; unsound ones are demoted one
//!    parallel gateway at a time until a sound one is found.
//!
//! # Scoring
//!
//! Alternatives are ranked by a [`ParallelismScore`]. The default
//! [`WeightedScore`] counts concurrent activity pairs, with extra weight
//! for pairs that were declared parallel. Any `Fn(&ScoreMetrics) -> i64`
//! can be used instead.

#![deny(unsafe_code)]

mod analysis;
mod arrangement;
mod builder;
mod candidate;
mod config;
mod errors;
mod explicit;
mod loops;
mod parallelize;
mod promotion;
mod reduction;
mod report;
mod scoring;
mod search;
mod synchronization;
mod synthesizer;

pub use analysis::{PairAnalysis, SplitAnalysis};
pub use arrangement::Arrangement;
pub use builder::build_dependency_graph;
pub use candidate::Candidate;
pub use config::*;
pub use errors::*;
pub use explicit::{make_gateways_explicit, to_control_flow};
pub use loops::{splice_loops, LoopOutcome};
pub use parallelize::{parallelize, ParallelizeStats};
pub use promotion::promote_merges;
pub use reduction::{reduce, ReductionStats};
pub use report::*;
pub use scoring::{concurrent_pairs, graph_metrics, ParallelismScore, ScoreMetrics, WeightedScore};
pub use search::{search, Scored, SearchOutcome};
pub use synchronization::synchronize_flows;
pub use synthesizer::*;
