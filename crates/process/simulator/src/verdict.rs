//! Simulation verdicts

use crate::TokenLedger;
use process_types::{Graph, NodeId};
use serde::{Deserialize, Serialize};

/// Outcome of simulating every branch of a graph
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum Verdict {
    /// Every branch drained onto end nodes
    Sound,
    /// A finalized branch left tokens on non-end nodes
    Deadlock {
        stranded: Vec<NodeId>,
        trace: Vec<TokenLedger>,
    },
    /// A node kept recurring, or tokens are trapped on a cycle without exit
    Livelock {
        node: NodeId,
        trace: Vec<TokenLedger>,
    },
    /// Exploration stopped at the branch limit before every branch finished
    Unverified { branches: usize },
}

impl Verdict {
    pub fn is_sound(&self) -> bool {
        matches!(self, Verdict::Sound)
    }

    pub fn is_deadlock(&self) -> bool {
        matches!(self, Verdict::Deadlock { .. })
    }

    pub fn is_livelock(&self) -> bool {
        matches!(self, Verdict::Livelock { .. })
    }

    pub fn is_unverified(&self) -> bool {
        matches!(self, Verdict::Unverified { .. })
    }

    /// Ledger snapshots of the offending branch, oldest first
    pub fn trace(&self) -> &[TokenLedger] {
        match self {
            Verdict::Sound | Verdict::Unverified { .. } => &[],
            Verdict::Deadlock { trace, .. } | Verdict::Livelock { trace, .. } => trace,
        }
    }

    /// Nodes the verdict points at
    pub fn implicated(&self) -> Vec<NodeId> {
        match self {
            Verdict::Sound | Verdict::Unverified { .. } => Vec::new(),
            Verdict::Deadlock { stranded, .. } => stranded.clone(),
            Verdict::Livelock { node, .. } => vec![*node],
        }
    }

    /// One-line summary using node labels
    pub fn describe(&self, graph: &Graph) -> String {
        match self {
            Verdict::Sound => "sound".to_string(),
            Verdict::Deadlock { stranded, .. } => {
                let labels: Vec<String> = stranded.iter().map(|n| graph.label(*n)).collect();
                format!("deadlock: tokens stranded on {}", labels.join(", "))
            }
            Verdict::Livelock { node, .. } => {
                format!("livelock: '{}' repeats without bound", graph.label(*node))
            }
            Verdict::Unverified { branches } => {
                format!("unverified: stopped after {} branches", branches)
            }
        }
    }
}

impl std::fmt::Display for Verdict {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Verdict::Sound => write!(f, "sound"),
            Verdict::Deadlock { stranded, trace } => {
                write!(f, "deadlock on {} node(s) after {} step(s)", stranded.len(), trace.len())
            }
            Verdict::Livelock { node, trace } => {
                write!(f, "livelock at {} after {} step(s)", node, trace.len())
            }
            Verdict::Unverified { branches } => write!(f, "unverified after {} branch(es)", branches),
        }
    }
}

/// A verdict plus exploration counters
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SimulationReport {
    pub verdict: Verdict,
    pub branches_explored: usize,
    pub branches_finalized: usize,
}

impl SimulationReport {
    pub fn is_sound(&self) -> bool {
        self.verdict.is_sound()
    }
}
