//! The token ledger: tokens per node, keyed by the sending predecessor

use process_types::NodeId;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Where a token came from
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum TokenOrigin {
    /// Placed on an entry node when the simulation starts
    Entry,
    /// Forwarded by this predecessor
    From(NodeId),
    /// Forwarded to a node that consumes any token, so the sender is not kept
    Pooled,
}

/// A snapshot of every token in flight.
///
/// Ledgers compare structurally; two ledgers with the same tokens on the
/// same nodes from the same origins are the same state.
#[derive(Clone, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct TokenLedger {
    tokens: BTreeMap<NodeId, BTreeMap<TokenOrigin, usize>>,
}

impl TokenLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// A ledger holding one entry token on `node`
    pub fn with_entry(node: NodeId) -> Self {
        let mut ledger = Self::new();
        ledger.add(node, TokenOrigin::Entry, 1);
        ledger
    }

    pub fn add(&mut self, node: NodeId, origin: TokenOrigin, count: usize) {
        if count == 0 {
            return;
        }
        *self.tokens.entry(node).or_default().entry(origin).or_insert(0) += count;
    }

    /// Remove up to `count` tokens of one origin. Returns how many were removed.
    pub fn remove(&mut self, node: NodeId, origin: TokenOrigin, count: usize) -> usize {
        let Some(by_origin) = self.tokens.get_mut(&node) else {
            return 0;
        };
        let Some(held) = by_origin.get_mut(&origin) else {
            return 0;
        };
        let taken = count.min(*held);
        *held -= taken;
        if *held == 0 {
            by_origin.remove(&origin);
        }
        if by_origin.is_empty() {
            self.tokens.remove(&node);
        }
        taken
    }

    /// Tokens on `node` grouped by origin
    pub fn at(&self, node: NodeId) -> Option<&BTreeMap<TokenOrigin, usize>> {
        self.tokens.get(&node)
    }

    /// Tokens on `node` from one origin
    pub fn count_from(&self, node: NodeId, origin: TokenOrigin) -> usize {
        self.at(node)
            .and_then(|by_origin| by_origin.get(&origin))
            .copied()
            .unwrap_or(0)
    }

    /// All tokens on `node`
    pub fn total(&self, node: NodeId) -> usize {
        self.at(node).map(|m| m.values().sum()).unwrap_or(0)
    }

    /// Nodes currently holding tokens, in node order
    pub fn occupied(&self) -> impl Iterator<Item = NodeId> + '_ {
        self.tokens.keys().copied()
    }

    pub fn is_empty(&self) -> bool {
        self.tokens.is_empty()
    }

    /// A copy holding only the tokens on nodes that pass `keep`
    pub fn retain_nodes(&self, mut keep: impl FnMut(NodeId) -> bool) -> TokenLedger {
        TokenLedger {
            tokens: self
                .tokens
                .iter()
                .filter(|(node, _)| keep(**node))
                .map(|(node, by_origin)| (*node, by_origin.clone()))
                .collect(),
        }
    }

    pub fn token_count(&self) -> usize {
        self.tokens.values().flat_map(|m| m.values()).sum()
    }
}

impl std::fmt::Display for TokenLedger {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let parts: Vec<String> = self
            .tokens
            .iter()
            .map(|(node, by_origin)| format!("{}×{}", node, by_origin.values().sum::<usize>()))
            .collect();
        write!(f, "{{{}}}", parts.join(", "))
    }
}

/// How often each node has received tokens on one branch
#[derive(Clone, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct OccurrenceCounter {
    counts: BTreeMap<NodeId, usize>,
}

impl OccurrenceCounter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record `times` occurrences and return the new count
    pub fn record(&mut self, node: NodeId, times: usize) -> usize {
        let count = self.counts.entry(node).or_insert(0);
        *count += times;
        *count
    }

    pub fn get(&self, node: NodeId) -> usize {
        self.counts.get(&node).copied().unwrap_or(0)
    }

    /// First node whose count reached `bound`
    pub fn first_at_or_above(&self, bound: usize) -> Option<NodeId> {
        self.counts
            .iter()
            .find(|(_, count)| **count >= bound)
            .map(|(node, _)| *node)
    }

    /// A copy holding only the counts of nodes that pass `keep`
    pub fn retain_nodes(&self, mut keep: impl FnMut(NodeId) -> bool) -> OccurrenceCounter {
        OccurrenceCounter {
            counts: self
                .counts
                .iter()
                .filter(|(node, _)| keep(**node))
                .map(|(node, count)| (*node, *count))
                .collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_add_and_remove_by_origin() {
        let mut ledger = TokenLedger::new();
        let merge = NodeId(3);
        ledger.add(merge, TokenOrigin::From(NodeId(1)), 2);
        ledger.add(merge, TokenOrigin::From(NodeId(2)), 1);
        assert_eq!(ledger.total(merge), 3);

        assert_eq!(ledger.remove(merge, TokenOrigin::From(NodeId(1)), 5), 2);
        assert_eq!(ledger.count_from(merge, TokenOrigin::From(NodeId(1))), 0);
        assert_eq!(ledger.remove(merge, TokenOrigin::From(NodeId(2)), 1), 1);
        assert!(ledger.is_empty());
    }

    #[test]
    fn test_structural_equality() {
        let mut a = TokenLedger::with_entry(NodeId(0));
        let mut b = TokenLedger::new();
        b.add(NodeId(0), TokenOrigin::Entry, 1);
        assert_eq!(a, b);

        a.add(NodeId(1), TokenOrigin::From(NodeId(0)), 1);
        b.add(NodeId(1), TokenOrigin::From(NodeId(2)), 1);
        assert_ne!(a, b);
    }

    #[test]
    fn test_zero_tokens_leave_no_entry() {
        let mut ledger = TokenLedger::new();
        ledger.add(NodeId(0), TokenOrigin::Entry, 0);
        assert!(ledger.is_empty());
    }

    #[test]
    fn test_occurrence_bound() {
        let mut counter = OccurrenceCounter::new();
        counter.record(NodeId(2), 1);
        counter.record(NodeId(1), 2);
        assert_eq!(counter.first_at_or_above(2), Some(NodeId(1)));
        assert_eq!(counter.record(NodeId(2), 2), 3);
        assert_eq!(counter.first_at_or_above(3), Some(NodeId(2)));
    }

    #[test]
    fn test_retain_nodes_drops_other_counts() {
        let mut counter = OccurrenceCounter::new();
        counter.record(NodeId(1), 3);
        counter.record(NodeId(2), 1);
        let kept = counter.retain_nodes(|n| n == NodeId(2));
        assert_eq!(kept.get(NodeId(1)), 0);
        assert_eq!(kept.get(NodeId(2)), 1);
        assert_eq!(kept.first_at_or_above(3), None);
    }
}
