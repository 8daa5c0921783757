//! Structural alternatives for the branches of one exclusive split
//!
//! An arrangement is a tree whose leaves are the split's branches. Inner
//! nodes alternate between exclusive and parallel groupings, and the root
//! is always exclusive: the all-singleton root is the split left as it is.

use crate::analysis::SplitAnalysis;
use crate::scoring::{ParallelismScore, ScoreMetrics};
use process_types::{ActivityPair, ActivityPairSet, NodeId};
use std::collections::BTreeSet;

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Arrangement {
    Branch(NodeId),
    Exclusive(Vec<Arrangement>),
    Parallel(Vec<Arrangement>),
}

impl Arrangement {
    /// Branches under this node, left to right
    pub fn leaves(&self) -> Vec<NodeId> {
        let mut out = Vec::new();
        self.collect_leaves(&mut out);
        out
    }

    fn collect_leaves(&self, out: &mut Vec<NodeId>) {
        match self {
            Arrangement::Branch(b) => out.push(*b),
            Arrangement::Exclusive(children) | Arrangement::Parallel(children) => {
                for child in children {
                    child.collect_leaves(out);
                }
            }
        }
    }

    /// Parallel groupings in the tree
    pub fn parallel_groups(&self) -> usize {
        match self {
            Arrangement::Branch(_) => 0,
            Arrangement::Exclusive(children) => children.iter().map(Self::parallel_groups).sum(),
            Arrangement::Parallel(children) => {
                1 + children.iter().map(Self::parallel_groups).sum::<usize>()
            }
        }
    }
}

// ── Generation ───────────────────────────────────────────────────────

#[derive(Clone, Copy, PartialEq, Eq)]
enum Grouping {
    Exclusive,
    Parallel,
}

impl Grouping {
    fn flip(self) -> Self {
        match self {
            Grouping::Exclusive => Grouping::Parallel,
            Grouping::Parallel => Grouping::Exclusive,
        }
    }

    fn wrap(self, children: Vec<Arrangement>) -> Arrangement {
        match self {
            Grouping::Exclusive => Arrangement::Exclusive(children),
            Grouping::Parallel => Arrangement::Parallel(children),
        }
    }
}

/// Every arrangement of `branches`, up to `limit`, in a fixed order
/// starting with the unchanged split
pub fn arrangements(branches: &[NodeId], limit: usize) -> Vec<Arrangement> {
    let mut out = Vec::new();
    for blocks in set_partitions(branches).into_iter().rev() {
        for children in block_options(&blocks, Grouping::Exclusive, limit) {
            out.push(Arrangement::Exclusive(children));
            if out.len() >= limit {
                return out;
            }
        }
    }
    out
}

/// Options for a group of kind `grouping` over `items`, which must split
/// into at least two blocks
fn grouped(items: &[NodeId], grouping: Grouping, limit: usize) -> Vec<Arrangement> {
    let mut out = Vec::new();
    for blocks in set_partitions(items).into_iter().rev() {
        if blocks.len() < 2 {
            continue;
        }
        for children in block_options(&blocks, grouping, limit) {
            out.push(grouping.wrap(children));
            if out.len() >= limit {
                return out;
            }
        }
    }
    out
}

/// Cartesian product of the options of each block under a `parent` group
fn block_options(blocks: &[Vec<NodeId>], parent: Grouping, limit: usize) -> Vec<Vec<Arrangement>> {
    let mut product: Vec<Vec<Arrangement>> = vec![Vec::new()];
    for block in blocks {
        let options = match block.as_slice() {
            [single] => vec![Arrangement::Branch(*single)],
            _ => grouped(block, parent.flip(), limit),
        };
        let mut next = Vec::new();
        'outer: for prefix in &product {
            for option in &options {
                let mut extended = prefix.clone();
                extended.push(option.clone());
                next.push(extended);
                if next.len() >= limit {
                    break 'outer;
                }
            }
        }
        product = next;
    }
    product
}

/// Set partitions by recursive insertion. The last partition is the one
/// with every item in its own block.
fn set_partitions(items: &[NodeId]) -> Vec<Vec<Vec<NodeId>>> {
    let Some((first, rest)) = items.split_first() else {
        return vec![Vec::new()];
    };
    let mut out = Vec::new();
    for partition in set_partitions(rest) {
        for i in 0..partition.len() {
            let mut joined = partition.clone();
            joined[i].insert(0, *first);
            out.push(joined);
        }
        let mut alone = partition;
        alone.insert(0, vec![*first]);
        out.push(alone);
    }
    out
}

/// Fallback for wide splits: the largest greedy set of mutually compatible
/// branches sharing one sync point, as a single parallel group
pub fn greedy_arrangements(analysis: &SplitAnalysis<'_>) -> Vec<Arrangement> {
    let branches = analysis.branches();
    let unchanged = Arrangement::Exclusive(branches.iter().map(|b| Arrangement::Branch(*b)).collect());

    let mut best: Vec<NodeId> = Vec::new();
    for (i, seed) in branches.iter().enumerate() {
        let mut clique = vec![*seed];
        let mut sync = None;
        for other in &branches[i + 1..] {
            let fits = clique.iter().all(|member| {
                analysis
                    .pair(*member, *other)
                    .map(|p| p.compatible && sync.map_or(true, |s| p.sync == s))
                    .unwrap_or(false)
            });
            if fits {
                if sync.is_none() {
                    sync = analysis.pair(*seed, *other).map(|p| p.sync);
                }
                clique.push(*other);
            }
        }
        if clique.len() > best.len() {
            best = clique;
        }
    }
    if best.len() < 2 {
        return vec![unchanged];
    }

    let mut children = vec![Arrangement::Parallel(
        best.iter().map(|b| Arrangement::Branch(*b)).collect(),
    )];
    children.extend(
        branches
            .iter()
            .filter(|b| !best.contains(b))
            .map(|b| Arrangement::Branch(*b)),
    );
    vec![Arrangement::Exclusive(children), unchanged]
}

// ── Evaluation ───────────────────────────────────────────────────────

/// A valid arrangement with its score inputs
#[derive(Clone, Debug)]
pub struct Evaluated {
    pub arrangement: Arrangement,
    pub metrics: ScoreMetrics,
    pub score: i64,
}

/// Check an arrangement against the pair analysis and score it.
///
/// Within a parallel group every pair of branches taken from different
/// children must be compatible, and either all of them synchronize at the
/// group's common node or all of them diverge. Nested parallel groups must
/// share the sync point of the group around them.
pub fn evaluate(
    arrangement: &Arrangement,
    analysis: &SplitAnalysis<'_>,
    declared: &ActivityPairSet,
    scorer: &dyn ParallelismScore,
) -> Option<Evaluated> {
    let mut concurrent: BTreeSet<ActivityPair> = BTreeSet::new();
    if !check(arrangement, analysis, None, &mut concurrent) {
        return None;
    }
    let metrics = ScoreMetrics::from_pairs(&concurrent, declared, arrangement.parallel_groups());
    let score = scorer.score(&metrics);
    Some(Evaluated {
        arrangement: arrangement.clone(),
        metrics,
        score,
    })
}

fn check(
    node: &Arrangement,
    analysis: &SplitAnalysis<'_>,
    enclosing: Option<Option<NodeId>>,
    concurrent: &mut BTreeSet<ActivityPair>,
) -> bool {
    match node {
        Arrangement::Branch(_) => true,
        Arrangement::Exclusive(children) => children
            .iter()
            .all(|c| check(c, analysis, enclosing, concurrent)),
        Arrangement::Parallel(children) => {
            let sync = analysis.group_sync(&node.leaves());
            if enclosing.is_some_and(|outer| outer != sync) {
                return false;
            }
            for (i, left) in children.iter().enumerate() {
                for right in &children[i + 1..] {
                    for a in left.leaves() {
                        for b in right.leaves() {
                            match analysis.pair(a, b) {
                                Some(pair) if pair.compatible && pair.sync == sync => {
                                    concurrent.extend(pair.concurrent.iter().cloned());
                                }
                                _ => return false,
                            }
                        }
                    }
                }
            }
            children
                .iter()
                .all(|c| check(c, analysis, Some(sync), concurrent))
        }
    }
}

/// Highest score, then more parallel groups, then earliest generated.
/// Arrangements exposing no concurrency never win.
pub fn best(evaluated: Vec<Evaluated>) -> Option<Evaluated> {
    let mut best: Option<Evaluated> = None;
    for candidate in evaluated {
        if candidate.metrics.concurrent_pairs == 0 {
            continue;
        }
        let better = match &best {
            None => true,
            Some(current) => {
                (candidate.score, candidate.metrics.parallel_gateways)
                    > (current.score, current.metrics.parallel_gateways)
            }
        };
        if better {
            best = Some(candidate);
        }
    }
    best
}
