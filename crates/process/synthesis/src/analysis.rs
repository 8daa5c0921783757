//! Branch analysis of one exclusive split
//!
//! For every pair of branches under a split this works out whether they can
//! safely run in parallel, where they would synchronize, and which
//! activities would become concurrent.

use crate::scoring::activities_in;
use process_types::{ActivityPair, ActivityPairSet, Graph, NodeId, PathSet, Walk};
use std::collections::{BTreeMap, BTreeSet};

/// How two branches relate
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PairAnalysis {
    pub compatible: bool,
    /// First node common to every path of both branches
    pub sync: Option<NodeId>,
    pub concurrent: BTreeSet<ActivityPair>,
}

impl PairAnalysis {
    fn incompatible(sync: Option<NodeId>) -> Self {
        Self {
            compatible: false,
            sync,
            concurrent: BTreeSet::new(),
        }
    }
}

/// Paths and pairwise relations of the branches under one split
#[derive(Debug)]
pub struct SplitAnalysis<'g> {
    graph: &'g Graph,
    split: NodeId,
    branches: Vec<NodeId>,
    paths: BTreeMap<NodeId, PathSet>,
    pairs: BTreeMap<(NodeId, NodeId), PairAnalysis>,
}

impl<'g> SplitAnalysis<'g> {
    pub fn new(graph: &'g Graph, split: NodeId, exclusions: &ActivityPairSet, max_paths: usize) -> Self {
        let branches: Vec<NodeId> = graph.children(split).iter().copied().collect();
        let stop: BTreeSet<NodeId> = [split].into_iter().collect();
        let paths = branches
            .iter()
            .map(|b| (*b, graph.paths_from(*b, &stop, max_paths)))
            .collect();

        let mut analysis = Self {
            graph,
            split,
            branches,
            paths,
            pairs: BTreeMap::new(),
        };
        for (i, a) in analysis.branches.iter().enumerate() {
            for b in &analysis.branches[i + 1..] {
                let pair = analysis.analyse_pair(*a, *b, exclusions);
                tracing::trace!(
                    left = %graph.label(*a),
                    right = %graph.label(*b),
                    compatible = pair.compatible,
                    "Branch pair analysed"
                );
                analysis.pairs.insert((*a, *b), pair);
            }
        }
        analysis
    }

    pub fn split(&self) -> NodeId {
        self.split
    }

    pub fn branches(&self) -> &[NodeId] {
        &self.branches
    }

    pub fn pair(&self, a: NodeId, b: NodeId) -> Option<&PairAnalysis> {
        let key = if a <= b { (a, b) } else { (b, a) };
        self.pairs.get(&key)
    }

    pub fn is_compatible(&self, a: NodeId, b: NodeId) -> bool {
        self.pair(a, b).map(|p| p.compatible).unwrap_or(false)
    }

    /// First node common to every path of every given branch
    pub fn group_sync(&self, branches: &[NodeId]) -> Option<NodeId> {
        let sets: Vec<&PathSet> = branches.iter().filter_map(|b| self.paths.get(b)).collect();
        let first = sets.first()?.paths.first()?;
        let mut common: BTreeSet<NodeId> = first.nodes.iter().copied().collect();
        for set in &sets {
            common = common.intersection(&set.common_nodes()).copied().collect();
        }
        first.nodes.iter().copied().find(|n| common.contains(n))
    }

    /// Nodes reachable from `branch` without passing the split or `sync`
    pub fn region(&self, branch: NodeId, sync: Option<NodeId>) -> BTreeSet<NodeId> {
        let blocked = std::iter::once(self.split).chain(sync);
        let blocked: Vec<NodeId> = blocked.collect();
        if blocked.contains(&branch) {
            return BTreeSet::new();
        }
        Walk::forward(self.graph).blocking(blocked).reachable(branch)
    }

    fn analyse_pair(&self, a: NodeId, b: NodeId, exclusions: &ActivityPairSet) -> PairAnalysis {
        let (Some(paths_a), Some(paths_b)) = (self.paths.get(&a), self.paths.get(&b)) else {
            return PairAnalysis::incompatible(None);
        };
        if paths_a.truncated || paths_b.truncated {
            return PairAnalysis::incompatible(None);
        }

        let beside_split: BTreeSet<NodeId> = [self.split].into_iter().collect();
        if self.graph.can_reach_avoiding(a, b, &beside_split)
            || self.graph.can_reach_avoiding(b, a, &beside_split)
        {
            return PairAnalysis::incompatible(None);
        }

        let sync = self.group_sync(&[a, b]);
        match sync {
            Some(point) => {
                let loops_back = paths_a
                    .paths
                    .iter()
                    .chain(&paths_b.paths)
                    .any(|path| self.loops_before(path, point));
                if loops_back {
                    return PairAnalysis::incompatible(sync);
                }
            }
            None => {
                if !self.diverges(a, b) {
                    return PairAnalysis::incompatible(None);
                }
            }
        }

        let region_a = activities_in(self.graph, &self.region(a, sync));
        let region_b = activities_in(self.graph, &self.region(b, sync));
        let excluded = region_a
            .iter()
            .any(|x| region_b.iter().any(|y| exclusions.contains(x, y)));
        if excluded {
            return PairAnalysis::incompatible(sync);
        }

        let mut concurrent = BTreeSet::new();
        for x in region_a.difference(&region_b) {
            for y in region_b.difference(&region_a) {
                concurrent.insert(ActivityPair::new(x.clone(), y.clone()));
            }
        }
        PairAnalysis {
            compatible: true,
            sync,
            concurrent,
        }
    }

    /// Whether some node before `sync` on the path re-enters the path or the split
    fn loops_before(&self, path: &process_types::Path, sync: NodeId) -> bool {
        let Some(end) = path.position(sync) else {
            return false;
        };
        path.nodes[..end].iter().enumerate().any(|(index, node)| {
            self.graph.children(*node).iter().any(|child| {
                *child == self.split || matches!(path.position(*child), Some(pos) if pos <= index)
            })
        })
    }

    /// Divergent branches: they never meet, and neither returns to the split
    /// without passing through the other
    fn diverges(&self, a: NodeId, b: NodeId) -> bool {
        let back_a = self.graph.can_reach_avoiding(a, self.split, &[b].into_iter().collect());
        let back_b = self.graph.can_reach_avoiding(b, self.split, &[a].into_iter().collect());
        if back_a || back_b {
            return false;
        }
        let walk = Walk::forward(self.graph).blocking([self.split]);
        walk.reachable(a).is_disjoint(&walk.reachable(b))
    }
}
