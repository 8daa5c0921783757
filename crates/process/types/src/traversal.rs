//! Graph traversal: reachability, distances, cycles and path enumeration
//!
//! Every walk here is an explicit-stack depth-first (or queue-driven
//! breadth-first) search guarded by a visited set. Process graphs are
//! generally cyclic, so nothing recurses on graph structure.

use crate::{Graph, NodeId};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, VecDeque};

// ── Loop links ───────────────────────────────────────────────────────

/// Logical back-edges used in loop analysis.
///
/// A loop link is not an edge of the graph. Walks that are given the
/// link set follow them as if they were.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoopLinks(BTreeSet<(NodeId, NodeId)>);

impl LoopLinks {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, from: NodeId, to: NodeId) {
        self.0.insert((from, to));
    }

    pub fn targets(&self, from: NodeId) -> impl Iterator<Item = NodeId> + '_ {
        self.0
            .range((from, NodeId(0))..=(from, NodeId(usize::MAX)))
            .map(|(_, to)| *to)
    }

    pub fn sources(&self, to: NodeId) -> impl Iterator<Item = NodeId> + '_ {
        self.0.iter().filter(move |(_, t)| *t == to).map(|(f, _)| *f)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

// ── Walk ─────────────────────────────────────────────────────────────

/// Direction of a walk
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Direction {
    /// Follow children
    Forward,
    /// Follow parents
    Backward,
}

/// A configurable visited-set guarded depth-first walk
#[derive(Clone, Debug)]
pub struct Walk<'g> {
    graph: &'g Graph,
    direction: Direction,
    loop_links: Option<&'g LoopLinks>,
    blocked: BTreeSet<NodeId>,
}

impl<'g> Walk<'g> {
    pub fn forward(graph: &'g Graph) -> Self {
        Self {
            graph,
            direction: Direction::Forward,
            loop_links: None,
            blocked: BTreeSet::new(),
        }
    }

    pub fn backward(graph: &'g Graph) -> Self {
        Self {
            direction: Direction::Backward,
            ..Self::forward(graph)
        }
    }

    /// Also follow the given logical back-edges
    pub fn with_loop_links(mut self, links: &'g LoopLinks) -> Self {
        self.loop_links = Some(links);
        self
    }

    /// Never enter these nodes
    pub fn blocking(mut self, nodes: impl IntoIterator<Item = NodeId>) -> Self {
        self.blocked.extend(nodes);
        self
    }

    fn neighbours(&self, node: NodeId) -> Vec<NodeId> {
        let mut next: Vec<NodeId> = match self.direction {
            Direction::Forward => self.graph.children(node).iter().copied().collect(),
            Direction::Backward => self.graph.parents(node).iter().copied().collect(),
        };
        if let Some(links) = self.loop_links {
            match self.direction {
                Direction::Forward => next.extend(links.targets(node)),
                Direction::Backward => next.extend(links.sources(node)),
            }
        }
        next.retain(|n| !self.blocked.contains(n));
        next
    }

    /// Visit `start` and everything reachable from it, recording into `visited`.
    ///
    /// Nodes already in `visited` are not expanded again, which lets callers
    /// share one visited set across several walks.
    pub fn visit(&self, start: NodeId, visited: &mut BTreeSet<NodeId>) {
        let mut stack = vec![start];
        while let Some(current) = stack.pop() {
            if !visited.insert(current) {
                continue;
            }
            for next in self.neighbours(current).into_iter().rev() {
                if !visited.contains(&next) {
                    stack.push(next);
                }
            }
        }
    }

    /// Nodes reachable from `start` by at least one step
    pub fn successors(&self, start: NodeId) -> BTreeSet<NodeId> {
        let mut visited = BTreeSet::new();
        for next in self.neighbours(start) {
            self.visit(next, &mut visited);
        }
        visited
    }

    /// `start` plus everything reachable from it
    pub fn reachable(&self, start: NodeId) -> BTreeSet<NodeId> {
        let mut visited = BTreeSet::new();
        self.visit(start, &mut visited);
        visited
    }

    /// Breadth-first step counts from `start`
    pub fn distances(&self, start: NodeId) -> BTreeMap<NodeId, usize> {
        self.distances_from(std::iter::once(start))
    }

    /// Breadth-first step counts from the nearest of several sources
    pub fn distances_from(&self, sources: impl IntoIterator<Item = NodeId>) -> BTreeMap<NodeId, usize> {
        let mut distances = BTreeMap::new();
        let mut queue = VecDeque::new();
        for source in sources {
            if distances.insert(source, 0).is_none() {
                queue.push_back(source);
            }
        }
        while let Some(current) = queue.pop_front() {
            let d = distances[&current];
            for next in self.neighbours(current) {
                if !distances.contains_key(&next) {
                    distances.insert(next, d + 1);
                    queue.push_back(next);
                }
            }
        }
        distances
    }
}

// ── Paths ────────────────────────────────────────────────────────────

/// Why a loop-free walk stopped
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum PathEnd {
    /// The last node has no children
    Sink,
    /// Every child of the last node is already on the path
    Revisit(NodeId),
    /// The walk reached one of the stop nodes (not included in the path)
    Stop(NodeId),
}

/// One loop-free walk through a graph
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Path {
    pub nodes: Vec<NodeId>,
    pub end: PathEnd,
}

impl Path {
    pub fn position(&self, node: NodeId) -> Option<usize> {
        self.nodes.iter().position(|n| *n == node)
    }

    pub fn contains(&self, node: NodeId) -> bool {
        self.nodes.contains(&node)
    }
}

/// All loop-free walks from a node, possibly truncated
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PathSet {
    pub paths: Vec<Path>,
    pub truncated: bool,
}

impl PathSet {
    /// Nodes present on every path
    pub fn common_nodes(&self) -> BTreeSet<NodeId> {
        let mut iter = self.paths.iter();
        let Some(first) = iter.next() else {
            return BTreeSet::new();
        };
        let mut common: BTreeSet<NodeId> = first.nodes.iter().copied().collect();
        for path in iter {
            common.retain(|n| path.contains(*n));
        }
        common
    }
}

// ── Graph queries ────────────────────────────────────────────────────

impl Graph {
    /// Whether a path (possibly empty) leads from `from` to `to`
    pub fn can_reach(&self, from: NodeId, to: NodeId) -> bool {
        from == to || Walk::forward(self).successors(from).contains(&to)
    }

    /// Reachability that also follows logical loop links
    pub fn can_reach_with_links(&self, from: NodeId, to: NodeId, links: &LoopLinks) -> bool {
        from == to
            || Walk::forward(self)
                .with_loop_links(links)
                .successors(from)
                .contains(&to)
    }

    /// Whether `from` reaches `to` without entering any of `avoid`
    pub fn can_reach_avoiding(&self, from: NodeId, to: NodeId, avoid: &BTreeSet<NodeId>) -> bool {
        let blocked = avoid.iter().copied().filter(|n| *n != to);
        from == to || Walk::forward(self).blocking(blocked).successors(from).contains(&to)
    }

    /// Nodes reachable from `from` without passing `bound` (bound excluded)
    pub fn reachable_until(&self, from: NodeId, bound: NodeId) -> BTreeSet<NodeId> {
        if from == bound {
            return BTreeSet::new();
        }
        Walk::forward(self).blocking([bound]).reachable(from)
    }

    /// Fewest parent steps from `node` up to `ancestor`
    pub fn min_distance_to_ancestor(&self, node: NodeId, ancestor: NodeId) -> Option<usize> {
        Walk::backward(self).distances(node).get(&ancestor).copied()
    }

    /// Fewest child steps from each node to the nearest of `targets`
    pub fn distances_to(&self, targets: impl IntoIterator<Item = NodeId>) -> BTreeMap<NodeId, usize> {
        Walk::backward(self).distances_from(targets)
    }

    /// Whether `node` lies on a directed cycle
    pub fn is_on_cycle(&self, node: NodeId) -> bool {
        Walk::forward(self).successors(node).contains(&node)
    }

    /// Whether a token circling through `node` can leave its cycle.
    ///
    /// True when some node reachable from `node` cannot lead back to it.
    /// Nodes not on a cycle trivially escape.
    pub fn can_escape_cycle(&self, node: NodeId) -> bool {
        if !self.is_on_cycle(node) {
            return true;
        }
        let ahead = Walk::forward(self).successors(node);
        let back = Walk::backward(self).successors(node);
        ahead.iter().any(|n| !back.contains(n))
    }

    /// Whether every node in `members` reaches every other
    pub fn is_strongly_connected(&self, members: &BTreeSet<NodeId>) -> bool {
        let Some(first) = members.iter().next() else {
            return false;
        };
        if members.len() == 1 {
            return self.is_on_cycle(*first);
        }
        let ahead = Walk::forward(self).reachable(*first);
        let back = Walk::backward(self).reachable(*first);
        members.iter().all(|m| ahead.contains(m) && back.contains(m))
    }

    /// First cycle-closing edge in depth-first order from `roots`, then from
    /// every remaining node in arena order
    pub fn find_back_edge(&self, roots: &[NodeId]) -> Option<(NodeId, NodeId)> {
        #[derive(Clone, Copy, PartialEq, Eq)]
        enum Mark {
            Open,
            Done,
        }

        let mut marks: BTreeMap<NodeId, Mark> = BTreeMap::new();
        let order: Vec<NodeId> = roots.iter().copied().chain(self.node_ids()).collect();

        for root in order {
            if marks.contains_key(&root) || !self.contains(root) {
                continue;
            }
            // (node, children still to examine)
            let mut stack: Vec<(NodeId, Vec<NodeId>)> = Vec::new();
            marks.insert(root, Mark::Open);
            stack.push((root, self.children(root).iter().rev().copied().collect()));

            while let Some((node, pending)) = stack.last_mut() {
                let node = *node;
                match pending.pop() {
                    Some(child) => match marks.get(&child) {
                        Some(Mark::Open) => return Some((node, child)),
                        Some(Mark::Done) => {}
                        None => {
                            marks.insert(child, Mark::Open);
                            let next = self.children(child).iter().rev().copied().collect();
                            stack.push((child, next));
                        }
                    },
                    None => {
                        marks.insert(node, Mark::Done);
                        stack.pop();
                    }
                }
            }
        }
        None
    }

    pub fn is_acyclic(&self) -> bool {
        self.find_back_edge(&[]).is_none()
    }

    /// Enumerate loop-free walks from `start`.
    ///
    /// A walk forks at every node with more than one unvisited child and
    /// never enters `stop` nodes. At most `limit` paths are produced.
    pub fn paths_from(&self, start: NodeId, stop: &BTreeSet<NodeId>, limit: usize) -> PathSet {
        let mut result = PathSet::default();
        let mut stack: Vec<Vec<NodeId>> = vec![vec![start]];

        while let Some(path) = stack.pop() {
            if result.paths.len() >= limit {
                result.truncated = true;
                break;
            }
            let Some(&last) = path.last() else {
                continue;
            };
            let children = self.children(last);
            let open: Vec<NodeId> = children
                .iter()
                .copied()
                .filter(|c| !stop.contains(c) && !path.contains(c))
                .collect();

            if open.is_empty() {
                let end = if let Some(s) = children.iter().find(|c| stop.contains(c)) {
                    PathEnd::Stop(*s)
                } else if let Some(v) = children.iter().next() {
                    PathEnd::Revisit(*v)
                } else {
                    PathEnd::Sink
                };
                result.paths.push(Path { nodes: path, end });
                continue;
            }
            for child in open.into_iter().rev() {
                let mut forked = path.clone();
                forked.push(child);
                stack.push(forked);
            }
        }
        result
    }
}
