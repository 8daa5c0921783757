//! The token-passing simulator
//!
//! Branches are explored depth-first in a fixed order: entries in node
//! order, and the alternatives of an exclusive choice in child order. When
//! several choices are active in one round the alternatives are combined
//! in node order. The first offending branch is reported.

use crate::{
    DependencySemantics, ExecutionSemantics, Firing, GatewaySemantics, OccurrenceCounter,
    SimulationConfig, SimulationError, SimulationReport, SimulationResult, TokenLedger,
    TokenOrigin, Verdict,
};
use process_types::{ControlFlowGraph, DependencyGraph, Graph, NodeId, Walk};
use std::collections::{BTreeMap, BTreeSet};

/// Token routing mode
#[derive(Clone, Copy, Debug)]
enum Mode<'d> {
    /// Normal execution: every exclusive choice forks the branch
    Explore,
    /// Force termination: route toward the nearest end node
    Drain(&'d BTreeMap<NodeId, usize>),
}

/// One way a node can fire in a round
#[derive(Clone, Debug)]
struct Move {
    node: NodeId,
    consumed: Vec<(TokenOrigin, usize)>,
    deliveries: Vec<(NodeId, usize)>,
    /// Parallel-merge firings in this move
    firings: usize,
}

/// The state after one round along one combination of choices
#[derive(Clone, Debug)]
struct StepOutcome {
    ledger: TokenLedger,
    received: BTreeSet<NodeId>,
    firings: BTreeMap<NodeId, usize>,
}

/// One execution branch
#[derive(Clone, Debug)]
struct Branch {
    entry: NodeId,
    ledger: TokenLedger,
    occurrences: OccurrenceCounter,
    seen: BTreeSet<TokenLedger>,
    trace: Vec<TokenLedger>,
    rounds: usize,
}

impl Branch {
    fn new(entry: NodeId) -> Self {
        let ledger = TokenLedger::with_entry(entry);
        let mut occurrences = OccurrenceCounter::new();
        occurrences.record(entry, 1);
        Self {
            entry,
            seen: BTreeSet::from([ledger.clone()]),
            trace: vec![ledger.clone()],
            ledger,
            occurrences,
            rounds: 0,
        }
    }
}

/// Branches with equal keys have identical futures
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord)]
struct StateKey {
    entry: NodeId,
    finalized: bool,
    ledger: TokenLedger,
    occurrences: OccurrenceCounter,
    seen: BTreeSet<TokenLedger>,
}

/// What happened to a branch after one round
enum Advance {
    Continue(Branch),
    Finalized(Branch),
    Livelock(NodeId, Vec<TokenLedger>),
}

/// Simulates a graph under a given execution semantics
#[derive(Clone, Debug)]
pub struct Simulator<'g, S = GatewaySemantics> {
    graph: &'g Graph,
    semantics: S,
    config: SimulationConfig,
}

impl<'g> Simulator<'g, GatewaySemantics> {
    /// Simulate a gateway graph from its start event
    pub fn for_control_flow(cfg: &'g ControlFlowGraph, config: SimulationConfig) -> Self {
        Self::new(cfg.graph(), GatewaySemantics::new(), config)
    }
}

impl<'g> Simulator<'g, DependencySemantics> {
    /// Simulate a dependency graph from each of its initial nodes
    pub fn for_dependency(dg: &'g DependencyGraph, config: SimulationConfig) -> Self {
        Self::new(
            dg.graph(),
            DependencySemantics::new(dg.initial_nodes().clone()),
            config,
        )
    }
}

impl<'g, S: ExecutionSemantics> Simulator<'g, S> {
    pub fn new(graph: &'g Graph, semantics: S, config: SimulationConfig) -> Self {
        Self {
            graph,
            semantics,
            config,
        }
    }

    /// Explore every branch and return the first offending one, if any.
    ///
    /// Branches that reach a state another branch from the same entry
    /// already reached are merged into it. Only forks count toward
    /// `max_branches`.
    pub fn run(&self) -> SimulationResult<SimulationReport> {
        let entries = self.semantics.entries(self.graph)?;
        let end_nodes: Vec<NodeId> = self
            .graph
            .node_ids()
            .filter(|id| self.semantics.is_end(self.graph, *id))
            .collect();
        let distances = self.graph.distances_to(end_nodes);

        let mut stack: Vec<Branch> = entries.iter().rev().map(|e| Branch::new(*e)).collect();
        let mut visited: BTreeSet<StateKey> = BTreeSet::new();
        let mut explored = stack.len();
        let mut finalized = 0;
        let mut merged = 0;

        while let Some(branch) = stack.pop() {
            let mut kept = Vec::new();
            for advance in self.advance(branch)? {
                let (next, done) = match advance {
                    Advance::Continue(next) => (next, false),
                    Advance::Finalized(next) => (next, true),
                    Advance::Livelock(node, trace) => {
                        tracing::debug!(node = %node, rounds = trace.len(), "Repetition bound reached");
                        return Ok(SimulationReport {
                            verdict: Verdict::Livelock { node, trace },
                            branches_explored: explored,
                            branches_finalized: finalized,
                        });
                    }
                };
                if visited.insert(self.state_key(&next, done)) {
                    kept.push((next, done));
                } else {
                    merged += 1;
                }
            }

            explored += kept.len().saturating_sub(1);
            if explored > self.config.max_branches {
                return Err(SimulationError::ExplorationLimit { branches: explored });
            }

            let mut continuing = Vec::new();
            for (mut next, done) in kept {
                if !done {
                    continuing.push(next);
                    continue;
                }
                finalized += 1;
                self.drain(&mut next, &distances)?;
                if let Some(verdict) = self.classify(next) {
                    tracing::debug!(verdict = %verdict, "Offending branch found");
                    return Ok(SimulationReport {
                        verdict,
                        branches_explored: explored,
                        branches_finalized: finalized,
                    });
                }
            }
            stack.extend(continuing.into_iter().rev());
        }

        tracing::trace!(explored, finalized, merged, "All branches finalized cleanly");
        Ok(SimulationReport {
            verdict: Verdict::Sound,
            branches_explored: explored,
            branches_finalized: finalized,
        })
    }

    /// What decides the future of a branch: its ledger, plus the counts and
    /// seen ledgers on nodes its tokens can still reach
    fn state_key(&self, branch: &Branch, finalized: bool) -> StateKey {
        let walk = Walk::forward(self.graph);
        let mut ahead = BTreeSet::new();
        for node in branch.ledger.occupied() {
            walk.visit(node, &mut ahead);
        }
        StateKey {
            entry: branch.entry,
            finalized,
            ledger: branch.ledger.clone(),
            occurrences: branch.occurrences.retain_nodes(|n| ahead.contains(&n)),
            seen: branch
                .seen
                .iter()
                .filter(|l| l.occupied().all(|n| ahead.contains(&n)))
                .cloned()
                .collect(),
        }
    }

    /// Run one round of a branch and sort the successors
    fn advance(&self, branch: Branch) -> SimulationResult<Vec<Advance>> {
        if branch.rounds >= self.config.max_rounds {
            return Ok(vec![Advance::Finalized(branch)]);
        }
        let outcomes = self.step(&branch.ledger, Mode::Explore)?;
        if outcomes.is_empty() {
            return Ok(vec![Advance::Finalized(branch)]);
        }

        let mut result = Vec::with_capacity(outcomes.len());
        for outcome in outcomes {
            let mut next = branch.clone();
            next.rounds += 1;

            for node in &outcome.received {
                match self.semantics.firing(self.graph, *node) {
                    Firing::Synchronize | Firing::Absorb => {}
                    _ => {
                        next.occurrences.record(*node, 1);
                    }
                }
            }
            for (node, times) in &outcome.firings {
                next.occurrences.record(*node, *times);
            }
            next.trace.push(outcome.ledger.clone());
            tracing::trace!(round = next.rounds, ledger = %outcome.ledger, "Step");

            if let Some(node) = next.occurrences.first_at_or_above(self.config.repetition_bound) {
                result.push(Advance::Livelock(node, next.trace));
                continue;
            }

            // Tokens resting on end nodes do not distinguish states.
            let known = !next.seen.insert(self.live_tokens(&outcome.ledger));
            let stalled = outcome.ledger == branch.ledger;
            next.ledger = outcome.ledger;
            if known || stalled {
                tracing::trace!(round = next.rounds, "Branch reached a fixed point");
                result.push(Advance::Finalized(next));
            } else {
                result.push(Advance::Continue(next));
            }
        }
        Ok(result)
    }

    fn live_tokens(&self, ledger: &TokenLedger) -> TokenLedger {
        ledger.retain_nodes(|n| !self.semantics.is_end(self.graph, n))
    }

    /// Force a finalized branch toward end nodes until nothing moves
    fn drain(&self, branch: &mut Branch, distances: &BTreeMap<NodeId, usize>) -> SimulationResult<()> {
        for _ in 0..self.config.max_rounds {
            let outcomes = self.step(&branch.ledger, Mode::Drain(distances))?;
            let Some(outcome) = outcomes.into_iter().next() else {
                break;
            };
            if outcome.ledger == branch.ledger {
                break;
            }
            branch.ledger = outcome.ledger;
            branch.trace.push(branch.ledger.clone());
        }
        Ok(())
    }

    /// Verdict for a drained branch, `None` when it ended cleanly
    fn classify(&self, branch: Branch) -> Option<Verdict> {
        let stranded: Vec<NodeId> = branch
            .ledger
            .occupied()
            .filter(|n| !self.semantics.is_end(self.graph, *n))
            .collect();
        if stranded.is_empty() {
            return None;
        }
        let trapped = stranded
            .iter()
            .copied()
            .find(|n| self.graph.is_on_cycle(*n) && !self.graph.can_escape_cycle(*n));
        Some(match trapped {
            Some(node) => Verdict::Livelock {
                node,
                trace: branch.trace,
            },
            None => Verdict::Deadlock {
                stranded,
                trace: branch.trace,
            },
        })
    }

    // ── Stepping ─────────────────────────────────────────────────────

    /// Fire every token-bearing node once. Returns one outcome per
    /// combination of choices, or nothing if no node can fire.
    fn step(&self, ledger: &TokenLedger, mode: Mode<'_>) -> SimulationResult<Vec<StepOutcome>> {
        let mut per_node: Vec<Vec<Move>> = Vec::new();
        for node in ledger.occupied() {
            let moves = self.moves(ledger, node, mode)?;
            if !moves.is_empty() {
                per_node.push(moves);
            }
        }
        if per_node.is_empty() {
            return Ok(Vec::new());
        }

        let mut combinations: Vec<Vec<&Move>> = vec![Vec::new()];
        for alternatives in &per_node {
            let mut extended = Vec::with_capacity(combinations.len() * alternatives.len());
            for combination in &combinations {
                for alternative in alternatives {
                    let mut next = combination.clone();
                    next.push(alternative);
                    extended.push(next);
                }
            }
            if extended.len() > self.config.max_branches {
                return Err(SimulationError::ExplorationLimit {
                    branches: extended.len(),
                });
            }
            combinations = extended;
        }

        Ok(combinations
            .into_iter()
            .map(|moves| self.apply(ledger, &moves))
            .collect())
    }

    /// Apply a set of simultaneous moves to a snapshot. Only parallel
    /// merges keep track of which parent sent a token.
    fn apply(&self, ledger: &TokenLedger, moves: &[&Move]) -> StepOutcome {
        let mut next = ledger.clone();
        let mut received = BTreeSet::new();
        let mut firings = BTreeMap::new();
        for m in moves {
            for (origin, count) in &m.consumed {
                next.remove(m.node, *origin, *count);
            }
        }
        for m in moves {
            for (target, count) in &m.deliveries {
                let origin = match self.semantics.firing(self.graph, *target) {
                    Firing::Synchronize => TokenOrigin::From(m.node),
                    _ => TokenOrigin::Pooled,
                };
                next.add(*target, origin, *count);
                received.insert(*target);
            }
            if m.firings > 0 {
                firings.insert(m.node, m.firings);
            }
        }
        StepOutcome {
            ledger: next,
            received,
            firings,
        }
    }

    /// The ways `node` can fire. Empty when it holds its tokens.
    fn moves(&self, ledger: &TokenLedger, node: NodeId, mode: Mode<'_>) -> SimulationResult<Vec<Move>> {
        if let Mode::Drain(distances) = mode {
            if !distances.contains_key(&node) {
                return Ok(Vec::new());
            }
        }
        let Some(held) = ledger.at(node) else {
            return Ok(Vec::new());
        };
        let total: usize = held.values().sum();
        let consumed: Vec<(TokenOrigin, usize)> = held.iter().map(|(o, c)| (*o, *c)).collect();
        let children = self.graph.children(node);

        let forward_to = |target: NodeId, consumed: Vec<(TokenOrigin, usize)>, count: usize, firings: usize| Move {
            node,
            consumed,
            deliveries: vec![(target, count)],
            firings,
        };

        match self.semantics.firing(self.graph, node) {
            Firing::Absorb => Ok(Vec::new()),

            Firing::Forward => Ok(self
                .route(node, mode)?
                .map(|target| vec![forward_to(target, consumed, total, 0)])
                .unwrap_or_default()),

            Firing::Choose => match mode {
                Mode::Explore => Ok(children
                    .iter()
                    .map(|child| forward_to(*child, consumed.clone(), total, 0))
                    .collect()),
                Mode::Drain(distances) => Ok(nearest(children, distances)
                    .map(|target| vec![forward_to(target, consumed, total, 0)])
                    .unwrap_or_default()),
            },

            Firing::Duplicate => Ok(vec![Move {
                node,
                consumed,
                deliveries: children.iter().map(|c| (*c, total)).collect(),
                firings: 0,
            }]),

            Firing::Synchronize => {
                let parents = self.graph.parents(node);
                let full_sets = parents
                    .iter()
                    .map(|p| ledger.count_from(node, TokenOrigin::From(*p)))
                    .min()
                    .unwrap_or(0);
                if full_sets == 0 {
                    return Ok(Vec::new());
                }
                let consumed = parents
                    .iter()
                    .map(|p| (TokenOrigin::From(*p), full_sets))
                    .collect();
                Ok(self
                    .route(node, mode)?
                    .map(|target| vec![forward_to(target, consumed, full_sets, full_sets)])
                    .unwrap_or_default())
            }
        }
    }

    /// The single child a forwarding node sends to
    fn route(&self, node: NodeId, mode: Mode<'_>) -> SimulationResult<Option<NodeId>> {
        let children = self.graph.children(node);
        match (children.len(), mode) {
            (0, _) => Ok(None),
            (1, _) => Ok(children.iter().next().copied()),
            (_, Mode::Drain(distances)) => Ok(nearest(children, distances)),
            (_, Mode::Explore) => Err(SimulationError::AmbiguousRouting(node)),
        }
    }
}

/// The child closest to an end node, lowest id on ties
fn nearest(children: &BTreeSet<NodeId>, distances: &BTreeMap<NodeId, usize>) -> Option<NodeId> {
    children
        .iter()
        .filter_map(|c| distances.get(c).map(|d| (*d, *c)))
        .min()
        .map(|(_, c)| c)
}

// ── Convenience ──────────────────────────────────────────────────────

/// Simulate a control-flow graph under gateway semantics
pub fn simulate(cfg: &ControlFlowGraph, config: &SimulationConfig) -> SimulationResult<SimulationReport> {
    Simulator::for_control_flow(cfg, config.clone()).run()
}

/// The verdict of a run, with a hit branch limit reported as
/// [`Verdict::Unverified`] rather than as an error
pub fn settle(result: SimulationResult<SimulationReport>) -> SimulationResult<Verdict> {
    match result {
        Ok(report) => Ok(report.verdict),
        Err(SimulationError::ExplorationLimit { branches }) => Ok(Verdict::Unverified { branches }),
        Err(e) => Err(e),
    }
}

/// Simulate a dependency graph under implicit-gateway semantics
pub fn simulate_dependency(
    dg: &DependencyGraph,
    config: &SimulationConfig,
) -> SimulationResult<SimulationReport> {
    Simulator::for_dependency(dg, config.clone()).run()
}
