//! Loop splicing
//!
//! Declared loops whose members are not already strongly connected are
//! closed with an exclusive split after the members and an exclusive merge
//! in front of them. Members that run into separate end events are joined
//! through one merge first. When no single cycle keeps the declared
//! exclusions, each related group of members gets its own cycle. Loop
//! members missing from the graph are chained as one branch running in
//! parallel with the loop body.

use crate::candidate::Candidate;
use crate::explicit::gateway;
use crate::report::LoopDiagnostic;
use process_types::{
    ActivityPairSet, ConstraintSet, GatewayKind, GatewayRole, Graph, LoopConstraint, NodeId,
    ProcessResult, Walk,
};
use std::collections::{BTreeMap, BTreeSet};

/// Counters from the loop pass
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct LoopOutcome {
    pub spliced: usize,
    pub diagnostics: Vec<LoopDiagnostic>,
}

/// Realise every declared loop on `candidate`
pub fn splice_loops(candidate: &mut Candidate, constraints: &ConstraintSet) -> ProcessResult<LoopOutcome> {
    let exclusions = constraints.mutual_exclusions();
    let mut outcome = LoopOutcome::default();

    for constraint in &constraints.loops {
        let reason = match splice_loop(candidate, constraint, &exclusions)? {
            Splice::Unchanged => continue,
            Splice::Closed => {
                outcome.spliced += 1;
                continue;
            }
            Splice::Partial(reason) => {
                outcome.spliced += 1;
                tracing::warn!(
                    activities = ?constraint.activities,
                    reason = %reason,
                    "Loop constraint only partly realised"
                );
                reason
            }
            Splice::Dropped(reason) => {
                tracing::warn!(
                    activities = ?constraint.activities,
                    reason = %reason,
                    "Loop constraint dropped"
                );
                reason
            }
        };
        outcome.diagnostics.push(LoopDiagnostic {
            activities: constraint.activities.clone(),
            reason,
        });
    }

    tracing::info!(
        spliced = outcome.spliced,
        dropped = outcome.diagnostics.len(),
        "Loop splicing complete"
    );
    Ok(outcome)
}

enum Splice {
    /// The members already form a cycle
    Unchanged,
    Closed,
    /// Closed over some of the members only
    Partial(String),
    Dropped(String),
}

fn splice_loop(
    candidate: &mut Candidate,
    constraint: &LoopConstraint,
    exclusions: &ActivityPairSet,
) -> ProcessResult<Splice> {
    let mut present: Vec<NodeId> = Vec::new();
    let mut absent: Vec<&str> = Vec::new();
    for name in &constraint.activities {
        match candidate.graph().find_task(name) {
            Some(node) => present.push(node),
            None => absent.push(name),
        }
    }
    if present.is_empty() {
        return Ok(Splice::Dropped(
            "no member is connected to the rest of the process".to_string(),
        ));
    }

    let mut changed = false;
    if !absent.is_empty() {
        match attach_absent(candidate, &present, &absent)? {
            Some(chain) => {
                present.extend(chain);
                changed = true;
            }
            None => {
                return Ok(Splice::Dropped(format!(
                    "no place to run {} alongside the other members",
                    absent.join(", ")
                )))
            }
        }
    }

    let members: BTreeSet<NodeId> = present.iter().copied().collect();
    if candidate.graph().is_strongly_connected(&members) {
        return Ok(if changed { Splice::Closed } else { Splice::Unchanged });
    }

    if let Some(next) = close_loop(candidate, &members, exclusions)? {
        *candidate = next;
        return Ok(Splice::Closed);
    }
    if let Some(next) = join_ends(candidate, &members, exclusions)? {
        *candidate = next;
        return Ok(Splice::Closed);
    }

    let mut pieces = fragments(candidate.graph(), &present);
    pieces.sort_by(|a, b| b.len().cmp(&a.len()));
    let (next, closed) = close_fragments(candidate, &pieces, exclusions)?;
    if closed.is_empty() {
        return Ok(Splice::Dropped(
            "no exit and re-entry point keeps the declared exclusions".to_string(),
        ));
    }

    let graph = candidate.graph();
    let describe = |piece: &BTreeSet<NodeId>| {
        piece.iter().map(|n| graph.label(*n)).collect::<Vec<_>>().join(", ")
    };
    let reason = if closed.len() == pieces.len() {
        let groups: Vec<String> = pieces.iter().map(describe).collect();
        format!("members loop separately: {}", groups.join(" | "))
    } else {
        let inside: Vec<String> = closed.iter().map(|i| describe(&pieces[*i])).collect();
        format!("closed over {} only", inside.join(", "))
    };
    *candidate = next;
    Ok(Splice::Partial(reason))
}

/// Members grouped so that within a group every member is related to
/// another by reachability
fn fragments(graph: &Graph, members: &[NodeId]) -> Vec<BTreeSet<NodeId>> {
    let mut groups: Vec<BTreeSet<NodeId>> = Vec::new();
    for member in members {
        let (related, mut rest): (Vec<_>, Vec<_>) = groups.into_iter().partition(|g| {
            g.iter()
                .any(|other| graph.can_reach(*other, *member) || graph.can_reach(*member, *other))
        });
        let mut joined: BTreeSet<NodeId> = related.into_iter().flatten().collect();
        joined.insert(*member);
        rest.push(joined);
        groups = rest;
    }
    groups
}

// ── Exit and re-entry points ─────────────────────────────────────────

/// Nodes every member reaches, nearest first
fn exit_candidates(graph: &Graph, members: &BTreeSet<NodeId>) -> Vec<NodeId> {
    let maps: Vec<BTreeMap<NodeId, usize>> = members
        .iter()
        .map(|m| Walk::forward(graph).distances(*m))
        .collect();
    ranked(graph, &maps, |e| !e.is_start() && !e.is_end())
}

/// Nodes that reach every member, nearest first
fn reentry_candidates(graph: &Graph, members: &BTreeSet<NodeId>) -> Vec<NodeId> {
    let maps: Vec<BTreeMap<NodeId, usize>> = members
        .iter()
        .map(|m| Walk::backward(graph).distances(*m))
        .collect();
    ranked(graph, &maps, |e| !e.is_start())
}

fn ranked(
    graph: &Graph,
    maps: &[BTreeMap<NodeId, usize>],
    keep: impl Fn(&process_types::Element) -> bool,
) -> Vec<NodeId> {
    let Some(first) = maps.first() else {
        return Vec::new();
    };
    let mut scored: Vec<(usize, NodeId)> = first
        .keys()
        .filter(|n| graph.element(**n).map(&keep).unwrap_or(false))
        .filter_map(|n| {
            maps.iter()
                .map(|m| m.get(n).copied())
                .sum::<Option<usize>>()
                .map(|total| (total, *n))
        })
        .collect();
    scored.sort();
    scored.into_iter().map(|(_, n)| n).collect()
}

/// Try every exit and re-entry pair in rank order; the first one that
/// keeps all weakly satisfied exclusions wins
fn close_loop(
    candidate: &Candidate,
    members: &BTreeSet<NodeId>,
    exclusions: &ActivityPairSet,
) -> ProcessResult<Option<Candidate>> {
    let graph = candidate.graph();
    let exits: Vec<NodeId> = exit_candidates(graph, members)
        .into_iter()
        .filter(|c| !graph.is_gateway_of(*c, GatewayKind::Parallel, GatewayRole::Split))
        .collect();
    let reentries: Vec<NodeId> = reentry_candidates(graph, members)
        .into_iter()
        .filter(|h| !graph.is_gateway_of(*h, GatewayKind::Parallel, GatewayRole::Merge))
        .collect();
    let satisfied = satisfied_exclusions(graph, exclusions);

    for exit in &exits {
        for reentry in &reentries {
            let mut trial = candidate.clone();
            let split = exit_split(trial.graph_mut(), *exit)?;
            let merge = reentry_merge(trial.graph_mut(), *reentry)?;
            trial.graph_mut().link(split, merge)?;

            let broken = satisfied
                .iter()
                .find(|(a, b)| trial.graph().can_reach(*a, *b) || trial.graph().can_reach(*b, *a));
            if let Some((a, b)) = broken {
                tracing::debug!(
                    exit = %graph.label(*exit),
                    reentry = %graph.label(*reentry),
                    a = %graph.label(*a),
                    b = %graph.label(*b),
                    "Loop placement would join exclusive activities"
                );
                continue;
            }
            tracing::debug!(
                exit = %graph.label(*exit),
                reentry = %graph.label(*reentry),
                "Loop closed"
            );
            return Ok(Some(trial));
        }
    }
    Ok(None)
}

/// Route the end events the members run into through one merge and loop
/// back from there to the nearest node that reaches every member. The merge
/// is parallel when that node is a parallel split.
fn join_ends(
    candidate: &Candidate,
    members: &BTreeSet<NodeId>,
    exclusions: &ActivityPairSet,
) -> ProcessResult<Option<Candidate>> {
    let graph = candidate.graph();
    let ahead: Vec<BTreeSet<NodeId>> = members
        .iter()
        .map(|m| Walk::forward(graph).reachable(*m))
        .collect();
    let ends: BTreeSet<NodeId> = ahead
        .iter()
        .flatten()
        .copied()
        .filter(|n| graph.element(*n).map(|e| e.is_end()).unwrap_or(false))
        .collect();
    if ends.len() < 2 {
        return Ok(None);
    }
    // Ends shared with flows outside the loop stay where they are.
    let owned = ends
        .iter()
        .all(|e| graph.parents(*e).iter().all(|p| ahead.iter().any(|r| r.contains(p))));
    if !owned {
        return Ok(None);
    }
    let Some(reentry) = reentry_candidates(graph, members)
        .into_iter()
        .find(|h| !graph.is_gateway_of(*h, GatewayKind::Parallel, GatewayRole::Merge))
    else {
        return Ok(None);
    };
    let kind = if graph.is_gateway_of(reentry, GatewayKind::Parallel, GatewayRole::Split) {
        GatewayKind::Parallel
    } else {
        GatewayKind::Exclusive
    };
    let satisfied = satisfied_exclusions(graph, exclusions);

    let mut trial = candidate.clone();
    let g = trial.graph_mut();
    let join = g.add_gateway(kind, GatewayRole::Merge);
    for end in &ends {
        for parent in g.parents(*end).clone() {
            g.unlink(parent, *end);
            g.link(parent, join)?;
        }
        g.remove(*end)?;
    }
    let split = g.add_gateway(GatewayKind::Exclusive, GatewayRole::Split);
    let end = g.add_end();
    g.link(join, split)?;
    g.link(split, end)?;
    let merge = reentry_merge(g, reentry)?;
    g.link(split, merge)?;
    if kind == GatewayKind::Parallel && trial.paired_merge(reentry).is_none() {
        trial.pair(reentry, join);
    }

    if satisfied
        .iter()
        .any(|(a, b)| trial.graph().can_reach(*a, *b) || trial.graph().can_reach(*b, *a))
    {
        tracing::debug!(
            reentry = %graph.label(reentry),
            "Joining the loop ends would join exclusive activities"
        );
        return Ok(None);
    }
    tracing::debug!(
        ends = ends.len(),
        reentry = %graph.label(reentry),
        "Loop closed through joined ends"
    );
    Ok(Some(trial))
}

/// Close as many fragments as possible, each as its own cycle. Orders are
/// tried with backtracking; the first order that closes the most wins.
/// Returns the result and the indices of the closed fragments.
fn close_fragments(
    candidate: &Candidate,
    pieces: &[BTreeSet<NodeId>],
    exclusions: &ActivityPairSet,
) -> ProcessResult<(Candidate, Vec<usize>)> {
    let graph = candidate.graph();
    let (already, pending): (Vec<usize>, Vec<usize>) = (0..pieces.len()).partition(|i| {
        graph.is_strongly_connected(&pieces[*i]) && pieces[*i].iter().all(|n| graph.is_on_cycle(*n))
    });
    let mut best = (candidate.clone(), already.clone());
    let mut closed = already;
    extend_closure(candidate, pieces, &pending, &mut closed, exclusions, &mut best)?;
    Ok(best)
}

/// Returns true once every fragment is closed
fn extend_closure(
    candidate: &Candidate,
    pieces: &[BTreeSet<NodeId>],
    pending: &[usize],
    closed: &mut Vec<usize>,
    exclusions: &ActivityPairSet,
    best: &mut (Candidate, Vec<usize>),
) -> ProcessResult<bool> {
    if closed.len() > best.1.len() {
        *best = (candidate.clone(), closed.clone());
    }
    if pending.is_empty() {
        return Ok(true);
    }
    for (i, piece) in pending.iter().enumerate() {
        let Some(next) = close_loop(candidate, &pieces[*piece], exclusions)? else {
            continue;
        };
        let rest: Vec<usize> = pending
            .iter()
            .enumerate()
            .filter(|(j, _)| *j != i)
            .map(|(_, p)| *p)
            .collect();
        closed.push(*piece);
        let done = extend_closure(&next, pieces, &rest, closed, exclusions, best)?;
        closed.pop();
        if done {
            return Ok(true);
        }
    }
    Ok(false)
}

/// Exclusive pairs where neither activity currently reaches the other
fn satisfied_exclusions(graph: &Graph, exclusions: &ActivityPairSet) -> Vec<(NodeId, NodeId)> {
    exclusions
        .iter()
        .filter_map(|pair| Some((graph.find_task(&pair.first)?, graph.find_task(&pair.second)?)))
        .filter(|(a, b)| !graph.can_reach(*a, *b) && !graph.can_reach(*b, *a))
        .collect()
}

/// The exclusive split after `exit`, reusing one already there
fn exit_split(graph: &mut Graph, exit: NodeId) -> ProcessResult<NodeId> {
    if graph.is_gateway_of(exit, GatewayKind::Exclusive, GatewayRole::Split) {
        return Ok(exit);
    }
    let children = graph.children(exit);
    if let [only] = children.iter().copied().collect::<Vec<_>>().as_slice() {
        if graph.is_gateway_of(*only, GatewayKind::Exclusive, GatewayRole::Split) {
            return Ok(*only);
        }
    }
    graph.insert_after(exit, gateway(GatewayKind::Exclusive, GatewayRole::Split))
}

/// The exclusive merge in front of `reentry`, reusing one already there
fn reentry_merge(graph: &mut Graph, reentry: NodeId) -> ProcessResult<NodeId> {
    if graph.is_gateway_of(reentry, GatewayKind::Exclusive, GatewayRole::Merge) {
        return Ok(reentry);
    }
    let parents = graph.parents(reentry);
    if let [only] = parents.iter().copied().collect::<Vec<_>>().as_slice() {
        if graph.is_gateway_of(*only, GatewayKind::Exclusive, GatewayRole::Merge) {
            return Ok(*only);
        }
    }
    graph.insert_before(reentry, gateway(GatewayKind::Exclusive, GatewayRole::Merge))
}

/// Chain the missing members as one branch beside the present ones:
/// a parallel split in front of the re-entry point and a parallel merge
/// after the exit point. Returns the chained task nodes.
fn attach_absent(
    candidate: &mut Candidate,
    present: &[NodeId],
    absent: &[&str],
) -> ProcessResult<Option<Vec<NodeId>>> {
    let members: BTreeSet<NodeId> = present.iter().copied().collect();
    let graph = candidate.graph();
    let exit = exit_candidates(graph, &members).into_iter().find(|c| {
        graph
            .element(*c)
            .map(|e| !e.is_split() && !e.is_gateway_of(GatewayKind::Parallel, GatewayRole::Merge))
            .unwrap_or(false)
    });
    let reentry = reentry_candidates(graph, &members)
        .into_iter()
        .find(|h| !graph.is_gateway_of(*h, GatewayKind::Parallel, GatewayRole::Merge));
    let (Some(exit), Some(reentry)) = (exit, reentry) else {
        return Ok(None);
    };

    let graph = candidate.graph_mut();
    let ps = graph.insert_before(reentry, gateway(GatewayKind::Parallel, GatewayRole::Split))?;
    let pm = graph.insert_after(exit, gateway(GatewayKind::Parallel, GatewayRole::Merge))?;
    let mut previous = ps;
    let mut chain = Vec::with_capacity(absent.len());
    for name in absent {
        let task = graph.add_task(*name);
        graph.link(previous, task)?;
        chain.push(task);
        previous = task;
    }
    graph.link(previous, pm)?;
    candidate.pair(ps, pm);

    tracing::debug!(
        members = ?absent,
        "Missing loop members chained in parallel with the loop body"
    );
    Ok(Some(chain))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{build_dependency_graph, reduce, to_control_flow};
    use process_simulator::{simulate, SimulationConfig};

    fn candidate_for(set: &ConstraintSet) -> Candidate {
        let mut dg = build_dependency_graph(set).unwrap();
        reduce(&mut dg).unwrap();
        Candidate::new(to_control_flow(&dg).unwrap())
    }

    #[test]
    fn test_sequence_is_closed_into_loop() {
        let set = ConstraintSet::new().precedence("A", "B").looped(["A", "B"]);
        let mut candidate = candidate_for(&set);
        let outcome = splice_loops(&mut candidate, &set).unwrap();
        assert_eq!(outcome.spliced, 1);
        assert!(outcome.diagnostics.is_empty());

        let graph = candidate.graph();
        let a = graph.find_task("A").unwrap();
        let b = graph.find_task("B").unwrap();
        assert!(graph.can_reach(b, a));
        assert!(candidate.cfg.validate().is_ok());
        assert!(simulate(&candidate.cfg, &SimulationConfig::default()).unwrap().is_sound());
    }

    #[test]
    fn test_existing_cycle_left_alone() {
        let set = ConstraintSet::new()
            .precedence("A", "B")
            .precedence("B", "A")
            .looped(["A", "B"]);
        let mut candidate = candidate_for(&set);
        let before = candidate.graph().len();
        let outcome = splice_loops(&mut candidate, &set).unwrap();
        assert_eq!(outcome.spliced, 0);
        assert_eq!(candidate.graph().len(), before);
    }

    #[test]
    fn test_missing_member_runs_beside_loop_body() {
        let set = ConstraintSet::new()
            .precedence("A", "B")
            .looped(["B", "C"]);
        let mut candidate = candidate_for(&set);
        let outcome = splice_loops(&mut candidate, &set).unwrap();
        assert_eq!(outcome.spliced, 1);

        let graph = candidate.graph();
        let b = graph.find_task("B").unwrap();
        let c = graph.find_task("C").unwrap();
        assert!(graph.can_reach(b, c) && graph.can_reach(c, b));
        assert_eq!(candidate.pairs().len(), 1);
        assert!(candidate.cfg.validate().is_ok());
    }

    #[test]
    fn test_loop_across_exclusive_branches_is_partial() {
        let set = ConstraintSet::new()
            .precedence("A", "B")
            .precedence("A", "C")
            .choice("B", "C")
            .looped(["B", "C"]);
        let mut candidate = candidate_for(&set);
        let outcome = splice_loops(&mut candidate, &set).unwrap();
        assert_eq!(outcome.spliced, 1);
        assert_eq!(outcome.diagnostics.len(), 1);
        assert_eq!(outcome.diagnostics[0].activities, vec!["B", "C"]);
        assert!(outcome.diagnostics[0].reason.contains("separately"));

        let graph = candidate.graph();
        let b = graph.find_task("B").unwrap();
        let c = graph.find_task("C").unwrap();
        assert!(graph.is_on_cycle(b));
        assert!(graph.is_on_cycle(c));
        assert!(!graph.can_reach(b, c) && !graph.can_reach(c, b));
        assert!(simulate(&candidate.cfg, &SimulationConfig::default()).unwrap().is_sound());
    }

    #[test]
    fn test_branches_with_own_ends_are_joined_into_one_loop() {
        let set = ConstraintSet::new()
            .precedence("A", "B")
            .precedence("A", "C")
            .looped(["B", "C"]);
        let mut candidate = candidate_for(&set);
        assert_eq!(candidate.cfg.end_nodes().len(), 2);
        let outcome = splice_loops(&mut candidate, &set).unwrap();
        assert_eq!(outcome.spliced, 1);
        assert!(outcome.diagnostics.is_empty());

        let graph = candidate.graph();
        let a = graph.find_task("A").unwrap();
        let b = graph.find_task("B").unwrap();
        let c = graph.find_task("C").unwrap();
        assert!(graph.can_reach(b, c) && graph.can_reach(c, b));
        assert!(!graph.can_reach(b, a));
        assert_eq!(candidate.cfg.end_nodes().len(), 1);
        assert!(candidate.cfg.validate().is_ok());
        assert!(simulate(&candidate.cfg, &SimulationConfig::default()).unwrap().is_sound());
    }

    #[test]
    fn test_joined_ends_after_parallel_split_use_parallel_merge() {
        let mut g = Graph::new();
        let start = g.add_start();
        let a = g.add_task("A");
        let ps = g.add_gateway(GatewayKind::Parallel, GatewayRole::Split);
        let b = g.add_task("B");
        let c = g.add_task("C");
        let end_b = g.add_end();
        let end_c = g.add_end();
        for (x, y) in [(start, a), (a, ps), (ps, b), (ps, c), (b, end_b), (c, end_c)] {
            g.link(x, y).unwrap();
        }
        let mut candidate = Candidate::new(process_types::ControlFlowGraph::from_parts(g, start).unwrap());
        let set = ConstraintSet::new()
            .precedence("A", "B")
            .precedence("A", "C")
            .looped(["B", "C"]);
        let outcome = splice_loops(&mut candidate, &set).unwrap();
        assert_eq!(outcome.spliced, 1);

        let join = candidate.paired_merge(ps).unwrap();
        let graph = candidate.graph();
        assert!(graph.is_gateway_of(join, GatewayKind::Parallel, GatewayRole::Merge));
        assert!(graph.has_edge(b, join) && graph.has_edge(c, join));
        assert!(graph.can_reach(join, ps));
        assert!(simulate(&candidate.cfg, &SimulationConfig::default()).unwrap().is_sound());
    }

    #[test]
    fn test_unreachable_loop_is_dropped() {
        // Every member is missing, so there is nothing to attach to.
        let set = ConstraintSet::new().activity("A").looped(["X", "Y"]);
        let mut candidate = candidate_for(&ConstraintSet::new().activity("A"));
        let outcome = splice_loops(&mut candidate, &set).unwrap();
        assert_eq!(outcome.spliced, 0);
        assert_eq!(outcome.diagnostics.len(), 1);
    }

    #[test]
    fn test_fragments_group_related_members() {
        let set = ConstraintSet::new()
            .precedence("A", "B")
            .precedence("A", "C")
            .precedence("C", "D");
        let candidate = candidate_for(&set);
        let graph = candidate.graph();
        let ids: Vec<NodeId> = ["B", "C", "D"].iter().map(|n| graph.find_task(n).unwrap()).collect();
        let groups = fragments(graph, &ids);
        assert_eq!(groups.len(), 2);
        assert!(groups.iter().any(|g| g.len() == 2));
    }
}
