//! Dependency builder: precedence pairs → dependency graph

use process_types::{
    ConstraintSet, DependencyGraph, Graph, NodeId, Precedence, ProcessError, ProcessResult, Walk,
};
use std::collections::BTreeSet;

/// Fold the constraint set into a dependency graph.
///
/// Precedence pairs are attached one at a time to the growing graph. A pass
/// that attaches nothing means the remaining pairs are disconnected from
/// what has been built. Activities with no precedence become isolated
/// initial nodes.
pub fn build_dependency_graph(constraints: &ConstraintSet) -> ProcessResult<DependencyGraph> {
    constraints.validate()?;
    let mut dg = DependencyGraph::new();

    let mut pending: Vec<&Precedence> = constraints.precedences.iter().collect();
    while !pending.is_empty() {
        let before = pending.len();
        let mut remaining = Vec::new();
        for p in pending {
            let known_before = dg.contains_activity(&p.before);
            let known_after = dg.contains_activity(&p.after);
            if known_before || known_after || dg.graph().is_empty() {
                dg.add_activity(&p.before);
                dg.add_activity(&p.after);
                dg.add_precedence(&p.before, &p.after)?;
            } else {
                remaining.push(p);
            }
        }
        if remaining.len() == before {
            return Err(ProcessError::DisconnectedConstraints {
                pending: remaining
                    .iter()
                    .map(|p| (p.before.clone(), p.after.clone()))
                    .collect(),
            });
        }
        pending = remaining;
    }

    for name in constraints.all_activities() {
        if dg.contains_activity(&name) {
            continue;
        }
        // Loop splicing places it alongside the members already present.
        let joins_loop = constraints.loops_containing(&name).any(|l| {
            l.activities
                .iter()
                .any(|m| m != &name && dg.contains_activity(m))
        });
        if !joins_loop {
            dg.add_activity(&name);
        }
    }

    check_declared_cycles(&dg, constraints)?;
    dg.recompute_initial_nodes(&constraints.loops);

    tracing::info!(
        activities = dg.activities().len(),
        edges = dg.graph().edge_count(),
        initial = dg.initial_nodes().len(),
        "Dependency graph built"
    );
    Ok(dg)
}

/// Every cycle must lie inside a declared loop
fn check_declared_cycles(dg: &DependencyGraph, constraints: &ConstraintSet) -> ProcessResult<()> {
    let graph = dg.graph();
    for (from, to) in graph.edges() {
        if !graph.can_reach(to, from) {
            continue;
        }
        let (Some(a), Some(b)) = (activity(graph, from), activity(graph, to)) else {
            continue;
        };
        let declared = constraints
            .loops
            .iter()
            .any(|l| l.contains(&a) && l.contains(&b));
        if !declared {
            let ahead = Walk::forward(graph).reachable(to);
            let back = Walk::backward(graph).reachable(from);
            let activities: BTreeSet<String> = ahead
                .intersection(&back)
                .filter_map(|n| activity(graph, *n))
                .collect();
            return Err(ProcessError::UndeclaredCycle {
                activities: activities.into_iter().collect(),
            });
        }
    }
    Ok(())
}

fn activity(graph: &Graph, id: NodeId) -> Option<String> {
    graph
        .element(id)
        .and_then(|e| e.activity_name())
        .map(str::to_string)
}
