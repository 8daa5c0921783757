//! Pseudo-transitive reduction of dependency graphs
//!
//! Acyclic graphs get the standard transitive reduction. Cyclic graphs are
//! first cut open: each cycle-closing edge is redirected to a dummy
//! placeholder, the acyclic skeleton is reduced, then every placeholder's
//! parents are linked back to the real target. Loop edges survive intact.

use process_types::{DependencyGraph, Graph, NodeId, ProcessResult, TaskTag};

/// Counters from one reduction
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ReductionStats {
    pub removed_edges: usize,
    pub severed_cycles: usize,
}

/// Remove redundant edges, keeping every cycle-closing edge
pub fn reduce(dg: &mut DependencyGraph) -> ProcessResult<ReductionStats> {
    let roots: Vec<NodeId> = dg.initial_nodes().iter().copied().collect();
    let graph = dg.graph_mut();

    // (placeholder, real target)
    let mut severed: Vec<(NodeId, NodeId)> = Vec::new();
    while let Some((from, to)) = graph.find_back_edge(&roots) {
        graph.unlink(from, to);
        let name = format!("{}'", graph.label(to));
        let placeholder = graph.add_placeholder(name, TaskTag::Dummy);
        graph.link(from, placeholder)?;
        severed.push((placeholder, to));
    }

    let removed_edges = transitive_reduction(graph)?;

    for (placeholder, target) in severed.iter().rev() {
        let parents: Vec<NodeId> = graph.parents(*placeholder).iter().copied().collect();
        for parent in parents {
            graph.link(parent, *target)?;
        }
        graph.remove(*placeholder)?;
    }

    let stats = ReductionStats {
        removed_edges,
        severed_cycles: severed.len(),
    };
    tracing::info!(
        removed = stats.removed_edges,
        cycles = stats.severed_cycles,
        "Dependency graph reduced"
    );
    Ok(stats)
}

/// Standard transitive reduction; the graph must be acyclic
fn transitive_reduction(graph: &mut Graph) -> ProcessResult<usize> {
    debug_assert!(graph.is_acyclic());
    let mut redundant = Vec::new();
    for node in graph.node_ids() {
        let children = graph.children(node);
        for target in children {
            let bypassed = children
                .iter()
                .any(|other| other != target && graph.can_reach(*other, *target));
            if bypassed {
                redundant.push((node, *target));
            }
        }
    }
    for (from, to) in &redundant {
        tracing::debug!(from = %graph.label(*from), to = %graph.label(*to), "Redundant edge removed");
        graph.unlink(*from, *to);
    }
    Ok(redundant.len())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::build_dependency_graph;
    use process_types::ConstraintSet;

    #[test]
    fn test_shortcut_removed() {
        let set = ConstraintSet::new()
            .precedence("A", "B")
            .precedence("B", "C")
            .precedence("A", "C");
        let mut dg = build_dependency_graph(&set).unwrap();
        let stats = reduce(&mut dg).unwrap();
        assert_eq!(stats.removed_edges, 1);
        assert!(!dg.edges_by_name().contains(&("A".into(), "C".into())));
    }

    #[test]
    fn test_reduction_is_idempotent() {
        let set = ConstraintSet::new()
            .precedence("A", "B")
            .precedence("A", "C")
            .precedence("B", "D")
            .precedence("C", "D")
            .precedence("A", "D");
        let mut dg = build_dependency_graph(&set).unwrap();
        reduce(&mut dg).unwrap();
        let once = dg.edges_by_name();
        let stats = reduce(&mut dg).unwrap();
        assert_eq!(stats.removed_edges, 0);
        assert_eq!(dg.edges_by_name(), once);
    }

    #[test]
    fn test_loop_edge_survives() {
        let set = ConstraintSet::new()
            .precedence("A", "B")
            .precedence("B", "C")
            .precedence("C", "A")
            .precedence("A", "C")
            .looped(["A", "B", "C"]);
        let mut dg = build_dependency_graph(&set).unwrap();
        let stats = reduce(&mut dg).unwrap();
        assert_eq!(stats.severed_cycles, 1);
        let edges = dg.edges_by_name();
        assert!(edges.contains(&("C".into(), "A".into())));
        assert!(!edges.contains(&("A".into(), "C".into())));
        assert!(dg.graph().check_consistency().is_ok());
        assert_eq!(dg.graph().len(), 3);
    }

    #[test]
    fn test_self_loop_survives() {
        let set = ConstraintSet::new().precedence("A", "A").looped(["A"]);
        let mut dg = build_dependency_graph(&set).unwrap();
        reduce(&mut dg).unwrap();
        let a = dg.node_for("A").unwrap();
        assert!(dg.graph().has_edge(a, a));
    }
}
