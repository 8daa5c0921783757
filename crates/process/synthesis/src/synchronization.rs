//! Flow synchronization
//!
//! When several nodes all feed the same group of children, and those
//! children share exactly that parent set, the many-to-many crossing is
//! routed through one synthetic synchronization task. Afterwards every
//! node with several parents maps onto a single merge gateway.

use process_types::{DependencyGraph, Graph, NodeId, ProcessResult, TaskTag};
use std::collections::BTreeSet;

/// Insert synchronization tasks until no synchronizable group is left.
/// Returns the number of tasks inserted.
pub fn synchronize_flows(dg: &mut DependencyGraph) -> ProcessResult<usize> {
    let graph = dg.graph_mut();
    let mut inserted = 0;
    while let Some((parents, children)) = next_group(graph) {
        let sync = graph.add_placeholder("sync", TaskTag::Synchronization);
        for parent in &parents {
            for child in &children {
                graph.unlink(*parent, *child);
            }
            graph.link(*parent, sync)?;
        }
        for child in &children {
            graph.link(sync, *child)?;
        }
        tracing::debug!(
            parents = parents.len(),
            children = children.len(),
            "Synchronization task inserted"
        );
        inserted += 1;
    }
    Ok(inserted)
}

/// The first (parents, children) crossing with at least two on each side
fn next_group(graph: &Graph) -> Option<(BTreeSet<NodeId>, BTreeSet<NodeId>)> {
    for node in graph.node_ids() {
        let parents = graph.parents(node);
        if parents.len() < 2 {
            continue;
        }
        let children: BTreeSet<NodeId> = graph
            .node_ids()
            .filter(|other| graph.parents(*other) == parents)
            .collect();
        if children.len() >= 2 {
            return Some((parents.clone(), children));
        }
    }
    None
}
