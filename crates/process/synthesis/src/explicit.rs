//! Control-flow construction: make implicit fan-out and fan-in explicit

use process_types::{
    ControlFlowGraph, DependencyGraph, ElementKind, GatewayKind, GatewayRole, Graph, NodeId,
    ProcessResult,
};

/// Wrap a reduced dependency graph in start and end events, then insert
/// exclusive gateways wherever a node fans out or fans in.
pub fn to_control_flow(dg: &DependencyGraph) -> ProcessResult<ControlFlowGraph> {
    let mut graph = dg.graph().clone();
    let sinks: Vec<NodeId> = graph.sinks().into_iter().collect();

    let start = graph.add_start();
    for initial in dg.initial_nodes() {
        graph.link(start, *initial)?;
    }
    for sink in sinks {
        let end = graph.add_end();
        graph.link(sink, end)?;
    }

    let (splits, merges) = make_gateways_explicit(&mut graph)?;
    tracing::info!(
        nodes = graph.len(),
        splits,
        merges,
        "Control-flow graph constructed"
    );
    ControlFlowGraph::from_parts(graph, start)
}

/// Insert an exclusive split after every node with several children that is
/// not already a split, and an exclusive merge before every node with
/// several parents that is not already a merge. Returns how many of each
/// were inserted.
pub fn make_gateways_explicit(graph: &mut Graph) -> ProcessResult<(usize, usize)> {
    let fan_out: Vec<NodeId> = graph
        .node_ids()
        .filter(|id| {
            graph.children(*id).len() > 1
                && !graph.element(*id).map(|e| e.is_split()).unwrap_or(false)
        })
        .collect();
    for node in &fan_out {
        graph.insert_after(*node, gateway(GatewayKind::Exclusive, GatewayRole::Split))?;
    }

    let fan_in: Vec<NodeId> = graph
        .node_ids()
        .filter(|id| {
            graph.parents(*id).len() > 1
                && !graph.element(*id).map(|e| e.is_merge()).unwrap_or(false)
        })
        .collect();
    for node in &fan_in {
        graph.insert_before(*node, gateway(GatewayKind::Exclusive, GatewayRole::Merge))?;
    }

    Ok((fan_out.len(), fan_in.len()))
}

pub(crate) fn gateway(kind: GatewayKind, role: GatewayRole) -> ElementKind {
    ElementKind::Gateway { kind, role }
}
