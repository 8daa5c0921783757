//! Property tests: arbitrary sequences of graph mutations keep adjacency
//! consistent, and copies and traversals agree with each other.

use process_types::{CopyMode, GatewayKind, GatewayRole, Graph, NodeId, TaskTag, Walk};
use proptest::prelude::*;
use std::collections::BTreeSet;

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

#[derive(Clone, Debug)]
enum Op {
    Link(usize, usize),
    Unlink(usize, usize),
    Remove(usize),
    Cut(usize),
}

fn arb_op(n: usize) -> impl Strategy<Value = Op> {
    prop_oneof![
        4 => (0..n, 0..n).prop_map(|(a, b)| Op::Link(a, b)),
        1 => (0..n, 0..n).prop_map(|(a, b)| Op::Unlink(a, b)),
        1 => (0..n).prop_map(Op::Remove),
        1 => (0..n).prop_map(Op::Cut),
    ]
}

fn build(n: usize, ops: &[Op]) -> Graph {
    let mut g = Graph::new();
    for i in 0..n {
        g.add_task(format!("T{}", i));
    }
    for op in ops {
        match *op {
            Op::Link(a, b) => {
                let _ = g.link(NodeId(a), NodeId(b));
            }
            Op::Unlink(a, b) => {
                g.unlink(NodeId(a), NodeId(b));
            }
            Op::Remove(a) => {
                let _ = g.remove(NodeId(a));
            }
            Op::Cut(a) => {
                g.cut(NodeId(a));
            }
        }
    }
    g
}

/// A random DAG over `n` tasks with edges only from lower to higher index
fn arb_dag() -> impl Strategy<Value = (usize, Vec<(usize, usize)>)> {
    (2usize..10).prop_flat_map(|n| {
        let edges = prop::collection::vec((0..n, 0..n), 0..(n * 2))
            .prop_map(|pairs| {
                pairs
                    .into_iter()
                    .filter(|(a, b)| a < b)
                    .collect::<Vec<_>>()
            });
        (Just(n), edges)
    })
}

// ---------------------------------------------------------------------------
// Property Tests
// ---------------------------------------------------------------------------

proptest! {
    /// Adjacency stays mutually consistent under any mutation sequence.
    #[test]
    fn mutations_keep_adjacency_consistent(
        ops in prop::collection::vec(arb_op(8), 0..60),
    ) {
        let g = build(8, &ops);
        prop_assert!(g.check_consistency().is_ok());
    }

    /// A weak copy from a root contains exactly the nodes reachable from it,
    /// with the same edges among them.
    #[test]
    fn weak_copy_matches_reachable_set(
        ops in prop::collection::vec(arb_op(8), 0..60),
    ) {
        let g = build(8, &ops);
        let Some(root) = g.node_ids().next() else {
            return Ok(());
        };
        let reachable = Walk::forward(&g).reachable(root);
        let (copy, map) = g.structural_copy(&[root], CopyMode::Weak);

        prop_assert_eq!(copy.len(), reachable.len());
        prop_assert!(copy.check_consistency().is_ok());
        for (a, b) in g.edges() {
            if reachable.contains(&a) {
                prop_assert!(copy.has_edge(map[&a], map[&b]));
            }
        }
        prop_assert_eq!(copy.edge_count(), g.edges().iter().filter(|(a, _)| reachable.contains(a)).count());
    }

    /// Cycle detection agrees with reachability: a node is on a cycle exactly
    /// when one of its children reaches it.
    #[test]
    fn cycle_detection_agrees_with_reachability(
        ops in prop::collection::vec(arb_op(6), 0..40),
    ) {
        let g = build(6, &ops);
        for id in g.node_ids() {
            let expected = g.children(id).iter().any(|c| g.can_reach(*c, id));
            prop_assert_eq!(g.is_on_cycle(id), expected);
        }
        prop_assert_eq!(g.is_acyclic(), g.node_ids().all(|id| !g.is_on_cycle(id)));
    }

    /// Enumerated paths from a DAG root are loop-free walks along real edges.
    #[test]
    fn paths_follow_edges((n, edges) in arb_dag()) {
        let mut g = Graph::new();
        for i in 0..n {
            g.add_task(format!("T{}", i));
        }
        for (a, b) in &edges {
            g.link(NodeId(*a), NodeId(*b)).unwrap();
        }
        let paths = g.paths_from(NodeId(0), &BTreeSet::new(), 512);
        for path in &paths.paths {
            prop_assert_eq!(path.nodes[0], NodeId(0));
            for w in path.nodes.windows(2) {
                prop_assert!(g.has_edge(w[0], w[1]));
            }
            let unique: BTreeSet<_> = path.nodes.iter().collect();
            prop_assert_eq!(unique.len(), path.nodes.len());
        }
    }

    /// Cleanup never drops a declared activity and never breaks adjacency.
    #[test]
    fn cleanup_keeps_activities((n, edges) in arb_dag()) {
        let mut g = Graph::new();
        let start = g.add_start();
        let tasks: Vec<NodeId> = (0..n).map(|i| g.add_task(format!("T{}", i))).collect();
        g.link(start, tasks[0]).unwrap();
        for (a, b) in &edges {
            let gate = g.add_gateway(GatewayKind::Exclusive, GatewayRole::Split);
            let sync = g.add_placeholder("sync", TaskTag::Synchronization);
            g.link(tasks[*a], gate).unwrap();
            g.link(gate, sync).unwrap();
            g.link(sync, tasks[*b]).unwrap();
        }
        process_types::cleanup(&mut g).unwrap();
        prop_assert!(g.check_consistency().is_ok());
        for t in &tasks {
            prop_assert!(g.contains(*t));
        }
        for (a, b) in &edges {
            prop_assert!(g.can_reach(tasks[*a], tasks[*b]));
        }
    }
}
