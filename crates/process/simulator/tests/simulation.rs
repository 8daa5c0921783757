//! Integration tests: simulator verdicts on hand-built gateway graphs.

use process_simulator::{
    simulate, DependencySemantics, ExecutionSemantics, SimulationConfig, Simulator, Verdict,
};
use process_types::{ControlFlowGraph, GatewayKind, GatewayRole, Graph, NodeId};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

fn init_tracing() {
    let _ = tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "process_simulator=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_test_writer().without_time())
        .try_init();
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

/// start → A → xmerge → A (the self-loop as synthesis renders it)
fn self_loop() -> ControlFlowGraph {
    let mut g = Graph::new();
    let start = g.add_start();
    let xm = g.add_gateway(GatewayKind::Exclusive, GatewayRole::Merge);
    let a = g.add_task("A");
    g.link(start, xm).unwrap();
    g.link(xm, a).unwrap();
    g.link(a, xm).unwrap();
    ControlFlowGraph::from_parts(g, start).unwrap()
}

/// start → xsplit → {A, B} → and-merge → end: one branch can never satisfy the merge
fn mismatched_gateways() -> (ControlFlowGraph, NodeId) {
    let mut g = Graph::new();
    let start = g.add_start();
    let xs = g.add_gateway(GatewayKind::Exclusive, GatewayRole::Split);
    let a = g.add_task("A");
    let b = g.add_task("B");
    let pm = g.add_gateway(GatewayKind::Parallel, GatewayRole::Merge);
    let end = g.add_end();
    g.link(start, xs).unwrap();
    g.link(xs, a).unwrap();
    g.link(xs, b).unwrap();
    g.link(a, pm).unwrap();
    g.link(b, pm).unwrap();
    g.link(pm, end).unwrap();
    (ControlFlowGraph::from_parts(g, start).unwrap(), pm)
}

/// A parallel region nested inside an exclusive loop
fn parallel_inside_loop() -> ControlFlowGraph {
    let mut g = Graph::new();
    let start = g.add_start();
    let xm = g.add_gateway(GatewayKind::Exclusive, GatewayRole::Merge);
    let ps = g.add_gateway(GatewayKind::Parallel, GatewayRole::Split);
    let a = g.add_task("A");
    let b = g.add_task("B");
    let pm = g.add_gateway(GatewayKind::Parallel, GatewayRole::Merge);
    let xs = g.add_gateway(GatewayKind::Exclusive, GatewayRole::Split);
    let end = g.add_end();
    g.link(start, xm).unwrap();
    g.link(xm, ps).unwrap();
    g.link(ps, a).unwrap();
    g.link(ps, b).unwrap();
    g.link(a, pm).unwrap();
    g.link(b, pm).unwrap();
    g.link(pm, xs).unwrap();
    g.link(xs, xm).unwrap();
    g.link(xs, end).unwrap();
    ControlFlowGraph::from_parts(g, start).unwrap()
}

/// start → xm → ps → {xm, pm}; pm also waits on X, which never runs.
/// Every lap leaves one more token on pm, so no ledger ever repeats.
fn growing_loop() -> (ControlFlowGraph, NodeId) {
    let mut g = Graph::new();
    let start = g.add_start();
    let xm = g.add_gateway(GatewayKind::Exclusive, GatewayRole::Merge);
    let ps = g.add_gateway(GatewayKind::Parallel, GatewayRole::Split);
    let x = g.add_task("X");
    let pm = g.add_gateway(GatewayKind::Parallel, GatewayRole::Merge);
    let end = g.add_end();
    g.link(start, xm).unwrap();
    g.link(xm, ps).unwrap();
    g.link(ps, xm).unwrap();
    g.link(ps, pm).unwrap();
    g.link(x, pm).unwrap();
    g.link(pm, end).unwrap();
    (ControlFlowGraph::from_parts(g, start).unwrap(), xm)
}

// ---------------------------------------------------------------------------
// Verdicts
// ---------------------------------------------------------------------------

#[test]
fn test_self_loop_reports_livelock_not_deadlock() {
    init_tracing();
    let cfg = self_loop();
    let report = simulate(&cfg, &SimulationConfig::default()).unwrap();
    assert!(report.verdict.is_livelock(), "got {:?}", report.verdict);
    assert!(!report.verdict.trace().is_empty());
}

#[test]
fn test_repetition_bound_alone_reports_livelock() {
    init_tracing();
    let (cfg, xm) = growing_loop();
    let report = simulate(&cfg, &SimulationConfig::default()).unwrap();
    match &report.verdict {
        Verdict::Livelock { node, trace } => {
            assert_eq!(*node, xm);
            // Entry ledger plus five rounds: xm receives in rounds 1, 3 and 5.
            assert_eq!(trace.len(), 6);
        }
        other => panic!("expected livelock, got {:?}", other),
    }
    assert_eq!(report.branches_finalized, 0);

    let config = SimulationConfig::default().with_repetition_bound(4);
    let report = simulate(&cfg, &config).unwrap();
    assert_eq!(report.verdict.trace().len(), 8);
}

#[test]
fn test_mismatched_merge_reports_deadlock() {
    init_tracing();
    let (cfg, pm) = mismatched_gateways();
    let report = simulate(&cfg, &SimulationConfig::default()).unwrap();
    match &report.verdict {
        Verdict::Deadlock { stranded, .. } => assert_eq!(stranded, &vec![pm]),
        other => panic!("expected deadlock, got {:?}", other),
    }
    assert!(report.verdict.describe(cfg.graph()).contains("and-merge"));
}

#[test]
fn test_parallel_region_inside_loop_is_sound() {
    init_tracing();
    let cfg = parallel_inside_loop();
    let report = simulate(&cfg, &SimulationConfig::default()).unwrap();
    assert!(report.is_sound(), "got {:?}", report.verdict);
    assert!(report.branches_finalized >= 2);
}

#[test]
fn test_lower_repetition_bound_turns_loop_into_livelock() {
    init_tracing();
    let cfg = parallel_inside_loop();
    let config = SimulationConfig::default().with_repetition_bound(2);
    let report = simulate(&cfg, &config).unwrap();
    assert!(report.verdict.is_livelock(), "got {:?}", report.verdict);
}

// ---------------------------------------------------------------------------
// Determinism
// ---------------------------------------------------------------------------

#[test]
fn test_verdict_and_trace_are_deterministic() {
    init_tracing();
    for cfg in [self_loop(), mismatched_gateways().0, parallel_inside_loop()] {
        let first = simulate(&cfg, &SimulationConfig::default()).unwrap();
        let second = simulate(&cfg, &SimulationConfig::default()).unwrap();
        assert_eq!(first, second);
    }
}

#[test]
fn test_copied_graph_gets_same_verdict() {
    let (cfg, _) = mismatched_gateways();
    let (copy, _) = cfg.compact();
    let original = simulate(&cfg, &SimulationConfig::default()).unwrap();
    let copied = simulate(&copy, &SimulationConfig::default()).unwrap();
    assert_eq!(original.verdict.is_deadlock(), copied.verdict.is_deadlock());
    assert_eq!(original.verdict.trace().len(), copied.verdict.trace().len());
}

// ---------------------------------------------------------------------------
// Dependency semantics
// ---------------------------------------------------------------------------

#[test]
fn test_dependency_semantics_uses_every_initial_node() {
    let mut g = Graph::new();
    let a = g.add_task("A");
    let b = g.add_task("B");
    let c = g.add_task("C");
    g.link(a, c).unwrap();
    g.link(b, c).unwrap();

    let semantics = DependencySemantics::new([a, b].into_iter().collect());
    assert_eq!(semantics.entries(&g).unwrap(), vec![a, b]);

    let report = Simulator::new(&g, semantics, SimulationConfig::default())
        .run()
        .unwrap();
    assert!(report.is_sound());
    assert_eq!(report.branches_finalized, 2);
}
