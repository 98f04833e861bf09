//! Convergence of independently repaired replicas.

use cograph_core::{Replicated, ReplicaId};
use cograph_graph::{
    AcyclicGraph, DirectedRootedGraph, EdgeDirection, NodeId, Position, RepairConfig,
    ReplicatedGraph, UndirectedRootedGraph, ROOT_ID,
};
use proptest::prelude::*;

/// Exchanges encoded deltas between every ordered pair of replicas.
fn sync_all<G: ReplicatedGraph>(replicas: &mut [G]) {
    for _ in 0..2 {
        for i in 0..replicas.len() {
            for j in 0..replicas.len() {
                if i == j {
                    continue;
                }
                let since = replicas[j].state_vector();
                let bytes = replicas[i].encode_update(&since).unwrap();
                replicas[j].apply_encoded(&bytes).unwrap();
            }
        }
    }
}

fn repair_all<G: ReplicatedGraph>(replicas: &mut [G], config: &RepairConfig) {
    for replica in replicas.iter_mut() {
        replica.repair(config).unwrap();
        assert!(!replica.needs_repair());
    }
}

#[derive(Debug, Clone)]
enum DagOp {
    AddNode(u8),
    AddEdge(u8, u8),
    RemoveEdge(u8, u8),
    RemoveNode(u8),
    Merge(usize),
}

fn dag_op() -> impl Strategy<Value = DagOp> {
    prop_oneof![
        (0u8..6).prop_map(DagOp::AddNode),
        (0u8..6, 0u8..6).prop_map(|(a, b)| DagOp::AddEdge(a, b)),
        (0u8..6, 0u8..6).prop_map(|(a, b)| DagOp::RemoveEdge(a, b)),
        (0u8..6).prop_map(DagOp::RemoveNode),
        (0usize..3).prop_map(DagOp::Merge),
    ]
}

fn node(n: u8) -> NodeId {
    NodeId::new(format!("n{n}"))
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn acyclic_replicas_converge(
        script in prop::collection::vec((0usize..3, dag_op()), 0..60),
        optimized in any::<bool>(),
    ) {
        let config = RepairConfig {
            cycle_strategy: if optimized {
                cograph_graph::CycleStrategy::Optimized
            } else {
                cograph_graph::CycleStrategy::NotOptimized
            },
            ..Default::default()
        };
        let mut replicas: Vec<AcyclicGraph> =
            (1..=3).map(|r| AcyclicGraph::new(ReplicaId(r))).collect();

        for (at, op) in script {
            match op {
                DagOp::AddNode(n) => {
                    replicas[at].add_node(node(n), "", Position::default());
                }
                DagOp::AddEdge(a, b) => {
                    replicas[at].add_edge(node(a), node(b), "");
                }
                DagOp::RemoveEdge(a, b) => {
                    replicas[at].remove_edge(node(a), node(b));
                }
                DagOp::RemoveNode(n) => {
                    replicas[at].remove_node(node(n));
                }
                DagOp::Merge(from) => {
                    if from != at {
                        let source = replicas[from].clone();
                        replicas[at].merge_from(&source);
                        replicas[at].repair(&config).unwrap();
                    }
                }
            }
            prop_assert!(replicas[at].is_acyclic());
        }

        sync_all(&mut replicas);
        repair_all(&mut replicas, &config);
        for replica in &replicas {
            prop_assert!(replica.is_acyclic());
            prop_assert!(replica.dangling_edges().is_empty());
            prop_assert!(replica.converged_with(&replicas[0]));
        }
    }
}

/// Three chains from the root into a shared `final` node; replica `i`
/// removes chain `i`.
#[test]
fn three_replicas_removing_three_chains_keep_one() {
    let mut base = DirectedRootedGraph::new(ReplicaId(1));
    for chain in ["a", "b", "c"] {
        let first = format!("{chain}0");
        let second = format!("{chain}1");
        assert!(base.add_node_with_edge(
            first.as_str(),
            EdgeDirection::FromExisting,
            ROOT_ID,
            "",
            Position::default(),
            "",
        ));
        assert!(base.add_node_with_edge(
            second.as_str(),
            EdgeDirection::FromExisting,
            first.as_str(),
            "",
            Position::default(),
            "",
        ));
        if base.has_node(&"final".into()) {
            assert!(base.add_edge(second, "final", ""));
        } else {
            assert!(base.add_node_with_edge(
                "final",
                EdgeDirection::FromExisting,
                second,
                "",
                Position::default(),
                "",
            ));
        }
    }

    let mut replicas = vec![base];
    for r in 2..=3 {
        let mut replica = DirectedRootedGraph::new(ReplicaId(r));
        replica.merge_from(&replicas[0]);
        replicas.push(replica);
    }

    for (replica, chain) in replicas.iter_mut().zip(["a", "b", "c"]) {
        assert!(replica.remove_edge(ROOT_ID, format!("{chain}0")));
        assert!(replica.remove_edge(format!("{chain}0"), format!("{chain}1")));
        assert!(replica.remove_edge(format!("{chain}1"), "final"));
        assert!(replica.is_connected());
    }

    sync_all(&mut replicas);
    assert_eq!(replicas[0].components().len(), 2);
    repair_all(&mut replicas, &RepairConfig::default());

    // The breadth-first search visits the root's neighbours in id order.
    let expected: Vec<NodeId> = ["a0", "a1", "final", ROOT_ID].map(NodeId::new).to_vec();
    for replica in &replicas {
        assert_eq!(replica.node_ids(), expected);
        assert!(replica.converged_with(&replicas[0]));
    }
}

#[test]
fn repaired_replicas_stay_converged_after_another_round() {
    let mut base = UndirectedRootedGraph::new(ReplicaId(1));
    base.add_node_with_edge("x", EdgeDirection::FromExisting, ROOT_ID, "", Position::default(), "");
    base.add_node_with_edge("y", EdgeDirection::FromExisting, "x", "", Position::default(), "");
    let mut other = UndirectedRootedGraph::new(ReplicaId(2));
    other.merge_from(&base);

    // Concurrently: base drops leaf y, other hangs z off y.
    assert!(base.remove_edge("x", "y"));
    assert!(other.add_node_with_edge(
        "z",
        EdgeDirection::FromExisting,
        "y",
        "",
        Position::default(),
        "",
    ));

    let mut replicas = vec![base, other];
    sync_all(&mut replicas);
    repair_all(&mut replicas, &RepairConfig::default());
    sync_all(&mut replicas);

    for replica in &replicas {
        assert!(!replica.needs_repair());
        assert_eq!(replica.node_count(), 4);
        assert!(replica.converged_with(&replicas[0]));
    }
}
