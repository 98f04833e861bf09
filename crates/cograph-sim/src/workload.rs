//! Random local edits.
//!
//! Edits are drawn from a seeded [`ChaCha8Rng`], so a seed fully determines
//! a run. Many drawn edits are refused by the graph's local guard (an edge
//! that would close a cycle, a removal that would disconnect the graph);
//! refusals are counted, not retried.

use cograph_graph::rooted::Orientation;
use cograph_graph::{
    AcyclicGraph, EdgeDirection, FixedRootGraph, NodeId, Position, ReplicatedGraph,
};
use rand::seq::SliceRandom;
use rand::Rng;
use rand_chacha::ChaCha8Rng;
use serde::Serialize;

/// A graph that can apply one random local edit.
pub trait RandomEdits {
    /// Applies one random edit. `fresh` is an id no replica has used yet.
    /// Returns `false` if the graph refused the edit.
    fn random_edit(&mut self, rng: &mut ChaCha8Rng, fresh: NodeId) -> bool;
}

fn pick(rng: &mut ChaCha8Rng, ids: &[NodeId]) -> Option<NodeId> {
    ids.choose(rng).cloned()
}

fn position(rng: &mut ChaCha8Rng) -> Position {
    Position::new(rng.gen_range(0.0..100.0), rng.gen_range(0.0..100.0))
}

fn direction(rng: &mut ChaCha8Rng) -> EdgeDirection {
    if rng.gen_bool(0.5) {
        EdgeDirection::FromExisting
    } else {
        EdgeDirection::ToExisting
    }
}

impl RandomEdits for AcyclicGraph {
    fn random_edit(&mut self, rng: &mut ChaCha8Rng, fresh: NodeId) -> bool {
        let ids = self.node_ids();
        let (Some(a), Some(b)) = (pick(rng, &ids), pick(rng, &ids)) else {
            let at = position(rng);
            return self.add_node(fresh, "", at);
        };
        match rng.gen_range(0..10) {
            0 | 1 => {
                let at = position(rng);
                self.add_node(fresh, "", at)
            }
            2 | 3 => {
                let (dir, at) = (direction(rng), position(rng));
                self.add_node_with_edge(fresh, dir, a, "", at, "")
            }
            4..=6 => self.add_edge(a, b, ""),
            7 => {
                let edges = self.edges();
                match edges.choose(rng) {
                    Some(edge) => self.remove_edge(edge.source.clone(), edge.target.clone()),
                    None => false,
                }
            }
            8 => self.remove_node(a),
            _ => self.set_node_label(&a, format!("label-{}", rng.gen_range(0..100))),
        }
    }
}

impl<O: Orientation> RandomEdits for FixedRootGraph<O> {
    fn random_edit(&mut self, rng: &mut ChaCha8Rng, fresh: NodeId) -> bool {
        let ids = self.node_ids();
        let (Some(a), Some(b)) = (pick(rng, &ids), pick(rng, &ids)) else {
            return false;
        };
        match rng.gen_range(0..10) {
            0..=3 => {
                let (dir, at) = (direction(rng), position(rng));
                self.add_node_with_edge(fresh, dir, a, "", at, "")
            }
            4 | 5 => self.add_edge(a, b, ""),
            6..=8 => {
                let edges = self.edges();
                match edges.choose(rng) {
                    Some(edge) => self.remove_edge(edge.source.clone(), edge.target.clone()),
                    None => false,
                }
            }
            _ => {
                let at = position(rng);
                self.set_node_position(&a, at)
            }
        }
    }
}

#[derive(Debug, Clone, Copy, Default, Serialize)]
pub struct WorkloadStats {
    pub applied: usize,
    pub refused: usize,
}

/// Spreads `ops` random edits over `replicas`, choosing the replica for
/// each edit at random. Fresh node ids are `n{counter}`, continuing from
/// `next_id`, which is advanced past every id handed out.
pub fn run_workload<G: ReplicatedGraph + RandomEdits>(
    replicas: &mut [G],
    ops: usize,
    next_id: &mut usize,
    rng: &mut ChaCha8Rng,
) -> WorkloadStats {
    let mut stats = WorkloadStats::default();
    if replicas.is_empty() {
        return stats;
    }
    for _ in 0..ops {
        let at = rng.gen_range(0..replicas.len());
        let fresh = NodeId::new(format!("n{next_id}"));
        *next_id += 1;
        if replicas[at].random_edit(rng, fresh) {
            stats.applied += 1;
        } else {
            stats.refused += 1;
        }
    }
    stats
}

#[cfg(test)]
mod tests {
    use super::*;
    use cograph_core::ReplicaId;
    use cograph_graph::DirectedRootedGraph;
    use rand::SeedableRng;

    #[test]
    fn local_edits_never_break_local_invariants() {
        let mut rng = ChaCha8Rng::seed_from_u64(11);
        let mut next_id = 0;
        let mut dags = vec![AcyclicGraph::new(ReplicaId(1)), AcyclicGraph::new(ReplicaId(2))];
        let mut rooted = vec![DirectedRootedGraph::new(ReplicaId(1))];

        let dag_stats = run_workload(&mut dags, 300, &mut next_id, &mut rng);
        let rooted_stats = run_workload(&mut rooted, 300, &mut next_id, &mut rng);

        assert_eq!(dag_stats.applied + dag_stats.refused, 300);
        assert!(rooted_stats.applied > 0);
        assert_eq!(next_id, 600);
        for dag in &dags {
            assert!(dag.is_acyclic());
            assert!(!dag.needs_repair());
        }
        assert!(rooted[0].is_connected());
        assert!(rooted[0].is_consistent());
    }

    #[test]
    fn same_seed_same_workload() {
        let run = |seed| {
            let mut rng = ChaCha8Rng::seed_from_u64(seed);
            let mut replicas = vec![AcyclicGraph::new(ReplicaId(1))];
            run_workload(&mut replicas, 100, &mut 0, &mut rng);
            replicas[0].edges()
        };
        assert_eq!(run(5), run(5));
    }
}
