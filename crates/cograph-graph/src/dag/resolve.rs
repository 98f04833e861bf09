//! Merge-time cycle resolution for [`AcyclicGraph`].
//!
//! `Clean -> (merge) -> MaybeInvalid -> Repaired`:
//!
//! 1. Erase dangling edges, then drop edge-log entries for edges that are not
//!    present and collapse duplicate entries for the same edge (the latest
//!    entry is kept).
//! 2. If the graph is acyclic, stop.
//! 3. Enumerate every elementary cycle ([`super::cycles`]) over node indices
//!    taken in sorted id order, and map each cycle to its edges.
//! 4. Remove edges until no cycle is left, choosing each edge with the
//!    configured [`CycleStrategy`].
//!
//! Every step depends only on the merged state, so replicas that merged the
//! same updates remove the same edges.

use std::collections::{BTreeSet, HashMap};
use std::time::Instant;

use cograph_core::{Stamp, VectorClock};
use indexmap::IndexMap;
use tracing::{debug, info};

use super::cycles::elementary_cycles;
use super::AcyclicGraph;
use crate::config::{CycleStrategy, RepairConfig};
use crate::edge::{AdjKey, EdgeKey};
use crate::error::GraphError;
use crate::id::NodeId;
use crate::report::RepairReport;

/// Position and clock of each logged edge, in log order.
pub type EdgeOrder = IndexMap<EdgeKey, VectorClock>;

impl AcyclicGraph {
    /// Restores acyclicity after a merge.
    pub fn make_graph_valid(&mut self, config: &RepairConfig) -> Result<RepairReport, GraphError> {
        let started = Instant::now();
        let mut report = RepairReport {
            dangling_found: self.erase_dangling(),
            duplicates_pruned: self.prune_edge_log(),
            ..Default::default()
        };

        if !self.is_acyclic() {
            let cycles = self.cycle_edges();
            report.cycles_found = cycles.len();

            let order = self.edge_order();
            if let Some(edge) = cycles.iter().flatten().find(|e| !order.contains_key(*e)) {
                return Err(GraphError::MissingEdgeLogEntry { edge: edge.clone() });
            }

            let removals = match config.cycle_strategy {
                CycleStrategy::Optimized => break_cycles_optimized(cycles, &order),
                CycleStrategy::NotOptimized => break_cycles_by_log_order(cycles, &order),
            };
            for edge in removals {
                debug!(edge = %edge, "removing edge to break cycle");
                self.remove_edge(edge.source.clone(), edge.target.clone());
                report.removed_edges.push(edge);
            }
            report.resolution_steps = report.removed_edges.len();

            if !self.is_acyclic() {
                return Err(GraphError::InvariantViolation {
                    reason: "graph still cyclic after cycle resolution".into(),
                });
            }
        }

        #[cfg(debug_assertions)]
        self.assert_consistency();

        report.elapsed = started.elapsed();
        if report.changed() || report.dangling_found > 0 {
            info!(
                replica = %self.replica_id(),
                cycles = report.cycles_found,
                removed = report.resolution_steps,
                dangling = report.dangling_found,
                pruned = report.duplicates_pruned,
                "acyclic graph repaired"
            );
        }
        Ok(report)
    }

    /// Erases every dangling edge along with its edge-log entries.
    fn erase_dangling(&mut self) -> usize {
        let dangling: Vec<AdjKey> = self
            .store
            .visible_entries()
            .filter(|(k, _)| !self.store.is_live(&k.neighbor))
            .map(|(k, _)| k.clone())
            .collect();
        for key in &dangling {
            debug!(edge = %key.edge(), "erasing dangling edge");
            self.store.erase_entry(key);
            self.drop_log_entries(&key.edge());
        }
        dangling.len()
    }

    /// Drops log entries for absent edges and all but the latest entry of
    /// every present edge.
    fn prune_edge_log(&mut self) -> usize {
        let present: BTreeSet<EdgeKey> = self.edges().into_iter().collect();
        let mut latest: HashMap<&EdgeKey, Stamp> = HashMap::new();
        let mut stale = Vec::new();
        for (position, entry) in self.store.log.iter() {
            if !present.contains(&entry.edge) {
                stale.push(*position);
            } else if let Some(previous) = latest.insert(&entry.edge, *position) {
                stale.push(previous);
            }
        }
        for position in &stale {
            self.store.remove_log(position);
        }
        stale.len()
    }

    /// Edge log as an ordered map from edge to clock. Assumes the log has
    /// been pruned so each edge appears once.
    fn edge_order(&self) -> EdgeOrder {
        self.store
            .log
            .values()
            .map(|entry| (entry.edge.clone(), entry.clock.clone()))
            .collect()
    }

    /// Every elementary cycle, as its edges.
    fn cycle_edges(&self) -> Vec<Vec<EdgeKey>> {
        let ids: Vec<NodeId> = self.node_ids();
        let index: HashMap<&NodeId, usize> =
            ids.iter().enumerate().map(|(i, id)| (id, i)).collect();
        let mut successors = vec![Vec::new(); ids.len()];
        for edge in self.edges() {
            if let (Some(&a), Some(&b)) = (index.get(&edge.source), index.get(&edge.target)) {
                successors[a].push(b);
            }
        }

        elementary_cycles(&successors)
            .into_iter()
            .map(|cycle| {
                (0..cycle.len())
                    .map(|i| {
                        let next = cycle[(i + 1) % cycle.len()];
                        EdgeKey::new(ids[cycle[i]].clone(), ids[next].clone())
                    })
                    .collect()
            })
            .collect()
    }
}

/// Returns `true` if edge `a` sorts after edge `b`: causally later first,
/// then member of more unresolved cycles, then later in the log.
fn sorts_after(a: (&VectorClock, usize, usize), b: (&VectorClock, usize, usize)) -> bool {
    if b.0.less(a.0) {
        return true;
    }
    if a.0.less(b.0) {
        return false;
    }
    (a.1, a.2) > (b.1, b.2)
}

/// Removes, one at a time, the contributing edge that sorts last under
/// [`sorts_after`], until every cycle is broken. Returns the removed edges
/// in removal order.
pub fn break_cycles_optimized(mut cycles: Vec<Vec<EdgeKey>>, order: &EdgeOrder) -> Vec<EdgeKey> {
    let mut removed = Vec::new();
    while !cycles.is_empty() {
        let mut membership: HashMap<&EdgeKey, usize> = HashMap::new();
        for edge in cycles.iter().flatten() {
            *membership.entry(edge).or_insert(0) += 1;
        }

        let mut best: Option<(&EdgeKey, &VectorClock, usize, usize)> = None;
        for (index, (edge, clock)) in order.iter().enumerate() {
            let Some(&count) = membership.get(edge) else {
                continue;
            };
            best = match best {
                Some(current)
                    if !sorts_after((clock, count, index), (current.1, current.2, current.3)) =>
                {
                    Some(current)
                }
                _ => Some((edge, clock, count, index)),
            };
        }

        let Some(edge) = best.map(|b| b.0.clone()) else {
            break;
        };
        cycles.retain(|cycle| !cycle.contains(&edge));
        removed.push(edge);
    }
    removed
}

/// Removes, one at a time, the contributing edge with the latest edge-log
/// position, until every cycle is broken.
pub fn break_cycles_by_log_order(mut cycles: Vec<Vec<EdgeKey>>, order: &EdgeOrder) -> Vec<EdgeKey> {
    let mut removed = Vec::new();
    while !cycles.is_empty() {
        let latest = order
            .keys()
            .rev()
            .find(|edge| cycles.iter().any(|cycle| cycle.contains(edge)))
            .cloned();
        let Some(edge) = latest else {
            break;
        };
        cycles.retain(|cycle| !cycle.contains(&edge));
        removed.push(edge);
    }
    removed
}
