//! Merge-time connectivity repair for [`FixedRootGraph`].
//!
//! `Clean -> (merge) -> MaybeInvalid -> Repaired`:
//!
//! 1. Bring adjacency mirrors back into agreement and drop tombstones that
//!    are duplicates or describe elements already present.
//! 2. Restore single tombstones, newest first, whenever one reconnects two
//!    components on its own: a plain edge between two components, or a
//!    removed node whose neighbours span at least two components.
//! 3. While components remain, pick a restorable path under the configured
//!    [`PathPolicy`] and restore every node and link along it.
//! 4. Delete whatever still dangles. The directed variant records each such
//!    deletion as a fresh tombstone carrying the clock observed at merge
//!    time.
//!
//! Every decision depends only on merged state, so replicas that merged the
//! same updates perform the same restorations.

use std::collections::{BTreeSet, HashMap};
use std::time::Instant;

use cograph_core::{Stamp, VectorClock};
use tracing::{debug, info, warn};

use super::restore::TombstoneIndex;
use super::{DanglingEdge, FixedRootGraph, Orientation};
use crate::config::{PathPolicy, RepairConfig};
use crate::edge::EdgeKey;
use crate::error::GraphError;
use crate::id::NodeId;
use crate::paths::{
    component_lookup, find_all_paths, merge_components, select_causal, select_cheapest,
    virtual_graph_path, Component, RestorablePath,
};
use crate::report::RepairReport;
use crate::tombstone::{RemovedEdge, RemovedGraphElement};

impl<O: Orientation> FixedRootGraph<O> {
    /// Restores connectivity after a merge.
    ///
    /// Fails with [`GraphError::Unrepairable`] if components remain and no
    /// tombstone path joins any two of them, and with
    /// [`GraphError::InvariantViolation`] if the repaired graph still has
    /// dangling edges, disagreeing mirrors or more than one component.
    pub fn make_graph_weakly_connected(
        &mut self,
        config: &RepairConfig,
    ) -> Result<RepairReport, GraphError> {
        let started = Instant::now();
        let merge_clock = self.store.clock();
        let mut report = RepairReport {
            mirrors_repaired: self.sync_mirrors(),
            ..Default::default()
        };

        let mut dangling = self.dangling_edges();
        report.dangling_found = dangling.len();
        report.duplicates_pruned = self.prune_tombstones();

        let mut components = self.components();
        report.components_found = components.len();
        if components.len() == 1 && dangling.is_empty() {
            return Ok(self.finish(report, started));
        }

        while components.len() > 1 {
            let Some((edges, nodes)) = self.restore_single(&components, &mut dangling) else {
                break;
            };
            report.restored_elements += 1;
            components = joined(&components, &edges, nodes);
        }

        while components.len() > 1 {
            let index = self.tombstone_index(&dangling);
            let Some(path) = self.choose_path(&components, &index, config) else {
                return Err(GraphError::Unrepairable {
                    components: components.len(),
                });
            };
            debug!(
                nodes = ?path.path.nodes,
                tombstones = path.tombstones().len(),
                "restoring tombstone path"
            );
            let restoration = self.restore_path(&path, &index, &mut dangling);
            if restoration.edges.is_empty() {
                return Err(GraphError::Unrepairable {
                    components: components.len(),
                });
            }
            report.restored_elements += restoration.consumed;
            components = joined(&components, &restoration.edges, restoration.nodes);
        }

        report.removed_edges = self.delete_dangling(&merge_clock);
        report.duplicates_pruned += self.prune_tombstones();
        self.verify()?;
        Ok(self.finish(report, started))
    }

    fn finish(&self, mut report: RepairReport, started: Instant) -> RepairReport {
        #[cfg(debug_assertions)]
        self.assert_consistency();

        report.elapsed = started.elapsed();
        if report.changed() || report.components_found > 1 {
            info!(
                replica = %self.replica_id(),
                components = report.components_found,
                dangling = report.dangling_found,
                restored = report.restored_elements,
                removed = report.removed_edges.len(),
                mirrors = report.mirrors_repaired,
                pruned = report.duplicates_pruned,
                "fixed-root graph repaired"
            );
        }
        report
    }

    // -----------------------------------------------------------------------
    // Consistency passes
    // -----------------------------------------------------------------------

    /// Writes missing mirror entries of edges between live nodes. When both
    /// entries exist with different labels, the source side's label wins.
    fn sync_mirrors(&mut self) -> usize {
        let edges: BTreeSet<EdgeKey> = self
            .store
            .visible_entries()
            .filter(|(k, _)| self.store.is_live(&k.neighbor))
            .map(|(k, _)| k.edge())
            .collect();

        let mut written = 0;
        for edge in edges {
            let [source, target] = O::sides(&edge);
            let fix = match (self.store.entry(&source), self.store.entry(&target)) {
                (Some(s), None) => Some((target, s.label.clone())),
                (None, Some(t)) => Some((source, t.label.clone())),
                (Some(s), Some(t)) if s.label != t.label => Some((target, s.label.clone())),
                _ => None,
            };
            if let Some((key, label)) = fix {
                debug!(edge = %edge, "repairing adjacency mirror");
                if self.store.write_entry(key, label) {
                    written += 1;
                }
            }
        }
        written
    }

    /// Drops tombstones whose elements are all present, then collapses
    /// duplicates of the same removal onto the most recent one.
    fn prune_tombstones(&mut self) -> usize {
        let mut latest: HashMap<(EdgeKey, Option<NodeId>), Stamp> = HashMap::new();
        let mut stale = Vec::new();
        for (position, tombstone) in self.store.log.iter() {
            if self.is_restored(tombstone) {
                stale.push(*position);
            } else if let Some(previous) = latest.insert(tombstone.identity(), *position) {
                stale.push(previous);
            }
        }
        for position in &stale {
            self.store.remove_log(position);
        }
        stale.len()
    }

    /// Erases every remaining dangling entry in edge order. The directed
    /// variant records each erased edge as a tombstone stamped with the
    /// merge-time clock.
    fn delete_dangling(&mut self, merge_clock: &VectorClock) -> Vec<EdgeKey> {
        let mut remaining = self.dangling_edges();
        remaining.sort_by(|a, b| a.edge.cmp(&b.edge));

        let mut removed = Vec::new();
        for DanglingEdge { key, edge, label, .. } in remaining {
            debug!(edge = %edge, "erasing dangling edge");
            self.store.erase_entry(&key);
            if O::DIRECTED {
                self.store.push_log(RemovedGraphElement::Edge(RemovedEdge {
                    edge: edge.clone(),
                    label,
                    clock: merge_clock.clone(),
                }));
            }
            removed.push(edge);
        }
        removed
    }

    fn verify(&self) -> Result<(), GraphError> {
        let violation = if !self.dangling_edges().is_empty() {
            Some("dangling edges remain")
        } else if !self.mirrors_consistent() {
            Some("adjacency mirrors disagree")
        } else if !self.is_connected() {
            Some("graph is still disconnected")
        } else {
            None
        };
        match violation {
            Some(reason) => Err(GraphError::InvariantViolation {
                reason: reason.into(),
            }),
            None => Ok(()),
        }
    }

    // -----------------------------------------------------------------------
    // Restoration
    // -----------------------------------------------------------------------

    /// Restores the most recent tombstone that joins two components on its
    /// own. Returns the edges written and the nodes restored.
    fn restore_single(
        &mut self,
        components: &[Component],
        dangling: &mut Vec<DanglingEdge>,
    ) -> Option<(Vec<EdgeKey>, Vec<NodeId>)> {
        let lookup = component_lookup(components);
        let candidates: Vec<(Stamp, RemovedGraphElement)> = self
            .store
            .log
            .iter()
            .rev()
            .map(|(position, t)| (*position, t.clone()))
            .collect();

        for (position, tombstone) in candidates {
            match tombstone {
                RemovedGraphElement::Edge(t) => {
                    let ends = (lookup.get(&t.edge.source), lookup.get(&t.edge.target));
                    let (Some(a), Some(b)) = ends else {
                        continue;
                    };
                    if a == b {
                        continue;
                    }
                    debug!(edge = %t.edge, "restoring removed edge");
                    self.restore_edge(&t.edge, &t.label);
                    self.store.remove_log(&position);
                    return Some((vec![t.edge], Vec::new()));
                }
                RemovedGraphElement::EdgeWithNode(t) if self.store.is_live(&t.node) => {
                    let Some(other) = t.edge.opposite(&t.node) else {
                        continue;
                    };
                    let (Some(a), Some(b)) = (lookup.get(&t.node), lookup.get(other)) else {
                        continue;
                    };
                    if a == b {
                        continue;
                    }
                    debug!(edge = %t.edge, "restoring edge of a re-added node");
                    self.restore_edge(&t.edge, &t.label);
                    self.store.remove_log(&position);
                    return Some((vec![t.edge], Vec::new()));
                }
                RemovedGraphElement::EdgeWithNode(t) => {
                    if self.attachments(&t, dangling, &lookup).len() < 2 {
                        continue;
                    }
                    let edges = self.restore_node(position, &t, dangling);
                    return Some((edges, vec![t.node]));
                }
            }
        }
        None
    }

    /// Picks the next path to restore, or `None` if no tombstone path joins
    /// two components.
    fn choose_path(
        &self,
        components: &[Component],
        index: &TombstoneIndex,
        config: &RepairConfig,
    ) -> Option<RestorablePath> {
        let can_pass =
            |n: &NodeId| !self.store.is_live(n) && index.node_sources.contains_key(n);
        let lookup = component_lookup(components);
        let log_len = index.entries.len();

        let mut policy = config.path_policy;
        if policy != PathPolicy::VirtualGraph && log_len > config.max_enumerated_tombstones {
            warn!(
                tombstones = log_len,
                limit = config.max_enumerated_tombstones,
                "tombstone log too large for exhaustive path search, using virtual graph"
            );
            policy = PathPolicy::VirtualGraph;
        }

        match policy {
            PathPolicy::VirtualGraph => (0..components.len())
                .find_map(|start| virtual_graph_path(&index.links, components, start, &can_pass))
                .map(|path| self.restorable(path, index, &lookup)),
            PathPolicy::CheapestPath | PathPolicy::CausalPath => {
                let candidates: Vec<RestorablePath> = find_all_paths(&index.links, &can_pass)
                    .into_iter()
                    .filter(|path| {
                        let ends = (
                            path.first().and_then(|n| lookup.get(n)),
                            path.last().and_then(|n| lookup.get(n)),
                        );
                        matches!(ends, (Some(a), Some(b)) if a != b)
                    })
                    .map(|path| self.restorable(path, index, &lookup))
                    .collect();
                if policy == PathPolicy::CheapestPath {
                    select_cheapest(candidates, log_len)
                } else {
                    select_causal(candidates, log_len)
                }
            }
        }
    }
}

/// Components after a restoration wrote `edges` and brought back `nodes`.
fn joined(components: &[Component], edges: &[EdgeKey], nodes: Vec<NodeId>) -> Vec<Component> {
    let lookup = component_lookup(components);
    let touched: BTreeSet<usize> = edges
        .iter()
        .flat_map(|e| [&e.source, &e.target])
        .filter_map(|n| lookup.get(n).copied())
        .collect();
    merge_components(components, &touched, nodes)
}
