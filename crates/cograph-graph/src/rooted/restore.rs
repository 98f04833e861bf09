//! Restoration primitives and candidate-path construction for the
//! connectivity resolver.

use std::collections::{BTreeMap, BTreeSet, HashMap};

use cograph_core::{Stamp, VectorClock};
use indexmap::IndexMap;
use tracing::debug;

use super::{DanglingEdge, FixedRootGraph, Orientation};
use crate::edge::EdgeKey;
use crate::id::NodeId;
use crate::node::NodeRecord;
use crate::paths::{LinkPath, RestorablePath, TombstoneLink};
use crate::tombstone::{RemovedEdgeWithNode, RemovedGraphElement};

/// Snapshot of the tombstone log taken for one path-search round.
#[derive(Debug, Clone)]
pub(crate) struct TombstoneIndex {
    /// Tombstones in log order; a tombstone's index here is its log index.
    pub entries: Vec<(Stamp, RemovedGraphElement)>,
    pub links: Vec<TombstoneLink>,
    /// Most recent tombstone able to restore each removed node.
    pub node_sources: BTreeMap<NodeId, usize>,
    pub dangling: Vec<DanglingEdge>,
}

/// What a path restoration wrote.
#[derive(Debug, Default)]
pub(crate) struct PathRestoration {
    pub consumed: usize,
    pub edges: Vec<EdgeKey>,
    pub nodes: Vec<NodeId>,
}

impl<O: Orientation> FixedRootGraph<O> {
    /// Writes whichever entries of `edge` are missing. An entry already
    /// present keeps its label and the missing side copies it.
    pub(crate) fn restore_edge(&mut self, edge: &EdgeKey, label: &str) -> bool {
        if !self.store.is_live(&edge.source) || !self.store.is_live(&edge.target) {
            return false;
        }
        let sides = O::sides(edge);
        let label = sides
            .iter()
            .find_map(|side| self.store.entry(side).map(|e| e.label.clone()))
            .unwrap_or_else(|| label.to_string());
        let mut wrote = false;
        for side in sides {
            if self.store.entry(&side).is_none() {
                wrote |= self.store.write_entry(side, label.clone());
            }
        }
        wrote
    }

    /// Recreates the node recorded in `tombstone`.
    ///
    /// The node's incarnation is the tombstone's log position, so every
    /// replica restoring the same tombstone writes the same record. Dangling
    /// edges pointing at the node are re-attached first, then every bundled
    /// edge whose other endpoint is live. The tombstone is consumed only if
    /// its own edge came back; otherwise it stays in the log as the record
    /// of that link. Returns the edges written.
    pub(crate) fn restore_node(
        &mut self,
        position: Stamp,
        tombstone: &RemovedEdgeWithNode,
        dangling: &mut Vec<DanglingEdge>,
    ) -> Vec<EdgeKey> {
        let record = NodeRecord {
            label: tombstone.node_label.clone(),
            position: tombstone.node_position,
            incarnation: position,
        };
        self.store.insert_record(tombstone.node.clone(), record);

        let mut written = Vec::new();
        let (attached, remaining): (Vec<DanglingEdge>, Vec<DanglingEdge>) = dangling
            .drain(..)
            .partition(|d| d.missing == tombstone.node);
        *dangling = remaining;
        for d in attached {
            if self.restore_edge(&d.edge, &d.label) {
                written.push(d.edge);
            }
        }
        for (edge, label) in tombstone.bundled_edges(O::key) {
            if self.restore_edge(&edge, label) {
                written.push(edge);
            }
        }
        let consumed = self.has_edge_key(&tombstone.edge) && self.store.remove_log(&position);
        debug!(
            node = %tombstone.node,
            edges = written.len(),
            consumed,
            "restored node from tombstone"
        );
        written
    }

    /// Components a removed node would join if restored: those of its
    /// bundled neighbours and of the owners of dangling edges pointing at it.
    pub(crate) fn attachments(
        &self,
        tombstone: &RemovedEdgeWithNode,
        dangling: &[DanglingEdge],
        lookup: &HashMap<&NodeId, usize>,
    ) -> BTreeSet<usize> {
        let bundled = tombstone.bundled_edges(O::key);
        bundled
            .iter()
            .filter_map(|(edge, _)| edge.opposite(&tombstone.node))
            .filter(|n| **n != tombstone.node)
            .chain(
                dangling
                    .iter()
                    .filter(|d| d.missing == tombstone.node)
                    .map(|d| &d.key.owner),
            )
            .filter_map(|n| lookup.get(n).copied())
            .collect()
    }

    /// Builds the restorable-link view of the tombstone log.
    pub(crate) fn tombstone_index(&self, dangling: &[DanglingEdge]) -> TombstoneIndex {
        let entries: Vec<(Stamp, RemovedGraphElement)> = self
            .store
            .log
            .iter()
            .map(|(position, t)| (*position, t.clone()))
            .collect();

        let mut links: IndexMap<EdgeKey, TombstoneLink> = IndexMap::new();
        let mut node_sources = BTreeMap::new();
        let mut add = |edge: EdgeKey, label: &str, source: Option<usize>, dangling: bool| {
            let link = links.entry(edge.clone()).or_insert_with(|| TombstoneLink {
                edge,
                label: label.to_string(),
                sources: BTreeSet::new(),
                dangling: false,
            });
            link.sources.extend(source);
            link.dangling |= dangling;
        };

        for (i, (_, tombstone)) in entries.iter().enumerate() {
            add(tombstone.edge().clone(), tombstone.label(), Some(i), false);
            if let RemovedGraphElement::EdgeWithNode(t) = tombstone {
                node_sources.insert(t.node.clone(), i);
                for (edge, label) in t.bundled_edges(O::key) {
                    add(edge, label, Some(i), false);
                }
            }
        }
        for d in dangling {
            add(d.edge.clone(), &d.label, None, true);
        }

        TombstoneIndex {
            entries,
            links: links.into_values().collect(),
            node_sources,
            dangling: dangling.to_vec(),
        }
    }

    /// Scores a link path found by the search.
    pub(crate) fn restorable(
        &self,
        path: LinkPath,
        index: &TombstoneIndex,
        lookup: &HashMap<&NodeId, usize>,
    ) -> RestorablePath {
        let consumed: Vec<BTreeSet<usize>> = path
            .links
            .iter()
            .map(|&l| index.links[l].sources.clone())
            .collect();
        let node_sources: BTreeSet<usize> = path
            .interior()
            .iter()
            .filter_map(|n| index.node_sources.get(n).copied())
            .collect();

        let mut components: BTreeSet<usize> = [path.first(), path.last()]
            .into_iter()
            .flatten()
            .filter_map(|n| lookup.get(n).copied())
            .collect();
        for &i in &node_sources {
            if let RemovedGraphElement::EdgeWithNode(t) = &index.entries[i].1 {
                components.extend(self.attachments(t, &index.dangling, lookup));
            }
        }

        let mut restorable = RestorablePath {
            path,
            consumed,
            node_sources,
            clocks: Vec::new(),
            components,
        };
        restorable.clocks = restorable
            .tombstones()
            .into_iter()
            .map(|i| index.entries[i].1.clock().clone())
            .collect();
        if restorable.consumed.iter().any(BTreeSet::is_empty) {
            restorable.clocks.push(VectorClock::new());
        }
        restorable
    }

    /// Restores every interior node of `path`, then every link along it,
    /// then drops the consumed tombstones that are now fully restored.
    pub(crate) fn restore_path(
        &mut self,
        path: &RestorablePath,
        index: &TombstoneIndex,
        dangling: &mut Vec<DanglingEdge>,
    ) -> PathRestoration {
        let mut restoration = PathRestoration::default();

        for node in path.path.interior() {
            let Some(&i) = index.node_sources.get(node) else {
                continue;
            };
            let (position, RemovedGraphElement::EdgeWithNode(t)) = &index.entries[i] else {
                continue;
            };
            if self.store.is_live(node) {
                continue;
            }
            restoration.edges.extend(self.restore_node(*position, t, dangling));
            restoration.nodes.push(node.clone());
            restoration.consumed += 1;
        }

        for &l in &path.path.links {
            let link = &index.links[l];
            if self.restore_edge(&link.edge, &link.label) {
                restoration.edges.push(link.edge.clone());
            }
            if link.dangling {
                dangling.retain(|d| d.edge != link.edge);
            }
        }

        // Node sources kept by `restore_node` go too once their edge is back.
        for i in path.tombstones() {
            let (position, tombstone) = &index.entries[i];
            if self.store.log.get(position).is_none() || !self.is_restored(tombstone) {
                continue;
            }
            self.store.remove_log(position);
            if !path.node_sources.contains(&i) {
                restoration.consumed += 1;
            }
        }
        restoration
    }
}
