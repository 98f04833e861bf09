//! Replicated directed acyclic graph.
//!
//! Local edits keep a single replica acyclic: [`AcyclicGraph::add_edge`]
//! refuses any edge whose target already reaches its source. Concurrent
//! edits can still close a cycle once merged, so after every merge
//! [`AcyclicGraph::make_graph_valid`] enumerates the cycles of the merged
//! graph and removes edges until none remain (see [`resolve`]).
//!
//! Each successful `add_edge` also appends an [`EdgeLogEntry`] to a
//! replicated edge log. The log gives every edge a causal clock and a
//! position that all replicas agree on; the cycle resolver breaks ties with
//! them.

pub mod cycles;
pub mod resolve;

use std::collections::HashMap;

use cograph_core::{CoreError, Replicated, ReplicaId, Stamp, VectorClock};
use petgraph::algo::{has_path_connecting, is_cyclic_directed};
use petgraph::graph::{DiGraph, NodeIndex};
use serde::{Deserialize, Serialize};

use crate::config::RepairConfig;
use crate::edge::{AdjKey, EdgeDirection, EdgeKey, Side};
use crate::error::GraphError;
use crate::graph::{GraphUpdate, ReplicatedGraph};
use crate::id::NodeId;
use crate::node::{NodeRecord, Position};
use crate::report::RepairReport;
use crate::store::GraphStore;

/// One entry of the edge log.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EdgeLogEntry {
    pub edge: EdgeKey,
    /// Clock of the replica that added the edge, at the time it was added.
    pub clock: VectorClock,
}

#[derive(Debug, Clone)]
pub struct AcyclicGraph {
    store: GraphStore<EdgeLogEntry>,
}

impl AcyclicGraph {
    pub fn new(replica: ReplicaId) -> Self {
        AcyclicGraph {
            store: GraphStore::new(replica),
        }
    }

    // -----------------------------------------------------------------------
    // Local edits
    // -----------------------------------------------------------------------

    /// Adds an unconnected node. Refused if `id` is already live.
    pub fn add_node(
        &mut self,
        id: impl Into<NodeId>,
        label: impl Into<String>,
        position: Position,
    ) -> bool {
        let id = id.into();
        if self.store.is_live(&id) {
            return false;
        }
        self.store.insert_node(id, label.into(), position)
    }

    /// Adds `id` together with one edge to or from `existing`.
    ///
    /// Refused if `existing` is not live or `id` already is. A fresh node has
    /// no other edges, so the new edge can never close a cycle.
    pub fn add_node_with_edge(
        &mut self,
        id: impl Into<NodeId>,
        direction: EdgeDirection,
        existing: impl Into<NodeId>,
        node_label: impl Into<String>,
        position: Position,
        edge_label: impl Into<String>,
    ) -> bool {
        let (id, existing) = (id.into(), existing.into());
        if !self.store.is_live(&existing) || self.store.is_live(&id) || id == existing {
            return false;
        }
        self.store.insert_node(id.clone(), node_label.into(), position);
        let edge = match direction {
            EdgeDirection::FromExisting => EdgeKey::new(existing, id),
            EdgeDirection::ToExisting => EdgeKey::new(id, existing),
        };
        self.commit_edge(edge, edge_label.into());
        true
    }

    /// Adds `source -> target`.
    ///
    /// Refused for self-loops, missing endpoints, an edge that is already
    /// present, and any edge whose target already reaches its source.
    pub fn add_edge(
        &mut self,
        source: impl Into<NodeId>,
        target: impl Into<NodeId>,
        label: impl Into<String>,
    ) -> bool {
        let edge = EdgeKey::new(source, target);
        if edge.is_self_loop()
            || !self.store.is_live(&edge.source)
            || !self.store.is_live(&edge.target)
            || self.has_edge(&edge.source, &edge.target)
            || self.reaches(&edge.target, &edge.source)
        {
            return false;
        }
        self.commit_edge(edge, label.into());
        true
    }

    fn commit_edge(&mut self, edge: EdgeKey, label: String) {
        let key = AdjKey::new(edge.source.clone(), edge.target.clone(), Side::Out);
        self.store.write_entry(key, label);
        let clock = self.store.clock();
        self.store.push_log(EdgeLogEntry { edge, clock });
    }

    /// Removes `source -> target` and its edge-log entries. Removal cannot
    /// create a cycle, so it is only refused if the edge does not exist.
    pub fn remove_edge(&mut self, source: impl Into<NodeId>, target: impl Into<NodeId>) -> bool {
        let edge = EdgeKey::new(source, target);
        let key = AdjKey::new(edge.source.clone(), edge.target.clone(), Side::Out);
        if !self.store.erase_entry(&key) {
            return false;
        }
        self.drop_log_entries(&edge);
        true
    }

    /// Removes a node, every edge leaving it, every edge entering it, and
    /// the edge-log entries of all of those edges.
    pub fn remove_node(&mut self, id: impl Into<NodeId>) -> bool {
        let id = id.into();
        if !self.store.is_live(&id) {
            return false;
        }
        let incoming: Vec<AdjKey> = self
            .store
            .visible_entries()
            .filter(|(k, _)| k.neighbor == id && k.owner != id)
            .map(|(k, _)| k.clone())
            .collect();
        let outgoing: Vec<AdjKey> = self.store.entries_of(&id).map(|(k, _)| k.clone()).collect();

        for key in &incoming {
            self.store.erase_entry(key);
        }
        for key in incoming.iter().chain(&outgoing) {
            self.drop_log_entries(&key.edge());
        }
        self.store.erase_node(&id)
    }

    pub fn set_node_label(&mut self, id: &NodeId, label: impl Into<String>) -> bool {
        let label = label.into();
        self.store.update_node(id, |r| r.label = label)
    }

    pub fn set_node_position(&mut self, id: &NodeId, position: Position) -> bool {
        self.store.update_node(id, |r| r.position = position)
    }

    /// Drops every edge-log entry recorded for `edge`.
    fn drop_log_entries(&mut self, edge: &EdgeKey) -> usize {
        let positions: Vec<Stamp> = self
            .store
            .log
            .iter()
            .filter(|(_, entry)| &entry.edge == edge)
            .map(|(position, _)| *position)
            .collect();
        for position in &positions {
            self.store.remove_log(position);
        }
        positions.len()
    }

    // -----------------------------------------------------------------------
    // Queries
    // -----------------------------------------------------------------------

    pub fn replica_id(&self) -> ReplicaId {
        self.store.replica.id()
    }

    pub fn has_node(&self, id: &NodeId) -> bool {
        self.store.is_live(id)
    }

    pub fn node(&self, id: &NodeId) -> Option<&NodeRecord> {
        self.store.record(id)
    }

    pub fn node_count(&self) -> usize {
        self.store.nodes.len()
    }

    pub fn node_ids(&self) -> Vec<NodeId> {
        self.store.node_ids().cloned().collect()
    }

    /// Returns `true` if `source -> target` is present with both endpoints live.
    pub fn has_edge(&self, source: &NodeId, target: &NodeId) -> bool {
        self.edge_label(source, target).is_some()
    }

    pub fn edge_label(&self, source: &NodeId, target: &NodeId) -> Option<&str> {
        if !self.store.is_live(target) {
            return None;
        }
        let key = AdjKey::new(source.clone(), target.clone(), Side::Out);
        self.store.entry(&key).map(|e| e.label.as_str())
    }

    /// Present edges in key order.
    pub fn edges(&self) -> Vec<EdgeKey> {
        self.store
            .visible_entries()
            .filter(|(k, _)| self.store.is_live(&k.neighbor))
            .map(|(k, _)| k.edge())
            .collect()
    }

    pub fn edge_count(&self) -> usize {
        self.edges().len()
    }

    /// Targets of the edges leaving `id`, sorted.
    pub fn successors(&self, id: &NodeId) -> Vec<NodeId> {
        self.store
            .entries_of(id)
            .filter(|(k, _)| self.store.is_live(&k.neighbor))
            .map(|(k, _)| k.neighbor.clone())
            .collect()
    }

    /// Every node adjacent to `id` in either direction, sorted.
    pub fn neighbors(&self, id: &NodeId) -> Vec<NodeId> {
        let mut neighbors: Vec<NodeId> = self
            .edges()
            .into_iter()
            .filter_map(|e| e.opposite(id).cloned())
            .collect();
        neighbors.sort();
        neighbors.dedup();
        neighbors
    }

    /// Edges whose owning entry is visible but whose target is not live.
    pub fn dangling_edges(&self) -> Vec<EdgeKey> {
        self.store
            .visible_entries()
            .filter(|(k, _)| !self.store.is_live(&k.neighbor))
            .map(|(k, _)| k.edge())
            .collect()
    }

    /// The edge log in log order.
    pub fn edge_log(&self) -> Vec<(&Stamp, &EdgeLogEntry)> {
        self.store.log.iter().collect()
    }

    pub fn is_acyclic(&self) -> bool {
        let (graph, _) = self.petgraph();
        !is_cyclic_directed(&graph)
    }

    /// Returns `true` if the edge log holds duplicates or entries for edges
    /// that are not present.
    pub fn has_log_skew(&self) -> bool {
        let present = self.edges();
        let mut seen = std::collections::HashSet::new();
        self.store
            .log
            .values()
            .any(|entry| !seen.insert(&entry.edge) || present.binary_search(&entry.edge).is_err())
    }

    /// Returns `true` if `from` reaches `to` through present edges.
    fn reaches(&self, from: &NodeId, to: &NodeId) -> bool {
        let (graph, index) = self.petgraph();
        match (index.get(from), index.get(to)) {
            (Some(&a), Some(&b)) => has_path_connecting(&graph, a, b, None),
            _ => false,
        }
    }

    /// Live nodes and present edges as a petgraph graph. Node indices follow
    /// sorted id order.
    fn petgraph(&self) -> (DiGraph<NodeId, ()>, HashMap<NodeId, NodeIndex>) {
        let mut graph = DiGraph::new();
        let mut index = HashMap::new();
        for id in self.store.node_ids() {
            index.insert(id.clone(), graph.add_node(id.clone()));
        }
        for edge in self.edges() {
            if let (Some(&a), Some(&b)) = (index.get(&edge.source), index.get(&edge.target)) {
                graph.add_edge(a, b, ());
            }
        }
        (graph, index)
    }

    #[cfg(debug_assertions)]
    fn assert_consistency(&self) {
        debug_assert!(self.dangling_edges().is_empty(), "dangling edges after repair");
        debug_assert!(!self.has_log_skew(), "edge log out of step with edges after repair");
        debug_assert!(self.is_acyclic(), "cycle survived repair");
    }
}

impl Replicated for AcyclicGraph {
    type Update = GraphUpdate<EdgeLogEntry>;

    fn state_vector(&self) -> VectorClock {
        self.store.clock()
    }

    fn diff(&self, since: &VectorClock) -> Self::Update {
        self.store.diff(since)
    }

    fn apply(&mut self, update: Self::Update) {
        self.store.apply(update);
    }

    fn validate(update: &Self::Update) -> Result<(), CoreError> {
        update.check()
    }
}

impl ReplicatedGraph for AcyclicGraph {
    fn replica_id(&self) -> ReplicaId {
        self.store.replica.id()
    }

    fn repair(&mut self, config: &RepairConfig) -> Result<RepairReport, GraphError> {
        self.make_graph_valid(config)
    }

    fn needs_repair(&self) -> bool {
        !self.dangling_edges().is_empty() || self.has_log_skew() || !self.is_acyclic()
    }

    fn node_ids(&self) -> Vec<NodeId> {
        AcyclicGraph::node_ids(self)
    }

    fn edges(&self) -> Vec<EdgeKey> {
        AcyclicGraph::edges(self)
    }

    fn converged_with(&self, other: &Self) -> bool {
        self.node_ids() == other.node_ids()
            && self.edges() == other.edges()
            && self.edge_log() == other.edge_log()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn graph_with(nodes: &[&str]) -> AcyclicGraph {
        let mut g = AcyclicGraph::new(ReplicaId(1));
        for &n in nodes {
            assert!(g.add_node(n, n, Position::default()));
        }
        g
    }

    #[test]
    fn add_edge_rejects_cycles_and_self_loops() {
        let mut g = graph_with(&["a", "b", "c"]);
        assert!(g.add_edge("a", "b", "ab"));
        assert!(g.add_edge("b", "c", "bc"));
        assert!(!g.add_edge("c", "a", "ca"));
        assert!(!g.add_edge("a", "a", "aa"));
        assert!(!g.add_edge("a", "b", "dup"));
        assert!(!g.add_edge("a", "missing", "x"));
        assert!(g.add_edge("a", "c", "ac"));
        assert_eq!(g.edge_count(), 3);
        assert!(g.is_acyclic());
    }

    #[test]
    fn add_edge_appends_log_entry_with_clock() {
        let mut g = graph_with(&["a", "b"]);
        g.add_edge("a", "b", "ab");
        let log = g.edge_log();
        assert_eq!(log.len(), 1);
        assert_eq!(log[0].1.edge, EdgeKey::new("a", "b"));
        assert_eq!(log[0].1.clock.get(ReplicaId(1)), 3);
    }

    #[test]
    fn add_node_with_edge_requires_existing_node() {
        let mut g = graph_with(&["a"]);
        assert!(!g.add_node_with_edge(
            "b",
            EdgeDirection::FromExisting,
            "nope",
            "B",
            Position::default(),
            "e",
        ));
        assert!(g.add_node_with_edge(
            "b",
            EdgeDirection::ToExisting,
            "a",
            "B",
            Position::default(),
            "e",
        ));
        assert!(!g.add_node_with_edge(
            "b",
            EdgeDirection::ToExisting,
            "a",
            "B",
            Position::default(),
            "e",
        ));
        assert!(g.has_edge(&"b".into(), &"a".into()));
        assert_eq!(g.edge_log().len(), 1);
    }

    #[test]
    fn remove_edge_drops_log_entry() {
        let mut g = graph_with(&["a", "b"]);
        g.add_edge("a", "b", "ab");
        assert!(g.remove_edge("a", "b"));
        assert!(!g.remove_edge("a", "b"));
        assert!(g.edge_log().is_empty());
        assert!(g.add_edge("b", "a", "ba"));
    }

    #[test]
    fn remove_node_scrubs_incident_edges() {
        let mut g = graph_with(&["a", "b", "c"]);
        g.add_edge("a", "b", "ab");
        g.add_edge("b", "c", "bc");
        g.add_edge("a", "c", "ac");
        assert!(g.remove_node("b"));
        assert_eq!(g.edges(), vec![EdgeKey::new("a", "c")]);
        assert_eq!(g.edge_log().len(), 1);
        assert!(g.dangling_edges().is_empty());
        assert!(!g.remove_node("b"));
    }

    #[test]
    fn attribute_updates() {
        let mut g = graph_with(&["a"]);
        let a = NodeId::new("a");
        assert!(g.set_node_label(&a, "renamed"));
        assert!(g.set_node_position(&a, Position::new(3.0, 4.0)));
        let node = g.node(&a).unwrap();
        assert_eq!(node.label, "renamed");
        assert_eq!(node.position, Position::new(3.0, 4.0));
    }

    #[test]
    fn neighbors_and_successors() {
        let mut g = graph_with(&["a", "b", "c"]);
        g.add_edge("a", "b", "");
        g.add_edge("c", "a", "");
        let a = NodeId::new("a");
        assert_eq!(g.successors(&a), vec![NodeId::new("b")]);
        assert_eq!(g.neighbors(&a), vec![NodeId::new("b"), NodeId::new("c")]);
    }

    #[test]
    fn concurrent_node_removal_leaves_dangling_edge() {
        let mut a = graph_with(&["x", "y"]);
        let mut b = AcyclicGraph::new(ReplicaId(2));
        b.merge_from(&a);

        a.remove_node("y");
        assert!(b.add_edge("x", "y", "xy"));
        a.merge_from(&b);

        assert_eq!(a.dangling_edges(), vec![EdgeKey::new("x", "y")]);
        assert!(!a.has_edge(&"x".into(), &"y".into()));
        assert!(a.needs_repair());
    }

    #[test]
    fn encoded_updates_round_trip_through_bytes() {
        let mut a = graph_with(&["x", "y"]);
        a.add_edge("x", "y", "xy");
        let mut b = AcyclicGraph::new(ReplicaId(2));
        let bytes = a.encode_update(&b.state_vector()).unwrap();
        b.apply_encoded(&bytes).unwrap();
        assert!(b.converged_with(&a));
        assert!(b.apply_encoded(b"not json").is_err());
    }
}
