//! Replicated fixed-root graphs: every node stays connected to `root`.
//!
//! Local edits keep a single replica connected. Nodes only enter the graph
//! through [`FixedRootGraph::add_node_with_edge`], and
//! [`FixedRootGraph::remove_edge`] either removes an edge whose loss leaves
//! the graph connected or, if the edge was the last one holding a node,
//! removes that node with it. Every removal appends a
//! [`RemovedGraphElement`] tombstone to the replicated tombstone log.
//!
//! Concurrent removals can still disconnect the merged graph, and concurrent
//! node removal can leave dangling adjacency entries. After each merge
//! [`FixedRootGraph::make_graph_weakly_connected`] replays tombstones until
//! the graph is connected again (see [`resolve`]).
//!
//! The directed and undirected variants share this implementation through
//! the [`Orientation`] parameter.

pub mod orientation;
pub mod resolve;
mod restore;

use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet, VecDeque};
use std::marker::PhantomData;

use cograph_core::{CoreError, Replicated, ReplicaId, Stamp, VectorClock};

use crate::config::RepairConfig;
use crate::edge::{AdjKey, EdgeDirection, EdgeKey, Side};
use crate::error::GraphError;
use crate::graph::{GraphUpdate, ReplicatedGraph};
use crate::id::NodeId;
use crate::node::{NodeRecord, Position};
use crate::paths::Component;
use crate::report::RepairReport;
use crate::store::GraphStore;
use crate::tombstone::{EdgeInformation, RemovedEdge, RemovedEdgeWithNode, RemovedGraphElement};

pub use orientation::{Directed, Orientation, Undirected};

/// Id of the node every replica creates identically and no edit removes.
pub const ROOT_ID: &str = "root";

pub type DirectedRootedGraph = FixedRootGraph<Directed>;
pub type UndirectedRootedGraph = FixedRootGraph<Undirected>;

/// An adjacency entry at a live owner whose neighbour is not live.
#[derive(Debug, Clone, PartialEq)]
pub struct DanglingEdge {
    /// The visible entry.
    pub key: AdjKey,
    pub edge: EdgeKey,
    pub label: String,
    /// The endpoint that is not live.
    pub missing: NodeId,
}

#[derive(Debug, Clone)]
pub struct FixedRootGraph<O> {
    store: GraphStore<RemovedGraphElement>,
    orientation: PhantomData<O>,
}

impl<O: Orientation> FixedRootGraph<O> {
    pub fn new(replica: ReplicaId) -> Self {
        let mut store = GraphStore::new(replica);
        store.nodes.insert(
            NodeId::new(ROOT_ID),
            NodeRecord {
                label: ROOT_ID.to_string(),
                position: Position::default(),
                incarnation: Stamp::GENESIS,
            },
            Stamp::GENESIS,
        );
        FixedRootGraph {
            store,
            orientation: PhantomData,
        }
    }

    pub fn root(&self) -> NodeId {
        NodeId::new(ROOT_ID)
    }

    // -----------------------------------------------------------------------
    // Local edits
    // -----------------------------------------------------------------------

    /// Adds an edge between two live nodes. Adding an edge can only improve
    /// connectivity, so this is refused only for a missing endpoint or an
    /// edge that is already present.
    pub fn add_edge(
        &mut self,
        a: impl Into<NodeId>,
        b: impl Into<NodeId>,
        label: impl Into<String>,
    ) -> bool {
        let edge = O::key(&a.into(), &b.into());
        if !self.store.is_live(&edge.source)
            || !self.store.is_live(&edge.target)
            || self.has_edge_key(&edge)
        {
            return false;
        }
        self.write_edge(&edge, &label.into());
        true
    }

    /// Adds `id` connected to `existing`. Refused if `existing` is not live
    /// or `id` already is. `direction` is ignored by the undirected variant.
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
            EdgeDirection::FromExisting => O::key(&existing, &id),
            EdgeDirection::ToExisting => O::key(&id, &existing),
        };
        self.write_edge(&edge, &edge_label.into());
        true
    }

    /// Removes the edge between `a` and `b`.
    ///
    /// If the edge is the last non-self-loop edge of a non-root endpoint
    /// (the target is checked first), that endpoint is removed too and an
    /// [`RemovedEdgeWithNode`] tombstone records its neighbourhood.
    /// Otherwise the removal is refused unless every live node still reaches
    /// the root without the edge, and a plain [`RemovedEdge`] tombstone is
    /// recorded.
    pub fn remove_edge(&mut self, a: impl Into<NodeId>, b: impl Into<NodeId>) -> bool {
        let edge = O::key(&a.into(), &b.into());
        let edges = self.edge_map();
        let Some(label) = edges.get(&edge).cloned() else {
            return false;
        };

        let root = self.root();
        let orphan = [&edge.target, &edge.source]
            .into_iter()
            .find(|n| **n != root && incident(&edges, n).count() == 1)
            .cloned();

        let clock = self.store.clock();
        match orphan {
            Some(node) => {
                let Some(record) = self.store.record(&node).cloned() else {
                    return false;
                };
                let (outgoing, incoming) = self.neighbourhood(&node);
                self.store
                    .push_log(RemovedGraphElement::EdgeWithNode(RemovedEdgeWithNode {
                        edge,
                        label,
                        clock,
                        node: node.clone(),
                        node_label: record.label,
                        node_position: record.position,
                        outgoing,
                        incoming,
                    }));
                self.erase_node(&node);
            }
            None => {
                if !self.connected_without(&edges, &edge) {
                    return false;
                }
                self.store.push_log(RemovedGraphElement::Edge(RemovedEdge {
                    edge: edge.clone(),
                    label,
                    clock,
                }));
                self.erase_edge(&edge);
            }
        }
        true
    }

    pub fn set_node_label(&mut self, id: &NodeId, label: impl Into<String>) -> bool {
        let label = label.into();
        self.store.update_node(id, |r| r.label = label)
    }

    pub fn set_node_position(&mut self, id: &NodeId, position: Position) -> bool {
        self.store.update_node(id, |r| r.position = position)
    }

    /// Edges owned by `node` at removal time: `(outgoing, incoming)`.
    /// Undirected entries all count as outgoing.
    fn neighbourhood(&self, node: &NodeId) -> (Vec<EdgeInformation>, Vec<EdgeInformation>) {
        let mut outgoing = Vec::new();
        let mut incoming = Vec::new();
        for (key, entry) in self.store.entries_of(node) {
            let info = EdgeInformation {
                neighbor: key.neighbor.clone(),
                label: entry.label.clone(),
            };
            match key.side {
                Side::Out | Side::Both => outgoing.push(info),
                Side::In if &key.neighbor != node => incoming.push(info),
                Side::In => {}
            }
        }
        (outgoing, incoming)
    }

    /// Removes a node, its entries and the mirrors of its entries.
    fn erase_node(&mut self, node: &NodeId) {
        let mirrors: Vec<AdjKey> = self
            .store
            .entries_of(node)
            .filter(|(k, _)| &k.neighbor != node)
            .map(|(k, _)| k.mirror())
            .collect();
        for key in &mirrors {
            self.store.erase_entry(key);
        }
        self.store.erase_node(node);
    }

    pub(crate) fn write_edge(&mut self, edge: &EdgeKey, label: &str) {
        for side in O::sides(edge) {
            self.store.write_entry(side, label.to_string());
        }
    }

    fn erase_edge(&mut self, edge: &EdgeKey) {
        for side in O::sides(edge) {
            self.store.erase_entry(&side);
        }
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

    pub fn has_edge(&self, a: &NodeId, b: &NodeId) -> bool {
        self.has_edge_key(&O::key(a, b))
    }

    /// An edge is present if both endpoints are live and at least one of its
    /// two entries is visible.
    pub(crate) fn has_edge_key(&self, edge: &EdgeKey) -> bool {
        self.store.is_live(&edge.source)
            && self.store.is_live(&edge.target)
            && O::sides(edge).iter().any(|side| self.store.entry(side).is_some())
    }

    pub fn edge_label(&self, a: &NodeId, b: &NodeId) -> Option<String> {
        self.edge_map().remove(&O::key(a, b))
    }

    /// Present edges with their labels, keyed in edge order.
    pub fn edge_map(&self) -> BTreeMap<EdgeKey, String> {
        self.store
            .visible_entries()
            .filter(|(k, _)| self.store.is_live(&k.neighbor))
            .map(|(k, e)| (k.edge(), e.label.clone()))
            .collect()
    }

    pub fn edges(&self) -> Vec<EdgeKey> {
        self.edge_map().into_keys().collect()
    }

    pub fn edge_count(&self) -> usize {
        self.edge_map().len()
    }

    /// Every node adjacent to `id`, ignoring direction, sorted.
    pub fn neighbors(&self, id: &NodeId) -> Vec<NodeId> {
        let neighbors: BTreeSet<NodeId> = self
            .edge_map()
            .keys()
            .filter_map(|e| e.opposite(id).cloned())
            .collect();
        neighbors.into_iter().collect()
    }

    /// The tombstone log in log order.
    pub fn tombstones(&self) -> Vec<(&Stamp, &RemovedGraphElement)> {
        self.store.log.iter().collect()
    }

    /// Visible entries pointing at a node that is not live, in key order.
    pub fn dangling_edges(&self) -> Vec<DanglingEdge> {
        self.store
            .visible_entries()
            .filter(|(k, _)| !self.store.is_live(&k.neighbor))
            .map(|(k, e)| DanglingEdge {
                key: k.clone(),
                edge: k.edge(),
                label: e.label.clone(),
                missing: k.neighbor.clone(),
            })
            .collect()
    }

    /// Connected components ignoring direction. The root's component comes
    /// first, the rest in order of their least node id.
    pub fn components(&self) -> Vec<Component> {
        let edges = self.edge_map();
        let mut adjacent: HashMap<&NodeId, Vec<&NodeId>> = HashMap::new();
        for edge in edges.keys() {
            adjacent.entry(&edge.source).or_default().push(&edge.target);
            adjacent.entry(&edge.target).or_default().push(&edge.source);
        }

        let root = self.root();
        let mut seen: HashSet<&NodeId> = HashSet::new();
        let mut components = Vec::new();
        let starts = self
            .store
            .is_live(&root)
            .then_some(&root)
            .into_iter()
            .chain(self.store.node_ids());
        for start in starts {
            if !seen.insert(start) {
                continue;
            }
            let mut component = Component::new();
            let mut queue = VecDeque::from([start]);
            while let Some(node) = queue.pop_front() {
                component.insert(node.clone());
                for &next in adjacent.get(node).into_iter().flatten() {
                    if seen.insert(next) {
                        queue.push_back(next);
                    }
                }
            }
            components.push(component);
        }
        components
    }

    pub fn is_connected(&self) -> bool {
        self.components().len() == 1
    }

    /// Returns `true` if every visible entry between live nodes has a
    /// visible mirror with the same label.
    pub fn mirrors_consistent(&self) -> bool {
        self.store
            .visible_entries()
            .filter(|(k, _)| self.store.is_live(&k.neighbor))
            .all(|(k, e)| {
                self.store
                    .entry(&k.mirror())
                    .is_some_and(|m| m.label == e.label)
            })
    }

    /// Mirrors agree and nothing dangles.
    pub fn is_consistent(&self) -> bool {
        self.mirrors_consistent() && self.dangling_edges().is_empty()
    }

    /// Returns `true` if the tombstone log holds duplicates or tombstones
    /// for elements that are present.
    pub fn has_stale_tombstones(&self) -> bool {
        let mut seen = HashSet::new();
        self.store
            .log
            .values()
            .any(|t| self.is_restored(t) || !seen.insert(t.identity()))
    }

    /// Returns `true` if everything `tombstone` removed is present again.
    pub(crate) fn is_restored(&self, tombstone: &RemovedGraphElement) -> bool {
        let node_back = tombstone.node().map_or(true, |n| self.store.is_live(n));
        node_back && self.has_edge_key(tombstone.edge())
    }

    /// Returns `true` if every live node reaches the root without `removed`.
    fn connected_without(&self, edges: &BTreeMap<EdgeKey, String>, removed: &EdgeKey) -> bool {
        let mut adjacent: HashMap<&NodeId, Vec<&NodeId>> = HashMap::new();
        for edge in edges.keys().filter(|e| *e != removed) {
            adjacent.entry(&edge.source).or_default().push(&edge.target);
            adjacent.entry(&edge.target).or_default().push(&edge.source);
        }
        let root = self.root();
        let mut seen: HashSet<&NodeId> = HashSet::from([&root]);
        let mut queue = VecDeque::from([&root]);
        while let Some(node) = queue.pop_front() {
            for &next in adjacent.get(node).into_iter().flatten() {
                if seen.insert(next) {
                    queue.push_back(next);
                }
            }
        }
        self.store.node_ids().all(|n| seen.contains(n))
    }

    #[cfg(debug_assertions)]
    fn assert_consistency(&self) {
        debug_assert!(self.dangling_edges().is_empty(), "dangling edges after repair");
        debug_assert!(self.mirrors_consistent(), "adjacency mirrors disagree after repair");
        debug_assert!(self.is_connected(), "graph disconnected after repair");
    }
}

/// Non-self-loop edges touching `node`.
fn incident<'a>(
    edges: &'a BTreeMap<EdgeKey, String>,
    node: &'a NodeId,
) -> impl Iterator<Item = &'a EdgeKey> + 'a {
    edges
        .keys()
        .filter(move |e| e.touches(node) && !e.is_self_loop())
}

impl<O: Orientation> Replicated for FixedRootGraph<O> {
    type Update = GraphUpdate<RemovedGraphElement>;

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

impl<O: Orientation> ReplicatedGraph for FixedRootGraph<O> {
    fn replica_id(&self) -> ReplicaId {
        self.store.replica.id()
    }

    fn repair(&mut self, config: &RepairConfig) -> Result<RepairReport, GraphError> {
        self.make_graph_weakly_connected(config)
    }

    fn needs_repair(&self) -> bool {
        !self.is_consistent() || !self.is_connected() || self.has_stale_tombstones()
    }

    fn node_ids(&self) -> Vec<NodeId> {
        FixedRootGraph::node_ids(self)
    }

    fn edges(&self) -> Vec<EdgeKey> {
        FixedRootGraph::edges(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn star() -> DirectedRootedGraph {
        // root -> a -> b, root -> c, c -> b
        let mut g = DirectedRootedGraph::new(ReplicaId(1));
        assert!(g.add_node_with_edge(
            "a",
            EdgeDirection::FromExisting,
            ROOT_ID,
            "A",
            Position::default(),
            "ra",
        ));
        assert!(g.add_node_with_edge(
            "b",
            EdgeDirection::FromExisting,
            "a",
            "B",
            Position::default(),
            "ab",
        ));
        assert!(g.add_node_with_edge(
            "c",
            EdgeDirection::FromExisting,
            ROOT_ID,
            "C",
            Position::default(),
            "rc",
        ));
        assert!(g.add_edge("c", "b", "cb"));
        g
    }

    #[test]
    fn new_graph_holds_only_root() {
        let g = UndirectedRootedGraph::new(ReplicaId(3));
        assert_eq!(g.node_ids(), vec![NodeId::new(ROOT_ID)]);
        assert!(g.is_connected());
        assert!(g.is_consistent());
        assert!(!g.needs_repair());
    }

    #[test]
    fn nodes_must_arrive_connected() {
        let mut g = DirectedRootedGraph::new(ReplicaId(1));
        assert!(!g.add_node_with_edge(
            "x",
            EdgeDirection::FromExisting,
            "ghost",
            "X",
            Position::default(),
            "",
        ));
        assert!(!g.add_edge("root", "ghost", ""));
        assert_eq!(g.node_count(), 1);
    }

    #[test]
    fn remove_edge_keeps_graph_connected() {
        let mut g = star();
        // root -> a is not the last edge of a, and a still reaches root
        // through b and c.
        assert!(g.remove_edge("root", "a"));
        assert_eq!(g.node_count(), 4);
        assert!(g.is_connected());
        assert!(matches!(g.tombstones()[0].1, RemovedGraphElement::Edge(_)));

        // a -> b is now a's last edge: a goes with it.
        assert!(g.remove_edge("a", "b"));
        assert!(!g.has_node(&"a".into()));
        let (_, tombstone) = g.tombstones()[1];
        let RemovedGraphElement::EdgeWithNode(t) = tombstone else {
            panic!("expected a bundled removal");
        };
        assert_eq!(t.node, NodeId::new("a"));
        assert_eq!(t.node_label, "A");
        assert_eq!(t.outgoing.len(), 1);
        assert!(g.is_consistent());
    }

    #[test]
    fn remove_edge_refuses_to_disconnect() {
        let mut g = UndirectedRootedGraph::new(ReplicaId(1));
        g.add_node_with_edge(
            "a",
            EdgeDirection::FromExisting,
            ROOT_ID,
            "",
            Position::default(),
            "",
        );
        g.add_node_with_edge("b", EdgeDirection::FromExisting, "a", "", Position::default(), "");
        g.add_node_with_edge("c", EdgeDirection::FromExisting, "b", "", Position::default(), "");
        // Neither endpoint of a-b is a leaf, and cutting it strands b and c.
        assert!(!g.remove_edge("a", "b"));
        assert_eq!(g.edge_count(), 3);
        assert!(g.tombstones().is_empty());
    }

    #[test]
    fn undirected_edges_ignore_argument_order() {
        let mut g = UndirectedRootedGraph::new(ReplicaId(1));
        g.add_node_with_edge(
            "a",
            EdgeDirection::ToExisting,
            ROOT_ID,
            "",
            Position::default(),
            "ra",
        );
        assert!(g.has_edge(&"a".into(), &"root".into()));
        assert!(g.has_edge(&"root".into(), &"a".into()));
        assert!(!g.add_edge("root", "a", "again"));
        assert_eq!(g.edge_label(&"root".into(), &"a".into()).as_deref(), Some("ra"));
        assert!(g.remove_edge("root", "a"));
        assert_eq!(g.node_count(), 1);
    }

    #[test]
    fn root_is_never_orphaned() {
        let mut g = DirectedRootedGraph::new(ReplicaId(1));
        g.add_node_with_edge(
            "a",
            EdgeDirection::FromExisting,
            ROOT_ID,
            "",
            Position::default(),
            "",
        );
        assert!(g.remove_edge("root", "a"));
        assert!(g.has_node(&g.root()));
        assert!(!g.has_node(&"a".into()));
    }

    #[test]
    fn self_loops_do_not_hold_a_node() {
        let mut g = DirectedRootedGraph::new(ReplicaId(1));
        g.add_node_with_edge(
            "a",
            EdgeDirection::FromExisting,
            ROOT_ID,
            "",
            Position::default(),
            "",
        );
        assert!(g.add_edge("a", "a", "loop"));
        assert!(g.remove_edge("root", "a"));
        assert!(!g.has_node(&"a".into()));
        assert_eq!(g.edge_count(), 0);
    }

    #[test]
    fn neighbors_ignore_direction() {
        let g = star();
        assert_eq!(g.neighbors(&"b".into()), vec![NodeId::new("a"), NodeId::new("c")]);
    }

    #[test]
    fn components_put_root_first() {
        let mut a = DirectedRootedGraph::new(ReplicaId(1));
        a.add_node_with_edge(
            "x",
            EdgeDirection::FromExisting,
            ROOT_ID,
            "",
            Position::default(),
            "",
        );
        let mut b = DirectedRootedGraph::new(ReplicaId(2));
        b.merge_from(&a);

        a.add_node_with_edge("y", EdgeDirection::FromExisting, "x", "", Position::default(), "");
        b.remove_edge("root", "x");
        a.merge_from(&b);

        // x was removed on b; y hangs off a dangling entry.
        let components = a.components();
        assert_eq!(components[0], Component::from([NodeId::new("root")]));
        assert_eq!(components[1], Component::from([NodeId::new("y")]));
        assert_eq!(a.dangling_edges().len(), 1);
        assert!(a.needs_repair());
    }
}
