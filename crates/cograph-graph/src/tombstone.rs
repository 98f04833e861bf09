//! Tombstones: retained records of removed graph elements.
//!
//! Fixed-root graphs append a [`RemovedGraphElement`] whenever `remove_edge`
//! succeeds. A tombstone is never mutated and never re-applied blindly; the
//! connectivity resolver consults the log after a merge and restores only
//! what it needs to reconnect the graph, deleting each tombstone it consumes.

use cograph_core::VectorClock;
use serde::{Deserialize, Serialize};

use crate::edge::EdgeKey;
use crate::id::NodeId;
use crate::node::Position;

/// One neighbour of a removed node, as it was at removal time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EdgeInformation {
    pub neighbor: NodeId,
    pub label: String,
}

/// A removed edge whose removal did not orphan either endpoint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RemovedEdge {
    pub edge: EdgeKey,
    pub label: String,
    pub clock: VectorClock,
}

/// A removed edge bundled with the node its removal orphaned.
///
/// Carries everything needed to resurrect the node and its local
/// neighbourhood: its attributes plus every adjacency entry it owned.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RemovedEdgeWithNode {
    pub edge: EdgeKey,
    pub label: String,
    pub clock: VectorClock,
    pub node: NodeId,
    pub node_label: String,
    pub node_position: Position,
    /// Edges leaving the node (all edges, for the undirected variant).
    pub outgoing: Vec<EdgeInformation>,
    /// Edges entering the node (directed variant only).
    pub incoming: Vec<EdgeInformation>,
}

impl RemovedEdgeWithNode {
    /// Every edge bundled with the node, keyed the way the owning graph
    /// keys its edges.
    pub fn bundled_edges(&self, key: fn(&NodeId, &NodeId) -> EdgeKey) -> Vec<(EdgeKey, &str)> {
        let outgoing = self
            .outgoing
            .iter()
            .map(|info| (key(&self.node, &info.neighbor), info.label.as_str()));
        let incoming = self
            .incoming
            .iter()
            .map(|info| (key(&info.neighbor, &self.node), info.label.as_str()));
        outgoing.chain(incoming).collect()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "item", rename_all = "camelCase")]
pub enum RemovedGraphElement {
    Edge(RemovedEdge),
    EdgeWithNode(RemovedEdgeWithNode),
}

impl RemovedGraphElement {
    pub fn edge(&self) -> &EdgeKey {
        match self {
            RemovedGraphElement::Edge(e) => &e.edge,
            RemovedGraphElement::EdgeWithNode(e) => &e.edge,
        }
    }

    pub fn label(&self) -> &str {
        match self {
            RemovedGraphElement::Edge(e) => &e.label,
            RemovedGraphElement::EdgeWithNode(e) => &e.label,
        }
    }

    pub fn clock(&self) -> &VectorClock {
        match self {
            RemovedGraphElement::Edge(e) => &e.clock,
            RemovedGraphElement::EdgeWithNode(e) => &e.clock,
        }
    }

    /// The node removed along with the edge, if any.
    pub fn node(&self) -> Option<&NodeId> {
        match self {
            RemovedGraphElement::Edge(_) => None,
            RemovedGraphElement::EdgeWithNode(e) => Some(&e.node),
        }
    }

    /// Identity used to collapse duplicates: two tombstones with the same
    /// identity describe the same logical removal.
    pub fn identity(&self) -> (EdgeKey, Option<NodeId>) {
        (self.edge().clone(), self.node().cloned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cograph_core::ReplicaId;

    fn removed_leaf() -> RemovedEdgeWithNode {
        RemovedEdgeWithNode {
            edge: EdgeKey::new("a", "leaf"),
            label: "e".into(),
            clock: [(ReplicaId(1), 3)].into_iter().collect(),
            node: "leaf".into(),
            node_label: "Leaf".into(),
            node_position: Position::new(1.0, 2.0),
            outgoing: vec![EdgeInformation {
                neighbor: "leaf".into(),
                label: "loop".into(),
            }],
            incoming: vec![EdgeInformation {
                neighbor: "a".into(),
                label: "e".into(),
            }],
        }
    }

    #[test]
    fn bundled_edges_follow_key_function() {
        let t = removed_leaf();
        let directed = t.bundled_edges(|a, b| EdgeKey::new(a.clone(), b.clone()));
        assert_eq!(
            directed,
            vec![
                (EdgeKey::new("leaf", "leaf"), "loop"),
                (EdgeKey::new("a", "leaf"), "e"),
            ]
        );
    }

    #[test]
    fn identity_distinguishes_bundled_removal() {
        let plain = RemovedGraphElement::Edge(RemovedEdge {
            edge: EdgeKey::new("a", "leaf"),
            label: "e".into(),
            clock: VectorClock::new(),
        });
        let bundled = RemovedGraphElement::EdgeWithNode(removed_leaf());
        assert_eq!(plain.edge(), bundled.edge());
        assert_ne!(plain.identity(), bundled.identity());
        assert_eq!(bundled.node(), Some(&NodeId::new("leaf")));
    }

    #[test]
    fn serialized_form_is_tagged() {
        let plain = RemovedGraphElement::Edge(RemovedEdge {
            edge: EdgeKey::new("a", "b"),
            label: "x".into(),
            clock: VectorClock::new(),
        });
        insta::assert_json_snapshot!(plain, @r###"
        {
          "type": "edge",
          "item": {
            "edge": {
              "source": "a",
              "target": "b"
            },
            "label": "x",
            "clock": {}
          }
        }
        "###);
    }
}
