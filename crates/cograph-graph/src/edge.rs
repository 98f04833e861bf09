//! Edge identities and the mirrored adjacency entries that store them.
//!
//! An edge is never stored as a single record. Each endpoint owns one
//! adjacency entry ([`AdjKey`] -> [`AdjEntry`]) describing the edge from its
//! own side, so neighbour lookups are a range scan over the owner's keys.
//! The two mirrored entries agree on presence and label except transiently
//! around a merge, until repair runs.

use std::fmt;

use cograph_core::Stamp;
use serde::{Deserialize, Serialize};

use crate::id::NodeId;

/// Logical identity of an edge.
///
/// Directed variants keep `source -> target` as given. The undirected
/// variant normalises through [`EdgeKey::undirected`] so that `{a, b}` and
/// `{b, a}` are the same key.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct EdgeKey {
    pub source: NodeId,
    pub target: NodeId,
}

impl EdgeKey {
    pub fn new(source: impl Into<NodeId>, target: impl Into<NodeId>) -> Self {
        EdgeKey {
            source: source.into(),
            target: target.into(),
        }
    }

    /// Order-insensitive key: the smaller id becomes `source`.
    pub fn undirected(a: impl Into<NodeId>, b: impl Into<NodeId>) -> Self {
        let (a, b) = (a.into(), b.into());
        if a <= b {
            EdgeKey { source: a, target: b }
        } else {
            EdgeKey { source: b, target: a }
        }
    }

    pub fn is_self_loop(&self) -> bool {
        self.source == self.target
    }

    pub fn touches(&self, node: &NodeId) -> bool {
        &self.source == node || &self.target == node
    }

    /// The endpoint opposite `node`, if `node` is an endpoint at all.
    pub fn opposite(&self, node: &NodeId) -> Option<&NodeId> {
        if &self.source == node {
            Some(&self.target)
        } else if &self.target == node {
            Some(&self.source)
        } else {
            None
        }
    }
}

impl fmt::Display for EdgeKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}->{}", self.source, self.target)
    }
}

/// Which end of an edge an adjacency entry describes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Side {
    /// Owner is the source of a directed edge.
    Out,
    /// Owner is the target of a directed edge.
    In,
    /// Either end of an undirected edge.
    Both,
}

impl Side {
    pub fn mirror(self) -> Side {
        match self {
            Side::Out => Side::In,
            Side::In => Side::Out,
            Side::Both => Side::Both,
        }
    }
}

/// Key of one adjacency entry: the edge as seen from `owner`.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct AdjKey {
    pub owner: NodeId,
    pub neighbor: NodeId,
    pub side: Side,
}

impl AdjKey {
    pub fn new(owner: NodeId, neighbor: NodeId, side: Side) -> Self {
        AdjKey {
            owner,
            neighbor,
            side,
        }
    }

    /// Smallest key owned by `owner`; range scans over an owner start here.
    pub fn first_of(owner: &NodeId) -> Self {
        AdjKey {
            owner: owner.clone(),
            neighbor: NodeId::default(),
            side: Side::Out,
        }
    }

    /// The entry describing the same edge from the other endpoint.
    pub fn mirror(&self) -> AdjKey {
        AdjKey {
            owner: self.neighbor.clone(),
            neighbor: self.owner.clone(),
            side: self.side.mirror(),
        }
    }

    /// Logical edge this entry belongs to.
    pub fn edge(&self) -> EdgeKey {
        match self.side {
            Side::Out => EdgeKey::new(self.owner.clone(), self.neighbor.clone()),
            Side::In => EdgeKey::new(self.neighbor.clone(), self.owner.clone()),
            Side::Both => EdgeKey::undirected(self.owner.clone(), self.neighbor.clone()),
        }
    }
}

/// Payload of one adjacency entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AdjEntry {
    pub label: String,
    /// Incarnation of the owner node this entry was written against.
    pub incarnation: Stamp,
}

/// Orientation of the edge created by `add_node_with_edge`, relative to the
/// node that already exists.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EdgeDirection {
    /// `existing -> new`
    FromExisting,
    /// `new -> existing`
    ToExisting,
}
