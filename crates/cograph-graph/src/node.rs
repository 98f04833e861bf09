//! Node records stored in the replicated node map.

use cograph_core::Stamp;
use serde::{Deserialize, Serialize};

/// 2D layout position of a node.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Position {
    pub x: f64,
    pub y: f64,
}

impl Position {
    pub fn new(x: f64, y: f64) -> Self {
        Position { x, y }
    }
}

/// Payload of one live node.
///
/// `incarnation` identifies this particular life of the node. Adjacency
/// entries are written against an incarnation and only count while it is
/// current, so deleting a node (or re-creating it) drops whatever adjacency
/// was attached to its previous life, including entries a concurrent replica
/// wrote after the deletion.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeRecord {
    pub label: String,
    pub position: Position,
    pub incarnation: Stamp,
}
