//! Edge orientation of a fixed-root graph.
//!
//! The directed and undirected fixed-root graphs share one implementation;
//! they differ only in how an edge is keyed and which adjacency entries
//! mirror it.

use std::fmt::Debug;

use crate::edge::{AdjKey, EdgeKey, Side};
use crate::id::NodeId;

pub trait Orientation: Debug + Clone + Send + Sync + 'static {
    const DIRECTED: bool;

    /// Key of the edge between `a` and `b` as the caller named them.
    fn key(a: &NodeId, b: &NodeId) -> EdgeKey;

    /// The two adjacency entries that store `edge`, source side first.
    fn sides(edge: &EdgeKey) -> [AdjKey; 2];
}

/// `a -> b` and `b -> a` are distinct edges. Connectivity is still weak:
/// components ignore direction.
#[derive(Debug, Clone, Copy, Default)]
pub struct Directed;

/// `{a, b}` and `{b, a}` are the same edge.
#[derive(Debug, Clone, Copy, Default)]
pub struct Undirected;

impl Orientation for Directed {
    const DIRECTED: bool = true;

    fn key(a: &NodeId, b: &NodeId) -> EdgeKey {
        EdgeKey::new(a.clone(), b.clone())
    }

    fn sides(edge: &EdgeKey) -> [AdjKey; 2] {
        [
            AdjKey::new(edge.source.clone(), edge.target.clone(), Side::Out),
            AdjKey::new(edge.target.clone(), edge.source.clone(), Side::In),
        ]
    }
}

impl Orientation for Undirected {
    const DIRECTED: bool = false;

    fn key(a: &NodeId, b: &NodeId) -> EdgeKey {
        EdgeKey::undirected(a.clone(), b.clone())
    }

    fn sides(edge: &EdgeKey) -> [AdjKey; 2] {
        [
            AdjKey::new(edge.source.clone(), edge.target.clone(), Side::Both),
            AdjKey::new(edge.target.clone(), edge.source.clone(), Side::Both),
        ]
    }
}
