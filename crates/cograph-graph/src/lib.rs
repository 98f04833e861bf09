//! Replicated graphs that stay structurally valid under concurrent edits.
//!
//! Three variants share one arena-by-id storage layer:
//!
//! - [`dag::AcyclicGraph`]: a directed graph repaired back to acyclicity
//!   after every merge ([`dag::resolve`]).
//! - [`rooted::DirectedRootedGraph`] and [`rooted::UndirectedRootedGraph`]:
//!   graphs whose nodes all stay connected to a fixed root, repaired by
//!   replaying tombstones of removed elements ([`rooted::resolve`]).
//!
//! Local edits never produce an invalid graph; a refused edit returns
//! `false`. Only merges can, and [`ReplicatedGraph::repair`] restores
//! validity deterministically so replicas that merged the same updates end
//! up in the same state.

pub mod config;
pub mod dag;
pub mod edge;
pub mod error;
pub mod graph;
pub mod id;
pub mod node;
pub mod paths;
pub mod report;
pub mod rooted;
mod store;
pub mod tombstone;

// Re-export commonly used types
pub use config::{CycleStrategy, PathPolicy, RepairConfig};
pub use dag::AcyclicGraph;
pub use edge::{AdjKey, EdgeDirection, EdgeKey, Side};
pub use error::GraphError;
pub use graph::{GraphUpdate, ReplicatedGraph};
pub use id::NodeId;
pub use node::{NodeRecord, Position};
pub use report::RepairReport;
pub use rooted::{DirectedRootedGraph, FixedRootGraph, UndirectedRootedGraph, ROOT_ID};
pub use tombstone::RemovedGraphElement;
