//! The update payload shared by all graph variants and the
//! [`ReplicatedGraph`] trait that drivers program against.

use cograph_core::{CoreError, LogDelta, LwwEntry, Replicated, ReplicaId, Stamp, VectorClock};
use serde::{Deserialize, Serialize};

use crate::config::RepairConfig;
use crate::edge::{AdjEntry, AdjKey, EdgeKey};
use crate::error::GraphError;
use crate::id::NodeId;
use crate::node::NodeRecord;
use crate::report::RepairReport;

/// Delta exchanged between replicas of one graph variant.
///
/// `T` is the variant's log payload: edge-log entries for the acyclic graph,
/// tombstones for the fixed-root graphs.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GraphUpdate<T> {
    /// Sender's version vector at the time the delta was taken.
    pub clock: VectorClock,
    /// Sender's Lamport counter.
    pub lamport: u64,
    pub nodes: Vec<(NodeId, LwwEntry<NodeRecord>)>,
    pub adjacency: Vec<(AdjKey, LwwEntry<AdjEntry>)>,
    pub log: LogDelta<T>,
}

impl<T> GraphUpdate<T> {
    /// Every stamp in the delta must be covered by the sender's clock and
    /// bounded by its Lamport counter.
    pub fn check(&self) -> Result<(), CoreError> {
        let stamps = self
            .nodes
            .iter()
            .map(|(_, e)| &e.stamp)
            .chain(self.adjacency.iter().map(|(_, e)| &e.stamp))
            .chain(self.log.entries.iter().map(|(s, _)| s))
            .chain(self.log.removed.iter().map(|(_, s)| s));
        for stamp in stamps {
            self.check_stamp(stamp)?;
        }
        Ok(())
    }

    fn check_stamp(&self, stamp: &Stamp) -> Result<(), CoreError> {
        if !self.clock.covers(stamp) {
            return Err(CoreError::MalformedUpdate {
                reason: format!("stamp {} is not covered by the sender's clock", stamp),
            });
        }
        if stamp.lamport > self.lamport {
            return Err(CoreError::MalformedUpdate {
                reason: format!(
                    "stamp {} is ahead of the sender's lamport counter {}",
                    stamp, self.lamport
                ),
            });
        }
        Ok(())
    }

    /// Returns `true` if the delta carries no writes.
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
            && self.adjacency.is_empty()
            && self.log.entries.is_empty()
            && self.log.removed.is_empty()
    }
}

/// A replicated graph with a structural invariant restored by [`repair`].
///
/// [`repair`]: ReplicatedGraph::repair
pub trait ReplicatedGraph: Replicated + Clone {
    fn replica_id(&self) -> ReplicaId;

    /// Restores the variant's invariant after a merge. Deterministic: any two
    /// replicas holding the same merged state perform the same repair.
    fn repair(&mut self, config: &RepairConfig) -> Result<RepairReport, GraphError>;

    /// Returns `true` if the merged state violates the invariant or still
    /// carries bookkeeping that [`repair`](Self::repair) would clean up.
    fn needs_repair(&self) -> bool;

    /// Live node ids, sorted.
    fn node_ids(&self) -> Vec<NodeId>;

    /// Live edges, sorted.
    fn edges(&self) -> Vec<EdgeKey>;

    /// Returns `true` if both replicas hold the same logical graph.
    fn converged_with(&self, other: &Self) -> bool {
        self.node_ids() == other.node_ids() && self.edges() == other.edges()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn stamp(lamport: u64, replica: u64, counter: u64) -> Stamp {
        Stamp {
            lamport,
            replica: ReplicaId(replica),
            counter,
        }
    }

    fn update(clock: &[(u64, u64)], lamport: u64, node_stamp: Stamp) -> GraphUpdate<()> {
        GraphUpdate {
            clock: clock.iter().map(|&(r, c)| (ReplicaId(r), c)).collect(),
            lamport,
            nodes: vec![(
                NodeId::new("n"),
                LwwEntry {
                    stamp: node_stamp,
                    value: None,
                },
            )],
            adjacency: Vec::new(),
            log: LogDelta::default(),
        }
    }

    #[test]
    fn accepts_covered_stamps() {
        assert!(update(&[(1, 3)], 5, stamp(5, 1, 3)).check().is_ok());
    }

    #[test]
    fn rejects_uncovered_stamp() {
        let err = update(&[(1, 2)], 5, stamp(5, 1, 3)).check().unwrap_err();
        assert!(err.to_string().contains("not covered"));
    }

    #[test]
    fn rejects_stamp_ahead_of_lamport() {
        let err = update(&[(1, 3)], 4, stamp(5, 1, 3)).check().unwrap_err();
        assert!(matches!(err, CoreError::MalformedUpdate { .. }));
    }
}
