//! Arena-by-id storage shared by every graph variant.
//!
//! A [`GraphStore`] owns the replica clock plus three replicated tables:
//! node records keyed by [`NodeId`], adjacency entries keyed by [`AdjKey`],
//! and a variant-specific log (the edge log for the acyclic variant, the
//! tombstone log for the fixed-root variants). Nothing holds references
//! into another node; every relation is a lookup by id.
//!
//! An adjacency entry is *visible* only while its owner is live and the
//! entry was written against the owner's current incarnation.

use cograph_core::{LwwMap, Replica, ReplicaId, ReplicatedLog, Stamp, VectorClock};

use crate::edge::{AdjEntry, AdjKey};
use crate::graph::GraphUpdate;
use crate::id::NodeId;
use crate::node::{NodeRecord, Position};

#[derive(Debug, Clone)]
pub(crate) struct GraphStore<T> {
    pub(crate) replica: Replica,
    pub(crate) nodes: LwwMap<NodeId, NodeRecord>,
    pub(crate) adjacency: LwwMap<AdjKey, AdjEntry>,
    pub(crate) log: ReplicatedLog<T>,
}

impl<T: Clone> GraphStore<T> {
    pub(crate) fn new(replica: ReplicaId) -> Self {
        GraphStore {
            replica: Replica::new(replica),
            nodes: LwwMap::new(),
            adjacency: LwwMap::new(),
            log: ReplicatedLog::new(),
        }
    }

    pub(crate) fn tick(&mut self) -> Stamp {
        self.replica.tick()
    }

    pub(crate) fn clock(&self) -> VectorClock {
        self.replica.clock().clone()
    }

    // -----------------------------------------------------------------------
    // Nodes
    // -----------------------------------------------------------------------

    pub(crate) fn record(&self, id: &NodeId) -> Option<&NodeRecord> {
        self.nodes.get(id)
    }

    pub(crate) fn is_live(&self, id: &NodeId) -> bool {
        self.nodes.contains_key(id)
    }

    pub(crate) fn node_ids(&self) -> impl Iterator<Item = &NodeId> {
        self.nodes.keys()
    }

    /// Creates a fresh incarnation of `id`.
    pub(crate) fn insert_node(&mut self, id: NodeId, label: String, position: Position) -> bool {
        let stamp = self.tick();
        let record = NodeRecord {
            label,
            position,
            incarnation: stamp,
        };
        self.nodes.insert(id, record, stamp)
    }

    /// Writes a record whose incarnation was chosen by the caller.
    pub(crate) fn insert_record(&mut self, id: NodeId, record: NodeRecord) -> bool {
        let stamp = self.tick();
        self.nodes.insert(id, record, stamp)
    }

    /// Rewrites a live node's attributes, keeping its incarnation.
    pub(crate) fn update_node(&mut self, id: &NodeId, f: impl FnOnce(&mut NodeRecord)) -> bool {
        let Some(mut record) = self.record(id).cloned() else {
            return false;
        };
        f(&mut record);
        let stamp = self.tick();
        self.nodes.insert(id.clone(), record, stamp)
    }

    /// Deletes a node together with every entry it owns.
    pub(crate) fn erase_node(&mut self, id: &NodeId) -> bool {
        let owned: Vec<AdjKey> = self.entries_of(id).map(|(k, _)| k.clone()).collect();
        for key in owned {
            self.erase_entry(&key);
        }
        let stamp = self.tick();
        self.nodes.remove(id, stamp)
    }

    // -----------------------------------------------------------------------
    // Adjacency
    // -----------------------------------------------------------------------

    fn is_current(&self, key: &AdjKey, entry: &AdjEntry) -> bool {
        self.record(&key.owner)
            .is_some_and(|r| r.incarnation == entry.incarnation)
    }

    /// The visible entry under `key`, if any.
    pub(crate) fn entry(&self, key: &AdjKey) -> Option<&AdjEntry> {
        self.adjacency
            .get(key)
            .filter(|entry| self.is_current(key, entry))
    }

    /// Visible entries owned by `owner`, in key order.
    pub(crate) fn entries_of<'a>(
        &'a self,
        owner: &'a NodeId,
    ) -> impl Iterator<Item = (&'a AdjKey, &'a AdjEntry)> + 'a {
        let incarnation = self.record(owner).map(|r| r.incarnation);
        self.adjacency
            .range_from(&AdjKey::first_of(owner))
            .take_while(move |(k, _)| &k.owner == owner)
            .filter(move |(_, e)| Some(e.incarnation) == incarnation)
    }

    /// Every visible entry, in key order.
    pub(crate) fn visible_entries(&self) -> impl Iterator<Item = (&AdjKey, &AdjEntry)> {
        self.adjacency
            .iter()
            .filter(move |(k, e)| self.is_current(k, e))
    }

    /// Writes an entry against the owner's current incarnation. Refused if
    /// the owner is not live.
    pub(crate) fn write_entry(&mut self, key: AdjKey, label: String) -> bool {
        let Some(incarnation) = self.record(&key.owner).map(|r| r.incarnation) else {
            return false;
        };
        let stamp = self.tick();
        self.adjacency
            .insert(key, AdjEntry { label, incarnation }, stamp)
    }

    pub(crate) fn erase_entry(&mut self, key: &AdjKey) -> bool {
        if self.entry(key).is_none() {
            return false;
        }
        let stamp = self.tick();
        self.adjacency.remove(key, stamp)
    }

    // -----------------------------------------------------------------------
    // Log
    // -----------------------------------------------------------------------

    /// Appends to the log, returning the entry's position.
    pub(crate) fn push_log(&mut self, value: T) -> Stamp {
        let position = self.tick();
        self.log.push(value, position);
        position
    }

    pub(crate) fn remove_log(&mut self, position: &Stamp) -> bool {
        let stamp = self.tick();
        self.log.remove(position, stamp)
    }

    // -----------------------------------------------------------------------
    // State exchange
    // -----------------------------------------------------------------------

    pub(crate) fn diff(&self, since: &VectorClock) -> GraphUpdate<T> {
        GraphUpdate {
            clock: self.clock(),
            lamport: self.replica.lamport(),
            nodes: self.nodes.diff(since),
            adjacency: self.adjacency.diff(since),
            log: self.log.diff(since),
        }
    }

    pub(crate) fn apply(&mut self, update: GraphUpdate<T>) {
        let newest = [
            self.nodes.apply(update.nodes),
            self.adjacency.apply(update.adjacency),
            self.log.apply(update.log),
        ]
        .into_iter()
        .flatten()
        .map(|stamp| stamp.lamport)
        .fold(update.lamport, u64::max);
        self.replica.absorb(&update.clock, newest);
    }
}
