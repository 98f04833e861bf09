//! Insertion-ordered replicated array.
//!
//! Entries are identified and ordered by the [`Stamp`] of the write that
//! appended them. Because stamps extend causality, an entry appended after
//! another one was observed always sorts after it, and concurrent appends
//! interleave identically on every replica. Removal records the removed
//! position with its own stamp so that no later merge can bring it back.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::clock::{Stamp, VectorClock};

/// Entries and removals not yet known to a peer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogDelta<T> {
    pub entries: Vec<(Stamp, T)>,
    /// `(removed position, stamp of the removal)`
    pub removed: Vec<(Stamp, Stamp)>,
}

impl<T> Default for LogDelta<T> {
    fn default() -> Self {
        LogDelta {
            entries: Vec::new(),
            removed: Vec::new(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct ReplicatedLog<T> {
    entries: BTreeMap<Stamp, T>,
    removed: BTreeMap<Stamp, Stamp>,
}

impl<T: Clone> Default for ReplicatedLog<T> {
    fn default() -> Self {
        ReplicatedLog {
            entries: BTreeMap::new(),
            removed: BTreeMap::new(),
        }
    }
}

impl<T: Clone> ReplicatedLog<T> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends `value` at the position identified by `stamp`.
    pub fn push(&mut self, value: T, stamp: Stamp) {
        if !self.removed.contains_key(&stamp) {
            self.entries.insert(stamp, value);
        }
    }

    /// Removes the entry at `position`. Returns `false` if it was not present.
    pub fn remove(&mut self, position: &Stamp, stamp: Stamp) -> bool {
        if self.entries.remove(position).is_some() {
            self.removed.insert(*position, stamp);
            true
        } else {
            false
        }
    }

    pub fn get(&self, position: &Stamp) -> Option<&T> {
        self.entries.get(position)
    }

    /// Entries in log order.
    pub fn iter(&self) -> impl DoubleEndedIterator<Item = (&Stamp, &T)> {
        self.entries.iter()
    }

    pub fn values(&self) -> impl DoubleEndedIterator<Item = &T> {
        self.entries.values()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn diff(&self, since: &VectorClock) -> LogDelta<T> {
        LogDelta {
            entries: self
                .entries
                .iter()
                .filter(|(position, _)| !since.covers(position))
                .map(|(position, value)| (*position, value.clone()))
                .collect(),
            removed: self
                .removed
                .iter()
                .filter(|(_, removal)| !since.covers(removal))
                .map(|(position, removal)| (*position, *removal))
                .collect(),
        }
    }

    /// Merges a delta. Returns the greatest stamp it carried.
    pub fn apply(&mut self, delta: LogDelta<T>) -> Option<Stamp> {
        let mut newest = None;
        for (position, removal) in delta.removed {
            newest = newest.max(Some(removal));
            self.entries.remove(&position);
            self.removed.entry(position).or_insert(removal);
        }
        for (position, value) in delta.entries {
            newest = newest.max(Some(position));
            if !self.removed.contains_key(&position) {
                self.entries.entry(position).or_insert(value);
            }
        }
        newest
    }
}
