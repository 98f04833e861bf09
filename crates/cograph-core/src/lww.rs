//! Last-writer-wins replicated map.
//!
//! Each key holds one register: the value written by the greatest [`Stamp`]
//! seen for that key, or a deletion marker. Deletions are stamped writes like
//! any other, so a merge never resurrects a key that was removed by a later
//! write. Used with `V = ()` it doubles as a replicated key set.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::clock::{Stamp, VectorClock};

/// A single register in an [`LwwMap`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LwwEntry<V> {
    pub stamp: Stamp,
    /// `None` marks a deletion.
    pub value: Option<V>,
}

#[derive(Debug, Clone)]
pub struct LwwMap<K, V> {
    entries: BTreeMap<K, LwwEntry<V>>,
}

impl<K: Ord + Clone, V: Clone> Default for LwwMap<K, V> {
    fn default() -> Self {
        LwwMap {
            entries: BTreeMap::new(),
        }
    }
}

impl<K: Ord + Clone, V: Clone> LwwMap<K, V> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, key: &K) -> Option<&V> {
        self.entries.get(key).and_then(|e| e.value.as_ref())
    }

    pub fn contains_key(&self, key: &K) -> bool {
        self.get(key).is_some()
    }

    /// Writes `value` under `key`. Returns `false` if a newer write already
    /// owns the key.
    pub fn insert(&mut self, key: K, value: V, stamp: Stamp) -> bool {
        self.write(key, Some(value), stamp)
    }

    /// Deletes `key` if it currently holds a value.
    pub fn remove(&mut self, key: &K, stamp: Stamp) -> bool {
        if !self.contains_key(key) {
            return false;
        }
        self.write(key.clone(), None, stamp)
    }

    fn write(&mut self, key: K, value: Option<V>, stamp: Stamp) -> bool {
        match self.entries.get(&key) {
            Some(existing) if existing.stamp >= stamp => false,
            _ => {
                self.entries.insert(key, LwwEntry { stamp, value });
                true
            }
        }
    }

    /// Live key/value pairs in key order.
    pub fn iter(&self) -> impl Iterator<Item = (&K, &V)> {
        self.entries
            .iter()
            .filter_map(|(k, e)| e.value.as_ref().map(|v| (k, v)))
    }

    pub fn keys(&self) -> impl Iterator<Item = &K> {
        self.iter().map(|(k, _)| k)
    }

    /// Live pairs whose key is `>= start`, in key order.
    pub fn range_from<'a>(&'a self, start: &K) -> impl Iterator<Item = (&'a K, &'a V)> + 'a {
        self.entries
            .range(start.clone()..)
            .filter_map(|(k, e)| e.value.as_ref().map(|v| (k, v)))
    }

    /// Number of live keys.
    pub fn len(&self) -> usize {
        self.iter().count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Registers (live or deleted) written by operations not covered by
    /// `since`.
    pub fn diff(&self, since: &VectorClock) -> Vec<(K, LwwEntry<V>)> {
        self.entries
            .iter()
            .filter(|(_, e)| !since.covers(&e.stamp))
            .map(|(k, e)| (k.clone(), e.clone()))
            .collect()
    }

    /// Merges received registers. Returns the greatest stamp applied.
    pub fn apply(&mut self, registers: Vec<(K, LwwEntry<V>)>) -> Option<Stamp> {
        let mut newest = None;
        for (key, entry) in registers {
            newest = newest.max(Some(entry.stamp));
            self.write(key, entry.value, entry.stamp);
        }
        newest
    }

    /// Stamps of every register, live or deleted.
    pub fn stamps(&self) -> impl Iterator<Item = &Stamp> {
        self.entries.values().map(|e| &e.stamp)
    }
}

impl<K: Ord + Clone, V: Clone + PartialEq> LwwMap<K, V> {
    /// Equality of live contents, ignoring stamps and deletion markers.
    pub fn live_eq(&self, other: &Self) -> bool {
        self.iter().eq(other.iter())
    }
}
