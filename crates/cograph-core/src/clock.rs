//! Causality primitives: replica identity, Lamport stamps and vector clocks.
//!
//! Every local mutation of a replicated structure is tagged with a [`Stamp`]
//! obtained from [`Replica::tick`]. Stamps are totally ordered by
//! `(lamport, replica, counter)`, an order that extends causality, so any two
//! replicas that hold the same set of stamped writes agree on which write wins.
//!
//! [`VectorClock`] summarises causal knowledge per replica. It drives delta
//! computation (`covers`) and the causal tie-breaks used by the repair
//! engines (`leq` / `less`).

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

/// Identity of one replica participating in the replicated graph.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ReplicaId(pub u64);

impl fmt::Display for ReplicaId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Identity and ordering key of a single replicated write.
///
/// `counter` is the issuing replica's local operation count, which is what
/// vector clocks track. `lamport` places the write in a causally consistent
/// total order across replicas.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Stamp {
    pub lamport: u64,
    pub replica: ReplicaId,
    pub counter: u64,
}

impl Stamp {
    /// Stamp shared by state that every replica creates identically at
    /// construction time (e.g. the fixed root node). Always covered by any
    /// vector clock, so it never travels in a delta.
    pub const GENESIS: Stamp = Stamp {
        lamport: 0,
        replica: ReplicaId(0),
        counter: 0,
    };
}

impl fmt::Display for Stamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}#{}", self.lamport, self.replica, self.counter)
    }
}

/// Per-replica operation counters.
///
/// Missing entries are treated as 0 everywhere.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct VectorClock(BTreeMap<ReplicaId, u64>);

impl VectorClock {
    pub fn new() -> Self {
        VectorClock(BTreeMap::new())
    }

    /// Counter recorded for `replica` (0 if absent).
    pub fn get(&self, replica: ReplicaId) -> u64 {
        self.0.get(&replica).copied().unwrap_or(0)
    }

    /// Raises the entry for `replica` to at least `counter`.
    pub fn observe(&mut self, replica: ReplicaId, counter: u64) {
        let entry = self.0.entry(replica).or_insert(0);
        if counter > *entry {
            *entry = counter;
        }
    }

    /// Pointwise maximum with `other`.
    pub fn merge(&mut self, other: &VectorClock) {
        for (&replica, &counter) in &other.0 {
            self.observe(replica, counter);
        }
    }

    /// Returns `true` if the write identified by `stamp` is already known.
    pub fn covers(&self, stamp: &Stamp) -> bool {
        stamp.counter <= self.get(stamp.replica)
    }

    /// Component-wise `self <= other`.
    pub fn leq(&self, other: &VectorClock) -> bool {
        self.0
            .iter()
            .all(|(&replica, &counter)| counter <= other.get(replica))
    }

    /// Strict causal precedence: `self <= other` and not `other <= self`.
    pub fn less(&self, other: &VectorClock) -> bool {
        self.leq(other) && !other.leq(self)
    }

    pub fn iter(&self) -> impl Iterator<Item = (ReplicaId, u64)> + '_ {
        self.0.iter().map(|(&r, &c)| (r, c))
    }

    pub fn is_empty(&self) -> bool {
        self.0.values().all(|&c| c == 0)
    }
}

impl FromIterator<(ReplicaId, u64)> for VectorClock {
    fn from_iter<I: IntoIterator<Item = (ReplicaId, u64)>>(iter: I) -> Self {
        let mut clock = VectorClock::new();
        for (replica, counter) in iter {
            clock.observe(replica, counter);
        }
        clock
    }
}

/// Local clock state of one replica.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Replica {
    id: ReplicaId,
    lamport: u64,
    counter: u64,
    clock: VectorClock,
}

impl Replica {
    pub fn new(id: ReplicaId) -> Self {
        Replica {
            id,
            lamport: 0,
            counter: 0,
            clock: VectorClock::new(),
        }
    }

    pub fn id(&self) -> ReplicaId {
        self.id
    }

    /// The replica's current version vector.
    pub fn clock(&self) -> &VectorClock {
        &self.clock
    }

    pub fn lamport(&self) -> u64 {
        self.lamport
    }

    /// Issues the stamp for the next local write.
    pub fn tick(&mut self) -> Stamp {
        self.lamport += 1;
        self.counter += 1;
        self.clock.observe(self.id, self.counter);
        Stamp {
            lamport: self.lamport,
            replica: self.id,
            counter: self.counter,
        }
    }

    /// Folds in the causal knowledge carried by a received update.
    pub fn absorb(&mut self, clock: &VectorClock, lamport: u64) {
        self.clock.merge(clock);
        self.lamport = self.lamport.max(lamport);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn clock(entries: &[(u64, u64)]) -> VectorClock {
        entries.iter().map(|&(r, c)| (ReplicaId(r), c)).collect()
    }

    #[test]
    fn missing_entries_count_as_zero() {
        let a = clock(&[(1, 2)]);
        let b = clock(&[(1, 2), (2, 0)]);
        assert!(a.leq(&b));
        assert!(b.leq(&a));
        assert!(!a.less(&b));
        assert!(!b.less(&a));
    }

    #[test]
    fn strict_precedence() {
        let a = clock(&[(1, 2)]);
        let b = clock(&[(1, 2), (2, 1)]);
        assert!(a.less(&b));
        assert!(!b.less(&a));
    }

    #[test]
    fn concurrent_clocks() {
        let a = clock(&[(1, 3)]);
        let b = clock(&[(1, 2), (2, 1)]);
        assert!(!a.leq(&b));
        assert!(!b.leq(&a));
    }

    #[test]
    fn tick_advances_clock_and_lamport() {
        let mut replica = Replica::new(ReplicaId(7));
        let first = replica.tick();
        let second = replica.tick();
        assert!(first < second);
        assert_eq!(second.counter, 2);
        assert_eq!(replica.clock().get(ReplicaId(7)), 2);
        assert!(replica.clock().covers(&first));
    }

    #[test]
    fn absorb_keeps_stamps_monotonic() {
        let mut a = Replica::new(ReplicaId(1));
        let mut b = Replica::new(ReplicaId(2));
        for _ in 0..5 {
            b.tick();
        }
        a.absorb(b.clock(), b.lamport());
        let next = a.tick();
        assert_eq!(next.lamport, 6);
        assert_eq!(a.clock().get(ReplicaId(2)), 5);
    }

    #[test]
    fn genesis_is_always_covered() {
        assert!(VectorClock::new().covers(&Stamp::GENESIS));
    }

    #[test]
    fn serde_roundtrip() {
        let c = clock(&[(1, 4), (9, 2)]);
        let json = serde_json::to_string(&c).unwrap();
        let back: VectorClock = serde_json::from_str(&json).unwrap();
        assert_eq!(c, back);
    }
}
