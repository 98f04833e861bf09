//! Replicated state substrate for the cograph graph types.
//!
//! Provides the small set of state-based CRDT building blocks the graph
//! variants are layered on:
//!
//! - [`clock`]: replica identity, Lamport [`Stamp`]s and [`VectorClock`]s
//! - [`lww`]: [`LwwMap`], a last-writer-wins map (also used as a key set)
//! - [`log`]: [`ReplicatedLog`], an insertion-ordered array with stable removal
//! - [`replicated`]: the [`Replicated`] state-exchange trait
//! - [`error`]: [`CoreError`]
//!
//! Every merge in this crate is commutative, associative and idempotent.

pub mod clock;
pub mod error;
pub mod log;
pub mod lww;
pub mod replicated;

pub use clock::{Replica, ReplicaId, Stamp, VectorClock};
pub use error::CoreError;
pub use log::{LogDelta, ReplicatedLog};
pub use lww::{LwwEntry, LwwMap};
pub use replicated::Replicated;
