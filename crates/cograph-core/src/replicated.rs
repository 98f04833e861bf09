//! State exchange between replicas.
//!
//! [`Replicated`] is the storage-side contract every graph variant
//! implements: compute what a peer is missing relative to its version
//! vector, apply what a peer sent, and move both through a byte encoding.

use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::clock::VectorClock;
use crate::error::CoreError;

/// A replicated structure that can exchange deltas with its peers.
///
/// `apply` must be commutative, associative and idempotent: applying the
/// same updates in any order, any number of times, yields the same state.
pub trait Replicated {
    /// Delta payload produced by [`diff`](Self::diff).
    type Update: Serialize + DeserializeOwned;

    /// Version vector describing everything this replica has observed.
    fn state_vector(&self) -> VectorClock;

    /// Everything this replica knows that `since` does not cover.
    fn diff(&self, since: &VectorClock) -> Self::Update;

    /// Merges a received update.
    fn apply(&mut self, update: Self::Update);

    /// Structural checks run on decoded updates before they are applied.
    fn validate(update: &Self::Update) -> Result<(), CoreError> {
        let _ = update;
        Ok(())
    }

    /// Pulls everything `other` knows into `self`.
    fn merge_from(&mut self, other: &Self)
    where
        Self: Sized,
    {
        let update = other.diff(&self.state_vector());
        self.apply(update);
    }

    /// Encodes the delta relative to a peer's version vector.
    fn encode_update(&self, since: &VectorClock) -> Result<Vec<u8>, CoreError> {
        Ok(serde_json::to_vec(&self.diff(since))?)
    }

    /// Decodes, validates and applies an encoded delta.
    fn apply_encoded(&mut self, bytes: &[u8]) -> Result<(), CoreError> {
        let update: Self::Update = serde_json::from_slice(bytes)?;
        Self::validate(&update)?;
        self.apply(update);
        Ok(())
    }
}
