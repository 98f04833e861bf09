//! Simulation error types.
//!
//! Graph and substrate failures pass through unchanged; the remaining
//! variants are verification failures found after a run.

use cograph_core::{CoreError, ReplicaId};
use cograph_graph::GraphError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum SimError {
    #[error(transparent)]
    Graph(#[from] GraphError),

    #[error(transparent)]
    Core(#[from] CoreError),

    #[error("replica {replica} diverged from replica {reference} after a full sync")]
    Diverged {
        replica: ReplicaId,
        reference: ReplicaId,
    },

    #[error("replica {replica} still needs repair after a full sync")]
    StillInvalid { replica: ReplicaId },

    #[error("replicas kept exchanging state after {rounds} rounds")]
    NoQuiescence { rounds: usize },
}
