//! Graph error types for cograph-graph.
//!
//! Ordinary refusals of local edits are `bool` returns on the graph types and
//! never show up here. [`GraphError`] is reserved for configuration problems
//! and for invariant violations detected while repairing merged state: those
//! indicate an upstream bug and abort the repair pass.

use cograph_core::CoreError;
use thiserror::Error;

use crate::edge::EdgeKey;

#[derive(Debug, Error)]
pub enum GraphError {
    /// Substrate failure (e.g. an undecodable update).
    #[error(transparent)]
    Core(#[from] CoreError),

    /// A configuration value could not be parsed.
    #[error("invalid configuration: {reason}")]
    InvalidConfig { reason: String },

    /// An edge taking part in a cycle has no entry in the edge log.
    #[error("edge {edge} is part of a cycle but missing from the edge log")]
    MissingEdgeLogEntry { edge: EdgeKey },

    /// No tombstone path reconnects the remaining components.
    #[error("graph is unrepairable: {components} components remain and no restorable path exists")]
    Unrepairable { components: usize },

    /// A post-repair invariant does not hold.
    #[error("invariant violated after repair: {reason}")]
    InvariantViolation { reason: String },
}
