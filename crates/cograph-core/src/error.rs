//! Core error types for cograph-core.

use thiserror::Error;

/// Errors produced by the replicated substrate.
#[derive(Debug, Error)]
pub enum CoreError {
    /// An encoded update could not be serialized or decoded.
    #[error("update encoding error: {0}")]
    Encoding(#[from] serde_json::Error),

    /// A decoded update is structurally valid JSON but violates the
    /// substrate's own invariants.
    #[error("malformed update: {reason}")]
    MalformedUpdate { reason: String },
}
