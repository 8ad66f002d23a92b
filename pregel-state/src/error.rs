//! Error types for the state layer: the durable log and coordination store
//! abstractions, and the wire encoding of [`crate::pregel_state::PregelState`].

use thiserror::Error;

/// Result type for state-layer operations.
pub type Result<T> = std::result::Result<T, StateError>;

/// Errors that can occur in the durable log / coordination store abstractions.
#[derive(Error, Debug)]
pub enum StateError {
    /// Requested entry not found (e.g. a shared-value path never initialized).
    #[error("not found: {0}")]
    NotFound(String),

    /// JSON serialization error, used for opaque byte-value payloads.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Lost connection to the coordination store or log broker.
    #[error("connection lost: {0}")]
    ConnectionLost(String),

    /// Underlying storage error (disk, broker, coordination service).
    #[error("storage error: {0}")]
    Storage(String),

    /// Decoded value failed an invariant check.
    #[error("invalid value: {0}")]
    Invalid(String),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Catch-all for backend-specific errors that don't fit the other kinds.
    #[error("{0}")]
    Custom(String),
}
