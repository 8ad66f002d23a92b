//! Error types for the superstep coordination engine (§7, §10.2).
//!
//! `PregelError` is the crate's single error currency. It mirrors the four
//! error kinds named in §7 — `CoordinationError`, `LogError`,
//! `UserComputeError`, `InvariantViolation` — plus the ambient variants any
//! non-trivial async Rust crate needs (serialization, I/O, configuration,
//! timeout). Each kind gets a small constructor helper so call sites build
//! errors through a function rather than matching on the enum shape by hand.

use thiserror::Error;

/// Result type for engine operations.
pub type Result<T> = std::result::Result<T, PregelError>;

#[derive(Error, Debug)]
pub enum PregelError {
    /// Lost connection to the coordination store, a barrier path vanished
    /// unexpectedly, or the shared value failed to decode. Retried inside
    /// the periodic barrier tick (§4.5, §7); surfaced as a failed completion
    /// only once retries are exhausted.
    #[error("coordination error: {0}")]
    Coordination(String),

    /// A log producer send failed after internal retries, or a consumer
    /// fetch failed. Fatal for the affected partition task — the inbox is
    /// reconstructible by replaying the work-set log, so no data is lost.
    #[error("log error: {0}")]
    Log(String),

    /// The user-supplied compute function returned an error. Logged with
    /// vertex context; the engine does not attempt to skip the vertex.
    #[error("compute error for vertex {vertex}: {source}")]
    UserCompute {
        vertex: String,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    /// A condition the engine assumes can never happen was observed, e.g.
    /// the barrier synchronizer entering SEND with an unsynchronised
    /// work-set topic. Always a bug; fails fast rather than limping on.
    #[error("invariant violated: {0}")]
    Invariant(String),

    /// A `tokio::time::timeout` elapsed while waiting on the coordination
    /// store (§5's bounded 5s default) or another bounded wait.
    #[error("operation timed out: {0}")]
    Timeout(String),

    /// `PregelConfig` was constructed with an invalid combination of values.
    #[error("invalid configuration: {0}")]
    Configuration(String),

    /// JSON (de)serialization of an opaque byte payload failed.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// The stable binary encoding of `PregelState` failed to decode.
    #[error("state error: {0}")]
    State(#[from] pregel_state::StateError),

    /// I/O error surfaced by a backend implementation.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl PregelError {
    pub fn coordination(msg: impl Into<String>) -> Self {
        PregelError::Coordination(msg.into())
    }

    pub fn log(msg: impl Into<String>) -> Self {
        PregelError::Log(msg.into())
    }

    pub fn user_compute(
        vertex: impl Into<String>,
        source: Box<dyn std::error::Error + Send + Sync>,
    ) -> Self {
        PregelError::UserCompute { vertex: vertex.into(), source }
    }

    pub fn invariant(msg: impl Into<String>) -> Self {
        PregelError::Invariant(msg.into())
    }

    pub fn timeout(msg: impl Into<String>) -> Self {
        PregelError::Timeout(msg.into())
    }

    pub fn configuration(msg: impl Into<String>) -> Self {
        PregelError::Configuration(msg.into())
    }

    /// Transient errors are worth retrying on the next barrier tick (§7);
    /// everything else is fatal and should propagate.
    pub fn is_transient(&self) -> bool {
        matches!(self, PregelError::Coordination(_) | PregelError::Log(_) | PregelError::Timeout(_))
    }
}
