//! # pregel-state — data model and external-interface abstractions for a
//! distributed Pregel-style BSP graph engine
//!
//! This crate holds the leaf layer of the engine (`pregel-engine` depends on
//! it): the immutable [`PregelState`] cursor, the solution-set
//! [`VertexEntry`] and read-only [`EdgeEntry`] types, the in-log
//! [`WorkSetEntry`] record, and the two trait abstractions over the
//! computation's external collaborators named in the engine's non-goals —
//! [`Log`] (the durable partitioned log carrying `vertices`,
//! `edgesGroupedBySource`, `solutionSet`, and `workSet`) and
//! [`CoordinationGateway`] (group membership, leader election, the
//! replicated shared value, and the barrier tree).
//!
//! Both traits ship an in-process reference implementation —
//! [`InMemoryLog`] and [`InMemoryCoordinationGateway`] — built on
//! `tokio::sync` primitives, so the engine crate can be exercised end to end
//! without any external broker or coordination service. Production
//! deployments supply their own implementations against a real log broker
//! and coordination service.
//!
//! ## Module Organization
//!
//! - [`pregel_state`] — [`Lifecycle`], [`Phase`], [`PregelState`]
//! - [`vertex_entry`] — [`VertexEntry`], the double-buffered solution-set value
//! - [`edge_entry`] — [`EdgeEntry`], the read-only out-edge list
//! - [`work_set`] — [`WorkSetEntry`], the in-log message record
//! - [`log`] — [`Log`] trait, [`InMemoryLog`], [`LogBundle`]
//! - [`coordination`] — [`CoordinationGateway`] trait, [`InMemoryCoordinationGateway`],
//!   barrier-tree path helpers
//! - [`error`] — [`StateError`]

pub mod coordination;
pub mod edge_entry;
pub mod error;
pub mod log;
pub mod pregel_state;
pub mod vertex_entry;
pub mod work_set;

pub use coordination::{CoordinationGateway, InMemoryCoordinationGateway};
pub use edge_entry::EdgeEntry;
pub use error::{Result, StateError};
pub use log::{InMemoryLog, Log, LogBundle};
pub use pregel_state::{Lifecycle, Phase, PregelState};
pub use vertex_entry::VertexEntry;
pub use work_set::WorkSetEntry;
