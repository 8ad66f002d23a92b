//! # pregel-engine — superstep coordination engine for a distributed
//! Pregel-style BSP graph computation
//!
//! This crate implements the hard part described in the system overview: the
//! barrier protocol across workers, the per-worker state machine that
//! alternates between a RECEIVE and a SEND phase, the vertex-compute
//! pipeline that joins messages with edges and applies the user function,
//! and the message-delivery layer that routes outgoing messages to the
//! correct partition for the next superstep. It depends on `pregel-state`
//! for the data model ([`pregel_state::PregelState`], solution-set and
//! work-set entries) and the `Log`/`CoordinationGateway` trait
//! abstractions over the durable log and coordination store.
//!
//! ## Module Organization
//!
//! - [`partition`] — [`partition::PartitionRouter`], [`partition::HashPartitionRouter`]
//! - [`inbox`] — [`inbox::Inbox`], [`inbox::ForwardedSet`], [`inbox::ActiveSet`]: the
//!   worker-local ephemeral state the pipeline and barrier synchronizer share
//! - [`compute`] — [`compute::Compute`], [`compute::ComputeOutput`]: the user vertex-program contract
//! - [`pipeline`] — [`pipeline::WorkSetPipeline`]: filter/buffer/forward/compute/dispatch
//! - [`dispatcher`] — [`dispatcher::MessageDispatcher`]: publishes outgoing messages and
//!   keeps barrier-tree partition markers consistent with the active set
//! - [`barrier`] — [`barrier::BarrierSynchronizer`]: the periodic per-worker tick that
//!   drives the shared `PregelState` forward
//! - [`driver`] — [`driver::PregelDriver`]: the façade an embedding application calls
//! - [`config`] — [`config::PregelConfig`]
//! - [`error`] — [`error::PregelError`]
//!
//! ## Quick start
//!
//! ```rust,ignore
//! use std::collections::HashMap;
//! use std::sync::Arc;
//!
//! use async_trait::async_trait;
//! use pregel_engine::compute::{Compute, ComputeOutput};
//! use pregel_engine::config::PregelConfig;
//! use pregel_engine::driver::PregelDriver;
//! use pregel_engine::partition::HashPartitionRouter;
//! use pregel_state::{EdgeEntry, InMemoryCoordinationGateway, LogBundle};
//!
//! struct MaxPropagate;
//!
//! #[async_trait]
//! impl Compute<String, i64, (), i64> for MaxPropagate {
//!     async fn compute(
//!         &self,
//!         _step: i32,
//!         _vertex: &String,
//!         vertex_value: &i64,
//!         incoming: &HashMap<String, i64>,
//!         edges: &EdgeEntry<String, ()>,
//!         output: &mut ComputeOutput<String, i64, i64>,
//!     ) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
//!         if let Some(&max_incoming) = incoming.values().max() {
//!             let new_value = (*vertex_value).max(max_incoming);
//!             output.set_new_vertex_value(Some(new_value));
//!             for (dst, _) in edges.iter() {
//!                 output.send_message_to(dst.clone(), new_value);
//!             }
//!         }
//!         Ok(())
//!     }
//! }
//!
//! #[tokio::main]
//! async fn main() {
//!     let logs = Arc::new(LogBundle::in_memory(1));
//!     let router = Arc::new(HashPartitionRouter::new(1));
//!     let coordination = Arc::new(InMemoryCoordinationGateway::new());
//!     let config = Arc::new(PregelConfig::new("demo", "worker-0").with_max_iterations(10));
//!
//!     let driver = PregelDriver::new(logs, router, Arc::new(MaxPropagate), coordination, config, vec![0]);
//!     driver.prepare(vec![("a".to_string(), 0i64)], vec![], HashMap::new()).await.unwrap();
//!     driver.run().await.unwrap();
//!     driver.await_completion().await.unwrap();
//!     println!("{:?}", driver.result().await);
//! }
//! ```

pub mod barrier;
pub mod compute;
pub mod config;
pub mod dispatcher;
pub mod driver;
pub mod error;
pub mod inbox;
pub mod partition;
pub mod pipeline;

pub use barrier::BarrierSynchronizer;
pub use compute::{Compute, ComputeOutput};
pub use config::PregelConfig;
pub use dispatcher::MessageDispatcher;
pub use driver::PregelDriver;
pub use error::{PregelError, Result};
pub use inbox::{ActiveSet, ForwardedSet, Inbox};
pub use partition::{HashPartitionRouter, PartitionRouter};
pub use pipeline::WorkSetPipeline;
