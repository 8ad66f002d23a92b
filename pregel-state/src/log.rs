//! The durable partitioned log abstraction (§6, §10.5).
//!
//! `vertices`, `edgesGroupedBySource`, `solutionSet`, and `workSet` are all
//! instances of the same [`Log`] trait, partitioned by the same key hash as
//! the [`crate::partition`]-router-equivalent used by the engine (the router
//! itself lives in `pregel-engine`, which is the only crate that needs to
//! agree with a log's producer partitioner on the hash). This crate only
//! needs to model "a partitioned, appendable, consumable stream keyed by K"
//! plus the position/end-offset/pause/resume surface the barrier
//! synchronizer drives directly (§9: no reflective extraction of consumer
//! internals — it's a first-class part of this trait).

use std::fmt;
use std::hash::Hash;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::{Notify, RwLock};
use tracing::debug;

use crate::error::Result;

/// A partitioned, appendable, consumable log of `K -> V` records.
///
/// Implementors may be compacted (`vertices`, `edgesGroupedBySource`,
/// `solutionSet`) or retention-based (`workSet`) per §6; this trait only
/// captures the consumption surface the engine needs, not compaction policy.
#[async_trait]
pub trait Log<K, V>: Send + Sync
where
    K: Eq + Hash + Clone + Send + Sync + fmt::Debug + 'static,
    V: Clone + Send + Sync + fmt::Debug + 'static,
{
    /// Number of partitions this log is divided into.
    fn partition_count(&self) -> usize;

    /// Durably append `(key, value)` to `partition`. Returns only after the
    /// write is acknowledged — the happens-before edge §5 relies on for
    /// "message durably enqueued" precedes "partition marker written".
    async fn publish(&self, partition: usize, key: K, value: V) -> Result<()>;

    /// Drain all records appended to `partition` since this consumer's last
    /// poll, advancing its local position. Returns an empty vec (without
    /// error) while the partition is paused.
    async fn poll(&self, partition: usize) -> Result<Vec<(K, V)>>;

    /// This consumer's local position (number of records consumed) on `partition`.
    async fn position(&self, partition: usize) -> Result<u64>;

    /// The partition's current durable end offset (number of records appended).
    async fn end_offset(&self, partition: usize) -> Result<u64>;

    /// `true` once `position(partition) == end_offset(partition)`, i.e. the
    /// consumer has no unconsumed backlog on that partition (§4.5 "locally synced").
    async fn is_synced(&self, partition: usize) -> Result<bool> {
        Ok(self.position(partition).await? == self.end_offset(partition).await?)
    }

    /// Pause consumption on `partition`; subsequent `poll`s return empty.
    async fn pause(&self, partition: usize) -> Result<()>;

    /// Resume consumption on `partition`.
    async fn resume(&self, partition: usize) -> Result<()>;
}

struct PartitionState<K, V> {
    records: Vec<(K, V)>,
    position: u64,
    paused: bool,
}

impl<K, V> Default for PartitionState<K, V> {
    fn default() -> Self {
        PartitionState { records: Vec::new(), position: 0, paused: false }
    }
}

/// In-process reference implementation of [`Log`], backed by
/// `Arc<RwLock<..>>`-guarded partition vectors (§10.5). Not a mock: fully
/// functional, usable to run the engine end-to-end in a single process.
pub struct InMemoryLog<K, V> {
    partitions: Vec<RwLock<PartitionState<K, V>>>,
    notify: Notify,
}

impl<K, V> InMemoryLog<K, V>
where
    K: Eq + Hash + Clone + Send + Sync + fmt::Debug + 'static,
    V: Clone + Send + Sync + fmt::Debug + 'static,
{
    pub fn new(partition_count: usize) -> Self {
        let mut partitions = Vec::with_capacity(partition_count);
        partitions.resize_with(partition_count, || RwLock::new(PartitionState::default()));
        InMemoryLog { partitions, notify: Notify::new() }
    }

    /// Wait until a publish happens on any partition, or the timeout elapses.
    /// Used by pollers that want to avoid a tight spin loop.
    pub async fn notified(&self) {
        self.notify.notified().await;
    }
}

#[async_trait]
impl<K, V> Log<K, V> for InMemoryLog<K, V>
where
    K: Eq + Hash + Clone + Send + Sync + fmt::Debug + 'static,
    V: Clone + Send + Sync + fmt::Debug + 'static,
{
    fn partition_count(&self) -> usize {
        self.partitions.len()
    }

    async fn publish(&self, partition: usize, key: K, value: V) -> Result<()> {
        let mut state = self.partitions[partition].write().await;
        state.records.push((key, value));
        self.notify.notify_waiters();
        debug!(partition, end_offset = state.records.len(), "published log record");
        Ok(())
    }

    async fn poll(&self, partition: usize) -> Result<Vec<(K, V)>> {
        let mut state = self.partitions[partition].write().await;
        if state.paused {
            return Ok(Vec::new());
        }
        let pos = state.position as usize;
        let out = state.records[pos..].to_vec();
        state.position = state.records.len() as u64;
        Ok(out)
    }

    async fn position(&self, partition: usize) -> Result<u64> {
        Ok(self.partitions[partition].read().await.position)
    }

    async fn end_offset(&self, partition: usize) -> Result<u64> {
        Ok(self.partitions[partition].read().await.records.len() as u64)
    }

    async fn pause(&self, partition: usize) -> Result<()> {
        self.partitions[partition].write().await.paused = true;
        Ok(())
    }

    async fn resume(&self, partition: usize) -> Result<()> {
        self.partitions[partition].write().await.paused = false;
        Ok(())
    }
}

/// Convenience bundle of the four named logs an engine deployment wires
/// together (§6): `vertices`, `edgesGroupedBySource`, `solutionSet`, `workSet`.
pub struct LogBundle<K, VV, EV, Msg> {
    pub vertices: Arc<dyn Log<K, VV>>,
    pub edges_grouped_by_source: Arc<dyn Log<K, crate::edge_entry::EdgeEntry<K, EV>>>,
    pub solution_set: Arc<dyn Log<K, crate::vertex_entry::VertexEntry<VV>>>,
    pub work_set: Arc<dyn Log<K, crate::work_set::WorkSetEntry<K, Msg>>>,
}

impl<K, VV, EV, Msg> LogBundle<K, VV, EV, Msg>
where
    K: Eq + Hash + Clone + Send + Sync + fmt::Debug + 'static,
    VV: Clone + Send + Sync + fmt::Debug + 'static,
    EV: Clone + Send + Sync + fmt::Debug + 'static,
    Msg: Clone + Send + Sync + fmt::Debug + 'static,
{
    /// Build a fully in-memory bundle with `partition_count` partitions on every stream.
    pub fn in_memory(partition_count: usize) -> Self {
        LogBundle {
            vertices: Arc::new(InMemoryLog::new(partition_count)),
            edges_grouped_by_source: Arc::new(InMemoryLog::new(partition_count)),
            solution_set: Arc::new(InMemoryLog::new(partition_count)),
            work_set: Arc::new(InMemoryLog::new(partition_count)),
        }
    }
}
