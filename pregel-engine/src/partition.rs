//! The partition router (§4.3): a deterministic function mapping a vertex
//! key to one of `P` partitions, stable across workers and restarts.

use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::marker::PhantomData;

/// `partitionOf(key) = positiveMod(hash(key), P)`.
///
/// Implementors must agree with whatever hash a real log's producer
/// partitioner uses, so that a message the engine routes lands on the same
/// partition the log would have chosen for that key (§4.3).
pub trait PartitionRouter<K>: Send + Sync {
    fn partition_of(&self, key: &K) -> usize;
    fn partition_count(&self) -> usize;
}

/// The reference router: `std::collections::hash_map::DefaultHasher`
/// (SipHash with a fixed, non-randomized key pair) rather than
/// `RandomState`/`ahash`-style per-process-randomized hashers. This is
/// deliberate, not an oversight — §4.3 requires the hash to be
/// "deterministic across workers and stable across restarts", and a
/// randomized hasher would disagree with itself across two processes
/// running the very same key.
pub struct HashPartitionRouter<K> {
    partition_count: usize,
    _marker: PhantomData<fn(&K)>,
}

impl<K> HashPartitionRouter<K> {
    pub fn new(partition_count: usize) -> Self {
        assert!(partition_count > 0, "partition_count must be positive");
        HashPartitionRouter { partition_count, _marker: PhantomData }
    }
}

impl<K: Hash> PartitionRouter<K> for HashPartitionRouter<K> {
    fn partition_of(&self, key: &K) -> usize {
        let mut hasher = DefaultHasher::new();
        key.hash(&mut hasher);
        let h = hasher.finish();
        (h % self.partition_count as u64) as usize
    }

    fn partition_count(&self) -> usize {
        self.partition_count
    }
}
