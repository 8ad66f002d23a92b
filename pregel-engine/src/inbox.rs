//! Worker-local, ephemeral state (§3, §5, §9): the local inbox, the
//! forwarded-vertex set, and the active set. All three are concurrent maps
//! keyed by superstep so that garbage collection discards an entire step's
//! sub-map atomically rather than needing fine-grained per-vertex locking
//! (§9, "shared global map of active vertices").

use std::collections::{HashMap, HashSet};
use std::fmt;
use std::hash::Hash;

use tokio::sync::RwLock;
use tracing::debug;

/// Per-worker mapping `superstep -> (dstKey -> (srcKey -> message))` (§3).
/// Only the current and immediately preceding superstep are retained; older
/// entries are dropped wholesale by [`Inbox::gc`] once SEND for that step
/// completes (§4.5, §9).
pub struct Inbox<K, Msg> {
    steps: RwLock<HashMap<i32, HashMap<K, HashMap<K, Msg>>>>,
}

impl<K, Msg> Default for Inbox<K, Msg> {
    fn default() -> Self {
        Inbox { steps: RwLock::new(HashMap::new()) }
    }
}

impl<K, Msg> Inbox<K, Msg>
where
    K: Eq + Hash + Clone + Send + Sync + fmt::Debug + 'static,
    Msg: Clone + Send + Sync + fmt::Debug + 'static,
{
    pub fn new() -> Self {
        Self::default()
    }

    /// Upsert `inbox[step][dst][src] = msg` (last-writer-wins within a step, §3).
    pub async fn buffer(&self, step: i32, dst: K, src: K, msg: Msg) {
        let mut steps = self.steps.write().await;
        steps.entry(step).or_default().entry(dst).or_default().insert(src, msg);
    }

    /// All destination keys with at least one buffered message at `step`.
    pub async fn destinations_at(&self, step: i32) -> Vec<K> {
        let steps = self.steps.read().await;
        steps.get(&step).map(|d| d.keys().cloned().collect()).unwrap_or_default()
    }

    /// Snapshot of `{srcKey -> message}` buffered for `dst` at `step`.
    pub async fn messages_for(&self, step: i32, dst: &K) -> HashMap<K, Msg> {
        let steps = self.steps.read().await;
        steps.get(&step).and_then(|d| d.get(dst)).cloned().unwrap_or_default()
    }

    /// Ensure `dst` appears in `destinations_at(step)` even with zero
    /// buffered messages (§4.4 stage 2: a work-set entry can carry an empty
    /// seed `message: None`, and the destination must still be forwarded).
    pub async fn ensure_present(&self, step: i32, dst: K) {
        let mut steps = self.steps.write().await;
        steps.entry(step).or_default().entry(dst).or_default();
    }

    /// Discard an entire superstep's sub-map (§4.5 garbage collection).
    pub async fn gc(&self, step: i32) {
        let mut steps = self.steps.write().await;
        if steps.remove(&step).is_some() {
            debug!(step, "garbage collected inbox entry");
        }
    }
}

/// Per-worker mapping `superstep -> set of forwarded dstKey` (§3, §4.4).
/// A late-arriving message invalidates a prior forward by removing the key
/// again, which causes the vertex to be re-forwarded on the next SEND tick.
#[derive(Default)]
pub struct ForwardedSet<K> {
    steps: RwLock<HashMap<i32, HashSet<K>>>,
}

impl<K> ForwardedSet<K>
where
    K: Eq + Hash + Clone + Send + Sync + fmt::Debug + 'static,
{
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn is_forwarded(&self, step: i32, key: &K) -> bool {
        let steps = self.steps.read().await;
        steps.get(&step).map(|s| s.contains(key)).unwrap_or(false)
    }

    pub async fn mark_forwarded(&self, step: i32, key: K) {
        let mut steps = self.steps.write().await;
        steps.entry(step).or_default().insert(key);
    }

    /// Remove `key` from the forwarded set at `step`; a late message
    /// invalidates the prior forward (§4.4 stage 2).
    pub async fn invalidate(&self, step: i32, key: &K) {
        let mut steps = self.steps.write().await;
        if let Some(set) = steps.get_mut(&step) {
            if set.remove(key) {
                debug!(step, ?key, "invalidated prior forward due to late message");
            }
        }
    }

    pub async fn gc(&self, step: i32) {
        self.steps.write().await.remove(&step);
    }
}

/// Per-worker mapping `superstep -> (partition -> set of dstKey)` (§3, §5).
/// Safe for concurrent mutation: the work-set pipeline adds entries when it
/// forwards a vertex into compute, the message dispatcher removes them once
/// a vertex's outgoing messages are all acknowledged (§4.6).
#[derive(Default)]
pub struct ActiveSet<K> {
    steps: RwLock<HashMap<i32, HashMap<usize, HashSet<K>>>>,
    /// Steps during which the dispatcher published at least one outgoing
    /// message. Distinct from "a vertex was forwarded this step" — step 0's
    /// seed forwards every vertex even when nobody sends a message — and is
    /// exactly the signal the leader's convergence check needs (§4.5).
    messages_produced: RwLock<HashSet<i32>>,
}

impl<K> ActiveSet<K>
where
    K: Eq + Hash + Clone + Send + Sync + fmt::Debug + 'static,
{
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn add(&self, step: i32, partition: usize, key: K) {
        let mut steps = self.steps.write().await;
        steps.entry(step).or_default().entry(partition).or_default().insert(key);
    }

    /// Remove `key` from `(step, partition)`. Returns `true` if that
    /// partition's active set is now empty (the dispatcher uses this to
    /// decide whether to clear the partition's barrier-tree marker).
    pub async fn remove(&self, step: i32, partition: usize, key: &K) -> bool {
        let mut steps = self.steps.write().await;
        let Some(partitions) = steps.get_mut(&step) else { return true };
        let Some(set) = partitions.get_mut(&partition) else { return true };
        set.remove(key);
        set.is_empty()
    }

    pub async fn is_partition_empty(&self, step: i32, partition: usize) -> bool {
        let steps = self.steps.read().await;
        steps
            .get(&step)
            .and_then(|p| p.get(&partition))
            .map(|s| s.is_empty())
            .unwrap_or(true)
    }

    /// `true` iff every partition's active set at `step` is empty (used by
    /// the leader's convergence check, §4.5).
    pub async fn is_step_empty(&self, step: i32) -> bool {
        let steps = self.steps.read().await;
        steps.get(&step).map(|p| p.values().all(|s| s.is_empty())).unwrap_or(true)
    }

    pub async fn gc(&self, step: i32) {
        self.steps.write().await.remove(&step);
        self.messages_produced.write().await.remove(&step);
    }

    /// Record that the dispatcher published at least one outgoing message
    /// produced by compute invocations at `step`.
    pub async fn mark_messages_produced(&self, step: i32) {
        self.messages_produced.write().await.insert(step);
    }

    /// `true` iff any outgoing message was produced during `step` (§4.5
    /// termination: convergence requires this to be `false`).
    pub async fn had_messages(&self, step: i32) -> bool {
        self.messages_produced.read().await.contains(&step)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[tokio::test]
    async fn inbox_upsert_is_last_writer_wins() {
        let inbox: Inbox<&str, i32> = Inbox::new();
        inbox.buffer(0, "dst", "src", 1).await;
        inbox.buffer(0, "dst", "src", 2).await;
        let msgs = inbox.messages_for(0, &"dst").await;
        assert_eq!(msgs.get("src"), Some(&2));
    }

    #[tokio::test]
    async fn inbox_ensure_present_forwards_without_a_message() {
        let inbox: Inbox<&str, i32> = Inbox::new();
        inbox.ensure_present(0, "dst").await;
        assert_eq!(inbox.destinations_at(0).await, vec!["dst"]);
        assert!(inbox.messages_for(0, &"dst").await.is_empty());
    }

    #[tokio::test]
    async fn inbox_gc_discards_whole_step() {
        let inbox: Inbox<&str, i32> = Inbox::new();
        inbox.buffer(0, "dst", "src", 1).await;
        inbox.gc(0).await;
        assert!(inbox.destinations_at(0).await.is_empty());
    }

    #[tokio::test]
    async fn forwarded_set_invalidation_allows_reforward() {
        let set: ForwardedSet<&str> = ForwardedSet::new();
        set.mark_forwarded(1, "x").await;
        assert!(set.is_forwarded(1, &"x").await);
        set.invalidate(1, &"x").await;
        assert!(!set.is_forwarded(1, &"x").await);
    }

    #[tokio::test]
    async fn active_set_reports_empty_partition_after_last_removal() {
        let set: ActiveSet<&str> = ActiveSet::new();
        set.add(0, 2, "v1").await;
        assert!(!set.is_partition_empty(0, 2).await);
        let now_empty = set.remove(0, 2, &"v1").await;
        assert!(now_empty);
        assert!(set.is_partition_empty(0, 2).await);
    }

    #[tokio::test]
    async fn messages_produced_is_independent_of_forwarding_activity() {
        let set: ActiveSet<&str> = ActiveSet::new();
        set.add(0, 0, "a").await;
        // A vertex was forwarded (e.g. the step-0 seed) but produced no messages.
        assert!(!set.had_messages(0).await);
        set.mark_messages_produced(0).await;
        assert!(set.had_messages(0).await);
        set.gc(0).await;
        assert!(!set.had_messages(0).await);
    }

    #[tokio::test]
    async fn active_set_step_empty_only_when_all_partitions_drain() {
        let set: ActiveSet<&str> = ActiveSet::new();
        set.add(0, 0, "a").await;
        set.add(0, 1, "b").await;
        assert!(!set.is_step_empty(0).await);
        set.remove(0, 0, &"a").await;
        assert!(!set.is_step_empty(0).await);
        set.remove(0, 1, &"b").await;
        assert!(set.is_step_empty(0).await);
    }

    proptest! {
        /// §8 invariant 4: `inbox[s][d]` equals the set-union of `{(src, msg)}`
        /// buffered for `d` at step `s`, up to last-writer-wins per `(src, d, s)`.
        #[test]
        fn buffering_converges_to_last_writer_wins_per_source(
            writes in prop::collection::vec((0..4i32, 0..4i32), 1..30)
        ) {
            let rt = tokio::runtime::Runtime::new().unwrap();
            rt.block_on(async {
                let inbox: Inbox<i32, i32> = Inbox::new();
                let mut expected: HashMap<i32, i32> = HashMap::new();
                for (src, msg) in writes {
                    inbox.buffer(0, 99, src, msg).await;
                    expected.insert(src, msg);
                }
                let got = inbox.messages_for(0, &99).await;
                prop_assert_eq!(got, expected);
                Ok(())
            })?;
        }
    }
}
