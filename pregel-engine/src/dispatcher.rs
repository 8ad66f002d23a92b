//! The message dispatcher (§4.6): publishes a vertex's outgoing messages to
//! the work-set log partition owning each destination, records partition
//! activity markers in the barrier tree, and clears them once a vertex's
//! sends are all acknowledged.

use std::collections::HashMap;
use std::fmt;
use std::hash::Hash;
use std::sync::Arc;
use std::time::Duration;

use rand::Rng;
use tracing::{debug, warn};

use pregel_state::coordination::{barrier_path, partition_child_name};
use pregel_state::{CoordinationGateway, Log, Phase, WorkSetEntry};

use crate::config::PregelConfig;
use crate::error::{PregelError, Result};
use crate::inbox::ActiveSet;
use crate::partition::PartitionRouter;

const MAX_PUBLISH_ATTEMPTS: u32 = 5;
const INITIAL_BACKOFF: Duration = Duration::from_millis(10);

/// Publishes outgoing messages and keeps the barrier tree's `partition-<p>`
/// markers consistent with the active set (§3, §4.6).
pub struct MessageDispatcher<K, Msg> {
    work_set_log: Arc<dyn Log<K, WorkSetEntry<K, Msg>>>,
    router: Arc<dyn PartitionRouter<K>>,
    coordination: Arc<dyn CoordinationGateway>,
    active_set: Arc<ActiveSet<K>>,
    config: Arc<PregelConfig>,
}

impl<K, Msg> MessageDispatcher<K, Msg>
where
    K: Eq + Hash + Clone + Send + Sync + fmt::Debug + 'static,
    Msg: Clone + Send + Sync + fmt::Debug + 'static,
{
    pub fn new(
        work_set_log: Arc<dyn Log<K, WorkSetEntry<K, Msg>>>,
        router: Arc<dyn PartitionRouter<K>>,
        coordination: Arc<dyn CoordinationGateway>,
        active_set: Arc<ActiveSet<K>>,
        config: Arc<PregelConfig>,
    ) -> Self {
        MessageDispatcher { work_set_log, router, coordination, active_set, config }
    }

    /// Dispatch `src`'s outgoing messages produced by the compute invocation
    /// at `step`. Publishes each message tagged `step + 1`, adds a
    /// `partition-<p>` marker for every destination partition written, then
    /// removes `src` from the active set at `(step, partitionOf(src))` and,
    /// if that partition's active set just drained, clears its marker.
    pub async fn dispatch(&self, step: i32, src: K, outgoing: HashMap<K, Msg>) -> Result<()> {
        let produced_any = !outgoing.is_empty();
        for (dst, msg) in outgoing {
            let partition = self.router.partition_of(&dst);
            let entry = WorkSetEntry::new(step + 1, src.clone(), Some(msg));
            self.publish_with_retry(partition, dst, entry).await?;
            let marker_path = barrier_path(
                &self.config.coordination_root,
                &self.config.application_id,
                step + 1,
                Phase::Send,
            );
            // Persistent (non-ephemeral): a partition marker must survive the
            // dispatching worker's own crash (§6 coordination layout).
            self.coordination
                .add_child(&marker_path, &partition_child_name(partition), false)
                .await
                .map_err(|e| PregelError::coordination(e.to_string()))?;
        }
        if produced_any {
            self.active_set.mark_messages_produced(step).await;
        }

        let src_partition = self.router.partition_of(&src);
        let drained = self.active_set.remove(step, src_partition, &src).await;
        if drained {
            let marker_path = barrier_path(
                &self.config.coordination_root,
                &self.config.application_id,
                step,
                Phase::Send,
            );
            self.coordination
                .remove_child(&marker_path, &partition_child_name(src_partition))
                .await
                .map_err(|e| PregelError::coordination(e.to_string()))?;
            debug!(step, partition = src_partition, "partition marker cleared, active set drained");
        }
        Ok(())
    }

    async fn publish_with_retry(
        &self,
        partition: usize,
        dst: K,
        entry: WorkSetEntry<K, Msg>,
    ) -> Result<()> {
        let mut backoff = INITIAL_BACKOFF;
        for attempt in 1..=MAX_PUBLISH_ATTEMPTS {
            match self.work_set_log.publish(partition, dst.clone(), entry.clone()).await {
                Ok(()) => return Ok(()),
                Err(e) if attempt < MAX_PUBLISH_ATTEMPTS => {
                    warn!(attempt, partition, error = %e, "work-set publish failed, retrying");
                    let jitter = rand::thread_rng().gen_range(0.0..1.0) * backoff.as_millis() as f64;
                    tokio::time::sleep(backoff + Duration::from_millis(jitter as u64)).await;
                    backoff *= 2;
                }
                Err(e) => {
                    return Err(PregelError::log(format!(
                        "publish to work-set partition {partition} failed after {attempt} attempts: {e}"
                    )));
                }
            }
        }
        unreachable!("loop always returns on its last iteration");
    }
}
