//! The work-set pipeline (§4.4): the per-partition filter/buffer/forward/
//! compute/publish/dispatch stages that join inbound messages with edges
//! and invoke the user compute function.

use std::collections::HashMap;
use std::fmt;
use std::hash::Hash;
use std::sync::Arc;

use tokio::sync::RwLock;
use tracing::{debug, info_span, warn, Instrument};

use pregel_state::{CoordinationGateway, EdgeEntry, Log, LogBundle, VertexEntry, WorkSetEntry};

use crate::compute::{Compute, ComputeOutput};
use crate::config::PregelConfig;
use crate::dispatcher::MessageDispatcher;
use crate::error::{PregelError, Result};
use crate::inbox::{ActiveSet, ForwardedSet, Inbox};
use crate::partition::PartitionRouter;

/// The per-worker pipeline over one or more assigned partitions. All of the
/// worker-local ephemeral state (§3) lives here; the driver façade owns one
/// instance per worker and the barrier synchronizer drives its `ingest` and
/// `forward_and_compute` stages from the periodic tick.
pub struct WorkSetPipeline<K, VV, EV, Msg> {
    inbox: Arc<Inbox<K, Msg>>,
    forwarded: Arc<ForwardedSet<K>>,
    active_set: Arc<ActiveSet<K>>,
    solution_set: Arc<RwLock<HashMap<K, VertexEntry<VV>>>>,
    vertex_table: Arc<RwLock<HashMap<K, VV>>>,
    edge_table: Arc<RwLock<HashMap<K, EdgeEntry<K, EV>>>>,
    logs: Arc<LogBundle<K, VV, EV, Msg>>,
    router: Arc<dyn PartitionRouter<K>>,
    compute: Arc<dyn Compute<K, VV, EV, Msg>>,
    dispatcher: Arc<MessageDispatcher<K, Msg>>,
    config: Arc<PregelConfig>,
}

impl<K, VV, EV, Msg> WorkSetPipeline<K, VV, EV, Msg>
where
    K: Eq + Hash + Clone + Send + Sync + fmt::Debug + 'static,
    VV: Clone + Send + Sync + fmt::Debug + Default + 'static,
    EV: Clone + Send + Sync + fmt::Debug + 'static,
    Msg: Clone + Send + Sync + fmt::Debug + 'static,
{
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        logs: Arc<LogBundle<K, VV, EV, Msg>>,
        router: Arc<dyn PartitionRouter<K>>,
        compute: Arc<dyn Compute<K, VV, EV, Msg>>,
        coordination: Arc<dyn CoordinationGateway>,
        config: Arc<PregelConfig>,
    ) -> Self {
        let active_set = Arc::new(ActiveSet::new());
        let dispatcher = Arc::new(MessageDispatcher::new(
            logs.work_set.clone(),
            router.clone(),
            coordination,
            active_set.clone(),
            config.clone(),
        ));
        WorkSetPipeline {
            inbox: Arc::new(Inbox::new()),
            forwarded: Arc::new(ForwardedSet::new()),
            active_set,
            solution_set: Arc::new(RwLock::new(HashMap::new())),
            vertex_table: Arc::new(RwLock::new(HashMap::new())),
            edge_table: Arc::new(RwLock::new(HashMap::new())),
            logs,
            router,
            compute,
            dispatcher,
            config,
        }
    }

    pub fn active_set(&self) -> Arc<ActiveSet<K>> {
        self.active_set.clone()
    }

    /// Materialise the vertex-value table from the `vertices` log,
    /// draining `partition` to end offset. Called during `prepare` once the
    /// input topics are fully consumed (§4.5 step-0 RECEIVE gate).
    pub async fn load_vertices(&self, partition: usize) -> Result<()> {
        let entries = self
            .logs
            .vertices
            .poll(partition)
            .await
            .map_err(|e| PregelError::log(e.to_string()))?;
        let mut table = self.vertex_table.write().await;
        for (key, value) in entries {
            table.insert(key, value);
        }
        Ok(())
    }

    /// Materialise the edge table from the `edgesGroupedBySource` log.
    pub async fn load_edges(&self, partition: usize) -> Result<()> {
        let entries = self
            .logs
            .edges_grouped_by_source
            .poll(partition)
            .await
            .map_err(|e| PregelError::log(e.to_string()))?;
        let mut table = self.edge_table.write().await;
        for (key, value) in entries {
            table.insert(key, value);
        }
        Ok(())
    }

    /// **Filter + Buffer** (§4.4 stages 1-2): drain newly-arrived work-set
    /// entries on `partition` and fold them into the local inbox.
    pub async fn ingest(&self, partition: usize) -> Result<()> {
        let entries = self
            .logs
            .work_set
            .poll(partition)
            .await
            .map_err(|e| PregelError::log(e.to_string()))?;
        for (dst, entry) in entries {
            if entry.superstep > self.config.max_iterations {
                debug!(step = entry.superstep, ?dst, "filtered work-set entry past max_iterations");
                continue;
            }
            // A late message for an already-forwarded vertex invalidates the
            // prior forward (§4.4 stage 2); harmless no-op otherwise.
            self.forwarded.invalidate(entry.superstep, &dst).await;
            match entry.message {
                Some(msg) => {
                    self.inbox.buffer(entry.superstep, dst, entry.src_key, msg).await;
                }
                None => {
                    self.inbox.ensure_present(entry.superstep, dst).await;
                }
            }
        }
        Ok(())
    }

    /// **Forward + Compute + Publish + Dispatch** (§4.4 stages 3-6), scoped
    /// to destinations owned by `partition`. Must only be called once the
    /// work-set topic is locally synced for that partition (§4.5 SEND gate);
    /// the caller (barrier synchronizer) is responsible for that check.
    pub async fn forward_and_compute(&self, step: i32, partition: usize) -> Result<()> {
        let candidates = self.inbox.destinations_at(step).await;
        for dst in candidates {
            if self.router.partition_of(&dst) != partition {
                continue;
            }
            if self.forwarded.is_forwarded(step, &dst).await {
                continue;
            }
            self.forwarded.mark_forwarded(step, dst.clone()).await;
            self.active_set.add(step, partition, dst.clone()).await;

            let span = info_span!("compute", worker = %self.config.worker_name, partition, step, vertex = ?dst);
            self.run_compute(step, partition, dst).instrument(span).await?;
        }
        Ok(())
    }

    async fn run_compute(&self, step: i32, partition: usize, dst: K) -> Result<()> {
        let messages = self.inbox.messages_for(step, &dst).await;
        let edges = self
            .edge_table
            .read()
            .await
            .get(&dst)
            .cloned()
            .unwrap_or_else(EdgeEntry::empty);

        let entry = self.resolve_solution_entry(&dst).await;
        let vertex_value = entry.value_at(step).clone();

        let mut output = ComputeOutput::new();
        self.compute
            .compute(step, &dst, &vertex_value, &messages, &edges, &mut output)
            .await
            .map_err(|e| PregelError::user_compute(format!("{dst:?}"), e))?;
        let (new_value, outgoing) = output.into_parts();

        if let Some(nv) = new_value {
            let new_entry = entry.apply(step, nv);
            self.solution_set.write().await.insert(dst.clone(), new_entry.clone());
            self.logs
                .solution_set
                .publish(self.router.partition_of(&dst), dst.clone(), new_entry)
                .await
                .map_err(|e| PregelError::log(e.to_string()))?;
        }

        debug!(step, partition, vertex = ?dst, outgoing = outgoing.len(), "dispatching compute output");
        self.dispatcher.dispatch(step, dst, outgoing).await
    }

    /// Load the solution-set entry for `dst`, or synthesise one from the
    /// vertex-value table (or, if that's also absent, a logged-warning
    /// default) per §4.4 stage 4.
    async fn resolve_solution_entry(&self, dst: &K) -> VertexEntry<VV> {
        if let Some(entry) = self.solution_set.read().await.get(dst).cloned() {
            return entry;
        }
        if let Some(value) = self.vertex_table.read().await.get(dst).cloned() {
            return VertexEntry::seed(value);
        }
        warn!(vertex = ?dst, "synthesising default vertex value: absent from both solution set and vertex table");
        VertexEntry::seed(VV::default())
    }

    /// Garbage-collect the previous superstep's ephemeral state (§4.5, §9):
    /// inbox, forwarded set, and active set for `step`.
    pub async fn gc(&self, step: i32) {
        self.inbox.gc(step).await;
        self.forwarded.gc(step).await;
        self.active_set.gc(step).await;
    }

    /// Read-only snapshot of the current solution set, for `result()` (§4.7).
    pub async fn solution_set_snapshot(&self) -> HashMap<K, VertexEntry<VV>> {
        self.solution_set.read().await.clone()
    }

    pub fn config(&self) -> Arc<PregelConfig> {
        self.config.clone()
    }
}
