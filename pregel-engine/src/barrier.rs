//! The barrier synchronizer (§4.5): the periodic per-worker tick that drives
//! every other component. Leader-only step advancement, worker-local
//! readiness signalling, and the SEND-phase forward/compute/GC dance all
//! live here.

use std::collections::HashSet;
use std::fmt;
use std::hash::Hash;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use tokio::sync::RwLock;
use tracing::info;

use pregel_state::coordination::{
    barrier_path, group_path, leader_path, shared_state_path, worker_child_name,
};
use pregel_state::{CoordinationGateway, Log, LogBundle, Phase, PregelState};

use crate::config::PregelConfig;
use crate::error::{PregelError, Result};
use crate::partition::PartitionRouter;
use crate::pipeline::WorkSetPipeline;

static NEXT_THREAD_ID: AtomicU64 = AtomicU64::new(0);

/// One tick of the barrier synchronizer. Built once per worker process and
/// driven on a timer (or directly, in tests) by [`crate::driver::PregelDriver`].
pub struct BarrierSynchronizer<K, VV, EV, Msg> {
    coordination: Arc<dyn CoordinationGateway>,
    config: Arc<PregelConfig>,
    pipeline: Arc<WorkSetPipeline<K, VV, EV, Msg>>,
    logs: Arc<LogBundle<K, VV, EV, Msg>>,
    partitions: Vec<usize>,
    member_id: String,
    receive_signalled: RwLock<HashSet<i32>>,
}

impl<K, VV, EV, Msg> BarrierSynchronizer<K, VV, EV, Msg>
where
    K: Eq + Hash + Clone + Send + Sync + fmt::Debug + 'static,
    VV: Clone + Send + Sync + fmt::Debug + Default + 'static,
    EV: Clone + Send + Sync + fmt::Debug + 'static,
    Msg: Clone + Send + Sync + fmt::Debug + 'static,
{
    pub fn new(
        coordination: Arc<dyn CoordinationGateway>,
        config: Arc<PregelConfig>,
        pipeline: Arc<WorkSetPipeline<K, VV, EV, Msg>>,
        logs: Arc<LogBundle<K, VV, EV, Msg>>,
        partitions: Vec<usize>,
    ) -> Self {
        let thread_id = NEXT_THREAD_ID.fetch_add(1, Ordering::Relaxed);
        let member_id = worker_child_name(&config.worker_name, thread_id);
        BarrierSynchronizer {
            coordination,
            config,
            pipeline,
            logs,
            partitions,
            member_id,
            receive_signalled: RwLock::new(HashSet::new()),
        }
    }

    pub fn member_id(&self) -> &str {
        &self.member_id
    }

    /// Read and decode the shared `PregelState`, or `None` if the driver
    /// hasn't published one yet (§4.7 `state()`).
    pub async fn current_state(&self) -> Result<Option<PregelState>> {
        self.read_state().await
    }

    async fn read_state(&self) -> Result<Option<PregelState>> {
        let path = shared_state_path(&self.config.coordination_root, &self.config.application_id);
        let bytes = self
            .coordination
            .get_shared_value(&path)
            .await
            .map_err(|e| PregelError::coordination(e.to_string()))?;
        match bytes {
            Some(b) => Ok(Some(PregelState::decode(&b)?)),
            None => Ok(None),
        }
    }

    /// Publish the starting `{RUNNING, 0, RECEIVE}` state (§4.7 `run()`).
    pub async fn publish_initial_state(&self) -> Result<PregelState> {
        let state = PregelState::initial();
        self.write_state(&state).await?;
        Ok(state)
    }

    async fn write_state(&self, state: &PregelState) -> Result<()> {
        let path = shared_state_path(&self.config.coordination_root, &self.config.application_id);
        self.coordination
            .set_shared_value(&path, state.encode()?)
            .await
            .map_err(|e| PregelError::coordination(e.to_string()))
    }

    /// Run one tick (§4.5). Returns the state observed at the start of the
    /// tick, or `None` if the computation has not been published yet.
    pub async fn tick(&self) -> Result<Option<PregelState>> {
        let Some(state) = self.read_state().await? else { return Ok(None) };

        if state.lifecycle == pregel_state::Lifecycle::Completed {
            return Ok(Some(state));
        }

        for &partition in &self.partitions {
            self.pipeline.ingest(partition).await?;
        }

        let leader_path = leader_path(&self.config.coordination_root, &self.config.application_id);
        self.coordination
            .elect_leader(&leader_path, &self.member_id)
            .await
            .map_err(|e| PregelError::coordination(e.to_string()))?;
        let is_leader = self
            .coordination
            .has_leadership(&leader_path, &self.member_id)
            .await
            .map_err(|e| PregelError::coordination(e.to_string()))?;
        if is_leader {
            self.advance_if_ready(&state).await?;
        }

        match state.phase {
            Phase::Receive => self.run_receive_phase(&state).await?,
            Phase::Send => self.run_send_phase(&state).await?,
        }

        Ok(Some(state))
    }

    async fn advance_if_ready(&self, state: &PregelState) -> Result<()> {
        let group_path = group_path(&self.config.coordination_root, &self.config.application_id);
        let group_size = self
            .coordination
            .group_members(&group_path)
            .await
            .map_err(|e| PregelError::coordination(e.to_string()))?
            .len();
        if group_size == 0 {
            return Ok(());
        }

        match state.phase {
            Phase::Receive => {
                let ready_path = barrier_path(
                    &self.config.coordination_root,
                    &self.config.application_id,
                    state.superstep,
                    Phase::Receive,
                );
                let ready = self
                    .coordination
                    .count_children(&ready_path)
                    .await
                    .map_err(|e| PregelError::coordination(e.to_string()))?;
                if ready >= group_size {
                    self.write_state(&state.next()).await?;
                    info!(step = state.superstep, "advanced RECEIVE -> SEND");
                }
            }
            Phase::Send => {
                let send_path = barrier_path(
                    &self.config.coordination_root,
                    &self.config.application_id,
                    state.superstep,
                    Phase::Send,
                );
                let children = self
                    .coordination
                    .children(&send_path)
                    .await
                    .map_err(|e| PregelError::coordination(e.to_string()))?;
                let partition_markers = children.iter().filter(|n| n.starts_with("partition-")).count();
                let workers_done = children.iter().filter(|n| n.starts_with("worker:")).count();
                if partition_markers == 0 && workers_done >= group_size {
                    // No work remains in flight for this step. Convergence
                    // requires additionally that no message was dispatched
                    // for the *next* step either — which, since the
                    // dispatcher only ever adds a `partition-<p>` marker
                    // when it actually publishes a message, is exactly
                    // "no partition markers exist yet at step+1" (§4.6).
                    let next_send_path = barrier_path(
                        &self.config.coordination_root,
                        &self.config.application_id,
                        state.superstep + 1,
                        Phase::Send,
                    );
                    let next_markers = self
                        .coordination
                        .count_children(&next_send_path)
                        .await
                        .map_err(|e| PregelError::coordination(e.to_string()))?;
                    let mut next = state.next();
                    if next_markers == 0 {
                        next = next.complete();
                        info!(step = state.superstep, "converged, transitioning to COMPLETED");
                    } else if next.superstep > self.config.max_iterations {
                        next = next.complete();
                        info!(step = next.superstep, "max_iterations exceeded, transitioning to COMPLETED");
                    } else {
                        info!(step = state.superstep, "advanced SEND -> RECEIVE");
                    }
                    self.write_state(&next).await?;
                }
            }
        }
        Ok(())
    }

    async fn run_receive_phase(&self, state: &PregelState) -> Result<()> {
        if self.receive_signalled.read().await.contains(&state.superstep) {
            return Ok(());
        }

        let ready = if state.superstep == 0 {
            // Drain whatever the vertex/edge input topics currently hold
            // before checking for a backlog — `is_synced` only tells us
            // "caught up with what's been consumed so far", so the worker
            // must actually consume first (§4.4's loaders are idempotent:
            // polling an already-drained partition is a no-op).
            for &partition in &self.partitions {
                self.pipeline.load_vertices(partition).await?;
                self.pipeline.load_edges(partition).await?;
            }
            self.step_zero_inputs_ready().await?
        } else {
            self.work_set_locally_synced().await?
        };

        if !ready {
            if state.superstep == 0 {
                for &partition in &self.partitions {
                    self.logs.work_set.pause(partition).await.map_err(|e| PregelError::log(e.to_string()))?;
                    self.logs
                        .solution_set
                        .pause(partition)
                        .await
                        .map_err(|e| PregelError::log(e.to_string()))?;
                }
            }
            return Ok(());
        }

        if state.superstep == 0 {
            for &partition in &self.partitions {
                self.logs.work_set.resume(partition).await.map_err(|e| PregelError::log(e.to_string()))?;
                self.logs
                    .solution_set
                    .resume(partition)
                    .await
                    .map_err(|e| PregelError::log(e.to_string()))?;
            }
        }

        let ready_path = barrier_path(
            &self.config.coordination_root,
            &self.config.application_id,
            state.superstep,
            Phase::Receive,
        );
        self.coordination
            .add_child(&ready_path, &self.member_id, true)
            .await
            .map_err(|e| PregelError::coordination(e.to_string()))?;
        self.receive_signalled.write().await.insert(state.superstep);
        Ok(())
    }

    async fn step_zero_inputs_ready(&self) -> Result<bool> {
        for &partition in &self.partitions {
            let synced = self
                .logs
                .vertices
                .is_synced(partition)
                .await
                .map_err(|e| PregelError::log(e.to_string()))?
                && self
                    .logs
                    .edges_grouped_by_source
                    .is_synced(partition)
                    .await
                    .map_err(|e| PregelError::log(e.to_string()))?;
            if !synced {
                return Ok(false);
            }
        }
        Ok(true)
    }

    async fn work_set_locally_synced(&self) -> Result<bool> {
        for &partition in &self.partitions {
            if !self
                .logs
                .work_set
                .is_synced(partition)
                .await
                .map_err(|e| PregelError::log(e.to_string()))?
            {
                return Ok(false);
            }
        }
        Ok(true)
    }

    async fn run_send_phase(&self, state: &PregelState) -> Result<()> {
        if !self.work_set_locally_synced().await? {
            return Ok(());
        }

        // Re-run forward/compute on every SEND tick, not just the first: a
        // message can arrive after this worker already forwarded a vertex
        // for this step, which invalidates its forwarded mark (§4.4 stage 2,
        // ingest in tick()) and requires it to be re-forwarded (§5, S4).
        // `forward_and_compute` only acts on destinations that are currently
        // unforwarded, so repeating it is a no-op once nothing is pending.
        for &partition in &self.partitions {
            self.pipeline.forward_and_compute(state.superstep, partition).await?;
        }

        let done_path = barrier_path(
            &self.config.coordination_root,
            &self.config.application_id,
            state.superstep,
            Phase::Send,
        );
        self.coordination
            .add_child(&done_path, &self.member_id, true)
            .await
            .map_err(|e| PregelError::coordination(e.to_string()))?;

        if state.superstep > 0 {
            self.pipeline.gc(state.superstep - 1).await;
        }
        Ok(())
    }

    /// Join the coordination group (§4.2), ephemeral for this member's lifetime.
    pub async fn join_group(&self) -> Result<()> {
        let group_path = group_path(&self.config.coordination_root, &self.config.application_id);
        self.coordination
            .join_group(&group_path, &self.member_id)
            .await
            .map_err(|e| PregelError::coordination(e.to_string()))
    }
}

impl<K, VV, EV, Msg> fmt::Debug for BarrierSynchronizer<K, VV, EV, Msg> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BarrierSynchronizer").field("member_id", &self.member_id).finish()
    }
}
