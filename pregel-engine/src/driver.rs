//! The driver façade (§4.7): wires the rest of the engine together for one
//! worker process and exposes the small surface an embedding application
//! actually calls — seed the input, start the run, observe progress, read
//! the result.

use std::collections::HashMap;
use std::fmt;
use std::hash::Hash;
use std::sync::Arc;

use tokio::sync::{watch, Mutex};
use tokio::task::JoinHandle;
use tracing::{info, warn};

use pregel_state::coordination::{barrier_path, partition_child_name};
use pregel_state::{CoordinationGateway, EdgeEntry, Log, LogBundle, Phase, PregelState, VertexEntry, WorkSetEntry};

use crate::barrier::BarrierSynchronizer;
use crate::compute::Compute;
use crate::config::PregelConfig;
use crate::error::{PregelError, Result};
use crate::partition::PartitionRouter;
use crate::pipeline::WorkSetPipeline;

/// One worker's entry point into a distributed Pregel-style computation.
/// Owns the pipeline and barrier synchronizer for the partitions this
/// worker is assigned, and runs the periodic tick loop in the background.
pub struct PregelDriver<K, VV, EV, Msg> {
    logs: Arc<LogBundle<K, VV, EV, Msg>>,
    router: Arc<dyn PartitionRouter<K>>,
    coordination: Arc<dyn CoordinationGateway>,
    config: Arc<PregelConfig>,
    pipeline: Arc<WorkSetPipeline<K, VV, EV, Msg>>,
    barrier: Arc<BarrierSynchronizer<K, VV, EV, Msg>>,
    partitions: Vec<usize>,
    completion: watch::Sender<bool>,
    tick_task: Mutex<Option<JoinHandle<()>>>,
}

impl<K, VV, EV, Msg> PregelDriver<K, VV, EV, Msg>
where
    K: Eq + Hash + Clone + Send + Sync + fmt::Debug + 'static,
    VV: Clone + Send + Sync + fmt::Debug + Default + 'static,
    EV: Clone + Send + Sync + fmt::Debug + 'static,
    Msg: Clone + Send + Sync + fmt::Debug + 'static,
{
    /// `partitions` lists the log partitions this worker process owns.
    pub fn new(
        logs: Arc<LogBundle<K, VV, EV, Msg>>,
        router: Arc<dyn PartitionRouter<K>>,
        compute: Arc<dyn Compute<K, VV, EV, Msg>>,
        coordination: Arc<dyn CoordinationGateway>,
        config: Arc<PregelConfig>,
        partitions: Vec<usize>,
    ) -> Self {
        let pipeline = Arc::new(WorkSetPipeline::new(
            logs.clone(),
            router.clone(),
            compute,
            coordination.clone(),
            config.clone(),
        ));
        let barrier = Arc::new(BarrierSynchronizer::new(
            coordination.clone(),
            config.clone(),
            pipeline.clone(),
            logs.clone(),
            partitions.clone(),
        ));
        let (completion, _) = watch::channel(false);
        PregelDriver {
            logs,
            router,
            coordination,
            config,
            pipeline,
            barrier,
            partitions,
            completion,
            tick_task: Mutex::new(None),
        }
    }

    /// Seed the input for a fresh run (§4.7 "Initial seeding"): publish every
    /// vertex to the `vertices` log, every out-edge list to
    /// `edgesGroupedBySource`, a `(-1, v, 0, v)` solution-set entry, and a
    /// `(0, vertexKey, initialMessage)` work-set entry. `initial_messages`
    /// may omit a vertex entirely, in which case it seeds with no message.
    pub async fn prepare(
        &self,
        vertices: impl IntoIterator<Item = (K, VV)>,
        edges: impl IntoIterator<Item = (K, EdgeEntry<K, EV>)>,
        mut initial_messages: HashMap<K, Msg>,
    ) -> Result<()> {
        let mut seeded_partitions = std::collections::HashSet::new();
        for (key, value) in vertices {
            let partition = self.router.partition_of(&key);
            seeded_partitions.insert(partition);

            self.logs
                .vertices
                .publish(partition, key.clone(), value.clone())
                .await
                .map_err(|e| PregelError::log(e.to_string()))?;
            self.logs
                .solution_set
                .publish(partition, key.clone(), VertexEntry::seed(value))
                .await
                .map_err(|e| PregelError::log(e.to_string()))?;

            let message = initial_messages.remove(&key);
            self.logs
                .work_set
                .publish(partition, key.clone(), WorkSetEntry::new(0, key, message))
                .await
                .map_err(|e| PregelError::log(e.to_string()))?;
        }

        for (key, edge_entry) in edges {
            let partition = self.router.partition_of(&key);
            self.logs
                .edges_grouped_by_source
                .publish(partition, key, edge_entry)
                .await
                .map_err(|e| PregelError::log(e.to_string()))?;
        }

        let send_path =
            barrier_path(&self.config.coordination_root, &self.config.application_id, 0, Phase::Send);
        for partition in seeded_partitions {
            self.coordination
                .add_child(&send_path, &partition_child_name(partition), false)
                .await
                .map_err(|e| PregelError::coordination(e.to_string()))?;
        }
        Ok(())
    }

    /// Join the coordination group and publish the starting
    /// `{RUNNING, 0, RECEIVE}` state, without spawning the background tick
    /// loop. Exposed so callers that drive the engine directly via
    /// [`PregelDriver::tick_once`] (§10.4 test tooling, benchmarks) don't
    /// need `run`'s timer-driven loop.
    pub async fn start(&self) -> Result<PregelState> {
        self.barrier.join_group().await?;
        self.barrier.publish_initial_state().await
    }

    /// Join the coordination group, publish the starting
    /// `{RUNNING, 0, RECEIVE}` state, spawn the background tick loop, and
    /// return the published state immediately — completion is observed
    /// separately via [`PregelDriver::completion`] or by polling
    /// [`PregelDriver::state`].
    pub async fn run(&self) -> Result<PregelState> {
        let initial = self.start().await?;

        let barrier = self.barrier.clone();
        let completion = self.completion.clone();
        let tick_interval = self.config.tick_interval;
        let handle = tokio::spawn(async move {
            loop {
                tokio::time::sleep(tick_interval).await;
                match barrier.tick().await {
                    Ok(Some(state)) if state.lifecycle == pregel_state::Lifecycle::Completed => {
                        let _ = completion.send(true);
                        break;
                    }
                    Ok(_) => {}
                    Err(e) if e.is_transient() => {
                        warn!(error = %e, "transient error during tick, retrying");
                    }
                    Err(e) => {
                        warn!(error = %e, "fatal error during tick, stopping background loop");
                        break;
                    }
                }
            }
        });
        *self.tick_task.lock().await = Some(handle);
        info!(worker = %self.config.worker_name, "pregel driver started");
        Ok(initial)
    }

    /// Run a single tick directly, without the timer (§10.4 test tooling):
    /// lets tests drive the engine deterministically.
    pub async fn tick_once(&self) -> Result<Option<PregelState>> {
        self.barrier.tick().await
    }

    /// Subscribe to the completion signal, resolved exactly once the
    /// computation transitions to COMPLETED.
    pub fn completion(&self) -> watch::Receiver<bool> {
        self.completion.subscribe()
    }

    pub async fn await_completion(&self) -> Result<()> {
        let mut rx = self.completion.subscribe();
        rx.wait_for(|done| *done).await.map_err(|e| PregelError::coordination(e.to_string()))?;
        Ok(())
    }

    /// Read and decode the current shared `PregelState` (§4.7 `state()`).
    pub async fn state(&self) -> Result<Option<PregelState>> {
        self.barrier.current_state().await
    }

    /// The solution-set table keyed by vertex (§4.7 `result()`).
    pub async fn result(&self) -> HashMap<K, VertexEntry<VV>> {
        self.pipeline.solution_set_snapshot().await
    }

    pub fn config(&self) -> Arc<PregelConfig> {
        self.config.clone()
    }

    pub fn partitions(&self) -> &[usize] {
        &self.partitions
    }
}

impl<K, VV, EV, Msg> Drop for PregelDriver<K, VV, EV, Msg> {
    fn drop(&mut self) {
        if let Ok(mut guard) = self.tick_task.try_lock() {
            if let Some(handle) = guard.take() {
                handle.abort();
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pregel_state::InMemoryCoordinationGateway;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use crate::compute::ComputeOutput;
    use crate::partition::HashPartitionRouter;
    use async_trait::async_trait;

    struct Summation {
        invocations: AtomicUsize,
    }

    #[async_trait]
    impl Compute<&'static str, i32, &'static str, i32> for Summation {
        async fn compute(
            &self,
            step: i32,
            _vertex: &&'static str,
            vertex_value: &i32,
            incoming: &HashMap<&'static str, i32>,
            edges: &EdgeEntry<&'static str, &'static str>,
            output: &mut ComputeOutput<&'static str, i32, i32>,
        ) -> std::result::Result<(), Box<dyn std::error::Error + Send + Sync>> {
            self.invocations.fetch_add(1, Ordering::SeqCst);
            let incoming_sum: i32 = incoming.values().sum();
            if step == 0 || incoming_sum != 0 {
                let new_value = vertex_value + incoming_sum;
                output.set_new_vertex_value(Some(new_value));
                if step == 0 {
                    for (dst, _) in edges.iter() {
                        output.send_message_to(*dst, new_value);
                    }
                }
            }
            Ok(())
        }
    }

    fn driver() -> Arc<PregelDriver<&'static str, i32, &'static str, i32>> {
        let logs = Arc::new(LogBundle::in_memory(1));
        let router: Arc<dyn PartitionRouter<&'static str>> = Arc::new(HashPartitionRouter::new(1));
        let compute = Arc::new(Summation { invocations: AtomicUsize::new(0) });
        let coordination = Arc::new(InMemoryCoordinationGateway::new());
        let config = Arc::new(PregelConfig::new("sum-app", "w1").with_partition_count(1));
        Arc::new(PregelDriver::new(logs, router, compute, coordination, config, vec![0]))
    }

    #[tokio::test]
    async fn prepare_seeds_vertices_edges_and_partition_marker() {
        let driver = driver();
        driver
            .prepare(
                vec![("a", 1), ("b", 2)],
                vec![("a", EdgeEntry::new(vec![("b", "e1")]))],
                HashMap::new(),
            )
            .await
            .unwrap();

        let send_path = barrier_path(&driver.config().coordination_root, &driver.config().application_id, 0, Phase::Send);
        assert!(driver.coordination.has_child(&send_path, &partition_child_name(0)).await.unwrap());
    }

    #[tokio::test]
    async fn single_worker_run_converges_via_direct_ticks() {
        let driver = driver();
        driver
            .prepare(
                vec![("a", 1), ("b", 2)],
                vec![("a", EdgeEntry::new(vec![("b", "e1")]))],
                HashMap::new(),
            )
            .await
            .unwrap();

        driver.start().await.unwrap();

        // Drive ticks directly until convergence or a safety bound trips.
        for _ in 0..40 {
            if let Some(state) = driver.tick_once().await.unwrap() {
                if state.lifecycle == pregel_state::Lifecycle::Completed {
                    break;
                }
            }
        }

        let final_state = driver.state().await.unwrap().unwrap();
        assert_eq!(final_state.lifecycle, pregel_state::Lifecycle::Completed);

        let result = driver.result().await;
        assert_eq!(result.get("b").map(|e| e.cur_value), Some(3));
    }

    struct EverIncrementing;

    #[async_trait]
    impl Compute<&'static str, i64, &'static str, i64> for EverIncrementing {
        async fn compute(
            &self,
            _step: i32,
            _vertex: &&'static str,
            vertex_value: &i64,
            incoming: &HashMap<&'static str, i64>,
            edges: &EdgeEntry<&'static str, &'static str>,
            output: &mut ComputeOutput<&'static str, i64, i64>,
        ) -> std::result::Result<(), Box<dyn std::error::Error + Send + Sync>> {
            let bump = incoming.values().sum::<i64>().max(1);
            let new_value = vertex_value + bump;
            output.set_new_vertex_value(Some(new_value));
            for (dst, _) in edges.iter() {
                output.send_message_to(*dst, new_value);
            }
            Ok(())
        }
    }

    /// S3 — a self-looping vertex that never stops producing messages is
    /// still forced to COMPLETED once `max_iterations` is crossed, and the
    /// final superstep reported reflects exactly the bound (§4.5 termination).
    #[tokio::test]
    async fn max_iterations_caps_a_non_converging_computation() {
        let logs = Arc::new(LogBundle::in_memory(1));
        let router: Arc<dyn PartitionRouter<&'static str>> = Arc::new(HashPartitionRouter::new(1));
        let compute = Arc::new(EverIncrementing);
        let coordination = Arc::new(InMemoryCoordinationGateway::new());
        let config = Arc::new(PregelConfig::new("cap-app", "w1").with_partition_count(1).with_max_iterations(2));
        let driver: PregelDriver<&'static str, i64, &'static str, i64> =
            PregelDriver::new(logs, router, compute, coordination, config, vec![0]);

        driver
            .prepare(
                vec![("a", 0i64)],
                vec![("a", EdgeEntry::new(vec![("a", "self-loop")]))],
                HashMap::from([("a", 1i64)]),
            )
            .await
            .unwrap();
        driver.start().await.unwrap();

        for _ in 0..60 {
            if let Some(state) = driver.tick_once().await.unwrap() {
                if state.lifecycle == pregel_state::Lifecycle::Completed {
                    break;
                }
            }
        }

        let final_state = driver.state().await.unwrap().unwrap();
        assert_eq!(final_state.lifecycle, pregel_state::Lifecycle::Completed);
        assert_eq!(final_state.superstep, 3);
    }

    /// S6 — two disjoint components spread across 4 partitions, served by
    /// two driver instances (simulating two worker processes) sharing one
    /// log/coordination pair. A log partition has a single consumption
    /// cursor (§10.5's `InMemoryLog`), so the two workers are assigned
    /// disjoint partition halves rather than both polling every partition;
    /// that mirrors how a real deployment splits ownership and avoids one
    /// worker silently stealing the other's backlog.
    #[tokio::test]
    async fn disjoint_components_across_two_workers_still_converge() {
        let logs = Arc::new(LogBundle::in_memory(4));
        let router: Arc<dyn PartitionRouter<&'static str>> = Arc::new(HashPartitionRouter::new(4));
        let coordination = Arc::new(InMemoryCoordinationGateway::new());

        let w1_partitions: Vec<usize> = vec![0, 1];
        let w2_partitions: Vec<usize> = vec![2, 3];
        let config_w1 = Arc::new(PregelConfig::new("disjoint-app", "w1").with_partition_count(4));
        let config_w2 = Arc::new(PregelConfig::new("disjoint-app", "w2").with_partition_count(4));

        let driver1: Arc<PregelDriver<&'static str, i32, &'static str, i32>> = Arc::new(PregelDriver::new(
            logs.clone(),
            router.clone(),
            Arc::new(Summation { invocations: AtomicUsize::new(0) }),
            coordination.clone(),
            config_w1,
            w1_partitions.clone(),
        ));
        let driver2: Arc<PregelDriver<&'static str, i32, &'static str, i32>> = Arc::new(PregelDriver::new(
            logs.clone(),
            router.clone(),
            Arc::new(Summation { invocations: AtomicUsize::new(0) }),
            coordination.clone(),
            config_w2,
            w2_partitions.clone(),
        ));

        driver1
            .prepare(
                vec![("a", 1), ("b", 2), ("c", 3), ("d", 4)],
                vec![
                    ("a", EdgeEntry::new(vec![("b", "e1")])),
                    ("c", EdgeEntry::new(vec![("d", "e2")])),
                ],
                HashMap::new(),
            )
            .await
            .unwrap();

        driver2.barrier.join_group().await.unwrap();
        driver1.start().await.unwrap();

        for _ in 0..60 {
            let s1 = driver1.tick_once().await.unwrap();
            let s2 = driver2.tick_once().await.unwrap();
            let converged = [s1, s2]
                .into_iter()
                .flatten()
                .any(|s| s.lifecycle == pregel_state::Lifecycle::Completed);
            if converged {
                break;
            }
        }

        let final_state = driver1.state().await.unwrap().unwrap();
        assert_eq!(final_state.lifecycle, pregel_state::Lifecycle::Completed);

        // Only the pipeline owning a vertex's partition ever writes it into
        // its local solution set, so look each result up on whichever
        // driver's partition halves actually cover it.
        let owner_of = |key: &'static str| -> &Arc<PregelDriver<&'static str, i32, &'static str, i32>> {
            if w1_partitions.contains(&router.partition_of(&key)) {
                &driver1
            } else {
                &driver2
            }
        };

        let b_result = owner_of("b").result().await;
        assert_eq!(b_result.get("b").map(|e| e.cur_value), Some(3));
        let d_result = owner_of("d").result().await;
        assert_eq!(d_result.get("d").map(|e| e.cur_value), Some(7));
    }
}
