//! `PregelConfig` (§10.3): the tunables the language-independent spec calls
//! out inline, collected into one small `Default`-implementing struct rather
//! than threaded through the driver façade's methods as loose parameters.
//! Plain data — loading it from disk or the environment is orchestration/CLI
//! territory excluded by §1.

use std::time::Duration;

/// Engine-wide tunables, passed by reference into [`crate::driver::PregelDriver::prepare`].
#[derive(Debug, Clone)]
pub struct PregelConfig {
    /// Wall-clock period of the barrier synchronizer's tick (§4.5). Default 250ms.
    pub tick_interval: Duration,
    /// Bounded timeout for reads/writes against the coordination store (§5). Default 5s.
    pub coordination_timeout: Duration,
    /// The `maxIterations` cancellation knob (§4.7, §5). Supersteps `> max_iterations`
    /// never run; the leader transitions to COMPLETED once the bound is crossed.
    pub max_iterations: i32,
    /// Number of partitions `P` the partition router divides vertex keys across.
    pub partition_count: usize,
    /// `<applicationId>` prefix under the coordination store root (§6).
    pub application_id: String,
    /// This worker's name, used to build its barrier-tree readiness child (§4.2).
    pub worker_name: String,
    /// The coordination store root under which `<applicationId>` is nested (§6).
    pub coordination_root: String,
}

impl Default for PregelConfig {
    fn default() -> Self {
        PregelConfig {
            tick_interval: Duration::from_millis(250),
            coordination_timeout: Duration::from_secs(5),
            max_iterations: i32::MAX,
            partition_count: 1,
            application_id: "pregel".to_string(),
            worker_name: "worker-0".to_string(),
            coordination_root: "/pregel".to_string(),
        }
    }
}

impl PregelConfig {
    pub fn new(application_id: impl Into<String>, worker_name: impl Into<String>) -> Self {
        PregelConfig {
            application_id: application_id.into(),
            worker_name: worker_name.into(),
            ..Default::default()
        }
    }

    pub fn with_max_iterations(mut self, max_iterations: i32) -> Self {
        self.max_iterations = max_iterations;
        self
    }

    pub fn with_partition_count(mut self, partition_count: usize) -> Self {
        self.partition_count = partition_count;
        self
    }

    pub fn with_tick_interval(mut self, tick_interval: Duration) -> Self {
        self.tick_interval = tick_interval;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_matches_spec_tunables() {
        let cfg = PregelConfig::default();
        assert_eq!(cfg.tick_interval, Duration::from_millis(250));
        assert_eq!(cfg.coordination_timeout, Duration::from_secs(5));
    }

    #[test]
    fn builder_methods_override_defaults() {
        let cfg = PregelConfig::new("app", "w1").with_max_iterations(3).with_partition_count(4);
        assert_eq!(cfg.max_iterations, 3);
        assert_eq!(cfg.partition_count, 4);
        assert_eq!(cfg.application_id, "app");
        assert_eq!(cfg.worker_name, "w1");
    }
}
