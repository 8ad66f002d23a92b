//! The user compute-function contract (§6, §9).
//!
//! Modeled as a trait plus an output builder passed by `&mut` reference,
//! accumulating `(newValueOpt, outgoing: map)`, rather than an
//! event/callback style — ordering of outgoing messages is irrelevant and
//! set semantics suffice (§9 design notes).

use std::collections::HashMap;
use std::fmt;
use std::hash::Hash;

use async_trait::async_trait;

use pregel_state::EdgeEntry;

/// Accumulates the results of one `compute` invocation: an optional new
/// vertex value and the map of outgoing messages keyed by destination.
pub struct ComputeOutput<K, VV, Msg> {
    new_vertex_value: Option<VV>,
    outgoing_messages: HashMap<K, Msg>,
}

impl<K, VV, Msg> ComputeOutput<K, VV, Msg>
where
    K: Eq + Hash,
{
    pub fn new() -> Self {
        ComputeOutput { new_vertex_value: None, outgoing_messages: HashMap::new() }
    }

    /// Replace the vertex's value effective at `step + 1`. Passing `None`
    /// (the default) leaves the solution-set entry unchanged for this step.
    pub fn set_new_vertex_value(&mut self, value: Option<VV>) {
        self.new_vertex_value = value;
    }

    /// Queue an outgoing message to `dst`, to be tagged with `step + 1` by
    /// the pipeline's dispatch stage (§4.4 stage 4). A second call for the
    /// same `dst` within one invocation overwrites the first, matching the
    /// "at most one outgoing message per (src,dst,step)" expectation (§3).
    pub fn send_message_to(&mut self, dst: K, msg: Msg) {
        self.outgoing_messages.insert(dst, msg);
    }

    pub fn into_parts(self) -> (Option<VV>, HashMap<K, Msg>) {
        (self.new_vertex_value, self.outgoing_messages)
    }
}

impl<K, VV, Msg> Default for ComputeOutput<K, VV, Msg>
where
    K: Eq + Hash,
{
    fn default() -> Self {
        Self::new()
    }
}

/// The user-supplied vertex program. Must be deterministic for a given
/// `(superstep, vertex, incoming, edges)` tuple — required for idempotent
/// re-invocation under crash-restart and late-message re-forwarding (§4.4,
/// §8 invariant 5).
#[async_trait]
pub trait Compute<K, VV, EV, Msg>: Send + Sync
where
    K: Eq + Hash + Clone + Send + Sync + fmt::Debug + 'static,
    VV: Clone + Send + Sync + fmt::Debug + 'static,
    EV: Clone + Send + Sync + fmt::Debug + 'static,
    Msg: Clone + Send + Sync + fmt::Debug + 'static,
{
    async fn compute(
        &self,
        superstep: i32,
        vertex: &K,
        vertex_value: &VV,
        incoming: &HashMap<K, Msg>,
        edges: &EdgeEntry<K, EV>,
        output: &mut ComputeOutput<K, VV, Msg>,
    ) -> std::result::Result<(), Box<dyn std::error::Error + Send + Sync>>;
}
