//! The coordination-store gateway abstraction (§4.2, §6, §10.5): group
//! membership, leader election, the replicated shared value, and the
//! hierarchical barrier tree.

use std::collections::{HashMap, HashSet};

use async_trait::async_trait;
use tokio::sync::{watch, RwLock};
use tracing::{debug, info};

use crate::error::Result;
use crate::pregel_state::Phase;

/// Render a [`Phase`] the way the barrier-tree path convention spells it (§4.2).
pub fn phase_segment(phase: Phase) -> &'static str {
    match phase {
        Phase::Receive => "RCV",
        Phase::Send => "SND",
    }
}

/// `<root>/<applicationId>/barriers/<step>/<RCV|SND>`
pub fn barrier_path(root: &str, application_id: &str, step: i32, phase: Phase) -> String {
    format!("{root}/{application_id}/barriers/{step}/{}", phase_segment(phase))
}

/// `<root>/<applicationId>/group/<workerName>`
pub fn group_member_path(root: &str, application_id: &str, worker_name: &str) -> String {
    format!("{root}/{application_id}/group/{worker_name}")
}

/// `<root>/<applicationId>/group`
pub fn group_path(root: &str, application_id: &str) -> String {
    format!("{root}/{application_id}/group")
}

/// `<root>/<applicationId>/leader`
pub fn leader_path(root: &str, application_id: &str) -> String {
    format!("{root}/{application_id}/leader")
}

/// `<root>/<applicationId>/superstep`
pub fn shared_state_path(root: &str, application_id: &str) -> String {
    format!("{root}/{application_id}/superstep")
}

/// Name a worker's readiness child: `worker:<hostAndPort>#<threadId>`.
pub fn worker_child_name(host_and_port: &str, thread_id: u64) -> String {
    format!("worker:{host_and_port}#{thread_id}")
}

/// Name a partition's in-flight marker: `partition-<P>`.
pub fn partition_child_name(partition: usize) -> String {
    format!("partition-{partition}")
}

/// Thin abstraction over an external coordination store (ZooKeeper-shaped,
/// but the trait makes no assumption about the concrete backend). All
/// methods fail with [`StateError::ConnectionLost`] on a lost connection,
/// per §4.2.
#[async_trait]
pub trait CoordinationGateway: Send + Sync {
    /// Join `path`'s group as `member_id`; ephemeral — a real backend drops
    /// this membership automatically when the owning session disconnects.
    async fn join_group(&self, path: &str, member_id: &str) -> Result<()>;

    /// Leave a previously joined group.
    async fn leave_group(&self, path: &str, member_id: &str) -> Result<()>;

    /// Current members of `path`'s group.
    async fn group_members(&self, path: &str) -> Result<Vec<String>>;

    /// Non-blocking attempt to become the leader at `path`. Idempotent for
    /// the current leader; a no-op (not an error) for anyone else.
    async fn elect_leader(&self, path: &str, member_id: &str) -> Result<()>;

    /// `true` iff `member_id` currently holds leadership at `path`.
    async fn has_leadership(&self, path: &str, member_id: &str) -> Result<bool>;

    /// Read the opaque shared value at `path`, or `None` if never written.
    async fn get_shared_value(&self, path: &str) -> Result<Option<Vec<u8>>>;

    /// CAS-free write of the opaque shared value at `path`.
    async fn set_shared_value(&self, path: &str, value: Vec<u8>) -> Result<()>;

    /// Subscribe to change notifications on the shared value at `path`.
    async fn watch_shared_value(&self, path: &str) -> Result<watch::Receiver<Option<Vec<u8>>>>;

    /// Add a named child under `parent`. `ephemeral` children disappear when
    /// their owning member's session ends; idempotent either way.
    async fn add_child(&self, parent: &str, name: &str, ephemeral: bool) -> Result<()>;

    /// Remove a named child under `parent`. Idempotent — removing an absent
    /// child is not an error (§4.6 relies on this).
    async fn remove_child(&self, parent: &str, name: &str) -> Result<()>;

    /// `true` iff `name` currently exists under `parent`.
    async fn has_child(&self, parent: &str, name: &str) -> Result<bool>;

    /// Number of children currently under `parent`.
    async fn count_children(&self, parent: &str) -> Result<usize>;

    /// All child names currently under `parent`.
    async fn children(&self, parent: &str) -> Result<Vec<String>>;
}

#[derive(Default)]
struct GatewayState {
    groups: HashMap<String, HashSet<String>>,
    leaders: HashMap<String, String>,
    children: HashMap<String, HashMap<String, bool>>, // parent -> name -> ephemeral
    /// Tracks which ephemeral resources (group memberships, ephemeral
    /// children, leaderships) belong to which member, so a simulated
    /// session loss can release exactly that member's footprint (used by
    /// S5's leader-crash scenario).
    owned_by_member: HashMap<String, Vec<Ownership>>,
    shared_values: HashMap<String, watch::Sender<Option<Vec<u8>>>>,
}

#[derive(Clone)]
enum Ownership {
    Group { path: String },
    Leader { path: String },
    Child { parent: String, name: String },
}

/// In-process reference implementation of [`CoordinationGateway`] (§10.5),
/// built on `Arc<RwLock<..>>`-guarded state with `tokio::sync::watch` for
/// shared-value change notification.
#[derive(Default)]
pub struct InMemoryCoordinationGateway {
    state: RwLock<GatewayState>,
}

impl InMemoryCoordinationGateway {
    pub fn new() -> Self {
        Self::default()
    }

    /// Simulate a member's coordination session ending: releases its group
    /// memberships, leaderships, and ephemeral children. Test-only hook used
    /// to exercise crash-restart scenarios (S5) without a real session
    /// concept.
    pub async fn simulate_session_loss(&self, member_id: &str) {
        let mut state = self.state.write().await;
        let owned = state.owned_by_member.remove(member_id).unwrap_or_default();
        for ownership in owned {
            match ownership {
                Ownership::Group { path } => {
                    if let Some(members) = state.groups.get_mut(&path) {
                        members.remove(member_id);
                    }
                }
                Ownership::Leader { path } => {
                    if state.leaders.get(&path).map(|s| s.as_str()) == Some(member_id) {
                        state.leaders.remove(&path);
                    }
                }
                Ownership::Child { parent, name } => {
                    if let Some(children) = state.children.get_mut(&parent) {
                        children.remove(&name);
                    }
                }
            }
        }
        info!(member_id, "simulated coordination session loss");
    }
}

#[async_trait]
impl CoordinationGateway for InMemoryCoordinationGateway {
    async fn join_group(&self, path: &str, member_id: &str) -> Result<()> {
        let mut state = self.state.write().await;
        state.groups.entry(path.to_string()).or_default().insert(member_id.to_string());
        state
            .owned_by_member
            .entry(member_id.to_string())
            .or_default()
            .push(Ownership::Group { path: path.to_string() });
        debug!(path, member_id, "joined group");
        Ok(())
    }

    async fn leave_group(&self, path: &str, member_id: &str) -> Result<()> {
        let mut state = self.state.write().await;
        if let Some(members) = state.groups.get_mut(path) {
            members.remove(member_id);
        }
        Ok(())
    }

    async fn group_members(&self, path: &str) -> Result<Vec<String>> {
        let state = self.state.read().await;
        Ok(state.groups.get(path).map(|m| m.iter().cloned().collect()).unwrap_or_default())
    }

    async fn elect_leader(&self, path: &str, member_id: &str) -> Result<()> {
        let mut state = self.state.write().await;
        if !state.leaders.contains_key(path) {
            state.leaders.insert(path.to_string(), member_id.to_string());
            state
                .owned_by_member
                .entry(member_id.to_string())
                .or_default()
                .push(Ownership::Leader { path: path.to_string() });
            info!(path, member_id, "acquired leadership");
        }
        Ok(())
    }

    async fn has_leadership(&self, path: &str, member_id: &str) -> Result<bool> {
        let state = self.state.read().await;
        Ok(state.leaders.get(path).map(|s| s.as_str()) == Some(member_id))
    }

    async fn get_shared_value(&self, path: &str) -> Result<Option<Vec<u8>>> {
        let state = self.state.read().await;
        Ok(state.shared_values.get(path).and_then(|tx| tx.borrow().clone()))
    }

    async fn set_shared_value(&self, path: &str, value: Vec<u8>) -> Result<()> {
        let mut state = self.state.write().await;
        match state.shared_values.get(path) {
            Some(tx) => {
                let _ = tx.send(Some(value));
            }
            None => {
                let (tx, _rx) = watch::channel(Some(value));
                state.shared_values.insert(path.to_string(), tx);
            }
        }
        Ok(())
    }

    async fn watch_shared_value(&self, path: &str) -> Result<watch::Receiver<Option<Vec<u8>>>> {
        let mut state = self.state.write().await;
        let tx = state.shared_values.entry(path.to_string()).or_insert_with(|| {
            let (tx, _rx) = watch::channel(None);
            tx
        });
        Ok(tx.subscribe())
    }

    async fn add_child(&self, parent: &str, name: &str, ephemeral: bool) -> Result<()> {
        let mut state = self.state.write().await;
        let already_present = state
            .children
            .get(parent)
            .map(|c| c.contains_key(name))
            .unwrap_or(false);
        state
            .children
            .entry(parent.to_string())
            .or_default()
            .insert(name.to_string(), ephemeral);
        if !already_present {
            debug!(parent, name, ephemeral, "added barrier-tree child");
        }
        Ok(())
    }

    async fn remove_child(&self, parent: &str, name: &str) -> Result<()> {
        let mut state = self.state.write().await;
        if let Some(children) = state.children.get_mut(parent) {
            if children.remove(name).is_some() {
                debug!(parent, name, "removed barrier-tree child");
            }
        }
        Ok(())
    }

    async fn has_child(&self, parent: &str, name: &str) -> Result<bool> {
        let state = self.state.read().await;
        Ok(state.children.get(parent).map(|c| c.contains_key(name)).unwrap_or(false))
    }

    async fn count_children(&self, parent: &str) -> Result<usize> {
        let state = self.state.read().await;
        Ok(state.children.get(parent).map(|c| c.len()).unwrap_or(0))
    }

    async fn children(&self, parent: &str) -> Result<Vec<String>> {
        let state = self.state.read().await;
        Ok(state.children.get(parent).map(|c| c.keys().cloned().collect()).unwrap_or_default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn first_elector_wins_leadership() {
        let gw = InMemoryCoordinationGateway::new();
        gw.elect_leader("/leader", "w1").await.unwrap();
        gw.elect_leader("/leader", "w2").await.unwrap();
        assert!(gw.has_leadership("/leader", "w1").await.unwrap());
        assert!(!gw.has_leadership("/leader", "w2").await.unwrap());
    }

    #[tokio::test]
    async fn session_loss_releases_leadership_for_reelection() {
        let gw = InMemoryCoordinationGateway::new();
        gw.elect_leader("/leader", "w1").await.unwrap();
        gw.simulate_session_loss("w1").await;
        gw.elect_leader("/leader", "w2").await.unwrap();
        assert!(gw.has_leadership("/leader", "w2").await.unwrap());
    }

    #[tokio::test]
    async fn add_child_is_idempotent_and_counts_correctly() {
        let gw = InMemoryCoordinationGateway::new();
        gw.add_child("/barriers/0/SND", "partition-0", true).await.unwrap();
        gw.add_child("/barriers/0/SND", "partition-0", true).await.unwrap();
        assert_eq!(gw.count_children("/barriers/0/SND").await.unwrap(), 1);
        gw.remove_child("/barriers/0/SND", "partition-0").await.unwrap();
        assert_eq!(gw.count_children("/barriers/0/SND").await.unwrap(), 0);
        // Removing again must not error (§4.6 idempotence).
        gw.remove_child("/barriers/0/SND", "partition-0").await.unwrap();
    }

    #[tokio::test]
    async fn shared_value_change_is_observable_via_watch() {
        let gw = InMemoryCoordinationGateway::new();
        let mut rx = gw.watch_shared_value("/superstep").await.unwrap();
        gw.set_shared_value("/superstep", vec![1, 2, 3]).await.unwrap();
        rx.changed().await.unwrap();
        assert_eq!(*rx.borrow(), Some(vec![1, 2, 3]));
    }

    #[test]
    fn barrier_path_matches_the_documented_convention() {
        let p = barrier_path("/root", "app1", 3, Phase::Send);
        assert_eq!(p, "/root/app1/barriers/3/SND");
    }
}
