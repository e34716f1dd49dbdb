use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::{sleep, timeout, Instant};
use tracing::{debug, info};

use swallow_coordinator::{CoordinationDatabase, Database, EventStream, Registration};
use swallow_core::{CoordinatorEvent, KvConfig, MembershipDelta, NodeSpec, Result, Role, SwallowError};
use swallow_session::{CoordinationSession, MemoryCoordinator, MemorySession};

static NEXT_CLUSTER: AtomicU64 = AtomicU64::new(0);

/// Worker set as reconstructed from a leader's deltas.
#[derive(Debug, Clone, Default)]
pub struct MembershipView {
    members: BTreeMap<String, NodeSpec>,
    deltas: usize,
}

impl MembershipView {
    pub fn apply(&mut self, delta: &MembershipDelta) {
        for node in delta.added.iter().chain(&delta.changed) {
            self.members.insert(node.id.clone(), node.clone());
        }
        for node in &delta.removed {
            self.members.remove(&node.id);
        }
        self.deltas += 1;
    }

    pub fn ids(&self) -> Vec<String> {
        self.members.keys().cloned().collect()
    }

    pub fn get(&self, id: &str) -> Option<&NodeSpec> {
        self.members.get(id)
    }

    pub fn contains(&self, id: &str) -> bool {
        self.members.contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.members.len()
    }

    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }

    /// Number of deltas applied so far.
    pub fn deltas(&self) -> usize {
        self.deltas
    }
}

pub struct ManagerNode {
    leader_id: String,
    session: Arc<MemorySession>,
    db: CoordinationDatabase<MemorySession>,
    events: EventStream,
    view: MembershipView,
    followed: Option<String>,
    closed: bool,
}

impl ManagerNode {
    pub fn leader_id(&self) -> &str {
        &self.leader_id
    }

    pub fn role(&self) -> Role {
        self.db.role()
    }

    pub fn is_leader(&self) -> bool {
        self.db.is_leader()
    }

    pub fn view(&self) -> &MembershipView {
        &self.view
    }

    /// Leader identity from the most recent follower event.
    pub fn followed_leader(&self) -> Option<&str> {
        self.followed.as_deref()
    }

    /// Whether the event stream has closed.
    pub fn is_closed(&self) -> bool {
        self.closed
    }

    pub fn session(&self) -> &Arc<MemorySession> {
        &self.session
    }

    /// Wait up to `wait` for the next event and fold it into this node's
    /// view. `None` on timeout or once the stream has closed.
    pub async fn next_event(&mut self, wait: Duration) -> Option<CoordinatorEvent> {
        if self.closed {
            return None;
        }
        match timeout(wait, self.events.recv()).await {
            Ok(Some(event)) => {
                match &event {
                    CoordinatorEvent::Membership(delta) => self.view.apply(delta),
                    CoordinatorEvent::Follower(follower) => {
                        self.followed = Some(follower.leader_id.clone())
                    }
                    other => debug!("{}: unrecognized event {:?}", self.leader_id, other),
                }
                Some(event)
            }
            Ok(None) => {
                self.closed = true;
                None
            }
            Err(_) => None,
        }
    }

    /// Consume events until none arrives for `quiet`.
    pub async fn drain(&mut self, quiet: Duration) -> usize {
        let mut count = 0;
        while self.next_event(quiet).await.is_some() {
            count += 1;
        }
        count
    }

    /// End the session the way a server-side expiry would.
    pub fn crash(&self) {
        self.session.expire();
    }

    pub async fn stop(&self) {
        self.session.close().await;
    }
}

pub struct WorkerNode {
    node: NodeSpec,
    session: Arc<MemorySession>,
    registration: Registration,
}

impl WorkerNode {
    pub fn node(&self) -> &NodeSpec {
        &self.node
    }

    pub fn registration(&mut self) -> &mut Registration {
        &mut self.registration
    }

    pub fn session(&self) -> &Arc<MemorySession> {
        &self.session
    }
}

/// Managers and workers sharing one in-memory coordination service.
pub struct ClusterHarness {
    service: MemoryCoordinator,
    config: KvConfig,
    managers: Vec<ManagerNode>,
    workers: HashMap<String, WorkerNode>,
}

impl ClusterHarness {
    pub fn new(cluster_id: &str) -> Self {
        let n = NEXT_CLUSTER.fetch_add(1, Ordering::Relaxed);
        let service = MemoryCoordinator::new(format!("harness-{}-{}", cluster_id, n));
        let config = KvConfig::default()
            .with_endpoints(vec![service.name().to_string()])
            .with_cluster_id(cluster_id);
        Self {
            service,
            config,
            managers: Vec::new(),
            workers: HashMap::new(),
        }
    }

    pub fn with_config(mut self, config: KvConfig) -> Self {
        self.config = config;
        self
    }

    pub fn config(&self) -> &KvConfig {
        &self.config
    }

    pub fn service(&self) -> &MemoryCoordinator {
        &self.service
    }

    /// Start a manager campaigning as `leader_id`; returns its index.
    pub async fn add_manager(&mut self, leader_id: &str) -> Result<usize> {
        let session = self.service.connect();
        let config = self.config.clone().with_leader_id(leader_id);
        let db = CoordinationDatabase::connect(Arc::clone(&session), config).await?;
        let events = db.start_elect().await?;
        info!("harness: started manager {}", leader_id);

        self.managers.push(ManagerNode {
            leader_id: leader_id.to_string(),
            session,
            db,
            events,
            view: MembershipView::default(),
            followed: None,
            closed: false,
        });
        Ok(self.managers.len() - 1)
    }

    pub fn manager(&self, index: usize) -> &ManagerNode {
        &self.managers[index]
    }

    pub fn manager_mut(&mut self, index: usize) -> &mut ManagerNode {
        &mut self.managers[index]
    }

    pub fn managers(&self) -> &[ManagerNode] {
        &self.managers
    }

    pub async fn add_worker(&mut self, node: NodeSpec) -> Result<()> {
        let session = self.service.connect();
        let db = CoordinationDatabase::connect(Arc::clone(&session), self.config.clone()).await?;
        let registration = db.register(Some(&node)).await?;
        info!("harness: registered worker {}", node);

        self.workers.insert(
            node.id.clone(),
            WorkerNode {
                node,
                session,
                registration,
            },
        );
        Ok(())
    }

    /// Close the worker's session; its record goes with it.
    pub async fn remove_worker(&mut self, id: &str) -> bool {
        match self.workers.remove(id) {
            Some(worker) => {
                worker.session.close().await;
                info!("harness: worker {} left", id);
                true
            }
            None => false,
        }
    }

    pub async fn update_worker(&mut self, node: NodeSpec) -> Result<()> {
        let worker = self
            .workers
            .get_mut(&node.id)
            .ok_or_else(|| SwallowError::NoNode {
                path: self.config.paths().node_path(&node.id),
            })?;
        worker.registration.update(&node).await?;
        worker.node = node;
        Ok(())
    }

    pub fn worker_mut(&mut self, id: &str) -> Option<&mut WorkerNode> {
        self.workers.get_mut(id)
    }

    pub fn worker_ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.workers.keys().cloned().collect();
        ids.sort();
        ids
    }

    /// Index of the sole manager whose role is leader.
    pub fn leader_index(&self) -> Option<usize> {
        let mut leaders = self
            .managers
            .iter()
            .enumerate()
            .filter(|(_, m)| m.is_leader())
            .map(|(i, _)| i);
        match (leaders.next(), leaders.next()) {
            (Some(index), None) => Some(index),
            _ => None,
        }
    }

    /// Poll until exactly one manager leads, draining events as it goes.
    pub async fn wait_for_leader(&mut self, wait: Duration) -> Option<usize> {
        let deadline = Instant::now() + wait;
        loop {
            self.settle(Duration::from_millis(10)).await;
            if let Some(index) = self.leader_index() {
                return Some(index);
            }
            if Instant::now() >= deadline {
                return None;
            }
            sleep(Duration::from_millis(10)).await;
        }
    }

    /// Drain every manager's stream until each has been quiet for `quiet`.
    pub async fn settle(&mut self, quiet: Duration) {
        for manager in &mut self.managers {
            manager.drain(quiet).await;
        }
    }

    pub async fn shutdown(&mut self) {
        for manager in &self.managers {
            manager.stop().await;
        }
        for (_, worker) in self.workers.drain() {
            worker.session.close().await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_view_applies_deltas() {
        let mut view = MembershipView::default();
        view.apply(&MembershipDelta {
            added: vec![NodeSpec::new("w1", "a"), NodeSpec::new("w2", "a")],
            ..Default::default()
        });
        view.apply(&MembershipDelta {
            removed: vec![NodeSpec::new("w1", "a")],
            changed: vec![NodeSpec::new("w2", "a").with_version(2)],
            ..Default::default()
        });

        assert_eq!(view.ids(), vec!["w2".to_string()]);
        assert_eq!(view.get("w2").unwrap().version, 2);
        assert_eq!(view.deltas(), 2);
    }
}
