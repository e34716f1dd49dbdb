//! The coordination facade handed to manager and worker processes.

use async_trait::async_trait;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, OnceLock};
use swallow_core::{
    BackendKind, ClusterPaths, CoordinatorEvent, KvConfig, NodeSpec, Result, Role, SwallowError,
};
use swallow_election::{Election, SessionElection};
use swallow_session::{CoordinationSession, MemoryCoordinator, MemorySession};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::coordinator::Coordinator;
use crate::registration::{self, Registration};
use crate::role::RoleHandle;

/// Ordered coordinator output. Closes when the coordinator terminates.
pub type EventStream = mpsc::Receiver<CoordinatorEvent>;

/// Leader election and membership for a cluster.
#[async_trait]
pub trait Database: Send + Sync {
    /// Join the election and start the coordinator.
    ///
    /// May be called once per database.
    async fn start_elect(&self) -> Result<EventStream>;

    /// Publish this process as a worker.
    async fn register(&self, node: Option<&NodeSpec>) -> Result<Registration>;

    /// Current coordinator role, safe to call from any task.
    fn role(&self) -> Role;

    fn is_leader(&self) -> bool {
        self.role() == Role::Leader
    }
}

/// [`Database`] backed by one coordination session.
pub struct CoordinationDatabase<S> {
    session: Arc<S>,
    config: KvConfig,
    paths: ClusterPaths,
    /// Set once the coordinator exists; `Idle` until then
    role: OnceLock<RoleHandle>,
    started: AtomicBool,
}

impl<S: CoordinationSession> CoordinationDatabase<S> {
    /// Wrap `session` and make sure the cluster's paths exist.
    pub async fn connect(session: Arc<S>, config: KvConfig) -> Result<Self> {
        config.validate()?;
        let paths = config.paths();
        for path in paths.required() {
            session.create_if_absent(path, b"").await?;
        }
        info!(
            "connected to {} as {} (cluster {})",
            session.id(),
            config.leader_id,
            config.cluster_id
        );

        Ok(Self {
            session,
            config,
            paths,
            role: OnceLock::new(),
            started: AtomicBool::new(false),
        })
    }

    pub fn session(&self) -> &Arc<S> {
        &self.session
    }

    pub fn config(&self) -> &KvConfig {
        &self.config
    }

    pub fn paths(&self) -> &ClusterPaths {
        &self.paths
    }

    /// Start the coordinator on a caller-supplied election.
    pub fn start_with<E: Election>(&self, election: E) -> Result<EventStream> {
        if self.started.swap(true, Ordering::AcqRel) {
            return Err(SwallowError::unexpected_state(format!(
                "election already started (role {})",
                self.role()
            )));
        }

        let (tx, rx) = mpsc::channel(self.config.output_capacity);
        let coordinator = Coordinator::new(Arc::clone(&self.session), election, &self.config, tx);
        if self.role.set(coordinator.role_handle()).is_err() {
            return Err(SwallowError::unexpected_state("coordinator role already bound"));
        }
        tokio::spawn(async move {
            match coordinator.run().await {
                Ok(()) => debug!("coordinator finished"),
                Err(e) => warn!("coordinator finished: {}", e),
            }
        });
        Ok(rx)
    }
}

#[async_trait]
impl<S: CoordinationSession> Database for CoordinationDatabase<S> {
    async fn start_elect(&self) -> Result<EventStream> {
        if self.started.load(Ordering::Acquire) {
            return Err(SwallowError::unexpected_state(format!(
                "election already started (role {})",
                self.role()
            )));
        }
        let election = SessionElection::start(
            Arc::clone(&self.session),
            self.paths.election(),
            self.config.leader_id.clone(),
        );
        self.start_with(election)
    }

    async fn register(&self, node: Option<&NodeSpec>) -> Result<Registration> {
        let session: Arc<dyn CoordinationSession> = self.session.clone();
        registration::register(session, &self.paths, node).await
    }

    fn role(&self) -> Role {
        self.role.get().map_or(Role::Idle, RoleHandle::get)
    }
}

/// Build a database for the configured backend.
pub async fn create_database(config: &KvConfig) -> Result<CoordinationDatabase<MemorySession>> {
    config.validate()?;
    match config.backend {
        BackendKind::Memory => {
            let service = MemoryCoordinator::shared(&config.endpoints.join(","));
            CoordinationDatabase::connect(service.connect(), config.clone()).await
        }
    }
}
