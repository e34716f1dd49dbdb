//! Worker registration.

use std::convert::Infallible;
use std::sync::Arc;
use swallow_core::{ClusterPaths, NodeSpec, Result, SwallowError};
use swallow_session::{CoordinationSession, CreateMode};
use tokio::sync::mpsc;
use tracing::{debug, info};

/// A worker's presence record.
///
/// The record is ephemeral: it disappears with the session that created it,
/// and that is the only departure signal the leader ever sees. The
/// registration carries no events of its own; it only reports when the
/// session has ended.
pub struct Registration {
    session: Arc<dyn CoordinationSession>,
    node_id: String,
    path: String,
    closed: mpsc::Receiver<Infallible>,
}

impl std::fmt::Debug for Registration {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Registration")
            .field("session", &self.session.id())
            .field("path", &self.path)
            .finish()
    }
}

/// Publish `node` under the registration path.
///
/// A missing node description is a configuration error and nothing is
/// written.
pub async fn register(
    session: Arc<dyn CoordinationSession>,
    paths: &ClusterPaths,
    node: Option<&NodeSpec>,
) -> Result<Registration> {
    let node = node.ok_or_else(|| SwallowError::config("node config empty"))?;
    if node.id.is_empty() || node.id.contains('/') {
        return Err(SwallowError::config(format!("invalid node id {:?}", node.id)));
    }

    let data = node.to_bytes()?;
    let path = paths.node_path(&node.id);
    session.create(&path, &data, CreateMode::Ephemeral).await?;
    info!("registered {} at {}", node, path);

    let (tx, closed) = mpsc::channel::<Infallible>(1);
    let mut liveness = session.liveness();
    let watched = path.clone();
    tokio::spawn(async move {
        let session_ended = async {
            while !liveness.is_fatal() {
                let state = liveness.changed().await;
                debug!("registration {}: session event {:?}", watched, state);
            }
        };
        tokio::select! {
            _ = session_ended => info!("registration {} closed", watched),
            _ = tx.closed() => debug!("registration {} dropped", watched),
        }
    });

    Ok(Registration {
        session,
        node_id: node.id.clone(),
        path,
        closed,
    })
}

impl Registration {
    pub fn node_id(&self) -> &str {
        &self.node_id
    }

    pub fn node_path(&self) -> &str {
        &self.path
    }

    /// Wait until the session behind this registration has ended.
    pub async fn closed(&mut self) {
        if let Some(never) = self.closed.recv().await {
            match never {}
        }
    }

    pub fn is_closed(&self) -> bool {
        self.closed.is_closed()
    }

    /// Rewrite the published record.
    ///
    /// The leader picks the new value up as a changed entry on its next
    /// membership scan. The node ID cannot change.
    pub async fn update(&self, node: &NodeSpec) -> Result<()> {
        if node.id != self.node_id {
            return Err(SwallowError::config(format!(
                "registration for {} cannot publish node {}",
                self.node_id, node.id
            )));
        }
        let data = node.to_bytes()?;
        self.session.set(&self.path, &data).await?;
        debug!("updated registration {} to {}", self.path, node);
        Ok(())
    }
}
