//! Session contract for the coordination service.

use async_trait::async_trait;
use bytes::Bytes;
use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};
use swallow_core::{Result, SwallowError};
use tokio::sync::{oneshot, watch};
use tracing::warn;

/// How a node is created.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CreateMode {
    Persistent,
    /// Removed by the service when the owning session ends
    Ephemeral,
    /// Ephemeral, with a per-parent zero-padded sequence appended to the name
    EphemeralSequential,
    PersistentSequential,
}

impl CreateMode {
    pub fn is_ephemeral(self) -> bool {
        matches!(self, CreateMode::Ephemeral | CreateMode::EphemeralSequential)
    }

    pub fn is_sequential(self) -> bool {
        matches!(
            self,
            CreateMode::EphemeralSequential | CreateMode::PersistentSequential
        )
    }
}

/// Connection state reported on the liveness stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Connecting,
    Connected,
    /// Transient loss of the connection; the session may still recover
    Disconnected,
    Expired,
    Closed,
}

impl SessionState {
    /// States after which the session can never be used again.
    pub fn is_fatal(self) -> bool {
        matches!(self, SessionState::Expired | SessionState::Closed)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WatchEventKind {
    NodeCreated,
    NodeDataChanged,
    NodeDeleted,
    NodeChildrenChanged,
    /// The watch was dropped without firing, usually because its session ended
    NotWatching,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WatchEvent {
    pub kind: WatchEventKind,
    pub path: String,
}

/// One-shot change notification for a single path.
///
/// Resolves once, either with the change that fired it or with
/// [`WatchEventKind::NotWatching`] if the service dropped it. A resolved
/// watch must not be polled again; issue a fresh one instead.
#[derive(Debug)]
pub struct Watch {
    path: String,
    rx: oneshot::Receiver<WatchEvent>,
}

impl Watch {
    pub fn new(path: impl Into<String>, rx: oneshot::Receiver<WatchEvent>) -> Self {
        Self {
            path: path.into(),
            rx,
        }
    }

    /// A watch paired with the sender that fires it.
    pub fn channel(path: impl Into<String>) -> (oneshot::Sender<WatchEvent>, Self) {
        let (tx, rx) = oneshot::channel();
        (tx, Self::new(path, rx))
    }

    pub fn path(&self) -> &str {
        &self.path
    }
}

impl Future for Watch {
    type Output = WatchEvent;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let this = self.get_mut();
        Pin::new(&mut this.rx).poll(cx).map(|fired| {
            fired.unwrap_or_else(|_| WatchEvent {
                kind: WatchEventKind::NotWatching,
                path: this.path.clone(),
            })
        })
    }
}

/// Subscription to a session's connection state.
#[derive(Debug, Clone)]
pub struct Liveness {
    rx: watch::Receiver<SessionState>,
}

impl Liveness {
    pub fn new(rx: watch::Receiver<SessionState>) -> Self {
        Self { rx }
    }

    pub fn current(&self) -> SessionState {
        *self.rx.borrow()
    }

    pub fn is_fatal(&self) -> bool {
        self.current().is_fatal()
    }

    /// Wait for the next state change.
    ///
    /// Cancel-safe. Once the session is gone this keeps returning
    /// [`SessionState::Closed`] immediately.
    pub async fn changed(&mut self) -> SessionState {
        match self.rx.changed().await {
            Ok(()) => *self.rx.borrow_and_update(),
            Err(_) => SessionState::Closed,
        }
    }

    /// Wait until the session reaches a fatal state.
    pub async fn fatal(&mut self) -> SessionState {
        loop {
            let state = self.current();
            if state.is_fatal() {
                return state;
            }
            let state = self.changed().await;
            if state.is_fatal() {
                return state;
            }
        }
    }
}

/// Connection to a watch-based coordination service.
///
/// Paths are absolute and `/`-separated. Watches are single-fire.
#[async_trait]
pub trait CoordinationSession: Send + Sync + 'static {
    /// Identifier used in log fields.
    fn id(&self) -> String;

    fn liveness(&self) -> Liveness;

    /// Create a node and return its actual path, which differs from `path`
    /// for sequential modes.
    async fn create(&self, path: &str, data: &[u8], mode: CreateMode) -> Result<String>;

    /// Create a persistent node, succeeding if it already exists.
    async fn create_if_absent(&self, path: &str, data: &[u8]) -> Result<()> {
        match self.create(path, data, CreateMode::Persistent).await {
            Ok(_) | Err(SwallowError::NodeExists { .. }) => Ok(()),
            Err(e) => {
                warn!("create node ({}): {}", path, e);
                Err(e)
            }
        }
    }

    async fn set(&self, path: &str, data: &[u8]) -> Result<()>;

    async fn delete(&self, path: &str) -> Result<()>;

    async fn read(&self, path: &str) -> Result<Bytes>;

    /// Read a node and leave a watch on its data.
    async fn read_watched(&self, path: &str) -> Result<(Bytes, Watch)>;

    async fn children(&self, path: &str) -> Result<Vec<String>>;

    /// List children and leave a watch on the child set.
    async fn children_watched(&self, path: &str) -> Result<(Vec<String>, Watch)>;

    /// End the session. Ephemeral nodes it owns are removed and the
    /// liveness stream reports [`SessionState::Closed`].
    async fn close(&self);
}
