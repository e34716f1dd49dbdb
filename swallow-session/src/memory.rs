//! In-process coordination service.
//!
//! Behaves like a single-server ZooKeeper ensemble: a tree of nodes with
//! data, ephemeral and sequential nodes, one-shot data and child watches,
//! and sessions whose end removes their ephemeral nodes.

use async_trait::async_trait;
use bytes::Bytes;
use parking_lot::Mutex;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, OnceLock};
use swallow_core::{Result, SwallowError};
use tokio::sync::{oneshot, watch};
use tracing::{debug, info};

use crate::session::{
    CoordinationSession, CreateMode, Liveness, SessionState, Watch, WatchEvent, WatchEventKind,
};

type WatchSlot = (u64, oneshot::Sender<WatchEvent>);

#[derive(Debug)]
struct ZNode {
    data: Bytes,
    owner: Option<u64>,
    next_seq: u64,
}

impl ZNode {
    fn new(data: Bytes, owner: Option<u64>) -> Self {
        Self {
            data,
            owner,
            next_seq: 0,
        }
    }
}

#[derive(Debug)]
struct Tree {
    nodes: BTreeMap<String, ZNode>,
    data_watches: HashMap<String, Vec<WatchSlot>>,
    child_watches: HashMap<String, Vec<WatchSlot>>,
}

impl Tree {
    fn new() -> Self {
        let mut nodes = BTreeMap::new();
        nodes.insert("/".to_string(), ZNode::new(Bytes::new(), None));
        Self {
            nodes,
            data_watches: HashMap::new(),
            child_watches: HashMap::new(),
        }
    }

    fn child_names(&self, path: &str) -> Vec<String> {
        let prefix = if path == "/" {
            "/".to_string()
        } else {
            format!("{}/", path)
        };
        self.nodes
            .range(prefix.clone()..)
            .take_while(|(key, _)| key.starts_with(&prefix))
            .filter_map(|(key, _)| {
                let name = &key[prefix.len()..];
                (!name.is_empty() && !name.contains('/')).then(|| name.to_string())
            })
            .collect()
    }

    fn fire(watches: &mut HashMap<String, Vec<WatchSlot>>, path: &str, kind: WatchEventKind) {
        if let Some(slots) = watches.remove(path) {
            for (_, tx) in slots {
                let _ = tx.send(WatchEvent {
                    kind,
                    path: path.to_string(),
                });
            }
        }
    }

    fn create(&mut self, owner: u64, path: &str, data: &[u8], mode: CreateMode) -> Result<String> {
        validate_path(path)?;
        let parent = parent_of(path);
        let seq = match self.nodes.get_mut(parent) {
            Some(node) if node.owner.is_some() => {
                return Err(SwallowError::unexpected_state(format!(
                    "ephemeral node {} cannot have children",
                    parent
                )))
            }
            Some(node) => {
                let seq = node.next_seq;
                node.next_seq += 1;
                seq
            }
            None => {
                return Err(SwallowError::NoNode {
                    path: parent.to_string(),
                })
            }
        };

        let actual = if mode.is_sequential() {
            format!("{}{:010}", path, seq)
        } else {
            path.to_string()
        };
        if self.nodes.contains_key(&actual) {
            return Err(SwallowError::NodeExists { path: actual });
        }

        let owner = mode.is_ephemeral().then_some(owner);
        self.nodes
            .insert(actual.clone(), ZNode::new(Bytes::copy_from_slice(data), owner));

        Self::fire(&mut self.data_watches, &actual, WatchEventKind::NodeCreated);
        Self::fire(
            &mut self.child_watches,
            parent,
            WatchEventKind::NodeChildrenChanged,
        );
        Ok(actual)
    }

    fn set(&mut self, path: &str, data: &[u8]) -> Result<()> {
        let node = self.nodes.get_mut(path).ok_or_else(|| SwallowError::NoNode {
            path: path.to_string(),
        })?;
        node.data = Bytes::copy_from_slice(data);
        Self::fire(&mut self.data_watches, path, WatchEventKind::NodeDataChanged);
        Ok(())
    }

    fn delete(&mut self, path: &str) -> Result<()> {
        if path == "/" {
            return Err(SwallowError::unexpected_state("the root node cannot be deleted"));
        }
        if !self.nodes.contains_key(path) {
            return Err(SwallowError::NoNode {
                path: path.to_string(),
            });
        }
        if !self.child_names(path).is_empty() {
            return Err(SwallowError::NotEmpty {
                path: path.to_string(),
            });
        }

        self.nodes.remove(path);
        Self::fire(&mut self.data_watches, path, WatchEventKind::NodeDeleted);
        Self::fire(&mut self.child_watches, path, WatchEventKind::NodeDeleted);
        Self::fire(
            &mut self.child_watches,
            parent_of(path),
            WatchEventKind::NodeChildrenChanged,
        );
        Ok(())
    }

    fn read(&self, path: &str) -> Result<Bytes> {
        self.nodes
            .get(path)
            .map(|node| node.data.clone())
            .ok_or_else(|| SwallowError::NoNode {
                path: path.to_string(),
            })
    }

    fn children(&self, path: &str) -> Result<Vec<String>> {
        if !self.nodes.contains_key(path) {
            return Err(SwallowError::NoNode {
                path: path.to_string(),
            });
        }
        Ok(self.child_names(path))
    }

    fn add_watch(
        watches: &mut HashMap<String, Vec<WatchSlot>>,
        session: u64,
        path: &str,
    ) -> Watch {
        let (tx, watch) = Watch::channel(path);
        let slots = watches.entry(path.to_string()).or_default();
        // drop watches whose holders went away without waiting for them
        slots.retain(|(_, pending)| !pending.is_closed());
        slots.push((session, tx));
        watch
    }

    /// Remove everything a finished session left behind.
    fn end_session(&mut self, session: u64) -> usize {
        let owned: Vec<String> = self
            .nodes
            .iter()
            .filter(|(_, node)| node.owner == Some(session))
            .map(|(path, _)| path.clone())
            .collect();

        for path in &owned {
            // ephemeral nodes never have children
            let _ = self.delete(path);
        }

        for watches in [&mut self.data_watches, &mut self.child_watches] {
            for slots in watches.values_mut() {
                slots.retain(|(owner, _)| *owner != session);
            }
            watches.retain(|_, slots| !slots.is_empty());
        }
        owned.len()
    }
}

fn parent_of(path: &str) -> &str {
    match path.rfind('/') {
        Some(0) | None => "/",
        Some(idx) => &path[..idx],
    }
}

fn validate_path(path: &str) -> Result<()> {
    let valid = path.starts_with('/')
        && path.len() > 1
        && !path.ends_with('/')
        && !path.contains("//");
    if valid {
        Ok(())
    } else {
        Err(SwallowError::config(format!("invalid path {:?}", path)))
    }
}

#[derive(Debug)]
struct Inner {
    name: String,
    tree: Mutex<Tree>,
    next_session: AtomicU64,
}

/// In-process coordination service shared by any number of sessions.
#[derive(Debug, Clone)]
pub struct MemoryCoordinator {
    inner: Arc<Inner>,
}

fn registry() -> &'static Mutex<HashMap<String, MemoryCoordinator>> {
    static REGISTRY: OnceLock<Mutex<HashMap<String, MemoryCoordinator>>> = OnceLock::new();
    REGISTRY.get_or_init(|| Mutex::new(HashMap::new()))
}

impl MemoryCoordinator {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            inner: Arc::new(Inner {
                name: name.into(),
                tree: Mutex::new(Tree::new()),
                next_session: AtomicU64::new(1),
            }),
        }
    }

    /// Process-wide instance registered under `name`, created on first use.
    pub fn shared(name: &str) -> Self {
        registry()
            .lock()
            .entry(name.to_string())
            .or_insert_with(|| MemoryCoordinator::new(name))
            .clone()
    }

    pub fn name(&self) -> &str {
        &self.inner.name
    }

    /// Open a new session.
    pub fn connect(&self) -> Arc<MemorySession> {
        let id = self.inner.next_session.fetch_add(1, Ordering::Relaxed);
        let (state_tx, _) = watch::channel(SessionState::Connected);
        debug!("memory coordinator {} opened session 0x{:x}", self.inner.name, id);
        Arc::new(MemorySession {
            id,
            service: self.clone(),
            state_tx,
            closed: AtomicBool::new(false),
            faults: Mutex::new(Faults::default()),
        })
    }

    /// Number of nodes in the tree, including the root.
    pub fn node_count(&self) -> usize {
        self.inner.tree.lock().nodes.len()
    }

    pub fn exists(&self, path: &str) -> bool {
        self.inner.tree.lock().nodes.contains_key(path)
    }
}

#[derive(Debug, Default)]
struct Faults {
    reads: HashSet<String>,
    children: HashSet<String>,
}

/// A session against a [`MemoryCoordinator`].
///
/// Dropping the session ends it as if the connection had closed.
#[derive(Debug)]
pub struct MemorySession {
    id: u64,
    service: MemoryCoordinator,
    state_tx: watch::Sender<SessionState>,
    closed: AtomicBool,
    faults: Mutex<Faults>,
}

impl MemorySession {
    pub fn session_id(&self) -> u64 {
        self.id
    }

    pub fn service(&self) -> &MemoryCoordinator {
        &self.service
    }

    /// Make reads of `path` fail with a connection error.
    pub fn fail_reads(&self, path: impl Into<String>) {
        self.faults.lock().reads.insert(path.into());
    }

    /// Make child listings of `path` fail with a connection error.
    pub fn fail_children(&self, path: impl Into<String>) {
        self.faults.lock().children.insert(path.into());
    }

    pub fn clear_faults(&self) {
        let mut faults = self.faults.lock();
        faults.reads.clear();
        faults.children.clear();
    }

    /// Report a transient connection loss.
    pub fn disconnect(&self) {
        if !self.closed.load(Ordering::Acquire) {
            self.state_tx.send_replace(SessionState::Disconnected);
        }
    }

    pub fn reconnect(&self) {
        if !self.closed.load(Ordering::Acquire) {
            self.state_tx.send_replace(SessionState::Connected);
        }
    }

    /// End the session the way a server-side timeout would.
    pub fn expire(&self) {
        self.shutdown(SessionState::Expired);
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    /// Number of live [`Liveness`] handles on this session.
    pub fn liveness_subscribers(&self) -> usize {
        self.state_tx.receiver_count()
    }

    fn shutdown(&self, state: SessionState) {
        if self.closed.swap(true, Ordering::AcqRel) {
            return;
        }
        let removed = self.service.inner.tree.lock().end_session(self.id);
        info!(
            "session 0x{:x} ended ({:?}), removed {} ephemeral nodes",
            self.id, state, removed
        );
        self.state_tx.send_replace(state);
    }

    fn check_open(&self) -> Result<()> {
        if self.closed.load(Ordering::Acquire) {
            Err(SwallowError::SessionClosed { session: self.id() })
        } else {
            Ok(())
        }
    }

    fn check_read(&self, path: &str) -> Result<()> {
        self.check_open()?;
        if self.faults.lock().reads.contains(path) {
            return Err(SwallowError::connection(format!("read {} failed", path)));
        }
        Ok(())
    }

    fn check_children(&self, path: &str) -> Result<()> {
        self.check_open()?;
        if self.faults.lock().children.contains(path) {
            return Err(SwallowError::connection(format!("children {} failed", path)));
        }
        Ok(())
    }
}

#[async_trait]
impl CoordinationSession for MemorySession {
    fn id(&self) -> String {
        format!("memory:{}/0x{:x}", self.service.inner.name, self.id)
    }

    fn liveness(&self) -> Liveness {
        Liveness::new(self.state_tx.subscribe())
    }

    async fn create(&self, path: &str, data: &[u8], mode: CreateMode) -> Result<String> {
        self.check_open()?;
        self.service.inner.tree.lock().create(self.id, path, data, mode)
    }

    async fn set(&self, path: &str, data: &[u8]) -> Result<()> {
        self.check_open()?;
        self.service.inner.tree.lock().set(path, data)
    }

    async fn delete(&self, path: &str) -> Result<()> {
        self.check_open()?;
        self.service.inner.tree.lock().delete(path)
    }

    async fn read(&self, path: &str) -> Result<Bytes> {
        self.check_read(path)?;
        self.service.inner.tree.lock().read(path)
    }

    async fn read_watched(&self, path: &str) -> Result<(Bytes, Watch)> {
        self.check_read(path)?;
        let mut tree = self.service.inner.tree.lock();
        let data = tree.read(path)?;
        let watch = Tree::add_watch(&mut tree.data_watches, self.id, path);
        Ok((data, watch))
    }

    async fn children(&self, path: &str) -> Result<Vec<String>> {
        self.check_children(path)?;
        self.service.inner.tree.lock().children(path)
    }

    async fn children_watched(&self, path: &str) -> Result<(Vec<String>, Watch)> {
        self.check_children(path)?;
        let mut tree = self.service.inner.tree.lock();
        let children = tree.children(path)?;
        let watch = Tree::add_watch(&mut tree.child_watches, self.id, path);
        Ok((children, watch))
    }

    async fn close(&self) {
        self.shutdown(SessionState::Closed);
    }
}

impl Drop for MemorySession {
    fn drop(&mut self) {
        self.shutdown(SessionState::Closed);
    }
}
