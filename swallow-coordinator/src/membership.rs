//! Membership Watcher: scans the registration path on behalf of the leader.

use bytes::Bytes;
use std::collections::HashMap;
use swallow_core::{MembershipDelta, Result};
use swallow_session::{CoordinationSession, Watch};
use tracing::{debug, warn};

use crate::diff::diff_snapshots;

/// Last committed view of the registration path, keyed by child name.
#[derive(Debug, Clone, Default)]
pub struct MembershipSnapshot {
    entries: HashMap<String, Bytes>,
}

impl MembershipSnapshot {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn contains(&self, id: &str) -> bool {
        self.entries.contains_key(id)
    }

    pub fn get(&self, id: &str) -> Option<&Bytes> {
        self.entries.get(id)
    }

    pub fn entries(&self) -> &HashMap<String, Bytes> {
        &self.entries
    }

    fn install(&mut self, entries: HashMap<String, Bytes>) {
        self.entries = entries;
    }
}

/// Lists the children of the registration path, reads each record and
/// diffs the result against the committed snapshot.
#[derive(Debug, Clone)]
pub struct MembershipWatcher {
    nodes_path: String,
}

impl MembershipWatcher {
    pub fn new(nodes_path: impl Into<String>) -> Self {
        Self {
            nodes_path: nodes_path.into(),
        }
    }

    pub fn nodes_path(&self) -> &str {
        &self.nodes_path
    }

    /// Run one scan and leave a child watch on the registration path.
    ///
    /// Only a failure to list the path is an error; a child whose record
    /// cannot be read is left out of this scan. On success `snapshot` is
    /// replaced by the new view, on error it is untouched.
    pub async fn scan<S>(
        &self,
        session: &S,
        snapshot: &mut MembershipSnapshot,
    ) -> Result<(Watch, MembershipDelta)>
    where
        S: CoordinationSession + ?Sized,
    {
        let (children, watch) = session.children_watched(&self.nodes_path).await.map_err(|e| {
            warn!("membership: list {}: {}", self.nodes_path, e);
            e
        })?;

        let mut next = HashMap::with_capacity(children.len());
        for child in children {
            let path = format!("{}/{}", self.nodes_path, child);
            match session.read(&path).await {
                Ok(data) => {
                    next.insert(child, data);
                }
                Err(e) => warn!("membership: read {}: {}", path, e),
            }
        }

        let delta = diff_snapshots(snapshot.entries(), &next);
        snapshot.install(next);
        debug!(
            "membership: {} nodes, +{} -{} ~{}",
            snapshot.len(),
            delta.added.len(),
            delta.removed.len(),
            delta.changed.len()
        );

        Ok((watch, delta))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use swallow_core::NodeSpec;
    use swallow_session::{CreateMode, MemoryCoordinator, WatchEventKind};

    const NODES: &str = "/nodes";

    async fn add_worker<S: CoordinationSession>(session: &S, node: &NodeSpec) {
        session
            .create(
                &format!("{}/{}", NODES, node.id),
                &node.to_bytes().unwrap(),
                CreateMode::Ephemeral,
            )
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_scan_reports_arrivals_and_departures() {
        let service = MemoryCoordinator::new("membership-test");
        let leader = service.connect();
        leader.create_if_absent(NODES, b"").await.unwrap();

        let worker = service.connect();
        add_worker(worker.as_ref(), &NodeSpec::new("w1", "ingest")).await;

        let watcher = MembershipWatcher::new(NODES);
        let mut snapshot = MembershipSnapshot::new();

        let (watch, delta) = watcher.scan(leader.as_ref(), &mut snapshot).await.unwrap();
        assert_eq!(delta.added, vec![NodeSpec::new("w1", "ingest")]);
        assert!(snapshot.contains("w1"));

        worker.close().await;
        assert_eq!(watch.await.kind, WatchEventKind::NodeChildrenChanged);

        let (_watch, delta) = watcher.scan(leader.as_ref(), &mut snapshot).await.unwrap();
        assert_eq!(delta.removed, vec![NodeSpec::new("w1", "ingest")]);
        assert!(snapshot.is_empty());
    }

    #[tokio::test]
    async fn test_unreadable_child_is_skipped() {
        let service = MemoryCoordinator::new("membership-test");
        let leader = service.connect();
        leader.create_if_absent(NODES, b"").await.unwrap();
        add_worker(leader.as_ref(), &NodeSpec::new("w1", "ingest")).await;
        add_worker(leader.as_ref(), &NodeSpec::new("w2", "ingest")).await;
        leader.fail_reads(format!("{}/w2", NODES));

        let watcher = MembershipWatcher::new(NODES);
        let mut snapshot = MembershipSnapshot::new();
        let (_watch, delta) = watcher.scan(leader.as_ref(), &mut snapshot).await.unwrap();

        assert_eq!(delta.added, vec![NodeSpec::new("w1", "ingest")]);
        assert!(!snapshot.contains("w2"));
    }

    #[tokio::test]
    async fn test_listing_failure_keeps_snapshot() {
        let service = MemoryCoordinator::new("membership-test");
        let leader = service.connect();
        leader.create_if_absent(NODES, b"").await.unwrap();
        add_worker(leader.as_ref(), &NodeSpec::new("w1", "ingest")).await;

        let watcher = MembershipWatcher::new(NODES);
        let mut snapshot = MembershipSnapshot::new();
        watcher.scan(leader.as_ref(), &mut snapshot).await.unwrap();

        leader.fail_children(NODES);
        assert!(watcher.scan(leader.as_ref(), &mut snapshot).await.is_err());
        assert_eq!(snapshot.len(), 1);
    }
}
