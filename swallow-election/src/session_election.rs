//! Sequential-ephemeral leader election over a coordination session.

use async_trait::async_trait;
use std::sync::Arc;
use swallow_core::{Result, SwallowError};
use swallow_session::{CoordinationSession, CreateMode};
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::{sequence_of, CandidateRole, Election, ElectionStatus};

const CANDIDATE_PREFIX: &str = "c_";
const STATUS_CAPACITY: usize = 8;

/// Election that registers an ephemeral sequential candidate node under the
/// election path.
///
/// The candidate with the lowest sequence number leads. Every other
/// candidate watches its immediate predecessor and re-ranks when that node
/// goes away. The candidate node's value is the advertised leader identity.
pub struct SessionElection {
    status_rx: mpsc::Receiver<ElectionStatus>,
    shutdown_tx: watch::Sender<bool>,
    task: Option<JoinHandle<()>>,
}

impl SessionElection {
    /// Start campaigning in the background.
    pub fn start<S: CoordinationSession>(
        session: Arc<S>,
        election_path: impl Into<String>,
        leader_id: impl Into<String>,
    ) -> Self {
        let (status_tx, status_rx) = mpsc::channel(STATUS_CAPACITY);
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let candidacy = Candidacy {
            session,
            election_path: election_path.into(),
            leader_id: leader_id.into(),
            status_tx,
            shutdown_rx,
        };

        let task = tokio::spawn(candidacy.run());

        Self {
            status_rx,
            shutdown_tx,
            task: Some(task),
        }
    }
}

#[async_trait]
impl Election for SessionElection {
    async fn status(&mut self) -> Option<ElectionStatus> {
        self.status_rx.recv().await
    }

    async fn resign(&mut self) -> Result<()> {
        self.shutdown_tx.send_replace(true);
        self.status_rx.close();
        match self.task.take() {
            Some(task) => task
                .await
                .map_err(|e| SwallowError::election(format!("candidacy task failed: {}", e))),
            None => Ok(()),
        }
    }
}

impl Drop for SessionElection {
    fn drop(&mut self) {
        self.shutdown_tx.send_replace(true);
    }
}

enum Outcome {
    Resigned,
    Failed(SwallowError),
}

struct Candidacy<S> {
    session: Arc<S>,
    election_path: String,
    leader_id: String,
    status_tx: mpsc::Sender<ElectionStatus>,
    shutdown_rx: watch::Receiver<bool>,
}

impl<S: CoordinationSession> Candidacy<S> {
    async fn run(mut self) {
        let prefix = format!("{}/{}", self.election_path, CANDIDATE_PREFIX);
        let node = match self
            .session
            .create(&prefix, self.leader_id.as_bytes(), CreateMode::EphemeralSequential)
            .await
        {
            Ok(node) => node,
            Err(e) => {
                warn!("election: register candidate under {}: {}", self.election_path, e);
                let _ = self
                    .status_tx
                    .send(ElectionStatus::failed(self.leader_id.clone(), e.to_string()))
                    .await;
                return;
            }
        };
        let name = node.rsplit('/').next().unwrap_or(&node).to_string();
        info!("election: registered candidate {} for {}", node, self.leader_id);

        match self.campaign(&name).await {
            Outcome::Resigned => debug!("election: candidate {} resigned", name),
            Outcome::Failed(e) => {
                warn!("election: candidate {} failed: {}", name, e);
                let _ = self
                    .status_tx
                    .send(ElectionStatus::failed(name.clone(), e.to_string()))
                    .await;
            }
        }

        if let Err(e) = self.session.delete(&node).await {
            debug!("election: remove candidate {}: {}", node, e);
        }
    }

    async fn campaign(&mut self, name: &str) -> Outcome {
        let mut reported: Option<CandidateRole> = None;

        loop {
            if *self.shutdown_rx.borrow() {
                return Outcome::Resigned;
            }

            let candidates = match self.session.children(&self.election_path).await {
                Ok(children) => children,
                Err(e) => return Outcome::Failed(e),
            };
            if !candidates.iter().any(|c| c == name) {
                return Outcome::Failed(SwallowError::election(format!(
                    "candidate {} vanished from {}",
                    name, self.election_path
                )));
            }

            let own_rank = rank(name);
            let predecessor = candidates
                .iter()
                .filter(|c| rank(c) < own_rank)
                .max_by(|a, b| rank(a).cmp(&rank(b)))
                .map(|p| format!("{}/{}", self.election_path, p));

            let Some(predecessor) = predecessor else {
                if self.report(ElectionStatus::leader(name)).await.is_err() {
                    return Outcome::Resigned;
                }
                // leadership lasts until resignation or the session ends
                tokio::select! {
                    _ = self.shutdown_rx.changed() => {}
                    _ = self.status_tx.closed() => {}
                }
                return Outcome::Resigned;
            };

            if reported != Some(CandidateRole::Follower) {
                if self.report(ElectionStatus::follower(name)).await.is_err() {
                    return Outcome::Resigned;
                }
                reported = Some(CandidateRole::Follower);
            }

            match self.session.read_watched(&predecessor).await {
                Ok((_, watch)) => {
                    debug!("election: {} watching {}", name, predecessor);
                    tokio::select! {
                        _ = watch => {}
                        _ = self.shutdown_rx.changed() => return Outcome::Resigned,
                        _ = self.status_tx.closed() => return Outcome::Resigned,
                    }
                }
                Err(SwallowError::NoNode { .. }) => {}
                Err(e) => return Outcome::Failed(e),
            }
        }
    }

    async fn report(&self, status: ElectionStatus) -> std::result::Result<(), ()> {
        debug!("election: reporting {}", status);
        self.status_tx.send(status).await.map_err(|_| ())
    }
}

fn rank(name: &str) -> (u64, &str) {
    (sequence_of(name).unwrap_or(u64::MAX), name)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use swallow_session::MemoryCoordinator;
    use tokio::time::timeout;

    const ELECTION: &str = "/election";

    async fn next(election: &mut SessionElection) -> Option<ElectionStatus> {
        timeout(Duration::from_secs(2), election.status())
            .await
            .expect("election status timed out")
    }

    #[tokio::test]
    async fn test_single_candidate_leads() {
        let service = MemoryCoordinator::new("election-test");
        let session = service.connect();
        session.create_if_absent(ELECTION, b"").await.unwrap();

        let mut election = SessionElection::start(Arc::clone(&session), ELECTION, "mgr-a");
        let status = next(&mut election).await.unwrap();
        assert_eq!(status.role, CandidateRole::Leader);
        assert!(status.error.is_none());

        let children = session.children(ELECTION).await.unwrap();
        assert_eq!(children.len(), 1);
        let advertised = session
            .read(&format!("{}/{}", ELECTION, children[0]))
            .await
            .unwrap();
        assert_eq!(&advertised[..], b"mgr-a");
    }

    #[tokio::test]
    async fn test_second_candidate_follows_then_takes_over() {
        let service = MemoryCoordinator::new("election-test");
        let first = service.connect();
        let second = service.connect();
        first.create_if_absent(ELECTION, b"").await.unwrap();

        let mut leader = SessionElection::start(Arc::clone(&first), ELECTION, "mgr-a");
        assert_eq!(next(&mut leader).await.unwrap().role, CandidateRole::Leader);

        let mut follower = SessionElection::start(Arc::clone(&second), ELECTION, "mgr-b");
        assert_eq!(
            next(&mut follower).await.unwrap().role,
            CandidateRole::Follower
        );

        // the leader's session ends, its candidate node goes with it
        first.close().await;
        assert_eq!(next(&mut follower).await.unwrap().role, CandidateRole::Leader);
    }

    #[tokio::test]
    async fn test_resign_removes_candidate() {
        let service = MemoryCoordinator::new("election-test");
        let session = service.connect();
        session.create_if_absent(ELECTION, b"").await.unwrap();

        let mut election = SessionElection::start(Arc::clone(&session), ELECTION, "mgr-a");
        next(&mut election).await.unwrap();

        election.resign().await.unwrap();
        assert!(session.children(ELECTION).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_missing_election_path_reports_error() {
        let service = MemoryCoordinator::new("election-test");
        let session = service.connect();

        let mut election = SessionElection::start(session, "/nowhere", "mgr-a");
        let status = next(&mut election).await.unwrap();
        assert!(status.error.is_some());
        assert!(next(&mut election).await.is_none());
    }

    #[tokio::test]
    async fn test_session_loss_reports_error_then_closes() {
        let service = MemoryCoordinator::new("election-test");
        let session = service.connect();
        session.create_if_absent(ELECTION, b"").await.unwrap();

        let mut election = SessionElection::start(Arc::clone(&session), ELECTION, "mgr-a");
        let other = service.connect();
        let mut other_election = SessionElection::start(Arc::clone(&other), ELECTION, "mgr-b");
        assert_eq!(next(&mut election).await.unwrap().role, CandidateRole::Leader);
        assert_eq!(
            next(&mut other_election).await.unwrap().role,
            CandidateRole::Follower
        );

        other.expire();
        let status = next(&mut other_election).await.unwrap();
        assert!(status.error.is_some());
        assert!(next(&mut other_election).await.is_none());
    }
}
