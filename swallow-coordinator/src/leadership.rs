//! Leadership Watcher: tells a follower who currently leads.

use swallow_core::{FollowerEvent, Result, SwallowError};
use swallow_election::lowest_candidate;
use swallow_session::{CoordinationSession, Watch};
use tracing::{debug, warn};

/// The lowest-ranked candidate and the identity it advertises.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LeaderSighting {
    /// Candidate node name under the election path
    pub candidate: String,
    pub event: FollowerEvent,
}

#[derive(Debug, Clone)]
pub struct LeadershipWatcher {
    election_path: String,
}

impl LeadershipWatcher {
    pub fn new(election_path: impl Into<String>) -> Self {
        Self {
            election_path: election_path.into(),
        }
    }

    /// Read the advertised identity of the lowest-ranked candidate and leave
    /// a child watch on the election path.
    ///
    /// An empty election path is [`SwallowError::NoLeader`].
    pub async fn observe<S>(&self, session: &S) -> Result<(Watch, LeaderSighting)>
    where
        S: CoordinationSession + ?Sized,
    {
        let (candidates, watch) = session.children_watched(&self.election_path).await?;
        let leader = lowest_candidate(&candidates).ok_or_else(|| {
            warn!("leadership: no candidates under {}", self.election_path);
            SwallowError::NoLeader {
                path: self.election_path.clone(),
            }
        })?;

        let path = format!("{}/{}", self.election_path, leader);
        let data = session.read(&path).await?;
        let leader_id = String::from_utf8_lossy(&data).into_owned();
        debug!("leadership: {} advertises {}", path, leader_id);

        Ok((
            watch,
            LeaderSighting {
                candidate: leader.clone(),
                event: FollowerEvent { leader_id },
            },
        ))
    }
}
