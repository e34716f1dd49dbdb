//! Election adapter contract.

use async_trait::async_trait;
use std::fmt;
use swallow_core::Result;

/// Role reported by an election.
///
/// Consumers outside this crate must handle unrecognized roles explicitly.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[non_exhaustive]
pub enum CandidateRole {
    /// Registered but not yet ranked
    Candidate,
    Follower,
    Leader,
}

impl fmt::Display for CandidateRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CandidateRole::Candidate => write!(f, "candidate"),
            CandidateRole::Follower => write!(f, "follower"),
            CandidateRole::Leader => write!(f, "leader"),
        }
    }
}

/// One status update from an election.
///
/// A status carrying an error is terminal: the stream closes after it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ElectionStatus {
    pub candidate_id: String,
    pub role: CandidateRole,
    pub error: Option<String>,
}

impl ElectionStatus {
    pub fn leader(candidate_id: impl Into<String>) -> Self {
        Self::with_role(candidate_id, CandidateRole::Leader)
    }

    pub fn follower(candidate_id: impl Into<String>) -> Self {
        Self::with_role(candidate_id, CandidateRole::Follower)
    }

    pub fn with_role(candidate_id: impl Into<String>, role: CandidateRole) -> Self {
        Self {
            candidate_id: candidate_id.into(),
            role,
            error: None,
        }
    }

    pub fn failed(candidate_id: impl Into<String>, error: impl Into<String>) -> Self {
        Self {
            candidate_id: candidate_id.into(),
            role: CandidateRole::Candidate,
            error: Some(error.into()),
        }
    }
}

impl fmt::Display for ElectionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.error {
            Some(err) => write!(f, "{} {} (error: {})", self.candidate_id, self.role, err),
            None => write!(f, "{} {}", self.candidate_id, self.role),
        }
    }
}

/// A running candidacy.
#[async_trait]
pub trait Election: Send + 'static {
    /// Next status, or `None` once the election has stopped.
    ///
    /// Must be cancel-safe: the coordinator polls it inside `select!`.
    async fn status(&mut self) -> Option<ElectionStatus>;

    /// Withdraw the candidacy. Best effort; called once during teardown.
    async fn resign(&mut self) -> Result<()>;
}

/// Sequence number of a sequential candidate node such as `c_0000000042`.
pub fn sequence_of(name: &str) -> Option<u64> {
    let digits = name.len() - name.trim_end_matches(|c: char| c.is_ascii_digit()).len();
    if digits == 0 {
        return None;
    }
    name[name.len() - digits..].parse().ok()
}

/// The lowest-ranked candidate among `children`.
///
/// Candidates rank by sequence number; names without one rank after all
/// sequenced names, in lexical order.
pub fn lowest_candidate(children: &[String]) -> Option<&String> {
    children
        .iter()
        .min_by(|a, b| match (sequence_of(a), sequence_of(b)) {
            (Some(x), Some(y)) => x.cmp(&y).then_with(|| a.cmp(b)),
            (Some(_), None) => std::cmp::Ordering::Less,
            (None, Some(_)) => std::cmp::Ordering::Greater,
            (None, None) => a.cmp(b),
        })
}
