//! # Swallow Election
//!
//! The election adapter consumed by the coordinator.
//!
//! An [`Election`] yields a stream of [`ElectionStatus`] values, each either a
//! role transition or a terminal error, and can be resigned during teardown.
//!
//! - [`SessionElection`] runs the classic sequential-ephemeral recipe over a
//!   [`swallow_session::CoordinationSession`]: the candidate with the lowest
//!   sequence number leads, everyone else watches its predecessor.
//! - [`ScriptedElection`] replays statuses supplied by the caller.
//!
//! ```rust
//! use swallow_election::{CandidateRole, Election, ElectionStatus, ScriptedElection};
//!
//! # tokio_test::block_on(async {
//! let mut election = ScriptedElection::new(vec![ElectionStatus::leader("c_0000000000")]);
//! let status = election.status().await.unwrap();
//! assert_eq!(status.role, CandidateRole::Leader);
//! assert!(election.status().await.is_none());
//! # });
//! ```

pub mod election;
pub mod scripted;
pub mod session_election;

pub use election::{lowest_candidate, sequence_of, CandidateRole, Election, ElectionStatus};
pub use scripted::{ElectionScript, ScriptedElection};
pub use session_election::SessionElection;
