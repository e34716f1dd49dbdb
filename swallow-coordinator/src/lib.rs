//! # Swallow Coordinator
//!
//! Elects a single leader among competing manager processes and tracks the
//! live set of worker nodes, delivering both as one ordered event stream.
//!
//! ## Key Components
//!
//! - **Coordinator**: single-task event loop multiplexing session liveness,
//!   election status, the membership and leadership watches and the
//!   keepalive timer into role transitions and output events
//! - **MembershipWatcher**: scans the registration path and diffs it against
//!   the last committed snapshot
//! - **LeadershipWatcher**: resolves the advertised identity of the elected
//!   leader
//! - **Registration**: a worker's ephemeral presence record
//! - **Database**: the facade offering `start_elect` and `register`
//!
//! ## Example Usage
//!
//! ```rust,no_run
//! use swallow_coordinator::{create_database, Database};
//! use swallow_core::{CoordinatorEvent, KvConfig};
//!
//! #[tokio::main]
//! async fn main() -> swallow_core::Result<()> {
//!     let db = create_database(&KvConfig::default()).await?;
//!     let mut events = db.start_elect().await?;
//!
//!     while let Some(event) = events.recv().await {
//!         match event {
//!             CoordinatorEvent::Membership(delta) => println!("members: {:?}", delta),
//!             CoordinatorEvent::Follower(follower) => println!("leader: {}", follower.leader_id),
//!             other => println!("unrecognized event: {:?}", other),
//!         }
//!     }
//!     Ok(())
//! }
//! ```

pub mod coordinator;
pub mod database;
pub mod diff;
pub mod leadership;
pub mod membership;
pub mod registration;
pub mod role;

pub use coordinator::{ArmedWatches, Coordinator};
pub use database::{create_database, CoordinationDatabase, Database, EventStream};
pub use diff::diff_snapshots;
pub use leadership::{LeaderSighting, LeadershipWatcher};
pub use membership::{MembershipSnapshot, MembershipWatcher};
pub use registration::{register, Registration};
pub use role::RoleHandle;
