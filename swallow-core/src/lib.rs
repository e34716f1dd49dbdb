//! # Swallow Core
//!
//! Shared building blocks for the Swallow cluster coordinator.
//!
//! - **Node records**: [`NodeSpec`], the JSON document a worker publishes
//!   under the registration path.
//! - **Coordinator output**: [`CoordinatorEvent`], either a
//!   [`MembershipDelta`] (leader side) or a [`FollowerEvent`].
//! - **Roles**: [`Role`], the coordinator's current position in the
//!   election.
//! - **Errors**: [`SwallowError`] and the crate-wide [`Result`] alias.
//! - **Configuration**: [`KvConfig`], [`AppConfig`] and the derived
//!   [`ClusterPaths`] layout.

pub mod config;
pub mod error;
pub mod types;

pub use config::*;
pub use error::*;
pub use types::*;
