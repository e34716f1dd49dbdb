//! # Swallow Session
//!
//! The connection to a watch-based coordination service, as consumed by the
//! coordinator, the election adapter and the watchers.
//!
//! A [`CoordinationSession`] offers idempotent creation, plain and watched
//! reads, plain and watched child listings, and a [`Liveness`] stream that
//! reports when the connection becomes unusable. Every [`Watch`] fires at
//! most once and has to be re-issued to keep observing a path.
//!
//! [`MemoryCoordinator`] is a complete in-process coordination service with
//! ephemeral and sequential nodes, one-shot watches, session expiry and
//! fault injection.
//!
//! ```rust
//! use swallow_session::{CoordinationSession, CreateMode, MemoryCoordinator};
//!
//! # tokio_test::block_on(async {
//! let service = MemoryCoordinator::new("doc");
//! let session = service.connect();
//! session.create_if_absent("/jobs", b"").await.unwrap();
//! session.create("/jobs/a", b"1", CreateMode::Ephemeral).await.unwrap();
//! assert_eq!(session.children("/jobs").await.unwrap(), vec!["a".to_string()]);
//! # });
//! ```

pub mod memory;
pub mod session;

pub use memory::{MemoryCoordinator, MemorySession};
pub use session::{
    CoordinationSession, CreateMode, Liveness, SessionState, Watch, WatchEvent, WatchEventKind,
};
