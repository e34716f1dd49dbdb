//! # Error Types
//!
//! Error handling for the Swallow coordinator and its collaborators.

use thiserror::Error;

/// Errors raised by the coordination session, the election adapter, the
/// watchers and the coordinator itself.
///
/// # Error Categories
///
/// - **Connection errors**: any I/O failure against the coordination
///   service. Always fatal to an enclosing coordinator.
/// - **Path errors**: [`SwallowError::NodeExists`] and
///   [`SwallowError::NoNode`], returned by individual session calls.
/// - **Decode errors**: a malformed stored record. Callers that scan
///   membership treat these as non-fatal and drop the offending entry.
/// - **Configuration errors**: rejected synchronously before any background
///   activity starts.
/// - **Unexpected-state errors**: election states outside the recognized
///   set, or a demotion while leading.
///
/// # Examples
///
/// ```rust
/// use swallow_core::SwallowError;
///
/// let error = SwallowError::connection("connection refused");
/// assert!(error.is_connection());
/// assert!(error.is_fatal());
/// ```
#[derive(Error, Debug)]
pub enum SwallowError {
    /// I/O failure against the coordination service
    #[error("Connection error: {message}")]
    Connection { message: String },

    /// The session has been closed or has expired
    #[error("Session closed: {session}")]
    SessionClosed { session: String },

    /// A create call targeted a path that already exists
    #[error("Node already exists: {path}")]
    NodeExists { path: String },

    /// The referenced path does not exist
    #[error("Node does not exist: {path}")]
    NoNode { path: String },

    /// A delete targeted a node that still has children
    #[error("Node has children: {path}")]
    NotEmpty { path: String },

    /// A stored record could not be decoded
    #[error("Decode error: {0}")]
    Decode(#[from] serde_json::Error),

    /// File system failure while loading configuration
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Invalid or missing configuration
    #[error("Configuration error: {reason}")]
    Config { reason: String },

    /// A transition the coordinator cannot reconcile
    #[error("Unexpected state: {reason}")]
    UnexpectedState { reason: String },

    /// The election path has no live candidates
    #[error("No leader visible under {path}")]
    NoLeader { path: String },

    /// The election adapter failed
    #[error("Election error: {reason}")]
    Election { reason: String },

    /// Unexpected internal error
    #[error("Internal error: {message}")]
    Internal { message: String },
}

/// Result alias used across the Swallow crates.
pub type Result<T> = std::result::Result<T, SwallowError>;

impl SwallowError {
    /// Creates a new connection error with the given message.
    pub fn connection(message: impl Into<String>) -> Self {
        Self::Connection {
            message: message.into(),
        }
    }

    /// Creates a new configuration error.
    ///
    /// # Examples
    ///
    /// ```rust
    /// use swallow_core::SwallowError;
    ///
    /// let error = SwallowError::config("node config empty");
    /// assert_eq!(error.to_string(), "Configuration error: node config empty");
    /// ```
    pub fn config(reason: impl Into<String>) -> Self {
        Self::Config {
            reason: reason.into(),
        }
    }

    pub fn unexpected_state(reason: impl Into<String>) -> Self {
        Self::UnexpectedState {
            reason: reason.into(),
        }
    }

    pub fn election(reason: impl Into<String>) -> Self {
        Self::Election {
            reason: reason.into(),
        }
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }

    /// True for failures of the coordination-service connection itself.
    pub fn is_connection(&self) -> bool {
        matches!(self, Self::Connection { .. } | Self::SessionClosed { .. })
    }

    /// Determines whether this error must tear down a running coordinator.
    ///
    /// Decode errors and path errors are local to a single record and are
    /// handled by the caller; everything else ends the coordinator.
    ///
    /// ```rust
    /// use swallow_core::SwallowError;
    ///
    /// let missing = SwallowError::NoNode { path: "/swallow/x".to_string() };
    /// assert!(!missing.is_fatal());
    /// assert!(SwallowError::unexpected_state("demoted while leading").is_fatal());
    /// ```
    pub fn is_fatal(&self) -> bool {
        !matches!(
            self,
            Self::NodeExists { .. } | Self::NoNode { .. } | Self::NotEmpty { .. } | Self::Decode(_)
        )
    }
}

impl From<anyhow::Error> for SwallowError {
    fn from(err: anyhow::Error) -> Self {
        SwallowError::Internal {
            message: err.to_string(),
        }
    }
}
