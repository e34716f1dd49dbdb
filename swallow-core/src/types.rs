//! # Core Types
//!
//! Node records, coordinator output events and roles.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

use crate::{Result, SwallowError};

/// Registration record published by a worker.
///
/// Stored as JSON under `{nodes}/{id}`; identity is `id`. Quota keys are
/// kept ordered so that re-serializing an unchanged record yields identical
/// bytes.
///
/// # Examples
///
/// ```rust
/// use swallow_core::NodeSpec;
///
/// let node = NodeSpec::new("worker-1", "transcode")
///     .with_quota("cpu", 8)
///     .with_tag("gpu");
/// let bytes = node.to_bytes().unwrap();
/// assert_eq!(NodeSpec::from_bytes(&bytes).unwrap(), node);
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeSpec {
    pub id: String,
    #[serde(default)]
    pub quota: BTreeMap<String, u16>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tags: Vec<String>,
    #[serde(default)]
    pub service: String,
    #[serde(default)]
    pub version: u8,
}

impl NodeSpec {
    pub fn new(id: impl Into<String>, service: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            quota: BTreeMap::new(),
            tags: Vec::new(),
            service: service.into(),
            version: 0,
        }
    }

    pub fn with_quota(mut self, resource: impl Into<String>, capacity: u16) -> Self {
        self.quota.insert(resource.into(), capacity);
        self
    }

    pub fn with_tag(mut self, tag: impl Into<String>) -> Self {
        self.tags.push(tag.into());
        self
    }

    pub fn with_version(mut self, version: u8) -> Self {
        self.version = version;
        self
    }

    /// Serialize the record into the bytes stored in the coordination service.
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        Ok(serde_json::to_vec(self)?)
    }

    /// Decode a stored record.
    pub fn from_bytes(data: &[u8]) -> Result<Self> {
        serde_json::from_slice(data).map_err(SwallowError::from)
    }
}

impl fmt::Display for NodeSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}({} v{})", self.id, self.service, self.version)
    }
}

/// Membership changes observed by the leader between two consecutive scans.
///
/// Order within each list carries no meaning.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MembershipDelta {
    pub added: Vec<NodeSpec>,
    pub removed: Vec<NodeSpec>,
    pub changed: Vec<NodeSpec>,
}

impl MembershipDelta {
    pub fn is_empty(&self) -> bool {
        self.added.is_empty() && self.removed.is_empty() && self.changed.is_empty()
    }

    /// Total number of entries across the three lists.
    pub fn len(&self) -> usize {
        self.added.len() + self.removed.len() + self.changed.len()
    }
}

/// Identity advertised by the currently elected leader.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FollowerEvent {
    pub leader_id: String,
}

/// Output of a running coordinator.
///
/// Consumers match the named variants and must carry an explicit branch
/// for anything they do not recognize.
#[derive(Debug, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum CoordinatorEvent {
    /// Emitted only while this process leads.
    Membership(MembershipDelta),
    /// Emitted only while this process follows.
    Follower(FollowerEvent),
}

/// Coordinator role.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Role {
    Idle,
    Leader,
    Follower,
    Terminated,
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Role::Idle => write!(f, "IDLE"),
            Role::Leader => write!(f, "LEADER"),
            Role::Follower => write!(f, "FOLLOWER"),
            Role::Terminated => write!(f, "TERMINATED"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_node_spec_wire_format() {
        let node = NodeSpec::new("n1", "render").with_quota("gpu", 2);
        let json: serde_json::Value = serde_json::from_slice(&node.to_bytes().unwrap()).unwrap();

        assert_eq!(json["id"], "n1");
        assert_eq!(json["quota"]["gpu"], 2);
        assert_eq!(json["service"], "render");
        assert_eq!(json["version"], 0);
        // empty tag lists are omitted
        assert!(json.get("tags").is_none());
    }

    #[test]
    fn test_node_spec_tolerates_missing_optional_fields() {
        let node = NodeSpec::from_bytes(br#"{"id":"n2"}"#).unwrap();
        assert_eq!(node.id, "n2");
        assert!(node.quota.is_empty());
        assert_eq!(node.version, 0);
    }

    #[test]
    fn test_node_spec_rejects_malformed() {
        assert!(NodeSpec::from_bytes(b"not json").is_err());
        assert!(NodeSpec::from_bytes(br#"{"quota":{}}"#).is_err());
    }

    #[test]
    fn test_delta_len() {
        let delta = MembershipDelta {
            added: vec![NodeSpec::new("a", "s")],
            removed: vec![],
            changed: vec![NodeSpec::new("b", "s"), NodeSpec::new("c", "s")],
        };
        assert_eq!(delta.len(), 3);
        assert!(!delta.is_empty());
        assert!(MembershipDelta::default().is_empty());
    }
}
