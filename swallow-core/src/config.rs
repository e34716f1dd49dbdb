//! Configuration for coordinators, workers and the path layout they share.

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use tracing::debug;

use crate::{NodeSpec, Result, SwallowError};

/// Name of the root node every cluster lives under.
pub const KV_ROOT: &str = "swallow";

/// Coordination backend selected by [`KvConfig::backend`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
    /// Process-local coordination service
    #[default]
    Memory,
}

/// What the coordinator does when a fired watch cannot be re-issued.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum RearmPolicy {
    /// Treat the failure as fatal and tear the coordinator down
    #[default]
    Terminate,
    /// Log and keep running without the watch
    Continue,
}

/// Coordination-service settings consumed by the coordinator and the
/// registration flow.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct KvConfig {
    #[serde(rename = "type")]
    pub backend: BackendKind,

    pub endpoints: Vec<String>,

    #[serde(rename = "clusterID")]
    pub cluster_id: String,

    /// Identity advertised in this process's election candidacy
    #[serde(rename = "leaderID")]
    pub leader_id: String,

    /// Period of the leader's liveness check
    #[serde(rename = "keepaliveMs", with = "duration_ms")]
    pub keepalive_interval: Duration,

    /// Capacity of the coordinator's output stream
    #[serde(rename = "outputCapacity")]
    pub output_capacity: usize,

    #[serde(rename = "rearmPolicy")]
    pub rearm_policy: RearmPolicy,
}

impl Default for KvConfig {
    fn default() -> Self {
        Self {
            backend: BackendKind::Memory,
            endpoints: vec![
                "localhost:2181".to_string(),
                "localhost:2182".to_string(),
                "localhost:2183".to_string(),
            ],
            cluster_id: "defaultZk".to_string(),
            leader_id: "localhost:8888".to_string(),
            keepalive_interval: Duration::from_secs(60),
            output_capacity: 10,
            rearm_policy: RearmPolicy::Terminate,
        }
    }
}

impl KvConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_cluster_id(mut self, cluster_id: impl Into<String>) -> Self {
        self.cluster_id = cluster_id.into();
        self
    }

    pub fn with_leader_id(mut self, leader_id: impl Into<String>) -> Self {
        self.leader_id = leader_id.into();
        self
    }

    pub fn with_endpoints(mut self, endpoints: Vec<String>) -> Self {
        self.endpoints = endpoints;
        self
    }

    pub fn with_keepalive_interval(mut self, interval: Duration) -> Self {
        self.keepalive_interval = interval;
        self
    }

    pub fn with_output_capacity(mut self, capacity: usize) -> Self {
        self.output_capacity = capacity;
        self
    }

    pub fn with_rearm_policy(mut self, policy: RearmPolicy) -> Self {
        self.rearm_policy = policy;
        self
    }

    pub fn paths(&self) -> ClusterPaths {
        ClusterPaths::new(&self.cluster_id)
    }

    /// Reject settings no coordinator can run with.
    pub fn validate(&self) -> Result<()> {
        if self.endpoints.is_empty() {
            return Err(SwallowError::config("endpoint list is empty"));
        }
        if self.cluster_id.is_empty() || self.cluster_id.contains('/') {
            return Err(SwallowError::config(format!(
                "invalid cluster id {:?}",
                self.cluster_id
            )));
        }
        if self.leader_id.is_empty() {
            return Err(SwallowError::config("leader id is empty"));
        }
        if self.keepalive_interval.is_zero() {
            return Err(SwallowError::config("keepalive interval must be non-zero"));
        }
        if self.output_capacity == 0 {
            return Err(SwallowError::config("output capacity must be non-zero"));
        }
        Ok(())
    }
}

/// Process-level configuration: identity, coordination settings and the
/// optional node record used by the worker role.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AppConfig {
    pub id: String,
    #[serde(rename = "kvdb", default)]
    pub kv: KvConfig,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub node: Option<NodeSpec>,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            id: "ID".to_string(),
            kv: KvConfig::default(),
            node: None,
        }
    }
}

impl AppConfig {
    /// Load a JSON configuration file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let buf = std::fs::read(path)?;
        let config: AppConfig = serde_json::from_slice(&buf)?;
        config.kv.validate()?;
        debug!("Loaded configuration {} from {}", config.id, path.display());
        Ok(config)
    }
}

/// Coordination-service path layout for one cluster.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClusterPaths {
    root: String,
    project: String,
    election: String,
    nodes: String,
    tasks: String,
}

impl ClusterPaths {
    pub fn new(cluster_id: &str) -> Self {
        let root = format!("/{}", KV_ROOT);
        let project = format!("{}/{}", root, cluster_id);
        Self {
            election: format!("{}/election", project),
            nodes: format!("{}/nodes", project),
            tasks: format!("{}/tasks", project),
            root,
            project,
        }
    }

    pub fn root(&self) -> &str {
        &self.root
    }

    pub fn project(&self) -> &str {
        &self.project
    }

    pub fn election(&self) -> &str {
        &self.election
    }

    /// Parent of the worker registration records
    pub fn nodes(&self) -> &str {
        &self.nodes
    }

    /// Reserved for task records; created but otherwise unused.
    pub fn tasks(&self) -> &str {
        &self.tasks
    }

    pub fn node_path(&self, id: &str) -> String {
        format!("{}/{}", self.nodes, id)
    }

    /// Every path that must exist before coordination starts, parents first.
    pub fn required(&self) -> [&str; 5] {
        [
            self.root.as_str(),
            self.project.as_str(),
            self.tasks.as_str(),
            self.nodes.as_str(),
            self.election.as_str(),
        ]
    }
}

mod duration_ms {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(value.as_millis() as u64)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        Ok(Duration::from_millis(u64::deserialize(deserializer)?))
    }
}
