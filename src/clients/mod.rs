//! Collaborator interfaces.
//!
//! The optimizer talks to three outside systems: the API service (topology
//! and node config), the time-series store (link uptime) and a relational
//! store (override history). Each is reached through a trait so the
//! orchestrator can be driven by the HTTP/SQLite adapters in this module or
//! by in-memory fakes.

pub mod api_service;
pub mod prometheus;
pub mod store;

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures::future::join_all;
use serde::{Deserialize, Serialize};

use crate::topology::{Link, OverridesMap, Topology};

pub use api_service::ApiServiceClient;
pub use prometheus::PrometheusClient;
pub use store::SqliteOverridesStore;

/// Errors raised by the API service and time-series adapters
#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("{endpoint} returned status {status}")]
    Status { endpoint: String, status: u16 },

    #[error("Failed to decode response: {0}")]
    Decode(#[from] serde_json::Error),

    #[error("Network {0} is not configured")]
    UnknownNetwork(String),

    #[error("Query failed with status {status}: {error}")]
    Query { status: String, error: String },

    #[error("No response within {0:?}")]
    Timeout(Duration),
}

/// Errors raised by the override history store
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("Database connection lock is poisoned")]
    Poisoned,
}

/// Source of network topologies
#[async_trait]
pub trait TopologySource: Send + Sync {
    /// Fetch the topology of one network
    async fn get_topology(&self, network_name: &str) -> Result<Topology, ClientError>;

    /// Names of all known networks
    fn networks(&self) -> Vec<String>;

    /// Fetch the topologies of all known networks concurrently, each under
    /// its own `timeout`. Failures are reported per network.
    async fn get_all_topologies(&self, timeout: Duration) -> BTreeMap<String, Result<Topology, ClientError>> {
        let networks = self.networks();
        let results = join_all(networks.iter().map(|network_name| async move {
            tokio::time::timeout(timeout, self.get_topology(network_name))
                .await
                .unwrap_or(Err(ClientError::Timeout(timeout)))
        }))
        .await;
        networks.into_iter().zip(results).collect()
    }
}

/// Read and write access to node overrides configs
#[async_trait]
pub trait NodeConfigClient: Send + Sync {
    /// Current overrides of the given nodes
    async fn get_node_overrides(
        &self,
        network_name: &str,
        nodes: &BTreeSet<String>,
    ) -> Result<OverridesMap, ClientError>;

    /// Merge partial documents into the nodes' overrides
    async fn modify_node_overrides(
        &self,
        network_name: &str,
        overrides: &OverridesMap,
    ) -> Result<serde_json::Value, ClientError>;

    /// Replace the nodes' overrides with full documents
    async fn set_node_overrides(
        &self,
        network_name: &str,
        overrides: &OverridesMap,
    ) -> Result<serde_json::Value, ClientError>;
}

/// Link management on the controller
#[async_trait]
pub trait LinkClient: Send + Sync {
    async fn add_link(&self, network_name: &str, link: &Link) -> Result<serde_json::Value, ClientError>;

    async fn del_link(&self, network_name: &str, link: &Link) -> Result<serde_json::Value, ClientError>;
}

/// One sample of an instant query
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Sample {
    pub metric: HashMap<String, String>,
    /// `[unix_time, "value"]`
    pub value: (f64, String),
}

impl Sample {
    /// Sample value as a number
    pub fn as_f64(&self) -> Option<f64> {
        self.value.1.parse().ok()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct QueryData {
    #[serde(rename = "resultType", default)]
    pub result_type: String,
    #[serde(default)]
    pub result: Vec<Sample>,
}

/// Response of an instant query
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueryResponse {
    pub status: String,
    #[serde(default)]
    pub data: QueryData,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl QueryResponse {
    pub fn is_success(&self) -> bool {
        self.status == "success"
    }
}

/// Time-series queries
#[async_trait]
pub trait Telemetry: Send + Sync {
    /// Evaluate an instant query at `time`, or now if `None`
    async fn query_latest(
        &self,
        query: &str,
        time: Option<DateTime<Utc>>,
    ) -> Result<QueryResponse, ClientError>;
}

/// One row of override history: the values a node had before remediation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OverridesRow {
    pub network_name: String,
    pub node_name: String,
    pub link_flap_backoff_ms: Option<String>,
    pub link_impairment_detection: Option<i64>,
}

/// Latest recorded pre-remediation values of a node
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PreviousOverrides {
    pub link_flap_backoff_ms: Option<String>,
    pub link_impairment_detection: Option<i64>,
}

/// Previous overrides keyed by network, then node
pub type PreviousOverridesMap = BTreeMap<String, BTreeMap<String, PreviousOverrides>>;

/// Rows to delete: every (network, node) pair from the two sets
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NodeEntries {
    pub networks: BTreeSet<String>,
    pub nodes: BTreeSet<String>,
}

impl NodeEntries {
    pub fn is_empty(&self) -> bool {
        self.networks.is_empty() || self.nodes.is_empty()
    }

    pub fn merge(&mut self, other: NodeEntries) {
        self.networks.extend(other.networks);
        self.nodes.extend(other.nodes);
    }
}

/// Override history persistence
#[async_trait]
pub trait OverridesStore: Send + Sync {
    /// Latest row per (network, node) for the given networks
    async fn latest_overrides(&self, networks: &[String]) -> Result<PreviousOverridesMap, StoreError>;

    async fn insert_overrides(&self, rows: &[OverridesRow]) -> Result<(), StoreError>;

    async fn delete_node_entries(&self, entries: &NodeEntries) -> Result<(), StoreError>;
}
