//! HTTP client for the API service.
//!
//! Every network has its own API service instance. Requests are JSON `POST`s
//! to `{url}/api/v2/{endpoint}`.

use std::collections::{BTreeMap, BTreeSet};
use std::time::Duration;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::json;

use super::{ClientError, LinkClient, NodeConfigClient, TopologySource};
use crate::topology::{parse_overrides_response, Link, OverridesMap, Topology};

/// Body of the overrides config requests and responses
#[derive(Debug, Serialize, Deserialize)]
struct OverridesPayload {
    overrides: String,
}

/// Client for the per-network API service instances
#[derive(Debug, Clone)]
pub struct ApiServiceClient {
    networks: BTreeMap<String, String>,
    client: reqwest::Client,
}

impl ApiServiceClient {
    /// Create a client for the given network name -> base URL map
    pub fn new(networks: BTreeMap<String, String>, timeout: Duration) -> Result<Self, ClientError> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        let networks = networks
            .into_iter()
            .map(|(name, url)| (name, url.trim_end_matches('/').to_string()))
            .collect();
        Ok(Self { networks, client })
    }

    fn endpoint_url(&self, network_name: &str, endpoint: &str) -> Result<String, ClientError> {
        let base = self
            .networks
            .get(network_name)
            .ok_or_else(|| ClientError::UnknownNetwork(network_name.to_string()))?;
        Ok(format!("{}/api/v2/{}", base, endpoint))
    }

    /// Send a request to the network's API service and decode the response
    pub async fn request<P, R>(&self, network_name: &str, endpoint: &str, params: &P) -> Result<R, ClientError>
    where
        P: Serialize + ?Sized + Sync,
        R: DeserializeOwned,
    {
        let url = self.endpoint_url(network_name, endpoint)?;
        let response = self.client.post(&url).json(params).send().await?;

        if !response.status().is_success() {
            return Err(ClientError::Status {
                endpoint: endpoint.to_string(),
                status: response.status().as_u16(),
            });
        }

        let body = response.bytes().await?;
        Ok(serde_json::from_slice(&body)?)
    }

    async fn write_overrides(
        &self,
        network_name: &str,
        endpoint: &str,
        overrides: &OverridesMap,
    ) -> Result<serde_json::Value, ClientError> {
        let payload = OverridesPayload {
            overrides: serde_json::to_string(overrides)?,
        };
        self.request(network_name, endpoint, &payload).await
    }
}

#[async_trait]
impl TopologySource for ApiServiceClient {
    async fn get_topology(&self, network_name: &str) -> Result<Topology, ClientError> {
        let mut topology: Topology = self.request(network_name, "getTopology", &json!({})).await?;
        topology.drop_entries_without_mac();
        Ok(topology)
    }

    fn networks(&self) -> Vec<String> {
        self.networks.keys().cloned().collect()
    }
}

#[async_trait]
impl NodeConfigClient for ApiServiceClient {
    async fn get_node_overrides(
        &self,
        network_name: &str,
        nodes: &BTreeSet<String>,
    ) -> Result<OverridesMap, ClientError> {
        let response: OverridesPayload = self
            .request(network_name, "getNodeOverridesConfig", &json!({ "nodes": nodes }))
            .await?;
        Ok(parse_overrides_response(&response.overrides)?)
    }

    async fn modify_node_overrides(
        &self,
        network_name: &str,
        overrides: &OverridesMap,
    ) -> Result<serde_json::Value, ClientError> {
        self.write_overrides(network_name, "modifyNodeOverridesConfig", overrides)
            .await
    }

    async fn set_node_overrides(
        &self,
        network_name: &str,
        overrides: &OverridesMap,
    ) -> Result<serde_json::Value, ClientError> {
        self.write_overrides(network_name, "setNodeOverridesConfig", overrides)
            .await
    }
}

#[async_trait]
impl LinkClient for ApiServiceClient {
    async fn add_link(&self, network_name: &str, link: &Link) -> Result<serde_json::Value, ClientError> {
        self.request(network_name, "addLink", &json!({ "link": link }))
            .await
    }

    async fn del_link(&self, network_name: &str, link: &Link) -> Result<serde_json::Value, ClientError> {
        let params = json!({
            "aNodeName": link.a_node_name,
            "zNodeName": link.z_node_name,
            "force": true,
        });
        self.request(network_name, "delLink", &params).await
    }
}
