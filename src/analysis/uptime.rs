//! Link uptime estimation.
//!
//! Average `topology_link_is_online` per link over a trailing window, one
//! query per network.

use std::collections::{BTreeMap, HashMap};
use std::time::Duration;

use crate::clients::prometheus::{consts, create_query, normalize, ops};
use crate::clients::Telemetry;
use crate::topology::Topology;

/// Metric reporting 1 while a link is up
pub const LINK_ONLINE_METRIC: &str = "topology_link_is_online";

/// Build the windowed-average uptime query for a network.
///
/// The per-link minimum across reporters is averaged over a subquery
/// covering `window` at `interval_sec` resolution.
pub fn link_uptime_query(network_name: &str, window: Duration, interval_sec: u64) -> String {
    let labels = BTreeMap::from([(consts::NETWORK.to_string(), normalize(network_name))]);
    let base = create_query(LINK_ONLINE_METRIC, &labels, interval_sec);
    let window_s = window.as_secs().saturating_sub(1).max(1);
    ops::avg_over_time(
        &ops::min_by(&base, consts::LINK_NAME),
        &format!("{}s:{}s", window_s, interval_sec),
    )
}

/// Average uptime in [0, 1] of every link of `topology` over `window`.
///
/// Results are keyed by the topology's link names. Links without samples are
/// absent. A failed or unsuccessful query yields an empty map.
pub async fn get_link_uptime(
    telemetry: &dyn Telemetry,
    topology: &Topology,
    window: Duration,
    interval_sec: u64,
) -> HashMap<String, f64> {
    let query = link_uptime_query(&topology.name, window, interval_sec);
    let response = match telemetry.query_latest(&query, None).await {
        Ok(response) if response.is_success() => response,
        Ok(response) => {
            log::warn!(
                "Uptime query for {} returned status {}: {}",
                topology.name,
                response.status,
                response.error.unwrap_or_default()
            );
            return HashMap::new();
        }
        Err(e) => {
            log::warn!("Failed to fetch link uptime for {}: {}", topology.name, e);
            return HashMap::new();
        }
    };

    // Label values are normalized, map them back to link names
    let link_names: HashMap<String, &str> = topology
        .links
        .iter()
        .map(|link| (normalize(&link.name), link.name.as_str()))
        .collect();

    let mut uptimes = HashMap::new();
    for sample in &response.data.result {
        let Some(label) = sample.metric.get(consts::LINK_NAME) else {
            continue;
        };
        let Some(link_name) = link_names.get(label) else {
            log::debug!("Ignoring uptime of unknown link {}", label);
            continue;
        };
        if let Some(value) = sample.as_f64() {
            uptimes.insert(link_name.to_string(), value.clamp(0.0, 1.0));
        }
    }

    log::debug!("Fetched uptime of {} links in {}", uptimes.len(), topology.name);
    uptimes
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clients::{ClientError, QueryData, QueryResponse, Sample};
    use crate::topology::graph::test_support::*;
    use crate::topology::NodeType;
    use async_trait::async_trait;
    use chrono::{DateTime, Utc};
    use std::sync::Mutex;

    struct FakeTelemetry {
        response: Result<QueryResponse, String>,
        queries: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl Telemetry for FakeTelemetry {
        async fn query_latest(&self, query: &str, _time: Option<DateTime<Utc>>) -> Result<QueryResponse, ClientError> {
            self.queries.lock().unwrap().push(query.to_string());
            match &self.response {
                Ok(response) => Ok(response.clone()),
                Err(error) => Err(ClientError::Query {
                    status: "error".to_string(),
                    error: error.clone(),
                }),
            }
        }
    }

    fn sample(link: &str, value: &str) -> Sample {
        Sample {
            metric: HashMap::from([(consts::LINK_NAME.to_string(), link.to_string())]),
            value: (1_600_000_000.0, value.to_string()),
        }
    }

    fn test_topology() -> Topology {
        topology(
            vec![
                node("pop", NodeType::Dn, true),
                node("dn-1", NodeType::Dn, false),
                node("cn.1", NodeType::Cn, false),
            ],
            vec![wireless("pop", "dn-1"), wireless("dn-1", "cn.1")],
        )
    }

    #[test]
    fn test_link_uptime_query() {
        let query = link_uptime_query("net.a", Duration::from_secs(3600), 30);
        assert_eq!(
            query,
            r#"avg_over_time(min by (linkName) (topology_link_is_online{intervalSec="30",network="net_a"})[3599s:30s])"#
        );
    }

    #[tokio::test]
    async fn test_get_link_uptime_maps_normalized_names() {
        let telemetry = FakeTelemetry {
            response: Ok(QueryResponse {
                status: "success".to_string(),
                data: QueryData {
                    result_type: "vector".to_string(),
                    result: vec![
                        sample("link_pop_dn_1", "1"),
                        sample("link_dn_1_cn_1", "0.25"),
                        sample("link_other", "0.5"),
                    ],
                },
                error: None,
            }),
            queries: Mutex::new(Vec::new()),
        };

        let uptimes = get_link_uptime(&telemetry, &test_topology(), Duration::from_secs(60), 30).await;
        assert_eq!(uptimes.len(), 2);
        assert_eq!(uptimes["link-pop-dn-1"], 1.0);
        assert_eq!(uptimes["link-dn-1-cn.1"], 0.25);
        assert_eq!(telemetry.queries.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_get_link_uptime_failure_is_empty() {
        let telemetry = FakeTelemetry {
            response: Err("timeout".to_string()),
            queries: Mutex::new(Vec::new()),
        };
        let uptimes = get_link_uptime(&telemetry, &test_topology(), Duration::from_secs(60), 30).await;
        assert!(uptimes.is_empty());
    }

    #[tokio::test]
    async fn test_get_link_uptime_unsuccessful_status_is_empty() {
        let telemetry = FakeTelemetry {
            response: Ok(QueryResponse {
                status: "error".to_string(),
                data: QueryData::default(),
                error: Some("bad query".to_string()),
            }),
            queries: Mutex::new(Vec::new()),
        };
        let uptimes = get_link_uptime(&telemetry, &test_topology(), Duration::from_secs(60), 30).await;
        assert!(uptimes.is_empty());
    }
}
