//! HTTP client and query helpers for the time-series store.
//!
//! Label values are stored in normalized form (see [`normalize`]), so every
//! query built here normalizes the values it filters on.

use std::collections::BTreeMap;
use std::sync::LazyLock;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use regex::Regex;

use super::{ClientError, QueryResponse, Telemetry};

/// Well-known label names
pub mod consts {
    pub const NETWORK: &str = "network";
    pub const LINK_NAME: &str = "linkName";
    pub const DATA_INTERVAL_S: &str = "intervalSec";
}

/// Characters not allowed in label values
static INVALID_CHARS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[^A-Za-z0-9_]").expect("Invalid label character regex"));

/// Replace every character that is not valid in a metric/label name with `_`
pub fn normalize(value: &str) -> String {
    INVALID_CHARS.replace_all(value, "_").into_owned()
}

/// Build an instant vector selector, `metric{label="value",...}`.
///
/// Labels are rendered in key order. `intervalSec` is added with
/// `interval_sec` when the caller did not set it.
pub fn create_query(metric: &str, labels: &BTreeMap<String, String>, interval_sec: u64) -> String {
    let mut labels = labels.clone();
    labels
        .entry(consts::DATA_INTERVAL_S.to_string())
        .or_insert_with(|| interval_sec.to_string());

    let matchers: Vec<String> = labels
        .iter()
        .map(|(name, value)| format!("{}=\"{}\"", name, value))
        .collect();

    format!("{}{{{}}}", metric, matchers.join(","))
}

/// PromQL operators
pub mod ops {
    /// `avg_over_time(query[range])`
    pub fn avg_over_time(query: &str, range: &str) -> String {
        format!("avg_over_time({}[{}])", query, range)
    }

    /// `min by (label) (query)`
    pub fn min_by(query: &str, label: &str) -> String {
        format!("min by ({}) ({})", label, query)
    }
}

/// Client for the time-series store's HTTP API
#[derive(Debug, Clone)]
pub struct PrometheusClient {
    url: String,
    client: reqwest::Client,
}

impl PrometheusClient {
    pub fn new(url: &str, timeout: Duration) -> Result<Self, ClientError> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            url: url.trim_end_matches('/').to_string(),
            client,
        })
    }

    async fn get(&self, path: &str, params: &[(&str, String)]) -> Result<QueryResponse, ClientError> {
        let url = format!("{}/api/v1/{}", self.url, path);
        let response = self.client.get(&url).query(params).send().await?;

        let status = response.status();
        let body = response.bytes().await?;
        let decoded: Result<QueryResponse, _> = serde_json::from_slice(&body);
        match decoded {
            Ok(result) if result.is_success() => Ok(result),
            Ok(result) => Err(ClientError::Query {
                status: result.status,
                error: result.error.unwrap_or_default(),
            }),
            Err(_) if !status.is_success() => Err(ClientError::Status {
                endpoint: path.to_string(),
                status: status.as_u16(),
            }),
            Err(e) => Err(e.into()),
        }
    }
}

#[async_trait]
impl Telemetry for PrometheusClient {
    async fn query_latest(
        &self,
        query: &str,
        time: Option<DateTime<Utc>>,
    ) -> Result<QueryResponse, ClientError> {
        let mut params = vec![("query", query.to_string())];
        if let Some(time) = time {
            params.push(("time", time.timestamp().to_string()));
        }
        self.get("query", &params).await
    }
}
