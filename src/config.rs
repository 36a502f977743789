//! Service configuration.
//!
//! Parsed from YAML. Durations are written in human form ("30s", "15m").

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::time::Duration;

use crate::analysis::CutEdgeParams;

/// Top-level configuration of the optimizer service
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct ServiceConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub log_level: Option<String>,
    /// Period between optimization cycles
    #[serde(with = "humantime_serde", default = "default_interval")]
    pub interval: Duration,
    /// Timeout of every collaborator fetch
    #[serde(with = "humantime_serde", default = "default_request_timeout")]
    pub request_timeout: Duration,
    pub api_service: ApiServiceConfig,
    pub prometheus: PrometheusConfig,
    #[serde(default)]
    pub database: DatabaseConfig,
    #[serde(default)]
    pub cut_edge: CutEdgeConfig,
    #[serde(default)]
    pub tideal: TidealConfig,
    #[serde(default)]
    pub backup_links: BackupLinksConfig,
}

impl ServiceConfig {
    /// Validate the configuration
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.api_service.networks.is_empty() {
            return Err(ValidationError::InvalidApiService(
                "at least one network must be configured".to_string(),
            ));
        }
        for (name, network) in &self.api_service.networks {
            if network.url.trim().is_empty() {
                return Err(ValidationError::InvalidApiService(format!(
                    "url of network {} cannot be empty",
                    name
                )));
            }
        }

        if self.prometheus.url.trim().is_empty() {
            return Err(ValidationError::InvalidPrometheus("url cannot be empty".to_string()));
        }
        if self.prometheus.intervals.is_empty() {
            return Err(ValidationError::InvalidPrometheus(
                "intervals cannot be an empty list".to_string(),
            ));
        }

        self.cut_edge.validate()?;
        self.tideal.validate()?;

        Ok(())
    }

    /// Log level, `info` unless configured
    pub fn log_level(&self) -> &str {
        self.log_level.as_deref().unwrap_or("info")
    }

    /// Network name -> API service URL
    pub fn network_urls(&self) -> BTreeMap<String, String> {
        self.api_service
            .networks
            .iter()
            .map(|(name, network)| (name.clone(), network.url.clone()))
            .collect()
    }
}

/// API service instances, one per network
#[derive(Debug, Serialize, Deserialize, Clone, Default)]
pub struct ApiServiceConfig {
    pub networks: BTreeMap<String, NetworkEndpoint>,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct NetworkEndpoint {
    pub url: String,
}

/// Time-series store
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct PrometheusConfig {
    pub url: String,
    /// Scrape intervals in seconds, the first is used in queries
    #[serde(default = "default_intervals")]
    pub intervals: Vec<u64>,
}

impl PrometheusConfig {
    pub fn default_interval(&self) -> u64 {
        self.intervals.first().copied().unwrap_or(30)
    }
}

/// Override history database
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct DatabaseConfig {
    pub path: PathBuf,
}

/// Cut-edge remediation settings
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct CutEdgeConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// Trailing window of the uptime estimate
    #[serde(with = "humantime_serde", default = "default_window")]
    pub window: Duration,
    #[serde(default = "default_link_flap_backoff_ms")]
    pub link_flap_backoff_ms: String,
    #[serde(default = "default_link_impairment_detection")]
    pub link_impairment_detection: i64,
    /// Delay after each overrides write within a network
    #[serde(with = "humantime_serde", default = "default_config_change_delay")]
    pub config_change_delay: Duration,
    /// Links below this average uptime are also treated as down
    #[serde(skip_serializing_if = "Option::is_none")]
    pub link_uptime_threshold: Option<f64>,
}

impl CutEdgeConfig {
    fn validate(&self) -> Result<(), ValidationError> {
        if self.link_flap_backoff_ms.trim().is_empty() {
            return Err(ValidationError::InvalidCutEdge(
                "link_flap_backoff_ms cannot be empty".to_string(),
            ));
        }
        if let Some(threshold) = self.link_uptime_threshold {
            if !(0.0..1.0).contains(&threshold) {
                return Err(ValidationError::InvalidCutEdge(format!(
                    "link_uptime_threshold must be in [0, 1), got {}",
                    threshold
                )));
            }
        }
        Ok(())
    }

    /// Values written to nodes on a cut edge
    pub fn params(&self) -> CutEdgeParams {
        CutEdgeParams {
            link_impairment_detection: self.link_impairment_detection,
            link_flap_backoff_ms: self.link_flap_backoff_ms.clone(),
        }
    }
}

/// Airtime optimization settings
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct TidealConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default = "default_wireless_capacity")]
    pub wireless_capacity_mbps: f64,
    #[serde(default = "default_wired_capacity")]
    pub wired_capacity_mbps: f64,
}

impl TidealConfig {
    fn validate(&self) -> Result<(), ValidationError> {
        let usable = |capacity: f64| capacity.is_finite() && capacity > 0.0;
        if !usable(self.wireless_capacity_mbps) || !usable(self.wired_capacity_mbps) {
            return Err(ValidationError::InvalidTideal(format!(
                "link capacities must be positive and finite, got {} wireless and {} wired",
                self.wireless_capacity_mbps, self.wired_capacity_mbps
            )));
        }
        Ok(())
    }
}

/// Backup link selection settings
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct BackupLinksConfig {
    #[serde(default = "default_max_backup_links")]
    pub max_backup_links: usize,
}

/// Configuration validation errors
#[derive(Debug, thiserror::Error)]
pub enum ValidationError {
    #[error("Invalid api_service configuration: {0}")]
    InvalidApiService(String),
    #[error("Invalid prometheus configuration: {0}")]
    InvalidPrometheus(String),
    #[error("Invalid cut_edge configuration: {0}")]
    InvalidCutEdge(String),
    #[error("Invalid tideal configuration: {0}")]
    InvalidTideal(String),
}

fn default_true() -> bool {
    true
}

fn default_interval() -> Duration {
    Duration::from_secs(15 * 60)
}

fn default_request_timeout() -> Duration {
    Duration::from_secs(2)
}

fn default_window() -> Duration {
    Duration::from_secs(60 * 60)
}

fn default_config_change_delay() -> Duration {
    Duration::from_secs(30)
}

fn default_intervals() -> Vec<u64> {
    vec![30]
}

fn default_link_flap_backoff_ms() -> String {
    "60000".to_string()
}

fn default_link_impairment_detection() -> i64 {
    1
}

fn default_wireless_capacity() -> f64 {
    1000.0
}

fn default_wired_capacity() -> f64 {
    10000.0
}

fn default_max_backup_links() -> usize {
    5
}

/// Default implementations
impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("meshopt.db"),
        }
    }
}

impl Default for CutEdgeConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            window: default_window(),
            link_flap_backoff_ms: default_link_flap_backoff_ms(),
            link_impairment_detection: default_link_impairment_detection(),
            config_change_delay: default_config_change_delay(),
            link_uptime_threshold: None,
        }
    }
}

impl Default for TidealConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            wireless_capacity_mbps: default_wireless_capacity(),
            wired_capacity_mbps: default_wired_capacity(),
        }
    }
}

impl Default for BackupLinksConfig {
    fn default() -> Self {
        Self {
            max_backup_links: default_max_backup_links(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const MINIMAL: &str = r#"
api_service:
  networks:
    net-a:
      url: "http://api-a:8080"
prometheus:
  url: "http://prometheus:9090"
"#;

    #[test]
    fn test_minimal_config_defaults() {
        let config: ServiceConfig = serde_yaml::from_str(MINIMAL).unwrap();
        config.validate().unwrap();

        assert_eq!(config.log_level(), "info");
        assert_eq!(config.interval, Duration::from_secs(900));
        assert_eq!(config.request_timeout, Duration::from_secs(2));
        assert_eq!(config.prometheus.default_interval(), 30);
        assert!(config.cut_edge.enabled);
        assert_eq!(config.cut_edge.window, Duration::from_secs(3600));
        assert_eq!(config.cut_edge.link_uptime_threshold, None);
        assert!(config.tideal.enabled);
        assert_eq!(config.backup_links.max_backup_links, 5);
        assert_eq!(config.network_urls()["net-a"], "http://api-a:8080");
    }

    #[test]
    fn test_full_config_parsing() {
        let yaml = r#"
log_level: debug
interval: 5m
request_timeout: 10s
api_service:
  networks:
    net-a: { url: "http://api-a:8080" }
    net-b: { url: "http://api-b:8080" }
prometheus:
  url: "http://prometheus:9090"
  intervals: [1, 30]
database:
  path: "/data/overrides.db"
cut_edge:
  enabled: false
  window: 2h
  link_flap_backoff_ms: "2000"
  link_impairment_detection: 1
  config_change_delay: 1s
  link_uptime_threshold: 0.5
tideal:
  wireless_capacity_mbps: 800
  wired_capacity_mbps: 10000
backup_links:
  max_backup_links: 2
"#;
        let config: ServiceConfig = serde_yaml::from_str(yaml).unwrap();
        config.validate().unwrap();

        assert_eq!(config.log_level(), "debug");
        assert_eq!(config.interval, Duration::from_secs(300));
        assert_eq!(config.request_timeout, Duration::from_secs(10));
        assert_eq!(config.api_service.networks.len(), 2);
        assert_eq!(config.prometheus.default_interval(), 1);
        assert_eq!(config.database.path, PathBuf::from("/data/overrides.db"));
        assert!(!config.cut_edge.enabled);
        assert_eq!(config.cut_edge.window, Duration::from_secs(7200));
        assert_eq!(config.cut_edge.config_change_delay, Duration::from_secs(1));
        assert_eq!(config.cut_edge.link_uptime_threshold, Some(0.5));
        assert_eq!(
            config.cut_edge.params(),
            CutEdgeParams {
                link_impairment_detection: 1,
                link_flap_backoff_ms: "2000".to_string(),
            }
        );
        assert_eq!(config.tideal.wireless_capacity_mbps, 800.0);
        assert_eq!(config.backup_links.max_backup_links, 2);
    }

    #[test]
    fn test_validation_errors() {
        let mut config: ServiceConfig = serde_yaml::from_str(MINIMAL).unwrap();
        config.cut_edge.link_uptime_threshold = Some(1.0);
        assert!(matches!(config.validate(), Err(ValidationError::InvalidCutEdge(_))));

        config.cut_edge.link_uptime_threshold = Some(0.0);
        assert!(config.validate().is_ok());

        config.cut_edge.link_flap_backoff_ms = String::new();
        assert!(matches!(config.validate(), Err(ValidationError::InvalidCutEdge(_))));

        let mut config: ServiceConfig = serde_yaml::from_str(MINIMAL).unwrap();
        config.tideal.wired_capacity_mbps = 0.0;
        assert!(matches!(config.validate(), Err(ValidationError::InvalidTideal(_))));

        config.tideal.wired_capacity_mbps = 10000.0;
        config.tideal.wireless_capacity_mbps = f64::NAN;
        assert!(matches!(config.validate(), Err(ValidationError::InvalidTideal(_))));

        config.tideal.wireless_capacity_mbps = f64::INFINITY;
        assert!(matches!(config.validate(), Err(ValidationError::InvalidTideal(_))));

        config.tideal.wireless_capacity_mbps = 1000.0;
        assert!(config.validate().is_ok());

        let mut config: ServiceConfig = serde_yaml::from_str(MINIMAL).unwrap();
        config.cut_edge.link_uptime_threshold = Some(f64::NAN);
        assert!(matches!(config.validate(), Err(ValidationError::InvalidCutEdge(_))));

        let mut config: ServiceConfig = serde_yaml::from_str(MINIMAL).unwrap();
        config.prometheus.intervals.clear();
        assert!(matches!(config.validate(), Err(ValidationError::InvalidPrometheus(_))));

        let mut config: ServiceConfig = serde_yaml::from_str(MINIMAL).unwrap();
        config.api_service.networks.clear();
        assert!(matches!(config.validate(), Err(ValidationError::InvalidApiService(_))));

        let mut config: ServiceConfig = serde_yaml::from_str(MINIMAL).unwrap();
        config.api_service.networks.get_mut("net-a").unwrap().url = " ".to_string();
        assert!(matches!(config.validate(), Err(ValidationError::InvalidApiService(_))));
    }

    #[test]
    fn test_partial_sections_use_defaults() {
        let yaml = format!("{}\ncut_edge:\n  enabled: false\ntideal:\n  wired_capacity_mbps: 500\n", MINIMAL);
        let config: ServiceConfig = serde_yaml::from_str(&yaml).unwrap();

        assert!(!config.cut_edge.enabled);
        assert_eq!(config.cut_edge.link_flap_backoff_ms, "60000");
        assert_eq!(config.cut_edge.link_impairment_detection, 1);
        assert_eq!(config.tideal.wireless_capacity_mbps, 1000.0);
        assert_eq!(config.tideal.wired_capacity_mbps, 500.0);
    }

    #[test]
    fn test_human_durations() {
        let yaml = format!("{}\ninterval: 1h 30m\n", MINIMAL);
        let config: ServiceConfig = serde_yaml::from_str(&yaml).unwrap();
        assert_eq!(config.interval, Duration::from_secs(5400));

        let yaml = format!("{}\ninterval: soon\n", MINIMAL);
        assert!(serde_yaml::from_str::<ServiceConfig>(&yaml).is_err());
    }
}
