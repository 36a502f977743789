use crate::config::ServiceConfig;
use color_eyre::eyre::WrapErr;
use color_eyre::Result;
use log::info;
use std::fs::File;
use std::path::Path;

/// Load, parse and validate the configuration from a YAML file
pub fn load_config(config_path: &Path) -> Result<ServiceConfig> {
    info!("Loading configuration from: {:?}", config_path);

    // Open the configuration file
    let file = File::open(config_path)
        .wrap_err_with(|| format!("Failed to open configuration file '{}'", config_path.display()))?;

    // Parse the YAML content
    let config: ServiceConfig = serde_yaml::from_reader(file)
        .wrap_err_with(|| format!("Failed to parse configuration file '{}'", config_path.display()))?;

    info!(
        "Configured networks: {}",
        config.api_service.networks.keys().cloned().collect::<Vec<_>>().join(", ")
    );

    // Validate the configuration
    config.validate()?;

    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_load_config() {
        let yaml = r#"
api_service:
  networks:
    net-a:
      url: "http://api-a:8080"
prometheus:
  url: "http://prometheus:9090"
cut_edge:
  link_flap_backoff_ms: "2000"
  link_impairment_detection: 1
  config_change_delay: 5s
"#;

        let mut temp_file = NamedTempFile::new().unwrap();
        write!(temp_file, "{}", yaml).unwrap();

        let config = load_config(temp_file.path()).unwrap();
        assert_eq!(config.cut_edge.link_flap_backoff_ms, "2000");
        assert_eq!(config.cut_edge.config_change_delay.as_secs(), 5);
    }

    #[test]
    fn test_load_invalid_config() {
        let yaml = r#"
api_service:
  networks: {}
prometheus:
  url: "http://prometheus:9090"
"#;

        let mut temp_file = NamedTempFile::new().unwrap();
        write!(temp_file, "{}", yaml).unwrap();

        let error = load_config(temp_file.path()).unwrap_err();
        assert!(error.to_string().contains("at least one network"));
    }

    #[test]
    fn test_load_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let error = load_config(&dir.path().join("missing.yaml")).unwrap_err();
        assert!(error.to_string().contains("Failed to open"));
    }
}
