use clap::{Parser, Subcommand};
use color_eyre::eyre::{eyre, WrapErr};
use color_eyre::Result;
use env_logger::Env;
use log::{error, info, warn};
use std::path::PathBuf;

use meshopt::analysis::ScanConnectivity;
use meshopt::clients::{ApiServiceClient, PrometheusClient, SqliteOverridesStore};
use meshopt::config::ServiceConfig;
use meshopt::config_loader;
use meshopt::orchestrator::{Collaborators, CycleReport, Optimizer};

/// Cut-edge remediation and airtime optimization for wireless mesh networks
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to the service configuration YAML file
    #[arg(short, long)]
    config: PathBuf,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run optimization cycles periodically
    Run {
        /// Run a single cycle and exit
        #[arg(long)]
        once: bool,

        /// Compute and log changes without applying them
        #[arg(long)]
        dry_run: bool,
    },
    /// Replace the backup links of a network from scan results
    BackupLinks {
        /// Network to remediate
        #[arg(long)]
        network: String,

        /// JSON file with the scan connectivity entries
        #[arg(long)]
        scan_file: PathBuf,

        /// Maximum number of backup links, overrides the configuration
        #[arg(long)]
        max_links: Option<usize>,

        /// Compute and log changes without applying them
        #[arg(long)]
        dry_run: bool,
    },
}

/// Clients built from the configuration
struct Clients {
    api: ApiServiceClient,
    prometheus: PrometheusClient,
    store: SqliteOverridesStore,
}

impl Clients {
    fn new(config: &ServiceConfig) -> Result<Self> {
        let api = ApiServiceClient::new(config.network_urls(), config.request_timeout)
            .wrap_err("Failed to create API service client")?;
        let prometheus = PrometheusClient::new(&config.prometheus.url, config.request_timeout)
            .wrap_err("Failed to create Prometheus client")?;
        let store = SqliteOverridesStore::open(&config.database.path)
            .wrap_err_with(|| format!("Failed to open database '{}'", config.database.path.display()))?;
        Ok(Self { api, prometheus, store })
    }

    fn collaborators(&self) -> Collaborators<'_> {
        Collaborators {
            topologies: &self.api,
            node_config: &self.api,
            links: &self.api,
            telemetry: &self.prometheus,
            store: &self.store,
        }
    }
}

fn log_cycle(report: &CycleReport) {
    if let Some(cut_edge) = &report.cut_edge {
        info!(
            "Cut edge stage: {} networks changed, {} history rows recorded, {} nodes failed",
            cut_edge.changes.len(),
            cut_edge.inserted.len(),
            cut_edge.failed_nodes.values().map(|nodes| nodes.len()).sum::<usize>()
        );
        for e in &cut_edge.store_errors {
            warn!("Persistence failure during cycle: {}", e);
        }
    }
    if let Some(tideal) = &report.tideal {
        info!(
            "Tideal stage: {} networks optimized, {} written",
            tideal.overrides.len(),
            tideal.written.len()
        );
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize error handling
    color_eyre::install()?;

    // Parse command-line arguments
    let args = Args::parse();

    // Load configuration before logging so its level can be applied
    let config = match config_loader::load_config(&args.config) {
        Ok(config) => config,
        Err(e) => {
            env_logger::Builder::from_env(Env::default().default_filter_or("info")).init();
            error!("Failed to load configuration {:?}", args.config);
            return Err(e);
        }
    };

    // Initialize logging, RUST_LOG takes precedence over the configured level
    env_logger::Builder::from_env(Env::default().default_filter_or(config.log_level())).init();

    info!("Starting meshopt");
    info!("Configuration file: {:?}", args.config);

    let clients = Clients::new(&config)?;

    match args.command {
        Command::Run { once, dry_run } => {
            let optimizer = Optimizer::new(
                clients.collaborators(),
                config.request_timeout,
                config.prometheus.default_interval(),
            )
            .dry_run(dry_run);

            let mut ticker = tokio::time::interval(config.interval);
            loop {
                ticker.tick().await;
                info!("Starting optimization cycle");
                let report = optimizer.run_cycle(&config).await;
                log_cycle(&report);

                if once {
                    break;
                }
            }
        }
        Command::BackupLinks {
            network,
            scan_file,
            max_links,
            dry_run,
        } => {
            let content = std::fs::read_to_string(&scan_file)
                .wrap_err_with(|| format!("Failed to read scan file '{}'", scan_file.display()))?;
            let connectivity: Vec<ScanConnectivity> = serde_json::from_str(&content)
                .wrap_err_with(|| format!("Failed to parse scan file '{}'", scan_file.display()))?;

            let optimizer = Optimizer::new(
                clients.collaborators(),
                config.request_timeout,
                config.prometheus.default_interval(),
            )
            .dry_run(dry_run);

            let max_links = max_links.unwrap_or(config.backup_links.max_backup_links);
            let report = optimizer
                .run_auto_remediation(&network, &connectivity, max_links)
                .await
                .ok_or_else(|| eyre!("Could not fetch the topology of {}", network))?;
            info!(
                "Backup links in {}: {} deleted, {} added, {} failed",
                network, report.deleted, report.added, report.failed
            );
        }
    }

    info!("Done");
    Ok(())
}
