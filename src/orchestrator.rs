//! Optimization cycle orchestrator.
//!
//! This module drives one optimization cycle across every network: fetch the
//! topologies, run the cut-edge and airtime analyses, write the resulting
//! configuration and record the override history. A failure in one network
//! is logged and never stops the others.

use std::collections::{BTreeMap, BTreeSet};
use std::future::Future;
use std::time::Duration;

use futures::future::join_all;

use crate::analysis::{
    find_all_cn_cut_edges, get_link_uptime, prepare_changes, run_tideal_optimization, select_backup_links,
    ConfigChanges, CutEdge, ScanConnectivity,
};
use crate::clients::{
    ClientError, LinkClient, NodeConfigClient, NodeEntries, OverridesRow, OverridesStore, Telemetry,
    TopologySource,
};
use crate::config::{CutEdgeConfig, ServiceConfig, TidealConfig};
use crate::remediation::{apply_backup_links, update_overrides_configs, BackupLinkReport};
use crate::topology::{build_topology_graph, OverridesMap, Topology};

/// Outside systems an optimizer talks to
#[derive(Clone, Copy)]
pub struct Collaborators<'a> {
    pub topologies: &'a dyn TopologySource,
    pub node_config: &'a dyn NodeConfigClient,
    pub links: &'a dyn LinkClient,
    pub telemetry: &'a dyn Telemetry,
    pub store: &'a dyn OverridesStore,
}

/// Result of the cut-edge stage of a cycle
#[derive(Debug, Clone, Default)]
pub struct CutEdgeReport {
    /// Cut edges found per network
    pub cut_edges: BTreeMap<String, BTreeSet<CutEdge>>,
    /// Changes computed per network, only for networks that need some
    pub changes: BTreeMap<String, ConfigChanges>,
    /// Nodes whose writes failed, per network
    pub failed_nodes: BTreeMap<String, BTreeSet<String>>,
    /// History rows recorded
    pub inserted: Vec<OverridesRow>,
    /// History rows removed
    pub deleted: NodeEntries,
    /// Persistence failures
    pub store_errors: Vec<String>,
}

/// Result of the airtime stage of a cycle
#[derive(Debug, Clone, Default)]
pub struct TidealReport {
    /// Generated overrides per network
    pub overrides: BTreeMap<String, OverridesMap>,
    /// Networks whose overrides were written
    pub written: BTreeSet<String>,
}

/// Result of a full cycle
#[derive(Debug, Clone, Default)]
pub struct CycleReport {
    /// Networks whose topology could be fetched
    pub networks: BTreeSet<String>,
    pub cut_edge: Option<CutEdgeReport>,
    pub tideal: Option<TidealReport>,
}

/// Runs optimization cycles against a set of collaborators
pub struct Optimizer<'a> {
    clients: Collaborators<'a>,
    request_timeout: Duration,
    interval_sec: u64,
    dry_run: bool,
}

impl<'a> Optimizer<'a> {
    /// Create an optimizer.
    ///
    /// `request_timeout` bounds every collaborator fetch and `interval_sec`
    /// is the telemetry resolution used in queries.
    pub fn new(clients: Collaborators<'a>, request_timeout: Duration, interval_sec: u64) -> Self {
        Self {
            clients,
            request_timeout,
            interval_sec,
            dry_run: false,
        }
    }

    /// Compute and log changes without writing them anywhere
    pub fn dry_run(mut self, dry_run: bool) -> Self {
        self.dry_run = dry_run;
        self
    }

    /// Await a collaborator call with the request timeout. Failures and
    /// timeouts are logged and yield `None`.
    async fn fetch<T, F>(&self, what: &str, network_name: &str, call: F) -> Option<T>
    where
        F: Future<Output = Result<T, ClientError>>,
    {
        match tokio::time::timeout(self.request_timeout, call).await {
            Ok(Ok(value)) => Some(value),
            Ok(Err(e)) => {
                log::warn!("Failed to fetch {} for {}: {}", what, network_name, e);
                None
            }
            Err(_) => {
                log::warn!(
                    "Timed out after {:?} fetching {} for {}",
                    self.request_timeout,
                    what,
                    network_name
                );
                None
            }
        }
    }

    /// Fetch the topology of every network. Each fetch has its own timeout;
    /// networks that fail or time out are dropped for this cycle.
    pub async fn fetch_topologies(&self) -> BTreeMap<String, Topology> {
        self.clients
            .topologies
            .get_all_topologies(self.request_timeout)
            .await
            .into_iter()
            .filter_map(|(network_name, result)| match result {
                Ok(topology) => Some((network_name, topology)),
                Err(e) => {
                    log::warn!("Failed to fetch topology for {}: {}", network_name, e);
                    None
                }
            })
            .collect()
    }

    /// Find the cut edges of one network, including those exposed by links
    /// with low uptime when a threshold is configured
    async fn network_cut_edges(&self, topology: &Topology, config: &CutEdgeConfig) -> BTreeSet<CutEdge> {
        let network_name = &topology.name;
        log::info!("Running cut edge config optimization for {}", network_name);

        let (graph, cns) = build_topology_graph(topology);
        if cns.is_empty() {
            log::info!("{} has no CNs", network_name);
            return BTreeSet::new();
        }

        let pruned = match config.link_uptime_threshold {
            Some(threshold) => {
                let uptimes = tokio::time::timeout(
                    self.request_timeout,
                    get_link_uptime(self.clients.telemetry, topology, config.window, self.interval_sec),
                )
                .await
                .unwrap_or_else(|_| {
                    log::warn!("Timed out fetching link uptime for {}", network_name);
                    Default::default()
                });
                Some(graph.without_low_uptime_links(&uptimes, threshold))
            }
            None => None,
        };

        let cut_edges = find_all_cn_cut_edges(&graph, pruned.as_ref(), &cns);
        if cut_edges.is_empty() {
            log::info!("{} has no CN cut edges", network_name);
        } else {
            log::info!("{} edges in {} cut off one or more CNs", cut_edges.len(), network_name);
        }
        cut_edges
    }

    /// Remediate the nodes on cut edges of every network and revert the
    /// nodes that left them.
    pub async fn process_cut_edges(
        &self,
        topologies: &BTreeMap<String, Topology>,
        config: &CutEdgeConfig,
    ) -> CutEdgeReport {
        let mut report = CutEdgeReport::default();
        let params = config.params();

        // Cut edges of every network
        let found = join_all(topologies.iter().map(|(network_name, topology)| async move {
            (network_name.clone(), self.network_cut_edges(topology, config).await)
        }))
        .await;
        report.cut_edges = found.into_iter().collect();

        // Nodes remediated in earlier cycles
        let network_names: Vec<String> = topologies.keys().cloned().collect();
        let previous = match self.clients.store.latest_overrides(&network_names).await {
            Ok(previous) => previous,
            Err(e) => {
                log::warn!("Failed to read previous overrides configs: {}", e);
                report.store_errors.push(e.to_string());
                return report;
            }
        };

        // Live overrides of every node that may change
        let mut fetches = Vec::new();
        for (network_name, cut_edges) in &report.cut_edges {
            let node_set: BTreeSet<String> = cut_edges
                .iter()
                .flat_map(|edge| edge.nodes())
                .map(str::to_string)
                .collect();
            let known = previous.get(network_name).cloned().unwrap_or_default();
            if node_set.is_empty() && known.is_empty() {
                continue;
            }

            let nodes: BTreeSet<String> = node_set.iter().chain(known.keys()).cloned().collect();
            fetches.push(async move {
                let current = self
                    .fetch(
                        "node overrides",
                        network_name,
                        self.clients.node_config.get_node_overrides(network_name, &nodes),
                    )
                    .await;
                (network_name.clone(), node_set, known, current)
            });
        }
        let fetched = join_all(fetches).await;

        for (network_name, node_set, known, current) in fetched {
            let Some(current) = current else {
                continue;
            };

            let changes = prepare_changes(&network_name, &node_set, &current, &known, &params);
            if changes.is_empty() {
                log::info!("{} does not require any cut edge config changes", network_name);
                continue;
            }
            log::info!(
                "{} requires cut edge config changes to {} nodes",
                network_name,
                changes.nodes().len()
            );
            report.changes.insert(network_name, changes);
        }

        if self.dry_run {
            for (network_name, changes) in &report.changes {
                for write in &changes.writes {
                    log::info!(
                        "[dry run] {:?} {} in {}: {}",
                        write.kind,
                        write.node_name,
                        network_name,
                        serde_json::to_string(&write.overrides).unwrap_or_default()
                    );
                }
            }
            return report;
        }

        // Writes within a network are sequential, networks run concurrently
        let applied = join_all(report.changes.iter().map(|(network_name, changes)| async move {
            let failed = update_overrides_configs(
                self.clients.node_config,
                network_name,
                &changes.writes,
                config.config_change_delay,
            )
            .await;
            (network_name.clone(), failed)
        }))
        .await;
        report.failed_nodes = applied.into_iter().filter(|(_, failed)| !failed.is_empty()).collect();

        // History changes of successfully written nodes, across all networks
        let no_failures = BTreeSet::new();
        for (network_name, changes) in &report.changes {
            let failed = report.failed_nodes.get(network_name).unwrap_or(&no_failures);
            report.inserted.extend(
                changes
                    .to_insert
                    .iter()
                    .filter(|row| !failed.contains(&row.node_name))
                    .cloned(),
            );

            let reverted: BTreeSet<String> = changes.to_delete.nodes.difference(failed).cloned().collect();
            if !reverted.is_empty() {
                report.deleted.merge(NodeEntries {
                    networks: BTreeSet::from([network_name.clone()]),
                    nodes: reverted,
                });
            }
        }

        // Deletes span every (network, node) pair of the merged entries, so
        // they must land before this cycle's new rows
        if let Err(e) = self.clients.store.delete_node_entries(&report.deleted).await {
            log::warn!("Failed to delete overrides configs: {}", e);
            report.store_errors.push(e.to_string());
        }
        if let Err(e) = self.clients.store.insert_overrides(&report.inserted).await {
            log::warn!("Failed to insert overrides configs: {}", e);
            report.store_errors.push(e.to_string());
        }

        report
    }

    /// Compute and write the airtime allocation of every network
    pub async fn process_tideal(&self, topologies: &BTreeMap<String, Topology>, config: &TidealConfig) -> TidealReport {
        let mut report = TidealReport::default();

        for (network_name, topology) in topologies {
            if let Some(overrides) =
                run_tideal_optimization(topology, config.wireless_capacity_mbps, config.wired_capacity_mbps)
            {
                report.overrides.insert(network_name.clone(), overrides);
            }
        }

        if self.dry_run {
            for (network_name, overrides) in &report.overrides {
                log::info!(
                    "[dry run] tideal overrides for {}: {}",
                    network_name,
                    serde_json::to_string(overrides).unwrap_or_default()
                );
            }
            return report;
        }

        let written = join_all(report.overrides.iter().map(|(network_name, overrides)| async move {
            let response = self
                .fetch(
                    "tideal overrides write",
                    network_name,
                    self.clients.node_config.modify_node_overrides(network_name, overrides),
                )
                .await;
            response.map(|response| {
                log::info!("Tideal overrides response in {} is {}", network_name, response);
                network_name.clone()
            })
        }))
        .await;
        report.written = written.into_iter().flatten().collect();

        report
    }

    /// Run one full cycle with the enabled analyses
    pub async fn run_cycle(&self, config: &ServiceConfig) -> CycleReport {
        let topologies = self.fetch_topologies().await;
        let mut report = CycleReport {
            networks: topologies.keys().cloned().collect(),
            ..Default::default()
        };
        if topologies.is_empty() {
            log::warn!("No topology could be fetched");
            return report;
        }

        if config.cut_edge.enabled {
            report.cut_edge = Some(self.process_cut_edges(&topologies, &config.cut_edge).await);
        }
        if config.tideal.enabled {
            report.tideal = Some(self.process_tideal(&topologies, &config.tideal).await);
        }

        report
    }

    /// Replace the backup links of one network using scan results
    pub async fn run_auto_remediation(
        &self,
        network_name: &str,
        connectivity: &[ScanConnectivity],
        max_backup_links: usize,
    ) -> Option<BackupLinkReport> {
        log::info!("Starting auto-remediation for {}", network_name);
        let topology = self
            .fetch("topology", network_name, self.clients.topologies.get_topology(network_name))
            .await?;

        let plan = select_backup_links(&topology, connectivity, max_backup_links);
        if self.dry_run {
            for link in &plan.to_delete {
                log::info!("[dry run] delete backup link {} in {}", link.name, network_name);
            }
            for link in &plan.to_add {
                log::info!("[dry run] add backup link {} in {}", link.name, network_name);
            }
            return Some(BackupLinkReport::default());
        }

        Some(apply_backup_links(self.clients.links, network_name, &plan).await)
    }
}
