//! Airtime allocation (`txIdeal`/`rxIdeal`) for point-to-multipoint radios.

use std::collections::BTreeMap;

use super::flow_graph::{estimate_capacity, FlowSolution};
use super::p2mp::find_all_p2mp;
use crate::topology::{build_topology_graph, Link, NodeOverrides, OverridesMap, Topology};

/// Airtime unit of a radio's full time budget
pub const TIDEAL_SCALE: f64 = 10000.0;

/// Turn the solved airtime shares into per-peer `txIdeal`/`rxIdeal` overrides.
///
/// Each link of a P2MP node gets its share of the node's total solved time,
/// scaled to [`TIDEAL_SCALE`]. A link without a solved time gets 0. Returns
/// `None` when no node gets any override.
pub fn create_tideal_configs(
    p2mp_nodes: &BTreeMap<String, Vec<Link>>,
    solution: &FlowSolution,
) -> Option<OverridesMap> {
    let mut overrides = OverridesMap::new();

    for (node_name, links) in p2mp_nodes {
        let sum_time: f64 = links
            .iter()
            .filter_map(|link| solution.edges.get(&link.name))
            .map(|edge| edge.time.unwrap_or(0.0))
            .sum();

        for link in links {
            let peer_mac = link.peer_mac(node_name);
            if peer_mac.is_empty() {
                log::warn!("Could not find mac address for node in {}", link.name);
                continue;
            }

            let time = solution.edges.get(&link.name).map(|edge| edge.time.unwrap_or(0.0));
            let tideal = match time {
                Some(time) if sum_time > 0.0 => (time * TIDEAL_SCALE / sum_time).round().clamp(0.0, TIDEAL_SCALE) as i64,
                _ => {
                    log::warn!(
                        "{} not assigned any time or does not have a flow edge",
                        link.name
                    );
                    0
                }
            };

            overrides
                .entry(node_name.clone())
                .or_insert_with(NodeOverrides::default)
                .set_airtime(peer_mac, tideal);
        }
    }

    overrides.retain(|_, node_overrides| !node_overrides.is_empty());
    if overrides.is_empty() {
        None
    } else {
        Some(overrides)
    }
}

/// Estimate the fair CN throughput of a topology and derive the tideal
/// overrides of its P2MP nodes.
///
/// Returns `None` when there is nothing to configure: no CN, no P2MP node,
/// no solution, or no override produced.
pub fn run_tideal_optimization(
    topology: &Topology,
    wireless_capacity_mbps: f64,
    wired_capacity_mbps: f64,
) -> Option<OverridesMap> {
    let network_name = &topology.name;
    log::info!("Analyzing topology {}", network_name);
    let (graph, cns) = build_topology_graph(topology);

    if cns.is_empty() {
        log::info!("{} has no CNs", network_name);
        return None;
    }

    let p2mp_nodes = find_all_p2mp(&graph);
    if p2mp_nodes.is_empty() {
        log::info!("{} has no wireless links that share airtime", network_name);
        return None;
    }

    let Some(solution) = estimate_capacity(&graph, &cns, wireless_capacity_mbps, wired_capacity_mbps) else {
        log::info!("Could not solve tideal optimization problem for {}", network_name);
        return None;
    };

    log::info!(
        "The maximum achievable simultaneous throughput to all CNs in {} is {:.2} Mbps",
        network_name,
        solution.result
    );

    let Some(overrides) = create_tideal_configs(&p2mp_nodes, &solution) else {
        log::info!("No tideal config needed for {}", network_name);
        return None;
    };

    log::debug!("The optimized tideal configs are: {:?}", overrides);
    Some(overrides)
}
