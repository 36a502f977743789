//! Backup CN link selection from interference scan results.
//!
//! Scans report which radios can hear each other and at what SNR. Pairs of
//! nodes that are not already linked become candidate backup links; the
//! strongest ones replace the backup links currently in the topology.

use std::cmp::Ordering;
use std::collections::{BTreeMap, HashMap, HashSet};

use serde::{Deserialize, Serialize};

use crate::topology::{Link, LinkType, Node, Topology};

/// One scan route: transmit beam, receive beam and SNR in dB
pub type ScanRoute = (i64, i64, f64);

/// Connectivity between two radios found by a scan
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScanConnectivity {
    /// MAC of the transmitting radio
    pub tx_node: String,
    /// MAC of the receiving radio
    pub rx_node: String,
    /// Routes, best first
    #[serde(default)]
    pub routes: Vec<ScanRoute>,
}

impl ScanConnectivity {
    /// SNR of the best route
    pub fn snr(&self) -> Option<f64> {
        self.routes.first().map(|(_, _, snr)| *snr)
    }
}

/// Link changes computed for one network
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BackupLinkPlan {
    /// Existing backup links, removed first
    pub to_delete: Vec<Link>,
    /// New backup links, strongest first
    pub to_add: Vec<Link>,
}

impl BackupLinkPlan {
    pub fn is_empty(&self) -> bool {
        self.to_delete.is_empty() && self.to_add.is_empty()
    }
}

/// Candidate backup link with the SNR it was heard at
#[derive(Debug, Clone)]
struct Candidate {
    link: Link,
    snr: Option<f64>,
}

/// Strongest first, candidates without a route last, then by name
fn by_snr_desc(a: &Candidate, b: &Candidate) -> Ordering {
    match (a.snr, b.snr) {
        (Some(x), Some(y)) => y.partial_cmp(&x).unwrap_or(Ordering::Equal),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    }
    .then_with(|| a.link.name.cmp(&b.link.name))
}

fn node_pair<'a>(a: &'a str, z: &'a str) -> (&'a str, &'a str) {
    if a < z {
        (a, z)
    } else {
        (z, a)
    }
}

fn candidate_link(a: (&Node, &str), z: (&Node, &str)) -> Link {
    let ((a_node, a_mac), (z_node, z_mac)) = if a.0.name < z.0.name { (a, z) } else { (z, a) };
    Link {
        name: format!("link-{}-{}", a_node.name, z_node.name),
        a_node_name: a_node.name.clone(),
        z_node_name: z_node.name.clone(),
        a_node_mac: a_mac.to_string(),
        z_node_mac: z_mac.to_string(),
        link_type: LinkType::Wireless,
        is_alive: false,
        linkup_attempts: 0,
        is_backup_cn_link: true,
    }
}

/// Select the backup links of a network.
///
/// Every backup link already in the topology is scheduled for deletion. Scan
/// results between two known nodes not already joined by a regular link
/// become candidates; at most `max_backup_links` of them are added,
/// highest SNR first.
pub fn select_backup_links(
    topology: &Topology,
    connectivity: &[ScanConnectivity],
    max_backup_links: usize,
) -> BackupLinkPlan {
    let (to_delete, regular): (Vec<&Link>, Vec<&Link>) =
        topology.links.iter().partition(|link| link.is_backup_cn_link);
    let linked: HashSet<(&str, &str)> = regular
        .iter()
        .map(|link| node_pair(&link.a_node_name, &link.z_node_name))
        .collect();
    let regular_names: HashSet<&str> = regular.iter().map(|link| link.name.as_str()).collect();

    let node_by_mac: HashMap<&str, &Node> = topology
        .nodes
        .iter()
        .flat_map(|node| node.mac_addrs().map(move |mac| (mac, node)))
        .collect();

    let mut candidates: BTreeMap<String, Candidate> = BTreeMap::new();
    for entry in connectivity {
        let (Some(tx), Some(rx)) = (
            node_by_mac.get(entry.tx_node.as_str()),
            node_by_mac.get(entry.rx_node.as_str()),
        ) else {
            log::debug!("One of {} and {} is not in {}", entry.tx_node, entry.rx_node, topology.name);
            continue;
        };
        if tx.name == rx.name {
            continue;
        }

        let link = candidate_link((*tx, entry.tx_node.as_str()), (*rx, entry.rx_node.as_str()));
        if regular_names.contains(link.name.as_str())
            || linked.contains(&node_pair(&link.a_node_name, &link.z_node_name))
        {
            continue;
        }

        // Keep the best measurement of each pair along with the radios it was heard on
        let snr = entry.snr();
        match candidates.get_mut(&link.name) {
            Some(existing) => {
                let better = match (snr, existing.snr) {
                    (Some(new), Some(old)) => new > old,
                    (Some(_), None) => true,
                    _ => false,
                };
                if better {
                    *existing = Candidate { link, snr };
                }
            }
            None => {
                candidates.insert(link.name.clone(), Candidate { link, snr });
            }
        }
    }

    let mut candidates: Vec<Candidate> = candidates.into_values().collect();
    candidates.sort_by(by_snr_desc);

    let to_add: Vec<Link> = candidates
        .into_iter()
        .take(max_backup_links)
        .map(|candidate| candidate.link)
        .collect();

    log::debug!(
        "{}: {} backup links to delete, {} to add",
        topology.name,
        to_delete.len(),
        to_add.len()
    );

    BackupLinkPlan {
        to_delete: to_delete.into_iter().cloned().collect(),
        to_add,
    }
}
