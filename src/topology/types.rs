//! Topology document types.
//!
//! This file contains the typed form of the topology document served by the
//! API service: nodes, links and sites of one network.

use serde::{Deserialize, Serialize};

/// Role of a node in the mesh
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub enum NodeType {
    /// Client node, a leaf that must stay reachable
    Cn,
    /// Distribution node, part of the backbone
    Dn,
}

impl TryFrom<u8> for NodeType {
    type Error = String;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            1 => Ok(Self::Cn),
            2 => Ok(Self::Dn),
            other => Err(format!("Unknown node type {}", other)),
        }
    }
}

impl From<NodeType> for u8 {
    fn from(value: NodeType) -> Self {
        match value {
            NodeType::Cn => 1,
            NodeType::Dn => 2,
        }
    }
}

/// Physical medium of a link
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub enum LinkType {
    Wireless,
    Ethernet,
}

impl TryFrom<u8> for LinkType {
    type Error = String;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            1 => Ok(Self::Wireless),
            2 => Ok(Self::Ethernet),
            other => Err(format!("Unknown link type {}", other)),
        }
    }
}

impl From<LinkType> for u8 {
    fn from(value: LinkType) -> Self {
        match value {
            LinkType::Wireless => 1,
            LinkType::Ethernet => 2,
        }
    }
}

/// A node of the topology
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Node {
    pub name: String,
    pub node_type: NodeType,
    #[serde(default)]
    pub mac_addr: String,
    #[serde(default)]
    pub wlan_mac_addrs: Vec<String>,
    #[serde(default)]
    pub pop_node: bool,
    #[serde(default)]
    pub is_primary: bool,
    #[serde(default)]
    pub site_name: String,
}

impl Node {
    /// Returns true if this node is a CN
    pub fn is_cn(&self) -> bool {
        self.node_type == NodeType::Cn
    }

    /// Returns true if this node anchors reachability in the graph model
    pub fn is_primary_pop(&self) -> bool {
        self.pop_node && self.is_primary
    }

    /// All MAC addresses of the node, node MAC first
    pub fn mac_addrs(&self) -> impl Iterator<Item = &str> {
        std::iter::once(self.mac_addr.as_str())
            .chain(self.wlan_mac_addrs.iter().map(String::as_str))
            .filter(|mac| !mac.is_empty())
    }
}

/// A link between two nodes
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Link {
    pub name: String,
    pub a_node_name: String,
    pub z_node_name: String,
    #[serde(default)]
    pub a_node_mac: String,
    #[serde(default)]
    pub z_node_mac: String,
    pub link_type: LinkType,
    #[serde(default)]
    pub is_alive: bool,
    #[serde(default)]
    pub linkup_attempts: u64,
    #[serde(default)]
    pub is_backup_cn_link: bool,
}

impl Link {
    /// Returns true if this is a wireless link
    pub fn is_wireless(&self) -> bool {
        self.link_type == LinkType::Wireless
    }

    /// MAC address of the far end as seen from `node_name`
    pub fn peer_mac(&self, node_name: &str) -> &str {
        if self.a_node_name == node_name {
            &self.z_node_mac
        } else {
            &self.a_node_mac
        }
    }
}

/// Geographic location of a site
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Location {
    #[serde(default)]
    pub latitude: f64,
    #[serde(default)]
    pub longitude: f64,
    #[serde(default)]
    pub altitude: f64,
    #[serde(default)]
    pub accuracy: f64,
}

/// A site hosting one or more nodes
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Site {
    pub name: String,
    #[serde(default)]
    pub location: Location,
}

/// Topology of one network
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Topology {
    pub name: String,
    #[serde(default)]
    pub nodes: Vec<Node>,
    #[serde(default)]
    pub links: Vec<Link>,
    #[serde(default)]
    pub sites: Vec<Site>,
}

impl Topology {
    /// Drop nodes without a MAC address and links missing either end's MAC.
    ///
    /// Entries without MACs cannot be addressed by config overrides, so they
    /// never enter the analysis.
    pub fn drop_entries_without_mac(&mut self) {
        let nodes_before = self.nodes.len();
        let links_before = self.links.len();

        self.nodes.retain(|node| node.mac_addrs().next().is_some());
        self.links
            .retain(|link| !link.a_node_mac.is_empty() && !link.z_node_mac.is_empty());

        let dropped_nodes = nodes_before - self.nodes.len();
        let dropped_links = links_before - self.links.len();
        if dropped_nodes > 0 || dropped_links > 0 {
            log::warn!(
                "{}: ignoring {} nodes and {} links without MAC addresses",
                self.name,
                dropped_nodes,
                dropped_links
            );
        }
    }
}
