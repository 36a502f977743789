//! Graph model of a live topology.
//!
//! The graph holds one vertex per node plus a synthetic super-source that is
//! wired to every primary PoP. Parallel links between the same pair of nodes
//! are kept as separate edges, so redundant links are visible to the
//! connectivity analysis.

use std::collections::{BTreeSet, HashMap};

use petgraph::graph::{EdgeIndex, NodeIndex, UnGraph};
use petgraph::visit::EdgeRef;

use super::types::{Link, Topology};

/// Name of the synthetic super-source vertex
pub const SOURCE: &str = "source";

/// Origin of an edge in the topology graph
#[derive(Debug, Clone, PartialEq)]
pub enum EdgeKind {
    /// Wireless link from the topology
    Wireless(Link),
    /// Wired link from the topology
    Wired(Link),
    /// Synthetic edge between the super-source and a primary PoP
    Source,
}

/// Edge weight of the topology graph
#[derive(Debug, Clone, PartialEq)]
pub struct GraphEdge {
    pub name: String,
    pub kind: EdgeKind,
}

impl GraphEdge {
    /// Returns true if the edge is a wireless link
    pub fn is_wireless(&self) -> bool {
        matches!(self.kind, EdgeKind::Wireless(_))
    }

    /// The originating topology link, if the edge is not synthetic
    pub fn link(&self) -> Option<&Link> {
        match &self.kind {
            EdgeKind::Wireless(link) | EdgeKind::Wired(link) => Some(link),
            EdgeKind::Source => None,
        }
    }
}

/// Undirected multigraph over node names plus the super-source
#[derive(Debug, Clone)]
pub struct TopologyGraph {
    graph: UnGraph<String, GraphEdge>,
    index: HashMap<String, NodeIndex>,
    source: NodeIndex,
}

impl TopologyGraph {
    /// Underlying petgraph graph
    pub fn inner(&self) -> &UnGraph<String, GraphEdge> {
        &self.graph
    }

    /// Vertex of the super-source
    pub fn source(&self) -> NodeIndex {
        self.source
    }

    /// Vertex for a node name
    pub fn node_index(&self, name: &str) -> Option<NodeIndex> {
        self.index.get(name).copied()
    }

    /// Node name of a vertex
    pub fn node_name(&self, index: NodeIndex) -> &str {
        &self.graph[index]
    }

    /// Endpoint names of an edge
    pub fn edge_endpoints(&self, edge: EdgeIndex) -> Option<(&str, &str)> {
        self.graph
            .edge_endpoints(edge)
            .map(|(a, z)| (self.node_name(a), self.node_name(z)))
    }

    /// Names of the PoPs connected to the super-source
    pub fn pops(&self) -> BTreeSet<String> {
        self.graph
            .neighbors(self.source)
            .map(|index| self.graph[index].clone())
            .collect()
    }

    /// Wireless links incident to a vertex, in insertion order
    pub fn wireless_links(&self, index: NodeIndex) -> Vec<&Link> {
        let mut edges: Vec<_> = self
            .graph
            .edges(index)
            .filter(|edge| edge.source() != edge.target())
            .filter_map(|edge| match &edge.weight().kind {
                EdgeKind::Wireless(link) => Some((edge.id(), link)),
                _ => None,
            })
            .collect();
        edges.sort_by_key(|(id, _)| *id);
        edges.into_iter().map(|(_, link)| link).collect()
    }

    /// Copy of this graph without the wireless links whose uptime is below
    /// `threshold`. Links absent from `uptimes` count as never online.
    ///
    /// Vertex indices are preserved; edge indices are not.
    pub fn without_low_uptime_links(&self, uptimes: &HashMap<String, f64>, threshold: f64) -> Self {
        let mut removed = 0usize;
        let graph = self.graph.filter_map(
            |_, name| Some(name.clone()),
            |_, edge| {
                if edge.is_wireless() {
                    let uptime = uptimes.get(&edge.name).copied().unwrap_or(0.0);
                    if uptime < threshold {
                        removed += 1;
                        return None;
                    }
                }
                Some(edge.clone())
            },
        );
        log::debug!("Removed {} links with uptime below {}", removed, threshold);

        Self {
            graph,
            index: self.index.clone(),
            source: self.source,
        }
    }
}

/// Build the topology graph and the set of CN names from a topology.
///
/// Every node becomes a vertex, every primary PoP is joined to the
/// super-source with a synthetic `link-source-<pop>` edge, and every link
/// whose endpoints are known becomes an edge carrying the link.
pub fn build_topology_graph(topology: &Topology) -> (TopologyGraph, BTreeSet<String>) {
    let mut graph = UnGraph::new_undirected();
    let mut index = HashMap::new();
    let mut cns = BTreeSet::new();

    let source = graph.add_node(SOURCE.to_string());

    for node in &topology.nodes {
        let vertex = graph.add_node(node.name.clone());
        index.insert(node.name.clone(), vertex);

        if node.is_primary_pop() {
            graph.add_edge(
                source,
                vertex,
                GraphEdge {
                    name: format!("link-source-{}", node.name),
                    kind: EdgeKind::Source,
                },
            );
        }
        if node.is_cn() {
            cns.insert(node.name.clone());
        }
    }

    for link in &topology.links {
        let (Some(&a), Some(&z)) = (index.get(&link.a_node_name), index.get(&link.z_node_name))
        else {
            log::warn!(
                "{}: link {} references an unknown node, skipping",
                topology.name,
                link.name
            );
            continue;
        };

        let kind = if link.is_wireless() {
            EdgeKind::Wireless(link.clone())
        } else {
            EdgeKind::Wired(link.clone())
        };
        graph.add_edge(
            a,
            z,
            GraphEdge {
                name: link.name.clone(),
                kind,
            },
        );
    }

    (
        TopologyGraph {
            graph,
            index,
            source,
        },
        cns,
    )
}


#[cfg(test)]
mod tests {
    use super::test_support::*;
    use super::*;
    use crate::topology::types::{LinkType, NodeType};

    #[test]
    fn test_build_topology_graph() {
        let mut secondary = node("pop2", NodeType::Dn, true);
        secondary.is_primary = false;
        let topology = topology(
            vec![
                node("pop", NodeType::Dn, true),
                secondary,
                node("dn", NodeType::Dn, false),
                node("cn", NodeType::Cn, false),
            ],
            vec![
                wireless("pop", "dn"),
                wireless("dn", "cn"),
                link("link-pop-pop2", "pop", "pop2", LinkType::Ethernet),
            ],
        );

        let (graph, cns) = build_topology_graph(&topology);

        // Source plus four nodes
        assert_eq!(graph.inner().node_count(), 5);
        // Three links plus one source edge (only the primary PoP)
        assert_eq!(graph.inner().edge_count(), 4);
        assert_eq!(cns, BTreeSet::from(["cn".to_string()]));
        assert_eq!(graph.pops(), BTreeSet::from(["pop".to_string()]));

        let source_edge = graph
            .inner()
            .edges(graph.source())
            .next()
            .unwrap();
        assert_eq!(source_edge.weight().name, "link-source-pop");
        assert_eq!(source_edge.weight().kind, EdgeKind::Source);
    }

    #[test]
    fn test_links_to_unknown_nodes_are_skipped() {
        let topology = topology(
            vec![node("pop", NodeType::Dn, true)],
            vec![wireless("pop", "ghost")],
        );
        let (graph, _) = build_topology_graph(&topology);
        assert_eq!(graph.inner().edge_count(), 1);
    }

    #[test]
    fn test_without_low_uptime_links() {
        let topology = topology(
            vec![
                node("pop", NodeType::Dn, true),
                node("dn", NodeType::Dn, false),
                node("cn", NodeType::Cn, false),
            ],
            vec![
                wireless("pop", "dn"),
                wireless("dn", "cn"),
                link("link-pop-dn-wired", "pop", "dn", LinkType::Ethernet),
            ],
        );
        let (graph, _) = build_topology_graph(&topology);

        let uptimes = HashMap::from([("link-pop-dn".to_string(), 0.99)]);
        let pruned = graph.without_low_uptime_links(&uptimes, 0.5);

        // link-dn-cn has no samples and is removed, wired and source edges stay
        let names: BTreeSet<_> = pruned
            .inner()
            .edge_references()
            .map(|edge| edge.weight().name.clone())
            .collect();
        assert_eq!(
            names,
            BTreeSet::from([
                "link-pop-dn".to_string(),
                "link-pop-dn-wired".to_string(),
                "link-source-pop".to_string(),
            ])
        );
        assert_eq!(pruned.node_index("cn"), graph.node_index("cn"));
    }

    #[test]
    fn test_wireless_links_at_node() {
        let topology = topology(
            vec![
                node("pop", NodeType::Dn, true),
                node("dn", NodeType::Dn, false),
                node("cn", NodeType::Cn, false),
            ],
            vec![
                wireless("pop", "dn"),
                wireless("dn", "cn"),
                link("link-dn-cn-wired", "dn", "cn", LinkType::Ethernet),
            ],
        );
        let (graph, _) = build_topology_graph(&topology);
        let dn = graph.node_index("dn").unwrap();

        let names: Vec<_> = graph
            .wireless_links(dn)
            .into_iter()
            .map(|link| link.name.as_str())
            .collect();
        assert_eq!(names, vec!["link-pop-dn", "link-dn-cn"]);
    }
}
