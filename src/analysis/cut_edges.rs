//! Cut edge analysis.
//!
//! A cut edge is a wireless bridge of the topology graph whose loss would
//! leave one or more CNs in a component without any PoP. Candidate bridges
//! are checked against a union-find view of the graph that skips the
//! candidate, so the caller's graph is never mutated.

use std::collections::BTreeSet;

use petgraph::graph::{EdgeIndex, NodeIndex, UnGraph};
use petgraph::unionfind::UnionFind;
use petgraph::visit::EdgeRef;

use crate::topology::graph::{EdgeKind, TopologyGraph};

/// An undirected edge between two nodes, endpoints in lexical order
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct CutEdge {
    pub a_node: String,
    pub z_node: String,
}

impl CutEdge {
    pub fn new(a: &str, z: &str) -> Self {
        let (a_node, z_node) = if a <= z { (a, z) } else { (z, a) };
        Self {
            a_node: a_node.to_string(),
            z_node: z_node.to_string(),
        }
    }

    /// Both endpoint names
    pub fn nodes(&self) -> [&str; 2] {
        [&self.a_node, &self.z_node]
    }
}

/// DFS frame used by [`find_bridges`]
struct Frame {
    node: NodeIndex,
    parent_edge: Option<EdgeIndex>,
    edges: Vec<(EdgeIndex, NodeIndex)>,
    cursor: usize,
}

impl Frame {
    fn new<N, E>(graph: &UnGraph<N, E>, node: NodeIndex, parent_edge: Option<EdgeIndex>) -> Self {
        let edges = graph
            .edges(node)
            .map(|edge| {
                let other = if edge.source() == node {
                    edge.target()
                } else {
                    edge.source()
                };
                (edge.id(), other)
            })
            .collect();
        Self {
            node,
            parent_edge,
            edges,
            cursor: 0,
        }
    }
}

/// Find all bridges of an undirected multigraph.
///
/// Iterative DFS with low-link values. The tree edge to the parent is skipped
/// by edge id rather than by vertex, so one of two parallel links is never
/// reported as a bridge. Self-loops are ignored.
pub fn find_bridges<N, E>(graph: &UnGraph<N, E>) -> Vec<EdgeIndex> {
    let n = graph.node_count();
    // 0 means not yet discovered
    let mut discovery = vec![0usize; n];
    let mut low = vec![0usize; n];
    let mut time = 0usize;
    let mut bridges = Vec::new();

    for start in graph.node_indices() {
        if discovery[start.index()] != 0 {
            continue;
        }

        time += 1;
        discovery[start.index()] = time;
        low[start.index()] = time;
        let mut stack = vec![Frame::new(graph, start, None)];

        loop {
            let Some(frame) = stack.last_mut() else {
                break;
            };
            let node = frame.node;

            if let Some(&(edge, next)) = frame.edges.get(frame.cursor) {
                frame.cursor += 1;
                if Some(edge) == frame.parent_edge || next == node {
                    continue;
                }

                if discovery[next.index()] == 0 {
                    time += 1;
                    discovery[next.index()] = time;
                    low[next.index()] = time;
                    stack.push(Frame::new(graph, next, Some(edge)));
                } else {
                    low[node.index()] = low[node.index()].min(discovery[next.index()]);
                }
            } else {
                let parent_edge = frame.parent_edge;
                stack.pop();
                if let (Some(edge), Some(parent)) = (parent_edge, stack.last()) {
                    let parent = parent.node;
                    low[parent.index()] = low[parent.index()].min(low[node.index()]);
                    if low[node.index()] > discovery[parent.index()] {
                        bridges.push(edge);
                    }
                }
            }
        }
    }

    bridges
}

/// Union-find over the graph's vertices, ignoring `skip` and any edge
/// rejected by `keep`.
fn components<N, E>(
    graph: &UnGraph<N, E>,
    skip: Option<EdgeIndex>,
    keep: impl Fn(&E) -> bool,
) -> UnionFind<usize> {
    let mut sets = UnionFind::new(graph.node_count());
    for edge in graph.edge_references() {
        if Some(edge.id()) == skip || !keep(edge.weight()) {
            continue;
        }
        sets.union(edge.source().index(), edge.target().index());
    }
    sets
}

/// Count connected components of the topology without the super-source.
fn count_topology_components(graph: &TopologyGraph) -> usize {
    let inner = graph.inner();
    let sets = components(inner, None, |edge| edge.kind != EdgeKind::Source);
    let roots: BTreeSet<usize> = inner
        .node_indices()
        .filter(|&index| index != graph.source())
        .map(|index| sets.find(index.index()))
        .collect();
    roots.len()
}

/// Find all wireless edges that cut off one or more CNs when lost.
///
/// A wireless bridge touching a CN is always a cut edge. Any other wireless
/// bridge is a cut edge if one of the components it leaves behind contains a
/// CN but no PoP.
pub fn find_cn_cut_edges(graph: &TopologyGraph, cns: &BTreeSet<String>) -> BTreeSet<CutEdge> {
    let mut cut_edges = BTreeSet::new();

    let pops = graph.pops();
    if cns.is_empty() || pops.is_empty() {
        return cut_edges;
    }

    let topology_components = count_topology_components(graph);
    if topology_components > 1 {
        log::warn!(
            "Topology is already split into {} connected components",
            topology_components
        );
    }

    let inner = graph.inner();
    let pop_indices: BTreeSet<usize> = pops
        .iter()
        .filter_map(|name| graph.node_index(name))
        .map(|index| index.index())
        .collect();
    let cn_indices: BTreeSet<usize> = cns
        .iter()
        .filter_map(|name| graph.node_index(name))
        .map(|index| index.index())
        .collect();

    for bridge in find_bridges(inner) {
        if !inner[bridge].is_wireless() {
            continue;
        }
        let Some((a, z)) = inner.edge_endpoints(bridge) else {
            continue;
        };
        let a_name = graph.node_name(a);
        let z_name = graph.node_name(z);

        if cns.contains(a_name) || cns.contains(z_name) {
            cut_edges.insert(CutEdge::new(a_name, z_name));
            continue;
        }

        // Removing a bridge splits exactly one component in two: the sides
        // holding `a` and `z` are the only components not in the baseline.
        let sets = components(inner, Some(bridge), |_| true);
        let isolates_cn = [a, z].iter().any(|side| {
            let root = sets.find(side.index());
            let members = inner
                .node_indices()
                .map(|index| index.index())
                .filter(|&index| sets.find(index) == root);

            let mut has_pop = false;
            let mut has_cn = false;
            for member in members {
                has_pop |= pop_indices.contains(&member);
                has_cn |= cn_indices.contains(&member);
            }
            has_cn && !has_pop
        });

        if isolates_cn {
            cut_edges.insert(CutEdge::new(a_name, z_name));
        }
    }

    cut_edges
}

/// Find cut edges of the live graph and, if given, of its low-uptime pruned
/// variant. The two results are merged.
pub fn find_all_cn_cut_edges(
    graph: &TopologyGraph,
    pruned: Option<&TopologyGraph>,
    cns: &BTreeSet<String>,
) -> BTreeSet<CutEdge> {
    let mut cut_edges = find_cn_cut_edges(graph, cns);
    if let Some(pruned) = pruned {
        cut_edges.extend(find_cn_cut_edges(pruned, cns));
    }
    cut_edges
}
