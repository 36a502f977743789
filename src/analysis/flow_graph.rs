//! Flow network capacity estimation.
//!
//! The topology is turned into a flow network fed by the super-source. Every
//! link carries a signed flow bounded by its capacity; links of a
//! point-to-multipoint radio are additionally bounded by the share of airtime
//! the radio gives them. A max-min fairness linear program then finds the
//! largest throughput every CN can receive at the same time.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::fmt::Display;

use good_lp::{constraint, variable, Expression, ProblemVariables, Solution, Solver, SolverModel, Variable};
use serde::Serialize;

use super::p2mp::find_all_p2mp;
use crate::topology::{EdgeKind, TopologyGraph};

/// Role of a vertex in the flow network
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlowNodeKind {
    /// The super-source
    Source,
    /// A CN consuming flow
    Sink,
    /// Any other node; inflow equals outflow
    Relay,
}

impl FlowNodeKind {
    /// Whether the node's net flow is an unknown rather than zero
    fn has_net_flow(self) -> bool {
        !matches!(self, Self::Relay)
    }
}

/// Edge of the flow network
#[derive(Debug, Clone, PartialEq)]
pub struct FlowEdge {
    pub name: String,
    pub a_node: String,
    pub z_node: String,
    /// Capacity in Mbps
    pub capacity: f64,
    /// Whether the edge draws on the airtime of a P2MP radio
    pub share_time: bool,
}

/// Flow network built from a topology graph
#[derive(Debug, Clone)]
pub struct FlowGraph {
    nodes: BTreeMap<String, FlowNodeKind>,
    edges: Vec<FlowEdge>,
    /// Nodes whose radio airtime is split across their shared edges
    p2mp_nodes: BTreeSet<String>,
}

/// Solved values of one edge
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SolvedEdge {
    /// Signed flow from `a_node` to `z_node`
    pub flow: f64,
    /// Airtime share, only for edges with `share_time`
    pub time: Option<f64>,
    pub capacity: f64,
    pub share_time: bool,
}

/// Result of a successful optimization
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FlowSolution {
    /// Throughput every CN receives simultaneously, in Mbps
    pub result: f64,
    /// Solved edges keyed by link name
    pub edges: BTreeMap<String, SolvedEdge>,
}

impl FlowSolution {
    /// Solved airtime share of a link, if it has one
    pub fn time(&self, link_name: &str) -> Option<f64> {
        self.edges.get(link_name).and_then(|edge| edge.time)
    }
}

/// Decision variables of one edge
struct EdgeVars {
    flow: Variable,
    time: Option<Variable>,
}

impl FlowGraph {
    /// Build the flow network.
    ///
    /// Wireless links get `wireless_capacity_mbps`, wired links and the
    /// synthetic source links get `wired_capacity_mbps`. A wireless link
    /// shares time when either endpoint is a P2MP node.
    pub fn build(
        graph: &TopologyGraph,
        cns: &BTreeSet<String>,
        wireless_capacity_mbps: f64,
        wired_capacity_mbps: f64,
    ) -> Self {
        let p2mp_nodes: BTreeSet<String> = find_all_p2mp(graph).into_keys().collect();
        let inner = graph.inner();

        let nodes = inner
            .node_indices()
            .map(|index| {
                let name = inner[index].clone();
                let kind = if index == graph.source() {
                    FlowNodeKind::Source
                } else if cns.contains(&name) {
                    FlowNodeKind::Sink
                } else {
                    FlowNodeKind::Relay
                };
                (name, kind)
            })
            .collect();

        let mut edges = Vec::new();
        for edge in inner.edge_indices() {
            let Some((a_node, z_node)) = graph.edge_endpoints(edge) else {
                continue;
            };
            if a_node == z_node {
                continue;
            }

            let weight = &inner[edge];
            let (capacity, share_time) = match &weight.kind {
                EdgeKind::Wireless(_) => (
                    wireless_capacity_mbps,
                    p2mp_nodes.contains(a_node) || p2mp_nodes.contains(z_node),
                ),
                EdgeKind::Wired(_) | EdgeKind::Source => (wired_capacity_mbps, false),
            };

            edges.push(FlowEdge {
                name: weight.name.clone(),
                a_node: a_node.to_string(),
                z_node: z_node.to_string(),
                capacity,
                share_time,
            });
        }

        Self {
            nodes,
            edges,
            p2mp_nodes,
        }
    }

    pub fn edges(&self) -> &[FlowEdge] {
        &self.edges
    }

    pub fn p2mp_nodes(&self) -> &BTreeSet<String> {
        &self.p2mp_nodes
    }

    fn sinks(&self) -> impl Iterator<Item = &str> {
        self.nodes
            .iter()
            .filter(|(_, kind)| **kind == FlowNodeKind::Sink)
            .map(|(name, _)| name.as_str())
    }

    /// Solve with the bundled pure-Rust LP solver
    pub fn solve(&self) -> Option<FlowSolution> {
        self.solve_with(good_lp::microlp)
    }

    /// Solve the max-min fairness program with `solver`.
    ///
    /// Returns `None` when there is no CN, when the solver fails, or when no
    /// CN can receive any traffic.
    pub fn solve_with<S>(&self, solver: S) -> Option<FlowSolution>
    where
        S: Solver,
        <S::Model as SolverModel>::Error: Display,
    {
        if self.sinks().next().is_none() {
            log::debug!("Flow graph has no sink");
            return None;
        }

        let mut vars = ProblemVariables::new();
        let t = vars.add(variable());

        let net_flow: HashMap<&str, Variable> = self
            .nodes
            .iter()
            .filter(|(_, kind)| kind.has_net_flow())
            .map(|(name, _)| (name.as_str(), vars.add(variable())))
            .collect();

        let edge_vars: Vec<EdgeVars> = self
            .edges
            .iter()
            .map(|edge| EdgeVars {
                flow: vars.add(variable()),
                time: edge.share_time.then(|| vars.add(variable().min(0.0).max(1.0))),
            })
            .collect();

        let mut model = vars.maximise(t).using(solver);

        // Flow conservation, outgoing flow counted positive
        let mut balance: BTreeMap<&str, Expression> = self
            .nodes
            .keys()
            .map(|name| (name.as_str(), Expression::from(0.0)))
            .collect();
        for (edge, ev) in self.edges.iter().zip(&edge_vars) {
            if let Some(expr) = balance.get_mut(edge.a_node.as_str()) {
                *expr += ev.flow;
            }
            if let Some(expr) = balance.get_mut(edge.z_node.as_str()) {
                *expr -= ev.flow;
            }
        }
        for (name, expr) in balance {
            let rhs = match net_flow.get(name) {
                Some(&v) => Expression::from(v),
                None => Expression::from(0.0),
            };
            model = model.with(constraint!(expr == rhs));
        }

        // Every CN receives at least t
        for sink in self.sinks() {
            if let Some(&v) = net_flow.get(sink) {
                model = model.with(constraint!(t + v <= 0.0));
            }
        }

        // |flow| <= time * capacity, or capacity without a time share
        for (edge, ev) in self.edges.iter().zip(&edge_vars) {
            let bound = match ev.time {
                Some(time) => time * edge.capacity,
                None => Expression::from(edge.capacity),
            };
            model = model
                .with(constraint!(ev.flow <= bound.clone()))
                .with(constraint!(bound + ev.flow >= 0.0));
        }

        // Airtime budget of every P2MP radio
        for node in &self.p2mp_nodes {
            let times: Vec<Variable> = self
                .edges
                .iter()
                .zip(&edge_vars)
                .filter(|(edge, _)| edge.share_time && (edge.a_node == *node || edge.z_node == *node))
                .filter_map(|(_, ev)| ev.time)
                .collect();
            if times.len() < 2 {
                continue;
            }
            let mut total = Expression::from(0.0);
            for time in times {
                total += time;
            }
            model = model.with(constraint!(total <= 1.0));
        }

        let solution = match model.solve() {
            Ok(solution) => solution,
            Err(e) => {
                log::warn!("Flow optimization failed: {}", e);
                return None;
            }
        };

        let result = solution.value(t);
        if !result.is_finite() || result <= 0.0 {
            log::info!("Flow optimization found no positive throughput");
            return None;
        }

        let edges = self
            .edges
            .iter()
            .zip(&edge_vars)
            .map(|(edge, ev)| {
                (
                    edge.name.clone(),
                    SolvedEdge {
                        flow: solution.value(ev.flow),
                        time: ev.time.map(|time| solution.value(time)),
                        capacity: edge.capacity,
                        share_time: edge.share_time,
                    },
                )
            })
            .collect();

        Some(FlowSolution { result, edges })
    }
}

/// Estimate the throughput simultaneously deliverable to every CN.
///
/// Returns `None` when there is no CN, no PoP feeds the super-source, or the
/// program has no useful solution.
pub fn estimate_capacity(
    graph: &TopologyGraph,
    cns: &BTreeSet<String>,
    wireless_capacity_mbps: f64,
    wired_capacity_mbps: f64,
) -> Option<FlowSolution> {
    if cns.is_empty() {
        return None;
    }
    if graph.pops().is_empty() {
        log::info!("No PoP feeds the flow network");
        return None;
    }

    let flow_graph = FlowGraph::build(graph, cns, wireless_capacity_mbps, wired_capacity_mbps);
    log::debug!(
        "Flow graph has {} edges, {} of them sharing airtime",
        flow_graph.edges.len(),
        flow_graph.edges.iter().filter(|edge| edge.share_time).count()
    );
    flow_graph.solve()
}
