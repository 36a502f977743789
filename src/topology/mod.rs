//! Network topology module.
//!
//! This module contains the topology document served by the API service,
//! the graph model built from it, and the node overrides config documents
//! written back to the network.

pub mod types;
pub mod graph;
pub mod overrides;

// Re-export key types and functions for easier access
pub use types::{Link, LinkType, Node, NodeType, Site, Topology};
pub use graph::{build_topology_graph, EdgeKind, GraphEdge, TopologyGraph, SOURCE};
pub use overrides::{parse_overrides_response, NodeOverrides, OverridesMap};
