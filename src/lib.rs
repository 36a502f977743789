//! # Meshopt - Cut-edge remediation and airtime optimization for wireless mesh networks
//!
//! This library analyzes the live topology of wireless mesh networks and
//! pushes configuration back to the nodes.
//!
//! ## Overview
//!
//! Two analyses run periodically for every network:
//!
//! - **Cut-edge remediation**: wireless links whose loss would cut client
//!   nodes (CNs) off from every PoP are found. Nodes on those links get link
//!   impairment detection and a link flap backoff; their previous values are
//!   recorded and restored once the link stops being a cut edge.
//! - **Airtime optimization**: a max-min fairness linear program over the
//!   topology computes how point-to-multipoint radios should split their
//!   airtime, written as `txIdeal`/`rxIdeal` overrides.
//!
//! A one-shot backup link selection from interference scan results is also
//! available.
//!
//! ## Architecture
//!
//! - `topology`: Topology document, graph model and node overrides documents
//! - `analysis`: Cut edges, uptime, overrides diffing, P2MP grouping, flow LP, tideal
//! - `clients`: Collaborator traits and their HTTP/SQLite adapters
//! - `remediation`: Sequenced remote writes
//! - `orchestrator`: Per-cycle driver with per-network isolation
//! - `config`: Service configuration structures and validation
//! - `config_loader`: Configuration file loading
//!
//! ## Example Usage
//!
//! ```rust,no_run
//! use meshopt::analysis::{find_cn_cut_edges, run_tideal_optimization};
//! use meshopt::topology::{build_topology_graph, Topology};
//!
//! let topology: Topology = serde_json::from_str(&std::fs::read_to_string("topology.json")?)?;
//!
//! let (graph, cns) = build_topology_graph(&topology);
//! for edge in find_cn_cut_edges(&graph, &cns) {
//!     println!("{} - {}", edge.a_node, edge.z_node);
//! }
//!
//! if let Some(overrides) = run_tideal_optimization(&topology, 1000.0, 10000.0) {
//!     println!("{}", serde_json::to_string_pretty(&overrides)?);
//! }
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```
//!
//! ## Error Handling
//!
//! Collaborator adapters return typed errors (`ClientError`, `StoreError`).
//! The analyses themselves are infallible: anomalies are logged and produce
//! empty results. The binary uses `color_eyre` for startup failures.

pub mod config;
pub mod config_loader;
pub mod topology;
pub mod analysis;
pub mod clients;
pub mod remediation;
pub mod orchestrator;
