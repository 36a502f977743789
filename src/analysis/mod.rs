//! Network optimization analyses.
//!
//! Cut-edge remediation (`cut_edges`, `uptime`, `overrides_diff`), airtime
//! optimization (`p2mp`, `flow_graph`, `tideal`) and backup link selection.
//! Everything here is computation over data already fetched; collaborator
//! calls live in `clients` and `orchestrator`.

pub mod cut_edges;
pub mod uptime;
pub mod overrides_diff;
pub mod p2mp;
pub mod flow_graph;
pub mod tideal;
pub mod backup_links;

pub use cut_edges::{find_all_cn_cut_edges, find_bridges, find_cn_cut_edges, CutEdge};
pub use uptime::{get_link_uptime, link_uptime_query};
pub use overrides_diff::{prepare_changes, ConfigChanges, CutEdgeParams, OverridesWrite, WriteKind};
pub use p2mp::find_all_p2mp;
pub use flow_graph::{estimate_capacity, FlowGraph, FlowSolution, SolvedEdge};
pub use tideal::{create_tideal_configs, run_tideal_optimization};
pub use backup_links::{select_backup_links, BackupLinkPlan, ScanConnectivity};
