//! Cut-edge overrides config diffing.
//!
//! Nodes on a cut edge get link impairment detection and a link flap backoff
//! so that a flapping link stays up. Before a node is changed its current
//! values are recorded; once it leaves every cut edge those values are
//! restored and the record dropped.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

use crate::clients::{NodeEntries, OverridesRow, PreviousOverrides};
use crate::topology::{NodeOverrides, OverridesMap};

/// Target values for nodes on a cut edge
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CutEdgeParams {
    pub link_impairment_detection: i64,
    pub link_flap_backoff_ms: String,
}

/// How a write is applied on the controller
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteKind {
    /// Partial patch merged into the node's overrides
    Modify,
    /// Full replacement of the node's overrides
    Set,
}

/// One overrides config write to a single node
#[derive(Debug, Clone, PartialEq)]
pub struct OverridesWrite {
    pub node_name: String,
    pub kind: WriteKind,
    pub overrides: NodeOverrides,
}

impl OverridesWrite {
    fn modify(node_name: &str, overrides: NodeOverrides) -> Self {
        Self {
            node_name: node_name.to_string(),
            kind: WriteKind::Modify,
            overrides,
        }
    }

    fn set(node_name: &str, overrides: NodeOverrides) -> Self {
        Self {
            node_name: node_name.to_string(),
            kind: WriteKind::Set,
            overrides,
        }
    }

    /// Request body document, `{node_name: overrides}`
    pub fn payload(&self) -> OverridesMap {
        OverridesMap::from([(self.node_name.clone(), self.overrides.clone())])
    }
}

/// Everything one network needs after a diff
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ConfigChanges {
    /// Writes in the order they must be applied
    pub writes: Vec<OverridesWrite>,
    /// Pre-change values of updated nodes
    pub to_insert: Vec<OverridesRow>,
    /// History of reverted nodes
    pub to_delete: NodeEntries,
}

impl ConfigChanges {
    pub fn is_empty(&self) -> bool {
        self.writes.is_empty()
    }

    /// Nodes that receive at least one write
    pub fn nodes(&self) -> BTreeSet<&str> {
        self.writes.iter().map(|write| write.node_name.as_str()).collect()
    }

    /// Nodes being moved to the cut-edge values
    pub fn updated_nodes(&self) -> BTreeSet<&str> {
        self.to_insert.iter().map(|row| row.node_name.as_str()).collect()
    }

    /// Nodes being restored to their recorded values
    pub fn reverted_nodes(&self) -> BTreeSet<&str> {
        self.to_delete.nodes.iter().map(String::as_str).collect()
    }
}

/// Compute the config changes of one network.
///
/// `node_set` holds the endpoints of the network's current cut edges,
/// `current` the live overrides of those nodes and of every node in
/// `previous`, and `previous` the recorded values of nodes remediated in an
/// earlier cycle. A node is either updated or reverted, never both.
pub fn prepare_changes(
    network_name: &str,
    node_set: &BTreeSet<String>,
    current: &OverridesMap,
    previous: &BTreeMap<String, PreviousOverrides>,
    params: &CutEdgeParams,
) -> ConfigChanges {
    let mut changes = ConfigChanges::default();
    let mut previous = previous.clone();

    prepare_overrides_config_updates(network_name, node_set, current, &mut previous, params, &mut changes);
    prepare_overrides_config_reverts(network_name, current, &previous, &mut changes);

    changes
}

/// Patch every cut-edge node whose values differ from `params`.
///
/// Nodes still on a cut edge are removed from `previous`: their recorded
/// values stay in the store and they must not be reverted.
pub fn prepare_overrides_config_updates(
    network_name: &str,
    node_set: &BTreeSet<String>,
    current: &OverridesMap,
    previous: &mut BTreeMap<String, PreviousOverrides>,
    params: &CutEdgeParams,
    changes: &mut ConfigChanges,
) {
    let empty = NodeOverrides::default();

    for node_name in node_set {
        let node_overrides = current.get(node_name).unwrap_or(&empty);
        let curr_link_impairment_detection = node_overrides.link_impairment_detection();
        let curr_link_flap_backoff_ms = node_overrides.link_flap_backoff_ms();

        previous.remove(node_name);

        let mut patch = NodeOverrides::default();
        if curr_link_impairment_detection != Some(params.link_impairment_detection) {
            patch.set_link_impairment_detection(params.link_impairment_detection);
        }
        if curr_link_flap_backoff_ms != Some(params.link_flap_backoff_ms.as_str()) {
            patch.set_link_flap_backoff_ms(&params.link_flap_backoff_ms);
        }

        if patch.is_empty() {
            continue;
        }

        changes.to_insert.push(OverridesRow {
            network_name: network_name.to_string(),
            node_name: node_name.clone(),
            link_flap_backoff_ms: curr_link_flap_backoff_ms.map(str::to_string),
            link_impairment_detection: curr_link_impairment_detection,
        });

        log::debug!("Config overrides for {}: {:?}", node_name, patch);
        changes.writes.push(OverridesWrite::modify(node_name, patch));
    }
}

/// Restore the recorded values of nodes no longer on a cut edge.
///
/// A recorded value is restored with a modify. A field that was absent before
/// remediation can only be removed by replacing the whole document, so in
/// that case a set follows carrying the live document with the field removed
/// and every restorable value applied. Nodes absent from `current` are left
/// alone and keep their history rows.
pub fn prepare_overrides_config_reverts(
    network_name: &str,
    current: &OverridesMap,
    previous: &BTreeMap<String, PreviousOverrides>,
    changes: &mut ConfigChanges,
) {
    for (node_name, prev_config) in previous {
        // Without the live document a set would wipe unrelated overrides
        let Some(live) = current.get(node_name) else {
            log::warn!(
                "No current overrides for {} in {}, keeping its recorded values",
                node_name,
                network_name
            );
            continue;
        };

        changes.to_delete.networks.insert(network_name.to_string());
        changes.to_delete.nodes.insert(node_name.clone());

        let mut modify = NodeOverrides::default();
        let mut full = live.clone();
        let mut needs_set = false;

        match prev_config.link_impairment_detection {
            Some(value) => {
                modify.set_link_impairment_detection(value);
                full.set_link_impairment_detection(value);
            }
            None => {
                full.unset_link_impairment_detection();
                needs_set = true;
            }
        }

        match &prev_config.link_flap_backoff_ms {
            Some(value) => {
                modify.set_link_flap_backoff_ms(value);
                full.set_link_flap_backoff_ms(value);
            }
            None => {
                full.unset_link_flap_backoff_ms();
                needs_set = true;
            }
        }

        if !modify.is_empty() {
            changes.writes.push(OverridesWrite::modify(node_name, modify));
        }
        if needs_set {
            changes.writes.push(OverridesWrite::set(node_name, full));
        }
        log::debug!("Reverting overrides config of {} in {}", node_name, network_name);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn params() -> CutEdgeParams {
        CutEdgeParams {
            link_impairment_detection: 1,
            link_flap_backoff_ms: "2000".to_string(),
        }
    }

    fn doc(value: serde_json::Value) -> NodeOverrides {
        serde_json::from_value(value).unwrap()
    }

    fn nodes(names: &[&str]) -> BTreeSet<String> {
        names.iter().map(|name| name.to_string()).collect()
    }

    #[test]
    fn test_update_from_empty_overrides() {
        let current = OverridesMap::from([("x".to_string(), NodeOverrides::default())]);
        let changes = prepare_changes("net", &nodes(&["x"]), &current, &BTreeMap::new(), &params());

        assert_eq!(changes.writes.len(), 1);
        assert_eq!(changes.writes[0].kind, WriteKind::Modify);
        assert_eq!(
            serde_json::to_value(changes.writes[0].payload()).unwrap(),
            json!({"x": {
                "radioParamsBase": {"fwParams": {"linkImpairmentDetectionEnable": 1}},
                "envParams": {"OPENR_LINK_FLAP_MAX_BACKOFF_MS": "2000"}
            }})
        );
        assert_eq!(
            changes.to_insert,
            vec![OverridesRow {
                network_name: "net".to_string(),
                node_name: "x".to_string(),
                link_flap_backoff_ms: None,
                link_impairment_detection: None,
            }]
        );
        assert!(changes.to_delete.is_empty());
    }

    #[test]
    fn test_update_only_differing_field() {
        let current = OverridesMap::from([(
            "x".to_string(),
            doc(json!({"envParams": {"OPENR_LINK_FLAP_MAX_BACKOFF_MS": "2000"}, "radioParamsBase": {"fwParams": {"linkImpairmentDetectionEnable": 0}}})),
        )]);
        let changes = prepare_changes("net", &nodes(&["x"]), &current, &BTreeMap::new(), &params());

        assert_eq!(
            serde_json::to_value(&changes.writes[0].overrides).unwrap(),
            json!({"radioParamsBase": {"fwParams": {"linkImpairmentDetectionEnable": 1}}})
        );
        assert_eq!(changes.to_insert[0].link_impairment_detection, Some(0));
        assert_eq!(changes.to_insert[0].link_flap_backoff_ms.as_deref(), Some("2000"));
    }

    #[test]
    fn test_node_already_configured_needs_nothing() {
        let current = OverridesMap::from([(
            "x".to_string(),
            doc(json!({"envParams": {"OPENR_LINK_FLAP_MAX_BACKOFF_MS": "2000"}, "radioParamsBase": {"fwParams": {"linkImpairmentDetectionEnable": 1}}})),
        )]);
        let previous = BTreeMap::from([("x".to_string(), PreviousOverrides::default())]);
        let changes = prepare_changes("net", &nodes(&["x"]), &current, &previous, &params());

        // Still on a cut edge, so the recorded values are kept
        assert!(changes.is_empty());
        assert!(changes.to_insert.is_empty());
        assert!(changes.to_delete.is_empty());
    }

    #[test]
    fn test_revert_of_absent_fields_uses_set() {
        let current = OverridesMap::from([(
            "x".to_string(),
            doc(json!({
                "radioParamsBase": {"fwParams": {"linkImpairmentDetectionEnable": 1}},
                "envParams": {"OPENR_LINK_FLAP_MAX_BACKOFF_MS": "2000"}
            })),
        )]);
        let previous = BTreeMap::from([("x".to_string(), PreviousOverrides::default())]);
        let changes = prepare_changes("net", &BTreeSet::new(), &current, &previous, &params());

        assert_eq!(changes.writes.len(), 1);
        assert_eq!(changes.writes[0].kind, WriteKind::Set);
        assert_eq!(serde_json::to_value(changes.writes[0].payload()).unwrap(), json!({"x": {}}));
        assert_eq!(changes.to_delete.networks, nodes(&["net"]));
        assert_eq!(changes.to_delete.nodes, nodes(&["x"]));
    }

    #[test]
    fn test_revert_of_recorded_values_uses_modify() {
        let current = OverridesMap::from([(
            "x".to_string(),
            doc(json!({
                "radioParamsBase": {"fwParams": {"linkImpairmentDetectionEnable": 1}},
                "envParams": {"OPENR_LINK_FLAP_MAX_BACKOFF_MS": "2000"}
            })),
        )]);
        let previous = BTreeMap::from([(
            "x".to_string(),
            PreviousOverrides {
                link_flap_backoff_ms: Some("500".to_string()),
                link_impairment_detection: Some(0),
            },
        )]);
        let changes = prepare_changes("net", &BTreeSet::new(), &current, &previous, &params());

        assert_eq!(changes.writes.len(), 1);
        assert_eq!(changes.writes[0].kind, WriteKind::Modify);
        assert_eq!(changes.writes[0].overrides.link_impairment_detection(), Some(0));
        assert_eq!(changes.writes[0].overrides.link_flap_backoff_ms(), Some("500"));
    }

    #[test]
    fn test_mixed_revert_set_carries_restored_value() {
        let current = OverridesMap::from([(
            "x".to_string(),
            doc(json!({
                "radioParamsBase": {"fwParams": {"linkImpairmentDetectionEnable": 1, "txPower": 20}},
                "envParams": {"OPENR_LINK_FLAP_MAX_BACKOFF_MS": "2000"}
            })),
        )]);
        let previous = BTreeMap::from([(
            "x".to_string(),
            PreviousOverrides {
                link_flap_backoff_ms: Some("500".to_string()),
                link_impairment_detection: None,
            },
        )]);
        let changes = prepare_changes("net", &BTreeSet::new(), &current, &previous, &params());

        let kinds: Vec<_> = changes.writes.iter().map(|write| write.kind).collect();
        assert_eq!(kinds, vec![WriteKind::Modify, WriteKind::Set]);
        assert_eq!(
            serde_json::to_value(&changes.writes[1].overrides).unwrap(),
            json!({
                "radioParamsBase": {"fwParams": {"txPower": 20}},
                "envParams": {"OPENR_LINK_FLAP_MAX_BACKOFF_MS": "500"}
            })
        );
    }

    #[test]
    fn test_revert_skips_node_without_live_overrides() {
        let current = OverridesMap::from([("x".to_string(), NodeOverrides::default())]);
        let previous = BTreeMap::from([
            ("gone".to_string(), PreviousOverrides::default()),
            ("x".to_string(), PreviousOverrides::default()),
        ]);
        let changes = prepare_changes("net", &BTreeSet::new(), &current, &previous, &params());

        assert_eq!(changes.nodes(), BTreeSet::from(["x"]));
        assert_eq!(changes.to_delete.nodes, nodes(&["x"]));
        assert!(changes.writes.iter().all(|write| write.node_name != "gone"));
    }

    #[test]
    fn test_updates_and_reverts_are_disjoint() {
        let current = OverridesMap::from([
            ("a".to_string(), NodeOverrides::default()),
            ("b".to_string(), NodeOverrides::default()),
            ("c".to_string(), doc(json!({"envParams": {"OPENR_LINK_FLAP_MAX_BACKOFF_MS": "2000"}}))),
        ]);
        let previous = BTreeMap::from([
            ("b".to_string(), PreviousOverrides::default()),
            ("c".to_string(), PreviousOverrides::default()),
        ]);
        let changes = prepare_changes("net", &nodes(&["a", "b"]), &current, &previous, &params());

        let updated = changes.updated_nodes();
        let reverted = changes.reverted_nodes();
        assert!(updated.is_disjoint(&reverted));
        assert_eq!(updated, BTreeSet::from(["a", "b"]));
        assert_eq!(reverted, BTreeSet::from(["c"]));
        assert_eq!(changes.nodes(), BTreeSet::from(["a", "b", "c"]));
    }
}
