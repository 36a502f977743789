//! Node overrides config documents.
//!
//! Overrides are per-node patches layered over the firmware base config. Only
//! the fields this service reads or writes are typed; every other key is kept
//! in `other` so a full document survives a read-modify-set cycle unchanged.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Overrides config of a single node
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NodeOverrides {
    #[serde(rename = "radioParamsBase", default, skip_serializing_if = "Option::is_none")]
    pub radio_params_base: Option<RadioParamsBase>,
    #[serde(rename = "envParams", default, skip_serializing_if = "Option::is_none")]
    pub env_params: Option<EnvParams>,
    #[serde(rename = "linkParamsOverride", default, skip_serializing_if = "Option::is_none")]
    pub link_params_override: Option<BTreeMap<String, LinkParams>>,
    #[serde(flatten)]
    pub other: Map<String, Value>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RadioParamsBase {
    #[serde(rename = "fwParams", default, skip_serializing_if = "Option::is_none")]
    pub fw_params: Option<FwParams>,
    #[serde(flatten)]
    pub other: Map<String, Value>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FwParams {
    #[serde(
        rename = "linkImpairmentDetectionEnable",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub link_impairment_detection_enable: Option<i64>,
    #[serde(flatten)]
    pub other: Map<String, Value>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EnvParams {
    #[serde(
        rename = "OPENR_LINK_FLAP_MAX_BACKOFF_MS",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub openr_link_flap_max_backoff_ms: Option<String>,
    #[serde(flatten)]
    pub other: Map<String, Value>,
}

/// Per-peer link parameters, keyed by peer MAC in `linkParamsOverride`
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LinkParams {
    #[serde(rename = "airtimeConfig", default, skip_serializing_if = "Option::is_none")]
    pub airtime_config: Option<AirtimeConfig>,
    #[serde(flatten)]
    pub other: Map<String, Value>,
}

/// Airtime allocation of a link direction, in 1/10000 units
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AirtimeConfig {
    #[serde(rename = "txIdeal", default, skip_serializing_if = "Option::is_none")]
    pub tx_ideal: Option<i64>,
    #[serde(rename = "rxIdeal", default, skip_serializing_if = "Option::is_none")]
    pub rx_ideal: Option<i64>,
    #[serde(flatten)]
    pub other: Map<String, Value>,
}

impl NodeOverrides {
    /// Current `linkImpairmentDetectionEnable`, if set
    pub fn link_impairment_detection(&self) -> Option<i64> {
        self.radio_params_base
            .as_ref()
            .and_then(|radio| radio.fw_params.as_ref())
            .and_then(|fw| fw.link_impairment_detection_enable)
    }

    /// Current `OPENR_LINK_FLAP_MAX_BACKOFF_MS`, if set
    pub fn link_flap_backoff_ms(&self) -> Option<&str> {
        self.env_params
            .as_ref()
            .and_then(|env| env.openr_link_flap_max_backoff_ms.as_deref())
    }

    pub fn set_link_impairment_detection(&mut self, value: i64) {
        self.radio_params_base
            .get_or_insert_with(Default::default)
            .fw_params
            .get_or_insert_with(Default::default)
            .link_impairment_detection_enable = Some(value);
    }

    pub fn set_link_flap_backoff_ms(&mut self, value: &str) {
        self.env_params
            .get_or_insert_with(Default::default)
            .openr_link_flap_max_backoff_ms = Some(value.to_string());
    }

    /// Remove `linkImpairmentDetectionEnable`, dropping any object level left empty
    pub fn unset_link_impairment_detection(&mut self) {
        if let Some(radio) = self.radio_params_base.as_mut() {
            if let Some(fw) = radio.fw_params.as_mut() {
                fw.link_impairment_detection_enable = None;
                if fw.other.is_empty() {
                    radio.fw_params = None;
                }
            }
            if radio.fw_params.is_none() && radio.other.is_empty() {
                self.radio_params_base = None;
            }
        }
    }

    /// Remove `OPENR_LINK_FLAP_MAX_BACKOFF_MS`, dropping `envParams` if left empty
    pub fn unset_link_flap_backoff_ms(&mut self) {
        if let Some(env) = self.env_params.as_mut() {
            env.openr_link_flap_max_backoff_ms = None;
            if env.other.is_empty() {
                self.env_params = None;
            }
        }
    }

    /// Set `txIdeal` and `rxIdeal` towards a peer
    pub fn set_airtime(&mut self, peer_mac: &str, tideal: i64) {
        let params = self
            .link_params_override
            .get_or_insert_with(Default::default)
            .entry(peer_mac.to_string())
            .or_default();
        params.airtime_config = Some(AirtimeConfig {
            tx_ideal: Some(tideal),
            rx_ideal: Some(tideal),
            other: Map::new(),
        });
    }

    /// Returns true if the document carries no key at all
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }

    /// This document with a partial `patch` merged in, the way the
    /// controller applies a modify request
    pub fn merged(&self, patch: &NodeOverrides) -> Result<NodeOverrides, serde_json::Error> {
        let mut target = serde_json::to_value(self)?;
        deep_update(&mut target, &serde_json::to_value(patch)?);
        serde_json::from_value(target)
    }
}

/// Recursively merge `patch` into `target`. Objects are merged key by key,
/// any other value replaces what was there.
pub fn deep_update(target: &mut Value, patch: &Value) {
    match (target, patch) {
        (Value::Object(target), Value::Object(patch)) => {
            for (key, value) in patch {
                match target.get_mut(key) {
                    Some(existing) => deep_update(existing, value),
                    None => {
                        target.insert(key.clone(), value.clone());
                    }
                }
            }
        }
        (target, patch) => *target = patch.clone(),
    }
}

/// Overrides of several nodes, keyed by node name
pub type OverridesMap = BTreeMap<String, NodeOverrides>;

/// Parse the `overrides` string returned by `getNodeOverridesConfig`.
///
/// The string is a JSON object keyed by node name. A node without overrides
/// maps to an empty string rather than an object, and an empty response
/// string means no node has overrides.
pub fn parse_overrides_response(raw: &str) -> Result<OverridesMap, serde_json::Error> {
    if raw.trim().is_empty() {
        return Ok(OverridesMap::new());
    }

    let nodes: BTreeMap<String, Value> = serde_json::from_str(raw)?;
    let mut overrides = OverridesMap::new();
    for (node_name, value) in nodes {
        let node_overrides = match value {
            Value::String(s) if s.is_empty() => NodeOverrides::default(),
            Value::String(s) => serde_json::from_str(&s)?,
            Value::Null => NodeOverrides::default(),
            other => serde_json::from_value(other)?,
        };
        overrides.insert(node_name, node_overrides);
    }
    Ok(overrides)
}
