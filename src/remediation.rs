//! Remote application of computed changes.
//!
//! Overrides writes to one network go out strictly one at a time with a
//! delay after each successful write, which bounds the load put on the
//! network's controller. Different networks are driven concurrently by the
//! caller.

use std::collections::BTreeSet;
use std::time::Duration;

use futures::future::join_all;

use crate::analysis::{BackupLinkPlan, OverridesWrite, WriteKind};
use crate::clients::{LinkClient, NodeConfigClient};

/// Apply overrides writes to the nodes of a network, in order.
///
/// A failed write is logged and skipped; the rest of the batch still goes
/// out. Returns the nodes that had at least one failed write.
pub async fn update_overrides_configs(
    client: &dyn NodeConfigClient,
    network_name: &str,
    writes: &[OverridesWrite],
    config_change_delay: Duration,
) -> BTreeSet<String> {
    log::info!("Updating overrides config in {}", network_name);
    let mut failed = BTreeSet::new();

    for (i, write) in writes.iter().enumerate() {
        let payload = write.payload();
        let result = match write.kind {
            WriteKind::Modify => client.modify_node_overrides(network_name, &payload).await,
            WriteKind::Set => client.set_node_overrides(network_name, &payload).await,
        };

        match result {
            Ok(response) => {
                log::info!("Overrides config response in {} is {}", network_name, response);
            }
            Err(e) => {
                log::warn!(
                    "Failed to update node overrides config of {} in {}: {}",
                    write.node_name,
                    network_name,
                    e
                );
                failed.insert(write.node_name.clone());
                continue;
            }
        }

        if i + 1 < writes.len() {
            tokio::time::sleep(config_change_delay).await;
        }
    }

    failed
}

/// Outcome of applying a backup link plan
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BackupLinkReport {
    pub deleted: usize,
    pub added: usize,
    pub failed: usize,
}

/// Replace a network's backup links.
///
/// Old backup links are deleted before the new ones are added. Individual
/// failures are logged and counted.
pub async fn apply_backup_links(
    client: &dyn LinkClient,
    network_name: &str,
    plan: &BackupLinkPlan,
) -> BackupLinkReport {
    let mut report = BackupLinkReport::default();

    let deletions = join_all(plan.to_delete.iter().map(|link| async move {
        log::info!("Deleting backup link {} in {}", link.name, network_name);
        client
            .del_link(network_name, link)
            .await
            .map_err(|e| log::warn!("Failed to delete {} in {}: {}", link.name, network_name, e))
    }))
    .await;
    for result in deletions {
        match result {
            Ok(_) => report.deleted += 1,
            Err(()) => report.failed += 1,
        }
    }

    let additions = join_all(plan.to_add.iter().map(|link| async move {
        log::info!("Adding backup link {} in {}", link.name, network_name);
        client
            .add_link(network_name, link)
            .await
            .map_err(|e| log::warn!("Failed to add {} in {}: {}", link.name, network_name, e))
    }))
    .await;
    for result in additions {
        match result {
            Ok(_) => report.added += 1,
            Err(()) => report.failed += 1,
        }
    }

    report
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::prepare_changes;
    use crate::analysis::CutEdgeParams;
    use crate::clients::ClientError;
    use crate::topology::{Link, LinkType, NodeOverrides, OverridesMap};
    use async_trait::async_trait;
    use serde_json::{json, Value};
    use std::collections::BTreeMap;
    use std::sync::Mutex;
    use tokio::time::Instant;

    #[derive(Default)]
    struct RecordingClient {
        fail_nodes: BTreeSet<String>,
        calls: Mutex<Vec<(String, String, Instant)>>,
    }

    impl RecordingClient {
        fn record(&self, endpoint: &str, overrides: &OverridesMap) -> Result<Value, ClientError> {
            let node = overrides.keys().next().cloned().unwrap_or_default();
            self.calls
                .lock()
                .unwrap()
                .push((endpoint.to_string(), node.clone(), Instant::now()));
            if self.fail_nodes.contains(&node) {
                return Err(ClientError::Status {
                    endpoint: endpoint.to_string(),
                    status: 500,
                });
            }
            Ok(json!({"success": true}))
        }
    }

    #[async_trait]
    impl NodeConfigClient for RecordingClient {
        async fn get_node_overrides(&self, _: &str, _: &BTreeSet<String>) -> Result<OverridesMap, ClientError> {
            Ok(OverridesMap::new())
        }

        async fn modify_node_overrides(&self, _: &str, overrides: &OverridesMap) -> Result<Value, ClientError> {
            self.record("modify", overrides)
        }

        async fn set_node_overrides(&self, _: &str, overrides: &OverridesMap) -> Result<Value, ClientError> {
            self.record("set", overrides)
        }
    }

    #[async_trait]
    impl LinkClient for RecordingClient {
        async fn add_link(&self, _: &str, link: &Link) -> Result<Value, ClientError> {
            self.record("addLink", &OverridesMap::from([(link.name.clone(), NodeOverrides::default())]))
        }

        async fn del_link(&self, _: &str, link: &Link) -> Result<Value, ClientError> {
            self.record("delLink", &OverridesMap::from([(link.name.clone(), NodeOverrides::default())]))
        }
    }

    fn writes(nodes: &[&str]) -> Vec<OverridesWrite> {
        let node_set = nodes.iter().map(|node| node.to_string()).collect();
        let params = CutEdgeParams {
            link_impairment_detection: 1,
            link_flap_backoff_ms: "2000".to_string(),
        };
        prepare_changes("net", &node_set, &OverridesMap::new(), &BTreeMap::new(), &params).writes
    }

    #[tokio::test(start_paused = true)]
    async fn test_writes_are_spaced_by_delay() {
        let client = RecordingClient::default();
        let start = Instant::now();

        let failed = update_overrides_configs(&client, "net", &writes(&["a", "b", "c"]), Duration::from_secs(30)).await;

        assert!(failed.is_empty());
        let calls = client.calls.lock().unwrap();
        let offsets: Vec<u64> = calls.iter().map(|(_, _, at)| (*at - start).as_secs()).collect();
        assert_eq!(offsets, vec![0, 30, 60]);
        assert!(calls.iter().all(|(endpoint, _, _)| endpoint == "modify"));
        // No delay after the last write
        assert_eq!((Instant::now() - start).as_secs(), 60);
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_write_is_skipped_without_delay() {
        let client = RecordingClient {
            fail_nodes: BTreeSet::from(["a".to_string()]),
            ..Default::default()
        };
        let start = Instant::now();

        let failed = update_overrides_configs(&client, "net", &writes(&["a", "b", "c"]), Duration::from_secs(30)).await;

        assert_eq!(failed, BTreeSet::from(["a".to_string()]));
        let calls = client.calls.lock().unwrap();
        let offsets: Vec<u64> = calls.iter().map(|(_, _, at)| (*at - start).as_secs()).collect();
        assert_eq!(offsets, vec![0, 0, 30]);
    }

    #[tokio::test]
    async fn test_set_writes_use_set_endpoint() {
        let client = RecordingClient::default();
        let write = OverridesWrite {
            node_name: "x".to_string(),
            kind: WriteKind::Set,
            overrides: NodeOverrides::default(),
        };
        update_overrides_configs(&client, "net", &[write], Duration::ZERO).await;
        assert_eq!(client.calls.lock().unwrap()[0].0, "set");
    }

    #[tokio::test]
    async fn test_apply_backup_links_deletes_first() {
        let client = RecordingClient {
            fail_nodes: BTreeSet::from(["link-c-d".to_string()]),
            ..Default::default()
        };
        let link = |name: &str| Link {
            name: name.to_string(),
            a_node_name: "a".to_string(),
            z_node_name: "b".to_string(),
            a_node_mac: "mac-a".to_string(),
            z_node_mac: "mac-b".to_string(),
            link_type: LinkType::Wireless,
            is_alive: false,
            linkup_attempts: 0,
            is_backup_cn_link: true,
        };
        let plan = BackupLinkPlan {
            to_delete: vec![link("link-old")],
            to_add: vec![link("link-a-b"), link("link-c-d")],
        };

        let report = apply_backup_links(&client, "net", &plan).await;
        assert_eq!(
            report,
            BackupLinkReport {
                deleted: 1,
                added: 1,
                failed: 1
            }
        );
        let endpoints: Vec<String> = client.calls.lock().unwrap().iter().map(|(e, _, _)| e.clone()).collect();
        assert_eq!(endpoints[0], "delLink");
    }
}
