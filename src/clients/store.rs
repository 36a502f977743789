//! SQLite-backed override history.
//!
//! One table, `cut_edge_overrides_config`, holds the values a node had before
//! remediation. Rows accumulate as history; the latest row (highest id) per
//! (network, node) is the restore point.

use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;
use chrono::Utc;
use rusqlite::{params, params_from_iter, Connection};

use super::{NodeEntries, OverridesRow, OverridesStore, PreviousOverrides, PreviousOverridesMap, StoreError};

/// Override history kept in a SQLite database
#[derive(Clone)]
pub struct SqliteOverridesStore {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteOverridesStore {
    /// Create an in-memory store
    pub fn new_in_memory() -> Result<Self, StoreError> {
        let conn = Connection::open_in_memory()?;
        Self::init_with_connection(conn)
    }

    /// Create or open a file-backed store
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, StoreError> {
        let conn = Connection::open(path)?;
        Self::init_with_connection(conn)
    }

    fn init_with_connection(conn: Connection) -> Result<Self, StoreError> {
        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS cut_edge_overrides_config (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                network_name TEXT NOT NULL,
                node_name TEXT NOT NULL,
                link_flap_backoff_ms TEXT,
                link_impairment_detection INTEGER,
                last_updated TEXT NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_overrides_network_node
                ON cut_edge_overrides_config(network_name, node_name);
            "#,
        )?;

        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    fn lock(&self) -> Result<MutexGuard<'_, Connection>, StoreError> {
        self.conn.lock().map_err(|_| StoreError::Poisoned)
    }

    /// Total number of history rows
    pub fn row_count(&self) -> Result<usize, StoreError> {
        let conn = self.lock()?;
        let count: usize = conn.query_row("SELECT COUNT(*) FROM cut_edge_overrides_config", [], |row| row.get(0))?;
        Ok(count)
    }
}

/// `?,?,?` for an `IN (...)` clause
fn placeholders(count: usize) -> String {
    vec!["?"; count].join(",")
}

#[async_trait]
impl OverridesStore for SqliteOverridesStore {
    async fn latest_overrides(&self, networks: &[String]) -> Result<PreviousOverridesMap, StoreError> {
        let mut previous = PreviousOverridesMap::new();
        if networks.is_empty() {
            return Ok(previous);
        }

        let sql = format!(
            "SELECT network_name, node_name, link_flap_backoff_ms, link_impairment_detection
             FROM cut_edge_overrides_config
             WHERE id IN (
                 SELECT MAX(id) FROM cut_edge_overrides_config
                 WHERE network_name IN ({})
                 GROUP BY network_name, node_name
             )",
            placeholders(networks.len())
        );

        let conn = self.lock()?;
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt.query_map(params_from_iter(networks.iter()), |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, String>(1)?,
                PreviousOverrides {
                    link_flap_backoff_ms: row.get(2)?,
                    link_impairment_detection: row.get(3)?,
                },
            ))
        })?;

        for row in rows {
            let (network_name, node_name, values) = row?;
            previous.entry(network_name).or_default().insert(node_name, values);
        }

        Ok(previous)
    }

    async fn insert_overrides(&self, rows: &[OverridesRow]) -> Result<(), StoreError> {
        if rows.is_empty() {
            return Ok(());
        }

        let mut conn = self.lock()?;
        let tx = conn.transaction()?;
        {
            let mut stmt = tx.prepare(
                "INSERT INTO cut_edge_overrides_config
                 (network_name, node_name, link_flap_backoff_ms, link_impairment_detection, last_updated)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
            )?;
            let now = Utc::now().to_rfc3339();
            for row in rows {
                stmt.execute(params![
                    row.network_name,
                    row.node_name,
                    row.link_flap_backoff_ms,
                    row.link_impairment_detection,
                    now,
                ])?;
            }
        }
        tx.commit()?;

        log::debug!("Inserted {} override history rows", rows.len());
        Ok(())
    }

    async fn delete_node_entries(&self, entries: &NodeEntries) -> Result<(), StoreError> {
        if entries.is_empty() {
            return Ok(());
        }

        let sql = format!(
            "DELETE FROM cut_edge_overrides_config WHERE network_name IN ({}) AND node_name IN ({})",
            placeholders(entries.networks.len()),
            placeholders(entries.nodes.len())
        );

        let conn = self.lock()?;
        let deleted = conn.execute(&sql, params_from_iter(entries.networks.iter().chain(entries.nodes.iter())))?;

        log::debug!("Deleted {} override history rows", deleted);
        Ok(())
    }
}
