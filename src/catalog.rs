//! Catalog records for shard metadata
//!
//! A catalog record describes one shard: its physical table name, an
//! optional host override, and whether the physical table is believed to
//! exist. The record and the table are two independently owned resources
//! with no transactional linkage, so they can drift apart under failure;
//! the `has_storage` flag reflects what this library last observed, not
//! a guarantee.

use chrono::{DateTime, Utc};
use rusqlite::Connection;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{ShardError, ShardResult};

/// Metadata for a single shard, persisted via a [`CatalogStore`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CatalogRecord {
    /// Store-assigned identifier, set on first save.
    pub id: Option<i64>,

    /// When the record was created.
    pub date_created: DateTime<Utc>,

    /// When the record was last saved.
    pub date_updated: DateTime<Utc>,

    /// Host override for this shard. When `None`, the configured default
    /// host is used.
    pub db_host: Option<String>,

    /// Explicit physical table name. When `None`, the name is derived
    /// from the layout's legacy identifier.
    pub db_table: Option<String>,

    /// True iff the physical table is believed to exist. Flips true only
    /// after an observed successful `CREATE TABLE`, false only after an
    /// observed successful `DROP TABLE`.
    pub has_storage: bool,
}

impl CatalogRecord {
    /// Create a fresh record with both timestamps set to now.
    pub fn new() -> Self {
        let now = Utc::now();
        Self {
            id: None,
            date_created: now,
            date_updated: now,
            db_host: None,
            db_table: None,
            has_storage: false,
        }
    }

    /// Set an explicit physical table name.
    pub fn with_table(mut self, table: impl Into<String>) -> Self {
        self.db_table = Some(table.into());
        self
    }

    /// Set a host override for this shard.
    pub fn with_host(mut self, host: impl Into<String>) -> Self {
        self.db_host = Some(host.into());
        self
    }
}

impl Default for CatalogRecord {
    fn default() -> Self {
        Self::new()
    }
}

/// Persistence for catalog records.
///
/// `save` stamps `date_updated` and assigns an `id` on first save;
/// `load` returns `None` for an unknown id.
pub trait CatalogStore {
    fn save(&mut self, record: &mut CatalogRecord) -> ShardResult<()>;
    fn load(&self, id: i64) -> ShardResult<Option<CatalogRecord>>;
}

/// SQL for creating the catalog table
const CATALOG_TABLE: &str = r#"
    CREATE TABLE IF NOT EXISTS shard_catalog (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        date_created TEXT NOT NULL,
        date_updated TEXT NOT NULL,
        db_host TEXT,
        db_table TEXT,
        has_storage INTEGER NOT NULL DEFAULT 0
    );
"#;

/// SQLite-backed catalog store.
///
/// Records live in a `shard_catalog` table, created on open if missing.
/// This store keeps its own connection open; it is independent of the
/// per-operation connections used against shard tables.
pub struct SqliteCatalog {
    conn: Connection,
}

impl SqliteCatalog {
    /// Open a catalog store at the specified path, creating the catalog
    /// table if needed.
    pub fn open(path: &str) -> ShardResult<Self> {
        let conn = Connection::open(path)
            .map_err(|e| ShardError::Catalog(format!("cannot open catalog at '{}': {}", path, e)))?;
        Self::from_connection(conn)
    }

    /// Open an in-memory catalog store.
    pub fn open_in_memory() -> ShardResult<Self> {
        let conn = Connection::open_in_memory()
            .map_err(|e| ShardError::Catalog(format!("cannot open in-memory catalog: {}", e)))?;
        Self::from_connection(conn)
    }

    fn from_connection(conn: Connection) -> ShardResult<Self> {
        conn.execute(CATALOG_TABLE, [])
            .map_err(|e| ShardError::Catalog(format!("cannot create catalog table: {}", e)))?;
        Ok(Self { conn })
    }

    fn record_from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<(i64, String, String, Option<String>, Option<String>, bool)> {
        Ok((
            row.get(0)?,
            row.get(1)?,
            row.get(2)?,
            row.get(3)?,
            row.get(4)?,
            row.get(5)?,
        ))
    }
}

fn parse_timestamp(raw: &str) -> ShardResult<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .map(|t| t.with_timezone(&Utc))
        .map_err(|e| ShardError::Catalog(format!("invalid timestamp '{}': {}", raw, e)))
}

impl CatalogStore for SqliteCatalog {
    fn save(&mut self, record: &mut CatalogRecord) -> ShardResult<()> {
        record.date_updated = Utc::now();

        match record.id {
            Some(id) => {
                self.conn
                    .execute(
                        "UPDATE shard_catalog
                         SET date_updated = ?1, db_host = ?2, db_table = ?3, has_storage = ?4
                         WHERE id = ?5",
                        rusqlite::params![
                            record.date_updated.to_rfc3339(),
                            record.db_host,
                            record.db_table,
                            record.has_storage,
                            id,
                        ],
                    )
                    .map_err(|e| ShardError::Catalog(format!("cannot update record {}: {}", id, e)))?;
                debug!(id, "updated catalog record");
            }
            None => {
                self.conn
                    .execute(
                        "INSERT INTO shard_catalog
                         (date_created, date_updated, db_host, db_table, has_storage)
                         VALUES (?1, ?2, ?3, ?4, ?5)",
                        rusqlite::params![
                            record.date_created.to_rfc3339(),
                            record.date_updated.to_rfc3339(),
                            record.db_host,
                            record.db_table,
                            record.has_storage,
                        ],
                    )
                    .map_err(|e| ShardError::Catalog(format!("cannot insert record: {}", e)))?;
                let id = self.conn.last_insert_rowid();
                record.id = Some(id);
                debug!(id, "inserted catalog record");
            }
        }

        Ok(())
    }

    fn load(&self, id: i64) -> ShardResult<Option<CatalogRecord>> {
        let result = self.conn.query_row(
            "SELECT id, date_created, date_updated, db_host, db_table, has_storage
             FROM shard_catalog WHERE id = ?1",
            [id],
            Self::record_from_row,
        );

        let (id, created, updated, db_host, db_table, has_storage) = match result {
            Ok(fields) => fields,
            Err(rusqlite::Error::QueryReturnedNoRows) => return Ok(None),
            Err(e) => {
                return Err(ShardError::Catalog(format!(
                    "cannot load record {}: {}",
                    id, e
                )))
            }
        };

        Ok(Some(CatalogRecord {
            id: Some(id),
            date_created: parse_timestamp(&created)?,
            date_updated: parse_timestamp(&updated)?,
            db_host,
            db_table,
            has_storage,
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_record_defaults() {
        let record = CatalogRecord::new();
        assert!(record.id.is_none());
        assert!(record.db_host.is_none());
        assert!(record.db_table.is_none());
        assert!(!record.has_storage);
        assert_eq!(record.date_created, record.date_updated);
    }

    #[test]
    fn test_save_assigns_id_and_stamps() {
        let mut store = SqliteCatalog::open_in_memory().unwrap();
        let mut record = CatalogRecord::new().with_table("shard_users");

        let created = record.date_created;
        store.save(&mut record).unwrap();

        assert!(record.id.is_some());
        assert_eq!(record.date_created, created);
        assert!(record.date_updated >= created);
    }

    #[test]
    fn test_save_then_load_round_trip() {
        let mut store = SqliteCatalog::open_in_memory().unwrap();
        let mut record = CatalogRecord::new()
            .with_table("shard_events")
            .with_host("/var/lib/shards");
        record.has_storage = true;

        store.save(&mut record).unwrap();
        let id = record.id.unwrap();

        let loaded = store.load(id).unwrap().unwrap();
        assert_eq!(loaded.id, Some(id));
        assert_eq!(loaded.db_table.as_deref(), Some("shard_events"));
        assert_eq!(loaded.db_host.as_deref(), Some("/var/lib/shards"));
        assert!(loaded.has_storage);
        assert_eq!(loaded.date_created.timestamp(), record.date_created.timestamp());
    }

    #[test]
    fn test_update_existing_record() {
        let mut store = SqliteCatalog::open_in_memory().unwrap();
        let mut record = CatalogRecord::new();
        store.save(&mut record).unwrap();
        let id = record.id.unwrap();

        record.has_storage = true;
        record.db_table = Some("shard_42".to_string());
        store.save(&mut record).unwrap();

        // Same row, new state
        assert_eq!(record.id, Some(id));
        let loaded = store.load(id).unwrap().unwrap();
        assert!(loaded.has_storage);
        assert_eq!(loaded.db_table.as_deref(), Some("shard_42"));
    }

    #[test]
    fn test_load_missing_record() {
        let store = SqliteCatalog::open_in_memory().unwrap();
        assert!(store.load(9999).unwrap().is_none());
    }
}
