//! Shard storage management
//!
//! A [`ShardStore`] ties together one catalog record, a declarative
//! [`ShardLayout`], connection settings, and an executor, and runs the
//! lazy provisioning protocol: the physical table is created on the first
//! `insert` (or an explicit `create_storage` call) and destroyed only by
//! `remove_storage`, with the catalog record's `has_storage` flag tracking
//! what this store last observed.
//!
//! Every operation comes in two forms:
//!
//! - `try_*` methods return [`ShardResult`] so the failure kind is
//!   inspectable;
//! - the plain methods preserve the legacy behavior of swallowing all
//!   failures into the operation's empty result (`0`/`-1` for `count`,
//!   `None`, `[]`, or a silent no-op), logging a warning instead.
//!
//! WHERE clauses built from [`RowFilter`] interpolate values directly
//! into statement text; the caller is responsible for escaping. The
//! `*_bound` variants bind values as parameters instead.

mod layout;

pub use layout::ShardLayout;

use rusqlite::types::Value;
use tracing::{debug, warn};

use crate::catalog::{CatalogRecord, CatalogStore};
use crate::config::DbSettings;
use crate::error::{ShardError, ShardResult};
use crate::executor::{ExecutorHandle, Row, SqlExecutor, SqliteExecutor};

/// Row selection for `get_row_where` / `remove_row_where`.
#[derive(Debug)]
pub enum RowFilter<'a> {
    /// Equality on one column; the value is interpolated as a quoted
    /// string literal.
    Eq(&'a str, &'a str),

    /// A raw WHERE clause, passed through verbatim.
    Raw(&'a str),
}

impl RowFilter<'_> {
    fn clause(&self) -> String {
        match self {
            RowFilter::Eq(key, value) => format!("\"{key}\" = '{value}'"),
            RowFilter::Raw(clause) => (*clause).to_string(),
        }
    }
}

/// Storage manager for one shard.
pub struct ShardStore {
    record: CatalogRecord,
    layout: ShardLayout,
    settings: DbSettings,
    executor: Box<dyn SqlExecutor>,
    catalog: Box<dyn CatalogStore>,
    last_sql: Option<String>,
}

impl ShardStore {
    /// Create a store over an arbitrary executor.
    pub fn new(
        record: CatalogRecord,
        layout: ShardLayout,
        settings: DbSettings,
        executor: Box<dyn SqlExecutor>,
        catalog: Box<dyn CatalogStore>,
    ) -> Self {
        Self {
            record,
            layout,
            settings,
            executor,
            catalog,
            last_sql: None,
        }
    }

    /// Create a store backed by the SQLite executor.
    pub fn sqlite(
        record: CatalogRecord,
        layout: ShardLayout,
        settings: DbSettings,
        catalog: Box<dyn CatalogStore>,
    ) -> Self {
        Self::new(record, layout, settings, Box::new(SqliteExecutor::new()), catalog)
    }

    /// The catalog record this store manages.
    pub fn record(&self) -> &CatalogRecord {
        &self.record
    }

    /// The declared layout.
    pub fn layout(&self) -> &ShardLayout {
        &self.layout
    }

    /// Whether the physical table is believed to exist.
    pub fn has_storage(&self) -> bool {
        self.record.has_storage
    }

    /// The physical table name for this shard.
    pub fn table_name(&self) -> String {
        self.layout.table_name(&self.record)
    }

    /// The last statement this store executed successfully. Diagnostic
    /// only: not persisted, and not reliable under concurrent use.
    pub fn last_sql(&self) -> Option<&str> {
        self.last_sql.as_deref()
    }

    fn acquire(&self) -> ShardResult<Box<dyn ExecutorHandle>> {
        self.executor
            .acquire(&self.settings, self.record.db_host.as_deref())
    }

    fn note_sql(&mut self, sql: &str) {
        debug!(sql = %sql, "executed");
        self.last_sql = Some(sql.to_string());
    }

    fn require_storage(&self) -> ShardResult<String> {
        if self.record.has_storage {
            Ok(self.table_name())
        } else {
            Err(ShardError::NoStorage(self.table_name()))
        }
    }

    // ------------------------------------------------------------------
    // count
    // ------------------------------------------------------------------

    /// Count rows in the shard table, optionally constrained by a raw
    /// WHERE clause.
    pub fn try_count(&mut self, filter: Option<&str>) -> ShardResult<u64> {
        let table = self.require_storage()?;
        let sql = match filter {
            Some(f) => format!("SELECT COUNT(*) FROM \"{table}\" WHERE {f};"),
            None => format!("SELECT COUNT(*) FROM \"{table}\";"),
        };

        let mut handle = self.acquire()?;
        let row = handle.fetch_one(&sql)?;
        self.note_sql(&sql);

        match row.and_then(|r| r.into_iter().next()) {
            Some(Value::Integer(n)) if n >= 0 => Ok(n as u64),
            _ => Ok(0),
        }
    }

    /// Legacy counting: `0` when storage has not been provisioned (no
    /// connection is attempted), `-1` on any connection or statement
    /// failure.
    pub fn count(&mut self, filter: Option<&str>) -> i64 {
        match self.try_count(filter) {
            Ok(n) => n as i64,
            Err(e) if e.is_no_storage() => 0,
            Err(e) => {
                warn!("count failed: {e}");
                -1
            }
        }
    }

    // ------------------------------------------------------------------
    // provisioning
    // ------------------------------------------------------------------

    /// Provision the physical table if the catalog says it does not
    /// exist yet.
    ///
    /// Returns `true` when this call created the table. A driver-level
    /// "already exists" failure is benign: another writer won the race,
    /// and the catalog record is left unchanged. Any other failure leaves
    /// no state change.
    pub fn try_create_storage(&mut self) -> ShardResult<bool> {
        if self.record.has_storage {
            return Ok(false);
        }

        let table = self.table_name();
        let sql = self.layout.create_table_sql(&table).ok_or_else(|| {
            ShardError::Encoding(format!("layout for table '{table}' cannot be rendered"))
        })?;

        let mut handle = self.acquire()?;
        match handle.execute_batch(&sql) {
            Ok(()) => {}
            Err(ShardError::TableExists) => {
                debug!(table = %table, "shard table already exists, catalog unchanged");
                return Ok(false);
            }
            Err(e) => return Err(e),
        }
        self.note_sql(&sql);

        self.record.has_storage = true;
        self.catalog.save(&mut self.record)?;
        Ok(true)
    }

    /// Legacy provisioning: swallows every failure.
    pub fn create_storage(&mut self) {
        if let Err(e) = self.try_create_storage() {
            warn!("create_storage failed: {e}");
        }
    }

    /// Destroy the physical table if the catalog says it exists.
    ///
    /// Returns `true` when this call dropped the table. On success the
    /// `has_storage` flag is cleared and the catalog record saved.
    pub fn try_remove_storage(&mut self) -> ShardResult<bool> {
        if !self.record.has_storage {
            return Ok(false);
        }

        let table = self.table_name();
        let sql = self.layout.drop_table_sql(&table);

        let mut handle = self.acquire()?;
        handle.execute(&sql)?;
        handle.commit()?;
        self.note_sql(&sql);

        self.record.has_storage = false;
        self.catalog.save(&mut self.record)?;
        Ok(true)
    }

    /// Legacy removal: swallows every failure.
    pub fn remove_storage(&mut self) {
        if let Err(e) = self.try_remove_storage() {
            warn!("remove_storage failed: {e}");
        }
    }

    /// Ask the database whether the physical table actually exists,
    /// regardless of what the catalog record says. Lets callers detect
    /// catalog/table desync; nothing here repairs it.
    pub fn try_storage_exists(&mut self) -> ShardResult<bool> {
        let table = self.table_name();
        let mut handle = self.acquire()?;
        handle.table_exists(&table)
    }

    // ------------------------------------------------------------------
    // reads
    // ------------------------------------------------------------------

    /// Fetch the first row matching the filter.
    pub fn try_get_row_where(&mut self, filter: &RowFilter<'_>) -> ShardResult<Option<Row>> {
        let table = self.require_storage()?;
        let sql = format!("SELECT * FROM \"{table}\" WHERE {};", filter.clause());

        let mut handle = self.acquire()?;
        let row = handle.fetch_one(&sql)?;
        self.note_sql(&sql);
        Ok(row)
    }

    /// Legacy fetch: `None` covers "no storage", "no match", and every
    /// failure alike.
    pub fn get_row_where(&mut self, filter: &RowFilter<'_>) -> Option<Row> {
        match self.try_get_row_where(filter) {
            Ok(row) => row,
            Err(e) if e.is_no_storage() => None,
            Err(e) => {
                warn!("get_row_where failed: {e}");
                None
            }
        }
    }

    /// Fetch the first row where `key` equals a bound value. The
    /// parameterized companion to [`RowFilter::Eq`].
    pub fn try_get_row_where_bound(
        &mut self,
        key: &str,
        value: Value,
    ) -> ShardResult<Option<Row>> {
        let table = self.require_storage()?;
        let sql = format!("SELECT * FROM \"{table}\" WHERE \"{key}\" = ?1;");

        let mut handle = self.acquire()?;
        let row = handle.fetch_one_params(&sql, &[value])?;
        self.note_sql(&sql);
        Ok(row)
    }

    /// Legacy form of [`Self::try_get_row_where_bound`].
    pub fn get_row_where_bound(&mut self, key: &str, value: Value) -> Option<Row> {
        match self.try_get_row_where_bound(key, value) {
            Ok(row) => row,
            Err(e) if e.is_no_storage() => None,
            Err(e) => {
                warn!("get_row_where_bound failed: {e}");
                None
            }
        }
    }

    /// Run caller-supplied SQL verbatim against the shard's database.
    ///
    /// `limit > 0` fetches at most `limit` rows; `limit == 0` fetches
    /// all. `offset` is accepted for signature compatibility but never
    /// applied to the query.
    pub fn try_get_sql(
        &mut self,
        sql: &str,
        limit: usize,
        offset: usize,
    ) -> ShardResult<Vec<Row>> {
        let _ = offset;
        self.require_storage()?;

        let mut handle = self.acquire()?;
        let rows = handle.fetch_many(sql, limit)?;
        self.note_sql(sql);
        Ok(rows)
    }

    /// Legacy form of [`Self::try_get_sql`]: empty on no storage or any
    /// failure.
    pub fn get_sql(&mut self, sql: &str, limit: usize, offset: usize) -> Vec<Row> {
        match self.try_get_sql(sql, limit, offset) {
            Ok(rows) => rows,
            Err(e) if e.is_no_storage() => Vec::new(),
            Err(e) => {
                warn!("get_sql failed: {e}");
                Vec::new()
            }
        }
    }

    // ------------------------------------------------------------------
    // writes
    // ------------------------------------------------------------------

    /// Execute a caller-supplied insert statement, provisioning storage
    /// first when the catalog says there is none.
    ///
    /// Provisioning that loses a creation race is benign and the insert
    /// still runs, so a shard whose table exists but whose flag is stale
    /// remains writable.
    pub fn try_insert(&mut self, sql: &str) -> ShardResult<()> {
        if !self.record.has_storage {
            self.try_create_storage()?;
        }

        let mut handle = self.acquire()?;
        handle.execute(sql)?;
        handle.commit()?;
        self.note_sql(sql);
        Ok(())
    }

    /// Legacy insert: swallows every failure; `last_sql` is updated only
    /// on success.
    pub fn insert(&mut self, sql: &str) {
        if let Err(e) = self.try_insert(sql) {
            warn!("insert failed: {e}");
        }
    }

    /// Delete rows matching the filter. A commit failure after a
    /// successful delete is swallowed.
    pub fn try_remove_row_where(&mut self, filter: &RowFilter<'_>) -> ShardResult<()> {
        let table = self.require_storage()?;
        let sql = format!("DELETE FROM \"{table}\" WHERE {};", filter.clause());

        let mut handle = self.acquire()?;
        handle.execute(&sql)?;
        if let Err(e) = handle.commit() {
            warn!("commit after delete failed: {e}");
        }
        self.note_sql(&sql);
        Ok(())
    }

    /// Legacy delete: swallows every failure.
    pub fn remove_row_where(&mut self, filter: &RowFilter<'_>) {
        if let Err(e) = self.try_remove_row_where(filter) {
            warn!("remove_row_where failed: {e}");
        }
    }

    /// Delete rows where `key` equals a bound value. The parameterized
    /// companion to [`RowFilter::Eq`].
    pub fn try_remove_row_where_bound(&mut self, key: &str, value: Value) -> ShardResult<()> {
        let table = self.require_storage()?;
        let sql = format!("DELETE FROM \"{table}\" WHERE \"{key}\" = ?1;");

        let mut handle = self.acquire()?;
        handle.execute_params(&sql, &[value])?;
        if let Err(e) = handle.commit() {
            warn!("commit after delete failed: {e}");
        }
        self.note_sql(&sql);
        Ok(())
    }

    /// Legacy form of [`Self::try_remove_row_where_bound`].
    pub fn remove_row_where_bound(&mut self, key: &str, value: Value) {
        if let Err(e) = self.try_remove_row_where_bound(key, value) {
            warn!("remove_row_where_bound failed: {e}");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::SqliteCatalog;
    use tempfile::TempDir;

    fn settings_for(dir: &TempDir) -> DbSettings {
        DbSettings {
            name: "shards".to_string(),
            host: dir.path().to_string_lossy().to_string(),
            ..DbSettings::default()
        }
    }

    fn catalog_for(dir: &TempDir) -> Box<dyn CatalogStore> {
        let path = format!("{}/catalog.sqlite3", dir.path().to_string_lossy());
        Box::new(SqliteCatalog::open(&path).unwrap())
    }

    fn store_in(dir: &TempDir) -> ShardStore {
        let layout = ShardLayout::new()
            .with_columns(["name varchar(50)", "score integer"])
            .with_indexes(["name"]);
        ShardStore::sqlite(
            CatalogRecord::new(),
            layout,
            settings_for(dir),
            catalog_for(dir),
        )
    }

    #[test]
    fn test_count_without_storage_is_zero() {
        let dir = TempDir::new().unwrap();
        let mut store = store_in(&dir);

        assert_eq!(store.count(None), 0);
        // Short-circuited: nothing was executed
        assert!(store.last_sql().is_none());
        assert!(store.try_count(None).unwrap_err().is_no_storage());
    }

    #[test]
    fn test_count_unreachable_host_is_minus_one() {
        let dir = TempDir::new().unwrap();
        let mut record = CatalogRecord::new();
        record.has_storage = true;
        record.db_host = Some("/nonexistent/shard/host".to_string());

        let mut store = ShardStore::sqlite(
            record,
            ShardLayout::new(),
            settings_for(&dir),
            catalog_for(&dir),
        );

        assert_eq!(store.count(None), -1);
        match store.try_count(None) {
            Err(ShardError::Connectivity(_)) => {}
            other => panic!("expected connectivity error, got {:?}", other),
        }
    }

    #[test]
    fn test_create_storage_is_idempotent() {
        let dir = TempDir::new().unwrap();
        let mut store = store_in(&dir);

        assert!(store.try_create_storage().unwrap());
        assert!(store.has_storage());
        assert!(store.record().id.is_some());

        // Second call short-circuits on the flag
        assert!(!store.try_create_storage().unwrap());
        assert!(store.has_storage());
    }

    #[test]
    fn test_create_storage_lost_race_is_benign() {
        let dir = TempDir::new().unwrap();
        let mut first = store_in(&dir);
        first.create_storage();
        assert!(first.has_storage());

        // A second store over the same database loses the creation race
        let mut second = store_in(&dir);
        assert!(!second.try_create_storage().unwrap());
        assert!(!second.has_storage());

        // The shard stays writable despite the stale flag
        second.insert("INSERT INTO \"shard_0\" (name, score) VALUES ('ada', 1);");
        assert_eq!(first.count(None), 1);
    }

    #[test]
    fn test_insert_provisions_storage() {
        let dir = TempDir::new().unwrap();
        let mut store = store_in(&dir);

        store.insert("INSERT INTO \"shard_0\" (name, score) VALUES ('ada', 7);");
        assert!(store.has_storage());
        assert_eq!(store.count(None), 1);
        assert!(store.try_storage_exists().unwrap());
    }

    #[test]
    fn test_row_round_trip() {
        let dir = TempDir::new().unwrap();
        let mut store = store_in(&dir);

        store.insert("INSERT INTO \"shard_0\" (name, score) VALUES ('ada', 7);");

        let row = store.get_row_where(&RowFilter::Eq("name", "ada")).unwrap();
        assert_eq!(row[1], Value::Text("ada".to_string()));
        assert_eq!(row[2], Value::Integer(7));

        store.remove_row_where(&RowFilter::Eq("name", "ada"));
        assert!(store.get_row_where(&RowFilter::Eq("name", "ada")).is_none());
    }

    #[test]
    fn test_row_round_trip_bound() {
        let dir = TempDir::new().unwrap();
        let mut store = store_in(&dir);

        store.insert("INSERT INTO \"shard_0\" (name, score) VALUES ('grace', 9);");

        let row = store
            .get_row_where_bound("name", Value::Text("grace".to_string()))
            .unwrap();
        assert_eq!(row[1], Value::Text("grace".to_string()));

        store.remove_row_where_bound("name", Value::Text("grace".to_string()));
        assert!(store
            .get_row_where_bound("name", Value::Text("grace".to_string()))
            .is_none());
    }

    #[test]
    fn test_raw_filter() {
        let dir = TempDir::new().unwrap();
        let mut store = store_in(&dir);

        store.insert("INSERT INTO \"shard_0\" (name, score) VALUES ('a', 1), ('b', 5);");

        let row = store.get_row_where(&RowFilter::Raw("score > 3")).unwrap();
        assert_eq!(row[1], Value::Text("b".to_string()));

        assert_eq!(store.count(Some("score > 0")), 2);
        store.remove_row_where(&RowFilter::Raw("score > 3"));
        assert_eq!(store.count(None), 1);
    }

    #[test]
    fn test_get_sql_limit_and_ignored_offset() {
        let dir = TempDir::new().unwrap();
        let mut store = store_in(&dir);

        store.insert(
            "INSERT INTO \"shard_0\" (name, score) VALUES \
             ('a', 1), ('b', 2), ('c', 3), ('d', 4), ('e', 5);",
        );

        let sql = "SELECT * FROM \"shard_0\";";
        assert_eq!(store.get_sql(sql, 2, 0).len(), 2);
        assert_eq!(store.get_sql(sql, 0, 0).len(), 5);
        // offset is accepted but never applied
        assert_eq!(store.get_sql(sql, 0, 3).len(), 5);
    }

    #[test]
    fn test_get_sql_without_storage_is_empty() {
        let dir = TempDir::new().unwrap();
        let mut store = store_in(&dir);
        assert!(store.get_sql("SELECT * FROM \"shard_0\";", 0, 0).is_empty());
    }

    #[test]
    fn test_remove_storage_clears_flag() {
        let dir = TempDir::new().unwrap();
        let mut store = store_in(&dir);

        store.insert("INSERT INTO \"shard_0\" (name, score) VALUES ('a', 1);");
        assert!(store.has_storage());

        store.remove_storage();
        assert!(!store.has_storage());
        assert_eq!(store.count(None), 0);
        assert!(!store.try_storage_exists().unwrap());

        // Removing again is a no-op
        assert!(!store.try_remove_storage().unwrap());
    }

    #[test]
    fn test_malformed_sql_is_swallowed() {
        let dir = TempDir::new().unwrap();
        let mut store = store_in(&dir);
        store.create_storage();

        let before = store.last_sql().map(str::to_string);
        store.insert("INSERT INTO nowhere docked");
        // Failure: no rows, last_sql untouched
        assert_eq!(store.count(None), 0);
        assert_eq!(store.last_sql().map(str::to_string), before);

        match store.try_insert("INSERT INTO nowhere docked") {
            Err(ShardError::Statement(_)) => {}
            other => panic!("expected statement error, got {:?}", other),
        }
    }

    #[test]
    fn test_last_sql_updated_on_success() {
        let dir = TempDir::new().unwrap();
        let mut store = store_in(&dir);

        store.insert("INSERT INTO \"shard_0\" (name, score) VALUES ('a', 1);");
        assert!(store.last_sql().unwrap().starts_with("INSERT INTO"));

        store.count(None);
        assert!(store.last_sql().unwrap().starts_with("SELECT COUNT(*)"));
    }

    #[test]
    fn test_catalog_record_persisted_on_provision() {
        let dir = TempDir::new().unwrap();
        let mut store = store_in(&dir);
        store.create_storage();

        let id = store.record().id.unwrap();
        let path = format!("{}/catalog.sqlite3", dir.path().to_string_lossy());
        let catalog = SqliteCatalog::open(&path).unwrap();
        let loaded = catalog.load(id).unwrap().unwrap();
        assert!(loaded.has_storage);
    }

    #[test]
    fn test_unrenderable_layout_reports_encoding() {
        let dir = TempDir::new().unwrap();
        let layout = ShardLayout::new().with_columns(["bad\0column text"]);
        let mut store = ShardStore::sqlite(
            CatalogRecord::new(),
            layout,
            settings_for(&dir),
            catalog_for(&dir),
        );

        match store.try_create_storage() {
            Err(ShardError::Encoding(_)) => {}
            other => panic!("expected encoding error, got {:?}", other),
        }
        // Legacy form swallows and leaves no state change
        store.create_storage();
        assert!(!store.has_storage());
    }

    #[test]
    fn test_host_override_routes_to_other_database() {
        let dir = TempDir::new().unwrap();
        let other = TempDir::new().unwrap();

        let mut record = CatalogRecord::new();
        record.db_host = Some(other.path().to_string_lossy().to_string());

        let mut store = ShardStore::sqlite(
            record,
            ShardLayout::new().with_columns(["name varchar(50)"]),
            settings_for(&dir),
            catalog_for(&dir),
        );

        store.insert("INSERT INTO \"shard_0\" (name) VALUES ('x');");
        assert_eq!(store.count(None), 1);

        // The default host saw nothing
        assert!(other.path().join("shards.sqlite3").exists());
        assert!(!dir.path().join("shards.sqlite3").exists());
    }
}
