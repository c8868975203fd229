//! SQLite-backed executor
//!
//! Maps the abstract connection settings onto SQLite: `host` is the
//! directory holding database files, `name` the database name. `user`,
//! `password`, and `port` are accepted for driver parity and ignored.

use rusqlite::types::Value;
use rusqlite::Connection;
use tracing::debug;

use crate::config::DbSettings;
use crate::error::{ShardError, ShardResult};
use crate::executor::{ExecutorHandle, Row, SqlExecutor};

/// Executor that opens one SQLite connection per acquired handle.
///
/// When `name` is `:memory:`, every acquire yields a fresh empty
/// database, so state does not survive across operations; use a
/// file-backed database for real shard storage.
#[derive(Debug, Default, Clone, Copy)]
pub struct SqliteExecutor;

impl SqliteExecutor {
    pub fn new() -> Self {
        Self
    }

    /// Resolve the database file path from settings and an optional
    /// per-shard host override.
    pub fn resolve_path(settings: &DbSettings, host_override: Option<&str>) -> String {
        let host = host_override.unwrap_or(settings.host.as_str());
        let file = if settings.name.ends_with(".sqlite3") {
            settings.name.clone()
        } else {
            format!("{}.sqlite3", settings.name)
        };
        format!("{}/{}", host.trim_end_matches('/'), file)
    }
}

impl SqlExecutor for SqliteExecutor {
    fn acquire(
        &self,
        settings: &DbSettings,
        host_override: Option<&str>,
    ) -> ShardResult<Box<dyn ExecutorHandle>> {
        if let Some(port) = settings.port_number() {
            // SQLite has no network endpoint; the port is resolved for
            // parity with networked drivers and then ignored.
            debug!(port, "ignoring configured port for sqlite");
        }

        let conn = if settings.name == ":memory:" {
            Connection::open_in_memory()
                .map_err(|e| ShardError::Connectivity(format!("cannot open in-memory database: {}", e)))?
        } else {
            let path = Self::resolve_path(settings, host_override);
            debug!(path = %path, "opening shard database");
            Connection::open(&path)
                .map_err(|e| ShardError::Connectivity(format!("cannot open database at '{}': {}", path, e)))?
        };

        // Light connection tuning; failures here mean the database is
        // unusable, so they surface as connectivity errors.
        let _: String = conn
            .query_row("PRAGMA journal_mode=WAL", [], |row| row.get(0))
            .map_err(|e| ShardError::Connectivity(format!("cannot set journal mode: {}", e)))?;
        conn.execute("PRAGMA synchronous=NORMAL", [])
            .map_err(|e| ShardError::Connectivity(format!("cannot set synchronous mode: {}", e)))?;

        Ok(Box::new(SqliteHandle { conn }))
    }
}

/// A single-use SQLite connection.
struct SqliteHandle {
    conn: Connection,
}

fn map_statement_err(e: rusqlite::Error) -> ShardError {
    let msg = e.to_string();
    if msg.contains("already exists") {
        ShardError::TableExists
    } else {
        ShardError::Statement(msg)
    }
}

fn row_values(row: &rusqlite::Row<'_>) -> ShardResult<Row> {
    let count = row.as_ref().column_count();
    (0..count)
        .map(|i| row.get::<_, Value>(i).map_err(map_statement_err))
        .collect()
}

impl ExecutorHandle for SqliteHandle {
    fn execute(&mut self, sql: &str) -> ShardResult<usize> {
        self.conn.execute(sql, []).map_err(map_statement_err)
    }

    fn execute_params(&mut self, sql: &str, params: &[Value]) -> ShardResult<usize> {
        self.conn
            .execute(sql, rusqlite::params_from_iter(params.iter()))
            .map_err(map_statement_err)
    }

    fn execute_batch(&mut self, sql: &str) -> ShardResult<()> {
        // On mid-batch failure the handle is dropped by the caller, which
        // rolls back any transaction the batch opened.
        self.conn.execute_batch(sql).map_err(map_statement_err)
    }

    fn fetch_one(&mut self, sql: &str) -> ShardResult<Option<Row>> {
        let mut stmt = self.conn.prepare(sql).map_err(map_statement_err)?;
        let mut rows = stmt.query([]).map_err(map_statement_err)?;
        match rows.next().map_err(map_statement_err)? {
            Some(row) => Ok(Some(row_values(row)?)),
            None => Ok(None),
        }
    }

    fn fetch_one_params(&mut self, sql: &str, params: &[Value]) -> ShardResult<Option<Row>> {
        let mut stmt = self.conn.prepare(sql).map_err(map_statement_err)?;
        let mut rows = stmt
            .query(rusqlite::params_from_iter(params.iter()))
            .map_err(map_statement_err)?;
        match rows.next().map_err(map_statement_err)? {
            Some(row) => Ok(Some(row_values(row)?)),
            None => Ok(None),
        }
    }

    fn fetch_many(&mut self, sql: &str, limit: usize) -> ShardResult<Vec<Row>> {
        let mut stmt = self.conn.prepare(sql).map_err(map_statement_err)?;
        let mut rows = stmt.query([]).map_err(map_statement_err)?;

        let mut results = Vec::new();
        while let Some(row) = rows.next().map_err(map_statement_err)? {
            results.push(row_values(row)?);
            if limit > 0 && results.len() >= limit {
                break;
            }
        }
        Ok(results)
    }

    fn table_exists(&mut self, table: &str) -> ShardResult<bool> {
        let count: i64 = self
            .conn
            .query_row(
                "SELECT COUNT(*) FROM sqlite_master WHERE type='table' AND name=?1",
                [table],
                |row| row.get(0),
            )
            .map_err(map_statement_err)?;
        Ok(count > 0)
    }

    fn commit(&mut self) -> ShardResult<()> {
        // SQLite autocommits single statements; nothing pending to flush.
        Ok(())
    }
}
