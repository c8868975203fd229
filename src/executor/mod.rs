//! Execution handles against the shared database
//!
//! This module defines the seam between shard operations and the
//! underlying driver:
//!
//! - [`SqlExecutor`]: resolves connection settings (plus a per-shard host
//!   override) into a live handle.
//! - [`ExecutorHandle`]: a single-use connection used for one operation's
//!   execute/fetch/commit chain, then dropped. There is no pooling; every
//!   operation opens fresh.
//!
//! The SQLite implementation lives in [`sqlite`].

pub mod sqlite;

pub use sqlite::SqliteExecutor;

use rusqlite::types::Value;

use crate::config::DbSettings;
use crate::error::ShardResult;

/// One result row as an ordered sequence of column values.
pub type Row = Vec<Value>;

/// A live, single-use connection to the shared database.
///
/// Handles are acquired per operation and dropped when it finishes.
/// `fetch_many` treats `limit == 0` as "all rows". `commit` exists for
/// drivers that need an explicit commit; autocommitting drivers may make
/// it a no-op.
pub trait ExecutorHandle {
    /// Execute a single statement, returning the affected row count.
    fn execute(&mut self, sql: &str) -> ShardResult<usize>;

    /// Execute a single statement with bound parameters.
    fn execute_params(&mut self, sql: &str, params: &[Value]) -> ShardResult<usize>;

    /// Execute a multi-statement batch (used for DDL).
    fn execute_batch(&mut self, sql: &str) -> ShardResult<()>;

    /// Run a query and return the first row, if any.
    fn fetch_one(&mut self, sql: &str) -> ShardResult<Option<Row>>;

    /// Run a query with bound parameters and return the first row, if any.
    fn fetch_one_params(&mut self, sql: &str, params: &[Value]) -> ShardResult<Option<Row>>;

    /// Run a query and return at most `limit` rows (`0` means all).
    fn fetch_many(&mut self, sql: &str, limit: usize) -> ShardResult<Vec<Row>>;

    /// Check whether a table exists in the database.
    fn table_exists(&mut self, table: &str) -> ShardResult<bool>;

    /// Commit any pending work on this handle.
    fn commit(&mut self) -> ShardResult<()>;
}

/// Resolves connection settings into execution handles.
pub trait SqlExecutor {
    /// Acquire a fresh handle.
    ///
    /// The host is `host_override` when present (from a shard's catalog
    /// record), else the default from `settings`. The configured port is
    /// used only when it parses as an integer.
    fn acquire(
        &self,
        settings: &DbSettings,
        host_override: Option<&str>,
    ) -> ShardResult<Box<dyn ExecutorHandle>>;
}
