//! Error types for shard storage operations
//!
//! Every failure a shard operation can hit maps to one of the kinds below,
//! so callers of the `try_*` API can tell "no rows" apart from "could not
//! connect". The compatibility API degrades these to empty results instead
//! of propagating them.

use thiserror::Error;

/// Result alias used throughout the crate.
pub type ShardResult<T> = Result<T, ShardError>;

/// Failure kinds for shard storage operations.
#[derive(Debug, Error)]
pub enum ShardError {
    /// The database could not be reached or opened.
    #[error("database connection failed: {0}")]
    Connectivity(String),

    /// A statement failed to execute (malformed SQL, constraint violation,
    /// missing table).
    #[error("statement execution failed: {0}")]
    Statement(String),

    /// A `CREATE TABLE` hit a table that already exists. Benign for
    /// provisioning: another writer got there first.
    #[error("table already exists")]
    TableExists,

    /// The DDL for a shard table could not be rendered from its layout.
    #[error("cannot render DDL: {0}")]
    Encoding(String),

    /// The operation requires a provisioned table and the catalog record
    /// says there is none.
    #[error("no storage provisioned for table '{0}'")]
    NoStorage(String),

    /// The catalog record could not be persisted or loaded.
    #[error("catalog persistence failed: {0}")]
    Catalog(String),
}

impl ShardError {
    /// Whether this failure means "storage has not been provisioned yet"
    /// rather than an actual execution problem.
    pub fn is_no_storage(&self) -> bool {
        matches!(self, ShardError::NoStorage(_))
    }
}
