#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]

//! Shardstore - lazy per-model table provisioning
//!
//! Shardstore lets application-defined models lazily provision and use
//! their own dedicated table (a "shard") inside a shared SQLite database,
//! instead of relying on a schema pre-created by migrations. The
//! application declares a column list and index list; the library handles
//! table-existence bootstrapping, SQL construction, and basic CRUD,
//! tracking whether storage has been created yet in a persisted catalog
//! record.
//!
//! # Architecture
//!
//! ```text
//! src/
//! ├── config       # Injected connection settings (toml file + SHARDSTORE_* env)
//! ├── catalog      # CatalogRecord + CatalogStore persistence
//! ├── executor     # SqlExecutor / ExecutorHandle seam, SQLite implementation
//! └── shard        # ShardLayout (naming & DDL) and ShardStore (CRUD)
//! ```
//!
//! # Storage lifecycle
//!
//! A shard's catalog record and its physical table are two independently
//! owned resources linked only by the record's `has_storage` flag. The
//! table is created on the first successful `insert` (or an explicit
//! `create_storage` call) and destroyed only by `remove_storage`. Because
//! flag persistence and table mutation are separate non-transactional
//! steps, they can drift apart under failure; `ShardStore::try_storage_exists`
//! reports physical reality when a caller needs to check.
//!
//! # Failure behavior
//!
//! The `try_*` methods on [`ShardStore`] return typed [`ShardError`]
//! kinds. The plain methods keep the legacy contract: every connection or
//! statement failure degrades to the operation's empty result and a
//! warning log, never a panic or a propagated error (`count` uses `-1`
//! as its distinguished failure sentinel).
//!
//! # Quick start
//!
//! ```rust,ignore
//! use shardstore::{CatalogRecord, RowFilter, ShardConfig, ShardLayout, ShardStore, SqliteCatalog};
//!
//! let config = ShardConfig::new(&None)?;
//! let catalog = SqliteCatalog::open(&format!("{}/catalog.sqlite3", config.data_dir))?;
//!
//! let layout = ShardLayout::new()
//!     .with_columns(["name varchar(50)", "score integer"])
//!     .with_indexes(["name"]);
//!
//! let mut store = ShardStore::sqlite(CatalogRecord::new(), layout, config.db, Box::new(catalog));
//!
//! // First insert provisions the table
//! store.insert("INSERT INTO \"shard_0\" (name, score) VALUES ('ada', 7);");
//!
//! if let Some(row) = store.get_row_where(&RowFilter::Eq("name", "ada")) {
//!     println!("found: {:?}", row);
//! }
//! ```
//!
//! # Trust boundary
//!
//! WHERE clauses and caller-supplied statements are interpolated into SQL
//! verbatim; the caller is responsible for escaping. The `*_bound`
//! variants bind values as parameters and should be preferred whenever a
//! value comes from outside.

pub mod catalog;
pub mod config;
pub mod error;
pub mod executor;
pub mod shard;

pub use catalog::{CatalogRecord, CatalogStore, SqliteCatalog};
pub use config::{DbSettings, ShardConfig};
pub use error::{ShardError, ShardResult};
pub use executor::{ExecutorHandle, Row, SqlExecutor, SqliteExecutor};
pub use shard::{RowFilter, ShardLayout, ShardStore};
