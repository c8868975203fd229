//! Declarative shard table layouts
//!
//! A layout lists the column-definition fragments and indexed columns for
//! one kind of shard table. Fragments are passed through to the database
//! verbatim; nothing here validates or escapes them.

use crate::catalog::CatalogRecord;

/// Column and index declarations for a shard table.
#[derive(Debug, Clone)]
pub struct ShardLayout {
    /// Full column-definition fragments, e.g. `"name varchar(50)"`.
    columns: Vec<String>,

    /// Column names that get a secondary index.
    indexes: Vec<String>,

    /// Legacy shard identifier, used for the default table name.
    legacy_id: String,
}

impl Default for ShardLayout {
    fn default() -> Self {
        Self::new()
    }
}

impl ShardLayout {
    /// An empty layout: no columns, no indexes, legacy identifier `"0"`.
    pub fn new() -> Self {
        Self {
            columns: Vec::new(),
            indexes: Vec::new(),
            legacy_id: "0".to_string(),
        }
    }

    /// Declare the column fragments for this layout.
    pub fn with_columns<I, S>(mut self, columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.columns = columns.into_iter().map(Into::into).collect();
        self
    }

    /// Declare the indexed column names for this layout.
    pub fn with_indexes<I, S>(mut self, indexes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.indexes = indexes.into_iter().map(Into::into).collect();
        self
    }

    /// Set the legacy shard identifier.
    pub fn with_legacy_id(mut self, id: impl Into<String>) -> Self {
        self.legacy_id = id.into();
        self
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn indexes(&self) -> &[String] {
        &self.indexes
    }

    /// The table name derived from the legacy identifier.
    pub fn default_table_name(&self) -> String {
        format!("shard_{}", self.legacy_id)
    }

    /// The physical table name for a shard: the record's explicit name
    /// when set, else the legacy-derived default.
    pub fn table_name(&self, record: &CatalogRecord) -> String {
        match &record.db_table {
            Some(table) => table.clone(),
            None => self.default_table_name(),
        }
    }

    /// Render the DDL batch that provisions the shard table.
    ///
    /// The batch creates the table with a mandatory auto-incrementing
    /// `id` primary key followed by every declared column fragment, then
    /// one `CREATE INDEX <column>_index` statement per indexed column.
    ///
    /// Returns `None` when an identifier or fragment cannot be rendered
    /// as statement text (embedded NUL byte); callers must treat `None`
    /// as "do not attempt creation".
    pub fn create_table_sql(&self, table: &str) -> Option<String> {
        let renderable = |s: &str| !s.contains('\0');

        if !renderable(table)
            || !self.columns.iter().all(|c| renderable(c))
            || !self.indexes.iter().all(|i| renderable(i))
        {
            return None;
        }

        let columns = if self.columns.is_empty() {
            String::new()
        } else {
            format!(",\n    {}", self.columns.join(",\n    "))
        };

        let indexes: Vec<String> = self
            .indexes
            .iter()
            .map(|i| format!("CREATE INDEX \"{i}_index\" ON \"{table}\" ({i});"))
            .collect();

        Some(format!(
            "BEGIN;\nCREATE TABLE \"{table}\" (\n    \"id\" INTEGER PRIMARY KEY AUTOINCREMENT{columns}\n);\n{indexes}\nCOMMIT;",
            indexes = indexes.join("\n"),
        ))
    }

    /// Render the statement that destroys the shard table.
    pub fn drop_table_sql(&self, table: &str) -> String {
        format!("DROP TABLE \"{table}\";")
    }
}
