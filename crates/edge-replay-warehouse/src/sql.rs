//! SQL statement builders for the reload protocol
//!
//! Table names come from the metadata service or the command line, so every
//! identifier is quoted and every literal is escaped.

use chrono::{DateTime, FixedOffset};

use crate::copy::{CopyAuthorization, CopyOptions, CopySource};

/// Format used for window bounds in predicates
const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S%:z";

/// Escape a SQL identifier by doubling any embedded double-quotes.
/// Combined with wrapping in `"..."`, this prevents identifier injection.
pub fn quote_ident(ident: &str) -> String {
    format!("\"{}\"", ident.replace('"', "\"\""))
}

/// Escape a string literal by doubling embedded single quotes
pub fn quote_literal(value: &str) -> String {
    format!("'{}'", value.replace('\'', "''"))
}

/// Inclusive time range matched by the reload predicates
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RowWindow {
    /// Inclusive lower bound
    pub start: DateTime<FixedOffset>,
    /// Inclusive upper bound
    pub end: DateTime<FixedOffset>,
}

impl RowWindow {
    /// Create a new window
    pub fn new(start: DateTime<FixedOffset>, end: DateTime<FixedOffset>) -> Self {
        Self { start, end }
    }

    /// Whether `ts` falls inside `[start, end]`
    pub fn contains(&self, ts: &DateTime<FixedOffset>) -> bool {
        *ts >= self.start && *ts <= self.end
    }

    fn predicate(&self, column: &str) -> String {
        format!(
            "{} BETWEEN {} AND {}",
            quote_ident(column),
            quote_literal(&self.start.format(TIMESTAMP_FORMAT).to_string()),
            quote_literal(&self.end.format(TIMESTAMP_FORMAT).to_string()),
        )
    }
}

/// Live table addressed by a reload
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableRef {
    /// Schema holding the live tables
    pub schema: String,
    /// Table name
    pub table: String,
    /// Event timestamp column used by the window predicate
    pub time_column: String,
}

impl TableRef {
    /// Create a table reference
    pub fn new(
        schema: impl Into<String>,
        table: impl Into<String>,
        time_column: impl Into<String>,
    ) -> Self {
        Self {
            schema: schema.into(),
            table: table.into(),
            time_column: time_column.into(),
        }
    }

    /// Quoted `schema.table`
    pub fn qualified(&self) -> String {
        format!("{}.{}", quote_ident(&self.schema), quote_ident(&self.table))
    }
}

/// `DELETE` of every live row inside the window
pub fn delete_window(target: &TableRef, window: &RowWindow) -> String {
    format!(
        "DELETE FROM {} WHERE {}",
        target.qualified(),
        window.predicate(&target.time_column)
    )
}

/// Session-scoped import table shaped like the live table
pub fn create_import_table(import_table: &str, target: &TableRef) -> String {
    format!(
        "CREATE TEMP TABLE {} (LIKE {})",
        quote_ident(import_table),
        target.qualified()
    )
}

/// Bulk load of the staged prefix into the import table
pub fn copy_into(
    import_table: &str,
    source: &CopySource,
    auth: &CopyAuthorization,
    options: &CopyOptions,
) -> String {
    format!(
        "COPY {} FROM {} {} {}",
        quote_ident(import_table),
        quote_literal(&source.uri()),
        auth.to_sql(),
        options.to_sql()
    )
}

/// Insert of the in-window import rows into the live table
pub fn insert_window(import_table: &str, target: &TableRef, window: &RowWindow) -> String {
    format!(
        "INSERT INTO {} SELECT * FROM {} WHERE {}",
        target.qualified(),
        quote_ident(import_table),
        window.predicate(&target.time_column)
    )
}
