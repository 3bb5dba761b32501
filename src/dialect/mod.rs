// src/dialect/mod.rs

//! Per-DBMS operations
//!
//! The engine talks to the database exclusively through the [`DbHelper`]
//! seam: schema lifecycle, SQL execution, transaction control, and the
//! ledger persistence behind [`crate::metadata::MetadataBacking`]. One
//! implementation ships in-tree, SQLite.

pub mod sqlite;

use crate::error::{Error, Result};
use crate::metadata::MetadataBacking;
use rusqlite::Connection;
use std::fmt;

/// Supported database systems.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DbmsKind {
    Sqlite,
}

impl DbmsKind {
    pub fn as_str(&self) -> &str {
        match self {
            DbmsKind::Sqlite => "SQLite",
        }
    }
}

impl fmt::Display for DbmsKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Identify the DBMS behind a connection with a round trip.
pub fn classify(conn: &Connection) -> Result<DbmsKind> {
    conn.query_row("SELECT sqlite_version()", [], |row| row.get::<_, String>(0))
        .map_err(|e| Error::Connection(format!("failed to identify DBMS: {}", e)))?;
    Ok(DbmsKind::Sqlite)
}

/// Per-DBMS operations bound to one connection.
pub trait DbHelper {
    fn kind(&self) -> DbmsKind;

    /// The schema the connection is currently attached to.
    fn current_schema(&self) -> Result<String>;

    fn schema_exists(&self, name: &str) -> Result<bool>;

    /// True when the schema holds no objects at all, ledger table included.
    fn schema_is_empty(&self, name: &str) -> Result<bool>;

    fn create_schema(&self, name: &str) -> Result<()>;

    fn drop_schema(&self, name: &str) -> Result<()>;

    /// Drop every object inside the schema, keeping the schema itself.
    fn erase_schema(&self, name: &str) -> Result<()>;

    /// Execute one SQL batch, returning the rows affected by its last
    /// statement.
    fn execute(&self, sql: &str) -> Result<usize>;

    fn begin(&self) -> Result<()>;
    fn commit(&self) -> Result<()>;
    fn rollback(&self) -> Result<()>;

    /// The authenticated database user, if the DBMS has the concept.
    fn database_user(&self) -> Result<Option<String>>;

    /// Ledger persistence bound to (schema, table) on this connection.
    fn metadata_backing<'h>(&'h self, schema: &str, table: &str)
    -> Box<dyn MetadataBacking + 'h>;
}

/// Build the helper for a classified connection.
pub fn helper_for(kind: DbmsKind, conn: &Connection) -> Box<dyn DbHelper + '_> {
    match kind {
        DbmsKind::Sqlite => Box::new(sqlite::SqliteHelper::new(conn)),
    }
}
