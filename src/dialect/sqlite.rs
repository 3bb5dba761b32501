// src/dialect/sqlite.rs

//! SQLite dialect
//!
//! Schemas map to the entries of `PRAGMA database_list` (`main`, `temp`,
//! attached databases). SQLite cannot create or drop schemas through SQL,
//! so those operations report as unsupported; `main` always exists, which
//! keeps the normal engine flow clear of them. DDL is transactional in
//! SQLite, so the per-script envelope holds fully.

use crate::dialect::{DbHelper, DbmsKind};
use crate::error::{Error, Result};
use crate::metadata::{LedgerEntry, LedgerEntryType, MetadataBacking, NewLedgerEntry};
use crate::version::MigrationVersion;
use rusqlite::{Connection, Row, params};
use tracing::debug;

/// Double-quote an identifier for SQLite.
fn quote_ident(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

pub struct SqliteHelper<'c> {
    conn: &'c Connection,
}

impl<'c> SqliteHelper<'c> {
    pub fn new(conn: &'c Connection) -> Self {
        Self { conn }
    }

    fn unsupported(&self, operation: &str) -> Error {
        Error::UnsupportedOperation {
            dbms: DbmsKind::Sqlite.as_str().to_string(),
            operation: operation.to_string(),
        }
    }

    /// Objects in `schema`, excluding SQLite-internal ones.
    fn schema_objects(&self, schema: &str) -> Result<Vec<(String, String)>> {
        let sql = format!(
            "SELECT type, name FROM {}.sqlite_master WHERE name NOT LIKE 'sqlite_%'",
            quote_ident(schema)
        );
        let mut stmt = self.conn.prepare(&sql)?;
        let objects = stmt
            .query_map([], |row| Ok((row.get(0)?, row.get(1)?)))?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(objects)
    }
}

impl DbHelper for SqliteHelper<'_> {
    fn kind(&self) -> DbmsKind {
        DbmsKind::Sqlite
    }

    fn current_schema(&self) -> Result<String> {
        Ok("main".to_string())
    }

    fn schema_exists(&self, name: &str) -> Result<bool> {
        let mut stmt = self.conn.prepare("PRAGMA database_list")?;
        let names = stmt
            .query_map([], |row| row.get::<_, String>(1))?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(names.iter().any(|n| n.eq_ignore_ascii_case(name)))
    }

    fn schema_is_empty(&self, name: &str) -> Result<bool> {
        Ok(self.schema_objects(name)?.is_empty())
    }

    fn create_schema(&self, _name: &str) -> Result<()> {
        // ATTACH is the only way to add a schema and is rejected inside a
        // transaction, so SQLite schemas are outside the engine's mandate.
        Err(self.unsupported("CREATE SCHEMA"))
    }

    fn drop_schema(&self, _name: &str) -> Result<()> {
        Err(self.unsupported("DROP SCHEMA"))
    }

    fn erase_schema(&self, name: &str) -> Result<()> {
        let objects = self.schema_objects(name)?;
        let schema = quote_ident(name);

        self.conn.execute_batch("PRAGMA defer_foreign_keys = ON")?;

        // Triggers and views first, tables last: dependents before
        // dependencies. Table-owned indexes go away with their table.
        for wanted in ["trigger", "view", "index", "table"] {
            for (object_type, object_name) in &objects {
                if object_type != wanted {
                    continue;
                }
                debug!("Dropping {} {}.{}", object_type, name, object_name);
                self.conn.execute_batch(&format!(
                    "DROP {} {}.{}",
                    object_type.to_uppercase(),
                    schema,
                    quote_ident(object_name)
                ))?;
            }
        }
        Ok(())
    }

    fn execute(&self, sql: &str) -> Result<usize> {
        self.conn.execute_batch(sql)?;
        Ok(self.conn.changes() as usize)
    }

    fn begin(&self) -> Result<()> {
        self.conn.execute_batch("BEGIN")?;
        Ok(())
    }

    fn commit(&self) -> Result<()> {
        self.conn.execute_batch("COMMIT")?;
        Ok(())
    }

    fn rollback(&self) -> Result<()> {
        self.conn.execute_batch("ROLLBACK")?;
        Ok(())
    }

    fn database_user(&self) -> Result<Option<String>> {
        // SQLite has no authenticated users
        Ok(None)
    }

    fn metadata_backing<'h>(
        &'h self,
        schema: &str,
        table: &str,
    ) -> Box<dyn MetadataBacking + 'h> {
        Box::new(SqliteMetadataBacking {
            conn: self.conn,
            schema: schema.to_string(),
            table: table.to_string(),
        })
    }
}

pub struct SqliteMetadataBacking<'c> {
    conn: &'c Connection,
    schema: String,
    table: String,
}

impl SqliteMetadataBacking<'_> {
    fn qualified(&self) -> String {
        format!("{}.{}", quote_ident(&self.schema), quote_ident(&self.table))
    }

    fn from_row(row: &Row) -> rusqlite::Result<LedgerEntry> {
        let code: i64 = row.get(1)?;
        let entry_type = LedgerEntryType::from_code(code).map_err(|e| {
            rusqlite::Error::FromSqlConversionFailure(
                1,
                rusqlite::types::Type::Integer,
                Box::new(std::io::Error::new(std::io::ErrorKind::InvalidData, e)),
            )
        })?;

        let version_text: Option<String> = row.get(2)?;
        let version = match version_text {
            Some(text) => Some(text.parse::<MigrationVersion>().map_err(|e| {
                rusqlite::Error::FromSqlConversionFailure(
                    2,
                    rusqlite::types::Type::Text,
                    Box::new(std::io::Error::new(
                        std::io::ErrorKind::InvalidData,
                        e.to_string(),
                    )),
                )
            })?),
            None => None,
        };

        Ok(LedgerEntry {
            id: row.get(0)?,
            entry_type,
            version,
            description: row.get(3)?,
            name: row.get(4)?,
            checksum: row.get(5)?,
            installed_on: row.get(6)?,
            installed_by: row.get(7)?,
            success: row.get(8)?,
        })
    }
}

impl MetadataBacking for SqliteMetadataBacking<'_> {
    fn ensure(&self) -> Result<()> {
        self.conn.execute_batch(&format!(
            "CREATE TABLE IF NOT EXISTS {} (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                type INTEGER NOT NULL,
                version TEXT,
                description TEXT NOT NULL,
                name TEXT NOT NULL,
                checksum TEXT,
                installed_on TEXT NOT NULL,
                installed_by TEXT NOT NULL,
                success INTEGER NOT NULL
            )",
            self.qualified()
        ))?;
        Ok(())
    }

    fn exists(&self) -> Result<bool> {
        let sql = format!(
            "SELECT count(*) FROM {}.sqlite_master WHERE type = 'table' AND name = ?1",
            quote_ident(&self.schema)
        );
        let count: i64 = self.conn.query_row(&sql, [&self.table], |row| row.get(0))?;
        Ok(count > 0)
    }

    fn insert(&self, entry: &NewLedgerEntry) -> Result<i64> {
        self.conn.execute(
            &format!(
                "INSERT INTO {} (type, version, description, name, checksum, installed_on, installed_by, success)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
                self.qualified()
            ),
            params![
                entry.entry_type.as_code(),
                entry.version.as_ref().map(|v| v.to_string()),
                &entry.description,
                &entry.name,
                &entry.checksum,
                &entry.installed_on,
                &entry.installed_by,
                entry.success,
            ],
        )?;
        Ok(self.conn.last_insert_rowid())
    }

    fn entries(&self) -> Result<Vec<LedgerEntry>> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT id, type, version, description, name, checksum, installed_on, installed_by, success
             FROM {} ORDER BY id",
            self.qualified()
        ))?;

        let entries = stmt
            .query_map([], Self::from_row)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(entries)
    }

    fn update_checksum(&self, id: i64, checksum: &str) -> Result<()> {
        self.conn.execute(
            &format!("UPDATE {} SET checksum = ?1 WHERE id = ?2", self.qualified()),
            params![checksum, id],
        )?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn helper(conn: &Connection) -> SqliteHelper<'_> {
        SqliteHelper::new(conn)
    }

    #[test]
    fn test_current_schema_and_existence() {
        let conn = Connection::open_in_memory().unwrap();
        let helper = helper(&conn);

        assert_eq!(helper.current_schema().unwrap(), "main");
        assert!(helper.schema_exists("main").unwrap());
        assert!(helper.schema_exists("MAIN").unwrap());
        assert!(!helper.schema_exists("missing").unwrap());
    }

    #[test]
    fn test_schema_emptiness() {
        let conn = Connection::open_in_memory().unwrap();
        let helper = helper(&conn);

        assert!(helper.schema_is_empty("main").unwrap());
        helper.execute("CREATE TABLE t (id INTEGER)").unwrap();
        assert!(!helper.schema_is_empty("main").unwrap());
    }

    #[test]
    fn test_schema_lifecycle_unsupported() {
        let conn = Connection::open_in_memory().unwrap();
        let helper = helper(&conn);

        assert!(matches!(
            helper.create_schema("app"),
            Err(Error::UnsupportedOperation { .. })
        ));
        assert!(matches!(
            helper.drop_schema("app"),
            Err(Error::UnsupportedOperation { .. })
        ));
    }

    #[test]
    fn test_erase_drops_all_objects() {
        let conn = Connection::open_in_memory().unwrap();
        let helper = helper(&conn);

        helper
            .execute(
                "CREATE TABLE users (id INTEGER PRIMARY KEY, name TEXT);
                 CREATE INDEX idx_users_name ON users(name);
                 CREATE VIEW user_names AS SELECT name FROM users;
                 CREATE TRIGGER trg AFTER INSERT ON users BEGIN SELECT 1; END;",
            )
            .unwrap();
        assert!(!helper.schema_is_empty("main").unwrap());

        helper.erase_schema("main").unwrap();
        assert!(helper.schema_is_empty("main").unwrap());
    }

    #[test]
    fn test_transaction_envelope() {
        let conn = Connection::open_in_memory().unwrap();
        let helper = helper(&conn);

        helper.execute("CREATE TABLE t (id INTEGER)").unwrap();

        helper.begin().unwrap();
        helper.execute("INSERT INTO t VALUES (1)").unwrap();
        helper.rollback().unwrap();

        let count: i64 = conn
            .query_row("SELECT count(*) FROM t", [], |row| row.get(0))
            .unwrap();
        assert_eq!(count, 0);

        helper.begin().unwrap();
        helper.execute("INSERT INTO t VALUES (1)").unwrap();
        helper.commit().unwrap();

        let count: i64 = conn
            .query_row("SELECT count(*) FROM t", [], |row| row.get(0))
            .unwrap();
        assert_eq!(count, 1);
    }

    #[test]
    fn test_metadata_backing_round_trip() {
        let conn = Connection::open_in_memory().unwrap();
        let helper = helper(&conn);
        let backing = helper.metadata_backing("main", "changelog");

        assert!(!backing.exists().unwrap());
        backing.ensure().unwrap();
        backing.ensure().unwrap();
        assert!(backing.exists().unwrap());

        let id = backing
            .insert(&NewLedgerEntry {
                entry_type: LedgerEntryType::Migration,
                version: Some("1.2".parse().unwrap()),
                description: "init".to_string(),
                name: "V1.2__init.sql".to_string(),
                checksum: Some("abc".to_string()),
                installed_on: "2026-01-01 00:00:00".to_string(),
                installed_by: "tester".to_string(),
                success: true,
            })
            .unwrap();

        let entries = backing.entries().unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].id, id);
        assert_eq!(entries[0].entry_type, LedgerEntryType::Migration);
        assert_eq!(entries[0].version, Some("1.2".parse().unwrap()));
        assert_eq!(entries[0].checksum.as_deref(), Some("abc"));
        assert!(entries[0].success);

        backing.update_checksum(id, "def").unwrap();
        let entries = backing.entries().unwrap();
        assert_eq!(entries[0].checksum.as_deref(), Some("def"));
    }
}
