// src/connection.rs

//! Connection acquisition and validation
//!
//! The engine either receives an open connection from the caller or opens
//! one itself from the configured driver and connection string. Either way
//! the connection is round-trip validated before any command work starts.

use crate::config::Config;
use crate::error::{Error, Result};
use rusqlite::Connection;
use tracing::debug;

/// Open a connection from the configured connection string.
///
/// For the SQLite driver the connection string is a file path or
/// `:memory:`.
pub fn open_from_config(config: &Config) -> Result<Connection> {
    if config.connection_string.is_empty() {
        return Err(Error::Configuration(
            "a connection string is required when no connection is supplied".to_string(),
        ));
    }

    debug!("Opening connection to {}", config.connection_string);
    let conn = Connection::open(&config.connection_string).map_err(|e| {
        Error::Connection(format!(
            "failed to open {}: {}",
            config.connection_string, e
        ))
    })?;

    conn.execute_batch("PRAGMA busy_timeout = 5000;")?;
    validate(&conn)?;
    Ok(conn)
}

/// Round-trip check that the connection is alive and usable.
pub fn validate(conn: &Connection) -> Result<()> {
    conn.query_row("SELECT 1", [], |row| row.get::<_, i64>(0))
        .map_err(|e| Error::Connection(format!("connection validation failed: {}", e)))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_open_in_memory() {
        let config = Config {
            connection_string: ":memory:".to_string(),
            ..Config::default()
        };
        let conn = open_from_config(&config).unwrap();
        assert!(validate(&conn).is_ok());
    }

    #[test]
    fn test_open_requires_connection_string() {
        let config = Config::default();
        assert!(matches!(
            open_from_config(&config),
            Err(Error::Configuration(_))
        ));
    }

    #[test]
    fn test_open_bad_path() {
        let config = Config {
            connection_string: "/nonexistent/dir/db.sqlite".to_string(),
            ..Config::default()
        };
        assert!(matches!(open_from_config(&config), Err(Error::Connection(_))));
    }
}
