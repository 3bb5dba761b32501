// src/error.rs

use std::path::PathBuf;
use thiserror::Error;

/// Core error types for sqlshift
#[derive(Error, Debug)]
pub enum Error {
    /// Database-related errors
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Missing or invalid configuration
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// Failed to open or validate a database connection
    #[error("Connection error: {0}")]
    Connection(String),

    /// A configured script location does not exist
    #[error("Migration location not found: {}", .0.display())]
    LocationMissing(PathBuf),

    /// Two discovered scripts share the same version
    #[error("Found multiple migrations with version {version}: {first} and {second}")]
    DuplicateVersion {
        version: String,
        first: String,
        second: String,
    },

    /// A candidate file matched the affixes but not the name grammar
    #[error("Invalid migration file name: {0}")]
    InvalidName(String),

    /// The version part of a file name failed to parse
    #[error("Invalid migration version: {0}")]
    InvalidVersion(String),

    /// An applied script was edited after it was recorded in the ledger
    #[error("Invalid checksum for migration: {0}")]
    IncorrectChecksum(String),

    /// A script inside the applied range has no ledger entry
    #[error("No metadata found for migration: {0}")]
    MetadataNotFound(String),

    /// A migration script failed to execute
    #[error("Migration {script} failed: {source}")]
    Migration {
        script: String,
        #[source]
        source: Box<Error>,
    },

    /// Schema drop failed during erase
    #[error("Failed to drop schema {schema}: {source}")]
    DropSchemaFailed {
        schema: String,
        #[source]
        source: Box<Error>,
    },

    /// Schema erase failed
    #[error("Failed to erase schema {schema}: {source}")]
    EraseSchemaFailed {
        schema: String,
        #[source]
        source: Box<Error>,
    },

    /// Operation the active DBMS cannot perform
    #[error("{operation} is not supported on {dbms}")]
    UnsupportedOperation { dbms: String, operation: String },
}

impl Error {
    /// True for errors produced by history validation, the only class
    /// Migrate may intercept (when erase-on-validation-error is set).
    pub fn is_validation(&self) -> bool {
        matches!(
            self,
            Error::IncorrectChecksum(_) | Error::MetadataNotFound(_)
        )
    }
}

/// Result type alias using sqlshift's Error type
pub type Result<T> = std::result::Result<T, Error>;
