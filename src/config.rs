// src/config.rs

//! Engine configuration
//!
//! Configuration is an explicit record handed to the engine constructor.
//! The engine keeps its own copy, so nothing can be mutated once a
//! command has begun.

use crate::error::{Error, Result};
use crate::loader::ScriptLoader;
use crate::script::{FilenameAffixes, Placeholders};
use crate::version::TargetVersion;
use std::collections::BTreeMap;
use std::path::PathBuf;

/// The command a [`crate::engine::Engine`] run executes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MigrationCommand {
    #[default]
    Migrate,
    Repair,
    Erase,
}

#[derive(Debug, Clone)]
pub struct Config {
    /// Connection string, used only when no connection is supplied.
    /// For the SQLite driver this is a file path or `:memory:`.
    pub connection_string: String,
    /// Database driver. Only `sqlite` ships in-tree.
    pub driver: String,
    /// Ordered schema names the engine manages. Empty means "use the
    /// schema the connection is currently attached to".
    pub schemas: Vec<String>,
    /// Schema holding the ledger table. Defaults to the first schema.
    pub metadata_table_schema: Option<String>,
    /// Name of the ledger table.
    pub metadata_table_name: String,
    /// Ordered directories scanned for migration scripts.
    pub locations: Vec<PathBuf>,
    /// Text encoding of script bodies. Only UTF-8 is supported.
    pub encoding: String,
    /// Filename affixes (`V`, `__`, `.sql` by default).
    pub affixes: FilenameAffixes,
    pub placeholder_prefix: String,
    pub placeholder_suffix: String,
    /// Placeholder values substituted into script bodies.
    pub placeholders: BTreeMap<String, String>,
    /// Version cap for Migrate.
    pub target_version: TargetVersion,
    pub command: MigrationCommand,
    /// Safety switch: when set, Erase logs and does nothing.
    pub is_erase_disabled: bool,
    /// When set, a validation failure inside Migrate erases the managed
    /// schemas and migration continues from scratch.
    pub must_erase_on_validation_error: bool,
    /// Recorded in the ledger's installed_by column. Empty means: the
    /// database user if the dialect reports one, else the process user.
    pub installed_by: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            connection_string: String::new(),
            driver: "sqlite".to_string(),
            schemas: Vec::new(),
            metadata_table_schema: None,
            metadata_table_name: "changelog".to_string(),
            locations: vec![PathBuf::from("Sql_Scripts")],
            encoding: "UTF-8".to_string(),
            affixes: FilenameAffixes::default(),
            placeholder_prefix: "${".to_string(),
            placeholder_suffix: "}".to_string(),
            placeholders: BTreeMap::new(),
            target_version: TargetVersion::Latest,
            command: MigrationCommand::Migrate,
            is_erase_disabled: false,
            must_erase_on_validation_error: false,
            installed_by: String::new(),
        }
    }
}

impl Config {
    /// Reject configurations the engine cannot honor.
    pub fn validate(&self) -> Result<()> {
        if self.driver != "sqlite" {
            return Err(Error::Configuration(format!(
                "unknown driver '{}' (supported: sqlite)",
                self.driver
            )));
        }
        if !self.encoding.eq_ignore_ascii_case("utf-8") && !self.encoding.eq_ignore_ascii_case("utf8")
        {
            return Err(Error::Configuration(format!(
                "unsupported encoding '{}' (supported: UTF-8)",
                self.encoding
            )));
        }
        if self.metadata_table_name.trim().is_empty() {
            return Err(Error::Configuration(
                "metadata table name must not be blank".to_string(),
            ));
        }
        if self.locations.is_empty() {
            return Err(Error::Configuration(
                "at least one migration location is required".to_string(),
            ));
        }
        if self.affixes.prefix.is_empty()
            || self.affixes.separator.is_empty()
            || self.affixes.suffix.is_empty()
        {
            return Err(Error::Configuration(
                "migration filename prefix, separator, and suffix must not be empty".to_string(),
            ));
        }
        if self.placeholder_prefix.is_empty() || self.placeholder_suffix.is_empty() {
            return Err(Error::Configuration(
                "placeholder prefix and suffix must not be empty".to_string(),
            ));
        }
        Ok(())
    }

    pub(crate) fn placeholder_map(&self) -> Placeholders {
        Placeholders::new(
            &self.placeholders,
            &self.placeholder_prefix,
            &self.placeholder_suffix,
        )
    }

    pub(crate) fn loader(&self) -> ScriptLoader {
        ScriptLoader::new(self.locations.clone(), self.affixes.clone())
    }
}
