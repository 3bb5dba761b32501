// src/engine.rs

//! The migration engine
//!
//! Orchestrates the commands (Migrate, Validate, Repair, Erase) over the
//! script loader, the ledger, and the dialect helper. Ordering and
//! transactional discipline live here: scripts apply in strictly
//! ascending version order, each inside its own transaction, with the
//! ledger write committed before the next script begins.

use crate::config::{Config, MigrationCommand};
use crate::connection;
use crate::dialect::{self, DbHelper, DbmsKind};
use crate::error::{Error, Result};
use crate::metadata::{LedgerEntry, LedgerEntryType, MetadataStore};
use crate::script::{MigrationScript, Placeholders};
use crate::version::MigrationVersion;
use rusqlite::Connection;
use tracing::{debug, info, warn};

/// How history validation treats a checksum mismatch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValidationMode {
    /// A mismatch is fatal.
    Strict,
    /// A mismatch is rewritten in the ledger.
    Repair,
}

pub struct Engine {
    config: Config,
    conn: Connection,
    schemas: Vec<String>,
    metadata_schema: String,
    migrations_applied: u32,
    checksums_repaired: u32,
}

impl Engine {
    /// Build an engine that opens its own connection from the config.
    pub fn from_config(config: Config) -> Result<Self> {
        config.validate()?;
        let conn = connection::open_from_config(&config)?;
        Ok(Self::build(config, conn))
    }

    /// Build an engine over a caller-supplied open connection. The
    /// connection can be taken back with [`Engine::into_connection`].
    pub fn with_connection(config: Config, conn: Connection) -> Result<Self> {
        config.validate()?;
        Ok(Self::build(config, conn))
    }

    fn build(config: Config, conn: Connection) -> Self {
        Self {
            config,
            conn,
            schemas: Vec::new(),
            metadata_schema: String::new(),
            migrations_applied: 0,
            checksums_repaired: 0,
        }
    }

    /// Run the configured command.
    pub fn run(&mut self) -> Result<()> {
        match self.config.command {
            MigrationCommand::Migrate => self.migrate(),
            MigrationCommand::Repair => self.repair(),
            MigrationCommand::Erase => self.erase(),
        }
    }

    /// Migrations applied by the last command.
    pub fn migrations_applied(&self) -> u32 {
        self.migrations_applied
    }

    /// Checksums repaired by the last command.
    pub fn checksums_repaired(&self) -> u32 {
        self.checksums_repaired
    }

    /// Give the connection back to the caller.
    pub fn into_connection(self) -> Connection {
        self.conn
    }

    /// Apply every outstanding script up to the target version.
    pub fn migrate(&mut self) -> Result<()> {
        let kind = self.initialize()?;
        let scripts = self.config.loader().discover()?;
        let placeholders = self.config.placeholder_map();

        let helper = dialect::helper_for(kind, &self.conn);
        let store = MetadataStore::new(
            helper.metadata_backing(&self.metadata_schema, &self.config.metadata_table_name),
            resolve_installed_by(&self.config, helper.as_ref()),
        );

        match validate_history(&store, &scripts, &placeholders, ValidationMode::Strict) {
            Ok(_) => {}
            Err(e) if e.is_validation() && self.config.must_erase_on_validation_error => {
                warn!("Validation failed ({}); erasing schemas and migrating from scratch", e);
                erase_schemas(
                    helper.as_ref(),
                    &store,
                    &schemas_to_consider(&self.schemas, &self.metadata_schema),
                    self.config.is_erase_disabled,
                )?;
            }
            Err(e) => return Err(e),
        }

        manage_schemas(
            helper.as_ref(),
            &store,
            &schemas_to_consider(&self.schemas, &self.metadata_schema),
        )?;

        let last_applied = store
            .list_applied()?
            .last()
            .and_then(|e| e.version.clone())
            .unwrap_or_else(MigrationVersion::zero);
        let mut final_version = last_applied.clone();

        let plan: Vec<&MigrationScript> = scripts
            .iter()
            .skip_while(|s| s.version() <= &last_applied)
            .take_while(|s| self.config.target_version.includes(s.version()))
            .collect();

        for script in plan {
            debug!("Applying migration {}", script.name());
            let checksum = script.checksum(&placeholders)?;
            let body = script.body(&placeholders)?;

            helper.begin()?;
            let applied = helper.execute(&body).and_then(|_| {
                store.save_migration(
                    script.version(),
                    script.name(),
                    script.description(),
                    &checksum,
                    true,
                )?;
                helper.commit()
            });

            if let Err(e) = applied {
                let _ = helper.rollback();
                // The failure record must survive the rollback: write it
                // in its own committed statement.
                if let Err(record_err) = store.save_migration(
                    script.version(),
                    script.name(),
                    script.description(),
                    &checksum,
                    false,
                ) {
                    warn!(
                        "Could not record failed migration {}: {}",
                        script.name(),
                        record_err
                    );
                }
                return Err(Error::Migration {
                    script: script.name().to_string(),
                    source: Box::new(e),
                });
            }

            self.migrations_applied += 1;
            final_version = script.version().clone();
            info!("Migration {} applied", script.name());
        }

        if self.migrations_applied == 0 {
            info!("Nothing to migrate: database is up to date");
        } else {
            info!(
                "Database migrated to version {}. {} migration(s) applied.",
                final_version, self.migrations_applied
            );
        }
        Ok(())
    }

    /// Check the recorded history against the on-disk scripts without
    /// touching anything.
    pub fn validate(&mut self) -> Result<()> {
        let kind = self.initialize()?;
        let scripts = self.config.loader().discover()?;
        let placeholders = self.config.placeholder_map();

        let helper = dialect::helper_for(kind, &self.conn);
        let store = MetadataStore::new(
            helper.metadata_backing(&self.metadata_schema, &self.config.metadata_table_name),
            resolve_installed_by(&self.config, helper.as_ref()),
        );

        validate_history(&store, &scripts, &placeholders, ValidationMode::Strict)?;
        info!("Metadata history successfully validated");
        Ok(())
    }

    /// Rewrite ledger checksums that no longer match the on-disk scripts.
    pub fn repair(&mut self) -> Result<()> {
        let kind = self.initialize()?;
        let scripts = self.config.loader().discover()?;
        let placeholders = self.config.placeholder_map();

        let helper = dialect::helper_for(kind, &self.conn);
        let store = MetadataStore::new(
            helper.metadata_backing(&self.metadata_schema, &self.config.metadata_table_name),
            resolve_installed_by(&self.config, helper.as_ref()),
        );

        let repaired = validate_history(&store, &scripts, &placeholders, ValidationMode::Repair)?;
        self.checksums_repaired = repaired;

        if repaired == 0 {
            info!("Nothing to repair: metadata history is consistent");
        } else {
            info!("Successfully repaired {} migration(s)", repaired);
        }
        Ok(())
    }

    /// Drop or empty the managed schemas, honoring the ledger consents.
    pub fn erase(&mut self) -> Result<()> {
        if self.config.is_erase_disabled {
            warn!("Erase is disabled by configuration, nothing done");
            return Ok(());
        }

        let kind = self.initialize()?;
        let helper = dialect::helper_for(kind, &self.conn);
        let store = MetadataStore::new(
            helper.metadata_backing(&self.metadata_schema, &self.config.metadata_table_name),
            resolve_installed_by(&self.config, helper.as_ref()),
        );

        erase_schemas(
            helper.as_ref(),
            &store,
            &schemas_to_consider(&self.schemas, &self.metadata_schema),
            false,
        )
    }

    /// Discovered scripts and the full ledger, for reporting.
    pub fn info(&mut self) -> Result<(Vec<MigrationScript>, Vec<LedgerEntry>)> {
        let kind = self.initialize()?;
        let scripts = self.config.loader().discover()?;

        let helper = dialect::helper_for(kind, &self.conn);
        let store = MetadataStore::new(
            helper.metadata_backing(&self.metadata_schema, &self.config.metadata_table_name),
            resolve_installed_by(&self.config, helper.as_ref()),
        );

        let entries = if store.exists()? {
            store.entries()?
        } else {
            Vec::new()
        };
        Ok((scripts, entries))
    }

    /// Precondition for every command: counters reset, connection
    /// validated, DBMS classified, schema list and metadata schema
    /// resolved.
    fn initialize(&mut self) -> Result<DbmsKind> {
        self.migrations_applied = 0;
        self.checksums_repaired = 0;

        connection::validate(&self.conn)?;
        let kind = dialect::classify(&self.conn)?;
        debug!("Connected to {}", kind);

        let helper = dialect::helper_for(kind, &self.conn);
        let mut schemas: Vec<String> = self
            .config
            .schemas
            .iter()
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect();
        if schemas.is_empty() {
            schemas.push(helper.current_schema()?);
        }

        self.metadata_schema = self
            .config
            .metadata_table_schema
            .clone()
            .filter(|s| !s.trim().is_empty())
            .unwrap_or_else(|| schemas[0].clone());
        self.schemas = schemas;
        Ok(kind)
    }
}

/// The identity recorded in the ledger's installed_by column.
fn resolve_installed_by(config: &Config, helper: &dyn DbHelper) -> String {
    if !config.installed_by.trim().is_empty() {
        return config.installed_by.clone();
    }
    if let Ok(Some(user)) = helper.database_user() {
        if !user.is_empty() {
            return user;
        }
    }
    std::env::var("USER").unwrap_or_else(|_| "unknown".to_string())
}

/// Configured schemas plus the metadata schema, blank-filtered and
/// deduplicated case-insensitively, first appearance wins.
fn schemas_to_consider(schemas: &[String], metadata_schema: &str) -> Vec<String> {
    let mut result: Vec<String> = Vec::new();
    for name in schemas.iter().map(String::as_str).chain([metadata_schema]) {
        let name = name.trim();
        if name.is_empty() {
            continue;
        }
        if !result.iter().any(|s| s.eq_ignore_ascii_case(name)) {
            result.push(name.to_string());
        }
    }
    result
}

/// The shared validation routine behind Migrate, Validate, and Repair.
///
/// Checks every script between the baseline and the last applied version
/// against its ledger entry. Returns the number of checksums repaired
/// (always 0 in [`ValidationMode::Strict`]).
fn validate_history(
    store: &MetadataStore,
    scripts: &[MigrationScript],
    placeholders: &Placeholders,
    mode: ValidationMode,
) -> Result<u32> {
    if !store.exists()? {
        info!("No metadata table found, nothing to validate");
        return Ok(0);
    }

    let applied = store.list_applied()?;
    let Some(last) = applied.last() else {
        return Ok(0);
    };
    let last_version = last
        .version
        .clone()
        .unwrap_or_else(MigrationVersion::zero);
    let start = store.find_start_version()?;

    let mut repaired = 0;
    for script in scripts {
        if script.version() < &start || script.version() > &last_version {
            continue;
        }

        let entry = applied
            .iter()
            .find(|e| e.version.as_ref() == Some(script.version()))
            .ok_or_else(|| Error::MetadataNotFound(script.name().to_string()))?;

        let checksum = script.checksum(placeholders)?;
        if entry.checksum.as_deref() != Some(checksum.as_str()) {
            match mode {
                ValidationMode::Strict => {
                    return Err(Error::IncorrectChecksum(script.name().to_string()));
                }
                ValidationMode::Repair => {
                    store.update_checksum(entry.id, &checksum)?;
                    repaired += 1;
                    info!("Repaired checksum of migration {}", entry.name);
                }
            }
        }
    }
    Ok(repaired)
}

/// Record schema state before any script runs: create absent schemas
/// (with a NewSchema consent marker) and tag empty ones (EmptySchema).
fn manage_schemas(helper: &dyn DbHelper, store: &MetadataStore, schemas: &[String]) -> Result<()> {
    for name in schemas {
        if !helper.schema_exists(name)? {
            helper.begin()?;
            let created = helper.create_schema(name).and_then(|_| {
                store.save_schema_marker(LedgerEntryType::NewSchema, name)?;
                helper.commit()
            });
            if let Err(e) = created {
                let _ = helper.rollback();
                return Err(e);
            }
            info!("Schema {} created", name);
        } else if helper.schema_is_empty(name)? {
            store.save_schema_marker(LedgerEntryType::EmptySchema, name)?;
            debug!("Schema {} found empty", name);
        }
    }
    Ok(())
}

enum EraseAction {
    Drop,
    Erase,
    Skip,
}

/// Destroy managed schemas inside one transaction. Consents are read for
/// every schema before the first destructive statement: the ledger lives
/// inside one of the schemas about to go away.
fn erase_schemas(
    helper: &dyn DbHelper,
    store: &MetadataStore,
    schemas: &[String],
    erase_disabled: bool,
) -> Result<()> {
    if erase_disabled {
        warn!("Erase is disabled by configuration, nothing done");
        return Ok(());
    }

    let mut plan = Vec::new();
    for name in schemas {
        let action = if store.can_drop_schema(name)? {
            EraseAction::Drop
        } else if store.can_erase_schema(name)? {
            EraseAction::Erase
        } else {
            EraseAction::Skip
        };
        plan.push((name, action));
    }

    helper.begin()?;
    for (name, action) in &plan {
        let outcome = match action {
            EraseAction::Drop => helper
                .drop_schema(name)
                .map_err(|e| Error::DropSchemaFailed {
                    schema: name.to_string(),
                    source: Box::new(e),
                })
                .map(|_| info!("Schema {} dropped", name)),
            EraseAction::Erase => helper
                .erase_schema(name)
                .map_err(|e| Error::EraseSchemaFailed {
                    schema: name.to_string(),
                    source: Box::new(e),
                })
                .map(|_| info!("Schema {} erased", name)),
            EraseAction::Skip => {
                debug!("Schema {} is not managed by the engine, skipped", name);
                Ok(())
            }
        };
        if let Err(e) = outcome {
            let _ = helper.rollback();
            return Err(e);
        }
    }
    helper.commit()?;
    Ok(())
}
