// src/metadata.rs

//! The migration ledger
//!
//! Every engine action is recorded in a metadata table inside the target
//! database: applied migrations, schema-lifecycle markers, and the
//! optional baseline entry. This module holds the typed view over that
//! table; the SQL behind it is supplied by the active dialect through
//! [`MetadataBacking`].

use crate::error::Result;
use crate::version::MigrationVersion;
use chrono::Utc;

/// Ledger entry kinds, persisted as small integers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LedgerEntryType {
    /// An applied (or failed) migration script.
    Migration,
    /// The engine created this schema and may drop it on erase.
    NewSchema,
    /// The engine found this schema empty and may empty it again on erase.
    EmptySchema,
    /// Baseline: versions at or below this are considered applied.
    StartVersion,
}

impl LedgerEntryType {
    pub fn as_code(&self) -> i64 {
        match self {
            LedgerEntryType::Migration => 10,
            LedgerEntryType::NewSchema => 20,
            LedgerEntryType::EmptySchema => 30,
            LedgerEntryType::StartVersion => 40,
        }
    }

    pub fn from_code(code: i64) -> std::result::Result<Self, String> {
        match code {
            10 => Ok(LedgerEntryType::Migration),
            20 => Ok(LedgerEntryType::NewSchema),
            30 => Ok(LedgerEntryType::EmptySchema),
            40 => Ok(LedgerEntryType::StartVersion),
            _ => Err(format!("Invalid ledger entry type: {}", code)),
        }
    }
}

/// One persisted ledger row, id-ascending order equals insertion order.
#[derive(Debug, Clone)]
pub struct LedgerEntry {
    pub id: i64,
    pub entry_type: LedgerEntryType,
    pub version: Option<MigrationVersion>,
    pub description: String,
    pub name: String,
    pub checksum: Option<String>,
    pub installed_on: String,
    pub installed_by: String,
    pub success: bool,
}

/// Insert payload for a ledger row; the id is assigned by the database.
#[derive(Debug, Clone)]
pub struct NewLedgerEntry {
    pub entry_type: LedgerEntryType,
    pub version: Option<MigrationVersion>,
    pub description: String,
    pub name: String,
    pub checksum: Option<String>,
    pub installed_on: String,
    pub installed_by: String,
    pub success: bool,
}

/// Dialect-side persistence for the ledger table.
///
/// Implementations are bound to one (schema, table) pair and one
/// connection. `ensure` must be idempotent.
pub trait MetadataBacking {
    fn ensure(&self) -> Result<()>;
    fn exists(&self) -> Result<bool>;
    fn insert(&self, entry: &NewLedgerEntry) -> Result<i64>;
    /// All rows, id ascending.
    fn entries(&self) -> Result<Vec<LedgerEntry>>;
    fn update_checksum(&self, id: i64, checksum: &str) -> Result<()>;
}

/// Typed ledger operations over a [`MetadataBacking`].
pub struct MetadataStore<'a> {
    backing: Box<dyn MetadataBacking + 'a>,
    installed_by: String,
}

impl<'a> MetadataStore<'a> {
    pub fn new(backing: Box<dyn MetadataBacking + 'a>, installed_by: String) -> Self {
        Self {
            backing,
            installed_by,
        }
    }

    /// Create the ledger table if absent. Idempotent.
    pub fn ensure(&self) -> Result<()> {
        self.backing.ensure()
    }

    /// Has the ledger table been created yet? Never creates it.
    pub fn exists(&self) -> Result<bool> {
        self.backing.exists()
    }

    /// Append one migration entry and return its assigned id.
    pub fn save_migration(
        &self,
        version: &MigrationVersion,
        name: &str,
        description: &str,
        checksum: &str,
        success: bool,
    ) -> Result<i64> {
        self.backing.ensure()?;
        self.backing.insert(&NewLedgerEntry {
            entry_type: LedgerEntryType::Migration,
            version: Some(version.clone()),
            description: description.to_string(),
            name: name.to_string(),
            checksum: Some(checksum.to_string()),
            installed_on: now(),
            installed_by: self.installed_by.clone(),
            success,
        })
    }

    /// Append a NewSchema or EmptySchema consent marker for `schema`.
    pub fn save_schema_marker(&self, entry_type: LedgerEntryType, schema: &str) -> Result<i64> {
        let description = match entry_type {
            LedgerEntryType::NewSchema => "New schema",
            LedgerEntryType::EmptySchema => "Empty schema",
            _ => unreachable!("not a schema marker: {:?}", entry_type),
        };

        self.backing.ensure()?;
        self.backing.insert(&NewLedgerEntry {
            entry_type,
            version: None,
            description: description.to_string(),
            name: schema.to_string(),
            checksum: None,
            installed_on: now(),
            installed_by: self.installed_by.clone(),
            success: true,
        })
    }

    /// Successfully applied migrations, id ascending.
    pub fn list_applied(&self) -> Result<Vec<LedgerEntry>> {
        self.backing.ensure()?;
        Ok(self
            .backing
            .entries()?
            .into_iter()
            .filter(|e| e.entry_type == LedgerEntryType::Migration && e.success)
            .collect())
    }

    /// The most recent baseline version, or the zero sentinel.
    pub fn find_start_version(&self) -> Result<MigrationVersion> {
        self.backing.ensure()?;
        let start = self
            .backing
            .entries()?
            .into_iter()
            .filter(|e| e.entry_type == LedgerEntryType::StartVersion)
            .filter_map(|e| e.version)
            .last();
        Ok(start.unwrap_or_else(MigrationVersion::zero))
    }

    /// Rewrite the checksum of one existing row. Used only by Repair.
    pub fn update_checksum(&self, id: i64, checksum: &str) -> Result<()> {
        self.backing.update_checksum(id, checksum)
    }

    /// May the engine drop this schema? True iff it created it.
    pub fn can_drop_schema(&self, schema: &str) -> Result<bool> {
        self.has_marker(LedgerEntryType::NewSchema, schema)
    }

    /// May the engine empty this schema? True iff it first saw it empty.
    pub fn can_erase_schema(&self, schema: &str) -> Result<bool> {
        self.has_marker(LedgerEntryType::EmptySchema, schema)
    }

    /// Every ledger row, id ascending.
    pub fn entries(&self) -> Result<Vec<LedgerEntry>> {
        self.backing.ensure()?;
        self.backing.entries()
    }

    fn has_marker(&self, entry_type: LedgerEntryType, schema: &str) -> Result<bool> {
        if !self.backing.exists()? {
            return Ok(false);
        }
        Ok(self
            .backing
            .entries()?
            .iter()
            .any(|e| e.entry_type == entry_type && e.name == schema))
    }
}

fn now() -> String {
    Utc::now().format("%Y-%m-%d %H:%M:%S").to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;

    /// In-memory backing used to test the store logic in isolation.
    #[derive(Default)]
    struct FakeBacking {
        created: RefCell<bool>,
        rows: RefCell<Vec<LedgerEntry>>,
    }

    impl MetadataBacking for FakeBacking {
        fn ensure(&self) -> Result<()> {
            *self.created.borrow_mut() = true;
            Ok(())
        }

        fn exists(&self) -> Result<bool> {
            Ok(*self.created.borrow())
        }

        fn insert(&self, entry: &NewLedgerEntry) -> Result<i64> {
            let mut rows = self.rows.borrow_mut();
            let id = rows.len() as i64 + 1;
            rows.push(LedgerEntry {
                id,
                entry_type: entry.entry_type,
                version: entry.version.clone(),
                description: entry.description.clone(),
                name: entry.name.clone(),
                checksum: entry.checksum.clone(),
                installed_on: entry.installed_on.clone(),
                installed_by: entry.installed_by.clone(),
                success: entry.success,
            });
            Ok(id)
        }

        fn entries(&self) -> Result<Vec<LedgerEntry>> {
            Ok(self.rows.borrow().clone())
        }

        fn update_checksum(&self, id: i64, checksum: &str) -> Result<()> {
            for row in self.rows.borrow_mut().iter_mut() {
                if row.id == id {
                    row.checksum = Some(checksum.to_string());
                }
            }
            Ok(())
        }
    }

    fn store(backing: FakeBacking) -> MetadataStore<'static> {
        MetadataStore::new(Box::new(backing), "tester".to_string())
    }

    fn v(s: &str) -> MigrationVersion {
        s.parse().unwrap()
    }

    #[test]
    fn test_save_assigns_increasing_ids() {
        let store = store(FakeBacking::default());
        let first = store
            .save_migration(&v("1"), "V1__a.sql", "a", "c1", true)
            .unwrap();
        let second = store
            .save_migration(&v("2"), "V2__b.sql", "b", "c2", true)
            .unwrap();
        assert!(second > first);
    }

    #[test]
    fn test_list_applied_filters_failures_and_markers() {
        let store = store(FakeBacking::default());
        store
            .save_migration(&v("1"), "V1__a.sql", "a", "c1", true)
            .unwrap();
        store
            .save_migration(&v("2"), "V2__b.sql", "b", "c2", false)
            .unwrap();
        store
            .save_schema_marker(LedgerEntryType::EmptySchema, "main")
            .unwrap();

        let applied = store.list_applied().unwrap();
        assert_eq!(applied.len(), 1);
        assert_eq!(applied[0].name, "V1__a.sql");
        assert_eq!(applied[0].installed_by, "tester");
    }

    #[test]
    fn test_find_start_version_defaults_to_zero() {
        let store = store(FakeBacking::default());
        assert!(store.find_start_version().unwrap().is_zero());
    }

    #[test]
    fn test_find_start_version_takes_latest_baseline() {
        let backing = FakeBacking::default();
        backing.ensure().unwrap();
        for version in ["2", "5"] {
            backing
                .insert(&NewLedgerEntry {
                    entry_type: LedgerEntryType::StartVersion,
                    version: Some(v(version)),
                    description: "baseline".to_string(),
                    name: format!("baseline {}", version),
                    checksum: None,
                    installed_on: now(),
                    installed_by: "tester".to_string(),
                    success: true,
                })
                .unwrap();
        }

        let store = store(backing);
        assert_eq!(store.find_start_version().unwrap(), v("5"));
    }

    #[test]
    fn test_schema_consent_markers() {
        let store = store(FakeBacking::default());
        // No table yet: no consent, and the check must not create it
        assert!(!store.can_drop_schema("app").unwrap());
        assert!(!store.exists().unwrap());

        store
            .save_schema_marker(LedgerEntryType::NewSchema, "app")
            .unwrap();
        store
            .save_schema_marker(LedgerEntryType::EmptySchema, "audit")
            .unwrap();

        assert!(store.can_drop_schema("app").unwrap());
        assert!(!store.can_erase_schema("app").unwrap());
        assert!(store.can_erase_schema("audit").unwrap());
        assert!(!store.can_drop_schema("audit").unwrap());
        assert!(!store.can_drop_schema("other").unwrap());
    }

    #[test]
    fn test_update_checksum_only_touches_checksum() {
        let store = store(FakeBacking::default());
        let id = store
            .save_migration(&v("1"), "V1__a.sql", "a", "old", true)
            .unwrap();
        store.update_checksum(id, "new").unwrap();

        let entries = store.entries().unwrap();
        assert_eq!(entries[0].checksum.as_deref(), Some("new"));
        assert_eq!(entries[0].name, "V1__a.sql");
        assert_eq!(entries[0].version, Some(v("1")));
        assert!(entries[0].success);
    }
}
