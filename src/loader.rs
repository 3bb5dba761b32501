// src/loader.rs

//! Migration script discovery
//!
//! Walks the configured locations, parses candidate file names, and
//! returns the scripts as one strictly version-ascending sequence.
//! Non-candidate files (READMEs, helper SQL without the affixes) are
//! skipped; a missing location or a duplicate version is fatal.

use crate::error::{Error, Result};
use crate::script::{FilenameAffixes, MigrationScript};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::debug;

pub struct ScriptLoader {
    locations: Vec<PathBuf>,
    affixes: FilenameAffixes,
}

impl ScriptLoader {
    pub fn new(locations: Vec<PathBuf>, affixes: FilenameAffixes) -> Self {
        Self { locations, affixes }
    }

    /// Discover every migration script under the configured locations.
    ///
    /// Locations are scanned recursively. The result is sorted by version;
    /// two scripts sharing a version abort the discovery pass.
    pub fn discover(&self) -> Result<Vec<MigrationScript>> {
        let mut scripts = Vec::new();

        for location in &self.locations {
            if !location.is_dir() {
                return Err(Error::LocationMissing(location.clone()));
            }
            self.scan_dir(location, &mut scripts)?;
        }

        scripts.sort_by(|a, b| a.version().cmp(b.version()));

        for pair in scripts.windows(2) {
            if pair[0].version() == pair[1].version() {
                return Err(Error::DuplicateVersion {
                    version: pair[0].version().to_string(),
                    first: pair[0].path().display().to_string(),
                    second: pair[1].path().display().to_string(),
                });
            }
        }

        debug!("Discovered {} migration script(s)", scripts.len());
        Ok(scripts)
    }

    fn scan_dir(&self, dir: &Path, out: &mut Vec<MigrationScript>) -> Result<()> {
        let mut entries: Vec<_> = fs::read_dir(dir)?.collect::<std::io::Result<_>>()?;
        entries.sort_by_key(|e| e.file_name());

        for entry in entries {
            let path = entry.path();
            let name = entry.file_name();
            if name.to_string_lossy().starts_with('.') {
                continue;
            }

            if path.is_dir() {
                self.scan_dir(&path, out)?;
            } else if let Some(script) = MigrationScript::from_path(&path, &self.affixes)? {
                debug!("Found migration script {}", script.name());
                out.push(script);
            }
        }

        Ok(())
    }
}
