// src/script.rs

//! Migration script entities
//!
//! A migration script is one SQL file whose name encodes a version and a
//! description, e.g. `V1.2__add_users.sql`. Scripts are immutable once
//! discovered; the body is read from disk on demand, substituted with the
//! configured placeholders, and hashed for the ledger checksum.

use crate::error::{Error, Result};
use crate::version::MigrationVersion;
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

/// Filename affixes for migration scripts: `<prefix><version><separator><description><suffix>`
#[derive(Debug, Clone)]
pub struct FilenameAffixes {
    pub prefix: String,
    pub separator: String,
    pub suffix: String,
}

impl Default for FilenameAffixes {
    fn default() -> Self {
        Self {
            prefix: "V".to_string(),
            separator: "__".to_string(),
            suffix: ".sql".to_string(),
        }
    }
}

/// Placeholder substitution for script bodies.
///
/// Each configured key is replaced wherever `<prefix>KEY<suffix>` occurs.
/// Tokens with no configured value pass through untouched.
#[derive(Debug, Clone, Default)]
pub struct Placeholders {
    tokens: Vec<(String, String)>,
}

impl Placeholders {
    pub fn new(values: &BTreeMap<String, String>, prefix: &str, suffix: &str) -> Self {
        let tokens = values
            .iter()
            .map(|(key, value)| (format!("{}{}{}", prefix, key, suffix), value.clone()))
            .collect();
        Self { tokens }
    }

    pub fn apply(&self, body: &str) -> String {
        let mut out = body.to_string();
        for (token, value) in &self.tokens {
            out = out.replace(token, value);
        }
        out
    }
}

/// One on-disk migration script. Identity is the version; two scripts
/// sharing a version is a discovery error caught by the loader.
#[derive(Debug, Clone)]
pub struct MigrationScript {
    version: MigrationVersion,
    name: String,
    description: String,
    path: PathBuf,
}

impl MigrationScript {
    /// Parse a candidate file into a script.
    ///
    /// Returns `Ok(None)` when the file name does not carry the configured
    /// prefix and suffix (README-style co-located files are ignored).
    /// A file that carries both but fails the grammar in between is an
    /// error: a typo in a migration name must not silently skip it.
    pub fn from_path(path: &Path, affixes: &FilenameAffixes) -> Result<Option<Self>> {
        let file_name = match path.file_name().and_then(|n| n.to_str()) {
            Some(name) => name,
            None => return Ok(None),
        };

        let stem = match file_name
            .strip_prefix(&affixes.prefix)
            .and_then(|rest| rest.strip_suffix(&affixes.suffix))
        {
            Some(stem) => stem,
            None => return Ok(None),
        };

        let (version_part, description_part) = stem
            .split_once(&affixes.separator)
            .ok_or_else(|| Error::InvalidName(file_name.to_string()))?;

        let version: MigrationVersion = version_part.parse().map_err(|_| {
            Error::InvalidVersion(format!("'{}' in file {}", version_part, file_name))
        })?;

        Ok(Some(Self {
            version,
            name: file_name.to_string(),
            description: description_part.replace('_', " "),
            path: path.to_path_buf(),
        }))
    }

    pub fn version(&self) -> &MigrationVersion {
        &self.version
    }

    /// The full file name, e.g. `V1__init.sql`. This is the label used in
    /// logs, errors, and the ledger.
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn description(&self) -> &str {
        &self.description
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read the raw body from disk. UTF-8 only.
    pub fn raw_body(&self) -> Result<String> {
        Ok(fs::read_to_string(&self.path)?)
    }

    /// The placeholder-substituted body, as executed and as hashed.
    pub fn body(&self, placeholders: &Placeholders) -> Result<String> {
        Ok(placeholders.apply(&self.raw_body()?))
    }

    /// SHA-256 of the substituted body, hex encoded. Deterministic across
    /// runs and platforms for a fixed placeholders map.
    pub fn checksum(&self, placeholders: &Placeholders) -> Result<String> {
        let body = self.body(placeholders)?;
        let mut hasher = Sha256::new();
        hasher.update(body.as_bytes());
        Ok(format!("{:x}", hasher.finalize()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn affixes() -> FilenameAffixes {
        FilenameAffixes::default()
    }

    #[test]
    fn test_parse_default_grammar() {
        let script = MigrationScript::from_path(Path::new("V1.2__add_users.sql"), &affixes())
            .unwrap()
            .unwrap();

        assert_eq!(script.version(), &"1.2".parse().unwrap());
        assert_eq!(script.name(), "V1.2__add_users.sql");
        assert_eq!(script.description(), "add users");
    }

    #[test]
    fn test_non_candidates_are_ignored() {
        assert!(MigrationScript::from_path(Path::new("README.md"), &affixes())
            .unwrap()
            .is_none());
        assert!(MigrationScript::from_path(Path::new("data.sql"), &affixes())
            .unwrap()
            .is_none());
        assert!(MigrationScript::from_path(Path::new("V1__init.txt"), &affixes())
            .unwrap()
            .is_none());
    }

    #[test]
    fn test_bad_candidates_are_fatal() {
        let no_separator = MigrationScript::from_path(Path::new("V1.sql"), &affixes());
        assert!(matches!(no_separator, Err(Error::InvalidName(_))));

        let bad_version = MigrationScript::from_path(Path::new("V1a__init.sql"), &affixes());
        assert!(matches!(bad_version, Err(Error::InvalidVersion(_))));
    }

    #[test]
    fn test_custom_affixes() {
        let affixes = FilenameAffixes {
            prefix: "M".to_string(),
            separator: "-".to_string(),
            suffix: ".ddl".to_string(),
        };

        let script = MigrationScript::from_path(Path::new("M3-init.ddl"), &affixes)
            .unwrap()
            .unwrap();
        assert_eq!(script.version(), &"3".parse().unwrap());
        assert_eq!(script.description(), "init");
    }

    #[test]
    fn test_placeholder_substitution() {
        let mut values = BTreeMap::new();
        values.insert("schema".to_string(), "app".to_string());
        values.insert("owner".to_string(), "admin".to_string());
        let placeholders = Placeholders::new(&values, "${", "}");

        let body = "CREATE TABLE ${schema}.t (id INT); -- by ${owner}, keeps ${unknown}";
        assert_eq!(
            placeholders.apply(body),
            "CREATE TABLE app.t (id INT); -- by admin, keeps ${unknown}"
        );
    }

    #[test]
    fn test_checksum_stability() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("V7__stable.sql");
        fs::write(&path, "CREATE TABLE ${schema}.t (id INT);").unwrap();

        let script = MigrationScript::from_path(&path, &affixes())
            .unwrap()
            .unwrap();

        let mut values = BTreeMap::new();
        values.insert("schema".to_string(), "app".to_string());
        let placeholders = Placeholders::new(&values, "${", "}");

        let first = script.checksum(&placeholders).unwrap();
        let second = script.checksum(&placeholders).unwrap();
        assert_eq!(first, second);
        assert_eq!(first.len(), 64);

        // A different placeholder value hashes differently
        values.insert("schema".to_string(), "other".to_string());
        let other = Placeholders::new(&values, "${", "}");
        assert_ne!(script.checksum(&other).unwrap(), first);
    }
}
