// src/version.rs

//! Migration version identifiers
//!
//! A version is a dotted numeric string (`1`, `1.2`, `2.0.10`) ordered
//! component-wise as integers. Shorter versions compare as if padded with
//! zeros, which is achieved here by trimming trailing zero components at
//! parse time: `2.0` and `2` normalize to the same value.

use crate::error::{Error, Result};
use std::fmt;
use std::str::FromStr;

/// A totally ordered migration version.
///
/// The baseline sentinel [`MigrationVersion::zero`] compares less than
/// every real version. The "max" end of the range is expressed by
/// [`TargetVersion::Latest`] rather than a magic numeric value.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct MigrationVersion {
    // Trailing zeros trimmed, so lexicographic ordering of the parts
    // equals zero-padded component-wise ordering.
    parts: Vec<u64>,
}

impl MigrationVersion {
    /// The zero sentinel, below any real version. Used as the default
    /// start version when the ledger carries no baseline entry.
    pub fn zero() -> Self {
        Self { parts: Vec::new() }
    }

    pub fn is_zero(&self) -> bool {
        self.parts.is_empty()
    }
}

impl FromStr for MigrationVersion {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        if s.is_empty() {
            return Err(Error::InvalidVersion(s.to_string()));
        }

        let mut parts = Vec::new();
        for part in s.split('.') {
            let n: u64 = part
                .parse()
                .map_err(|_| Error::InvalidVersion(s.to_string()))?;
            parts.push(n);
        }

        while parts.last() == Some(&0) {
            parts.pop();
        }

        Ok(Self { parts })
    }
}

impl fmt::Display for MigrationVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.parts.is_empty() {
            return write!(f, "0");
        }
        let mut first = true;
        for part in &self.parts {
            if !first {
                write!(f, ".")?;
            }
            write!(f, "{}", part)?;
            first = false;
        }
        Ok(())
    }
}

/// The version up to which Migrate applies scripts.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum TargetVersion {
    /// Apply every outstanding script.
    #[default]
    Latest,
    /// Apply scripts up to and including this version.
    Version(MigrationVersion),
}

impl TargetVersion {
    /// Is `version` within the target cap?
    pub fn includes(&self, version: &MigrationVersion) -> bool {
        match self {
            TargetVersion::Latest => true,
            TargetVersion::Version(cap) => version <= cap,
        }
    }
}

impl FromStr for TargetVersion {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        if s.eq_ignore_ascii_case("latest") {
            Ok(TargetVersion::Latest)
        } else {
            Ok(TargetVersion::Version(s.parse()?))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cmp::Ordering;

    fn v(s: &str) -> MigrationVersion {
        s.parse().unwrap()
    }

    #[test]
    fn test_component_wise_ordering() {
        assert!(v("1") < v("2"));
        assert!(v("1.1") < v("1.2"));
        assert!(v("1.2") < v("1.10"));
        assert!(v("2.0.10") > v("2.0.9"));
        assert!(v("1.5") < v("2"));
    }

    #[test]
    fn test_shorter_versions_pad_with_zeros() {
        assert_eq!(v("1"), v("1.0"));
        assert_eq!(v("2.0.0"), v("2"));
        assert!(v("1") < v("1.0.1"));
        assert_eq!(v("1").cmp(&v("1.0")), Ordering::Equal);
    }

    #[test]
    fn test_zero_sentinel_below_everything() {
        let zero = MigrationVersion::zero();
        assert!(zero.is_zero());
        assert!(zero < v("1"));
        assert!(zero < v("0.0.1"));
        assert_eq!(zero, v("0"));
        assert_eq!(zero.to_string(), "0");
    }

    #[test]
    fn test_invalid_versions_rejected() {
        assert!("".parse::<MigrationVersion>().is_err());
        assert!("1.a".parse::<MigrationVersion>().is_err());
        assert!("1..2".parse::<MigrationVersion>().is_err());
        assert!("-1".parse::<MigrationVersion>().is_err());
        assert!("1.".parse::<MigrationVersion>().is_err());
    }

    #[test]
    fn test_display_round_trip() {
        assert_eq!(v("1.2.3").to_string(), "1.2.3");
        assert_eq!(v("2.0").to_string(), "2");
        assert_eq!(v("10").to_string(), "10");
    }

    #[test]
    fn test_target_version_cap() {
        let latest = TargetVersion::Latest;
        assert!(latest.includes(&v("999.999")));

        let capped: TargetVersion = "2".parse().unwrap();
        assert!(capped.includes(&v("1")));
        assert!(capped.includes(&v("2")));
        assert!(capped.includes(&v("2.0")));
        assert!(!capped.includes(&v("2.0.1")));
        assert!(!capped.includes(&v("3")));

        assert_eq!("latest".parse::<TargetVersion>().unwrap(), latest);
    }
}
