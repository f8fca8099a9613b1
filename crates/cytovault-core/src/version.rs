// cytovault-core/src/version.rs
// ============================================================================
// Module: Cytovault Format Version
// Description: Three-part experiment format version.
// Purpose: Provide parsed (major, minor) comparison for migration gating.
// Dependencies: serde, thiserror
// ============================================================================

//! ## Overview
//! The experiment's format version is stored in the catalog as a three-part
//! string. Migration compares only (major, minor); the patch component is
//! carried for display and never gates behavior.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::fmt;
use std::str::FromStr;

use serde::Deserialize;
use serde::Serialize;
use thiserror::Error;

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Failure to parse a stored format version string.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("invalid format version '{value}': expected MAJOR.MINOR.PATCH")]
pub struct VersionParseError {
    /// The offending version string.
    pub value: String,
}

// ============================================================================
// SECTION: Format Version
// ============================================================================

/// Parsed three-part experiment format version.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct FormatVersion {
    /// Major component.
    pub major: u32,
    /// Minor component.
    pub minor: u32,
    /// Patch component; never gates migration.
    pub patch: u32,
}

impl FormatVersion {
    /// Creates a version from its components.
    #[must_use]
    pub const fn new(major: u32, minor: u32, patch: u32) -> Self {
        Self {
            major,
            minor,
            patch,
        }
    }

    /// Returns the (major, minor) pair used for migration comparison.
    #[must_use]
    pub const fn major_minor(self) -> (u32, u32) {
        (self.major, self.minor)
    }

    /// Returns the `MAJOR.MINOR` prefix used by migration table entries.
    #[must_use]
    pub fn major_minor_label(self) -> String {
        format!("{}.{}", self.major, self.minor)
    }
}

impl FromStr for FormatVersion {
    type Err = VersionParseError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let err = || VersionParseError {
            value: value.to_owned(),
        };
        let mut parts = value.split('.');
        let major = parts.next().and_then(|p| p.parse().ok()).ok_or_else(err)?;
        let minor = parts.next().and_then(|p| p.parse().ok()).ok_or_else(err)?;
        let patch = parts.next().and_then(|p| p.parse().ok()).ok_or_else(err)?;
        if parts.next().is_some() {
            return Err(err());
        }
        Ok(Self {
            major,
            minor,
            patch,
        })
    }
}

impl fmt::Display for FormatVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}", self.major, self.minor, self.patch)
    }
}
