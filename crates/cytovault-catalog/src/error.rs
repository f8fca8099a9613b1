// cytovault-catalog/src/error.rs
// ============================================================================
// Module: Catalog Errors
// Description: Typed error taxonomy for catalog operations.
// Purpose: Convert constraint violations and missing rows into typed errors.
// Dependencies: cytovault-core, rusqlite, thiserror
// ============================================================================

//! ## Overview
//! Recoverable failures are typed by entity: [`CatalogError::NotFound`] for
//! missing rows, [`CatalogError::Duplicate`] for uniqueness violations.
//! [`CatalogError::SchemaVersion`] is fatal at open time. Underlying SQLite
//! and I/O errors pass through transparently and are never reinterpreted.

// ============================================================================
// SECTION: Imports
// ============================================================================

use cytovault_core::Entity;
use cytovault_core::NameError;
use rusqlite::ffi;
use thiserror::Error;

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Catalog operation errors.
#[derive(Debug, Error)]
pub enum CatalogError {
    /// A name-addressed row does not exist.
    #[error("{entity} '{name}' not found")]
    NotFound {
        /// Entity kind looked up.
        entity: Entity,
        /// The name or identifier that was looked up.
        name: String,
    },
    /// A uniqueness constraint was violated.
    #[error("{entity} '{name}' already exists")]
    Duplicate {
        /// Entity kind inserted.
        entity: Entity,
        /// The name or key that already exists.
        name: String,
    },
    /// The stored format version has no migration path to current.
    #[error("unsupported catalog format version {stored} (expected {expected})")]
    SchemaVersion {
        /// Version stored in the catalog file.
        stored: String,
        /// Version this build expects.
        expected: String,
    },
    /// Malformed caller input.
    #[error("invalid catalog input: {0}")]
    Invalid(String),
    /// An unsafe name was rejected by the validator.
    #[error(transparent)]
    Name(#[from] NameError),
    /// `SQLite` engine error, propagated unchanged.
    #[error(transparent)]
    Sqlite(#[from] rusqlite::Error),
    /// Filesystem error, propagated unchanged.
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl CatalogError {
    /// Returns true when the error is a duplicate-key rejection.
    #[must_use]
    pub const fn is_duplicate(&self) -> bool {
        matches!(self, Self::Duplicate { .. })
    }

    /// Returns true when the error is a missing-row rejection.
    #[must_use]
    pub const fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }
}

// ============================================================================
// SECTION: Conversion Helpers
// ============================================================================

/// Maps a uniqueness violation onto [`CatalogError::Duplicate`].
///
/// Only `UNIQUE` and `PRIMARY KEY` violations are remapped; foreign-key and
/// check violations pass through unchanged.
pub(crate) fn map_duplicate(err: rusqlite::Error, entity: Entity, name: &str) -> CatalogError {
    if let rusqlite::Error::SqliteFailure(failure, _) = &err
        && (failure.extended_code == ffi::SQLITE_CONSTRAINT_UNIQUE
            || failure.extended_code == ffi::SQLITE_CONSTRAINT_PRIMARYKEY)
    {
        return CatalogError::Duplicate {
            entity,
            name: name.to_owned(),
        };
    }
    CatalogError::Sqlite(err)
}

/// Maps a missing row onto [`CatalogError::NotFound`].
pub(crate) fn not_found(entity: Entity, name: &str) -> CatalogError {
    CatalogError::NotFound {
        entity,
        name: name.to_owned(),
    }
}
