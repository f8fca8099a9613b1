// cytovault-store/src/error.rs
// ============================================================================
// Module: Store Errors
// Description: Error taxonomy of the experiment store facade.
// Purpose: Wrap catalog and array errors and add facade-level rejections.
// Dependencies: cytovault-catalog, cytovault-core, cytovault-zarr, csv
// ============================================================================

//! ## Overview
//! The facade adds three failure modes of its own — missing or pre-existing
//! experiment directories, replicate ambiguity, and closed-store use — and
//! passes catalog, array, export, and I/O errors through transparently so
//! no error is reinterpreted or swallowed on the way up.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::path::PathBuf;

use cytovault_catalog::CatalogError;
use cytovault_core::NameError;
use cytovault_zarr::ZarrError;
use thiserror::Error;

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Experiment store errors.
#[derive(Debug, Error)]
pub enum StoreError {
    /// `create` refused to clobber an existing path.
    #[error("experiment already exists: {}", .0.display())]
    ExperimentExists(PathBuf),
    /// `open` found no catalog file at the path.
    #[error("experiment not found: {}", .0.display())]
    ExperimentMissing(PathBuf),
    /// The store was used after `close`.
    #[error("experiment store is closed")]
    Closed,
    /// A condition with several replicates needs the caller to disambiguate.
    #[error(
        "condition '{condition}' has {count} biological replicates; specify one by name"
    )]
    AmbiguousReplicate {
        /// The condition that was addressed.
        condition: String,
        /// Number of replicates it holds.
        count: usize,
    },
    /// Malformed caller input.
    #[error("invalid store input: {0}")]
    Invalid(String),
    /// An unsafe name was rejected by the validator.
    #[error(transparent)]
    Name(#[from] NameError),
    /// Catalog error, propagated unchanged.
    #[error(transparent)]
    Catalog(#[from] CatalogError),
    /// Array store error, propagated unchanged.
    #[error(transparent)]
    Zarr(#[from] ZarrError),
    /// Tabular export error, propagated unchanged.
    #[error(transparent)]
    Csv(#[from] csv::Error),
    /// Filesystem error, propagated unchanged.
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl StoreError {
    /// Returns true when the error is a typed not-found rejection.
    #[must_use]
    pub const fn is_not_found(&self) -> bool {
        matches!(
            self,
            Self::ExperimentMissing(_) | Self::Catalog(CatalogError::NotFound { .. })
        )
    }

    /// Returns true when the error is a typed duplicate rejection.
    #[must_use]
    pub const fn is_duplicate(&self) -> bool {
        matches!(self, Self::Catalog(CatalogError::Duplicate { .. }))
    }
}
