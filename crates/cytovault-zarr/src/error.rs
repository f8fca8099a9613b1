// cytovault-zarr/src/error.rs
// ============================================================================
// Module: Zarr Store Errors
// Description: Error taxonomy for the chunked array stores.
// Purpose: Reject malformed planes and surface I/O failures unchanged.
// Dependencies: thiserror
// ============================================================================

//! ## Overview
//! [`ZarrError::Invalid`] covers synchronous rejection of malformed input:
//! wrong plane rank, dtype or shape mismatches against an existing array,
//! and unrecognized stored metadata. Filesystem and JSON errors pass through
//! transparently.

// ============================================================================
// SECTION: Imports
// ============================================================================

use thiserror::Error;

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Array store errors.
#[derive(Debug, Error)]
pub enum ZarrError {
    /// Malformed caller input or inconsistent stored metadata.
    #[error("invalid array data: {0}")]
    Invalid(String),
    /// Metadata (de)serialization error, propagated unchanged.
    #[error(transparent)]
    Json(#[from] serde_json::Error),
    /// Filesystem error, propagated unchanged.
    #[error(transparent)]
    Io(#[from] std::io::Error),
}
