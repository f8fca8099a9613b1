// cytovault-zarr/src/codec.rs
// ============================================================================
// Module: Chunk Codec
// Description: Zlib compression for chunk payloads.
// Purpose: Apply the per-store compression policy to chunk bytes.
// Dependencies: flate2, serde
// ============================================================================

//! ## Overview
//! Chunks are zlib-compressed, matching the Zarr v2 `{"id": "zlib"}`
//! compressor. Image and label planes use a fast low level; binary masks
//! are low-entropy 0/255 data and use the maximum level, where the extra
//! CPU buys a large ratio win.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::io::Read;
use std::io::Write;

use flate2::Compression;
use flate2::read::ZlibDecoder;
use flate2::write::ZlibEncoder;
use serde::Deserialize;
use serde::Serialize;

use crate::error::ZarrError;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Compression level for image and label planes.
pub const PLANE_COMPRESSION_LEVEL: u32 = 1;

/// Compression level for binary mask planes.
pub const MASK_COMPRESSION_LEVEL: u32 = 9;

// ============================================================================
// SECTION: Compressor Metadata
// ============================================================================

/// The Zarr v2 compressor object stored in `.zarray`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompressorMeta {
    /// Codec identifier; always `zlib`.
    pub id: String,
    /// Compression level the chunks were written with.
    pub level: u32,
}

impl CompressorMeta {
    /// Returns the zlib compressor object for a level.
    #[must_use]
    pub fn zlib(level: u32) -> Self {
        Self {
            id: "zlib".to_owned(),
            level,
        }
    }
}

// ============================================================================
// SECTION: Compression
// ============================================================================

/// Compresses chunk bytes at the given level.
///
/// # Errors
///
/// Returns [`ZarrError::Io`] when the encoder fails.
pub fn compress(bytes: &[u8], level: u32) -> Result<Vec<u8>, ZarrError> {
    let mut encoder = ZlibEncoder::new(Vec::new(), Compression::new(level));
    encoder.write_all(bytes)?;
    Ok(encoder.finish()?)
}

/// Decompresses chunk bytes.
///
/// # Errors
///
/// Returns [`ZarrError::Io`] when the payload is not valid zlib data.
pub fn decompress(bytes: &[u8]) -> Result<Vec<u8>, ZarrError> {
    let mut decoder = ZlibDecoder::new(bytes);
    let mut decoded = Vec::new();
    decoder.read_to_end(&mut decoded)?;
    Ok(decoded)
}
