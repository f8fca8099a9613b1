// cytovault-zarr/src/meta.rs
// ============================================================================
// Module: Array Metadata
// Description: Zarr v2 and OME-NGFF 0.4 metadata documents.
// Purpose: Model the JSON stored in .zgroup, .zarray, and .zattrs files.
// Dependencies: serde, serde_json
// ============================================================================

//! ## Overview
//! Typed models of the three JSON documents a Zarr v2 hierarchy carries:
//! `.zgroup` (format marker), `.zarray` (shape, chunking, dtype, codec),
//! and `.zattrs` (OME-NGFF 0.4 multiscales with channel/space axes scaled
//! to the physical pixel size, omero display metadata for images, and an
//! image-label back-reference for label groups). Serialization is
//! deterministic so rewriting unchanged metadata is byte-identical.

// ============================================================================
// SECTION: Imports
// ============================================================================

use serde::Deserialize;
use serde::Serialize;
use serde_json::Value;

use crate::codec::CompressorMeta;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Zarr format stored in `.zgroup` and `.zarray`.
pub const ZARR_FORMAT: u8 = 2;

/// NGFF specification version stamped into `.zattrs`.
pub const NGFF_VERSION: &str = "0.4";

/// Name of the single resolution-level array inside each group.
pub const LEVEL_ZERO: &str = "0";

// ============================================================================
// SECTION: Zarr Documents
// ============================================================================

/// The `.zgroup` document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct GroupMeta {
    /// Zarr format marker; always 2.
    pub zarr_format: u8,
}

impl Default for GroupMeta {
    fn default() -> Self {
        Self {
            zarr_format: ZARR_FORMAT,
        }
    }
}

/// The `.zarray` document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ArrayMeta {
    /// Zarr format marker; always 2.
    pub zarr_format: u8,
    /// Array shape, `[channels, height, width]`.
    pub shape: Vec<usize>,
    /// Chunk shape; one chunk spans one full channel plane.
    pub chunks: Vec<usize>,
    /// Element dtype code.
    pub dtype: String,
    /// Chunk compressor.
    pub compressor: Option<CompressorMeta>,
    /// Fill value for unwritten chunks.
    pub fill_value: Value,
    /// Memory layout; always C order.
    pub order: String,
    /// Chunk filters; always absent.
    pub filters: Option<Value>,
}

impl ArrayMeta {
    /// Builds the metadata for a `(channels, height, width)` array with one
    /// chunk per channel plane.
    #[must_use]
    pub fn plane_array(
        num_channels: usize,
        height: usize,
        width: usize,
        dtype_code: &str,
        compression_level: u32,
    ) -> Self {
        Self {
            zarr_format: ZARR_FORMAT,
            shape: vec![num_channels, height, width],
            chunks: vec![1, height, width],
            dtype: dtype_code.to_owned(),
            compressor: Some(CompressorMeta::zlib(compression_level)),
            fill_value: Value::from(0),
            order: "C".to_owned(),
            filters: None,
        }
    }
}

// ============================================================================
// SECTION: NGFF Attributes
// ============================================================================

/// The `.zattrs` document of an image or label group.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NgffAttrs {
    /// Multiscale pyramid description; a single level here.
    pub multiscales: Vec<Multiscale>,
    /// Per-channel display metadata, present on image groups.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub omero: Option<Omero>,
    /// Label back-reference, present on label groups.
    #[serde(rename = "image-label", skip_serializing_if = "Option::is_none")]
    pub image_label: Option<ImageLabel>,
}

/// One multiscale image description.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Multiscale {
    /// NGFF specification version.
    pub version: String,
    /// Group name shown by viewers.
    pub name: String,
    /// Axis declarations, `c`/`y`/`x` here.
    pub axes: Vec<Axis>,
    /// Resolution datasets; a single level here.
    pub datasets: Vec<Dataset>,
}

/// One axis declaration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Axis {
    /// Axis name.
    pub name: String,
    /// Axis kind, `channel` or `space`.
    #[serde(rename = "type")]
    pub kind: String,
    /// Physical unit for space axes.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub unit: Option<String>,
}

/// One resolution-level dataset.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Dataset {
    /// Array path within the group.
    pub path: String,
    /// Transformations mapping array indices to physical space.
    #[serde(rename = "coordinateTransformations")]
    pub coordinate_transformations: Vec<CoordinateTransformation>,
}

/// One coordinate transformation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CoordinateTransformation {
    /// Transformation kind; always `scale`.
    #[serde(rename = "type")]
    pub kind: String,
    /// Per-axis scale factors, `[1, pixel_size, pixel_size]`.
    pub scale: Vec<f64>,
}

/// Omero rendering block carrying per-channel display metadata.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Omero {
    /// Channels in channel-axis order.
    pub channels: Vec<OmeroChannel>,
}

/// Display metadata for one channel.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OmeroChannel {
    /// Channel label.
    pub label: String,
    /// Display color as a six-digit hex RGB string.
    pub color: String,
    /// Intensity window.
    pub window: IntensityWindow,
    /// Whether viewers render the channel by default.
    pub active: bool,
}

/// Intensity display window.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct IntensityWindow {
    /// Window low edge.
    pub start: f64,
    /// Window high edge.
    pub end: f64,
    /// Dtype minimum.
    pub min: f64,
    /// Dtype maximum.
    pub max: f64,
}

/// Label back-reference block.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImageLabel {
    /// NGFF specification version.
    pub version: String,
    /// Source image reference.
    pub source: LabelSource,
}

/// Source image of a label group.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LabelSource {
    /// Relative path from the label group to its source image group.
    pub image: String,
}

// ============================================================================
// SECTION: Display Inputs
// ============================================================================

/// Caller-supplied display metadata for one channel slot.
#[derive(Debug, Clone, PartialEq)]
pub struct ChannelDisplay {
    /// Channel label.
    pub label: String,
    /// Display color as a six-digit hex RGB string.
    pub color: String,
    /// Intensity window.
    pub window: IntensityWindow,
}

// ============================================================================
// SECTION: Builders
// ============================================================================

/// Builds the c/y/x axis list scaled in micrometres.
#[must_use]
pub fn cyx_axes() -> Vec<Axis> {
    vec![
        Axis {
            name: "c".to_owned(),
            kind: "channel".to_owned(),
            unit: None,
        },
        Axis {
            name: "y".to_owned(),
            kind: "space".to_owned(),
            unit: Some("micrometer".to_owned()),
        },
        Axis {
            name: "x".to_owned(),
            kind: "space".to_owned(),
            unit: Some("micrometer".to_owned()),
        },
    ]
}

/// Builds the single-level multiscale block for a group.
#[must_use]
pub fn single_level_multiscale(name: &str, pixel_size_um: f64) -> Multiscale {
    Multiscale {
        version: NGFF_VERSION.to_owned(),
        name: name.to_owned(),
        axes: cyx_axes(),
        datasets: vec![Dataset {
            path: LEVEL_ZERO.to_owned(),
            coordinate_transformations: vec![CoordinateTransformation {
                kind: "scale".to_owned(),
                scale: vec![1.0, pixel_size_um, pixel_size_um],
            }],
        }],
    }
}
