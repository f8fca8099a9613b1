// cytovault-core/src/records.rs
// ============================================================================
// Module: Cytovault Entity Records
// Description: Typed immutable records for every catalog entity.
// Purpose: Replace loosely-typed rows with explicit per-entity types.
// Dependencies: serde
// ============================================================================

//! ## Overview
//! One record type per catalog entity, with optional columns spelled out as
//! `Option` fields. Records are constructed at exactly one row-to-record
//! mapping boundary per entity inside the catalog's query layer and are
//! never passed around as untyped maps. `New*` payloads carry the caller
//! supplied columns of an insert; surrogate ids and timestamps are assigned
//! by the catalog.

// ============================================================================
// SECTION: Imports
// ============================================================================

use serde::Deserialize;
use serde::Serialize;

// ============================================================================
// SECTION: Experiment
// ============================================================================

/// The singleton experiment row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Experiment {
    /// Surrogate identifier.
    pub id: i64,
    /// Experiment name.
    pub name: String,
    /// Free-text description.
    pub description: String,
    /// Stored format version, three-part string such as `"3.3.0"`.
    pub format_version: String,
}

// ============================================================================
// SECTION: Channel
// ============================================================================

/// An acquisition channel.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Channel {
    /// Surrogate identifier.
    pub id: i64,
    /// Unique channel name.
    pub name: String,
    /// Biological role of the channel, e.g. a stain target.
    pub role: Option<String>,
    /// Excitation wavelength in nanometres.
    pub excitation_nm: Option<f64>,
    /// Emission wavelength in nanometres.
    pub emission_nm: Option<f64>,
    /// Display color as a six-digit hex RGB string.
    pub display_color: Option<String>,
    /// Whether this channel drives segmentation.
    pub is_segmentation: bool,
    /// Position of the channel on the pixel array's channel axis.
    ///
    /// # Invariants
    /// - Single source of truth for array addressing; reordering channels
    ///   requires rewriting every image array group.
    pub display_order: i64,
}

/// Caller-supplied columns for a channel insert.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewChannel {
    /// Unique channel name.
    pub name: String,
    /// Biological role of the channel.
    pub role: Option<String>,
    /// Excitation wavelength in nanometres.
    pub excitation_nm: Option<f64>,
    /// Emission wavelength in nanometres.
    pub emission_nm: Option<f64>,
    /// Display color as a six-digit hex RGB string.
    pub display_color: Option<String>,
    /// Whether this channel drives segmentation.
    pub is_segmentation: bool,
    /// Position of the channel on the pixel array's channel axis.
    pub display_order: i64,
}

// ============================================================================
// SECTION: Condition / Replicate / Timepoint
// ============================================================================

/// An experimental condition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Condition {
    /// Surrogate identifier.
    pub id: i64,
    /// Unique condition name.
    pub name: String,
    /// Free-text description.
    pub description: Option<String>,
}

/// A biological replicate within one condition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BiologicalReplicate {
    /// Surrogate identifier.
    pub id: i64,
    /// Owning condition.
    pub condition_id: i64,
    /// Replicate name, unique within its condition.
    pub name: String,
}

/// A named timepoint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Timepoint {
    /// Surrogate identifier.
    pub id: i64,
    /// Unique timepoint name.
    pub name: String,
    /// Elapsed time since experiment start, in minutes.
    pub elapsed_minutes: Option<f64>,
    /// Ordering used for display and export.
    pub display_order: i64,
}

// ============================================================================
// SECTION: Field Of View
// ============================================================================

/// One imaged physical region at one replicate and optional timepoint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldOfView {
    /// Surrogate identifier.
    pub id: i64,
    /// Owning biological replicate.
    pub bio_rep_id: i64,
    /// Optional timepoint.
    pub timepoint_id: Option<i64>,
    /// Name, unique within (replicate, timepoint).
    pub name: String,
    /// Width in pixels.
    pub width_px: i64,
    /// Height in pixels.
    pub height_px: i64,
    /// Physical pixel size in micrometres.
    pub pixel_size_um: Option<f64>,
    /// Path of the source file the field was imported from.
    pub source_path: Option<String>,
}

/// Caller-supplied columns for a field-of-view insert.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewFieldOfView {
    /// Owning biological replicate.
    pub bio_rep_id: i64,
    /// Optional timepoint.
    pub timepoint_id: Option<i64>,
    /// Name, unique within (replicate, timepoint).
    pub name: String,
    /// Width in pixels.
    pub width_px: i64,
    /// Height in pixels.
    pub height_px: i64,
    /// Physical pixel size in micrometres.
    pub pixel_size_um: Option<f64>,
    /// Path of the source file the field was imported from.
    pub source_path: Option<String>,
}

// ============================================================================
// SECTION: Segmentation
// ============================================================================

/// One execution of a cell-detection backend.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SegmentationRun {
    /// Surrogate identifier.
    pub id: i64,
    /// Channel the backend segmented on.
    pub channel_id: i64,
    /// Backend name, e.g. a detector implementation.
    pub backend: String,
    /// Model name for neural-network backends.
    pub model_name: Option<String>,
    /// Serialized backend parameters (JSON text).
    pub parameters: String,
    /// Number of cells the run produced.
    pub cell_count: i64,
    /// Creation time, unix epoch milliseconds.
    pub created_at: i64,
}

/// Caller-supplied columns for a segmentation-run insert.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewSegmentationRun {
    /// Channel the backend segmented on.
    pub channel_id: i64,
    /// Backend name.
    pub backend: String,
    /// Model name for neural-network backends.
    pub model_name: Option<String>,
    /// Serialized backend parameters (JSON text).
    pub parameters: String,
    /// Number of cells the run produced.
    pub cell_count: i64,
}

/// A segmented cell.
///
/// # Invariants
/// - `label_value` is unique only within one segmentation run's output;
///   the full uniqueness key is (field of view, run, label value).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Cell {
    /// Surrogate identifier.
    pub id: i64,
    /// Owning field of view.
    pub fov_id: i64,
    /// Producing segmentation run.
    pub segmentation_run_id: i64,
    /// Label value in the run's label plane.
    pub label_value: i64,
    /// Centroid x position, pixels.
    pub centroid_x: f64,
    /// Centroid y position, pixels.
    pub centroid_y: f64,
    /// Bounding box left edge, pixels.
    pub bbox_x: i64,
    /// Bounding box top edge, pixels.
    pub bbox_y: i64,
    /// Bounding box width, pixels.
    pub bbox_w: i64,
    /// Bounding box height, pixels.
    pub bbox_h: i64,
    /// Area in square micrometres.
    pub area_um2: f64,
    /// Perimeter in micrometres.
    pub perimeter_um: f64,
    /// Circularity, 1.0 for a perfect disc.
    pub circularity: f64,
    /// Validity flag set by curation.
    pub is_valid: bool,
}

/// Caller-supplied columns for a cell insert.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewCell {
    /// Label value in the run's label plane.
    pub label_value: i64,
    /// Centroid x position, pixels.
    pub centroid_x: f64,
    /// Centroid y position, pixels.
    pub centroid_y: f64,
    /// Bounding box left edge, pixels.
    pub bbox_x: i64,
    /// Bounding box top edge, pixels.
    pub bbox_y: i64,
    /// Bounding box width, pixels.
    pub bbox_w: i64,
    /// Bounding box height, pixels.
    pub bbox_h: i64,
    /// Area in square micrometres.
    pub area_um2: f64,
    /// Perimeter in micrometres.
    pub perimeter_um: f64,
    /// Circularity, 1.0 for a perfect disc.
    pub circularity: f64,
    /// Validity flag set by curation.
    pub is_valid: bool,
}

// ============================================================================
// SECTION: Measurement
// ============================================================================

/// Region a per-cell measurement was computed over.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum MeasurementScope {
    /// The whole segmented cell region.
    WholeCell,
    /// The intersection of the cell with a threshold mask.
    MaskInside,
    /// The cell region outside a threshold mask.
    MaskOutside,
}

impl MeasurementScope {
    /// Returns the stored column label.
    #[must_use]
    pub const fn label(self) -> &'static str {
        match self {
            Self::WholeCell => "whole_cell",
            Self::MaskInside => "mask_inside",
            Self::MaskOutside => "mask_outside",
        }
    }

    /// Parses a stored column label, returning `None` for unknown values.
    #[must_use]
    pub fn from_label(label: &str) -> Option<Self> {
        match label {
            "whole_cell" => Some(Self::WholeCell),
            "mask_inside" => Some(Self::MaskInside),
            "mask_outside" => Some(Self::MaskOutside),
            _ => None,
        }
    }
}

/// A per-cell, per-channel measurement.
///
/// Measurements upsert by their (cell, channel, metric, scope) key instead
/// of raising a duplicate error.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Measurement {
    /// Surrogate identifier.
    pub id: i64,
    /// Measured cell.
    pub cell_id: i64,
    /// Measured channel.
    pub channel_id: i64,
    /// Metric name, e.g. `mean_intensity`.
    pub metric: String,
    /// Metric value.
    pub value: f64,
    /// Region the value was computed over.
    pub scope: MeasurementScope,
    /// Threshold run that produced the mask, for mask-scoped metrics.
    pub threshold_run_id: Option<i64>,
}

/// Caller-supplied columns for a measurement upsert.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewMeasurement {
    /// Measured cell.
    pub cell_id: i64,
    /// Measured channel.
    pub channel_id: i64,
    /// Metric name.
    pub metric: String,
    /// Metric value.
    pub value: f64,
    /// Region the value was computed over.
    pub scope: MeasurementScope,
    /// Threshold run that produced the mask, for mask-scoped metrics.
    pub threshold_run_id: Option<i64>,
}

// ============================================================================
// SECTION: Threshold / Particle
// ============================================================================

/// One execution of an intensity-threshold method.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ThresholdRun {
    /// Surrogate identifier.
    pub id: i64,
    /// Thresholded channel.
    pub channel_id: i64,
    /// Threshold method name, e.g. `otsu`.
    pub method: String,
    /// Serialized method parameters (JSON text).
    pub parameters: String,
    /// Resulting threshold value.
    pub threshold_value: f64,
    /// Creation time, unix epoch milliseconds.
    pub created_at: i64,
}

/// Caller-supplied columns for a threshold-run insert.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewThresholdRun {
    /// Thresholded channel.
    pub channel_id: i64,
    /// Threshold method name.
    pub method: String,
    /// Serialized method parameters (JSON text).
    pub parameters: String,
    /// Resulting threshold value.
    pub threshold_value: f64,
}

/// A connected sub-region of a cell detected within a threshold mask.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Particle {
    /// Surrogate identifier.
    pub id: i64,
    /// Owning cell.
    pub cell_id: i64,
    /// Producing threshold run.
    pub threshold_run_id: i64,
    /// Label value in the particle labeling, unique per (cell, run).
    pub label_value: i64,
    /// Area in square micrometres.
    pub area_um2: f64,
    /// Perimeter in micrometres.
    pub perimeter_um: f64,
    /// Circularity, 1.0 for a perfect disc.
    pub circularity: f64,
    /// Centroid x position, pixels.
    pub centroid_x: f64,
    /// Centroid y position, pixels.
    pub centroid_y: f64,
    /// Mean intensity inside the particle.
    pub mean_intensity: Option<f64>,
}

/// Caller-supplied columns for a particle insert.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewParticle {
    /// Owning cell.
    pub cell_id: i64,
    /// Label value in the particle labeling, unique per (cell, run).
    pub label_value: i64,
    /// Area in square micrometres.
    pub area_um2: f64,
    /// Perimeter in micrometres.
    pub perimeter_um: f64,
    /// Circularity, 1.0 for a perfect disc.
    pub circularity: f64,
    /// Centroid x position, pixels.
    pub centroid_x: f64,
    /// Centroid y position, pixels.
    pub centroid_y: f64,
    /// Mean intensity inside the particle.
    pub mean_intensity: Option<f64>,
}

// ============================================================================
// SECTION: Tags / Provenance
// ============================================================================

/// A many-to-many label applied to cells.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Tag {
    /// Surrogate identifier.
    pub id: i64,
    /// Unique tag name.
    pub name: String,
}

/// Generic provenance record for downstream pipeline steps.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnalysisRun {
    /// Surrogate identifier.
    pub id: i64,
    /// Pipeline step kind.
    pub kind: String,
    /// Serialized step parameters (JSON text).
    pub parameters: String,
    /// Free-text notes.
    pub notes: Option<String>,
    /// Creation time, unix epoch milliseconds.
    pub created_at: i64,
}

/// Caller-supplied columns for an analysis-run insert.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewAnalysisRun {
    /// Pipeline step kind.
    pub kind: String,
    /// Serialized step parameters (JSON text).
    pub parameters: String,
    /// Free-text notes.
    pub notes: Option<String>,
}
