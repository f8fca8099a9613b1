// cytovault-catalog/src/schema.rs
// ============================================================================
// Module: Catalog Schema
// Description: Full relational schema and the idempotent ensure pass.
// Purpose: Define every table and index with existence-checked creation.
// Dependencies: rusqlite
// ============================================================================

//! ## Overview
//! The complete schema, expressed with `IF NOT EXISTS` creation so the
//! ensure pass is safe to re-run against fresh, current, and partially
//! migrated catalogs alike. Foreign keys are declared here and enforced by
//! the connection pragma applied at open time.

// ============================================================================
// SECTION: Imports
// ============================================================================

use rusqlite::Connection;

use crate::error::CatalogError;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Format version stamped into newly created catalogs.
pub const FORMAT_VERSION: &str = "3.3.0";

/// Schema DDL applied by [`ensure_schema`].
///
/// # Invariants
/// - Every statement is existence-checked; the batch is idempotent.
/// - `fields_of_view` uniqueness cannot catch duplicate NULL timepoints
///   (SQL NULLs are pairwise distinct); the insert path performs an
///   explicit existence pre-check instead.
const SCHEMA_SQL: &str = "
CREATE TABLE IF NOT EXISTS experiment (
    id INTEGER PRIMARY KEY,
    name TEXT NOT NULL,
    description TEXT NOT NULL DEFAULT '',
    format_version TEXT NOT NULL
);
CREATE TABLE IF NOT EXISTS channels (
    id INTEGER PRIMARY KEY,
    name TEXT NOT NULL UNIQUE,
    role TEXT,
    excitation_nm REAL,
    emission_nm REAL,
    display_color TEXT,
    is_segmentation INTEGER NOT NULL DEFAULT 0,
    display_order INTEGER NOT NULL
);
CREATE TABLE IF NOT EXISTS conditions (
    id INTEGER PRIMARY KEY,
    name TEXT NOT NULL UNIQUE,
    description TEXT
);
CREATE TABLE IF NOT EXISTS biological_replicates (
    id INTEGER PRIMARY KEY,
    condition_id INTEGER NOT NULL REFERENCES conditions(id),
    name TEXT NOT NULL,
    UNIQUE (condition_id, name)
);
CREATE TABLE IF NOT EXISTS timepoints (
    id INTEGER PRIMARY KEY,
    name TEXT NOT NULL UNIQUE,
    elapsed_minutes REAL,
    display_order INTEGER NOT NULL DEFAULT 0
);
CREATE TABLE IF NOT EXISTS fields_of_view (
    id INTEGER PRIMARY KEY,
    bio_rep_id INTEGER NOT NULL REFERENCES biological_replicates(id),
    timepoint_id INTEGER REFERENCES timepoints(id),
    name TEXT NOT NULL,
    width_px INTEGER NOT NULL,
    height_px INTEGER NOT NULL,
    pixel_size_um REAL,
    source_path TEXT,
    UNIQUE (bio_rep_id, timepoint_id, name)
);
CREATE TABLE IF NOT EXISTS segmentation_runs (
    id INTEGER PRIMARY KEY,
    channel_id INTEGER NOT NULL REFERENCES channels(id),
    backend TEXT NOT NULL,
    model_name TEXT,
    parameters TEXT NOT NULL DEFAULT '{}',
    cell_count INTEGER NOT NULL DEFAULT 0,
    created_at INTEGER NOT NULL
);
CREATE TABLE IF NOT EXISTS cells (
    id INTEGER PRIMARY KEY,
    fov_id INTEGER NOT NULL REFERENCES fields_of_view(id) ON DELETE CASCADE,
    segmentation_run_id INTEGER NOT NULL
        REFERENCES segmentation_runs(id) ON DELETE CASCADE,
    label_value INTEGER NOT NULL,
    centroid_x REAL NOT NULL,
    centroid_y REAL NOT NULL,
    bbox_x INTEGER NOT NULL,
    bbox_y INTEGER NOT NULL,
    bbox_w INTEGER NOT NULL,
    bbox_h INTEGER NOT NULL,
    area_um2 REAL NOT NULL,
    perimeter_um REAL NOT NULL,
    circularity REAL NOT NULL,
    is_valid INTEGER NOT NULL DEFAULT 1,
    UNIQUE (fov_id, segmentation_run_id, label_value)
);
CREATE TABLE IF NOT EXISTS threshold_runs (
    id INTEGER PRIMARY KEY,
    channel_id INTEGER NOT NULL REFERENCES channels(id),
    method TEXT NOT NULL,
    parameters TEXT NOT NULL DEFAULT '{}',
    threshold_value REAL NOT NULL,
    created_at INTEGER NOT NULL
);
CREATE TABLE IF NOT EXISTS measurements (
    id INTEGER PRIMARY KEY,
    cell_id INTEGER NOT NULL REFERENCES cells(id) ON DELETE CASCADE,
    channel_id INTEGER NOT NULL REFERENCES channels(id),
    metric TEXT NOT NULL,
    value REAL NOT NULL,
    scope TEXT NOT NULL DEFAULT 'whole_cell'
        CHECK (scope IN ('whole_cell', 'mask_inside', 'mask_outside')),
    threshold_run_id INTEGER REFERENCES threshold_runs(id),
    UNIQUE (cell_id, channel_id, metric, scope)
);
CREATE TABLE IF NOT EXISTS particles (
    id INTEGER PRIMARY KEY,
    cell_id INTEGER NOT NULL REFERENCES cells(id) ON DELETE CASCADE,
    threshold_run_id INTEGER NOT NULL
        REFERENCES threshold_runs(id) ON DELETE CASCADE,
    label_value INTEGER NOT NULL,
    area_um2 REAL NOT NULL,
    perimeter_um REAL NOT NULL,
    circularity REAL NOT NULL,
    centroid_x REAL NOT NULL,
    centroid_y REAL NOT NULL,
    mean_intensity REAL,
    UNIQUE (cell_id, threshold_run_id, label_value)
);
CREATE TABLE IF NOT EXISTS tags (
    id INTEGER PRIMARY KEY,
    name TEXT NOT NULL UNIQUE
);
CREATE TABLE IF NOT EXISTS cell_tags (
    cell_id INTEGER NOT NULL REFERENCES cells(id) ON DELETE CASCADE,
    tag_id INTEGER NOT NULL REFERENCES tags(id) ON DELETE CASCADE,
    PRIMARY KEY (cell_id, tag_id)
);
CREATE TABLE IF NOT EXISTS analysis_runs (
    id INTEGER PRIMARY KEY,
    kind TEXT NOT NULL,
    parameters TEXT NOT NULL DEFAULT '{}',
    notes TEXT,
    created_at INTEGER NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_bio_reps_condition
    ON biological_replicates (condition_id);
CREATE INDEX IF NOT EXISTS idx_fov_bio_rep ON fields_of_view (bio_rep_id);
CREATE INDEX IF NOT EXISTS idx_cells_fov ON cells (fov_id);
CREATE INDEX IF NOT EXISTS idx_cells_run ON cells (segmentation_run_id);
CREATE INDEX IF NOT EXISTS idx_measurements_cell ON measurements (cell_id);
CREATE INDEX IF NOT EXISTS idx_particles_cell ON particles (cell_id);
CREATE INDEX IF NOT EXISTS idx_particles_run ON particles (threshold_run_id);
";

// ============================================================================
// SECTION: Ensure Pass
// ============================================================================

/// Creates every expected table and index that does not already exist.
///
/// Safe to re-run against any catalog state, including files left behind by
/// a partially completed migration.
///
/// # Errors
///
/// Returns [`CatalogError`] when the DDL batch fails.
pub fn ensure_schema(connection: &mut Connection) -> Result<(), CatalogError> {
    let tx = connection.transaction()?;
    tx.execute_batch(SCHEMA_SQL)?;
    tx.commit()?;
    Ok(())
}
