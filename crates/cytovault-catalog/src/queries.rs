// cytovault-catalog/src/queries.rs
// ============================================================================
// Module: Catalog Queries
// Description: Stateless typed CRUD functions over an open catalog connection.
// Purpose: Provide the catalog's only access layer.
// Dependencies: cytovault-core, rusqlite
// ============================================================================

//! ## Overview
//! One function per (entity, operation). Unique-name inserts convert the
//! engine's constraint violation into [`CatalogError::Duplicate`]; name
//! lookups convert "no row" into [`CatalogError::NotFound`]; bulk inserts
//! run inside one transaction so any single-row violation rolls the whole
//! batch back. Rows are mapped into typed records at exactly one boundary
//! per entity, the `map_*` functions at the bottom of this module.

// ============================================================================
// SECTION: Imports
// ============================================================================

use cytovault_core::AnalysisRun;
use cytovault_core::BiologicalReplicate;
use cytovault_core::Cell;
use cytovault_core::Channel;
use cytovault_core::Condition;
use cytovault_core::Entity;
use cytovault_core::Experiment;
use cytovault_core::FieldOfView;
use cytovault_core::Measurement;
use cytovault_core::MeasurementScope;
use cytovault_core::NewAnalysisRun;
use cytovault_core::NewCell;
use cytovault_core::NewChannel;
use cytovault_core::NewFieldOfView;
use cytovault_core::NewMeasurement;
use cytovault_core::NewParticle;
use cytovault_core::NewSegmentationRun;
use cytovault_core::NewThresholdRun;
use cytovault_core::Particle;
use cytovault_core::SegmentationRun;
use cytovault_core::Tag;
use cytovault_core::ThresholdRun;
use cytovault_core::Timepoint;
use cytovault_core::validate_name;
use rusqlite::Connection;
use rusqlite::OptionalExtension;
use rusqlite::Row;
use rusqlite::params;
use rusqlite::params_from_iter;
use rusqlite::types::Type;

use crate::catalog::unix_millis;
use crate::error::CatalogError;
use crate::error::map_duplicate;
use crate::error::not_found;

// ============================================================================
// SECTION: Column Lists
// ============================================================================

/// Cell column list shared by every cell select.
const CELL_COLUMNS: &str = "id, fov_id, segmentation_run_id, label_value, centroid_x, \
                            centroid_y, bbox_x, bbox_y, bbox_w, bbox_h, area_um2, perimeter_um, \
                            circularity, is_valid";

/// Measurement column list shared by every measurement select.
const MEASUREMENT_COLUMNS: &str =
    "id, cell_id, channel_id, metric, value, scope, threshold_run_id";

// ============================================================================
// SECTION: Experiment
// ============================================================================

/// Returns the singleton experiment row.
///
/// # Errors
///
/// Returns [`CatalogError::NotFound`] when the catalog has no experiment row.
pub fn get_experiment(conn: &Connection) -> Result<Experiment, CatalogError> {
    conn.query_row(
        "SELECT id, name, description, format_version FROM experiment LIMIT 1",
        params![],
        map_experiment,
    )
    .optional()?
    .ok_or_else(|| not_found(Entity::Experiment, "experiment"))
}

/// Rewrites the stored format version string.
///
/// # Errors
///
/// Returns [`CatalogError`] when the update fails.
pub fn update_format_version(conn: &Connection, version: &str) -> Result<(), CatalogError> {
    conn.execute("UPDATE experiment SET format_version = ?1", params![version])?;
    Ok(())
}

// ============================================================================
// SECTION: Channels
// ============================================================================

/// Inserts a channel.
///
/// # Errors
///
/// Returns [`CatalogError::Duplicate`] when the name is taken and
/// [`cytovault_core::NameError`] when the name fails validation.
pub fn insert_channel(conn: &Connection, new: &NewChannel) -> Result<Channel, CatalogError> {
    validate_name(&new.name, "channel name")?;
    conn.execute(
        "INSERT INTO channels (name, role, excitation_nm, emission_nm, display_color, \
         is_segmentation, display_order) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
        params![
            new.name,
            new.role,
            new.excitation_nm,
            new.emission_nm,
            new.display_color,
            new.is_segmentation,
            new.display_order
        ],
    )
    .map_err(|err| map_duplicate(err, Entity::Channel, &new.name))?;
    Ok(Channel {
        id: conn.last_insert_rowid(),
        name: new.name.clone(),
        role: new.role.clone(),
        excitation_nm: new.excitation_nm,
        emission_nm: new.emission_nm,
        display_color: new.display_color.clone(),
        is_segmentation: new.is_segmentation,
        display_order: new.display_order,
    })
}

/// Looks a channel up by name.
///
/// # Errors
///
/// Returns [`CatalogError::NotFound`] when no channel has the name.
pub fn channel_by_name(conn: &Connection, name: &str) -> Result<Channel, CatalogError> {
    conn.query_row(
        "SELECT id, name, role, excitation_nm, emission_nm, display_color, is_segmentation, \
         display_order FROM channels WHERE name = ?1",
        params![name],
        map_channel,
    )
    .optional()?
    .ok_or_else(|| not_found(Entity::Channel, name))
}

/// Returns every channel ordered by its channel-axis position.
///
/// # Errors
///
/// Returns [`CatalogError`] when the select fails.
pub fn list_channels(conn: &Connection) -> Result<Vec<Channel>, CatalogError> {
    let mut stmt = conn.prepare(
        "SELECT id, name, role, excitation_nm, emission_nm, display_color, is_segmentation, \
         display_order FROM channels ORDER BY display_order, id",
    )?;
    let rows = stmt.query_map(params![], map_channel)?;
    collect_rows(rows)
}

// ============================================================================
// SECTION: Conditions
// ============================================================================

/// Inserts a condition.
///
/// # Errors
///
/// Returns [`CatalogError::Duplicate`] when the name is taken.
pub fn insert_condition(
    conn: &Connection,
    name: &str,
    description: Option<&str>,
) -> Result<Condition, CatalogError> {
    validate_name(name, "condition name")?;
    conn.execute(
        "INSERT INTO conditions (name, description) VALUES (?1, ?2)",
        params![name, description],
    )
    .map_err(|err| map_duplicate(err, Entity::Condition, name))?;
    Ok(Condition {
        id: conn.last_insert_rowid(),
        name: name.to_owned(),
        description: description.map(str::to_owned),
    })
}

/// Looks a condition up by name.
///
/// # Errors
///
/// Returns [`CatalogError::NotFound`] when no condition has the name.
pub fn condition_by_name(conn: &Connection, name: &str) -> Result<Condition, CatalogError> {
    conn.query_row(
        "SELECT id, name, description FROM conditions WHERE name = ?1",
        params![name],
        map_condition,
    )
    .optional()?
    .ok_or_else(|| not_found(Entity::Condition, name))
}

/// Returns every condition ordered by name.
///
/// # Errors
///
/// Returns [`CatalogError`] when the select fails.
pub fn list_conditions(conn: &Connection) -> Result<Vec<Condition>, CatalogError> {
    let mut stmt =
        conn.prepare("SELECT id, name, description FROM conditions ORDER BY name")?;
    let rows = stmt.query_map(params![], map_condition)?;
    collect_rows(rows)
}

// ============================================================================
// SECTION: Biological Replicates
// ============================================================================

/// Inserts a biological replicate under a condition.
///
/// # Errors
///
/// Returns [`CatalogError::Duplicate`] when the name is taken within the
/// condition.
pub fn insert_bio_rep(
    conn: &Connection,
    condition_id: i64,
    name: &str,
) -> Result<BiologicalReplicate, CatalogError> {
    validate_name(name, "biological replicate name")?;
    conn.execute(
        "INSERT INTO biological_replicates (condition_id, name) VALUES (?1, ?2)",
        params![condition_id, name],
    )
    .map_err(|err| map_duplicate(err, Entity::BiologicalReplicate, name))?;
    Ok(BiologicalReplicate {
        id: conn.last_insert_rowid(),
        condition_id,
        name: name.to_owned(),
    })
}

/// Looks a biological replicate up by name within a condition.
///
/// # Errors
///
/// Returns [`CatalogError::NotFound`] when the condition has no replicate of
/// that name.
pub fn bio_rep_by_name(
    conn: &Connection,
    condition_id: i64,
    name: &str,
) -> Result<BiologicalReplicate, CatalogError> {
    conn.query_row(
        "SELECT id, condition_id, name FROM biological_replicates WHERE condition_id = ?1 AND \
         name = ?2",
        params![condition_id, name],
        map_bio_rep,
    )
    .optional()?
    .ok_or_else(|| not_found(Entity::BiologicalReplicate, name))
}

/// Returns every replicate of a condition ordered by name.
///
/// # Errors
///
/// Returns [`CatalogError`] when the select fails.
pub fn bio_reps_for_condition(
    conn: &Connection,
    condition_id: i64,
) -> Result<Vec<BiologicalReplicate>, CatalogError> {
    let mut stmt = conn.prepare(
        "SELECT id, condition_id, name FROM biological_replicates WHERE condition_id = ?1 ORDER \
         BY name",
    )?;
    let rows = stmt.query_map(params![condition_id], map_bio_rep)?;
    collect_rows(rows)
}

// ============================================================================
// SECTION: Timepoints
// ============================================================================

/// Inserts a timepoint.
///
/// # Errors
///
/// Returns [`CatalogError::Duplicate`] when the name is taken.
pub fn insert_timepoint(
    conn: &Connection,
    name: &str,
    elapsed_minutes: Option<f64>,
    display_order: i64,
) -> Result<Timepoint, CatalogError> {
    validate_name(name, "timepoint name")?;
    conn.execute(
        "INSERT INTO timepoints (name, elapsed_minutes, display_order) VALUES (?1, ?2, ?3)",
        params![name, elapsed_minutes, display_order],
    )
    .map_err(|err| map_duplicate(err, Entity::Timepoint, name))?;
    Ok(Timepoint {
        id: conn.last_insert_rowid(),
        name: name.to_owned(),
        elapsed_minutes,
        display_order,
    })
}

/// Looks a timepoint up by name.
///
/// # Errors
///
/// Returns [`CatalogError::NotFound`] when no timepoint has the name.
pub fn timepoint_by_name(conn: &Connection, name: &str) -> Result<Timepoint, CatalogError> {
    conn.query_row(
        "SELECT id, name, elapsed_minutes, display_order FROM timepoints WHERE name = ?1",
        params![name],
        map_timepoint,
    )
    .optional()?
    .ok_or_else(|| not_found(Entity::Timepoint, name))
}

/// Returns every timepoint in display order.
///
/// # Errors
///
/// Returns [`CatalogError`] when the select fails.
pub fn list_timepoints(conn: &Connection) -> Result<Vec<Timepoint>, CatalogError> {
    let mut stmt = conn.prepare(
        "SELECT id, name, elapsed_minutes, display_order FROM timepoints ORDER BY display_order, \
         id",
    )?;
    let rows = stmt.query_map(params![], map_timepoint)?;
    collect_rows(rows)
}

// ============================================================================
// SECTION: Fields Of View
// ============================================================================

/// Inserts a field of view.
///
/// When the timepoint is absent the uniqueness constraint cannot catch a
/// duplicate (SQL NULLs are pairwise distinct), so an explicit existence
/// pre-check runs first.
///
/// # Errors
///
/// Returns [`CatalogError::Duplicate`] when a field of the same name already
/// exists for the (replicate, timepoint) pair.
pub fn insert_fov(conn: &Connection, new: &NewFieldOfView) -> Result<FieldOfView, CatalogError> {
    validate_name(&new.name, "field of view name")?;
    if new.timepoint_id.is_none() {
        let existing: Option<i64> = conn
            .query_row(
                "SELECT id FROM fields_of_view WHERE bio_rep_id = ?1 AND name = ?2 AND \
                 timepoint_id IS NULL",
                params![new.bio_rep_id, new.name],
                |row| row.get(0),
            )
            .optional()?;
        if existing.is_some() {
            return Err(CatalogError::Duplicate {
                entity: Entity::FieldOfView,
                name: new.name.clone(),
            });
        }
    }
    conn.execute(
        "INSERT INTO fields_of_view (bio_rep_id, timepoint_id, name, width_px, height_px, \
         pixel_size_um, source_path) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
        params![
            new.bio_rep_id,
            new.timepoint_id,
            new.name,
            new.width_px,
            new.height_px,
            new.pixel_size_um,
            new.source_path
        ],
    )
    .map_err(|err| map_duplicate(err, Entity::FieldOfView, &new.name))?;
    Ok(FieldOfView {
        id: conn.last_insert_rowid(),
        bio_rep_id: new.bio_rep_id,
        timepoint_id: new.timepoint_id,
        name: new.name.clone(),
        width_px: new.width_px,
        height_px: new.height_px,
        pixel_size_um: new.pixel_size_um,
        source_path: new.source_path.clone(),
    })
}

/// Looks a field of view up by name within (replicate, optional timepoint).
///
/// # Errors
///
/// Returns [`CatalogError::NotFound`] when no field matches.
pub fn fov_by_name(
    conn: &Connection,
    bio_rep_id: i64,
    timepoint_id: Option<i64>,
    name: &str,
) -> Result<FieldOfView, CatalogError> {
    let row = match timepoint_id {
        Some(timepoint_id) => conn
            .query_row(
                "SELECT id, bio_rep_id, timepoint_id, name, width_px, height_px, pixel_size_um, \
                 source_path FROM fields_of_view WHERE bio_rep_id = ?1 AND timepoint_id = ?2 AND \
                 name = ?3",
                params![bio_rep_id, timepoint_id, name],
                map_fov,
            )
            .optional()?,
        None => conn
            .query_row(
                "SELECT id, bio_rep_id, timepoint_id, name, width_px, height_px, pixel_size_um, \
                 source_path FROM fields_of_view WHERE bio_rep_id = ?1 AND timepoint_id IS NULL \
                 AND name = ?2",
                params![bio_rep_id, name],
                map_fov,
            )
            .optional()?,
    };
    row.ok_or_else(|| not_found(Entity::FieldOfView, name))
}

/// Returns every field of view of a replicate ordered by name.
///
/// # Errors
///
/// Returns [`CatalogError`] when the select fails.
pub fn fovs_for_bio_rep(
    conn: &Connection,
    bio_rep_id: i64,
) -> Result<Vec<FieldOfView>, CatalogError> {
    let mut stmt = conn.prepare(
        "SELECT id, bio_rep_id, timepoint_id, name, width_px, height_px, pixel_size_um, \
         source_path FROM fields_of_view WHERE bio_rep_id = ?1 ORDER BY name",
    )?;
    let rows = stmt.query_map(params![bio_rep_id], map_fov)?;
    collect_rows(rows)
}

// ============================================================================
// SECTION: Segmentation Runs
// ============================================================================

/// Inserts a segmentation run stamped with the current time.
///
/// # Errors
///
/// Returns [`CatalogError`] when the insert fails.
pub fn insert_segmentation_run(
    conn: &Connection,
    new: &NewSegmentationRun,
) -> Result<SegmentationRun, CatalogError> {
    let created_at = unix_millis();
    conn.execute(
        "INSERT INTO segmentation_runs (channel_id, backend, model_name, parameters, cell_count, \
         created_at) VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
        params![
            new.channel_id,
            new.backend,
            new.model_name,
            new.parameters,
            new.cell_count,
            created_at
        ],
    )?;
    Ok(SegmentationRun {
        id: conn.last_insert_rowid(),
        channel_id: new.channel_id,
        backend: new.backend.clone(),
        model_name: new.model_name.clone(),
        parameters: new.parameters.clone(),
        cell_count: new.cell_count,
        created_at,
    })
}

/// Looks a segmentation run up by id.
///
/// # Errors
///
/// Returns [`CatalogError::NotFound`] when no run has the id.
pub fn segmentation_run_by_id(
    conn: &Connection,
    run_id: i64,
) -> Result<SegmentationRun, CatalogError> {
    conn.query_row(
        "SELECT id, channel_id, backend, model_name, parameters, cell_count, created_at FROM \
         segmentation_runs WHERE id = ?1",
        params![run_id],
        map_segmentation_run,
    )
    .optional()?
    .ok_or_else(|| not_found(Entity::SegmentationRun, &run_id.to_string()))
}

/// Returns every segmentation run, newest first.
///
/// # Errors
///
/// Returns [`CatalogError`] when the select fails.
pub fn list_segmentation_runs(conn: &Connection) -> Result<Vec<SegmentationRun>, CatalogError> {
    let mut stmt = conn.prepare(
        "SELECT id, channel_id, backend, model_name, parameters, cell_count, created_at FROM \
         segmentation_runs ORDER BY created_at DESC, id DESC",
    )?;
    let rows = stmt.query_map(params![], map_segmentation_run)?;
    collect_rows(rows)
}

// ============================================================================
// SECTION: Cells
// ============================================================================

/// Inserts a batch of cells for one (field of view, segmentation run).
///
/// The batch is all-or-nothing: a violation on any row rolls the entire
/// insert back and no partial batch is ever observable.
///
/// # Errors
///
/// Returns [`CatalogError::Duplicate`] when any row repeats a (field, run,
/// label value) key.
pub fn insert_cells(
    conn: &mut Connection,
    fov_id: i64,
    run_id: i64,
    cells: &[NewCell],
) -> Result<Vec<i64>, CatalogError> {
    let tx = conn.transaction()?;
    let mut ids = Vec::with_capacity(cells.len());
    {
        let mut stmt = tx.prepare(
            "INSERT INTO cells (fov_id, segmentation_run_id, label_value, centroid_x, \
             centroid_y, bbox_x, bbox_y, bbox_w, bbox_h, area_um2, perimeter_um, circularity, \
             is_valid) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13)",
        )?;
        for cell in cells {
            stmt.execute(params![
                fov_id,
                run_id,
                cell.label_value,
                cell.centroid_x,
                cell.centroid_y,
                cell.bbox_x,
                cell.bbox_y,
                cell.bbox_w,
                cell.bbox_h,
                cell.area_um2,
                cell.perimeter_um,
                cell.circularity,
                cell.is_valid
            ])
            .map_err(|err| {
                map_duplicate(err, Entity::Cell, &format!("label {}", cell.label_value))
            })?;
            ids.push(tx.last_insert_rowid());
        }
    }
    tx.commit()?;
    Ok(ids)
}

/// Inserts a segmentation run together with its cell batch in one
/// transaction, so a batch violation also rolls the run row back.
///
/// # Errors
///
/// Returns [`CatalogError::Duplicate`] when any cell repeats a (field, run,
/// label value) key; nothing is inserted in that case.
pub fn insert_segmentation_with_cells(
    conn: &mut Connection,
    fov_id: i64,
    new: &NewSegmentationRun,
    cells: &[NewCell],
) -> Result<(SegmentationRun, Vec<i64>), CatalogError> {
    let created_at = unix_millis();
    let tx = conn.transaction()?;
    tx.execute(
        "INSERT INTO segmentation_runs (channel_id, backend, model_name, parameters, cell_count, \
         created_at) VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
        params![
            new.channel_id,
            new.backend,
            new.model_name,
            new.parameters,
            new.cell_count,
            created_at
        ],
    )?;
    let run_id = tx.last_insert_rowid();
    let mut ids = Vec::with_capacity(cells.len());
    {
        let mut stmt = tx.prepare(
            "INSERT INTO cells (fov_id, segmentation_run_id, label_value, centroid_x, \
             centroid_y, bbox_x, bbox_y, bbox_w, bbox_h, area_um2, perimeter_um, circularity, \
             is_valid) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13)",
        )?;
        for cell in cells {
            stmt.execute(params![
                fov_id,
                run_id,
                cell.label_value,
                cell.centroid_x,
                cell.centroid_y,
                cell.bbox_x,
                cell.bbox_y,
                cell.bbox_w,
                cell.bbox_h,
                cell.area_um2,
                cell.perimeter_um,
                cell.circularity,
                cell.is_valid
            ])
            .map_err(|err| {
                map_duplicate(err, Entity::Cell, &format!("label {}", cell.label_value))
            })?;
            ids.push(tx.last_insert_rowid());
        }
    }
    tx.commit()?;
    let run = SegmentationRun {
        id: run_id,
        channel_id: new.channel_id,
        backend: new.backend.clone(),
        model_name: new.model_name.clone(),
        parameters: new.parameters.clone(),
        cell_count: new.cell_count,
        created_at,
    };
    Ok((run, ids))
}

/// Returns every cell of a field of view, optionally limited to one run.
///
/// # Errors
///
/// Returns [`CatalogError`] when the select fails.
pub fn cells_for_fov(
    conn: &Connection,
    fov_id: i64,
    run_id: Option<i64>,
) -> Result<Vec<Cell>, CatalogError> {
    match run_id {
        Some(run_id) => {
            let mut stmt = conn.prepare(&format!(
                "SELECT {CELL_COLUMNS} FROM cells WHERE fov_id = ?1 AND segmentation_run_id = \
                 ?2 ORDER BY label_value"
            ))?;
            let rows = stmt.query_map(params![fov_id, run_id], map_cell)?;
            collect_rows(rows)
        }
        None => {
            let mut stmt = conn.prepare(&format!(
                "SELECT {CELL_COLUMNS} FROM cells WHERE fov_id = ?1 ORDER BY \
                 segmentation_run_id, label_value"
            ))?;
            let rows = stmt.query_map(params![fov_id], map_cell)?;
            collect_rows(rows)
        }
    }
}

/// Counts cells, optionally limited to one field of view.
///
/// # Errors
///
/// Returns [`CatalogError`] when the count fails.
pub fn count_cells(conn: &Connection, fov_id: Option<i64>) -> Result<i64, CatalogError> {
    let count = match fov_id {
        Some(fov_id) => conn.query_row(
            "SELECT COUNT(*) FROM cells WHERE fov_id = ?1",
            params![fov_id],
            |row| row.get(0),
        )?,
        None => conn.query_row("SELECT COUNT(*) FROM cells", params![], |row| row.get(0))?,
    };
    Ok(count)
}

/// Returns the cells with the given ids; an empty id list matches nothing.
///
/// # Errors
///
/// Returns [`CatalogError`] when the select fails.
pub fn cells_by_ids(conn: &Connection, ids: &[i64]) -> Result<Vec<Cell>, CatalogError> {
    if ids.is_empty() {
        return Ok(Vec::new());
    }
    let placeholders = vec!["?"; ids.len()].join(", ");
    let mut stmt = conn.prepare(&format!(
        "SELECT {CELL_COLUMNS} FROM cells WHERE id IN ({placeholders}) ORDER BY id"
    ))?;
    let rows = stmt.query_map(params_from_iter(ids.iter()), map_cell)?;
    collect_rows(rows)
}

/// Deletes every cell of a field of view.
///
/// Measurements, particles, and tag links cascade; array planes are never
/// touched by catalog deletes.
///
/// # Errors
///
/// Returns [`CatalogError`] when the delete fails.
pub fn delete_cells_for_fov(conn: &Connection, fov_id: i64) -> Result<usize, CatalogError> {
    let deleted = conn.execute("DELETE FROM cells WHERE fov_id = ?1", params![fov_id])?;
    Ok(deleted)
}

// ============================================================================
// SECTION: Measurements
// ============================================================================

/// Upserts a batch of measurements keyed on (cell, channel, metric, scope).
///
/// Existing rows take the new value and threshold-run reference instead of
/// raising a duplicate error; the batch is still all-or-nothing.
///
/// # Errors
///
/// Returns [`CatalogError`] when any row fails, e.g. on a missing cell.
pub fn upsert_measurements(
    conn: &mut Connection,
    measurements: &[NewMeasurement],
) -> Result<(), CatalogError> {
    let tx = conn.transaction()?;
    {
        let mut stmt = tx.prepare(
            "INSERT INTO measurements (cell_id, channel_id, metric, value, scope, \
             threshold_run_id) VALUES (?1, ?2, ?3, ?4, ?5, ?6) ON CONFLICT (cell_id, \
             channel_id, metric, scope) DO UPDATE SET value = excluded.value, threshold_run_id \
             = excluded.threshold_run_id",
        )?;
        for measurement in measurements {
            stmt.execute(params![
                measurement.cell_id,
                measurement.channel_id,
                measurement.metric,
                measurement.value,
                measurement.scope.label(),
                measurement.threshold_run_id
            ])?;
        }
    }
    tx.commit()?;
    Ok(())
}

/// Returns every measurement of one cell.
///
/// # Errors
///
/// Returns [`CatalogError`] when the select fails.
pub fn measurements_for_cell(
    conn: &Connection,
    cell_id: i64,
) -> Result<Vec<Measurement>, CatalogError> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {MEASUREMENT_COLUMNS} FROM measurements WHERE cell_id = ?1 ORDER BY channel_id, \
         metric, scope"
    ))?;
    let rows = stmt.query_map(params![cell_id], map_measurement)?;
    collect_rows(rows)
}

/// Counts measurements, optionally limited to one field of view.
///
/// # Errors
///
/// Returns [`CatalogError`] when the count fails.
pub fn count_measurements(conn: &Connection, fov_id: Option<i64>) -> Result<i64, CatalogError> {
    let count = match fov_id {
        Some(fov_id) => conn.query_row(
            "SELECT COUNT(*) FROM measurements m JOIN cells c ON c.id = m.cell_id WHERE \
             c.fov_id = ?1",
            params![fov_id],
            |row| row.get(0),
        )?,
        None => {
            conn.query_row("SELECT COUNT(*) FROM measurements", params![], |row| row.get(0))?
        }
    };
    Ok(count)
}

// ============================================================================
// SECTION: Threshold Runs
// ============================================================================

/// Inserts a threshold run stamped with the current time.
///
/// # Errors
///
/// Returns [`CatalogError`] when the insert fails.
pub fn insert_threshold_run(
    conn: &Connection,
    new: &NewThresholdRun,
) -> Result<ThresholdRun, CatalogError> {
    let created_at = unix_millis();
    conn.execute(
        "INSERT INTO threshold_runs (channel_id, method, parameters, threshold_value, \
         created_at) VALUES (?1, ?2, ?3, ?4, ?5)",
        params![
            new.channel_id,
            new.method,
            new.parameters,
            new.threshold_value,
            created_at
        ],
    )?;
    Ok(ThresholdRun {
        id: conn.last_insert_rowid(),
        channel_id: new.channel_id,
        method: new.method.clone(),
        parameters: new.parameters.clone(),
        threshold_value: new.threshold_value,
        created_at,
    })
}

/// Looks a threshold run up by id.
///
/// # Errors
///
/// Returns [`CatalogError::NotFound`] when no run has the id.
pub fn threshold_run_by_id(conn: &Connection, run_id: i64) -> Result<ThresholdRun, CatalogError> {
    conn.query_row(
        "SELECT id, channel_id, method, parameters, threshold_value, created_at FROM \
         threshold_runs WHERE id = ?1",
        params![run_id],
        map_threshold_run,
    )
    .optional()?
    .ok_or_else(|| not_found(Entity::ThresholdRun, &run_id.to_string()))
}

/// Returns every threshold run of a channel, newest first.
///
/// # Errors
///
/// Returns [`CatalogError`] when the select fails.
pub fn threshold_runs_for_channel(
    conn: &Connection,
    channel_id: i64,
) -> Result<Vec<ThresholdRun>, CatalogError> {
    let mut stmt = conn.prepare(
        "SELECT id, channel_id, method, parameters, threshold_value, created_at FROM \
         threshold_runs WHERE channel_id = ?1 ORDER BY created_at DESC, id DESC",
    )?;
    let rows = stmt.query_map(params![channel_id], map_threshold_run)?;
    collect_rows(rows)
}

// ============================================================================
// SECTION: Particles
// ============================================================================

/// Inserts a batch of particles for one threshold run, all-or-nothing.
///
/// # Errors
///
/// Returns [`CatalogError::Duplicate`] when any row repeats a (cell, run,
/// label value) key.
pub fn insert_particles(
    conn: &mut Connection,
    threshold_run_id: i64,
    particles: &[NewParticle],
) -> Result<Vec<i64>, CatalogError> {
    let tx = conn.transaction()?;
    let mut ids = Vec::with_capacity(particles.len());
    {
        let mut stmt = tx.prepare(
            "INSERT INTO particles (cell_id, threshold_run_id, label_value, area_um2, \
             perimeter_um, circularity, centroid_x, centroid_y, mean_intensity) VALUES (?1, ?2, \
             ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
        )?;
        for particle in particles {
            stmt.execute(params![
                particle.cell_id,
                threshold_run_id,
                particle.label_value,
                particle.area_um2,
                particle.perimeter_um,
                particle.circularity,
                particle.centroid_x,
                particle.centroid_y,
                particle.mean_intensity
            ])
            .map_err(|err| {
                map_duplicate(err, Entity::Particle, &format!("label {}", particle.label_value))
            })?;
            ids.push(tx.last_insert_rowid());
        }
    }
    tx.commit()?;
    Ok(ids)
}

/// Returns every particle of one cell, optionally limited to one run.
///
/// # Errors
///
/// Returns [`CatalogError`] when the select fails.
pub fn particles_for_cell(
    conn: &Connection,
    cell_id: i64,
    threshold_run_id: Option<i64>,
) -> Result<Vec<Particle>, CatalogError> {
    match threshold_run_id {
        Some(run_id) => {
            let mut stmt = conn.prepare(
                "SELECT id, cell_id, threshold_run_id, label_value, area_um2, perimeter_um, \
                 circularity, centroid_x, centroid_y, mean_intensity FROM particles WHERE \
                 cell_id = ?1 AND threshold_run_id = ?2 ORDER BY label_value",
            )?;
            let rows = stmt.query_map(params![cell_id, run_id], map_particle)?;
            collect_rows(rows)
        }
        None => {
            let mut stmt = conn.prepare(
                "SELECT id, cell_id, threshold_run_id, label_value, area_um2, perimeter_um, \
                 circularity, centroid_x, centroid_y, mean_intensity FROM particles WHERE \
                 cell_id = ?1 ORDER BY threshold_run_id, label_value",
            )?;
            let rows = stmt.query_map(params![cell_id], map_particle)?;
            collect_rows(rows)
        }
    }
}

// ============================================================================
// SECTION: Tags
// ============================================================================

/// Inserts a tag.
///
/// # Errors
///
/// Returns [`CatalogError::Duplicate`] when the name is taken.
pub fn insert_tag(conn: &Connection, name: &str) -> Result<Tag, CatalogError> {
    validate_name(name, "tag name")?;
    conn.execute("INSERT INTO tags (name) VALUES (?1)", params![name])
        .map_err(|err| map_duplicate(err, Entity::Tag, name))?;
    Ok(Tag {
        id: conn.last_insert_rowid(),
        name: name.to_owned(),
    })
}

/// Looks a tag up by name.
///
/// # Errors
///
/// Returns [`CatalogError::NotFound`] when no tag has the name.
pub fn tag_by_name(conn: &Connection, name: &str) -> Result<Tag, CatalogError> {
    conn.query_row("SELECT id, name FROM tags WHERE name = ?1", params![name], map_tag)
        .optional()?
        .ok_or_else(|| not_found(Entity::Tag, name))
}

/// Returns every tag ordered by name.
///
/// # Errors
///
/// Returns [`CatalogError`] when the select fails.
pub fn list_tags(conn: &Connection) -> Result<Vec<Tag>, CatalogError> {
    let mut stmt = conn.prepare("SELECT id, name FROM tags ORDER BY name")?;
    let rows = stmt.query_map(params![], map_tag)?;
    collect_rows(rows)
}

/// Applies a tag to a batch of cells, all-or-nothing.
///
/// # Errors
///
/// Returns [`CatalogError::Duplicate`] when any cell already carries the
/// tag.
pub fn tag_cells(
    conn: &mut Connection,
    tag_id: i64,
    cell_ids: &[i64],
) -> Result<(), CatalogError> {
    let tx = conn.transaction()?;
    {
        let mut stmt = tx.prepare("INSERT INTO cell_tags (cell_id, tag_id) VALUES (?1, ?2)")?;
        for cell_id in cell_ids {
            stmt.execute(params![cell_id, tag_id]).map_err(|err| {
                map_duplicate(err, Entity::Tag, &format!("cell {cell_id}"))
            })?;
        }
    }
    tx.commit()?;
    Ok(())
}

/// Returns the cells carrying any of the given tag names; an empty tag list
/// matches nothing.
///
/// # Errors
///
/// Returns [`CatalogError`] when the select fails.
pub fn cells_with_tags(conn: &Connection, tags: &[&str]) -> Result<Vec<Cell>, CatalogError> {
    if tags.is_empty() {
        return Ok(Vec::new());
    }
    let placeholders = vec!["?"; tags.len()].join(", ");
    let mut stmt = conn.prepare(&format!(
        "SELECT DISTINCT c.id, c.fov_id, c.segmentation_run_id, c.label_value, c.centroid_x, \
         c.centroid_y, c.bbox_x, c.bbox_y, c.bbox_w, c.bbox_h, c.area_um2, c.perimeter_um, \
         c.circularity, c.is_valid FROM cells c JOIN cell_tags ct ON ct.cell_id = c.id JOIN \
         tags t ON t.id = ct.tag_id WHERE t.name IN ({placeholders}) ORDER BY c.id"
    ))?;
    let rows = stmt.query_map(params_from_iter(tags.iter()), map_cell)?;
    collect_rows(rows)
}

// ============================================================================
// SECTION: Analysis Runs
// ============================================================================

/// Inserts a generic provenance record stamped with the current time.
///
/// # Errors
///
/// Returns [`CatalogError`] when the insert fails.
pub fn insert_analysis_run(
    conn: &Connection,
    new: &NewAnalysisRun,
) -> Result<AnalysisRun, CatalogError> {
    let created_at = unix_millis();
    conn.execute(
        "INSERT INTO analysis_runs (kind, parameters, notes, created_at) VALUES (?1, ?2, ?3, \
         ?4)",
        params![new.kind, new.parameters, new.notes, created_at],
    )?;
    Ok(AnalysisRun {
        id: conn.last_insert_rowid(),
        kind: new.kind.clone(),
        parameters: new.parameters.clone(),
        notes: new.notes.clone(),
        created_at,
    })
}

/// Returns every analysis run, newest first.
///
/// # Errors
///
/// Returns [`CatalogError`] when the select fails.
pub fn list_analysis_runs(conn: &Connection) -> Result<Vec<AnalysisRun>, CatalogError> {
    let mut stmt = conn.prepare(
        "SELECT id, kind, parameters, notes, created_at FROM analysis_runs ORDER BY created_at \
         DESC, id DESC",
    )?;
    let rows = stmt.query_map(params![], map_analysis_run)?;
    collect_rows(rows)
}

// ============================================================================
// SECTION: Joined Views
// ============================================================================

/// A cell joined with the identity names of its lineage.
#[derive(Debug, Clone, PartialEq)]
pub struct CellWithIdentity {
    /// The cell record.
    pub cell: Cell,
    /// Name of the owning field of view.
    pub fov_name: String,
    /// Name of the owning biological replicate.
    pub bio_rep_name: String,
    /// Name of the owning condition.
    pub condition_name: String,
    /// Name of the timepoint, when the field has one.
    pub timepoint_name: Option<String>,
}

/// Returns cells joined with fov/replicate/condition/timepoint names.
///
/// # Errors
///
/// Returns [`CatalogError`] when the select fails.
pub fn cells_with_identity(
    conn: &Connection,
    fov_id: Option<i64>,
) -> Result<Vec<CellWithIdentity>, CatalogError> {
    let base = "SELECT c.id, c.fov_id, c.segmentation_run_id, c.label_value, c.centroid_x, \
                c.centroid_y, c.bbox_x, c.bbox_y, c.bbox_w, c.bbox_h, c.area_um2, \
                c.perimeter_um, c.circularity, c.is_valid, f.name, b.name, co.name, t.name \
                FROM cells c JOIN fields_of_view f ON f.id = c.fov_id JOIN \
                biological_replicates b ON b.id = f.bio_rep_id JOIN conditions co ON co.id = \
                b.condition_id LEFT JOIN timepoints t ON t.id = f.timepoint_id";
    match fov_id {
        Some(fov_id) => {
            let mut stmt =
                conn.prepare(&format!("{base} WHERE c.fov_id = ?1 ORDER BY c.id"))?;
            let rows = stmt.query_map(params![fov_id], map_cell_with_identity)?;
            collect_rows(rows)
        }
        None => {
            let mut stmt = conn.prepare(&format!("{base} ORDER BY c.id"))?;
            let rows = stmt.query_map(params![], map_cell_with_identity)?;
            collect_rows(rows)
        }
    }
}

/// A measurement joined with its channel name and cell identity.
#[derive(Debug, Clone, PartialEq)]
pub struct MeasurementWithContext {
    /// The measurement record.
    pub measurement: Measurement,
    /// Name of the measured channel.
    pub channel_name: String,
    /// Label value of the measured cell within its run.
    pub cell_label_value: i64,
    /// Name of the owning field of view.
    pub fov_name: String,
}

/// Returns measurements joined with channel names and cell identity.
///
/// # Errors
///
/// Returns [`CatalogError`] when the select fails.
pub fn measurements_with_context(
    conn: &Connection,
    fov_id: Option<i64>,
) -> Result<Vec<MeasurementWithContext>, CatalogError> {
    let base = "SELECT m.id, m.cell_id, m.channel_id, m.metric, m.value, m.scope, \
                m.threshold_run_id, ch.name, c.label_value, f.name FROM measurements m JOIN \
                cells c ON c.id = m.cell_id JOIN channels ch ON ch.id = m.channel_id JOIN \
                fields_of_view f ON f.id = c.fov_id";
    match fov_id {
        Some(fov_id) => {
            let mut stmt = conn.prepare(&format!(
                "{base} WHERE c.fov_id = ?1 ORDER BY m.cell_id, ch.display_order, m.metric"
            ))?;
            let rows = stmt.query_map(params![fov_id], map_measurement_with_context)?;
            collect_rows(rows)
        }
        None => {
            let mut stmt = conn.prepare(&format!(
                "{base} ORDER BY m.cell_id, ch.display_order, m.metric"
            ))?;
            let rows = stmt.query_map(params![], map_measurement_with_context)?;
            collect_rows(rows)
        }
    }
}

// ============================================================================
// SECTION: Row Mapping Boundary
// ============================================================================

/// Collects a mapped row iterator, surfacing the first row error.
fn collect_rows<T>(
    rows: impl Iterator<Item = rusqlite::Result<T>>,
) -> Result<Vec<T>, CatalogError> {
    let mut collected = Vec::new();
    for row in rows {
        collected.push(row?);
    }
    Ok(collected)
}

/// Maps the experiment row.
fn map_experiment(row: &Row<'_>) -> rusqlite::Result<Experiment> {
    Ok(Experiment {
        id: row.get(0)?,
        name: row.get(1)?,
        description: row.get(2)?,
        format_version: row.get(3)?,
    })
}

/// Maps a channel row.
fn map_channel(row: &Row<'_>) -> rusqlite::Result<Channel> {
    Ok(Channel {
        id: row.get(0)?,
        name: row.get(1)?,
        role: row.get(2)?,
        excitation_nm: row.get(3)?,
        emission_nm: row.get(4)?,
        display_color: row.get(5)?,
        is_segmentation: row.get(6)?,
        display_order: row.get(7)?,
    })
}

/// Maps a condition row.
fn map_condition(row: &Row<'_>) -> rusqlite::Result<Condition> {
    Ok(Condition {
        id: row.get(0)?,
        name: row.get(1)?,
        description: row.get(2)?,
    })
}

/// Maps a biological replicate row.
fn map_bio_rep(row: &Row<'_>) -> rusqlite::Result<BiologicalReplicate> {
    Ok(BiologicalReplicate {
        id: row.get(0)?,
        condition_id: row.get(1)?,
        name: row.get(2)?,
    })
}

/// Maps a timepoint row.
fn map_timepoint(row: &Row<'_>) -> rusqlite::Result<Timepoint> {
    Ok(Timepoint {
        id: row.get(0)?,
        name: row.get(1)?,
        elapsed_minutes: row.get(2)?,
        display_order: row.get(3)?,
    })
}

/// Maps a field-of-view row.
fn map_fov(row: &Row<'_>) -> rusqlite::Result<FieldOfView> {
    Ok(FieldOfView {
        id: row.get(0)?,
        bio_rep_id: row.get(1)?,
        timepoint_id: row.get(2)?,
        name: row.get(3)?,
        width_px: row.get(4)?,
        height_px: row.get(5)?,
        pixel_size_um: row.get(6)?,
        source_path: row.get(7)?,
    })
}

/// Maps a segmentation-run row.
fn map_segmentation_run(row: &Row<'_>) -> rusqlite::Result<SegmentationRun> {
    Ok(SegmentationRun {
        id: row.get(0)?,
        channel_id: row.get(1)?,
        backend: row.get(2)?,
        model_name: row.get(3)?,
        parameters: row.get(4)?,
        cell_count: row.get(5)?,
        created_at: row.get(6)?,
    })
}

/// Maps a cell row.
fn map_cell(row: &Row<'_>) -> rusqlite::Result<Cell> {
    Ok(Cell {
        id: row.get(0)?,
        fov_id: row.get(1)?,
        segmentation_run_id: row.get(2)?,
        label_value: row.get(3)?,
        centroid_x: row.get(4)?,
        centroid_y: row.get(5)?,
        bbox_x: row.get(6)?,
        bbox_y: row.get(7)?,
        bbox_w: row.get(8)?,
        bbox_h: row.get(9)?,
        area_um2: row.get(10)?,
        perimeter_um: row.get(11)?,
        circularity: row.get(12)?,
        is_valid: row.get(13)?,
    })
}

/// Maps a measurement row, rejecting unknown scope labels.
fn map_measurement(row: &Row<'_>) -> rusqlite::Result<Measurement> {
    let scope_label: String = row.get(5)?;
    let scope = scope_from_sql(5, &scope_label)?;
    Ok(Measurement {
        id: row.get(0)?,
        cell_id: row.get(1)?,
        channel_id: row.get(2)?,
        metric: row.get(3)?,
        value: row.get(4)?,
        scope,
        threshold_run_id: row.get(6)?,
    })
}

/// Maps a threshold-run row.
fn map_threshold_run(row: &Row<'_>) -> rusqlite::Result<ThresholdRun> {
    Ok(ThresholdRun {
        id: row.get(0)?,
        channel_id: row.get(1)?,
        method: row.get(2)?,
        parameters: row.get(3)?,
        threshold_value: row.get(4)?,
        created_at: row.get(5)?,
    })
}

/// Maps a particle row.
fn map_particle(row: &Row<'_>) -> rusqlite::Result<Particle> {
    Ok(Particle {
        id: row.get(0)?,
        cell_id: row.get(1)?,
        threshold_run_id: row.get(2)?,
        label_value: row.get(3)?,
        area_um2: row.get(4)?,
        perimeter_um: row.get(5)?,
        circularity: row.get(6)?,
        centroid_x: row.get(7)?,
        centroid_y: row.get(8)?,
        mean_intensity: row.get(9)?,
    })
}

/// Maps a tag row.
fn map_tag(row: &Row<'_>) -> rusqlite::Result<Tag> {
    Ok(Tag {
        id: row.get(0)?,
        name: row.get(1)?,
    })
}

/// Maps an analysis-run row.
fn map_analysis_run(row: &Row<'_>) -> rusqlite::Result<AnalysisRun> {
    Ok(AnalysisRun {
        id: row.get(0)?,
        kind: row.get(1)?,
        parameters: row.get(2)?,
        notes: row.get(3)?,
        created_at: row.get(4)?,
    })
}

/// Maps a joined cell-with-identity row.
fn map_cell_with_identity(row: &Row<'_>) -> rusqlite::Result<CellWithIdentity> {
    Ok(CellWithIdentity {
        cell: map_cell(row)?,
        fov_name: row.get(14)?,
        bio_rep_name: row.get(15)?,
        condition_name: row.get(16)?,
        timepoint_name: row.get(17)?,
    })
}

/// Maps a joined measurement-with-context row.
fn map_measurement_with_context(row: &Row<'_>) -> rusqlite::Result<MeasurementWithContext> {
    Ok(MeasurementWithContext {
        measurement: map_measurement(row)?,
        channel_name: row.get(7)?,
        cell_label_value: row.get(8)?,
        fov_name: row.get(9)?,
    })
}

/// Converts a stored scope label, failing on unknown values.
fn scope_from_sql(index: usize, label: &str) -> rusqlite::Result<MeasurementScope> {
    MeasurementScope::from_label(label).ok_or_else(|| {
        rusqlite::Error::FromSqlConversionFailure(
            index,
            Type::Text,
            format!("unknown measurement scope '{label}'").into(),
        )
    })
}
