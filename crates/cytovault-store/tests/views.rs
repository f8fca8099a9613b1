// crates/cytovault-store/tests/views.rs
// ============================================================================
// Module: Derived View Tests
// Description: Validate joined tables, the measurement pivot, and export.
// Purpose: Ensure downstream tools see correct, deterministic tables.
// Dependencies: cytovault-store, cytovault-core, cytovault-zarr, tempfile
// ============================================================================

//! ## Overview
//! Builds a small two-channel experiment, measures its cells, and checks
//! the joined cell table, the wide pivot (including scope-suffixed
//! columns), and the CSV written into the export directory.

#![allow(
    clippy::panic,
    clippy::print_stdout,
    clippy::print_stderr,
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::use_debug,
    clippy::dbg_macro,
    clippy::panic_in_result_fn,
    clippy::unwrap_in_result,
    clippy::float_cmp,
    reason = "Test-only assertions and helpers are permitted."
)]

// ============================================================================
// SECTION: Imports
// ============================================================================

use cytovault_core::MeasurementScope;
use cytovault_core::NewCell;
use cytovault_core::NewChannel;
use cytovault_core::NewMeasurement;
use cytovault_store::ExperimentStore;
use cytovault_store::FovRef;
use cytovault_zarr::Plane;
use cytovault_zarr::PlaneData;
use tempfile::TempDir;

// ============================================================================
// SECTION: Helpers
// ============================================================================

fn channel(name: &str, order: i64) -> NewChannel {
    NewChannel {
        name: name.to_owned(),
        role: None,
        excitation_nm: None,
        emission_nm: None,
        display_color: None,
        is_segmentation: order == 0,
        display_order: order,
    }
}

fn sample_cell(label_value: i64) -> NewCell {
    NewCell {
        label_value,
        centroid_x: 5.5,
        centroid_y: 6.5,
        bbox_x: 1,
        bbox_y: 1,
        bbox_w: 8,
        bbox_h: 8,
        area_um2: 42.0,
        perimeter_um: 23.0,
        circularity: 0.95,
        is_valid: true,
    }
}

fn label_plane() -> Plane {
    Plane::new(16, 16, PlaneData::I32(vec![1; 256])).unwrap()
}

/// Builds an experiment with two measured cells and returns the store.
fn measured_store(temp: &TempDir) -> ExperimentStore {
    let mut store = ExperimentStore::create(&temp.path().join("demo"), "demo", "").unwrap();
    store.add_channel(&channel("DAPI", 0)).unwrap();
    store.add_channel(&channel("GFP", 1)).unwrap();
    store.add_condition("ctrl", None).unwrap();
    store.add_bio_rep("ctrl", "N1").unwrap();
    let at = FovRef::new("r1", "ctrl");
    store.add_fov(&at, 16, 16, Some(0.65), None).unwrap();
    store
        .record_segmentation(&at, "DAPI", "cellseg", None, "{}", &label_plane(), &[
            sample_cell(1),
            sample_cell(2),
        ])
        .unwrap();
    let cells = store.cells(&at, None).unwrap();
    let channels = store.channels().unwrap();
    let mut measurements = Vec::new();
    for (index, cell) in cells.iter().enumerate() {
        let base = 100.0 + 10.0 * f64::from(u32::try_from(index).unwrap());
        measurements.push(NewMeasurement {
            cell_id: cell.id,
            channel_id: channels[0].id,
            metric: "mean_intensity".to_owned(),
            value: base,
            scope: MeasurementScope::WholeCell,
            threshold_run_id: None,
        });
        measurements.push(NewMeasurement {
            cell_id: cell.id,
            channel_id: channels[1].id,
            metric: "mean_intensity".to_owned(),
            value: base + 1.0,
            scope: MeasurementScope::WholeCell,
            threshold_run_id: None,
        });
    }
    // One mask-scoped value on the first cell only.
    measurements.push(NewMeasurement {
        cell_id: cells[0].id,
        channel_id: channels[1].id,
        metric: "mean_intensity".to_owned(),
        value: 77.0,
        scope: MeasurementScope::MaskInside,
        threshold_run_id: None,
    });
    store.upsert_measurements(&measurements).unwrap();
    store
}

// ============================================================================
// SECTION: Tables
// ============================================================================

#[test]
fn cell_table_joins_full_lineage_names() {
    let temp = TempDir::new().unwrap();
    let store = measured_store(&temp);
    let rows = store.cell_table(Some(&FovRef::new("r1", "ctrl"))).unwrap();
    assert_eq!(rows.len(), 2);
    for row in &rows {
        assert_eq!(row.fov, "r1");
        assert_eq!(row.bio_rep, "N1");
        assert_eq!(row.condition, "ctrl");
        assert_eq!(row.timepoint, None);
    }
}

#[test]
fn measurement_table_is_long_format_with_channel_names() {
    let temp = TempDir::new().unwrap();
    let store = measured_store(&temp);
    let rows = store.measurement_table(None).unwrap();
    assert_eq!(rows.len(), 5);
    assert!(rows.iter().any(|row| row.channel == "DAPI"));
    assert!(rows.iter().any(|row| row.channel == "GFP"));
    assert!(rows.iter().all(|row| row.fov == "r1"));
}

// ============================================================================
// SECTION: Pivot
// ============================================================================

#[test]
fn pivot_produces_one_column_per_channel_metric_scope() {
    let temp = TempDir::new().unwrap();
    let store = measured_store(&temp);
    let table = store.pivot_measurements(None, true).unwrap();
    assert_eq!(
        table.value_columns,
        vec![
            "DAPI_mean_intensity".to_owned(),
            "GFP_mean_intensity".to_owned(),
            "GFP_mean_intensity_mask_inside".to_owned(),
        ]
    );
    assert_eq!(table.rows.len(), 2);

    let first = &table.rows[0];
    assert_eq!(first.values[0], Some(100.0));
    assert_eq!(first.values[1], Some(101.0));
    assert_eq!(first.values[2], Some(77.0));
    // Identity columns join the cell's lineage and position.
    assert_eq!(table.identity_columns[1], "fov");
    assert_eq!(first.identity[1], "r1");

    let second = &table.rows[1];
    assert_eq!(second.values[0], Some(110.0));
    assert_eq!(second.values[1], Some(111.0));
    // The second cell has no mask-scoped value; the slot stays empty.
    assert_eq!(second.values[2], None);
}

#[test]
fn pivot_without_identity_has_no_identity_columns() {
    let temp = TempDir::new().unwrap();
    let store = measured_store(&temp);
    let table = store.pivot_measurements(None, false).unwrap();
    assert!(table.identity_columns.is_empty());
    assert!(table.rows.iter().all(|row| row.identity.is_empty()));
}

#[test]
fn pivot_of_unmeasured_experiment_is_empty_not_an_error() {
    let temp = TempDir::new().unwrap();
    let store = ExperimentStore::create(&temp.path().join("empty"), "empty", "").unwrap();
    let table = store.pivot_measurements(None, true).unwrap();
    assert!(table.value_columns.is_empty());
    assert!(table.rows.is_empty());
}

// ============================================================================
// SECTION: Export
// ============================================================================

#[test]
fn csv_export_lands_in_the_export_directory() {
    let temp = TempDir::new().unwrap();
    let store = measured_store(&temp);
    let table = store.pivot_measurements(None, true).unwrap();
    let path = store.export_csv(&table, "measurements.csv").unwrap();
    assert!(path.starts_with(store.dir().join("exports")));
    let contents = std::fs::read_to_string(&path).unwrap();
    let mut lines = contents.lines();
    let header = lines.next().unwrap();
    assert!(header.starts_with("cell_id,label_value,fov"));
    assert!(header.ends_with("GFP_mean_intensity_mask_inside"));
    assert_eq!(lines.count(), 2);
}

#[test]
fn export_rejects_unsafe_file_names() {
    let temp = TempDir::new().unwrap();
    let store = measured_store(&temp);
    let table = store.pivot_measurements(None, false).unwrap();
    assert!(store.export_csv(&table, "../escape.csv").is_err());
    assert!(store.export_csv(&table, "").is_err());
}
