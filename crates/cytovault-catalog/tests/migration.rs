// crates/cytovault-catalog/tests/migration.rs
// ============================================================================
// Module: Catalog Migration Tests
// Description: Validate the 3.2 -> 3.3 migration step and version gating.
// Purpose: Ensure stored data survives migration and unknown versions fail.
// Dependencies: cytovault-catalog, cytovault-core, rusqlite, tempfile
// ============================================================================

//! ## Overview
//! Builds catalogs stamped at prior or unknown versions directly through
//! SQL, then opens them. The immediately-prior version migrates in place
//! with rows intact and documented defaults; anything else is a fatal
//! version error.

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

use std::path::Path;

use cytovault_catalog::Catalog;
use cytovault_catalog::CatalogConfig;
use cytovault_catalog::CatalogError;
use cytovault_catalog::FORMAT_VERSION;
use cytovault_catalog::queries;
use cytovault_core::MeasurementScope;
use rusqlite::Connection;
use tempfile::TempDir;

// ============================================================================
// SECTION: Fixtures
// ============================================================================

/// Writes a catalog file shaped like the 3.2 line: measurements lack the
/// `scope` column and carry the narrower uniqueness key; `tags`,
/// `cell_tags`, and `analysis_runs` do not exist yet.
fn write_v32_catalog(path: &Path) {
    let conn = Connection::open(path).unwrap();
    conn.execute_batch(
        "CREATE TABLE experiment (
            id INTEGER PRIMARY KEY,
            name TEXT NOT NULL,
            description TEXT NOT NULL DEFAULT '',
            format_version TEXT NOT NULL
        );
        CREATE TABLE channels (
            id INTEGER PRIMARY KEY,
            name TEXT NOT NULL UNIQUE,
            role TEXT,
            excitation_nm REAL,
            emission_nm REAL,
            display_color TEXT,
            is_segmentation INTEGER NOT NULL DEFAULT 0,
            display_order INTEGER NOT NULL
        );
        CREATE TABLE conditions (
            id INTEGER PRIMARY KEY,
            name TEXT NOT NULL UNIQUE,
            description TEXT
        );
        CREATE TABLE biological_replicates (
            id INTEGER PRIMARY KEY,
            condition_id INTEGER NOT NULL REFERENCES conditions(id),
            name TEXT NOT NULL,
            UNIQUE (condition_id, name)
        );
        CREATE TABLE timepoints (
            id INTEGER PRIMARY KEY,
            name TEXT NOT NULL UNIQUE,
            elapsed_minutes REAL,
            display_order INTEGER NOT NULL DEFAULT 0
        );
        CREATE TABLE fields_of_view (
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
        CREATE TABLE segmentation_runs (
            id INTEGER PRIMARY KEY,
            channel_id INTEGER NOT NULL REFERENCES channels(id),
            backend TEXT NOT NULL,
            model_name TEXT,
            parameters TEXT NOT NULL DEFAULT '{}',
            cell_count INTEGER NOT NULL DEFAULT 0,
            created_at INTEGER NOT NULL
        );
        CREATE TABLE cells (
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
        CREATE TABLE threshold_runs (
            id INTEGER PRIMARY KEY,
            channel_id INTEGER NOT NULL REFERENCES channels(id),
            method TEXT NOT NULL,
            parameters TEXT NOT NULL DEFAULT '{}',
            threshold_value REAL NOT NULL,
            created_at INTEGER NOT NULL
        );
        CREATE TABLE measurements (
            id INTEGER PRIMARY KEY,
            cell_id INTEGER NOT NULL REFERENCES cells(id) ON DELETE CASCADE,
            channel_id INTEGER NOT NULL REFERENCES channels(id),
            metric TEXT NOT NULL,
            value REAL NOT NULL,
            threshold_run_id INTEGER REFERENCES threshold_runs(id),
            UNIQUE (cell_id, channel_id, metric)
        );
        INSERT INTO experiment (name, description, format_version)
            VALUES ('screen-01', '', '3.2.0');
        INSERT INTO channels (name, is_segmentation, display_order)
            VALUES ('DAPI', 1, 0);
        INSERT INTO conditions (name) VALUES ('ctrl');
        INSERT INTO biological_replicates (condition_id, name) VALUES (1, 'N1');
        INSERT INTO fields_of_view (bio_rep_id, name, width_px, height_px)
            VALUES (1, 'r1', 64, 64);
        INSERT INTO segmentation_runs (channel_id, backend, created_at)
            VALUES (1, 'threshold', 0);
        INSERT INTO cells (fov_id, segmentation_run_id, label_value, centroid_x,
            centroid_y, bbox_x, bbox_y, bbox_w, bbox_h, area_um2, perimeter_um,
            circularity)
            VALUES (1, 1, 1, 10.0, 10.0, 0, 0, 8, 8, 50.0, 25.0, 0.9);
        INSERT INTO measurements (cell_id, channel_id, metric, value)
            VALUES (1, 1, 'mean_intensity', 42.5);",
    )
    .unwrap();
}

/// Writes a minimal catalog stamped with an arbitrary version string.
fn write_stamped_catalog(path: &Path, version: &str) {
    let conn = Connection::open(path).unwrap();
    conn.execute_batch(&format!(
        "CREATE TABLE experiment (
            id INTEGER PRIMARY KEY,
            name TEXT NOT NULL,
            description TEXT NOT NULL DEFAULT '',
            format_version TEXT NOT NULL
        );
        INSERT INTO experiment (name, description, format_version)
            VALUES ('screen-01', '', '{version}');"
    ))
    .unwrap();
}

// ============================================================================
// SECTION: Tests
// ============================================================================

#[test]
fn prior_minor_version_migrates_in_place() {
    let temp = TempDir::new().unwrap();
    let path = temp.path().join("catalog.sqlite");
    write_v32_catalog(&path);

    let catalog = Catalog::open(&path, &CatalogConfig::default()).unwrap();
    let experiment = queries::get_experiment(catalog.connection()).unwrap();
    assert_eq!(experiment.format_version, FORMAT_VERSION);

    // The pre-existing measurement gains the documented default scope.
    let measurements = queries::measurements_for_cell(catalog.connection(), 1).unwrap();
    assert_eq!(measurements.len(), 1);
    assert_eq!(measurements[0].metric, "mean_intensity");
    assert_eq!(measurements[0].value, 42.5);
    assert_eq!(measurements[0].scope, MeasurementScope::WholeCell);

    // Prior rows are intact across the table re-creation.
    assert_eq!(queries::count_cells(catalog.connection(), Some(1)).unwrap(), 1);
    let channel = queries::channel_by_name(catalog.connection(), "DAPI").unwrap();
    assert!(channel.is_segmentation);
}

#[test]
fn migrated_catalog_gains_tables_older_files_lack() {
    let temp = TempDir::new().unwrap();
    let path = temp.path().join("catalog.sqlite");
    write_v32_catalog(&path);

    let catalog = Catalog::open(&path, &CatalogConfig::default()).unwrap();
    // tags / analysis_runs did not exist at 3.2; they are usable now.
    let tag = queries::insert_tag(catalog.connection(), "curated").unwrap();
    assert_eq!(tag.name, "curated");
    assert!(queries::list_analysis_runs(catalog.connection()).unwrap().is_empty());
}

#[test]
fn widened_measurement_key_admits_scoped_rows_after_migration() {
    let temp = TempDir::new().unwrap();
    let path = temp.path().join("catalog.sqlite");
    write_v32_catalog(&path);

    let mut catalog = Catalog::open(&path, &CatalogConfig::default()).unwrap();
    // Same (cell, channel, metric) under a different scope is a new row
    // once the uniqueness key is widened.
    queries::upsert_measurements(
        catalog.connection_mut(),
        &[cytovault_core::NewMeasurement {
            cell_id: 1,
            channel_id: 1,
            metric: "mean_intensity".to_owned(),
            value: 17.0,
            scope: MeasurementScope::MaskInside,
            threshold_run_id: None,
        }],
    )
    .unwrap();
    let measurements = queries::measurements_for_cell(catalog.connection(), 1).unwrap();
    assert_eq!(measurements.len(), 2);
}

#[test]
fn unknown_stored_version_is_fatal() {
    let temp = TempDir::new().unwrap();
    let path = temp.path().join("catalog.sqlite");
    write_stamped_catalog(&path, "9.7.0");
    let err = Catalog::open(&path, &CatalogConfig::default()).unwrap_err();
    match err {
        CatalogError::SchemaVersion { stored, expected } => {
            assert_eq!(stored, "9.7.0");
            assert_eq!(expected, FORMAT_VERSION);
        }
        other => panic!("expected schema version error, got {other}"),
    }
}

#[test]
fn malformed_stored_version_is_fatal() {
    let temp = TempDir::new().unwrap();
    let path = temp.path().join("catalog.sqlite");
    write_stamped_catalog(&path, "not-a-version");
    let err = Catalog::open(&path, &CatalogConfig::default()).unwrap_err();
    assert!(matches!(err, CatalogError::SchemaVersion { .. }));
}

#[test]
fn reopen_after_migration_is_a_no_op() {
    let temp = TempDir::new().unwrap();
    let path = temp.path().join("catalog.sqlite");
    write_v32_catalog(&path);
    drop(Catalog::open(&path, &CatalogConfig::default()).unwrap());

    let catalog = Catalog::open(&path, &CatalogConfig::default()).unwrap();
    let experiment = queries::get_experiment(catalog.connection()).unwrap();
    assert_eq!(experiment.format_version, FORMAT_VERSION);
    assert_eq!(queries::count_measurements(catalog.connection(), None).unwrap(), 1);
}
