// crates/cytovault-store/tests/experiment_store.rs
// ============================================================================
// Module: Experiment Store Tests
// Description: End-to-end scenarios through the facade.
// Purpose: Validate lifecycle, identity resolution, and paired writes.
// Dependencies: cytovault-store, cytovault-core, cytovault-zarr, tempfile
// ============================================================================

//! ## Overview
//! Scenario coverage through the only API clients use: experiment
//! lifecycle, name-addressed plane round-trips, replicate ambiguity,
//! batch rollback, re-segmentation lineage, and catalog-only cascade
//! deletes.

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
    reason = "Test-only assertions and helpers are permitted."
)]

// ============================================================================
// SECTION: Imports
// ============================================================================

use cytovault_core::NewCell;
use cytovault_core::NewChannel;
use cytovault_store::ExperimentStore;
use cytovault_store::FovRef;
use cytovault_store::StoreError;
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
        display_color: Some("0000FF".to_owned()),
        is_segmentation: order == 0,
        display_order: order,
    }
}

fn plane_u16(height: usize, width: usize, offset: u16) -> Plane {
    let values: Vec<u16> = (0..height * width)
        .map(|i| u16::try_from(i % 1024).unwrap() + offset)
        .collect();
    Plane::new(height, width, PlaneData::U16(values)).unwrap()
}

fn label_plane(height: usize, width: usize, cells: i32) -> Plane {
    let values: Vec<i32> = (0..height * width)
        .map(|i| i32::try_from(i % (usize::try_from(cells).unwrap() + 1)).unwrap())
        .collect();
    Plane::new(height, width, PlaneData::I32(values)).unwrap()
}

fn sample_cell(label_value: i64) -> NewCell {
    NewCell {
        label_value,
        centroid_x: 8.0,
        centroid_y: 9.0,
        bbox_x: 2,
        bbox_y: 3,
        bbox_w: 10,
        bbox_h: 11,
        area_um2: 80.0,
        perimeter_um: 31.0,
        circularity: 0.9,
        is_valid: true,
    }
}

/// Creates an experiment seeded with one channel, condition, replicate,
/// and a 64x64 field named r1.
fn seeded_store(temp: &TempDir) -> ExperimentStore {
    let store = ExperimentStore::create(&temp.path().join("demo"), "demo", "").unwrap();
    store.add_channel(&channel("DAPI", 0)).unwrap();
    store.add_condition("ctrl", None).unwrap();
    store.add_bio_rep("ctrl", "N1").unwrap();
    store.add_fov(&FovRef::new("r1", "ctrl"), 64, 64, Some(0.65), None).unwrap();
    store
}

// ============================================================================
// SECTION: Lifecycle
// ============================================================================

#[test]
fn create_appends_reserved_extension_and_lays_out_directories() {
    let temp = TempDir::new().unwrap();
    let store = ExperimentStore::create(&temp.path().join("demo"), "demo", "pilot").unwrap();
    let dir = store.dir().to_path_buf();
    assert!(dir.ends_with("demo.cyv"));
    for sub in ["catalog.sqlite", "images", "labels", "masks", "exports"] {
        assert!(dir.join(sub).exists(), "missing {sub}");
    }
    let experiment = store.experiment().unwrap();
    assert_eq!(experiment.name, "demo");
    assert_eq!(experiment.description, "pilot");
}

#[test]
fn create_refuses_existing_path() {
    let temp = TempDir::new().unwrap();
    let _store = ExperimentStore::create(&temp.path().join("demo"), "demo", "").unwrap();
    let err = ExperimentStore::create(&temp.path().join("demo"), "demo", "").unwrap_err();
    assert!(matches!(err, StoreError::ExperimentExists(_)));
}

#[test]
fn open_missing_experiment_is_typed() {
    let temp = TempDir::new().unwrap();
    let err = ExperimentStore::open(&temp.path().join("absent")).unwrap_err();
    assert!(matches!(err, StoreError::ExperimentMissing(_)));
    assert!(err.is_not_found());
}

#[test]
fn close_is_idempotent_and_later_use_is_rejected() {
    let temp = TempDir::new().unwrap();
    let mut store = seeded_store(&temp);
    store.close();
    store.close();
    assert!(!store.is_open());
    let err = store.channels().unwrap_err();
    assert!(matches!(err, StoreError::Closed));
}

#[test]
fn reopen_finds_catalog_rows() {
    let temp = TempDir::new().unwrap();
    {
        let _store = seeded_store(&temp);
    }
    let store = ExperimentStore::open(&temp.path().join("demo")).unwrap();
    assert_eq!(store.channels().unwrap().len(), 1);
    assert_eq!(store.conditions().unwrap().len(), 1);
}

// ============================================================================
// SECTION: Scenario A — image round trip
// ============================================================================

#[test]
fn written_image_reads_back_exactly() {
    let temp = TempDir::new().unwrap();
    let store = seeded_store(&temp);
    let plane = plane_u16(64, 64, 3);
    let at = FovRef::new("r1", "ctrl");
    store.write_image(&at, "DAPI", &plane).unwrap();
    assert_eq!(store.read_image(&at, "DAPI").unwrap(), plane);
    // The array path is a pure function of catalog identity strings.
    assert!(store.dir().join("images/N1/r1/0/.zarray").is_file());
}

#[test]
fn plane_must_match_registered_fov_dimensions() {
    let temp = TempDir::new().unwrap();
    let store = seeded_store(&temp);
    let err = store
        .write_image(&FovRef::new("r1", "ctrl"), "DAPI", &plane_u16(32, 32, 0))
        .unwrap_err();
    assert!(matches!(err, StoreError::Invalid(_)));
}

#[test]
fn timepoint_addressed_fields_nest_under_the_timepoint() {
    let temp = TempDir::new().unwrap();
    let store = seeded_store(&temp);
    store.add_timepoint("t0", Some(0.0), 0).unwrap();
    let at = FovRef::new("r2", "ctrl").with_timepoint("t0");
    store.add_fov(&at, 32, 32, None, None).unwrap();
    store.write_image(&at, "DAPI", &plane_u16(32, 32, 0)).unwrap();
    assert!(store.dir().join("images/N1/t0/r2/0/.zarray").is_file());
}

// ============================================================================
// SECTION: Scenario B — duplicate channel
// ============================================================================

#[test]
fn duplicate_channel_is_typed_and_leaves_one_entry() {
    let temp = TempDir::new().unwrap();
    let store = seeded_store(&temp);
    let err = store.add_channel(&channel("DAPI", 1)).unwrap_err();
    assert!(err.is_duplicate());
    assert!(err.to_string().contains("DAPI"));
    assert_eq!(store.channels().unwrap().len(), 1);
}

// ============================================================================
// SECTION: Ambiguity
// ============================================================================

#[test]
fn second_replicate_makes_unqualified_addresses_ambiguous() {
    let temp = TempDir::new().unwrap();
    let store = seeded_store(&temp);
    store.add_bio_rep("ctrl", "N2").unwrap();
    let err = store.count_cells(&FovRef::new("r1", "ctrl")).unwrap_err();
    match err {
        StoreError::AmbiguousReplicate { condition, count } => {
            assert_eq!(condition, "ctrl");
            assert_eq!(count, 2);
        }
        other => panic!("expected ambiguity, got {other}"),
    }
    // Disambiguating by name resolves again.
    let at = FovRef::new("r1", "ctrl").with_bio_rep("N1");
    assert_eq!(store.count_cells(&at).unwrap(), 0);
}

#[test]
fn unknown_names_resolve_to_typed_not_found() {
    let temp = TempDir::new().unwrap();
    let store = seeded_store(&temp);
    let err = store.count_cells(&FovRef::new("r1", "missing")).unwrap_err();
    assert!(err.is_not_found());
    assert!(err.to_string().contains("missing"));
    let err = store
        .write_image(&FovRef::new("r1", "ctrl"), "GFP", &plane_u16(64, 64, 0))
        .unwrap_err();
    assert!(err.is_not_found());
}

// ============================================================================
// SECTION: Segmentation lineage
// ============================================================================

#[test]
fn record_segmentation_pairs_plane_and_rows() {
    let temp = TempDir::new().unwrap();
    let mut store = seeded_store(&temp);
    let at = FovRef::new("r1", "ctrl");
    let labels = label_plane(64, 64, 3);
    let cells: Vec<_> = (1..=3).map(sample_cell).collect();
    let run = store
        .record_segmentation(&at, "DAPI", "cellseg", Some("nuclei-2.1"), "{}", &labels, &cells)
        .unwrap();
    assert_eq!(run.cell_count, 3);
    assert_eq!(store.count_cells(&at).unwrap(), 3);
    assert_eq!(store.read_labels(&at).unwrap(), labels);
    // The label group references its source image group.
    let attrs: Vec<u8> = std::fs::read(store.dir().join("labels/N1/r1/.zattrs")).unwrap();
    let attrs = String::from_utf8(attrs).unwrap();
    assert!(attrs.contains("../../../images/N1/r1"));
}

#[test]
fn cell_batch_with_duplicate_label_rolls_back_entirely() {
    let temp = TempDir::new().unwrap();
    let mut store = seeded_store(&temp);
    let at = FovRef::new("r1", "ctrl");
    store
        .record_segmentation(&at, "DAPI", "cellseg", None, "{}", &label_plane(64, 64, 1), &[
            sample_cell(1),
        ])
        .unwrap();
    let before = store.count_cells(&at).unwrap();

    // Cell #37 of the 50-cell batch repeats label 5 within the batch, so
    // the whole call fails and no partial batch becomes observable.
    let mut batch: Vec<_> = (1..=49).map(sample_cell).collect();
    batch.insert(36, sample_cell(5));
    let err = store
        .record_segmentation(&at, "DAPI", "cellseg", None, "{}", &label_plane(64, 64, 1), &batch)
        .unwrap_err();
    assert!(err.is_duplicate(), "expected duplicate, got {err}");
    assert_eq!(store.count_cells(&at).unwrap(), before);
}

#[test]
fn resegmentation_keeps_prior_runs_queryable() {
    let temp = TempDir::new().unwrap();
    let mut store = seeded_store(&temp);
    let at = FovRef::new("r1", "ctrl");
    let first = store
        .record_segmentation(&at, "DAPI", "cellseg", None, "{}", &label_plane(64, 64, 2), &[
            sample_cell(1),
            sample_cell(2),
        ])
        .unwrap();
    let second = store
        .record_segmentation(&at, "DAPI", "cellseg", None, "{\"sigma\":2}", &label_plane(64, 64, 1), &[
            sample_cell(1),
        ])
        .unwrap();
    assert_ne!(first.id, second.id);
    assert_eq!(store.cells(&at, Some(first.id)).unwrap().len(), 2);
    assert_eq!(store.cells(&at, Some(second.id)).unwrap().len(), 1);
    assert_eq!(store.count_cells(&at).unwrap(), 3);
}

#[test]
fn clear_fov_analysis_deletes_rows_but_not_planes() {
    let temp = TempDir::new().unwrap();
    let mut store = seeded_store(&temp);
    let at = FovRef::new("r1", "ctrl");
    let labels = label_plane(64, 64, 2);
    store
        .record_segmentation(&at, "DAPI", "cellseg", None, "{}", &labels, &[
            sample_cell(1),
            sample_cell(2),
        ])
        .unwrap();
    let deleted = store.clear_fov_analysis(&at).unwrap();
    assert_eq!(deleted, 2);
    assert_eq!(store.count_cells(&at).unwrap(), 0);
    // Catalog rows only; the label plane is deliberately untouched.
    assert_eq!(store.read_labels(&at).unwrap(), labels);
    // Pruning is the separate, explicit operation.
    store.prune_labels(&at).unwrap();
    assert!(store.read_labels(&at).is_err());
}

// ============================================================================
// SECTION: Threshold and particles
// ============================================================================

#[test]
fn threshold_masks_round_trip_and_particles_attach_to_the_run() {
    let temp = TempDir::new().unwrap();
    let mut store = seeded_store(&temp);
    let at = FovRef::new("r1", "ctrl");
    let ids = {
        store
            .record_segmentation(&at, "DAPI", "cellseg", None, "{}", &label_plane(64, 64, 1), &[
                sample_cell(1),
            ])
            .unwrap();
        store.cells(&at, None).unwrap()
    };
    let mask_values: Vec<u8> = (0..4096).map(|i| if i % 2 == 0 { 255 } else { 0 }).collect();
    let mask = Plane::new(64, 64, PlaneData::U8(mask_values)).unwrap();
    let run = store
        .record_threshold(&at, "DAPI", "otsu", "{}", 117.0, &mask)
        .unwrap();
    assert_eq!(store.read_mask(&at, "DAPI").unwrap(), mask);
    assert!(store.dir().join("masks/N1/r1/threshold_DAPI/0/.zarray").is_file());

    let particles = vec![cytovault_core::NewParticle {
        cell_id: ids[0].id,
        label_value: 1,
        area_um2: 4.0,
        perimeter_um: 7.5,
        circularity: 0.88,
        centroid_x: 9.0,
        centroid_y: 10.0,
        mean_intensity: Some(200.0),
    }];
    let inserted = store.insert_particles(run.id, &particles).unwrap();
    assert_eq!(inserted.len(), 1);
}
