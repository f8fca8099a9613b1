// crates/cytovault-zarr/tests/plane_store.rs
// ============================================================================
// Module: Plane Store Tests
// Description: Validate Zarr-v2 plane round-trips, resize, and idempotence.
// Purpose: Ensure stored bytes and NGFF metadata behave as specified.
// Dependencies: cytovault-zarr, serde_json, tempfile
// ============================================================================

//! ## Overview
//! Round-trip, channel-axis resize, rewrite idempotence, and rank/dtype
//! rejection coverage for the plane stores, plus checks on the pure path
//! derivation and on the NGFF documents written alongside chunks.

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

use cytovault_zarr::ChannelDisplay;
use cytovault_zarr::Dtype;
use cytovault_zarr::IntensityWindow;
use cytovault_zarr::Plane;
use cytovault_zarr::PlaneData;
use cytovault_zarr::PlaneStore;
use cytovault_zarr::ZarrError;
use cytovault_zarr::group_path;
use cytovault_zarr::mask_group_path;
use tempfile::TempDir;

// ============================================================================
// SECTION: Helpers
// ============================================================================

fn ramp_u16(height: usize, width: usize, offset: u16) -> Plane {
    let values: Vec<u16> = (0..height * width)
        .map(|i| u16::try_from(i % 4096).unwrap() + offset)
        .collect();
    Plane::new(height, width, PlaneData::U16(values)).unwrap()
}

fn display(label: &str) -> ChannelDisplay {
    ChannelDisplay {
        label: label.to_owned(),
        color: "00FF00".to_owned(),
        window: IntensityWindow {
            start: 0.0,
            end: 65_535.0,
            min: 0.0,
            max: 65_535.0,
        },
    }
}

fn store(temp: &TempDir, name: &str) -> PlaneStore {
    let store = PlaneStore::new(temp.path().join(name));
    store.init().unwrap();
    store
}

// ============================================================================
// SECTION: Path Derivation
// ============================================================================

#[test]
fn group_paths_are_pure_functions_of_identity() {
    assert_eq!(group_path("N1", None, "r1"), "N1/r1");
    assert_eq!(group_path("N1", Some("t0"), "r1"), "N1/t0/r1");
    assert_eq!(mask_group_path("N1", None, "r1", "GFP"), "N1/r1/threshold_GFP");
    assert_eq!(
        mask_group_path("N2", Some("t4"), "r9", "DAPI"),
        "N2/t4/r9/threshold_DAPI"
    );
}

// ============================================================================
// SECTION: Round Trips
// ============================================================================

#[test]
fn image_channel_round_trips_exactly() {
    let temp = TempDir::new().unwrap();
    let images = store(&temp, "images");
    let plane = ramp_u16(64, 64, 0);
    images
        .write_image_channel("N1/r1", 0, 2, &plane, &[display("DAPI")], Some(0.65))
        .unwrap();
    let read = images.read_plane("N1/r1", 0).unwrap();
    assert_eq!(read, plane);
}

#[test]
fn unwritten_channel_reads_as_fill_value_zeros() {
    let temp = TempDir::new().unwrap();
    let images = store(&temp, "images");
    images
        .write_image_channel("N1/r1", 0, 2, &ramp_u16(16, 16, 1), &[display("DAPI")], None)
        .unwrap();
    let read = images.read_plane("N1/r1", 1).unwrap();
    assert_eq!(read, Plane::zeros(Dtype::U16, 16, 16));
}

#[test]
fn lazy_view_reports_shape_before_decoding() {
    let temp = TempDir::new().unwrap();
    let images = store(&temp, "images");
    let plane = ramp_u16(32, 48, 7);
    images
        .write_image_channel("N1/r1", 0, 1, &plane, &[display("DAPI")], None)
        .unwrap();
    let view = images.open_plane("N1/r1", 0).unwrap();
    assert_eq!(view.height(), 32);
    assert_eq!(view.width(), 48);
    assert_eq!(view.dtype(), Dtype::U16);
    assert_eq!(view.materialize().unwrap(), plane);
}

// ============================================================================
// SECTION: Channel Axis Resize
// ============================================================================

#[test]
fn write_beyond_capacity_resizes_preserving_existing_channels() {
    let temp = TempDir::new().unwrap();
    let images = store(&temp, "images");
    let first = ramp_u16(16, 16, 10);
    let second = ramp_u16(16, 16, 20);
    images
        .write_image_channel("N1/r1", 0, 2, &first, &[display("DAPI")], None)
        .unwrap();
    images
        .write_image_channel("N1/r1", 1, 2, &second, &[display("GFP")], None)
        .unwrap();

    // Index 2 exceeds the 2-channel capacity; the axis grows to 3.
    let third = ramp_u16(16, 16, 30);
    images
        .write_image_channel("N1/r1", 2, 2, &third, &[display("RFP")], None)
        .unwrap();

    assert_eq!(images.read_plane("N1/r1", 0).unwrap(), first);
    assert_eq!(images.read_plane("N1/r1", 1).unwrap(), second);
    assert_eq!(images.read_plane("N1/r1", 2).unwrap(), third);

    let meta: serde_json::Value = serde_json::from_slice(
        &std::fs::read(temp.path().join("images/N1/r1/0/.zarray")).unwrap(),
    )
    .unwrap();
    assert_eq!(meta["shape"], serde_json::json!([3, 16, 16]));
    assert_eq!(meta["chunks"], serde_json::json!([1, 16, 16]));
}

#[test]
fn out_of_range_read_is_rejected() {
    let temp = TempDir::new().unwrap();
    let images = store(&temp, "images");
    images
        .write_image_channel("N1/r1", 0, 2, &ramp_u16(8, 8, 0), &[display("DAPI")], None)
        .unwrap();
    let err = images.read_plane("N1/r1", 5).unwrap_err();
    assert!(matches!(err, ZarrError::Invalid(_)));
}

// ============================================================================
// SECTION: Idempotence
// ============================================================================

#[test]
fn rewriting_labels_yields_identical_bytes_and_metadata() {
    let temp = TempDir::new().unwrap();
    let labels = store(&temp, "labels");
    let values: Vec<i32> = (0..256).map(|i| i % 7).collect();
    let plane = Plane::new(16, 16, PlaneData::I32(values)).unwrap();

    labels
        .write_labels("N1/r1", &plane, "../../images/N1/r1", Some(0.65))
        .unwrap();
    let chunk_path = temp.path().join("labels/N1/r1/0/0.0.0");
    let attrs_path = temp.path().join("labels/N1/r1/.zattrs");
    let first_chunk = std::fs::read(&chunk_path).unwrap();
    let first_attrs = std::fs::read(&attrs_path).unwrap();

    labels
        .write_labels("N1/r1", &plane, "../../images/N1/r1", Some(0.65))
        .unwrap();
    assert_eq!(std::fs::read(&chunk_path).unwrap(), first_chunk);
    assert_eq!(std::fs::read(&attrs_path).unwrap(), first_attrs);
}

#[test]
fn label_attrs_reference_the_source_image_group() {
    let temp = TempDir::new().unwrap();
    let labels = store(&temp, "labels");
    let plane = Plane::new(8, 8, PlaneData::U16(vec![0; 64])).unwrap();
    labels.write_labels("N1/r1", &plane, "../../images/N1/r1", None).unwrap();
    let attrs: serde_json::Value = serde_json::from_slice(
        &std::fs::read(temp.path().join("labels/N1/r1/.zattrs")).unwrap(),
    )
    .unwrap();
    assert_eq!(attrs["image-label"]["source"]["image"], "../../images/N1/r1");
    assert_eq!(attrs["multiscales"][0]["version"], "0.4");
}

// ============================================================================
// SECTION: NGFF Metadata
// ============================================================================

#[test]
fn image_attrs_carry_axes_scale_and_omero_channels() {
    let temp = TempDir::new().unwrap();
    let images = store(&temp, "images");
    images
        .write_image_channel(
            "N1/t0/r1",
            0,
            1,
            &ramp_u16(8, 8, 0),
            &[display("DAPI")],
            Some(0.325),
        )
        .unwrap();
    let attrs: serde_json::Value = serde_json::from_slice(
        &std::fs::read(temp.path().join("images/N1/t0/r1/.zattrs")).unwrap(),
    )
    .unwrap();
    let multiscale = &attrs["multiscales"][0];
    assert_eq!(multiscale["axes"][0]["name"], "c");
    assert_eq!(multiscale["axes"][1]["name"], "y");
    assert_eq!(multiscale["axes"][2]["name"], "x");
    assert_eq!(multiscale["axes"][1]["unit"], "micrometer");
    assert_eq!(
        multiscale["datasets"][0]["coordinateTransformations"][0]["scale"],
        serde_json::json!([1.0, 0.325, 0.325])
    );
    assert_eq!(attrs["omero"]["channels"][0]["label"], "DAPI");
    assert_eq!(attrs["omero"]["channels"][0]["color"], "00FF00");
    // Every directory level carries a group marker.
    for dir in ["images", "images/N1", "images/N1/t0", "images/N1/t0/r1"] {
        assert!(temp.path().join(dir).join(".zgroup").is_file(), "missing marker in {dir}");
    }
}

// ============================================================================
// SECTION: Rejection
// ============================================================================

#[test]
fn non_rank_2_shapes_are_rejected_at_construction() {
    let data = PlaneData::U8(vec![0; 8]);
    assert!(matches!(
        Plane::from_shape(&[8], data.clone()),
        Err(ZarrError::Invalid(_))
    ));
    assert!(matches!(
        Plane::from_shape(&[2, 2, 2], data.clone()),
        Err(ZarrError::Invalid(_))
    ));
    assert!(Plane::from_shape(&[2, 4], data).is_ok());
}

#[test]
fn element_count_must_match_dimensions() {
    let err = Plane::new(4, 4, PlaneData::U8(vec![0; 15])).unwrap_err();
    assert!(matches!(err, ZarrError::Invalid(_)));
}

#[test]
fn masks_must_be_u8_and_labels_must_be_integer() {
    let temp = TempDir::new().unwrap();
    let masks = store(&temp, "masks");
    let labels = store(&temp, "labels");
    let float_plane = Plane::new(4, 4, PlaneData::F32(vec![0.0; 16])).unwrap();
    let err = masks
        .write_mask(&mask_group_path("N1", None, "r1", "GFP"), &float_plane, None)
        .unwrap_err();
    assert!(matches!(err, ZarrError::Invalid(_)));
    let err = labels.write_labels("N1/r1", &float_plane, "../../images/N1/r1", None).unwrap_err();
    assert!(matches!(err, ZarrError::Invalid(_)));
}

#[test]
fn dimension_mismatch_against_existing_array_is_rejected() {
    let temp = TempDir::new().unwrap();
    let images = store(&temp, "images");
    images
        .write_image_channel("N1/r1", 0, 2, &ramp_u16(16, 16, 0), &[display("DAPI")], None)
        .unwrap();
    let err = images
        .write_image_channel("N1/r1", 1, 2, &ramp_u16(32, 32, 0), &[display("GFP")], None)
        .unwrap_err();
    assert!(matches!(err, ZarrError::Invalid(_)));
    let wrong_dtype = Plane::new(16, 16, PlaneData::U8(vec![0; 256])).unwrap();
    let err = images
        .write_image_channel("N1/r1", 1, 2, &wrong_dtype, &[display("GFP")], None)
        .unwrap_err();
    assert!(matches!(err, ZarrError::Invalid(_)));
}

// ============================================================================
// SECTION: Masks And Pruning
// ============================================================================

#[test]
fn masks_round_trip_under_the_high_compression_codec() {
    let temp = TempDir::new().unwrap();
    let masks = store(&temp, "masks");
    let values: Vec<u8> = (0..4096).map(|i| if i % 3 == 0 { 255 } else { 0 }).collect();
    let plane = Plane::new(64, 64, PlaneData::U8(values)).unwrap();
    let group = mask_group_path("N1", None, "r1", "GFP");
    masks.write_mask(&group, &plane, None).unwrap();
    assert_eq!(masks.read_plane(&group, 0).unwrap(), plane);
    let meta: serde_json::Value = serde_json::from_slice(
        &std::fs::read(temp.path().join("masks/N1/r1/threshold_GFP/0/.zarray")).unwrap(),
    )
    .unwrap();
    assert_eq!(meta["compressor"]["id"], "zlib");
    assert_eq!(meta["compressor"]["level"], 9);
    assert_eq!(meta["dtype"], "|u1");
}

#[test]
fn prune_removes_a_group_and_is_idempotent() {
    let temp = TempDir::new().unwrap();
    let labels = store(&temp, "labels");
    let plane = Plane::new(8, 8, PlaneData::U16(vec![1; 64])).unwrap();
    labels.write_labels("N1/r1", &plane, "../../images/N1/r1", None).unwrap();
    assert!(labels.group_exists("N1/r1"));
    labels.prune_group("N1/r1").unwrap();
    assert!(!labels.group_exists("N1/r1"));
    labels.prune_group("N1/r1").unwrap();
}
