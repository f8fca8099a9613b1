// crates/cytovault-core/tests/format_version.rs
// ============================================================================
// Module: Format Version Tests
// Description: Parsing and comparison of experiment format versions.
// Purpose: Ensure migration gating sees the correct (major, minor) pair.
// Dependencies: cytovault-core
// ============================================================================

//! Parsing and display behavior of the three-part format version.

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

use cytovault_core::FormatVersion;

#[test]
fn parses_three_part_versions() {
    let version: FormatVersion = "3.3.0".parse().unwrap();
    assert_eq!(version, FormatVersion::new(3, 3, 0));
    assert_eq!(version.major_minor(), (3, 3));
    assert_eq!(version.major_minor_label(), "3.3");
    assert_eq!(version.to_string(), "3.3.0");
}

#[test]
fn patch_does_not_affect_major_minor() {
    let a: FormatVersion = "3.3.0".parse().unwrap();
    let b: FormatVersion = "3.3.9".parse().unwrap();
    assert_eq!(a.major_minor(), b.major_minor());
}

#[test]
fn rejects_malformed_versions() {
    for value in ["", "3", "3.3", "3.3.0.1", "a.b.c", "3..0", "3.3.x"] {
        assert!(value.parse::<FormatVersion>().is_err(), "accepted {value}");
    }
}
