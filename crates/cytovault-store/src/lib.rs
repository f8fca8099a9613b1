// cytovault-store/src/lib.rs
// ============================================================================
// Module: Cytovault Store Library
// Description: The experiment store facade.
// Purpose: Expose the single API every other subsystem calls.
// Dependencies: cytovault-catalog, cytovault-core, cytovault-zarr, csv
// ============================================================================

//! ## Overview
//! The experiment store is the only surface clients touch: it resolves
//! logical names to catalog identity, derives canonical array paths purely
//! from that identity, and performs the paired catalog/array writes. There
//! is deliberately no cross-store transaction; array planes are written
//! before the catalog rows that reference them, so a crash strands at worst
//! an unreferenced plane and recovery is re-running the producing step.

// ============================================================================
// SECTION: Modules
// ============================================================================

pub mod error;
pub mod experiment;
pub mod views;

// ============================================================================
// SECTION: Re-Exports
// ============================================================================

pub use error::StoreError;
pub use experiment::EXPERIMENT_EXTENSION;
pub use experiment::ExperimentStore;
pub use experiment::FovRef;
pub use views::CellRow;
pub use views::MeasurementRow;
pub use views::PivotRow;
pub use views::PivotTable;
