// cytovault-core/src/lib.rs
// ============================================================================
// Module: Cytovault Core Library
// Description: Public API surface for the Cytovault core.
// Purpose: Expose entity records, name validation, and shared error types.
// Dependencies: crate::{error, name, records, version}
// ============================================================================

//! ## Overview
//! Cytovault core defines the typed vocabulary shared by the relational
//! catalog, the chunked array store, and the experiment store facade: one
//! immutable record type per catalog entity, the safe-identifier validator
//! every catalog-bound name passes through, and the experiment format
//! version used to gate schema migration. The crate performs no I/O.

// ============================================================================
// SECTION: Modules
// ============================================================================

pub mod error;
pub mod name;
pub mod records;
pub mod version;

// ============================================================================
// SECTION: Re-Exports
// ============================================================================

pub use error::Entity;
pub use error::NameError;
pub use name::validate_name;
pub use records::AnalysisRun;
pub use records::BiologicalReplicate;
pub use records::Cell;
pub use records::Channel;
pub use records::Condition;
pub use records::Experiment;
pub use records::FieldOfView;
pub use records::Measurement;
pub use records::MeasurementScope;
pub use records::NewAnalysisRun;
pub use records::NewCell;
pub use records::NewChannel;
pub use records::NewFieldOfView;
pub use records::NewMeasurement;
pub use records::NewParticle;
pub use records::NewSegmentationRun;
pub use records::NewThresholdRun;
pub use records::Particle;
pub use records::SegmentationRun;
pub use records::Tag;
pub use records::ThresholdRun;
pub use records::Timepoint;
pub use version::FormatVersion;
pub use version::VersionParseError;
