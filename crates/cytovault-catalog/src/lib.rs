// cytovault-catalog/src/lib.rs
// ============================================================================
// Module: Cytovault Catalog Library
// Description: Relational catalog of experiment metadata backed by SQLite.
// Purpose: Own the schema, its versioned migration, and the query layer.
// Dependencies: cytovault-core, rusqlite, serde, serde_json, thiserror
// ============================================================================

//! ## Overview
//! The catalog is the single owner of structured experiment metadata and of
//! identity: every name-addressed entity lives here, and array storage paths
//! are derived from catalog identity strings alone. The database is a single
//! file opened in WAL journal mode with foreign keys enforced. Schema
//! evolution is driven by an ordered migration table gated on the stored
//! format version's (major, minor) pair; an unrecognized version is a fatal
//! open failure.

// ============================================================================
// SECTION: Modules
// ============================================================================

pub mod catalog;
pub mod config;
pub mod error;
pub mod migrate;
pub mod queries;
pub mod schema;

// ============================================================================
// SECTION: Re-Exports
// ============================================================================

pub use catalog::Catalog;
pub use config::CatalogConfig;
pub use config::JournalMode;
pub use config::SyncMode;
pub use error::CatalogError;
pub use migrate::MIGRATIONS;
pub use migrate::Migration;
pub use schema::FORMAT_VERSION;
