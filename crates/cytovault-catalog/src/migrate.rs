// cytovault-catalog/src/migrate.rs
// ============================================================================
// Module: Catalog Migration
// Description: Ordered migration table keyed on (major, minor) versions.
// Purpose: Evolve stored catalogs without destroying collected data.
// Dependencies: cytovault-core, rusqlite
// ============================================================================

//! ## Overview
//! Migration is table-driven: an ordered list of `(from, to, apply)` entries
//! keyed on `MAJOR.MINOR` labels. Opening a catalog walks the table from the
//! stored version to the current one and applies each step inside its own
//! transaction. A stored version with no path to current is a fatal open
//! failure; there is no speculative multi-hop guessing beyond the entries
//! listed here. Each step is followed by the idempotent schema ensure pass,
//! so a step only needs to transform what existence-checked creation cannot.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::str::FromStr;

use cytovault_core::FormatVersion;
use rusqlite::Connection;
use rusqlite::Transaction;
use rusqlite::params;

use crate::error::CatalogError;
use crate::schema::FORMAT_VERSION;

// ============================================================================
// SECTION: Migration Table
// ============================================================================

/// One schema migration step.
pub struct Migration {
    /// `MAJOR.MINOR` label this step upgrades from.
    pub from: &'static str,
    /// `MAJOR.MINOR` label this step upgrades to.
    pub to: &'static str,
    /// Applies the step inside the supplied transaction.
    pub apply: fn(&Transaction<'_>) -> Result<(), CatalogError>,
}

/// Ordered migration steps. Future versions append entries here.
pub const MIGRATIONS: &[Migration] = &[Migration {
    from: "3.2",
    to: "3.3",
    apply: migrate_3_2_to_3_3,
}];

// ============================================================================
// SECTION: Orchestration
// ============================================================================

/// Migrates an open catalog from `stored` to the current format version.
///
/// No-op when the stored (major, minor) already matches current.
///
/// # Errors
///
/// Returns [`CatalogError::SchemaVersion`] when no chain of entries in
/// [`MIGRATIONS`] leads from `stored` to current, and database errors when a
/// step fails.
pub fn run_migrations(
    connection: &mut Connection,
    stored: &FormatVersion,
) -> Result<(), CatalogError> {
    let current = FormatVersion::from_str(FORMAT_VERSION).map_err(|err| {
        CatalogError::Invalid(err.to_string())
    })?;
    if stored.major_minor() == current.major_minor() {
        return Ok(());
    }
    let steps = plan(&stored.major_minor_label(), &current.major_minor_label()).ok_or_else(
        || CatalogError::SchemaVersion {
            stored: stored.to_string(),
            expected: FORMAT_VERSION.to_owned(),
        },
    )?;
    for step in steps {
        let tx = connection.transaction()?;
        (step.apply)(&tx)?;
        tx.commit()?;
    }
    Ok(())
}

/// Returns the chain of steps from one `MAJOR.MINOR` label to another.
fn plan(from: &str, to: &str) -> Option<Vec<&'static Migration>> {
    let mut steps = Vec::new();
    let mut cursor = from;
    while cursor != to {
        let step = MIGRATIONS.iter().find(|m| m.from == cursor)?;
        steps.push(step);
        cursor = step.to;
    }
    Some(steps)
}

// ============================================================================
// SECTION: Steps
// ============================================================================

/// 3.2 -> 3.3: measurements gain a `scope` column (default `whole_cell`)
/// and their uniqueness key widens from (cell, channel, metric) to
/// (cell, channel, metric, scope), which requires re-creating the table.
/// Tables introduced during the 3.2 line (`tags`, `cell_tags`,
/// `analysis_runs`) are created when a still-older partial catalog lacks
/// them.
fn migrate_3_2_to_3_3(tx: &Transaction<'_>) -> Result<(), CatalogError> {
    if table_exists(tx, "measurements")? && !column_exists(tx, "measurements", "scope")? {
        tx.execute_batch(
            "CREATE TABLE measurements_migrated (
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
            INSERT INTO measurements_migrated
                (id, cell_id, channel_id, metric, value, scope, threshold_run_id)
                SELECT id, cell_id, channel_id, metric, value, 'whole_cell',
                       threshold_run_id
                FROM measurements;
            DROP TABLE measurements;
            ALTER TABLE measurements_migrated RENAME TO measurements;
            CREATE INDEX IF NOT EXISTS idx_measurements_cell
                ON measurements (cell_id);",
        )?;
    }
    tx.execute_batch(
        "CREATE TABLE IF NOT EXISTS tags (
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
        );",
    )?;
    Ok(())
}

// ============================================================================
// SECTION: Introspection Helpers
// ============================================================================

/// Returns true when a table of the given name exists.
fn table_exists(tx: &Transaction<'_>, table: &str) -> Result<bool, CatalogError> {
    let count: i64 = tx.query_row(
        "SELECT COUNT(*) FROM sqlite_master WHERE type = 'table' AND name = ?1",
        params![table],
        |row| row.get(0),
    )?;
    Ok(count > 0)
}

/// Returns true when a column exists on the given table.
fn column_exists(tx: &Transaction<'_>, table: &str, column: &str) -> Result<bool, CatalogError> {
    let count: i64 = tx.query_row(
        "SELECT COUNT(*) FROM pragma_table_info(?1) WHERE name = ?2",
        params![table, column],
        |row| row.get(0),
    )?;
    Ok(count > 0)
}
