// cytovault-catalog/src/catalog.rs
// ============================================================================
// Module: Catalog Connection
// Description: Lifecycle of the single-file SQLite catalog.
// Purpose: Create and open catalogs with WAL durability and enforced FKs.
// Dependencies: cytovault-core, rusqlite
// ============================================================================

//! ## Overview
//! A [`Catalog`] owns exactly one `SQLite` connection for its lifetime; the
//! connection is not safe for unsynchronized concurrent use and callers
//! needing parallelism open one catalog per thread. `create` stamps a fresh
//! catalog with the current format version; `open` reads the stored version
//! and migrates when its (major, minor) differs from current, failing closed
//! on versions with no migration path.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::path::Path;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::SystemTime;
use std::time::UNIX_EPOCH;

use cytovault_core::FormatVersion;
use cytovault_core::validate_name;
use rusqlite::Connection;
use rusqlite::OpenFlags;
use rusqlite::params;

use crate::config::CatalogConfig;
use crate::error::CatalogError;
use crate::migrate::run_migrations;
use crate::queries;
use crate::schema::FORMAT_VERSION;
use crate::schema::ensure_schema;

// ============================================================================
// SECTION: Catalog
// ============================================================================

/// An open experiment catalog.
#[derive(Debug)]
pub struct Catalog {
    /// Path of the catalog file.
    path: PathBuf,
    /// The exclusively owned connection.
    connection: Connection,
}

impl Catalog {
    /// Creates a fresh catalog file and stamps the singleton experiment row.
    ///
    /// # Errors
    ///
    /// Returns [`CatalogError::Invalid`] when the file already exists, a
    /// name-validation error for an unsafe experiment name, and database
    /// errors when schema creation fails.
    pub fn create(
        path: &Path,
        name: &str,
        description: &str,
        config: &CatalogConfig,
    ) -> Result<Self, CatalogError> {
        validate_name(name, "experiment name")?;
        if path.exists() {
            return Err(CatalogError::Invalid(format!(
                "catalog file already exists: {}",
                path.display()
            )));
        }
        let mut connection = open_connection(path, config, true)?;
        ensure_schema(&mut connection)?;
        connection.execute(
            "INSERT INTO experiment (name, description, format_version) VALUES (?1, ?2, ?3)",
            params![name, description, FORMAT_VERSION],
        )?;
        Ok(Self {
            path: path.to_path_buf(),
            connection,
        })
    }

    /// Opens an existing catalog, migrating when the stored (major, minor)
    /// version differs from current.
    ///
    /// # Errors
    ///
    /// Returns an I/O not-found error when the file is absent,
    /// [`CatalogError::SchemaVersion`] when the stored version has no
    /// migration path to current, and database errors otherwise.
    pub fn open(path: &Path, config: &CatalogConfig) -> Result<Self, CatalogError> {
        if !path.is_file() {
            return Err(CatalogError::Io(std::io::Error::new(
                std::io::ErrorKind::NotFound,
                format!("catalog file not found: {}", path.display()),
            )));
        }
        let mut connection = open_connection(path, config, false)?;
        let experiment = queries::get_experiment(&connection)?;
        let stored = FormatVersion::from_str(&experiment.format_version).map_err(|_| {
            CatalogError::SchemaVersion {
                stored: experiment.format_version.clone(),
                expected: FORMAT_VERSION.to_owned(),
            }
        })?;
        run_migrations(&mut connection, &stored)?;
        ensure_schema(&mut connection)?;
        if experiment.format_version != FORMAT_VERSION {
            queries::update_format_version(&connection, FORMAT_VERSION)?;
        }
        Ok(Self {
            path: path.to_path_buf(),
            connection,
        })
    }

    /// Returns the catalog file path.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Returns the owned connection for read queries.
    #[must_use]
    pub const fn connection(&self) -> &Connection {
        &self.connection
    }

    /// Returns the owned connection for transactional batch operations.
    pub const fn connection_mut(&mut self) -> &mut Connection {
        &mut self.connection
    }
}

// ============================================================================
// SECTION: Connection Helpers
// ============================================================================

/// Opens a connection with the catalog's durability settings applied.
fn open_connection(
    path: &Path,
    config: &CatalogConfig,
    create: bool,
) -> Result<Connection, CatalogError> {
    let mut flags = OpenFlags::SQLITE_OPEN_READ_WRITE | OpenFlags::SQLITE_OPEN_FULL_MUTEX;
    if create {
        flags |= OpenFlags::SQLITE_OPEN_CREATE;
    }
    let connection = Connection::open_with_flags(path, flags)?;
    apply_pragmas(&connection, config)?;
    Ok(connection)
}

/// Applies the foreign-key and durability pragmas.
fn apply_pragmas(connection: &Connection, config: &CatalogConfig) -> Result<(), CatalogError> {
    connection.execute_batch("PRAGMA foreign_keys = ON;")?;
    connection.execute_batch(&format!(
        "PRAGMA journal_mode = {};",
        config.journal_mode.pragma_value()
    ))?;
    connection.execute_batch(&format!(
        "PRAGMA synchronous = {};",
        config.sync_mode.pragma_value()
    ))?;
    connection.busy_timeout(std::time::Duration::from_millis(config.busy_timeout_ms))?;
    Ok(())
}

/// Returns the current unix epoch in milliseconds.
pub(crate) fn unix_millis() -> i64 {
    let now = SystemTime::now().duration_since(UNIX_EPOCH).unwrap_or_default();
    i64::try_from(now.as_millis()).unwrap_or(i64::MAX)
}
