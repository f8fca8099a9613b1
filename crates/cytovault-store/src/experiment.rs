// cytovault-store/src/experiment.rs
// ============================================================================
// Module: Experiment Store
// Description: The consistency facade over the catalog and array stores.
// Purpose: Resolve identity, derive array paths, and pair the writes.
// Dependencies: cytovault-catalog, cytovault-core, cytovault-zarr, rusqlite
// ============================================================================

//! ## Overview
//! One [`ExperimentStore`] exclusively owns one catalog connection for its
//! lifetime; array-store handles open fresh per operation. Every call
//! addressed by names resolves them to catalog identity first, then derives
//! the canonical array path purely from the resolved identity strings — the
//! cross-store invariant that keeps both stores consistent without a shared
//! transaction.
//!
//! A field of view moves through a monotonic lineage: unsegmented, then
//! segmented (possibly re-segmented under new run ids, keeping prior runs
//! queryable), then measured (upsertable), then thresholded per channel and
//! method, then particle-analyzed against one threshold run. The only undo
//! is [`ExperimentStore::clear_fov_analysis`], which deletes catalog rows
//! only and deliberately leaves array planes in place.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::fs;
use std::path::Path;
use std::path::PathBuf;

use cytovault_catalog::Catalog;
use cytovault_catalog::CatalogConfig;
use cytovault_catalog::CatalogError;
use cytovault_catalog::queries;
use cytovault_core::AnalysisRun;
use cytovault_core::BiologicalReplicate;
use cytovault_core::Cell;
use cytovault_core::Channel;
use cytovault_core::Condition;
use cytovault_core::Entity;
use cytovault_core::Experiment;
use cytovault_core::FieldOfView;
use cytovault_core::NewAnalysisRun;
use cytovault_core::NewCell;
use cytovault_core::NewChannel;
use cytovault_core::NewFieldOfView;
use cytovault_core::NewMeasurement;
use cytovault_core::NewParticle;
use cytovault_core::NewSegmentationRun;
use cytovault_core::NewThresholdRun;
use cytovault_core::SegmentationRun;
use cytovault_core::Tag;
use cytovault_core::ThresholdRun;
use cytovault_core::Timepoint;
use cytovault_core::validate_name;
use cytovault_zarr::ChannelDisplay;
use cytovault_zarr::Dtype;
use cytovault_zarr::IntensityWindow;
use cytovault_zarr::Plane;
use cytovault_zarr::PlaneStore;
use cytovault_zarr::PlaneView;
use cytovault_zarr::group_path;
use cytovault_zarr::mask_group_path;

use crate::error::StoreError;
use crate::views;
use crate::views::CellRow;
use crate::views::MeasurementRow;
use crate::views::PivotTable;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Reserved extension of experiment directories.
pub const EXPERIMENT_EXTENSION: &str = "cyv";

/// Catalog file name inside the experiment directory.
const CATALOG_FILE: &str = "catalog.sqlite";

/// Image store directory name.
const IMAGES_DIR: &str = "images";

/// Label store directory name.
const LABELS_DIR: &str = "labels";

/// Mask store directory name.
const MASKS_DIR: &str = "masks";

/// Export directory name.
const EXPORTS_DIR: &str = "exports";

// ============================================================================
// SECTION: Addressing
// ============================================================================

/// Logical address of one field of view.
///
/// The replicate may be omitted when its condition holds exactly one; the
/// timepoint is omitted for experiments without a time dimension.
#[derive(Debug, Clone, Copy)]
pub struct FovRef<'a> {
    /// Field-of-view name.
    pub fov: &'a str,
    /// Condition name.
    pub condition: &'a str,
    /// Replicate name, required only when the condition has several.
    pub bio_rep: Option<&'a str>,
    /// Timepoint name, when the field belongs to one.
    pub timepoint: Option<&'a str>,
}

impl<'a> FovRef<'a> {
    /// Addresses a field by (fov, condition) alone.
    #[must_use]
    pub const fn new(fov: &'a str, condition: &'a str) -> Self {
        Self {
            fov,
            condition,
            bio_rep: None,
            timepoint: None,
        }
    }

    /// Pins the replicate name.
    #[must_use]
    pub const fn with_bio_rep(mut self, bio_rep: &'a str) -> Self {
        self.bio_rep = Some(bio_rep);
        self
    }

    /// Pins the timepoint name.
    #[must_use]
    pub const fn with_timepoint(mut self, timepoint: &'a str) -> Self {
        self.timepoint = Some(timepoint);
        self
    }
}

/// A fully resolved field-of-view identity.
struct ResolvedFov {
    /// The field-of-view row.
    fov: FieldOfView,
    /// Its replicate row.
    bio_rep: BiologicalReplicate,
    /// Its timepoint row, when addressed.
    timepoint: Option<Timepoint>,
}

impl ResolvedFov {
    /// Derives the canonical image/label group path from identity strings.
    fn group(&self) -> String {
        group_path(
            &self.bio_rep.name,
            self.timepoint.as_ref().map(|t| t.name.as_str()),
            &self.fov.name,
        )
    }

    /// Derives the canonical mask group path for a channel.
    fn mask_group(&self, channel: &str) -> String {
        mask_group_path(
            &self.bio_rep.name,
            self.timepoint.as_ref().map(|t| t.name.as_str()),
            &self.fov.name,
            channel,
        )
    }
}

// ============================================================================
// SECTION: Experiment Store
// ============================================================================

/// An open experiment: one catalog plus three array stores and an export
/// directory under a single `.cyv` directory.
#[derive(Debug)]
pub struct ExperimentStore {
    /// The experiment directory.
    dir: PathBuf,
    /// The exclusively owned catalog; `None` after `close`.
    catalog: Option<Catalog>,
}

impl ExperimentStore {
    /// Creates a new experiment directory with default catalog settings.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::ExperimentExists`] when the path already
    /// exists.
    pub fn create(path: &Path, name: &str, description: &str) -> Result<Self, StoreError> {
        Self::create_with_config(path, name, description, &CatalogConfig::default())
    }

    /// Creates a new experiment directory.
    ///
    /// The reserved `.cyv` extension is appended when absent. The catalog,
    /// the three empty array stores, and the export directory are all laid
    /// down before the call returns.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::ExperimentExists`] when the path already
    /// exists.
    pub fn create_with_config(
        path: &Path,
        name: &str,
        description: &str,
        config: &CatalogConfig,
    ) -> Result<Self, StoreError> {
        let dir = experiment_dir(path);
        if dir.exists() {
            return Err(StoreError::ExperimentExists(dir));
        }
        validate_name(name, "experiment name")?;
        fs::create_dir_all(&dir)?;
        let catalog = Catalog::create(&dir.join(CATALOG_FILE), name, description, config)?;
        for store_dir in [IMAGES_DIR, LABELS_DIR, MASKS_DIR] {
            PlaneStore::new(dir.join(store_dir)).init()?;
        }
        fs::create_dir_all(dir.join(EXPORTS_DIR))?;
        Ok(Self {
            dir,
            catalog: Some(catalog),
        })
    }

    /// Opens an existing experiment with default catalog settings.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::ExperimentMissing`] when no catalog file
    /// exists at the path.
    pub fn open(path: &Path) -> Result<Self, StoreError> {
        Self::open_with_config(path, &CatalogConfig::default())
    }

    /// Opens an existing experiment, migrating the catalog when its stored
    /// format version requires it.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::ExperimentMissing`] when no catalog file
    /// exists at the path, and catalog errors (including the fatal schema
    /// version mismatch) otherwise.
    pub fn open_with_config(path: &Path, config: &CatalogConfig) -> Result<Self, StoreError> {
        let dir = experiment_dir(path);
        let catalog_path = dir.join(CATALOG_FILE);
        if !catalog_path.is_file() {
            return Err(StoreError::ExperimentMissing(dir));
        }
        let catalog = Catalog::open(&catalog_path, config)?;
        Ok(Self {
            dir,
            catalog: Some(catalog),
        })
    }

    /// Releases the catalog connection. Idempotent.
    pub fn close(&mut self) {
        self.catalog = None;
    }

    /// Returns true while the catalog connection is held.
    #[must_use]
    pub const fn is_open(&self) -> bool {
        self.catalog.is_some()
    }

    /// Returns the experiment directory.
    #[must_use]
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Returns the experiment row.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Closed`] after `close`.
    pub fn experiment(&self) -> Result<Experiment, StoreError> {
        Ok(queries::get_experiment(self.conn()?)?)
    }

    // ------------------------------------------------------------------
    // Registration
    // ------------------------------------------------------------------

    /// Registers a channel.
    ///
    /// # Errors
    ///
    /// Returns a duplicate error when the name is taken.
    pub fn add_channel(&self, new: &NewChannel) -> Result<Channel, StoreError> {
        Ok(queries::insert_channel(self.conn()?, new)?)
    }

    /// Returns every channel in channel-axis order.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Closed`] after `close`.
    pub fn channels(&self) -> Result<Vec<Channel>, StoreError> {
        Ok(queries::list_channels(self.conn()?)?)
    }

    /// Registers a condition.
    ///
    /// # Errors
    ///
    /// Returns a duplicate error when the name is taken.
    pub fn add_condition(
        &self,
        name: &str,
        description: Option<&str>,
    ) -> Result<Condition, StoreError> {
        Ok(queries::insert_condition(self.conn()?, name, description)?)
    }

    /// Returns every condition.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Closed`] after `close`.
    pub fn conditions(&self) -> Result<Vec<Condition>, StoreError> {
        Ok(queries::list_conditions(self.conn()?)?)
    }

    /// Registers a biological replicate under a condition.
    ///
    /// # Errors
    ///
    /// Returns a duplicate error when the name is taken within the
    /// condition.
    pub fn add_bio_rep(
        &self,
        condition: &str,
        name: &str,
    ) -> Result<BiologicalReplicate, StoreError> {
        let conn = self.conn()?;
        let condition = queries::condition_by_name(conn, condition)?;
        Ok(queries::insert_bio_rep(conn, condition.id, name)?)
    }

    /// Registers a timepoint.
    ///
    /// # Errors
    ///
    /// Returns a duplicate error when the name is taken.
    pub fn add_timepoint(
        &self,
        name: &str,
        elapsed_minutes: Option<f64>,
        display_order: i64,
    ) -> Result<Timepoint, StoreError> {
        Ok(queries::insert_timepoint(self.conn()?, name, elapsed_minutes, display_order)?)
    }

    /// Registers a field of view at a logical address.
    ///
    /// # Errors
    ///
    /// Returns a duplicate error when the (replicate, timepoint, name) slot
    /// is taken and an ambiguity error when the replicate cannot be
    /// auto-resolved.
    pub fn add_fov(
        &self,
        at: &FovRef<'_>,
        width_px: i64,
        height_px: i64,
        pixel_size_um: Option<f64>,
        source_path: Option<&str>,
    ) -> Result<FieldOfView, StoreError> {
        let conn = self.conn()?;
        let condition = queries::condition_by_name(conn, at.condition)?;
        let bio_rep = self.resolve_bio_rep(&condition.name, condition.id, at.bio_rep)?;
        let timepoint = at
            .timepoint
            .map(|name| queries::timepoint_by_name(conn, name))
            .transpose()?;
        Ok(queries::insert_fov(
            conn,
            &NewFieldOfView {
                bio_rep_id: bio_rep.id,
                timepoint_id: timepoint.map(|t| t.id),
                name: at.fov.to_owned(),
                width_px,
                height_px,
                pixel_size_um,
                source_path: source_path.map(str::to_owned),
            },
        )?)
    }

    // ------------------------------------------------------------------
    // Paired plane writes
    // ------------------------------------------------------------------

    /// Writes one channel plane of a field's image group.
    ///
    /// # Errors
    ///
    /// Returns typed not-found errors for unknown names and
    /// [`StoreError::Invalid`] when the plane disagrees with the field's
    /// registered dimensions.
    pub fn write_image(
        &self,
        at: &FovRef<'_>,
        channel: &str,
        plane: &Plane,
    ) -> Result<(), StoreError> {
        let resolved = self.resolve(at)?;
        check_plane_dims(&resolved.fov, plane)?;
        let conn = self.conn()?;
        let channel_rec = queries::channel_by_name(conn, channel)?;
        let channel_index = channel_axis_index(&channel_rec)?;
        let all_channels = queries::list_channels(conn)?;
        let displays = channel_displays(&all_channels, plane.dtype());
        self.images().write_image_channel(
            &resolved.group(),
            channel_index,
            all_channels.len(),
            plane,
            &displays,
            resolved.fov.pixel_size_um,
        )?;
        Ok(())
    }

    /// Reads one channel plane of a field's image group, materialized.
    ///
    /// # Errors
    ///
    /// Returns typed not-found errors for unknown names and array errors
    /// when the group has no data.
    pub fn read_image(&self, at: &FovRef<'_>, channel: &str) -> Result<Plane, StoreError> {
        Ok(self.open_image(at, channel)?.materialize()?)
    }

    /// Opens a lazily evaluated view of one image channel plane.
    ///
    /// # Errors
    ///
    /// Returns typed not-found errors for unknown names and array errors
    /// when the group has no data.
    pub fn open_image(&self, at: &FovRef<'_>, channel: &str) -> Result<PlaneView, StoreError> {
        let resolved = self.resolve(at)?;
        let channel_rec = queries::channel_by_name(self.conn()?, channel)?;
        let channel_index = channel_axis_index(&channel_rec)?;
        Ok(self.images().open_plane(&resolved.group(), channel_index)?)
    }

    /// Overwrites a field's label plane in place.
    ///
    /// Used by label-editing clients; segmentation should go through
    /// [`Self::record_segmentation`] so the catalog rows stay paired.
    ///
    /// # Errors
    ///
    /// Returns typed not-found errors for unknown names and
    /// [`StoreError::Invalid`] for mismatched planes.
    pub fn write_labels(&self, at: &FovRef<'_>, plane: &Plane) -> Result<(), StoreError> {
        let resolved = self.resolve(at)?;
        check_plane_dims(&resolved.fov, plane)?;
        let group = resolved.group();
        self.labels().write_labels(
            &group,
            plane,
            &label_source_path(&group),
            resolved.fov.pixel_size_um,
        )?;
        Ok(())
    }

    /// Reads a field's label plane, materialized.
    ///
    /// # Errors
    ///
    /// Returns typed not-found errors for unknown names and array errors
    /// when no labels exist.
    pub fn read_labels(&self, at: &FovRef<'_>) -> Result<Plane, StoreError> {
        let resolved = self.resolve(at)?;
        Ok(self.labels().read_plane(&resolved.group(), 0)?)
    }

    /// Overwrites a field's binary mask plane for one channel.
    ///
    /// # Errors
    ///
    /// Returns typed not-found errors for unknown names and
    /// [`StoreError::Invalid`] for mismatched planes.
    pub fn write_mask(
        &self,
        at: &FovRef<'_>,
        channel: &str,
        plane: &Plane,
    ) -> Result<(), StoreError> {
        let resolved = self.resolve(at)?;
        check_plane_dims(&resolved.fov, plane)?;
        let channel_rec = queries::channel_by_name(self.conn()?, channel)?;
        self.masks().write_mask(
            &resolved.mask_group(&channel_rec.name),
            plane,
            resolved.fov.pixel_size_um,
        )?;
        Ok(())
    }

    /// Reads a field's binary mask plane for one channel.
    ///
    /// # Errors
    ///
    /// Returns typed not-found errors for unknown names and array errors
    /// when no mask exists.
    pub fn read_mask(&self, at: &FovRef<'_>, channel: &str) -> Result<Plane, StoreError> {
        let resolved = self.resolve(at)?;
        let channel_rec = queries::channel_by_name(self.conn()?, channel)?;
        Ok(self.masks().read_plane(&resolved.mask_group(&channel_rec.name), 0)?)
    }

    // ------------------------------------------------------------------
    // Processing lineage
    // ------------------------------------------------------------------

    /// Records one segmentation run: the label plane, the run row, and the
    /// cell batch.
    ///
    /// The plane is written before any catalog row that references it; a
    /// crash in between strands an unreferenced plane, and re-running the
    /// step overwrites it idempotently. Prior runs of the same field are
    /// never deleted — both stay queryable by run id.
    ///
    /// # Errors
    ///
    /// Returns a duplicate error when the cell batch repeats a label value,
    /// rolling back the run row together with the whole batch.
    pub fn record_segmentation(
        &mut self,
        at: &FovRef<'_>,
        channel: &str,
        backend: &str,
        model_name: Option<&str>,
        parameters: &str,
        label_plane: &Plane,
        cells: &[NewCell],
    ) -> Result<SegmentationRun, StoreError> {
        let resolved = self.resolve(at)?;
        check_plane_dims(&resolved.fov, label_plane)?;
        let channel_rec = queries::channel_by_name(self.conn()?, channel)?;
        let cell_count = i64::try_from(cells.len())
            .map_err(|_| StoreError::Invalid("cell batch too large".to_owned()))?;

        // Array plane first; catalog rows second.
        let group = resolved.group();
        self.labels().write_labels(
            &group,
            label_plane,
            &label_source_path(&group),
            resolved.fov.pixel_size_um,
        )?;

        let catalog = self.catalog.as_mut().ok_or(StoreError::Closed)?;
        let (run, _ids) = queries::insert_segmentation_with_cells(
            catalog.connection_mut(),
            resolved.fov.id,
            &NewSegmentationRun {
                channel_id: channel_rec.id,
                backend: backend.to_owned(),
                model_name: model_name.map(str::to_owned),
                parameters: parameters.to_owned(),
                cell_count,
            },
            cells,
        )?;
        Ok(run)
    }

    /// Records one threshold run: the mask plane, then the run row.
    ///
    /// # Errors
    ///
    /// Returns typed not-found errors for unknown names and
    /// [`StoreError::Invalid`] for mismatched planes.
    pub fn record_threshold(
        &self,
        at: &FovRef<'_>,
        channel: &str,
        method: &str,
        parameters: &str,
        threshold_value: f64,
        mask_plane: &Plane,
    ) -> Result<ThresholdRun, StoreError> {
        let resolved = self.resolve(at)?;
        check_plane_dims(&resolved.fov, mask_plane)?;
        let channel_rec = queries::channel_by_name(self.conn()?, channel)?;
        self.masks().write_mask(
            &resolved.mask_group(&channel_rec.name),
            mask_plane,
            resolved.fov.pixel_size_um,
        )?;
        Ok(queries::insert_threshold_run(
            self.conn()?,
            &NewThresholdRun {
                channel_id: channel_rec.id,
                method: method.to_owned(),
                parameters: parameters.to_owned(),
                threshold_value,
            },
        )?)
    }

    /// Upserts a measurement batch keyed on (cell, channel, metric, scope).
    ///
    /// # Errors
    ///
    /// Returns catalog errors when any row fails; the batch is
    /// all-or-nothing.
    pub fn upsert_measurements(
        &mut self,
        measurements: &[NewMeasurement],
    ) -> Result<(), StoreError> {
        let catalog = self.catalog.as_mut().ok_or(StoreError::Closed)?;
        Ok(queries::upsert_measurements(catalog.connection_mut(), measurements)?)
    }

    /// Inserts a particle batch for one threshold run, all-or-nothing.
    ///
    /// # Errors
    ///
    /// Returns a duplicate error when any row repeats a (cell, run, label)
    /// key.
    pub fn insert_particles(
        &mut self,
        threshold_run_id: i64,
        particles: &[NewParticle],
    ) -> Result<Vec<i64>, StoreError> {
        let catalog = self.catalog.as_mut().ok_or(StoreError::Closed)?;
        Ok(queries::insert_particles(
            catalog.connection_mut(),
            threshold_run_id,
            particles,
        )?)
    }

    /// Returns a field's cells, optionally limited to one segmentation run.
    ///
    /// # Errors
    ///
    /// Returns typed not-found errors for unknown names.
    pub fn cells(
        &self,
        at: &FovRef<'_>,
        run_id: Option<i64>,
    ) -> Result<Vec<Cell>, StoreError> {
        let resolved = self.resolve(at)?;
        Ok(queries::cells_for_fov(self.conn()?, resolved.fov.id, run_id)?)
    }

    /// Counts a field's cells across all runs.
    ///
    /// # Errors
    ///
    /// Returns typed not-found errors for unknown names.
    pub fn count_cells(&self, at: &FovRef<'_>) -> Result<i64, StoreError> {
        let resolved = self.resolve(at)?;
        Ok(queries::count_cells(self.conn()?, Some(resolved.fov.id))?)
    }

    /// Deletes a field's cells, measurements, particles, and tag links.
    ///
    /// Used before re-segmentation. Catalog rows only — the corresponding
    /// array planes are deliberately not touched; prune them explicitly
    /// when needed.
    ///
    /// # Errors
    ///
    /// Returns typed not-found errors for unknown names.
    pub fn clear_fov_analysis(&self, at: &FovRef<'_>) -> Result<usize, StoreError> {
        let resolved = self.resolve(at)?;
        Ok(queries::delete_cells_for_fov(self.conn()?, resolved.fov.id)?)
    }

    /// Deletes a field's label group. Deliberate, explicit pruning.
    ///
    /// # Errors
    ///
    /// Returns typed not-found errors for unknown names.
    pub fn prune_labels(&self, at: &FovRef<'_>) -> Result<(), StoreError> {
        let resolved = self.resolve(at)?;
        Ok(self.labels().prune_group(&resolved.group())?)
    }

    /// Deletes a field's mask group for one channel. Deliberate, explicit
    /// pruning.
    ///
    /// # Errors
    ///
    /// Returns typed not-found errors for unknown names.
    pub fn prune_mask(&self, at: &FovRef<'_>, channel: &str) -> Result<(), StoreError> {
        let resolved = self.resolve(at)?;
        let channel_rec = queries::channel_by_name(self.conn()?, channel)?;
        Ok(self.masks().prune_group(&resolved.mask_group(&channel_rec.name))?)
    }

    // ------------------------------------------------------------------
    // Tags and provenance
    // ------------------------------------------------------------------

    /// Registers a tag.
    ///
    /// # Errors
    ///
    /// Returns a duplicate error when the name is taken.
    pub fn add_tag(&self, name: &str) -> Result<Tag, StoreError> {
        Ok(queries::insert_tag(self.conn()?, name)?)
    }

    /// Applies a tag to a cell batch, all-or-nothing.
    ///
    /// # Errors
    ///
    /// Returns a not-found error for an unknown tag and a duplicate error
    /// when any cell already carries it.
    pub fn tag_cells(&mut self, tag: &str, cell_ids: &[i64]) -> Result<(), StoreError> {
        let tag = queries::tag_by_name(self.conn()?, tag)?;
        let catalog = self.catalog.as_mut().ok_or(StoreError::Closed)?;
        Ok(queries::tag_cells(catalog.connection_mut(), tag.id, cell_ids)?)
    }

    /// Returns the cells carrying any of the given tags; an empty list
    /// matches nothing.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Closed`] after `close`.
    pub fn cells_with_tags(&self, tags: &[&str]) -> Result<Vec<Cell>, StoreError> {
        Ok(queries::cells_with_tags(self.conn()?, tags)?)
    }

    /// Records a generic provenance entry for a downstream pipeline step.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Closed`] after `close`.
    pub fn add_analysis_run(&self, new: &NewAnalysisRun) -> Result<AnalysisRun, StoreError> {
        Ok(queries::insert_analysis_run(self.conn()?, new)?)
    }

    /// Returns every recorded analysis run, newest first.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Closed`] after `close`.
    pub fn analysis_runs(&self) -> Result<Vec<AnalysisRun>, StoreError> {
        Ok(queries::list_analysis_runs(self.conn()?)?)
    }

    /// Returns every segmentation run, newest first.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Closed`] after `close`.
    pub fn segmentation_runs(&self) -> Result<Vec<SegmentationRun>, StoreError> {
        Ok(queries::list_segmentation_runs(self.conn()?)?)
    }

    // ------------------------------------------------------------------
    // Derived views
    // ------------------------------------------------------------------

    /// Returns cells joined with their full lineage names, optionally
    /// limited to one field.
    ///
    /// # Errors
    ///
    /// Returns typed not-found errors for unknown names.
    pub fn cell_table(&self, at: Option<&FovRef<'_>>) -> Result<Vec<CellRow>, StoreError> {
        let fov_id = self.optional_fov_id(at)?;
        let rows = queries::cells_with_identity(self.conn()?, fov_id)?;
        Ok(rows.into_iter().map(CellRow::from).collect())
    }

    /// Returns long-format measurements joined with channel and cell
    /// identity, optionally limited to one field.
    ///
    /// # Errors
    ///
    /// Returns typed not-found errors for unknown names.
    pub fn measurement_table(
        &self,
        at: Option<&FovRef<'_>>,
    ) -> Result<Vec<MeasurementRow>, StoreError> {
        let fov_id = self.optional_fov_id(at)?;
        let rows = queries::measurements_with_context(self.conn()?, fov_id)?;
        Ok(rows.into_iter().map(MeasurementRow::from).collect())
    }

    /// Pivots long-format measurements into one column per (channel,
    /// metric, scope), one row per cell, optionally joined with identity
    /// and position columns.
    ///
    /// # Errors
    ///
    /// Returns typed not-found errors for unknown names.
    pub fn pivot_measurements(
        &self,
        at: Option<&FovRef<'_>>,
        include_identity: bool,
    ) -> Result<PivotTable, StoreError> {
        let cells = self.cell_table(at)?;
        let measurements = self.measurement_table(at)?;
        Ok(views::build_pivot(&cells, &measurements, include_identity))
    }

    /// Writes a pivot table as CSV into the experiment's export directory
    /// and returns the written path.
    ///
    /// # Errors
    ///
    /// Returns a name-validation error for unsafe file names and export
    /// errors otherwise.
    pub fn export_csv(
        &self,
        table: &PivotTable,
        file_name: &str,
    ) -> Result<PathBuf, StoreError> {
        validate_name(file_name, "export file name")?;
        let path = self.dir.join(EXPORTS_DIR).join(file_name);
        views::write_csv(table, &path)?;
        Ok(path)
    }

    // ------------------------------------------------------------------
    // Internal resolution
    // ------------------------------------------------------------------

    /// Returns the open catalog connection.
    fn conn(&self) -> Result<&rusqlite::Connection, StoreError> {
        Ok(self.catalog.as_ref().ok_or(StoreError::Closed)?.connection())
    }

    /// Opens the image store rooted in this experiment. Fresh per call.
    fn images(&self) -> PlaneStore {
        PlaneStore::new(self.dir.join(IMAGES_DIR))
    }

    /// Opens the label store rooted in this experiment. Fresh per call.
    fn labels(&self) -> PlaneStore {
        PlaneStore::new(self.dir.join(LABELS_DIR))
    }

    /// Opens the mask store rooted in this experiment. Fresh per call.
    fn masks(&self) -> PlaneStore {
        PlaneStore::new(self.dir.join(MASKS_DIR))
    }

    /// Resolves a replicate, auto-selecting only when unambiguous.
    fn resolve_bio_rep(
        &self,
        condition_name: &str,
        condition_id: i64,
        bio_rep: Option<&str>,
    ) -> Result<BiologicalReplicate, StoreError> {
        let conn = self.conn()?;
        if let Some(name) = bio_rep {
            return Ok(queries::bio_rep_by_name(conn, condition_id, name)?);
        }
        let mut replicates = queries::bio_reps_for_condition(conn, condition_id)?;
        match replicates.len() {
            1 => Ok(replicates.remove(0)),
            0 => Err(StoreError::Catalog(CatalogError::NotFound {
                entity: Entity::BiologicalReplicate,
                name: condition_name.to_owned(),
            })),
            count => Err(StoreError::AmbiguousReplicate {
                condition: condition_name.to_owned(),
                count,
            }),
        }
    }

    /// Resolves a full field-of-view address to catalog identity.
    fn resolve(&self, at: &FovRef<'_>) -> Result<ResolvedFov, StoreError> {
        let conn = self.conn()?;
        let condition = queries::condition_by_name(conn, at.condition)?;
        let bio_rep = self.resolve_bio_rep(&condition.name, condition.id, at.bio_rep)?;
        let timepoint = at
            .timepoint
            .map(|name| queries::timepoint_by_name(conn, name))
            .transpose()?;
        let fov = queries::fov_by_name(
            conn,
            bio_rep.id,
            timepoint.as_ref().map(|t| t.id),
            at.fov,
        )?;
        Ok(ResolvedFov {
            fov,
            bio_rep,
            timepoint,
        })
    }

    /// Resolves an optional address filter to a field-of-view id.
    fn optional_fov_id(&self, at: Option<&FovRef<'_>>) -> Result<Option<i64>, StoreError> {
        at.map(|at| self.resolve(at).map(|resolved| resolved.fov.id)).transpose()
    }
}

// ============================================================================
// SECTION: Helpers
// ============================================================================

/// Appends the reserved extension when the path lacks it.
fn experiment_dir(path: &Path) -> PathBuf {
    if path.extension().is_some_and(|ext| ext == EXPERIMENT_EXTENSION) {
        path.to_path_buf()
    } else {
        let mut os = path.as_os_str().to_owned();
        os.push(".");
        os.push(EXPERIMENT_EXTENSION);
        PathBuf::from(os)
    }
}

/// Rejects planes that disagree with the field's registered dimensions.
fn check_plane_dims(fov: &FieldOfView, plane: &Plane) -> Result<(), StoreError> {
    let height_ok = i64::try_from(plane.height()).is_ok_and(|h| h == fov.height_px);
    let width_ok = i64::try_from(plane.width()).is_ok_and(|w| w == fov.width_px);
    if !height_ok || !width_ok {
        return Err(StoreError::Invalid(format!(
            "plane is {}x{} but field of view '{}' is registered as {}x{}",
            plane.height(),
            plane.width(),
            fov.name,
            fov.height_px,
            fov.width_px
        )));
    }
    Ok(())
}

/// Converts a channel's display order into its array axis index.
fn channel_axis_index(channel: &Channel) -> Result<usize, StoreError> {
    usize::try_from(channel.display_order).map_err(|_| {
        StoreError::Invalid(format!(
            "channel '{}' has a negative display order",
            channel.name
        ))
    })
}

/// Builds per-channel NGFF display metadata in channel-axis order.
fn channel_displays(channels: &[Channel], dtype: Dtype) -> Vec<ChannelDisplay> {
    let (min, max) = dtype.intensity_range();
    channels
        .iter()
        .map(|channel| ChannelDisplay {
            label: channel.name.clone(),
            color: channel.display_color.clone().unwrap_or_else(|| "FFFFFF".to_owned()),
            window: IntensityWindow {
                start: min,
                end: max,
                min,
                max,
            },
        })
        .collect()
}

/// Relative path from a label group back to its source image group.
fn label_source_path(group: &str) -> String {
    let ups = group.split('/').count() + 1;
    format!("{}{IMAGES_DIR}/{group}", "../".repeat(ups))
}
