// cytovault-zarr/src/store.rs
// ============================================================================
// Module: Plane Store
// Description: Zarr-v2 directory store for (channel, y, x) plane groups.
// Purpose: Create, resize, write, and read chunked pixel-plane arrays.
// Dependencies: crate::{codec, error, meta, plane}
// ============================================================================

//! ## Overview
//! A [`PlaneStore`] roots one of the three array hierarchies (images,
//! labels, masks). Group paths are pure functions of catalog identity
//! strings; the store performs no name resolution of its own. Arrays hold
//! one chunk per channel plane so a write or read touches exactly one chunk
//! file, which is also the natural interruption granularity of the engine.
//! File handles are opened fresh per operation; the store keeps no state
//! beyond its root path.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::fs;
use std::path::Path;
use std::path::PathBuf;

use crate::codec;
use crate::codec::MASK_COMPRESSION_LEVEL;
use crate::codec::PLANE_COMPRESSION_LEVEL;
use crate::error::ZarrError;
use crate::meta::ArrayMeta;
use crate::meta::ChannelDisplay;
use crate::meta::GroupMeta;
use crate::meta::ImageLabel;
use crate::meta::LabelSource;
use crate::meta::LEVEL_ZERO;
use crate::meta::NGFF_VERSION;
use crate::meta::NgffAttrs;
use crate::meta::Omero;
use crate::meta::OmeroChannel;
use crate::meta::single_level_multiscale;
use crate::plane::Dtype;
use crate::plane::Plane;

// ============================================================================
// SECTION: Path Derivation
// ============================================================================

/// Derives the group path shared by images and labels:
/// `{bioRep}/{timepoint?}/{fov}`.
#[must_use]
pub fn group_path(bio_rep: &str, timepoint: Option<&str>, fov: &str) -> String {
    match timepoint {
        Some(timepoint) => format!("{bio_rep}/{timepoint}/{fov}"),
        None => format!("{bio_rep}/{fov}"),
    }
}

/// Derives a mask group path, appending the per-channel threshold
/// sub-group to the shared derivation.
#[must_use]
pub fn mask_group_path(
    bio_rep: &str,
    timepoint: Option<&str>,
    fov: &str,
    channel: &str,
) -> String {
    format!("{}/threshold_{channel}", group_path(bio_rep, timepoint, fov))
}

// ============================================================================
// SECTION: Plane Store
// ============================================================================

/// One Zarr-v2 directory hierarchy of plane groups.
pub struct PlaneStore {
    /// Root directory of the hierarchy.
    root: PathBuf,
}

impl PlaneStore {
    /// Creates a handle rooted at a directory. No I/O happens here.
    #[must_use]
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
        }
    }

    /// Returns the store's root directory.
    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Creates the root directory and its group marker.
    ///
    /// # Errors
    ///
    /// Returns [`ZarrError::Io`] when the directory cannot be created.
    pub fn init(&self) -> Result<(), ZarrError> {
        fs::create_dir_all(&self.root)?;
        write_group_marker(&self.root)
    }

    /// Writes one channel plane into a multi-channel image group.
    ///
    /// The group is created on first use sized to `num_channels`; a write
    /// targeting an index beyond current capacity resizes the channel axis
    /// in place, preserving previously written channels. NGFF metadata
    /// (axes, omero display, pixel-size scale) is rewritten on every call.
    ///
    /// # Errors
    ///
    /// Returns [`ZarrError::Invalid`] when the plane's dtype or dimensions
    /// disagree with the existing array.
    pub fn write_image_channel(
        &self,
        group: &str,
        channel_index: usize,
        num_channels: usize,
        plane: &Plane,
        channels: &[ChannelDisplay],
        pixel_size_um: Option<f64>,
    ) -> Result<(), ZarrError> {
        let meta = self.prepare_array(
            group,
            channel_index,
            num_channels.max(channel_index + 1),
            plane,
            PLANE_COMPRESSION_LEVEL,
        )?;
        self.write_chunk(group, channel_index, plane, &meta)?;
        let omero_channels = channels
            .iter()
            .map(|channel| OmeroChannel {
                label: channel.label.clone(),
                color: channel.color.clone(),
                window: channel.window,
                active: true,
            })
            .collect();
        let attrs = NgffAttrs {
            multiscales: vec![single_level_multiscale(
                group_leaf(group),
                pixel_size_um.unwrap_or(1.0),
            )],
            omero: Some(Omero {
                channels: omero_channels,
            }),
            image_label: None,
        };
        self.write_attrs(group, &attrs)
    }

    /// Overwrites the label plane of a group, recording a back-reference to
    /// the source image group's relative path.
    ///
    /// # Errors
    ///
    /// Returns [`ZarrError::Invalid`] for non-integer planes or dimension
    /// mismatches.
    pub fn write_labels(
        &self,
        group: &str,
        plane: &Plane,
        source_image: &str,
        pixel_size_um: Option<f64>,
    ) -> Result<(), ZarrError> {
        if matches!(plane.dtype(), Dtype::F32 | Dtype::F64) {
            return Err(ZarrError::Invalid(
                "label planes must use an integer dtype".to_owned(),
            ));
        }
        let meta = self.prepare_array(group, 0, 1, plane, PLANE_COMPRESSION_LEVEL)?;
        self.write_chunk(group, 0, plane, &meta)?;
        let attrs = NgffAttrs {
            multiscales: vec![single_level_multiscale(
                group_leaf(group),
                pixel_size_um.unwrap_or(1.0),
            )],
            omero: None,
            image_label: Some(ImageLabel {
                version: NGFF_VERSION.to_owned(),
                source: LabelSource {
                    image: source_image.to_owned(),
                },
            }),
        };
        self.write_attrs(group, &attrs)
    }

    /// Overwrites the binary mask plane of a group.
    ///
    /// Masks are 0/255 `u8` planes stored under the high-compression codec.
    ///
    /// # Errors
    ///
    /// Returns [`ZarrError::Invalid`] for non-`u8` planes or dimension
    /// mismatches.
    pub fn write_mask(
        &self,
        group: &str,
        plane: &Plane,
        pixel_size_um: Option<f64>,
    ) -> Result<(), ZarrError> {
        if plane.dtype() != Dtype::U8 {
            return Err(ZarrError::Invalid("mask planes must use the u8 dtype".to_owned()));
        }
        let meta = self.prepare_array(group, 0, 1, plane, MASK_COMPRESSION_LEVEL)?;
        self.write_chunk(group, 0, plane, &meta)?;
        let attrs = NgffAttrs {
            multiscales: vec![single_level_multiscale(
                group_leaf(group),
                pixel_size_um.unwrap_or(1.0),
            )],
            omero: None,
            image_label: None,
        };
        self.write_attrs(group, &attrs)
    }

    /// Reads one channel plane fully materialized.
    ///
    /// An allocated-but-unwritten channel reads back as the fill value,
    /// a plane of zeros.
    ///
    /// # Errors
    ///
    /// Returns [`ZarrError::Invalid`] when the channel index is out of
    /// range and I/O errors when the group does not exist.
    pub fn read_plane(&self, group: &str, channel_index: usize) -> Result<Plane, ZarrError> {
        self.open_plane(group, channel_index)?.materialize()
    }

    /// Opens a lazily evaluated view of one channel plane.
    ///
    /// The view captures metadata only; chunk bytes are decoded on
    /// [`PlaneView::materialize`], for out-of-core consumption of large
    /// planes.
    ///
    /// # Errors
    ///
    /// Returns [`ZarrError::Invalid`] when the channel index is out of
    /// range and I/O errors when the group does not exist.
    pub fn open_plane(&self, group: &str, channel_index: usize) -> Result<PlaneView, ZarrError> {
        let meta = self.read_array_meta(group)?;
        let (num_channels, height, width) = plane_shape(&meta)?;
        if channel_index >= num_channels {
            return Err(ZarrError::Invalid(format!(
                "channel index {channel_index} out of range for {num_channels}-channel group \
                 '{group}'"
            )));
        }
        let dtype = Dtype::from_zarr_code(&meta.dtype).ok_or_else(|| {
            ZarrError::Invalid(format!("unsupported stored dtype '{}'", meta.dtype))
        })?;
        Ok(PlaneView {
            chunk_path: self.chunk_path(group, channel_index),
            dtype,
            height,
            width,
        })
    }

    /// Returns true when the group has an array.
    #[must_use]
    pub fn group_exists(&self, group: &str) -> bool {
        self.root.join(group).join(LEVEL_ZERO).join(".zarray").is_file()
    }

    /// Deletes a group and everything beneath it.
    ///
    /// Groups are never deleted automatically; this is the explicit,
    /// deliberate pruning operation. Pruning an absent group is a no-op.
    ///
    /// # Errors
    ///
    /// Returns [`ZarrError::Io`] when the removal fails.
    pub fn prune_group(&self, group: &str) -> Result<(), ZarrError> {
        let dir = self.root.join(group);
        if dir.is_dir() {
            fs::remove_dir_all(&dir)?;
        }
        Ok(())
    }

    // ------------------------------------------------------------------
    // Internal plumbing
    // ------------------------------------------------------------------

    /// Creates or resizes the group's array so the indexed channel fits,
    /// verifying dtype and plane dimensions against existing metadata.
    fn prepare_array(
        &self,
        group: &str,
        channel_index: usize,
        num_channels: usize,
        plane: &Plane,
        compression_level: u32,
    ) -> Result<ArrayMeta, ZarrError> {
        let array_dir = self.root.join(group).join(LEVEL_ZERO);
        let meta_path = array_dir.join(".zarray");
        if meta_path.is_file() {
            let mut meta: ArrayMeta = serde_json::from_slice(&fs::read(&meta_path)?)?;
            let (existing_channels, height, width) = plane_shape(&meta)?;
            if meta.dtype != plane.dtype().zarr_code() {
                return Err(ZarrError::Invalid(format!(
                    "plane dtype {} does not match stored dtype {} in group '{group}'",
                    plane.dtype().zarr_code(),
                    meta.dtype
                )));
            }
            if height != plane.height() || width != plane.width() {
                return Err(ZarrError::Invalid(format!(
                    "plane is {}x{} but group '{group}' stores {height}x{width}",
                    plane.height(),
                    plane.width()
                )));
            }
            if channel_index >= existing_channels {
                // Resize the channel axis in place; chunks are per-channel
                // so previously written planes are untouched.
                meta.shape[0] = channel_index + 1;
                fs::write(&meta_path, serde_json::to_vec_pretty(&meta)?)?;
            }
            return Ok(meta);
        }
        self.ensure_group_chain(group)?;
        fs::create_dir_all(&array_dir)?;
        let meta = ArrayMeta::plane_array(
            num_channels,
            plane.height(),
            plane.width(),
            plane.dtype().zarr_code(),
            compression_level,
        );
        fs::write(&meta_path, serde_json::to_vec_pretty(&meta)?)?;
        Ok(meta)
    }

    /// Compresses and writes one channel chunk.
    fn write_chunk(
        &self,
        group: &str,
        channel_index: usize,
        plane: &Plane,
        meta: &ArrayMeta,
    ) -> Result<(), ZarrError> {
        let level = meta
            .compressor
            .as_ref()
            .map_or(PLANE_COMPRESSION_LEVEL, |compressor| compressor.level);
        let compressed = codec::compress(&plane.to_le_bytes(), level)?;
        fs::write(self.chunk_path(group, channel_index), compressed)?;
        Ok(())
    }

    /// Returns the chunk file path for one channel plane.
    fn chunk_path(&self, group: &str, channel_index: usize) -> PathBuf {
        self.root.join(group).join(LEVEL_ZERO).join(format!("{channel_index}.0.0"))
    }

    /// Reads the group's array metadata.
    fn read_array_meta(&self, group: &str) -> Result<ArrayMeta, ZarrError> {
        let meta_path = self.root.join(group).join(LEVEL_ZERO).join(".zarray");
        Ok(serde_json::from_slice(&fs::read(meta_path)?)?)
    }

    /// Writes the group's `.zattrs` document.
    fn write_attrs(&self, group: &str, attrs: &NgffAttrs) -> Result<(), ZarrError> {
        let attrs_path = self.root.join(group).join(".zattrs");
        fs::write(attrs_path, serde_json::to_vec_pretty(attrs)?)?;
        Ok(())
    }

    /// Creates every group directory along a path, each with its marker.
    fn ensure_group_chain(&self, group: &str) -> Result<(), ZarrError> {
        let mut dir = self.root.clone();
        for component in group.split('/') {
            dir = dir.join(component);
            fs::create_dir_all(&dir)?;
            write_group_marker(&dir)?;
        }
        Ok(())
    }
}

// ============================================================================
// SECTION: Plane View
// ============================================================================

/// A lazily evaluated view of one stored channel plane.
pub struct PlaneView {
    /// Chunk file backing the plane; may not exist yet.
    chunk_path: PathBuf,
    /// Element dtype.
    dtype: Dtype,
    /// Rows.
    height: usize,
    /// Columns.
    width: usize,
}

impl PlaneView {
    /// Returns the element dtype.
    #[must_use]
    pub const fn dtype(&self) -> Dtype {
        self.dtype
    }

    /// Returns the number of rows.
    #[must_use]
    pub const fn height(&self) -> usize {
        self.height
    }

    /// Returns the number of columns.
    #[must_use]
    pub const fn width(&self) -> usize {
        self.width
    }

    /// Decodes the plane. An unwritten chunk materializes as the fill
    /// value, a plane of zeros.
    ///
    /// # Errors
    ///
    /// Returns [`ZarrError`] when the chunk cannot be read or decoded.
    pub fn materialize(&self) -> Result<Plane, ZarrError> {
        if !self.chunk_path.is_file() {
            return Ok(Plane::zeros(self.dtype, self.height, self.width));
        }
        let compressed = fs::read(&self.chunk_path)?;
        let bytes = codec::decompress(&compressed)?;
        Plane::from_le_bytes(self.dtype, self.height, self.width, &bytes)
    }
}

// ============================================================================
// SECTION: Helpers
// ============================================================================

/// Writes a `.zgroup` marker when absent.
fn write_group_marker(dir: &Path) -> Result<(), ZarrError> {
    let marker = dir.join(".zgroup");
    if !marker.is_file() {
        fs::write(marker, serde_json::to_vec_pretty(&GroupMeta::default())?)?;
    }
    Ok(())
}

/// Destructures a `[channels, height, width]` shape.
fn plane_shape(meta: &ArrayMeta) -> Result<(usize, usize, usize), ZarrError> {
    let [channels, height, width] = meta.shape[..] else {
        return Err(ZarrError::Invalid(format!(
            "stored array rank must be 3, got shape {:?}",
            meta.shape
        )));
    };
    Ok((channels, height, width))
}

/// Returns the last component of a group path, the display name.
fn group_leaf(group: &str) -> &str {
    group.rsplit('/').next().unwrap_or(group)
}
