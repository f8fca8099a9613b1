// cytovault-zarr/src/plane.rs
// ============================================================================
// Module: Pixel Planes
// Description: Typed 2-D pixel planes with explicit dtypes.
// Purpose: Enforce rank-2 data at construction and encode chunk bytes.
// Dependencies: crate::error
// ============================================================================

//! ## Overview
//! A [`Plane`] is a single 2-D array of one supported dtype in row-major
//! order. Planes are rank-2 by construction; [`Plane::from_shape`] is the
//! rejection point for arbitrary N-D input — only 2-D planes indexed into a
//! (channel, y, x) group are supported. Chunk encoding is little-endian C
//! order, matching the stored dtype codes.

// ============================================================================
// SECTION: Imports
// ============================================================================

use crate::error::ZarrError;

// ============================================================================
// SECTION: Dtype
// ============================================================================

/// Supported element types, identified by their Zarr v2 dtype codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Dtype {
    /// Unsigned 8-bit (`|u1`), used for binary masks.
    U8,
    /// Unsigned 16-bit little-endian (`<u2`), the common camera depth.
    U16,
    /// Signed 32-bit little-endian (`<i4`), used for label planes.
    I32,
    /// 32-bit float little-endian (`<f4`).
    F32,
    /// 64-bit float little-endian (`<f8`).
    F64,
}

impl Dtype {
    /// Returns the Zarr v2 dtype code.
    #[must_use]
    pub const fn zarr_code(self) -> &'static str {
        match self {
            Self::U8 => "|u1",
            Self::U16 => "<u2",
            Self::I32 => "<i4",
            Self::F32 => "<f4",
            Self::F64 => "<f8",
        }
    }

    /// Parses a Zarr v2 dtype code.
    #[must_use]
    pub fn from_zarr_code(code: &str) -> Option<Self> {
        match code {
            "|u1" => Some(Self::U8),
            "<u2" => Some(Self::U16),
            "<i4" => Some(Self::I32),
            "<f4" => Some(Self::F32),
            "<f8" => Some(Self::F64),
            _ => None,
        }
    }

    /// Returns the element size in bytes.
    #[must_use]
    pub const fn size_bytes(self) -> usize {
        match self {
            Self::U8 => 1,
            Self::U16 => 2,
            Self::I32 | Self::F32 => 4,
            Self::F64 => 8,
        }
    }

    /// Returns the full intensity range of the dtype, used for display
    /// windows. Float data is windowed to the unit interval.
    #[must_use]
    pub const fn intensity_range(self) -> (f64, f64) {
        match self {
            Self::U8 => (0.0, 255.0),
            Self::U16 => (0.0, 65_535.0),
            Self::I32 => (0.0, 2_147_483_647.0),
            Self::F32 | Self::F64 => (0.0, 1.0),
        }
    }
}

// ============================================================================
// SECTION: Plane Data
// ============================================================================

/// Row-major element storage for one plane.
#[derive(Debug, Clone, PartialEq)]
pub enum PlaneData {
    /// Unsigned 8-bit elements.
    U8(Vec<u8>),
    /// Unsigned 16-bit elements.
    U16(Vec<u16>),
    /// Signed 32-bit elements.
    I32(Vec<i32>),
    /// 32-bit float elements.
    F32(Vec<f32>),
    /// 64-bit float elements.
    F64(Vec<f64>),
}

impl PlaneData {
    /// Returns the dtype of the stored elements.
    #[must_use]
    pub const fn dtype(&self) -> Dtype {
        match self {
            Self::U8(_) => Dtype::U8,
            Self::U16(_) => Dtype::U16,
            Self::I32(_) => Dtype::I32,
            Self::F32(_) => Dtype::F32,
            Self::F64(_) => Dtype::F64,
        }
    }

    /// Returns the element count.
    #[must_use]
    pub fn len(&self) -> usize {
        match self {
            Self::U8(values) => values.len(),
            Self::U16(values) => values.len(),
            Self::I32(values) => values.len(),
            Self::F32(values) => values.len(),
            Self::F64(values) => values.len(),
        }
    }

    /// Returns true when the plane holds no elements.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

// ============================================================================
// SECTION: Plane
// ============================================================================

/// One 2-D pixel plane in row-major order.
#[derive(Debug, Clone, PartialEq)]
pub struct Plane {
    /// Rows (the y axis).
    height: usize,
    /// Columns (the x axis).
    width: usize,
    /// Element storage; length is exactly `height * width`.
    data: PlaneData,
}

impl Plane {
    /// Creates a plane from explicit dimensions.
    ///
    /// # Errors
    ///
    /// Returns [`ZarrError::Invalid`] when the element count does not match
    /// `height * width`.
    pub fn new(height: usize, width: usize, data: PlaneData) -> Result<Self, ZarrError> {
        let expected = height.checked_mul(width).ok_or_else(|| {
            ZarrError::Invalid(format!("plane dimensions overflow: {height} x {width}"))
        })?;
        if data.len() != expected {
            return Err(ZarrError::Invalid(format!(
                "plane data holds {} elements, expected {expected} ({height} x {width})",
                data.len()
            )));
        }
        Ok(Self {
            height,
            width,
            data,
        })
    }

    /// Creates a plane from an explicit shape, rejecting any rank but 2.
    ///
    /// # Errors
    ///
    /// Returns [`ZarrError::Invalid`] for shapes that are not exactly
    /// `[height, width]` — arbitrary N-D arrays are deliberately
    /// unsupported.
    pub fn from_shape(shape: &[usize], data: PlaneData) -> Result<Self, ZarrError> {
        let [height, width] = shape else {
            return Err(ZarrError::Invalid(format!(
                "plane rank must be exactly 2, got rank {}",
                shape.len()
            )));
        };
        Self::new(*height, *width, data)
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

    /// Returns the element dtype.
    #[must_use]
    pub const fn dtype(&self) -> Dtype {
        self.data.dtype()
    }

    /// Returns the element storage.
    #[must_use]
    pub const fn data(&self) -> &PlaneData {
        &self.data
    }

    /// Encodes the plane as little-endian C-order chunk bytes.
    #[must_use]
    pub fn to_le_bytes(&self) -> Vec<u8> {
        match &self.data {
            PlaneData::U8(values) => values.clone(),
            PlaneData::U16(values) => {
                values.iter().flat_map(|v| v.to_le_bytes()).collect()
            }
            PlaneData::I32(values) => {
                values.iter().flat_map(|v| v.to_le_bytes()).collect()
            }
            PlaneData::F32(values) => {
                values.iter().flat_map(|v| v.to_le_bytes()).collect()
            }
            PlaneData::F64(values) => {
                values.iter().flat_map(|v| v.to_le_bytes()).collect()
            }
        }
    }

    /// Decodes little-endian C-order chunk bytes into a plane.
    ///
    /// # Errors
    ///
    /// Returns [`ZarrError::Invalid`] when the byte count does not match the
    /// dtype and dimensions.
    pub fn from_le_bytes(
        dtype: Dtype,
        height: usize,
        width: usize,
        bytes: &[u8],
    ) -> Result<Self, ZarrError> {
        let expected = height
            .checked_mul(width)
            .and_then(|elements| elements.checked_mul(dtype.size_bytes()))
            .ok_or_else(|| {
                ZarrError::Invalid(format!("plane dimensions overflow: {height} x {width}"))
            })?;
        if bytes.len() != expected {
            return Err(ZarrError::Invalid(format!(
                "chunk holds {} bytes, expected {expected}",
                bytes.len()
            )));
        }
        let data = match dtype {
            Dtype::U8 => PlaneData::U8(bytes.to_vec()),
            Dtype::U16 => PlaneData::U16(decode_elements(bytes, u16::from_le_bytes)),
            Dtype::I32 => PlaneData::I32(decode_elements(bytes, i32::from_le_bytes)),
            Dtype::F32 => PlaneData::F32(decode_elements(bytes, f32::from_le_bytes)),
            Dtype::F64 => PlaneData::F64(decode_elements(bytes, f64::from_le_bytes)),
        };
        Self::new(height, width, data)
    }

    /// Returns a plane of zeros, the fill value of unwritten chunks.
    #[must_use]
    pub fn zeros(dtype: Dtype, height: usize, width: usize) -> Self {
        let elements = height * width;
        let data = match dtype {
            Dtype::U8 => PlaneData::U8(vec![0; elements]),
            Dtype::U16 => PlaneData::U16(vec![0; elements]),
            Dtype::I32 => PlaneData::I32(vec![0; elements]),
            Dtype::F32 => PlaneData::F32(vec![0.0; elements]),
            Dtype::F64 => PlaneData::F64(vec![0.0; elements]),
        };
        Self {
            height,
            width,
            data,
        }
    }
}

// ============================================================================
// SECTION: Decoding Helpers
// ============================================================================

/// Decodes fixed-width little-endian elements.
fn decode_elements<T, const N: usize>(bytes: &[u8], decode: fn([u8; N]) -> T) -> Vec<T> {
    bytes
        .chunks_exact(N)
        .map(|chunk| {
            let mut buf = [0_u8; N];
            buf.copy_from_slice(chunk);
            decode(buf)
        })
        .collect()
}
