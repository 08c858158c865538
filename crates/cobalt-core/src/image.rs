//! # Images
//!
//! Image descriptors and the storage that backs them.
//!
//! Axis conventions follow the compute API:
//!
//! ```text
//! type          extent (x, y, z)            y addressed by   z addressed by
//! ──────────────────────────────────────────────────────────────────────────
//! 1D            (width, 1, 1)               -                -
//! 1D buffer     (width, 1, 1)               -                -
//! 1D array      (width, array_size, 1)      slice pitch      -
//! 2D            (width, height, 1)          row pitch        -
//! 2D array      (width, height, array_size) row pitch        slice pitch
//! 3D            (width, height, depth)      row pitch        slice pitch
//! ```
//!
//! Multi-slice 2D arrays and 3D images are addressed by the hardware through
//! a slice pitch counted in groups of [`SLICE_ROW_ALIGNMENT`] rows. Native
//! slice pitches round the row count up to that, and explicit ones must
//! already be aligned.

use crate::error::{ArgumentError, Result};
use crate::memory::LinearAllocation;
use crate::types::{Dim3, GpuAddr};

/// Rows a hardware slice pitch is counted in
pub const SLICE_ROW_ALIGNMENT: usize = 4;

// =============================================================================
// IMAGE TYPE
// =============================================================================

/// Image dimensionality
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ImageType {
    /// One-dimensional image
    Image1D,
    /// One-dimensional image backed by a buffer
    Image1DBuffer,
    /// Array of one-dimensional images
    Image1DArray,
    /// Two-dimensional image
    Image2D,
    /// Array of two-dimensional images
    Image2DArray,
    /// Three-dimensional image
    Image3D,
}

impl ImageType {
    /// Check if this is an array type
    #[inline]
    pub const fn is_array(self) -> bool {
        matches!(self, Self::Image1DArray | Self::Image2DArray)
    }

    /// Number of addressable axes (array layers count as an axis)
    #[inline]
    pub const fn axes(self) -> usize {
        match self {
            Self::Image1D | Self::Image1DBuffer => 1,
            Self::Image1DArray | Self::Image2D => 2,
            Self::Image2DArray | Self::Image3D => 3,
        }
    }
}

// =============================================================================
// IMAGE DESCRIPTOR
// =============================================================================

/// Immutable description of an image's geometry
///
/// Pitches of 0 mean "native" and are resolved to the tightly packed value
/// by [`ImageDescriptor::resolve`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ImageDescriptor {
    /// Dimensionality
    pub image_type: ImageType,
    /// Width in pixels
    pub width: usize,
    /// Height in rows (1 for 1D types)
    pub height: usize,
    /// Depth in slices (1 for non-3D types)
    pub depth: usize,
    /// Number of array layers (1 for non-array types)
    pub array_size: usize,
    /// Bytes per pixel
    pub element_size: u32,
    /// Bytes between rows
    pub row_pitch: usize,
    /// Bytes between slices or array layers
    pub slice_pitch: usize,
}

impl ImageDescriptor {
    const fn base(image_type: ImageType, element_size: u32) -> Self {
        Self {
            image_type,
            width: 1,
            height: 1,
            depth: 1,
            array_size: 1,
            element_size,
            row_pitch: 0,
            slice_pitch: 0,
        }
    }

    /// 1D image
    pub const fn image_1d(width: usize, element_size: u32) -> Self {
        let mut desc = Self::base(ImageType::Image1D, element_size);
        desc.width = width;
        desc
    }

    /// 1D array image
    pub const fn image_1d_array(width: usize, array_size: usize, element_size: u32) -> Self {
        let mut desc = Self::base(ImageType::Image1DArray, element_size);
        desc.width = width;
        desc.array_size = array_size;
        desc
    }

    /// 2D image
    pub const fn image_2d(width: usize, height: usize, element_size: u32) -> Self {
        let mut desc = Self::base(ImageType::Image2D, element_size);
        desc.width = width;
        desc.height = height;
        desc
    }

    /// 2D array image
    pub const fn image_2d_array(
        width: usize,
        height: usize,
        array_size: usize,
        element_size: u32,
    ) -> Self {
        let mut desc = Self::base(ImageType::Image2DArray, element_size);
        desc.width = width;
        desc.height = height;
        desc.array_size = array_size;
        desc
    }

    /// 3D image
    pub const fn image_3d(width: usize, height: usize, depth: usize, element_size: u32) -> Self {
        let mut desc = Self::base(ImageType::Image3D, element_size);
        desc.width = width;
        desc.height = height;
        desc.depth = depth;
        desc
    }

    /// Override the row pitch
    pub const fn with_row_pitch(mut self, row_pitch: usize) -> Self {
        self.row_pitch = row_pitch;
        self
    }

    /// Override the slice pitch
    pub const fn with_slice_pitch(mut self, slice_pitch: usize) -> Self {
        self.slice_pitch = slice_pitch;
        self
    }

    /// Rows making up one slice (or array layer)
    pub const fn rows_per_slice(&self) -> usize {
        match self.image_type {
            ImageType::Image1DArray => 1,
            _ => self.height,
        }
    }

    /// Fill in native pitches and validate the geometry
    pub fn resolve(mut self) -> Result<Self> {
        if self.width == 0 || self.height == 0 || self.depth == 0 || self.array_size == 0 {
            return Err(ArgumentError::InvalidDescriptor.into());
        }
        if self.element_size == 0 {
            return Err(ArgumentError::InvalidDescriptor.into());
        }

        let min_row = self.width * self.element_size as usize;
        if self.row_pitch == 0 {
            self.row_pitch = min_row;
        } else if self.row_pitch < min_row {
            return Err(ArgumentError::InvalidDescriptor.into());
        }

        let min_slice = self.row_pitch * self.rows_per_slice();
        if self.slice_pitch == 0 {
            self.slice_pitch = if self.has_hw_slices() {
                self.row_pitch * self.rows_per_slice().next_multiple_of(SLICE_ROW_ALIGNMENT)
            } else {
                min_slice
            };
        } else if self.slice_pitch < min_slice {
            return Err(ArgumentError::InvalidDescriptor.into());
        }

        if self.has_hw_slices()
            && (self.slice_pitch % self.row_pitch != 0
                || self.slice_rows() % SLICE_ROW_ALIGNMENT != 0)
        {
            return Err(ArgumentError::UnalignedSlicePitch.into());
        }

        Ok(self)
    }

    /// Check if slices are addressed through a hardware slice pitch
    ///
    /// True for 2D arrays and 3D images with more than one slice.
    pub const fn has_hw_slices(&self) -> bool {
        match self.image_type {
            ImageType::Image2DArray => self.array_size > 1,
            ImageType::Image3D => self.depth > 1,
            _ => false,
        }
    }

    /// Slice pitch in whole rows
    pub const fn slice_rows(&self) -> usize {
        if self.row_pitch == 0 {
            0
        } else {
            self.slice_pitch / self.row_pitch
        }
    }

    /// Addressable extent in (x, y, z)
    pub const fn extent(&self) -> Dim3 {
        match self.image_type {
            ImageType::Image1D | ImageType::Image1DBuffer => Dim3::new(self.width, 1, 1),
            ImageType::Image1DArray => Dim3::new(self.width, self.array_size, 1),
            ImageType::Image2D => Dim3::new(self.width, self.height, 1),
            ImageType::Image2DArray => Dim3::new(self.width, self.height, self.array_size),
            ImageType::Image3D => Dim3::new(self.width, self.height, self.depth),
        }
    }

    /// Bytes between consecutive y coordinates
    pub const fn y_pitch(&self) -> usize {
        match self.image_type {
            ImageType::Image1DArray => self.slice_pitch,
            _ => self.row_pitch,
        }
    }

    /// Byte offset of `origin` under the native pitches
    pub const fn byte_offset(&self, origin: Dim3) -> usize {
        origin.x * self.element_size as usize
            + origin.y * self.y_pitch()
            + origin.z * self.slice_pitch
    }

    /// Total storage size in bytes
    pub const fn size_bytes(&self) -> u64 {
        match self.image_type {
            ImageType::Image1D | ImageType::Image1DBuffer | ImageType::Image2D => {
                (self.row_pitch * self.height) as u64
            }
            ImageType::Image1DArray | ImageType::Image2DArray => {
                (self.slice_pitch * self.array_size) as u64
            }
            ImageType::Image3D => (self.slice_pitch * self.depth) as u64,
        }
    }

    /// Check that rows and slices are packed without gaps
    pub const fn is_contiguous(&self) -> bool {
        self.row_pitch == self.width * self.element_size as usize
            && self.slice_pitch == self.row_pitch * self.rows_per_slice()
    }
}

// =============================================================================
// IMAGE
// =============================================================================

/// An image and its backing storage
#[derive(Debug)]
pub struct Image {
    desc: ImageDescriptor,
    storage: LinearAllocation,
}

impl Image {
    /// Bind a descriptor to its storage
    pub fn new(desc: ImageDescriptor, storage: LinearAllocation) -> Result<Self> {
        let desc = desc.resolve()?;
        if storage.size() < desc.size_bytes() {
            return Err(ArgumentError::StorageTooSmall.into());
        }
        Ok(Self { desc, storage })
    }

    /// Get the resolved descriptor
    #[inline]
    pub fn desc(&self) -> &ImageDescriptor {
        &self.desc
    }

    /// Device address of the image storage
    #[inline]
    pub fn gpu_addr(&self) -> GpuAddr {
        self.storage.gpu_addr()
    }

    /// CPU address of the image storage
    #[inline]
    pub fn cpu_addr(&self) -> usize {
        self.storage.cpu_addr()
    }

    /// Get the backing storage
    #[inline]
    pub fn storage(&self) -> &LinearAllocation {
        &self.storage
    }

    /// Get the backing storage mutably
    #[inline]
    pub fn storage_mut(&mut self) -> &mut LinearAllocation {
        &mut self.storage
    }

    /// Release the image, returning its storage
    pub fn into_storage(self) -> LinearAllocation {
        self.storage
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resolve_native_pitches() {
        let desc = ImageDescriptor::image_2d(16, 8, 4).resolve().unwrap();
        assert_eq!(desc.row_pitch, 64);
        assert_eq!(desc.slice_pitch, 512);
        assert_eq!(desc.size_bytes(), 512);
        assert!(desc.is_contiguous());
    }

    #[test]
    fn test_resolve_1d_array_slice_is_one_row() {
        let desc = ImageDescriptor::image_1d_array(32, 5, 4).resolve().unwrap();
        assert_eq!(desc.slice_pitch, 128);
        assert_eq!(desc.extent(), Dim3::new(32, 5, 1));
        assert_eq!(desc.byte_offset(Dim3::new(1, 2, 0)), 4 + 2 * 128);
        assert_eq!(desc.size_bytes(), 640);
    }

    #[test]
    fn test_padded_array_not_contiguous() {
        let desc = ImageDescriptor::image_2d_array(8, 4, 3, 4)
            .with_slice_pitch(8 * 4 * 4 + 256)
            .resolve()
            .unwrap();
        assert!(!desc.is_contiguous());
        assert_eq!(desc.extent(), Dim3::new(8, 4, 3));
    }

    #[test]
    fn test_array_slices_round_to_four_rows() {
        let desc = ImageDescriptor::image_2d_array(8, 6, 2, 4).resolve().unwrap();
        assert_eq!(desc.slice_pitch, 8 * 32);
        assert_eq!(desc.slice_rows(), 8);
        assert!(!desc.is_contiguous());

        // A single layer has no hardware slice pitch
        let desc = ImageDescriptor::image_2d_array(8, 6, 1, 4).resolve().unwrap();
        assert_eq!(desc.slice_pitch, 6 * 32);
        assert!(desc.is_contiguous());
    }

    #[test]
    fn test_resolve_rejects_unaligned_slice_pitch() {
        let six_rows = ImageDescriptor::image_2d_array(8, 4, 2, 4).with_slice_pitch(6 * 32);
        assert_eq!(six_rows.resolve(), Err(ArgumentError::UnalignedSlicePitch.into()));

        let partial_row = ImageDescriptor::image_3d(8, 4, 2, 4).with_slice_pitch(8 * 32 + 4);
        assert_eq!(partial_row.resolve(), Err(ArgumentError::UnalignedSlicePitch.into()));

        // 1D array layers are single rows at any pitch
        assert!(ImageDescriptor::image_1d_array(8, 3, 4).with_slice_pitch(36).resolve().is_ok());
    }

    #[test]
    fn test_resolve_rejects_short_pitch() {
        let err = ImageDescriptor::image_2d(16, 8, 4).with_row_pitch(32).resolve();
        assert_eq!(err, Err(ArgumentError::InvalidDescriptor.into()));
        let err = ImageDescriptor::image_2d(0, 8, 4).resolve();
        assert!(err.is_err());
    }
}
