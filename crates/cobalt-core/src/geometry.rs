//! # Transfer Geometry
//!
//! Argument validation and the staging decision for image transfers.
//!
//! A transfer is classified purely from the image geometry and the host
//! pointer layout:
//!
//! ```text
//! region volume == 0                          ──▶ NoOp
//! host ptr aliases image storage at origin,
//!   host pitches 0 or native,
//!   contiguous where it matters               ──▶ ZeroCopy
//! anything else                               ──▶ Staged { x * y * z * elem }
//! ```
//!
//! The direction of the transfer never influences the result.

use crate::error::{ArgumentError, Result};
use crate::image::{ImageDescriptor, ImageType};
use crate::types::Dim3;

/// Element sizes with a byte-exact UINT surface format
pub const SUPPORTED_ELEMENT_SIZES: [u32; 5] = [1, 2, 4, 8, 16];

// =============================================================================
// DIRECTION & CLASSIFICATION
// =============================================================================

/// Transfer direction, seen from the host
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TransferDirection {
    /// Image to host
    Read,
    /// Host to image
    Write,
}

/// Outcome of the staging decision
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Classification {
    /// Empty region, nothing to do
    NoOp,
    /// Host memory already is the image storage
    ZeroCopy,
    /// Copy through a compacted staging buffer of `size` bytes
    Staged {
        /// Staging buffer size in bytes
        size: u64,
    },
}

impl Classification {
    /// Check if the transfer emits commands
    #[inline]
    pub const fn emits_commands(&self) -> bool {
        matches!(self, Self::Staged { .. })
    }
}

// =============================================================================
// HOST LAYOUT
// =============================================================================

/// Host pointer and the pitches the caller supplied
///
/// A pitch of 0 means "unspecified". For the staging copy it resolves to
/// the compacted layout of the region.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HostLayout {
    /// Host address of the region's first pixel
    pub ptr: usize,
    /// Bytes between host rows, or 0
    pub row_pitch: usize,
    /// Bytes between host slices (array layers for 1D arrays), or 0
    pub slice_pitch: usize,
}

impl HostLayout {
    /// Create a host layout
    pub const fn new(ptr: usize, row_pitch: usize, slice_pitch: usize) -> Self {
        Self {
            ptr,
            row_pitch,
            slice_pitch,
        }
    }

    /// Host layout with both pitches unspecified
    pub const fn packed(ptr: usize) -> Self {
        Self::new(ptr, 0, 0)
    }

    /// Row pitch with 0 resolved to one compacted region row
    pub const fn resolved_row_pitch(&self, desc: &ImageDescriptor, region: Dim3) -> usize {
        if self.row_pitch != 0 {
            self.row_pitch
        } else {
            region.x * desc.element_size as usize
        }
    }

    /// Slice pitch with 0 resolved to one compacted region slice
    pub const fn resolved_slice_pitch(&self, desc: &ImageDescriptor, region: Dim3) -> usize {
        if self.slice_pitch != 0 {
            self.slice_pitch
        } else {
            self.resolved_row_pitch(desc, region) * rows_per_host_slice(desc.image_type, region)
        }
    }

    /// Bytes between consecutive host y coordinates
    pub const fn y_pitch(&self, desc: &ImageDescriptor, region: Dim3) -> usize {
        match desc.image_type {
            ImageType::Image1DArray => self.resolved_slice_pitch(desc, region),
            _ => self.resolved_row_pitch(desc, region),
        }
    }
}

const fn rows_per_host_slice(image_type: ImageType, region: Dim3) -> usize {
    match image_type {
        ImageType::Image1DArray => 1,
        _ => region.y,
    }
}

// =============================================================================
// VALIDATION
// =============================================================================

/// Validate a transfer before any allocation or encoding
pub fn validate_transfer(
    desc: &ImageDescriptor,
    origin: Dim3,
    region: Dim3,
    host: &HostLayout,
) -> Result<()> {
    if host.ptr == 0 {
        return Err(ArgumentError::NullHostPointer.into());
    }
    if desc.image_type == ImageType::Image1DBuffer {
        return Err(ArgumentError::UnsupportedImageType.into());
    }
    if !SUPPORTED_ELEMENT_SIZES.contains(&desc.element_size) {
        return Err(ArgumentError::UnsupportedElementSize(desc.element_size).into());
    }

    // Axes the image type lacks take origin 0 and a region of at most 1
    let axes = desc.image_type.axes();
    if (axes < 2 && (origin.y != 0 || region.y > 1)) || (axes < 3 && (origin.z != 0 || region.z > 1))
    {
        return Err(ArgumentError::InvalidDimensions.into());
    }

    let extent = desc.extent();
    let in_bounds = |o: usize, r: usize, e: usize| o.checked_add(r).is_some_and(|end| end <= e);
    if !in_bounds(origin.x, region.x, extent.x)
        || !in_bounds(origin.y, region.y, extent.y)
        || !in_bounds(origin.z, region.z, extent.z)
    {
        return Err(ArgumentError::RegionOutOfBounds.into());
    }

    let min_row = region.x * desc.element_size as usize;
    if host.row_pitch != 0 && host.row_pitch < min_row {
        return Err(ArgumentError::InvalidRowPitch.into());
    }

    let min_slice = host.resolved_row_pitch(desc, region) * rows_per_host_slice(desc.image_type, region);
    if host.slice_pitch != 0 && host.slice_pitch < min_slice {
        return Err(ArgumentError::InvalidSlicePitch.into());
    }

    Ok(())
}

// =============================================================================
// CLASSIFICATION
// =============================================================================

/// Decide whether a validated transfer is a no-op, zero-copy or staged
///
/// `image_cpu_base` is the CPU address of the image's storage.
pub fn classify(
    desc: &ImageDescriptor,
    image_cpu_base: usize,
    origin: Dim3,
    region: Dim3,
    host: &HostLayout,
) -> Classification {
    if region.is_empty() {
        return Classification::NoOp;
    }

    let aliased = image_cpu_base.wrapping_add(desc.byte_offset(origin)) == host.ptr;
    let native_pitches = (host.row_pitch == 0 || host.row_pitch == desc.row_pitch)
        && (host.slice_pitch == 0 || host.slice_pitch == desc.slice_pitch);

    // Arrays, and whole-image requests with unspecified pitches, alias only
    // when no row or slice carries padding
    let whole_unpitched =
        region == desc.extent() && host.row_pitch == 0 && host.slice_pitch == 0;
    let needs_contiguous = desc.array_size > 1 || whole_unpitched;

    if aliased && native_pitches && (!needs_contiguous || desc.is_contiguous()) {
        return Classification::ZeroCopy;
    }

    Classification::Staged {
        size: region.volume() * desc.element_size as u64,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const BASE: usize = 0x10_0000;

    fn desc_2d() -> ImageDescriptor {
        ImageDescriptor::image_2d(16, 8, 4).resolve().unwrap()
    }

    #[test]
    fn test_empty_region_is_noop() {
        let desc = desc_2d();
        let host = HostLayout::packed(0x2000);
        let class = classify(&desc, BASE, Dim3::default(), Dim3::new(16, 0, 1), &host);
        assert_eq!(class, Classification::NoOp);
    }

    #[test]
    fn test_whole_image_aliasing_is_zero_copy() {
        let desc = desc_2d();
        let host = HostLayout::packed(BASE);
        let class = classify(&desc, BASE, Dim3::default(), Dim3::new(16, 8, 1), &host);
        assert_eq!(class, Classification::ZeroCopy);
    }

    #[test]
    fn test_sub_region_aliasing_at_origin() {
        let desc = desc_2d();
        let origin = Dim3::new(2, 3, 0);
        let host = HostLayout::new(BASE + 2 * 4 + 3 * 64, 64, 0);
        let class = classify(&desc, BASE, origin, Dim3::new(4, 2, 1), &host);
        assert_eq!(class, Classification::ZeroCopy);
    }

    #[test]
    fn test_direction_independent_staging_size() {
        let desc = desc_2d();
        let host = HostLayout::packed(0x9000);
        let class = classify(&desc, BASE, Dim3::default(), Dim3::new(5, 3, 1), &host);
        assert_eq!(class, Classification::Staged { size: 5 * 3 * 4 });
    }

    #[test]
    fn test_padded_array_whole_image_stages() {
        let desc = ImageDescriptor::image_2d_array(8, 4, 3, 4)
            .with_slice_pitch(8 * 4 * 4 + 128)
            .resolve()
            .unwrap();
        let host = HostLayout::packed(BASE);
        let class = classify(&desc, BASE, Dim3::default(), Dim3::new(8, 4, 3), &host);
        assert_eq!(class, Classification::Staged { size: 8 * 4 * 3 * 4 });
    }

    #[test]
    fn test_padded_2d_whole_image_stages() {
        let desc = ImageDescriptor::image_2d(16, 8, 4)
            .with_row_pitch(128)
            .resolve()
            .unwrap();
        let host = HostLayout::packed(BASE);
        let class = classify(&desc, BASE, Dim3::default(), Dim3::new(16, 8, 1), &host);
        assert!(matches!(class, Classification::Staged { .. }));

        // Explicit native pitches describe the padded layout exactly
        let host = HostLayout::new(BASE, 128, 0);
        let class = classify(&desc, BASE, Dim3::default(), Dim3::new(16, 8, 1), &host);
        assert_eq!(class, Classification::ZeroCopy);
    }

    #[test]
    fn test_mismatched_pitch_stages() {
        let desc = desc_2d();
        let host = HostLayout::new(BASE, 96, 0);
        let class = classify(&desc, BASE, Dim3::default(), Dim3::new(16, 8, 1), &host);
        assert!(class.emits_commands());
    }

    #[test]
    fn test_validate_rejects() {
        let desc = desc_2d();
        let full = Dim3::new(16, 8, 1);
        let v = |origin, region, host: HostLayout| validate_transfer(&desc, origin, region, &host);

        assert_eq!(
            v(Dim3::default(), full, HostLayout::packed(0)),
            Err(ArgumentError::NullHostPointer.into())
        );
        assert_eq!(
            v(Dim3::new(1, 0, 0), full, HostLayout::packed(0x1000)),
            Err(ArgumentError::RegionOutOfBounds.into())
        );
        assert_eq!(
            v(Dim3::default(), Dim3::new(16, 8, 2), HostLayout::packed(0x1000)),
            Err(ArgumentError::InvalidDimensions.into())
        );
        assert_eq!(
            v(Dim3::default(), full, HostLayout::new(0x1000, 32, 0)),
            Err(ArgumentError::InvalidRowPitch.into())
        );
        assert_eq!(
            v(Dim3::default(), full, HostLayout::new(0x1000, 64, 100)),
            Err(ArgumentError::InvalidSlicePitch.into())
        );
        assert!(v(Dim3::default(), full, HostLayout::new(0x1000, 80, 0)).is_ok());
    }

    #[test]
    fn test_validate_unsupported_format() {
        let desc = ImageDescriptor::image_2d(4, 4, 3).resolve().unwrap();
        let err = validate_transfer(&desc, Dim3::default(), Dim3::new(4, 4, 1), &HostLayout::packed(1));
        assert_eq!(err, Err(ArgumentError::UnsupportedElementSize(3).into()));

        let desc = ImageDescriptor {
            image_type: ImageType::Image1DBuffer,
            ..ImageDescriptor::image_1d(64, 4)
        }
        .resolve()
        .unwrap();
        let err = validate_transfer(&desc, Dim3::default(), Dim3::new(64, 1, 1), &HostLayout::packed(1));
        assert_eq!(err, Err(ArgumentError::UnsupportedImageType.into()));
    }

    #[test]
    fn test_1d_array_host_pitch_addresses_layers() {
        let desc = ImageDescriptor::image_1d_array(32, 4, 4).resolve().unwrap();
        let region = Dim3::new(8, 2, 1);
        let host = HostLayout::new(0x1000, 0, 64);
        assert_eq!(host.y_pitch(&desc, region), 64);
        assert!(validate_transfer(&desc, Dim3::new(0, 2, 0), region, &host).is_ok());
        assert_eq!(HostLayout::packed(0x1000).y_pitch(&desc, region), 32);
    }
}
