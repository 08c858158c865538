//! # Cobalt Error Handling
//!
//! Error types for the transfer pipeline.
//!
//! Errors fall into three classes that map one-to-one onto the status codes
//! returned to API callers:
//! - argument errors, detected before any allocation or encoding
//! - resource exhaustion, with no partial command-stream mutation
//! - hardware wait failures on blocking enqueues

use core::fmt;

// =============================================================================
// RESULT TYPE
// =============================================================================

/// Cobalt Result type alias
pub type Result<T> = core::result::Result<T, Error>;

// =============================================================================
// ERROR ENUM
// =============================================================================

/// Cobalt unified error type
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[non_exhaustive]
pub enum Error {
    /// Malformed request, rejected before any state was touched
    InvalidArgument(ArgumentError),
    /// Staging allocation or command arena growth failed
    OutOfResources,
    /// A blocking wait did not observe the target task count in time
    HardwareTimeout,
    /// The receiver reported the device as lost during a wait
    DeviceLost,
}

impl Error {
    /// Map to the status code reported to API callers
    pub const fn status(&self) -> Status {
        match self {
            Self::InvalidArgument(ArgumentError::UnsupportedElementSize(_)) => {
                Status::InvalidImageFormat
            }
            Self::InvalidArgument(ArgumentError::UnsupportedImageType) => {
                Status::InvalidImageFormat
            }
            Self::InvalidArgument(_) => Status::InvalidValue,
            Self::OutOfResources => Status::OutOfResources,
            Self::HardwareTimeout | Self::DeviceLost => Status::HardwareTimeout,
        }
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidArgument(e) => write!(f, "invalid argument: {}", e),
            Self::OutOfResources => write!(f, "out of resources"),
            Self::HardwareTimeout => write!(f, "hardware wait timed out"),
            Self::DeviceLost => write!(f, "device lost"),
        }
    }
}

// =============================================================================
// SUB-ERROR TYPES
// =============================================================================

/// Argument validation failures
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArgumentError {
    /// Host pointer is null
    NullHostPointer,
    /// Origin + region exceeds the image extent on some axis
    RegionOutOfBounds,
    /// Origin or region uses an axis the image type does not have
    InvalidDimensions,
    /// Host row pitch is smaller than one region row
    InvalidRowPitch,
    /// Host slice pitch is smaller than one region slice
    InvalidSlicePitch,
    /// Image type has no copy kernel
    UnsupportedImageType,
    /// Element size has no byte-exact surface format
    UnsupportedElementSize(u32),
    /// Image descriptor is inconsistent (zero extent, short pitches)
    InvalidDescriptor,
    /// Array or volume slice pitch is not a whole, 4-aligned number of rows
    UnalignedSlicePitch,
    /// Image storage is smaller than the descriptor requires
    StorageTooSmall,
}

impl fmt::Display for ArgumentError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NullHostPointer => write!(f, "null host pointer"),
            Self::RegionOutOfBounds => write!(f, "region exceeds image extent"),
            Self::InvalidDimensions => write!(f, "origin/region invalid for image type"),
            Self::InvalidRowPitch => write!(f, "host row pitch too small"),
            Self::InvalidSlicePitch => write!(f, "host slice pitch too small"),
            Self::UnsupportedImageType => write!(f, "unsupported image type"),
            Self::UnsupportedElementSize(size) => {
                write!(f, "unsupported element size: {} bytes", size)
            }
            Self::InvalidDescriptor => write!(f, "invalid image descriptor"),
            Self::UnalignedSlicePitch => write!(f, "slice pitch not a multiple of 4 rows"),
            Self::StorageTooSmall => write!(f, "image storage too small"),
        }
    }
}

impl From<ArgumentError> for Error {
    fn from(e: ArgumentError) -> Self {
        Error::InvalidArgument(e)
    }
}

// =============================================================================
// STATUS CODES
// =============================================================================

/// Status code returned by the enqueue entry points
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(i32)]
pub enum Status {
    /// Operation succeeded
    Success            = 0,
    /// Out of device resources
    OutOfResources     = -5,
    /// Image format not supported by the copy path
    InvalidImageFormat = -10,
    /// Invalid argument value
    InvalidValue       = -30,
    /// Blocking wait failed
    HardwareTimeout    = -14,
}

impl Status {
    /// Collapse a result into its status code
    pub fn from_result<T>(result: &Result<T>) -> Self {
        match result {
            Ok(_) => Status::Success,
            Err(e) => e.status(),
        }
    }

    /// Check if this status reports success
    pub const fn is_success(self) -> bool {
        matches!(self, Status::Success)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_mapping() {
        assert_eq!(Error::OutOfResources.status(), Status::OutOfResources);
        assert_eq!(
            Error::from(ArgumentError::NullHostPointer).status(),
            Status::InvalidValue
        );
        assert_eq!(
            Error::from(ArgumentError::UnsupportedElementSize(3)).status(),
            Status::InvalidImageFormat
        );
        assert_eq!(Error::DeviceLost.status(), Status::HardwareTimeout);
    }

    #[test]
    fn test_status_from_result() {
        let ok: Result<u32> = Ok(1);
        let err: Result<u32> = Err(Error::HardwareTimeout);
        assert!(Status::from_result(&ok).is_success());
        assert_eq!(Status::from_result(&err), Status::HardwareTimeout);
    }
}
