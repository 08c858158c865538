//! # Cobalt Core
//!
//! Foundational types for the image transfer enqueue pipeline.
//!
//! This crate holds everything the other layers agree on:
//!
//! 1. **Errors**: one error enum and the status codes handed to callers
//! 2. **Types**: device addresses, three-component extents, linear allocations
//! 3. **Images**: descriptors and their backing storage
//! 4. **Geometry**: the zero-copy / staged classification of a transfer
//! 5. **Traits**: the kernel provider, command stream receiver and allocator
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                        cobalt-core                          │
//! │  ┌─────────────┐  ┌─────────────┐  ┌─────────────────────┐  │
//! │  │  Geometry   │  │   Types     │  │  Collaborator       │  │
//! │  │ (classify,  │  │ (GpuAddr,   │  │  traits (CSR,       │  │
//! │  │  validate)  │  │  Dim3)      │  │  allocator, kernel) │  │
//! │  └─────────────┘  └─────────────┘  └─────────────────────┘  │
//! └─────────────────────────────────────────────────────────────┘
//! ```

#![no_std]
#![deny(unsafe_op_in_unsafe_fn)]
#![warn(missing_docs)]
#![warn(clippy::all)]

extern crate alloc;

#[cfg(test)]
extern crate std;

// =============================================================================
// MODULE EXPORTS
// =============================================================================

pub mod device;
pub mod error;
pub mod geometry;
pub mod image;
pub mod memory;
pub mod sync;
pub mod traits;
pub mod types;

// Re-exports for convenience
pub use device::{DeviceInfo, GpuGeneration};
pub use error::{ArgumentError, Error, Result, Status};
pub use geometry::{classify, validate_transfer, Classification, HostLayout, TransferDirection};
pub use image::{Image, ImageDescriptor, ImageType, SLICE_ROW_ALIGNMENT};
pub use memory::LinearAllocation;
pub use sync::{WaitResult, WaitTimeout};
pub use traits::{BackingAllocator, BatchBuffer, CommandStreamReceiver, KernelInfo, KernelProvider};
pub use types::{ByteSize, Dim3, GpuAddr};
