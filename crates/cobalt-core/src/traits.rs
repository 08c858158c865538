//! # Collaborator Traits
//!
//! Interfaces to the parts of the driver the transfer pipeline consumes but
//! does not own.
//!
//! ```text
//! CommandQueue
//!    │
//!    ├── KernelProvider          (built-in copy kernels)
//!    │
//!    ├── CommandStreamReceiver   (submission, task counts, waits)
//!    │
//!    └── BackingAllocator        (linear allocations)
//! ```

use alloc::vec::Vec;

use crate::device::DeviceInfo;
use crate::error::Result;
use crate::geometry::TransferDirection;
use crate::image::ImageType;
use crate::memory::LinearAllocation;
use crate::sync::{WaitResult, WaitTimeout};
use crate::types::{Dim3, GpuAddr};

static_assertions::assert_impl_all!(GpuAddr: Send, Sync, Copy);
static_assertions::assert_impl_all!(Dim3: Send, Sync, Copy);
static_assertions::assert_impl_all!(LinearAllocation: Send, Sync);

// =============================================================================
// KERNEL PROVIDER
// =============================================================================

/// A compiled copy kernel
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KernelInfo {
    /// Kernel name, for logging
    pub name: &'static str,
    /// SIMD width the kernel was compiled for
    pub simd_width: u32,
    /// Work-group size per axis
    pub local_work_size: [u32; 3],
    /// Bytes of cross-thread (uniform) data
    pub cross_thread_data_size: u32,
    /// Bytes of per-thread data for one hardware thread
    pub per_thread_data_size: u32,
    /// Kernel ISA
    pub isa: Vec<u8>,
}

impl KernelInfo {
    /// Work items in one work-group
    #[inline]
    pub fn group_size(&self) -> u32 {
        self.local_work_size.iter().product()
    }

    /// Hardware threads per work-group
    #[inline]
    pub fn threads_per_group(&self) -> u32 {
        self.group_size().div_ceil(self.simd_width.max(1))
    }
}

/// Source of the built-in image copy kernels
pub trait KernelProvider: Send + Sync {
    /// Kernel copying between an image of `image_type` and a linear buffer
    fn copy_kernel(
        &self,
        direction: TransferDirection,
        image_type: ImageType,
    ) -> Option<&KernelInfo>;
}

// =============================================================================
// COMMAND STREAM RECEIVER
// =============================================================================

/// A span of encoded commands handed to the receiver
#[derive(Debug, Clone, Copy)]
pub struct BatchBuffer<'a> {
    /// Device address of the first command
    pub gpu_addr: GpuAddr,
    /// The encoded bytes
    pub commands: &'a [u8],
}

/// Consumer of encoded command buffers and authority on completion
pub trait CommandStreamReceiver: Send + Sync {
    /// Capability values for the device
    fn device_info(&self) -> DeviceInfo;

    /// Address the completion tag is written to
    fn tag_address(&self) -> GpuAddr;

    /// Task count assigned to the most recent submission
    fn latest_sent_task_count(&self) -> u32;

    /// Submit a batch and return the task count it completes with
    ///
    /// The tag write inside the batch must carry the returned value, so
    /// callers read `latest_sent_task_count() + 1` before encoding and hold
    /// the submission lock across encode and submit.
    fn submit(&self, batch: BatchBuffer<'_>) -> Result<u32>;

    /// Latest task count the hardware reported as complete
    fn completed_task_count(&self) -> u32;

    /// Block until `target` completes or the timeout expires
    fn wait_for_task_count(&self, target: u32, timeout: WaitTimeout) -> WaitResult;
}

// =============================================================================
// BACKING ALLOCATOR
// =============================================================================

/// Allocator of CPU-mapped device memory
pub trait BackingAllocator: Send + Sync {
    /// Allocate `size` bytes, failing with `Error::OutOfResources`
    fn allocate_linear(&self, size: u64) -> Result<LinearAllocation>;

    /// Return an allocation
    fn free(&self, allocation: LinearAllocation);
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloc::vec;

    #[test]
    fn test_threads_per_group_rounds_up() {
        let kernel = KernelInfo {
            name: "copy",
            simd_width: 32,
            local_work_size: [16, 4, 1],
            cross_thread_data_size: 64,
            per_thread_data_size: 96,
            isa: vec![0; 64],
        };
        assert_eq!(kernel.group_size(), 64);
        assert_eq!(kernel.threads_per_group(), 2);

        let kernel = KernelInfo { local_work_size: [5, 3, 1], ..kernel };
        assert_eq!(kernel.threads_per_group(), 1);
    }
}
