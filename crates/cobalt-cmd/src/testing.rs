//! Shared test fixtures.

pub(crate) use cobalt_mem::mock::MockAllocator;

use cobalt_core::KernelInfo;

/// SIMD32 copy kernel with a 16x4 work-group
pub(crate) fn copy_kernel() -> KernelInfo {
    KernelInfo {
        name: "copy_image_to_buffer",
        simd_width: 32,
        local_work_size: [16, 4, 1],
        cross_thread_data_size: 96,
        per_thread_data_size: 192,
        isa: alloc::vec![0x5A; 512],
    }
}
