//! # Linear Allocations
//!
//! A linear allocation is a device-visible range with a CPU mapping. It backs
//! images, staging buffers, command streams and indirect heaps.

use core::ptr::NonNull;

use crate::types::GpuAddr;

/// A CPU-mapped, device-visible linear allocation
#[derive(Debug)]
pub struct LinearAllocation {
    gpu_addr: GpuAddr,
    cpu_ptr: NonNull<u8>,
    size: u64,
}

impl LinearAllocation {
    /// Wrap an allocation handed out by a backing allocator
    ///
    /// # Safety
    /// `cpu_ptr` must be valid for reads and writes of `size` bytes for as
    /// long as the allocation is not returned to its allocator, and must not
    /// be aliased by another live `LinearAllocation`.
    pub unsafe fn from_raw_parts(gpu_addr: GpuAddr, cpu_ptr: NonNull<u8>, size: u64) -> Self {
        Self {
            gpu_addr,
            cpu_ptr,
            size,
        }
    }

    /// Device address of the first byte
    #[inline]
    pub fn gpu_addr(&self) -> GpuAddr {
        self.gpu_addr
    }

    /// CPU address of the first byte
    #[inline]
    pub fn cpu_ptr(&self) -> NonNull<u8> {
        self.cpu_ptr
    }

    /// CPU address as an integer, for aliasing comparisons
    #[inline]
    pub fn cpu_addr(&self) -> usize {
        self.cpu_ptr.as_ptr() as usize
    }

    /// Size in bytes
    #[inline]
    pub fn size(&self) -> u64 {
        self.size
    }

    /// View the allocation's bytes
    pub fn as_slice(&self) -> &[u8] {
        // SAFETY: from_raw_parts guarantees validity for `size` bytes
        unsafe { core::slice::from_raw_parts(self.cpu_ptr.as_ptr(), self.size as usize) }
    }

    /// Mutably view the allocation's bytes
    pub fn as_mut_slice(&mut self) -> &mut [u8] {
        // SAFETY: from_raw_parts guarantees validity and exclusivity
        unsafe { core::slice::from_raw_parts_mut(self.cpu_ptr.as_ptr(), self.size as usize) }
    }
}

// SAFETY: the mapping is exclusively owned by this value
unsafe impl Send for LinearAllocation {}
unsafe impl Sync for LinearAllocation {}
