//! Heap-backed allocator for tests. Device addresses equal CPU addresses.
//!
//! Enabled for downstream crates by the `testing` feature.

use alloc::alloc::{alloc_zeroed, dealloc, Layout};
use core::ptr::NonNull;

use cobalt_core::{BackingAllocator, Error, GpuAddr, LinearAllocation, Result};
use spin::Mutex;

/// Alignment of every allocation, matching device pages
const PAGE: usize = 4096;

#[derive(Debug, Default)]
struct MockState {
    live: usize,
    allocations: usize,
    frees: usize,
    budget: Option<usize>,
}

/// Test allocator handing out zeroed, page-aligned heap memory
#[derive(Debug, Default)]
pub struct MockAllocator {
    state: Mutex<MockState>,
}

impl MockAllocator {
    /// Create an allocator with no budget
    pub fn new() -> Self {
        Self::default()
    }

    /// Allow `budget` more allocations before failing, `None` for no limit
    pub fn set_budget(&self, budget: Option<usize>) {
        self.state.lock().budget = budget;
    }

    /// Allocations not yet freed
    pub fn live(&self) -> usize {
        self.state.lock().live
    }

    /// Total frees
    pub fn frees(&self) -> usize {
        self.state.lock().frees
    }

    /// Total successful allocations
    pub fn allocations(&self) -> usize {
        self.state.lock().allocations
    }

    fn layout(size: u64) -> Result<Layout> {
        Layout::from_size_align((size as usize).max(1), PAGE).map_err(|_| Error::OutOfResources)
    }
}

impl BackingAllocator for MockAllocator {
    fn allocate_linear(&self, size: u64) -> Result<LinearAllocation> {
        let mut state = self.state.lock();
        match state.budget {
            Some(0) => return Err(Error::OutOfResources),
            Some(ref mut n) => *n -= 1,
            None => {}
        }

        let layout = Self::layout(size)?;
        // SAFETY: the layout has a non-zero size
        let ptr = NonNull::new(unsafe { alloc_zeroed(layout) }).ok_or(Error::OutOfResources)?;
        state.live += 1;
        state.allocations += 1;
        // SAFETY: the block stays allocated until `free`
        Ok(unsafe { LinearAllocation::from_raw_parts(GpuAddr::new(ptr.as_ptr() as u64), ptr, size) })
    }

    fn free(&self, allocation: LinearAllocation) {
        let mut state = self.state.lock();
        state.live -= 1;
        state.frees += 1;
        if let Ok(layout) = Self::layout(allocation.size()) {
            // SAFETY: allocated in allocate_linear with the same layout
            unsafe { dealloc(allocation.cpu_ptr().as_ptr(), layout) };
        }
    }
}
