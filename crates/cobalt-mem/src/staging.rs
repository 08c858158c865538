//! # Staging Allocations
//!
//! Temporary linear buffers for staged transfers, freed only after the
//! hardware has retired every command that references them.
//!
//! ## Lifecycle
//!
//! ```text
//! acquire ──▶ (filled / referenced by encoded commands)
//!    │                     │
//!    │ enqueue failed      │ submitted with task count N
//!    ▼                     ▼
//! abandon ──▶ free       release(N) ──▶ pending ──reclaim(completed >= N)──▶ free
//! ```
//!
//! The pending list is one arena keyed on retirement task count and is
//! swept as a whole; there is no per-allocation destructor.

use alloc::vec::Vec;

use cobalt_core::{BackingAllocator, GpuAddr, LinearAllocation, Result};

use crate::copy::{self, PitchedRegion};

// =============================================================================
// TEMPORARY ALLOCATION
// =============================================================================

/// A staging buffer owned by the staging manager
#[derive(Debug)]
pub struct TemporaryAllocation {
    allocation: LinearAllocation,
    retirement: u32,
    writeback: Option<PitchedRegion>,
}

impl TemporaryAllocation {
    fn new(allocation: LinearAllocation) -> Self {
        Self {
            allocation,
            retirement: 0,
            writeback: None,
        }
    }

    /// Device address of the buffer
    #[inline]
    pub fn gpu_addr(&self) -> GpuAddr {
        self.allocation.gpu_addr()
    }

    /// Size in bytes
    #[inline]
    pub fn size(&self) -> u64 {
        self.allocation.size()
    }

    /// Task count after which the buffer may be freed
    #[inline]
    pub fn retirement_task_count(&self) -> u32 {
        self.retirement
    }

    /// Buffer contents
    pub fn as_slice(&self) -> &[u8] {
        self.allocation.as_slice()
    }

    /// Buffer contents, mutably
    pub fn as_mut_slice(&mut self) -> &mut [u8] {
        self.allocation.as_mut_slice()
    }

    /// Fill the buffer from a pitched host region
    ///
    /// # Safety
    /// See [`copy::pack`].
    pub unsafe fn pack_from(&mut self, src: &PitchedRegion) {
        // SAFETY: forwarded to the caller
        unsafe { copy::pack(src, self.allocation.as_mut_slice()) };
    }

    /// Copy the buffer out to `dst` once the allocation retires
    ///
    /// # Safety
    /// `dst` must stay valid for writes, as in [`copy::unpack`], until the
    /// reclamation sweep that frees this allocation.
    pub unsafe fn set_writeback(&mut self, dst: PitchedRegion) {
        self.writeback = Some(dst);
    }

    /// Check if a host write-back is pending
    #[inline]
    pub fn has_writeback(&self) -> bool {
        self.writeback.is_some()
    }

    fn retire(self, allocator: &dyn BackingAllocator) {
        if let Some(dst) = &self.writeback {
            // SAFETY: set_writeback's contract keeps `dst` valid until now
            unsafe { copy::unpack(self.allocation.as_slice(), dst) };
        }
        allocator.free(self.allocation);
    }
}

// =============================================================================
// STATISTICS
// =============================================================================

/// Staging manager statistics
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StagingStats {
    /// Buffers acquired
    pub acquired: u64,
    /// Buffers released to the pending list
    pub released: u64,
    /// Buffers freed by reclamation sweeps
    pub reclaimed: u64,
    /// Buffers freed without ever being submitted
    pub abandoned: u64,
    /// Bytes waiting on the pending list
    pub pending_bytes: u64,
    /// Largest value `pending_bytes` reached
    pub peak_pending_bytes: u64,
}

// =============================================================================
// STAGING ALLOCATION MANAGER
// =============================================================================

/// Device-wide owner of staging and retired arena allocations
#[derive(Debug, Default)]
pub struct StagingAllocationManager {
    pending: Vec<TemporaryAllocation>,
    stats: StagingStats,
}

impl StagingAllocationManager {
    /// Create an empty manager
    pub fn new() -> Self {
        Self::default()
    }

    /// Allocate a staging buffer of exactly `size` bytes
    ///
    /// Allocator failures propagate unchanged and are not retried.
    pub fn acquire(
        &mut self,
        allocator: &dyn BackingAllocator,
        size: u64,
    ) -> Result<TemporaryAllocation> {
        let allocation = allocator.allocate_linear(size).inspect_err(|e| {
            log::warn!("staging allocation of {} bytes failed: {}", size, e);
        })?;
        self.stats.acquired += 1;

        #[cfg(feature = "debug-alloc")]
        log::trace!("staging acquire {} bytes at {}", size, allocation.gpu_addr());

        Ok(TemporaryAllocation::new(allocation))
    }

    /// Queue a buffer for freeing once `retirement` completes
    pub fn release(&mut self, mut allocation: TemporaryAllocation, retirement: u32) {
        allocation.retirement = retirement;
        self.stats.released += 1;
        self.stats.pending_bytes += allocation.size();
        self.stats.peak_pending_bytes = self.stats.peak_pending_bytes.max(self.stats.pending_bytes);

        #[cfg(feature = "debug-alloc")]
        log::trace!(
            "staging release {} at task count {}",
            allocation.gpu_addr(),
            retirement
        );

        self.pending.push(allocation);
    }

    /// Queue a displaced arena for freeing once `retirement` completes
    pub fn retire_arena(&mut self, allocation: LinearAllocation, retirement: u32) {
        self.release(TemporaryAllocation::new(allocation), retirement);
    }

    /// Free a buffer that no submitted command references
    pub fn abandon(&mut self, allocator: &dyn BackingAllocator, allocation: TemporaryAllocation) {
        self.stats.abandoned += 1;
        allocator.free(allocation.allocation);
    }

    /// Free every pending buffer whose retirement count has completed
    ///
    /// Pending host write-backs run before their buffer is freed. Returns
    /// the number of buffers freed.
    pub fn reclaim(&mut self, allocator: &dyn BackingAllocator, completed: u32) -> usize {
        if self.pending.is_empty() {
            return 0;
        }

        let (retired, pending): (Vec<_>, Vec<_>) = core::mem::take(&mut self.pending)
            .into_iter()
            .partition(|a| a.retirement <= completed);
        self.pending = pending;

        let count = retired.len();
        for allocation in retired {
            self.stats.pending_bytes -= allocation.size();
            allocation.retire(allocator);
        }
        self.stats.reclaimed += count as u64;

        if count > 0 {
            log::trace!(
                "reclaimed {} staging allocations at task count {}, {} pending",
                count,
                completed,
                self.pending.len()
            );
        }
        count
    }

    /// Pending allocations in release order
    pub fn pending(&self) -> impl Iterator<Item = &TemporaryAllocation> {
        self.pending.iter()
    }

    /// Number of pending allocations
    pub fn pending_count(&self) -> usize {
        self.pending.len()
    }

    /// Get statistics
    pub fn stats(&self) -> &StagingStats {
        &self.stats
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::MockAllocator;
    use cobalt_core::Error;
    use std::vec;

    #[test]
    fn test_acquire_exact_size() {
        let alloc = MockAllocator::new();
        let mut mgr = StagingAllocationManager::new();
        let temp = mgr.acquire(&alloc, 5 * 3 * 4).unwrap();
        assert_eq!(temp.size(), 60);
        mgr.abandon(&alloc, temp);
        assert_eq!(alloc.live(), 0);
        assert_eq!(mgr.stats().abandoned, 1);
    }

    #[test]
    fn test_acquire_failure_propagates() {
        let alloc = MockAllocator::new();
        alloc.set_budget(Some(0));
        let mut mgr = StagingAllocationManager::new();
        assert_eq!(mgr.acquire(&alloc, 64).unwrap_err(), Error::OutOfResources);
        assert_eq!(mgr.stats().acquired, 0);
    }

    #[test]
    fn test_release_never_frees() {
        let alloc = MockAllocator::new();
        let mut mgr = StagingAllocationManager::new();
        let temp = mgr.acquire(&alloc, 64).unwrap();
        mgr.release(temp, 3);
        assert_eq!(alloc.frees(), 0);
        assert_eq!(mgr.pending_count(), 1);
        assert_eq!(mgr.stats().pending_bytes, 64);
    }

    #[test]
    fn test_reclaim_by_retirement_count() {
        let alloc = MockAllocator::new();
        let mut mgr = StagingAllocationManager::new();
        for retirement in [1, 2, 3, 5] {
            let temp = mgr.acquire(&alloc, 16).unwrap();
            mgr.release(temp, retirement);
        }

        assert_eq!(mgr.reclaim(&alloc, 0), 0);
        assert_eq!(mgr.reclaim(&alloc, 2), 2);
        assert_eq!(alloc.live(), 2);
        let remaining: vec::Vec<u32> = mgr.pending().map(|a| a.retirement_task_count()).collect();
        assert_eq!(remaining, [3, 5]);

        assert_eq!(mgr.reclaim(&alloc, 5), 2);
        assert_eq!(alloc.live(), 0);
        assert_eq!(mgr.stats().reclaimed, 4);
        assert_eq!(mgr.stats().pending_bytes, 0);
        assert_eq!(mgr.stats().peak_pending_bytes, 64);
    }

    #[test]
    fn test_reclaim_runs_writeback() {
        let alloc = MockAllocator::new();
        let mut mgr = StagingAllocationManager::new();
        let mut host = vec![0u8; 8];
        let dst = PitchedRegion {
            ptr: host.as_mut_ptr() as usize,
            row_bytes: 2,
            rows: 2,
            slices: 1,
            row_pitch: 4,
            slice_pitch: 8,
        };

        let mut temp = mgr.acquire(&alloc, 4).unwrap();
        temp.as_mut_slice().copy_from_slice(&[1, 2, 3, 4]);
        unsafe { temp.set_writeback(dst) };
        assert!(temp.has_writeback());
        mgr.release(temp, 7);

        mgr.reclaim(&alloc, 6);
        assert_eq!(host, [0; 8]);
        mgr.reclaim(&alloc, 7);
        assert_eq!(host, [1, 2, 0, 0, 3, 4, 0, 0]);
    }

    #[test]
    fn test_retired_arena_waits_for_completion() {
        let alloc = MockAllocator::new();
        let mut mgr = StagingAllocationManager::new();
        let arena = alloc.allocate_linear(4096).unwrap();
        mgr.retire_arena(arena, 9);
        assert_eq!(mgr.reclaim(&alloc, 8), 0);
        assert_eq!(mgr.reclaim(&alloc, 9), 1);
        assert_eq!(alloc.allocations(), alloc.frees());
    }
}
