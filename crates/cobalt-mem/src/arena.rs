//! # Command Arenas
//!
//! Per-queue linear arenas: one for the command stream and one for each of
//! the four indirect heaps the hardware addresses through
//! STATE_BASE_ADDRESS.
//!
//! Arenas are bump allocated and never rewound. Space for a whole enqueue is
//! checked up front with [`ArenaSet::prepare`], which allocates a fresh
//! replacement for any arena that would overflow, and installed with
//! [`ArenaSet::commit`]. Nothing is written before `commit`, so a failed
//! growth leaves every high-water mark where it was.
//!
//! A replacement is as large as the arena it displaces, or as the request
//! if that is larger, so a queue's footprint stays flat however many
//! enqueues it has retired. The surface state heap only hands out offsets
//! below [`HeapKind::addressable_size`], since binding table pointers are
//! 16-bit offsets from its base.

use alloc::vec::Vec;

use cobalt_core::types::align_up;
use cobalt_core::{BackingAllocator, ByteSize, Error, GpuAddr, LinearAllocation, Result};

// =============================================================================
// HEAP KIND
// =============================================================================

/// Indirect heap addressed by a STATE_BASE_ADDRESS field
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HeapKind {
    /// Interface descriptors
    DynamicState,
    /// Cross-thread and per-thread kernel data
    IndirectObject,
    /// Kernel ISA
    Instruction,
    /// Surface states and binding tables
    SurfaceState,
}

impl HeapKind {
    /// All heaps, in storage order
    pub const ALL: [HeapKind; 4] = [
        HeapKind::DynamicState,
        HeapKind::IndirectObject,
        HeapKind::Instruction,
        HeapKind::SurfaceState,
    ];

    /// Index into per-heap arrays
    #[inline]
    pub const fn index(self) -> usize {
        match self {
            Self::DynamicState => 0,
            Self::IndirectObject => 1,
            Self::Instruction => 2,
            Self::SurfaceState => 3,
        }
    }

    /// Offsets usable from the heap base, whatever its capacity
    pub const fn addressable_size(self) -> u64 {
        match self {
            Self::SurfaceState => ByteSize::KIB_64.as_bytes(),
            _ => u64::MAX,
        }
    }

    /// Short name for logging
    pub const fn name(self) -> &'static str {
        match self {
            Self::DynamicState => "dsh",
            Self::IndirectObject => "ioh",
            Self::Instruction => "ih",
            Self::SurfaceState => "ssh",
        }
    }
}

// =============================================================================
// ARENA CONFIGURATION
// =============================================================================

/// Initial arena sizes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ArenaConfig {
    /// Command stream size
    pub command_stream: ByteSize,
    /// Initial size of each indirect heap, indexed by [`HeapKind::index`]
    pub heaps: [ByteSize; 4],
}

impl ArenaConfig {
    /// Uniform sizing for every arena
    pub const fn uniform(size: ByteSize) -> Self {
        Self {
            command_stream: size,
            heaps: [size; 4],
        }
    }

    /// Minimal arenas, forcing growth early
    pub const fn small() -> Self {
        Self::uniform(ByteSize::KIB_4)
    }
}

impl Default for ArenaConfig {
    fn default() -> Self {
        Self::uniform(ByteSize::KIB_64)
    }
}

// =============================================================================
// LINEAR ARENA
// =============================================================================

/// Bump allocator over one linear allocation
#[derive(Debug)]
pub struct LinearArena {
    allocation: LinearAllocation,
    used: u64,
    limit: u64,
}

impl LinearArena {
    /// Wrap an allocation as an empty arena
    pub fn new(allocation: LinearAllocation) -> Self {
        Self::with_limit(allocation, u64::MAX)
    }

    /// Wrap an allocation, handing out offsets below `limit` only
    pub fn with_limit(allocation: LinearAllocation, limit: u64) -> Self {
        Self {
            allocation,
            used: 0,
            limit,
        }
    }

    fn heap(allocation: LinearAllocation, kind: HeapKind) -> Self {
        Self::with_limit(allocation, kind.addressable_size())
    }

    /// Device address of offset 0
    #[inline]
    pub fn gpu_base(&self) -> GpuAddr {
        self.allocation.gpu_addr()
    }

    /// Total size
    #[inline]
    pub fn capacity(&self) -> u64 {
        self.allocation.size()
    }

    /// Bytes that can be handed out, capacity clamped to the limit
    #[inline]
    pub fn usable(&self) -> u64 {
        self.capacity().min(self.limit)
    }

    /// High-water mark
    #[inline]
    pub fn used(&self) -> u64 {
        self.used
    }

    /// High-water mark in whole pages, at least one
    pub fn pages_used(&self, page_size: u64) -> u64 {
        (align_up(self.used, page_size) / page_size).max(1)
    }

    /// Check if `size` bytes at `alignment` fit
    pub fn fits(&self, size: u64, alignment: u64) -> bool {
        align_up(self.used, alignment)
            .checked_add(size)
            .is_some_and(|end| end <= self.usable())
    }

    /// Reserve `size` bytes at `alignment`, returning the offset
    pub fn reserve(&mut self, size: u64, alignment: u64) -> Result<u64> {
        if !self.fits(size, alignment) {
            return Err(Error::OutOfResources);
        }
        let offset = align_up(self.used, alignment);
        self.used = offset + size;
        Ok(offset)
    }

    /// Reserve and fill in one step
    pub fn push(&mut self, bytes: &[u8], alignment: u64) -> Result<u64> {
        let offset = self.reserve(bytes.len() as u64, alignment)?;
        self.write(offset, bytes)?;
        Ok(offset)
    }

    /// Write bytes at a reserved offset
    pub fn write(&mut self, offset: u64, bytes: &[u8]) -> Result<()> {
        let start = offset as usize;
        let end = start + bytes.len();
        if end as u64 > self.used {
            return Err(Error::OutOfResources);
        }
        self.allocation.as_mut_slice()[start..end].copy_from_slice(bytes);
        Ok(())
    }

    /// Bytes written between two offsets
    pub fn bytes(&self, start: u64, end: u64) -> &[u8] {
        let end = end.min(self.used) as usize;
        let start = (start as usize).min(end);
        &self.allocation.as_slice()[start..end]
    }

    fn into_allocation(self) -> LinearAllocation {
        self.allocation
    }
}

// =============================================================================
// ARENA SET
// =============================================================================

/// Worst-case bytes one enqueue takes from each arena, alignment included
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ArenaRequirements {
    /// Command stream bytes
    pub commands: u64,
    /// Heap bytes, indexed by [`HeapKind::index`]
    pub heaps: [u64; 4],
}

/// High-water marks captured for rollback
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ArenaMarks {
    commands: u64,
    heaps: [u64; 4],
}

/// Replacement arenas allocated by [`ArenaSet::prepare`]
#[derive(Debug, Default)]
#[must_use = "unused growth leaks its allocations; commit or discard it"]
pub struct ArenaGrowth {
    commands: Option<LinearAllocation>,
    heaps: [Option<LinearAllocation>; 4],
}

impl ArenaGrowth {
    /// Check if nothing needs replacing
    pub fn is_empty(&self) -> bool {
        self.commands.is_none() && self.heaps.iter().all(Option::is_none)
    }

    /// Return every replacement to the allocator
    pub fn discard(self, allocator: &dyn BackingAllocator) {
        for allocation in self.into_allocations() {
            allocator.free(allocation);
        }
    }

    fn into_allocations(self) -> impl Iterator<Item = LinearAllocation> {
        self.commands.into_iter().chain(self.heaps.into_iter().flatten())
    }
}

/// Command stream plus the four indirect heaps of one queue
#[derive(Debug)]
pub struct ArenaSet {
    commands: LinearArena,
    heaps: [LinearArena; 4],
}

impl ArenaSet {
    /// Allocate every arena at its configured size
    pub fn new(allocator: &dyn BackingAllocator, config: &ArenaConfig) -> Result<Self> {
        let mut allocated: Vec<LinearAllocation> = Vec::with_capacity(5);
        let sizes = core::iter::once(config.command_stream).chain(config.heaps);
        for size in sizes {
            match allocator.allocate_linear(size.as_bytes()) {
                Ok(allocation) => allocated.push(allocation),
                Err(e) => {
                    for allocation in allocated {
                        allocator.free(allocation);
                    }
                    return Err(e);
                }
            }
        }

        let mut allocated = allocated.into_iter();
        let mut next = || allocated.next().ok_or(Error::OutOfResources);
        let commands = LinearArena::new(next()?);
        let [dsh, ioh, ih, ssh] = HeapKind::ALL;
        Ok(Self {
            commands,
            heaps: [
                LinearArena::heap(next()?, dsh),
                LinearArena::heap(next()?, ioh),
                LinearArena::heap(next()?, ih),
                LinearArena::heap(next()?, ssh),
            ],
        })
    }

    /// Command stream arena
    #[inline]
    pub fn commands(&self) -> &LinearArena {
        &self.commands
    }

    /// Command stream arena, mutably
    #[inline]
    pub fn commands_mut(&mut self) -> &mut LinearArena {
        &mut self.commands
    }

    /// Indirect heap
    #[inline]
    pub fn heap(&self, kind: HeapKind) -> &LinearArena {
        &self.heaps[kind.index()]
    }

    /// Indirect heap, mutably
    #[inline]
    pub fn heap_mut(&mut self, kind: HeapKind) -> &mut LinearArena {
        &mut self.heaps[kind.index()]
    }

    /// Allocate replacements for every arena that cannot take `req`
    ///
    /// On failure every replacement allocated so far is freed and the set
    /// is untouched.
    pub fn prepare(
        &self,
        allocator: &dyn BackingAllocator,
        req: &ArenaRequirements,
    ) -> Result<ArenaGrowth> {
        let mut growth = ArenaGrowth::default();
        match self.fill_growth(allocator, req, &mut growth) {
            Ok(()) => Ok(growth),
            Err(e) => {
                growth.discard(allocator);
                Err(e)
            }
        }
    }

    fn fill_growth(
        &self,
        allocator: &dyn BackingAllocator,
        req: &ArenaRequirements,
        growth: &mut ArenaGrowth,
    ) -> Result<()> {
        if !self.commands.fits(req.commands, 1) {
            growth.commands = Some(grow(allocator, &self.commands, req.commands, "commands")?);
        }
        for kind in HeapKind::ALL {
            let heap = self.heap(kind);
            let needed = req.heaps[kind.index()];
            if needed > kind.addressable_size() {
                log::warn!("{} request of {} bytes exceeds the addressable range", kind.name(), needed);
                return Err(Error::OutOfResources);
            }
            if !heap.fits(needed, 1) {
                growth.heaps[kind.index()] = Some(grow(allocator, heap, needed, kind.name())?);
            }
        }
        Ok(())
    }

    /// Install replacements, returning the allocations they displaced
    ///
    /// The displaced allocations may still be referenced by submitted work
    /// and must go through deferred freeing.
    pub fn commit(&mut self, growth: ArenaGrowth) -> Vec<LinearAllocation> {
        let mut retired = Vec::new();
        if let Some(allocation) = growth.commands {
            let old = core::mem::replace(&mut self.commands, LinearArena::new(allocation));
            retired.push(old.into_allocation());
        }
        for ((slot, replacement), kind) in self.heaps.iter_mut().zip(growth.heaps).zip(HeapKind::ALL) {
            if let Some(allocation) = replacement {
                let old = core::mem::replace(slot, LinearArena::heap(allocation, kind));
                retired.push(old.into_allocation());
            }
        }
        retired
    }

    /// Capture every high-water mark
    pub fn marks(&self) -> ArenaMarks {
        ArenaMarks {
            commands: self.commands.used,
            heaps: [
                self.heaps[0].used,
                self.heaps[1].used,
                self.heaps[2].used,
                self.heaps[3].used,
            ],
        }
    }

    /// Restore marks captured after the last commit
    pub fn rollback(&mut self, marks: ArenaMarks) {
        self.commands.used = marks.commands.min(self.commands.used);
        for (heap, used) in self.heaps.iter_mut().zip(marks.heaps) {
            heap.used = used.min(heap.used);
        }
    }

    /// Return every arena to the allocator
    ///
    /// Only valid once no submitted work references the arenas.
    pub fn release(self, allocator: &dyn BackingAllocator) {
        for allocation in self.into_allocations() {
            allocator.free(allocation);
        }
    }

    /// Give up every arena's allocation, command stream first
    pub fn into_allocations(self) -> Vec<LinearAllocation> {
        let mut allocations = Vec::with_capacity(1 + self.heaps.len());
        allocations.push(self.commands.into_allocation());
        allocations.extend(self.heaps.into_iter().map(LinearArena::into_allocation));
        allocations
    }
}

fn grow(
    allocator: &dyn BackingAllocator,
    arena: &LinearArena,
    needed: u64,
    name: &str,
) -> Result<LinearAllocation> {
    let size = align_up(arena.usable().max(needed), ByteSize::KIB_4.as_bytes());
    log::debug!("replacing {} arena: {} -> {} bytes", name, arena.capacity(), size);
    allocator.allocate_linear(size).inspect_err(|_| {
        log::warn!("{} arena growth to {} bytes failed", name, size);
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::MockAllocator;

    #[test]
    fn test_reserve_aligns_and_tracks_high_water() {
        let alloc = MockAllocator::new();
        let mut arena = LinearArena::new(alloc.allocate_linear(256).unwrap());
        assert_eq!(arena.reserve(10, 1).unwrap(), 0);
        assert_eq!(arena.reserve(32, 64).unwrap(), 64);
        assert_eq!(arena.used(), 96);
        assert_eq!(arena.pages_used(4096), 1);
        assert!(!arena.fits(200, 1));
        assert_eq!(arena.reserve(200, 1), Err(Error::OutOfResources));
        assert_eq!(arena.used(), 96);
        alloc.free(arena.into_allocation());
    }

    #[test]
    fn test_push_writes_bytes() {
        let alloc = MockAllocator::new();
        let mut arena = LinearArena::new(alloc.allocate_linear(128).unwrap());
        let offset = arena.push(&[1, 2, 3, 4], 16).unwrap();
        assert_eq!(arena.bytes(offset, offset + 4), &[1, 2, 3, 4]);
        assert_eq!(arena.write(120, &[0; 4]), Err(Error::OutOfResources));
        alloc.free(arena.into_allocation());
    }

    #[test]
    fn test_prepare_commit_grows_and_retires() {
        let alloc = MockAllocator::new();
        let mut set = ArenaSet::new(&alloc, &ArenaConfig::small()).unwrap();
        assert_eq!(alloc.live(), 5);

        let mut req = ArenaRequirements::default();
        req.heaps[HeapKind::Instruction.index()] = 10_000;
        let growth = set.prepare(&alloc, &req).unwrap();
        assert!(!growth.is_empty());
        assert_eq!(alloc.live(), 6);

        let retired = set.commit(growth);
        assert_eq!(retired.len(), 1);
        assert!(set.heap(HeapKind::Instruction).capacity() >= 10_000);
        for allocation in retired {
            alloc.free(allocation);
        }
        set.release(&alloc);
        assert_eq!(alloc.live(), 0);
    }

    #[test]
    fn test_replacements_keep_capacity_flat() {
        let alloc = MockAllocator::new();
        let mut set = ArenaSet::new(&alloc, &ArenaConfig::small()).unwrap();
        let mut req = ArenaRequirements::default();
        req.commands = 3000;
        req.heaps[HeapKind::Instruction.index()] = 3000;

        for _ in 0..200 {
            let growth = set.prepare(&alloc, &req).unwrap();
            for allocation in set.commit(growth) {
                alloc.free(allocation);
            }
            set.commands_mut().reserve(3000, 1).unwrap();
            set.heap_mut(HeapKind::Instruction).reserve(3000, 64).unwrap();
            assert_eq!(set.commands().capacity(), 4096);
            assert_eq!(set.heap(HeapKind::Instruction).capacity(), 4096);
        }
        assert_eq!(alloc.live(), 5);
        set.release(&alloc);
    }

    #[test]
    fn test_surface_heap_stays_addressable() {
        let alloc = MockAllocator::new();
        let config = ArenaConfig::uniform(ByteSize::from_kib(128));
        let mut set = ArenaSet::new(&alloc, &config).unwrap();
        let ssh = HeapKind::SurfaceState;
        assert_eq!(set.heap(ssh).usable(), 65536);
        assert_eq!(set.heap(HeapKind::DynamicState).usable(), 128 * 1024);

        set.heap_mut(ssh).reserve(65536 - 100, 1).unwrap();
        assert!(set.heap_mut(ssh).reserve(200, 1).is_err());

        let mut req = ArenaRequirements::default();
        req.heaps[ssh.index()] = 200;
        let growth = set.prepare(&alloc, &req).unwrap();
        for allocation in set.commit(growth) {
            alloc.free(allocation);
        }
        assert_eq!(set.heap(ssh).capacity(), 65536);
        assert_eq!(set.heap_mut(ssh).reserve(200, 64).unwrap(), 0);

        req.heaps[ssh.index()] = 70_000;
        assert_eq!(set.prepare(&alloc, &req).unwrap_err(), Error::OutOfResources);
        set.release(&alloc);
    }

    #[test]
    fn test_prepare_failure_leaves_set_untouched() {
        let alloc = MockAllocator::new();
        let set = ArenaSet::new(&alloc, &ArenaConfig::small()).unwrap();
        let marks = set.marks();

        let req = ArenaRequirements {
            commands: 8192,
            heaps: [8192; 4],
        };
        // First replacement succeeds, second fails
        alloc.set_budget(Some(1));
        assert_eq!(set.prepare(&alloc, &req).unwrap_err(), Error::OutOfResources);
        assert_eq!(set.marks(), marks);
        assert_eq!(alloc.live(), 5);
        assert_eq!(alloc.frees(), 1);

        alloc.set_budget(None);
        let growth = set.prepare(&alloc, &req).unwrap();
        growth.discard(&alloc);
        assert_eq!(alloc.live(), 5);
        set.release(&alloc);
    }

    #[test]
    fn test_new_frees_partial_set_on_failure() {
        let alloc = MockAllocator::new();
        alloc.set_budget(Some(3));
        assert!(ArenaSet::new(&alloc, &ArenaConfig::default()).is_err());
        assert_eq!(alloc.frees(), 3);
        assert_eq!(alloc.live(), 0);
    }

    #[test]
    fn test_rollback_restores_marks() {
        let alloc = MockAllocator::new();
        let mut set = ArenaSet::new(&alloc, &ArenaConfig::small()).unwrap();
        set.commands_mut().reserve(64, 1).unwrap();
        let marks = set.marks();
        set.commands_mut().reserve(128, 1).unwrap();
        set.heap_mut(HeapKind::SurfaceState).reserve(64, 64).unwrap();
        set.rollback(marks);
        assert_eq!(set.marks(), marks);
        assert_eq!(set.commands().used(), 64);
        set.release(&alloc);
    }
}
