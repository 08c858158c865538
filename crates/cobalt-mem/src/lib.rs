//! # Cobalt Memory Management
//!
//! Command arenas, deferred-free staging allocations and host copies.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                      Cobalt Memory System                       │
//! │                                                                 │
//! │  ┌──────────────────────────┐   ┌────────────────────────────┐  │
//! │  │        ArenaSet          │   │ StagingAllocationManager   │  │
//! │  │  command stream + DSH,   │──▶│  pending-free list keyed   │  │
//! │  │  IOH, IH, SSH (per queue)│   │  on retirement task count  │  │
//! │  └──────────────────────────┘   └─────────────┬──────────────┘  │
//! │                                               │                 │
//! │  ┌────────────────────────────────────────────▼──────────────┐  │
//! │  │                    BackingAllocator                       │  │
//! │  └───────────────────────────────────────────────────────────┘  │
//! └─────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Deferred Freeing
//!
//! Anything a submitted command buffer may still reference is released with
//! the task count of that submission and only returned to the allocator by
//! a reclamation sweep once the receiver reports that count as completed.
//! Retired arenas go through the same list.

#![no_std]
#![deny(unsafe_op_in_unsafe_fn)]
#![warn(missing_docs)]
#![warn(clippy::all)]

extern crate alloc;

#[cfg(test)]
extern crate std;

pub mod arena;
pub mod copy;
pub mod staging;

#[cfg(any(test, feature = "testing"))]
pub mod mock;

// Re-exports
pub use arena::{ArenaConfig, ArenaGrowth, ArenaMarks, ArenaRequirements, ArenaSet, HeapKind, LinearArena};
pub use copy::PitchedRegion;
pub use staging::{StagingAllocationManager, StagingStats, TemporaryAllocation};
