//! # Cobalt Queue
//!
//! Command queues, the logical clock and the image transfer enqueue path.
//!
//! ## Architecture
//!
//! ```text
//! ┌───────────────────────────────────────────────────────────────────┐
//! │                              Device                               │
//! │   CommandStreamReceiver   BackingAllocator   KernelProvider       │
//! │   CommandEncoder          staging (Mutex)    submission (Mutex)   │
//! │                                                                   │
//! │  ┌─────────────────────────┐     ┌─────────────────────────┐     │
//! │  │      CommandQueue       │     │      CommandQueue       │     │
//! │  │  TaskClock  ArenaSet    │     │  TaskClock  ArenaSet    │ ... │
//! │  │  EncoderState           │     │  EncoderState           │     │
//! │  └────────────┬────────────┘     └─────────────────────────┘     │
//! │               │ Event (task level, task count)                    │
//! └───────────────┼───────────────────────────────────────────────────┘
//!                 ▼
//!          wait lists of later enqueues
//! ```
//!
//! ## Ordering
//!
//! A staged transfer takes task level `max(queue, wait list) + 1`. No-op and
//! zero-copy transfers merge the wait list without creating a new ordering
//! point. Blocking transfers wait with no lock held.

#![no_std]
#![deny(unsafe_op_in_unsafe_fn)]
#![warn(missing_docs)]
#![warn(clippy::all)]

extern crate alloc;

#[cfg(test)]
extern crate std;

pub mod clock;
pub mod config;
pub mod device;
pub mod event;
pub mod queue;

#[cfg(test)]
mod testing;

// Re-exports
pub use clock::TaskClock;
pub use config::{QueueConfig, QueueOrdering};
pub use device::Device;
pub use event::{CommandType, Event};
pub use queue::{CommandQueue, TransferRequest};
