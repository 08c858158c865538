//! Queue configuration.

use cobalt_core::{ByteSize, WaitTimeout};
use cobalt_mem::ArenaConfig;

/// Execution ordering of a queue
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum QueueOrdering {
    /// Work executes in enqueue order on one command stream
    #[default]
    InOrder,
    /// Work is ordered only through events
    OutOfOrder,
}

/// Queue configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QueueConfig {
    /// Execution ordering
    pub ordering: QueueOrdering,
    /// Initial command stream and heap sizes
    pub arenas: ArenaConfig,
    /// Timeout for blocking enqueues and `finish`
    pub wait_timeout: WaitTimeout,
}

impl QueueConfig {
    /// In-order queue with 64 KiB arenas and no wait timeout
    pub const fn in_order() -> Self {
        Self {
            ordering: QueueOrdering::InOrder,
            arenas: ArenaConfig::uniform(ByteSize::KIB_64),
            wait_timeout: WaitTimeout::Infinite,
        }
    }

    /// Out-of-order queue, otherwise as [`QueueConfig::in_order`]
    pub const fn out_of_order() -> Self {
        Self {
            ordering: QueueOrdering::OutOfOrder,
            ..Self::in_order()
        }
    }

    /// Replace the arena sizes
    pub const fn with_arenas(mut self, arenas: ArenaConfig) -> Self {
        self.arenas = arenas;
        self
    }

    /// Replace the wait timeout
    pub const fn with_wait_timeout(mut self, timeout: WaitTimeout) -> Self {
        self.wait_timeout = timeout;
        self
    }
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self::in_order()
    }
}
