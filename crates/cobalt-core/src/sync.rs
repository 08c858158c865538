//! Wait Utilities
//!
//! Timeout and result types for blocking on the command stream receiver.

use core::time::Duration;

// ============================================================================
// Wait Result
// ============================================================================

/// Wait result.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WaitResult {
    /// Target task count reached.
    Success,
    /// Wait timed out.
    Timeout,
    /// Device was lost.
    DeviceLost,
}

impl WaitResult {
    /// Check if successful.
    pub fn is_success(&self) -> bool {
        *self == WaitResult::Success
    }

    /// Check if timed out.
    pub fn is_timeout(&self) -> bool {
        *self == WaitResult::Timeout
    }
}

// ============================================================================
// Wait Timeout
// ============================================================================

/// Wait timeout specification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum WaitTimeout {
    /// Poll once and return.
    None,
    /// Wait with timeout.
    Duration(Duration),
    /// Wait indefinitely.
    #[default]
    Infinite,
}

impl WaitTimeout {
    /// Create a timeout in milliseconds.
    pub fn millis(ms: u64) -> Self {
        WaitTimeout::Duration(Duration::from_millis(ms))
    }

    /// Create a timeout in seconds.
    pub fn secs(s: u64) -> Self {
        WaitTimeout::Duration(Duration::from_secs(s))
    }

    /// Get duration or None for infinite.
    pub fn as_duration(&self) -> Option<Duration> {
        match self {
            WaitTimeout::None => Some(Duration::ZERO),
            WaitTimeout::Duration(d) => Some(*d),
            WaitTimeout::Infinite => None,
        }
    }
}
