//! # Device Capabilities
//!
//! Hardware generation and the capability values the encoder depends on.
//! These are queried once from the command stream receiver when a device is
//! created.

// =============================================================================
// GPU GENERATION
// =============================================================================

/// Render core generation
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[repr(u32)]
pub enum GpuGeneration {
    /// Gen8 (Broadwell)
    Gen8  = 8,
    /// Gen9 (Skylake, Kaby Lake)
    Gen9  = 9,
    /// Gen11 (Ice Lake)
    Gen11 = 11,
}

// =============================================================================
// DEVICE INFO
// =============================================================================

/// Device capability values consumed by the encoder
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeviceInfo {
    /// Render core generation
    pub generation: GpuGeneration,
    /// Total hardware threads available to the media front end
    pub hw_thread_count: u32,
    /// Page granularity for state base address buffer sizes
    pub page_size: u64,
    /// Alignment of the interface descriptor table start
    pub idd_start_alignment: u64,
    /// Alignment of the interface descriptor table length
    pub idd_length_alignment: u64,
}

impl DeviceInfo {
    /// Gen8 GT2 defaults
    pub const fn gen8() -> Self {
        Self {
            generation: GpuGeneration::Gen8,
            hw_thread_count: 168,
            page_size: 4096,
            idd_start_alignment: 64,
            idd_length_alignment: 32,
        }
    }

    /// Gen9 GT2 defaults
    pub const fn gen9() -> Self {
        Self {
            generation: GpuGeneration::Gen9,
            hw_thread_count: 168,
            page_size: 4096,
            idd_start_alignment: 64,
            idd_length_alignment: 32,
        }
    }

    /// Gen11 GT2 defaults
    pub const fn gen11() -> Self {
        Self {
            generation: GpuGeneration::Gen11,
            hw_thread_count: 448,
            page_size: 4096,
            idd_start_alignment: 64,
            idd_length_alignment: 32,
        }
    }
}
