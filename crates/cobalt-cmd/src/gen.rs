//! # Generation Table
//!
//! Everything that differs between render-core generations, resolved once
//! per device into a `&'static GenTraits`.

use cobalt_core::GpuGeneration;

/// How the completion barrier is stamped
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompletionFlush {
    /// One PIPE_CONTROL carrying the DC flush and the tag write
    Combined,
    /// A DC-flush PIPE_CONTROL followed by a tag-write PIPE_CONTROL
    Split,
}

/// Per-generation encoding parameters
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GenTraits {
    /// Generation these values apply to
    pub generation: GpuGeneration,
    /// Completion barrier strategy
    pub completion_flush: CompletionFlush,
    /// STATE_BASE_ADDRESS length in dwords
    pub sba_dwords: usize,
    /// PIPELINE_SELECT carries mask bits
    pub pipeline_select_mask: bool,
    /// L3CNTLREG value programmed before dispatch
    pub l3_config: u32,
    /// MEDIA_VFE_STATE URB entry count
    pub urb_entries: u32,
    /// MEDIA_VFE_STATE URB entry allocation size
    pub urb_entry_allocation_size: u32,
}

/// Gen8
pub static GEN8: GenTraits = GenTraits {
    generation: GpuGeneration::Gen8,
    completion_flush: CompletionFlush::Combined,
    sba_dwords: 16,
    pipeline_select_mask: false,
    l3_config: 0x6000_0321,
    urb_entries: 1,
    urb_entry_allocation_size: 0x782,
};

/// Gen9
pub static GEN9: GenTraits = GenTraits {
    generation: GpuGeneration::Gen9,
    completion_flush: CompletionFlush::Split,
    sba_dwords: 19,
    pipeline_select_mask: true,
    l3_config: 0x8000_0340,
    urb_entries: 1,
    urb_entry_allocation_size: 0x782,
};

/// Gen11
pub static GEN11: GenTraits = GenTraits {
    generation: GpuGeneration::Gen11,
    completion_flush: CompletionFlush::Split,
    sba_dwords: 19,
    pipeline_select_mask: true,
    l3_config: 0xA000_0420,
    urb_entries: 1,
    urb_entry_allocation_size: 0x782,
};

/// Look up the table for a generation
pub fn gen_traits(generation: GpuGeneration) -> &'static GenTraits {
    match generation {
        GpuGeneration::Gen8 => &GEN8,
        GpuGeneration::Gen9 => &GEN9,
        GpuGeneration::Gen11 => &GEN11,
    }
}
