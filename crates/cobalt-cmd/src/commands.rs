//! # Hardware Commands
//!
//! Dword layouts of the render-engine commands and state structures used to
//! dispatch a copy kernel on Gen8 and later.
//!
//! Every structure is a `#[repr(C)]` array of little-endian dwords that can
//! be written into a command stream or heap as-is. Field positions are given
//! as `hi:lo` bit ranges within a dword.
//!
//! ## Command Header
//!
//! ```text
//!  31   29 28  27 26   24 23       16 15              8 7            0
//! ┌───────┬──────┬───────┬───────────┬─────────────────┬──────────────┐
//! │ type  │ sub  │  op   │  sub-op   │   (cmd specific)│ dword length │
//! └───────┴──────┴───────┴───────────┴─────────────────┴──────────────┘
//!   type 0 = MI, type 3 = GFXPIPE; dword length = total dwords - 2
//! ```

use bytemuck::{Pod, Zeroable};
use static_assertions::const_assert_eq;

use cobalt_core::GpuAddr;

// =============================================================================
// BIT HELPERS
// =============================================================================

const fn mask(width: u32) -> u32 {
    if width >= 32 {
        u32::MAX
    } else {
        (1 << width) - 1
    }
}

/// Extract bits `hi:lo` of a dword
#[inline]
pub const fn get_bits(dw: u32, hi: u32, lo: u32) -> u32 {
    (dw >> lo) & mask(hi - lo + 1)
}

/// Replace bits `hi:lo` of a dword, truncating `value` to the field
#[inline]
pub fn set_bits(dw: &mut u32, hi: u32, lo: u32, value: u32) {
    let m = mask(hi - lo + 1) << lo;
    *dw = (*dw & !m) | ((value << lo) & m);
}

/// Command header fields
pub mod header {
    /// Command type, bits 31:29
    pub const fn command_type(dw: u32) -> u32 {
        super::get_bits(dw, 31, 29)
    }

    /// Total dwords implied by a length field of `dw`
    pub const fn length_from_field(dw: u32) -> usize {
        (dw & 0xFF) as usize + 2
    }
}

/// A command or state structure with a fixed dword layout
pub trait HwCommand: Pod {
    /// Name used in logs and parse errors
    const NAME: &'static str;

    /// Raw bytes to write into a stream or heap
    fn as_bytes(&self) -> &[u8] {
        bytemuck::bytes_of(self)
    }
}

// =============================================================================
// PIPELINE_SELECT
// =============================================================================

/// PIPELINE_SELECT (1 dword)
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Pod, Zeroable)]
pub struct PipelineSelect {
    /// Raw dwords
    pub dw: [u32; 1],
}

const_assert_eq!(core::mem::size_of::<PipelineSelect>(), 4);

impl PipelineSelect {
    /// Header, 3D type with sub-opcode 4
    pub const HEADER: u32 = 0x6904_0000;
    /// Pipeline selection value for GPGPU
    pub const PIPELINE_GPGPU: u32 = 2;

    /// Select the GPGPU pipeline, with the Gen9+ mask bits when `masked`
    pub fn gpgpu(masked: bool) -> Self {
        let mut dw = Self::HEADER;
        if masked {
            set_bits(&mut dw, 9, 8, 0x3);
        }
        set_bits(&mut dw, 1, 0, Self::PIPELINE_GPGPU);
        Self { dw: [dw] }
    }

    /// Selected pipeline
    pub fn pipeline(&self) -> u32 {
        get_bits(self.dw[0], 1, 0)
    }

    /// Mask bits enabling the pipeline field
    pub fn mask_bits(&self) -> u32 {
        get_bits(self.dw[0], 15, 8)
    }

    /// Check if this switches to GPGPU
    pub fn is_gpgpu(&self) -> bool {
        self.pipeline() == Self::PIPELINE_GPGPU
    }
}

impl HwCommand for PipelineSelect {
    const NAME: &'static str = "PIPELINE_SELECT";
}

// =============================================================================
// STATE_BASE_ADDRESS
// =============================================================================

/// STATE_BASE_ADDRESS (16 dwords on Gen8, 19 on Gen9+)
///
/// ```text
/// dw 1-2    general state base        + modify enable (bit 0)
/// dw 4-5    surface state base        + modify enable
/// dw 6-7    dynamic state base        + modify enable
/// dw 8-9    indirect object base      + modify enable
/// dw 10-11  instruction base          + modify enable
/// dw 12-15  buffer sizes (31:12 pages) + modify enable, same order
///           general, dynamic, indirect object, instruction
/// dw 16-18  bindless surface state (Gen9+, left unprogrammed)
/// ```
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Pod, Zeroable)]
pub struct StateBaseAddress {
    /// Raw dwords; only the first [`StateBaseAddress::dword_count`] are emitted
    pub dw: [u32; 19],
}

const_assert_eq!(core::mem::size_of::<StateBaseAddress>(), 76);

/// Base address slots in STATE_BASE_ADDRESS
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BaseSlot {
    /// General state (stateless)
    GeneralState,
    /// Surface state heap
    SurfaceState,
    /// Dynamic state heap
    DynamicState,
    /// Indirect object heap
    IndirectObject,
    /// Instruction heap
    Instruction,
}

impl BaseSlot {
    const fn base_dword(self) -> usize {
        match self {
            Self::GeneralState => 1,
            Self::SurfaceState => 4,
            Self::DynamicState => 6,
            Self::IndirectObject => 8,
            Self::Instruction => 10,
        }
    }

    /// Size dword, absent for the surface state heap
    const fn size_dword(self) -> Option<usize> {
        match self {
            Self::GeneralState => Some(12),
            Self::SurfaceState => None,
            Self::DynamicState => Some(13),
            Self::IndirectObject => Some(14),
            Self::Instruction => Some(15),
        }
    }
}

impl StateBaseAddress {
    /// Header without the length field
    pub const HEADER: u32 = 0x6101_0000;
    /// Maximum buffer size field, in pages
    pub const MAX_SIZE_PAGES: u32 = 0xF_FFFF;

    /// Empty command of `dwords` length (16 or 19)
    pub fn new(dwords: usize) -> Self {
        let mut sba = Self::zeroed();
        sba.dw[0] = Self::HEADER | (dwords as u32 - 2);
        sba
    }

    /// Emitted length in dwords
    pub fn dword_count(&self) -> usize {
        header::length_from_field(self.dw[0])
    }

    /// Program a base address and its modify enable
    pub fn set_base(&mut self, slot: BaseSlot, base: GpuAddr) {
        let i = slot.base_dword();
        self.dw[i] = (base.low() & !0xFFF) | 1;
        self.dw[i + 1] = base.high();
    }

    /// Program a buffer size in pages and its modify enable
    pub fn set_size_pages(&mut self, slot: BaseSlot, pages: u32) {
        if let Some(i) = slot.size_dword() {
            self.dw[i] = (pages.min(Self::MAX_SIZE_PAGES) << 12) | 1;
        }
    }

    /// Programmed base address
    pub fn base(&self, slot: BaseSlot) -> GpuAddr {
        let i = slot.base_dword();
        GpuAddr::new(((self.dw[i + 1] as u64) << 32) | (self.dw[i] & !0xFFF) as u64)
    }

    /// Base address modify enable
    pub fn base_modify_enabled(&self, slot: BaseSlot) -> bool {
        self.dw[slot.base_dword()] & 1 != 0
    }

    /// Programmed buffer size in pages, `None` for the surface state heap
    pub fn size_pages(&self, slot: BaseSlot) -> Option<u32> {
        slot.size_dword().map(|i| get_bits(self.dw[i], 31, 12))
    }

    /// Buffer size modify enable
    pub fn size_modify_enabled(&self, slot: BaseSlot) -> bool {
        slot.size_dword().is_some_and(|i| self.dw[i] & 1 != 0)
    }

    /// Bytes actually emitted
    pub fn emitted_bytes(&self) -> &[u8] {
        &self.as_bytes()[..self.dword_count() * 4]
    }
}

impl HwCommand for StateBaseAddress {
    const NAME: &'static str = "STATE_BASE_ADDRESS";
}

// =============================================================================
// MEDIA_VFE_STATE
// =============================================================================

/// MEDIA_VFE_STATE (9 dwords)
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Pod, Zeroable)]
pub struct MediaVfeState {
    /// Raw dwords
    pub dw: [u32; 9],
}

const_assert_eq!(core::mem::size_of::<MediaVfeState>(), 36);

impl MediaVfeState {
    /// Header
    pub const HEADER: u32 = 0x7000_0007;

    /// Front-end state for `max_threads` hardware threads
    pub fn new(max_threads: u32, urb_entries: u32, urb_entry_size: u32, curbe_size: u32) -> Self {
        let mut vfe = Self::zeroed();
        vfe.dw[0] = Self::HEADER;
        // Thread count is encoded minus one
        set_bits(&mut vfe.dw[3], 31, 16, max_threads.saturating_sub(1));
        set_bits(&mut vfe.dw[3], 15, 8, urb_entries);
        // Reset gateway timer
        set_bits(&mut vfe.dw[3], 7, 7, 1);
        set_bits(&mut vfe.dw[5], 31, 16, urb_entry_size);
        set_bits(&mut vfe.dw[5], 15, 0, curbe_size);
        vfe
    }

    /// Maximum thread count
    pub fn max_threads(&self) -> u32 {
        get_bits(self.dw[3], 31, 16) + 1
    }

    /// Number of URB entries
    pub fn urb_entries(&self) -> u32 {
        get_bits(self.dw[3], 15, 8)
    }

    /// URB entry allocation size
    pub fn urb_entry_allocation_size(&self) -> u32 {
        get_bits(self.dw[5], 31, 16)
    }
}

impl HwCommand for MediaVfeState {
    const NAME: &'static str = "MEDIA_VFE_STATE";
}

// =============================================================================
// MI_LOAD_REGISTER_IMM
// =============================================================================

/// MI_LOAD_REGISTER_IMM of one register (3 dwords)
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Pod, Zeroable)]
pub struct LoadRegisterImm {
    /// Raw dwords
    pub dw: [u32; 3],
}

const_assert_eq!(core::mem::size_of::<LoadRegisterImm>(), 12);

impl LoadRegisterImm {
    /// Header
    pub const HEADER: u32 = 0x1100_0001;

    /// Load `value` into the MMIO register at `offset`
    pub fn new(offset: u32, value: u32) -> Self {
        Self {
            dw: [Self::HEADER, offset & !0x3, value],
        }
    }

    /// Register offset
    pub fn register(&self) -> u32 {
        self.dw[1]
    }

    /// Loaded value
    pub fn value(&self) -> u32 {
        self.dw[2]
    }
}

impl HwCommand for LoadRegisterImm {
    const NAME: &'static str = "MI_LOAD_REGISTER_IMM";
}

/// L3 cache partitioning register
pub mod l3cntlreg {
    use super::get_bits;

    /// MMIO offset
    pub const OFFSET: u32 = 0x7034;

    /// URB allocation in ways, bits 7:1
    pub const fn urb_ways(value: u32) -> u32 {
        get_bits(value, 7, 1)
    }

    /// Shared client pool allocation, bits 31:25
    pub const fn client_pool(value: u32) -> u32 {
        get_bits(value, 31, 25)
    }
}

// =============================================================================
// MEDIA_INTERFACE_DESCRIPTOR_LOAD
// =============================================================================

/// MEDIA_INTERFACE_DESCRIPTOR_LOAD (4 dwords)
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Pod, Zeroable)]
pub struct MediaInterfaceDescriptorLoad {
    /// Raw dwords
    pub dw: [u32; 4],
}

const_assert_eq!(core::mem::size_of::<MediaInterfaceDescriptorLoad>(), 16);

impl MediaInterfaceDescriptorLoad {
    /// Header
    pub const HEADER: u32 = 0x7002_0002;

    /// Load `total_length` bytes of descriptors from `start` in the DSH
    pub fn new(total_length: u32, start: u32) -> Self {
        let mut cmd = Self::zeroed();
        cmd.dw[0] = Self::HEADER;
        set_bits(&mut cmd.dw[2], 16, 0, total_length);
        cmd.dw[3] = start;
        cmd
    }

    /// Total descriptor bytes
    pub fn total_length(&self) -> u32 {
        get_bits(self.dw[2], 16, 0)
    }

    /// Offset of the first descriptor from the dynamic state base
    pub fn start_offset(&self) -> u32 {
        self.dw[3]
    }
}

impl HwCommand for MediaInterfaceDescriptorLoad {
    const NAME: &'static str = "MEDIA_INTERFACE_DESCRIPTOR_LOAD";
}

// =============================================================================
// INTERFACE_DESCRIPTOR_DATA
// =============================================================================

/// INTERFACE_DESCRIPTOR_DATA (8 dwords, in the dynamic state heap)
///
/// ```text
/// dw0  31:6  kernel start pointer (low)
/// dw1  15:0  kernel start pointer (high)
/// dw4  15:5  binding table pointer     4:0  binding table entry count
/// dw5  31:16 indirect URB read length (GRFs per thread)
/// dw6  9:0   threads in thread group
/// dw7  7:0   cross-thread read length (GRFs)
/// ```
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Pod, Zeroable)]
pub struct InterfaceDescriptorData {
    /// Raw dwords
    pub dw: [u32; 8],
}

const_assert_eq!(core::mem::size_of::<InterfaceDescriptorData>(), 32);

impl InterfaceDescriptorData {
    /// Size of one descriptor
    pub const SIZE: u32 = 32;
    /// Largest binding table pointer the 15:5 field holds
    pub const MAX_BINDING_TABLE_OFFSET: u32 = 0xFFE0;
    /// Largest binding table entry count
    pub const MAX_BINDING_TABLE_ENTRIES: u32 = 31;

    /// Set the kernel start pointer, an offset from the instruction base
    pub fn set_kernel_start(&mut self, ksp: u64) {
        self.dw[0] = (ksp as u32) & !0x3F;
        set_bits(&mut self.dw[1], 15, 0, (ksp >> 32) as u32);
    }

    /// Kernel start pointer
    pub fn kernel_start(&self) -> u64 {
        ((get_bits(self.dw[1], 15, 0) as u64) << 32) | (self.dw[0] & !0x3F) as u64
    }

    /// Set the binding table pointer (SSH offset) and entry count
    ///
    /// Returns `false`, leaving the descriptor untouched, if either value
    /// does not fit its field.
    #[must_use]
    pub fn set_binding_table(&mut self, offset: u32, count: u32) -> bool {
        if offset > Self::MAX_BINDING_TABLE_OFFSET
            || offset % 32 != 0
            || count > Self::MAX_BINDING_TABLE_ENTRIES
        {
            return false;
        }
        set_bits(&mut self.dw[4], 15, 5, offset >> 5);
        set_bits(&mut self.dw[4], 4, 0, count);
        true
    }

    /// Binding table pointer
    pub fn binding_table_pointer(&self) -> u32 {
        get_bits(self.dw[4], 15, 5) << 5
    }

    /// Binding table entry count
    pub fn binding_table_count(&self) -> u32 {
        get_bits(self.dw[4], 4, 0)
    }

    /// Set the per-thread indirect URB read length in GRFs
    pub fn set_indirect_read_length(&mut self, grfs: u32) {
        set_bits(&mut self.dw[5], 31, 16, grfs);
    }

    /// Per-thread indirect URB read length
    pub fn indirect_read_length(&self) -> u32 {
        get_bits(self.dw[5], 31, 16)
    }

    /// Set the thread count per thread group
    pub fn set_threads_per_group(&mut self, threads: u32) {
        set_bits(&mut self.dw[6], 9, 0, threads);
    }

    /// Threads per thread group
    pub fn threads_per_group(&self) -> u32 {
        get_bits(self.dw[6], 9, 0)
    }

    /// Set the cross-thread read length in GRFs
    pub fn set_cross_thread_read_length(&mut self, grfs: u32) {
        set_bits(&mut self.dw[7], 7, 0, grfs);
    }

    /// Cross-thread read length
    pub fn cross_thread_read_length(&self) -> u32 {
        get_bits(self.dw[7], 7, 0)
    }
}

impl HwCommand for InterfaceDescriptorData {
    const NAME: &'static str = "INTERFACE_DESCRIPTOR_DATA";
}

// =============================================================================
// RENDER_SURFACE_STATE
// =============================================================================

/// Surface type field values
pub mod surface_type {
    /// 1D surface
    pub const SURFTYPE_1D: u32 = 0;
    /// 2D surface
    pub const SURFTYPE_2D: u32 = 1;
    /// 3D surface
    pub const SURFTYPE_3D: u32 = 2;
    /// Linear buffer
    pub const SURFTYPE_BUFFER: u32 = 4;
}

/// Surface format field values
pub mod surface_format {
    /// 16 bytes per pixel
    pub const R32G32B32A32_UINT: u32 = 0x002;
    /// 8 bytes per pixel
    pub const R32G32_UINT: u32 = 0x087;
    /// 4 bytes per pixel
    pub const R32_UINT: u32 = 0x0D7;
    /// 2 bytes per pixel
    pub const R16_UINT: u32 = 0x10D;
    /// 1 byte per pixel
    pub const R8_UINT: u32 = 0x143;
    /// Untyped buffer
    pub const RAW: u32 = 0x1FF;

    /// UINT format copying `element_size` bytes per pixel exactly
    pub const fn uint_for_element_size(element_size: u32) -> Option<u32> {
        match element_size {
            1 => Some(R8_UINT),
            2 => Some(R16_UINT),
            4 => Some(R32_UINT),
            8 => Some(R32G32_UINT),
            16 => Some(R32G32B32A32_UINT),
            _ => None,
        }
    }
}

/// RENDER_SURFACE_STATE (16 dwords, in the surface state heap)
///
/// ```text
/// dw0  31:29 type  28 array  26:18 format  17:16 valign  15:14 halign  13:12 tiling
/// dw1  14:0  qpitch (rows / 4)
/// dw2  29:16 height - 1   13:0 width - 1
/// dw3  31:21 depth - 1    17:0 pitch - 1
/// dw7  27:16 shader channel selects
/// dw8-9      base address
/// ```
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Pod, Zeroable)]
pub struct RenderSurfaceState {
    /// Raw dwords
    pub dw: [u32; 16],
}

const_assert_eq!(core::mem::size_of::<RenderSurfaceState>(), 64);

impl RenderSurfaceState {
    /// Size of one surface state
    pub const SIZE: u64 = 64;
    /// Required alignment within the surface state heap
    pub const ALIGNMENT: u64 = 64;
    /// HALIGN_4 / VALIGN_4 field value
    pub const ALIGN_4: u32 = 1;

    /// Linear typed surface
    pub fn image(
        surface_type: u32,
        format: u32,
        array: bool,
        width: u32,
        height: u32,
        depth: u32,
        pitch: u32,
        qpitch_rows: u32,
        base: GpuAddr,
    ) -> Self {
        debug_assert_eq!(qpitch_rows % 4, 0, "QPitch is counted in groups of 4 rows");
        let mut ss = Self::zeroed();
        set_bits(&mut ss.dw[0], 31, 29, surface_type);
        set_bits(&mut ss.dw[0], 28, 28, array as u32);
        set_bits(&mut ss.dw[0], 26, 18, format);
        set_bits(&mut ss.dw[0], 17, 16, Self::ALIGN_4);
        set_bits(&mut ss.dw[0], 15, 14, Self::ALIGN_4);
        set_bits(&mut ss.dw[1], 14, 0, qpitch_rows >> 2);
        set_bits(&mut ss.dw[2], 29, 16, height.saturating_sub(1));
        set_bits(&mut ss.dw[2], 13, 0, width.saturating_sub(1));
        set_bits(&mut ss.dw[3], 31, 21, depth.saturating_sub(1));
        set_bits(&mut ss.dw[3], 17, 0, pitch.saturating_sub(1));
        ss.set_identity_swizzle();
        ss.set_base(base);
        ss
    }

    /// RAW buffer of `size` bytes
    pub fn raw_buffer(size: u64, base: GpuAddr) -> Self {
        let mut ss = Self::zeroed();
        set_bits(&mut ss.dw[0], 31, 29, surface_type::SURFTYPE_BUFFER);
        set_bits(&mut ss.dw[0], 26, 18, surface_format::RAW);
        // Buffer size minus one, spread over width, height and depth
        let n = size.saturating_sub(1) as u32;
        set_bits(&mut ss.dw[2], 6, 0, n & 0x7F);
        set_bits(&mut ss.dw[2], 29, 16, (n >> 7) & 0x3FFF);
        set_bits(&mut ss.dw[3], 31, 21, (n >> 21) & 0x3FF);
        ss.set_identity_swizzle();
        ss.set_base(base);
        ss
    }

    fn set_identity_swizzle(&mut self) {
        set_bits(&mut self.dw[7], 27, 25, 4);
        set_bits(&mut self.dw[7], 24, 22, 5);
        set_bits(&mut self.dw[7], 21, 19, 6);
        set_bits(&mut self.dw[7], 18, 16, 7);
    }

    fn set_base(&mut self, base: GpuAddr) {
        self.dw[8] = base.low();
        self.dw[9] = base.high();
    }

    /// Surface type
    pub fn surface_type(&self) -> u32 {
        get_bits(self.dw[0], 31, 29)
    }

    /// Surface array flag
    pub fn is_array(&self) -> bool {
        get_bits(self.dw[0], 28, 28) != 0
    }

    /// Surface format
    pub fn format(&self) -> u32 {
        get_bits(self.dw[0], 26, 18)
    }

    /// Vertical alignment field
    pub fn valign(&self) -> u32 {
        get_bits(self.dw[0], 17, 16)
    }

    /// Horizontal alignment field
    pub fn halign(&self) -> u32 {
        get_bits(self.dw[0], 15, 14)
    }

    /// Tile mode (0 = linear)
    pub fn tile_mode(&self) -> u32 {
        get_bits(self.dw[0], 13, 12)
    }

    /// Width in pixels
    pub fn width(&self) -> u32 {
        get_bits(self.dw[2], 13, 0) + 1
    }

    /// Height in rows
    pub fn height(&self) -> u32 {
        get_bits(self.dw[2], 29, 16) + 1
    }

    /// Depth or array length
    pub fn depth(&self) -> u32 {
        get_bits(self.dw[3], 31, 21) + 1
    }

    /// Distance between array slices or depth slices, in rows
    pub fn qpitch_rows(&self) -> u32 {
        get_bits(self.dw[1], 14, 0) << 2
    }

    /// Pitch in bytes
    pub fn pitch(&self) -> u32 {
        get_bits(self.dw[3], 17, 0) + 1
    }

    /// Buffer size in bytes, for buffer surfaces
    pub fn buffer_size(&self) -> u64 {
        let n = get_bits(self.dw[2], 6, 0)
            | (get_bits(self.dw[2], 29, 16) << 7)
            | (get_bits(self.dw[3], 31, 21) << 21);
        n as u64 + 1
    }

    /// Surface base address
    pub fn base(&self) -> GpuAddr {
        GpuAddr::new(((self.dw[9] as u64) << 32) | self.dw[8] as u64)
    }
}

impl HwCommand for RenderSurfaceState {
    const NAME: &'static str = "RENDER_SURFACE_STATE";
}

// =============================================================================
// GPGPU_WALKER
// =============================================================================

/// GPGPU_WALKER (15 dwords)
///
/// ```text
/// dw0  10    indirect parameter enable
/// dw1  5:0   interface descriptor offset
/// dw2  16:0  indirect data length
/// dw3  31:6  indirect data start (IOH offset)
/// dw4  31:30 SIMD size   5:0 thread width counter max
/// dw7/10/12  thread group counts x / y / z
/// dw13/14    right / bottom execution masks
/// ```
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Pod, Zeroable)]
pub struct GpgpuWalker {
    /// Raw dwords
    pub dw: [u32; 15],
}

const_assert_eq!(core::mem::size_of::<GpgpuWalker>(), 60);

impl GpgpuWalker {
    /// Header
    pub const HEADER: u32 = 0x7105_000D;
    /// Indirect parameter enable bit in dw0
    pub const INDIRECT_PARAMETER_ENABLE: u32 = 1 << 10;

    /// SIMD size field for a SIMD width
    pub const fn simd_field(simd_width: u32) -> u32 {
        match simd_width {
            8 => 0,
            16 => 1,
            _ => 2,
        }
    }

    /// Empty walker
    pub fn new() -> Self {
        let mut walker = Self::zeroed();
        walker.dw[0] = Self::HEADER;
        walker.dw[14] = u32::MAX;
        walker
    }

    /// Set indirect data length and IOH start offset
    pub fn set_indirect_data(&mut self, length: u32, start: u32) {
        set_bits(&mut self.dw[2], 16, 0, length);
        self.dw[3] = start & !0x3F;
    }

    /// Set SIMD width and threads per group
    pub fn set_threads(&mut self, simd_width: u32, threads_per_group: u32) {
        set_bits(&mut self.dw[4], 31, 30, Self::simd_field(simd_width));
        set_bits(&mut self.dw[4], 5, 0, threads_per_group.saturating_sub(1));
    }

    /// Set thread group counts
    pub fn set_group_counts(&mut self, counts: [u32; 3]) {
        self.dw[7] = counts[0];
        self.dw[10] = counts[1];
        self.dw[12] = counts[2];
    }

    /// Set the execution mask of the last thread in each group
    pub fn set_right_mask(&mut self, mask: u32) {
        self.dw[13] = mask;
    }

    /// Check the indirect parameter enable bit
    pub fn indirect_parameter_enabled(&self) -> bool {
        self.dw[0] & Self::INDIRECT_PARAMETER_ENABLE != 0
    }

    /// Indirect data length
    pub fn indirect_data_length(&self) -> u32 {
        get_bits(self.dw[2], 16, 0)
    }

    /// Indirect data start offset
    pub fn indirect_data_start(&self) -> u32 {
        self.dw[3]
    }

    /// SIMD size field
    pub fn simd_size(&self) -> u32 {
        get_bits(self.dw[4], 31, 30)
    }

    /// Threads per thread group
    pub fn threads_per_group(&self) -> u32 {
        get_bits(self.dw[4], 5, 0) + 1
    }

    /// Thread group counts
    pub fn group_counts(&self) -> [u32; 3] {
        [self.dw[7], self.dw[10], self.dw[12]]
    }

    /// Right execution mask
    pub fn right_mask(&self) -> u32 {
        self.dw[13]
    }

    /// Bottom execution mask
    pub fn bottom_mask(&self) -> u32 {
        self.dw[14]
    }
}

impl Default for GpgpuWalker {
    fn default() -> Self {
        Self::new()
    }
}

impl HwCommand for GpgpuWalker {
    const NAME: &'static str = "GPGPU_WALKER";
}

// =============================================================================
// PIPE_CONTROL
// =============================================================================

bitflags::bitflags! {
    /// PIPE_CONTROL dw1 flags
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct PipeControlFlags: u32 {
        /// Flush the data port cache
        const DC_FLUSH = 1 << 5;
        /// Write immediate data after the flush
        const POST_SYNC_WRITE_IMM = 1 << 14;
        /// Stall the command streamer
        const CS_STALL = 1 << 20;
    }
}

/// PIPE_CONTROL (6 dwords)
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Pod, Zeroable)]
pub struct PipeControl {
    /// Raw dwords
    pub dw: [u32; 6],
}

const_assert_eq!(core::mem::size_of::<PipeControl>(), 24);

impl PipeControl {
    /// Header
    pub const HEADER: u32 = 0x7A00_0004;

    /// Barrier without post-sync operation
    pub fn new(flags: PipeControlFlags) -> Self {
        let mut pc = Self::zeroed();
        pc.dw[0] = Self::HEADER;
        pc.dw[1] = flags.bits();
        pc
    }

    /// Barrier writing `value` to `address` when done
    pub fn with_tag_write(flags: PipeControlFlags, address: GpuAddr, value: u32) -> Self {
        let mut pc = Self::new(flags | PipeControlFlags::POST_SYNC_WRITE_IMM);
        pc.dw[2] = address.low() & !0x3;
        pc.dw[3] = address.high();
        pc.dw[4] = value;
        pc
    }

    /// Flags
    pub fn flags(&self) -> PipeControlFlags {
        PipeControlFlags::from_bits_truncate(self.dw[1])
    }

    /// Check the data cache flush bit
    pub fn dc_flush(&self) -> bool {
        self.flags().contains(PipeControlFlags::DC_FLUSH)
    }

    /// Check if this writes a tag
    pub fn writes_tag(&self) -> bool {
        self.flags().contains(PipeControlFlags::POST_SYNC_WRITE_IMM)
    }

    /// Post-sync address
    pub fn address(&self) -> GpuAddr {
        GpuAddr::new(((self.dw[3] as u64) << 32) | self.dw[2] as u64)
    }

    /// Post-sync immediate value
    pub fn immediate(&self) -> u32 {
        self.dw[4]
    }
}

impl HwCommand for PipeControl {
    const NAME: &'static str = "PIPE_CONTROL";
}

// =============================================================================
// BATCH TERMINATION
// =============================================================================

/// MI_BATCH_BUFFER_END
pub const MI_BATCH_BUFFER_END: u32 = 0x0500_0000;
/// MI_NOOP
pub const MI_NOOP: u32 = 0;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bits_round_trip_in_place() {
        let mut dw = 0xFFFF_FFFF;
        set_bits(&mut dw, 15, 8, 0);
        assert_eq!(dw, 0xFFFF_00FF);
        set_bits(&mut dw, 15, 8, 0x1FF);
        assert_eq!(get_bits(dw, 15, 8), 0xFF);
        assert_eq!(get_bits(0x8000_0000, 31, 31), 1);
    }

    #[test]
    fn test_pipeline_select_gpgpu() {
        let ps = PipelineSelect::gpgpu(true);
        assert_eq!(ps.dw[0], 0x6904_0302);
        assert!(ps.is_gpgpu());
        assert_eq!(PipelineSelect::gpgpu(false).mask_bits(), 0);
    }

    #[test]
    fn test_sba_lengths_and_modify_enables() {
        let mut sba = StateBaseAddress::new(16);
        assert_eq!(sba.dword_count(), 16);
        assert_eq!(sba.emitted_bytes().len(), 64);
        sba.set_base(BaseSlot::Instruction, GpuAddr::new(0x1_2345_6000));
        sba.set_size_pages(BaseSlot::Instruction, 3);
        assert_eq!(sba.base(BaseSlot::Instruction), GpuAddr::new(0x1_2345_6000));
        assert!(sba.base_modify_enabled(BaseSlot::Instruction));
        assert_eq!(sba.size_pages(BaseSlot::Instruction), Some(3));
        assert!(!sba.size_modify_enabled(BaseSlot::SurfaceState));
        assert_eq!(StateBaseAddress::new(19).dw[0], 0x6101_0011);
    }

    #[test]
    fn test_l3_fields() {
        assert_eq!(l3cntlreg::urb_ways(0x6000_0321), 0x10);
        assert_eq!(l3cntlreg::client_pool(0x6000_0321), 0x30);
        assert_eq!(l3cntlreg::urb_ways(0x8000_0340), 0x20);
        assert_eq!(l3cntlreg::client_pool(0x8000_0340), 0x40);
    }

    #[test]
    fn test_idd_fields() {
        let mut idd = InterfaceDescriptorData::zeroed();
        idd.set_kernel_start(0x2_0000_0040);
        assert!(idd.set_binding_table(0x80, 2));
        idd.set_threads_per_group(2);
        assert_eq!(idd.kernel_start(), 0x2_0000_0040);
        assert_eq!(idd.binding_table_pointer(), 0x80);
        assert_eq!(idd.binding_table_count(), 2);
        assert_eq!(idd.threads_per_group(), 2);
    }

    #[test]
    fn test_idd_rejects_unaddressable_binding_table() {
        let mut idd = InterfaceDescriptorData::zeroed();
        assert!(idd.set_binding_table(InterfaceDescriptorData::MAX_BINDING_TABLE_OFFSET, 2));
        assert!(!idd.set_binding_table(0x1_0040, 2));
        assert!(!idd.set_binding_table(0x90, 2));
        assert!(!idd.set_binding_table(0x80, 32));
        assert_eq!(idd.binding_table_pointer(), InterfaceDescriptorData::MAX_BINDING_TABLE_OFFSET);
    }

    #[test]
    fn test_surface_fields() {
        let base = GpuAddr::new(0xABCD_0000);
        let ss = RenderSurfaceState::image(
            surface_type::SURFTYPE_2D,
            surface_format::R32_UINT,
            false,
            640,
            480,
            1,
            2560,
            480,
            base,
        );
        assert_eq!((ss.width(), ss.height(), ss.pitch()), (640, 480, 2560));
        assert_eq!(ss.format(), surface_format::R32_UINT);
        assert_eq!((ss.halign(), ss.valign(), ss.tile_mode()), (1, 1, 0));
        assert_eq!(ss.base(), base);

        let buf = RenderSurfaceState::raw_buffer(5 * 3 * 4, base);
        assert_eq!(buf.surface_type(), surface_type::SURFTYPE_BUFFER);
        assert_eq!(buf.buffer_size(), 60);
        assert_eq!(RenderSurfaceState::raw_buffer(1 << 24, base).buffer_size(), 1 << 24);
    }

    #[test]
    fn test_pipe_control_tag() {
        let pc = PipeControl::with_tag_write(PipeControlFlags::CS_STALL, GpuAddr::new(0x1000), 7);
        assert!(pc.writes_tag());
        assert!(!pc.dc_flush());
        assert_eq!(pc.address(), GpuAddr::new(0x1000));
        assert_eq!(pc.immediate(), 7);
    }
}
