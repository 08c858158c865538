//! # Transfer Encoder
//!
//! Encodes one staged image transfer: heap contents first, then a batch of
//! commands whose base-address state reflects the heaps after this
//! enqueue's reservations.
//!
//! ## Batch Layout
//!
//! ```text
//! PIPELINE_SELECT (GPGPU)          only until the queue has selected it
//! STATE_BASE_ADDRESS
//! MEDIA_VFE_STATE
//! MI_LOAD_REGISTER_IMM L3CNTLREG
//! MEDIA_INTERFACE_DESCRIPTOR_LOAD
//! GPGPU_WALKER
//! PIPE_CONTROL (DC flush + tag)    Gen8
//! PIPE_CONTROL (DC flush)          Gen9+
//! PIPE_CONTROL (tag)               Gen9+
//! MI_BATCH_BUFFER_END
//! ```
//!
//! ## Heap Contents
//!
//! ```text
//! IH   kernel ISA                          (64-byte aligned, offset = KSP)
//! SSH  surface state [0] source, [1] destination, then the binding table
//! IOH  cross-thread arguments, then per-thread local IDs for each thread
//! DSH  INTERFACE_DESCRIPTOR_DATA
//! ```

use alloc::vec::Vec;

use arrayvec::ArrayVec;
use bytemuck::{Pod, Zeroable};

use cobalt_core::types::align_up;
use cobalt_core::{
    ArgumentError, DeviceInfo, Dim3, Error, GpuAddr, Image, ImageType, KernelInfo, Result,
    TransferDirection,
};
use cobalt_mem::{ArenaRequirements, ArenaSet, HeapKind};

use crate::commands::{
    l3cntlreg, surface_format, surface_type, BaseSlot, GpgpuWalker, HwCommand,
    InterfaceDescriptorData, LoadRegisterImm, MediaInterfaceDescriptorLoad, MediaVfeState,
    PipeControl, PipeControlFlags, PipelineSelect, RenderSurfaceState, StateBaseAddress,
    MI_BATCH_BUFFER_END, MI_NOOP,
};
use crate::gen::{gen_traits, CompletionFlush, GenTraits};

/// Kernel start pointer alignment in the instruction heap
pub const KERNEL_ALIGNMENT: u64 = 64;
/// Binding table alignment in the surface state heap
pub const BINDING_TABLE_ALIGNMENT: u64 = 32;
/// Indirect data alignment in the indirect object heap
pub const INDIRECT_DATA_ALIGNMENT: u64 = 64;
/// Bytes in one general register
pub const GRF_SIZE: u32 = 32;
/// Binding table entries used by a copy: source and destination
pub const BINDING_TABLE_ENTRIES: usize = 2;

/// Binding table contents
pub type BindingTable = ArrayVec<u32, BINDING_TABLE_ENTRIES>;

// =============================================================================
// ENCODER STATE
// =============================================================================

/// Per-queue encoder state carried across enqueues
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct EncoderState {
    pipeline_selected: bool,
}

impl EncoderState {
    /// State of a fresh queue
    pub const fn new() -> Self {
        Self {
            pipeline_selected: false,
        }
    }

    /// Check if the GPGPU pipeline has been selected
    #[inline]
    pub fn pipeline_selected(&self) -> bool {
        self.pipeline_selected
    }
}

// =============================================================================
// DISPATCH DESCRIPTION
// =============================================================================

/// Everything the encoder needs to know about one staged transfer
#[derive(Debug, Clone, Copy)]
pub struct TransferDispatch<'a> {
    /// Transfer direction
    pub direction: TransferDirection,
    /// Image being read or written
    pub image: &'a Image,
    /// First pixel of the region
    pub origin: Dim3,
    /// Region extent
    pub region: Dim3,
    /// Staging buffer address
    pub staging_addr: GpuAddr,
    /// Staging buffer size
    pub staging_size: u64,
    /// Copy kernel
    pub kernel: &'a KernelInfo,
    /// Completion tag address
    pub tag_address: GpuAddr,
    /// Task count the tag write stores
    pub tag_value: u32,
}

/// Arguments the copy kernels read from cross-thread data
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Pod, Zeroable)]
pub struct CopyKernelArgs {
    /// Region origin in the image (x, y, z, 0)
    pub image_origin: [u32; 4],
    /// Region extent (x, y, z, 0)
    pub region: [u32; 4],
    /// Staging buffer row pitch, slice pitch and element size
    pub buffer_pitch: [u32; 4],
    /// Work-group size
    pub local_size: [u32; 4],
    /// Thread group counts
    pub group_count: [u32; 4],
}

static_assertions::const_assert_eq!(core::mem::size_of::<CopyKernelArgs>(), 80);

/// Thread and data sizing of one dispatch
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DispatchLayout {
    /// SIMD width
    pub simd_width: u32,
    /// Hardware threads per thread group
    pub threads_per_group: u32,
    /// Thread groups per axis
    pub group_counts: [u32; 3],
    /// Lanes enabled in each group's last thread
    pub right_mask: u32,
    /// Cross-thread data bytes, GRF aligned
    pub cross_thread_bytes: u32,
    /// Per-thread data bytes, GRF aligned
    pub per_thread_bytes: u32,
}

impl DispatchLayout {
    /// Size a dispatch of `kernel` over `region`
    pub fn new(kernel: &KernelInfo, region: Dim3) -> Self {
        let simd_width = kernel.simd_width.clamp(1, 32);
        let lws = kernel.local_work_size.map(|n| n.max(1));
        let group_size = lws.iter().product::<u32>();
        let threads_per_group = group_size.div_ceil(simd_width);

        let extent = [region.x as u32, region.y as u32, region.z as u32];
        let mut group_counts = [0; 3];
        for axis in 0..3 {
            group_counts[axis] = extent[axis].div_ceil(lws[axis]).max(1);
        }

        let remainder = group_size % simd_width;
        let right_mask = match (remainder, simd_width) {
            (0, 32) => u32::MAX,
            (0, w) => (1 << w) - 1,
            (r, _) => (1 << r) - 1,
        };

        let args = core::mem::size_of::<CopyKernelArgs>() as u32;
        let cross_thread_bytes = align_up(kernel.cross_thread_data_size.max(args) as u64, GRF_SIZE as u64) as u32;
        let per_thread_bytes =
            align_up(kernel.per_thread_data_size.max(GRF_SIZE) as u64, GRF_SIZE as u64) as u32;

        Self {
            simd_width,
            threads_per_group,
            group_counts,
            right_mask,
            cross_thread_bytes,
            per_thread_bytes,
        }
    }

    /// Total indirect data bytes
    pub fn indirect_data_length(&self) -> u32 {
        self.cross_thread_bytes + self.per_thread_bytes * self.threads_per_group
    }
}

/// Location of an encoded batch in the command stream
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EncodedBatch {
    /// Offset of the first command
    pub start: u64,
    /// Offset past the last command
    pub end: u64,
    /// Device address of the first command
    pub gpu_addr: GpuAddr,
}

// =============================================================================
// COMMAND ENCODER
// =============================================================================

/// Encoder for one device
#[derive(Debug, Clone, Copy)]
pub struct CommandEncoder {
    info: DeviceInfo,
    traits: &'static GenTraits,
}

impl CommandEncoder {
    /// Create an encoder for a device
    pub fn new(info: DeviceInfo) -> Self {
        Self {
            info,
            traits: gen_traits(info.generation),
        }
    }

    /// Device capabilities
    #[inline]
    pub fn info(&self) -> &DeviceInfo {
        &self.info
    }

    /// Generation table in use
    #[inline]
    pub fn gen_traits(&self) -> &'static GenTraits {
        self.traits
    }

    /// Exact batch length for the next enqueue
    pub fn batch_len(&self, state: &EncoderState) -> u64 {
        let mut len = 0;
        if !state.pipeline_selected {
            len += core::mem::size_of::<PipelineSelect>();
        }
        len += self.traits.sba_dwords * 4;
        len += core::mem::size_of::<MediaVfeState>();
        len += core::mem::size_of::<LoadRegisterImm>();
        len += core::mem::size_of::<MediaInterfaceDescriptorLoad>();
        len += core::mem::size_of::<GpgpuWalker>();
        len += match self.traits.completion_flush {
            CompletionFlush::Combined => core::mem::size_of::<PipeControl>(),
            CompletionFlush::Split => 2 * core::mem::size_of::<PipeControl>(),
        };
        len += 4;
        align_up(len as u64, 8)
    }

    /// Worst-case arena space one dispatch takes, alignment included
    pub fn requirements(&self, state: &EncoderState, dispatch: &TransferDispatch<'_>) -> ArenaRequirements {
        let layout = DispatchLayout::new(dispatch.kernel, dispatch.region);
        let mut heaps = [0; 4];
        heaps[HeapKind::DynamicState.index()] =
            InterfaceDescriptorData::SIZE as u64 + self.info.idd_start_alignment;
        heaps[HeapKind::IndirectObject.index()] =
            layout.indirect_data_length() as u64 + INDIRECT_DATA_ALIGNMENT;
        heaps[HeapKind::Instruction.index()] = dispatch.kernel.isa.len() as u64 + KERNEL_ALIGNMENT;
        heaps[HeapKind::SurfaceState.index()] = BINDING_TABLE_ENTRIES as u64
            * RenderSurfaceState::SIZE
            + RenderSurfaceState::ALIGNMENT
            + (BINDING_TABLE_ENTRIES * 4) as u64
            + 2 * BINDING_TABLE_ALIGNMENT;

        ArenaRequirements {
            commands: self.batch_len(state) + 8,
            heaps,
        }
    }

    /// Encode a staged transfer
    ///
    /// The arenas must already have room for [`CommandEncoder::requirements`].
    /// On error the caller rolls the arenas back and keeps `state`.
    pub fn encode(
        &self,
        state: &mut EncoderState,
        arenas: &mut ArenaSet,
        dispatch: &TransferDispatch<'_>,
    ) -> Result<EncodedBatch> {
        let kernel = dispatch.kernel;
        let layout = DispatchLayout::new(kernel, dispatch.region);

        // Everything fallible that touches no arena comes first
        let image_surface = image_surface_state(dispatch.image)?;
        let buffer_surface = RenderSurfaceState::raw_buffer(dispatch.staging_size, dispatch.staging_addr);
        let (src, dst) = match dispatch.direction {
            TransferDirection::Read => (image_surface, buffer_surface),
            TransferDirection::Write => (buffer_surface, image_surface),
        };

        // Instruction heap
        let ksp = arenas
            .heap_mut(HeapKind::Instruction)
            .push(&kernel.isa, KERNEL_ALIGNMENT)?;

        // Surface state heap
        let ssh = arenas.heap_mut(HeapKind::SurfaceState);
        let mut table = BindingTable::new();
        for surface in [src, dst] {
            let offset = ssh.push(surface.as_bytes(), RenderSurfaceState::ALIGNMENT)?;
            table.push(offset as u32);
        }
        if align_up(ssh.used(), BINDING_TABLE_ALIGNMENT) == ksp {
            ssh.reserve(BINDING_TABLE_ALIGNMENT, BINDING_TABLE_ALIGNMENT)?;
        }
        let bt_offset = ssh.push(bytemuck::cast_slice(table.as_slice()), BINDING_TABLE_ALIGNMENT)?;

        // Indirect object heap
        let indirect = indirect_data(dispatch, &layout);
        let ioh_offset = arenas
            .heap_mut(HeapKind::IndirectObject)
            .push(&indirect, INDIRECT_DATA_ALIGNMENT)?;

        // Dynamic state heap
        let mut idd = InterfaceDescriptorData::zeroed();
        idd.set_kernel_start(ksp);
        if !idd.set_binding_table(bt_offset as u32, table.len() as u32) {
            log::error!("binding table at ssh offset {:#x} is not addressable", bt_offset);
            return Err(Error::OutOfResources);
        }
        idd.set_indirect_read_length(layout.per_thread_bytes / GRF_SIZE);
        idd.set_threads_per_group(layout.threads_per_group);
        idd.set_cross_thread_read_length(layout.cross_thread_bytes / GRF_SIZE);
        let idd_offset = arenas
            .heap_mut(HeapKind::DynamicState)
            .push(idd.as_bytes(), self.info.idd_start_alignment)?;
        let idd_length = align_up(InterfaceDescriptorData::SIZE as u64, self.info.idd_length_alignment);

        // Commands
        let mut batch: Vec<u8> = Vec::with_capacity(self.batch_len(state) as usize);
        if !state.pipeline_selected {
            batch.extend_from_slice(PipelineSelect::gpgpu(self.traits.pipeline_select_mask).as_bytes());
        }
        batch.extend_from_slice(self.state_base_address(arenas).emitted_bytes());
        batch.extend_from_slice(
            MediaVfeState::new(
                self.info.hw_thread_count,
                self.traits.urb_entries,
                self.traits.urb_entry_allocation_size,
                0,
            )
            .as_bytes(),
        );
        batch.extend_from_slice(LoadRegisterImm::new(l3cntlreg::OFFSET, self.traits.l3_config).as_bytes());
        batch.extend_from_slice(
            MediaInterfaceDescriptorLoad::new(idd_length as u32, idd_offset as u32).as_bytes(),
        );

        let mut walker = GpgpuWalker::new();
        walker.set_indirect_data(indirect.len() as u32, ioh_offset as u32);
        walker.set_threads(layout.simd_width, layout.threads_per_group);
        walker.set_group_counts(layout.group_counts);
        walker.set_right_mask(layout.right_mask);
        batch.extend_from_slice(walker.as_bytes());

        self.completion_flush(&mut batch, dispatch.tag_address, dispatch.tag_value);

        batch.extend_from_slice(&MI_BATCH_BUFFER_END.to_le_bytes());
        while batch.len() % 8 != 0 {
            batch.extend_from_slice(&MI_NOOP.to_le_bytes());
        }

        #[cfg(all(feature = "validation", debug_assertions))]
        if let Err(e) = crate::parse::validate_batch(&batch) {
            panic!("encoded batch failed validation: {}", e);
        }

        let commands = arenas.commands_mut();
        let start = commands.push(&batch, 8)?;
        let end = start + batch.len() as u64;
        let gpu_addr = commands.gpu_base() + start;
        state.pipeline_selected = true;

        log::trace!(
            "encoded {:?} {} ({} bytes at {}), groups {:?}, tag {}",
            dispatch.direction,
            kernel.name,
            batch.len(),
            gpu_addr,
            layout.group_counts,
            dispatch.tag_value
        );

        Ok(EncodedBatch {
            start,
            end,
            gpu_addr,
        })
    }

    fn state_base_address(&self, arenas: &ArenaSet) -> StateBaseAddress {
        let page = self.info.page_size;
        let size_4k = |kind: HeapKind| -> u32 {
            ((arenas.heap(kind).pages_used(page) * page) >> 12) as u32
        };

        let mut sba = StateBaseAddress::new(self.traits.sba_dwords);
        sba.set_base(BaseSlot::GeneralState, GpuAddr::null());
        sba.set_size_pages(BaseSlot::GeneralState, StateBaseAddress::MAX_SIZE_PAGES);
        sba.set_base(BaseSlot::SurfaceState, arenas.heap(HeapKind::SurfaceState).gpu_base());
        sba.set_base(BaseSlot::DynamicState, arenas.heap(HeapKind::DynamicState).gpu_base());
        sba.set_size_pages(BaseSlot::DynamicState, size_4k(HeapKind::DynamicState));
        sba.set_base(BaseSlot::IndirectObject, arenas.heap(HeapKind::IndirectObject).gpu_base());
        sba.set_size_pages(BaseSlot::IndirectObject, size_4k(HeapKind::IndirectObject));
        sba.set_base(BaseSlot::Instruction, arenas.heap(HeapKind::Instruction).gpu_base());
        sba.set_size_pages(BaseSlot::Instruction, size_4k(HeapKind::Instruction));
        sba
    }

    fn completion_flush(&self, batch: &mut Vec<u8>, tag_address: GpuAddr, tag_value: u32) {
        let stall = PipeControlFlags::CS_STALL;
        match self.traits.completion_flush {
            CompletionFlush::Combined => {
                let pc = PipeControl::with_tag_write(stall | PipeControlFlags::DC_FLUSH, tag_address, tag_value);
                batch.extend_from_slice(pc.as_bytes());
            }
            CompletionFlush::Split => {
                let flush = PipeControl::new(stall | PipeControlFlags::DC_FLUSH);
                let tag = PipeControl::with_tag_write(stall, tag_address, tag_value);
                batch.extend_from_slice(flush.as_bytes());
                batch.extend_from_slice(tag.as_bytes());
            }
        }
    }
}

// =============================================================================
// HEAP CONTENTS
// =============================================================================

/// Typed linear surface for an image
///
/// 1D images bind as 2D surfaces of height 1. A 1D array binds as a 2D
/// surface with one row per layer, spaced by the slice pitch, so layers
/// need no QPitch.
pub fn image_surface_state(image: &Image) -> Result<RenderSurfaceState> {
    let desc = image.desc();
    let format = surface_format::uint_for_element_size(desc.element_size)
        .ok_or(ArgumentError::UnsupportedElementSize(desc.element_size))?;

    let (ty, array, height, depth) = match desc.image_type {
        ImageType::Image1D => (surface_type::SURFTYPE_2D, false, 1, 1),
        ImageType::Image1DArray => (surface_type::SURFTYPE_2D, false, desc.array_size, 1),
        ImageType::Image2D => (surface_type::SURFTYPE_2D, false, desc.height, 1),
        ImageType::Image2DArray => (surface_type::SURFTYPE_2D, true, desc.height, desc.array_size),
        ImageType::Image3D => (surface_type::SURFTYPE_3D, false, desc.height, desc.depth),
        ImageType::Image1DBuffer => return Err(ArgumentError::UnsupportedImageType.into()),
    };
    let pitch = match desc.image_type {
        ImageType::Image1DArray => desc.slice_pitch,
        _ => desc.row_pitch,
    };
    let qpitch_rows = if desc.has_hw_slices() { desc.slice_rows() } else { 0 };

    Ok(RenderSurfaceState::image(
        ty,
        format,
        array,
        desc.width as u32,
        height as u32,
        depth as u32,
        pitch as u32,
        qpitch_rows as u32,
        image.gpu_addr(),
    ))
}

/// Cross-thread arguments followed by per-thread local IDs
fn indirect_data(dispatch: &TransferDispatch<'_>, layout: &DispatchLayout) -> Vec<u8> {
    let region = dispatch.region;
    let origin = dispatch.origin;
    let element_size = dispatch.image.desc().element_size;
    let row_bytes = region.x as u32 * element_size;
    let lws = dispatch.kernel.local_work_size.map(|n| n.max(1));

    let args = CopyKernelArgs {
        image_origin: [origin.x as u32, origin.y as u32, origin.z as u32, 0],
        region: [region.x as u32, region.y as u32, region.z as u32, 0],
        buffer_pitch: [row_bytes, row_bytes * region.y as u32, element_size, 0],
        local_size: [lws[0], lws[1], lws[2], 0],
        group_count: [
            layout.group_counts[0],
            layout.group_counts[1],
            layout.group_counts[2],
            0,
        ],
    };

    let mut data = alloc::vec![0u8; layout.indirect_data_length() as usize];
    data[..core::mem::size_of::<CopyKernelArgs>()].copy_from_slice(bytemuck::bytes_of(&args));

    // Local IDs: per thread, one channel per axis of `simd` u16 lanes
    let simd = layout.simd_width as usize;
    let channel_bytes = align_up((simd * 2) as u64, GRF_SIZE as u64) as usize;
    let per_thread = layout.per_thread_bytes as usize;
    for thread in 0..layout.threads_per_group as usize {
        let base = layout.cross_thread_bytes as usize + thread * per_thread;
        for lane in 0..simd {
            let id = (thread * simd + lane) as u32;
            let ids = [id % lws[0], (id / lws[0]) % lws[1], id / (lws[0] * lws[1])];
            for (channel, value) in ids.into_iter().enumerate() {
                let at = channel * channel_bytes + lane * 2;
                if at + 2 <= per_thread {
                    data[base + at..base + at + 2].copy_from_slice(&(value as u16).to_le_bytes());
                }
            }
        }
    }
    data
}
