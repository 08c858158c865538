//! Mock collaborators for queue tests.
//!
//! The allocator hands out host memory whose device address equals its CPU
//! address, which lets the mock receiver follow the encoded state and carry
//! out the copy the kernel would perform.

use alloc::sync::Arc;
use alloc::vec::Vec;

use bytemuck::Pod;
use spin::Mutex;

use cobalt_cmd::commands::{surface_type, BaseSlot, InterfaceDescriptorData, RenderSurfaceState};
use cobalt_cmd::{parse, CopyKernelArgs};
use cobalt_core::{
    BackingAllocator, BatchBuffer, CommandStreamReceiver, DeviceInfo, Error, GpuAddr, Image,
    ImageDescriptor, ImageType, KernelInfo, KernelProvider, Result, TransferDirection,
    WaitResult, WaitTimeout,
};
pub(crate) use cobalt_mem::mock::MockAllocator;

use crate::config::QueueConfig;
use crate::device::Device;
use crate::queue::CommandQueue;

pub(crate) const TAG_ADDRESS: GpuAddr = GpuAddr::new(0xFEED_0000);

// =============================================================================
// COMMAND STREAM RECEIVER
// =============================================================================

/// How the mock receiver answers waits
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub(crate) enum Completion {
    /// Work completes when waited on
    #[default]
    OnWait,
    /// Work never completes
    Never,
    /// Waits report a lost device
    DeviceLost,
}

#[derive(Debug, Default)]
struct CsrState {
    latest_sent: u32,
    completed: u32,
    completion: Completion,
    emulate: bool,
    fail_submit: bool,
    batches: Vec<Vec<u8>>,
    waits: usize,
}

#[derive(Debug)]
pub(crate) struct MockCsr {
    info: DeviceInfo,
    state: Mutex<CsrState>,
}

impl MockCsr {
    pub(crate) fn new(info: DeviceInfo) -> Self {
        Self {
            info,
            state: Mutex::new(CsrState {
                emulate: true,
                ..CsrState::default()
            }),
        }
    }

    pub(crate) fn set_completion(&self, completion: Completion) {
        self.state.lock().completion = completion;
    }

    pub(crate) fn fail_next_submit(&self) {
        self.state.lock().fail_submit = true;
    }

    pub(crate) fn complete_all(&self) {
        let mut state = self.state.lock();
        state.completed = state.latest_sent;
    }

    pub(crate) fn batches(&self) -> Vec<Vec<u8>> {
        self.state.lock().batches.clone()
    }

    pub(crate) fn last_batch(&self) -> Option<Vec<u8>> {
        self.state.lock().batches.last().cloned()
    }

    pub(crate) fn submissions(&self) -> usize {
        self.state.lock().batches.len()
    }

    pub(crate) fn waits(&self) -> usize {
        self.state.lock().waits
    }
}

impl CommandStreamReceiver for MockCsr {
    fn device_info(&self) -> DeviceInfo {
        self.info
    }

    fn tag_address(&self) -> GpuAddr {
        TAG_ADDRESS
    }

    fn latest_sent_task_count(&self) -> u32 {
        self.state.lock().latest_sent
    }

    fn submit(&self, batch: BatchBuffer<'_>) -> Result<u32> {
        let mut state = self.state.lock();
        if core::mem::take(&mut state.fail_submit) {
            return Err(Error::DeviceLost);
        }

        let tag = parse(batch.commands)
            .unwrap()
            .iter()
            .filter_map(|c| c.as_pipe_control())
            .find(|pc| pc.writes_tag())
            .unwrap();
        assert_eq!(tag.address(), TAG_ADDRESS);
        assert_eq!(tag.immediate(), state.latest_sent + 1);

        if state.emulate {
            // SAFETY: every address in the batch is a live mock allocation
            unsafe { emulate_copy(batch.commands) };
        }
        state.latest_sent += 1;
        state.batches.push(batch.commands.to_vec());
        Ok(state.latest_sent)
    }

    fn completed_task_count(&self) -> u32 {
        self.state.lock().completed
    }

    fn wait_for_task_count(&self, target: u32, _timeout: WaitTimeout) -> WaitResult {
        let mut state = self.state.lock();
        state.waits += 1;
        if target <= state.completed {
            return WaitResult::Success;
        }
        match state.completion {
            Completion::OnWait => {
                state.completed = target.min(state.latest_sent);
                WaitResult::Success
            }
            Completion::Never => WaitResult::Timeout,
            Completion::DeviceLost => WaitResult::DeviceLost,
        }
    }
}

unsafe fn read<T: Pod>(addr: u64) -> T {
    // SAFETY: caller guarantees `addr` is readable
    unsafe { core::ptr::read_unaligned(addr as *const T) }
}

/// Perform the copy a batch dispatches
///
/// # Safety
/// Every base address and surface in the batch must point at live memory.
unsafe fn emulate_copy(batch: &[u8]) {
    let commands = parse(batch).unwrap();
    let sba = commands.iter().find_map(|c| c.as_state_base_address()).unwrap();
    let midl = commands.iter().find_map(|c| c.as_interface_descriptor_load()).unwrap();
    let walker = commands.iter().find_map(|c| c.as_gpgpu_walker()).unwrap();

    let dsh = sba.base(BaseSlot::DynamicState).raw();
    let ioh = sba.base(BaseSlot::IndirectObject).raw();
    let ssh = sba.base(BaseSlot::SurfaceState).raw();

    // SAFETY: forwarded to the caller
    unsafe {
        let idd: InterfaceDescriptorData = read(dsh + midl.start_offset() as u64);
        let args: CopyKernelArgs = read(ioh + walker.indirect_data_start() as u64);
        let bt = ssh + idd.binding_table_pointer() as u64;
        let src: RenderSurfaceState = read(ssh + read::<u32>(bt) as u64);
        let dst: RenderSurfaceState = read(ssh + read::<u32>(bt + 4) as u64);

        let (image, buffer, to_buffer) = if dst.surface_type() == surface_type::SURFTYPE_BUFFER {
            (src, dst, true)
        } else {
            (dst, src, false)
        };

        let [ox, oy, oz, _] = args.image_origin.map(u64::from);
        let [rx, ry, rz, _] = args.region.map(u64::from);
        let [row, slice, elem, _] = args.buffer_pitch.map(u64::from);
        let pitch = image.pitch() as u64;
        // Slices sit QPitch rows apart, not `height` rows
        let image_slice = if image.depth() > 1 {
            pitch * image.qpitch_rows() as u64
        } else {
            pitch * image.height() as u64
        };

        for z in 0..rz {
            for y in 0..ry {
                let img = image.base().raw() + (oz + z) * image_slice + (oy + y) * pitch + ox * elem;
                let buf = buffer.base().raw() + z * slice + y * row;
                let (from, to) = if to_buffer { (img, buf) } else { (buf, img) };
                core::ptr::copy_nonoverlapping(from as *const u8, to as *mut u8, (rx * elem) as usize);
            }
        }
    }
}

// =============================================================================
// KERNEL PROVIDER
// =============================================================================

#[derive(Debug)]
pub(crate) struct MockKernels {
    kernel: KernelInfo,
    supported: bool,
}

impl MockKernels {
    pub(crate) fn new() -> Self {
        Self::with_isa_size(512)
    }

    pub(crate) fn with_isa_size(size: usize) -> Self {
        Self {
            kernel: KernelInfo {
                name: "copy_image_buffer",
                simd_width: 32,
                local_work_size: [16, 4, 1],
                cross_thread_data_size: 96,
                per_thread_data_size: 192,
                isa: alloc::vec![0x5A; size],
            },
            supported: true,
        }
    }

    pub(crate) fn unsupported() -> Self {
        Self {
            supported: false,
            ..Self::new()
        }
    }
}

impl KernelProvider for MockKernels {
    fn copy_kernel(&self, _direction: TransferDirection, _image_type: ImageType) -> Option<&KernelInfo> {
        self.supported.then_some(&self.kernel)
    }
}

// =============================================================================
// HARNESS
// =============================================================================

pub(crate) struct Harness {
    pub(crate) csr: Arc<MockCsr>,
    pub(crate) alloc: Arc<MockAllocator>,
    pub(crate) device: Arc<Device>,
}

impl Harness {
    pub(crate) fn new(info: DeviceInfo) -> Self {
        Self::with_kernels(info, MockKernels::new())
    }

    pub(crate) fn with_kernels(info: DeviceInfo, kernels: MockKernels) -> Self {
        let csr = Arc::new(MockCsr::new(info));
        let alloc = Arc::new(MockAllocator::new());
        let device = Device::new(csr.clone(), alloc.clone(), Arc::new(kernels));
        Self { csr, alloc, device }
    }

    pub(crate) fn queue(&self) -> CommandQueue {
        self.queue_with(QueueConfig::default())
    }

    pub(crate) fn queue_with(&self, config: QueueConfig) -> CommandQueue {
        self.device.create_queue(config).unwrap()
    }

    pub(crate) fn image(&self, desc: ImageDescriptor) -> Image {
        let desc = desc.resolve().unwrap();
        let storage = self.alloc.allocate_linear(desc.size_bytes()).unwrap();
        Image::new(desc, storage).unwrap()
    }
}
