//! # Command Queue
//!
//! Image transfer enqueue.
//!
//! ## Enqueue Flow
//!
//! ```text
//! validate ──▶ classify ─┬─ NoOp / ZeroCopy ──────────────────────────┐
//!                        │                                            │
//!                        └─ Staged(size)                              ▼
//!                             reclaim, acquire staging        clock.advance_on_enqueue
//!                             pack host data (writes)                 │
//!                             ┌─ submission lock ───────────┐         ▼
//!                             │ prepare / commit arenas     │   blocking? wait, sync,
//!                             │ encode, submit              │   reclaim
//!                             └─────────────────────────────┘
//! ```
//!
//! Every error before the receiver accepts the batch leaves the clock, the
//! arena high-water marks and the encoder state as they were.

use alloc::sync::Arc;
use core::mem::ManuallyDrop;

use spin::Mutex;

use cobalt_cmd::{EncoderState, TransferDispatch};
use cobalt_core::{
    classify, validate_transfer, ArgumentError, BatchBuffer, Classification, Dim3, Error,
    HostLayout, Image, ImageDescriptor, ImageType, Result, TransferDirection, WaitResult,
};
use cobalt_mem::{ArenaSet, HeapKind, PitchedRegion};

use crate::clock::TaskClock;
use crate::config::{QueueConfig, QueueOrdering};
use crate::device::Device;
use crate::event::{CommandType, Event};

// =============================================================================
// TRANSFER REQUEST
// =============================================================================

/// Host side of an image transfer
#[derive(Debug, Clone, Copy)]
pub struct TransferRequest<'a> {
    /// First pixel in the image
    pub origin: Dim3,
    /// Region extent
    pub region: Dim3,
    /// Host pointer and pitches
    pub host: HostLayout,
    /// Wait for completion before returning
    pub blocking: bool,
    /// Events the transfer is ordered after
    pub wait_list: &'a [Event],
    /// Return an event for the transfer
    pub want_event: bool,
}

impl<'a> TransferRequest<'a> {
    /// Non-blocking request with no wait list that returns an event
    pub const fn new(origin: Dim3, region: Dim3, host: HostLayout) -> Self {
        Self {
            origin,
            region,
            host,
            blocking: false,
            wait_list: &[],
            want_event: true,
        }
    }

    /// Set the blocking flag
    pub const fn blocking(mut self, blocking: bool) -> Self {
        self.blocking = blocking;
        self
    }

    /// Order the transfer after `wait_list`
    pub const fn wait_for(mut self, wait_list: &'a [Event]) -> Self {
        self.wait_list = wait_list;
        self
    }

    /// Request or suppress the returned event
    pub const fn with_event(mut self, want_event: bool) -> Self {
        self.want_event = want_event;
        self
    }
}

// =============================================================================
// COMMAND QUEUE
// =============================================================================

#[derive(Debug)]
struct QueueInner {
    clock: TaskClock,
    encoder_state: EncoderState,
    arenas: ManuallyDrop<ArenaSet>,
}

/// A command queue on a [`Device`]
#[derive(Debug)]
pub struct CommandQueue {
    id: u32,
    device: Arc<Device>,
    config: QueueConfig,
    inner: Mutex<QueueInner>,
}

impl CommandQueue {
    pub(crate) fn new(id: u32, device: Arc<Device>, config: QueueConfig) -> Result<Self> {
        let arenas = ArenaSet::new(device.allocator(), &config.arenas)?;
        log::debug!("queue {}: created ({:?})", id, config.ordering);
        Ok(Self {
            id,
            device,
            config,
            inner: Mutex::new(QueueInner {
                clock: TaskClock::new(),
                encoder_state: EncoderState::new(),
                arenas: ManuallyDrop::new(arenas),
            }),
        })
    }

    /// Queue id, unique per device
    #[inline]
    pub fn id(&self) -> u32 {
        self.id
    }

    /// Owning device
    #[inline]
    pub fn device(&self) -> &Arc<Device> {
        &self.device
    }

    /// Configuration the queue was created with
    #[inline]
    pub fn config(&self) -> &QueueConfig {
        &self.config
    }

    /// Check if the queue executes in enqueue order
    pub fn is_in_order(&self) -> bool {
        self.config.ordering == QueueOrdering::InOrder
    }

    /// Current task level
    pub fn task_level(&self) -> u32 {
        self.inner.lock().clock.task_level()
    }

    /// Current task count
    pub fn task_count(&self) -> u32 {
        self.inner.lock().clock.task_count()
    }

    /// Bytes used in the command stream
    pub fn command_stream_used(&self) -> u64 {
        self.inner.lock().arenas.commands().used()
    }

    /// Bytes used in one indirect heap
    pub fn heap_used(&self, kind: HeapKind) -> u64 {
        self.inner.lock().arenas.heap(kind).used()
    }

    /// Run `f` over the queue's arenas, with the queue locked
    pub fn with_arenas<R>(&self, f: impl FnOnce(&ArenaSet) -> R) -> R {
        f(&*self.inner.lock().arenas)
    }

    /// Read from an image into host memory
    ///
    /// # Safety
    /// See [`CommandQueue::enqueue_transfer`].
    pub unsafe fn enqueue_read_image(
        &self,
        image: &Image,
        request: &TransferRequest<'_>,
    ) -> Result<Option<Event>> {
        // SAFETY: forwarded to the caller
        unsafe { self.enqueue_transfer(image, TransferDirection::Read, request) }
    }

    /// Write host memory into an image
    ///
    /// # Safety
    /// See [`CommandQueue::enqueue_transfer`].
    pub unsafe fn enqueue_write_image(
        &self,
        image: &Image,
        request: &TransferRequest<'_>,
    ) -> Result<Option<Event>> {
        // SAFETY: forwarded to the caller
        unsafe { self.enqueue_transfer(image, TransferDirection::Write, request) }
    }

    /// Transfer between an image and host memory
    ///
    /// Host data for a staged read lands during the reclamation sweep that
    /// follows completion: before a blocking call returns, or on a later
    /// enqueue, [`CommandQueue::finish`] or [`Device::reclaim`].
    ///
    /// # Safety
    /// The host region described by `request.host` must be readable for a
    /// write. For a read it must stay writable until the transfer's staging
    /// allocation is reclaimed.
    pub unsafe fn enqueue_transfer(
        &self,
        image: &Image,
        direction: TransferDirection,
        request: &TransferRequest<'_>,
    ) -> Result<Option<Event>> {
        let desc = image.desc();
        validate_transfer(desc, request.origin, request.region, &request.host)?;
        let classification = classify(desc, image.cpu_addr(), request.origin, request.region, &request.host);
        let wait_level = request.wait_list.iter().map(Event::task_level).max();
        let command_type = CommandType::from(direction);

        let mut inner = self.inner.lock();
        let submitted = match classification {
            Classification::Staged { size } => {
                // SAFETY: forwarded to the caller
                Some(unsafe { self.submit_staged(&mut inner, image, direction, request, size) }?)
            }
            Classification::NoOp | Classification::ZeroCopy => None,
        };
        let task_level = inner.clock.advance_on_enqueue(wait_level, submitted);
        let task_count = inner.clock.task_count();
        drop(inner);

        log::trace!(
            "queue {}: {:?} {:?} at level {}",
            self.id,
            command_type,
            classification,
            task_level
        );

        if let (Some(task_count), true) = (submitted, request.blocking) {
            self.wait_for(task_count)?;
        }

        Ok(request
            .want_event
            .then(|| Event::new(self.id, command_type, task_level, task_count)))
    }

    /// Wait for everything submitted on this queue
    pub fn finish(&self) -> Result<()> {
        let task_count = self.inner.lock().clock.task_count();
        self.wait_for(task_count)
    }

    fn wait_for(&self, task_count: u32) -> Result<()> {
        let csr = self.device.csr();
        match csr.wait_for_task_count(task_count, self.config.wait_timeout) {
            WaitResult::Success => {}
            WaitResult::Timeout => {
                log::warn!("queue {}: wait for task {} timed out", self.id, task_count);
                return Err(Error::HardwareTimeout);
            }
            WaitResult::DeviceLost => {
                log::error!("queue {}: device lost waiting for task {}", self.id, task_count);
                return Err(Error::HardwareTimeout);
            }
        }

        self.inner.lock().clock.sync_on_wait(csr.completed_task_count());
        self.device.reclaim();
        Ok(())
    }

    /// Stage, encode and submit; returns the submission's task count
    ///
    /// # Safety
    /// See [`CommandQueue::enqueue_transfer`].
    unsafe fn submit_staged(
        &self,
        inner: &mut QueueInner,
        image: &Image,
        direction: TransferDirection,
        request: &TransferRequest<'_>,
        size: u64,
    ) -> Result<u32> {
        let device = &*self.device;
        let allocator = device.allocator();
        let csr = device.csr();
        let desc = image.desc();

        let kernel = device
            .kernels()
            .copy_kernel(direction, desc.image_type)
            .ok_or(Error::InvalidArgument(ArgumentError::UnsupportedImageType))?;
        let host = host_region(desc, request.region, &request.host);

        let mut staging = {
            let mut manager = device.staging();
            manager.reclaim(allocator, csr.completed_task_count());
            manager.acquire(allocator, size)?
        };
        match direction {
            // SAFETY: the caller guarantees the host region is readable
            TransferDirection::Write => unsafe { staging.pack_from(&host) },
            // SAFETY: the caller keeps the host region writable until reclaim
            TransferDirection::Read => unsafe { staging.set_writeback(host) },
        }

        let _submission = device.lock_submission();
        let dispatch = TransferDispatch {
            direction,
            image,
            origin: request.origin,
            region: request.region,
            staging_addr: staging.gpu_addr(),
            staging_size: size,
            kernel,
            tag_address: csr.tag_address(),
            tag_value: csr.latest_sent_task_count().wrapping_add(1),
        };

        let encoder = device.encoder();
        let requirements = encoder.requirements(&inner.encoder_state, &dispatch);
        let growth = match inner.arenas.prepare(allocator, &requirements) {
            Ok(growth) => growth,
            Err(e) => {
                log::warn!("queue {}: arena growth failed: {}", self.id, e);
                device.staging().abandon(allocator, staging);
                return Err(e);
            }
        };
        if !growth.is_empty() {
            let retirement = csr.latest_sent_task_count();
            let retired = inner.arenas.commit(growth);
            let mut manager = device.staging();
            for allocation in retired {
                manager.retire_arena(allocation, retirement);
            }
        }

        let marks = inner.arenas.marks();
        let encoder_state = inner.encoder_state;
        match self.encode_and_submit(inner, &dispatch) {
            Ok(task_count) => {
                device.staging().release(staging, task_count);
                Ok(task_count)
            }
            Err(e) => {
                log::warn!("queue {}: {:?} not submitted: {}", self.id, direction, e);
                inner.arenas.rollback(marks);
                inner.encoder_state = encoder_state;
                device.staging().abandon(allocator, staging);
                Err(e)
            }
        }
    }

    fn encode_and_submit(&self, inner: &mut QueueInner, dispatch: &TransferDispatch<'_>) -> Result<u32> {
        let batch = self
            .device
            .encoder()
            .encode(&mut inner.encoder_state, &mut inner.arenas, dispatch)?;
        let commands = inner.arenas.commands().bytes(batch.start, batch.end);
        let task_count = self.device.csr().submit(BatchBuffer {
            gpu_addr: batch.gpu_addr,
            commands,
        })?;

        if task_count != dispatch.tag_value {
            log::warn!(
                "queue {}: receiver assigned task {} but the tag writes {}",
                self.id,
                task_count,
                dispatch.tag_value
            );
        }
        log::debug!(
            "queue {}: submitted {} bytes at {} as task {}",
            self.id,
            commands.len(),
            batch.gpu_addr,
            task_count
        );
        Ok(task_count)
    }
}

impl Drop for CommandQueue {
    fn drop(&mut self) {
        let inner = self.inner.get_mut();
        let retirement = inner.clock.task_count();
        // SAFETY: the arenas are not touched again after this
        let arenas = unsafe { ManuallyDrop::take(&mut inner.arenas) };

        let mut staging = self.device.staging();
        for allocation in arenas.into_allocations() {
            staging.retire_arena(allocation, retirement);
        }
        log::debug!("queue {}: destroyed at task {}", self.id, retirement);
    }
}

/// Pitched host region matching the compacted staging layout
fn host_region(desc: &ImageDescriptor, region: Dim3, host: &HostLayout) -> PitchedRegion {
    // Each array layer of a 1D array is one host slice of a single row
    let (rows, slices) = match desc.image_type {
        ImageType::Image1DArray => (1, region.y),
        _ => (region.y, region.z),
    };
    PitchedRegion {
        ptr: host.ptr,
        row_bytes: region.x * desc.element_size as usize,
        rows,
        slices,
        row_pitch: host.resolved_row_pitch(desc, region),
        slice_pitch: host.resolved_slice_pitch(desc, region),
    }
}
