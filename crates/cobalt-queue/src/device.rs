//! # Device
//!
//! Device-wide state shared by every queue: the external collaborators,
//! the encoder resolved for the device's generation, the staging manager
//! and the submission lock.
//!
//! Lock order is queue, then submission, then staging.

use alloc::sync::Arc;
use core::fmt;
use core::sync::atomic::{AtomicU32, Ordering};

use spin::{Mutex, MutexGuard};

use cobalt_cmd::CommandEncoder;
use cobalt_core::{BackingAllocator, CommandStreamReceiver, DeviceInfo, KernelProvider, Result};
use cobalt_mem::{StagingAllocationManager, StagingStats};

use crate::config::QueueConfig;
use crate::queue::CommandQueue;

/// A device and its shared transfer state
pub struct Device {
    info: DeviceInfo,
    encoder: CommandEncoder,
    csr: Arc<dyn CommandStreamReceiver>,
    allocator: Arc<dyn BackingAllocator>,
    kernels: Arc<dyn KernelProvider>,
    staging: Mutex<StagingAllocationManager>,
    submission: Mutex<()>,
    next_queue_id: AtomicU32,
}

impl Device {
    /// Create a device over its receiver, allocator and kernel source
    pub fn new(
        csr: Arc<dyn CommandStreamReceiver>,
        allocator: Arc<dyn BackingAllocator>,
        kernels: Arc<dyn KernelProvider>,
    ) -> Arc<Self> {
        let info = csr.device_info();
        log::debug!(
            "cobalt device: {:?}, {} hw threads",
            info.generation,
            info.hw_thread_count
        );
        Arc::new(Self {
            info,
            encoder: CommandEncoder::new(info),
            csr,
            allocator,
            kernels,
            staging: Mutex::new(StagingAllocationManager::new()),
            submission: Mutex::new(()),
            next_queue_id: AtomicU32::new(1),
        })
    }

    /// Create a queue on this device
    pub fn create_queue(self: &Arc<Self>, config: QueueConfig) -> Result<CommandQueue> {
        let id = self.next_queue_id.fetch_add(1, Ordering::Relaxed);
        CommandQueue::new(id, Arc::clone(self), config)
    }

    /// Capability values
    #[inline]
    pub fn info(&self) -> &DeviceInfo {
        &self.info
    }

    /// Encoder for this device's generation
    #[inline]
    pub fn encoder(&self) -> &CommandEncoder {
        &self.encoder
    }

    /// Command stream receiver
    #[inline]
    pub fn csr(&self) -> &dyn CommandStreamReceiver {
        &*self.csr
    }

    /// Backing allocator
    #[inline]
    pub fn allocator(&self) -> &dyn BackingAllocator {
        &*self.allocator
    }

    /// Copy kernel source
    #[inline]
    pub fn kernels(&self) -> &dyn KernelProvider {
        &*self.kernels
    }

    /// Lock the staging manager
    pub fn staging(&self) -> MutexGuard<'_, StagingAllocationManager> {
        self.staging.lock()
    }

    pub(crate) fn lock_submission(&self) -> MutexGuard<'_, ()> {
        self.submission.lock()
    }

    /// Free every staging allocation the receiver has retired
    pub fn reclaim(&self) -> usize {
        let completed = self.csr.completed_task_count();
        self.staging.lock().reclaim(&*self.allocator, completed)
    }

    /// Staging manager statistics
    pub fn staging_stats(&self) -> StagingStats {
        self.staging.lock().stats().clone()
    }
}

impl fmt::Debug for Device {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Device")
            .field("info", &self.info)
            .field("latest_sent", &self.csr.latest_sent_task_count())
            .field("completed", &self.csr.completed_task_count())
            .field("staging", &self.staging.try_lock().map(|s| s.stats().clone()))
            .finish_non_exhaustive()
    }
}
