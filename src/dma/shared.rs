//! State shared by the submitting thread, the interrupt handler and the
//! DMA worker.
//!
//! [`DmaShared`] is meant to live in a `static` (or any `'static` location):
//! it owns the two descriptor tables, so their address never changes while
//! the controller knows about them.

use core::sync::atomic::{AtomicBool, AtomicU8, AtomicU32, AtomicUsize, Ordering};

use embedded_hal::delay::DelayNs;

use crate::config::{Direction, DmaConfig};
use crate::constants::{RESET_ID, WORK_QUEUE_DEPTH};
use crate::descriptor::DescriptorTable;
use crate::error::{ConfigError, Error, RequestError, Result};
use crate::queue::CircularQueue;
use crate::sync::{AtomicWaker, CriticalSectionCell};

/// A request to move bytes between a host buffer and device memory
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct TransferRequest {
    /// Transfer direction
    pub direction: Direction,
    /// Host virtual address of the buffer
    pub host_addr: usize,
    /// Device address
    pub device_addr: u64,
    /// Length in bytes
    pub len: usize,
}

impl TransferRequest {
    /// Read `len` bytes of device memory into the host buffer at `host_addr`
    pub const fn device_to_host(host_addr: usize, device_addr: u64, len: usize) -> Self {
        Self {
            direction: Direction::DeviceToHost,
            host_addr,
            device_addr,
            len,
        }
    }

    /// Write `len` bytes from the host buffer at `host_addr` to device memory
    pub const fn host_to_device(host_addr: usize, device_addr: u64, len: usize) -> Self {
        Self {
            direction: Direction::HostToDevice,
            host_addr,
            device_addr,
            len,
        }
    }
}

/// Deferred work for the DMA worker
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum WorkItem {
    /// Begin a new transfer
    Start(TransferRequest),
    /// The last batch finished; issue the next one
    Advance,
}

pub(crate) struct WorkQueue {
    items: CircularQueue<WorkItem, WORK_QUEUE_DEPTH>,
    advance_pending: bool,
}

impl WorkQueue {
    const fn new() -> Self {
        Self {
            items: CircularQueue::new(),
            advance_pending: false,
        }
    }
}

/// Engine state reachable from every context.
pub struct DmaShared {
    config: DmaConfig,
    queue: CriticalSectionCell<WorkQueue>,
    waker: AtomicWaker,
    idle: AtomicBool,
    finished: AtomicBool,
    direction: AtomicU8,
    issued: [AtomicU32; 2],
    payload: AtomicU32,
    locked_pages: AtomicUsize,
    tables: [DescriptorTable; 2],
}

impl DmaShared {
    /// Create idle shared state. Const-compatible.
    ///
    /// ```ignore
    /// static DMA: DmaShared = DmaShared::new(DmaConfig::new());
    /// ```
    pub const fn new(config: DmaConfig) -> Self {
        Self {
            queue: CriticalSectionCell::new(WorkQueue::new()),
            waker: AtomicWaker::new(),
            idle: AtomicBool::new(true),
            finished: AtomicBool::new(false),
            direction: AtomicU8::new(Direction::DeviceToHost.as_u8()),
            issued: [const { AtomicU32::new(RESET_ID) }; 2],
            payload: AtomicU32::new(config.dma_signal_payload),
            locked_pages: AtomicUsize::new(0),
            tables: [const { DescriptorTable::new() }; 2],
            config,
        }
    }

    /// Configuration the engine was created with
    pub fn config(&self) -> &DmaConfig {
        &self.config
    }

    /// Descriptor table for a direction
    pub fn table(&self, dir: Direction) -> &DescriptorTable {
        &self.tables[dir.as_u8() as usize]
    }

    // =========================================================================
    // Submission
    // =========================================================================

    /// Queue a transfer.
    ///
    /// Returns once the work is queued, not when it completes. Only one
    /// transfer may be in flight; a second submission before completion is
    /// rejected with [`RequestError::TransferInProgress`].
    pub fn submit(&self, request: TransferRequest) -> Result<()> {
        if self.finished.load(Ordering::Acquire) {
            return Err(ConfigError::Finished.into());
        }
        if !request.len.is_multiple_of(4) {
            return Err(RequestError::UnalignedLength.into());
        }
        if !request.host_addr.is_multiple_of(4) {
            return Err(RequestError::UnalignedAddress.into());
        }
        if self
            .idle
            .compare_exchange(true, false, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return Err(RequestError::TransferInProgress.into());
        }

        self.direction
            .store(request.direction.as_u8(), Ordering::Release);

        let queued = self.queue.with(|q| {
            if q.items.is_full() {
                return false;
            }
            q.items.push(WorkItem::Start(request));
            true
        });
        if !queued {
            self.idle.store(true, Ordering::Release);
            return Err(RequestError::QueueFull.into());
        }

        #[cfg(feature = "defmt")]
        defmt::info!(
            "queued {} transfer of {} bytes",
            request.direction,
            request.len
        );
        self.waker.wake();
        Ok(())
    }

    /// True when no transfer is in flight
    #[inline(always)]
    pub fn is_idle(&self) -> bool {
        self.idle.load(Ordering::Acquire)
    }

    /// Poll [`DmaShared::is_idle`] with the configured interval and limit
    pub fn wait_idle<D: DelayNs>(&self, delay: &mut D) -> Result<()> {
        for _ in 0..self.config.idle_poll_limit {
            if self.is_idle() {
                return Ok(());
            }
            delay.delay_ns(self.config.idle_poll_interval_ns);
        }
        if self.is_idle() {
            return Ok(());
        }
        #[cfg(feature = "defmt")]
        defmt::warn!("transfer did not complete within the poll limit");
        Err(Error::Timeout)
    }

    /// Direction of the current (or last) transfer
    pub fn direction(&self) -> Direction {
        Direction::from_u8(self.direction.load(Ordering::Acquire))
    }

    /// Change the payload sent with completion notifications
    pub fn set_signal_payload(&self, payload: u32) {
        self.payload.store(payload, Ordering::Release);
    }

    /// Payload sent with completion notifications
    pub fn signal_payload(&self) -> u32 {
        self.payload.load(Ordering::Acquire)
    }

    /// Host pages currently locked by the engine
    pub fn locked_pages(&self) -> usize {
        self.locked_pages.load(Ordering::Acquire)
    }

    /// True once the engine has been finished
    pub fn is_finished(&self) -> bool {
        self.finished.load(Ordering::Acquire)
    }

    // =========================================================================
    // Engine side
    // =========================================================================

    pub(crate) fn waker(&self) -> &AtomicWaker {
        &self.waker
    }

    pub(crate) fn locked_pages_counter(&self) -> &AtomicUsize {
        &self.locked_pages
    }

    pub(crate) fn issued(&self, dir: Direction) -> &AtomicU32 {
        &self.issued[dir.as_u8() as usize]
    }

    pub(crate) fn set_finished(&self) {
        self.finished.store(true, Ordering::Release);
    }

    /// True if the current direction's last issued id has its flag set
    pub(crate) fn dma_completed(&self) -> bool {
        let dir = self.direction();
        let issued = self.issued(dir).load(Ordering::Acquire);
        if issued == RESET_ID {
            return false;
        }
        self.table(dir).flag(issued as usize) != 0
    }

    pub(crate) fn pop_work(&self) -> Option<WorkItem> {
        self.queue.with(|q| q.items.pop())
    }

    #[cfg(any(test, feature = "async"))]
    pub(crate) fn has_work(&self) -> bool {
        self.queue.with_ref(|q| !q.items.is_empty())
    }

    /// Queue one advance. Returns false if one was already pending.
    pub(crate) fn queue_advance(&self) -> bool {
        self.queue.with(|q| {
            if q.advance_pending || q.items.is_full() {
                return false;
            }
            q.advance_pending = true;
            q.items.push(WorkItem::Advance);
            true
        })
    }

    /// Called by the worker after handling an advance.
    ///
    /// A completion that arrived while the advance was running was coalesced
    /// into it; if the newest batch is already flagged done, queue another.
    pub(crate) fn finish_advance(&self) {
        self.queue.with(|q| q.advance_pending = false);
        if !self.is_idle() && self.dma_completed() {
            self.queue_advance();
        }
    }

    pub(crate) fn clear_work(&self) {
        self.queue.with(|q| {
            q.items.clear();
            q.advance_pending = false;
        });
    }

    pub(crate) fn mark_idle(&self) {
        for issued in &self.issued {
            issued.store(RESET_ID, Ordering::Release);
        }
        self.idle.store(true, Ordering::Release);
    }
}
