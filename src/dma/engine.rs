//! Transfer state machine.
//!
//! [`DmaEngine`] is the single worker that drives a transfer: it pins host
//! memory window by window, carves batches of up to 128 descriptors out of
//! the active window, hands them to the controller and, when the interrupt
//! handler reports a batch done, issues the next one. When every byte has
//! been described and the last batch completes, all pinned memory is
//! released and the listener is notified.
//!
//! Everything that touches the window pipeline or the id trackers runs in
//! [`DmaEngine::service`]. Submission and completion only reach it through
//! the work queue in [`DmaShared`].

use alloc::vec::Vec;

use crate::config::{Direction, State};
use crate::constants::PAYLOAD_DMA_DONE;
use crate::descriptor::DescriptorEntry;
use crate::error::{ConfigError, ConfigResult, Error, ResourceError, Result};
use crate::pinning::{PageLocker, PinnedMemoryManager};
use crate::register::RegisterBlock;
use crate::register::dma::DmaRegs;

use super::dispatch::{CompletionNotifier, TransferOutcome};
use super::pipeline::{MemoryWindowPipeline, Window};
use super::ring::{BatchStart, RingBuilder, TableBus, plan_non_aligned};
use super::shared::{DmaShared, TransferRequest, WorkItem};

/// Progress of the transfer in flight
#[derive(Debug, Clone, Copy)]
struct TransferProgress {
    request: TransferRequest,
    sent: usize,
}

impl TransferProgress {
    const fn remaining(&self) -> usize {
        self.request.len - self.sent
    }
}

/// DMA worker for one device.
///
/// # Example
///
/// ```ignore
/// static DMA: DmaShared = DmaShared::new(DmaConfig::new());
///
/// let bus = TableBus::map(&DMA, |ptr| iommu.translate(ptr));
/// let mut engine = DmaEngine::new(&DMA, bar0, locker, listener, bus)?;
///
/// DMA.submit(TransferRequest::host_to_device(buf.as_ptr() as usize, 0, buf.len()))?;
/// engine.run().await;
/// ```
pub struct DmaEngine<'a, R, L, N> {
    shared: &'a DmaShared,
    ring: RingBuilder<R>,
    memory: PinnedMemoryManager<'a, L>,
    notifier: N,
    pipeline: MemoryWindowPipeline,
    transfer: Option<TransferProgress>,
    state: State,
}

impl<'a, R, L, N> DmaEngine<'a, R, L, N>
where
    R: RegisterBlock,
    L: PageLocker,
    N: CompletionNotifier,
{
    /// Create the worker.
    ///
    /// `bus` holds the bus addresses of the two tables inside `shared`.
    pub fn new(shared: &'a DmaShared, regs: R, locker: L, notifier: N, bus: TableBus) -> ConfigResult<Self> {
        let config = shared.config();
        config.validate()?;
        if shared.is_finished() {
            return Err(ConfigError::Finished);
        }

        #[cfg(feature = "defmt")]
        defmt::info!(
            "DMA engine up: {} pages per window, chunk ceiling {}",
            config.pipeline_pages,
            1u32 << config.non_aligned_log
        );

        Ok(Self {
            shared,
            ring: RingBuilder::new(regs, bus),
            memory: PinnedMemoryManager::new(locker, config.page_size, shared.locked_pages_counter()),
            notifier,
            pipeline: MemoryWindowPipeline::new(),
            transfer: None,
            state: State::Idle,
        })
    }

    // =========================================================================
    // Accessors
    // =========================================================================

    /// Current state
    pub fn state(&self) -> State {
        self.state
    }

    /// Shared state this engine serves
    pub fn shared(&self) -> &'a DmaShared {
        self.shared
    }

    /// Controller registers
    pub fn regs(&self) -> &DmaRegs<R> {
        self.ring.regs()
    }

    /// Page locker
    pub fn locker(&self) -> &L {
        self.memory.locker()
    }

    /// Completion listener
    pub fn notifier(&self) -> &N {
        &self.notifier
    }

    /// Last id handed to the controller for `dir`
    pub fn last_id(&self, dir: Direction) -> u32 {
        self.ring.last_id(dir)
    }

    /// Regions currently held by the window pipeline
    pub fn pinned_windows(&self) -> usize {
        self.pipeline.pinned_count()
    }

    /// Bytes described to the controller so far
    pub fn bytes_sent(&self) -> usize {
        self.transfer.map_or(0, |t| t.sent)
    }

    // =========================================================================
    // Worker
    // =========================================================================

    /// Drain the work queue. Returns the number of items handled.
    pub fn service(&mut self) -> usize {
        let mut handled = 0;
        while let Some(item) = self.shared.pop_work() {
            match item {
                WorkItem::Start(request) => self.start(request),
                WorkItem::Advance => {
                    self.advance();
                    self.shared.finish_advance();
                }
            }
            handled += 1;
        }
        handled
    }

    /// Run the worker until the engine is finished.
    #[cfg(feature = "async")]
    #[cfg_attr(docsrs, doc(cfg(feature = "async")))]
    pub async fn run(&mut self) {
        while !self.shared.is_finished() {
            crate::sync::asynch::WorkReady::new(self.shared).await;
            self.service();
        }
    }

    /// Abandon any transfer and reset to idle.
    ///
    /// Unpins every window and puts the id trackers back to the sentinel.
    /// The controller is not told; the next transfer resumes after the
    /// controller's last-id register.
    pub fn stop(&mut self) {
        #[cfg(feature = "defmt")]
        if self.transfer.is_some() {
            defmt::warn!("stopping with a transfer in flight");
        }
        self.pipeline.release_all(&self.memory);
        self.ring.reset_trackers();
        self.transfer = None;
        self.shared.clear_work();
        self.shared.mark_idle();
        if self.state != State::Finished {
            self.state = State::Idle;
        }
    }

    /// Stop and refuse all further submissions.
    pub fn finish(&mut self) {
        self.shared.set_finished();
        self.stop();
        self.state = State::Finished;
        #[cfg(feature = "defmt")]
        defmt::info!("DMA engine finished");
    }

    fn start(&mut self, request: TransferRequest) {
        let dir = request.direction;
        self.transfer = Some(TransferProgress { request, sent: 0 });
        self.state = State::Draining;

        let _hw_last = self.ring.resume_from_hardware(dir);
        #[cfg(feature = "defmt")]
        defmt::debug!("{} transfer of {} bytes, controller last id {}", dir, request.len, _hw_last);

        self.advance();
    }

    /// Issue the next batch, or complete when everything has been sent.
    fn advance(&mut self) {
        let Some(progress) = self.transfer else {
            return;
        };
        if progress.remaining() == 0 {
            self.complete();
            return;
        }
        if let Err(e) = self.issue_batch() {
            self.fail(e);
        }
    }

    fn issue_batch(&mut self) -> Result<()> {
        let Some(progress) = self.transfer else {
            return Ok(());
        };
        let config = *self.shared.config();
        let request = progress.request;
        let dir = request.direction;

        let start = self.ring.start_id(dir)?;
        let window = self.pipeline.current(&self.memory, |mm| {
            mm.pin(
                request.host_addr + progress.sent,
                progress.remaining().min(config.window_bytes()),
                dir,
            )
        })?;

        let device_addr = request.device_addr + progress.sent as u64;
        let entries = if window.page_offset(config.page_size) != 0 || window.bytes_left() < config.page_size {
            non_aligned_entries(window, dir, device_addr, start, config.page_size, config.non_aligned_log)?
        } else {
            full_page_entries(window, dir, device_addr, start, config.page_size)?
        };
        let bytes: usize = entries.iter().map(DescriptorEntry::len_bytes).sum();
        window.consume(bytes);
        let active_left = window.bytes_left();

        let shared = self.shared;
        self.ring
            .submit(dir, shared.table(dir), start, &entries, shared.issued(dir));

        let sent = progress.sent + bytes;
        self.transfer = Some(TransferProgress { request, sent });

        self.pipeline.release_done(&self.memory);
        self.pre_pin_next(request, sent + active_left, config.window_bytes());
        Ok(())
    }

    /// Pin the window after the active one if it is not pinned yet.
    ///
    /// Failure is not fatal: the window is pinned on demand at rotation.
    fn pre_pin_next(&mut self, request: TransferRequest, next: usize, window_bytes: usize) {
        if self.pipeline.has_pre_pinned() || next >= request.len {
            return;
        }
        let len = (request.len - next).min(window_bytes);
        match self.memory.pin(request.host_addr + next, len, request.direction) {
            Ok(region) => self.pipeline.pre_pin(region),
            Err(_e) => {
                #[cfg(feature = "defmt")]
                defmt::warn!("pre-pin of {} bytes failed: {}", len, _e);
            }
        }
    }

    fn complete(&mut self) {
        let bytes = self.transfer.map_or(0, |t| t.request.len);
        self.reset(State::Idle);

        #[cfg(feature = "defmt")]
        defmt::info!("transfer of {} bytes complete", bytes);
        self.notifier.notify(
            self.shared.signal_payload() | PAYLOAD_DMA_DONE,
            TransferOutcome::Completed { bytes },
        );
    }

    fn fail(&mut self, error: Error) {
        self.reset(State::Fault);

        #[cfg(feature = "defmt")]
        defmt::error!("transfer failed: {}", error);
        self.notifier.notify(
            self.shared.signal_payload() | PAYLOAD_DMA_DONE,
            TransferOutcome::Failed(error),
        );
    }

    fn reset(&mut self, state: State) {
        self.ring.reset_trackers();
        self.pipeline.release_all(&self.memory);
        self.transfer = None;
        self.state = state;
        self.shared.mark_idle();
    }
}

/// One descriptor per power-of-two chunk of the partial page at the cursor.
fn non_aligned_entries(
    window: &Window,
    dir: Direction,
    device_addr: u64,
    start: BatchStart,
    page_size: usize,
    max_log: u32,
) -> Result<Vec<DescriptorEntry>> {
    let in_page = page_size - window.page_offset(page_size);
    let slice = in_page.min(window.bytes_left());
    let chunks = plan_non_aligned(slice, start.capacity(), page_size, max_log)?;

    let mut entries = Vec::with_capacity(chunks.len());
    let mut offset = 0;
    for (id, len) in (start.id..).zip(chunks) {
        let host_bus = window.bus_addr(offset).ok_or(ResourceError::InvalidRange)?;
        entries.push(DescriptorEntry::for_transfer(
            dir,
            host_bus,
            device_addr + offset as u64,
            len,
            id,
        ));
        offset += len;
    }
    Ok(entries)
}

/// One descriptor per whole page, as many as the ring and window allow.
fn full_page_entries(
    window: &Window,
    dir: Direction,
    device_addr: u64,
    start: BatchStart,
    page_size: usize,
) -> Result<Vec<DescriptorEntry>> {
    let pages = (window.bytes_left() / page_size).min(start.capacity());

    let mut entries = Vec::with_capacity(pages);
    for (id, page) in (start.id..).zip(0..pages) {
        let offset = page * page_size;
        let host_bus = window.bus_addr(offset).ok_or(ResourceError::InvalidRange)?;
        entries.push(DescriptorEntry::for_transfer(
            dir,
            host_bus,
            device_addr + offset as u64,
            page_size,
            id,
        ));
    }
    Ok(entries)
}
