//! Memory window pipeline.
//!
//! A transfer is pinned one window at a time. While the controller works
//! through the active window, the next one is pinned ahead of time; the
//! previous window is released once the batch that drained it has been
//! followed by another batch. At most three windows (done, active and
//! pre-pinned) are held at once.

use crate::error::{ResourceError, ResourceResult};
use crate::pinning::{PageLocker, PinnedMemoryManager, PinnedRegion};

/// The window batches are currently carved from
#[derive(Debug)]
pub struct Window {
    region: PinnedRegion,
    cursor: usize,
}

impl Window {
    fn new(region: PinnedRegion) -> Self {
        Self { region, cursor: 0 }
    }

    /// Bytes consumed so far
    pub fn cursor(&self) -> usize {
        self.cursor
    }

    /// Bytes not yet described
    #[inline(always)]
    pub fn bytes_left(&self) -> usize {
        self.region.len() - self.cursor
    }

    /// Host address of the next byte to describe
    #[inline(always)]
    pub fn host_addr(&self) -> usize {
        self.region.host_addr() + self.cursor
    }

    /// Offset of the next byte inside its page
    #[inline(always)]
    pub fn page_offset(&self, page_size: usize) -> usize {
        self.host_addr() % page_size
    }

    /// Bus address `offset` bytes past the cursor
    #[inline(always)]
    pub fn bus_addr(&self, offset: usize) -> Option<u64> {
        self.region.bus_addr_at(self.cursor + offset)
    }

    /// Mark `bytes` as described
    #[inline(always)]
    pub fn consume(&mut self, bytes: usize) {
        self.cursor = (self.cursor + bytes).min(self.region.len());
    }
}

/// Done / active / pre-pinned window rotation.
#[derive(Debug, Default)]
pub struct MemoryWindowPipeline {
    active: Option<Window>,
    pre_pinned: Option<PinnedRegion>,
    done: Option<PinnedRegion>,
}

impl MemoryWindowPipeline {
    /// Create an empty pipeline
    pub const fn new() -> Self {
        Self {
            active: None,
            pre_pinned: None,
            done: None,
        }
    }

    /// Number of regions currently pinned
    pub fn pinned_count(&self) -> usize {
        usize::from(self.active.is_some())
            + usize::from(self.pre_pinned.is_some())
            + usize::from(self.done.is_some())
    }

    /// The active window, if any
    pub fn active(&self) -> Option<&Window> {
        self.active.as_ref()
    }

    /// True if a window is waiting behind the active one
    pub fn has_pre_pinned(&self) -> bool {
        self.pre_pinned.is_some()
    }

    /// Return a window with bytes left, rotating if the active one is drained.
    ///
    /// Rotation releases the done region, retires the active region to done
    /// and promotes the pre-pinned region, or pins a new one with `fresh`
    /// when nothing was pinned ahead.
    pub fn current<L, F>(
        &mut self,
        memory: &PinnedMemoryManager<'_, L>,
        fresh: F,
    ) -> ResourceResult<&mut Window>
    where
        L: PageLocker,
        F: FnOnce(&PinnedMemoryManager<'_, L>) -> ResourceResult<PinnedRegion>,
    {
        let drained = self.active.as_ref().is_none_or(|w| w.bytes_left() == 0);
        if drained {
            self.rotate(memory, fresh)?;
        }
        self.active.as_mut().ok_or(ResourceError::InvalidRange)
    }

    fn rotate<L, F>(&mut self, memory: &PinnedMemoryManager<'_, L>, fresh: F) -> ResourceResult<()>
    where
        L: PageLocker,
        F: FnOnce(&PinnedMemoryManager<'_, L>) -> ResourceResult<PinnedRegion>,
    {
        self.release_done(memory);
        self.done = self.active.take().map(|w| w.region);

        let region = match self.pre_pinned.take() {
            Some(region) => region,
            None => fresh(memory)?,
        };
        self.active = Some(Window::new(region));
        Ok(())
    }

    /// Pin the region the transfer continues with after the active window
    pub fn pre_pin(&mut self, region: PinnedRegion) {
        debug_assert!(self.pre_pinned.is_none());
        self.pre_pinned = Some(region);
    }

    /// Release the window retired by the last rotation
    pub fn release_done<L: PageLocker>(&mut self, memory: &PinnedMemoryManager<'_, L>) {
        if let Some(mut region) = self.done.take() {
            memory.unpin(&mut region);
        }
    }

    /// Release every held region
    pub fn release_all<L: PageLocker>(&mut self, memory: &PinnedMemoryManager<'_, L>) {
        self.release_done(memory);
        if let Some(mut window) = self.active.take() {
            memory.unpin(&mut window.region);
        }
        if let Some(mut region) = self.pre_pinned.take() {
            memory.unpin(&mut region);
        }
    }
}
