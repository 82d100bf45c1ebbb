//! Host page pinning
//!
//! The engine never touches the OS page tables directly. It asks a
//! [`PageLocker`] to lock a page range and hand back the bus address of every
//! page, and gives the pages back once the controller is done with them.
//!
//! [`PinnedMemoryManager`] wraps a locker with the bookkeeping the engine
//! needs: page-range arithmetic, unwinding partial locks, dirtying pages the
//! device wrote, and the shared locked-page counter.

use alloc::vec::Vec;
use core::sync::atomic::{AtomicUsize, Ordering};

use crate::config::Direction;
use crate::error::{ResourceError, ResourceResult};

/// One locked host page
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct PinnedPage {
    /// Page-aligned host address
    pub host_addr: usize,
    /// Address the controller uses to reach the page
    pub bus_addr: u64,
}

/// Pages returned by a [`PageLocker`], in address order
pub type PinnedPages = Vec<PinnedPage>;

/// A run of whole pages to lock
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct PageRange {
    /// Page-aligned host address of the first page
    pub base: usize,
    /// Number of pages
    pub pages: usize,
    /// Page size in bytes
    pub page_size: usize,
}

impl PageRange {
    /// Page-aligned host addresses in the range
    pub fn page_addrs(&self) -> impl Iterator<Item = usize> + '_ {
        (0..self.pages).map(move |i| self.base + i * self.page_size)
    }
}

/// OS page-locking capability.
///
/// `lock` may lock fewer pages than requested (for example when part of the
/// range is unmapped); it returns exactly the pages it locked, in order.
/// Implementations may block and must never be called from interrupt context.
pub trait PageLocker {
    /// Lock the pages of `range`; `writable` is set when the device will
    /// write into them
    fn lock(&self, range: PageRange, writable: bool) -> PinnedPages;

    /// Release pages obtained from [`PageLocker::lock`], marking them dirty
    /// first when `dirty` is set
    fn unlock(&self, pages: PinnedPages, dirty: bool);
}

impl<L: PageLocker + ?Sized> PageLocker for &L {
    fn lock(&self, range: PageRange, writable: bool) -> PinnedPages {
        (**self).lock(range, writable)
    }

    fn unlock(&self, pages: PinnedPages, dirty: bool) {
        (**self).unlock(pages, dirty);
    }
}

/// Number of pages touched by `[addr, addr + len)`
#[inline]
pub const fn page_count(addr: usize, len: usize, page_size: usize) -> usize {
    if len == 0 {
        return 0;
    }
    (addr + len).div_ceil(page_size) - addr / page_size
}

// =============================================================================
// Pinned Region
// =============================================================================

/// A pinned host address range
#[derive(Debug)]
pub struct PinnedRegion {
    host_addr: usize,
    len: usize,
    direction: Direction,
    page_size: usize,
    pages: PinnedPages,
    valid: bool,
}

impl PinnedRegion {
    /// False once the region has been unpinned
    #[inline(always)]
    pub fn is_valid(&self) -> bool {
        self.valid
    }

    /// Host start address
    pub fn host_addr(&self) -> usize {
        self.host_addr
    }

    /// Length in bytes
    pub fn len(&self) -> usize {
        self.len
    }

    /// True for an empty region
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Transfer direction the region was pinned for
    pub fn direction(&self) -> Direction {
        self.direction
    }

    /// Number of pinned pages (0 once invalid)
    pub fn page_count(&self) -> usize {
        self.pages.len()
    }

    /// Pinned pages (empty once invalid)
    pub fn pages(&self) -> &[PinnedPage] {
        &self.pages
    }

    /// Byte offset of the start inside the first page
    pub fn first_page_offset(&self) -> usize {
        self.host_addr % self.page_size
    }

    /// Bytes used in the last page when it is partial, else 0
    pub fn last_page_offset(&self) -> usize {
        (self.host_addr + self.len) % self.page_size
    }

    /// Bus address of the byte `offset` bytes into the region.
    ///
    /// Returns `None` for an invalid region or an offset past the end.
    pub fn bus_addr_at(&self, offset: usize) -> Option<u64> {
        if !self.valid || offset >= self.len {
            return None;
        }
        let abs = self.first_page_offset() + offset;
        let page = self.pages.get(abs / self.page_size)?;
        Some(page.bus_addr + (abs % self.page_size) as u64)
    }
}

// =============================================================================
// Pinned Memory Manager
// =============================================================================

/// Pins and unpins host ranges through a [`PageLocker`].
///
/// Holds no per-region state; the caller owns every [`PinnedRegion`].
pub struct PinnedMemoryManager<'a, L> {
    locker: L,
    page_size: usize,
    locked_pages: &'a AtomicUsize,
}

impl<'a, L: PageLocker> PinnedMemoryManager<'a, L> {
    /// Create a manager that accounts locked pages in `locked_pages`
    pub fn new(locker: L, page_size: usize, locked_pages: &'a AtomicUsize) -> Self {
        Self {
            locker,
            page_size,
            locked_pages,
        }
    }

    /// Borrow the page locker
    pub fn locker(&self) -> &L {
        &self.locker
    }

    /// Pin `[addr, addr + len)`.
    ///
    /// Locks every page the range touches. If the locker comes back short,
    /// the pages it did lock are released again and nothing is accounted.
    pub fn pin(&self, addr: usize, len: usize, direction: Direction) -> ResourceResult<PinnedRegion> {
        if len == 0 || addr.checked_add(len).is_none() {
            return Err(ResourceError::InvalidRange);
        }

        let count = page_count(addr, len, self.page_size);
        let range = PageRange {
            base: addr - addr % self.page_size,
            pages: count,
            page_size: self.page_size,
        };
        let pages = self.locker.lock(range, direction.writes_host());

        if pages.len() < count {
            let locked = pages.len();
            self.locker.unlock(pages, false);
            #[cfg(feature = "defmt")]
            defmt::warn!("pinned {} of {} pages, unwinding", locked, count);
            return Err(ResourceError::PartialLock {
                requested: count,
                locked,
            });
        }

        self.locked_pages.fetch_add(count, Ordering::AcqRel);
        #[cfg(feature = "defmt")]
        defmt::debug!("pinned {} bytes over {} pages", len, count);

        Ok(PinnedRegion {
            host_addr: addr,
            len,
            direction,
            page_size: self.page_size,
            pages,
            valid: true,
        })
    }

    /// Release a region. No-op if it is already invalid.
    pub fn unpin(&self, region: &mut PinnedRegion) {
        if !region.valid {
            return;
        }
        region.valid = false;

        let pages = core::mem::take(&mut region.pages);
        let count = pages.len();
        self.locker.unlock(pages, region.direction.writes_host());
        self.locked_pages.fetch_sub(count, Ordering::AcqRel);
    }
}
