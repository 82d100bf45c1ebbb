//! Testing utilities and mock implementations
//!
//! This module provides mock implementations for testing the DMA engine
//! on the host without hardware access.
//!
//! Only available when running `cargo test`.

// Note: The #[cfg(test)] attribute is applied in lib.rs where this module is declared
#![allow(missing_docs)]
#![allow(clippy::std_instead_of_core, clippy::std_instead_of_alloc)]

extern crate std;

use core::cell::{Cell, RefCell};
use core::task::{RawWaker, RawWakerVTable, Waker};
use std::boxed::Box;
use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::vec;
use std::vec::Vec;

use embedded_hal::delay::DelayNs;

use crate::config::Direction;
use crate::constants::{MAX_DESC_ID, RESET_ID};
use crate::descriptor::DescriptorEntry;
use crate::dma::{CompletionNotifier, DmaShared, TransferOutcome};
use crate::pinning::{PageLocker, PageRange, PinnedPage, PinnedPages};
use crate::register::RegisterBlock;
use crate::register::dma::{LAST_PTR_OFFSET, TABLE_SIZE_OFFSET, side_offset};

const PAGE: usize = 4096;

// =============================================================================
// Mock Registers
// =============================================================================

/// Mock register file for testing without hardware
///
/// Both last-id registers start at the reset sentinel, like the controller
/// after reset. Every write is logged.
///
/// # Example
///
/// ```ignore
/// let mock = MockRegisters::new();
/// let regs = DmaRegs::new(&mock);
/// regs.set_last_ptr(Direction::HostToDevice, 3);
/// assert_eq!(mock.get(0x10), 3);
/// ```
#[derive(Debug)]
pub struct MockRegisters {
    /// Register values by offset
    values: RefCell<HashMap<usize, u32>>,
    /// Record of writes: (offset, value)
    write_log: RefCell<Vec<(usize, u32)>>,
}

impl Default for MockRegisters {
    fn default() -> Self {
        Self::new()
    }
}

impl MockRegisters {
    pub fn new() -> Self {
        let mut values = HashMap::new();
        values.insert(side_offset(Direction::HostToDevice, LAST_PTR_OFFSET), RESET_ID);
        values.insert(side_offset(Direction::DeviceToHost, LAST_PTR_OFFSET), RESET_ID);
        Self {
            values: RefCell::new(values),
            write_log: RefCell::new(Vec::new()),
        }
    }

    /// Current value of a register (0 if never written)
    pub fn get(&self, offset: usize) -> u32 {
        self.values.borrow().get(&offset).copied().unwrap_or(0)
    }

    /// Preset a register without logging a write
    pub fn set(&self, offset: usize, value: u32) {
        self.values.borrow_mut().insert(offset, value);
    }

    /// All writes in order
    pub fn writes(&self) -> Vec<(usize, u32)> {
        self.write_log.borrow().clone()
    }

    /// Number of logged writes to `offset`
    pub fn writes_to(&self, offset: usize) -> usize {
        self.write_log
            .borrow()
            .iter()
            .filter(|(o, _)| *o == offset)
            .count()
    }

    /// Clear the write log
    pub fn clear_writes(&self) {
        self.write_log.borrow_mut().clear();
    }
}

impl RegisterBlock for MockRegisters {
    fn read32(&self, offset: usize) -> u32 {
        self.get(offset)
    }

    fn write32(&self, offset: usize, value: u32) {
        self.values.borrow_mut().insert(offset, value);
        self.write_log.borrow_mut().push((offset, value));
    }
}

// =============================================================================
// Heap Page Locker
// =============================================================================

/// Page locker that hands out identity bus addresses.
///
/// Nothing is actually locked; the locker only counts. Bus address equals
/// host address, so a simulated device can reach host buffers directly.
#[derive(Debug, Default)]
pub struct HeapPageLocker {
    /// Lock count per page
    locked: RefCell<HashMap<usize, usize>>,
    /// Most pages that may be locked at once
    limit: Option<usize>,
    /// 1-based lock call that returns nothing
    fail_call: Option<usize>,
    calls: Cell<usize>,
    unlocks: Cell<usize>,
    dirtied: RefCell<Vec<usize>>,
}

impl HeapPageLocker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Lock at most `limit` pages at a time; requests beyond come back short
    pub fn fail_after(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    /// Make the `call`-th lock request (1-based) lock nothing
    pub fn fail_on_call(mut self, call: usize) -> Self {
        self.fail_call = Some(call);
        self
    }

    /// Pages currently locked
    pub fn outstanding(&self) -> usize {
        self.locked.borrow().values().sum()
    }

    /// Number of unlock calls
    pub fn unlock_calls(&self) -> usize {
        self.unlocks.get()
    }

    /// Pages released dirty, in release order
    pub fn dirtied(&self) -> Vec<usize> {
        self.dirtied.borrow().clone()
    }
}

impl PageLocker for HeapPageLocker {
    fn lock(&self, range: PageRange, _writable: bool) -> PinnedPages {
        let call = self.calls.get() + 1;
        self.calls.set(call);
        if self.fail_call == Some(call) {
            return Vec::new();
        }

        let mut pages = Vec::new();
        for addr in range.page_addrs() {
            if self.limit.is_some_and(|limit| self.outstanding() >= limit) {
                break;
            }
            *self.locked.borrow_mut().entry(addr).or_insert(0) += 1;
            pages.push(PinnedPage {
                host_addr: addr,
                bus_addr: addr as u64,
            });
        }
        pages
    }

    fn unlock(&self, pages: PinnedPages, dirty: bool) {
        self.unlocks.set(self.unlocks.get() + 1);
        let mut locked = self.locked.borrow_mut();
        for page in pages {
            let count = locked
                .get_mut(&page.host_addr)
                .unwrap_or_else(|| panic!("unlock of page {:#x} that is not locked", page.host_addr));
            *count -= 1;
            if *count == 0 {
                locked.remove(&page.host_addr);
            }
            if dirty {
                self.dirtied.borrow_mut().push(page.host_addr);
            }
        }
    }
}

// =============================================================================
// Mock Delay
// =============================================================================

/// Delay that only adds up the requested time
#[derive(Debug, Default)]
pub struct MockDelay {
    total_ns: u64,
}

impl MockDelay {
    pub fn new() -> Self {
        Self::default()
    }

    /// Total nanoseconds requested so far
    pub fn total_ns(&self) -> u64 {
        self.total_ns
    }
}

impl DelayNs for MockDelay {
    fn delay_ns(&mut self, ns: u32) {
        self.total_ns += u64::from(ns);
    }
}

// =============================================================================
// Recording Notifier
// =============================================================================

/// Completion listener that records every notification
#[derive(Debug, Default)]
pub struct RecordingNotifier {
    events: RefCell<Vec<(u32, TransferOutcome)>>,
}

impl RecordingNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<(u32, TransferOutcome)> {
        self.events.borrow().clone()
    }

    pub fn last(&self) -> Option<(u32, TransferOutcome)> {
        self.events.borrow().last().copied()
    }
}

impl CompletionNotifier for RecordingNotifier {
    fn notify(&self, payload: u32, outcome: TransferOutcome) {
        self.events.borrow_mut().push((payload, outcome));
    }
}

// =============================================================================
// Wake Counter
// =============================================================================

/// Counts how often its waker is woken
pub struct WakeCounter {
    count: AtomicUsize,
}

impl WakeCounter {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            count: AtomicUsize::new(0),
        })
    }

    pub fn count(&self) -> usize {
        self.count.load(Ordering::SeqCst)
    }

    /// A waker that bumps this counter
    pub fn waker(self: &Arc<Self>) -> Waker {
        fn clone_fn(ptr: *const ()) -> RawWaker {
            let arc = unsafe { Arc::from_raw(ptr as *const WakeCounter) };
            let cloned = arc.clone();
            core::mem::forget(arc);
            RawWaker::new(Arc::into_raw(cloned) as *const (), &VTABLE)
        }

        fn wake_fn(ptr: *const ()) {
            let arc = unsafe { Arc::from_raw(ptr as *const WakeCounter) };
            arc.count.fetch_add(1, Ordering::SeqCst);
        }

        fn wake_by_ref_fn(ptr: *const ()) {
            let arc = unsafe { Arc::from_raw(ptr as *const WakeCounter) };
            arc.count.fetch_add(1, Ordering::SeqCst);
            core::mem::forget(arc);
        }

        fn drop_fn(ptr: *const ()) {
            unsafe {
                drop(Arc::from_raw(ptr as *const WakeCounter));
            }
        }

        static VTABLE: RawWakerVTable =
            RawWakerVTable::new(clone_fn, wake_fn, wake_by_ref_fn, drop_fn);

        let raw = RawWaker::new(Arc::into_raw(self.clone()) as *const (), &VTABLE);
        unsafe { Waker::from_raw(raw) }
    }
}

// =============================================================================
// Host Buffer
// =============================================================================

/// Heap buffer placed at a chosen offset inside a page.
pub struct HostBuffer {
    storage: Box<[u8]>,
    start: usize,
    len: usize,
}

impl HostBuffer {
    fn place(len: usize, page_offset: usize) -> Self {
        let storage = vec![0u8; len + page_offset + 2 * PAGE].into_boxed_slice();
        let base = storage.as_ptr() as usize;
        let start = base.next_multiple_of(PAGE) - base + page_offset;
        Self {
            storage,
            start,
            len,
        }
    }

    /// Zero-filled buffer starting `page_offset` bytes into a page
    pub fn zeroed(len: usize, page_offset: usize) -> Self {
        Self::place(len, page_offset)
    }

    /// Buffer filled with a position-dependent byte pattern
    pub fn patterned(len: usize, page_offset: usize) -> Self {
        let mut buf = Self::place(len, page_offset);
        let start = buf.start;
        for (i, byte) in buf.storage[start..start + len].iter_mut().enumerate() {
            *byte = (i.wrapping_mul(7) ^ (i >> 8)) as u8;
        }
        buf
    }

    /// Host address of the first byte
    pub fn addr(&self) -> usize {
        self.storage.as_ptr() as usize + self.start
    }

    pub fn as_slice(&self) -> &[u8] {
        &self.storage[self.start..self.start + self.len]
    }
}

// =============================================================================
// Simulated Device
// =============================================================================

/// Software model of the DMA controller.
///
/// [`SimulatedDevice::run_batch`] consumes every descriptor up to the
/// last-id register, copies the bytes, and sets the completion flag of the
/// last id, which is what the controller does before raising its interrupt.
pub struct SimulatedDevice<'a> {
    shared: &'a DmaShared,
    regs: &'a MockRegisters,
    memory: Vec<u8>,
    consumed: [Option<u32>; 2],
    announces: [usize; 2],
}

impl<'a> SimulatedDevice<'a> {
    pub fn new(shared: &'a DmaShared, regs: &'a MockRegisters, memory_bytes: usize) -> Self {
        Self {
            shared,
            regs,
            memory: vec![0u8; memory_bytes],
            consumed: [None; 2],
            announces: [0; 2],
        }
    }

    /// Fill device memory with a byte pattern derived from `seed`
    pub fn fill_pattern(&mut self, seed: u8) {
        for (i, byte) in self.memory.iter_mut().enumerate() {
            *byte = (i as u8).wrapping_mul(31).wrapping_add(seed) ^ (i >> 12) as u8;
        }
    }

    /// Device memory at `[offset, offset + len)`
    pub fn memory(&self, offset: usize, len: usize) -> &[u8] {
        &self.memory[offset..offset + len]
    }

    /// Execute newly issued descriptors for `dir` and return them.
    ///
    /// A ring announcement (table size written again) restarts consumption
    /// at id 0.
    pub fn run_batch(&mut self, dir: Direction) -> Vec<DescriptorEntry> {
        let side = dir.as_u8() as usize;
        let last = self.regs.get(side_offset(dir, LAST_PTR_OFFSET));
        if last > MAX_DESC_ID {
            return Vec::new();
        }

        let announces = self.regs.writes_to(side_offset(dir, TABLE_SIZE_OFFSET));
        let first = if announces != self.announces[side] {
            self.announces[side] = announces;
            0
        } else {
            match self.consumed[side] {
                Some(prev) if prev < last => prev + 1,
                Some(_) => return Vec::new(),
                None => 0,
            }
        };

        let table = self.shared.table(dir);
        let mut batch = Vec::new();
        for id in first..=last {
            let entry = table.entry(id as usize);
            assert_eq!(entry.id, id, "descriptor stored in the wrong slot");
            self.execute(dir, &entry);
            batch.push(entry);
        }
        table.set_flag(last as usize, 1);
        self.consumed[side] = Some(last);
        batch
    }

    fn execute(&mut self, dir: Direction, entry: &DescriptorEntry) {
        let len = entry.len_bytes();
        match dir {
            Direction::DeviceToHost => {
                let src = entry.src as usize;
                let dst = entry.dst as usize as *mut u8;
                // SAFETY: bus addresses are identity-mapped addresses of a
                // live HostBuffer pinned by the engine.
                unsafe {
                    core::ptr::copy_nonoverlapping(self.memory[src..src + len].as_ptr(), dst, len);
                }
            }
            Direction::HostToDevice => {
                let dst = entry.dst as usize;
                // SAFETY: as above.
                let src = unsafe { core::slice::from_raw_parts(entry.src as usize as *const u8, len) };
                self.memory[dst..dst + len].copy_from_slice(src);
            }
        }
    }
}
