//! Memory-mapped register access for the DMA controller
//!
//! Register blocks are reached through the [`RegisterBlock`] trait so the
//! engine can run against a mapped BAR on hardware and against a mock in
//! host tests. All hardware access is volatile.

pub mod dma;

/// 32-bit register file addressed by byte offset.
///
/// Accesses take `&self`: hardware registers have no Rust-visible state, and
/// mocks use interior mutability.
pub trait RegisterBlock {
    /// Read the register at `offset`
    fn read32(&self, offset: usize) -> u32;

    /// Write `value` to the register at `offset`
    fn write32(&self, offset: usize, value: u32);
}

impl<R: RegisterBlock + ?Sized> RegisterBlock for &R {
    #[inline(always)]
    fn read32(&self, offset: usize) -> u32 {
        (**self).read32(offset)
    }

    #[inline(always)]
    fn write32(&self, offset: usize, value: u32) {
        (**self).write32(offset, value);
    }
}

/// Read a 32-bit register at the given address
///
/// # Safety
/// The caller must ensure the address is valid and properly aligned.
#[inline(always)]
pub unsafe fn read_reg(addr: usize) -> u32 {
    unsafe { core::ptr::read_volatile(addr as *const u32) }
}

/// Write a 32-bit value to a register at the given address
///
/// # Safety
/// The caller must ensure the address is valid and properly aligned.
#[inline(always)]
pub unsafe fn write_reg(addr: usize, value: u32) {
    unsafe { core::ptr::write_volatile(addr as *mut u32, value) }
}

/// A mapped BAR window
#[derive(Debug)]
pub struct MmioRegion {
    base: usize,
    len: usize,
}

impl MmioRegion {
    /// Wrap a mapped register window.
    ///
    /// # Safety
    /// `base` must point to `len` bytes of device registers that stay mapped
    /// for the lifetime of the region, and `base` must be 4-byte aligned.
    pub unsafe fn new(base: *mut u8, len: usize) -> Self {
        Self {
            base: base as usize,
            len,
        }
    }

    /// Size of the window in bytes
    pub const fn len(&self) -> usize {
        self.len
    }

    /// True for a zero-sized window
    pub const fn is_empty(&self) -> bool {
        self.len == 0
    }

    #[inline(always)]
    fn addr(&self, offset: usize) -> usize {
        debug_assert!(offset.is_multiple_of(4) && offset + 4 <= self.len);
        self.base + offset
    }
}

impl RegisterBlock for MmioRegion {
    #[inline(always)]
    fn read32(&self, offset: usize) -> u32 {
        // SAFETY: `new` guarantees the window is mapped and aligned.
        unsafe { read_reg(self.addr(offset)) }
    }

    #[inline(always)]
    fn write32(&self, offset: usize, value: u32) {
        // SAFETY: `new` guarantees the window is mapped and aligned.
        unsafe { write_reg(self.addr(offset), value) }
    }
}

// SAFETY: the region is only a base address; register accesses are single
// volatile 32-bit operations.
unsafe impl Send for MmioRegion {}
// SAFETY: see `Send`.
unsafe impl Sync for MmioRegion {}
