//! DMA Controller Register Definitions
//!
//! The controller has two identical register sides inside BAR0. The *read*
//! side fetches from host memory (host to device); the *write* side stores
//! into host memory (device to host).

use super::RegisterBlock;
use crate::config::Direction;
use crate::constants::{MAX_DESC_ID, TABLE_SIZE};

// =============================================================================
// Register Offsets
// =============================================================================

/// Offset of the DMA controller block inside BAR0
pub const DMA_CTRL_BASE: usize = 0x0000;

/// Read-side (host to device) register side base
pub const RD_SIDE_OFFSET: usize = 0x000;
/// Write-side (device to host) register side base
pub const WR_SIDE_OFFSET: usize = 0x100;

/// Descriptor table bus address, low half
pub const DESC_BASE_LOW_OFFSET: usize = 0x00;
/// Descriptor table bus address, high half
pub const DESC_BASE_HIGH_OFFSET: usize = 0x04;
/// On-device FIFO base, low half
pub const FIFO_BASE_LOW_OFFSET: usize = 0x08;
/// On-device FIFO base, high half
pub const FIFO_BASE_HIGH_OFFSET: usize = 0x0C;
/// Last valid descriptor id; a write starts consumption
pub const LAST_PTR_OFFSET: usize = 0x10;
/// Table size minus one
pub const TABLE_SIZE_OFFSET: usize = 0x14;

// =============================================================================
// On-device FIFO Addresses
// =============================================================================

/// Read-side FIFO base, low half
pub const RD_FIFO_BASE_LO: u32 = 0xFFFF_0000;
/// Read-side FIFO base, high half
pub const RD_FIFO_BASE_HI: u32 = 0x0000_7FFF;
/// Write-side FIFO base, low half
pub const WR_FIFO_BASE_LO: u32 = 0xFFFF_2000;
/// Write-side FIFO base, high half
pub const WR_FIFO_BASE_HI: u32 = 0x0000_7FFF;

/// Value programmed into the table size register
pub const TABLE_SIZE_VALUE: u32 = (TABLE_SIZE - 1) as u32;

const _: () = assert!(TABLE_SIZE_VALUE == MAX_DESC_ID);

/// Absolute offset (from the block base) of a register on a side
#[inline(always)]
pub const fn side_offset(dir: Direction, reg: usize) -> usize {
    let side = match dir {
        Direction::HostToDevice => RD_SIDE_OFFSET,
        Direction::DeviceToHost => WR_SIDE_OFFSET,
    };
    DMA_CTRL_BASE + side + reg
}

/// Typed accessors for the DMA controller registers
#[derive(Debug)]
pub struct DmaRegs<R> {
    regs: R,
}

impl<R: RegisterBlock> DmaRegs<R> {
    /// Wrap a register block
    pub const fn new(regs: R) -> Self {
        Self { regs }
    }

    /// Program the descriptor table bus address
    #[inline(always)]
    pub fn set_desc_base(&self, dir: Direction, bus_addr: u64) {
        self.regs
            .write32(side_offset(dir, DESC_BASE_LOW_OFFSET), bus_addr as u32);
        self.regs
            .write32(side_offset(dir, DESC_BASE_HIGH_OFFSET), (bus_addr >> 32) as u32);
    }

    /// Program the fixed on-device FIFO base for the side
    #[inline(always)]
    pub fn set_fifo_base(&self, dir: Direction) {
        let (lo, hi) = match dir {
            Direction::HostToDevice => (RD_FIFO_BASE_LO, RD_FIFO_BASE_HI),
            Direction::DeviceToHost => (WR_FIFO_BASE_LO, WR_FIFO_BASE_HI),
        };
        self.regs.write32(side_offset(dir, FIFO_BASE_LOW_OFFSET), lo);
        self.regs.write32(side_offset(dir, FIFO_BASE_HIGH_OFFSET), hi);
    }

    /// Program the table size register
    #[inline(always)]
    pub fn set_table_size(&self, dir: Direction) {
        self.regs
            .write32(side_offset(dir, TABLE_SIZE_OFFSET), TABLE_SIZE_VALUE);
    }

    /// Last id the hardware was told about
    #[inline(always)]
    pub fn last_ptr(&self, dir: Direction) -> u32 {
        self.regs.read32(side_offset(dir, LAST_PTR_OFFSET))
    }

    /// Publish a new last id, starting consumption up to it
    #[inline(always)]
    pub fn set_last_ptr(&self, dir: Direction, id: u32) {
        self.regs.write32(side_offset(dir, LAST_PTR_OFFSET), id);
    }
}
