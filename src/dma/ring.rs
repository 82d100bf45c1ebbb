//! Descriptor ring builder.
//!
//! Turns runs of pinned host memory into descriptor entries, stores them in
//! the direction's table and hands them to the controller by programming the
//! last-id register.
//!
//! Ids run 0..=127 and are assigned contiguously from one past the last id
//! the controller was given. A batch that starts at id 0 (first use after a
//! reset, or after the previous batch ended at 127) re-announces the ring:
//! flags are zeroed and the table base, FIFO base and table size registers
//! are rewritten between full barriers.

use alloc::vec::Vec;
use core::sync::atomic::{AtomicU32, Ordering, fence};

use crate::config::Direction;
use crate::constants::{MAX_DESC_ID, MIN_NON_ALIGNED_LOG, RESET_ID, TABLE_SIZE};
use crate::descriptor::{DescriptorEntry, DescriptorTable};
use crate::error::{BuildError, BuildResult};
use crate::register::RegisterBlock;
use crate::register::dma::DmaRegs;

use super::DmaShared;

/// Bus addresses of the two descriptor tables
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct TableBus {
    /// Table used for host to device transfers
    pub host_to_device: u64,
    /// Table used for device to host transfers
    pub device_to_host: u64,
}

impl TableBus {
    /// Translate the shared tables' host addresses with `map`.
    ///
    /// With no IOMMU in the way `map` is usually `|ptr| ptr as u64`.
    pub fn map<F>(shared: &DmaShared, map: F) -> Self
    where
        F: Fn(*const u8) -> u64,
    {
        Self {
            host_to_device: map(shared.table(Direction::HostToDevice).base_ptr()),
            device_to_host: map(shared.table(Direction::DeviceToHost).base_ptr()),
        }
    }

    /// Bus address for a direction
    pub const fn for_direction(&self, dir: Direction) -> u64 {
        match dir {
            Direction::HostToDevice => self.host_to_device,
            Direction::DeviceToHost => self.device_to_host,
        }
    }
}

/// Where the next batch starts
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct BatchStart {
    /// First id of the batch
    pub id: u32,
    /// Ring registers must be (re)programmed
    pub announce: bool,
}

impl BatchStart {
    /// Free slots from `id` to the end of the ring
    #[inline(always)]
    pub const fn capacity(&self) -> usize {
        TABLE_SIZE - self.id as usize
    }
}

/// Split a sub-page slice into power-of-two chunks.
///
/// Sizes are tried from `1 << max_log` down to 4 bytes; each size is used as
/// often as it fits the remaining bytes and the remaining ring capacity.
/// Bytes that do not fit before the ring fills are left for the next batch.
///
/// With pages of at most 4 KiB and `max_log >= 11` no size can be needed more
/// than once; needing it anyway means the caller handed over a bad slice.
pub fn plan_non_aligned(
    bytes: usize,
    capacity: usize,
    page_size: usize,
    max_log: u32,
) -> BuildResult<Vec<usize>> {
    if bytes >= page_size {
        return Err(BuildError::SliceTooLarge);
    }

    let single_chunk_per_size = page_size <= 4096 && max_log >= 11;
    let mut chunks = Vec::new();
    let mut remaining = bytes;
    let mut free = capacity;

    for log in (MIN_NON_ALIGNED_LOG..=max_log).rev() {
        if free == 0 {
            break;
        }
        let count = remaining >> log;
        if single_chunk_per_size && count > 1 {
            return Err(BuildError::ChunkOverflow);
        }
        let take = count.min(free);
        let chunk = 1usize << log;
        chunks.extend(core::iter::repeat_n(chunk, take));
        remaining -= take * chunk;
        free -= take;
    }

    if chunks.is_empty() {
        return Err(BuildError::NoChunkSize);
    }
    Ok(chunks)
}

/// Writes descriptor batches and tracks the last id per direction.
pub struct RingBuilder<R> {
    regs: DmaRegs<R>,
    bus: TableBus,
    last_id: [u32; 2],
}

impl<R: RegisterBlock> RingBuilder<R> {
    /// Create a builder with both trackers at the reset sentinel
    pub fn new(regs: R, bus: TableBus) -> Self {
        Self {
            regs: DmaRegs::new(regs),
            bus,
            last_id: [RESET_ID; 2],
        }
    }

    /// Register accessors
    pub fn regs(&self) -> &DmaRegs<R> {
        &self.regs
    }

    /// Last id handed to the controller for `dir`
    pub fn last_id(&self, dir: Direction) -> u32 {
        self.last_id[dir.as_u8() as usize]
    }

    /// Put both trackers back to the reset sentinel
    pub fn reset_trackers(&mut self) {
        self.last_id = [RESET_ID; 2];
    }

    /// Adopt the controller's last-id register as the tracker for `dir`
    pub fn resume_from_hardware(&mut self, dir: Direction) -> u32 {
        let id = self.regs.last_ptr(dir);
        self.last_id[dir.as_u8() as usize] = id;
        id
    }

    /// Compute where the next batch for `dir` starts
    pub fn start_id(&self, dir: Direction) -> BuildResult<BatchStart> {
        match self.last_id(dir) {
            RESET_ID | MAX_DESC_ID => Ok(BatchStart {
                id: 0,
                announce: true,
            }),
            last if last < MAX_DESC_ID => Ok(BatchStart {
                id: last + 1,
                announce: false,
            }),
            other => Err(BuildError::UnrecognizedLastId(other)),
        }
    }

    /// Store `entries` (ids `start.id..`) and start the controller on them.
    ///
    /// `issued` is the id mirror read by the interrupt handler; it is updated
    /// before the last-id register so a completion can never be checked
    /// against a stale id. Returns the last id of the batch.
    pub fn submit(
        &mut self,
        dir: Direction,
        table: &DescriptorTable,
        start: BatchStart,
        entries: &[DescriptorEntry],
        issued: &AtomicU32,
    ) -> u32 {
        debug_assert!(!entries.is_empty() && entries.len() <= start.capacity());
        let last = start.id + entries.len() as u32 - 1;

        if start.announce {
            table.clear_flags();
        }
        for entry in entries {
            table.write_entry(entry.id as usize, entry);
        }

        if start.announce {
            #[cfg(feature = "defmt")]
            defmt::info!("announcing {} descriptor ring", dir);
            self.regs.set_desc_base(dir, self.bus.for_direction(dir));
            fence(Ordering::SeqCst);
            self.regs.set_fifo_base(dir);
            self.regs.set_table_size(dir);
        }
        fence(Ordering::SeqCst);

        issued.store(last, Ordering::Release);
        self.last_id[dir.as_u8() as usize] = last;
        self.regs.set_last_ptr(dir, last);

        #[cfg(feature = "defmt")]
        defmt::debug!("batch {}..={} issued", start.id, last);
        last
    }
}

#[cfg(test)]
mod tests {
    extern crate std;

    use super::*;
    use crate::register::dma::{FIFO_BASE_LOW_OFFSET, LAST_PTR_OFFSET, side_offset};
    use crate::testing::MockRegisters;

    const PAGE: usize = 4096;

    fn entries(dir: Direction, start: u32, count: u32) -> Vec<DescriptorEntry> {
        (start..start + count)
            .map(|id| DescriptorEntry::for_transfer(dir, 0x10_0000, 0, PAGE, id))
            .collect()
    }

    #[test]
    fn plan_decomposes_into_decreasing_powers() {
        let chunks = plan_non_aligned(3996, 128, PAGE, 11).unwrap();
        assert_eq!(chunks, std::vec![2048, 1024, 512, 256, 128, 16, 8, 4]);
        assert!(chunks.windows(2).all(|w| w[0] > w[1]));
        assert_eq!(chunks.iter().sum::<usize>(), 3996);
    }

    #[test]
    fn plan_small_slice() {
        assert_eq!(plan_non_aligned(100, 128, PAGE, 11).unwrap(), std::vec![64, 32, 4]);
        assert_eq!(plan_non_aligned(4, 1, PAGE, 11).unwrap(), std::vec![4]);
    }

    #[test]
    fn plan_respects_ring_capacity() {
        let chunks = plan_non_aligned(3996, 2, PAGE, 11).unwrap();
        assert_eq!(chunks, std::vec![2048, 1024]);
    }

    #[test]
    fn plan_rejects_full_page_and_sub_word() {
        assert_eq!(plan_non_aligned(PAGE, 128, PAGE, 11), Err(BuildError::SliceTooLarge));
        assert_eq!(plan_non_aligned(2, 128, PAGE, 11), Err(BuildError::NoChunkSize));
        assert_eq!(plan_non_aligned(0, 128, PAGE, 11), Err(BuildError::NoChunkSize));
    }

    #[test]
    fn plan_repeats_sizes_on_large_pages() {
        let chunks = plan_non_aligned(3 * 2048 + 4, 128, 8192, 11).unwrap();
        assert_eq!(chunks, std::vec![2048, 2048, 2048, 4]);
    }

    #[test]
    fn plan_repeats_top_size_below_default_ceiling() {
        assert_eq!(
            plan_non_aligned(4000, 128, PAGE, 10),
            Ok(std::vec![1024, 1024, 1024, 512, 256, 128, 32])
        );
        assert_eq!(
            plan_non_aligned(4000, 128, PAGE, 11),
            Ok(std::vec![2048, 1024, 512, 256, 128, 32])
        );
    }

    #[test]
    fn start_id_sequence() {
        let mock = MockRegisters::new();
        let mut ring = RingBuilder::new(&mock, TableBus { host_to_device: 0, device_to_host: 0 });
        let dir = Direction::HostToDevice;

        assert_eq!(ring.start_id(dir), Ok(BatchStart { id: 0, announce: true }));

        ring.last_id[1] = 5;
        assert_eq!(ring.start_id(dir), Ok(BatchStart { id: 6, announce: false }));

        ring.last_id[1] = 127;
        assert_eq!(ring.start_id(dir), Ok(BatchStart { id: 0, announce: true }));

        ring.last_id[1] = 200;
        assert_eq!(ring.start_id(dir), Err(BuildError::UnrecognizedLastId(200)));
    }

    #[test]
    fn resume_reads_hardware_last_ptr() {
        let mock = MockRegisters::new();
        mock.set(side_offset(Direction::DeviceToHost, LAST_PTR_OFFSET), 9);
        let mut ring = RingBuilder::new(&mock, TableBus { host_to_device: 0, device_to_host: 0 });

        assert_eq!(ring.resume_from_hardware(Direction::DeviceToHost), 9);
        assert_eq!(ring.last_id(Direction::DeviceToHost), 9);
        assert_eq!(ring.last_id(Direction::HostToDevice), RESET_ID);
    }

    #[test]
    fn announce_programs_ring_registers() {
        let mock = MockRegisters::new();
        let table = DescriptorTable::new();
        let issued = AtomicU32::new(RESET_ID);
        let bus = TableBus { host_to_device: 0x0000_0001_0000_2000, device_to_host: 0 };
        let mut ring = RingBuilder::new(&mock, bus);
        let dir = Direction::HostToDevice;

        table.set_flag(7, 1);
        let start = ring.start_id(dir).unwrap();
        let last = ring.submit(dir, &table, start, &entries(dir, 0, 3), &issued);

        assert_eq!(last, 2);
        assert_eq!(issued.load(Ordering::SeqCst), 2);
        assert_eq!(table.flag(7), 0);
        assert_eq!(table.entry(1).id, 1);
        assert_eq!(mock.get(0x00), 0x2000);
        assert_eq!(mock.get(0x04), 0x1);
        assert_eq!(mock.get(0x14), 127);
        assert_eq!(mock.get(0x10), 2);
        assert_eq!(
            mock.writes_to(side_offset(dir, FIFO_BASE_LOW_OFFSET)),
            1,
            "FIFO base written once"
        );
        // Last id is always the final register write of a batch.
        assert_eq!(mock.writes().last(), Some(&(0x10, 2)));
    }

    #[test]
    fn follow_up_batch_only_writes_last_id() {
        let mock = MockRegisters::new();
        let table = DescriptorTable::new();
        let issued = AtomicU32::new(RESET_ID);
        let mut ring = RingBuilder::new(&mock, TableBus { host_to_device: 0x1000, device_to_host: 0 });
        let dir = Direction::HostToDevice;

        let start = ring.start_id(dir).unwrap();
        ring.submit(dir, &table, start, &entries(dir, 0, 2), &issued);
        table.set_flag(1, 1);
        mock.clear_writes();

        let start = ring.start_id(dir).unwrap();
        assert_eq!(start, BatchStart { id: 2, announce: false });
        ring.submit(dir, &table, start, &entries(dir, 2, 4), &issued);

        assert_eq!(mock.writes(), std::vec![(0x10, 5)]);
        assert_eq!(table.flag(1), 1, "flags survive a follow-up batch");
        assert_eq!(table.entry(5).id, 5);
    }
}
