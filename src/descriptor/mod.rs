//! DMA descriptor table definitions
//!
//! Each direction owns one [`DescriptorTable`]: a header of 128 completion
//! flags followed by 128 eight-word descriptor entries. The table lives in
//! device-visible host memory and is read by the controller, so every word
//! is stored little-endian and accessed through [`VolatileCell`].
//!
//! # Layout
//!
//! | Byte offset            | Contents                                    |
//! |------------------------|---------------------------------------------|
//! | `0x000 + 4 * id`       | completion flag for `id`                    |
//! | `0x200 + 32 * slot`    | `src_lo, src_hi, dst_lo, dst_hi`            |
//! | `0x210 + 32 * slot`    | `len_words \| id << 18`, 3 reserved words   |
//!
//! Entries are encoded with explicit word offsets rather than by relying on
//! struct layout.

use crate::config::Direction;
use crate::constants::{DESC_ID_SHIFT, DESC_LEN_MASK, MAX_DESC_ID, TABLE_SIZE, WORD_SIZE};

/// Words per descriptor entry
pub const ENTRY_WORDS: usize = 8;

/// Words in the completion-flag header
pub const HEADER_WORDS: usize = TABLE_SIZE;

/// Total words in a descriptor table
pub const TABLE_WORDS: usize = HEADER_WORDS + TABLE_SIZE * ENTRY_WORDS;

/// Size of a descriptor table in bytes
pub const TABLE_BYTES: usize = TABLE_WORDS * WORD_SIZE;

/// Word offsets inside an entry
mod word {
    pub const SRC_LO: usize = 0;
    pub const SRC_HI: usize = 1;
    pub const DST_LO: usize = 2;
    pub const DST_HI: usize = 3;
    pub const CONTROL: usize = 4;
}

/// Volatile cell wrapper for descriptor fields
///
/// Ensures all accesses are volatile so the compiler never caches or elides
/// reads and writes of memory the controller also touches.
#[repr(transparent)]
pub struct VolatileCell<T: Copy> {
    value: core::cell::UnsafeCell<T>,
}

// Safety: VolatileCell is safe to share between threads because all access
// is through single volatile operations on naturally aligned words.
unsafe impl<T: Copy> Sync for VolatileCell<T> {}

impl<T: Copy> VolatileCell<T> {
    /// Create a new volatile cell with the given initial value
    #[inline(always)]
    pub const fn new(value: T) -> Self {
        Self {
            value: core::cell::UnsafeCell::new(value),
        }
    }

    /// Read the value (volatile read)
    #[inline(always)]
    pub fn get(&self) -> T {
        unsafe { core::ptr::read_volatile(self.value.get()) }
    }

    /// Write a value (volatile write)
    #[inline(always)]
    pub fn set(&self, value: T) {
        unsafe { core::ptr::write_volatile(self.value.get(), value) }
    }
}

impl<T: Copy + Default> Default for VolatileCell<T> {
    fn default() -> Self {
        Self::new(T::default())
    }
}

// =============================================================================
// Descriptor Entry
// =============================================================================

/// One DMA segment as the controller sees it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct DescriptorEntry {
    /// Source bus address
    pub src: u64,
    /// Destination bus address
    pub dst: u64,
    /// Segment length in 32-bit words
    pub len_words: u32,
    /// Descriptor id (0..=127)
    pub id: u32,
}

impl DescriptorEntry {
    /// Build an entry moving `len_bytes` between a host bus address and a
    /// device address in the given direction.
    pub const fn for_transfer(
        dir: Direction,
        host_bus: u64,
        device_addr: u64,
        len_bytes: usize,
        id: u32,
    ) -> Self {
        let (src, dst) = match dir {
            Direction::DeviceToHost => (device_addr, host_bus),
            Direction::HostToDevice => (host_bus, device_addr),
        };
        Self {
            src,
            dst,
            len_words: (len_bytes / WORD_SIZE) as u32,
            id,
        }
    }

    /// Packed length/id control word
    #[inline(always)]
    pub const fn control(&self) -> u32 {
        (self.len_words & DESC_LEN_MASK) | ((self.id & MAX_DESC_ID) << DESC_ID_SHIFT)
    }

    /// Segment length in bytes
    #[inline(always)]
    pub const fn len_bytes(&self) -> usize {
        self.len_words as usize * WORD_SIZE
    }

    /// Encode into table words (host order; the table converts to LE)
    pub const fn to_words(&self) -> [u32; ENTRY_WORDS] {
        let mut words = [0u32; ENTRY_WORDS];
        words[word::SRC_LO] = self.src as u32;
        words[word::SRC_HI] = (self.src >> 32) as u32;
        words[word::DST_LO] = self.dst as u32;
        words[word::DST_HI] = (self.dst >> 32) as u32;
        words[word::CONTROL] = self.control();
        words
    }

    /// Decode from table words (host order)
    pub const fn from_words(words: &[u32; ENTRY_WORDS]) -> Self {
        let control = words[word::CONTROL];
        Self {
            src: (words[word::SRC_HI] as u64) << 32 | words[word::SRC_LO] as u64,
            dst: (words[word::DST_HI] as u64) << 32 | words[word::DST_LO] as u64,
            len_words: control & DESC_LEN_MASK,
            id: (control >> DESC_ID_SHIFT) & MAX_DESC_ID,
        }
    }
}

// =============================================================================
// Descriptor Table
// =============================================================================

/// Device-visible descriptor table for one direction.
#[repr(C, align(64))]
pub struct DescriptorTable {
    words: [VolatileCell<u32>; TABLE_WORDS],
}

impl Default for DescriptorTable {
    fn default() -> Self {
        Self::new()
    }
}

impl DescriptorTable {
    /// Create a zeroed table. Const-compatible.
    pub const fn new() -> Self {
        Self {
            words: [const { VolatileCell::new(0) }; TABLE_WORDS],
        }
    }

    /// Start of the table, for bus address translation
    #[inline(always)]
    pub fn base_ptr(&self) -> *const u8 {
        self.words.as_ptr().cast::<u8>()
    }

    /// Completion flag for `id`
    #[inline(always)]
    pub fn flag(&self, id: usize) -> u32 {
        u32::from_le(self.words[id].get())
    }

    /// Set a completion flag. The controller does this on hardware; exposed
    /// for device models.
    #[inline(always)]
    pub fn set_flag(&self, id: usize, value: u32) {
        self.words[id].set(value.to_le());
    }

    /// Zero every completion flag
    pub fn clear_flags(&self) {
        for word in &self.words[..HEADER_WORDS] {
            word.set(0);
        }
    }

    /// Store an entry in `slot`
    pub fn write_entry(&self, slot: usize, entry: &DescriptorEntry) {
        let base = HEADER_WORDS + slot * ENTRY_WORDS;
        for (cell, value) in self.words[base..base + ENTRY_WORDS]
            .iter()
            .zip(entry.to_words())
        {
            cell.set(value.to_le());
        }
    }

    /// Load the entry stored in `slot`
    pub fn entry(&self, slot: usize) -> DescriptorEntry {
        let base = HEADER_WORDS + slot * ENTRY_WORDS;
        let mut words = [0u32; ENTRY_WORDS];
        for (value, cell) in words.iter_mut().zip(&self.words[base..base + ENTRY_WORDS]) {
            *value = u32::from_le(cell.get());
        }
        DescriptorEntry::from_words(&words)
    }

    /// Raw little-endian word at a table word index
    #[cfg(test)]
    pub fn raw_word(&self, index: usize) -> u32 {
        self.words[index].get()
    }
}
