//! Centralized Constants
//!
//! Single source of truth for the magic numbers shared by the engine.
//!
//! # Note
//!
//! Register offsets and on-device FIFO addresses stay in `register/dma.rs`
//! since they are specific to the DMA register block.

// =============================================================================
// Ring Geometry
// =============================================================================

/// Number of descriptor slots (and completion flags) per direction
pub const TABLE_SIZE: usize = 128;

/// Highest valid descriptor id
pub const MAX_DESC_ID: u32 = (TABLE_SIZE - 1) as u32;

/// Sentinel id meaning "no descriptor issued since reset"
pub const RESET_ID: u32 = 0xFF;

/// Bit position of the descriptor id inside the length/control word
pub const DESC_ID_SHIFT: u32 = 18;

/// Mask for the length-in-words field of the control word
pub const DESC_LEN_MASK: u32 = (1 << DESC_ID_SHIFT) - 1;

// =============================================================================
// Host Memory
// =============================================================================

/// Default host page size in bytes
pub const DEFAULT_PAGE_SIZE: usize = 0x1000;

/// Default number of pages pinned per pipeline window
pub const DEFAULT_PIPELINE_PAGES: usize = 256;

/// Default log2 of the largest non-aligned chunk (2048 bytes)
pub const DEFAULT_NON_ALIGNED_LOG: u32 = 11;

/// log2 of the smallest non-aligned chunk (one 32-bit word)
pub const MIN_NON_ALIGNED_LOG: u32 = 2;

/// Transfer granularity in bytes
pub const WORD_SIZE: usize = 4;

// =============================================================================
// Timing
// =============================================================================

/// Default idle poll interval in nanoseconds
pub const DEFAULT_IDLE_POLL_INTERVAL_NS: u32 = 100;

/// Default number of idle polls before giving up
pub const DEFAULT_IDLE_POLL_LIMIT: u32 = 0x100_0000;

// =============================================================================
// Completion Signalling
// =============================================================================

/// Interrupt status bit raised by the accelerator kernel (not the DMA)
pub const IRQ_KERNEL_DONE: u32 = 1 << 0;

/// Payload bit marking a notification as a DMA completion
pub const PAYLOAD_DMA_DONE: u32 = 1 << 0;

/// Depth of the deferred-work queue
pub const WORK_QUEUE_DEPTH: usize = 4;
