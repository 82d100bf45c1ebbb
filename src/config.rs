//! Engine configuration and shared enums.

use crate::constants::{
    DEFAULT_IDLE_POLL_INTERVAL_NS, DEFAULT_IDLE_POLL_LIMIT, DEFAULT_NON_ALIGNED_LOG,
    DEFAULT_PAGE_SIZE, DEFAULT_PIPELINE_PAGES, MIN_NON_ALIGNED_LOG, WORD_SIZE,
};
use crate::error::{ConfigError, ConfigResult};

/// Transfer direction, named from the host's point of view.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Direction {
    /// Device memory to host buffer (uses the write-side ring)
    DeviceToHost,
    /// Host buffer to device memory (uses the read-side ring)
    HostToDevice,
}

impl Direction {
    /// True if the host pages are written by the device and must be dirtied
    #[inline(always)]
    pub const fn writes_host(self) -> bool {
        matches!(self, Direction::DeviceToHost)
    }

    pub(crate) const fn as_u8(self) -> u8 {
        match self {
            Direction::DeviceToHost => 0,
            Direction::HostToDevice => 1,
        }
    }

    pub(crate) const fn from_u8(raw: u8) -> Self {
        if raw == 0 {
            Direction::DeviceToHost
        } else {
            Direction::HostToDevice
        }
    }
}

/// Engine state as seen by the worker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum State {
    /// No transfer in flight
    #[default]
    Idle,
    /// Batches are being issued until the request is covered
    Draining,
    /// The last transfer failed and was unwound
    Fault,
    /// Engine torn down; no further work is accepted
    Finished,
}

/// DMA engine configuration
///
/// ```ignore
/// let config = DmaConfig::new()
///     .with_pipeline_pages(64)
///     .with_dma_signal_payload(0x40);
/// config.validate()?;
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct DmaConfig {
    /// Host page size in bytes
    pub page_size: usize,
    /// Pages pinned per pipeline window
    pub pipeline_pages: usize,
    /// log2 of the largest chunk used for sub-page slices
    pub non_aligned_log: u32,
    /// Delay between idle polls in nanoseconds
    pub idle_poll_interval_ns: u32,
    /// Number of idle polls before [`crate::Error::Timeout`]
    pub idle_poll_limit: u32,
    /// Caller payload attached to completion notifications
    pub dma_signal_payload: u32,
}

impl Default for DmaConfig {
    fn default() -> Self {
        Self::new()
    }
}

impl DmaConfig {
    /// Create a configuration with the driver defaults
    pub const fn new() -> Self {
        Self {
            page_size: DEFAULT_PAGE_SIZE,
            pipeline_pages: DEFAULT_PIPELINE_PAGES,
            non_aligned_log: DEFAULT_NON_ALIGNED_LOG,
            idle_poll_interval_ns: DEFAULT_IDLE_POLL_INTERVAL_NS,
            idle_poll_limit: DEFAULT_IDLE_POLL_LIMIT,
            dma_signal_payload: 0,
        }
    }

    /// Set the host page size
    #[must_use]
    pub const fn with_page_size(mut self, page_size: usize) -> Self {
        self.page_size = page_size;
        self
    }

    /// Set the number of pages pinned per window
    #[must_use]
    pub const fn with_pipeline_pages(mut self, pages: usize) -> Self {
        self.pipeline_pages = pages;
        self
    }

    /// Set log2 of the largest non-aligned chunk
    #[must_use]
    pub const fn with_non_aligned_log(mut self, log: u32) -> Self {
        self.non_aligned_log = log;
        self
    }

    /// Set the idle poll interval and limit
    #[must_use]
    pub const fn with_idle_poll(mut self, interval_ns: u32, limit: u32) -> Self {
        self.idle_poll_interval_ns = interval_ns;
        self.idle_poll_limit = limit;
        self
    }

    /// Set the completion payload
    #[must_use]
    pub const fn with_dma_signal_payload(mut self, payload: u32) -> Self {
        self.dma_signal_payload = payload;
        self
    }

    /// Bytes covered by one full pipeline window
    #[inline(always)]
    pub const fn window_bytes(&self) -> usize {
        self.pipeline_pages * self.page_size
    }

    /// Check the configuration for values the engine cannot work with
    pub const fn validate(&self) -> ConfigResult<()> {
        if !self.page_size.is_power_of_two() || self.page_size < WORD_SIZE {
            return Err(ConfigError::InvalidPageSize);
        }
        if self.pipeline_pages == 0 {
            return Err(ConfigError::InvalidPipelineSize);
        }
        if self.non_aligned_log < MIN_NON_ALIGNED_LOG
            || self.non_aligned_log >= usize::BITS
            || (1usize << self.non_aligned_log) >= self.page_size
        {
            return Err(ConfigError::InvalidChunkLog);
        }
        Ok(())
    }
}
