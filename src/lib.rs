//! PCIe FPGA scatter-gather DMA engine
//!
//! A `no_std` implementation of the DMA transfer engine for a PCIe FPGA
//! accelerator board. It moves large host buffers to and from device memory
//! by pinning host pages, building hardware descriptor rings and driving
//! completion through an interrupt and deferred-work pipeline.
//!
//! # Architecture
//!
//! 1. **Pinning** ([`pinning`]): locks host pages through a platform
//!    [`PageLocker`] and tracks the bus address of every page
//! 2. **Descriptors** ([`descriptor`]): the device-visible table layout
//! 3. **Engine** ([`dma`]): ring building, the window pipeline, the transfer
//!    state machine and interrupt dispatch
//! 4. **Registers** ([`register`]): the controller's register sides in BAR0
//!
//! The platform supplies memory-mapped register access ([`RegisterBlock`]),
//! page locking ([`PageLocker`]), a completion listener
//! ([`CompletionNotifier`]) and a `critical-section` implementation.
//!
//! # Features
//!
//! - `async` (default): the [`DmaEngine::run`] worker loop
//! - `defmt`: logging and `defmt::Format` for public types
//!
//! # Example
//!
//! ```ignore
//! use fpga_pcie_dma::{DmaConfig, DmaEngine, TableBus, TransferRequest};
//!
//! fpga_pcie_dma::dma_static!(DMA, DmaConfig::new().with_dma_signal_payload(0x40));
//!
//! let bar0 = unsafe { MmioRegion::new(bar0_ptr, bar0_len) };
//! let bus = TableBus::map(&DMA, |ptr| platform.bus_addr(ptr));
//! let mut engine = DmaEngine::new(&DMA, bar0, platform.locker(), listener, bus)?;
//!
//! // Interrupt handler
//! fn on_irq(status: u32) {
//!     CompletionDispatcher::new(&DMA).on_interrupt(status);
//! }
//!
//! DMA.submit(TransferRequest::host_to_device(buf.as_ptr() as usize, 0, buf.len()))?;
//! engine.run().await;
//! ```
//!
//! # Memory Requirements
//!
//! [`DmaShared`] holds both descriptor tables (2 x 4608 bytes) and must stay
//! at a fixed, device-visible address for as long as the engine runs.

#![no_std]
#![deny(missing_docs)]
#![allow(unsafe_code)]
#![deny(unsafe_op_in_unsafe_fn)]
#![cfg_attr(docsrs, feature(doc_cfg))]
// Clippy lint levels live here.
#![deny(clippy::correctness)]
#![warn(
    clippy::suspicious,
    clippy::style,
    clippy::complexity,
    clippy::perf,
    clippy::cloned_instead_of_copied,
    clippy::explicit_iter_loop,
    clippy::implicit_clone,
    clippy::inconsistent_struct_constructor,
    clippy::manual_assert,
    clippy::manual_let_else,
    clippy::match_same_arms,
    clippy::needless_pass_by_value,
    clippy::semicolon_if_nothing_returned,
    clippy::uninlined_format_args,
    clippy::unnested_or_patterns,
    clippy::std_instead_of_core,
    clippy::std_instead_of_alloc,
    clippy::alloc_instead_of_core
)]
#![allow(
    clippy::mod_module_files,
    clippy::self_named_module_files,
    clippy::similar_names,
    clippy::too_many_arguments,
    clippy::struct_excessive_bools,
    clippy::fn_params_excessive_bools,
    clippy::type_complexity,
    clippy::must_use_candidate,
    clippy::assertions_on_constants,
    clippy::cast_possible_truncation,
    clippy::cast_possible_wrap,
    clippy::cast_sign_loss,
    clippy::cast_precision_loss,
    clippy::cast_lossless,
    clippy::panic_in_result_fn,
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::module_name_repetitions,
    clippy::wildcard_imports,
    clippy::items_after_statements,
    clippy::let_underscore_future
)]

extern crate alloc;

// =============================================================================
// Modules
// =============================================================================

pub mod config;
pub mod constants;
pub mod descriptor;
pub mod dma;
pub mod error;
pub mod pinning;
pub mod queue;
pub mod register;
pub mod sync;

// Test utilities (only available during testing)
#[cfg(test)]
pub mod testing;

// =============================================================================
// Re-exports
// =============================================================================

pub use config::{Direction, DmaConfig, State};
pub use descriptor::{DescriptorEntry, DescriptorTable};
pub use dma::{
    CompletionDispatcher, CompletionNotifier, DmaEngine, DmaShared, InterruptClass, TableBus,
    TransferOutcome, TransferRequest,
};
pub use error::{
    BuildError, BuildResult, ConfigError, ConfigResult, Error, RequestError, RequestResult,
    ResourceError, ResourceResult, Result,
};
pub use pinning::{PageLocker, PageRange, PinnedPage, PinnedPages};
pub use register::{MmioRegion, RegisterBlock};

#[cfg(feature = "async")]
#[cfg_attr(docsrs, doc(cfg(feature = "async")))]
pub use sync::asynch::WorkReady;

// =============================================================================
// Macro Helpers
// =============================================================================

/// Declare the static shared state for one device.
///
/// The descriptor tables live inside [`DmaShared`], so it has to stay put
/// while the controller may read them; a `static` does that.
///
/// # Examples
///
/// ```ignore
/// fpga_pcie_dma::dma_static!(DMA);
/// fpga_pcie_dma::dma_static!(DMA_B, DmaConfig::new().with_pipeline_pages(64));
/// ```
#[macro_export]
macro_rules! dma_static {
    ($name:ident) => {
        $crate::dma_static!($name, $crate::DmaConfig::new());
    };
    ($name:ident, $config:expr) => {
        static $name: $crate::DmaShared = $crate::DmaShared::new($config);
    };
}

#[cfg(test)]
mod tests {
    use super::*;

    dma_static!(STATIC_DMA);

    #[test]
    fn static_shared_state_starts_idle() {
        assert!(STATIC_DMA.is_idle());
        assert_eq!(STATIC_DMA.config(), &DmaConfig::new());
        assert_eq!(
            STATIC_DMA.table(Direction::HostToDevice).flag(0),
            0,
            "tables start zeroed"
        );
    }
}
