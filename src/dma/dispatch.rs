//! Interrupt-side completion handling.
//!
//! The board interrupt is shared by user kernels and the DMA controller. The
//! handler classifies it, and when the current batch's completion flag is set
//! defers an advance to the worker. Nothing here blocks or pins memory.

use crate::constants::{IRQ_KERNEL_DONE, PAYLOAD_DMA_DONE};
use crate::error::Error;

use super::DmaShared;

/// Result of a transfer, delivered through [`CompletionNotifier`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum TransferOutcome {
    /// Every byte was moved
    Completed {
        /// Bytes transferred
        bytes: usize,
    },
    /// The transfer was unwound
    Failed(Error),
}

impl TransferOutcome {
    /// True for [`TransferOutcome::Completed`]
    pub const fn is_completed(&self) -> bool {
        matches!(self, TransferOutcome::Completed { .. })
    }
}

/// Receives completion signals for the registered listener.
///
/// `payload` is the configured signal payload with the DMA-done bit set.
pub trait CompletionNotifier {
    /// Deliver a completion
    fn notify(&self, payload: u32, outcome: TransferOutcome);
}

impl<N: CompletionNotifier + ?Sized> CompletionNotifier for &N {
    fn notify(&self, payload: u32, outcome: TransferOutcome) {
        (**self).notify(payload, outcome);
    }
}

/// No listener registered
impl CompletionNotifier for () {
    fn notify(&self, _payload: u32, _outcome: TransferOutcome) {}
}

/// What an interrupt turned out to be
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct InterruptClass {
    /// A user kernel finished (status bit 0)
    pub kernel_done: bool,
    /// The current batch's last descriptor is flagged done
    pub dma_done: bool,
    /// An advance was queued for the worker
    pub advance_queued: bool,
}

/// Interrupt handler front end.
pub struct CompletionDispatcher<'a> {
    shared: &'a DmaShared,
}

impl<'a> CompletionDispatcher<'a> {
    /// Create a dispatcher over the shared state
    pub const fn new(shared: &'a DmaShared) -> Self {
        Self { shared }
    }

    /// Handle one interrupt with the given status word.
    ///
    /// Safe to call from interrupt context. The completion check reads the
    /// flag of the last id issued for the current direction, so a batch
    /// that has not been issued yet is never reported.
    pub fn on_interrupt(&self, irq_status: u32) -> InterruptClass {
        let mut class = InterruptClass {
            kernel_done: irq_status & IRQ_KERNEL_DONE != 0,
            ..InterruptClass::default()
        };

        if !self.shared.is_idle() && self.shared.dma_completed() {
            class.dma_done = true;
            class.advance_queued = self.shared.queue_advance();
            if class.advance_queued {
                self.shared.waker().wake();
            }
        }

        #[cfg(feature = "defmt")]
        defmt::trace!("irq status {=u32:#x}: {}", irq_status, class);
        class
    }

    /// Payload to report for a kernel completion (DMA-done bit cleared)
    pub fn kernel_payload(&self) -> u32 {
        self.shared.signal_payload() & !PAYLOAD_DMA_DONE
    }
}
