//! Async support for the DMA worker.
//!
//! The worker awaits [`WorkReady`] between batches. Submission and the
//! interrupt handler wake it through the waker stored in
//! [`crate::DmaShared`].

use core::{
    future::Future,
    pin::Pin,
    task::{Context, Poll},
};

use crate::dma::DmaShared;

/// Future that resolves once the work queue is non-empty.
#[must_use = "futures do nothing unless you `.await` or poll them"]
pub struct WorkReady<'a> {
    shared: &'a DmaShared,
}

impl<'a> WorkReady<'a> {
    /// Create a new future over the shared state.
    pub fn new(shared: &'a DmaShared) -> Self {
        Self { shared }
    }
}

impl Future for WorkReady<'_> {
    type Output = ();

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        if self.shared.has_work() {
            return Poll::Ready(());
        }

        self.shared.waker().register(cx.waker());
        if self.shared.has_work() {
            return Poll::Ready(());
        }
        Poll::Pending
    }
}
