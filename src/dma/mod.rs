//! Scatter-gather DMA engine
//!
//! # Contexts
//!
//! | Context            | Entry point                          | May block |
//! |--------------------|--------------------------------------|-----------|
//! | submitting thread  | [`DmaShared::submit`]                | no        |
//! | interrupt handler  | [`CompletionDispatcher::on_interrupt`] | no      |
//! | DMA worker         | [`DmaEngine::service`] / `run`       | yes       |
//!
//! Only the worker pins memory and touches the descriptor rings. The other
//! two contexts communicate with it through the work queue in
//! [`DmaShared`]; completion notifications are always delivered from the
//! worker.
//!
//! # Transfer flow
//!
//! 1. `submit` validates the request, claims the idle flag and queues a start.
//! 2. The worker reads the controller's last id, pins the first window and
//!    issues a batch.
//! 3. Each completion interrupt queues an advance; the worker issues the next
//!    batch, rotating and pre-pinning windows as it goes.
//! 4. Once every byte is described and the last batch is flagged, the worker
//!    unpins everything, sets idle and notifies the listener.

mod dispatch;
mod engine;
mod pipeline;
mod ring;
mod shared;

pub use dispatch::{CompletionDispatcher, CompletionNotifier, InterruptClass, TransferOutcome};
pub use engine::DmaEngine;
pub use pipeline::{MemoryWindowPipeline, Window};
pub use ring::{BatchStart, RingBuilder, TableBus, plan_non_aligned};
pub use shared::{DmaShared, TransferRequest};
