//! Synchronization support
//!
//! The interrupt handler, the submitting thread and the DMA worker meet in
//! [`crate::DmaShared`]. This module provides the pieces it is built from:
//!
//! - [`CriticalSectionCell`]: ISR-safe interior mutability for the work queue
//! - [`AtomicWaker`]: waker storage so an interrupt can wake the async worker
//! - `asynch` (feature `async`): the future the worker awaits between batches

mod primitives;

pub use primitives::{AtomicWaker, CriticalSectionCell};

#[cfg(feature = "async")]
#[cfg_attr(docsrs, doc(cfg(feature = "async")))]
pub mod asynch;
