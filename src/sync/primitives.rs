//! Synchronization primitives for ISR-safe access.

use core::cell::RefCell;
use core::task::Waker;
use critical_section::Mutex;

/// Cell providing interior mutability with critical section protection.
///
/// Combines `critical_section::Mutex` with `RefCell` so the interrupt handler
/// and the worker can both mutate the same value.
pub struct CriticalSectionCell<T> {
    inner: Mutex<RefCell<T>>,
}

impl<T> CriticalSectionCell<T> {
    /// Create a new cell (const, suitable for static initialization).
    pub const fn new(value: T) -> Self {
        Self {
            inner: Mutex::new(RefCell::new(value)),
        }
    }

    /// Execute a closure with exclusive mutable access.
    ///
    /// Interrupts are disabled for the duration of the closure.
    #[inline]
    pub fn with<R, F>(&self, f: F) -> R
    where
        F: FnOnce(&mut T) -> R,
    {
        critical_section::with(|cs| {
            let mut value = self.inner.borrow_ref_mut(cs);
            f(&mut value)
        })
    }

    /// Execute a closure with immutable access.
    #[inline]
    pub fn with_ref<R, F>(&self, f: F) -> R
    where
        F: FnOnce(&T) -> R,
    {
        critical_section::with(|cs| {
            let value = self.inner.borrow_ref(cs);
            f(&value)
        })
    }
}

// SAFETY: CriticalSectionCell uses critical sections to protect all access.
unsafe impl<T: Send> Sync for CriticalSectionCell<T> {}

/// Interrupt-safe waker storage.
///
/// The worker registers its waker while idle; the interrupt handler and the
/// submitting thread wake it.
pub struct AtomicWaker {
    waker: CriticalSectionCell<Option<Waker>>,
}

impl AtomicWaker {
    /// Create a new empty waker (const, suitable for static initialization).
    pub const fn new() -> Self {
        Self {
            waker: CriticalSectionCell::new(None),
        }
    }

    /// Register a waker to be woken later.
    pub fn register(&self, waker: &Waker) {
        self.waker.with(|slot| match slot {
            Some(existing) if existing.will_wake(waker) => {}
            _ => *slot = Some(waker.clone()),
        });
    }

    /// Wake the registered waker, if any (clears the stored waker).
    #[inline]
    pub fn wake(&self) {
        let waker = self.waker.with(|slot| slot.take());
        if let Some(w) = waker {
            w.wake();
        }
    }

    /// Check if a waker is currently registered.
    pub fn is_registered(&self) -> bool {
        self.waker.with_ref(|slot| slot.is_some())
    }
}

impl Default for AtomicWaker {
    fn default() -> Self {
        Self::new()
    }
}
