//! Fixed-capacity circular FIFO.
//!
//! Storage is a contiguous `[Option<T>; N]`. Indices advance with a single
//! conditional subtraction, which is enough because no operation moves an
//! index by more than one slot.
//!
//! Overflow and underflow are not errors: [`CircularQueue::push`] on a full
//! queue and [`CircularQueue::pop`] on an empty queue do nothing. Callers that
//! care check [`CircularQueue::len`] or [`CircularQueue::is_full`] first.

/// Circular queue with compile-time capacity.
pub struct CircularQueue<T, const N: usize> {
    slots: [Option<T>; N],
    head: usize,
    len: usize,
}

#[inline(always)]
const fn fast_mod(index: usize, capacity: usize) -> usize {
    if index >= capacity {
        index - capacity
    } else {
        index
    }
}

impl<T, const N: usize> CircularQueue<T, N> {
    /// Create an empty queue. Const-compatible.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            slots: [const { None }; N],
            head: 0,
            len: 0,
        }
    }

    /// Maximum number of elements
    #[inline(always)]
    #[must_use]
    pub const fn capacity(&self) -> usize {
        N
    }

    /// Number of queued elements
    #[inline(always)]
    #[must_use]
    pub const fn len(&self) -> usize {
        self.len
    }

    /// True when nothing is queued
    #[inline(always)]
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// True when no more elements fit
    #[inline(always)]
    #[must_use]
    pub const fn is_full(&self) -> bool {
        self.len == N
    }

    /// Append to the back. No-op when full.
    pub fn push(&mut self, value: T) {
        if self.is_full() {
            return;
        }
        let tail = fast_mod(self.head + self.len, N);
        self.slots[tail] = Some(value);
        self.len += 1;
    }

    /// Remove from the front. Returns `None` (and does nothing) when empty.
    pub fn pop(&mut self) -> Option<T> {
        if self.is_empty() {
            return None;
        }
        let value = self.slots[self.head].take();
        self.head = fast_mod(self.head + 1, N);
        self.len -= 1;
        value
    }

    /// Oldest element
    pub fn front(&self) -> Option<&T> {
        if self.is_empty() {
            return None;
        }
        self.slots[self.head].as_ref()
    }

    /// Newest element
    pub fn back(&self) -> Option<&T> {
        if self.is_empty() {
            return None;
        }
        self.slots[fast_mod(self.head + self.len - 1, N)].as_ref()
    }

    /// Drop every queued element
    pub fn clear(&mut self) {
        while self.pop().is_some() {}
        self.head = 0;
    }
}

impl<T, const N: usize> Default for CircularQueue<T, N> {
    fn default() -> Self {
        Self::new()
    }
}

// =============================================================================
// Tests
// =============================================================================
