//! `BoundedQueue` - fixed-capacity FIFO of handles.
//!
//! Used twice per engine: once for requests accepted but not yet
//! dispatched (submission queue), once for requests whose work finished
//! but that the harness has not retrieved yet (completion queue).
//!
//! ```text
//!            head (next write)
//!              v
//! [ C ][ _ ][ _ ][ A ][ B ]      capacity = 5, used = 3
//!                  ^
//!                  oldest = (head + capacity - used) % capacity
//! ```
//!
//! No internal synchronization. The submission queue is touched only by
//! the harness thread; the completion queue is wrapped in a mutex by the
//! runtime.
//!
//! Pushing into a full queue or popping an empty one is a contract
//! violation and panics: every queue is sized to the engine depth and the
//! engine never admits more than that.

use crate::error::{GasError, Result};

#[derive(Debug)]
pub struct BoundedQueue<T> {
    slots: Box<[Option<T>]>,
    used: usize,
    head: usize,
}

impl<T> BoundedQueue<T> {
    /// Allocate an empty queue. Fails only for a zero capacity.
    pub fn new(capacity: usize) -> Result<Self> {
        if capacity == 0 {
            return Err(GasError::InvalidDepth(capacity));
        }
        let slots = (0..capacity).map(|_| None).collect::<Vec<_>>().into_boxed_slice();
        Ok(Self { slots, used: 0, head: 0 })
    }

    /// Append at head.
    ///
    /// # Panics
    /// If the queue is full.
    pub fn push(&mut self, item: T) {
        assert!(
            self.used < self.capacity(),
            "BoundedQueue::push on full queue (capacity {})",
            self.capacity()
        );
        self.slots[self.head] = Some(item);
        self.head = (self.head + 1) % self.capacity();
        self.used += 1;
    }

    /// Remove and return the oldest entry.
    ///
    /// # Panics
    /// If the queue is empty.
    pub fn pop(&mut self) -> T {
        assert!(self.used > 0, "BoundedQueue::pop on empty queue");
        let cap = self.capacity();
        let tail = (self.head + cap - self.used) % cap;
        self.used -= 1;
        self.slots[tail]
            .take()
            .expect("occupied slot between tail and head")
    }

    /// The entry `pop()` would return, left in place.
    pub fn front(&self) -> Option<&T> {
        if self.used == 0 {
            return None;
        }
        let cap = self.capacity();
        self.slots[(self.head + cap - self.used) % cap].as_ref()
    }

    /// Free slots.
    #[inline]
    pub fn available(&self) -> usize {
        self.capacity() - self.used
    }

    /// Occupied slots.
    #[inline]
    pub fn used(&self) -> usize {
        self.used
    }

    #[inline]
    pub fn capacity(&self) -> usize {
        self.slots.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.used == 0
    }

    #[inline]
    pub fn is_full(&self) -> bool {
        self.used == self.capacity()
    }
}
