//! Engine counters.

use std::sync::atomic::{AtomicU64, Ordering};

/// Monotonic counters, shared with worker threads.
#[derive(Debug, Default)]
pub struct EngineStats {
    submitted: AtomicU64,
    busy: AtomicU64,
    dispatched: AtomicU64,
    completed: AtomicU64,
    retrieved: AtomicU64,
    errors: AtomicU64,
}

/// Point-in-time copy of [`EngineStats`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StatsSnapshot {
    /// Accepted by `submit`.
    pub submitted: u64,
    /// Rejected by `submit` with `Busy`.
    pub busy: u64,
    /// Handed to the pool by `commit`.
    pub dispatched: u64,
    /// Backend returned.
    pub completed: u64,
    /// Collected by `poll`.
    pub retrieved: u64,
    /// Collected with an error recorded.
    pub errors: u64,
}

impl EngineStats {
    pub(crate) fn on_submit(&self) {
        self.submitted.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn on_busy(&self) {
        self.busy.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn on_dispatch(&self) {
        self.dispatched.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn on_complete(&self) {
        self.completed.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn on_retrieve(&self, errored: bool) {
        self.retrieved.fetch_add(1, Ordering::Relaxed);
        if errored {
            self.errors.fetch_add(1, Ordering::Relaxed);
        }
    }

    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            submitted: self.submitted.load(Ordering::Relaxed),
            busy: self.busy.load(Ordering::Relaxed),
            dispatched: self.dispatched.load(Ordering::Relaxed),
            completed: self.completed.load(Ordering::Relaxed),
            retrieved: self.retrieved.load(Ordering::Relaxed),
            errors: self.errors.load(Ordering::Relaxed),
        }
    }
}
