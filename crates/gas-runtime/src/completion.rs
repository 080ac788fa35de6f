//! `CompletionQueue` - finished requests waiting for the harness.
//!
//! Multi-producer (every worker thread) / single-consumer (the harness
//! thread). A single mutex guards the queue and is held only for the
//! push or the pop batch, never across backend work.
//!
//! Two wait strategies for the consumer:
//!
//! - `PollMode::Notify`: wait on a condvar; each push signals it, so the
//!   harness wakes as soon as a completion lands.
//! - `PollMode::Sleep`: drop the lock, sleep a fixed interval, re-check.
//!   Simple, but up to one interval late.
//!
//! Both preserve the same batch contract: entries come out in push
//! order (actual finish order), at most `max` per call, and the call
//! returns only once `min` have been collected (or a deadline passes).

use std::sync::{Condvar, Mutex, MutexGuard, PoisonError};
use std::thread;
use std::time::{Duration, Instant};

use gas_core::config::PollMode;
use gas_core::error::Result;
use gas_core::queue::BoundedQueue;
use gas_core::request::RequestHandle;

use tracing::trace;

pub struct CompletionQueue {
    done: Mutex<BoundedQueue<RequestHandle>>,
    ready: Condvar,
}

impl CompletionQueue {
    pub fn new(capacity: usize) -> Result<Self> {
        Ok(Self {
            done: Mutex::new(BoundedQueue::new(capacity)?),
            ready: Condvar::new(),
        })
    }

    /// Worker side: append a finished request and wake the consumer.
    ///
    /// Returns the queue length after the push.
    pub fn push(&self, request: RequestHandle) -> usize {
        let used = {
            let mut done = self.lock();
            done.push(request);
            done.used()
        };
        self.ready.notify_one();
        used
    }

    /// Finished requests not yet collected.
    pub fn used(&self) -> usize {
        self.lock().used()
    }

    /// Consumer side: append completions to `out` until it holds at
    /// least `min` entries, never more than `max`.
    ///
    /// With a `deadline`, returns once it passes even if fewer than `min`
    /// were collected. Without one, blocks until `min` is reached.
    pub fn collect(
        &self,
        out: &mut Vec<RequestHandle>,
        min: usize,
        max: usize,
        mode: PollMode,
        interval: Duration,
        deadline: Option<Instant>,
    ) {
        debug_assert!(min <= max);
        match mode {
            PollMode::Notify => self.collect_notify(out, min, max, deadline),
            PollMode::Sleep => self.collect_sleep(out, min, max, interval, deadline),
        }
    }

    fn collect_notify(
        &self,
        out: &mut Vec<RequestHandle>,
        min: usize,
        max: usize,
        deadline: Option<Instant>,
    ) {
        let mut done = self.lock();
        loop {
            drain_into(&mut done, out, max);
            if out.len() >= min {
                return;
            }
            done = match deadline {
                None => self.ready.wait(done).unwrap_or_else(PoisonError::into_inner),
                Some(deadline) => {
                    let now = Instant::now();
                    if now >= deadline {
                        return;
                    }
                    self.ready
                        .wait_timeout(done, deadline - now)
                        .unwrap_or_else(PoisonError::into_inner)
                        .0
                }
            };
        }
    }

    fn collect_sleep(
        &self,
        out: &mut Vec<RequestHandle>,
        min: usize,
        max: usize,
        interval: Duration,
        deadline: Option<Instant>,
    ) {
        loop {
            {
                let mut done = self.lock();
                trace!(done_used = done.used(), collected = out.len(), "completion check");
                drain_into(&mut done, out, max);
            }
            if out.len() >= min {
                return;
            }
            if deadline.is_some_and(|d| Instant::now() >= d) {
                return;
            }
            thread::sleep(interval);
        }
    }

    fn lock(&self) -> MutexGuard<'_, BoundedQueue<RequestHandle>> {
        self.done.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Pop up to `max - out.len()` entries, oldest first.
fn drain_into(done: &mut BoundedQueue<RequestHandle>, out: &mut Vec<RequestHandle>, max: usize) {
    let take = done.used().min(max.saturating_sub(out.len()));
    for _ in 0..take {
        out.push(done.pop());
    }
}
