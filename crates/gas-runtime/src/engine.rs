//! `Engine` - the harness-facing submit / commit / poll / fetch contract.
//!
//! One engine per harness session. The harness thread drives every
//! method; worker threads only ever touch the completion queue and the
//! request they were given.
//!
//! ```text
//! prepare ─> submit ─┬─> Queued   (submission queue, harness-only)
//!                    └─> Busy     (depth reached, nothing changed)
//! commit  ─> drain submission queue FIFO ─> pool.execute(job) each
//! job     ─> backend.work(ctx, req) ─> lock ─> completion queue ─> unlock
//! poll    ─> collect min..=max completions into the retrieved batch
//! fetch   ─> retrieved[i]
//! ```
//!
//! # Depth
//!
//! `depth` sizes both queues, the retrieved batch and the worker pool.
//! `submit` refuses once `depth` requests are in flight (accepted and not
//! yet collected by `poll`), so neither queue can overflow and every
//! dispatched request has a worker thread.
//!
//! # Contract violations
//!
//! Polling with `min == 0` or `min > max`, polling for more completions
//! than were dispatched, fetching past the last poll count, submitting a
//! request twice or to a foreign engine: all panic.

use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::time::{Duration, Instant};

use gas_core::backend::{Backend, WorkerContext};
use gas_core::config::{EngineConfig, PollMode};
use gas_core::error::{GasError, RequestError, Result};
use gas_core::pool::{Job, WorkerPool};
use gas_core::queue::BoundedQueue;
use gas_core::request::{DataDirection, EngineId, IoUnit, Request, RequestHandle, RequestState};

use tracing::{debug, info, trace, warn};

use crate::completion::CompletionQueue;
use crate::fixed_pool::FixedPool;
use crate::stats::{EngineStats, StatsSnapshot};

/// Outcome of [`Engine::submit`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubmitStatus {
    /// Accepted into the submission queue; dispatched by the next commit.
    Queued,
    /// Depth reached. Nothing changed; retry after retrieving completions.
    Busy,
}

/// What [`Engine::shutdown`] had to do.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ShutdownReport {
    /// Dispatched requests waited for and collected.
    pub drained: usize,
    /// Submitted but never committed; returned to `Prepared`.
    pub discarded: usize,
}

/// State shared with worker threads.
struct Shared {
    completions: CompletionQueue,
    stats: EngineStats,
}

pub struct Engine<P: WorkerPool = FixedPool> {
    id: EngineId,
    config: EngineConfig,
    /// Accepted, not yet dispatched. Harness thread only.
    submissions: BoundedQueue<RequestHandle>,
    shared: Arc<Shared>,
    /// Batch collected by the last `poll`, read by `fetch`.
    retrieved: Vec<RequestHandle>,
    backend: Option<Arc<dyn Backend>>,
    pool: P,
    /// Accepted by `submit`, not yet collected by `poll`.
    in_flight: usize,
    closed: bool,
}

impl Engine<FixedPool> {
    /// Start an engine with a `FixedPool` of exactly `config.depth` workers.
    pub fn init(config: EngineConfig) -> Result<Self> {
        config.validate()?;
        let pool = FixedPool::new(config.depth, &config.worker_name, config.park_timeout)?;
        Self::with_pool(config, pool)
    }

    /// `init` followed by `bind_worker`.
    pub fn start<B: Backend>(config: EngineConfig, backend: B) -> Result<Self> {
        let mut engine = Self::init(config)?;
        engine.bind_worker(backend);
        Ok(engine)
    }
}

impl<P: WorkerPool> Engine<P> {
    /// Start an engine on a caller-provided pool.
    pub fn with_pool(config: EngineConfig, pool: P) -> Result<Self> {
        config.validate()?;
        if pool.total_workers() < config.depth {
            warn!(
                depth = config.depth,
                workers = pool.total_workers(),
                "pool smaller than depth; dispatched work may wait for a worker"
            );
        }
        let depth = config.depth;
        let engine = Self {
            id: EngineId::next(),
            submissions: BoundedQueue::new(depth)?,
            shared: Arc::new(Shared {
                completions: CompletionQueue::new(depth)?,
                stats: EngineStats::default(),
            }),
            retrieved: Vec::with_capacity(depth),
            backend: None,
            pool,
            in_flight: 0,
            closed: false,
            config,
        };
        info!(
            engine = %engine.id,
            depth,
            poll_mode = %engine.config.poll_mode,
            "engine started"
        );
        Ok(engine)
    }

    /// Bind the backend that performs every request of this engine.
    pub fn bind_worker<B: Backend>(&mut self, backend: B) {
        self.bind_backend(Arc::new(backend));
    }

    /// Like [`bind_worker`](Self::bind_worker) for an already shared backend.
    ///
    /// # Panics
    /// If requests are in flight.
    pub fn bind_backend(&mut self, backend: Arc<dyn Backend>) {
        assert_eq!(
            self.in_flight, 0,
            "backend rebound with {} requests in flight",
            self.in_flight
        );
        debug!(engine = %self.id, backend = backend.name(), "backend bound");
        self.backend = Some(backend);
    }

    // ── Accessors ──

    pub fn id(&self) -> EngineId {
        self.id
    }

    pub fn depth(&self) -> usize {
        self.config.depth
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn backend_name(&self) -> Option<&str> {
        self.backend.as_deref().map(|b| b.name())
    }

    /// Accepted by `submit`, not yet collected by `poll`.
    pub fn in_flight(&self) -> usize {
        self.in_flight
    }

    /// Waiting in the submission queue for `commit`.
    pub fn queued(&self) -> usize {
        self.submissions.used()
    }

    /// Finished, waiting in the completion queue for `poll`.
    pub fn completed(&self) -> usize {
        self.shared.completions.used()
    }

    pub fn pool(&self) -> &P {
        &self.pool
    }

    pub fn stats(&self) -> StatsSnapshot {
        self.shared.stats.snapshot()
    }

    // ── Harness contract ──

    /// Bind `unit` to a request handle for this engine.
    ///
    /// `slot` is the harness's per-unit cache: empty on first use, then
    /// the same record is re-initialized for every later request.
    pub fn prepare(&self, slot: &mut Option<RequestHandle>, unit: IoUnit) -> RequestHandle {
        if unit.direction != DataDirection::Read {
            warn!(engine = %self.id, direction = ?unit.direction, "only reads are supported");
        }
        match slot {
            Some(request) if request.engine() == self.id => {
                request.reset(unit);
                Arc::clone(request)
            }
            _ => {
                let request = Request::new(self.id, unit);
                *slot = Some(Arc::clone(&request));
                request
            }
        }
    }

    /// Accept one prepared request into the submission queue.
    ///
    /// # Panics
    /// If `request` belongs to another engine or is not `Prepared`.
    pub fn submit(&mut self, request: &RequestHandle) -> SubmitStatus {
        assert_eq!(
            request.engine(),
            self.id,
            "request submitted to an engine that did not prepare it"
        );
        if self.submissions.is_full() || self.in_flight >= self.config.depth {
            self.shared.stats.on_busy();
            trace!(engine = %self.id, in_flight = self.in_flight, "submit busy");
            return SubmitStatus::Busy;
        }

        request.transition(RequestState::Prepared, RequestState::Queued);
        self.submissions.push(Arc::clone(request));
        self.in_flight += 1;
        self.shared.stats.on_submit();
        trace!(
            engine = %self.id,
            index = request.index(),
            queued = self.submissions.used(),
            "request queued"
        );
        SubmitStatus::Queued
    }

    /// Dispatch every queued request to the pool, oldest first.
    ///
    /// Returns how many were dispatched. Returning says nothing about
    /// whether any work has started or finished.
    pub fn commit(&mut self) -> Result<usize> {
        if self.submissions.is_empty() {
            return Ok(0);
        }
        let backend = self.backend.clone().ok_or(GasError::NoBackend)?;

        let mut dispatched = 0;
        while let Some(front) = self.submissions.front() {
            let request = Arc::clone(front);
            request.transition(RequestState::Queued, RequestState::Dispatched);
            request.mark_issued(Instant::now());

            let job = completion_job(Arc::clone(&backend), Arc::clone(&self.shared), Arc::clone(&request));
            if let Err(e) = self.pool.execute(job) {
                // Leave it queued; the next commit retries.
                request.transition(RequestState::Dispatched, RequestState::Queued);
                warn!(engine = %self.id, error = %e, dispatched, "pool refused work");
                return Err(e);
            }
            self.submissions.pop();
            self.shared.stats.on_dispatch();
            dispatched += 1;
        }
        debug!(engine = %self.id, dispatched, in_flight = self.in_flight, "commit");
        Ok(dispatched)
    }

    /// Block until at least `min` completions are available, collect up to
    /// `max` of them, and return how many were collected.
    ///
    /// Collected requests are then readable with [`fetch`](Self::fetch)
    /// in finish order until the next poll.
    ///
    /// # Panics
    /// If `min == 0`, `min > max`, or `min` exceeds the number of
    /// dispatched, not yet collected requests (the call could never return).
    pub fn poll(&mut self, min: usize, max: usize) -> usize {
        check_poll_args(min, max);
        let outstanding = self.in_flight - self.submissions.used();
        assert!(
            min <= outstanding,
            "poll(min={}) with only {} requests dispatched",
            min,
            outstanding
        );
        self.collect(min, max, None)
    }

    /// Like [`poll`](Self::poll), but gives up after `timeout`, possibly
    /// returning fewer than `min` (even zero) completions.
    pub fn poll_timeout(&mut self, min: usize, max: usize, timeout: Duration) -> usize {
        check_poll_args(min, max);
        let deadline = Instant::now().checked_add(timeout);
        self.collect(min, max, deadline)
    }

    /// The `index`-th request of the last poll batch.
    ///
    /// # Panics
    /// If `index` is not below the last poll count.
    pub fn fetch(&self, index: usize) -> RequestHandle {
        assert!(
            index < self.retrieved.len(),
            "fetch({}) beyond last poll count {}",
            index,
            self.retrieved.len()
        );
        Arc::clone(&self.retrieved[index])
    }

    /// The whole batch collected by the last poll.
    pub fn retrieved(&self) -> &[RequestHandle] {
        &self.retrieved
    }

    /// In-flight work always runs to completion.
    pub fn cancel(&self, request: &RequestHandle) -> Result<()> {
        trace!(engine = %self.id, index = request.index(), "cancel not supported");
        Err(GasError::CancelUnsupported)
    }

    /// Stop the engine: discard never-committed submissions, wait for all
    /// dispatched work, then join the worker threads.
    pub fn shutdown(mut self) -> ShutdownReport {
        self.close()
    }

    // ── Internals ──

    fn collect(&mut self, min: usize, max: usize, deadline: Option<Instant>) -> usize {
        let max = max.min(self.config.depth);
        let min = min.min(max);
        self.retrieved.clear();
        self.shared.completions.collect(
            &mut self.retrieved,
            min,
            max,
            self.config.poll_mode,
            self.config.poll_interval,
            deadline,
        );
        self.account_retrieved();
        debug!(
            engine = %self.id,
            collected = self.retrieved.len(),
            in_flight = self.in_flight,
            "poll"
        );
        self.retrieved.len()
    }

    fn account_retrieved(&mut self) {
        for request in &self.retrieved {
            request.transition(RequestState::Completed, RequestState::Retrieved);
            self.shared.stats.on_retrieve(!request.is_ok());
        }
        self.in_flight -= self.retrieved.len();
    }

    fn close(&mut self) -> ShutdownReport {
        if self.closed {
            return ShutdownReport::default();
        }
        self.closed = true;

        let mut discarded = 0;
        while !self.submissions.is_empty() {
            let request = self.submissions.pop();
            request.transition(RequestState::Queued, RequestState::Prepared);
            discarded += 1;
        }
        self.in_flight -= discarded;
        if discarded > 0 {
            warn!(engine = %self.id, discarded, "uncommitted requests discarded at shutdown");
        }

        let mut drained = 0;
        while self.in_flight > 0 {
            let want = self.in_flight.min(self.config.depth);
            self.retrieved.clear();
            self.shared.completions.collect(
                &mut self.retrieved,
                1,
                want,
                PollMode::Notify,
                self.config.poll_interval,
                None,
            );
            drained += self.retrieved.len();
            self.account_retrieved();
        }
        self.retrieved.clear();

        self.pool.shutdown();
        info!(engine = %self.id, drained, discarded, "engine stopped");
        ShutdownReport { drained, discarded }
    }
}

impl<P: WorkerPool> Drop for Engine<P> {
    fn drop(&mut self) {
        if std::thread::panicking() {
            // Don't wait on request state during unwinding; the pool's own
            // Drop still joins its workers.
            self.closed = true;
            return;
        }
        self.close();
    }
}

fn check_poll_args(min: usize, max: usize) {
    assert!(min > 0, "poll requires min > 0");
    assert!(min <= max, "poll requires min <= max (min={}, max={})", min, max);
}

/// The wrapped work function: run the backend, then publish completion.
fn completion_job(backend: Arc<dyn Backend>, shared: Arc<Shared>, request: RequestHandle) -> Job {
    Box::new(move |ctx: &mut WorkerContext| {
        let index = request.index();
        trace!(worker = ctx.worker_id(), index, "work started");

        let outcome = panic::catch_unwind(AssertUnwindSafe(|| backend.work(ctx, &request)));
        if let Err(payload) = outcome {
            let msg = panic_message(payload.as_ref());
            warn!(backend = backend.name(), index, panic = %msg, "backend panicked");
            request.set_error(RequestError::Panicked(msg));
        }

        request.mark_completed(Instant::now());
        request.transition(RequestState::Dispatched, RequestState::Completed);
        shared.stats.on_complete();
        let done_used = shared.completions.push(request);
        trace!(worker = ctx.worker_id(), index, done_used, "work finished");
    })
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_string()
    }
}
