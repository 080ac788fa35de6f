//! `FixedPool` - default `WorkerPool` implementation.
//!
//! Spawns N OS threads at creation. Workers pop jobs from a lock-free
//! bounded queue and run them with their own `WorkerContext`. Idle
//! workers wait on a shared doorbell; `execute()` rings it once, which
//! wakes exactly one idle worker, so a job never waits while a worker is
//! free. The park timeout only bounds how long an idle wait lasts.
//!
//! No dynamic scaling. N equals the engine depth, so every admitted
//! request has a thread to run on.

use gas_core::backend::WorkerContext;
use gas_core::error::{GasError, Result};
use gas_core::pool::{Job, WorkerPool};

use crossbeam_queue::ArrayQueue;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use tracing::{debug, trace};

/// Shared state between the submitting thread and workers.
struct PoolInner {
    /// Work queue: engine → workers.
    jobs: ArrayQueue<Job>,
    /// Number of workers currently running a job.
    active: AtomicUsize,
    /// Number of workers waiting on the doorbell.
    idle: AtomicUsize,
    /// Set once by `shutdown()`; workers exit when the queue is empty.
    shutdown: AtomicBool,
    /// Idle workers check the queue and wait under this lock.
    doorbell: Mutex<()>,
    ring: Condvar,
    /// Longest single idle wait before re-checking the queue.
    park_timeout: Duration,
}

impl PoolInner {
    fn lock(&self) -> MutexGuard<'_, ()> {
        self.doorbell.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

pub struct FixedPool {
    inner: Arc<PoolInner>,
    workers: usize,
    handles: Vec<JoinHandle<()>>,
}

impl FixedPool {
    /// Create a pool with `n` workers named `{name}-{i}`.
    ///
    /// The job queue holds up to `n` pending jobs: with N = depth the
    /// engine never has more than that outstanding.
    pub fn new(n: usize, name: &str, park_timeout: Duration) -> Result<Self> {
        if n == 0 {
            return Err(GasError::InvalidDepth(n));
        }
        let inner = Arc::new(PoolInner {
            jobs: ArrayQueue::new(n),
            active: AtomicUsize::new(0),
            idle: AtomicUsize::new(0),
            shutdown: AtomicBool::new(false),
            doorbell: Mutex::new(()),
            ring: Condvar::new(),
            park_timeout,
        });

        let mut pool = FixedPool {
            inner,
            workers: n,
            handles: Vec::with_capacity(n),
        };

        for worker_id in 0..n {
            let inner = Arc::clone(&pool.inner);
            let spawned = thread::Builder::new()
                .name(format!("{}-{}", name, worker_id))
                .spawn(move || worker_loop(inner, worker_id));
            match spawned {
                Ok(handle) => pool.handles.push(handle),
                Err(e) => {
                    // Already-started workers are joined by Drop.
                    return Err(GasError::Spawn(e));
                }
            }
        }

        debug!(workers = n, prefix = name, "fixed pool started");
        Ok(pool)
    }

    /// Workers currently waiting for a job.
    pub fn idle_workers(&self) -> usize {
        self.inner.idle.load(Ordering::Relaxed)
    }
}

impl WorkerPool for FixedPool {
    fn execute(&self, job: Job) -> Result<()> {
        if self.inner.shutdown.load(Ordering::Acquire) {
            return Err(GasError::ShutDown);
        }
        self.inner
            .jobs
            .push(job)
            .map_err(|_| GasError::WorkerUnavailable)?;
        // A worker holds the lock from its empty-queue check until it
        // waits, so taking it here cannot slip between the two.
        let _guard = self.inner.lock();
        self.inner.ring.notify_one();
        Ok(())
    }

    fn active_workers(&self) -> usize {
        self.inner.active.load(Ordering::Relaxed)
    }

    fn total_workers(&self) -> usize {
        self.workers
    }

    fn pending(&self) -> usize {
        self.inner.jobs.len()
    }

    fn shutdown(&mut self) {
        if self.handles.is_empty() {
            return;
        }
        self.inner.shutdown.store(true, Ordering::SeqCst);
        {
            let _guard = self.inner.lock();
            self.inner.ring.notify_all();
        }
        let n = self.handles.len();
        for handle in self.handles.drain(..) {
            // A worker only dies early if a job panicked past the engine's guard.
            let _ = handle.join();
        }
        debug!(workers = n, "fixed pool stopped");
    }
}

impl Drop for FixedPool {
    fn drop(&mut self) {
        self.shutdown();
    }
}

/// Worker thread main loop.
fn worker_loop(inner: Arc<PoolInner>, worker_id: usize) {
    let mut ctx = WorkerContext::new(worker_id);
    loop {
        if let Some(job) = inner.jobs.pop() {
            inner.active.fetch_add(1, Ordering::Relaxed);
            job(&mut ctx);
            inner.active.fetch_sub(1, Ordering::Relaxed);
            continue;
        }
        if inner.shutdown.load(Ordering::Acquire) {
            break;
        }

        let guard = inner.lock();
        if !inner.jobs.is_empty() || inner.shutdown.load(Ordering::Acquire) {
            continue;
        }
        inner.idle.fetch_add(1, Ordering::Relaxed);
        let _ = inner
            .ring
            .wait_timeout(guard, inner.park_timeout)
            .unwrap_or_else(PoisonError::into_inner);
        inner.idle.fetch_sub(1, Ordering::Relaxed);
    }
    trace!(worker_id, locals = ctx.locals_len(), "worker exiting");
    // ctx drops here: per-worker backend resources are released.
}
