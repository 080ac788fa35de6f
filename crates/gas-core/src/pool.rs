//! Worker pool abstraction.
//!
//! The engine treats the pool as an opaque capability: hand it a job,
//! the job runs exactly once on some worker thread, concurrently with
//! other jobs, up to the pool's thread count. No completion ordering is
//! promised.
//!
//! # Implementors
//!
//! - `FixedPool` (default, `gas-runtime`): spawns N OS threads at
//!   creation. N = engine depth. Each thread owns one `WorkerContext`.

use crate::backend::WorkerContext;
use crate::error::Result;

/// A unit of work for the pool. Receives the executing worker's context.
pub type Job = Box<dyn FnOnce(&mut WorkerContext) + Send + 'static>;

/// Executes jobs on a fixed set of threads.
///
/// **Contract:**
/// - `execute()` must never block the caller. If the pool cannot take
///   the job it returns `Err(WorkerUnavailable)`, or `Err(ShutDown)`
///   once `shutdown()` has run.
/// - Jobs may block; that's the point.
/// - `shutdown()` lets queued jobs finish, then joins the workers.
pub trait WorkerPool: Send + Sync {
    /// Queue a job for execution on a worker thread.
    fn execute(&self, job: Job) -> Result<()>;

    /// Workers currently running a job.
    fn active_workers(&self) -> usize;

    /// Total number of workers (busy + idle).
    fn total_workers(&self) -> usize;

    /// Jobs accepted but not yet picked up by a worker.
    fn pending(&self) -> usize;

    /// Drain queued jobs and join all workers. Idempotent.
    fn shutdown(&mut self);
}
