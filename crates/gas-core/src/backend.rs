//! Backend abstraction - the unit of work behind every request.
//!
//! A backend does one thing: given a request, perform it. It may block
//! (disk, network, sleep) for as long as it likes; it runs on a worker
//! thread and the worker pool is the only concurrency limiter.
//!
//! Backends report failure by recording a [`RequestError`] on the request
//! itself. There is no return channel: the framework does not look at
//! the outcome, the harness does after `fetch`.
//!
//! # Implementors
//!
//! - `SleepBackend`: synthetic fixed delay.
//! - `LocalReadBackend`: block-aligned buffered or `O_DIRECT` read.
//! - `ObjectStoreBackend`: HTTP range read from an object store.
//! - [`FnBackend`]: any closure, mostly for tests.
//!
//! [`RequestError`]: crate::error::RequestError

use std::any::{Any, TypeId};
use std::collections::HashMap;
use std::fmt;

use crate::request::Request;

/// Performs the work for one request.
///
/// **Contract:**
/// - `work()` is called exactly once per dispatched request, on a worker
///   thread, concurrently with other calls.
/// - It must record its own success or failure on `request`.
/// - Long-lived per-thread resources (clients, aligned buffers) go in
///   `ctx`, not in thread-locals.
pub trait Backend: Send + Sync + 'static {
    /// Short name for logs.
    fn name(&self) -> &str;

    fn work(&self, ctx: &mut WorkerContext, request: &Request);
}

/// Adapter turning a closure into a [`Backend`].
pub struct FnBackend<F> {
    name: String,
    f: F,
}

impl<F> FnBackend<F>
where
    F: Fn(&mut WorkerContext, &Request) + Send + Sync + 'static,
{
    pub fn new(name: impl Into<String>, f: F) -> Self {
        Self { name: name.into(), f }
    }
}

impl<F> Backend for FnBackend<F>
where
    F: Fn(&mut WorkerContext, &Request) + Send + Sync + 'static,
{
    fn name(&self) -> &str {
        &self.name
    }

    fn work(&self, ctx: &mut WorkerContext, request: &Request) {
        (self.f)(ctx, request)
    }
}

/// Per-worker-thread execution context.
///
/// Owned by the worker thread for its whole life and handed to every
/// job it runs. Backends keep lazily created resources here, keyed by
/// type; they are dropped when the worker thread exits.
pub struct WorkerContext {
    worker_id: usize,
    locals: HashMap<TypeId, Box<dyn Any + Send>>,
}

impl WorkerContext {
    pub fn new(worker_id: usize) -> Self {
        Self {
            worker_id,
            locals: HashMap::new(),
        }
    }

    #[inline]
    pub fn worker_id(&self) -> usize {
        self.worker_id
    }

    /// Get this worker's `T`, creating it with `init` on first use.
    pub fn local<T, F>(&mut self, init: F) -> &mut T
    where
        T: Any + Send,
        F: FnOnce() -> T,
    {
        self.locals
            .entry(TypeId::of::<T>())
            .or_insert_with(|| Box::new(init()))
            .downcast_mut::<T>()
            .expect("worker local keyed by its own TypeId")
    }

    /// Like [`local`](Self::local) for fallible initialization. Nothing is
    /// stored when `init` fails, so the next call retries.
    pub fn try_local<T, E, F>(&mut self, init: F) -> Result<&mut T, E>
    where
        T: Any + Send,
        F: FnOnce() -> Result<T, E>,
    {
        let key = TypeId::of::<T>();
        if !self.locals.contains_key(&key) {
            let value = init()?;
            self.locals.insert(key, Box::new(value));
        }
        Ok(self
            .locals
            .get_mut(&key)
            .and_then(|b| b.downcast_mut::<T>())
            .expect("worker local keyed by its own TypeId"))
    }

    pub fn has_local<T: Any + Send>(&self) -> bool {
        self.locals.contains_key(&TypeId::of::<T>())
    }

    /// Remove and return this worker's `T`.
    pub fn take_local<T: Any + Send>(&mut self) -> Option<T> {
        self.locals
            .remove(&TypeId::of::<T>())
            .and_then(|b| b.downcast::<T>().ok())
            .map(|b| *b)
    }

    /// Number of resources currently held.
    pub fn locals_len(&self) -> usize {
        self.locals.len()
    }
}

impl fmt::Debug for WorkerContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WorkerContext")
            .field("worker_id", &self.worker_id)
            .field("locals", &self.locals.len())
            .finish()
    }
}
