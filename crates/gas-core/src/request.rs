//! Request record - one per concurrently issued harness request.
//!
//! A `Request` correlates the harness-level I/O unit with the engine that
//! prepared it, the outcome the backend recorded, and a backend-private
//! scratch slot. The harness owns the handle and recycles it across many
//! requests; the queues only hold clones of the `Arc`.
//!
//! # Lifecycle
//!
//! ```text
//! Idle ──prepare──> Prepared ──submit──> Queued ──commit──> Dispatched
//!                     ^                                         │ worker
//!                     │                                         v
//!                  prepare <── Retrieved <──poll── Completed ───┘
//! ```
//!
//! Every transition is a compare-and-swap on the state word. A transition
//! from the wrong state means the harness broke the depth contract
//! (double submit, re-prepare while in flight) and panics.

use std::any::Any;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, AtomicU8, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use crate::error::RequestError;

/// Identifies the engine a request was prepared by.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(transparent)]
pub struct EngineId(pub u64);

impl EngineId {
    /// Process-unique id for a new engine.
    pub fn next() -> Self {
        static NEXT: AtomicU64 = AtomicU64::new(1);
        Self(NEXT.fetch_add(1, Ordering::Relaxed))
    }
}

impl fmt::Display for EngineId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "gas#{}", self.0)
    }
}

/// Direction of a harness request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DataDirection {
    Read,
    Write,
    Trim,
    Sync,
}

/// The harness-level request: what to do, on which file, where.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IoUnit {
    /// Harness slot index, handy for recycling.
    pub index: usize,
    pub direction: DataDirection,
    pub file_name: PathBuf,
    pub offset: u64,
    pub len: u64,
}

impl IoUnit {
    pub fn read(index: usize, file_name: impl Into<PathBuf>, offset: u64, len: u64) -> Self {
        Self {
            index,
            direction: DataDirection::Read,
            file_name: file_name.into(),
            offset,
            len,
        }
    }
}

/// Request lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum RequestState {
    /// Allocated, never prepared.
    Idle = 0,
    /// Ready to be submitted.
    Prepared = 1,
    /// In the submission queue.
    Queued = 2,
    /// Handed to the worker pool.
    Dispatched = 3,
    /// Backend returned; sitting in the completion queue.
    Completed = 4,
    /// Collected by `poll`, readable via `fetch`.
    Retrieved = 5,
}

impl From<u8> for RequestState {
    fn from(v: u8) -> Self {
        match v {
            1 => RequestState::Prepared,
            2 => RequestState::Queued,
            3 => RequestState::Dispatched,
            4 => RequestState::Completed,
            5 => RequestState::Retrieved,
            _ => RequestState::Idle,
        }
    }
}

struct RequestBody {
    unit: IoUnit,
    error: Option<RequestError>,
    transferred: u64,
    issued_at: Option<Instant>,
    completed_at: Option<Instant>,
    backend_data: Option<Box<dyn Any + Send>>,
}

/// Shared handle to a request record.
pub type RequestHandle = Arc<Request>;

pub struct Request {
    engine: EngineId,
    state: AtomicU8,
    body: Mutex<RequestBody>,
}

impl Request {
    /// New record owned by `engine`, already in `Prepared` state.
    pub fn new(engine: EngineId, unit: IoUnit) -> RequestHandle {
        Arc::new(Self {
            engine,
            state: AtomicU8::new(RequestState::Prepared as u8),
            body: Mutex::new(RequestBody {
                unit,
                error: None,
                transferred: 0,
                issued_at: None,
                completed_at: None,
                backend_data: None,
            }),
        })
    }

    /// Re-initialize a recycled record for a new unit.
    ///
    /// Outcome and timestamps are cleared. The backend scratch slot is
    /// kept: backends use it as a cache across reuses.
    ///
    /// # Panics
    /// If the request is still queued, dispatched or awaiting retrieval.
    pub fn reset(&self, unit: IoUnit) {
        let state = self.state();
        assert!(
            matches!(
                state,
                RequestState::Idle | RequestState::Prepared | RequestState::Retrieved
            ),
            "re-prepare of request in state {:?}",
            state
        );
        {
            let mut body = self.body();
            body.unit = unit;
            body.error = None;
            body.transferred = 0;
            body.issued_at = None;
            body.completed_at = None;
        }
        self.state.store(RequestState::Prepared as u8, Ordering::Release);
    }

    #[inline]
    pub fn engine(&self) -> EngineId {
        self.engine
    }

    #[inline]
    pub fn state(&self) -> RequestState {
        RequestState::from(self.state.load(Ordering::Acquire))
    }

    /// Move `from` → `to`.
    ///
    /// # Panics
    /// If the current state is not `from`.
    pub fn transition(&self, from: RequestState, to: RequestState) {
        if let Err(actual) = self.state.compare_exchange(
            from as u8,
            to as u8,
            Ordering::AcqRel,
            Ordering::Acquire,
        ) {
            panic!(
                "request state {:?} -> {:?} attempted from {:?}",
                from,
                to,
                RequestState::from(actual)
            );
        }
    }

    // ── Harness-level unit ──

    pub fn unit(&self) -> IoUnit {
        self.body().unit.clone()
    }

    pub fn index(&self) -> usize {
        self.body().unit.index
    }

    pub fn direction(&self) -> DataDirection {
        self.body().unit.direction
    }

    pub fn offset(&self) -> u64 {
        self.body().unit.offset
    }

    pub fn len(&self) -> u64 {
        self.body().unit.len
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn file_name(&self) -> PathBuf {
        self.body().unit.file_name.clone()
    }

    /// Run `f` against the file name without cloning it.
    pub fn with_file_name<R>(&self, f: impl FnOnce(&Path) -> R) -> R {
        f(&self.body().unit.file_name)
    }

    // ── Outcome (written by the backend) ──

    pub fn set_error(&self, err: RequestError) {
        self.body().error = Some(err);
    }

    pub fn error(&self) -> Option<RequestError> {
        self.body().error.clone()
    }

    pub fn is_ok(&self) -> bool {
        self.body().error.is_none()
    }

    pub fn add_transferred(&self, bytes: u64) {
        self.body().transferred += bytes;
    }

    pub fn set_transferred(&self, bytes: u64) {
        self.body().transferred = bytes;
    }

    pub fn transferred(&self) -> u64 {
        self.body().transferred
    }

    // ── Timing ──

    pub fn mark_issued(&self, at: Instant) {
        self.body().issued_at = Some(at);
    }

    pub fn mark_completed(&self, at: Instant) {
        self.body().completed_at = Some(at);
    }

    pub fn issued_at(&self) -> Option<Instant> {
        self.body().issued_at
    }

    /// Issue-to-completion time, once both ends are stamped.
    pub fn latency(&self) -> Option<Duration> {
        let body = self.body();
        match (body.issued_at, body.completed_at) {
            (Some(issued), Some(done)) => Some(done.saturating_duration_since(issued)),
            _ => None,
        }
    }

    // ── Backend scratch ──

    /// Run `f` with the backend's private data of type `T`, creating it
    /// with `T::default()` if absent or of another type.
    pub fn backend_data<T, R>(&self, f: impl FnOnce(&mut T) -> R) -> R
    where
        T: Default + Send + 'static,
    {
        let mut body = self.body();
        let slot = &mut body.backend_data;
        if !slot.as_ref().is_some_and(|d| d.is::<T>()) {
            *slot = Some(Box::new(T::default()));
        }
        let data = slot
            .as_mut()
            .and_then(|d| d.downcast_mut::<T>())
            .expect("backend data slot just set to T");
        f(data)
    }

    fn body(&self) -> MutexGuard<'_, RequestBody> {
        // A panicking backend is caught by the engine; the body stays usable.
        self.body.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl fmt::Debug for Request {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let body = self.body();
        f.debug_struct("Request")
            .field("engine", &self.engine)
            .field("state", &self.state())
            .field("unit", &body.unit)
            .field("error", &body.error)
            .field("transferred", &body.transferred)
            .finish()
    }
}
