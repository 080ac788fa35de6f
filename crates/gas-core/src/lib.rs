//! # gas-core - Generic ASync framework, trait and type definitions
//!
//! GAS lets a synchronous, pull-based harness drive arbitrary blocking
//! work (disk reads, remote fetches, synthetic delays) through an
//! asynchronous submit / commit / poll / fetch protocol. The work itself
//! runs on a fixed pool of OS threads.
//!
//! This crate holds everything the runtime and the backends agree on:
//!
//! - [`queue::BoundedQueue`]: fixed-capacity FIFO used for both the
//!   submission queue and the completion queue.
//! - [`request::Request`]: the per-request record shared between the
//!   harness thread and a worker thread.
//! - [`backend::Backend`]: the single extension point, one `work()` call
//!   per request, with a per-worker [`backend::WorkerContext`].
//! - [`pool::WorkerPool`]: the capability the engine dispatches onto.
//! - [`config::EngineConfig`]: depth and polling knobs with env overrides.
//!
//! Concrete implementations live in `gas-runtime` (pool, engine) and
//! `gas-backends` (sleep, local read, object store).

pub mod backend;
pub mod config;
pub mod env;
pub mod error;
pub mod pool;
pub mod queue;
pub mod request;

pub use backend::{Backend, FnBackend, WorkerContext};
pub use config::{EngineConfig, PollMode};
pub use error::{GasError, RequestError, Result};
pub use pool::{Job, WorkerPool};
pub use queue::BoundedQueue;
pub use request::{DataDirection, EngineId, IoUnit, Request, RequestHandle, RequestState};
