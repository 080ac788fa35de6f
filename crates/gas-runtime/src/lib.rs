//! # gas-runtime - Default GAS runtime
//!
//! | Piece             | Type              | Role                                   |
//! |-------------------|-------------------|----------------------------------------|
//! | `WorkerPool`      | `FixedPool`       | N OS threads, one `WorkerContext` each |
//! | completion queue  | `CompletionQueue` | mutex-guarded FIFO + wakeup            |
//! | harness contract  | `Engine`          | submit / commit / poll / fetch         |
//!
//! ```text
//! harness thread                         worker threads (depth)
//! ──────────────                         ─────────────────────
//! submit ─> [submission queue]
//! commit ─> drain ──────── execute ───>  backend.work(ctx, req)
//!                                            │
//! poll   <─ [completion queue] <── lock+push ┘
//! fetch  <─ [retrieved batch]
//! ```

pub mod completion;
pub mod engine;
pub mod fixed_pool;
pub mod stats;

pub use completion::CompletionQueue;
pub use engine::{Engine, ShutdownReport, SubmitStatus};
pub use fixed_pool::FixedPool;
pub use stats::{EngineStats, StatsSnapshot};
