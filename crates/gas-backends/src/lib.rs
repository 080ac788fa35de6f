//! # gas-backends - Stock GAS backends
//!
//! Each backend implements [`gas_core::Backend`]: one blocking `work()`
//! call per request, run on a worker thread, outcome recorded on the
//! request.
//!
//! | Backend               | Work                                            |
//! |-----------------------|-------------------------------------------------|
//! | [`SleepBackend`]      | Fixed delay. Measures framework overhead.       |
//! | [`LocalReadBackend`]  | Block-aligned `pread`, buffered or `O_DIRECT`.  |
//! | [`ObjectStoreBackend`]| HTTP `GET` with a byte `Range` header.          |

pub mod local_read;
pub mod object_store;
pub mod sleep;

pub use local_read::{AlignedBuffer, LocalReadBackend, LocalReadConfig};
pub use object_store::{ObjectStoreBackend, ObjectStoreConfig};
pub use sleep::SleepBackend;
