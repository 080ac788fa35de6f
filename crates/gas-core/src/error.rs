//! GAS error types.
//!
//! Two families, never mixed:
//!
//! - [`GasError`] is returned by the framework itself (setup, commit,
//!   cancel). The harness sees it as a `Result`.
//! - [`RequestError`] is recorded by a backend on the request it was
//!   working on. The framework never inspects it; the harness reads it
//!   back after `fetch`.
//!
//! Queue-depth contract violations are neither: they panic.

use crate::request::DataDirection;

/// Framework-level failure.
#[derive(Debug, thiserror::Error)]
pub enum GasError {
    /// A queue or engine depth of zero.
    #[error("invalid depth {0}: must be > 0")]
    InvalidDepth(usize),
    /// Engine configuration rejected by `validate()`.
    #[error("invalid config: {0}")]
    InvalidConfig(&'static str),
    /// `commit` was called before `bind_worker`.
    #[error("no backend bound to engine")]
    NoBackend,
    /// Worker pool job queue is full.
    #[error("worker pool unavailable")]
    WorkerUnavailable,
    /// Worker thread could not be started.
    #[error("failed to spawn worker thread: {0}")]
    Spawn(#[source] std::io::Error),
    /// Cancellation of in-flight work is not part of the contract.
    #[error("cancel not supported")]
    CancelUnsupported,
    /// Worker pool was already shut down.
    #[error("worker pool is shut down")]
    ShutDown,
}

pub type Result<T> = std::result::Result<T, GasError>;

/// Failure recorded on a request by its backend.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RequestError {
    /// A system call failed.
    #[error("{op} failed: errno {errno}")]
    Os { op: &'static str, errno: i32 },
    /// The source ended before the requested range was covered.
    #[error("short read at offset {offset}: wanted {wanted} bytes, got {got}")]
    ShortRead { offset: u64, wanted: u64, got: u64 },
    /// `offset + len` does not fit in a `u64`.
    #[error("byte range at offset {offset} with length {len} overflows")]
    InvalidRange { offset: u64, len: u64 },
    /// The backend only handles some directions (most only read).
    #[error("unsupported data direction {0:?}")]
    UnsupportedDirection(DataDirection),
    /// Transport-level failure talking to a remote store.
    #[error("remote: {0}")]
    Remote(String),
    /// Remote store answered with a non-success status.
    #[error("remote status {status}")]
    Status { status: u16 },
    /// The backend panicked while working on this request.
    #[error("backend panicked: {0}")]
    Panicked(String),
}

impl RequestError {
    /// Build an `Os` error from an `io::Error`, falling back to `EIO`.
    pub fn os(op: &'static str, err: &std::io::Error) -> Self {
        Self::Os {
            op,
            errno: err.raw_os_error().unwrap_or(libc::EIO),
        }
    }

    /// Positive errno a harness can store as its per-request error code.
    pub fn errno(&self) -> i32 {
        match self {
            Self::Os { errno, .. } => *errno,
            Self::ShortRead { .. } => libc::EIO,
            Self::InvalidRange { .. } | Self::UnsupportedDirection(_) => libc::EINVAL,
            Self::Remote(_) => libc::EIO,
            Self::Status { status } => match status {
                404 => libc::ENOENT,
                401 | 403 => libc::EACCES,
                416 => libc::EINVAL,
                _ => libc::EIO,
            },
            Self::Panicked(_) => libc::EFAULT,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_errno_mapping() {
        let e = RequestError::Os { op: "open", errno: libc::ENOENT };
        assert_eq!(e.errno(), libc::ENOENT);
        assert_eq!(RequestError::Status { status: 404 }.errno(), libc::ENOENT);
        assert_eq!(RequestError::Status { status: 403 }.errno(), libc::EACCES);
        assert_eq!(RequestError::Status { status: 500 }.errno(), libc::EIO);
        assert_eq!(
            RequestError::UnsupportedDirection(DataDirection::Write).errno(),
            libc::EINVAL
        );
        assert_eq!(
            RequestError::InvalidRange { offset: u64::MAX, len: 1 }.errno(),
            libc::EINVAL
        );
    }

    #[test]
    fn test_os_from_io_error() {
        let io = std::io::Error::from_raw_os_error(libc::EACCES);
        assert_eq!(
            RequestError::os("open", &io),
            RequestError::Os { op: "open", errno: libc::EACCES }
        );

        let synthetic = std::io::Error::new(std::io::ErrorKind::Other, "boom");
        assert_eq!(RequestError::os("pread", &synthetic).errno(), libc::EIO);
    }

    #[test]
    fn test_display() {
        let e = RequestError::ShortRead { offset: 4096, wanted: 10, got: 3 };
        assert_eq!(e.to_string(), "short read at offset 4096: wanted 10 bytes, got 3");
        assert_eq!(GasError::InvalidDepth(0).to_string(), "invalid depth 0: must be > 0");
    }
}
