//! Engine configuration
//!
//! Library defaults with runtime environment overrides.
//!
//! # Example
//!
//! ```rust,ignore
//! use gas_core::config::{EngineConfig, PollMode};
//!
//! // Defaults with env overrides
//! let config = EngineConfig::from_env();
//!
//! // Or customize programmatically
//! let config = EngineConfig::new()
//!     .depth(32)
//!     .poll_mode(PollMode::Sleep);
//! ```

use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use crate::env::env_get;
use crate::error::{GasError, Result};

/// Library defaults.
pub mod defaults {
    /// Requests in flight = queue capacities = worker threads.
    pub const DEPTH: usize = 16;
    /// Sleep between completion checks in `PollMode::Sleep`.
    pub const POLL_INTERVAL_US: u64 = 10;
    /// Longest single idle wait of a pool worker.
    pub const PARK_TIMEOUT_MS: u64 = 1;
    /// Worker thread name prefix.
    pub const WORKER_NAME: &str = "gas-worker";
    /// Upper bound on depth, and so on worker threads.
    pub const MAX_DEPTH: usize = 4096;
}

/// How `poll` waits for completions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollMode {
    /// Block on a condition variable; woken by every completion.
    Notify,
    /// Release the lock and sleep `poll_interval` between checks.
    Sleep,
}

impl FromStr for PollMode {
    type Err = GasError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "notify" | "condvar" => Ok(PollMode::Notify),
            "sleep" | "spin" => Ok(PollMode::Sleep),
            _ => Err(GasError::InvalidConfig("poll mode must be 'notify' or 'sleep'")),
        }
    }
}

impl fmt::Display for PollMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PollMode::Notify => write!(f, "notify"),
            PollMode::Sleep => write!(f, "sleep"),
        }
    }
}

/// Engine configuration with builder pattern.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Maximum requests in flight. Sizes both queues and the worker pool.
    pub depth: usize,
    /// Completion wait strategy.
    pub poll_mode: PollMode,
    /// Sleep between checks when `poll_mode` is `Sleep`.
    pub poll_interval: Duration,
    /// Idle worker park timeout.
    pub park_timeout: Duration,
    /// Worker thread name prefix.
    pub worker_name: String,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self::from_env()
    }
}

impl EngineConfig {
    /// Library defaults with environment overrides.
    ///
    /// Environment variables (all optional):
    /// - `GAS_DEPTH` - Requests in flight / worker threads
    /// - `GAS_POLL_MODE` - `notify` or `sleep`
    /// - `GAS_POLL_INTERVAL_US` - Sleep between checks in `sleep` mode
    /// - `GAS_PARK_TIMEOUT_MS` - Idle worker park timeout
    /// - `GAS_WORKER_NAME` - Worker thread name prefix
    pub fn from_env() -> Self {
        Self {
            depth: env_get("GAS_DEPTH", defaults::DEPTH),
            poll_mode: env_get("GAS_POLL_MODE", PollMode::Notify),
            poll_interval: Duration::from_micros(env_get(
                "GAS_POLL_INTERVAL_US",
                defaults::POLL_INTERVAL_US,
            )),
            park_timeout: Duration::from_millis(env_get(
                "GAS_PARK_TIMEOUT_MS",
                defaults::PARK_TIMEOUT_MS,
            )),
            worker_name: env_get("GAS_WORKER_NAME", defaults::WORKER_NAME.to_string()),
        }
    }

    /// Library defaults, no env override.
    pub fn new() -> Self {
        Self {
            depth: defaults::DEPTH,
            poll_mode: PollMode::Notify,
            poll_interval: Duration::from_micros(defaults::POLL_INTERVAL_US),
            park_timeout: Duration::from_millis(defaults::PARK_TIMEOUT_MS),
            worker_name: defaults::WORKER_NAME.to_string(),
        }
    }

    // Builder methods

    pub fn depth(mut self, depth: usize) -> Self {
        self.depth = depth;
        self
    }

    pub fn poll_mode(mut self, mode: PollMode) -> Self {
        self.poll_mode = mode;
        self
    }

    pub fn poll_interval(mut self, d: Duration) -> Self {
        self.poll_interval = d;
        self
    }

    pub fn park_timeout(mut self, d: Duration) -> Self {
        self.park_timeout = d;
        self
    }

    pub fn worker_name(mut self, prefix: impl Into<String>) -> Self {
        self.worker_name = prefix.into();
        self
    }

    pub fn validate(&self) -> Result<()> {
        if self.depth == 0 {
            return Err(GasError::InvalidDepth(self.depth));
        }
        if self.depth > defaults::MAX_DEPTH {
            return Err(GasError::InvalidConfig("depth must be <= 4096"));
        }
        if self.park_timeout.is_zero() {
            return Err(GasError::InvalidConfig("park_timeout must be > 0"));
        }
        if self.worker_name.is_empty() {
            return Err(GasError::InvalidConfig("worker_name must not be empty"));
        }
        Ok(())
    }
}
