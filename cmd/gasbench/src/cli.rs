use std::path::PathBuf;
use std::time::Duration;

use clap::builder::RangedU64ValueParser;
use clap::{Parser, ValueEnum};

use gas_backends::{LocalReadConfig, ObjectStoreConfig};
use gas_core::config::{defaults, PollMode};

use crate::job::JobSpec;

/// Parse a byte count: `4096`, `4k`, `4KiB`, `1MB`, `2g`.
///
/// Bare numbers are bytes. Single-letter and `*iB` suffixes are binary,
/// `kB`/`MB`/`GB` decimal.
pub fn parse_size(input: &str) -> Result<u64, String> {
    let s = input.trim();
    if s.is_empty() {
        return Err("size must not be empty".to_string());
    }

    let lower = s.to_ascii_lowercase();
    let (num, scale) = if let Some(raw) = lower.strip_suffix("kib") {
        (raw, 1024u64)
    } else if let Some(raw) = lower.strip_suffix("mib") {
        (raw, 1024u64 * 1024)
    } else if let Some(raw) = lower.strip_suffix("gib") {
        (raw, 1024u64 * 1024 * 1024)
    } else if let Some(raw) = lower.strip_suffix("kb") {
        (raw, 1000u64)
    } else if let Some(raw) = lower.strip_suffix("mb") {
        (raw, 1000u64 * 1000)
    } else if let Some(raw) = lower.strip_suffix("gb") {
        (raw, 1000u64 * 1000 * 1000)
    } else if let Some(raw) = lower.strip_suffix('k') {
        (raw, 1024u64)
    } else if let Some(raw) = lower.strip_suffix('m') {
        (raw, 1024u64 * 1024)
    } else if let Some(raw) = lower.strip_suffix('g') {
        (raw, 1024u64 * 1024 * 1024)
    } else if let Some(raw) = lower.strip_suffix('b') {
        (raw, 1u64)
    } else {
        (lower.as_str(), 1u64)
    };

    let num = num.trim();
    if num.is_empty() {
        return Err(format!("invalid size: {input:?}"));
    }

    let value: u64 = num
        .parse()
        .map_err(|_| format!("invalid size number: {input:?}"))?;

    value
        .checked_mul(scale)
        .ok_or_else(|| format!("size too large: {input:?}"))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum EngineKind {
    /// Fixed delay per request, no I/O.
    Sleep,
    /// Block-aligned reads through the page cache.
    Local,
    /// Block-aligned `O_DIRECT` reads.
    Direct,
    /// HTTP range reads from an S3-style object store.
    ObjectStore,
}

#[derive(Debug, Clone, Parser)]
#[command(name = "gasbench", version, about = "Drive a GAS engine with a synchronous request loop")]
pub struct Cli {
    /// Backend performing each request.
    #[arg(long, env = "GAS_ENGINE", value_enum, default_value_t = EngineKind::Sleep)]
    pub engine: EngineKind,

    /// Requests in flight (also worker threads).
    #[arg(
        short = 'd',
        long,
        env = "GAS_DEPTH",
        default_value_t = defaults::DEPTH,
        value_parser = RangedU64ValueParser::<usize>::new().range(1..=defaults::MAX_DEPTH as u64)
    )]
    pub depth: usize,

    /// Total requests to complete.
    #[arg(short = 'n', long, default_value_t = 10_000)]
    pub ios: u64,

    /// Bytes per request (e.g. `4k`, `1MiB`).
    #[arg(long, default_value = "4k", value_parser = parse_size)]
    pub bs: u64,

    /// Region of the file/object that offsets cycle through.
    #[arg(long, default_value = "64m", value_parser = parse_size)]
    pub size: u64,

    /// File path, or object key for `object-store`.
    #[arg(short = 'f', long)]
    pub filename: Option<PathBuf>,

    /// Per-request delay for the `sleep` engine.
    #[arg(long, default_value_t = 123)]
    pub sleep_us: u64,

    #[arg(long = "s3-region", env = "AWS_REGION", default_value = gas_backends::object_store::defaults::REGION)]
    pub s3_region: String,

    /// Object store endpoint (default: regional AWS endpoint).
    #[arg(long, env = "GAS_S3_ENDPOINT")]
    pub endpoint: Option<String>,

    #[arg(long, env = "GAS_S3_BUCKET")]
    pub bucket: Option<String>,

    /// Log every object store request.
    #[arg(long = "s3-verbose", default_value_t = false)]
    pub s3_verbose: bool,

    /// Object store request timeout.
    #[arg(long, default_value_t = gas_backends::object_store::defaults::TIMEOUT_MS)]
    pub timeout_ms: u64,

    /// `notify` (condvar) or `sleep` (fixed-interval re-check).
    #[arg(long, env = "GAS_POLL_MODE", default_value_t = PollMode::Notify)]
    pub poll_mode: PollMode,

    /// Print the report as JSON.
    #[arg(long, default_value_t = false)]
    pub json: bool,
}

impl Cli {
    pub fn job_spec(&self) -> Result<JobSpec, String> {
        if self.bs == 0 {
            return Err("--bs must be > 0".to_string());
        }
        if self.size < self.bs {
            return Err(format!("--size ({}) smaller than --bs ({})", self.size, self.bs));
        }
        let file = match (&self.filename, self.engine) {
            (Some(f), _) => f.clone(),
            (None, EngineKind::Sleep) => PathBuf::from("gas-sleep"),
            (None, kind) => return Err(format!("--filename is required for --engine {kind:?}")),
        };
        Ok(JobSpec {
            ios: self.ios,
            bs: self.bs,
            size: self.size,
            file,
        })
    }

    pub fn sleep_delay(&self) -> Duration {
        Duration::from_micros(self.sleep_us)
    }

    pub fn local_read_config(&self) -> LocalReadConfig {
        LocalReadConfig::default().direct(self.engine == EngineKind::Direct)
    }

    pub fn object_store_config(&self) -> ObjectStoreConfig {
        ObjectStoreConfig {
            region: self.s3_region.clone(),
            endpoint: self.endpoint.clone(),
            bucket: self.bucket.clone(),
            verbose: self.s3_verbose,
            timeout: Duration::from_millis(self.timeout_ms),
            ..ObjectStoreConfig::default()
        }
    }
}
