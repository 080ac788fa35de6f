use std::fmt;

use gas_runtime::{ShutdownReport, StatsSnapshot};

use crate::job::JobResult;

// ═══════════════════════════════════════════════════════════════════
// Latency statistics
// ═══════════════════════════════════════════════════════════════════

#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Latency {
    pub min_us: f64,
    pub avg_us: f64,
    pub p50_us: f64,
    pub p99_us: f64,
    pub max_us: f64,
}

impl Latency {
    /// Sorts `lat` in place.
    pub fn from_nanos(lat: &mut [u64]) -> Self {
        if lat.is_empty() {
            return Self::default();
        }
        lat.sort_unstable();
        let n = lat.len();
        let sum: u128 = lat.iter().map(|&v| v as u128).sum();
        let pct = |p: f64| {
            let i = ((p / 100.0) * (n as f64 - 1.0)).ceil() as usize;
            lat[i.min(n - 1)] as f64 / 1000.0
        };
        Self {
            min_us: lat[0] as f64 / 1000.0,
            avg_us: (sum as f64 / n as f64) / 1000.0,
            p50_us: pct(50.0),
            p99_us: pct(99.0),
            max_us: lat[n - 1] as f64 / 1000.0,
        }
    }
}

// ═══════════════════════════════════════════════════════════════════
// Run report
// ═══════════════════════════════════════════════════════════════════

pub struct Report<'a> {
    pub backend: &'a str,
    pub depth: usize,
    pub poll_mode: String,
    pub bs: u64,
    pub result: &'a JobResult,
    pub latency: Latency,
    pub stats: StatsSnapshot,
    pub shutdown: ShutdownReport,
}

impl Report<'_> {
    fn secs(&self) -> f64 {
        self.result.elapsed.as_secs_f64().max(f64::MIN_POSITIVE)
    }

    pub fn iops(&self) -> f64 {
        self.result.completed as f64 / self.secs()
    }

    pub fn mib_per_sec(&self) -> f64 {
        self.result.bytes as f64 / (1024.0 * 1024.0) / self.secs()
    }

    /// Hand-written JSON; every field is a number or a plain identifier.
    pub fn to_json(&self) -> String {
        let l = &self.latency;
        format!(
            r#"{{
  "engine": "{}",
  "depth": {},
  "poll_mode": "{}",
  "bs": {},
  "ios": {},
  "errors": {},
  "bytes": {},
  "duration_sec": {:.3},
  "iops": {:.2},
  "mib_per_sec": {:.2},
  "busy": {},
  "latency_us": {{
    "min": {:.1},
    "avg": {:.1},
    "p50": {:.1},
    "p99": {:.1},
    "max": {:.1}
  }}
}}"#,
            self.backend,
            self.depth,
            self.poll_mode,
            self.bs,
            self.result.completed,
            self.result.errors,
            self.result.bytes,
            self.result.elapsed.as_secs_f64(),
            self.iops(),
            self.mib_per_sec(),
            self.stats.busy,
            l.min_us,
            l.avg_us,
            l.p50_us,
            l.p99_us,
            l.max_us
        )
    }
}

impl fmt::Display for Report<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let l = &self.latency;
        writeln!(f, "=== gasbench: {} ===", self.backend)?;
        writeln!(f, "depth:      {} ({} poll)", self.depth, self.poll_mode)?;
        writeln!(f, "block size: {} bytes", self.bs)?;
        writeln!(
            f,
            "completed:  {} in {:.3}s, {} errors",
            self.result.completed,
            self.result.elapsed.as_secs_f64(),
            self.result.errors
        )?;
        writeln!(f, "iops:       {:.0}", self.iops())?;
        writeln!(f, "bandwidth:  {:.2} MiB/s", self.mib_per_sec())?;
        writeln!(
            f,
            "latency us: min {:.1}  avg {:.1}  p50 {:.1}  p99 {:.1}  max {:.1}",
            l.min_us, l.avg_us, l.p50_us, l.p99_us, l.max_us
        )?;
        writeln!(
            f,
            "engine:     {} submitted, {} busy, {} polls",
            self.stats.submitted, self.stats.busy, self.result.polls
        )?;
        if let Some(err) = &self.result.first_error {
            writeln!(f, "first error: {} (errno {})", err, err.errno())?;
        }
        if self.shutdown.discarded > 0 {
            writeln!(f, "discarded at shutdown: {}", self.shutdown.discarded)?;
        }
        Ok(())
    }
}
