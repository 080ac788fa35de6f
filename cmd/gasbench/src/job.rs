//! The request loop: keep `depth` requests in flight until `ios` complete.
//!
//! ```text
//! loop:
//!   prepare + submit into every free slot (until Busy or ios issued)
//!   commit
//!   poll(1, depth)
//!   fetch each completion, record latency, free its slot
//! ```

use std::path::PathBuf;
use std::time::{Duration, Instant};

use anyhow::Context;
use tracing::debug;

use gas_core::error::RequestError;
use gas_core::pool::WorkerPool;
use gas_core::request::{IoUnit, RequestHandle};
use gas_runtime::{Engine, SubmitStatus};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobSpec {
    pub ios: u64,
    pub bs: u64,
    pub size: u64,
    pub file: PathBuf,
}

impl JobSpec {
    /// Offset of the `n`-th request: sequential blocks wrapping at `size`.
    pub fn offset(&self, n: u64) -> u64 {
        let blocks = (self.size / self.bs).max(1);
        (n % blocks) * self.bs
    }
}

#[derive(Debug, Default)]
pub struct JobResult {
    pub completed: u64,
    pub errors: u64,
    pub bytes: u64,
    pub elapsed: Duration,
    pub latencies_ns: Vec<u64>,
    pub first_error: Option<RequestError>,
    /// `submit` answered `Busy`.
    pub busy: u64,
    pub polls: u64,
}

pub fn run<P: WorkerPool>(engine: &mut Engine<P>, spec: &JobSpec) -> anyhow::Result<JobResult> {
    let depth = engine.depth();
    let mut slots: Vec<Option<RequestHandle>> = vec![None; depth];
    let mut free: Vec<usize> = (0..depth).rev().collect();
    let mut result = JobResult {
        latencies_ns: Vec::with_capacity(spec.ios.min(1 << 24) as usize),
        ..JobResult::default()
    };
    let mut issued = 0u64;

    let start = Instant::now();
    while result.completed < spec.ios {
        while issued < spec.ios {
            let Some(slot) = free.pop() else { break };
            let unit = IoUnit::read(slot, &spec.file, spec.offset(issued), spec.bs);
            let request = engine.prepare(&mut slots[slot], unit);
            match engine.submit(&request) {
                SubmitStatus::Queued => issued += 1,
                SubmitStatus::Busy => {
                    free.push(slot);
                    result.busy += 1;
                    break;
                }
            }
        }
        engine.commit().context("commit")?;

        let n = engine.poll(1, depth);
        result.polls += 1;
        for i in 0..n {
            let request = engine.fetch(i);
            free.push(request.index());
            result.completed += 1;
            if let Some(latency) = request.latency() {
                result.latencies_ns.push(latency.as_nanos() as u64);
            }
            match request.error() {
                None => result.bytes += request.transferred(),
                Some(err) => {
                    result.errors += 1;
                    if result.first_error.is_none() {
                        debug!(index = request.index(), error = %err, "first request error");
                        result.first_error = Some(err);
                    }
                }
            }
        }
    }
    result.elapsed = start.elapsed();
    Ok(result)
}
