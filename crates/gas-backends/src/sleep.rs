//! `SleepBackend` - no I/O, just a fixed delay per request.

use std::thread;
use std::time::Duration;

use gas_core::backend::{Backend, WorkerContext};
use gas_core::request::Request;

/// Default per-request delay.
pub const DEFAULT_DELAY: Duration = Duration::from_micros(123);

#[derive(Debug, Clone)]
pub struct SleepBackend {
    delay: Duration,
}

impl SleepBackend {
    pub fn new(delay: Duration) -> Self {
        Self { delay }
    }

    pub fn delay(&self) -> Duration {
        self.delay
    }
}

impl Default for SleepBackend {
    fn default() -> Self {
        Self::new(DEFAULT_DELAY)
    }
}

impl Backend for SleepBackend {
    fn name(&self) -> &str {
        "sleep"
    }

    fn work(&self, _ctx: &mut WorkerContext, request: &Request) {
        if !self.delay.is_zero() {
            thread::sleep(self.delay);
        }
        request.set_transferred(request.len());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use gas_core::request::{EngineId, IoUnit};
    use std::time::Instant;

    #[test]
    fn test_default_delay() {
        assert_eq!(SleepBackend::default().delay(), Duration::from_micros(123));
    }

    #[test]
    fn test_sleeps_and_records_transfer() {
        let backend = SleepBackend::new(Duration::from_millis(15));
        let req = Request::new(EngineId(7), IoUnit::read(0, "f", 0, 8192));
        let mut ctx = WorkerContext::new(0);

        let start = Instant::now();
        backend.work(&mut ctx, &req);
        assert!(start.elapsed() >= Duration::from_millis(15));
        assert!(req.is_ok());
        assert_eq!(req.transferred(), 8192);
        assert_eq!(ctx.locals_len(), 0);
    }
}
