//! `LocalReadBackend` - block-aligned reads from a local file.
//!
//! Each request opens the file, widens `[offset, offset + len)` to the
//! configured alignment, and `pread`s the widened range in chunks of the
//! worker's aligned buffer. The data itself is discarded; only byte
//! counts and errors are recorded.
//!
//! With `direct` set the file is opened with `O_DIRECT` (Linux), so the
//! buffer address, every chunk length and every file offset must be
//! multiples of the alignment. [`LocalReadConfig::validate`] enforces the
//! static half of that; the alignment math does the rest.
//!
//! ```text
//! file:   |....|....|..[=== offset .. offset+len ===]..|....|
//!                   ^ aligned start                 aligned end ^
//!                   └──── chunk ────┘└──── chunk ────┘└─ chunk ─┘
//! ```

use std::alloc::{self, Layout};
use std::fs::{File, OpenOptions};
use std::os::unix::fs::OpenOptionsExt;
use std::ptr::NonNull;

use gas_core::backend::{Backend, WorkerContext};
use gas_core::error::{GasError, RequestError, Result};
use gas_core::request::{DataDirection, Request};

use tracing::{trace, warn};

pub mod defaults {
    /// Offset / length alignment, and buffer address alignment.
    pub const ALIGNMENT: usize = 16 * 1024;
    /// Largest single `pread`.
    pub const BUFFER_SIZE: usize = 256 * 1024;
}

cfg_if::cfg_if! {
    if #[cfg(any(target_os = "linux", target_os = "android", target_os = "freebsd"))] {
        const DIRECT_FLAG: libc::c_int = libc::O_DIRECT;
    } else {
        // No open(2) flag for uncached reads here; `direct` degrades to buffered.
        const DIRECT_FLAG: libc::c_int = 0;
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocalReadConfig {
    /// Open with `O_DIRECT`.
    pub direct: bool,
    /// Power of two.
    pub alignment: usize,
    /// Multiple of `alignment`.
    pub buffer_size: usize,
}

impl Default for LocalReadConfig {
    fn default() -> Self {
        Self {
            direct: false,
            alignment: defaults::ALIGNMENT,
            buffer_size: defaults::BUFFER_SIZE,
        }
    }
}

impl LocalReadConfig {
    pub fn direct(mut self, direct: bool) -> Self {
        self.direct = direct;
        self
    }

    pub fn alignment(mut self, alignment: usize) -> Self {
        self.alignment = alignment;
        self
    }

    pub fn buffer_size(mut self, size: usize) -> Self {
        self.buffer_size = size;
        self
    }

    pub fn validate(&self) -> Result<()> {
        if !self.alignment.is_power_of_two() {
            return Err(GasError::InvalidConfig("alignment must be a power of two"));
        }
        if self.buffer_size == 0 || self.buffer_size % self.alignment != 0 {
            return Err(GasError::InvalidConfig(
                "buffer_size must be a non-zero multiple of alignment",
            ));
        }
        Ok(())
    }

    /// `[offset, offset + len)` widened to alignment boundaries.
    pub fn aligned_range(&self, offset: u64, len: u64) -> (u64, u64) {
        let mask = self.alignment as u64 - 1;
        let start = offset & !mask;
        let end = offset.saturating_add(len).saturating_add(mask) & !mask;
        (start, end)
    }
}

/// Heap buffer whose address is a multiple of its alignment.
///
/// One per worker thread, kept in the `WorkerContext`.
pub struct AlignedBuffer {
    ptr: NonNull<u8>,
    layout: Layout,
}

// SAFETY: the buffer is uniquely owned; nothing else holds the pointer.
unsafe impl Send for AlignedBuffer {}

impl AlignedBuffer {
    /// Zeroed buffer of `size` bytes aligned to `align`.
    pub fn new(size: usize, align: usize) -> std::io::Result<Self> {
        let layout = Layout::from_size_align(size.max(1), align)
            .map_err(|_| std::io::Error::from_raw_os_error(libc::EINVAL))?;
        // SAFETY: layout has non-zero size.
        let raw = unsafe { alloc::alloc_zeroed(layout) };
        let ptr = NonNull::new(raw).ok_or_else(|| std::io::Error::from_raw_os_error(libc::ENOMEM))?;
        Ok(Self { ptr, layout })
    }

    pub fn len(&self) -> usize {
        self.layout.size()
    }

    pub fn is_empty(&self) -> bool {
        self.layout.size() == 0
    }

    pub fn align(&self) -> usize {
        self.layout.align()
    }

    pub fn as_mut_slice(&mut self) -> &mut [u8] {
        // SAFETY: ptr is valid for layout.size() initialized bytes and
        // uniquely borrowed through &mut self.
        unsafe { std::slice::from_raw_parts_mut(self.ptr.as_ptr(), self.layout.size()) }
    }
}

impl Drop for AlignedBuffer {
    fn drop(&mut self) {
        // SAFETY: allocated in `new` with this exact layout.
        unsafe { alloc::dealloc(self.ptr.as_ptr(), self.layout) }
    }
}

pub struct LocalReadBackend {
    config: LocalReadConfig,
}

impl LocalReadBackend {
    pub fn new(config: LocalReadConfig) -> Result<Self> {
        config.validate()?;
        if config.direct && DIRECT_FLAG == 0 {
            warn!("O_DIRECT unavailable on this platform; reading through the page cache");
        }
        Ok(Self { config })
    }

    pub fn config(&self) -> &LocalReadConfig {
        &self.config
    }

    fn open(&self, request: &Request) -> std::result::Result<File, RequestError> {
        let mut opts = OpenOptions::new();
        opts.read(true);
        if self.config.direct {
            opts.custom_flags(DIRECT_FLAG);
        }
        request
            .with_file_name(|path| opts.open(path))
            .map_err(|e| RequestError::os("open", &e))
    }

    fn read(&self, ctx: &mut WorkerContext, request: &Request) -> std::result::Result<u64, RequestError> {
        let (offset, len) = (request.offset(), request.len());
        if len == 0 {
            return Ok(0);
        }
        let wanted_end = offset
            .checked_add(len)
            .ok_or(RequestError::InvalidRange { offset, len })?;
        let file = self.open(request)?;
        let (start, end) = self.config.aligned_range(offset, len);

        let (size, align) = (self.config.buffer_size, self.config.alignment);
        let buf = ctx
            .try_local(|| AlignedBuffer::new(size, align))
            .map_err(|e| RequestError::os("alloc", &e))?;
        if buf.len() != size || buf.align() != align {
            *buf = AlignedBuffer::new(size, align).map_err(|e| RequestError::os("alloc", &e))?;
        }
        let buf = buf.as_mut_slice();

        let mut pos = start;
        while pos < end {
            let chunk = ((end - pos) as usize).min(buf.len());
            let n = nix::sys::uio::pread(&file, &mut buf[..chunk], pos as libc::off_t)
                .map_err(|errno| RequestError::Os { op: "pread", errno: errno as i32 })?;
            pos += n as u64;
            if n < chunk {
                // EOF; O_DIRECT would reject the unaligned follow-up offset.
                break;
            }
        }
        trace!(index = request.index(), start, end, read_to = pos, "local read");

        if pos < wanted_end {
            return Err(RequestError::ShortRead {
                offset,
                wanted: len,
                got: pos.saturating_sub(offset),
            });
        }
        Ok(len)
    }
}

impl Backend for LocalReadBackend {
    fn name(&self) -> &str {
        if self.config.direct {
            "direct"
        } else {
            "local"
        }
    }

    fn work(&self, ctx: &mut WorkerContext, request: &Request) {
        if request.direction() != DataDirection::Read {
            request.set_error(RequestError::UnsupportedDirection(request.direction()));
            return;
        }
        match self.read(ctx, request) {
            Ok(n) => request.set_transferred(n),
            Err(e) => {
                trace!(index = request.index(), error = %e, "local read failed");
                request.set_error(e);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use gas_core::request::{EngineId, IoUnit};
    use std::io::Write;
    use std::path::PathBuf;

    /// Temp file of `size` bytes, removed on drop.
    struct TempFile(PathBuf);

    impl TempFile {
        fn new(tag: &str, size: usize) -> Self {
            let path = std::env::temp_dir().join(format!(
                "gas-local-read-{}-{}",
                tag,
                std::process::id()
            ));
            let mut f = File::create(&path).unwrap();
            let data: Vec<u8> = (0..size).map(|i| (i % 251) as u8).collect();
            f.write_all(&data).unwrap();
            f.sync_all().unwrap();
            Self(path)
        }
    }

    impl Drop for TempFile {
        fn drop(&mut self) {
            let _ = std::fs::remove_file(&self.0);
        }
    }

    fn request(path: &std::path::Path, offset: u64, len: u64) -> gas_core::request::RequestHandle {
        Request::new(EngineId(3), IoUnit::read(0, path, offset, len))
    }

    #[test]
    fn test_config_validation() {
        assert!(LocalReadConfig::default().validate().is_ok());
        assert!(LocalReadConfig::default().alignment(3000).validate().is_err());
        assert!(LocalReadConfig::default()
            .alignment(4096)
            .buffer_size(6000)
            .validate()
            .is_err());
        assert!(LocalReadConfig::default().buffer_size(0).validate().is_err());
    }

    #[test]
    fn test_aligned_range() {
        let cfg = LocalReadConfig::default().alignment(4096);
        assert_eq!(cfg.aligned_range(0, 4096), (0, 4096));
        assert_eq!(cfg.aligned_range(100, 10), (0, 4096));
        assert_eq!(cfg.aligned_range(4095, 2), (0, 8192));
        assert_eq!(cfg.aligned_range(8192, 1), (8192, 12288));
    }

    #[test]
    fn test_aligned_buffer() {
        let mut buf = AlignedBuffer::new(64 * 1024, 16 * 1024).unwrap();
        assert_eq!(buf.len(), 64 * 1024);
        assert_eq!(buf.as_mut_slice().as_ptr() as usize % (16 * 1024), 0);
        assert!(buf.as_mut_slice().iter().all(|b| *b == 0));
    }

    #[test]
    fn test_buffered_read() {
        let file = TempFile::new("buffered", 64 * 1024);
        let backend = LocalReadBackend::new(
            LocalReadConfig::default().alignment(4096).buffer_size(8192),
        )
        .unwrap();
        let mut ctx = WorkerContext::new(0);

        let req = request(&file.0, 5000, 20_000);
        backend.work(&mut ctx, &req);
        assert_eq!(req.error(), None);
        assert_eq!(req.transferred(), 20_000);
        assert!(ctx.has_local::<AlignedBuffer>());

        // Buffer is reused by the next request on the same worker.
        let req = request(&file.0, 0, 4096);
        backend.work(&mut ctx, &req);
        assert_eq!(req.transferred(), 4096);
        assert_eq!(ctx.locals_len(), 1);
    }

    #[test]
    fn test_read_past_eof_is_short() {
        let file = TempFile::new("short", 10_000);
        let backend = LocalReadBackend::new(LocalReadConfig::default().alignment(4096)).unwrap();
        let mut ctx = WorkerContext::new(0);

        let req = request(&file.0, 8192, 4096);
        backend.work(&mut ctx, &req);
        assert_eq!(
            req.error(),
            Some(RequestError::ShortRead { offset: 8192, wanted: 4096, got: 10_000 - 8192 })
        );
    }

    #[test]
    fn test_overflowing_range_is_invalid() {
        let backend = LocalReadBackend::new(LocalReadConfig::default()).unwrap();
        let mut ctx = WorkerContext::new(0);
        let offset = u64::MAX - 10;
        let req = request(std::path::Path::new("/dev/null"), offset, 4096);
        backend.work(&mut ctx, &req);
        assert_eq!(req.error(), Some(RequestError::InvalidRange { offset, len: 4096 }));
        assert_eq!(req.error().unwrap().errno(), libc::EINVAL);
        assert_eq!(req.transferred(), 0);
        assert!(!ctx.has_local::<AlignedBuffer>());
    }

    #[test]
    fn test_missing_file_records_errno() {
        let backend = LocalReadBackend::new(LocalReadConfig::default()).unwrap();
        let mut ctx = WorkerContext::new(0);
        let req = request(std::path::Path::new("/nonexistent/gas/file"), 0, 4096);
        backend.work(&mut ctx, &req);
        assert_eq!(req.error(), Some(RequestError::Os { op: "open", errno: libc::ENOENT }));
        assert_eq!(req.transferred(), 0);
    }

    #[test]
    fn test_write_direction_unsupported() {
        let backend = LocalReadBackend::new(LocalReadConfig::default()).unwrap();
        let mut ctx = WorkerContext::new(0);
        let mut unit = IoUnit::read(0, "/dev/null", 0, 512);
        unit.direction = DataDirection::Write;
        let req = Request::new(EngineId(3), unit);
        backend.work(&mut ctx, &req);
        assert_eq!(
            req.error(),
            Some(RequestError::UnsupportedDirection(DataDirection::Write))
        );
    }

    #[test]
    fn test_direct_read() {
        let file = TempFile::new("direct", 128 * 1024);
        let backend = LocalReadBackend::new(LocalReadConfig::default().direct(true)).unwrap();
        assert_eq!(backend.name(), "direct");
        let mut ctx = WorkerContext::new(0);

        let req = request(&file.0, 16 * 1024, 32 * 1024);
        backend.work(&mut ctx, &req);
        match req.error() {
            None => assert_eq!(req.transferred(), 32 * 1024),
            // tmpfs and some overlay filesystems refuse O_DIRECT.
            Some(RequestError::Os { errno, .. }) => assert_eq!(errno, libc::EINVAL),
            Some(other) => panic!("unexpected error {other:?}"),
        }
    }

    #[test]
    fn test_through_engine() {
        use gas_core::config::EngineConfig;
        use gas_runtime::{Engine, SubmitStatus};

        let file = TempFile::new("engine", 256 * 1024);
        let backend = LocalReadBackend::new(LocalReadConfig::default().alignment(4096)).unwrap();
        let mut engine = Engine::start(EngineConfig::new().depth(4), backend).unwrap();

        let mut slots: Vec<Option<gas_core::RequestHandle>> = vec![None; 4];
        for (i, slot) in slots.iter_mut().enumerate() {
            let req = engine.prepare(slot, IoUnit::read(i, &file.0, i as u64 * 65536, 65536));
            assert_eq!(engine.submit(&req), SubmitStatus::Queued);
        }
        assert_eq!(engine.commit().unwrap(), 4);

        let mut done = 0;
        while done < 4 {
            let n = engine.poll(1, 4);
            for i in 0..n {
                let req = engine.fetch(i);
                assert!(req.is_ok(), "{:?}", req.error());
                assert_eq!(req.transferred(), 65536);
            }
            done += n;
        }
        assert_eq!(engine.shutdown().drained, 0);
    }
}
