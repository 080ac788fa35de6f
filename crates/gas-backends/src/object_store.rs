//! `ObjectStoreBackend` - ranged `GET`s against an S3-style object store.
//!
//! Objects are addressed path-style: `{endpoint}/{bucket}/{file_name}`,
//! or `{endpoint}/{file_name}` when no bucket is configured (the file
//! name then carries the bucket as its first component).
//!
//! Each worker thread builds one blocking HTTP client on first use and
//! keeps it in its `WorkerContext`, so connections are pooled per worker.
//! Each request caches its resolved object URL in its backend scratch
//! slot; a recycled request for the same object skips URL building.
//!
//! Requests are unsigned. Use a public bucket, a presigning proxy, or a
//! local S3-compatible endpoint.

use std::path::{Path, PathBuf};
use std::time::Duration;

use gas_core::backend::{Backend, WorkerContext};
use gas_core::error::{GasError, RequestError, Result};
use gas_core::request::{DataDirection, Request};

use reqwest::blocking::Client;
use reqwest::header::RANGE;
use reqwest::Url;
use tracing::{debug, info};

pub mod defaults {
    pub const REGION: &str = "us-east-1";
    pub const TIMEOUT_MS: u64 = 30_000;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObjectStoreConfig {
    pub region: String,
    /// Overrides the regional AWS endpoint.
    pub endpoint: Option<String>,
    pub bucket: Option<String>,
    /// Log every request at `info`.
    pub verbose: bool,
    /// Whole-request timeout, connect included.
    pub timeout: Duration,
    /// Honor `HTTP(S)_PROXY` / `NO_PROXY`.
    pub use_system_proxy: bool,
}

impl Default for ObjectStoreConfig {
    fn default() -> Self {
        Self {
            region: defaults::REGION.to_string(),
            endpoint: None,
            bucket: None,
            verbose: false,
            timeout: Duration::from_millis(defaults::TIMEOUT_MS),
            use_system_proxy: true,
        }
    }
}

impl ObjectStoreConfig {
    /// The configured endpoint, or `https://s3.{region}.amazonaws.com/`.
    pub fn endpoint_url(&self) -> Result<Url> {
        let raw = match &self.endpoint {
            Some(e) => e.clone(),
            None => format!("https://s3.{}.amazonaws.com/", self.region),
        };
        let url = Url::parse(&raw).map_err(|_| GasError::InvalidConfig("endpoint is not a valid URL"))?;
        if url.cannot_be_a_base() {
            return Err(GasError::InvalidConfig("endpoint cannot be a base URL"));
        }
        Ok(url)
    }
}

/// Per-worker HTTP client.
struct HttpClient(Client);

/// Per-request cached object URL, keyed by the file name it was built from.
#[derive(Default)]
struct ObjectUrl(Option<(PathBuf, Url)>);

pub struct ObjectStoreBackend {
    config: ObjectStoreConfig,
    endpoint: Url,
}

impl ObjectStoreBackend {
    pub fn new(config: ObjectStoreConfig) -> Result<Self> {
        if config.timeout.is_zero() {
            return Err(GasError::InvalidConfig("timeout must be > 0"));
        }
        let endpoint = config.endpoint_url()?;
        debug!(endpoint = %endpoint, bucket = ?config.bucket, "object store backend");
        Ok(Self { config, endpoint })
    }

    pub fn config(&self) -> &ObjectStoreConfig {
        &self.config
    }

    /// Full URL of the object named by `file_name`.
    pub fn object_url(&self, file_name: &Path) -> Url {
        let mut url = self.endpoint.clone();
        if let Ok(mut segments) = url.path_segments_mut() {
            segments.pop_if_empty();
            if let Some(bucket) = &self.config.bucket {
                segments.push(bucket);
            }
            let key = file_name.to_string_lossy();
            segments.extend(key.split('/').filter(|s| !s.is_empty()));
        }
        url
    }

    fn build_client(&self) -> reqwest::Result<HttpClient> {
        let mut builder = Client::builder().timeout(self.config.timeout);
        if !self.config.use_system_proxy {
            builder = builder.no_proxy();
        }
        builder.build().map(HttpClient)
    }

    fn cached_url(&self, request: &Request) -> Url {
        let file_name = request.file_name();
        request.backend_data(|cache: &mut ObjectUrl| match &cache.0 {
            Some((name, url)) if *name == file_name => url.clone(),
            _ => {
                let url = self.object_url(&file_name);
                cache.0 = Some((file_name, url.clone()));
                url
            }
        })
    }

    fn fetch(&self, ctx: &mut WorkerContext, request: &Request) -> std::result::Result<u64, RequestError> {
        let (offset, len) = (request.offset(), request.len());
        if len == 0 {
            return Ok(0);
        }
        let end = offset
            .checked_add(len)
            .ok_or(RequestError::InvalidRange { offset, len })?;
        let url = self.cached_url(request);
        let client = ctx
            .try_local(|| self.build_client())
            .map_err(|e| RequestError::Remote(format!("build http client: {e}")))?;

        let range = format!("bytes={}-{}", offset, end - 1);
        if self.config.verbose {
            info!(url = %url, range = %range, "GET");
        }
        let response = client
            .0
            .get(url)
            .header(RANGE, range)
            .send()
            .map_err(|e| RequestError::Remote(e.to_string()))?;

        let status = response.status().as_u16();
        if status != 200 && status != 206 {
            return Err(RequestError::Status { status });
        }
        let body = response
            .bytes()
            .map_err(|e| RequestError::Remote(e.to_string()))?;
        // A 200 is the whole object; count only the range that was asked for.
        let got = if status == 200 {
            (body.len() as u64).saturating_sub(offset).min(len)
        } else {
            body.len() as u64
        };
        if self.config.verbose {
            info!(status, bytes = got, "GET done");
        }
        if got < len {
            return Err(RequestError::ShortRead { offset, wanted: len, got });
        }
        Ok(got)
    }
}

impl Backend for ObjectStoreBackend {
    fn name(&self) -> &str {
        "object-store"
    }

    fn work(&self, ctx: &mut WorkerContext, request: &Request) {
        if request.direction() != DataDirection::Read {
            request.set_error(RequestError::UnsupportedDirection(request.direction()));
            return;
        }
        match self.fetch(ctx, request) {
            Ok(n) => request.set_transferred(n),
            Err(e) => {
                debug!(index = request.index(), error = %e, "object fetch failed");
                request.set_error(e);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use gas_core::request::{EngineId, IoUnit};
    use std::io::{BufRead, BufReader, Write};
    use std::net::{TcpListener, TcpStream};
    use std::sync::{Arc, Mutex};
    use std::thread;

    /// Minimal HTTP/1.1 object server on loopback.
    ///
    /// `GET /.../missing*` answers 404; anything else answers 206 with as
    /// many bytes as the `Range` header asks for. Every request line is
    /// recorded.
    struct StubServer {
        addr: String,
        seen: Arc<Mutex<Vec<String>>>,
    }

    impl StubServer {
        fn start() -> Self {
            let listener = TcpListener::bind("127.0.0.1:0").unwrap();
            let addr = format!("http://{}/", listener.local_addr().unwrap());
            let seen = Arc::new(Mutex::new(Vec::new()));
            let log = Arc::clone(&seen);
            thread::spawn(move || {
                for stream in listener.incoming() {
                    let Ok(stream) = stream else { break };
                    serve(stream, &log);
                }
            });
            Self { addr, seen }
        }
    }

    fn serve(mut stream: TcpStream, log: &Mutex<Vec<String>>) {
        let mut reader = BufReader::new(stream.try_clone().unwrap());
        let mut request_line = String::new();
        reader.read_line(&mut request_line).unwrap();
        let mut range_len = 0u64;
        loop {
            let mut line = String::new();
            if reader.read_line(&mut line).unwrap() == 0 || line == "\r\n" {
                break;
            }
            let lower = line.to_ascii_lowercase();
            if let Some(spec) = lower.strip_prefix("range: bytes=") {
                let (a, b) = spec.trim().split_once('-').unwrap();
                range_len = b.parse::<u64>().unwrap() - a.parse::<u64>().unwrap() + 1;
            }
        }
        let path = request_line.split_whitespace().nth(1).unwrap_or("").to_string();
        log.lock().unwrap().push(request_line.trim().to_string());

        let response = if path.contains("missing") {
            "HTTP/1.1 404 Not Found\r\nContent-Length: 0\r\nConnection: close\r\n\r\n".to_string()
        } else {
            format!(
                "HTTP/1.1 206 Partial Content\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
                range_len,
                "x".repeat(range_len as usize)
            )
        };
        let _ = stream.write_all(response.as_bytes());
    }

    fn backend(server: &StubServer, bucket: Option<&str>) -> ObjectStoreBackend {
        ObjectStoreBackend::new(ObjectStoreConfig {
            endpoint: Some(server.addr.clone()),
            bucket: bucket.map(str::to_string),
            use_system_proxy: false,
            timeout: Duration::from_secs(5),
            ..ObjectStoreConfig::default()
        })
        .unwrap()
    }

    #[test]
    fn test_default_endpoint_from_region() {
        let cfg = ObjectStoreConfig {
            region: "eu-west-2".to_string(),
            ..ObjectStoreConfig::default()
        };
        assert_eq!(
            cfg.endpoint_url().unwrap().as_str(),
            "https://s3.eu-west-2.amazonaws.com/"
        );
    }

    #[test]
    fn test_invalid_endpoint_rejected() {
        let cfg = ObjectStoreConfig {
            endpoint: Some("not a url".to_string()),
            ..ObjectStoreConfig::default()
        };
        assert!(matches!(ObjectStoreBackend::new(cfg), Err(GasError::InvalidConfig(_))));
    }

    #[test]
    fn test_object_url_layout() {
        let b = ObjectStoreBackend::new(ObjectStoreConfig {
            endpoint: Some("http://store.local:9000/prefix/".to_string()),
            bucket: Some("bench".to_string()),
            ..ObjectStoreConfig::default()
        })
        .unwrap();
        assert_eq!(
            b.object_url(Path::new("/data/obj 1")).as_str(),
            "http://store.local:9000/prefix/bench/data/obj%201"
        );

        let b = ObjectStoreBackend::new(ObjectStoreConfig::default()).unwrap();
        assert_eq!(
            b.object_url(Path::new("bucket/key")).as_str(),
            "https://s3.us-east-1.amazonaws.com/bucket/key"
        );
    }

    #[test]
    fn test_ranged_get() {
        let server = StubServer::start();
        let backend = backend(&server, Some("bench"));
        let mut ctx = WorkerContext::new(0);

        let req = Request::new(EngineId(9), IoUnit::read(0, "obj", 1000, 4096));
        backend.work(&mut ctx, &req);
        assert_eq!(req.error(), None);
        assert_eq!(req.transferred(), 4096);
        assert!(ctx.has_local::<HttpClient>());

        let seen = server.seen.lock().unwrap();
        assert_eq!(seen.as_slice(), ["GET /bench/obj HTTP/1.1"]);
    }

    #[test]
    fn test_not_found_recorded() {
        let server = StubServer::start();
        let backend = backend(&server, None);
        let mut ctx = WorkerContext::new(0);

        let req = Request::new(EngineId(9), IoUnit::read(0, "b/missing", 0, 512));
        backend.work(&mut ctx, &req);
        assert_eq!(req.error(), Some(RequestError::Status { status: 404 }));
        assert_eq!(req.error().unwrap().errno(), libc::ENOENT);
    }

    #[test]
    fn test_overflowing_range_rejected_before_request() {
        let server = StubServer::start();
        let backend = backend(&server, None);
        let mut ctx = WorkerContext::new(0);

        let offset = u64::MAX - 10;
        let req = Request::new(EngineId(9), IoUnit::read(0, "b/k", offset, 4096));
        backend.work(&mut ctx, &req);
        assert_eq!(req.error(), Some(RequestError::InvalidRange { offset, len: 4096 }));
        assert_eq!(req.error().unwrap().errno(), libc::EINVAL);
        assert_eq!(req.transferred(), 0);
        assert!(server.seen.lock().unwrap().is_empty());

        // The last addressable byte is still reachable.
        let req = Request::new(EngineId(9), IoUnit::read(1, "b/k", u64::MAX - 16, 16));
        backend.work(&mut ctx, &req);
        assert_eq!(req.error(), None);
        assert_eq!(req.transferred(), 16);
    }

    #[test]
    fn test_url_cache_follows_file_name() {
        let server = StubServer::start();
        let backend = backend(&server, None);
        let mut ctx = WorkerContext::new(0);

        let req = Request::new(EngineId(9), IoUnit::read(0, "b/one", 0, 16));
        backend.work(&mut ctx, &req);
        req.reset(IoUnit::read(0, "b/two", 0, 16));
        backend.work(&mut ctx, &req);
        assert!(req.is_ok());

        let seen = server.seen.lock().unwrap();
        assert_eq!(seen.as_slice(), ["GET /b/one HTTP/1.1", "GET /b/two HTTP/1.1"]);
    }

    #[test]
    fn test_unreachable_endpoint_is_remote_error() {
        // Bind then drop to get a port nobody listens on.
        let addr = TcpListener::bind("127.0.0.1:0").unwrap().local_addr().unwrap();
        let backend = ObjectStoreBackend::new(ObjectStoreConfig {
            endpoint: Some(format!("http://{addr}/")),
            use_system_proxy: false,
            timeout: Duration::from_secs(2),
            ..ObjectStoreConfig::default()
        })
        .unwrap();
        let mut ctx = WorkerContext::new(0);
        let req = Request::new(EngineId(9), IoUnit::read(0, "b/k", 0, 16));
        backend.work(&mut ctx, &req);
        assert!(matches!(req.error(), Some(RequestError::Remote(_))));
    }
}
