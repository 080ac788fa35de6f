//! gasbench - drive one GAS engine from a synchronous request loop
//!
//! ```text
//! gasbench --engine sleep --depth 32 --ios 100000
//! gasbench --engine direct --filename /data/big.bin --bs 256k --size 8g
//! gasbench --engine object-store --endpoint http://127.0.0.1:9000 \
//!          --bucket bench --filename objects/blob --bs 1m
//! ```
//!
//! Logging goes to stderr, filtered by `GAS_LOG` (default `warn`).

mod cli;
mod job;
mod report;

use std::io;

use anyhow::{anyhow, Context};
use clap::Parser;
use tracing::info;
use tracing_subscriber::EnvFilter;

use gas_backends::{LocalReadBackend, ObjectStoreBackend, SleepBackend};
use gas_core::config::EngineConfig;
use gas_runtime::Engine;

use cli::{Cli, EngineKind};
use report::{Latency, Report};

fn init_logging() {
    let filter = EnvFilter::try_from_env("GAS_LOG").unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(io::stderr)
        .init();
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_logging();

    let spec = cli.job_spec().map_err(|e| anyhow!(e))?;
    let config = EngineConfig::from_env()
        .depth(cli.depth)
        .poll_mode(cli.poll_mode);
    let mut engine = Engine::init(config).context("starting engine")?;

    match cli.engine {
        EngineKind::Sleep => engine.bind_worker(SleepBackend::new(cli.sleep_delay())),
        EngineKind::Local | EngineKind::Direct => {
            let backend = LocalReadBackend::new(cli.local_read_config()).context("local read backend")?;
            engine.bind_worker(backend);
        }
        EngineKind::ObjectStore => {
            let backend =
                ObjectStoreBackend::new(cli.object_store_config()).context("object store backend")?;
            engine.bind_worker(backend);
        }
    }
    let backend = engine.backend_name().unwrap_or("?").to_string();
    info!(engine = %engine.id(), backend = %backend, ios = spec.ios, bs = spec.bs, "run start");

    let mut result = job::run(&mut engine, &spec)?;
    let stats = engine.stats();
    let depth = engine.depth();
    let shutdown = engine.shutdown();

    let latency = Latency::from_nanos(&mut result.latencies_ns);
    let report = Report {
        backend: &backend,
        depth,
        poll_mode: cli.poll_mode.to_string(),
        bs: spec.bs,
        result: &result,
        latency,
        stats,
        shutdown,
    };
    if cli.json {
        println!("{}", report.to_json());
    } else {
        print!("{report}");
    }
    Ok(())
}
