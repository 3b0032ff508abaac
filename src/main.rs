//! Tiercache Soak Runner
//!
//! Drives a mixed get/put/remove workload against one on-heap store from
//! several threads and prints the resulting statistics as JSON.
//!
//! ```text
//! tiercache --config store.yaml --threads 8 --operations 100000 --key-space 5000
//! ```

use std::path::PathBuf;
use std::time::Instant;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use clap::Parser;
use rand::Rng;
use serde::Serialize;
use tracing::{info, Level};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use tiercache::{OnHeapStore, StoreSettings, StoreStats};

// =============================================================================
// CLI Arguments
// =============================================================================

/// Tiercache soak runner - exercise a bounded store under concurrent load
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Store settings file (.yaml, .yml or .json); defaults apply when omitted
    #[arg(long, env = "TIERCACHE_CONFIG")]
    config: Option<PathBuf>,

    /// Worker threads
    #[arg(long, env = "TIERCACHE_THREADS", default_value = "4")]
    threads: usize,

    /// Operations per thread
    #[arg(long, env = "TIERCACHE_OPERATIONS", default_value = "100000")]
    operations: usize,

    /// Number of distinct keys
    #[arg(long, env = "TIERCACHE_KEY_SPACE", default_value = "10000")]
    key_space: usize,

    /// Percentage of operations that are writes
    #[arg(long, default_value = "30")]
    write_percent: u32,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, env = "LOG_LEVEL", default_value = "info")]
    log_level: String,

    /// Output logs as JSON
    #[arg(long, env = "LOG_JSON")]
    log_json: bool,
}

/// Final soak report
#[derive(Debug, Serialize)]
struct Report {
    finished_at: DateTime<Utc>,
    threads: usize,
    operations: usize,
    elapsed_millis: u64,
    ops_per_sec: f64,
    stats: StoreStats,
}

// =============================================================================
// Main
// =============================================================================

fn main() -> Result<()> {
    let args = Args::parse();
    init_logging(&args);

    let settings = match &args.config {
        Some(path) => StoreSettings::from_file(path)
            .with_context(|| format!("loading settings from {}", path.display()))?,
        None => StoreSettings::default(),
    };

    let store: OnHeapStore<String, String> =
        OnHeapStore::new(settings.configuration()?).context("creating store")?;

    info!("Starting soak run");
    info!("  Capacity: {}", store.resource_pools());
    info!("  Threads: {}", args.threads);
    info!("  Operations per thread: {}", args.operations);
    info!("  Key space: {}", args.key_space);

    let key_space = args.key_space.max(1);
    let started = Instant::now();

    let outcomes = crossbeam::scope(|scope| {
        let handles: Vec<_> = (0..args.threads)
            .map(|worker| {
                let store = &store;
                let args = &args;
                scope.spawn(move |_| {
                    run_worker(store, worker, args.operations, key_space, args.write_percent)
                })
            })
            .collect();
        handles.into_iter().map(|h| h.join()).collect::<Vec<_>>()
    })
    .map_err(|_| anyhow::anyhow!("soak scope panicked"))?;

    for (worker, outcome) in outcomes.into_iter().enumerate() {
        outcome
            .map_err(|_| anyhow::anyhow!("worker {} panicked", worker))?
            .with_context(|| format!("worker {} failed", worker))?;
    }

    let elapsed = started.elapsed();
    let total = args.threads * args.operations;
    let report = Report {
        finished_at: Utc::now(),
        threads: args.threads,
        operations: total,
        elapsed_millis: elapsed.as_millis() as u64,
        ops_per_sec: total as f64 / elapsed.as_secs_f64().max(f64::EPSILON),
        stats: store.stats(),
    };

    info!(
        entries = report.stats.entries,
        evictions = report.stats.evictions,
        "Soak run complete"
    );
    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}

fn run_worker(
    store: &OnHeapStore<String, String>,
    worker: usize,
    operations: usize,
    key_space: usize,
    write_percent: u32,
) -> tiercache::Result<()> {
    let mut rng = rand::thread_rng();
    for op in 0..operations {
        let key = format!("key-{}", rng.gen_range(0..key_space));
        let roll = rng.gen_range(0..100);
        if roll < write_percent {
            store.put(key, format!("value-{}-{}", worker, op))?;
        } else if roll < write_percent + 2 {
            store.remove(&key);
        } else {
            store.get(&key)?;
        }
    }
    Ok(())
}

// =============================================================================
// Logging
// =============================================================================

fn init_logging(args: &Args) {
    let level = match args.log_level.to_lowercase().as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    };

    // logs go to stderr so the JSON report on stdout stays parseable
    let filter = EnvFilter::from_default_env().add_directive(level.into());

    if args.log_json {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().json().with_writer(std::io::stderr))
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().with_target(true).with_writer(std::io::stderr))
            .init();
    }
}
