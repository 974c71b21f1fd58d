//! trace-replay - inspect and replay key-value store traces
//!
//! ## Usage
//!
//! ```bash
//! # Summarize a trace file
//! trace-replay inspect ./ingest.trace
//!
//! # Dry-run a replay against an in-memory store at 4x speed on 8 workers
//! trace-replay replay ./ingest.trace --fast-forward 4 --threads 8 --column-families users,orders
//!
//! # Print an example configuration file
//! trace-replay example-config
//! ```

use clap::{Parser, Subcommand};
use kvreplay::config::DEFAULT_LOG_LEVEL;
use kvreplay::trace::{
    GetQueryRecord, IteratorSeekQueryRecord, MultiGetQueryRecord, WriteQueryRecord,
};
use kvreplay::{
    ConfigFile, FileTraceReader, MemoryStore, ReplayOptions, Replayer, Result, TraceRecordHandler,
    TraceType,
};
use serde::Serialize;
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::{debug, info, warn};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Inspect and replay key-value store traces
#[derive(Parser, Debug)]
#[command(name = "trace-replay")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Log level when RUST_LOG is not set
    #[arg(long, global = true, default_value = DEFAULT_LOG_LEVEL, env = "KVREPLAY_LOG_LEVEL")]
    log_level: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Decode a trace and print what it contains
    Inspect {
        /// Trace file to read
        path: PathBuf,
    },

    /// Replay a trace against an empty in-memory store
    Replay {
        /// Trace file to replay
        path: PathBuf,

        /// TOML file with a [replay] table
        #[arg(long, env = "KVREPLAY_CONFIG")]
        config: Option<PathBuf>,

        /// Worker threads (0 = serial)
        #[arg(long)]
        threads: Option<usize>,

        /// Divide captured delays by this ratio
        #[arg(long)]
        fast_forward: Option<f64>,

        /// Pooled dispatch queue capacity
        #[arg(long)]
        queue_depth: Option<usize>,

        /// Fail on timestamps that go backwards
        #[arg(long)]
        strict_timestamps: bool,

        /// Extra column families, assigned ids 1.. in the order given
        #[arg(long, value_delimiter = ',')]
        column_families: Vec<String>,
    },

    /// Print an annotated example configuration file
    ExampleConfig,
}

/// Per-kind tally of a trace's records
#[derive(Debug, Default, Serialize)]
struct InspectReport {
    trace_file_version: u32,
    header_timestamp: u64,
    first_timestamp: Option<u64>,
    last_timestamp: Option<u64>,
    records: u64,
    by_kind: BTreeMap<String, u64>,
    ended_cleanly: bool,
}

/// Handler that executes nothing
struct NoopHandler;

impl TraceRecordHandler for NoopHandler {
    fn handle_write(&self, _: &WriteQueryRecord) -> Result<()> {
        Ok(())
    }

    fn handle_get(&self, _: &GetQueryRecord) -> Result<()> {
        Ok(())
    }

    fn handle_iterator_seek(&self, _: &IteratorSeekQueryRecord) -> Result<()> {
        Ok(())
    }

    fn handle_multi_get(&self, _: &MultiGetQueryRecord) -> Result<()> {
        Ok(())
    }
}

fn main() -> ExitCode {
    let args = Args::parse();

    let log_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&args.log_level));
    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(log_filter)
        .init();

    if let Err(e) = run(args.command) {
        eprintln!("trace-replay failed: {e}");
        return ExitCode::from(1);
    }
    ExitCode::SUCCESS
}

fn run(command: Command) -> Result<()> {
    match command {
        Command::Inspect { path } => inspect(path),
        Command::Replay {
            path,
            config,
            threads,
            fast_forward,
            queue_depth,
            strict_timestamps,
            column_families,
        } => {
            let mut options = match config {
                Some(ref config_path) => {
                    let file = ConfigFile::load(config_path)?;
                    info!(path = %config_path.display(), "Loaded configuration");
                    file.replay
                }
                None => ReplayOptions::default(),
            };
            // Command-line flags take precedence over the file
            if let Some(threads) = threads {
                options.num_threads = threads;
            }
            if let Some(ratio) = fast_forward {
                options.fast_forward_ratio = ratio;
            }
            if let Some(depth) = queue_depth {
                options.queue_depth = depth;
            }
            if strict_timestamps {
                options.strict_timestamps = true;
            }
            options.validate()?;
            replay(path, &options, &column_families)
        }
        Command::ExampleConfig => {
            println!("{}", ConfigFile::example());
            Ok(())
        }
    }
}

fn inspect(path: PathBuf) -> Result<()> {
    let reader = FileTraceReader::open(&path)?;
    let replayer = Replayer::with_handler(NoopHandler, Box::new(reader));
    replayer.prepare()?;

    let mut report = InspectReport {
        trace_file_version: replayer.trace_file_version(),
        header_timestamp: replayer.header_timestamp(),
        ..Default::default()
    };

    while let Some(record) = replayer.next()? {
        let ts = record.timestamp();
        report.first_timestamp.get_or_insert(ts);
        report.last_timestamp = Some(ts);
        report.records += 1;
        *report
            .by_kind
            .entry(record.trace_type().name().to_string())
            .or_default() += 1;
    }
    report.ended_cleanly = replayer.ended_cleanly();
    if !report.ended_cleanly {
        warn!(path = %path.display(), "Trace has no footer");
    }

    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}

fn replay(path: PathBuf, options: &ReplayOptions, column_families: &[String]) -> Result<()> {
    let names: Vec<&str> = column_families.iter().map(String::as_str).collect();
    let store = MemoryStore::with_column_families(&names);
    let handles: Vec<_> = store.handles().iter().collect();

    let reader = FileTraceReader::open(&path)?;
    let replayer = Replayer::new(&store, &handles, Box::new(reader))?;
    replayer.prepare()?;

    let failures_by_kind: BTreeMap<TraceType, AtomicU64> = [
        TraceType::Write,
        TraceType::Get,
        TraceType::IteratorSeek,
        TraceType::IteratorSeekForPrev,
        TraceType::MultiGet,
    ]
    .into_iter()
    .map(|kind| (kind, AtomicU64::new(0)))
    .collect();

    let summary = replayer.replay(options, |outcome| {
        if let Err(e) = &outcome.result {
            debug!(
                index = outcome.index,
                kind = %outcome.kind,
                error = %e,
                "Record failed"
            );
            if let Some(counter) = failures_by_kind.get(&outcome.kind) {
                counter.fetch_add(1, Ordering::Relaxed);
            }
        }
    })?;

    for (kind, count) in &failures_by_kind {
        let count = count.load(Ordering::Relaxed);
        if count > 0 {
            warn!(kind = %kind, count, "Records failed during replay");
        }
    }

    println!("{}", serde_json::to_string_pretty(&summary)?);
    println!("{}", serde_json::to_string_pretty(&store.stats())?);
    Ok(())
}
