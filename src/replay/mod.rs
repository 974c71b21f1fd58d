//! Trace replay
//!
//! This module turns a decoded trace back into load on a store:
//! - `handler` applies single records to a [`KvStore`](crate::store::KvStore)
//! - `pacing` spaces dispatches by the captured timestamps
//! - `pool` runs record execution on a fixed set of workers
//! - `replayer` owns the stream cursor and ties the pieces together
//!
//! # Usage
//!
//! ```rust,ignore
//! use kvreplay::{FileTraceReader, MemoryStore, ReplayOptions, Replayer};
//!
//! let store = MemoryStore::new();
//! let handles: Vec<_> = store.handles().iter().collect();
//! let reader = FileTraceReader::open("./traces/ingest.trace")?;
//!
//! let replayer = Replayer::new(&store, &handles, Box::new(reader))?;
//! replayer.prepare()?;
//! let summary = replayer.replay(&ReplayOptions::new(2.0).with_threads(8), |outcome| {
//!     if let Err(e) = &outcome.result {
//!         eprintln!("record {} failed: {}", outcome.index, e);
//!     }
//! })?;
//! ```

pub mod handler;
pub mod pacing;
pub mod pool;
pub mod replayer;

pub use handler::TraceExecutionHandler;
pub use pacing::{Pacer, ReplayCancel};
pub use pool::TaskQueue;
pub use replayer::{ReplayOutcome, ReplaySummary, Replayer};
