#![warn(clippy::unwrap_used)]
#![warn(clippy::expect_used)]

//! # kvreplay
//!
//! kvreplay decodes captured key-value store traces and replays them against a
//! live store, keeping the original inter-operation pacing (optionally sped up)
//! and, if asked, spreading execution over a pool of worker threads to emulate
//! concurrent clients.
//!
//! ## Features
//!
//! - **Versioned trace format**: framed, checksummed entries; format versions 1 and 2
//! - **Four record kinds**: write batches, point gets, iterator seeks, multi-gets
//! - **Paced replay**: original timing divided by a fast-forward ratio
//! - **Pooled replay**: ordered dispatch, concurrent execution, bounded queue
//! - **Cancellation**: stop a long replay from another thread
//!
//! ## Library Usage
//!
//! ```no_run
//! use kvreplay::{FileTraceReader, MemoryStore, ReplayOptions, Replayer, Result};
//!
//! fn main() -> Result<()> {
//!     let store = MemoryStore::with_column_families(&["users"]);
//!     let handles: Vec<_> = store.handles().iter().collect();
//!
//!     let reader = FileTraceReader::open("ingest.trace")?;
//!     let replayer = Replayer::new(&store, &handles, Box::new(reader))?;
//!     replayer.prepare()?;
//!
//!     let summary = replayer.replay(&ReplayOptions::new(1.0), |outcome| {
//!         println!("{} {:?}", outcome.kind, outcome.result);
//!     })?;
//!     println!("replayed {} records", summary.records_dispatched);
//!     Ok(())
//! }
//! ```
//!
//! ## Modules
//!
//! | Module | Contents |
//! |--------|----------|
//! | [`trace`] | Entry framing, record types, codec, readers and writers |
//! | [`store`] | Target store traits and the in-memory store |
//! | [`replay`] | Execution handler, pacing, worker pool, replay engine |
//! | [`config`], [`error`] | Replay options and error types |

#![cfg_attr(not(test), deny(clippy::unwrap_used))]

pub mod config;
pub mod error;
pub mod replay;
pub mod store;
pub mod trace;

pub use config::{ConfigFile, ReplayOptions};
pub use error::{ReplayError, Result, StoreError};
pub use replay::{
    ReplayCancel, ReplayOutcome, ReplaySummary, Replayer, TraceExecutionHandler,
};
pub use store::{
    ColumnFamilyHandle, KvStore, MemoryStore, ReadOptions, StoreIterator, WriteBatch,
    WriteOptions,
};
pub use trace::{
    FileTraceReader, FileTraceWriter, MemoryTraceReader, MemoryTraceWriter, SeekType, Trace,
    TraceEncoder, TraceReader, TraceRecord, TraceRecordHandler, TraceType, TraceWriter,
};
