//! Trace replay engine
//!
//! [`Replayer`] owns the stream cursor and walks a trace through
//! `Unprepared -> Prepared -> Ended`. Decoding is always serialized behind the
//! cursor lock; execution happens on the calling thread (serial replay) or on
//! a fixed pool of workers (pooled replay).

use super::handler::TraceExecutionHandler;
use super::pacing::{Pacer, ReplayCancel};
use super::pool::{run_pooled, PoolStats};
use crate::config::ReplayOptions;
use crate::error::{ReplayError, Result};
use crate::store::{ColumnFamilyHandle, KvStore};
use crate::trace::{decode_record, Trace, TraceReader, TraceRecord, TraceRecordHandler, TraceType};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering};
use std::time::{Duration, Instant};
use tracing::{debug, error, info, warn};

/// Result of executing one replayed record
#[derive(Debug)]
pub struct ReplayOutcome {
    /// Position of the record in dispatch order, starting at 0
    pub index: u64,
    /// Timestamp the record was captured with
    pub timestamp: u64,
    pub kind: TraceType,
    pub result: Result<()>,
    /// Time spent in the handler
    pub latency: Duration,
}

/// Totals for one `replay` call
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReplaySummary {
    pub records_dispatched: u64,
    pub records_succeeded: u64,
    pub records_failed: u64,
    /// Pooled records whose handler panicked; no outcome is reported for them
    pub records_panicked: u64,
    /// Wall-clock duration of the replay in milliseconds
    pub elapsed_ms: u64,
    /// Whether the trace footer was reached
    pub footer_seen: bool,
}

#[derive(Debug, Default)]
struct OutcomeCounters {
    succeeded: AtomicU64,
    failed: AtomicU64,
}

/// Drives a trace through a [`TraceRecordHandler`]
///
/// `prepared`, `ended` and `footer_seen` only ever flip from false to true and
/// can be read without taking the cursor lock.
pub struct Replayer<H: TraceRecordHandler> {
    handler: H,
    cursor: Mutex<Box<dyn TraceReader>>,
    prepared: AtomicBool,
    ended: AtomicBool,
    footer_seen: AtomicBool,
    header_ts: AtomicU64,
    trace_file_version: AtomicU32,
    cancel: ReplayCancel,
}

impl<'a, S: KvStore + ?Sized> Replayer<TraceExecutionHandler<'a, S>> {
    /// Replay against `store`, resolving column family ids through `handles`
    pub fn new(
        store: &'a S,
        handles: &[&'a ColumnFamilyHandle],
        reader: Box<dyn TraceReader>,
    ) -> Result<Self> {
        let handler = TraceExecutionHandler::new(store, handles)?;
        Ok(Self::with_handler(handler, reader))
    }
}

impl<H: TraceRecordHandler> Replayer<H> {
    pub fn with_handler(handler: H, reader: Box<dyn TraceReader>) -> Self {
        Self {
            handler,
            cursor: Mutex::new(reader),
            prepared: AtomicBool::new(false),
            ended: AtomicBool::new(false),
            footer_seen: AtomicBool::new(false),
            header_ts: AtomicU64::new(0),
            trace_file_version: AtomicU32::new(0),
            cancel: ReplayCancel::new(),
        }
    }

    /// Read and validate the header entry
    pub fn prepare(&self) -> Result<()> {
        let mut reader = self.cursor.lock();
        if self.is_prepared() {
            return Err(ReplayError::InvalidState(
                "replayer is already prepared".to_string(),
            ));
        }

        let raw = reader
            .read()?
            .ok_or_else(|| ReplayError::corruption("prepare", "trace has no header"))?;
        let (header, _) = Trace::decode(&raw)?;
        let version = header.parse_header()?;

        self.header_ts.store(header.ts, Ordering::SeqCst);
        self.trace_file_version.store(version, Ordering::SeqCst);
        self.prepared.store(true, Ordering::SeqCst);

        info!(
            trace_file_version = version,
            header_ts = header.ts,
            "Prepared trace for replay"
        );
        Ok(())
    }

    /// Decode the next record, or `None` once the trace has ended
    pub fn next(&self) -> Result<Option<TraceRecord>> {
        self.ensure_prepared()?;
        let mut reader = self.cursor.lock();
        self.read_record(&mut **reader)
    }

    /// Execute one record without touching the cursor
    pub fn execute(&self, record: &TraceRecord) -> Result<()> {
        record.accept(&self.handler)
    }

    /// [`execute`](Self::execute) plus the time the handler took
    pub fn execute_timed(&self, record: &TraceRecord) -> (Result<()>, Duration) {
        let start = Instant::now();
        let result = self.execute(record);
        (result, start.elapsed())
    }

    /// Replay from the current position to the end of the trace
    ///
    /// `callback` receives one [`ReplayOutcome`] per executed record. In
    /// pooled mode it is called from the worker threads, in completion order.
    /// Record failures never stop the replay; only a stream-level decode
    /// failure or cancellation does. A handler panic in pooled mode is caught
    /// and counted in [`ReplaySummary::records_panicked`]; in serial mode it
    /// unwinds out of this call.
    pub fn replay<F>(&self, options: &ReplayOptions, callback: F) -> Result<ReplaySummary>
    where
        H: Sync,
        F: Fn(ReplayOutcome) + Sync,
    {
        options.validate()?;
        self.ensure_prepared()?;

        let mut reader = self.cursor.lock();
        let started = Instant::now();
        let mut pacer = Pacer::new(
            self.header_timestamp(),
            options.fast_forward_ratio,
            options.strict_timestamps,
        );
        let counters = OutcomeCounters::default();

        info!(
            num_threads = options.num_threads,
            fast_forward_ratio = options.fast_forward_ratio,
            "Starting replay"
        );

        let run = |index: u64, record: &TraceRecord| {
            let (result, latency) = self.execute_timed(record);
            let counter = if result.is_ok() {
                &counters.succeeded
            } else {
                &counters.failed
            };
            counter.fetch_add(1, Ordering::Relaxed);
            callback(ReplayOutcome {
                index,
                timestamp: record.timestamp(),
                kind: record.trace_type(),
                result,
                latency,
            });
        };

        let mut records_panicked = 0;
        let result = if options.is_pooled() {
            let stats = PoolStats::default();
            let result = run_pooled(
                options.num_threads,
                options.queue_depth,
                &stats,
                |queue| {
                    self.dispatch(&mut **reader, &mut pacer, |index, record| {
                        if queue.push((index, record)) {
                            Ok(())
                        } else {
                            Err(ReplayError::Cancelled)
                        }
                    })
                },
                |(index, record): (u64, TraceRecord)| run(index, &record),
            );
            records_panicked = stats.task_panics.load(Ordering::Relaxed);
            if records_panicked > 0 {
                warn!(
                    panics = records_panicked,
                    "Replay handler panicked on some records"
                );
            }
            result
        } else {
            self.dispatch(&mut **reader, &mut pacer, |index, record| {
                run(index, &record);
                Ok(())
            })
        };

        let elapsed_ms = started.elapsed().as_millis() as u64;
        let records_dispatched = result?;
        let summary = ReplaySummary {
            records_dispatched,
            records_succeeded: counters.succeeded.load(Ordering::Relaxed),
            records_failed: counters.failed.load(Ordering::Relaxed),
            records_panicked,
            elapsed_ms,
            footer_seen: self.ended_cleanly(),
        };

        info!(
            dispatched = summary.records_dispatched,
            failed = summary.records_failed,
            elapsed_ms = summary.elapsed_ms,
            "Replay finished"
        );
        Ok(summary)
    }

    /// Pace and hand each record to `submit` in trace order
    fn dispatch<D>(&self, reader: &mut dyn TraceReader, pacer: &mut Pacer, mut submit: D) -> Result<u64>
    where
        D: FnMut(u64, TraceRecord) -> Result<()>,
    {
        let mut index = 0;
        while let Some(record) = self.read_record(reader)? {
            self.cancel.check()?;
            if let Err(e) = pacer.wait(record.timestamp(), &self.cancel) {
                if e.is_stream_fatal() {
                    self.ended.store(true, Ordering::SeqCst);
                    error!(index, error = %e, "Replay stopped on out-of-order timestamp");
                }
                return Err(e);
            }

            debug!(
                index,
                timestamp = record.timestamp(),
                kind = %record.trace_type(),
                "Dispatching record"
            );
            submit(index, record)?;
            index += 1;
        }
        Ok(index)
    }

    fn read_record(&self, reader: &mut dyn TraceReader) -> Result<Option<TraceRecord>> {
        if self.has_ended() {
            return Ok(None);
        }

        let raw = match reader.read() {
            Ok(Some(raw)) => raw,
            Ok(None) => {
                self.ended.store(true, Ordering::SeqCst);
                warn!("Trace ended without a footer");
                return Ok(None);
            }
            Err(e) => {
                self.ended.store(true, Ordering::SeqCst);
                error!(error = %e, "Failed to read trace entry");
                return Err(e);
            }
        };

        let version = self.trace_file_version();
        let decoded = Trace::decode(&raw).and_then(|(trace, _)| {
            if trace.is_footer() {
                Ok(None)
            } else {
                decode_record(&trace, version).map(Some)
            }
        });

        match decoded {
            Ok(Some(record)) => Ok(Some(record)),
            Ok(None) => {
                self.footer_seen.store(true, Ordering::SeqCst);
                self.ended.store(true, Ordering::SeqCst);
                debug!("Reached trace footer");
                Ok(None)
            }
            Err(e) => {
                self.ended.store(true, Ordering::SeqCst);
                error!(error = %e, "Failed to decode trace entry");
                Err(e)
            }
        }
    }

    fn ensure_prepared(&self) -> Result<()> {
        if self.is_prepared() {
            Ok(())
        } else {
            Err(ReplayError::InvalidState(
                "prepare must be called first".to_string(),
            ))
        }
    }

    /// Timestamp of the header entry, the pacing baseline
    pub fn header_timestamp(&self) -> u64 {
        self.header_ts.load(Ordering::SeqCst)
    }

    /// Format version from the header, 0 before `prepare`
    pub fn trace_file_version(&self) -> u32 {
        self.trace_file_version.load(Ordering::SeqCst)
    }

    pub fn is_prepared(&self) -> bool {
        self.prepared.load(Ordering::SeqCst)
    }

    pub fn has_ended(&self) -> bool {
        self.ended.load(Ordering::SeqCst)
    }

    /// Whether the trace ended at its footer rather than on an error or a
    /// truncated stream
    pub fn ended_cleanly(&self) -> bool {
        self.footer_seen.load(Ordering::SeqCst)
    }

    /// Handle that stops a running or future `replay`
    pub fn cancel_handle(&self) -> ReplayCancel {
        self.cancel.clone()
    }

    pub fn handler(&self) -> &H {
        &self.handler
    }
}

impl<H: TraceRecordHandler> Drop for Replayer<H> {
    fn drop(&mut self) {
        if let Err(e) = self.cursor.get_mut().close() {
            warn!(error = %e, "Failed to close trace reader");
        }
    }
}
