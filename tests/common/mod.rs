//! Shared test fixtures for kvreplay integration tests
//!
//! # Usage
//!
//! In your test file, add:
//! ```rust,ignore
//! mod common;
//! use common::*;
//! ```
//!
//! # Features
//!
//! - Record builders for the four record kinds
//! - Trace builders (in memory and on disk)
//! - `FaultyStore`: a `MemoryStore` wrapper that injects multi-get and
//!   iterator failures and tracks live iterators

#![allow(dead_code)]

use bytes::Bytes;
use kvreplay::store::{
    ColumnFamilyHandle, KvStore, MemoryStore, ReadOptions, StoreIterator, WriteBatch,
    WriteOptions,
};
use kvreplay::trace::{
    GetQueryRecord, IteratorSeekQueryRecord, MemoryTraceReader, MemoryTraceWriter,
    MultiGetQueryRecord, SeekType, TraceEncoder, TraceRecord, WriteQueryRecord,
};
use kvreplay::{FileTraceWriter, ReplayError, Result};
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

// ============================================================================
// Record Builders
// ============================================================================

pub fn get(ts: u64, cf_id: u32, key: &str) -> TraceRecord {
    GetQueryRecord {
        timestamp: ts,
        cf_id,
        key: Bytes::copy_from_slice(key.as_bytes()),
    }
    .into()
}

pub fn put(ts: u64, cf_id: u32, key: &str, value: &str) -> TraceRecord {
    let mut batch = WriteBatch::new();
    batch.put(
        cf_id,
        Bytes::copy_from_slice(key.as_bytes()),
        Bytes::copy_from_slice(value.as_bytes()),
    );
    WriteQueryRecord {
        timestamp: ts,
        rep: batch.rep(),
    }
    .into()
}

pub fn seek(ts: u64, cf_id: u32, key: &str, seek_type: SeekType) -> TraceRecord {
    IteratorSeekQueryRecord {
        timestamp: ts,
        cf_id,
        key: Bytes::copy_from_slice(key.as_bytes()),
        seek_type,
        lower_bound: None,
        upper_bound: None,
    }
    .into()
}

pub fn multi_get(ts: u64, cf_ids: &[u32], keys: &[&str]) -> TraceRecord {
    MultiGetQueryRecord {
        timestamp: ts,
        cf_ids: cf_ids.to_vec(),
        keys: keys
            .iter()
            .map(|k| Bytes::copy_from_slice(k.as_bytes()))
            .collect(),
    }
    .into()
}

// ============================================================================
// Trace Builders
// ============================================================================

/// Encoded entries of a complete trace (header, records, footer)
pub fn trace_entries(version: u32, header_ts: u64, records: &[TraceRecord]) -> Vec<Bytes> {
    let mut encoder = TraceEncoder::new(MemoryTraceWriter::new(), version, header_ts).unwrap();
    for record in records {
        encoder.write_record(record).unwrap();
    }
    encoder.finish().unwrap().entries().to_vec()
}

/// In-memory reader over a complete version 2 trace
pub fn memory_trace(header_ts: u64, records: &[TraceRecord]) -> MemoryTraceReader {
    MemoryTraceReader::new(trace_entries(2, header_ts, records))
}

/// Write a complete trace to `path`
pub fn write_trace_file(path: &Path, version: u32, header_ts: u64, records: &[TraceRecord]) {
    let writer = FileTraceWriter::create(path).unwrap();
    let mut encoder = TraceEncoder::new(writer, version, header_ts).unwrap();
    for record in records {
        encoder.write_record(record).unwrap();
    }
    encoder.finish().unwrap();
}

/// `count` gets on the default column family, `step_us` apart after `t0`
pub fn evenly_spaced_gets(t0: u64, step_us: u64, count: u64) -> Vec<TraceRecord> {
    (0..count)
        .map(|i| get(t0 + i * step_us, 0, &format!("key-{}", i)))
        .collect()
}

// ============================================================================
// Fault Injection
// ============================================================================

/// Which failure a [`FaultyStore`] injects
#[derive(Debug, Clone, Default)]
pub struct Faults {
    /// Per-key statuses for multi-get, by position; positions without an
    /// entry defer to the inner store
    pub multi_get_errors: Vec<(usize, String)>,
    /// Make every iterator report an error status after positioning
    pub iterator_status_error: bool,
}

/// `MemoryStore` wrapper with injected failures
pub struct FaultyStore {
    pub inner: MemoryStore,
    pub faults: Faults,
    pub live_iterators: Arc<AtomicUsize>,
    pub iterators_created: AtomicUsize,
}

impl FaultyStore {
    pub fn new(inner: MemoryStore, faults: Faults) -> Self {
        Self {
            inner,
            faults,
            live_iterators: Arc::new(AtomicUsize::new(0)),
            iterators_created: AtomicUsize::new(0),
        }
    }

    pub fn live_iterators(&self) -> usize {
        self.live_iterators.load(Ordering::SeqCst)
    }
}

impl KvStore for FaultyStore {
    fn write(&self, options: &WriteOptions, batch: &WriteBatch) -> Result<()> {
        self.inner.write(options, batch)
    }

    fn get(&self, options: &ReadOptions, cf: &ColumnFamilyHandle, key: &[u8]) -> Result<Bytes> {
        self.inner.get(options, cf, key)
    }

    fn multi_get(
        &self,
        options: &ReadOptions,
        cfs: &[&ColumnFamilyHandle],
        keys: &[Bytes],
    ) -> Vec<Result<Bytes>> {
        let mut results = self.inner.multi_get(options, cfs, keys);
        for (position, detail) in &self.faults.multi_get_errors {
            if let Some(slot) = results.get_mut(*position) {
                *slot = Err(ReplayError::store("multi_get", detail.clone()));
            }
        }
        results
    }

    fn new_iterator<'s>(
        &'s self,
        options: &ReadOptions,
        cf: &ColumnFamilyHandle,
    ) -> Result<Box<dyn StoreIterator + 's>> {
        let inner = self.inner.new_iterator(options, cf)?;
        self.iterators_created.fetch_add(1, Ordering::SeqCst);
        self.live_iterators.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(TrackedIterator {
            inner,
            live: Arc::clone(&self.live_iterators),
            fail_status: self.faults.iterator_status_error,
        }))
    }
}

/// Iterator that decrements the live count when dropped
pub struct TrackedIterator<'s> {
    inner: Box<dyn StoreIterator + 's>,
    live: Arc<AtomicUsize>,
    fail_status: bool,
}

impl StoreIterator for TrackedIterator<'_> {
    fn seek(&mut self, target: &[u8]) {
        self.inner.seek(target);
    }

    fn seek_for_prev(&mut self, target: &[u8]) {
        self.inner.seek_for_prev(target);
    }

    fn valid(&self) -> bool {
        self.inner.valid()
    }

    fn key(&self) -> Option<&[u8]> {
        self.inner.key()
    }

    fn value(&self) -> Option<&[u8]> {
        self.inner.value()
    }

    fn next(&mut self) {
        self.inner.next();
    }

    fn prev(&mut self) {
        self.inner.prev();
    }

    fn status(&self) -> Result<()> {
        if self.fail_status {
            return Err(ReplayError::store("iterator", "injected status failure"));
        }
        self.inner.status()
    }
}

impl Drop for TrackedIterator<'_> {
    fn drop(&mut self) {
        self.live.fetch_sub(1, Ordering::SeqCst);
    }
}

/// Store whose iterators remember where the last seek landed
pub struct PositionRecordingStore {
    pub inner: MemoryStore,
    pub positions: parking_lot::Mutex<Vec<Option<Vec<u8>>>>,
}

impl PositionRecordingStore {
    pub fn new(inner: MemoryStore) -> Self {
        Self {
            inner,
            positions: parking_lot::Mutex::new(Vec::new()),
        }
    }
}

impl KvStore for PositionRecordingStore {
    fn write(&self, options: &WriteOptions, batch: &WriteBatch) -> Result<()> {
        self.inner.write(options, batch)
    }

    fn get(&self, options: &ReadOptions, cf: &ColumnFamilyHandle, key: &[u8]) -> Result<Bytes> {
        self.inner.get(options, cf, key)
    }

    fn multi_get(
        &self,
        options: &ReadOptions,
        cfs: &[&ColumnFamilyHandle],
        keys: &[Bytes],
    ) -> Vec<Result<Bytes>> {
        self.inner.multi_get(options, cfs, keys)
    }

    fn new_iterator<'s>(
        &'s self,
        options: &ReadOptions,
        cf: &ColumnFamilyHandle,
    ) -> Result<Box<dyn StoreIterator + 's>> {
        Ok(Box::new(PositionRecordingIterator {
            inner: self.inner.new_iterator(options, cf)?,
            positions: &self.positions,
        }))
    }
}

struct PositionRecordingIterator<'s> {
    inner: Box<dyn StoreIterator + 's>,
    positions: &'s parking_lot::Mutex<Vec<Option<Vec<u8>>>>,
}

impl PositionRecordingIterator<'_> {
    fn record(&self) {
        self.positions.lock().push(self.inner.key().map(<[u8]>::to_vec));
    }
}

impl StoreIterator for PositionRecordingIterator<'_> {
    fn seek(&mut self, target: &[u8]) {
        self.inner.seek(target);
        self.record();
    }

    fn seek_for_prev(&mut self, target: &[u8]) {
        self.inner.seek_for_prev(target);
        self.record();
    }

    fn valid(&self) -> bool {
        self.inner.valid()
    }

    fn key(&self) -> Option<&[u8]> {
        self.inner.key()
    }

    fn value(&self) -> Option<&[u8]> {
        self.inner.value()
    }

    fn next(&mut self) {
        self.inner.next();
    }

    fn prev(&mut self) {
        self.inner.prev();
    }

    fn status(&self) -> Result<()> {
        self.inner.status()
    }
}
