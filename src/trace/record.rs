//! Decoded trace records
//!
//! [`TraceRecord`] is the closed set of replayable operations. Handlers visit
//! it through [`TraceRecordHandler`], one method per kind, so adding a record
//! kind breaks every handler at compile time.

use super::entry::TraceType;
use crate::error::Result;
use bytes::Bytes;
use serde::{Deserialize, Serialize};

/// A captured write batch, still in its serialized form
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WriteQueryRecord {
    pub timestamp: u64,
    pub rep: Bytes,
}

/// A captured point lookup
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GetQueryRecord {
    pub timestamp: u64,
    pub cf_id: u32,
    pub key: Bytes,
}

/// Direction of an iterator seek
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SeekType {
    /// Position at the first key >= target
    Seek,
    /// Position at the last key <= target
    SeekForPrev,
}

/// A captured iterator seek
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IteratorSeekQueryRecord {
    pub timestamp: u64,
    pub cf_id: u32,
    pub key: Bytes,
    pub seek_type: SeekType,
    /// Inclusive lower bound the iterator was created with
    pub lower_bound: Option<Bytes>,
    /// Exclusive upper bound the iterator was created with
    pub upper_bound: Option<Bytes>,
}

/// A captured batched lookup; `cf_ids[i]` pairs with `keys[i]`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MultiGetQueryRecord {
    pub timestamp: u64,
    pub cf_ids: Vec<u32>,
    pub keys: Vec<Bytes>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TraceRecord {
    Write(WriteQueryRecord),
    Get(GetQueryRecord),
    IteratorSeek(IteratorSeekQueryRecord),
    MultiGet(MultiGetQueryRecord),
}

impl TraceRecord {
    pub fn timestamp(&self) -> u64 {
        match self {
            TraceRecord::Write(r) => r.timestamp,
            TraceRecord::Get(r) => r.timestamp,
            TraceRecord::IteratorSeek(r) => r.timestamp,
            TraceRecord::MultiGet(r) => r.timestamp,
        }
    }

    /// The entry type this record is framed as
    pub fn trace_type(&self) -> TraceType {
        match self {
            TraceRecord::Write(_) => TraceType::Write,
            TraceRecord::Get(_) => TraceType::Get,
            TraceRecord::IteratorSeek(r) => match r.seek_type {
                SeekType::Seek => TraceType::IteratorSeek,
                SeekType::SeekForPrev => TraceType::IteratorSeekForPrev,
            },
            TraceRecord::MultiGet(_) => TraceType::MultiGet,
        }
    }

    /// Dispatch to the handler method for this record's kind
    pub fn accept<H: TraceRecordHandler + ?Sized>(&self, handler: &H) -> Result<()> {
        match self {
            TraceRecord::Write(r) => handler.handle_write(r),
            TraceRecord::Get(r) => handler.handle_get(r),
            TraceRecord::IteratorSeek(r) => handler.handle_iterator_seek(r),
            TraceRecord::MultiGet(r) => handler.handle_multi_get(r),
        }
    }
}

impl From<WriteQueryRecord> for TraceRecord {
    fn from(record: WriteQueryRecord) -> Self {
        TraceRecord::Write(record)
    }
}

impl From<GetQueryRecord> for TraceRecord {
    fn from(record: GetQueryRecord) -> Self {
        TraceRecord::Get(record)
    }
}

impl From<IteratorSeekQueryRecord> for TraceRecord {
    fn from(record: IteratorSeekQueryRecord) -> Self {
        TraceRecord::IteratorSeek(record)
    }
}

impl From<MultiGetQueryRecord> for TraceRecord {
    fn from(record: MultiGetQueryRecord) -> Self {
        TraceRecord::MultiGet(record)
    }
}

/// Visitor over the closed set of trace records.
///
/// Implementations must be safe to call from several replay workers at once;
/// handlers only take `&self`.
pub trait TraceRecordHandler {
    fn handle_write(&self, record: &WriteQueryRecord) -> Result<()>;

    fn handle_get(&self, record: &GetQueryRecord) -> Result<()>;

    fn handle_iterator_seek(&self, record: &IteratorSeekQueryRecord) -> Result<()>;

    fn handle_multi_get(&self, record: &MultiGetQueryRecord) -> Result<()>;
}

impl<H: TraceRecordHandler + ?Sized> TraceRecordHandler for &H {
    fn handle_write(&self, record: &WriteQueryRecord) -> Result<()> {
        (**self).handle_write(record)
    }

    fn handle_get(&self, record: &GetQueryRecord) -> Result<()> {
        (**self).handle_get(record)
    }

    fn handle_iterator_seek(&self, record: &IteratorSeekQueryRecord) -> Result<()> {
        (**self).handle_iterator_seek(record)
    }

    fn handle_multi_get(&self, record: &MultiGetQueryRecord) -> Result<()> {
        (**self).handle_multi_get(record)
    }
}
