//! Trace stream format
//!
//! A trace is a captured, ordered sequence of key-value store operations.
//! This module covers everything between raw bytes and typed records:
//!
//! - [`entry`]: entry framing, type tags, header and footer
//! - [`record`]: the decoded record kinds and the handler visitor
//! - [`codec`]: version-aware payload encode/decode
//! - [`reader`] / [`writer`]: sequential stream sources and sinks

pub mod codec;
pub mod entry;
pub mod reader;
pub mod record;
pub mod writer;

pub use codec::{decode_record, encode_record};
pub use entry::{Trace, TraceType, CURRENT_TRACE_FILE_VERSION, MIN_TRACE_FILE_VERSION};
pub use reader::{FileTraceReader, MemoryTraceReader, TraceReader};
pub use record::{
    GetQueryRecord, IteratorSeekQueryRecord, MultiGetQueryRecord, SeekType, TraceRecord,
    TraceRecordHandler, WriteQueryRecord,
};
pub use writer::{now_micros, FileTraceWriter, MemoryTraceWriter, TraceEncoder, TraceWriter};
