//! Trace stream writers
//!
//! [`TraceEncoder`] produces a well-formed stream (header, records, footer)
//! for a chosen format version on top of any [`TraceWriter`] sink.

use super::codec::encode_record;
use super::entry::Trace;
use super::reader::MemoryTraceReader;
use super::record::TraceRecord;
use crate::error::{ReplayError, Result};
use bytes::Bytes;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

/// Sink for framed trace entries
pub trait TraceWriter: Send {
    fn write(&mut self, entry: &[u8]) -> Result<()>;

    /// Flush and release the sink
    fn close(&mut self) -> Result<()>;

    fn bytes_written(&self) -> u64;
}

/// Writes framed entries to a file
pub struct FileTraceWriter {
    path: PathBuf,
    writer: Option<BufWriter<File>>,
    bytes_written: u64,
}

impl FileTraceWriter {
    pub fn create(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let file = File::create(&path).map_err(|e| {
            ReplayError::Io(std::io::Error::new(
                e.kind(),
                format!("Failed to create trace file {}: {}", path.display(), e),
            ))
        })?;
        Ok(Self {
            path,
            writer: Some(BufWriter::new(file)),
            bytes_written: 0,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl TraceWriter for FileTraceWriter {
    fn write(&mut self, entry: &[u8]) -> Result<()> {
        let writer = self
            .writer
            .as_mut()
            .ok_or_else(|| ReplayError::InvalidState("trace writer is closed".to_string()))?;
        writer.write_all(entry)?;
        self.bytes_written += entry.len() as u64;
        Ok(())
    }

    fn close(&mut self) -> Result<()> {
        if let Some(mut writer) = self.writer.take() {
            writer.flush()?;
            writer.get_ref().sync_all()?;
        }
        Ok(())
    }

    fn bytes_written(&self) -> u64 {
        self.bytes_written
    }
}

/// Collects framed entries in memory
#[derive(Debug, Default)]
pub struct MemoryTraceWriter {
    entries: Vec<Bytes>,
    bytes_written: u64,
}

impl MemoryTraceWriter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn entries(&self) -> &[Bytes] {
        &self.entries
    }

    /// Turn the collected entries into a reader over the same stream
    pub fn into_reader(self) -> MemoryTraceReader {
        MemoryTraceReader::new(self.entries)
    }
}

impl TraceWriter for MemoryTraceWriter {
    fn write(&mut self, entry: &[u8]) -> Result<()> {
        self.entries.push(Bytes::copy_from_slice(entry));
        self.bytes_written += entry.len() as u64;
        Ok(())
    }

    fn close(&mut self) -> Result<()> {
        Ok(())
    }

    fn bytes_written(&self) -> u64 {
        self.bytes_written
    }
}

/// Writes a complete trace stream
pub struct TraceEncoder<W: TraceWriter> {
    writer: W,
    version: u32,
    records: u64,
    last_ts: u64,
}

impl<W: TraceWriter> TraceEncoder<W> {
    /// Start a stream by writing its header
    pub fn new(mut writer: W, version: u32, start_ts: u64) -> Result<Self> {
        let header = Trace::header(start_ts, version);
        // Reject versions the decoder would refuse before anything is written.
        header.parse_header()?;
        writer.write(&header.encode())?;
        Ok(Self {
            writer,
            version,
            records: 0,
            last_ts: start_ts,
        })
    }

    pub fn version(&self) -> u32 {
        self.version
    }

    pub fn records_written(&self) -> u64 {
        self.records
    }

    pub fn write_record(&mut self, record: &TraceRecord) -> Result<()> {
        let trace = encode_record(record, self.version)?;
        self.write_trace(&trace)?;
        self.records += 1;
        Ok(())
    }

    /// Write an already-built entry verbatim
    pub fn write_trace(&mut self, trace: &Trace) -> Result<()> {
        self.writer.write(&trace.encode())?;
        self.last_ts = self.last_ts.max(trace.ts);
        Ok(())
    }

    /// Write the footer, close the sink and hand it back
    pub fn finish(mut self) -> Result<W> {
        let footer = Trace::footer(self.last_ts);
        self.writer.write(&footer.encode())?;
        self.writer.close()?;
        Ok(self.writer)
    }

    /// Close the sink without a footer, as an interrupted capture would
    pub fn abandon(mut self) -> Result<W> {
        self.writer.close()?;
        Ok(self.writer)
    }
}

/// Current wall-clock time in microseconds, the unit trace timestamps use
pub fn now_micros() -> u64 {
    chrono::Utc::now().timestamp_micros().max(0) as u64
}
