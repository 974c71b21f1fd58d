//! Sequential trace stream readers
//!
//! A [`TraceReader`] hands out raw framed entries in stream order. It has no
//! notion of seeking; the replayer owns the only cursor and serializes access
//! to it.

use super::entry::{Trace, ENTRY_CRC_SIZE, ENTRY_PREFIX_SIZE, MAX_PAYLOAD_SIZE};
use crate::error::{ReplayError, Result};
use bytes::Bytes;
use std::collections::VecDeque;
use std::fs::File;
use std::io::{BufReader, ErrorKind, Read};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::debug;

/// Source of raw trace entries
pub trait TraceReader: Send {
    /// Read the next framed entry, or `None` at end of stream
    fn read(&mut self) -> Result<Option<Bytes>>;

    /// Release the underlying stream. Further reads fail.
    fn close(&mut self) -> Result<()>;
}

/// Initial buffer reserved for an entry body
const READ_CHUNK_SIZE: usize = 64 * 1024;

/// Reads framed entries from a trace file on disk
pub struct FileTraceReader {
    path: PathBuf,
    reader: Option<BufReader<File>>,
    offset: u64,
}

impl FileTraceReader {
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let file = File::open(&path).map_err(|e| {
            ReplayError::Io(std::io::Error::new(
                e.kind(),
                format!("Failed to open trace file {}: {}", path.display(), e),
            ))
        })?;
        debug!(path = %path.display(), "Opened trace file");
        Ok(Self {
            path,
            reader: Some(BufReader::new(file)),
            offset: 0,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Byte offset of the next unread entry
    pub fn offset(&self) -> u64 {
        self.offset
    }
}

/// Fill `buf` as far as the stream allows, returning the bytes read
fn read_full(reader: &mut impl Read, buf: &mut [u8]) -> std::io::Result<usize> {
    let mut filled = 0;
    while filled < buf.len() {
        match reader.read(&mut buf[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(e) if e.kind() == ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        }
    }
    Ok(filled)
}

impl TraceReader for FileTraceReader {
    fn read(&mut self) -> Result<Option<Bytes>> {
        let reader = self
            .reader
            .as_mut()
            .ok_or_else(|| ReplayError::InvalidState("trace reader is closed".to_string()))?;

        let mut prefix = [0u8; ENTRY_PREFIX_SIZE];
        let got = read_full(reader, &mut prefix)?;
        if got == 0 {
            return Ok(None);
        }
        if got < ENTRY_PREFIX_SIZE {
            return Err(ReplayError::corruption(
                "read trace",
                format!("entry prefix truncated at offset {}", self.offset),
            ));
        }

        let frame_len = Trace::frame_len(&prefix).unwrap_or(ENTRY_PREFIX_SIZE + ENTRY_CRC_SIZE);
        if frame_len - ENTRY_PREFIX_SIZE - ENTRY_CRC_SIZE > MAX_PAYLOAD_SIZE {
            return Err(ReplayError::corruption(
                "read trace",
                format!("oversized entry at offset {}", self.offset),
            ));
        }

        // The buffer grows with what is actually read, never with the
        // length the prefix claims
        let body_len = frame_len - ENTRY_PREFIX_SIZE;
        let mut frame = Vec::with_capacity(ENTRY_PREFIX_SIZE + body_len.min(READ_CHUNK_SIZE));
        frame.extend_from_slice(&prefix);
        let rest = reader.by_ref().take(body_len as u64).read_to_end(&mut frame)?;
        if rest < body_len {
            return Err(ReplayError::corruption(
                "read trace",
                format!("entry truncated at offset {}", self.offset),
            ));
        }

        self.offset += frame_len as u64;
        Ok(Some(Bytes::from(frame)))
    }

    fn close(&mut self) -> Result<()> {
        if self.reader.take().is_some() {
            debug!(path = %self.path.display(), offset = self.offset, "Closed trace file");
        }
        Ok(())
    }
}

/// Serves pre-framed entries from memory
pub struct MemoryTraceReader {
    entries: VecDeque<Bytes>,
    closed: Arc<AtomicBool>,
}

impl MemoryTraceReader {
    pub fn new(entries: impl IntoIterator<Item = Bytes>) -> Self {
        Self {
            entries: entries.into_iter().collect(),
            closed: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Flag that flips once the reader has been closed
    pub fn closed_flag(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.closed)
    }

    pub fn remaining(&self) -> usize {
        self.entries.len()
    }
}

impl TraceReader for MemoryTraceReader {
    fn read(&mut self) -> Result<Option<Bytes>> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(ReplayError::InvalidState(
                "trace reader is closed".to_string(),
            ));
        }
        Ok(self.entries.pop_front())
    }

    fn close(&mut self) -> Result<()> {
        self.closed.store(true, Ordering::SeqCst);
        self.entries.clear();
        Ok(())
    }
}
