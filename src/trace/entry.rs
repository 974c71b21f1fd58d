//! Trace entry framing
//!
//! A trace stream is a sequence of framed entries: one `Begin` header, any
//! number of query entries, and one `End` footer. Every entry uses the same
//! little-endian frame:
//!
//! ```text
//! +-----------+------+-------------+---------+-------+
//! | timestamp | type | payload_len | payload | crc32 |
//! |    u64    |  u8  |     u32     |  bytes  |  u32  |
//! +-----------+------+-------------+---------+-------+
//! ```
//!
//! The CRC covers everything before it. Frames are checked before the type tag
//! is interpreted, so a damaged frame is reported as corruption even if its tag
//! byte happens to be unknown.

use crate::error::{ReplayError, Result};
use bytes::{Buf, BufMut, Bytes, BytesMut};
use serde::{Deserialize, Serialize};

/// Magic bytes at the start of the header payload
pub const TRACE_MAGIC: &[u8; 4] = b"KVTR";

/// Trace format version written by default
pub const CURRENT_TRACE_FILE_VERSION: u32 = 2;

/// Oldest trace format version that can still be decoded
pub const MIN_TRACE_FILE_VERSION: u32 = 1;

/// Size of the fixed frame prefix (timestamp + type + payload length)
pub const ENTRY_PREFIX_SIZE: usize = 8 + 1 + 4;

/// Size of the trailing frame checksum
pub const ENTRY_CRC_SIZE: usize = 4;

/// Largest payload a single entry may carry (256 MB)
pub const MAX_PAYLOAD_SIZE: usize = 256 * 1024 * 1024;

/// Trace entry type tag
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
#[repr(u8)]
pub enum TraceType {
    /// Stream header
    Begin = 1,
    /// Stream footer
    End = 2,
    Write = 3,
    Get = 4,
    IteratorSeek = 5,
    IteratorSeekForPrev = 6,
    MultiGet = 8,
}

impl TraceType {
    pub fn as_u8(self) -> u8 {
        self as u8
    }

    /// Whether entries of this type carry a replayable query
    pub fn is_query(self) -> bool {
        !matches!(self, TraceType::Begin | TraceType::End)
    }

    pub fn name(self) -> &'static str {
        match self {
            TraceType::Begin => "begin",
            TraceType::End => "end",
            TraceType::Write => "write",
            TraceType::Get => "get",
            TraceType::IteratorSeek => "iterator_seek",
            TraceType::IteratorSeekForPrev => "iterator_seek_for_prev",
            TraceType::MultiGet => "multi_get",
        }
    }
}

impl std::fmt::Display for TraceType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

impl TryFrom<u8> for TraceType {
    type Error = ReplayError;

    fn try_from(value: u8) -> Result<Self> {
        match value {
            1 => Ok(TraceType::Begin),
            2 => Ok(TraceType::End),
            3 => Ok(TraceType::Write),
            4 => Ok(TraceType::Get),
            5 => Ok(TraceType::IteratorSeek),
            6 => Ok(TraceType::IteratorSeekForPrev),
            8 => Ok(TraceType::MultiGet),
            _ => Err(ReplayError::NotSupported(format!(
                "unknown trace type tag {}",
                value
            ))),
        }
    }
}

/// One framed entry of a trace stream, payload still opaque
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Trace {
    /// Capture time in microseconds since epoch
    pub ts: u64,
    pub trace_type: TraceType,
    pub payload: Bytes,
}

impl Trace {
    pub fn new(ts: u64, trace_type: TraceType, payload: Bytes) -> Self {
        Self {
            ts,
            trace_type,
            payload,
        }
    }

    /// Build the stream header entry
    pub fn header(start_ts: u64, version: u32) -> Self {
        let mut payload = BytesMut::with_capacity(TRACE_MAGIC.len() + 4);
        payload.put_slice(TRACE_MAGIC);
        payload.put_u32_le(version);
        Self::new(start_ts, TraceType::Begin, payload.freeze())
    }

    /// Build the stream footer entry
    pub fn footer(ts: u64) -> Self {
        Self::new(ts, TraceType::End, Bytes::new())
    }

    pub fn is_header(&self) -> bool {
        self.trace_type == TraceType::Begin
    }

    pub fn is_footer(&self) -> bool {
        self.trace_type == TraceType::End
    }

    /// Extract the trace file version from a header entry
    pub fn parse_header(&self) -> Result<u32> {
        if !self.is_header() {
            return Err(ReplayError::corruption(
                "read header",
                format!("expected begin entry, found {}", self.trace_type),
            ));
        }
        let mut payload = self.payload.clone();
        if payload.remaining() < TRACE_MAGIC.len() + 4 {
            return Err(ReplayError::corruption(
                "read header",
                "header payload truncated",
            ));
        }
        if &payload[..TRACE_MAGIC.len()] != TRACE_MAGIC {
            return Err(ReplayError::corruption("read header", "bad magic"));
        }
        payload.advance(TRACE_MAGIC.len());
        let version = payload.get_u32_le();
        if !(MIN_TRACE_FILE_VERSION..=CURRENT_TRACE_FILE_VERSION).contains(&version) {
            return Err(ReplayError::NotSupported(format!(
                "trace file version {}",
                version
            )));
        }
        Ok(version)
    }

    /// Frame the entry
    pub fn encode(&self) -> Bytes {
        let total_size = ENTRY_PREFIX_SIZE + self.payload.len() + ENTRY_CRC_SIZE;
        let mut buf = BytesMut::with_capacity(total_size);

        buf.put_u64_le(self.ts);
        buf.put_u8(self.trace_type.as_u8());
        buf.put_u32_le(self.payload.len() as u32);
        buf.put_slice(&self.payload);

        let crc = crc32fast::hash(&buf);
        buf.put_u32_le(crc);

        buf.freeze()
    }

    /// Parse one framed entry from the front of `data`.
    ///
    /// Returns the entry and the number of bytes it occupied.
    pub fn decode(data: &[u8]) -> Result<(Self, usize)> {
        if data.len() < ENTRY_PREFIX_SIZE + ENTRY_CRC_SIZE {
            return Err(ReplayError::corruption("decode entry", "entry too short"));
        }

        let mut prefix = &data[..ENTRY_PREFIX_SIZE];
        let ts = prefix.get_u64_le();
        let tag = prefix.get_u8();
        let payload_len = prefix.get_u32_le() as usize;

        if payload_len > MAX_PAYLOAD_SIZE {
            return Err(ReplayError::corruption(
                "decode entry",
                format!("payload length {} exceeds maximum", payload_len),
            ));
        }

        let crc_start = ENTRY_PREFIX_SIZE + payload_len;
        let total = crc_start + ENTRY_CRC_SIZE;
        if data.len() < total {
            return Err(ReplayError::corruption("decode entry", "payload truncated"));
        }

        let mut crc_bytes = &data[crc_start..total];
        let expected = crc_bytes.get_u32_le();
        if crc32fast::hash(&data[..crc_start]) != expected {
            return Err(ReplayError::corruption("decode entry", "CRC mismatch"));
        }

        let trace_type = TraceType::try_from(tag)?;
        let payload = Bytes::copy_from_slice(&data[ENTRY_PREFIX_SIZE..crc_start]);

        Ok((Self::new(ts, trace_type, payload), total))
    }

    /// Frame length implied by a fixed prefix, or `None` if the prefix is short
    pub fn frame_len(prefix: &[u8]) -> Option<usize> {
        if prefix.len() < ENTRY_PREFIX_SIZE {
            return None;
        }
        let mut len_bytes = &prefix[9..ENTRY_PREFIX_SIZE];
        Some(ENTRY_PREFIX_SIZE + len_bytes.get_u32_le() as usize + ENTRY_CRC_SIZE)
    }
}
