//! Serialized write batches
//!
//! A write batch is an ordered list of mutations applied atomically. Traces
//! capture it in its serialized representation:
//!
//! ```text
//! sequence: u64 | count: u32 | op * count
//!
//! op := tag: u8 [cf_id: u32] key [value | end_key]
//! ```
//!
//! Tags without a column family id target the default column family (id 0).
//! Slices are a `u32` length followed by the bytes, all little-endian.

use crate::error::{ReplayError, Result};
use crate::store::DEFAULT_COLUMN_FAMILY_ID;
use bytes::{Buf, BufMut, Bytes, BytesMut};

/// Size of the representation header (sequence + count)
pub const WRITE_BATCH_HEADER_SIZE: usize = 12;

const TAG_DELETION: u8 = 0x0;
const TAG_VALUE: u8 = 0x1;
const TAG_CF_DELETION: u8 = 0x4;
const TAG_CF_VALUE: u8 = 0x5;
const TAG_CF_RANGE_DELETION: u8 = 0xE;
const TAG_RANGE_DELETION: u8 = 0xF;

/// One mutation inside a batch
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BatchOp {
    Put {
        cf_id: u32,
        key: Bytes,
        value: Bytes,
    },
    Delete {
        cf_id: u32,
        key: Bytes,
    },
    /// Removes keys in `[begin, end)`
    DeleteRange {
        cf_id: u32,
        begin: Bytes,
        end: Bytes,
    },
}

impl BatchOp {
    pub fn cf_id(&self) -> u32 {
        match self {
            BatchOp::Put { cf_id, .. }
            | BatchOp::Delete { cf_id, .. }
            | BatchOp::DeleteRange { cf_id, .. } => *cf_id,
        }
    }
}

/// An atomic group of mutations
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WriteBatch {
    sequence: u64,
    ops: Vec<BatchOp>,
}

impl WriteBatch {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse a serialized representation
    pub fn from_rep(rep: Bytes) -> Result<Self> {
        let mut buf = rep;
        if buf.remaining() < WRITE_BATCH_HEADER_SIZE {
            return Err(ReplayError::corruption(
                "write batch",
                "representation smaller than header",
            ));
        }
        let sequence = buf.get_u64_le();
        let count = buf.get_u32_le() as usize;

        let mut ops = Vec::with_capacity(count.min(buf.remaining()));
        while buf.has_remaining() {
            let tag = buf.get_u8();
            let op = match tag {
                TAG_VALUE | TAG_CF_VALUE => {
                    let cf_id = read_cf(&mut buf, tag == TAG_CF_VALUE)?;
                    let key = read_slice(&mut buf, "put key")?;
                    let value = read_slice(&mut buf, "put value")?;
                    BatchOp::Put { cf_id, key, value }
                }
                TAG_DELETION | TAG_CF_DELETION => {
                    let cf_id = read_cf(&mut buf, tag == TAG_CF_DELETION)?;
                    let key = read_slice(&mut buf, "delete key")?;
                    BatchOp::Delete { cf_id, key }
                }
                TAG_RANGE_DELETION | TAG_CF_RANGE_DELETION => {
                    let cf_id = read_cf(&mut buf, tag == TAG_CF_RANGE_DELETION)?;
                    let begin = read_slice(&mut buf, "range begin")?;
                    let end = read_slice(&mut buf, "range end")?;
                    BatchOp::DeleteRange { cf_id, begin, end }
                }
                other => {
                    return Err(ReplayError::corruption(
                        "write batch",
                        format!("unknown op tag {:#x}", other),
                    ))
                }
            };
            ops.push(op);
        }

        if ops.len() != count {
            return Err(ReplayError::corruption(
                "write batch",
                format!("header count {} but found {} ops", count, ops.len()),
            ));
        }

        Ok(Self { sequence, ops })
    }

    /// Serialize into the representation traces carry
    pub fn rep(&self) -> Bytes {
        let mut buf = BytesMut::with_capacity(WRITE_BATCH_HEADER_SIZE + self.ops.len() * 16);
        buf.put_u64_le(self.sequence);
        buf.put_u32_le(self.ops.len() as u32);
        for op in &self.ops {
            match op {
                BatchOp::Put { cf_id, key, value } => {
                    put_tag(&mut buf, *cf_id, TAG_VALUE, TAG_CF_VALUE);
                    put_slice(&mut buf, key);
                    put_slice(&mut buf, value);
                }
                BatchOp::Delete { cf_id, key } => {
                    put_tag(&mut buf, *cf_id, TAG_DELETION, TAG_CF_DELETION);
                    put_slice(&mut buf, key);
                }
                BatchOp::DeleteRange { cf_id, begin, end } => {
                    put_tag(&mut buf, *cf_id, TAG_RANGE_DELETION, TAG_CF_RANGE_DELETION);
                    put_slice(&mut buf, begin);
                    put_slice(&mut buf, end);
                }
            }
        }
        buf.freeze()
    }

    pub fn put(&mut self, cf_id: u32, key: impl Into<Bytes>, value: impl Into<Bytes>) -> &mut Self {
        self.ops.push(BatchOp::Put {
            cf_id,
            key: key.into(),
            value: value.into(),
        });
        self
    }

    pub fn delete(&mut self, cf_id: u32, key: impl Into<Bytes>) -> &mut Self {
        self.ops.push(BatchOp::Delete {
            cf_id,
            key: key.into(),
        });
        self
    }

    pub fn delete_range(
        &mut self,
        cf_id: u32,
        begin: impl Into<Bytes>,
        end: impl Into<Bytes>,
    ) -> &mut Self {
        self.ops.push(BatchOp::DeleteRange {
            cf_id,
            begin: begin.into(),
            end: end.into(),
        });
        self
    }

    pub fn set_sequence(&mut self, sequence: u64) -> &mut Self {
        self.sequence = sequence;
        self
    }

    pub fn sequence(&self) -> u64 {
        self.sequence
    }

    pub fn ops(&self) -> &[BatchOp] {
        &self.ops
    }

    pub fn count(&self) -> usize {
        self.ops.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ops.is_empty()
    }
}

fn read_cf(buf: &mut Bytes, explicit: bool) -> Result<u32> {
    if !explicit {
        return Ok(DEFAULT_COLUMN_FAMILY_ID);
    }
    if buf.remaining() < 4 {
        return Err(ReplayError::corruption(
            "write batch",
            "column family id truncated",
        ));
    }
    Ok(buf.get_u32_le())
}

fn read_slice(buf: &mut Bytes, what: &str) -> Result<Bytes> {
    if buf.remaining() < 4 {
        return Err(ReplayError::corruption(
            "write batch",
            format!("{} length truncated", what),
        ));
    }
    let len = buf.get_u32_le() as usize;
    if buf.remaining() < len {
        return Err(ReplayError::corruption(
            "write batch",
            format!("{} truncated", what),
        ));
    }
    Ok(buf.split_to(len))
}

fn put_tag(buf: &mut BytesMut, cf_id: u32, default_tag: u8, cf_tag: u8) {
    if cf_id == DEFAULT_COLUMN_FAMILY_ID {
        buf.put_u8(default_tag);
    } else {
        buf.put_u8(cf_tag);
        buf.put_u32_le(cf_id);
    }
}

fn put_slice(buf: &mut BytesMut, data: &[u8]) {
    buf.put_u32_le(data.len() as u32);
    buf.put_slice(data);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rep_roundtrip_mixed_ops() {
        let mut batch = WriteBatch::new();
        batch
            .set_sequence(77)
            .put(0, "a", "1")
            .put(2, "b", "2")
            .delete(0, "c")
            .delete(3, "d")
            .delete_range(2, "e", "g");

        let parsed = WriteBatch::from_rep(batch.rep()).unwrap();
        assert_eq!(parsed, batch);
        assert_eq!(parsed.sequence(), 77);
        assert_eq!(parsed.count(), 5);
        assert_eq!(parsed.ops()[1].cf_id(), 2);
    }

    #[test]
    fn test_default_cf_ops_omit_cf_id() {
        let mut batch = WriteBatch::new();
        batch.put(0, "k", "v");
        let rep = batch.rep();
        // header + tag + (4 + 1) + (4 + 1)
        assert_eq!(rep.len(), WRITE_BATCH_HEADER_SIZE + 1 + 5 + 5);
        assert_eq!(rep[WRITE_BATCH_HEADER_SIZE], TAG_VALUE);
    }

    #[test]
    fn test_empty_batch() {
        let batch = WriteBatch::from_rep(WriteBatch::new().rep()).unwrap();
        assert!(batch.is_empty());
    }

    #[test]
    fn test_short_header_is_corruption() {
        let err = WriteBatch::from_rep(Bytes::from_static(b"\x00\x01")).unwrap_err();
        assert!(err.is_corruption());
    }

    #[test]
    fn test_count_mismatch_is_corruption() {
        let mut batch = WriteBatch::new();
        batch.put(0, "k", "v");
        let mut rep = BytesMut::from(&batch.rep()[..]);
        rep[8] = 2;
        assert!(WriteBatch::from_rep(rep.freeze()).unwrap_err().is_corruption());
    }

    #[test]
    fn test_unknown_tag_is_corruption() {
        let mut rep = BytesMut::new();
        rep.put_u64_le(0);
        rep.put_u32_le(1);
        rep.put_u8(0x9);
        assert!(WriteBatch::from_rep(rep.freeze()).unwrap_err().is_corruption());
    }

    #[test]
    fn test_truncated_value_is_corruption() {
        let mut batch = WriteBatch::new();
        batch.put(5, "key", "value");
        let rep = batch.rep();
        let err = WriteBatch::from_rep(rep.slice(..rep.len() - 2)).unwrap_err();
        assert!(err.is_corruption());
    }
}
