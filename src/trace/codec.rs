//! Version-aware payload encoding for trace records
//!
//! Payload layouts are frozen per trace file version so traces captured by
//! older writers stay readable.
//!
//! ## Version 1
//!
//! Fixed layouts, no multi-get:
//!
//! | Type | Payload |
//! |------|---------|
//! | write | raw write-batch representation |
//! | get | `cf_id: u32`, `key` |
//! | iterator seek (either direction) | `cf_id: u32`, `key` |
//!
//! ## Version 2
//!
//! A `u64` payload map followed by the fields whose bit is set, in bit order.
//! Length-prefixed slices are a `u32` length followed by the bytes.

use super::entry::{Trace, TraceType};
use super::record::{
    GetQueryRecord, IteratorSeekQueryRecord, MultiGetQueryRecord, SeekType, TraceRecord,
    WriteQueryRecord,
};
use crate::error::{ReplayError, Result};
use bytes::{Buf, BufMut, Bytes, BytesMut};

/// Column family id (`u32`)
pub const PAYLOAD_CF_ID: u64 = 1 << 0;
/// Point-lookup key (slice)
pub const PAYLOAD_GET_KEY: u64 = 1 << 1;
/// Write-batch representation (slice)
pub const PAYLOAD_WRITE_BATCH: u64 = 1 << 2;
/// Iterator seek target (slice)
pub const PAYLOAD_ITER_KEY: u64 = 1 << 3;
/// Iterator lower bound (slice)
pub const PAYLOAD_ITER_LOWER_BOUND: u64 = 1 << 4;
/// Iterator upper bound (slice)
pub const PAYLOAD_ITER_UPPER_BOUND: u64 = 1 << 5;
/// Multi-get key count (`u32`)
pub const PAYLOAD_MULTIGET_SIZE: u64 = 1 << 6;
/// Multi-get column family ids (`count` x `u32`)
pub const PAYLOAD_MULTIGET_CF_IDS: u64 = 1 << 7;
/// Multi-get keys (`count` x slice)
pub const PAYLOAD_MULTIGET_KEYS: u64 = 1 << 8;

const KNOWN_PAYLOAD_BITS: u64 = (1 << 9) - 1;

/// Decode a query entry into a record using the stream's version
pub fn decode_record(trace: &Trace, version: u32) -> Result<TraceRecord> {
    if !trace.trace_type.is_query() {
        return Err(ReplayError::corruption(
            "decode record",
            format!("{} entry in the middle of a trace", trace.trace_type),
        ));
    }
    match version {
        1 => decode_v1(trace),
        2 => decode_v2(trace),
        other => Err(ReplayError::NotSupported(format!(
            "trace file version {}",
            other
        ))),
    }
}

/// Encode a record into an unframed entry for the given version
pub fn encode_record(record: &TraceRecord, version: u32) -> Result<Trace> {
    let payload = match version {
        1 => encode_v1(record)?,
        2 => encode_v2(record)?,
        other => {
            return Err(ReplayError::NotSupported(format!(
                "trace file version {}",
                other
            )))
        }
    };
    Ok(Trace::new(record.timestamp(), record.trace_type(), payload))
}

fn decode_v1(trace: &Trace) -> Result<TraceRecord> {
    let ts = trace.ts;
    let mut payload = trace.payload.clone();
    let record = match trace.trace_type {
        TraceType::Write => {
            return Ok(TraceRecord::Write(WriteQueryRecord {
                timestamp: ts,
                rep: payload,
            }))
        }
        TraceType::Get => {
            let cf_id = get_u32(&mut payload, "get cf_id")?;
            let key = get_slice(&mut payload, "get key")?;
            TraceRecord::Get(GetQueryRecord {
                timestamp: ts,
                cf_id,
                key,
            })
        }
        TraceType::IteratorSeek | TraceType::IteratorSeekForPrev => {
            let cf_id = get_u32(&mut payload, "iterator cf_id")?;
            let key = get_slice(&mut payload, "iterator key")?;
            TraceRecord::IteratorSeek(IteratorSeekQueryRecord {
                timestamp: ts,
                cf_id,
                key,
                seek_type: seek_type_of(trace.trace_type),
                lower_bound: None,
                upper_bound: None,
            })
        }
        TraceType::MultiGet => {
            return Err(ReplayError::NotSupported(
                "multi_get records require trace file version 2".to_string(),
            ))
        }
        TraceType::Begin | TraceType::End => unreachable_query(trace.trace_type)?,
    };
    expect_consumed(&payload, trace.trace_type)?;
    Ok(record)
}

fn decode_v2(trace: &Trace) -> Result<TraceRecord> {
    let ts = trace.ts;
    let mut payload = trace.payload.clone();
    let map = get_u64(&mut payload, "payload map")?;
    if map & !KNOWN_PAYLOAD_BITS != 0 {
        return Err(ReplayError::corruption(
            "decode record",
            format!("unknown payload map bits {:#x}", map & !KNOWN_PAYLOAD_BITS),
        ));
    }

    let fields = PayloadFields::read(map, &mut payload)?;
    expect_consumed(&payload, trace.trace_type)?;

    let record = match trace.trace_type {
        TraceType::Write => TraceRecord::Write(WriteQueryRecord {
            timestamp: ts,
            rep: require(fields.write_batch, "write batch")?,
        }),
        TraceType::Get => TraceRecord::Get(GetQueryRecord {
            timestamp: ts,
            cf_id: require(fields.cf_id, "get cf_id")?,
            key: require(fields.get_key, "get key")?,
        }),
        TraceType::IteratorSeek | TraceType::IteratorSeekForPrev => {
            TraceRecord::IteratorSeek(IteratorSeekQueryRecord {
                timestamp: ts,
                cf_id: require(fields.cf_id, "iterator cf_id")?,
                key: require(fields.iter_key, "iterator key")?,
                seek_type: seek_type_of(trace.trace_type),
                lower_bound: fields.iter_lower_bound,
                upper_bound: fields.iter_upper_bound,
            })
        }
        TraceType::MultiGet => TraceRecord::MultiGet(MultiGetQueryRecord {
            timestamp: ts,
            cf_ids: require(fields.multiget_cf_ids, "multi_get cf_ids")?,
            keys: require(fields.multiget_keys, "multi_get keys")?,
        }),
        TraceType::Begin | TraceType::End => unreachable_query(trace.trace_type)?,
    };
    Ok(record)
}

/// Fields present in a version 2 payload
#[derive(Default)]
struct PayloadFields {
    cf_id: Option<u32>,
    get_key: Option<Bytes>,
    write_batch: Option<Bytes>,
    iter_key: Option<Bytes>,
    iter_lower_bound: Option<Bytes>,
    iter_upper_bound: Option<Bytes>,
    multiget_cf_ids: Option<Vec<u32>>,
    multiget_keys: Option<Vec<Bytes>>,
}

impl PayloadFields {
    fn read(map: u64, payload: &mut Bytes) -> Result<Self> {
        let mut fields = PayloadFields::default();
        if map & PAYLOAD_CF_ID != 0 {
            fields.cf_id = Some(get_u32(payload, "cf_id")?);
        }
        if map & PAYLOAD_GET_KEY != 0 {
            fields.get_key = Some(get_slice(payload, "get key")?);
        }
        if map & PAYLOAD_WRITE_BATCH != 0 {
            fields.write_batch = Some(get_slice(payload, "write batch")?);
        }
        if map & PAYLOAD_ITER_KEY != 0 {
            fields.iter_key = Some(get_slice(payload, "iterator key")?);
        }
        if map & PAYLOAD_ITER_LOWER_BOUND != 0 {
            fields.iter_lower_bound = Some(get_slice(payload, "iterator lower bound")?);
        }
        if map & PAYLOAD_ITER_UPPER_BOUND != 0 {
            fields.iter_upper_bound = Some(get_slice(payload, "iterator upper bound")?);
        }

        let mut multiget_size = None;
        if map & PAYLOAD_MULTIGET_SIZE != 0 {
            let size = get_u32(payload, "multi_get size")? as usize;
            // Each key needs at least its length prefix; reject absurd counts
            // before allocating.
            if size > payload.remaining() / 4 {
                return Err(ReplayError::corruption(
                    "decode record",
                    format!("multi_get size {} exceeds payload", size),
                ));
            }
            multiget_size = Some(size);
        }
        if map & PAYLOAD_MULTIGET_CF_IDS != 0 {
            let size = require(multiget_size, "multi_get size")?;
            let mut ids = Vec::with_capacity(size);
            for _ in 0..size {
                ids.push(get_u32(payload, "multi_get cf_id")?);
            }
            fields.multiget_cf_ids = Some(ids);
        }
        if map & PAYLOAD_MULTIGET_KEYS != 0 {
            let size = require(multiget_size, "multi_get size")?;
            let mut keys = Vec::with_capacity(size);
            for _ in 0..size {
                keys.push(get_slice(payload, "multi_get key")?);
            }
            fields.multiget_keys = Some(keys);
        }
        Ok(fields)
    }
}

fn encode_v1(record: &TraceRecord) -> Result<Bytes> {
    let mut buf = BytesMut::new();
    match record {
        TraceRecord::Write(r) => return Ok(r.rep.clone()),
        TraceRecord::Get(r) => {
            buf.put_u32_le(r.cf_id);
            put_slice(&mut buf, &r.key);
        }
        TraceRecord::IteratorSeek(r) => {
            if r.lower_bound.is_some() || r.upper_bound.is_some() {
                return Err(ReplayError::NotSupported(
                    "iterator bounds require trace file version 2".to_string(),
                ));
            }
            buf.put_u32_le(r.cf_id);
            put_slice(&mut buf, &r.key);
        }
        TraceRecord::MultiGet(_) => {
            return Err(ReplayError::NotSupported(
                "multi_get records require trace file version 2".to_string(),
            ))
        }
    }
    Ok(buf.freeze())
}

fn encode_v2(record: &TraceRecord) -> Result<Bytes> {
    let mut buf = BytesMut::new();
    match record {
        TraceRecord::Write(r) => {
            buf.put_u64_le(PAYLOAD_WRITE_BATCH);
            put_slice(&mut buf, &r.rep);
        }
        TraceRecord::Get(r) => {
            buf.put_u64_le(PAYLOAD_CF_ID | PAYLOAD_GET_KEY);
            buf.put_u32_le(r.cf_id);
            put_slice(&mut buf, &r.key);
        }
        TraceRecord::IteratorSeek(r) => {
            let mut map = PAYLOAD_CF_ID | PAYLOAD_ITER_KEY;
            if r.lower_bound.is_some() {
                map |= PAYLOAD_ITER_LOWER_BOUND;
            }
            if r.upper_bound.is_some() {
                map |= PAYLOAD_ITER_UPPER_BOUND;
            }
            buf.put_u64_le(map);
            buf.put_u32_le(r.cf_id);
            put_slice(&mut buf, &r.key);
            if let Some(lower) = &r.lower_bound {
                put_slice(&mut buf, lower);
            }
            if let Some(upper) = &r.upper_bound {
                put_slice(&mut buf, upper);
            }
        }
        TraceRecord::MultiGet(r) => {
            // One count covers both lists
            if r.cf_ids.len() != r.keys.len() {
                return Err(ReplayError::InvalidArgument(format!(
                    "multi_get has {} column families for {} keys",
                    r.cf_ids.len(),
                    r.keys.len()
                )));
            }
            buf.put_u64_le(PAYLOAD_MULTIGET_SIZE | PAYLOAD_MULTIGET_CF_IDS | PAYLOAD_MULTIGET_KEYS);
            buf.put_u32_le(r.keys.len() as u32);
            for cf_id in &r.cf_ids {
                buf.put_u32_le(*cf_id);
            }
            for key in &r.keys {
                put_slice(&mut buf, key);
            }
        }
    }
    Ok(buf.freeze())
}

fn seek_type_of(trace_type: TraceType) -> SeekType {
    if trace_type == TraceType::IteratorSeekForPrev {
        SeekType::SeekForPrev
    } else {
        SeekType::Seek
    }
}

fn unreachable_query(trace_type: TraceType) -> Result<TraceRecord> {
    Err(ReplayError::corruption(
        "decode record",
        format!("{} is not a query entry", trace_type),
    ))
}

fn require<T>(field: Option<T>, what: &str) -> Result<T> {
    field.ok_or_else(|| ReplayError::corruption("decode record", format!("missing {}", what)))
}

fn expect_consumed(payload: &Bytes, trace_type: TraceType) -> Result<()> {
    if payload.has_remaining() {
        return Err(ReplayError::corruption(
            "decode record",
            format!("{} trailing bytes after {} payload", payload.remaining(), trace_type),
        ));
    }
    Ok(())
}

fn get_u32(payload: &mut Bytes, what: &str) -> Result<u32> {
    if payload.remaining() < 4 {
        return Err(ReplayError::corruption(
            "decode record",
            format!("{} truncated", what),
        ));
    }
    Ok(payload.get_u32_le())
}

fn get_u64(payload: &mut Bytes, what: &str) -> Result<u64> {
    if payload.remaining() < 8 {
        return Err(ReplayError::corruption(
            "decode record",
            format!("{} truncated", what),
        ));
    }
    Ok(payload.get_u64_le())
}

fn get_slice(payload: &mut Bytes, what: &str) -> Result<Bytes> {
    let len = get_u32(payload, what)? as usize;
    if payload.remaining() < len {
        return Err(ReplayError::corruption(
            "decode record",
            format!("{} truncated", what),
        ));
    }
    Ok(payload.split_to(len))
}

fn put_slice(buf: &mut BytesMut, data: &[u8]) {
    buf.put_u32_le(data.len() as u32);
    buf.put_slice(data);
}
