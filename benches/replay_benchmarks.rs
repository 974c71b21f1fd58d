//! Trace decode and replay benchmarks for kvreplay
//!
//! Run with: cargo bench
//!
//! These benchmarks measure entry decoding, record decoding per format
//! version, and unpaced replay throughput in serial and pooled mode.

use bytes::Bytes;
use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use kvreplay::trace::{
    decode_record, encode_record, GetQueryRecord, MultiGetQueryRecord, Trace, TraceRecord,
    WriteQueryRecord,
};
use kvreplay::{
    MemoryStore, MemoryTraceWriter, ReplayOptions, Replayer, TraceEncoder, WriteBatch,
};

fn get_record(i: u64) -> TraceRecord {
    GetQueryRecord {
        timestamp: i,
        cf_id: 0,
        key: Bytes::from(format!("user:{:08}", i)),
    }
    .into()
}

fn write_record(i: u64, ops: usize) -> TraceRecord {
    let mut batch = WriteBatch::new();
    for op in 0..ops {
        batch.put(0, format!("user:{:08}:{}", i, op), vec![b'x'; 100]);
    }
    WriteQueryRecord {
        timestamp: i,
        rep: batch.rep(),
    }
    .into()
}

/// Benchmark entry framing checks (length + CRC) by payload size
fn bench_entry_decode(c: &mut Criterion) {
    let mut group = c.benchmark_group("entry_decode");

    for ops in [1, 10, 100].iter() {
        let framed = encode_record(&write_record(0, *ops), 2).unwrap().encode();
        group.throughput(Throughput::Bytes(framed.len() as u64));
        group.bench_with_input(BenchmarkId::from_parameter(ops), &framed, |b, framed| {
            b.iter(|| Trace::decode(black_box(framed)).unwrap())
        });
    }

    group.finish();
}

/// Benchmark payload decoding per format version
fn bench_record_decode(c: &mut Criterion) {
    let mut group = c.benchmark_group("record_decode");

    for version in [1u32, 2].iter() {
        let trace = encode_record(&get_record(7), *version).unwrap();
        group.bench_with_input(BenchmarkId::new("get", version), &trace, |b, trace| {
            b.iter(|| decode_record(black_box(trace), *version).unwrap())
        });
    }

    let multi_get: TraceRecord = MultiGetQueryRecord {
        timestamp: 0,
        cf_ids: vec![0; 32],
        keys: (0..32).map(|i| Bytes::from(format!("user:{:08}", i))).collect(),
    }
    .into();
    let trace = encode_record(&multi_get, 2).unwrap();
    group.bench_function("multi_get_32", |b| {
        b.iter(|| decode_record(black_box(&trace), 2).unwrap())
    });

    group.finish();
}

/// Benchmark unpaced replay throughput (all timestamps equal)
fn bench_replay(c: &mut Criterion) {
    const RECORDS: u64 = 1_000;

    let mut encoder = TraceEncoder::new(MemoryTraceWriter::new(), 2, 0).unwrap();
    for i in 0..RECORDS {
        let record = if i % 4 == 0 {
            write_record(0, 4)
        } else {
            let mut record = get_record(i);
            if let TraceRecord::Get(get) = &mut record {
                get.timestamp = 0;
            }
            record
        };
        encoder.write_record(&record).unwrap();
    }
    let entries = encoder.finish().unwrap().entries().to_vec();

    let mut group = c.benchmark_group("replay");
    group.throughput(Throughput::Elements(RECORDS));

    for threads in [0usize, 1, 4].iter() {
        group.bench_with_input(BenchmarkId::new("threads", threads), threads, |b, &threads| {
            let store = MemoryStore::new();
            let options = ReplayOptions::default().with_threads(threads);
            b.iter(|| {
                let reader = kvreplay::MemoryTraceReader::new(entries.iter().cloned());
                let replayer =
                    Replayer::new(&store, &[store.default_handle()], Box::new(reader)).unwrap();
                replayer.prepare().unwrap();
                replayer.replay(&options, |_| {}).unwrap()
            })
        });
    }

    group.finish();
}

criterion_group!(benches, bench_entry_decode, bench_record_decode, bench_replay);
criterion_main!(benches);
