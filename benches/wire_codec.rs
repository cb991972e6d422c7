//! Benchmarks for the fixed-layout wire codec.
//!
//! The codec sits on the hot path of every readiness dispatch; encode and
//! decode should stay well under a microsecond per record.

use criterion::{Criterion, Throughput, criterion_group, criterion_main};
use std::hint::black_box;

use basestation::TelemetryFrame;
use basestation::wire::TELEMETRY_FRAME_LEN;

fn sample_frame() -> TelemetryFrame {
    TelemetryFrame { device_id: 3, device_name: "device_3".to_string(), data: 87 }
}

fn bench_frame_encode(c: &mut Criterion) {
    let frame = sample_frame();

    let mut group = c.benchmark_group("frame_encode");
    group.throughput(Throughput::Bytes(TELEMETRY_FRAME_LEN as u64));
    group.bench_function("encode", |b| {
        b.iter(|| black_box(black_box(&frame).encode().unwrap()))
    });
    group.finish();
}

fn bench_frame_decode(c: &mut Criterion) {
    let encoded = sample_frame().encode().unwrap();

    let mut group = c.benchmark_group("frame_decode");
    group.throughput(Throughput::Bytes(TELEMETRY_FRAME_LEN as u64));
    group.bench_function("decode", |b| {
        b.iter(|| black_box(TelemetryFrame::decode(black_box(&encoded)).unwrap()))
    });
    group.finish();
}

criterion_group!(benches, bench_frame_encode, bench_frame_decode);
criterion_main!(benches);
