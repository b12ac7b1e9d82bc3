//! Criterion benchmarks for the inbound display transforms and outbound
//! payload preparation.
//!
//! Every received chunk (up to 2048 bytes) passes through
//! `format_received`, so its cost bounds how fast a pump can drain a busy
//! socket.
//!
//! Run with:
//! ```bash
//! cargo bench --package netassist-core --bench display_bench
//! ```

use chrono::NaiveDate;
use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use netassist_core::{format_received_at, prepare_payload, render_hex, ReceiveSettings, SendSettings};

const CHUNK_SIZES: [usize; 3] = [16, 512, 2048];

fn make_chunk(len: usize) -> Vec<u8> {
    (0..len).map(|i| (i % 256) as u8).collect()
}

fn bench_render_hex(c: &mut Criterion) {
    let mut group = c.benchmark_group("render_hex");
    for size in CHUNK_SIZES {
        let chunk = make_chunk(size);
        group.bench_with_input(BenchmarkId::from_parameter(size), &chunk, |b, chunk| {
            b.iter(|| render_hex(black_box(chunk)))
        });
    }
    group.finish();
}

fn bench_format_received(c: &mut Criterion) {
    let at = NaiveDate::from_ymd_opt(2024, 5, 1)
        .unwrap()
        .and_hms_opt(12, 0, 0)
        .unwrap();
    let settings = ReceiveSettings {
        hex_display: true,
        show_timestamp: true,
        ..Default::default()
    };

    let mut group = c.benchmark_group("format_received_hex_timestamp");
    for size in CHUNK_SIZES {
        let chunk = make_chunk(size);
        group.bench_with_input(BenchmarkId::from_parameter(size), &chunk, |b, chunk| {
            b.iter(|| format_received_at(black_box(chunk), &settings, at))
        });
    }
    group.finish();
}

fn bench_prepare_hex_payload(c: &mut Criterion) {
    let settings = SendSettings {
        send_hex: true,
        ..Default::default()
    };
    let text = render_hex(&make_chunk(2048));

    c.bench_function("prepare_payload_hex_2048", |b| {
        b.iter(|| prepare_payload(black_box(&text), &settings))
    });
}

criterion_group!(
    benches,
    bench_render_hex,
    bench_format_received,
    bench_prepare_hex_payload
);
criterion_main!(benches);
