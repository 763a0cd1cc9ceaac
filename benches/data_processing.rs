//! Benchmarks for the notification hot path
//!
//! Run with: cargo bench

use biostream::backend::transfer;
use biostream::decoder;
use biostream::store::{WindowBuffer, WindowStore};
use biostream::types::{Reading, SignalKind, WINDOW_CAPACITY};
use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};

fn bench_decode(c: &mut Criterion) {
    let mut group = c.benchmark_group("decode");

    for len in [0usize, 2, 4, 8, 12] {
        let payload: Vec<u8> = (0..len as u8).collect();
        group.bench_with_input(BenchmarkId::new("payload_bytes", len), &payload, |b, payload| {
            b.iter(|| black_box(decoder::decode(SignalKind::HeartSound, black_box(payload), 1.5)));
        });
    }

    group.finish();
}

fn bench_window_push(c: &mut Criterion) {
    let mut group = c.benchmark_group("window_push");
    group.throughput(Throughput::Elements(1));

    group.bench_function("filling", |b| {
        b.iter_batched(
            || WindowBuffer::new(WINDOW_CAPACITY),
            |mut buffer| {
                for i in 0..WINDOW_CAPACITY {
                    buffer.push(i as f64, i as f64);
                }
                buffer
            },
            criterion::BatchSize::SmallInput,
        );
    });

    let mut store = WindowStore::default();
    for i in 0..WINDOW_CAPACITY {
        store.push(SignalKind::HeartSound, i as f64, i as f64);
    }
    group.bench_function("at_capacity", |b| {
        let mut i = WINDOW_CAPACITY as u64;
        b.iter(|| {
            let reading = Reading::new(SignalKind::HeartSound, i % 4096, i as f64 * 0.01);
            store.push_reading(black_box(&reading));
            i = i.wrapping_add(1);
        });
    });

    group.finish();
}

fn bench_snapshot(c: &mut Criterion) {
    let mut group = c.benchmark_group("snapshot");

    for capacity in [WINDOW_CAPACITY, 2_000, 20_000] {
        let mut buffer = WindowBuffer::new(capacity);
        for i in 0..capacity {
            buffer.push(i as f64, (i as f64).sin());
        }

        group.throughput(Throughput::Elements(capacity as u64));
        group.bench_with_input(BenchmarkId::new("samples", capacity), &buffer, |b, buffer| {
            b.iter(|| black_box(buffer.snapshot()));
        });
        group.bench_with_input(BenchmarkId::new("plot_points", capacity), &buffer, |b, buffer| {
            b.iter(|| black_box(buffer.as_plot_points()));
        });
    }

    group.finish();
}

fn bench_notification_to_window(c: &mut Criterion) {
    let mut group = c.benchmark_group("notification_to_window");
    group.throughput(Throughput::Elements(1));

    let (sender, mut receiver) = transfer::channel();
    let mut store = WindowStore::default();
    group.bench_function("decode_send_recv_push", |b| {
        let mut raw = 0u16;
        b.iter(|| {
            let reading = decoder::decode(SignalKind::BloodPressure, &raw.to_le_bytes(), 0.5);
            let _ = sender.send(reading);
            if let Some(reading) = receiver.try_recv() {
                store.push_reading(&reading);
            }
            raw = (raw + 1) % 4096;
        });
    });

    group.finish();
}

criterion_group!(
    benches,
    bench_decode,
    bench_window_push,
    bench_snapshot,
    bench_notification_to_window,
);

criterion_main!(benches);
