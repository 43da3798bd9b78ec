//! Range tracking and part planning benchmarks

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use ossfs_core::*;

const MB: u64 = 1024 * 1024;

/// Scattered 4KB writes with a fixed stride, like a database page flush
fn scattered_tracker(writes: u64) -> UntreatedTracker {
    let mut tracker = UntreatedTracker::new();
    for i in 0..writes {
        let offset = (i * 7919 * 4096) % (4096 * MB);
        tracker.add(offset as i64, 4096, i).unwrap();
    }
    tracker
}

fn benchmark_tracker_add(c: &mut Criterion) {
    let mut group = c.benchmark_group("tracker_add");

    for writes in &[100u64, 1_000, 10_000] {
        group.bench_with_input(BenchmarkId::from_parameter(writes), writes, |b, &writes| {
            b.iter(|| black_box(scattered_tracker(writes)));
        });
    }
    group.finish();
}

fn benchmark_sequential_appends(c: &mut Criterion) {
    c.bench_function("tracker_sequential_appends", |b| {
        b.iter(|| {
            let mut tracker = UntreatedTracker::new();
            for i in 0..10_000i64 {
                tracker.add(i * 4096, 4096, i as u64).unwrap();
            }
            black_box(tracker.len())
        });
    });
}

fn benchmark_plan(c: &mut Criterion) {
    let limits = PartLimits {
        min_part_size: 5 * MB,
        max_part_size: 10 * MB,
        max_parts: 10_000,
        allow_copy: true,
    };

    let mut group = c.benchmark_group("plan");
    for writes in &[10u64, 100, 1_000] {
        let tracker = scattered_tracker(*writes);
        group.bench_with_input(BenchmarkId::from_parameter(writes), writes, |b, _| {
            b.iter(|| plan(black_box(4096 * MB), tracker.list(), &limits).unwrap());
        });
    }
    group.finish();
}

criterion_group!(
    benches,
    benchmark_tracker_add,
    benchmark_sequential_appends,
    benchmark_plan
);
criterion_main!(benches);
