//! Benchmarks for the multipart transfer plan arithmetic.

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use rusoto_s3::CompletedPart;

use rust_uploader::cloud::multipart::{is_complete_set, missing_parts, num_parts};
use rust_uploader::constants::MULTIPART_CHUNK_SIZE;

fn completed(range: std::ops::RangeInclusive<u64>) -> Vec<CompletedPart> {
    range
        .map(|n| CompletedPart {
            e_tag: Some(format!("\"etag-{}\"", n)),
            part_number: Some(n as i64),
        })
        .collect()
}

/// Benchmark the part count for growing file sizes
fn bench_num_parts(c: &mut Criterion) {
    let mut group = c.benchmark_group("num_parts");

    for gb in [1u64, 10, 100] {
        let size = gb * 1024 * 1024 * 1024;
        group.bench_with_input(BenchmarkId::new("plan", format!("{}GB", gb)), &size, |b, &size| {
            b.iter(|| num_parts(black_box(size), MULTIPART_CHUNK_SIZE));
        });
    }

    group.finish();
}

/// Benchmark resume planning against half-finished sessions
fn bench_missing_parts(c: &mut Criterion) {
    let mut group = c.benchmark_group("missing_parts");

    for total in [100u64, 1000, 5000] {
        let existing = completed(1..=total / 2);

        group.throughput(Throughput::Elements(total));
        group.bench_with_input(
            BenchmarkId::new("resume", total),
            &existing,
            |b, existing| {
                b.iter(|| missing_parts(black_box(existing), total));
            },
        );
    }

    group.finish();
}

/// Benchmark the completion guard on full part sets
fn bench_is_complete_set(c: &mut Criterion) {
    let mut group = c.benchmark_group("is_complete_set");

    for total in [100u64, 1000, 5000] {
        let parts = completed(1..=total);

        group.throughput(Throughput::Elements(total));
        group.bench_with_input(BenchmarkId::new("verify", total), &parts, |b, parts| {
            b.iter(|| is_complete_set(black_box(parts), total));
        });
    }

    group.finish();
}

criterion_group!(benches, bench_num_parts, bench_missing_parts, bench_is_complete_set);
criterion_main!(benches);
