//! Benchmarks for package discovery over synthetic disk trees.

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use std::fs;
use tempfile::TempDir;
use tokio::runtime::Runtime;

use rust_uploader::cli::SourceKind;
use rust_uploader::config::TaskInfo;
use rust_uploader::discovery::{create_source, PackageRegistry};
use rust_uploader::ledger::TransferLedger;
use rust_uploader::platform::PlatformClient;
use rust_uploader::utils::fsutil::folder_size;

/// Lay out `clips` clip folders of two small files each.
fn seed_clip_tree(clips: usize) -> TempDir {
    let input = TempDir::new().unwrap();
    for i in 0..clips {
        let clip = input.path().join(format!("day1/clip_{:05}", i));
        fs::create_dir_all(&clip).unwrap();
        fs::write(clip.join("frames.bin"), vec![1u8; 256]).unwrap();
        fs::write(clip.join("meta.json"), b"{}").unwrap();
    }
    input
}

/// Benchmark clip discovery across growing trees
fn bench_clip_discovery(c: &mut Criterion) {
    let mut group = c.benchmark_group("clip_discovery");
    let runtime = Runtime::new().unwrap();
    let client = PlatformClient::new().unwrap();

    for clips in [10usize, 50, 200] {
        let input = seed_clip_tree(clips);
        let output = TempDir::new().unwrap();
        let ledger_dir = TempDir::new().unwrap();
        let info = TaskInfo {
            input_root: input.path().to_path_buf(),
            output_root: output.path().to_path_buf(),
            ..Default::default()
        };

        group.throughput(Throughput::Elements(clips as u64));
        group.bench_with_input(BenchmarkId::new("discover", clips), &info, |b, info| {
            b.iter(|| {
                let ledger = TransferLedger::new(ledger_dir.path(), "clip").unwrap();
                let mut registry = PackageRegistry::new(ledger, false);
                let mut source = create_source(
                    SourceKind::Clip,
                    black_box(info),
                    client.clone(),
                    "SN001",
                );
                runtime.block_on(source.discover(&mut registry)).unwrap();
                registry.groups.len()
            });
        });
    }

    group.finish();
}

/// Benchmark the recursive size scan packages are weighed with
fn bench_folder_size(c: &mut Criterion) {
    let mut group = c.benchmark_group("folder_size");

    for files in [10usize, 100, 1000] {
        let dir = TempDir::new().unwrap();
        for i in 0..files {
            fs::write(dir.path().join(format!("f_{:04}.bin", i)), vec![0u8; 512]).unwrap();
        }

        group.throughput(Throughput::Elements(files as u64));
        group.bench_with_input(
            BenchmarkId::new("scan", files),
            dir.path(),
            |b, path| {
                b.iter(|| folder_size(black_box(path)));
            },
        );
    }

    group.finish();
}

criterion_group!(benches, bench_clip_discovery, bench_folder_size);
criterion_main!(benches);
