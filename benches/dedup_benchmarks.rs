use std::fs;
use std::path::Path;
use std::time::Duration;

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};

use clap::Parser;
use dedup_cache::DigestCache;
use dedup_core::Args;
use dedup_resolver::analyze;
use dedup_tree::{build_forest, fold_directory_digest};

fn parse_args(path: &str) -> Args {
    Args::parse_from(["dedup", path])
}

/// Builds a tree of `width` sibling directories, each holding `files_per_dir`
/// files, where every even-indexed directory duplicates its neighbor. This
/// exercises both the Scanner's per-file hashing and the Resolver's
/// fixed-point loop under a predictable duplicate ratio.
fn create_test_tree(root: &Path, width: usize, files_per_dir: usize) -> std::io::Result<()> {
    for i in 0..width {
        let dir = root.join(format!("dir_{i:04}"));
        fs::create_dir_all(&dir)?;
        let content_group = i / 2;
        for f in 0..files_per_dir {
            let content = format!("content group {content_group} file {f}").repeat(64);
            fs::write(dir.join(format!("file_{f:03}.bin")), content.as_bytes())?;
        }
    }
    Ok(())
}

/// Benchmarks the full scan-then-resolve pipeline (the two most expensive
/// stages per the relative-share breakdown in the spec) across a range of
/// tree sizes.
fn bench_scan_and_resolve(c: &mut Criterion) {
    let temp_dir = std::env::temp_dir().join("dedup_bench_scan_resolve");
    let _ = fs::remove_dir_all(&temp_dir);
    fs::create_dir_all(&temp_dir).unwrap();

    let mut group = c.benchmark_group("scan_and_resolve");
    group.sample_size(10);
    group.measurement_time(Duration::from_secs(20));

    for &(width, files_per_dir) in &[(20, 5), (50, 10), (100, 10)] {
        let test_root = temp_dir.join(format!("tree_w{width}_f{files_per_dir}"));
        let _ = fs::remove_dir_all(&test_root);
        fs::create_dir_all(&test_root).unwrap();
        create_test_tree(&test_root, width, files_per_dir).unwrap();

        let label = format!("{} dirs x {} files", width, files_per_dir);
        let path_str = test_root.to_str().unwrap().to_string();

        group.bench_with_input(BenchmarkId::from_parameter(label), &path_str, |b, path_str| {
            b.iter(|| {
                let args = parse_args(path_str);
                let mut cache = DigestCache::default();
                let (mut forest, mut diagnostics) = build_forest(&args, &mut cache).unwrap();
                analyze(&mut forest, &args, &mut diagnostics).unwrap();
                black_box(forest.count_deleted())
            })
        });
    }

    group.finish();
    let _ = fs::remove_dir_all(&temp_dir);
}

/// Benchmarks the Merkle fold in isolation across varying child counts,
/// since every directory in a scan pays this cost once at finalize time.
fn bench_directory_fold(c: &mut Criterion) {
    let mut group = c.benchmark_group("directory_digest_fold");

    for size in [10, 100, 1_000, 10_000].iter() {
        let digests: Vec<String> = (0..*size).map(|i| format!("{:040x}", i)).collect();

        group.bench_with_input(BenchmarkId::from_parameter(format!("{size} children")), size, |b, _| {
            b.iter(|| black_box(fold_directory_digest(digests.iter().map(|s| s.as_str()))))
        });
    }

    group.finish();
}

criterion_group!(benches, bench_scan_and_resolve, bench_directory_fold);
criterion_main!(benches);
