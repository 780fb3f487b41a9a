//! Digest throughput of the hash store

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use mapsync_sync::{digest_reader, HashStore};
use mapsync_types::{ContentMode, HashAlgorithm};
use std::fs;
use tempfile::TempDir;

fn generate_test_data(size: usize) -> Vec<u8> {
    (0..size)
        .map(|i| if i % 64 == 63 { b'\n' } else { b'a' + (i % 26) as u8 })
        .collect()
}

fn bench_algorithms(c: &mut Criterion) {
    let data = generate_test_data(1024 * 1024);
    let mut group = c.benchmark_group("digest_algorithms");
    group.throughput(Throughput::Bytes(data.len() as u64));

    for algorithm in [HashAlgorithm::Md5, HashAlgorithm::Sha256, HashAlgorithm::Blake3] {
        for mode in [ContentMode::Binary, ContentMode::Text] {
            group.bench_with_input(
                BenchmarkId::new(algorithm.to_string(), format!("{:?}", mode)),
                &data,
                |b, data| {
                    b.iter(|| {
                        black_box(digest_reader(&data[..], algorithm, mode, 10 * 1024).unwrap())
                    });
                },
            );
        }
    }
    group.finish();
}

fn bench_memo(c: &mut Criterion) {
    let rt = tokio::runtime::Runtime::new().unwrap();
    let temp_dir = TempDir::new().unwrap();
    let path = temp_dir.path().join("mapA.bsp");
    fs::write(&path, generate_test_data(256 * 1024)).unwrap();

    let mut group = c.benchmark_group("hash_store");
    group.bench_function("cold", |b| {
        b.to_async(&rt).iter(|| async {
            let store = HashStore::new(HashAlgorithm::Md5, 10 * 1024);
            black_box(store.digest(&path, ContentMode::Binary).await.unwrap())
        });
    });

    let store = HashStore::new(HashAlgorithm::Md5, 10 * 1024);
    rt.block_on(store.digest(&path, ContentMode::Binary)).unwrap();
    group.bench_function("memoized", |b| {
        b.to_async(&rt)
            .iter(|| async { black_box(store.digest(&path, ContentMode::Binary).await.unwrap()) });
    });
    group.finish();
}

criterion_group!(benches, bench_algorithms, bench_memo);
criterion_main!(benches);
