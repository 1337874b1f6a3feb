//! Benchmarks for in-core against memory-mapped retrieval.

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use lshdb::{LoadMode, LshIndex, LshParams, SerialFormat};
use rand::prelude::*;

fn random_vectors(n: usize, dim: usize, seed: u64) -> Vec<Vec<f32>> {
    let mut rng = StdRng::seed_from_u64(seed);
    (0..n)
        .map(|_| (0..dim).map(|_| rng.random::<f32>() * 8.0 - 4.0).collect())
        .collect()
}

fn build(n: usize) -> LshIndex {
    let mut index = LshIndex::new(LshParams::new(2.0, 8, 5, 16).with_rows(4096, 32).with_seed(11)).unwrap();
    index.insert_point_set(random_vectors(n, 16, 1), 0).unwrap();
    index
}

fn bench_retrieve(c: &mut Criterion) {
    let dir = tempfile::tempdir().unwrap();
    let index = build(5000);
    let path = dir.path().join("bench.lsh");
    index.serialize(&path, SerialFormat::Format1).unwrap();
    let on_disk = LshIndex::open(&path, LoadMode::FunctionsOnly).unwrap();

    let mut group = c.benchmark_group("retrieve");
    for n in [1, 16, 128].iter() {
        group.throughput(Throughput::Elements(*n as u64));
        let queries = random_vectors(*n, 16, 2);

        group.bench_with_input(BenchmarkId::new("in_core", n), n, |bench, _| {
            bench.iter(|| {
                let mut hits = 0usize;
                index.retrieve_point_set(black_box(&queries), |_| hits += 1).unwrap();
                hits
            });
        });

        group.bench_with_input(BenchmarkId::new("mmap", n), n, |bench, _| {
            bench.iter(|| {
                let mut hits = 0usize;
                on_disk
                    .serial_retrieve_point_set(&path, black_box(&queries), |_| hits += 1)
                    .unwrap();
                hits
            });
        });
    }
    group.finish();
}

fn bench_load(c: &mut Criterion) {
    let dir = tempfile::tempdir().unwrap();
    let index = build(5000);
    let mut group = c.benchmark_group("load");
    for format in [SerialFormat::Format1, SerialFormat::Format2] {
        let path = dir.path().join(format!("load-{format}.lsh"));
        index.serialize(&path, format).unwrap();
        group.bench_function(format.to_string(), |bench| {
            bench.iter(|| LshIndex::open(&path, LoadMode::InCore).unwrap());
        });
    }
    group.finish();
}

criterion_group!(benches, bench_retrieve, bench_load);
criterion_main!(benches);
