//! Criterion benchmarks for the dealcache store: insert, peek, pattern invalidation, fresh observe.

use std::time::Duration;

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use dealcache_store::{from_fn, CancelToken, KeyedAsyncCache, ObserveOptions};

const TTL: Duration = Duration::from_secs(300);

fn filled(n: usize) -> KeyedAsyncCache {
    let cache = KeyedAsyncCache::new();
    for i in 0..n {
        cache.insert(format!("proj-{}:deals", i), vec![i as u64; 8], TTL);
    }
    cache
}

fn bench_insert(c: &mut Criterion) {
    let cache = KeyedAsyncCache::new();
    let mut g = c.benchmark_group("insert");
    g.throughput(Throughput::Elements(1));
    g.bench_function("insert_overwrite", |b| {
        b.iter(|| cache.insert(black_box("projects"), vec![1u64, 2, 3], TTL));
    });
    g.finish();
}

fn bench_peek(c: &mut Criterion) {
    let cache = filled(1_000);
    let mut g = c.benchmark_group("peek");
    g.throughput(Throughput::Elements(1));
    g.bench_function("peek_hit", |b| {
        b.iter(|| black_box(cache.peek::<Vec<u64>>(black_box("proj-500:deals"))));
    });
    g.bench_function("peek_wrong_type", |b| {
        b.iter(|| black_box(cache.peek::<String>(black_box("proj-500:deals"))));
    });
    g.finish();
}

fn bench_invalidate_by_pattern(c: &mut Criterion) {
    let mut g = c.benchmark_group("invalidate_by_pattern");
    for size in [100usize, 1_000, 10_000] {
        g.throughput(Throughput::Elements(size as u64));
        g.bench_with_input(BenchmarkId::from_parameter(size), &size, |b, &size| {
            b.iter_batched(
                || filled(size),
                |cache| black_box(cache.invalidate_by_pattern("proj-1")),
                criterion::BatchSize::SmallInput,
            );
        });
    }
    g.finish();
}

fn bench_observe_fresh(c: &mut Criterion) {
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_time()
        .build()
        .unwrap();
    let _guard = runtime.enter();

    let cache = filled(1_000);
    let mut g = c.benchmark_group("observe");
    g.throughput(Throughput::Elements(1));
    g.bench_function("observe_fresh_hit", |b| {
        b.iter(|| {
            let producer = from_fn(|_cancel: CancelToken| async { Ok(vec![0u64]) });
            let binding = cache
                .observe("proj-42:deals", producer, ObserveOptions::new())
                .unwrap();
            black_box(binding.data())
        });
    });
    g.finish();
}

criterion_group!(
    benches,
    bench_insert,
    bench_peek,
    bench_invalidate_by_pattern,
    bench_observe_fresh
);
criterion_main!(benches);
