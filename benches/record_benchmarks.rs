//! Wide-event record benchmarks
//!
//! - Full request lifecycle (create, write, flatten, finish)
//! - Pooled vs. cold map allocation
//! - Flattening cost by tree width
//!
//! Measure before optimizing.

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use std::sync::Arc;
use wide_event::{MapPool, PoolConfig, Record, Scope};

/// Build a request-shaped tree with `width` groups of four fields each
fn fill(root: &Record, width: usize) {
    root.set("method", "GET").set("path", "/users/42");
    for i in 0..width {
        let group = root.sub(&format!("stage{i}"));
        group.set_all([("a", 1), ("b", 2), ("c", 3)]);
        group.add("d", 1).add("d", 1);
    }
}

/// Benchmark one unit of work end to end
fn bench_request_lifecycle(c: &mut Criterion) {
    let mut group = c.benchmark_group("request_lifecycle");

    for width in [1, 8, 32].iter() {
        group.bench_with_input(BenchmarkId::from_parameter(width), width, |b, &width| {
            b.iter(|| {
                let (scope, root) = Scope::background().new_record("http_request");
                fill(scope.get(), width);
                black_box(root.all_values());
                root.finish();
            });
        });
    }

    group.finish();
}

/// Benchmark pooled storage against a pool that never retains maps
fn bench_pool_reuse(c: &mut Criterion) {
    let mut group = c.benchmark_group("pool_reuse");

    let pooled = Arc::new(MapPool::new());
    let cold = Arc::new(MapPool::with_config(PoolConfig::default().max_idle(0)));

    for (name, pool) in [("pooled", pooled), ("cold", cold)] {
        group.bench_function(name, |b| {
            b.iter(|| {
                let root = Record::new_in(&pool, "job");
                fill(&root, 8);
                root.finish();
            });
        });
    }

    group.finish();
}

/// Benchmark flattening and rendering by tree width
fn bench_flatten(c: &mut Criterion) {
    let mut group = c.benchmark_group("flatten");

    for width in [4, 16, 64].iter() {
        let root = Record::new("http_request");
        fill(&root, *width);

        group.bench_with_input(BenchmarkId::new("all_values", width), width, |b, _| {
            b.iter(|| black_box(root.all_values()));
        });
        group.bench_with_input(BenchmarkId::new("render", width), width, |b, _| {
            b.iter(|| black_box(root.render()));
        });

        root.finish();
    }

    group.finish();
}

criterion_group!(benches, bench_request_lifecycle, bench_pool_reuse, bench_flatten);
criterion_main!(benches);
