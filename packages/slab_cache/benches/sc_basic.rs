//! Basic benchmarks for the `slab_cache` crate.
#![allow(
    missing_docs,
    reason = "No need for API documentation in benchmark code"
)]

use std::hint::black_box;
use std::iter;
use std::ptr::NonNull;
use std::time::Instant;

use criterion::{Criterion, criterion_group, criterion_main};
use slab_cache::SlabCache;

criterion_group!(benches, entrypoint);
criterion_main!(benches);

#[derive(Default)]
struct TestItem {
    buffer: Vec<u8>,
    counter: u64,
}

const OBJECTS_PER_SLAB: usize = 256;

fn new_cache() -> SlabCache<TestItem> {
    SlabCache::<TestItem>::builder()
        .objects_per_slab(OBJECTS_PER_SLAB)
        .constructor(|item| item.buffer.reserve(64))
        .build()
        .unwrap()
}

fn entrypoint(c: &mut Criterion) {
    let mut group = c.benchmark_group("sc_basic");

    group.bench_function("build_empty", |b| {
        b.iter(|| drop(black_box(new_cache())));
    });

    group.bench_function("alloc_first", |b| {
        b.iter_custom(|iters| {
            let mut caches = iter::repeat_with(new_cache)
                .take(usize::try_from(iters).unwrap())
                .collect::<Vec<_>>();

            let start = Instant::now();

            for cache in &mut caches {
                _ = black_box(cache.alloc());
            }

            start.elapsed()
        });
    });

    group.bench_function("alloc_free_warm", |b| {
        b.iter_custom(|iters| {
            let mut cache = new_cache();

            // Keep one object allocated so the slab stays partial.
            let anchor = cache.alloc().unwrap();

            let start = Instant::now();

            for _ in 0..iters {
                let object = cache.alloc().unwrap();
                assert!(cache.free(black_box(object)));
            }

            let elapsed = start.elapsed();

            assert!(cache.free(anchor));

            elapsed
        });
    });

    group.bench_function("free_among_many_slabs", |b| {
        b.iter_custom(|iters| {
            let mut cache = new_cache();

            let objects = iter::repeat_with(|| cache.alloc().unwrap())
                .take(OBJECTS_PER_SLAB * 64)
                .collect::<Vec<NonNull<TestItem>>>();

            let mut victims = objects.iter().copied().step_by(61).cycle();

            let start = Instant::now();

            for _ in 0..iters {
                let object = victims.next().unwrap();

                assert!(cache.free(black_box(object)));

                // SAFETY: The object was just reallocated and we hold no other reference to it.
                let item = unsafe { &mut *cache.alloc().unwrap().as_ptr() };
                item.counter = item.counter.wrapping_add(1);
            }

            start.elapsed()
        });
    });

    group.bench_function("read_stats", |b| {
        let mut cache = new_cache();
        let _objects = iter::repeat_with(|| cache.alloc().unwrap())
            .take(1000)
            .collect::<Vec<_>>();

        b.iter(|| black_box(cache.read_stats()));
    });

    group.finish();
}
