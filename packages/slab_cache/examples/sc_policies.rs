//! Example of custom growth and reap policies for `SlabCache`.
//!
//! The cache below is bounded to a fixed number of slabs and keeps at most one fully-free slab
//! around for reuse. The cache reports slab growth and reaping through `tracing`, which this
//! example prints to stdout.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use slab_cache::{CacheStats, SlabCache, default_grower};

const MAX_SLABS: usize = 4;

fn bounded_grower(stats: &CacheStats) -> usize {
    default_grower(stats).min(MAX_SLABS.saturating_sub(stats.total_slabs))
}

fn keep_one_empty(stats: &CacheStats) -> usize {
    stats
        .total_slabs
        .saturating_sub(stats.inuse_slabs)
        .saturating_sub(1)
}

fn main() {
    tracing_subscriber::fmt()
        .with_max_level(tracing::Level::DEBUG)
        .init();

    let destructed = Arc::new(AtomicUsize::new(0));

    let mut cache = SlabCache::<[u64; 8]>::builder()
        .objects_per_slab(8)
        .grower(bounded_grower)
        .reaper(keep_one_empty)
        .destructor({
            let destructed = Arc::clone(&destructed);
            move |object| {
                object.fill(0);
                destructed.fetch_add(1, Ordering::Relaxed);
            }
        })
        .build()
        .expect("[u64; 8] is not zero-sized and 8 objects per slab is valid");

    let mut objects = Vec::new();

    while let Some(object) = cache.alloc() {
        objects.push(object);
    }

    println!(
        "Cache is exhausted after {} objects: {:?}",
        objects.len(),
        cache.read_stats()
    );

    for object in objects.drain(..) {
        assert!(cache.free(object));
    }

    let stats = cache.read_stats();
    println!("Freed everything: {stats:?}");
    println!(
        "{} slab kept for reuse, {} objects destructed",
        stats.total_slabs,
        destructed.load(Ordering::Relaxed)
    );

    println!("Released {} idle slabs on demand", cache.shrink_to_fit());
}
