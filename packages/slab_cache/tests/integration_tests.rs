//! Integration tests for the `slab_cache` package.
//!
//! These exercise the public API end to end: growth and reap policies, object reuse order,
//! rejection of invalid frees and the bookkeeping reported through `CacheStats`.

#![allow(
    clippy::arithmetic_side_effects,
    clippy::indexing_slicing,
    clippy::modulo_arithmetic,
    reason = "test code doesn't need the same safety rigor as production code"
)]

use std::ptr::NonNull;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use slab_cache::{CacheStats, SlabCache};

#[derive(Debug, Default)]
struct Foo {
    name: String,
    count: i64,
    next: Option<Box<Foo>>,
}

fn counter() -> (Arc<AtomicUsize>, impl FnMut(&mut Foo) + Send + 'static) {
    let count = Arc::new(AtomicUsize::new(0));

    let callback = {
        let count = Arc::clone(&count);
        move |_: &mut Foo| {
            count.fetch_add(1, Ordering::Relaxed);
        }
    };

    (count, callback)
}

fn init_tracing() {
    _ = tracing_subscriber::fmt()
        .with_max_level(tracing::Level::TRACE)
        .with_test_writer()
        .try_init();
}

#[test]
fn new_cache_reports_configuration() {
    let cache = SlabCache::<Foo>::builder()
        .objects_per_slab(32)
        .build()
        .unwrap();

    assert_eq!(cache.objects_per_slab(), 32);
    assert_eq!(cache.object_layout(), std::alloc::Layout::new::<Foo>());
    assert!(cache.object_type_name().ends_with("Foo"));
    assert_eq!(cache.read_stats(), CacheStats::default());

    let cache = SlabCache::<Foo>::new();
    assert_eq!(cache.objects_per_slab(), 256);

    assert!(SlabCache::<()>::builder().build().is_err());
}

#[test]
fn default_growth_doubles_then_adds_quarter() {
    init_tracing();

    let (constructed, constructor) = counter();

    let mut cache = SlabCache::<Foo>::builder()
        .objects_per_slab(32)
        .constructor(constructor)
        .build()
        .unwrap();

    let mut objects = Vec::new();

    // Each exhaustion grows the cache: 1, 2, 4, 8, 16, 32 slabs, then +8.
    for (expected_slabs, allocs_until_full) in [
        (1, 32),
        (2, 64),
        (4, 128),
        (8, 256),
        (16, 512),
        (32, 1024),
        (40, 1280),
    ] {
        while objects.len() < allocs_until_full {
            objects.push(cache.alloc().unwrap());
        }

        let stats = cache.read_stats();
        assert_eq!(stats.total_slabs, expected_slabs);
        assert_eq!(stats.inuse_slabs, expected_slabs);
        assert_eq!(stats.total_objects, expected_slabs * 32);
        assert_eq!(stats.inuse_objects, allocs_until_full);
        assert_eq!(
            constructed.load(Ordering::Relaxed),
            expected_slabs * 32,
            "every object of every new slab is constructed"
        );
    }

    for object in objects {
        assert!(cache.free(object));
    }
}

#[test]
fn freed_objects_are_reused_in_address_order() {
    let mut cache = SlabCache::<Foo>::builder()
        .objects_per_slab(32)
        .build()
        .unwrap();

    let objects = (0..32).map(|_| cache.alloc().unwrap()).collect::<Vec<_>>();

    for object in &objects {
        // SAFETY: The object is allocated and we hold no other reference to it.
        let foo = unsafe { &mut *object.as_ptr() };
        foo.count = 7;
    }

    for index in [29, 3, 17] {
        assert!(cache.free(objects[index]));
    }

    assert_eq!(cache.alloc().unwrap(), objects[3]);
    assert_eq!(cache.alloc().unwrap(), objects[17]);
    assert_eq!(cache.alloc().unwrap(), objects[29]);

    // Objects are recycled as-is, not reset.
    // SAFETY: The object is allocated and we hold no other reference to it.
    assert_eq!(unsafe { objects[17].as_ref() }.count, 7);

    let stats = cache.read_stats();
    assert_eq!(stats.total_slabs, 1);
    assert_eq!(stats.inuse_objects, 32);
}

#[test]
fn double_free_is_rejected() {
    init_tracing();

    let mut cache = SlabCache::<Foo>::builder()
        .objects_per_slab(32)
        .build()
        .unwrap();

    let first = cache.alloc().unwrap();
    let second = cache.alloc().unwrap();

    assert!(cache.free(first));
    assert!(!cache.free(first));
    assert!(!cache.free_by_address(first.addr().get()));

    let stats = cache.read_stats();
    assert_eq!(stats.inuse_objects, 1);
    assert_eq!(stats.allocs, 2);
    assert_eq!(stats.frees, 1);

    assert!(cache.free(second));
    assert!(!cache.free(second));
}

#[test]
fn foreign_and_interior_pointers_are_rejected() {
    let mut cache = SlabCache::<Foo>::builder()
        .objects_per_slab(8)
        .build()
        .unwrap();

    let object = cache.alloc().unwrap();

    let mut other_cache = SlabCache::<Foo>::new();
    let other_object = other_cache.alloc().unwrap();

    let mut on_stack = Foo::default();

    assert!(!cache.free(other_object));
    assert!(!cache.free(NonNull::from(&mut on_stack)));
    assert!(!cache.free_by_address(object.addr().get() + 1));
    assert!(!cache.free_by_address(object.addr().get() + size_of::<Foo>() / 2));

    assert_eq!(cache.read_stats().inuse_objects, 1);
    assert_eq!(cache.read_stats().frees, 0);

    assert!(other_cache.free(other_object));
    assert!(cache.free(object));
}

#[test]
fn reaper_releases_empty_slab_and_destructs_its_objects() {
    init_tracing();

    let (destructed, destructor) = counter();

    let mut cache = SlabCache::<Foo>::builder()
        .objects_per_slab(32)
        .grower(|_| 1)
        .reaper(|_| 1)
        .destructor(destructor)
        .build()
        .unwrap();

    let first_slab = (0..32).map(|_| cache.alloc().unwrap()).collect::<Vec<_>>();
    let second_slab = (0..32).map(|_| cache.alloc().unwrap()).collect::<Vec<_>>();

    assert_eq!(cache.read_stats().total_slabs, 2);

    for object in &first_slab {
        assert!(cache.free(*object));
    }

    let stats = cache.read_stats();
    assert_eq!(stats.total_slabs, 1);
    assert_eq!(stats.inuse_objects, 32);
    assert_eq!(destructed.load(Ordering::Relaxed), 32);

    for object in &second_slab {
        assert!(cache.free(*object));
    }

    assert_eq!(cache.read_stats().total_slabs, 0);
    assert_eq!(destructed.load(Ordering::Relaxed), 64);
}

#[test]
fn default_reaper_keeps_empty_slabs() {
    let (destructed, destructor) = counter();

    let mut cache = SlabCache::<Foo>::builder()
        .objects_per_slab(8)
        .destructor(destructor)
        .build()
        .unwrap();

    // 1 + 1 + 2 slabs under the default growth policy.
    let objects = (0..24).map(|_| cache.alloc().unwrap()).collect::<Vec<_>>();

    for object in objects {
        assert!(cache.free(object));
    }

    let stats = cache.read_stats();
    assert_eq!(stats.total_slabs, 4);
    assert_eq!(stats.inuse_slabs, 0);
    assert_eq!(destructed.load(Ordering::Relaxed), 0);

    // Allocating again reuses the kept slabs instead of growing.
    _ = cache.alloc().unwrap();
    assert_eq!(cache.read_stats().total_slabs, 4);

    assert_eq!(cache.shrink_to_fit(), 3);
    assert_eq!(destructed.load(Ordering::Relaxed), 24);
    assert_eq!(cache.read_stats().total_slabs, 1);
}

#[test]
fn exhausted_growth_policy_fails_allocation() {
    let mut cache = SlabCache::<Foo>::builder()
        .objects_per_slab(8)
        .grower(|stats| usize::from(stats.total_slabs == 0))
        .build()
        .unwrap();

    let objects = (0..8).map(|_| cache.alloc().unwrap()).collect::<Vec<_>>();

    assert!(cache.alloc().is_none());
    assert_eq!(cache.read_stats().allocs, 8);

    // Freeing makes room again without growth.
    assert!(cache.free(objects[5]));
    assert_eq!(cache.alloc().unwrap(), objects[5]);
}

#[test]
fn destroy_resets_everything() {
    init_tracing();

    let (constructed, constructor) = counter();
    let (destructed, destructor) = counter();

    let mut cache = SlabCache::<Foo>::builder()
        .objects_per_slab(16)
        .constructor(constructor)
        .destructor(destructor)
        .build()
        .unwrap();

    let objects = (0..40).map(|_| cache.alloc().unwrap()).collect::<Vec<_>>();

    for object in objects.iter().step_by(3) {
        assert!(cache.free(*object));
    }

    let slabs_before = cache.read_stats().total_slabs;

    cache.destroy();

    assert_eq!(cache.read_stats(), CacheStats::default());
    assert_eq!(
        destructed.load(Ordering::Relaxed),
        slabs_before * 16,
        "every object of every slab is destructed"
    );

    // A destroyed cache behaves like a new one.
    let constructed_before = constructed.load(Ordering::Relaxed);
    let object = cache.alloc().unwrap();

    let stats = cache.read_stats();
    assert_eq!(stats.total_slabs, 1);
    assert_eq!(stats.allocs, 1);
    assert_eq!(constructed.load(Ordering::Relaxed), constructed_before + 16);

    assert!(cache.free(object));
}

#[test]
fn objects_keep_their_state_across_slab_growth() {
    let mut cache = SlabCache::<Foo>::builder()
        .objects_per_slab(8)
        .build()
        .unwrap();

    let objects = (0..100)
        .map(|index| {
            let object = cache.alloc().unwrap();

            // SAFETY: The object is allocated and we hold no other reference to it.
            let foo = unsafe { &mut *object.as_ptr() };
            foo.name = format!("foo {index}");
            foo.next = Some(Box::new(Foo {
                count: index,
                ..Foo::default()
            }));

            object
        })
        .collect::<Vec<_>>();

    for (index, object) in (0_i64..).zip(&objects) {
        // SAFETY: The object is allocated and we hold no other reference to it.
        let foo = unsafe { object.as_ref() };
        assert_eq!(foo.name, format!("foo {index}"));
        assert_eq!(foo.next.as_ref().unwrap().count, index);
    }

    for object in objects {
        assert!(cache.free(object));
    }
}

/// Deterministic pseudo-random sequence for mixing allocations and frees.
struct Lcg(u64);

impl Lcg {
    fn next_value(&mut self) -> u64 {
        self.0 = self
            .0
            .wrapping_mul(6_364_136_223_846_793_005)
            .wrapping_add(1_442_695_040_888_963_407);
        self.0 >> 33
    }
}

#[test]
fn counters_are_conserved_under_mixed_workload() {
    let mut cache = SlabCache::<Foo>::builder()
        .objects_per_slab(16)
        .reaper(|stats| usize::from(stats.total_slabs - stats.inuse_slabs > 2))
        .build()
        .unwrap();

    let mut random = Lcg(42);
    let mut live = Vec::new();

    for _ in 0..5_000 {
        if live.is_empty() || random.next_value() % 3 != 0 {
            live.push(cache.alloc().unwrap());
        } else {
            let index = usize::try_from(random.next_value()).unwrap() % live.len();
            let object = live.swap_remove(index);
            assert!(cache.free(object));
        }

        let stats = cache.read_stats();
        assert_eq!(stats.inuse_objects, live.len());
        assert_eq!(stats.allocs - stats.frees, u64::try_from(live.len()).unwrap());
        assert!(stats.inuse_objects <= stats.total_objects);
        assert!(stats.inuse_slabs <= stats.total_slabs);
    }

    // Every live address is distinct.
    let mut addresses = live.iter().map(|object| object.addr()).collect::<Vec<_>>();
    addresses.sort_unstable();
    addresses.dedup();
    assert_eq!(addresses.len(), live.len());

    for object in live {
        assert!(cache.free(object));
    }

    assert_eq!(cache.read_stats().inuse_objects, 0);
}
