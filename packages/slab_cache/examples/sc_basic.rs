//! Basic usage example for `SlabCache`.
//!
//! This example allocates a batch of reusable request buffers, frees some of them and shows
//! how the cache recycles the freed objects instead of creating new ones.

use slab_cache::SlabCache;

#[derive(Debug, Default)]
struct RequestBuffer {
    bytes: Vec<u8>,
    request_id: u64,
}

fn main() {
    let mut cache = SlabCache::<RequestBuffer>::builder()
        .objects_per_slab(16)
        .constructor(|buffer| buffer.bytes.reserve(4096))
        .build()
        .expect("RequestBuffer is not zero-sized and 16 objects per slab is valid");

    println!(
        "Created cache of {} with {} objects per slab",
        cache.object_type_name(),
        cache.objects_per_slab()
    );

    let buffers = (0..20_u64)
        .map(|request_id| {
            let buffer = cache.alloc().expect("the default growth policy always grows");

            // SAFETY: The object is allocated and we hold no other reference to it.
            let buffer_ref = unsafe { &mut *buffer.as_ptr() };
            buffer_ref.request_id = request_id;
            buffer_ref.bytes.extend_from_slice(b"GET / HTTP/1.1");

            buffer
        })
        .collect::<Vec<_>>();

    println!("Allocated {} buffers: {:?}", buffers.len(), cache.read_stats());

    // Return every other buffer to the cache.
    for buffer in buffers.iter().step_by(2) {
        assert!(cache.free(*buffer));
    }

    println!("Freed half of the buffers: {:?}", cache.read_stats());

    // A second free of the same buffer is detected and rejected.
    let first = *buffers.first().expect("we allocated 20 buffers");
    assert!(!cache.free(first));
    println!("Second free of the same buffer was rejected");

    // Freed objects come back as the previous user left them.
    let recycled = cache.alloc().expect("freed buffers are available");

    // SAFETY: The object is allocated and we hold no other reference to it.
    let recycled_ref = unsafe { &mut *recycled.as_ptr() };
    println!(
        "Recycled buffer from request {} still holds {} bytes with capacity {}",
        recycled_ref.request_id,
        recycled_ref.bytes.len(),
        recycled_ref.bytes.capacity()
    );
    recycled_ref.bytes.clear();

    cache.destroy();
    println!("Destroyed cache: {:?}", cache.read_stats());
}
