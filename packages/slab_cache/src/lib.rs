//! A slab object cache that hands out and takes back same-typed objects by address.
//!
//! This crate provides [`SlabCache`], which pre-allocates objects in fixed-size blocks ("slabs")
//! and recycles them, so programs that cycle through many short-lived objects of one type pay
//! for object construction once per slab instead of once per use.
//!
//! # Key Features
//!
//! - **Stable addresses**: Objects never move while the cache owns them
//! - **Address-based free**: Objects are returned by pointer or by raw address, with foreign,
//!   misaligned and already-freed pointers rejected without touching cache state
//! - **Pluggable policies**: Caller-supplied [growth][Grower] and [reap][Reaper] policies decide
//!   when the cache gains and releases capacity
//! - **Per-object callbacks**: Optional [constructor][Constructor] and [destructor][Destructor]
//!   run once per object when its slab is created and released
//! - **Statistics**: [`CacheStats`] snapshots for monitoring and for the policies themselves
//! - **Thread mobility**: The cache can be moved between threads (but not shared without
//!   synchronization)
//!
//! # How it works
//!
//! Each slab tracks its objects in a bitmap, one bit per object, and remembers the lowest free
//! slot so allocation rarely has to scan. The cache keeps its slabs in three address-ordered
//! lists by fullness - full, partial and empty - and resolves a freed address to its slab by
//! binary search.
//!
//! Freeing an object that is not currently allocated is detected and reported as `false`, so a
//! double free cannot silently mark a free object as in use.
//!
//! # Examples
//!
//! ```rust
//! use slab_cache::SlabCache;
//!
//! #[derive(Default)]
//! struct Connection {
//!     buffer: Vec<u8>,
//!     requests_served: u64,
//! }
//!
//! let mut cache = SlabCache::<Connection>::builder()
//!     .objects_per_slab(32)
//!     .constructor(|connection| connection.buffer.reserve(4096))
//!     .build()
//!     .unwrap();
//!
//! let connection = cache.alloc().unwrap();
//!
//! // SAFETY: The object is allocated and we hold no other reference to it.
//! let connection_ref = unsafe { &mut *connection.as_ptr() };
//! connection_ref.requests_served += 1;
//! assert!(connection_ref.buffer.capacity() >= 4096);
//!
//! assert!(cache.free(connection));
//!
//! let stats = cache.read_stats();
//! assert_eq!(stats.total_objects, 32);
//! assert_eq!(stats.inuse_objects, 0);
//! ```

mod builder;
mod cache;
mod drop_policy;
mod error;
mod ntz;
mod policy;
mod slab;
mod slab_list;
mod stats;

pub use builder::*;
pub use cache::SlabCache;
pub use drop_policy::*;
pub use error::*;
pub(crate) use ntz::*;
pub use policy::*;
pub(crate) use slab::*;
pub(crate) use slab_list::*;
pub use stats::*;
