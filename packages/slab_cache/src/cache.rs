use std::alloc::Layout;
use std::any::type_name;
use std::ptr::NonNull;
use std::thread;

use tracing::{debug, trace};

use crate::{
    CacheStats, Constructor, Destructor, DropPolicy, Grower, Reaper, Slab, SlabCacheBuilder,
    SlabList,
};

/// A cache of reusable objects of type `T`, carved out of fixed-size slabs.
///
/// Each slab holds [`objects_per_slab()`][1] objects that are created when the slab is created
/// and stay alive until the slab is released. Allocating hands out a pointer to one of them and
/// freeing returns it to the slab, so objects are recycled without running any per-object setup
/// or teardown on the hot path.
///
/// The cache tracks its slabs in three address-ordered lists by fullness (full, partial and
/// empty). Allocation always takes an object from the lowest-addressed partial slab, which
/// packs objects into as few slabs as possible.
///
/// # Growth and reaping
///
/// When no free object is left, the [growth policy][crate::Grower] decides how many slabs to
/// add. When a slab becomes fully free, the [reap policy][crate::Reaper] decides how many
/// fully-free slabs to release. Released slabs run the destructor on each of their objects.
///
/// # Object addresses
///
/// Objects never move while the cache owns them, so the pointer returned by [`alloc()`][2] stays
/// valid until the object is freed or its slab is released. The cache does not keep references
/// to allocated objects, so callers may read and write them through the pointer. Doing so after
/// the object has been freed is undefined behavior.
///
/// # Thread safety
///
/// The cache performs no internal synchronization. It can be moved between threads if `T` can
/// but sharing it requires an external lock.
///
/// # Examples
///
/// ```
/// use slab_cache::SlabCache;
///
/// let mut cache = SlabCache::<String>::new();
///
/// let greeting = cache.alloc().unwrap();
///
/// // SAFETY: The object is allocated and we hold no other reference to it.
/// unsafe { greeting.as_ptr().as_mut().unwrap().push_str("Hello") };
///
/// assert_eq!(cache.read_stats().inuse_objects, 1);
///
/// assert!(cache.free(greeting));
/// assert!(!cache.free(greeting));
/// ```
///
/// [1]: Self::objects_per_slab
/// [2]: Self::alloc
pub struct SlabCache<T> {
    /// Slabs with every object in use.
    full: SlabList<T>,

    /// Slabs with some objects in use and some free.
    partial: SlabList<T>,

    /// Slabs with no object in use.
    empty: SlabList<T>,

    objects_per_slab: usize,

    inuse_objects: usize,
    allocs: u64,
    frees: u64,

    grower: Grower,
    reaper: Reaper,
    constructor: Option<Constructor<T>>,
    destructor: Option<Destructor<T>>,

    drop_policy: DropPolicy,
}

impl<T> std::fmt::Debug for SlabCache<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SlabCache")
            .field("object_type", &std::format_args!("{}", type_name::<T>()))
            .field("objects_per_slab", &self.objects_per_slab)
            .field("full_slabs", &self.full.len())
            .field("partial_slabs", &self.partial.len())
            .field("empty_slabs", &self.empty.len())
            .field("inuse_objects", &self.inuse_objects)
            .field("allocs", &self.allocs)
            .field("frees", &self.frees)
            .field("drop_policy", &self.drop_policy)
            .finish_non_exhaustive()
    }
}

impl<T> SlabCache<T> {
    #[must_use]
    pub(crate) fn new_inner(
        objects_per_slab: usize,
        grower: Grower,
        reaper: Reaper,
        constructor: Option<Constructor<T>>,
        destructor: Option<Destructor<T>>,
        drop_policy: DropPolicy,
    ) -> Self {
        Self {
            full: SlabList::new(),
            partial: SlabList::new(),
            empty: SlabList::new(),
            objects_per_slab,
            inuse_objects: 0,
            allocs: 0,
            frees: 0,
            grower,
            reaper,
            constructor,
            destructor,
            drop_policy,
        }
    }

    /// Creates a new [`SlabCache`] with the default configuration.
    ///
    /// The cache starts without any slabs and grows when the first object is allocated.
    ///
    /// # Panics
    ///
    /// Panics if `T` is zero-sized. Use [`builder()`][Self::builder] to handle that as an error.
    ///
    /// # Example
    ///
    /// ```rust
    /// use slab_cache::SlabCache;
    ///
    /// let cache = SlabCache::<u64>::new();
    ///
    /// assert_eq!(cache.objects_per_slab(), 256);
    /// assert_eq!(cache.read_stats().total_slabs, 0);
    /// ```
    #[must_use]
    pub fn new() -> Self {
        Self::builder()
            .build()
            .expect("the default configuration is valid for every type that is not zero-sized")
    }

    /// Starts building a new [`SlabCache`].
    ///
    /// Use this when you want to customize the cache configuration beyond the defaults.
    pub fn builder() -> SlabCacheBuilder<T> {
        SlabCacheBuilder::new()
    }

    /// The memory layout of the cached object type.
    #[must_use]
    pub fn object_layout(&self) -> Layout {
        Layout::new::<T>()
    }

    /// The name of the cached object type, for diagnostics.
    #[must_use]
    pub fn object_type_name(&self) -> &'static str {
        type_name::<T>()
    }

    /// The number of objects in each slab.
    #[must_use]
    pub fn objects_per_slab(&self) -> usize {
        self.objects_per_slab
    }

    /// Takes a snapshot of the cache state.
    ///
    /// # Example
    ///
    /// ```rust
    /// use slab_cache::SlabCache;
    ///
    /// let mut cache = SlabCache::<u32>::builder()
    ///     .objects_per_slab(16)
    ///     .build()
    ///     .unwrap();
    ///
    /// let a = cache.alloc().unwrap();
    /// let b = cache.alloc().unwrap();
    /// assert!(cache.free(a));
    ///
    /// let stats = cache.read_stats();
    /// assert_eq!(stats.total_objects, 16);
    /// assert_eq!(stats.inuse_objects, 1);
    /// assert_eq!(stats.allocs, 2);
    /// assert_eq!(stats.frees, 1);
    /// # assert!(cache.free(b));
    /// ```
    #[must_use]
    pub fn read_stats(&self) -> CacheStats {
        let object_size =
            u64::try_from(size_of::<T>()).expect("object size always fits in u64");

        let inuse_slabs = self
            .full
            .len()
            .checked_add(self.partial.len())
            .expect("slab count cannot overflow because each slab occupies memory");

        let total_slabs = inuse_slabs
            .checked_add(self.empty.len())
            .expect("slab count cannot overflow because each slab occupies memory");

        let total_objects = total_slabs
            .checked_mul(self.objects_per_slab)
            .expect("object count cannot overflow because each object occupies memory");

        let to_bytes = |objects: usize| {
            u64::try_from(objects)
                .ok()
                .and_then(|objects| objects.checked_mul(object_size))
                .expect("byte count cannot overflow because the objects fit in memory")
        };

        CacheStats {
            total_slabs,
            inuse_slabs,
            total_objects,
            inuse_objects: self.inuse_objects,
            allocs: self.allocs,
            frees: self.frees,
            cache_size_bytes: to_bytes(total_objects),
            cache_size_inuse_bytes: to_bytes(self.inuse_objects),
        }
    }

    /// Allocates an object from the cache and returns a pointer to it.
    ///
    /// The object is whatever the previous user left in it, or the constructed state if it has
    /// never been allocated before. The cache grows via the growth policy if no free object is
    /// left.
    ///
    /// Returns `None` if no free object is left and the growth policy declined to add slabs.
    /// This is not an error - the caller may retry once objects have been freed.
    ///
    /// # Example
    ///
    /// ```rust
    /// use slab_cache::SlabCache;
    ///
    /// let mut cache = SlabCache::<u64>::new();
    ///
    /// let object = cache.alloc().unwrap();
    ///
    /// // SAFETY: The object is allocated and we hold no other reference to it.
    /// unsafe {
    ///     object.as_ptr().write(42);
    ///     assert_eq!(object.as_ptr().read(), 42);
    /// }
    ///
    /// assert!(cache.free(object));
    /// ```
    #[must_use]
    pub fn alloc(&mut self) -> Option<NonNull<T>>
    where
        T: Default,
    {
        if self.partial.is_empty() {
            if self.empty.is_empty() && self.grow() == 0 {
                trace!(
                    object_type = type_name::<T>(),
                    "allocation failed because the growth policy added no slabs"
                );
                return None;
            }

            let slab = self.empty.remove(0);
            self.partial.insert(slab);
        }

        let slab = self
            .partial
            .first_mut()
            .expect("we just ensured there is a partial slab");

        let object = slab.alloc();

        if slab.is_full() {
            let slab = self.partial.remove(0);
            self.full.insert(slab);
        }

        // Cannot overflow because every in-use object occupies memory.
        self.inuse_objects = self.inuse_objects.wrapping_add(1);
        self.allocs = self.allocs.wrapping_add(1);

        #[cfg(debug_assertions)]
        self.integrity_check();

        Some(object)
    }

    /// Returns an object to the cache.
    ///
    /// Returns `false` without changing any state if the pointer does not refer to an object
    /// currently allocated from this cache: a double free, a pointer from another cache or
    /// allocator, or a pointer that is misaligned for `T` or points into the middle of an object.
    ///
    /// After a successful free the object must no longer be accessed through the pointer.
    ///
    /// # Example
    ///
    /// ```rust
    /// use std::ptr::NonNull;
    ///
    /// use slab_cache::SlabCache;
    ///
    /// let mut cache = SlabCache::<u32>::new();
    /// let object = cache.alloc().unwrap();
    ///
    /// let mut foreign = 5_u32;
    /// assert!(!cache.free(NonNull::from(&mut foreign)));
    ///
    /// assert!(cache.free(object));
    /// assert!(!cache.free(object));
    /// ```
    #[must_use]
    pub fn free(&mut self, object: NonNull<T>) -> bool {
        if !object.as_ptr().is_aligned() {
            trace!(
                object_type = type_name::<T>(),
                address = object.addr().get(),
                "rejected free of misaligned pointer"
            );
            return false;
        }

        self.free_by_address(object.addr().get())
    }

    /// Returns the object at `address` to the cache.
    ///
    /// This skips the type-level checks of [`free()`][Self::free] and is meant for callers that
    /// only kept the address of an allocated object. An address that does not identify an
    /// object currently allocated from this cache is still rejected with `false`, without
    /// changing any state.
    #[must_use]
    pub fn free_by_address(&mut self, address: usize) -> bool {
        if let Some(index) = self.partial.find(address) {
            let slab = self
                .partial
                .get_mut(index)
                .expect("find only returns in-bounds indexes");

            if slab.free(address) {
                let now_empty = slab.is_empty();
                self.record_free();

                if now_empty {
                    let slab = self.partial.remove(index);
                    self.empty.insert(slab);
                    self.reap();
                }

                #[cfg(debug_assertions)]
                self.integrity_check();

                return true;
            }
        }

        if let Some(index) = self.full.find(address) {
            let slab = self
                .full
                .get_mut(index)
                .expect("find only returns in-bounds indexes");

            if slab.free(address) {
                let now_empty = slab.is_empty();
                self.record_free();

                let slab = self.full.remove(index);

                if now_empty {
                    self.empty.insert(slab);
                    self.reap();
                } else {
                    self.partial.insert(slab);
                }

                #[cfg(debug_assertions)]
                self.integrity_check();

                return true;
            }
        }

        trace!(
            object_type = type_name::<T>(),
            address,
            "rejected free of address that is not an allocated object"
        );

        false
    }

    fn record_free(&mut self) {
        self.inuse_objects = self
            .inuse_objects
            .checked_sub(1)
            .expect("a slab accepted the free so some object must have been in use");
        self.frees = self.frees.wrapping_add(1);
    }

    /// Asks the growth policy for new slabs and adds them to the empty list.
    fn grow(&mut self) -> usize
    where
        T: Default,
    {
        let stats = self.read_stats();
        let count = (self.grower)(&stats);

        let constructor = &mut self.constructor;

        for _ in 0..count {
            let slab = Slab::new(self.objects_per_slab, |object| {
                if let Some(constructor) = constructor.as_mut() {
                    constructor(object);
                }
            });

            self.empty.insert(slab);
        }

        if count > 0 {
            debug!(
                object_type = type_name::<T>(),
                added_slabs = count,
                total_slabs = stats.total_slabs.saturating_add(count),
                "grew slab cache"
            );
        }

        count
    }

    /// Asks the reap policy how many empty slabs to release and releases them, highest
    /// address first.
    fn reap(&mut self) -> usize {
        let stats = self.read_stats();
        let count = (self.reaper)(&stats).min(self.empty.len());

        for _ in 0..count {
            let slab = self
                .empty
                .pop_last()
                .expect("count is clamped to the number of empty slabs");

            Self::release(slab, &mut self.destructor);
        }

        if count > 0 {
            debug!(
                object_type = type_name::<T>(),
                released_slabs = count,
                total_slabs = stats.total_slabs.saturating_sub(count),
                "reaped slab cache"
            );
        }

        count
    }

    fn release(slab: Slab<T>, destructor: &mut Option<Destructor<T>>) {
        slab.destroy(|object| {
            if let Some(destructor) = destructor.as_mut() {
                destructor(object);
            }
        });
    }

    /// Releases every slab that has no object in use and returns how many were released.
    ///
    /// The reap policy is only consulted when a slab becomes fully free; this releases all
    /// idle capacity on demand regardless of the policy.
    ///
    /// # Example
    ///
    /// ```rust
    /// use slab_cache::SlabCache;
    ///
    /// let mut cache = SlabCache::<u32>::builder()
    ///     .objects_per_slab(8)
    ///     .build()
    ///     .unwrap();
    ///
    /// let object = cache.alloc().unwrap();
    /// assert!(cache.free(object));
    /// assert_eq!(cache.read_stats().total_slabs, 1);
    ///
    /// assert_eq!(cache.shrink_to_fit(), 1);
    /// assert_eq!(cache.read_stats().total_slabs, 0);
    /// ```
    pub fn shrink_to_fit(&mut self) -> usize {
        let mut released: usize = 0;

        while let Some(slab) = self.empty.pop_last() {
            Self::release(slab, &mut self.destructor);
            released = released.wrapping_add(1);
        }

        if released > 0 {
            debug!(
                object_type = type_name::<T>(),
                released_slabs = released,
                "shrank slab cache"
            );
        }

        released
    }

    /// Releases every slab, running the destructor on every object, and resets all counters.
    ///
    /// Pointers to objects that were still allocated become dangling. The cache remains usable
    /// and behaves as if newly created.
    ///
    /// # Example
    ///
    /// ```rust
    /// use slab_cache::SlabCache;
    ///
    /// let mut cache = SlabCache::<u32>::new();
    /// _ = cache.alloc().unwrap();
    ///
    /// cache.destroy();
    ///
    /// let stats = cache.read_stats();
    /// assert_eq!(stats.total_slabs, 0);
    /// assert_eq!(stats.allocs, 0);
    ///
    /// assert!(cache.alloc().is_some());
    /// ```
    pub fn destroy(&mut self) {
        let released = self.release_all();

        self.inuse_objects = 0;
        self.allocs = 0;
        self.frees = 0;

        debug!(
            object_type = type_name::<T>(),
            released_slabs = released,
            "destroyed slab cache"
        );
    }

    fn release_all(&mut self) -> usize {
        let mut released: usize = 0;

        for list in [&mut self.full, &mut self.partial, &mut self.empty] {
            while let Some(slab) = list.pop_last() {
                Self::release(slab, &mut self.destructor);
                released = released.wrapping_add(1);
            }
        }

        released
    }

    #[cfg_attr(test, mutants::skip)] // This is essentially test logic, mutation is meaningless.
    #[cfg(any(test, debug_assertions))]
    pub(crate) fn integrity_check(&self) {
        for slab in self.full.iter() {
            slab.integrity_check();
            assert!(slab.is_full(), "slab in the full list is not full");
        }

        for slab in self.partial.iter() {
            slab.integrity_check();
            assert!(
                !slab.is_full() && !slab.is_empty(),
                "slab in the partial list is full or empty"
            );
        }

        for slab in self.empty.iter() {
            slab.integrity_check();
            assert!(slab.is_empty(), "slab in the empty list has objects in use");
        }

        let mut ranges = self
            .full
            .iter()
            .chain(self.partial.iter())
            .chain(self.empty.iter())
            .map(|slab| (slab.base_address(), slab.end_address()))
            .collect::<Vec<_>>();

        for list in [&self.full, &self.partial, &self.empty] {
            assert!(
                list.iter().map(Slab::base_address).is_sorted(),
                "slab list is not sorted by address"
            );
        }

        ranges.sort_unstable();

        for pair in ranges.windows(2) {
            if let [(_, previous_end), (next_base, _)] = pair {
                assert!(
                    previous_end < next_base,
                    "slab address ranges overlap in slab cache of {}",
                    type_name::<T>()
                );
            }
        }

        let observed_inuse: usize = self
            .full
            .iter()
            .chain(self.partial.iter())
            .map(Slab::len)
            .sum();

        assert_eq!(
            self.inuse_objects,
            observed_inuse,
            "inuse_objects does not match the slabs in slab cache of {}",
            type_name::<T>()
        );

        assert_eq!(
            u64::try_from(self.inuse_objects).ok(),
            self.allocs.checked_sub(self.frees),
            "inuse_objects does not match allocs minus frees in slab cache of {}",
            type_name::<T>()
        );
    }
}

impl<T> Default for SlabCache<T> {
    /// Creates a new [`SlabCache`] with the default configuration.
    ///
    /// # Panics
    ///
    /// Panics if `T` is zero-sized.
    fn default() -> Self {
        Self::new()
    }
}

impl<T> Drop for SlabCache<T> {
    fn drop(&mut self) {
        let inuse_objects = self.inuse_objects;

        self.release_all();

        // We do this check at the end so we clean up the memory first.
        //
        // If we are already panicking, we do not want to panic again because that will
        // simply obscure whatever the original panic was, leading to debug difficulties.
        if self.drop_policy == DropPolicy::MustNotDropItems && !thread::panicking() {
            assert!(
                inuse_objects == 0,
                "dropped a slab cache of {} with {inuse_objects} objects in use with a policy that says it must be empty when dropped",
                type_name::<T>()
            );
        }
    }
}

#[cfg(test)]
#[allow(
    clippy::undocumented_unsafe_blocks,
    clippy::indexing_slicing,
    clippy::arithmetic_side_effects,
    clippy::modulo_arithmetic,
    reason = "test code doesn't need the same safety rigor as production code"
)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::{Arc, Mutex};
    use std::thread;

    use static_assertions::{assert_impl_all, assert_not_impl_any};

    use super::*;

    assert_impl_all!(SlabCache<u32>: Send);
    assert_not_impl_any!(SlabCache<u32>: Sync);
    assert_not_impl_any!(SlabCache<std::rc::Rc<u32>>: Send);

    fn cache_of(objects_per_slab: usize) -> SlabCache<u64> {
        SlabCache::builder()
            .objects_per_slab(objects_per_slab)
            .build()
            .unwrap()
    }

    fn list_sizes<T>(cache: &SlabCache<T>) -> (usize, usize, usize) {
        (cache.full.len(), cache.partial.len(), cache.empty.len())
    }

    #[test]
    fn smoke_test() {
        let mut cache = cache_of(8);

        let a = cache.alloc().unwrap();
        let b = cache.alloc().unwrap();

        unsafe {
            a.as_ptr().write(1);
            b.as_ptr().write(2);
        }

        assert_eq!(list_sizes(&cache), (0, 1, 0));
        cache.integrity_check();

        assert!(cache.free(a));
        assert_eq!(unsafe { b.as_ptr().read() }, 2);

        assert!(cache.free(b));
        assert_eq!(list_sizes(&cache), (0, 0, 1));
        cache.integrity_check();
    }

    #[test]
    fn slab_moves_between_lists() {
        let mut cache = cache_of(8);

        let objects = (0..8).map(|_| cache.alloc().unwrap()).collect::<Vec<_>>();
        assert_eq!(list_sizes(&cache), (1, 0, 0));
        cache.integrity_check();

        assert!(cache.free(objects[4]));
        assert_eq!(list_sizes(&cache), (0, 1, 0));
        cache.integrity_check();

        for object in objects.iter().filter(|object| **object != objects[4]) {
            assert!(cache.free(*object));
        }

        assert_eq!(list_sizes(&cache), (0, 0, 1));
        cache.integrity_check();
    }

    #[test]
    fn allocates_from_lowest_address_partial_slab() {
        let mut cache = cache_of(8);

        let objects = (0..32).map(|_| cache.alloc().unwrap()).collect::<Vec<_>>();
        assert_eq!(list_sizes(&cache), (4, 0, 0));

        // Make every slab partial.
        let mut freed = objects
            .chunks(8)
            .map(|chunk| chunk[3])
            .collect::<Vec<_>>();

        for object in &freed {
            assert!(cache.free(*object));
        }

        assert_eq!(list_sizes(&cache), (0, 4, 0));

        freed.sort_by_key(|object| object.addr());

        for expected in freed {
            assert_eq!(cache.alloc().unwrap(), expected);
        }

        assert_eq!(list_sizes(&cache), (4, 0, 0));
        cache.integrity_check();
    }

    #[test]
    fn free_of_foreign_pointer_changes_nothing() {
        let mut cache = cache_of(8);
        let object = cache.alloc().unwrap();

        let before = cache.read_stats();

        let mut foreign = 0_u64;
        assert!(!cache.free(NonNull::from(&mut foreign)));
        assert!(!cache.free_by_address(0));
        assert!(!cache.free_by_address(usize::MAX));
        assert!(!cache.free_by_address(object.addr().get() + 1));

        assert_eq!(cache.read_stats(), before);
        cache.integrity_check();
    }

    #[test]
    fn free_of_misaligned_pointer_is_rejected() {
        let mut cache = cache_of(8);
        let object = cache.alloc().unwrap();

        let misaligned = unsafe { object.cast::<u8>().add(1).cast::<u64>() };
        assert!(!cache.free(misaligned));

        assert_eq!(cache.read_stats().inuse_objects, 1);
    }

    #[test]
    fn double_free_from_full_slab_is_rejected() {
        let mut cache = cache_of(8);
        let objects = (0..8).map(|_| cache.alloc().unwrap()).collect::<Vec<_>>();

        assert!(cache.free(objects[0]));
        assert!(!cache.free(objects[0]));

        let stats = cache.read_stats();
        assert_eq!(stats.inuse_objects, 7);
        assert_eq!(stats.frees, 1);
        cache.integrity_check();
    }

    #[test]
    fn grower_receives_current_stats() {
        let seen = Arc::new(Mutex::new(Vec::new()));

        let mut cache = SlabCache::<u32>::builder()
            .objects_per_slab(8)
            .grower({
                let seen = Arc::clone(&seen);
                move |stats| {
                    seen.lock().unwrap().push(*stats);
                    1
                }
            })
            .build()
            .unwrap();

        for _ in 0..9 {
            _ = cache.alloc().unwrap();
        }

        let seen = seen.lock().unwrap();
        assert_eq!(seen.len(), 2);
        assert_eq!(seen[0].total_slabs, 0);
        assert_eq!(seen[1].total_slabs, 1);
        assert_eq!(seen[1].inuse_objects, 8);
        assert_eq!(seen[1].allocs, 8);
    }

    #[test]
    fn reaper_result_is_clamped() {
        let destructed = Arc::new(AtomicUsize::new(0));

        let mut cache = SlabCache::<u32>::builder()
            .objects_per_slab(8)
            .reaper(|_| 1000)
            .destructor({
                let destructed = Arc::clone(&destructed);
                move |_| {
                    destructed.fetch_add(1, Ordering::Relaxed);
                }
            })
            .build()
            .unwrap();

        let object = cache.alloc().unwrap();
        assert!(cache.free(object));

        assert_eq!(list_sizes(&cache), (0, 0, 0));
        assert_eq!(destructed.load(Ordering::Relaxed), 8);
        cache.integrity_check();
    }

    #[test]
    fn reaper_sees_updated_counters() {
        let seen = Arc::new(Mutex::new(None));

        let mut cache = SlabCache::<u32>::builder()
            .objects_per_slab(8)
            .reaper({
                let seen = Arc::clone(&seen);
                move |stats| {
                    *seen.lock().unwrap() = Some(*stats);
                    0
                }
            })
            .build()
            .unwrap();

        let object = cache.alloc().unwrap();
        assert!(cache.free(object));

        let stats = seen.lock().unwrap().unwrap();
        assert_eq!(stats.inuse_objects, 0);
        assert_eq!(stats.frees, 1);
        assert_eq!(stats.inuse_slabs, 0);
        assert_eq!(stats.total_slabs, 1);
    }

    #[test]
    fn destroy_then_reuse() {
        let mut cache = cache_of(8);

        for _ in 0..20 {
            _ = cache.alloc().unwrap();
        }

        cache.destroy();
        assert_eq!(cache.read_stats(), CacheStats::default());
        assert_eq!(list_sizes(&cache), (0, 0, 0));

        _ = cache.alloc().unwrap();
        assert_eq!(list_sizes(&cache), (0, 1, 0));
        assert_eq!(cache.read_stats().total_slabs, 1);
        cache.integrity_check();
    }

    #[test]
    fn drop_runs_destructor_on_all_slabs() {
        let destructed = Arc::new(AtomicUsize::new(0));

        let mut cache = SlabCache::<u32>::builder()
            .objects_per_slab(8)
            .destructor({
                let destructed = Arc::clone(&destructed);
                move |_| {
                    destructed.fetch_add(1, Ordering::Relaxed);
                }
            })
            .build()
            .unwrap();

        // 1 + 1 + 2 slabs under the default growth policy.
        for _ in 0..25 {
            _ = cache.alloc().unwrap();
        }

        assert_eq!(cache.read_stats().total_slabs, 4);

        drop(cache);

        assert_eq!(destructed.load(Ordering::Relaxed), 32);
    }

    #[test]
    #[should_panic]
    fn drop_in_use_with_forbidden_to_drop_policy_panics() {
        let mut cache = SlabCache::<u32>::builder()
            .drop_policy(DropPolicy::MustNotDropItems)
            .build()
            .unwrap();

        _ = cache.alloc().unwrap();
    }

    #[test]
    fn drop_idle_with_forbidden_to_drop_policy_ok() {
        let mut cache = SlabCache::<u32>::builder()
            .drop_policy(DropPolicy::MustNotDropItems)
            .build()
            .unwrap();

        let object = cache.alloc().unwrap();
        assert!(cache.free(object));

        drop(cache);
    }

    #[test]
    fn debug_output_names_object_type() {
        let cache = SlabCache::<u16>::new();
        let output = format!("{cache:?}");

        assert!(output.contains("u16"), "{output}");
        assert!(output.contains("objects_per_slab: 256"), "{output}");
    }

    #[test]
    #[should_panic]
    fn new_zst_is_panic() {
        drop(SlabCache::<()>::new());
    }

    /// Deterministic pseudo-random sequence for mixing operations.
    struct Lcg(u64);

    impl Lcg {
        fn next_below(&mut self, bound: usize) -> usize {
            self.0 = self
                .0
                .wrapping_mul(6_364_136_223_846_793_005)
                .wrapping_add(1_442_695_040_888_963_407);

            usize::try_from(self.0 >> 33).unwrap() % bound
        }
    }

    #[test]
    fn invariants_hold_under_random_operations() {
        let mut cache = SlabCache::<u64>::builder()
            .objects_per_slab(8)
            .reaper(|stats| usize::from(stats.total_slabs - stats.inuse_slabs > 1))
            .build()
            .unwrap();

        let mut random = Lcg(0x5eed);
        let mut live = Vec::new();
        let mut freed = Vec::new();

        for step in 0..5_000_u64 {
            match random.next_below(8) {
                0..=3 => {
                    let object = cache.alloc().unwrap();
                    unsafe { object.as_ptr().write(step) };
                    freed.retain(|address| *address != object.addr().get());
                    live.push(object);
                }
                4..=6 if !live.is_empty() => {
                    let object = live.swap_remove(random.next_below(live.len()));
                    assert!(cache.free(object));
                    freed.push(object.addr().get());
                }
                _ if !freed.is_empty() => {
                    let address = freed[random.next_below(freed.len())];
                    assert!(!cache.free_by_address(address));
                }
                _ => {}
            }

            cache.integrity_check();
            assert_eq!(cache.read_stats().inuse_objects, live.len());
        }

        for object in live {
            assert!(cache.free(object));
        }

        cache.integrity_check();
        assert_eq!(cache.read_stats().inuse_objects, 0);
    }

    #[test]
    fn multithreaded_via_mutex() {
        let cache = Arc::new(Mutex::new(cache_of(8)));

        let handles = (0..4)
            .map(|_| {
                let cache = Arc::clone(&cache);
                thread::spawn(move || {
                    (0..10)
                        .map(|_| cache.lock().unwrap().alloc().unwrap().addr().get())
                        .collect::<Vec<_>>()
                })
            })
            .collect::<Vec<_>>();

        let addresses = handles
            .into_iter()
            .flat_map(|handle| handle.join().unwrap())
            .collect::<Vec<_>>();

        let mut cache = cache.lock().unwrap();
        assert_eq!(cache.read_stats().inuse_objects, 40);

        for address in addresses {
            assert!(cache.free_by_address(address));
        }

        assert_eq!(cache.read_stats().inuse_objects, 0);
        cache.integrity_check();
    }
}
