use std::alloc::Layout;
use std::any::type_name;

use crate::{
    CacheStats, Constructor, Destructor, DropPolicy, Error, Grower, Reaper, Result, SlabCache,
    default_grower, never_reap,
};

/// Number of objects in each slab unless specified otherwise.
pub(crate) const DEFAULT_OBJECTS_PER_SLAB: usize = 256;

/// Builder for creating an instance of [`SlabCache`].
///
/// You only need to use this builder if you want to customize the cache configuration.
/// The default configuration used by [`SlabCache::new()`][1] grows geometrically, never
/// releases fully-free slabs and does not run any per-object callbacks.
///
/// # Examples
///
/// ```
/// use slab_cache::SlabCache;
///
/// let mut cache = SlabCache::<Vec<u8>>::builder()
///     .objects_per_slab(64)
///     .grower(|stats| if stats.total_slabs < 4 { 1 } else { 0 })
///     .reaper(|_| 1)
///     .constructor(|buffer| buffer.reserve(1024))
///     .destructor(|buffer| buffer.clear())
///     .build()
///     .unwrap();
///
/// assert_eq!(cache.objects_per_slab(), 64);
/// ```
///
/// [1]: SlabCache::new
#[must_use]
pub struct SlabCacheBuilder<T> {
    objects_per_slab: usize,
    grower: Grower,
    reaper: Reaper,
    constructor: Option<Constructor<T>>,
    destructor: Option<Destructor<T>>,
    drop_policy: DropPolicy,
}

impl<T> std::fmt::Debug for SlabCacheBuilder<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SlabCacheBuilder")
            .field("object_type", &std::format_args!("{}", type_name::<T>()))
            .field("objects_per_slab", &self.objects_per_slab)
            .field("has_constructor", &self.constructor.is_some())
            .field("has_destructor", &self.destructor.is_some())
            .field("drop_policy", &self.drop_policy)
            .finish_non_exhaustive()
    }
}

impl<T> SlabCacheBuilder<T> {
    pub(crate) fn new() -> Self {
        Self {
            objects_per_slab: DEFAULT_OBJECTS_PER_SLAB,
            grower: Box::new(default_grower),
            reaper: Box::new(never_reap),
            constructor: None,
            destructor: None,
            drop_policy: DropPolicy::default(),
        }
    }

    /// Sets the number of objects in each slab. Rounded up to a multiple of 8.
    ///
    /// # Examples
    ///
    /// ```
    /// use slab_cache::SlabCache;
    ///
    /// let cache = SlabCache::<u32>::builder()
    ///     .objects_per_slab(20)
    ///     .build()
    ///     .unwrap();
    ///
    /// assert_eq!(cache.objects_per_slab(), 24);
    /// ```
    pub fn objects_per_slab(mut self, count: usize) -> Self {
        self.objects_per_slab = count;
        self
    }

    /// Sets the growth policy, called when an allocation finds no free object. It returns
    /// the number of slabs to add; zero makes the allocation fail.
    ///
    /// Defaults to [`default_grower()`].
    ///
    /// # Examples
    ///
    /// ```
    /// use slab_cache::SlabCache;
    ///
    /// // A bounded cache of at most two slabs.
    /// let mut cache = SlabCache::<u32>::builder()
    ///     .objects_per_slab(8)
    ///     .grower(|stats| usize::from(stats.total_slabs < 2))
    ///     .build()
    ///     .unwrap();
    ///
    /// for _ in 0..16 {
    ///     assert!(cache.alloc().is_some());
    /// }
    ///
    /// assert!(cache.alloc().is_none());
    /// ```
    pub fn grower(mut self, grower: impl FnMut(&CacheStats) -> usize + Send + 'static) -> Self {
        self.grower = Box::new(grower);
        self
    }

    /// Sets the reap policy, called when a slab becomes fully free. It returns the number of
    /// fully-free slabs to release.
    ///
    /// Defaults to [`never_reap()`].
    pub fn reaper(mut self, reaper: impl FnMut(&CacheStats) -> usize + Send + 'static) -> Self {
        self.reaper = Box::new(reaper);
        self
    }

    /// Sets a callback that prepares each object when its slab is created.
    ///
    /// Objects start out as `T::default()` before the callback sees them. The callback runs
    /// once per object per slab, not on every allocation.
    pub fn constructor(mut self, constructor: impl FnMut(&mut T) + Send + 'static) -> Self {
        self.constructor = Some(Box::new(constructor));
        self
    }

    /// Sets a callback that tears down each object when its slab is released, whether by the
    /// reap policy, [`SlabCache::shrink_to_fit()`], [`SlabCache::destroy()`] or drop.
    pub fn destructor(mut self, destructor: impl FnMut(&mut T) + Send + 'static) -> Self {
        self.destructor = Some(Box::new(destructor));
        self
    }

    /// Sets the [drop policy][DropPolicy] for the cache. This governs how
    /// to treat objects still in use when the cache is dropped.
    pub fn drop_policy(mut self, policy: DropPolicy) -> Self {
        self.drop_policy = policy;
        self
    }

    /// Builds the slab cache with the specified configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if `T` is zero-sized, or if the number of objects per slab is zero
    /// or so large that a slab would not fit in memory.
    ///
    /// # Examples
    ///
    /// ```
    /// use slab_cache::{Error, SlabCache};
    ///
    /// assert!(SlabCache::<u32>::builder().build().is_ok());
    ///
    /// assert!(matches!(
    ///     SlabCache::<()>::builder().build(),
    ///     Err(Error::ZeroSizedObject { .. })
    /// ));
    /// ```
    pub fn build(self) -> Result<SlabCache<T>> {
        if size_of::<T>() == 0 {
            return Err(Error::ZeroSizedObject {
                type_name: type_name::<T>(),
            });
        }

        let requested = self.objects_per_slab;

        if requested == 0 {
            return Err(Error::InvalidObjectsPerSlab {
                requested,
                problem: "a slab must hold at least one object",
            });
        }

        let Some(objects_per_slab) = requested.checked_next_multiple_of(8) else {
            return Err(Error::InvalidObjectsPerSlab {
                requested,
                problem: "rounding up to a multiple of 8 overflows",
            });
        };

        if Layout::array::<T>(objects_per_slab).is_err() {
            return Err(Error::InvalidObjectsPerSlab {
                requested,
                problem: "a slab of this size does not fit in memory",
            });
        }

        Ok(SlabCache::new_inner(
            objects_per_slab,
            self.grower,
            self.reaper,
            self.constructor,
            self.destructor,
            self.drop_policy,
        ))
    }
}

#[cfg(test)]
mod tests {
    use static_assertions::assert_impl_all;

    use super::*;

    assert_impl_all!(SlabCacheBuilder<u32>: Send);

    #[test]
    fn defaults() {
        let cache = SlabCacheBuilder::<u64>::new().build().unwrap();

        assert_eq!(cache.objects_per_slab(), DEFAULT_OBJECTS_PER_SLAB);
        assert_eq!(cache.object_layout(), Layout::new::<u64>());
    }

    #[test]
    fn rounds_up_to_multiple_of_8() {
        for (requested, expected) in [(1, 8), (8, 8), (9, 16), (31, 32), (32, 32), (33, 40)] {
            let cache = SlabCacheBuilder::<u8>::new()
                .objects_per_slab(requested)
                .build()
                .unwrap();

            assert_eq!(cache.objects_per_slab(), expected, "requested {requested}");
        }
    }

    #[test]
    fn zero_objects_per_slab_is_error() {
        let result = SlabCacheBuilder::<u8>::new().objects_per_slab(0).build();

        assert!(matches!(
            result,
            Err(Error::InvalidObjectsPerSlab { requested: 0, .. })
        ));
    }

    #[test]
    fn overflowing_objects_per_slab_is_error() {
        let result = SlabCacheBuilder::<u8>::new()
            .objects_per_slab(usize::MAX)
            .build();
        assert!(matches!(result, Err(Error::InvalidObjectsPerSlab { .. })));

        let result = SlabCacheBuilder::<u64>::new()
            .objects_per_slab(usize::MAX / 8)
            .build();
        assert!(matches!(result, Err(Error::InvalidObjectsPerSlab { .. })));
    }

    #[test]
    fn zst_is_error() {
        let result = SlabCacheBuilder::<()>::new().build();

        assert!(matches!(
            result,
            Err(Error::ZeroSizedObject { type_name: "()" })
        ));
    }

    #[test]
    fn debug_names_object_type() {
        let builder = SlabCacheBuilder::<u16>::new().constructor(|_| {});
        let output = format!("{builder:?}");

        assert!(output.contains("u16"), "{output}");
        assert!(output.contains("has_constructor: true"), "{output}");
    }
}
