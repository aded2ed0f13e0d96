/// A point-in-time snapshot of the state of a [`SlabCache`][crate::SlabCache].
///
/// Obtained from [`SlabCache::read_stats()`][crate::SlabCache::read_stats] and also passed to
/// the growth and reap policies so they can decide how much capacity to add or release.
///
/// # Examples
///
/// ```
/// use slab_cache::SlabCache;
///
/// let mut cache = SlabCache::<u64>::builder()
///     .objects_per_slab(32)
///     .build()
///     .unwrap();
///
/// let object = cache.alloc().unwrap();
///
/// let stats = cache.read_stats();
/// assert_eq!(stats.total_slabs, 1);
/// assert_eq!(stats.inuse_slabs, 1);
/// assert_eq!(stats.total_objects, 32);
/// assert_eq!(stats.inuse_objects, 1);
/// assert_eq!(stats.cache_size_bytes, 32 * 8);
/// assert_eq!(stats.cache_size_inuse_bytes, 8);
/// # assert!(cache.free(object));
/// ```
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
#[non_exhaustive]
pub struct CacheStats {
    /// Number of slabs owned by the cache.
    pub total_slabs: usize,

    /// Number of slabs with at least one object in use.
    pub inuse_slabs: usize,

    /// Number of objects across all slabs, in use or not.
    pub total_objects: usize,

    /// Number of objects currently handed out.
    pub inuse_objects: usize,

    /// Number of successful allocations since the cache was created or last destroyed.
    pub allocs: u64,

    /// Number of successful frees since the cache was created or last destroyed.
    pub frees: u64,

    /// Bytes occupied by all objects of the cache.
    pub cache_size_bytes: u64,

    /// Bytes occupied by the objects currently in use.
    pub cache_size_inuse_bytes: u64,
}

impl CacheStats {
    /// Number of objects that can be allocated without growing the cache.
    #[must_use]
    pub fn free_objects(&self) -> usize {
        self.total_objects.saturating_sub(self.inuse_objects)
    }

    /// Fraction of objects currently in use, from 0.0 to 1.0.
    ///
    /// A cache without any slabs reports 0.0.
    #[must_use]
    #[expect(
        clippy::cast_precision_loss,
        reason = "an approximate ratio is all we promise"
    )]
    pub fn utilization(&self) -> f64 {
        if self.total_objects == 0 {
            return 0.0;
        }

        self.inuse_objects as f64 / self.total_objects as f64
    }
}

#[cfg(test)]
mod tests {
    use static_assertions::assert_impl_all;

    use super::*;

    assert_impl_all!(CacheStats: Send, Sync, Copy);

    #[test]
    fn default_is_all_zero() {
        let stats = CacheStats::default();

        assert_eq!(stats.free_objects(), 0);
        assert!(stats.utilization().abs() < f64::EPSILON);
    }

    #[test]
    fn derived_values() {
        let stats = CacheStats {
            total_slabs: 2,
            inuse_slabs: 1,
            total_objects: 16,
            inuse_objects: 4,
            ..CacheStats::default()
        };

        assert_eq!(stats.free_objects(), 12);
        assert!((stats.utilization() - 0.25).abs() < f64::EPSILON);
    }
}
