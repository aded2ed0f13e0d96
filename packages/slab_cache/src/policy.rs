//! Policies that parameterize how a cache grows, shrinks and prepares its objects.

use crate::CacheStats;

/// Decides how many slabs to add when a cache has no free object left.
///
/// Called with a snapshot of the cache state. Returning zero makes the pending allocation
/// fail instead of growing the cache.
pub type Grower = Box<dyn FnMut(&CacheStats) -> usize + Send>;

/// Decides how many fully-free slabs to release after a slab becomes fully free.
///
/// Called with a snapshot of the cache state. The result is clamped to the number of
/// fully-free slabs the cache holds.
pub type Reaper = Box<dyn FnMut(&CacheStats) -> usize + Send>;

/// Prepares an object when the slab that holds it is created.
pub type Constructor<T> = Box<dyn FnMut(&mut T) + Send>;

/// Tears down an object when the slab that holds it is released.
pub type Destructor<T> = Box<dyn FnMut(&mut T) + Send>;

/// Slab count below which [`default_grower()`] doubles the cache.
const DOUBLING_LIMIT: usize = 32;

/// The growth policy used when none is specified.
///
/// An empty cache grows by one slab. Below 32 slabs the cache doubles, after which it grows
/// by a quarter of its current slab count.
///
/// # Examples
///
/// ```
/// use slab_cache::{CacheStats, default_grower};
///
/// let mut stats = CacheStats::default();
/// assert_eq!(default_grower(&stats), 1);
///
/// stats.total_slabs = 4;
/// assert_eq!(default_grower(&stats), 4);
///
/// stats.total_slabs = 64;
/// assert_eq!(default_grower(&stats), 16);
/// ```
#[must_use]
pub fn default_grower(stats: &CacheStats) -> usize {
    match stats.total_slabs {
        0 => 1,
        slabs if slabs < DOUBLING_LIMIT => slabs,
        slabs => slabs.div_euclid(4),
    }
}

/// The reap policy used when none is specified: fully-free slabs are kept for reuse.
///
/// Memory held by such slabs can still be released explicitly via
/// [`SlabCache::shrink_to_fit()`][crate::SlabCache::shrink_to_fit].
#[must_use]
pub fn never_reap(_stats: &CacheStats) -> usize {
    0
}

#[cfg(test)]
mod tests {
    use super::*;

    fn with_slabs(total_slabs: usize) -> CacheStats {
        CacheStats {
            total_slabs,
            ..CacheStats::default()
        }
    }

    #[test]
    fn default_grower_starts_with_one() {
        assert_eq!(default_grower(&with_slabs(0)), 1);
    }

    #[test]
    fn default_grower_doubles_below_limit() {
        for slabs in 1..32 {
            assert_eq!(default_grower(&with_slabs(slabs)), slabs);
        }
    }

    #[test]
    fn default_grower_adds_quarter_at_limit() {
        assert_eq!(default_grower(&with_slabs(32)), 8);
        assert_eq!(default_grower(&with_slabs(33)), 8);
        assert_eq!(default_grower(&with_slabs(100)), 25);
    }

    #[test]
    fn never_reap_is_zero() {
        assert_eq!(never_reap(&with_slabs(0)), 0);
        assert_eq!(never_reap(&with_slabs(1000)), 0);
    }
}
