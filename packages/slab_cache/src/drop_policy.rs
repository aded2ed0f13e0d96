/// Determines what happens to objects still in use when the cache is dropped.
///
/// Either way, every slab is released on drop and the destructor runs on every object.
///
/// # Examples
///
/// ```
/// use slab_cache::{DropPolicy, SlabCache};
///
/// let cache = SlabCache::<u32>::builder()
///     .drop_policy(DropPolicy::MustNotDropItems)
///     .build()
///     .unwrap();
/// ```
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
#[non_exhaustive]
pub enum DropPolicy {
    /// The cache releases in-use objects along with the free ones. This is the default.
    #[default]
    MayDropItems,

    /// The cache will panic if objects are still in use when it is dropped.
    ///
    /// This may be valuable if callers keep pointers to allocated objects in unsafe code and
    /// must return every object before the cache goes away.
    MustNotDropItems,
}
