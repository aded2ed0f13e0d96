use std::alloc::{Layout, alloc, dealloc};
use std::any::type_name;
use std::mem;
use std::ptr::{self, NonNull};

use num_integer::Integer;

use crate::first_zero_bit;

/// A fixed-capacity block of objects of type `T` plus a bitmap that tracks which of them are
/// handed out to callers.
///
/// Every slot holds a live, constructed `T` for the entire lifetime of the slab. Allocating and
/// freeing only flips the bitmap; objects are not dropped or recreated in between, which is what
/// makes recycling them cheap.
///
/// The objects live in a single heap block that never moves, so the address range of a slab is
/// fixed from creation until the slab is dropped. The slab never creates lasting references to
/// its objects, so callers may access allocated objects through the pointers returned by
/// [`alloc()`][Self::alloc] while the slab is being mutated elsewhere.
#[derive(Debug)]
pub(crate) struct Slab<T> {
    first_object_ptr: NonNull<T>,

    capacity: usize,

    /// Number of objects currently handed out.
    inuse: usize,

    /// Lowest slot index known to be free. Points one past the end (`capacity`) when the slab
    /// is full. This is a cache over the bitmap, which remains the source of truth.
    first_free_hint: usize,

    /// Address of the first object.
    base_address: usize,

    /// Address of the last object (inclusive).
    end_address: usize,

    /// One bit per slot, 1 = in use, 0 = free.
    bitmap: Box<[u8]>,
}

impl<T> Slab<T> {
    /// Creates a slab of `capacity` default-initialized objects and calls `constructor` on each
    /// of them in slot order.
    ///
    /// # Panics
    ///
    /// Panics if `capacity` is zero or not a multiple of 8, or if `T` is zero-sized.
    #[must_use]
    pub(crate) fn new(capacity: usize, mut constructor: impl FnMut(&mut T)) -> Self
    where
        T: Default,
    {
        assert!(
            capacity > 0 && capacity.div_rem(&8).1 == 0,
            "slab of {} must have a non-zero capacity that is a multiple of 8, got {capacity}",
            type_name::<T>()
        );
        assert!(
            size_of::<T>() > 0,
            "slab of {} must have non-zero object size",
            type_name::<T>()
        );

        let layout = Self::layout(capacity);

        // SAFETY: The layout is valid for an array of T and not zero-sized (guarded above).
        let first_object_ptr = NonNull::new(unsafe { alloc(layout).cast::<T>() }).expect(
            "we do not intend to handle allocation failure as a real possibility - OOM is panic",
        );

        // Owns the block until every slot is initialized, so a panicking `T::default()` drops
        // the objects written so far and releases the block.
        let mut block = PartialBlock {
            first_object_ptr,
            initialized: 0,
            layout,
        };

        while block.initialized < capacity {
            // SAFETY: The block was allocated for `capacity` objects and index is in bounds.
            let object_ptr = unsafe { first_object_ptr.add(block.initialized) };

            // SAFETY: The pointer is valid for writes, aligned and of the right type.
            unsafe {
                object_ptr.as_ptr().write(T::default());
            }

            // Cannot overflow because it is bounded by capacity.
            block.initialized = block.initialized.wrapping_add(1);
        }

        mem::forget(block);

        let base_address = first_object_ptr.addr().get();

        // Cannot overflow because the whole block fits in the address space.
        let end_address = base_address.wrapping_add(
            size_of::<T>().wrapping_mul(capacity.wrapping_sub(1)),
        );

        // From here on the slab owns the objects, so a panicking constructor cleans up via Drop.
        let mut slab = Self {
            first_object_ptr,
            capacity,
            inuse: 0,
            first_free_hint: 0,
            base_address,
            end_address,
            bitmap: vec![0_u8; capacity.div_rem(&8).0].into_boxed_slice(),
        };

        for index in 0..capacity {
            constructor(slab.object_mut(index));
        }

        slab
    }

    #[must_use]
    fn layout(capacity: usize) -> Layout {
        Layout::array::<T>(capacity).expect("slab layout was validated when the cache was built")
    }

    #[must_use]
    #[cfg_attr(
        not(any(test, debug_assertions)),
        expect(dead_code, reason = "Used in cfg(debug_assertions) for integrity checks")
    )]
    pub(crate) fn len(&self) -> usize {
        self.inuse
    }

    #[must_use]
    pub(crate) fn is_empty(&self) -> bool {
        self.inuse == 0
    }

    #[must_use]
    pub(crate) fn is_full(&self) -> bool {
        self.inuse == self.capacity
    }

    #[must_use]
    pub(crate) fn base_address(&self) -> usize {
        self.base_address
    }

    #[must_use]
    #[cfg_attr(
        not(any(test, debug_assertions)),
        expect(dead_code, reason = "Used in cfg(debug_assertions) for integrity checks")
    )]
    pub(crate) fn end_address(&self) -> usize {
        self.end_address
    }

    #[must_use]
    pub(crate) fn contains(&self, address: usize) -> bool {
        (self.base_address..=self.end_address).contains(&address)
    }

    fn object_ptr(&self, index: usize) -> NonNull<T> {
        assert!(
            index < self.capacity,
            "object {index} index out of bounds in slab of {}",
            type_name::<T>()
        );

        // SAFETY: Guarded by bounds check above, so we are guaranteed that the pointer is valid.
        unsafe { self.first_object_ptr.add(index) }
    }

    #[expect(clippy::needless_pass_by_ref_mut, reason = "false positive")]
    fn object_mut(&mut self, index: usize) -> &mut T {
        let mut object_ptr = self.object_ptr(index);

        // SAFETY: Every slot holds an initialized object from the ctor until drop, and we hold
        // an exclusive reference to the slab.
        unsafe { object_ptr.as_mut() }
    }

    /// Marks the slot at the free hint as used and returns a pointer to its object.
    ///
    /// # Panics
    ///
    /// Panics if the slab is full.
    #[must_use]
    pub(crate) fn alloc(&mut self) -> NonNull<T> {
        assert!(
            !self.is_full(),
            "cannot allocate from a full slab of {}",
            type_name::<T>()
        );

        let index = self.first_free_hint;
        let (byte_index, mask) = bit_position(index);

        let bits = self
            .bitmap
            .get_mut(byte_index)
            .expect("free hint is in bounds while the slab is not full");

        assert!(
            *bits & mask == 0,
            "free hint {index} points to an allocated object in slab of {}",
            type_name::<T>()
        );

        *bits |= mask;

        // Cannot overflow because the slab was not full.
        self.inuse = self.inuse.wrapping_add(1);
        self.first_free_hint = self.find_free_index(byte_index);

        #[cfg(debug_assertions)]
        self.integrity_check();

        self.object_ptr(index)
    }

    /// Finds the lowest free slot, scanning from `start_byte` to the end of the bitmap and then
    /// wrapping around to the start. Returns `capacity` if there is no free slot.
    #[must_use]
    fn find_free_index(&self, start_byte: usize) -> usize {
        if self.is_full() {
            return self.capacity;
        }

        let (before, after) = self.bitmap.split_at(start_byte);

        after
            .iter()
            .enumerate()
            .map(|(offset, bits)| (start_byte.wrapping_add(offset), bits))
            .chain(before.iter().enumerate())
            .find_map(|(byte_index, bits)| {
                first_zero_bit(*bits).map(|bit| {
                    // Cannot overflow because the result is bounded by capacity.
                    byte_index.wrapping_mul(8).wrapping_add(bit as usize)
                })
            })
            .unwrap_or(self.capacity)
    }

    /// Resolves an address to the slot index of the object that starts at it.
    ///
    /// Returns `None` for addresses outside the slab or pointing into the middle of an object.
    #[must_use]
    pub(crate) fn index_of(&self, address: usize) -> Option<usize> {
        if !self.contains(address) {
            return None;
        }

        // Cannot underflow because we checked containment above.
        let offset = address.wrapping_sub(self.base_address);
        let (index, remainder) = offset.div_rem(&size_of::<T>());

        (remainder == 0).then_some(index)
    }

    /// Returns the object starting at `address` to the slab.
    ///
    /// Returns `false` without changing any state if the address does not identify an object
    /// of this slab or if the object is not currently allocated (double free).
    #[must_use]
    pub(crate) fn free(&mut self, address: usize) -> bool {
        let Some(index) = self.index_of(address) else {
            return false;
        };

        let (byte_index, mask) = bit_position(index);

        let bits = self
            .bitmap
            .get_mut(byte_index)
            .expect("index_of only returns in-bounds indexes");

        if *bits & mask == 0 {
            return false;
        }

        *bits &= !mask;

        self.inuse = self
            .inuse
            .checked_sub(1)
            .expect("the object bit was set so inuse must be non-zero");

        if index < self.first_free_hint {
            self.first_free_hint = index;
        }

        #[cfg(debug_assertions)]
        self.integrity_check();

        true
    }

    /// Calls `destructor` on every object in slot order and then drops the slab.
    pub(crate) fn destroy(mut self, mut destructor: impl FnMut(&mut T)) {
        for index in 0..self.capacity {
            destructor(self.object_mut(index));
        }
    }

    #[cfg_attr(test, mutants::skip)] // This is essentially test logic, mutation is meaningless.
    #[cfg(any(test, debug_assertions))]
    pub(crate) fn integrity_check(&self) {
        let observed_inuse: usize = self
            .bitmap
            .iter()
            .map(|bits| bits.count_ones() as usize)
            .sum();

        assert_eq!(
            self.inuse,
            observed_inuse,
            "self.inuse does not match the bitmap in slab of {}",
            type_name::<T>()
        );

        let lowest_free = (0..self.capacity).find(|&index| {
            let (byte_index, mask) = bit_position(index);
            self.bitmap
                .get(byte_index)
                .is_some_and(|bits| bits & mask == 0)
        });

        match lowest_free {
            Some(lowest_free) => assert!(
                self.first_free_hint <= lowest_free,
                "free hint {} is above the lowest free slot {lowest_free} in slab of {}",
                self.first_free_hint,
                type_name::<T>()
            ),
            None => assert_eq!(
                self.first_free_hint,
                self.capacity,
                "full slab of {} must have an out of bounds free hint",
                type_name::<T>()
            ),
        }
    }
}

impl<T> Drop for Slab<T> {
    fn drop(&mut self) {
        // SAFETY: Every slot holds an initialized object, and nothing reads them after this.
        unsafe {
            ptr::drop_in_place(ptr::slice_from_raw_parts_mut(
                self.first_object_ptr.as_ptr(),
                self.capacity,
            ));
        }

        // SAFETY: The layout must match between alloc and dealloc. It does.
        unsafe {
            dealloc(
                self.first_object_ptr.as_ptr().cast(),
                Self::layout(self.capacity),
            );
        }
    }
}

/// A freshly allocated slab block whose first `initialized` slots hold live objects.
struct PartialBlock<T> {
    first_object_ptr: NonNull<T>,
    initialized: usize,
    layout: Layout,
}

impl<T> Drop for PartialBlock<T> {
    fn drop(&mut self) {
        // SAFETY: Exactly the first `initialized` slots were written and nothing else owns them.
        unsafe {
            ptr::drop_in_place(ptr::slice_from_raw_parts_mut(
                self.first_object_ptr.as_ptr(),
                self.initialized,
            ));
        }

        // SAFETY: The block was allocated with this layout.
        unsafe {
            dealloc(self.first_object_ptr.as_ptr().cast(), self.layout);
        }
    }
}

// SAFETY: Yes, there are raw pointers involved here but nothing inherently non-thread-mobile
// about it, so as long as T itself can move between threads, the slab can do so, too.
unsafe impl<T: Send> Send for Slab<T> {}

/// Returns the bitmap byte index and bit mask for a slot index.
#[must_use]
fn bit_position(index: usize) -> (usize, u8) {
    let (byte_index, bit) = index.div_rem(&8);
    (byte_index, 1 << bit)
}

#[cfg(test)]
#[allow(
    clippy::undocumented_unsafe_blocks,
    clippy::indexing_slicing,
    reason = "test code doesn't need the same safety rigor as production code"
)]
mod tests {
    use std::panic;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;

    fn new_slab<T: Default>(capacity: usize) -> Slab<T> {
        Slab::new(capacity, |_| {})
    }

    #[test]
    fn smoke_test() {
        let mut slab = new_slab::<u64>(8);

        let a = slab.alloc();
        let b = slab.alloc();
        let c = slab.alloc();

        assert_eq!(slab.len(), 3);
        assert_eq!(a.addr().get(), slab.base_address());
        assert_eq!(b.addr().get(), slab.base_address() + size_of::<u64>());
        assert_eq!(c.addr().get(), slab.base_address() + 2 * size_of::<u64>());

        unsafe {
            *a.as_ptr() = 42;
            *c.as_ptr() = 44;
        }

        assert!(slab.free(b.addr().get()));
        assert_eq!(slab.len(), 2);

        // The freed slot is the lowest free one, so it is handed out next.
        let d = slab.alloc();
        assert_eq!(d, b);

        unsafe {
            assert_eq!(*a.as_ptr(), 42);
            assert_eq!(*c.as_ptr(), 44);
        }

        slab.integrity_check();
    }

    #[test]
    fn objects_are_default_initialized() {
        let mut slab = new_slab::<String>(8);

        let object = slab.alloc();
        assert_eq!(unsafe { object.as_ref() }, "");
    }

    #[test]
    fn address_range_covers_all_objects() {
        let slab = new_slab::<u32>(16);

        assert_eq!(slab.capacity, 16);
        assert_eq!(
            slab.end_address() - slab.base_address(),
            15 * size_of::<u32>()
        );
        assert!(slab.contains(slab.base_address()));
        assert!(slab.contains(slab.end_address()));
        assert!(!slab.contains(slab.end_address() + 1));
        assert!(!slab.contains(slab.base_address() - 1));
    }

    #[test]
    fn fills_up_in_index_order() {
        let mut slab = new_slab::<u16>(16);

        for index in 0..16 {
            let object = slab.alloc();
            assert_eq!(slab.index_of(object.addr().get()), Some(index));
        }

        assert!(slab.is_full());
        assert_eq!(slab.first_free_hint, 16);
        slab.integrity_check();
    }

    #[test]
    #[should_panic]
    fn panic_when_full() {
        let mut slab = new_slab::<u32>(8);

        for _ in 0..9 {
            _ = slab.alloc();
        }
    }

    #[test]
    fn reuses_interior_free_after_full() {
        let mut slab = new_slab::<u32>(24);

        let objects = (0..24).map(|_| slab.alloc()).collect::<Vec<_>>();

        // Free slots in different bitmap bytes, highest first.
        assert!(slab.free(objects[20].addr().get()));
        assert!(slab.free(objects[9].addr().get()));
        assert!(slab.free(objects[3].addr().get()));
        slab.integrity_check();

        assert_eq!(slab.alloc(), objects[3]);
        assert_eq!(slab.alloc(), objects[9]);
        assert_eq!(slab.alloc(), objects[20]);
        assert!(slab.is_full());
        slab.integrity_check();
    }

    #[test]
    fn double_free_is_rejected() {
        let mut slab = new_slab::<u32>(8);

        let a = slab.alloc();
        let b = slab.alloc();

        assert!(slab.free(a.addr().get()));
        assert!(!slab.free(a.addr().get()));

        assert_eq!(slab.len(), 1);
        assert!(slab.free(b.addr().get()));
        assert!(slab.is_empty());
        slab.integrity_check();
    }

    #[test]
    fn free_of_never_allocated_slot_is_rejected() {
        let mut slab = new_slab::<u32>(8);
        _ = slab.alloc();

        let never_allocated = slab.base_address() + 5 * size_of::<u32>();
        assert!(!slab.free(never_allocated));
        assert_eq!(slab.len(), 1);
    }

    #[test]
    fn misaligned_address_is_rejected() {
        let mut slab = new_slab::<u64>(8);
        let object = slab.alloc();

        assert!(!slab.free(object.addr().get() + 1));
        assert_eq!(slab.index_of(object.addr().get() + 3), None);
        assert_eq!(slab.len(), 1);
    }

    #[test]
    fn out_of_range_address_is_rejected() {
        let mut slab = new_slab::<u64>(8);
        _ = slab.alloc();

        assert!(!slab.free(slab.base_address() - size_of::<u64>()));
        assert!(!slab.free(slab.end_address() + size_of::<u64>()));
        assert_eq!(slab.len(), 1);
    }

    #[test]
    fn constructor_and_destructor_visit_every_slot() {
        let constructed = Arc::new(AtomicUsize::new(0));
        let destructed = Arc::new(AtomicUsize::new(0));

        let slab = Slab::<usize>::new(16, {
            let constructed = Arc::clone(&constructed);
            move |object| {
                *object = constructed.fetch_add(1, Ordering::Relaxed);
            }
        });

        assert_eq!(constructed.load(Ordering::Relaxed), 16);

        let mut visited = Vec::new();
        slab.destroy(|object| {
            visited.push(*object);
            destructed.fetch_add(1, Ordering::Relaxed);
        });

        assert_eq!(destructed.load(Ordering::Relaxed), 16);

        // The destructor sees the objects in slot order, as the constructor left them.
        assert_eq!(visited, (0..16).collect::<Vec<_>>());
    }

    #[test]
    fn drops_objects_with_slab() {
        struct Droppable {
            dropped: Arc<AtomicUsize>,
        }

        impl Default for Droppable {
            fn default() -> Self {
                Self {
                    dropped: Arc::new(AtomicUsize::new(0)),
                }
            }
        }

        impl Drop for Droppable {
            fn drop(&mut self) {
                self.dropped.fetch_add(1, Ordering::Relaxed);
            }
        }

        let dropped = Arc::new(AtomicUsize::new(0));

        let slab = Slab::<Droppable>::new(8, |object| {
            object.dropped = Arc::clone(&dropped);
        });

        // The replaced default counters were dropped without touching the shared one.
        assert_eq!(dropped.load(Ordering::Relaxed), 0);

        drop(slab);

        assert_eq!(dropped.load(Ordering::Relaxed), 8);
    }

    #[test]
    fn panicking_default_drops_initialized_objects() {
        static CREATED: AtomicUsize = AtomicUsize::new(0);
        static DROPPED: AtomicUsize = AtomicUsize::new(0);

        #[derive(Debug)]
        struct FailsOnFifth {
            index: usize,
        }

        impl Default for FailsOnFifth {
            fn default() -> Self {
                let index = CREATED.fetch_add(1, Ordering::Relaxed);
                assert!(index < 4, "the fifth object cannot be created");
                Self { index }
            }
        }

        impl Drop for FailsOnFifth {
            fn drop(&mut self) {
                assert!(self.index < 4);
                DROPPED.fetch_add(1, Ordering::Relaxed);
            }
        }

        _ = panic::catch_unwind(|| Slab::<FailsOnFifth>::new(8, |_| {}))
            .expect_err("creating the fifth object panics");

        assert_eq!(CREATED.load(Ordering::Relaxed), 5);
        assert_eq!(DROPPED.load(Ordering::Relaxed), 4);
    }

    #[test]
    #[should_panic]
    fn zst_is_panic() {
        drop(new_slab::<()>(8));
    }

    #[test]
    #[should_panic]
    fn capacity_not_multiple_of_8_is_panic() {
        drop(new_slab::<u32>(12));
    }
}
