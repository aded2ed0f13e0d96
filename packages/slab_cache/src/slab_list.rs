use crate::Slab;

/// A collection of slabs kept sorted ascending by base address, which lets us resolve an object
/// address to the slab that may contain it with a binary search.
///
/// Storage is a flat `Vec`, so insertion and removal shift the tail. Slab counts are expected to
/// stay modest, which makes this cheaper in practice than a tree.
#[derive(Debug)]
pub(crate) struct SlabList<T> {
    slabs: Vec<Slab<T>>,
}

impl<T> SlabList<T> {
    #[must_use]
    pub(crate) const fn new() -> Self {
        Self { slabs: Vec::new() }
    }

    #[must_use]
    pub(crate) fn len(&self) -> usize {
        self.slabs.len()
    }

    #[must_use]
    pub(crate) fn is_empty(&self) -> bool {
        self.slabs.is_empty()
    }

    /// Returns the index of the rightmost slab whose base address is not above `address`, or
    /// `None` if `address` precedes every slab.
    ///
    /// The returned slab does not necessarily contain `address` - the address may fall past its
    /// end. The slab itself is responsible for that check.
    #[must_use]
    pub(crate) fn find(&self, address: usize) -> Option<usize> {
        self.slabs
            .partition_point(|slab| slab.base_address() <= address)
            .checked_sub(1)
    }

    /// Inserts a slab at its address-ordered position and returns that position.
    pub(crate) fn insert(&mut self, slab: Slab<T>) -> usize {
        let index = self
            .find(slab.base_address())
            .map_or(0, |index| index.wrapping_add(1));

        self.slabs.insert(index, slab);
        index
    }

    /// # Panics
    ///
    /// Panics if the index is out of bounds.
    pub(crate) fn remove(&mut self, index: usize) -> Slab<T> {
        assert!(
            index < self.slabs.len(),
            "slab {index} index out of bounds in list of {} slabs",
            self.slabs.len()
        );

        self.slabs.remove(index)
    }

    /// Removes the slab with the highest address.
    pub(crate) fn pop_last(&mut self) -> Option<Slab<T>> {
        self.slabs.pop()
    }

    #[must_use]
    pub(crate) fn get_mut(&mut self, index: usize) -> Option<&mut Slab<T>> {
        self.slabs.get_mut(index)
    }

    #[must_use]
    pub(crate) fn first_mut(&mut self) -> Option<&mut Slab<T>> {
        self.slabs.first_mut()
    }

    #[cfg_attr(
        not(any(test, debug_assertions)),
        expect(dead_code, reason = "Used in cfg(debug_assertions) for integrity checks")
    )]
    pub(crate) fn iter(&self) -> impl Iterator<Item = &Slab<T>> {
        self.slabs.iter()
    }
}

#[cfg(test)]
#[allow(
    clippy::indexing_slicing,
    reason = "test code doesn't need the same safety rigor as production code"
)]
mod tests {
    use super::*;

    fn new_slabs(count: usize) -> Vec<Slab<u64>> {
        (0..count).map(|_| Slab::new(8, |_| {})).collect()
    }

    fn base_addresses(list: &SlabList<u64>) -> Vec<usize> {
        list.iter().map(Slab::base_address).collect()
    }

    #[test]
    fn insert_keeps_address_order() {
        let mut list = SlabList::new();

        for slab in new_slabs(10) {
            list.insert(slab);
        }

        assert_eq!(list.len(), 10);

        let addresses = base_addresses(&list);
        assert!(addresses.is_sorted(), "{addresses:x?} is not sorted");
    }

    #[test]
    fn insert_returns_position() {
        let mut list = SlabList::new();

        for slab in new_slabs(5) {
            let base_address = slab.base_address();
            let index = list.insert(slab);

            assert_eq!(base_addresses(&list)[index], base_address);
        }
    }

    #[test]
    fn find_resolves_addresses() {
        let mut list = SlabList::new();
        assert_eq!(list.find(12345), None);

        for slab in new_slabs(4) {
            list.insert(slab);
        }

        let addresses = base_addresses(&list);

        assert_eq!(list.find(addresses[0] - 1), None);

        for (index, address) in addresses.iter().enumerate() {
            assert_eq!(list.find(*address), Some(index));
            assert_eq!(list.find(*address + size_of::<u64>()), Some(index));
        }

        // Past the last slab we still get the last slab; containment is checked by the slab.
        assert_eq!(list.find(usize::MAX), Some(3));
        assert!(!list.get_mut(3).unwrap().contains(usize::MAX));
    }

    #[test]
    fn remove_preserves_order() {
        let mut list = SlabList::new();

        for slab in new_slabs(5) {
            list.insert(slab);
        }

        let before = base_addresses(&list);

        let removed = list.remove(2);
        assert_eq!(removed.base_address(), before[2]);

        let after = base_addresses(&list);
        assert_eq!(after, [before[0], before[1], before[3], before[4]]);
    }

    #[test]
    fn pop_last_takes_highest_address() {
        let mut list = SlabList::new();
        assert!(list.pop_last().is_none());

        for slab in new_slabs(3) {
            list.insert(slab);
        }

        let highest = *base_addresses(&list).iter().max().unwrap();
        assert_eq!(list.pop_last().unwrap().base_address(), highest);
        assert_eq!(list.len(), 2);
    }

    #[test]
    #[should_panic]
    fn remove_out_of_bounds_panics() {
        let mut list = SlabList::<u64>::new();
        drop(list.remove(0));
    }
}
