/// Maps a bitmap byte to the index of its lowest zero bit, i.e. the number of trailing ones.
///
/// A byte with all bits set maps to 8, which is out of range for a bit index and means the
/// byte has no free slot. The table is computed at compile time and never mutated, so all
/// caches share it without synchronization.
pub(crate) const NTZ_TABLE: [u8; 256] = build_ntz_table();

#[allow(
    clippy::indexing_slicing,
    clippy::cast_possible_truncation,
    clippy::arithmetic_side_effects,
    reason = "const fn over a fixed 0..256 range, every index and value is in bounds"
)]
const fn build_ntz_table() -> [u8; 256] {
    let mut table = [0_u8; 256];

    let mut value: usize = 0;
    while value < 256 {
        let byte = value as u8;

        // Isolate the lowest zero bit as a one, then count the ones below it.
        let lowest_zero = !byte & byte.wrapping_add(1);
        table[value] = lowest_zero.wrapping_sub(1).count_ones() as u8;

        value += 1;
    }

    table
}

/// Returns the index of the lowest zero bit in `byte`, or `None` if every bit is set.
#[must_use]
pub(crate) fn first_zero_bit(byte: u8) -> Option<u32> {
    let bit = *NTZ_TABLE
        .get(usize::from(byte))
        .expect("table covers every possible byte value");

    (bit < 8).then_some(u32::from(bit))
}
