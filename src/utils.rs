//! Helpers shared by the page provider and the heap.

/// Rounds `to_be_aligned` up to the next multiple of `alignment`, which must
/// be a power of two.
///
/// Used to turn a byte request into a whole number of pages. Returns `None`
/// when the rounded value does not fit in a `usize`.
pub fn align(to_be_aligned: usize, alignment: usize) -> Option<usize> {
    debug_assert!(alignment.is_power_of_two());
    Some(to_be_aligned.checked_add(alignment - 1)? & !(alignment - 1))
}

/// Bytes needed to move `addr` up to the next multiple of `alignment`.
pub fn padding(addr: usize, alignment: usize) -> usize {
    addr.wrapping_neg() & (alignment - 1)
}
