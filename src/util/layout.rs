//! Layout utilities.

/// Align a size up to the given alignment.
///
/// `align` must be a power of two.
#[inline]
pub const fn align_up(size: usize, align: usize) -> usize {
    (size + align - 1) & !(align - 1)
}

/// Check whether an address is a multiple of `align`.
#[inline]
pub fn is_aligned(addr: usize, align: usize) -> bool {
    addr & (align - 1) == 0
}
