//! Small helper functions shared by the rest of the allocator. These don't
//! belong to any particular module of the program.

/// Rounds `value` up to the next multiple of `align`.
///
/// `align` must be a power of two. This is used everywhere sizes and
/// addresses have to land on a boundary: chunk sizes are rounded to
/// [`crate::chunk::CHUNK_ALIGN`], payload pointers to
/// [`crate::chunk::MALLOC_ALIGN`] and page-sized requests to
/// [`crate::chunk::PAGE_ALIGN`].
pub(crate) fn align_to(value: usize, align: usize) -> usize {
    debug_assert!(align.is_power_of_two());
    (value + align - 1) & !(align - 1)
}

/// Overflow-checked version of [`align_to`], for sizes that come straight
/// from the caller and may be close to `usize::MAX`.
pub(crate) fn checked_align_to(value: usize, align: usize) -> Option<usize> {
    debug_assert!(align.is_power_of_two());
    Some(value.checked_add(align - 1)? & !(align - 1))
}
