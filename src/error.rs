use std::fmt;

/// Failures reported by the allocator.
///
/// Nothing in the allocator panics or aborts on a bad request: every
/// operation reports failure through its `Result` and leaves the heap in
/// the state it found it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AllocError {
    /// The request could not be satisfied: the sizing arithmetic
    /// overflowed, the request exceeded the maximum single-allocation
    /// size, or the heap-growth primitive reported exhaustion.
    OutOfMemory,
    /// `memalign` was called with an alignment that is not a power of two.
    BadAlignment,
    /// A freed range collided with a chunk that is already free; almost
    /// certainly a double free or an invalid pointer. The free list is
    /// left untouched and the chunk is leaked.
    Corruption,
}

impl fmt::Display for AllocError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AllocError::OutOfMemory => write!(f, "out of memory"),
            AllocError::BadAlignment => write!(f, "alignment is not a power of two"),
            AllocError::Corruption => write!(f, "freed range overlaps a free chunk"),
        }
    }
}

impl std::error::Error for AllocError {}
