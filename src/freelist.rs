//! The free list: a singly linked list of the chunks that are currently
//! unallocated, kept strictly sorted by ascending chunk offset.
//!
//! The list stores no memory of its own. A free chunk's payload is unused
//! by definition, so its first word holds the offset of the next free
//! chunk:
//!
//! ```text
//!      head
//!        |
//!        v
//!    +--------+- - - +      +--------+- - +     +--------+- - - - +
//!    | size   | next |----->| size   |next|---->| size   |  NIL   |
//!    +--------+- - - +      +--------+- - +     +--------+- - - - +
//!     low offset             higher offset       highest offset
//! ```
//!
//! Two invariants are maintained as a post-condition of every insert:
//! the offsets are strictly ascending, and no two free chunks are
//! address-adjacent (adjacent chunks are merged on insert). The ordering is
//! what makes the merge check a neighbour comparison instead of a search.

use crate::arena::Arena;
use crate::chunk::{CHUNK_ALIGN, HeaderWord, MIN_CHUNK};
use crate::error::AllocError;

/// Sentinel for "no chunk": the end of the list and the empty-list head.
pub(crate) const NIL: usize = usize::MAX;

/// Head of the address-ordered list of free chunks.
pub(crate) struct FreeList {
    head: usize,
}

impl FreeList {
    pub(crate) const fn new() -> Self {
        Self { head: NIL }
    }

    /// First-fit search for a chunk of at least `alloc_size` bytes. Returns
    /// the offset of the served chunk, or `None` if nothing on the list is
    /// big enough.
    ///
    /// A chunk with at least [`MIN_CHUNK`] bytes of excess is split: the
    /// low-offset part shrinks in place and stays where it is on the list
    /// (its offset, and therefore its identity, doesn't change, so no link
    /// needs rewriting), and the high-offset part is carved off and served.
    /// A near-exact fit is spliced out whole.
    pub(crate) fn take(&mut self, arena: &mut Arena, alloc_size: usize) -> Option<usize> {
        // Request sizing rounds before the search; an unaligned size would
        // place a split chunk's header off a word boundary.
        debug_assert!(alloc_size % CHUNK_ALIGN == 0);

        let mut prev = NIL;
        let mut current = self.head;

        while current != NIL {
            let size = arena.chunk_size(current);

            if size >= alloc_size {
                let excess = size - alloc_size;

                if excess >= MIN_CHUNK {
                    // Split: the remainder keeps its list position, the
                    // tail end of the chunk is served.
                    arena.write_header(current, HeaderWord::Size(excess));

                    let carved = current + excess;
                    arena.write_header(carved, HeaderWord::Size(alloc_size));

                    return Some(carved);
                }

                // Close enough to an exact fit; the whole chunk leaves
                // the list.
                let next = arena.read_link(current);
                if prev == NIL {
                    self.head = next;
                } else {
                    arena.write_link(prev, next);
                }

                return Some(current);
            }

            prev = current;
            current = arena.read_link(current);
        }

        None
    }

    /// Inserts the chunk at `offset` into the list, merging it with any
    /// address-adjacent free neighbor.
    ///
    /// If the scan finds that an already-free chunk's extent overlaps
    /// `offset`, the insert is abandoned with [`AllocError::Corruption`]
    /// and the list is left exactly as it was: a probable double free. The
    /// check only sees collisions with free chunks discovered on the scan
    /// path; a double free landing in a fully allocated neighborhood is
    /// accepted here and will corrupt the list on some later operation.
    /// The same holds for a chunk inserted in front of the head whose
    /// extent runs into it without ending exactly at it: only exact
    /// adjacency is recognized there, an overlap is linked in undetected.
    pub(crate) fn insert(&mut self, arena: &mut Arena, offset: usize) -> Result<(), AllocError> {
        let size = arena.chunk_size(offset);

        if self.head == NIL {
            arena.write_link(offset, NIL);
            self.head = offset;

            self.debug_check(arena);
            return Ok(());
        }

        if offset < self.head {
            if offset + size == self.head {
                // Adjacent to the old head: absorb it.
                let merged = size + arena.chunk_size(self.head);
                let next = arena.read_link(self.head);
                arena.write_header(offset, HeaderWord::Size(merged));
                arena.write_link(offset, next);
            } else {
                arena.write_link(offset, self.head);
            }
            self.head = offset;

            self.debug_check(arena);
            return Ok(());
        }

        // Walk to the bracketing pair: prev <= offset < next.
        let mut prev = self.head;
        let mut next = arena.read_link(prev);
        while next != NIL && next <= offset {
            prev = next;
            next = arena.read_link(next);
        }

        let prev_size = arena.chunk_size(prev);

        if prev + prev_size == offset {
            // Adjacent to the chunk before it: merge, and if the merged
            // chunk now touches the one after it, merge that in too.
            let mut merged = prev_size + size;
            if prev + merged == next {
                merged += arena.chunk_size(next);
                arena.write_link(prev, arena.read_link(next));
            }
            arena.write_header(prev, HeaderWord::Size(merged));
        } else if prev + prev_size > offset {
            // The chunk before it already covers this range.
            return Err(AllocError::Corruption);
        } else if next != NIL && offset + size == next {
            // Adjacent to the chunk after it.
            let merged = size + arena.chunk_size(next);
            arena.write_header(offset, HeaderWord::Size(merged));
            arena.write_link(offset, arena.read_link(next));
            arena.write_link(prev, offset);
        } else {
            // No free neighbor; plain insertion, fragment accepted.
            arena.write_link(offset, next);
            arena.write_link(prev, offset);
        }

        self.debug_check(arena);
        Ok(())
    }

    /// Iterates over `(offset, size)` of every free chunk, in address order.
    pub(crate) fn iter<'a>(&self, arena: &'a Arena) -> Iter<'a> {
        Iter {
            arena,
            current: self.head,
        }
    }

    #[cfg(test)]
    pub(crate) fn is_empty(&self) -> bool {
        self.head == NIL
    }

    /// Walks the whole list in debug builds and validates every invariant
    /// the rest of the allocator relies on.
    fn debug_check(&self, arena: &Arena) {
        if cfg!(debug_assertions) {
            let mut previous_end = 0;
            let mut previous = NIL;

            for (offset, size) in self.iter(arena) {
                debug_assert!(
                    previous == NIL || previous < offset,
                    "free list not strictly address-ordered: {previous} before {offset}"
                );
                debug_assert!(
                    previous == NIL || previous_end < offset,
                    "free chunks at {previous} and {offset} touch or overlap"
                );
                debug_assert!(size >= MIN_CHUNK, "free chunk at {offset} below minimum size");
                debug_assert!(
                    offset + size <= arena.total(),
                    "free chunk at {offset} overruns the heap"
                );

                previous = offset;
                previous_end = offset + size;
            }
        }
    }
}

pub(crate) struct Iter<'a> {
    arena: &'a Arena,
    current: usize,
}

impl Iterator for Iter<'_> {
    type Item = (usize, usize);

    fn next(&mut self) -> Option<Self::Item> {
        if self.current == NIL {
            return None;
        }

        let offset = self.current;
        let size = self.arena.chunk_size(offset);
        self.current = self.arena.read_link(offset);

        Some((offset, size))
    }
}
