//! Chunk layout shared by free and allocated chunks.
//!
//! A chunk is a contiguous range of heap bytes: one header word followed by
//! the payload handed to the caller. There is no "in use" flag anywhere; a
//! chunk is free exactly when it is linked into the
//! [`FreeList`](crate::freelist::FreeList), which keeps the header down to a
//! single word.
//!
//! ```text
//!  chunk -> +------------------------------------+
//!           | size (whole chunk, header included)|  -> Header
//!           +------------------------------------+
//!  payload->| When allocated: caller data        |
//!           | When free: offset of the next free |
//!           | chunk                              |
//!           |              ...                   |
//!           +------------------------------------+
//! ```
//!
//! When an allocation needs more alignment than [`CHUNK_ALIGN`] provides,
//! the payload pointer is bumped forward. If the slack in front of it is too
//! small to become a chunk of its own, the word right before the adjusted
//! payload stores a *redirect*: the distance back to the real header.
//!
//! ```text
//!  chunk -> +---------------------+
//!           | size                |
//!           +---------------------+
//!           | (uninitialized pad) |
//!           +---------------------+
//!           | redirect: -offset   |   <- payload - CHUNK_OFFSET
//!  payload->+---------------------+
//!           | caller data         |
//! ```
//!
//! On disk (well, in heap memory) both cases share one word: a non-negative
//! value is a size, a negative one is a redirect. That encoding is easy to
//! get wrong with bare sign arithmetic, so this module decodes it into
//! [`HeaderWord`] and keeps the raw representation private.

use crate::arena::Arena;
use std::mem;

/// Alignment of chunk headers and chunk sizes: one pointer-size word.
pub(crate) const CHUNK_ALIGN: usize = mem::size_of::<usize>();

/// Alignment guaranteed for every payload pointer handed to a caller.
pub const MALLOC_ALIGN: usize = 8;

/// Extra bytes reserved on every allocation so the payload can be bumped to
/// [`MALLOC_ALIGN`] when the header alignment is smaller.
pub(crate) const MALLOC_PADDING: usize = if MALLOC_ALIGN > CHUNK_ALIGN {
    MALLOC_ALIGN - CHUNK_ALIGN
} else {
    0
};

/// Size of the chunk header: the single size/redirect word. The free-list
/// link lives in the payload, so it adds no overhead of its own.
pub(crate) const CHUNK_OFFSET: usize = mem::size_of::<usize>();

/// Smallest payload we hand out; a free chunk needs this much room to store
/// its free-list link.
pub(crate) const MALLOC_MINSIZE: usize = mem::size_of::<usize>();

/// Smallest possible chunk. A piece of memory below this can't become a
/// chunk of its own and must stay glued to a neighbor.
pub(crate) const MIN_CHUNK: usize = CHUNK_OFFSET + MALLOC_PADDING + MALLOC_MINSIZE;

/// Upper bound for a single allocation, header included.
pub(crate) const MAX_ALLOC_SIZE: usize = 0x8000_0000;

/// Page size used by `valloc` and `pvalloc`.
pub(crate) const PAGE_ALIGN: usize = 0x1000;

/// Decoded view of a chunk's header word.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum HeaderWord {
    /// Total byte length of the chunk, header included. For a free chunk it
    /// doubles as the merge key.
    Size(usize),
    /// This address is not a real header; the true header sits `back` bytes
    /// before it. Written only for alignment-padded payloads.
    Redirect(usize),
}

impl HeaderWord {
    /// Packs the header into its single-word heap representation.
    pub(crate) fn encode(self) -> usize {
        match self {
            HeaderWord::Size(size) => {
                debug_assert!(size <= isize::MAX as usize);
                size
            }
            HeaderWord::Redirect(back) => {
                debug_assert!(back > 0 && back <= isize::MAX as usize);
                (back as isize).wrapping_neg() as usize
            }
        }
    }

    /// Unpacks a raw header word read from the heap.
    pub(crate) fn decode(raw: usize) -> Self {
        let signed = raw as isize;
        if signed < 0 {
            HeaderWord::Redirect(signed.unsigned_abs())
        } else {
            HeaderWord::Size(raw)
        }
    }
}

/// Maps a payload offset back to the offset of its true chunk header.
///
/// The candidate header sits one [`CHUNK_OFFSET`] before the payload; if
/// that word is a redirect, the real header is `back` bytes earlier. Returns
/// the chunk offset together with the padding absorbed by the redirect
/// (zero when the payload was never bumped).
pub(crate) fn recover(arena: &Arena, payload: usize) -> (usize, usize) {
    let candidate = payload - CHUNK_OFFSET;

    match arena.read_header(candidate) {
        HeaderWord::Size(_) => (candidate, 0),
        HeaderWord::Redirect(back) => (candidate - back, back),
    }
}
