//! The arena: the single contiguous byte range the allocator carves chunks
//! out of.
//!
//! Every other module identifies chunks by their *offset* into the arena,
//! never by raw address. All raw pointer arithmetic is confined to this
//! module behind bounds-checked accessors, so a bad link or a bad chunk
//! boundary trips a debug assertion here instead of scribbling over the
//! heap.
//!
//! ```text
//!        base                                    base + len
//!         |                                          |
//!         v                                          v
//!         +--------+--------+-----+--------+---------+ . . . grows ->
//!         | chunk  | chunk  | ... | chunk  |  chunk  |
//!         +--------+--------+-----+--------+---------+
//!         ^
//!   offset 0
//! ```
//!
//! The arena only ever grows, one [`HeapSource::extend`] call at a time; the
//! start address is recorded lazily on the first growth and nothing is ever
//! handed back to the platform.

use crate::chunk::{CHUNK_ALIGN, CHUNK_OFFSET, HeaderWord};
use crate::error::AllocError;
use crate::platform::HeapSource;
use crate::utils::align_to;

/// Bookkeeping for the heap region. Offsets handed out by [`Arena::grow`]
/// are relative to `base`, which may itself be unaligned; chunk offsets are
/// chosen so that `base + offset` is always [`CHUNK_ALIGN`]-aligned.
pub(crate) struct Arena {
    /// Start of the heap region, null until the first growth.
    base: *mut u8,
    /// Bytes between `base` and the current end of the heap, alignment
    /// filler included.
    len: usize,
}

impl Arena {
    pub(crate) const fn new() -> Self {
        Self {
            base: std::ptr::null_mut(),
            len: 0,
        }
    }

    /// Current heap extent in bytes. This is the "total" figure reported by
    /// the heap statistics.
    #[inline]
    pub(crate) fn total(&self) -> usize {
        self.len
    }

    /// Extends the heap by `n` bytes and returns the offset of the new
    /// region, which is guaranteed to start [`CHUNK_ALIGN`]-aligned.
    ///
    /// On the first call the current break is recorded as the heap start.
    /// The common case is an already aligned break, so the extra padding
    /// bytes are only requested after the misalignment is known. A failure
    /// of the underlying primitive at either step is propagated unchanged.
    pub(crate) fn grow<S: HeapSource>(
        &mut self,
        source: &mut S,
        n: usize,
    ) -> Result<usize, AllocError> {
        unsafe {
            if self.base.is_null() {
                let start = source.extend(0).ok_or(AllocError::OutOfMemory)?;
                self.base = start.as_ptr();
            }

            let brk = source.extend(n).ok_or(AllocError::OutOfMemory)?.as_ptr();

            let aligned = align_to(brk as usize, CHUNK_ALIGN);
            if aligned != brk as usize {
                // The break was not aligned; ask for a few more bytes so
                // that we still have n bytes reserved from `aligned` on.
                source
                    .extend(aligned - brk as usize)
                    .ok_or(AllocError::OutOfMemory)?;
            }

            self.len = aligned + n - self.base as usize;

            Ok(aligned - self.base as usize)
        }
    }

    /// Pointer to the byte at `offset`.
    #[inline]
    pub(crate) fn ptr_at(&self, offset: usize) -> *mut u8 {
        debug_assert!(!self.base.is_null());
        debug_assert!(offset <= self.len);

        unsafe { self.base.add(offset) }
    }

    /// Offset of a pointer previously produced by [`Arena::ptr_at`].
    #[inline]
    pub(crate) fn offset_of(&self, ptr: *mut u8) -> usize {
        debug_assert!(!self.base.is_null());
        debug_assert!(
            (self.base as usize..self.base as usize + self.len).contains(&(ptr as usize)),
            "pointer does not belong to this heap"
        );

        ptr as usize - self.base as usize
    }

    /// Reads the header word of the chunk at `offset`.
    #[inline]
    pub(crate) fn read_header(&self, offset: usize) -> HeaderWord {
        HeaderWord::decode(unsafe { self.word_at(offset).read() })
    }

    /// Writes the header word of the chunk at `offset`.
    #[inline]
    pub(crate) fn write_header(&mut self, offset: usize, word: HeaderWord) {
        unsafe { self.word_at(offset).write(word.encode()) }
    }

    /// Size of the chunk at `offset`. The offset must name a real chunk
    /// header, not a redirect word.
    #[inline]
    pub(crate) fn chunk_size(&self, offset: usize) -> usize {
        match self.read_header(offset) {
            HeaderWord::Size(size) => size,
            HeaderWord::Redirect(back) => {
                debug_assert!(false, "redirect word at chunk offset {offset} (back {back})");
                0
            }
        }
    }

    /// Reads the free-list link of the free chunk at `offset`. The link
    /// occupies the first payload word, so it must never be read once the
    /// chunk has been handed to a caller.
    #[inline]
    pub(crate) fn read_link(&self, offset: usize) -> usize {
        unsafe { self.word_at(offset + CHUNK_OFFSET).read() }
    }

    /// Writes the free-list link of the free chunk at `offset`.
    #[inline]
    pub(crate) fn write_link(&mut self, offset: usize, next: usize) {
        unsafe { self.word_at(offset + CHUNK_OFFSET).write(next) }
    }

    /// Word-size accessor behind every header and link operation; the one
    /// place that turns an offset into a dereferenceable pointer.
    #[inline]
    fn word_at(&self, offset: usize) -> *mut usize {
        debug_assert!(!self.base.is_null());
        debug_assert!(
            offset + CHUNK_OFFSET <= self.len,
            "word at offset {offset} is out of heap bounds ({})",
            self.len
        );
        debug_assert!(
            (self.base as usize + offset) % CHUNK_ALIGN == 0,
            "word at offset {offset} is misaligned"
        );

        unsafe { self.base.add(offset).cast::<usize>() }
    }
}

// The arena owns its heap region exclusively; nothing aliases the base
// pointer from outside the allocator.
unsafe impl Send for Arena {}
