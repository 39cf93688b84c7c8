//! The allocator front-end: the `malloc` family implemented over the
//! [`Arena`] and the [`FreeList`].
//!
//! All heap state lives in an explicit [`Heap`] value; there are no
//! globals. The heap is generic over the platform growth primitive
//! ([`HeapSource`]) and the mutual-exclusion capability ([`HeapLock`]), so
//! the whole engine runs single-threaded against an in-process buffer in
//! tests and against `sbrk` behind a spin lock in a real program.
//!
//! The derived operations (`calloc`, `realloc`, `memalign` and friends)
//! never touch the free list directly; everything goes through `malloc`
//! and `free`.

use crate::arena::Arena;
use crate::chunk::{
    self, CHUNK_ALIGN, CHUNK_OFFSET, HeaderWord, MALLOC_ALIGN, MALLOC_MINSIZE, MALLOC_PADDING,
    MAX_ALLOC_SIZE, MIN_CHUNK, PAGE_ALIGN,
};
use crate::error::AllocError;
use crate::freelist::FreeList;
use crate::lock::{HeapLock, NoLock};
use crate::platform::HeapSource;
use crate::utils::{align_to, checked_align_to};
use std::fmt;
use std::ptr::NonNull;

/// Heap accounting at a quiescent point.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct HeapStats {
    /// Current heap extent in bytes: everything ever obtained from the
    /// growth primitive, alignment filler included.
    pub total: usize,
    /// Sum of the sizes of all free-list chunks.
    pub free: usize,
    /// `total - free`. Live allocations plus their header overhead.
    pub used: usize,
}

impl fmt::Display for HeapStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "system bytes     = {:10}", self.total)?;
        writeln!(f, "free bytes       = {:10}", self.free)?;
        write!(f, "in use bytes     = {:10}", self.used)
    }
}

/// A first-fit free-list heap over an externally supplied growth
/// primitive.
///
/// Single shared heap, small code, low overhead: requests are served from
/// an address-ordered free list, freed chunks are merged with their
/// neighbors immediately, and the heap only grows when no free chunk
/// fits. Optimized for density rather than throughput.
pub struct Heap<S, L = NoLock> {
    arena: Arena,
    free: FreeList,
    source: S,
    lock: L,
}

impl<S: HeapSource> Heap<S> {
    /// A heap for single-threaded use (no-op lock).
    pub const fn new(source: S) -> Self {
        Self::with_lock(source, NoLock)
    }
}

impl<S: HeapSource, L: HeapLock> Heap<S, L> {
    /// A heap whose critical sections are bracketed by `lock`.
    pub const fn with_lock(source: S, lock: L) -> Self {
        Self {
            arena: Arena::new(),
            free: FreeList::new(),
            source,
            lock,
        }
    }

    /// Allocates at least `size` usable bytes, aligned to
    /// [`MALLOC_ALIGN`].
    ///
    /// First-fit over the free list; if nothing fits, the heap grows by
    /// exactly one chunk. Fails without touching any state when the sizing
    /// arithmetic overflows, the request exceeds the single-allocation
    /// limit, or the growth primitive is exhausted.
    pub fn malloc(&mut self, size: usize) -> Result<NonNull<u8>, AllocError> {
        let alloc_size = request_size(size)?;

        self.lock.acquire();

        let chunk = match self.free.take(&mut self.arena, alloc_size) {
            Some(chunk) => chunk,
            // No free chunk fits; ask for more memory, still under the
            // lock.
            None => match self.arena.grow(&mut self.source, alloc_size) {
                Ok(chunk) => {
                    self.arena.write_header(chunk, HeaderWord::Size(alloc_size));
                    chunk
                }
                Err(error) => {
                    self.lock.release();
                    return Err(error);
                }
            },
        };

        self.lock.release();

        // The chunk is ours alone now; the payload fixup needs no lock.
        Ok(self.payload_of(chunk))
    }

    /// Returns `ptr` to the free list, merging with any adjacent free
    /// neighbor. A null `ptr` is a no-op.
    ///
    /// A detected double free reports [`AllocError::Corruption`] and
    /// changes nothing; see [`FreeList::insert`] for how narrow that
    /// detection is.
    ///
    /// # Safety
    ///
    /// `ptr` must be null or a pointer previously returned by this heap
    /// and not freed since.
    pub unsafe fn free(&mut self, ptr: *mut u8) -> Result<(), AllocError> {
        if ptr.is_null() {
            return Ok(());
        }

        let payload = self.arena.offset_of(ptr);
        let (chunk, _) = chunk::recover(&self.arena, payload);

        self.free_chunk(chunk)
    }

    /// Allocates a zero-filled block for `count` elements of `elem_size`
    /// bytes. The multiplication is overflow-checked.
    pub fn calloc(&mut self, count: usize, elem_size: usize) -> Result<NonNull<u8>, AllocError> {
        let bytes = count
            .checked_mul(elem_size)
            .ok_or(AllocError::OutOfMemory)?;

        let ptr = self.malloc(bytes)?;

        // Safety: malloc returned at least `bytes` usable bytes.
        unsafe { ptr.as_ptr().write_bytes(0, bytes) };

        Ok(ptr)
    }

    /// Resizes the allocation at `ptr` to `size` bytes.
    ///
    /// Null behaves as `malloc`; `size == 0` frees and returns `Ok(None)`.
    /// If the current chunk already covers `size` the same pointer is
    /// returned (there is no shrink-to-fit). Otherwise a new block is
    /// allocated, the old bytes are copied, and the old block is freed; on
    /// allocation failure the original block is left untouched.
    ///
    /// # Safety
    ///
    /// Same contract as [`Heap::free`].
    pub unsafe fn realloc(
        &mut self,
        ptr: *mut u8,
        size: usize,
    ) -> Result<Option<NonNull<u8>>, AllocError> {
        let Some(ptr) = NonNull::new(ptr) else {
            return self.malloc(size).map(Some);
        };

        if size == 0 {
            unsafe { self.free(ptr.as_ptr())? };
            return Ok(None);
        }

        let old_usable = unsafe { self.usable_size(ptr) };
        if old_usable >= size {
            return Ok(Some(ptr));
        }

        let new = self.malloc(size)?;

        unsafe {
            new.as_ptr()
                .copy_from_nonoverlapping(ptr.as_ptr(), old_usable.min(size));
            // The data already lives in the new block; a corruption report
            // from the insert leaks the old chunk but must not hide the
            // new pointer.
            let _ = self.free(ptr.as_ptr());
        }

        Ok(Some(new))
    }

    /// Allocates `size` bytes aligned to `align`, which must be a power of
    /// two. Fails with [`AllocError::BadAlignment`] otherwise, with no
    /// state change.
    ///
    /// Built strictly on top of `malloc`/`free`: over-allocates by the
    /// worst-case slack, then gives leading and trailing slack back to the
    /// free list when it is big enough to be a chunk of its own. Leading
    /// slack below [`MIN_CHUNK`] is recorded as a redirect word instead.
    pub fn memalign(&mut self, align: usize, size: usize) -> Result<NonNull<u8>, AllocError> {
        if !align.is_power_of_two() {
            return Err(AllocError::BadAlignment);
        }

        let align = align.max(MALLOC_ALIGN);
        let ma_size = checked_align_to(size.max(MALLOC_MINSIZE), CHUNK_ALIGN)
            .ok_or(AllocError::OutOfMemory)?;
        let size_with_padding = ma_size
            .checked_add(align - MALLOC_ALIGN)
            .ok_or(AllocError::OutOfMemory)?;

        let allocated = self.malloc(size_with_padding)?;

        let payload = self.arena.offset_of(allocated.as_ptr());
        let (mut chunk, _) = chunk::recover(&self.arena, payload);

        let head_addr = self.arena.ptr_at(chunk + CHUNK_OFFSET) as usize;
        let bump = align_to(head_addr, align) - head_addr;
        // The aligned payload offset; in the carve case below it becomes
        // the moved chunk's own payload.
        let aligned = chunk + CHUNK_OFFSET + bump;

        if bump > 0 {
            if bump >= MIN_CHUNK {
                // The slack in front is a whole chunk's worth; carve it
                // off and give it back.
                let front = chunk;
                let total = self.arena.chunk_size(front);

                chunk += bump;
                self.arena.write_header(chunk, HeaderWord::Size(total - bump));
                self.arena.write_header(front, HeaderWord::Size(bump));

                self.free_chunk(front)?;
            } else {
                // Too small to live on its own; leave a back-offset for
                // recover() instead.
                self.arena
                    .write_header(aligned - CHUNK_OFFSET, HeaderWord::Redirect(bump));
            }
        }

        let chunk_size = self.arena.chunk_size(chunk);
        if chunk + chunk_size > aligned + ma_size + MIN_CHUNK {
            // Far more tail slack than the request needs; carve it off
            // and give it back.
            let tail = aligned + ma_size;

            self.arena
                .write_header(chunk, HeaderWord::Size(tail - chunk));
            self.arena
                .write_header(tail, HeaderWord::Size(chunk_size - (tail - chunk)));

            self.free_chunk(tail)?;
        }

        // Safety: `aligned` is a payload offset inside the served chunk.
        Ok(unsafe { NonNull::new_unchecked(self.arena.ptr_at(aligned)) })
    }

    /// `memalign` with page alignment.
    pub fn valloc(&mut self, size: usize) -> Result<NonNull<u8>, AllocError> {
        self.memalign(PAGE_ALIGN, size)
    }

    /// `valloc` with the size rounded up to a whole number of pages.
    pub fn pvalloc(&mut self, size: usize) -> Result<NonNull<u8>, AllocError> {
        let size = checked_align_to(size, PAGE_ALIGN).ok_or(AllocError::OutOfMemory)?;
        self.valloc(size)
    }

    /// Usable bytes of the allocation at `ptr`: the chunk size minus the
    /// header and minus any padding absorbed by an alignment redirect.
    /// Always at least the size that was requested.
    ///
    /// # Safety
    ///
    /// `ptr` must be a pointer previously returned by this heap and not
    /// freed since.
    pub unsafe fn usable_size(&self, ptr: NonNull<u8>) -> usize {
        let payload = self.arena.offset_of(ptr.as_ptr());
        let (chunk, padding) = chunk::recover(&self.arena, payload);

        self.arena.chunk_size(chunk) - CHUNK_OFFSET - padding
    }

    /// Sums the free list and the heap extent under the lock.
    pub fn mallinfo(&self) -> HeapStats {
        self.lock.acquire();

        let total = self.arena.total();
        let free = self.free.iter(&self.arena).map(|(_, size)| size).sum();

        self.lock.release();

        HeapStats {
            total,
            free,
            used: total - free,
        }
    }

    /// Prints the current [`HeapStats`] to stderr.
    pub fn malloc_stats(&self) {
        eprintln!("{}", self.mallinfo());
    }

    /// Tunable adjustment. Accepted, no effect: this allocator has no
    /// tunables.
    pub fn mallopt(&mut self, _parameter: i32, _value: i32) {}

    /// Locked insert of a chunk that is no longer reachable by any caller.
    fn free_chunk(&mut self, chunk: usize) -> Result<(), AllocError> {
        self.lock.acquire();
        let result = self.free.insert(&mut self.arena, chunk);
        self.lock.release();

        result
    }

    /// Payload pointer of a freshly served chunk, bumped to
    /// [`MALLOC_ALIGN`] with a redirect word when the header alignment is
    /// smaller than the payload alignment.
    fn payload_of(&mut self, chunk: usize) -> NonNull<u8> {
        let mut payload = chunk + CHUNK_OFFSET;

        let addr = self.arena.ptr_at(payload) as usize;
        let bump = align_to(addr, MALLOC_ALIGN) - addr;
        if bump > 0 {
            payload += bump;
            self.arena
                .write_header(payload - CHUNK_OFFSET, HeaderWord::Redirect(bump));
        }

        // Safety: the payload offset is inside the arena and the arena
        // base is non-null once a chunk exists.
        unsafe { NonNull::new_unchecked(self.arena.ptr_at(payload)) }
    }
}

/// Total chunk size for a caller request: the payload rounded to
/// [`CHUNK_ALIGN`], plus the alignment-padding reserve, plus the header,
/// clamped up to the minimum viable chunk.
fn request_size(size: usize) -> Result<usize, AllocError> {
    let alloc_size = checked_align_to(size, CHUNK_ALIGN)
        .and_then(|aligned| aligned.checked_add(MALLOC_PADDING + CHUNK_OFFSET))
        .ok_or(AllocError::OutOfMemory)?
        .max(MIN_CHUNK);

    if alloc_size >= MAX_ALLOC_SIZE {
        return Err(AllocError::OutOfMemory);
    }

    Ok(alloc_size)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lock::SpinLock;
    use crate::platform::FixedHeap;
    use std::cell::Cell;

    fn heap(capacity: usize) -> Heap<FixedHeap> {
        Heap::new(FixedHeap::new(capacity))
    }

    /// (offset, size) of every free chunk, for asserting on list shape.
    fn free_chunks<S, L>(heap: &Heap<S, L>) -> Vec<(usize, usize)> {
        heap.free.iter(&heap.arena).collect()
    }

    #[test]
    fn malloc_returns_aligned_writable_memory() {
        let mut heap = heap(4096);

        let ptr = heap.malloc(24).unwrap();

        assert_eq!(0, ptr.as_ptr() as usize % MALLOC_ALIGN);
        unsafe {
            ptr.as_ptr().write_bytes(0xab, 24);
            assert_eq!(0xab, *ptr.as_ptr().add(23));
        }
    }

    #[test]
    fn malloc_zero_size_still_gets_a_minimum_chunk() {
        let mut heap = heap(4096);

        let ptr = heap.malloc(0).unwrap();

        assert!(unsafe { heap.usable_size(ptr) } >= MALLOC_MINSIZE);
    }

    #[test]
    fn usable_size_covers_the_request() {
        let mut heap = heap(4096);

        for request in [1, 7, 8, 13, 100, 1000] {
            let ptr = heap.malloc(request).unwrap();
            assert!(unsafe { heap.usable_size(ptr) } >= request);
        }
    }

    #[test]
    fn oversize_and_overflowing_requests_fail_untouched() {
        let mut heap = heap(4096);

        assert_eq!(Err(AllocError::OutOfMemory), heap.malloc(MAX_ALLOC_SIZE));
        assert_eq!(Err(AllocError::OutOfMemory), heap.malloc(usize::MAX - 3));
        assert_eq!(HeapStats::default(), heap.mallinfo());
    }

    #[test]
    fn exhaustion_is_reported_and_heap_stays_usable() {
        let mut heap = heap(128);

        let ptr = heap.malloc(64).unwrap();
        assert_eq!(Err(AllocError::OutOfMemory), heap.malloc(256));

        // The failed request changed nothing; the live block still works.
        unsafe {
            ptr.as_ptr().write_bytes(1, 64);
            heap.free(ptr.as_ptr()).unwrap();
        }
        assert!(heap.malloc(64).is_ok());
    }

    // Scenario: exact first-fit reuse, no heap growth.
    #[test]
    fn freed_block_is_reused_exactly() {
        let mut heap = heap(4096);

        let a = heap.malloc(16).unwrap();
        let b = heap.malloc(16).unwrap();
        assert_ne!(a, b);

        let total_before = heap.mallinfo().total;
        unsafe { heap.free(a.as_ptr()).unwrap() };

        let c = heap.malloc(16).unwrap();

        assert_eq!(a, c);
        assert_eq!(total_before, heap.mallinfo().total);
    }

    // Scenario: adjacent merge, then head merge: one spanning chunk.
    #[test]
    fn freeing_neighbors_leaves_one_spanning_chunk() {
        let mut heap = heap(8192);

        let x = heap.malloc(1000).unwrap();
        let y = heap.malloc(8).unwrap();
        // y sits immediately after x's chunk in memory.
        assert_eq!(
            x.as_ptr() as usize + 1000 + CHUNK_OFFSET,
            y.as_ptr() as usize
        );

        unsafe {
            heap.free(x.as_ptr()).unwrap();
            heap.free(y.as_ptr()).unwrap();
        }

        let free = free_chunks(&heap);
        assert_eq!(1, free.len());
        assert_eq!(heap.mallinfo().total, free[0].1);
        assert_eq!(0, heap.mallinfo().used);
    }

    // Scenario: release(null) is a no-op.
    #[test]
    fn free_null_changes_nothing() {
        let mut heap = heap(4096);

        let stats_before = heap.mallinfo();
        unsafe { heap.free(std::ptr::null_mut()).unwrap() };

        assert_eq!(stats_before, heap.mallinfo());
        assert!(heap.free.is_empty());
    }

    #[test]
    fn free_list_stays_ordered_and_coalesced() {
        let mut heap = heap(16 * 1024);

        let ptrs: Vec<_> = (0..8).map(|_| heap.malloc(100).unwrap()).collect();

        // Free in a shuffled order; the insert path sees head inserts,
        // interior inserts and both merge directions.
        for index in [5, 1, 7, 3, 0, 6, 2, 4] {
            unsafe { heap.free(ptrs[index].as_ptr()).unwrap() };

            let free = free_chunks(&heap);
            for pair in free.windows(2) {
                assert!(pair[0].0 + pair[0].1 < pair[1].0, "unordered or unmerged: {free:?}");
            }
        }

        // Everything freed: a single chunk spans the whole heap.
        assert_eq!(1, free_chunks(&heap).len());
    }

    #[test]
    fn double_free_next_to_a_free_neighbor_is_detected() {
        let mut heap = heap(4096);

        let a = heap.malloc(16).unwrap();
        let b = heap.malloc(16).unwrap();
        let _guard = heap.malloc(16).unwrap();

        unsafe {
            heap.free(a.as_ptr()).unwrap();
            heap.free(b.as_ptr()).unwrap();

            let before = free_chunks(&heap);
            // b is now inside the merged chunk: reported, list unchanged.
            assert_eq!(Err(AllocError::Corruption), heap.free(b.as_ptr()));
            assert_eq!(before, free_chunks(&heap));
        }
    }

    #[test]
    fn double_free_of_the_only_free_chunk_is_detected() {
        let mut heap = heap(4096);

        let a = heap.malloc(16).unwrap();
        let _guard = heap.malloc(16).unwrap();

        unsafe {
            heap.free(a.as_ptr()).unwrap();
            assert_eq!(Err(AllocError::Corruption), heap.free(a.as_ptr()));
        }
    }

    #[test]
    fn calloc_zeroes_the_whole_request_even_on_reuse() {
        let mut heap = heap(4096);

        // Dirty a block, free it, then calloc into the same spot.
        let dirty = heap.malloc(64).unwrap();
        unsafe {
            dirty.as_ptr().write_bytes(0xff, 64);
            heap.free(dirty.as_ptr()).unwrap();
        }

        let zeroed = heap.calloc(16, 4).unwrap();

        assert_eq!(dirty, zeroed);
        for offset in 0..64 {
            assert_eq!(0, unsafe { *zeroed.as_ptr().add(offset) });
        }
    }

    #[test]
    fn calloc_rejects_overflowing_products() {
        let mut heap = heap(4096);

        assert_eq!(Err(AllocError::OutOfMemory), heap.calloc(usize::MAX, 2));
        assert_eq!(HeapStats::default(), heap.mallinfo());
    }

    #[test]
    fn realloc_null_acts_as_malloc() {
        let mut heap = heap(4096);

        let ptr = unsafe { heap.realloc(std::ptr::null_mut(), 32).unwrap() };

        assert!(ptr.is_some());
    }

    #[test]
    fn realloc_zero_frees_the_block() {
        let mut heap = heap(4096);

        let ptr = heap.malloc(32).unwrap();
        let result = unsafe { heap.realloc(ptr.as_ptr(), 0).unwrap() };

        assert_eq!(None, result);
        assert_eq!(heap.mallinfo().total, heap.mallinfo().free);
    }

    #[test]
    fn realloc_that_fits_returns_the_same_pointer() {
        let mut heap = heap(4096);

        let ptr = heap.malloc(100).unwrap();
        let usable = unsafe { heap.usable_size(ptr) };

        // Both shrinking and growing within the usable size are in-place.
        let same = unsafe { heap.realloc(ptr.as_ptr(), 10).unwrap() };
        assert_eq!(Some(ptr), same);

        let same = unsafe { heap.realloc(ptr.as_ptr(), usable).unwrap() };
        assert_eq!(Some(ptr), same);
    }

    #[test]
    fn realloc_growth_preserves_the_old_bytes() {
        let mut heap = heap(8192);

        let old = heap.malloc(32).unwrap();
        let _guard = heap.malloc(16).unwrap(); // forces the move
        unsafe {
            for offset in 0..32 {
                *old.as_ptr().add(offset) = offset as u8;
            }

            let new = heap.realloc(old.as_ptr(), 1000).unwrap().unwrap();

            assert_ne!(old, new);
            for offset in 0..32 {
                assert_eq!(offset as u8, *new.as_ptr().add(offset));
            }
        }
    }

    #[test]
    fn failed_realloc_leaves_the_original_untouched() {
        let mut heap = heap(256);

        let ptr = heap.malloc(64).unwrap();
        unsafe {
            ptr.as_ptr().write_bytes(0x5a, 64);

            assert_eq!(Err(AllocError::OutOfMemory), heap.realloc(ptr.as_ptr(), 4096));

            assert!(heap.usable_size(ptr) >= 64);
            for offset in 0..64 {
                assert_eq!(0x5a, *ptr.as_ptr().add(offset));
            }
        }
    }

    // Scenario: aligned allocation on a fresh heap.
    #[test]
    fn memalign_on_a_fresh_heap() {
        let mut heap = heap(8192);

        let ptr = heap.memalign(64, 10).unwrap();

        assert_eq!(0, ptr.as_ptr() as usize % 64);
        assert!(unsafe { heap.usable_size(ptr) } >= 10);
    }

    #[test]
    fn memalign_rejects_non_power_of_two() {
        let mut heap = heap(4096);

        assert_eq!(Err(AllocError::BadAlignment), heap.memalign(0, 16));
        assert_eq!(Err(AllocError::BadAlignment), heap.memalign(3, 16));
        assert_eq!(Err(AllocError::BadAlignment), heap.memalign(48, 16));
        assert_eq!(HeapStats::default(), heap.mallinfo());
    }

    #[test]
    fn memalign_blocks_free_cleanly() {
        let mut heap = heap(64 * 1024);

        // A live prefix pushes the later chunks off nice boundaries, so
        // the slack paths (carve and redirect) actually run.
        let prefix = heap.malloc(16).unwrap();

        for align in [8, 16, 64, 256, 4096] {
            let ptr = heap.memalign(align, 32).unwrap();
            assert_eq!(0, ptr.as_ptr() as usize % align);
            assert!(unsafe { heap.usable_size(ptr) } >= 32);
            unsafe { heap.free(ptr.as_ptr()).unwrap() };
        }

        unsafe { heap.free(prefix.as_ptr()).unwrap() };

        // Nothing leaked: every byte is back on the free list.
        let stats = heap.mallinfo();
        assert_eq!(stats.total, stats.free);
        assert_eq!(1, free_chunks(&heap).len());
    }

    #[test]
    fn valloc_and_pvalloc_are_page_aligned() {
        let mut heap = heap(64 * 1024);

        let v = heap.valloc(100).unwrap();
        assert_eq!(0, v.as_ptr() as usize % PAGE_ALIGN);
        assert!(unsafe { heap.usable_size(v) } >= 100);

        let p = heap.pvalloc(100).unwrap();
        assert_eq!(0, p.as_ptr() as usize % PAGE_ALIGN);
        // pvalloc rounds the request itself up to whole pages.
        assert!(unsafe { heap.usable_size(p) } >= PAGE_ALIGN);
    }

    #[test]
    fn accounting_identity_holds_at_quiescent_points() {
        let mut heap = heap(16 * 1024);
        let mut live: Vec<(NonNull<u8>, usize)> = Vec::new();

        for round in 0..4 {
            for size in [16, 100, 8, 333, 64] {
                let ptr = heap.malloc(size).unwrap();
                let chunk_size = unsafe { heap.usable_size(ptr) } + CHUNK_OFFSET;
                live.push((ptr, chunk_size));
            }

            // Free every other live block.
            let mut index = 0;
            live.retain(|(ptr, _)| {
                index += 1;
                if index % 2 == round % 2 {
                    unsafe { heap.free(ptr.as_ptr()).unwrap() };
                    false
                } else {
                    true
                }
            });

            let stats = heap.mallinfo();
            let live_bytes: usize = live.iter().map(|(_, size)| size).sum();
            assert_eq!(stats.total, stats.free + stats.used);
            assert_eq!(live_bytes, stats.used);
        }

        for (ptr, _) in live.drain(..) {
            unsafe { heap.free(ptr.as_ptr()).unwrap() };
        }
        let stats = heap.mallinfo();
        assert_eq!(stats.total, stats.free);
        assert_eq!(0, stats.used);
    }

    #[test]
    fn growth_is_used_when_no_free_chunk_fits() {
        let mut heap = heap(4096);

        let a = heap.malloc(16).unwrap();
        let b = heap.malloc(16).unwrap();
        unsafe {
            heap.free(a.as_ptr()).unwrap();
            heap.free(b.as_ptr()).unwrap();
        }
        let total_before = heap.mallinfo().total;

        // The merged free chunk is too small; the heap must grow.
        let big = heap.malloc(500).unwrap();

        assert!(heap.mallinfo().total > total_before);
        assert!(unsafe { heap.usable_size(big) } >= 500);
    }

    #[test]
    fn mallopt_is_an_accepted_noop() {
        let mut heap = heap(4096);

        let ptr = heap.malloc(16).unwrap();
        let stats_before = heap.mallinfo();

        heap.mallopt(1, 4096);
        heap.mallopt(-1, -1);

        assert_eq!(stats_before, heap.mallinfo());
        assert!(unsafe { heap.usable_size(ptr) } >= 16);
    }

    #[test]
    fn stats_on_an_untouched_heap_are_zero() {
        let heap = heap(4096);
        assert_eq!(HeapStats::default(), heap.mallinfo());
    }

    #[test]
    fn stats_display_matches_the_classic_dump() {
        let stats = HeapStats {
            total: 1024,
            free: 256,
            used: 768,
        };

        let text = stats.to_string();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines.len(), 3);
        assert!(lines[0].starts_with("system bytes"));
        assert!(lines[1].starts_with("free bytes"));
        assert!(lines[2].starts_with("in use bytes"));
        assert_eq!(lines[0].split('=').nth(1).unwrap().trim(), "1024");
        assert_eq!(lines[1].split('=').nth(1).unwrap().trim(), "256");
        assert_eq!(lines[2].split('=').nth(1).unwrap().trim(), "768");
    }

    /// Lock double that checks the bracket discipline: never re-entered,
    /// always released.
    #[derive(Default)]
    struct CountingLock {
        held: Cell<bool>,
        acquired: Cell<usize>,
    }

    impl HeapLock for CountingLock {
        fn acquire(&self) {
            assert!(!self.held.get(), "lock re-entered");
            self.held.set(true);
            self.acquired.set(self.acquired.get() + 1);
        }

        fn release(&self) {
            assert!(self.held.get(), "released while not held");
            self.held.set(false);
        }
    }

    #[test]
    fn every_operation_brackets_the_lock() {
        let mut heap = Heap::with_lock(FixedHeap::new(8192), CountingLock::default());

        let a = heap.malloc(32).unwrap();
        let b = heap.memalign(128, 32).unwrap();
        let c = heap.calloc(4, 8).unwrap();
        unsafe {
            heap.realloc(a.as_ptr(), 500).unwrap();
            heap.free(b.as_ptr()).unwrap();
            heap.free(c.as_ptr()).unwrap();
        }
        heap.mallinfo();

        assert!(!heap.lock.held.get());
        assert!(heap.lock.acquired.get() >= 8);
    }

    #[test]
    fn failure_paths_release_the_lock() {
        let mut heap = Heap::with_lock(FixedHeap::new(128), CountingLock::default());

        assert_eq!(Err(AllocError::OutOfMemory), heap.malloc(4096));
        assert!(!heap.lock.held.get());
    }

    #[test]
    fn spin_locked_heap_works() {
        let mut heap = Heap::with_lock(FixedHeap::new(4096), SpinLock::new());

        let ptr = heap.malloc(64).unwrap();
        unsafe { heap.free(ptr.as_ptr()).unwrap() };

        assert_eq!(heap.mallinfo().total, heap.mallinfo().free);
    }
}
