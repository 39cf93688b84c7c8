//! Using a [`Heap`] as the program's global allocator.
//!
//! [`GlobalHeap`] puts the whole heap behind a spin mutex and implements
//! [`GlobalAlloc`] on top of the `malloc` family, so the allocator can be
//! registered with `#[global_allocator]`:
//!
//! ```rust,ignore
//! use nanoheap::{GlobalHeap, SbrkHeap};
//!
//! #[global_allocator]
//! static HEAP: GlobalHeap<SbrkHeap> = GlobalHeap::new(SbrkHeap::new());
//! ```
//!
//! Layouts whose alignment fits [`MALLOC_ALIGN`] go through `malloc`;
//! anything bigger goes through `memalign`.

use crate::chunk::MALLOC_ALIGN;
use crate::heap::{Heap, HeapStats};
use crate::lock::NoLock;
use crate::platform::HeapSource;
use core::alloc::{GlobalAlloc, Layout};
use std::ptr::{self, NonNull};

/// A [`Heap`] behind a spin mutex, usable as `#[global_allocator]`.
///
/// The mutex covers whole operations, so the inner heap runs with
/// [`NoLock`].
pub struct GlobalHeap<S> {
    inner: spin::Mutex<Heap<S, NoLock>>,
}

impl<S: HeapSource> GlobalHeap<S> {
    pub const fn new(source: S) -> Self {
        Self {
            inner: spin::Mutex::new(Heap::new(source)),
        }
    }

    /// Current heap accounting.
    pub fn stats(&self) -> HeapStats {
        self.inner.lock().mallinfo()
    }
}

unsafe impl<S: HeapSource + Send> GlobalAlloc for GlobalHeap<S> {
    unsafe fn alloc(&self, layout: Layout) -> *mut u8 {
        let mut heap = self.inner.lock();

        let result = if layout.align() <= MALLOC_ALIGN {
            heap.malloc(layout.size())
        } else {
            heap.memalign(layout.align(), layout.size())
        };

        result.map_or(ptr::null_mut(), NonNull::as_ptr)
    }

    unsafe fn dealloc(&self, ptr: *mut u8, _layout: Layout) {
        // GlobalAlloc has no error channel; a detected double free leaks
        // the chunk, which is the allocator's documented behavior anyway.
        let _ = unsafe { self.inner.lock().free(ptr) };
    }

    unsafe fn realloc(&self, ptr: *mut u8, layout: Layout, new_size: usize) -> *mut u8 {
        if layout.align() <= MALLOC_ALIGN {
            let result = unsafe { self.inner.lock().realloc(ptr, new_size) };
            return match result {
                Ok(Some(new)) => new.as_ptr(),
                Ok(None) | Err(_) => ptr::null_mut(),
            };
        }

        // Over-aligned layout: realloc() would only keep MALLOC_ALIGN, so
        // go through a fresh aligned allocation and copy.
        let new = unsafe { self.alloc(Layout::from_size_align_unchecked(new_size, layout.align())) };
        if !new.is_null() {
            unsafe {
                ptr::copy_nonoverlapping(ptr, new, layout.size().min(new_size));
                self.dealloc(ptr, layout);
            }
        }

        new
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::platform::FixedHeap;

    fn global() -> GlobalHeap<FixedHeap> {
        GlobalHeap::new(FixedHeap::new(64 * 1024))
    }

    #[test]
    fn alloc_and_dealloc_round_trip() {
        let heap = global();
        let layout = Layout::from_size_align(64, 8).unwrap();

        unsafe {
            let ptr = heap.alloc(layout);
            assert!(!ptr.is_null());

            ptr.write_bytes(0x7f, 64);
            heap.dealloc(ptr, layout);
        }

        let stats = heap.stats();
        assert_eq!(stats.total, stats.free);
    }

    #[test]
    fn over_aligned_layouts_go_through_memalign() {
        let heap = global();
        let layout = Layout::from_size_align(32, 256).unwrap();

        unsafe {
            let ptr = heap.alloc(layout);
            assert!(!ptr.is_null());
            assert_eq!(0, ptr as usize % 256);
            heap.dealloc(ptr, layout);
        }
    }

    #[test]
    fn alloc_zeroed_is_zero() {
        let heap = global();
        let layout = Layout::from_size_align(128, 8).unwrap();

        unsafe {
            let ptr = heap.alloc_zeroed(layout);
            assert!(!ptr.is_null());
            for offset in 0..128 {
                assert_eq!(0, *ptr.add(offset));
            }
        }
    }

    #[test]
    fn realloc_preserves_data() {
        let heap = global();
        let layout = Layout::from_size_align(16, 8).unwrap();

        unsafe {
            let ptr = heap.alloc(layout);
            for offset in 0..16 {
                *ptr.add(offset) = offset as u8;
            }

            let grown = heap.realloc(ptr, layout, 512);
            assert!(!grown.is_null());
            for offset in 0..16 {
                assert_eq!(offset as u8, *grown.add(offset));
            }
        }
    }

    #[test]
    fn exhausted_global_heap_returns_null() {
        let heap = GlobalHeap::new(FixedHeap::new(128));
        let layout = Layout::from_size_align(4096, 8).unwrap();

        unsafe {
            assert!(heap.alloc(layout).is_null());
        }
    }

    #[test]
    fn works_as_a_vec_backing_store() {
        // Drive it through the GlobalAlloc interface the way the runtime
        // would, without registering it process-wide.
        let heap = global();

        unsafe {
            let layout = Layout::array::<u64>(8).unwrap();
            let ptr = heap.alloc(layout).cast::<u64>();
            for index in 0..8 {
                ptr.add(index).write(index as u64 * 10);
            }

            let grown = heap
                .realloc(ptr.cast(), layout, Layout::array::<u64>(16).unwrap().size())
                .cast::<u64>();
            for index in 0..8 {
                assert_eq!(index as u64 * 10, grown.add(index).read());
            }

            heap.dealloc(grown.cast(), Layout::array::<u64>(16).unwrap());
        }
    }
}
