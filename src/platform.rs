//! The heap-growth primitive and its platform implementations.
//!
//! The allocator itself has nothing to do with where the heap bytes come
//! from; it only ever asks for "a few more bytes at the end". This trait
//! provides that abstraction so the core can run against a plain in-process
//! buffer on freestanding targets and in tests, against `sbrk` on unix, and
//! against reserved virtual memory on windows.

use std::ptr::NonNull;

/// The "extend the heap" capability. `sbrk` semantics: each call returns
/// the *previous* break, i.e. the start of the newly added bytes.
///
/// The region must be monotonic and contiguous: every successful call
/// extends the same single byte range, and nothing is ever returned. The
/// allocator serializes calls through its own lock; implementations don't
/// need any locking of their own.
pub trait HeapSource {
    /// Requests `n` additional bytes at the end of the heap region.
    /// `extend(0)` probes the current break. Returns `None` when the
    /// platform is out of memory, in which case the break is unchanged.
    ///
    /// # Safety
    ///
    /// The caller must not use the returned region beyond `n` bytes, and
    /// must not call this concurrently with itself outside the allocator's
    /// critical section.
    unsafe fn extend(&mut self, n: usize) -> Option<NonNull<u8>>;
}

/// A heap carved out of an owned, fixed-size buffer.
///
/// This is the stand-in for the static RAM region of a freestanding
/// target, and the test double for everything in this crate: exhaustion is
/// just running off the end of the buffer.
pub struct FixedHeap {
    /// Word storage, so the buffer itself starts word-aligned.
    storage: Box<[usize]>,
    /// Byte offset of the current break inside the buffer.
    brk: usize,
}

impl FixedHeap {
    /// A fixed heap of (at least) `capacity` bytes.
    pub fn new(capacity: usize) -> Self {
        let words = capacity.div_ceil(size_of::<usize>());
        Self {
            storage: vec![0usize; words].into_boxed_slice(),
            brk: 0,
        }
    }

    /// A fixed heap whose initial break is deliberately misaligned by
    /// `skew` bytes, to exercise the growth adapter's realignment step.
    #[cfg(test)]
    pub(crate) fn skewed(capacity: usize, skew: usize) -> Self {
        let mut heap = Self::new(capacity + skew);
        heap.brk = skew;
        heap
    }

    fn capacity(&self) -> usize {
        self.storage.len() * size_of::<usize>()
    }
}

impl HeapSource for FixedHeap {
    unsafe fn extend(&mut self, n: usize) -> Option<NonNull<u8>> {
        if self.brk + n > self.capacity() {
            return None;
        }

        let previous = self.brk;
        self.brk += n;

        // Safety: previous <= capacity, so the offset stays in bounds.
        NonNull::new(unsafe { self.storage.as_mut_ptr().cast::<u8>().add(previous) })
    }
}

/// Program-break heap on top of [`libc::sbrk`].
#[cfg(unix)]
pub struct SbrkHeap;

#[cfg(unix)]
impl SbrkHeap {
    pub const fn new() -> Self {
        Self
    }
}

#[cfg(unix)]
impl Default for SbrkHeap {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(unix)]
impl HeapSource for SbrkHeap {
    unsafe fn extend(&mut self, n: usize) -> Option<NonNull<u8>> {
        unsafe {
            let addr = libc::sbrk(n as libc::intptr_t);

            // sbrk returns -1 if it fails to allocate.
            if addr == usize::MAX as *mut libc::c_void {
                None
            } else {
                NonNull::new(addr.cast::<u8>())
            }
        }
    }
}

/// Reserve-then-commit heap on top of `VirtualAlloc`. Windows has no
/// program break, so a single contiguous range is reserved up front and
/// physical pages are committed as the break moves through it.
#[cfg(windows)]
pub struct VirtualHeap {
    base: *mut u8,
    committed: usize,
    brk: usize,
}

#[cfg(windows)]
mod win {
    use super::{HeapSource, NonNull, VirtualHeap};
    use crate::utils::align_to;
    use std::mem::MaybeUninit;
    use std::os::raw::c_void;
    use windows::Win32::System::{Memory, SystemInformation};

    /// Address space reserved for the whole heap region.
    const RESERVED_SIZE: usize = 64 * 1024 * 1024;

    fn page_size() -> usize {
        unsafe {
            let mut system_info = MaybeUninit::uninit();
            SystemInformation::GetSystemInfo(system_info.as_mut_ptr());

            system_info.assume_init().dwPageSize as usize
        }
    }

    impl VirtualHeap {
        pub const fn new() -> Self {
            Self {
                base: std::ptr::null_mut(),
                committed: 0,
                brk: 0,
            }
        }
    }

    impl Default for VirtualHeap {
        fn default() -> Self {
            Self::new()
        }
    }

    impl HeapSource for VirtualHeap {
        unsafe fn extend(&mut self, n: usize) -> Option<NonNull<u8>> {
            unsafe {
                if self.base.is_null() {
                    let addr = Memory::VirtualAlloc(
                        None,
                        RESERVED_SIZE,
                        Memory::MEM_RESERVE,
                        Memory::PAGE_READWRITE,
                    );
                    if addr.is_null() {
                        return None;
                    }
                    self.base = addr.cast();
                }

                if self.brk + n > RESERVED_SIZE {
                    return None;
                }

                if self.brk + n > self.committed {
                    let target = align_to(self.brk + n, page_size());
                    let addr = Memory::VirtualAlloc(
                        Some(self.base.add(self.committed) as *const c_void),
                        target - self.committed,
                        Memory::MEM_COMMIT,
                        Memory::PAGE_READWRITE,
                    );
                    if addr.is_null() {
                        return None;
                    }
                    self.committed = target;
                }

                let previous = self.brk;
                self.brk += n;

                NonNull::new(self.base.add(previous))
            }
        }
    }

    impl Drop for VirtualHeap {
        fn drop(&mut self) {
            if !self.base.is_null() {
                unsafe {
                    let _ = Memory::VirtualFree(self.base.cast::<c_void>(), 0, Memory::MEM_RELEASE);
                }
            }
        }
    }

    // The reservation is owned exclusively by this value.
    unsafe impl Send for VirtualHeap {}
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fixed_heap_hands_out_sequential_regions() {
        let mut heap = FixedHeap::new(128);

        unsafe {
            let first = heap.extend(32).unwrap();
            let second = heap.extend(32).unwrap();

            assert_eq!(first.as_ptr().add(32), second.as_ptr());
        }
    }

    #[test]
    fn fixed_heap_probe_does_not_move_the_break() {
        let mut heap = FixedHeap::new(64);

        unsafe {
            let probe = heap.extend(0).unwrap();
            let first = heap.extend(16).unwrap();

            assert_eq!(probe, first);
        }
    }

    #[test]
    fn fixed_heap_reports_exhaustion_and_recovers() {
        let mut heap = FixedHeap::new(64);

        unsafe {
            assert!(heap.extend(48).is_some());
            assert!(heap.extend(32).is_none());
            // The break must not have moved on failure.
            assert!(heap.extend(16).is_some());
            assert!(heap.extend(1).is_none());
        }
    }

    #[cfg(unix)]
    #[test]
    fn sbrk_probe_returns_the_break() {
        let mut heap = SbrkHeap::new();

        unsafe {
            let brk = heap.extend(0);
            assert!(brk.is_some());
        }
    }
}
