//! Mutual exclusion for the heap, supplied by the embedder.
//!
//! The allocator performs no blocking, retrying or backoff of its own; it
//! only brackets every free-list mutation (and the heap-growth call) with
//! [`HeapLock::acquire`]/[`HeapLock::release`]. Concurrent use is correct
//! exactly when the injected lock provides real exclusion; with [`NoLock`]
//! on a single-threaded target, concurrent invocation is undefined.

/// An externally supplied lock/unlock pair. Must nest correctly with every
/// allocator entry point; re-entrancy is not required.
pub trait HeapLock {
    fn acquire(&self);
    fn release(&self);
}

/// No-op lock for single-threaded targets. This is the default.
#[derive(Default)]
pub struct NoLock;

impl HeapLock for NoLock {
    #[inline]
    fn acquire(&self) {}

    #[inline]
    fn release(&self) {}
}

/// Spin lock for targets where threads (or interrupt handlers on separate
/// cores) share one heap.
pub struct SpinLock {
    inner: spin::Mutex<()>,
}

impl SpinLock {
    pub const fn new() -> Self {
        Self {
            inner: spin::Mutex::new(()),
        }
    }
}

impl Default for SpinLock {
    fn default() -> Self {
        Self::new()
    }
}

impl HeapLock for SpinLock {
    fn acquire(&self) {
        // The guard is dropped in release(); the acquire/release bracket
        // never crosses an allocator entry point.
        core::mem::forget(self.inner.lock());
    }

    fn release(&self) {
        debug_assert!(self.inner.is_locked());
        // Safety: acquire() leaked the guard of this same mutex.
        unsafe { self.inner.force_unlock() }
    }
}
