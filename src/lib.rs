//! # nanoheap - a tiny first-fit heap allocator
//!
//! This crate implements the classic `malloc`/`free` family over a single,
//! monotonically growing heap region, for targets that have no virtual
//! memory subsystem to lean on. It trades throughput for small code and
//! one-word-per-allocation overhead.
//!
//! ## How it works
//!
//! The heap is one contiguous region obtained from a minimal "give me a
//! few more bytes" primitive (the [`HeapSource`] trait), carved into
//! chunks:
//!
//! ```text
//!                       The heap region (Arena)
//!
//!   heap start                                           heap end
//!       |                                                    |
//!       v                                                    v
//!       +----------+----------+----------+----------+--------+ - - ->
//!       | size|data| size|    | size|data| size|    | size|da|  grows
//!       +----------+----|-----+----------+----|-----+--------+ - - ->
//!                       |          ^          |        ^
//!                       |   next   |          | next   |
//!       free list ----->+----------+          +--------+---> (end)
//! ```
//!
//! Each chunk is one header word plus payload. Free chunks are linked
//! through their (otherwise unused) payload into a single list, kept
//! strictly sorted by address so that freeing can merge adjacent chunks
//! in one scan. Allocation is first-fit with splitting; freeing is
//! ordered insertion with immediate coalescing. There is no in-use bit
//! anywhere: a chunk is free exactly when it is on the list.
//!
//! ## Quick start
//!
//! ```rust
//! use nanoheap::{FixedHeap, Heap};
//!
//! let mut heap = Heap::new(FixedHeap::new(64 * 1024));
//!
//! let ptr = heap.malloc(100).unwrap();
//! unsafe {
//!     ptr.as_ptr().write_bytes(0, 100);
//!     heap.free(ptr.as_ptr()).unwrap();
//! }
//!
//! let stats = heap.mallinfo();
//! assert_eq!(stats.total, stats.free);
//! ```
//!
//! ## Crate structure
//!
//! ```text
//!   nanoheap
//!   ├── heap     - Heap: malloc/free/calloc/realloc/memalign & stats
//!   ├── freelist - address-ordered free list, split & coalesce
//!   ├── arena    - the heap byte range; bounds-checked chunk access
//!   ├── chunk    - chunk layout, alignment and redirect encoding
//!   ├── platform - HeapSource: fixed buffer, sbrk, VirtualAlloc
//!   ├── lock     - injected mutual exclusion (none, spin)
//!   ├── global   - GlobalAlloc adapter
//!   └── utils    - alignment helpers
//! ```
//!
//! ## Concurrency
//!
//! The allocator itself never blocks and never spins; every free-list
//! mutation happens inside a critical section bracketed by an injected
//! [`HeapLock`]. Pick [`NoLock`] on single-threaded targets, [`SpinLock`]
//! (or your platform's interrupt masking) when the heap is shared, or use
//! [`GlobalHeap`] which wraps everything in a mutex and plugs into
//! `#[global_allocator]`.

mod arena;
mod chunk;
mod error;
mod freelist;
mod global;
mod heap;
mod lock;
mod platform;
mod utils;

pub use chunk::MALLOC_ALIGN;
pub use error::AllocError;
pub use global::GlobalHeap;
pub use heap::{Heap, HeapStats};
pub use lock::{HeapLock, NoLock, SpinLock};
pub use platform::{FixedHeap, HeapSource};

#[cfg(unix)]
pub use platform::SbrkHeap;

#[cfg(windows)]
pub use platform::VirtualHeap;
