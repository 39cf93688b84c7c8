//! Walks through the core allocator operations on a fixed in-process
//! heap and prints what comes back.

use nanoheap::{FixedHeap, Heap};

fn main() {
    let mut heap = Heap::new(FixedHeap::new(64 * 1024));

    let a = heap.malloc(100).unwrap();
    println!("malloc(100)      -> {:p}", a.as_ptr());

    let b = heap.malloc(8).unwrap();
    println!("malloc(8)        -> {:p}", b.as_ptr());

    let c = heap.memalign(256, 32).unwrap();
    println!("memalign(256,32) -> {:p} (aligned: {})", c.as_ptr(), c.as_ptr() as usize % 256 == 0);

    unsafe {
        println!("usable_size(a)   -> {}", heap.usable_size(a));

        println!("free(a)");
        heap.free(a.as_ptr()).unwrap();

        let d = heap.malloc(100).unwrap();
        println!("malloc(100)      -> {:p} (reused a: {})", d.as_ptr(), d == a);

        heap.free(d.as_ptr()).unwrap();
        heap.free(b.as_ptr()).unwrap();
        heap.free(c.as_ptr()).unwrap();
    }

    println!("\n{}", heap.mallinfo());
}
