//! Registers the allocator as the program's global allocator and lets the
//! standard library allocate through it.

use nanoheap::GlobalHeap;
use std::thread;

#[cfg(unix)]
#[global_allocator]
static HEAP: GlobalHeap<nanoheap::SbrkHeap> = GlobalHeap::new(nanoheap::SbrkHeap::new());

#[cfg(windows)]
#[global_allocator]
static HEAP: GlobalHeap<nanoheap::VirtualHeap> = GlobalHeap::new(nanoheap::VirtualHeap::new());

fn main() {
    // Box example
    let val_box = Box::new(22);
    println!("Box value: {}, at: {:p}", val_box, val_box);

    // Vec example
    let mut v = Vec::new();
    for i in 0..5 {
        v.push(i * 10);
        println!("Added {}; capacity: {}; at: {:p}", v[i], v.capacity(), v.as_ptr());
    }

    // String example
    let msg = String::from("Heap testing");
    println!("String '{}' - at: {:p}", msg, msg.as_ptr());

    // Reuse example
    let a = Box::new([0u8; 64]);
    let b = Box::new([0u8; 64]);
    let ptr_a = a.as_ptr();

    drop(a);
    drop(b);

    let c = Box::new([0u8; 128]);
    if ptr_a == c.as_ptr() {
        println!("Merged chunks reused at {:p}", c.as_ptr());
    } else {
        println!("Not reused: a was at {:p}, c is at {:p}", ptr_a, c.as_ptr());
    }

    // Thread example
    let t1 = thread::spawn(|| {
        let _ = Box::new(222);
    });
    let t2 = thread::spawn(|| {
        let _ = Box::new(222);
    });
    t1.join().unwrap();
    t2.join().unwrap();

    println!("\n{}", HEAP.stats());
}
