use poolfit::{GlobalPool, InitError, ALIGN, REQUEST_LIMIT};
use std::{
    alloc::{GlobalAlloc, Layout},
    ptr::NonNull,
};

#[derive(Clone, Copy)]
#[repr(align(64))]
struct Align<T>(T);

fn leak_region(len: usize) -> NonNull<[u8]> {
    assert_eq!(len % 64, 0);
    let v: Vec<Align<[u8; 64]>> = vec![Align([0u8; 64]); len / 64];
    let slice = Box::leak(v.into_boxed_slice());
    NonNull::new(std::ptr::slice_from_raw_parts_mut(
        slice.as_mut_ptr() as *mut u8,
        len,
    ))
    .unwrap()
}

static HEAP: GlobalPool = GlobalPool::INIT;

#[test]
fn global_pool() {
    let size = unsafe { HEAP.init(leak_region(65536)) }.unwrap();
    assert!(size > 0);
    assert_eq!(HEAP.used_size(), 65536 - size);
    assert!(HEAP.max_size() >= HEAP.used_size());

    // The direct interface
    let used = HEAP.used_size();
    let p = HEAP.allocate(100).unwrap();
    assert_eq!(p.as_ptr() as usize % ALIGN, 0);
    unsafe {
        p.as_ptr().write_bytes(0xa5, 100);
        HEAP.deallocate(p.as_ptr());
    }
    assert_eq!(HEAP.used_size(), used);

    // The `GlobalAlloc` interface
    unsafe {
        let layout = Layout::from_size_align(256, 8).unwrap();
        let p = HEAP.alloc(layout);
        assert!(!p.is_null());
        p.write_bytes(0x5a, 256);
        HEAP.dealloc(p, layout);

        // Alignment above the word pair is refused
        let over_aligned = Layout::from_size_align(64, ALIGN * 2).unwrap();
        assert!(HEAP.alloc(over_aligned).is_null());
    }

    // The ceiling is inclusive
    let p = HEAP.allocate(REQUEST_LIMIT).unwrap();
    unsafe { HEAP.deallocate(p.as_ptr()) };
    assert_eq!(HEAP.allocate(REQUEST_LIMIT + 1), None);

    // A null free is a no-op
    unsafe { HEAP.deallocate(std::ptr::null_mut()) };

    // Hammer the pool from several threads; the internal lock serializes
    let threads: Vec<_> = (0..4)
        .map(|i| {
            std::thread::spawn(move || {
                for k in 0..1000 {
                    if let Some(p) = HEAP.allocate(64 + (i * 16 + k) % 256) {
                        unsafe { HEAP.deallocate(p.as_ptr()) };
                    }
                }
            })
        })
        .collect();
    for t in threads {
        t.join().unwrap();
    }
}

#[test]
fn unbound_pool() {
    static IDLE: GlobalPool = GlobalPool::INIT;
    assert_eq!(IDLE.allocate(16), None);
    assert_eq!(IDLE.used_size(), 0);
    assert_eq!(IDLE.max_size(), 0);
    unsafe { IDLE.deallocate(std::ptr::null_mut()) };
}

#[test]
fn undersized_region() {
    static POOL: GlobalPool = GlobalPool::INIT;
    assert_eq!(
        unsafe { POOL.init(leak_region(64)) },
        Err(InitError::TooSmall)
    );
    assert_eq!(POOL.allocate(16), None);
}
