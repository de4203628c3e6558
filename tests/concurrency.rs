//! Multi-thread stress for the lockable and lockless arenas.
//!
//! Blocks are stamped with a thread-unique pattern between alloc and
//! put; a pattern mismatch means two threads were handed the same live
//! block (or a slab was torn down under a live block).

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use slabpool::{LockablePool, LocklessPool, REFERABLE, SLOTS_NUM, SlabClass};

unsafe fn count_up(_obj: *mut u8, ctag: *mut ()) {
    unsafe { &*(ctag as *const AtomicUsize) }.fetch_add(1, Ordering::Relaxed);
}

unsafe fn count_down(_obj: *mut u8, ctag: *mut ()) {
    unsafe { &*(ctag as *const AtomicUsize) }.fetch_sub(1, Ordering::Relaxed);
}

fn stamp(blk: *mut u8, len: usize, seed: usize) {
    for i in 0..len {
        unsafe { *blk.add(i) = ((seed.wrapping_add(i).wrapping_mul(0x9E37_79B9)) & 0xFF) as u8 };
    }
}

fn check(blk: *mut u8, len: usize, seed: usize) -> bool {
    (0..len).all(|i| {
        (unsafe { *blk.add(i) })
            == ((seed.wrapping_add(i).wrapping_mul(0x9E37_79B9)) & 0xFF) as u8
    })
}

#[test]
fn lockable_two_threads_alloc_put_cycles() {
    let live = Arc::new(AtomicUsize::new(0));
    let mut class = SlabClass::new(64);
    class.ctag = Arc::as_ptr(&live) as *mut ();
    class.ctor = Some(count_up);
    class.dtor = Some(count_down);

    let pool = Arc::new(LockablePool::create(REFERABLE, &class, 0).unwrap());

    let handles: Vec<_> = (0..2)
        .map(|tid| {
            let p = Arc::clone(&pool);
            std::thread::spawn(move || {
                for i in 0..20_000usize {
                    unsafe {
                        let blk = p.alloc();
                        assert!(!blk.is_null());
                        let seed = tid * 0x0101_0101 + i;
                        stamp(blk, 64, seed);
                        assert!(check(blk, 64, seed), "thread {tid} lost block at {i}");
                        assert!(p.put(blk).is_null());
                    }
                }
            })
        })
        .collect();
    for h in handles {
        h.join().unwrap();
    }

    // At most two blocks were ever live, so one slab covered the whole
    // run: the constructor ran exactly once per slot.
    assert_eq!(live.load(Ordering::Relaxed), SLOTS_NUM);
    drop(pool);
    assert_eq!(live.load(Ordering::Relaxed), 0);
}

#[test]
fn lockless_mixed_ops_many_threads() {
    let live = Arc::new(AtomicUsize::new(0));
    let mut class = SlabClass::new(64);
    class.ctag = Arc::as_ptr(&live) as *mut ();
    class.ctor = Some(count_up);
    class.dtor = Some(count_down);

    let pool = Arc::new(LocklessPool::create(REFERABLE, &class, 2 * SLOTS_NUM as u32).unwrap());

    let handles: Vec<_> = (0..8)
        .map(|tid| {
            let p = Arc::clone(&pool);
            std::thread::spawn(move || {
                let mut held: Vec<(*mut u8, usize)> = Vec::new();
                for i in 0..10_000usize {
                    unsafe {
                        let blk = p.alloc();
                        assert!(!blk.is_null());
                        let seed = tid * 0x0101_0101 + i;
                        stamp(blk, 64, seed);

                        // Keep a small working set live to force slab
                        // sharing between threads.
                        held.push((blk, seed));
                        if held.len() > 8 {
                            let (old, old_seed) = held.remove(0);
                            assert!(check(old, 64, old_seed), "thread {tid} corrupted at {i}");
                            assert_eq!(p.get(old), old);
                            assert_eq!(p.put(old), old);
                            assert!(p.put(old).is_null());
                        }
                    }
                }
                for (blk, seed) in held {
                    unsafe {
                        assert!(check(blk, 64, seed));
                        assert!(p.put(blk).is_null());
                    }
                }
            })
        })
        .collect();
    for h in handles {
        h.join().unwrap();
    }

    unsafe { pool.reap() };
    drop(pool);
    // Every slab ever created was destroyed exactly once.
    assert_eq!(live.load(Ordering::Relaxed), 0);
}

#[test]
fn lockless_reap_races_allocation() {
    let class = SlabClass::new(32);
    let pool = Arc::new(LocklessPool::create(0, &class, 4 * SLOTS_NUM as u32).unwrap());

    let workers: Vec<_> = (0..4)
        .map(|_| {
            let p = Arc::clone(&pool);
            std::thread::spawn(move || {
                for _ in 0..5_000 {
                    unsafe {
                        let blk = p.alloc();
                        assert!(!blk.is_null());
                        blk.write_bytes(0xA5, 32);
                        assert!(p.put(blk).is_null());
                    }
                }
            })
        })
        .collect();

    let reaper = {
        let p = Arc::clone(&pool);
        std::thread::spawn(move || {
            for _ in 0..200 {
                unsafe { p.reap() };
                std::thread::yield_now();
            }
        })
    };

    for h in workers {
        h.join().unwrap();
    }
    reaper.join().unwrap();
}
