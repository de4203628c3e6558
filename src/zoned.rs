//! Thread-local zoned arena.
//!
//! Every thread sees its own slab list (zone), lazily created and
//! prepopulated on that thread's first access, so there is no contention
//! — and no cross-thread block migration: a block must be put on the
//! thread that allocated it. Zones die with their thread; dropping the
//! pool only releases the outer handle, which is why each zone carries
//! its own copy of the pool core.

use core::cell::RefCell;
use core::sync::atomic::{AtomicU64, Ordering};

use hashbrown::HashMap;
use hashbrown::hash_map::Entry;

use crate::pool::{self, Arena, PoolCore};
use crate::slab::SlabList;

/// Zone keys survive their pool: ids are never reused.
static NEXT_POOL_ID: AtomicU64 = AtomicU64::new(1);

struct Zone {
    list: SlabList,
    core: PoolCore,
}

impl Drop for Zone {
    fn drop(&mut self) {
        // Thread exit: this thread's slabs go down, destructors and all.
        unsafe { self.list.destroy_all(&self.core) };
    }
}

thread_local! {
    static ZONES: RefCell<HashMap<u64, Zone>> = RefCell::new(HashMap::new());
}

pub struct ZonedArena {
    id: u64,
}

impl ZonedArena {
    /// Run `f` on the calling thread's zone, creating and prepopulating
    /// it on first access. `None` when creation fails or thread-local
    /// storage is already gone.
    fn with_zone<R>(&self, core: &PoolCore, f: impl FnOnce(&mut SlabList) -> R) -> Option<R> {
        ZONES
            .try_with(|zones| {
                let mut zones = zones.borrow_mut();
                let zone = match zones.entry(self.id) {
                    Entry::Occupied(e) => e.into_mut(),
                    Entry::Vacant(e) => {
                        let mut list = SlabList::new();
                        if !unsafe { list.prepopulate(core, core.init_blocks) } {
                            unsafe { list.destroy_all(core) };
                            return None;
                        }
                        e.insert(Zone { list, core: *core })
                    }
                };
                Some(f(&mut zone.list))
            })
            .ok()
            .flatten()
    }
}

impl Arena for ZonedArena {
    fn create(core: &PoolCore) -> Option<Self> {
        let _ = core;
        Some(Self {
            id: NEXT_POOL_ID.fetch_add(1, Ordering::Relaxed),
        })
    }

    unsafe fn alloc(&self, core: &PoolCore) -> *mut u8 {
        self.with_zone(core, |list| unsafe { list.alloc_block(core) })
            .unwrap_or(core::ptr::null_mut())
    }

    unsafe fn get(&self, core: &PoolCore, blk: *mut u8) -> *mut u8 {
        // The counter belongs to this thread's zone by contract.
        unsafe { pool::list_get(core, blk) }
    }

    unsafe fn put(&self, core: &PoolCore, blk: *mut u8) -> *mut u8 {
        self.with_zone(core, |list| unsafe { pool::list_put(list, core, blk) })
            .unwrap_or(core::ptr::null_mut())
    }

    unsafe fn reap(&self, core: &PoolCore) {
        let _ = ZONES.try_with(|zones| {
            if let Some(zone) = zones.borrow_mut().get_mut(&self.id) {
                unsafe { zone.list.reap(core) };
            }
        });
    }

    unsafe fn destroy(&mut self, core: &PoolCore) {
        // Outer handle only: per-thread zones are reclaimed by the
        // thread-exit hook, including the creating thread's own.
        let _ = core;
    }
}

#[cfg(test)]
mod tests {
    use crate::class::SlabClass;
    use crate::pool::ZonedPool;
    use crate::slab::SLOTS_NUM;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    unsafe fn count_up(_obj: *mut u8, ctag: *mut ()) {
        unsafe { &*(ctag as *const AtomicUsize) }.fetch_add(1, Ordering::Relaxed);
    }

    unsafe fn count_down(_obj: *mut u8, ctag: *mut ()) {
        unsafe { &*(ctag as *const AtomicUsize) }.fetch_sub(1, Ordering::Relaxed);
    }

    #[test]
    fn test_per_thread_round_trip() {
        let class = SlabClass::new(48);
        let pool = Arc::new(ZonedPool::create(0, &class, 32).unwrap());

        let handles: Vec<_> = (0..4)
            .map(|_| {
                let p = Arc::clone(&pool);
                std::thread::spawn(move || {
                    for _ in 0..500 {
                        unsafe {
                            let blk = p.alloc();
                            assert!(!blk.is_null());
                            assert!(p.put(blk).is_null());
                        }
                    }
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }
    }

    #[test]
    fn test_zones_are_disjoint() {
        let class = SlabClass::new(8);
        let pool = Arc::new(ZonedPool::create(0, &class, 0).unwrap());

        let local = unsafe { pool.alloc() } as usize;
        let p = Arc::clone(&pool);
        let remote = std::thread::spawn(move || unsafe { p.alloc() } as usize)
            .join()
            .unwrap();

        // Different threads draw from different slabs.
        assert_ne!(local, remote);
        unsafe {
            assert!(pool.put(local as *mut u8).is_null());
        }
    }

    #[test]
    fn test_thread_exit_destroys_zone() {
        static LIVE: AtomicUsize = AtomicUsize::new(0);

        let mut class = SlabClass::new(16);
        class.ctag = &LIVE as *const AtomicUsize as *mut ();
        class.ctor = Some(count_up);
        class.dtor = Some(count_down);

        let pool = Arc::new(ZonedPool::create(0, &class, 0).unwrap());
        let p = Arc::clone(&pool);
        std::thread::spawn(move || unsafe {
            let blk = p.alloc();
            assert_eq!(LIVE.load(Ordering::Relaxed), SLOTS_NUM);
            assert!(p.put(blk).is_null());
            // Zone teardown happens after this closure returns.
        })
        .join()
        .unwrap();

        assert_eq!(LIVE.load(Ordering::Relaxed), 0);
    }

    #[test]
    fn test_pool_free_leaves_other_zones_alone() {
        static LIVE: AtomicUsize = AtomicUsize::new(0);

        let mut class = SlabClass::new(16);
        class.ctag = &LIVE as *const AtomicUsize as *mut ();
        class.ctor = Some(count_up);
        class.dtor = Some(count_down);

        let pool = Arc::new(ZonedPool::create(0, &class, 0).unwrap());

        use std::sync::mpsc;
        let (ready_tx, ready_rx) = mpsc::channel();
        let (done_tx, done_rx) = mpsc::channel::<()>();

        let p = Arc::clone(&pool);
        let worker = std::thread::spawn(move || {
            unsafe {
                let blk = p.alloc();
                assert!(p.put(blk).is_null());
            }
            drop(p);
            ready_tx.send(()).unwrap();
            // Keep the thread (and its zone) alive past the pool drop.
            done_rx.recv().unwrap();
        });

        ready_rx.recv().unwrap();
        drop(pool);
        // The worker's zone is still alive after the handle went away.
        assert_eq!(LIVE.load(Ordering::Relaxed), SLOTS_NUM);

        done_tx.send(()).unwrap();
        worker.join().unwrap();
        assert_eq!(LIVE.load(Ordering::Relaxed), 0);
    }

    #[test]
    fn test_reap_scopes_to_calling_thread() {
        let class = SlabClass::new(8);
        let pool = ZonedPool::create(0, &class, 64).unwrap();
        unsafe {
            let blk = pool.alloc();
            pool.reap();
            // The free slab behind the head is gone; the block survives.
            blk.write(0x7E);
            assert_eq!(blk.read(), 0x7E);
            assert!(pool.put(blk).is_null());
        }
    }
}
