//! Global-mutex arena.
//!
//! Every public operation takes one mutex around the slab-list mutation,
//! so operations are serialized and linearizable. A poisoned mutex (a
//! thread panicked while holding it) marks the pool as wrecked: every
//! operation turns into a null-returning no-op, which doubles as a
//! detector for callers racing a destroyed pool.

use std::sync::Mutex;

use crate::pool::{self, Arena, PoolCore};
use crate::slab::SlabList;

pub struct LockableArena {
    list: Mutex<SlabList>,
}

impl Arena for LockableArena {
    fn create(core: &PoolCore) -> Option<Self> {
        let mut list = SlabList::new();
        if !unsafe { list.prepopulate(core, core.init_blocks) } {
            unsafe { list.destroy_all(core) };
            return None;
        }
        Some(Self {
            list: Mutex::new(list),
        })
    }

    unsafe fn alloc(&self, core: &PoolCore) -> *mut u8 {
        let Ok(mut list) = self.list.lock() else {
            return core::ptr::null_mut();
        };
        unsafe { list.alloc_block(core) }
    }

    unsafe fn get(&self, core: &PoolCore, blk: *mut u8) -> *mut u8 {
        // The counter is a plain integer; the lock covers it too.
        let Ok(_list) = self.list.lock() else {
            return core::ptr::null_mut();
        };
        unsafe { pool::list_get(core, blk) }
    }

    unsafe fn put(&self, core: &PoolCore, blk: *mut u8) -> *mut u8 {
        let Ok(mut list) = self.list.lock() else {
            return core::ptr::null_mut();
        };
        unsafe { pool::list_put(&mut list, core, blk) }
    }

    unsafe fn reap(&self, core: &PoolCore) {
        if let Ok(mut list) = self.list.lock() {
            unsafe { list.reap(core) };
        }
    }

    unsafe fn destroy(&mut self, core: &PoolCore) {
        match self.list.get_mut() {
            Ok(list) => unsafe { list.destroy_all(core) },
            // Poisoned mid-operation: the chain may be inconsistent, so
            // the slabs are leaked rather than walked.
            Err(_) => log::debug!("poisoned pool dropped without teardown"),
        }
    }
}

#[cfg(test)]
mod tests {
    use crate::class::{REFERABLE, SlabClass};
    use crate::pool::LockablePool;
    use std::sync::Arc;

    #[test]
    fn test_shared_across_threads() {
        let class = SlabClass::new(64);
        let pool = Arc::new(LockablePool::create(0, &class, 64).unwrap());

        let handles: Vec<_> = (0..4)
            .map(|_| {
                let p = Arc::clone(&pool);
                std::thread::spawn(move || {
                    for _ in 0..1_000 {
                        unsafe {
                            let blk = p.alloc();
                            assert!(!blk.is_null());
                            // Exclusive ownership between alloc and put.
                            blk.write_bytes(0x5A, p.block_size());
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
    fn test_referable_get_put_under_lock() {
        let class = SlabClass::new(16);
        let pool = Arc::new(LockablePool::create(REFERABLE, &class, 0).unwrap());
        unsafe {
            let blk = pool.alloc();
            assert_eq!(pool.get(blk), blk);
            assert_eq!(pool.put(blk), blk);
            assert!(pool.put(blk).is_null());
        }
    }

    #[test]
    fn test_reap_after_churn() {
        let class = SlabClass::new(32);
        let pool = LockablePool::create(0, &class, 0).unwrap();
        unsafe {
            let blocks: Vec<_> = (0..100).map(|_| pool.alloc()).collect();
            for blk in blocks.into_iter().rev() {
                assert!(pool.put(blk).is_null());
            }
            pool.reap();
            // Everything was free; the next allocation starts from a
            // fresh slab.
            let blk = pool.alloc();
            assert!(!blk.is_null());
            assert!(pool.put(blk).is_null());
        }
    }
}
