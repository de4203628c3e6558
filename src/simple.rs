//! Single-threaded arena: one slab list, no synchronization.
//!
//! The interior `UnsafeCell` keeps the pool `!Sync`, so the
//! no-concurrent-callers contract is enforced by the type system rather
//! than by the caller's discipline alone.

use core::cell::UnsafeCell;

use crate::pool::{self, Arena, PoolCore};
use crate::slab::SlabList;

pub struct SimpleArena {
    list: UnsafeCell<SlabList>,
}

impl SimpleArena {
    #[allow(clippy::mut_from_ref)]
    unsafe fn list(&self) -> &mut SlabList {
        unsafe { &mut *self.list.get() }
    }
}

impl Arena for SimpleArena {
    fn create(core: &PoolCore) -> Option<Self> {
        let mut list = SlabList::new();
        if !unsafe { list.prepopulate(core, core.init_blocks) } {
            unsafe { list.destroy_all(core) };
            return None;
        }
        Some(Self {
            list: UnsafeCell::new(list),
        })
    }

    unsafe fn alloc(&self, core: &PoolCore) -> *mut u8 {
        unsafe { self.list().alloc_block(core) }
    }

    unsafe fn get(&self, core: &PoolCore, blk: *mut u8) -> *mut u8 {
        unsafe { pool::list_get(core, blk) }
    }

    unsafe fn put(&self, core: &PoolCore, blk: *mut u8) -> *mut u8 {
        unsafe { pool::list_put(self.list(), core, blk) }
    }

    unsafe fn reap(&self, core: &PoolCore) {
        unsafe { self.list().reap(core) }
    }

    unsafe fn destroy(&mut self, core: &PoolCore) {
        unsafe { self.list.get_mut().destroy_all(core) }
    }
}

#[cfg(test)]
mod tests {
    use crate::class::{REFERABLE, SlabClass};
    use crate::pool::SimplePool;
    use crate::slab::SLOTS_NUM;
    use std::sync::atomic::{AtomicUsize, Ordering};

    unsafe fn count_up(_obj: *mut u8, ctag: *mut ()) {
        unsafe { &*(ctag as *const AtomicUsize) }.fetch_add(1, Ordering::Relaxed);
    }

    #[test]
    fn test_alloc_put_roundtrip() {
        let class = SlabClass::new(24);
        let pool = SimplePool::create(0, &class, 0).unwrap();
        unsafe {
            let a = pool.alloc();
            assert!(!a.is_null());
            assert_eq!(a as usize % pool.align(), 0);
            assert!(pool.put(a).is_null());
            // The slot comes straight back.
            let b = pool.alloc();
            assert_eq!(a, b);
            assert!(pool.put(b).is_null());
        }
    }

    #[test]
    fn test_get_is_noop_without_refcounting() {
        let class = SlabClass::new(8);
        let pool = SimplePool::create(0, &class, 0).unwrap();
        unsafe {
            let a = pool.alloc();
            assert_eq!(pool.get(a), a);
            // One put releases regardless of prior gets.
            assert!(pool.put(a).is_null());
        }
    }

    #[test]
    fn test_referable_counting() {
        let class = SlabClass::new(40);
        let pool = SimplePool::create(REFERABLE, &class, SLOTS_NUM as u32).unwrap();
        unsafe {
            let a = pool.alloc();
            assert_eq!(pool.get(a), a);
            assert_eq!(pool.get(a), a);
            assert_eq!(pool.put(a), a);
            assert_eq!(pool.put(a), a);
            assert!(pool.put(a).is_null());
        }
    }

    #[test]
    fn test_reinit_runs_on_every_release() {
        let recycled = AtomicUsize::new(0);
        let mut class = SlabClass::new(8);
        class.ctag = &recycled as *const AtomicUsize as *mut ();
        class.reinit = Some(count_up);

        let pool = SimplePool::create(0, &class, 0).unwrap();
        unsafe {
            for _ in 0..5 {
                let a = pool.alloc();
                assert!(pool.put(a).is_null());
            }
        }
        assert_eq!(recycled.load(Ordering::Relaxed), 5);
        // Returning a block never re-runs the constructor; reinit is the
        // only per-cycle hook.
    }

    #[test]
    fn test_empty_pool_create_free() {
        let class = SlabClass::new(1);
        drop(SimplePool::create(0, &class, 0).unwrap());
    }
}
