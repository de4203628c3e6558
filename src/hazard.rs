//! Hazard-pointer registry for the lockless arena.
//!
//! Before dereferencing a stack node, a thread publishes the node's
//! address in one of the [`config::HAZARD_SLOTS`] slots of its record
//! and re-validates the stack head; a reclaimer must observe no hazard
//! on a slab before destroying it. Records form a process-wide
//! doubly-linked list: registration and deregistration take a write
//! spinlock, while scans run lock-free under a reader counter that
//! deregistration drains before freeing the record.

use core::ptr;
use core::sync::atomic::{AtomicPtr, AtomicUsize, Ordering};

use crate::config::{HAZARD_SLOTS, READER_BACKOFF_SPINS};
use crate::sync::SpinLock;

pub(crate) struct HazardRecord {
    slots: [AtomicUsize; HAZARD_SLOTS],
    next: AtomicPtr<HazardRecord>,
    prev: AtomicPtr<HazardRecord>,
}

struct Registry {
    head: AtomicPtr<HazardRecord>,
    write_lock: SpinLock,
    readers: AtomicUsize,
}

static REGISTRY: Registry = Registry {
    head: AtomicPtr::new(ptr::null_mut()),
    write_lock: SpinLock::new(),
    readers: AtomicUsize::new(0),
};

fn register() -> *mut HazardRecord {
    let rec = Box::into_raw(Box::new(HazardRecord {
        slots: [const { AtomicUsize::new(0) }; HAZARD_SLOTS],
        next: AtomicPtr::new(ptr::null_mut()),
        prev: AtomicPtr::new(ptr::null_mut()),
    }));
    let _guard = REGISTRY.write_lock.lock();
    let head = REGISTRY.head.load(Ordering::Relaxed);
    unsafe {
        (*rec).next.store(head, Ordering::Relaxed);
        if !head.is_null() {
            (*head).prev.store(rec, Ordering::Relaxed);
        }
    }
    REGISTRY.head.store(rec, Ordering::Release);
    rec
}

fn deregister(rec: *mut HazardRecord) {
    {
        let _guard = REGISTRY.write_lock.lock();
        unsafe {
            let prev = (*rec).prev.load(Ordering::Relaxed);
            let next = (*rec).next.load(Ordering::Relaxed);
            if prev.is_null() {
                REGISTRY.head.store(next, Ordering::Release);
            } else {
                (*prev).next.store(next, Ordering::Release);
            }
            if !next.is_null() {
                (*next).prev.store(prev, Ordering::Relaxed);
            }
        }
    }

    // RCU-style quiescence: a scan that started before the unlink may
    // still be standing on this record. Wait it out before freeing.
    let mut spins = 0usize;
    while REGISTRY.readers.load(Ordering::Acquire) != 0 {
        spins += 1;
        if spins > READER_BACKOFF_SPINS {
            std::thread::yield_now();
        } else {
            core::hint::spin_loop();
        }
    }
    drop(unsafe { Box::from_raw(rec) });
}

struct ThreadRecord {
    rec: *mut HazardRecord,
}

impl Drop for ThreadRecord {
    fn drop(&mut self) {
        deregister(self.rec);
    }
}

thread_local! {
    static RECORD: ThreadRecord = ThreadRecord { rec: register() };
}

/// Active protection of one pointer. Clearing happens on drop; an
/// ephemeral record (taken when the thread-local one is already gone
/// during thread teardown) is deregistered with it.
pub(crate) struct HazardGuard {
    slot: *const AtomicUsize,
    ephemeral: *mut HazardRecord,
}

impl Drop for HazardGuard {
    fn drop(&mut self) {
        unsafe { (*self.slot).store(0, Ordering::Release) };
        if !self.ephemeral.is_null() {
            deregister(self.ephemeral);
        }
    }
}

fn claim_slot(rec: *mut HazardRecord, ptr_val: usize) -> *const AtomicUsize {
    let slots = unsafe { &(*rec).slots };
    for slot in slots {
        if slot.load(Ordering::Relaxed) == 0 {
            // SeqCst pairs with the reclaimer's scan: either the scan
            // sees this store, or the publishing thread sees the stack
            // head already changed when it re-validates.
            slot.store(ptr_val, Ordering::SeqCst);
            return slot;
        }
    }
    // The arena never nests more than HAZARD_SLOTS guards per thread.
    debug_assert!(false, "hazard slots exhausted");
    slots[0].store(ptr_val, Ordering::SeqCst);
    &slots[0]
}

/// Publish `ptr` as hazardous for the calling thread. The caller must
/// re-validate its source pointer after this returns, before the first
/// dereference.
pub(crate) fn protect(ptr: *const ()) -> HazardGuard {
    match RECORD.try_with(|r| r.rec) {
        Ok(rec) => HazardGuard {
            slot: claim_slot(rec, ptr as usize),
            ephemeral: ptr::null_mut(),
        },
        // Thread-local storage already torn down: run on a one-shot
        // record instead.
        Err(_) => {
            let rec = register();
            HazardGuard {
                slot: claim_slot(rec, ptr as usize),
                ephemeral: rec,
            }
        }
    }
}

/// Whether any thread currently protects `ptr`. Called by reclaimers
/// after unlinking a node; a hazard published afterwards fails its
/// re-validation and never dereferences the node.
pub(crate) fn is_protected(ptr: *const ()) -> bool {
    REGISTRY.readers.fetch_add(1, Ordering::SeqCst);

    let mut found = false;
    let mut rec = REGISTRY.head.load(Ordering::Acquire);
    'scan: while !rec.is_null() {
        let r = unsafe { &*rec };
        for slot in &r.slots {
            if slot.load(Ordering::SeqCst) == ptr as usize {
                found = true;
                break 'scan;
            }
        }
        rec = r.next.load(Ordering::Acquire);
    }

    REGISTRY.readers.fetch_sub(1, Ordering::Release);
    found
}
