//! Lock-free arena: Treiber stacks of slabs plus hazard pointers.
//!
//! Slabs live on three atomic stacks (free, partial, full) linked
//! through `Slab::next`. A stack head carries a low tag bit while a pop
//! is claiming the top node; any thread that observes the tag
//! cooperatively advances the head to the tagged node's successor before
//! retrying its own operation. ABA on the head cannot bite because a
//! popped slab is not destroyed while any hazard still references it,
//! and every dereference of a stack node happens under a published
//! hazard.
//!
//! The stacks tolerate stale state: a slab's map keeps changing (puts
//! set bits concurrently) while it sits linked, so poppers re-validate
//! the map and route the slab to the stack matching what they saw.
//! `put` itself never touches a stack; its only slab write is the
//! bit-restore `fetch_or`, which is also its linearization point. Slabs
//! that go full and later drain empty are picked back up by the
//! allocation-side scavenge of the full stack, and by `reap`.

use core::ptr;
use core::sync::atomic::{AtomicUsize, Ordering};

use crate::config::FULL_SCAN_BATCH;
use crate::hazard;
use crate::pool::{Arena, PoolCore};
use crate::refcount;
use crate::slab::{EMPTY_MAP, SLOTS_NUM, Slab};

/// Low bit of a stack head: the top node is being popped.
const TAG_POPPING: usize = 1;

/// Treiber stack of slabs. Only the head word is tagged; `next` links
/// always hold clean pointers.
pub(crate) struct SlabStack {
    head: AtomicUsize,
}

impl SlabStack {
    pub(crate) const fn new() -> Self {
        Self {
            head: AtomicUsize::new(0),
        }
    }

    /// Finish someone else's pop: advance a tagged head to the tagged
    /// node's successor.
    fn help(&self, observed: usize) {
        let node = (observed & !TAG_POPPING) as *mut Slab;
        let _guard = hazard::protect(node as *const ());
        if self.head.load(Ordering::SeqCst) != observed {
            return;
        }
        let next = unsafe { (*node).next.load(Ordering::Acquire) };
        let _ = self.head.compare_exchange(
            observed,
            next as usize,
            Ordering::AcqRel,
            Ordering::Relaxed,
        );
    }

    /// # Safety
    ///
    /// `slab` must be valid and not linked into any stack or list.
    pub(crate) unsafe fn push(&self, slab: *mut Slab) {
        loop {
            let head = self.head.load(Ordering::Acquire);
            if head & TAG_POPPING != 0 {
                self.help(head);
                continue;
            }
            // The link must be visible before the new head is.
            unsafe { (*slab).next.store(head as *mut Slab, Ordering::Release) };
            if self
                .head
                .compare_exchange_weak(head, slab as usize, Ordering::AcqRel, Ordering::Relaxed)
                .is_ok()
            {
                return;
            }
        }
    }

    /// Pop the top slab; null when the stack is empty. The returned slab
    /// is owned by the caller until pushed again.
    pub(crate) fn pop(&self) -> *mut Slab {
        loop {
            let head = self.head.load(Ordering::Acquire);
            if head == 0 {
                return ptr::null_mut();
            }
            if head & TAG_POPPING != 0 {
                self.help(head);
                continue;
            }
            let node = head as *mut Slab;
            let guard = hazard::protect(node as *const ());
            // Re-validate under the hazard before any dereference.
            if self.head.load(Ordering::SeqCst) != head {
                continue;
            }
            if self
                .head
                .compare_exchange(head, head | TAG_POPPING, Ordering::AcqRel, Ordering::Relaxed)
                .is_ok()
            {
                let next = unsafe { (*node).next.load(Ordering::Acquire) };
                // A cooperative pusher may already have advanced the head.
                let _ = self.head.compare_exchange(
                    head | TAG_POPPING,
                    next as usize,
                    Ordering::AcqRel,
                    Ordering::Relaxed,
                );
                drop(guard);
                return node;
            }
        }
    }
}

pub struct LocklessArena {
    free: SlabStack,
    partial: SlabStack,
    full: SlabStack,
}

impl LocklessArena {
    /// Bounded sweep of the full stack for slabs that regained free
    /// slots since they saturated.
    fn scavenge_full(&self) -> *mut Slab {
        for _ in 0..FULL_SCAN_BATCH {
            let slab = self.full.pop();
            if slab.is_null() {
                return ptr::null_mut();
            }
            if unsafe { (*slab).map.load(Ordering::Acquire) } != 0 {
                return slab;
            }
            unsafe { self.full.push(slab) };
        }
        crate::stat_inc!(scavenge_misses);
        ptr::null_mut()
    }

    /// Pop or filter an entire stack, destroying wholly-free slabs that
    /// no thread still hazards, and relinking the rest.
    unsafe fn reap_stack(&self, stack: &SlabStack, core: &PoolCore) {
        let mut keep = Vec::new();
        loop {
            let slab = stack.pop();
            if slab.is_null() {
                break;
            }
            let wholly_free = unsafe { (*slab).map.load(Ordering::Acquire) } == EMPTY_MAP;
            if wholly_free && !hazard::is_protected(slab as *const ()) {
                unsafe { Slab::destroy(slab, &core.geom, &core.class) };
            } else {
                if wholly_free {
                    crate::stat_inc!(hazard_deferrals);
                }
                keep.push(slab);
            }
        }
        for slab in keep {
            unsafe { stack.push(slab) };
        }
    }
}

impl Arena for LocklessArena {
    fn create(core: &PoolCore) -> Option<Self> {
        let arena = Self {
            free: SlabStack::new(),
            partial: SlabStack::new(),
            full: SlabStack::new(),
        };
        let slabs = (core.init_blocks as usize).div_ceil(SLOTS_NUM);
        for _ in 0..slabs {
            let slab = unsafe { Slab::create(&core.geom, &core.class) };
            if slab.is_null() {
                // Unwind the slabs already acquired.
                loop {
                    let s = arena.free.pop();
                    if s.is_null() {
                        break;
                    }
                    unsafe { Slab::destroy(s, &core.geom, &core.class) };
                }
                return None;
            }
            unsafe { arena.free.push(slab) };
        }
        Some(arena)
    }

    unsafe fn alloc(&self, core: &PoolCore) -> *mut u8 {
        loop {
            let mut slab = self.partial.pop();
            if slab.is_null() {
                slab = self.free.pop();
            }
            if slab.is_null() {
                slab = self.scavenge_full();
            }
            if slab.is_null() {
                let fresh = unsafe { Slab::create(&core.geom, &core.class) };
                if fresh.is_null() {
                    return ptr::null_mut();
                }
                // Publish the slab first, then race for its slots like
                // everyone else.
                unsafe { self.partial.push(fresh) };
                continue;
            }

            // Claim the lowest free bit. Concurrent puts may set bits
            // while we loop; only this thread clears them (the slab is
            // off every stack).
            let map = unsafe { &(*slab).map };
            let mut m = map.load(Ordering::Acquire);
            let mut claimed = None;
            while claimed.is_none() {
                if m == 0 {
                    break;
                }
                let slot = m.trailing_zeros() as usize;
                let cleared = m & !(1u32 << slot);
                match map.compare_exchange_weak(m, cleared, Ordering::AcqRel, Ordering::Acquire) {
                    Ok(_) => claimed = Some((slot, cleared)),
                    Err(cur) => m = cur,
                }
            }
            let Some((slot, after)) = claimed else {
                // Only puts touched this slab since it was stacked and
                // none freed a slot: it is genuinely full.
                unsafe { self.full.push(slab) };
                continue;
            };

            if after != 0 {
                unsafe { self.partial.push(slab) };
            } else {
                unsafe { self.full.push(slab) };
            }

            let blk = unsafe { Slab::slot_ptr(slab, &core.geom, slot) };
            if core.referable() {
                unsafe { refcount::reset_atomic(core.geom.counter_ptr(blk)) };
            }
            return blk;
        }
    }

    unsafe fn get(&self, core: &PoolCore, blk: *mut u8) -> *mut u8 {
        if core.referable() {
            unsafe { refcount::incr_atomic(core.geom.counter_ptr(blk)) };
        }
        blk
    }

    unsafe fn put(&self, core: &PoolCore, blk: *mut u8) -> *mut u8 {
        if core.referable() && unsafe { refcount::decr_atomic(core.geom.counter_ptr(blk)) } != 0 {
            return blk;
        }
        if let Some(reinit) = core.class.reinit {
            unsafe { reinit(blk, core.class.ctag) };
        }
        crate::stat_inc!(release_count);
        let (slab, slot) = unsafe { Slab::recover(blk, &core.geom) };
        // Linearization point; neither the block nor the slab is touched
        // after this.
        unsafe { (*slab).map.fetch_or(1u32 << slot, Ordering::AcqRel) };
        ptr::null_mut()
    }

    unsafe fn reap(&self, core: &PoolCore) {
        unsafe {
            self.reap_stack(&self.free, core);
            self.reap_stack(&self.partial, core);
            self.reap_stack(&self.full, core);
        }
    }

    unsafe fn destroy(&mut self, core: &PoolCore) {
        // `&mut`: no operation is in flight anywhere, so every slab is
        // linked into exactly one of the stacks.
        for stack in [&self.free, &self.partial, &self.full] {
            loop {
                let slab = stack.pop();
                if slab.is_null() {
                    break;
                }
                unsafe { Slab::destroy(slab, &core.geom, &core.class) };
            }
        }
    }
}
