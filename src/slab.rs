//! Slab chunks and the slab list.
//!
//! A slab is one aligned backing region: a [`Slab`] header followed by
//! [`SLOTS_NUM`] uniform slots. The header's bitmap has one bit per slot,
//! 1 meaning free, so emptiness and saturation checks are single
//! instructions. Every slot ends with a byte holding its own index,
//! which is what lets a block pointer be turned back into its slab
//! header with plain arithmetic; the last slot's index byte carries a
//! terminator bit that bounds the destructor walk.
//!
//! [`SlabList`] is the chain used by the simple, lockable, and zoned
//! arenas: partial and free slabs occupy the prefix, full slabs the
//! suffix, and the allocation/release paths restore that order as slabs
//! change state.

use core::ptr;
use core::sync::atomic::{AtomicPtr, AtomicU32, Ordering};

use log::trace;

use crate::backing;
use crate::class::SlabClass;
use crate::geometry::BlockGeometry;
use crate::pool::PoolCore;
use crate::refcount;

/// Slots per slab: one bit of the map word per slot.
pub const SLOTS_NUM: usize = 32;

/// Map value of a wholly-free slab.
pub const EMPTY_MAP: u32 = u32::MAX;

/// High bit of the last slot's index byte.
pub(crate) const SLOT_TERMINATOR: u8 = 0x80;

/// Slab chunk header. The slot array follows immediately (padded so
/// slot 0 starts at the block alignment).
///
/// The links and the map are atomics so the same header serves both the
/// list-backed arenas (which own their slabs exclusively and use relaxed
/// plain-store semantics) and the lockless arena (which shares the map
/// and links them through Treiber stacks).
#[repr(C)]
pub struct Slab {
    pub(crate) next: AtomicPtr<Slab>,
    pub(crate) prev: AtomicPtr<Slab>,
    /// Bitmap of slots; 1 = free.
    pub(crate) map: AtomicU32,
}

impl Slab {
    #[inline]
    pub(crate) fn next(&self) -> *mut Slab {
        self.next.load(Ordering::Relaxed)
    }

    #[inline]
    pub(crate) fn set_next(&self, slab: *mut Slab) {
        self.next.store(slab, Ordering::Relaxed);
    }

    #[inline]
    pub(crate) fn prev(&self) -> *mut Slab {
        self.prev.load(Ordering::Relaxed)
    }

    #[inline]
    pub(crate) fn set_prev(&self, slab: *mut Slab) {
        self.prev.store(slab, Ordering::Relaxed);
    }

    #[inline]
    pub(crate) fn map(&self) -> u32 {
        self.map.load(Ordering::Relaxed)
    }

    /// Address of slot `slot` within `slab`.
    ///
    /// # Safety
    ///
    /// `slab` must be live and `slot < SLOTS_NUM`.
    #[inline]
    pub(crate) unsafe fn slot_ptr(slab: *mut Slab, geom: &BlockGeometry, slot: usize) -> *mut u8 {
        debug_assert!(slot < SLOTS_NUM);
        unsafe { (slab as *mut u8).add(geom.header_sz + geom.eff_blk_sz * slot) }
    }

    /// Acquire a fresh slab region: map all-free, slot indices written,
    /// constructor run on every slot in ascending order. Returns null on
    /// backing-allocator failure.
    pub(crate) unsafe fn create(geom: &BlockGeometry, class: &SlabClass) -> *mut Slab {
        let raw = unsafe { backing::region_alloc(geom.slab_bytes(), geom.slab_align()) };
        if raw.is_null() {
            return ptr::null_mut();
        }
        let slab = raw as *mut Slab;
        unsafe {
            slab.write(Slab {
                next: AtomicPtr::new(ptr::null_mut()),
                prev: AtomicPtr::new(ptr::null_mut()),
                map: AtomicU32::new(EMPTY_MAP),
            });

            // Sequential slot numbers in the trailing byte of each slot;
            // the last one is marked so the destructor walk knows where
            // to stop.
            for slot in 0..SLOTS_NUM {
                let idx = Self::slot_ptr(slab, geom, slot).add(geom.eff_blk_sz - 1);
                idx.write(slot as u8);
            }
            let last = Self::slot_ptr(slab, geom, SLOTS_NUM - 1).add(geom.eff_blk_sz - 1);
            last.write(last.read() | SLOT_TERMINATOR);

            if let Some(ctor) = class.ctor {
                for slot in 0..SLOTS_NUM {
                    ctor(Self::slot_ptr(slab, geom, slot), class.ctag);
                }
            }
        }
        crate::stat_inc!(slab_creates);
        crate::stat_add!(backing_bytes, geom.slab_bytes());
        trace!("slab create {slab:p}");
        slab
    }

    /// Destroy a slab: destructor on every slot up to and including the
    /// terminator, then the region goes back to the backing allocator.
    ///
    /// # Safety
    ///
    /// `slab` must come from [`Slab::create`] with the same geometry and
    /// must be unreachable from any list or stack.
    pub(crate) unsafe fn destroy(slab: *mut Slab, geom: &BlockGeometry, class: &SlabClass) {
        trace!("slab destroy {slab:p}");
        unsafe {
            if let Some(dtor) = class.dtor {
                for slot in 0..SLOTS_NUM {
                    let obj = Self::slot_ptr(slab, geom, slot);
                    dtor(obj, class.ctag);
                    if obj.add(geom.eff_blk_sz - 1).read() & SLOT_TERMINATOR != 0 {
                        break;
                    }
                }
            }
            backing::region_dealloc(slab as *mut u8, geom.slab_bytes(), geom.slab_align());
        }
        crate::stat_inc!(slab_destroys);
    }

    /// Claim the lowest free slot. The slab must not be full and must be
    /// owned exclusively by the caller.
    pub(crate) unsafe fn acquire_slot(slab: *mut Slab, geom: &BlockGeometry) -> *mut u8 {
        let s = unsafe { &*slab };
        let m = s.map();
        debug_assert!(m != 0, "slot acquired from a full slab");
        let slot = m.trailing_zeros() as usize;
        s.map.store(m & !(1u32 << slot), Ordering::Relaxed);
        unsafe { Self::slot_ptr(slab, geom, slot) }
    }

    /// Mark `slot` free again.
    pub(crate) unsafe fn release_slot(slab: *mut Slab, slot: usize) {
        let s = unsafe { &*slab };
        s.map.store(s.map() | (1u32 << slot), Ordering::Relaxed);
    }

    /// Recover the owning slab and slot index from a live block pointer.
    ///
    /// # Safety
    ///
    /// `blk` must have been produced by a pool with this geometry and not
    /// yet returned.
    #[inline]
    pub(crate) unsafe fn recover(blk: *mut u8, geom: &BlockGeometry) -> (*mut Slab, usize) {
        let slot = (unsafe { geom.index_ptr(blk).read() } & !SLOT_TERMINATOR) as usize;
        let slab = unsafe { blk.sub(geom.eff_blk_sz * slot + geom.header_sz) } as *mut Slab;
        (slab, slot)
    }
}

/// Doubly-linked slab chain with both ends tracked, so rotating a
/// saturated head to the tail and re-inserting a released slab at the
/// head are O(1).
pub struct SlabList {
    head: *mut Slab,
    tail: *mut Slab,
}

// SAFETY: the list owns its slabs; access is serialized by the arena
// that embeds it (directly, behind a mutex, or per-thread).
unsafe impl Send for SlabList {}

impl Default for SlabList {
    fn default() -> Self {
        Self::new()
    }
}

impl SlabList {
    pub const fn new() -> Self {
        Self {
            head: ptr::null_mut(),
            tail: ptr::null_mut(),
        }
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.head.is_null()
    }

    #[inline]
    pub(crate) fn head(&self) -> *mut Slab {
        self.head
    }

    /// # Safety
    ///
    /// `slab` must be valid and not in any list.
    pub(crate) unsafe fn push_front(&mut self, slab: *mut Slab) {
        unsafe {
            (*slab).set_next(self.head);
            (*slab).set_prev(ptr::null_mut());
            if self.head.is_null() {
                self.tail = slab;
            } else {
                (*self.head).set_prev(slab);
            }
            self.head = slab;
        }
    }

    /// # Safety
    ///
    /// `slab` must be valid and not in any list.
    pub(crate) unsafe fn push_back(&mut self, slab: *mut Slab) {
        unsafe {
            (*slab).set_next(ptr::null_mut());
            (*slab).set_prev(self.tail);
            if self.tail.is_null() {
                self.head = slab;
            } else {
                (*self.tail).set_next(slab);
            }
            self.tail = slab;
        }
    }

    /// # Safety
    ///
    /// `slab` must currently be linked into this list.
    pub(crate) unsafe fn unlink(&mut self, slab: *mut Slab) {
        unsafe {
            let prev = (*slab).prev();
            let next = (*slab).next();
            if prev.is_null() {
                self.head = next;
            } else {
                (*prev).set_next(next);
            }
            if next.is_null() {
                self.tail = prev;
            } else {
                (*next).set_prev(prev);
            }
            (*slab).set_next(ptr::null_mut());
            (*slab).set_prev(ptr::null_mut());
        }
    }

    /// Allocate one block, reorganising the chain so the head keeps free
    /// slots: a saturated head is rotated behind the tail (full slabs
    /// accumulate at the end) or displaced by a fresh slab when every
    /// successor is saturated too. Returns null on backing-allocator
    /// failure.
    ///
    /// # Safety
    ///
    /// Caller must hold exclusive access to this list, and `core` must be
    /// the pool that owns it.
    pub(crate) unsafe fn alloc_block(&mut self, core: &PoolCore) -> *mut u8 {
        unsafe {
            if self.head.is_null() {
                let slab = Slab::create(&core.geom, &core.class);
                if slab.is_null() {
                    return ptr::null_mut();
                }
                self.push_front(slab);
            } else if (*self.head).map() == 0 {
                let next = (*self.head).next();
                if !next.is_null() && (*next).map() != 0 {
                    // The successor has free slots: elect it, retire the
                    // saturated head to the tail.
                    let old = self.head;
                    self.unlink(old);
                    self.push_back(old);
                } else {
                    // Either this is the only slab or everything behind
                    // the head is saturated as well; the ordering
                    // invariant says there is nothing further to find.
                    let slab = Slab::create(&core.geom, &core.class);
                    if slab.is_null() {
                        return ptr::null_mut();
                    }
                    self.push_front(slab);
                }
            }

            let blk = Slab::acquire_slot(self.head, &core.geom);
            if core.referable() {
                refcount::reset(core.geom.counter_ptr(blk));
            }
            blk
        }
    }

    /// Return a block whose reference count (if any) already reached
    /// zero: recycler hook, slab recovery, bit restore, and the head
    /// re-insertion that keeps partial slabs in front of full ones.
    ///
    /// # Safety
    ///
    /// Caller must hold exclusive access; `blk` must belong to this list.
    pub(crate) unsafe fn release_block(&mut self, core: &PoolCore, blk: *mut u8) {
        unsafe {
            if let Some(reinit) = core.class.reinit {
                reinit(blk, core.class.ctag);
            }

            let (slab, slot) = Slab::recover(blk, &core.geom);

            // A saturated slab regaining a slot must come back to the
            // front, or allocation would never find it again.
            if (*slab).map() == 0 && slab != self.head {
                self.unlink(slab);
                self.push_front(slab);
            }

            Slab::release_slot(slab, slot);
        }
    }

    /// Destroy every wholly-free slab in the partial/free prefix. The
    /// scan stops at the first saturated slab: the ordering invariant
    /// puts every slab behind it in the same state, so no free slab can
    /// hide there.
    ///
    /// # Safety
    ///
    /// Caller must hold exclusive access.
    pub(crate) unsafe fn reap(&mut self, core: &PoolCore) {
        let mut cur = self.head;
        while !cur.is_null() {
            let next = unsafe { (*cur).next() };
            match unsafe { (*cur).map() } {
                EMPTY_MAP => unsafe {
                    self.unlink(cur);
                    Slab::destroy(cur, &core.geom, &core.class);
                },
                0 => break,
                _ => {}
            }
            cur = next;
        }
    }

    /// Destroy every slab. Destructors run once per slot regardless of
    /// allocation state.
    ///
    /// # Safety
    ///
    /// Caller must hold exclusive access; no block of this list may be
    /// used afterwards.
    pub(crate) unsafe fn destroy_all(&mut self, core: &PoolCore) {
        let mut cur = self.head;
        while !cur.is_null() {
            let next = unsafe { (*cur).next() };
            unsafe { Slab::destroy(cur, &core.geom, &core.class) };
            cur = next;
        }
        self.head = ptr::null_mut();
        self.tail = ptr::null_mut();
    }

    /// Create ⌈blocks/SLOTS_NUM⌉ wholly-free slabs up front. On failure
    /// the slabs already created stay linked (the caller tears the list
    /// down) and `false` is returned.
    ///
    /// # Safety
    ///
    /// Caller must hold exclusive access.
    pub(crate) unsafe fn prepopulate(&mut self, core: &PoolCore, blocks: u32) -> bool {
        let slabs = (blocks as usize).div_ceil(SLOTS_NUM);
        for _ in 0..slabs {
            let slab = unsafe { Slab::create(&core.geom, &core.class) };
            if slab.is_null() {
                return false;
            }
            unsafe { self.push_front(slab) };
        }
        true
    }
}
