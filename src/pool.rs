//! Pool handles and arena dispatch.
//!
//! [`PoolCore`] carries everything the slab machinery needs to know
//! about one pool (options, geometry, class hooks); an [`Arena`] decides
//! where the slab lists live and how access to them is synchronized.
//! [`Pool`] glues the two together and exposes the client surface:
//! allocate, get, put, reap, and drop-as-free.

use core::ptr;

use crate::class::{OPTIONS_MASK, REFERABLE, SlabClass};
use crate::geometry::BlockGeometry;
use crate::refcount;
use crate::slab::SlabList;

/// Per-pool state shared by every arena variant.
#[derive(Clone, Copy)]
pub struct PoolCore {
    pub(crate) options: u32,
    pub(crate) geom: BlockGeometry,
    pub(crate) class: SlabClass,
    pub(crate) init_blocks: u32,
}

impl PoolCore {
    #[inline]
    pub(crate) fn referable(&self) -> bool {
        self.options & REFERABLE != 0
    }
}

/// Synchronization discipline of a pool: locates the slab lists and
/// guards every operation on them.
pub trait Arena: Sized {
    /// Build the arena, preallocating whatever the variant promises.
    /// `None` means the backing allocator failed.
    fn create(core: &PoolCore) -> Option<Self>;

    /// Draw a block out of the pool; null on backing-allocator failure.
    ///
    /// # Safety
    ///
    /// `core` must be the pool core this arena was created with (same
    /// requirement for the other operations).
    unsafe fn alloc(&self, core: &PoolCore) -> *mut u8;

    /// Take another reference on `blk`.
    unsafe fn get(&self, core: &PoolCore, blk: *mut u8) -> *mut u8;

    /// Drop a reference on `blk`; returns null once the block went back
    /// to the pool.
    unsafe fn put(&self, core: &PoolCore, blk: *mut u8) -> *mut u8;

    /// Destroy wholly-free slabs.
    unsafe fn reap(&self, core: &PoolCore);

    /// Tear the arena down. Runs under `&mut`, so no operation is in
    /// flight anywhere.
    unsafe fn destroy(&mut self, core: &PoolCore);
}

/// An object pool serving blocks of one class.
///
/// The type parameter selects the synchronization discipline; use the
/// [`SimplePool`], [`LockablePool`], [`ZonedPool`], and [`LocklessPool`]
/// aliases. Dropping the pool destroys its slabs, running the class
/// destructor once per slot.
pub struct Pool<A: Arena> {
    core: PoolCore,
    arena: A,
}

// SAFETY: list state is guarded by the arena variant. The class tag and
// hooks travel with the pool; callers sharing a pool across threads must
// hand it hooks that tolerate that, exactly as with the C-style
// function-pointer classes this mirrors.
unsafe impl<A: Arena + Send> Send for Pool<A> {}
unsafe impl<A: Arena + Sync> Sync for Pool<A> {}

impl<A: Arena> Pool<A> {
    /// Create a pool for `class` with `inum` blocks reserved for
    /// immediate use (rounded up to whole slabs). Returns `None` when
    /// the backing allocator fails.
    pub fn create(options: u32, class: &SlabClass, inum: u32) -> Option<Self> {
        debug_assert!(options & !OPTIONS_MASK == 0, "unknown option bits");
        let geom = BlockGeometry::new(class.blk_sz, class.align, options & REFERABLE != 0);
        let core = PoolCore {
            options,
            geom,
            class: *class,
            init_blocks: inum,
        };
        let arena = A::create(&core)?;
        Some(Self { core, arena })
    }

    /// Mark a block as allocated and hand it out; its reference count
    /// (if the pool is `REFERABLE`) starts at 1. Null means the backing
    /// allocator failed — ask again after reducing pressure.
    ///
    /// # Safety
    ///
    /// Variant contract: a `SimplePool` or `ZonedPool` block must be
    /// managed by the thread discipline of its variant; hooks must not
    /// re-enter the pool.
    pub unsafe fn alloc(&self) -> *mut u8 {
        crate::stat_inc!(alloc_count);
        unsafe { self.arena.alloc(&self.core) }
    }

    /// Take another reference on `blk`. A no-op (but still the variant's
    /// synchronization) for non-`REFERABLE` pools. Returns `blk`.
    ///
    /// # Safety
    ///
    /// `blk` must be a live block of this pool.
    pub unsafe fn get(&self, blk: *mut u8) -> *mut u8 {
        debug_assert!(!blk.is_null());
        crate::stat_inc!(get_count);
        unsafe { self.arena.get(&self.core, blk) }
    }

    /// Drop a reference on `blk`. Returns `blk` while references remain;
    /// returns null once the block has been recycled into the pool — do
    /// not touch it afterwards.
    ///
    /// # Safety
    ///
    /// `blk` must be a live block of this pool; for `ZonedPool` it must
    /// be put on the thread that allocated it.
    pub unsafe fn put(&self, blk: *mut u8) -> *mut u8 {
        debug_assert!(!blk.is_null());
        crate::stat_inc!(put_count);
        unsafe { self.arena.put(&self.core, blk) }
    }

    /// Destroy every wholly-free slab currently reachable.
    ///
    /// # Safety
    ///
    /// Same variant contract as [`Pool::alloc`].
    pub unsafe fn reap(&self) {
        crate::stat_inc!(reap_count);
        unsafe { self.arena.reap(&self.core) }
    }

    /// Requested payload size of this pool's blocks.
    pub fn block_size(&self) -> usize {
        self.core.geom.blk_sz
    }

    /// Resolved alignment of this pool's blocks.
    pub fn align(&self) -> usize {
        self.core.geom.align
    }
}

impl<A: Arena> Drop for Pool<A> {
    fn drop(&mut self) {
        log::debug!("pool free (blk_sz={})", self.core.geom.blk_sz);
        let core = self.core;
        unsafe { self.arena.destroy(&core) };
    }
}

/// Single-threaded pool; `!Sync` by construction.
pub type SimplePool = Pool<crate::simple::SimpleArena>;
/// Pool serialized by one global mutex.
pub type LockablePool = Pool<crate::lockable::LockableArena>;
/// Pool with disjoint per-thread slab lists.
pub type ZonedPool = Pool<crate::zoned::ZonedArena>;
/// Lock-free pool (Treiber stacks + hazard pointers).
pub type LocklessPool = Pool<crate::lockless::LocklessArena>;

/// Shared `get` for the list-backed arenas: plain counter increment
/// under the variant's exclusive access.
pub(crate) unsafe fn list_get(core: &PoolCore, blk: *mut u8) -> *mut u8 {
    if core.referable() {
        unsafe { refcount::incr(core.geom.counter_ptr(blk)) };
    }
    blk
}

/// Shared `put` for the list-backed arenas: decrement, and on zero (or
/// for non-referable pools, always) recycle the block into `list`.
pub(crate) unsafe fn list_put(list: &mut SlabList, core: &PoolCore, blk: *mut u8) -> *mut u8 {
    if core.referable() && unsafe { refcount::decr(core.geom.counter_ptr(blk)) } != 0 {
        return blk;
    }
    crate::stat_inc!(release_count);
    unsafe { list.release_block(core, blk) };
    ptr::null_mut()
}
