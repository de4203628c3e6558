//! Block class descriptors.

/// Lifecycle hook invoked with a block address and the class tag.
///
/// Hooks must not unwind and must not call back into the pool that
/// invoked them.
pub type ObjectHook = unsafe fn(obj: *mut u8, ctag: *mut ());

/// Option bit: every block carries a reference counter, and `put`
/// decrements it instead of releasing unconditionally.
pub const REFERABLE: u32 = 1 << 0;

/// All option bits currently defined.
pub(crate) const OPTIONS_MASK: u32 = REFERABLE;

/// Immutable description of the blocks served by one pool: payload size,
/// alignment, and optional lifecycle hooks.
///
/// `ctor` runs once per slot when a slab is created, `dtor` once per slot
/// when a slab is destroyed, and `reinit` each time a block is returned
/// to the pool. `ctag` is passed to every hook verbatim.
#[derive(Clone, Copy)]
pub struct SlabClass {
    /// Requested user bytes per block. Must be > 0.
    pub blk_sz: usize,
    /// Required alignment of each block start (power of two).
    /// Zero means machine pointer size.
    pub align: usize,
    /// Opaque value handed to every hook.
    pub ctag: *mut (),
    pub ctor: Option<ObjectHook>,
    pub dtor: Option<ObjectHook>,
    pub reinit: Option<ObjectHook>,
}

impl SlabClass {
    /// A hook-free class with default alignment.
    pub fn new(blk_sz: usize) -> Self {
        Self {
            blk_sz,
            align: 0,
            ctag: core::ptr::null_mut(),
            ctor: None,
            dtor: None,
            reinit: None,
        }
    }
}
