//! slabpool: a slab-based object pool for homogeneously-typed blocks.
//!
//! A pool serves fixed-size blocks out of 32-slot slabs, each tracked by
//! a single bitmap word, so saturation checks, slot selection, and the
//! pointer-to-slab recovery are all a handful of instructions. Slabs are
//! kept ordered — partial and free chunks in front, saturated ones
//! behind — which keeps allocation O(1) and lets `reap` stop early.
//!
//! Four synchronization disciplines are available at creation time:
//! - [`SimplePool`]: no locking, `!Sync` (single-threaded use)
//! - [`LockablePool`]: one global mutex around every operation
//! - [`ZonedPool`]: disjoint per-thread slab lists, no contention
//! - [`LocklessPool`]: Treiber stacks + hazard pointers, no locks
//!
//! Blocks optionally carry a reference counter ([`REFERABLE`]): `get`
//! takes another reference and `put` releases the block only when the
//! count drops to zero. A class may install hooks: a constructor (once
//! per slot at slab creation), a destructor (once per slot at slab
//! destruction), and a recycler (every time a block returns to the
//! pool).
//!
//! # Usage
//!
//! ```ignore
//! use slabpool::{REFERABLE, SimplePool, SlabClass};
//!
//! let mut class = SlabClass::new(48);
//! class.align = 64;
//! let pool = SimplePool::create(REFERABLE, &class, 128).unwrap();
//! unsafe {
//!     let blk = pool.alloc();
//!     let blk = pool.get(blk);        // second reference
//!     assert!(!pool.put(blk).is_null()); // still referenced
//!     assert!(pool.put(blk).is_null());  // recycled
//! }
//! ```

pub mod backing;
pub mod class;
pub mod config;
pub mod geometry;
mod hazard;
pub mod lockable;
pub mod lockless;
mod macros;
pub mod pool;
mod refcount;
pub mod simple;
pub mod slab;
#[cfg(feature = "stats")]
pub mod stats;
pub mod sync;
pub mod zoned;

pub use class::{ObjectHook, REFERABLE, SlabClass};
pub use pool::{Arena, LockablePool, LocklessPool, Pool, SimplePool, ZonedPool};
pub use slab::{EMPTY_MAP, SLOTS_NUM};
