//! Per-block reference counters.
//!
//! The counter is a `u32` embedded in the block (see
//! [`BlockGeometry::counter_offset`](crate::geometry::BlockGeometry)).
//! The list-backed arenas own their blocks exclusively while touching the
//! counter, so they use plain loads and stores; the lockless arena views
//! the same bytes through `AtomicU32`. Reset writes 1, get increments,
//! put decrements and yields the new value — zero means "return the
//! block to the pool".

use core::sync::atomic::{AtomicU32, Ordering, fence};

use static_assertions::{assert_eq_align, assert_eq_size};

// The same in-block bytes are accessed both ways.
assert_eq_size!(AtomicU32, u32);
assert_eq_align!(AtomicU32, u32);

/// # Safety
///
/// `counter` must point at the counter of a block owned exclusively by
/// the caller (same requirement for the other plain ops).
#[inline]
pub(crate) unsafe fn reset(counter: *mut u32) {
    unsafe { counter.write(1) };
}

#[inline]
pub(crate) unsafe fn incr(counter: *mut u32) {
    unsafe { counter.write(counter.read() + 1) };
}

/// Decrement and return the new value.
#[inline]
pub(crate) unsafe fn decr(counter: *mut u32) -> u32 {
    let prev = unsafe { counter.read() };
    debug_assert!(prev > 0, "refcount decremented below zero");
    let next = prev.wrapping_sub(1);
    unsafe { counter.write(next) };
    next
}

#[inline]
fn atomic(counter: *mut u32) -> *const AtomicU32 {
    counter as *const AtomicU32
}

/// # Safety
///
/// `counter` must point at the counter of a freshly claimed block; the
/// Release store publishes it together with the slot claim.
#[inline]
pub(crate) unsafe fn reset_atomic(counter: *mut u32) {
    unsafe { (*atomic(counter)).store(1, Ordering::Release) };
}

#[inline]
pub(crate) unsafe fn incr_atomic(counter: *mut u32) {
    // A new reference is always taken from an existing one; Relaxed is
    // enough, as in Arc::clone.
    unsafe { (*atomic(counter)).fetch_add(1, Ordering::Relaxed) };
}

/// Decrement and return the new value. On reaching zero an Acquire fence
/// orders the caller's release of the block after every prior access.
#[inline]
pub(crate) unsafe fn decr_atomic(counter: *mut u32) -> u32 {
    let prev = unsafe { (*atomic(counter)).fetch_sub(1, Ordering::Release) };
    debug_assert!(prev > 0, "refcount decremented below zero");
    if prev == 1 {
        fence(Ordering::Acquire);
    }
    prev - 1
}
