//! Pool statistics counters.
//!
//! All counters use `Relaxed` ordering — they are observational only and
//! not used as synchronization primitives. The arenas provide the
//! ordering guarantees for correctness; these counters are purely for
//! monitoring.
//!
//! Obtain a [`Snapshot`] with [`snapshot()`]. Individual counter loads
//! are atomic but not globally consistent with each other.

use core::sync::atomic::{AtomicU64, Ordering};

pub(crate) struct Stats {
    // ---- Client operations ----
    /// Total calls to `alloc`.
    pub alloc_count: AtomicU64,
    /// Total calls to `get`.
    pub get_count: AtomicU64,
    /// Total calls to `put`.
    pub put_count: AtomicU64,
    /// Puts that actually recycled a block into its slab.
    pub release_count: AtomicU64,
    /// Total calls to `reap`.
    pub reap_count: AtomicU64,

    // ---- Slab traffic ----
    /// Slab regions acquired from the backing allocator.
    pub slab_creates: AtomicU64,
    /// Slab regions destroyed (reap or pool teardown).
    pub slab_destroys: AtomicU64,
    /// Total bytes acquired from the backing allocator for slab regions.
    pub backing_bytes: AtomicU64,

    // ---- Lockless arena ----
    /// Full-stack scavenges that found nothing reusable.
    pub scavenge_misses: AtomicU64,
    /// Wholly-free slabs kept alive by an active hazard during reap.
    pub hazard_deferrals: AtomicU64,
}

impl Stats {
    const fn new() -> Self {
        Self {
            alloc_count: AtomicU64::new(0),
            get_count: AtomicU64::new(0),
            put_count: AtomicU64::new(0),
            release_count: AtomicU64::new(0),
            reap_count: AtomicU64::new(0),
            slab_creates: AtomicU64::new(0),
            slab_destroys: AtomicU64::new(0),
            backing_bytes: AtomicU64::new(0),
            scavenge_misses: AtomicU64::new(0),
            hazard_deferrals: AtomicU64::new(0),
        }
    }
}

pub(crate) static STATS: Stats = Stats::new();

/// Point-in-time copy of every counter.
#[derive(Clone, Copy, Debug, Default)]
pub struct Snapshot {
    pub alloc_count: u64,
    pub get_count: u64,
    pub put_count: u64,
    pub release_count: u64,
    pub reap_count: u64,
    pub slab_creates: u64,
    pub slab_destroys: u64,
    pub backing_bytes: u64,
    pub scavenge_misses: u64,
    pub hazard_deferrals: u64,
}

/// Read all counters (individually relaxed).
pub fn snapshot() -> Snapshot {
    Snapshot {
        alloc_count: STATS.alloc_count.load(Ordering::Relaxed),
        get_count: STATS.get_count.load(Ordering::Relaxed),
        put_count: STATS.put_count.load(Ordering::Relaxed),
        release_count: STATS.release_count.load(Ordering::Relaxed),
        reap_count: STATS.reap_count.load(Ordering::Relaxed),
        slab_creates: STATS.slab_creates.load(Ordering::Relaxed),
        slab_destroys: STATS.slab_destroys.load(Ordering::Relaxed),
        backing_bytes: STATS.backing_bytes.load(Ordering::Relaxed),
        scavenge_misses: STATS.scavenge_misses.load(Ordering::Relaxed),
        hazard_deferrals: STATS.hazard_deferrals.load(Ordering::Relaxed),
    }
}
