//! Allocation statistics.

/// Counters of one size-class pool, in blocks.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ClassStats {
    /// Block size of the class.
    pub class_size: usize,

    /// Blocks leased out, including blocks parked in thread caches.
    pub used: usize,

    /// Blocks on the pool's free list.
    pub free: usize,

    /// Blocks ever obtained from the system.
    pub total_allocated: usize,
}

/// Snapshot of allocator statistics.
///
/// Counters are read one by one without a common lock, so a snapshot taken
/// during concurrent activity may mix before/after values of one operation.
/// A block parked in a thread cache counts as freed in the global byte
/// counters but stays leased in its pool's [`ClassStats`] until the cache
/// drains.
#[derive(Debug, Clone, Default)]
pub struct PoolStats {
    /// Cumulative bytes handed out.
    pub total_allocated: u64,

    /// Cumulative bytes released by callers.
    pub total_freed: u64,

    /// Bytes currently held by callers.
    pub current_used: usize,

    /// Bytes currently on pool free lists (approximate).
    pub current_free: usize,

    /// Successful allocations.
    pub alloc_count: u64,

    /// Accepted releases.
    pub free_count: u64,

    /// Fragment count; not tracked yet, reset by each maintenance pass.
    pub fragment_count: u64,

    /// Releases ignored as double frees or foreign pointers.
    pub invalid_release_count: u64,

    /// Requests refused by an enforced memory budget.
    pub budget_denials: u64,

    /// Bytes currently obtained from the system, headers included.
    pub reserved_bytes: usize,

    /// Oversized blocks currently live.
    pub oversized_live: usize,

    /// Maintenance passes run so far.
    pub maintenance_runs: u64,

    /// Per size class, ascending.
    pub per_class: Vec<ClassStats>,
}

impl PoolStats {
    /// Allocations not yet released.
    pub fn live_allocations(&self) -> u64 {
        self.alloc_count.saturating_sub(self.free_count)
    }

    /// Stats of the class with block size `class_size`.
    pub fn class(&self, class_size: usize) -> Option<&ClassStats> {
        self.per_class.iter().find(|c| c.class_size == class_size)
    }
}
