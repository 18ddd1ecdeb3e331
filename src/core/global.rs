//! Global shared state.
//!
//! Routing between the thread cache, the size-class pools and the fallback
//! heap lives here. `PoolAllocator` wraps it in an `Arc` so thread caches and
//! the maintenance thread can refer back to it.

use std::ptr::{self, NonNull};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::allocators::header::HeaderLayout;
use crate::allocators::heap::SystemHeap;
use crate::allocators::pool::SizeClassPool;
use crate::allocators::registry::BlockRegistry;
use crate::api::config::{PoolConfig, NUM_SIZE_CLASSES};
use crate::api::error::PoolError;
use crate::api::stats::PoolStats;
use crate::core::budget::MemoryBudget;
use crate::core::tls;
use crate::diagnostics::{self, CP101, CP201, CP202};
use crate::sync::atomics::{AtomicCounter, AtomicGauge};

/// Global state shared across all threads.
pub struct GlobalState {
    /// Configuration
    config: PoolConfig,

    /// Header geometry for every block
    header: HeaderLayout,

    /// One pool per size class, ascending
    pools: [SizeClassPool; NUM_SIZE_CLASSES],

    /// Addresses of every block the pools carved
    registry: BlockRegistry,

    /// System heap for oversized allocations
    heap: SystemHeap,

    /// System memory accounting
    budget: MemoryBudget,

    /// Global statistics (atomics)
    counters: Counters,

    /// Set once by `shutdown`; allocation refuses afterwards
    shutdown: AtomicBool,
}

/// Lock-free statistics.
///
/// A thread cache counts as the caller's side of the books: releasing into
/// it and taking from it are ordinary frees and allocations, so
/// `current_used` tracks live bytes only. `current_free` covers pool free
/// lists and grows when a cache drains into its pool.
#[derive(Debug, Default)]
struct Counters {
    total_allocated: AtomicCounter,
    total_freed: AtomicCounter,
    current_used: AtomicGauge,
    current_free: AtomicGauge,
    alloc_count: AtomicCounter,
    free_count: AtomicCounter,
    fragment_count: AtomicCounter,
    invalid_releases: AtomicCounter,
    maintenance_runs: AtomicCounter,
}

impl Counters {
    fn record_pool_alloc(&self, bytes: usize) {
        self.alloc_count.increment();
        self.total_allocated.add(bytes as u64);
        self.current_used.add(bytes);
        self.current_free.sub(bytes);
    }

    fn record_direct_alloc(&self, bytes: usize) {
        self.alloc_count.increment();
        self.total_allocated.add(bytes as u64);
        self.current_used.add(bytes);
    }

    fn record_pool_release(&self, bytes: usize) {
        self.record_direct_release(bytes);
        self.current_free.add(bytes);
    }

    fn record_direct_release(&self, bytes: usize) {
        self.free_count.increment();
        self.total_freed.add(bytes as u64);
        self.current_used.sub(bytes);
    }
}

impl GlobalState {
    /// Create new global state with the given configuration.
    pub fn new(config: PoolConfig) -> Result<Self, PoolError> {
        config.validate()?;
        let header = HeaderLayout::new(config.alignment);

        let mut pools = Vec::with_capacity(NUM_SIZE_CLASSES);
        for (index, &class) in config.size_classes.iter().enumerate() {
            let pool = SizeClassPool::new(index, class, config.alignment, header).ok_or_else(|| {
                PoolError::InvalidConfig(format!("size class {} overflows", class))
            })?;
            pools.push(pool);
        }
        let pools: [SizeClassPool; NUM_SIZE_CLASSES] = pools
            .try_into()
            .map_err(|_| PoolError::InvalidConfig("wrong number of size classes".into()))?;

        Ok(Self {
            header,
            pools,
            registry: BlockRegistry::new(),
            heap: SystemHeap::new(header),
            budget: MemoryBudget::new(config.max_total_memory, config.budget_policy),
            config,
            counters: Counters::default(),
            shutdown: AtomicBool::new(false),
        })
    }

    /// Get the configuration.
    pub fn config(&self) -> &PoolConfig {
        &self.config
    }

    /// Whether `shutdown` has been called.
    pub fn is_shut_down(&self) -> bool {
        self.shutdown.load(Ordering::Acquire)
    }

    /// Refuse all further allocations. Returns false if already shut down.
    pub fn begin_shutdown(&self) -> bool {
        !self.shutdown.swap(true, Ordering::AcqRel)
    }

    /// Index of the smallest class that fits `size`, `None` if oversized.
    #[inline]
    pub fn class_index(&self, size: usize) -> Option<usize> {
        self.pools.iter().position(|pool| size <= pool.block_size())
    }

    /// Block size a request of `size` bytes is served from.
    pub fn class_for(&self, size: usize) -> Option<usize> {
        if size == 0 {
            return None;
        }
        self.class_index(size).map(|index| self.pools[index].block_size())
    }

    /// Allocate `size` bytes: thread cache, then pool, then system heap.
    pub fn allocate(self: &Arc<Self>, size: usize) -> Result<NonNull<u8>, PoolError> {
        if size == 0 {
            return Err(PoolError::ZeroSizeRequest);
        }
        if self.is_shut_down() {
            return Err(PoolError::ShutDown);
        }

        let Some(class) = self.class_index(size) else {
            return self.allocate_oversized(size);
        };
        let pool = &self.pools[class];

        // Fast path
        if let Some(block) = tls::with_cache(self, |cache| cache.try_take(class)).flatten() {
            // SAFETY: cached blocks come from this allocator's pools, which
            // keep their regions until the allocator is dropped.
            unsafe { self.header.header(block) }.mark_leased();
            self.counters.record_direct_alloc(pool.block_size());
            return Ok(block);
        }

        // Slow path
        match pool.allocate(&self.budget, &self.registry) {
            Ok(block) => {
                self.counters.record_pool_alloc(pool.block_size());
                Ok(block)
            }
            Err(err) => {
                self.report_failure(&err);
                Err(err)
            }
        }
    }

    fn allocate_oversized(&self, size: usize) -> Result<NonNull<u8>, PoolError> {
        match self.heap.allocate(size, &self.budget) {
            Ok(block) => {
                self.counters.record_direct_alloc(size);
                Ok(block)
            }
            Err(err) => {
                self.report_failure(&err);
                Err(err)
            }
        }
    }

    /// Release a block; invalid releases are counted and ignored.
    ///
    /// The address is classified before any memory is read: pooled blocks
    /// through the registry, oversized blocks through the heap's live set.
    /// Anything else, including an oversized block released before, is
    /// rejected without being dereferenced.
    ///
    /// # Safety
    ///
    /// If `block` is live, no other reference to its memory may be used
    /// after this call.
    pub unsafe fn deallocate(self: &Arc<Self>, block: NonNull<u8>) {
        let Some(class) = self.registry.class_of(block) else {
            match self.heap.release(block, &self.budget) {
                Some(size) => self.counters.record_direct_release(size),
                None => self.record_invalid(block),
            }
            return;
        };

        let pool = &self.pools[class];
        if self.config.enable_tls {
            // SAFETY: registered blocks stay allocated until the pools drop.
            if !self.header.header(block).try_mark_released() {
                self.record_invalid(block);
                return;
            }
            if tls::with_cache(self, |cache| cache.try_put(class, block)).unwrap_or(false) {
                self.counters.record_direct_release(pool.block_size());
                return;
            }
            pool.recycle(block);
        } else if !pool.release(block) {
            self.record_invalid(block);
            return;
        }
        self.counters.record_pool_release(pool.block_size());
    }

    /// Resize a block, keeping it in place when the new size is within
    /// (old/2, old].
    ///
    /// On failure the old block is left untouched.
    ///
    /// # Safety
    ///
    /// Same contract as [`GlobalState::deallocate`] when the block moves.
    pub unsafe fn reallocate(
        self: &Arc<Self>,
        block: NonNull<u8>,
        new_size: usize,
    ) -> Result<NonNull<u8>, PoolError> {
        let Some(old_size) = self.usable_size(block) else {
            self.counters.invalid_releases.increment();
            diagnostics::emit_with_context(&CP202, &format!("ptr={:p}", block.as_ptr()));
            return Err(PoolError::InvalidRelease);
        };

        if new_size <= old_size && new_size > old_size / 2 {
            return Ok(block);
        }

        let fresh = self.allocate(new_size)?;
        ptr::copy_nonoverlapping(block.as_ptr(), fresh.as_ptr(), old_size.min(new_size));
        self.deallocate(block);
        Ok(fresh)
    }

    /// Logical size of a live block, `None` if it is not live.
    ///
    /// Unknown addresses are answered without reading memory.
    pub fn usable_size(&self, block: NonNull<u8>) -> Option<usize> {
        if self.registry.class_of(block).is_none() {
            return self.heap.live_size(block);
        }
        // SAFETY: registered blocks stay allocated until the pools drop.
        let header = unsafe { self.header.header(block) };
        header.is_live().then(|| header.logical_size())
    }

    /// Return a block drained from a thread cache to its pool.
    pub fn reclaim_cached(&self, class: usize, block: NonNull<u8>) {
        if let Some(pool) = self.pools.get(class) {
            pool.recycle(block);
            self.counters.current_free.add(pool.block_size());
        }
    }

    /// Periodic maintenance pass.
    ///
    /// Fragment tracking is not implemented; the pass only resets the
    /// fragment counter.
    pub fn run_maintenance(&self) {
        self.counters.fragment_count.reset();
        self.counters.maintenance_runs.increment();

        #[cfg(feature = "log")]
        log::trace!(
            "classpool maintenance pass: used={} free={} reserved={}",
            self.counters.current_used.get(),
            self.counters.current_free.get(),
            self.budget.reserved()
        );
    }

    /// Get current statistics.
    pub fn stats(&self) -> PoolStats {
        let c = &self.counters;
        PoolStats {
            total_allocated: c.total_allocated.get(),
            total_freed: c.total_freed.get(),
            current_used: c.current_used.get(),
            current_free: c.current_free.get(),
            alloc_count: c.alloc_count.get(),
            free_count: c.free_count.get(),
            fragment_count: c.fragment_count.get(),
            invalid_release_count: c.invalid_releases.get(),
            budget_denials: self.budget.denials(),
            reserved_bytes: self.budget.reserved(),
            oversized_live: self.heap.live_blocks(),
            maintenance_runs: c.maintenance_runs.get(),
            per_class: self.pools.iter().map(SizeClassPool::stats).collect(),
        }
    }

    fn record_invalid(&self, block: NonNull<u8>) {
        self.counters.invalid_releases.increment();
        diagnostics::emit_with_context(&CP201, &format!("ptr={:p}", block.as_ptr()));
    }

    fn report_failure(&self, err: &PoolError) {
        if let PoolError::AllocationExhausted { size } = err {
            diagnostics::emit_with_context(&CP101, &format!("size={}", size));
        }
    }
}

impl Drop for GlobalState {
    fn drop(&mut self) {
        #[cfg(feature = "log")]
        log::debug!(
            "classpool teardown: releasing {} pooled regions, {} oversized blocks",
            self.pools
                .iter()
                .map(|pool| pool.stats().total_allocated)
                .sum::<usize>(),
            self.heap.live_blocks()
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn state(config: PoolConfig) -> Arc<GlobalState> {
        Arc::new(GlobalState::new(config.with_maintenance(false)).unwrap())
    }

    #[test]
    fn test_class_routing_edges() {
        let global = state(PoolConfig::default());
        assert_eq!(global.class_for(0), None);
        assert_eq!(global.class_for(1), Some(8));
        for &class in &[8, 16, 32, 64, 128, 256, 512, 1024] {
            assert_eq!(global.class_for(class), Some(class));
            if class < 1024 {
                assert_eq!(global.class_for(class + 1), Some(class * 2));
            }
        }
        assert_eq!(global.class_for(1025), None);
    }

    #[test]
    fn test_classes_rounded_by_alignment() {
        let global = state(PoolConfig::default().with_alignment(16));
        assert_eq!(global.class_for(1), Some(16));
        assert_eq!(global.class_for(10), Some(16));
        assert_eq!(global.class_for(17), Some(32));
    }

    #[test]
    fn test_deallocate_with_duplicate_rounded_classes() {
        // 8 and 16 both round to 16; every block must find its own pool.
        let global = state(PoolConfig::default().with_alignment(16).with_tls(false));
        let block = global.allocate(12).unwrap();
        unsafe { global.deallocate(block) };
        let stats = global.stats();
        assert_eq!(stats.invalid_release_count, 0);
        assert_eq!(stats.per_class[0].free, 1);
    }

    #[test]
    fn test_cached_churn_keeps_used_exact() {
        let global = state(PoolConfig::default());
        for _ in 0..3 {
            let block = global.allocate(64).unwrap();
            unsafe { global.deallocate(block) };
        }

        let stats = global.stats();
        assert_eq!(stats.alloc_count, 3);
        assert_eq!(stats.free_count, 3);
        assert_eq!(stats.current_used, 0);
        assert_eq!(stats.total_allocated, stats.total_freed);
        assert_eq!(stats.current_free, 0);
        assert_eq!(tls::cached_blocks(&global), 1);

        tls::flush(&global);
        let stats = global.stats();
        assert_eq!(stats.current_used, 0);
        assert_eq!(stats.current_free, 64);
        assert_eq!(stats.class(64).unwrap().free, 1);
        assert_eq!(stats.class(64).unwrap().used, 0);
    }

    #[test]
    fn test_reclaim_updates_pool() {
        let global = state(PoolConfig::default().with_tls(false));
        let block = global.allocate(32).unwrap();
        assert!(unsafe { global.header.header(block) }.try_mark_released());
        global.reclaim_cached(2, block);
        let stats = global.stats();
        assert_eq!(stats.class(32).unwrap().free, 1);
        assert_eq!(stats.current_free, 32);
    }

    #[test]
    fn test_repeated_oversized_release_is_ignored() {
        crate::diagnostics::suppress_diagnostics(true);
        let global = state(PoolConfig::default());
        // Large enough for the system allocator to unmap it on release.
        let block = global.allocate(4 << 20).unwrap();
        unsafe {
            global.deallocate(block);
            global.deallocate(block);
        }
        assert_eq!(global.usable_size(block), None);
        assert!(unsafe { global.reallocate(block, 16) }.is_err());

        let stats = global.stats();
        assert_eq!(stats.free_count, 1);
        assert_eq!(stats.invalid_release_count, 2);
        assert_eq!(stats.oversized_live, 0);
        assert_eq!(stats.reserved_bytes, 0);
    }

    #[test]
    fn test_unknown_address_is_not_read() {
        crate::diagnostics::suppress_diagnostics(true);
        let global = state(PoolConfig::default());
        // Neither address has a header in front of it.
        let mut words = vec![0u64; 4];
        let inner = NonNull::from(&mut words[1]).cast::<u8>();
        let dangling = NonNull::<u64>::dangling().cast::<u8>();

        unsafe {
            global.deallocate(inner);
            global.deallocate(dangling);
        }
        assert_eq!(global.usable_size(inner), None);
        assert_eq!(global.stats().invalid_release_count, 2);
        assert!(words.iter().all(|&w| w == 0));
    }

    #[test]
    fn test_maintenance_counts_runs() {
        let global = state(PoolConfig::default());
        global.run_maintenance();
        global.run_maintenance();
        let stats = global.stats();
        assert_eq!(stats.maintenance_runs, 2);
        assert_eq!(stats.fragment_count, 0);
    }
}
