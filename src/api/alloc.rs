//! The main allocator type.

use std::ptr::{self, NonNull};
use std::sync::Arc;

use crate::api::config::PoolConfig;
use crate::api::error::PoolError;
use crate::api::scoped::ScopedAllocation;
use crate::api::stats::PoolStats;
use crate::core::global::GlobalState;
use crate::core::maintenance::MaintenanceWorker;
use crate::core::tls;
use crate::sync::mutex::Mutex;

/// Size-class pooling allocator.
///
/// Requests up to the largest size class are served from per-class pools,
/// with a per-thread cache in front of them; larger requests go straight to
/// the system allocator. Every returned pointer is aligned to
/// `PoolConfig::alignment`.
///
/// The allocator is `Send + Sync`. There is no global instance: share it by
/// reference or through an `Arc`.
///
/// # Example
///
/// ```rust
/// use classpool::{PoolAllocator, PoolConfig};
///
/// let alloc = PoolAllocator::new(PoolConfig::default()).unwrap();
///
/// let small = alloc.allocate(10); // 16-byte class
/// let large = alloc.allocate(2000); // system allocator
/// assert!(!small.is_null() && !large.is_null());
///
/// unsafe {
///     alloc.deallocate(small);
///     alloc.deallocate(large);
/// }
///
/// let stats = alloc.stats();
/// assert_eq!(stats.alloc_count, 2);
/// assert_eq!(stats.free_count, 2);
/// ```
pub struct PoolAllocator {
    /// Shared state (pools, heap, counters)
    inner: Arc<GlobalState>,

    /// Background maintenance thread, if enabled and still running
    worker: Mutex<Option<MaintenanceWorker>>,
}

impl PoolAllocator {
    /// Create a new allocator with the given configuration.
    pub fn new(config: PoolConfig) -> Result<Self, PoolError> {
        let inner = Arc::new(GlobalState::new(config)?);

        let worker = if inner.config().enable_maintenance {
            let interval = inner.config().maintenance_interval;
            Some(MaintenanceWorker::spawn(inner.clone(), interval).map_err(PoolError::MaintenanceSpawn)?)
        } else {
            None
        };

        #[cfg(feature = "log")]
        log::debug!(
            "classpool allocator created: classes={:?} alignment={} tls={} max_total_memory={}",
            inner.config().size_classes,
            inner.config().alignment,
            inner.config().enable_tls,
            inner.config().max_total_memory
        );

        Ok(Self {
            inner,
            worker: Mutex::new(worker),
        })
    }

    /// Create an allocator with the default configuration.
    ///
    /// If the maintenance thread cannot be spawned the allocator runs
    /// without it.
    ///
    /// # Panics
    ///
    /// Never in practice: without a maintenance thread the only failure left
    /// is an invalid configuration, and the default one always validates.
    pub fn with_defaults() -> Self {
        Self::new(PoolConfig::default())
            .or_else(|_| Self::new(PoolConfig::default().with_maintenance(false)))
            .expect("default config without maintenance is valid")
    }

    /// Create an allocator from the three commonly tuned settings, defaults
    /// for the rest.
    pub fn with_options(
        max_total_memory: usize,
        enable_tls: bool,
        alignment: usize,
    ) -> Result<Self, PoolError> {
        Self::new(
            PoolConfig::default()
                .with_max_total_memory(max_total_memory)
                .with_tls(enable_tls)
                .with_alignment(alignment),
        )
    }

    /// Get the configuration.
    pub fn config(&self) -> &PoolConfig {
        self.inner.config()
    }

    /// Allocate at least `size` bytes.
    ///
    /// Returns null for `size == 0`, after [`shutdown`](Self::shutdown), or
    /// when memory (or an enforced budget) is exhausted. The memory is
    /// uninitialized.
    pub fn allocate(&self, size: usize) -> *mut u8 {
        match self.inner.allocate(size) {
            Ok(block) => block.as_ptr(),
            Err(_) => ptr::null_mut(),
        }
    }

    /// Allocate at least `size` bytes, reporting why on failure.
    pub fn try_allocate(&self, size: usize) -> Result<NonNull<u8>, PoolError> {
        self.inner.allocate(size)
    }

    /// Release a block. Null is a no-op.
    ///
    /// Releasing a block twice, or a pointer this allocator never handed
    /// out, is ignored and counted in [`PoolStats::invalid_release_count`].
    /// Such pointers are recognised by address and never dereferenced.
    ///
    /// # Safety
    ///
    /// If `ptr` is a live block, neither the caller nor anyone else may use
    /// its memory after this call.
    pub unsafe fn deallocate(&self, ptr: *mut u8) {
        if let Some(block) = NonNull::new(ptr) {
            self.inner.deallocate(block);
        }
    }

    /// Resize a block.
    ///
    /// Null behaves like [`allocate`](Self::allocate). When `new_size` is at
    /// most the old size and more than half of it, the same pointer comes
    /// back unchanged. Otherwise a new block is allocated, the first
    /// `min(old, new)` bytes are copied over and the old block is released.
    /// On failure null is returned and the old block stays valid.
    ///
    /// # Safety
    ///
    /// On success the old pointer must no longer be used unless it was
    /// returned again.
    pub unsafe fn reallocate(&self, ptr: *mut u8, new_size: usize) -> *mut u8 {
        let result = match NonNull::new(ptr) {
            None => self.inner.allocate(new_size),
            Some(block) => self.inner.reallocate(block, new_size),
        };
        match result {
            Ok(block) => block.as_ptr(),
            Err(_) => ptr::null_mut(),
        }
    }

    /// Usable bytes of a live block (the class size for pooled blocks).
    ///
    /// `None` for null, released or unknown pointers.
    pub fn usable_size(&self, ptr: *mut u8) -> Option<usize> {
        self.inner.usable_size(NonNull::new(ptr)?)
    }

    /// Block size a request of `size` bytes is served from, `None` for zero
    /// or oversized requests.
    pub fn class_for(&self, size: usize) -> Option<usize> {
        self.inner.class_for(size)
    }

    /// Allocate `size` bytes bound to a scope.
    pub fn scoped(&self, size: usize) -> Result<ScopedAllocation<'_>, PoolError> {
        ScopedAllocation::new(self, size)
    }

    /// Get current allocation statistics.
    pub fn stats(&self) -> PoolStats {
        self.inner.stats()
    }

    /// Run the maintenance pass now.
    pub fn run_maintenance(&self) {
        self.inner.run_maintenance();
    }

    /// Return the calling thread's cached blocks to their pools.
    ///
    /// Threads do this automatically when they exit.
    pub fn flush_thread_cache(&self) {
        tls::flush(&self.inner);
    }

    /// Blocks the calling thread currently caches for this allocator.
    pub fn thread_cached_blocks(&self) -> usize {
        tls::cached_blocks(&self.inner)
    }

    /// Stop serving allocations and stop the maintenance thread.
    ///
    /// Releases still work afterwards. Called automatically on drop.
    pub fn shutdown(&self) {
        if self.inner.begin_shutdown() {
            #[cfg(feature = "log")]
            log::debug!("classpool allocator shutting down");
        }
        let worker = self.worker.lock().take();
        if let Some(mut worker) = worker {
            worker.stop();
        }
    }

    /// Whether [`shutdown`](Self::shutdown) has run.
    pub fn is_shut_down(&self) -> bool {
        self.inner.is_shut_down()
    }
}

impl Drop for PoolAllocator {
    fn drop(&mut self) {
        self.shutdown();
        tls::flush(&self.inner);
    }
}

impl std::fmt::Debug for PoolAllocator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PoolAllocator")
            .field("config", self.inner.config())
            .field("shut_down", &self.inner.is_shut_down())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn alloc(config: PoolConfig) -> PoolAllocator {
        PoolAllocator::new(config.with_maintenance(false)).unwrap()
    }

    #[test]
    fn test_zero_size_is_null() {
        let alloc = alloc(PoolConfig::default());
        assert!(alloc.allocate(0).is_null());
        assert!(matches!(alloc.try_allocate(0), Err(PoolError::ZeroSizeRequest)));
        assert_eq!(alloc.stats().alloc_count, 0);
    }

    #[test]
    fn test_shutdown_refuses_allocation() {
        let alloc = alloc(PoolConfig::default());
        let p = alloc.allocate(32);
        alloc.shutdown();
        assert!(alloc.is_shut_down());
        assert!(alloc.allocate(32).is_null());
        assert!(matches!(alloc.try_allocate(32), Err(PoolError::ShutDown)));

        // Releases still work.
        unsafe { alloc.deallocate(p) };
        assert_eq!(alloc.stats().free_count, 1);
    }

    #[test]
    fn test_null_deallocate_is_noop() {
        let alloc = alloc(PoolConfig::default());
        unsafe { alloc.deallocate(ptr::null_mut()) };
        let stats = alloc.stats();
        assert_eq!(stats.free_count, 0);
        assert_eq!(stats.invalid_release_count, 0);
    }

    #[test]
    fn test_pointers_are_aligned() {
        for alignment in [8, 16, 64, 256] {
            let alloc = alloc(PoolConfig::default().with_alignment(alignment));
            for size in [1, 8, 24, 100, 1024, 1025, 5000] {
                let p = alloc.allocate(size);
                assert_eq!(p as usize % alignment, 0, "size {} align {}", size, alignment);
                unsafe { alloc.deallocate(p) };
            }
        }
    }

    #[test]
    fn test_usable_size() {
        let alloc = alloc(PoolConfig::default().with_tls(false));
        let small = alloc.allocate(10);
        let large = alloc.allocate(3000);
        assert_eq!(alloc.usable_size(small), Some(16));
        assert_eq!(alloc.usable_size(large), Some(3000));
        unsafe { alloc.deallocate(small) };
        assert_eq!(alloc.usable_size(small), None);
        unsafe { alloc.deallocate(large) };
        assert_eq!(alloc.usable_size(large), None);
        assert_eq!(alloc.usable_size(ptr::null_mut()), None);
    }

    #[test]
    fn test_with_options() {
        let alloc = PoolAllocator::with_options(1 << 20, false, 16).unwrap();
        assert_eq!(alloc.config().max_total_memory, 1 << 20);
        assert!(!alloc.config().enable_tls);
        assert_eq!(alloc.config().alignment, 16);
        assert!(PoolAllocator::with_options(1 << 20, true, 3).is_err());
    }

    #[test]
    fn test_with_defaults() {
        let alloc = PoolAllocator::with_defaults();
        assert_eq!(alloc.config().size_classes, crate::api::config::DEFAULT_SIZE_CLASSES);
        let p = alloc.allocate(100);
        assert!(!p.is_null());
        unsafe { alloc.deallocate(p) };
    }

    #[test]
    fn test_flush_thread_cache() {
        let alloc = alloc(PoolConfig::default());
        let p = alloc.allocate(128);
        unsafe { alloc.deallocate(p) };
        assert_eq!(alloc.thread_cached_blocks(), 1);

        alloc.flush_thread_cache();
        assert_eq!(alloc.thread_cached_blocks(), 0);
        assert_eq!(alloc.stats().class(128).unwrap().free, 1);
    }
}
