//! Fixed-size block pool for one size class.
//!
//! Each pool owns a LIFO free list of blocks of a single size. Blocks are
//! never returned to the system on release; every region a pool creates is
//! kept until the pool itself is dropped.

use std::alloc::{alloc, dealloc, Layout};
use std::ptr::{self, NonNull};

use crate::allocators::header::{BlockHeader, HeaderLayout};
use crate::allocators::registry::BlockRegistry;
use crate::api::error::PoolError;
use crate::api::stats::ClassStats;
use crate::core::budget::MemoryBudget;
use crate::sync::mutex::Mutex;
use crate::util::layout::align_up;

/// A pool of equally sized blocks guarded by one lock.
pub struct SizeClassPool {
    /// Position in the allocator's class table
    index: usize,

    /// Usable bytes per block (the size class rounded to the alignment)
    block_size: usize,

    /// Header geometry shared with the coordinator
    header: HeaderLayout,

    /// Layout of one region (header + block)
    region: Layout,

    /// Free list and counters
    inner: Mutex<PoolInner>,
}

struct PoolInner {
    /// Available user pointers
    free: Vec<NonNull<u8>>,

    /// Base of every region this pool ever allocated
    regions: Vec<NonNull<u8>>,

    /// Blocks currently leased out (including blocks parked in thread caches)
    leased: usize,
}

impl SizeClassPool {
    /// Create an empty pool at position `index` of the class table.
    /// `size_class` is rounded up to `alignment`.
    ///
    /// Returns `None` if the region size overflows.
    pub fn new(
        index: usize,
        size_class: usize,
        alignment: usize,
        header: HeaderLayout,
    ) -> Option<Self> {
        let block_size = align_up(size_class, alignment);
        let region = header.region_layout(block_size)?;
        Some(Self {
            index,
            block_size,
            header,
            region,
            inner: Mutex::new(PoolInner {
                free: Vec::new(),
                regions: Vec::new(),
                leased: 0,
            }),
        })
    }

    /// Usable bytes per block.
    #[inline]
    pub fn block_size(&self) -> usize {
        self.block_size
    }

    /// Bytes of system memory one block costs, header included.
    #[cfg(test)]
    pub fn region_size(&self) -> usize {
        self.region.size()
    }

    /// Whether `header` claims to belong to this pool.
    #[inline]
    pub fn owns(&self, header: &BlockHeader) -> bool {
        ptr::eq(header.owner(), self) && header.size_class() == self.block_size
    }

    /// Lease a block.
    ///
    /// Pops the free list when possible. Otherwise reserves budget for a
    /// fresh region, asks the system allocator for it and records the new
    /// block in `registry`.
    pub fn allocate(
        &self,
        budget: &MemoryBudget,
        registry: &BlockRegistry,
    ) -> Result<NonNull<u8>, PoolError> {
        let mut inner = self.inner.lock();
        if let Some(user) = inner.free.pop() {
            inner.leased += 1;
            drop(inner);
            // SAFETY: free-listed pointers come from `init` below and their
            // regions stay allocated until the pool is dropped.
            unsafe { self.header.header(user) }.mark_leased();
            return Ok(user);
        }

        // Release lock before allocation
        drop(inner);

        budget.try_reserve(self.region.size())?;

        // SAFETY: `region` has a non-zero size (the header is never empty).
        let base = match NonNull::new(unsafe { alloc(self.region) }) {
            Some(base) => base,
            None => {
                budget.release(self.region.size());
                return Err(PoolError::AllocationExhausted {
                    size: self.block_size,
                });
            }
        };

        // SAFETY: `base` was just allocated with `self.region`.
        let user = unsafe { self.header.init(base, self.block_size, self.block_size, self) };
        registry.register(user, self.index);

        let mut inner = self.inner.lock();
        inner.regions.push(base);
        inner.leased += 1;
        Ok(user)
    }

    /// Release a block leased from this pool.
    ///
    /// Returns false, and changes nothing, if the block belongs to another
    /// pool or is not live.
    ///
    /// # Safety
    ///
    /// `user` must have been returned by a pool of the same allocator, and
    /// that allocator must still be alive.
    pub unsafe fn release(&self, user: NonNull<u8>) -> bool {
        let header = self.header.header(user);
        if !self.owns(header) || !header.try_mark_released() {
            return false;
        }
        self.recycle(user);
        true
    }

    /// Push an already released block back onto the free list.
    ///
    /// The caller must have flipped the block's header to not-in-use.
    pub fn recycle(&self, user: NonNull<u8>) {
        let mut inner = self.inner.lock();
        inner.free.push(user);
        inner.leased = inner.leased.saturating_sub(1);
    }

    /// Snapshot of this pool's counters.
    pub fn stats(&self) -> ClassStats {
        let inner = self.inner.lock();
        ClassStats {
            class_size: self.block_size,
            used: inner.leased,
            free: inner.free.len(),
            total_allocated: inner.regions.len(),
        }
    }
}

impl Drop for SizeClassPool {
    fn drop(&mut self) {
        let inner = self.inner.get_mut();
        inner.free.clear();
        for base in inner.regions.drain(..) {
            // SAFETY: every base in `regions` was allocated with `self.region`
            // and is freed exactly once here.
            unsafe { dealloc(base.as_ptr(), self.region) };
        }
    }
}

// SAFETY: the raw block pointers are only reachable through the mutex, and
// the memory they point to is owned by the pool.
unsafe impl Send for SizeClassPool {}
unsafe impl Sync for SizeClassPool {}
