//! System heap wrapper for oversized allocations.

use std::alloc::{alloc, dealloc};
use std::collections::HashMap;
use std::ptr::{self, NonNull};

use crate::allocators::header::{HeaderLayout, FALLBACK_CLASS};
use crate::api::error::PoolError;
use crate::core::budget::MemoryBudget;
use crate::sync::mutex::Mutex;

/// Serves requests larger than the biggest size class.
///
/// Blocks carry a fallback header so their size can be read back, and a
/// registry of live blocks makes a repeated release a no-op instead of a
/// second system free. Uses a mutex - this path is rare.
pub struct SystemHeap {
    /// Header geometry shared with the pools
    header: HeaderLayout,

    /// Live blocks: user address -> logical size
    live: Mutex<HashMap<usize, usize>>,
}

impl SystemHeap {
    /// Create a new system heap wrapper.
    pub fn new(header: HeaderLayout) -> Self {
        Self {
            header,
            live: Mutex::new(HashMap::new()),
        }
    }

    /// Allocate an oversized block of `size` usable bytes.
    pub fn allocate(&self, size: usize, budget: &MemoryBudget) -> Result<NonNull<u8>, PoolError> {
        let region = self
            .header
            .region_layout(size)
            .ok_or(PoolError::AllocationExhausted { size })?;

        budget.try_reserve(region.size())?;

        // SAFETY: region size includes the header and is never zero.
        let base = match NonNull::new(unsafe { alloc(region) }) {
            Some(base) => base,
            None => {
                budget.release(region.size());
                return Err(PoolError::AllocationExhausted { size });
            }
        };

        // SAFETY: `base` was just allocated with `region_layout(size)`.
        let user = unsafe { self.header.init(base, size, FALLBACK_CLASS, ptr::null()) };
        self.live.lock().insert(user.as_ptr() as usize, size);
        Ok(user)
    }

    /// Release an oversized block, returning its logical size.
    ///
    /// `None` if `user` is not a live block of this heap; nothing is freed.
    ///
    /// # Safety
    ///
    /// If `user` is a live block of this heap, no other reference to its
    /// memory may be used afterwards.
    pub unsafe fn release(&self, user: NonNull<u8>, budget: &MemoryBudget) -> Option<usize> {
        let size = self.live.lock().remove(&(user.as_ptr() as usize))?;
        self.free_region(user, size);
        if let Some(region) = self.header.region_layout(size) {
            budget.release(region.size());
        }
        Some(size)
    }

    /// Logical size of a live block, without touching its memory.
    pub fn live_size(&self, user: NonNull<u8>) -> Option<usize> {
        self.live.lock().get(&(user.as_ptr() as usize)).copied()
    }

    /// Number of live oversized blocks.
    pub fn live_blocks(&self) -> usize {
        self.live.lock().len()
    }

    unsafe fn free_region(&self, user: NonNull<u8>, size: usize) {
        // Only registered blocks get here, and their layout was valid at
        // allocation time.
        if let Some(region) = self.header.region_layout(size) {
            dealloc(self.header.base_of(user).as_ptr(), region);
        }
    }
}

impl Drop for SystemHeap {
    fn drop(&mut self) {
        let live = std::mem::take(self.live.get_mut());
        for (addr, size) in live {
            // SAFETY: registered addresses are non-null user pointers of
            // blocks that are still allocated; each is freed once.
            unsafe { self.free_region(NonNull::new_unchecked(addr as *mut u8), size) };
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::config::BudgetPolicy;

    #[test]
    fn test_heap_allocation() {
        let heap = SystemHeap::new(HeaderLayout::new(8));
        let budget = MemoryBudget::new(0, BudgetPolicy::Advisory);

        let ptr = heap.allocate(4096, &budget).unwrap();
        assert_eq!(heap.live_size(ptr), Some(4096));
        assert_eq!(heap.live_blocks(), 1);
        assert!(budget.reserved() > 4096);

        unsafe {
            ptr.as_ptr().write_bytes(0xAB, 4096);
            assert_eq!(heap.release(ptr, &budget), Some(4096));
        }

        assert_eq!(heap.live_blocks(), 0);
        assert_eq!(budget.reserved(), 0);
    }

    #[test]
    fn test_repeated_release_is_ignored() {
        let heap = SystemHeap::new(HeaderLayout::new(8));
        let budget = MemoryBudget::new(0, BudgetPolicy::Advisory);

        let ptr = heap.allocate(2000, &budget).unwrap();
        unsafe {
            assert_eq!(heap.release(ptr, &budget), Some(2000));
            assert_eq!(heap.release(ptr, &budget), None);
        }
    }

    #[test]
    fn test_drop_frees_leaked_blocks() {
        let heap = SystemHeap::new(HeaderLayout::new(16));
        let budget = MemoryBudget::new(0, BudgetPolicy::Advisory);
        for size in [1025, 5000, 70_000] {
            heap.allocate(size, &budget).unwrap();
        }
        assert_eq!(heap.live_blocks(), 3);
        drop(heap);
    }
}
