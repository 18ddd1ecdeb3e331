//! Scope-bound allocations.

use std::ops::{Deref, DerefMut};
use std::ptr::NonNull;

use crate::api::alloc::PoolAllocator;
use crate::api::error::PoolError;

/// One allocation released exactly once when it goes out of scope.
///
/// Construction either yields a valid, zero-filled block or an error; there
/// is no "empty" handle. The handle borrows its allocator, so it cannot
/// outlive it, and it is neither `Clone` nor `Send`.
///
/// # Example
///
/// ```rust
/// use classpool::{PoolAllocator, PoolConfig};
///
/// let alloc = PoolAllocator::new(PoolConfig::minimal()).unwrap();
/// {
///     let mut buf = alloc.scoped(64).unwrap();
///     buf[..5].copy_from_slice(b"hello");
///     assert_eq!(&buf[..5], b"hello");
/// } // released here
///
/// assert_eq!(alloc.stats().free_count, 1);
/// ```
pub struct ScopedAllocation<'a> {
    alloc: &'a PoolAllocator,
    ptr: NonNull<u8>,
    size: usize,
}

impl<'a> ScopedAllocation<'a> {
    /// Allocate `size` zeroed bytes from `alloc`.
    pub fn new(alloc: &'a PoolAllocator, size: usize) -> Result<Self, PoolError> {
        let ptr = alloc.try_allocate(size)?;
        // SAFETY: the block has at least `size` writable bytes.
        unsafe { ptr.as_ptr().write_bytes(0, size) };
        Ok(Self { alloc, ptr, size })
    }

    /// Requested size in bytes.
    pub fn size(&self) -> usize {
        self.size
    }

    /// Get the raw pointer.
    pub fn as_ptr(&self) -> *const u8 {
        self.ptr.as_ptr()
    }

    /// Get the raw mutable pointer.
    pub fn as_mut_ptr(&mut self) -> *mut u8 {
        self.ptr.as_ptr()
    }

    /// Allocator this block came from.
    pub fn allocator(&self) -> &'a PoolAllocator {
        self.alloc
    }
}

impl Deref for ScopedAllocation<'_> {
    type Target = [u8];

    fn deref(&self) -> &Self::Target {
        // SAFETY: `size` bytes were zeroed at construction and stay owned by
        // this handle.
        unsafe { std::slice::from_raw_parts(self.ptr.as_ptr(), self.size) }
    }
}

impl DerefMut for ScopedAllocation<'_> {
    fn deref_mut(&mut self) -> &mut Self::Target {
        // SAFETY: as in `deref`; `&mut self` makes the access exclusive.
        unsafe { std::slice::from_raw_parts_mut(self.ptr.as_ptr(), self.size) }
    }
}

impl Drop for ScopedAllocation<'_> {
    fn drop(&mut self) {
        // SAFETY: the pointer came from `self.alloc` and is released only here.
        unsafe { self.alloc.deallocate(self.ptr.as_ptr()) };
    }
}

impl std::fmt::Debug for ScopedAllocation<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ScopedAllocation")
            .field("ptr", &self.ptr)
            .field("size", &self.size)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::config::{BudgetPolicy, PoolConfig};

    fn alloc() -> PoolAllocator {
        PoolAllocator::new(PoolConfig::minimal()).unwrap()
    }

    #[test]
    fn test_released_on_drop() {
        let alloc = alloc();
        {
            let buf = alloc.scoped(100).unwrap();
            assert_eq!(buf.size(), 100);
            assert!(buf.iter().all(|&b| b == 0));
            assert_eq!(alloc.stats().live_allocations(), 1);
        }
        let stats = alloc.stats();
        assert_eq!(stats.live_allocations(), 0);
        assert_eq!(stats.current_used, 0);
    }

    #[test]
    fn test_zero_size_fails_explicitly() {
        let alloc = alloc();
        assert!(matches!(alloc.scoped(0), Err(PoolError::ZeroSizeRequest)));
    }

    #[test]
    fn test_budget_failure_surfaces() {
        crate::diagnostics::suppress_diagnostics(true);
        let alloc = PoolAllocator::new(
            PoolConfig::minimal()
                .with_max_total_memory(64)
                .with_budget_policy(BudgetPolicy::Enforce),
        )
        .unwrap();
        assert!(matches!(
            ScopedAllocation::new(&alloc, 4096),
            Err(PoolError::BudgetExceeded { .. })
        ));
    }

    #[test]
    fn test_released_on_early_return() {
        fn fill(alloc: &PoolAllocator, fail: bool) -> Result<u8, PoolError> {
            let mut buf = alloc.scoped(2048)?;
            buf[0] = 7;
            if fail {
                return Err(PoolError::InvalidRelease);
            }
            Ok(buf[0])
        }

        let alloc = alloc();
        assert_eq!(fill(&alloc, false).unwrap(), 7);
        assert!(fill(&alloc, true).is_err());

        let stats = alloc.stats();
        assert_eq!(stats.free_count, 2);
        assert_eq!(stats.oversized_live, 0);
        assert_eq!(stats.invalid_release_count, 0);
    }

    #[test]
    fn test_released_on_panic() {
        let alloc = alloc();
        let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
            let _buf = alloc.scoped(32).unwrap();
            panic!("boom");
        }));
        assert!(result.is_err());
        assert_eq!(alloc.stats().free_count, 1);
    }
}
