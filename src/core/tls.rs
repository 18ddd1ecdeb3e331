//! Thread-local block caches.
//!
//! Each thread keeps one [`ThreadCache`] per allocator instance it has
//! touched, created lazily. A cache is a bounded stack of released blocks per
//! size class, so same-size alloc/free churn on one thread never takes a pool
//! lock.
//!
//! A cache only holds a weak reference to its allocator. When the thread
//! exits, every cached block is drained back into its owning pool if the
//! allocator is still alive; if it is gone, its pools have already freed the
//! memory and the pointers are just forgotten.

use std::cell::RefCell;
use std::ptr::NonNull;
use std::sync::{Arc, Weak};

use crate::api::config::NUM_SIZE_CLASSES;
use crate::core::global::GlobalState;

thread_local! {
    static CACHES: RefCell<Vec<ThreadCache>> = const { RefCell::new(Vec::new()) };
}

/// Per-thread, per-allocator stacks of released blocks.
pub struct ThreadCache {
    /// Allocator the blocks belong to
    owner: Weak<GlobalState>,

    /// One LIFO stack per size class
    stacks: [Vec<NonNull<u8>>; NUM_SIZE_CLASSES],

    /// Maximum blocks per stack
    capacity: usize,
}

impl ThreadCache {
    fn new(owner: &Arc<GlobalState>, capacity: usize) -> Self {
        Self {
            owner: Arc::downgrade(owner),
            stacks: std::array::from_fn(|_| Vec::new()),
            capacity,
        }
    }

    /// Pop a cached block of `class`, if any.
    #[inline]
    pub fn try_take(&mut self, class: usize) -> Option<NonNull<u8>> {
        self.stacks.get_mut(class)?.pop()
    }

    /// Cache a released block. Returns false if the stack is full, in which
    /// case the caller must hand the block to the pool.
    #[inline]
    pub fn try_put(&mut self, class: usize, block: NonNull<u8>) -> bool {
        match self.stacks.get_mut(class) {
            Some(stack) if stack.len() < self.capacity => {
                stack.push(block);
                true
            }
            _ => false,
        }
    }

    /// Total blocks held across all classes.
    pub fn len(&self) -> usize {
        self.stacks.iter().map(Vec::len).sum()
    }

    /// Whether the cache holds no blocks.
    #[cfg(test)]
    pub fn is_empty(&self) -> bool {
        self.stacks.iter().all(Vec::is_empty)
    }

    fn belongs_to(&self, owner: &Arc<GlobalState>) -> bool {
        std::ptr::eq(self.owner.as_ptr(), Arc::as_ptr(owner))
    }
}

impl Drop for ThreadCache {
    fn drop(&mut self) {
        let Some(owner) = self.owner.upgrade() else {
            return;
        };
        for (class, stack) in self.stacks.iter_mut().enumerate() {
            for block in stack.drain(..) {
                owner.reclaim_cached(class, block);
            }
        }
    }
}

/// Run `f` against the current thread's cache for `owner`.
///
/// Returns `None` without calling `f` when caching is disabled for this
/// allocator, or when the thread's cache storage is unavailable (thread
/// teardown, re-entrant access). Callers then fall back to the pool.
pub fn with_cache<F, R>(owner: &Arc<GlobalState>, f: F) -> Option<R>
where
    F: FnOnce(&mut ThreadCache) -> R,
{
    let config = owner.config();
    if !config.enable_tls {
        return None;
    }
    let capacity = config.tls_cache_size;

    CACHES
        .try_with(|cell| {
            let mut caches = cell.try_borrow_mut().ok()?;
            let index = match caches.iter().position(|c| c.belongs_to(owner)) {
                Some(index) => index,
                None => {
                    // Caches of dropped allocators hold nothing reachable.
                    caches.retain(|c| c.owner.strong_count() > 0);
                    caches.push(ThreadCache::new(owner, capacity));
                    caches.len() - 1
                }
            };
            Some(f(&mut caches[index]))
        })
        .ok()
        .flatten()
}

/// Number of blocks the current thread caches for `owner`.
pub fn cached_blocks(owner: &Arc<GlobalState>) -> usize {
    CACHES
        .try_with(|cell| {
            cell.try_borrow()
                .ok()
                .and_then(|caches| caches.iter().find(|c| c.belongs_to(owner)).map(ThreadCache::len))
                .unwrap_or(0)
        })
        .unwrap_or(0)
}

/// Drain the current thread's cache for `owner` back into its pools.
pub fn flush(owner: &Arc<GlobalState>) {
    let removed = CACHES
        .try_with(|cell| {
            let mut caches = cell.try_borrow_mut().ok()?;
            let index = caches.iter().position(|c| c.belongs_to(owner))?;
            Some(caches.swap_remove(index))
        })
        .ok()
        .flatten();
    // Dropped outside the borrow; `Drop` does the draining.
    drop(removed);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::config::PoolConfig;

    fn owner(capacity: usize) -> Arc<GlobalState> {
        let config = PoolConfig::default()
            .with_tls_cache_size(capacity)
            .with_maintenance(false);
        Arc::new(GlobalState::new(config).unwrap())
    }

    #[test]
    fn test_take_put_bounded() {
        let global = owner(2);
        let block = NonNull::<u64>::dangling().cast::<u8>();

        let accepted = with_cache(&global, |cache| {
            assert!(cache.try_take(0).is_none());
            let a = cache.try_put(0, block);
            let b = cache.try_put(0, block);
            let c = cache.try_put(0, block);
            assert!(!cache.try_put(NUM_SIZE_CLASSES, block));
            let taken = cache.try_take(0);
            cache.stacks[0].clear();
            (a, b, c, taken)
        })
        .unwrap();

        assert_eq!(accepted, (true, true, false, Some(block)));
    }

    #[test]
    fn test_disabled_cache_is_skipped() {
        let config = PoolConfig::default().with_tls(false).with_maintenance(false);
        let global = Arc::new(GlobalState::new(config).unwrap());
        assert!(with_cache(&global, |_| ()).is_none());
    }

    #[test]
    fn test_one_cache_per_allocator() {
        let a = owner(4);
        let b = owner(4);
        let block = NonNull::<u64>::dangling().cast::<u8>();

        with_cache(&a, |cache| assert!(cache.try_put(1, block)));
        assert_eq!(cached_blocks(&a), 1);
        assert_eq!(cached_blocks(&b), 0);

        with_cache(&a, |cache| cache.stacks[1].clear());
        assert!(with_cache(&a, |cache| cache.is_empty()).unwrap());
    }
}
