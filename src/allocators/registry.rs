//! Address registry of pooled blocks.
//!
//! Pool regions are never returned to the system while the allocator lives,
//! so once an address is registered it stays valid to read. A release looks
//! the address up here before touching any header: an address that is
//! neither registered nor a live oversized block is never dereferenced.

use std::collections::HashMap;
use std::ptr::NonNull;

use crate::sync::rwlock::RwLock;

/// User address -> index of the owning size-class pool.
#[derive(Default)]
pub struct BlockRegistry {
    blocks: RwLock<HashMap<usize, usize>>,
}

impl BlockRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a freshly carved block.
    pub fn register(&self, user: NonNull<u8>, class: usize) {
        self.blocks.write().insert(user.as_ptr() as usize, class);
    }

    /// Pool index of `user`, `None` if no pool ever handed it out.
    #[inline]
    pub fn class_of(&self, user: NonNull<u8>) -> Option<usize> {
        self.blocks.read().get(&(user.as_ptr() as usize)).copied()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lookup() {
        let registry = BlockRegistry::new();
        let mut slots = [0u64; 2];
        let a = NonNull::from(&mut slots[0]).cast::<u8>();
        let b = NonNull::from(&mut slots[1]).cast::<u8>();

        registry.register(a, 3);
        assert_eq!(registry.class_of(a), Some(3));
        assert_eq!(registry.class_of(b), None);
    }
}
