//! RwLock wrapper - uses parking_lot if available, std otherwise.

#[cfg(feature = "parking_lot")]
pub use parking_lot::RwLock;

#[cfg(not(feature = "parking_lot"))]
mod std_rwlock {
    use std::sync::{PoisonError, RwLock as StdRwLock, RwLockReadGuard, RwLockWriteGuard};

    /// Thin wrapper around `std::sync::RwLock` with non-poisoning guards.
    #[derive(Default)]
    pub struct RwLock<T>(StdRwLock<T>);

    impl<T> RwLock<T> {
        /// Create a new lock.
        pub const fn new(value: T) -> Self {
            Self(StdRwLock::new(value))
        }

        /// Shared access.
        pub fn read(&self) -> RwLockReadGuard<'_, T> {
            self.0.read().unwrap_or_else(PoisonError::into_inner)
        }

        /// Exclusive access.
        pub fn write(&self) -> RwLockWriteGuard<'_, T> {
            self.0.write().unwrap_or_else(PoisonError::into_inner)
        }
    }
}

#[cfg(not(feature = "parking_lot"))]
pub use std_rwlock::RwLock;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_read_sees_write() {
        let lock = RwLock::new(0u32);
        *lock.write() += 5;
        let a = lock.read();
        let b = lock.read();
        assert_eq!(*a + *b, 10);
    }
}
