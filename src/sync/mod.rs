//! Synchronization primitives.
//!
//! Pool locks go through [`mutex::Mutex`] and the block registry through
//! [`rwlock::RwLock`] so the backing implementation can be swapped by
//! feature flag; statistics use the lock-free helpers in [`atomics`].

pub(crate) mod atomics;
pub(crate) mod mutex;
pub(crate) mod rwlock;
