//! Atomic helpers for statistics and counters.
//!
//! All operations are `Relaxed`: the values are observability data and never
//! order other memory accesses.

use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};

/// A monotonically increasing event counter.
#[derive(Debug, Default)]
pub struct AtomicCounter(AtomicU64);

impl AtomicCounter {
    /// Create a new counter.
    pub const fn new(initial: u64) -> Self {
        Self(AtomicU64::new(initial))
    }

    /// Increment the counter.
    pub fn increment(&self) {
        self.0.fetch_add(1, Ordering::Relaxed);
    }

    /// Add a value to the counter.
    pub fn add(&self, value: u64) {
        self.0.fetch_add(value, Ordering::Relaxed);
    }

    /// Get the current value.
    pub fn get(&self) -> u64 {
        self.0.load(Ordering::Relaxed)
    }

    /// Reset to zero.
    pub fn reset(&self) {
        self.0.store(0, Ordering::Relaxed);
    }
}

/// A byte gauge that can go up or down.
///
/// Subtraction saturates at zero. Several gauges are updated one after
/// another without a common lock, so a reader can briefly see one side of a
/// move before the other.
#[derive(Debug, Default)]
pub struct AtomicGauge(AtomicUsize);

impl AtomicGauge {
    /// Create a new gauge.
    #[cfg(test)]
    pub const fn new(initial: usize) -> Self {
        Self(AtomicUsize::new(initial))
    }

    /// Add to the gauge.
    pub fn add(&self, value: usize) {
        self.0.fetch_add(value, Ordering::Relaxed);
    }

    /// Subtract from the gauge, stopping at zero.
    pub fn sub(&self, value: usize) {
        // The closure always returns Some, so this cannot fail.
        let _ = self
            .0
            .fetch_update(Ordering::Relaxed, Ordering::Relaxed, |current| {
                Some(current.saturating_sub(value))
            });
    }

    /// Get the current value.
    pub fn get(&self) -> usize {
        self.0.load(Ordering::Relaxed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counter() {
        let c = AtomicCounter::new(0);
        c.increment();
        c.add(5);
        assert_eq!(c.get(), 6);
        c.reset();
        assert_eq!(c.get(), 0);
    }

    #[test]
    fn test_gauge_saturates() {
        let g = AtomicGauge::new(10);
        g.add(6);
        g.sub(4);
        assert_eq!(g.get(), 12);
        g.sub(100);
        assert_eq!(g.get(), 0);
    }
}
