//! System memory budget.
//!
//! Tracks bytes actually obtained from the system allocator: pool regions
//! (kept until teardown) and live oversized regions, headers included. Only
//! fresh system requests are checked; reusing a pooled block never is.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use crate::api::config::BudgetPolicy;
use crate::api::error::PoolError;
use crate::diagnostics::{self, CP301, CP302};
use crate::sync::atomics::AtomicCounter;

/// Reserved-bytes accounting against `max_total_memory`.
#[derive(Debug)]
pub struct MemoryBudget {
    /// Limit in bytes (0 = unlimited)
    limit: usize,

    /// What happens when a request would cross the limit
    policy: BudgetPolicy,

    /// Bytes currently obtained from the system
    reserved: AtomicUsize,

    /// Set while reserved > limit, so the advisory warning fires once per crossing
    over_limit: AtomicBool,

    /// Requests refused under `BudgetPolicy::Enforce`
    denials: AtomicCounter,
}

impl MemoryBudget {
    /// Create a new budget.
    pub fn new(limit: usize, policy: BudgetPolicy) -> Self {
        Self {
            limit,
            policy,
            reserved: AtomicUsize::new(0),
            over_limit: AtomicBool::new(false),
            denials: AtomicCounter::new(0),
        }
    }

    /// Account for `bytes` of fresh system memory.
    pub fn try_reserve(&self, bytes: usize) -> Result<(), PoolError> {
        if self.limit == 0 {
            self.reserved.fetch_add(bytes, Ordering::Relaxed);
            return Ok(());
        }

        match self.policy {
            BudgetPolicy::Enforce => {
                let limit = self.limit;
                let reserved = self
                    .reserved
                    .fetch_update(Ordering::Relaxed, Ordering::Relaxed, |current| {
                        current.checked_add(bytes).filter(|&next| next <= limit)
                    });
                if reserved.is_err() {
                    self.denials.increment();
                    diagnostics::emit_with_context(
                        &CP302,
                        &format!("requested={} limit={}", bytes, limit),
                    );
                    return Err(PoolError::BudgetExceeded {
                        requested: bytes,
                        limit,
                    });
                }
            }
            BudgetPolicy::Advisory => {
                let next = self
                    .reserved
                    .fetch_add(bytes, Ordering::Relaxed)
                    .saturating_add(bytes);
                if next > self.limit && !self.over_limit.swap(true, Ordering::Relaxed) {
                    diagnostics::emit_with_context(
                        &CP301,
                        &format!("reserved={} limit={}", next, self.limit),
                    );
                }
            }
        }
        Ok(())
    }

    /// Return `bytes` previously reserved.
    pub fn release(&self, bytes: usize) {
        let previous = self
            .reserved
            .fetch_update(Ordering::Relaxed, Ordering::Relaxed, |current| {
                Some(current.saturating_sub(bytes))
            })
            .unwrap_or_else(|current| current);
        if previous.saturating_sub(bytes) <= self.limit {
            self.over_limit.store(false, Ordering::Relaxed);
        }
    }

    /// Bytes currently obtained from the system.
    pub fn reserved(&self) -> usize {
        self.reserved.load(Ordering::Relaxed)
    }

    /// Requests refused under the enforce policy.
    pub fn denials(&self) -> u64 {
        self.denials.get()
    }
}
