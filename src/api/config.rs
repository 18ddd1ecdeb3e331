//! Allocator configuration.

use std::time::Duration;

use crate::api::error::PoolError;

/// Number of size classes served by pools.
pub const NUM_SIZE_CLASSES: usize = 8;

/// Default size classes (bytes).
pub const DEFAULT_SIZE_CLASSES: [usize; NUM_SIZE_CLASSES] = [8, 16, 32, 64, 128, 256, 512, 1024];

/// Largest accepted alignment.
pub const MAX_ALIGNMENT: usize = 4096;

const DEFAULT_MAX_TOTAL_MEMORY: usize = 1024 * 1024 * 1024;

/// What happens when fresh system memory would exceed `max_total_memory`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BudgetPolicy {
    /// Allocate anyway and emit a warning once per crossing.
    #[default]
    Advisory,

    /// Refuse the allocation.
    Enforce,
}

/// Configuration for the pool allocator. Fixed once the allocator is built.
#[derive(Debug, Clone)]
pub struct PoolConfig {
    /// Block sizes served by pools, strictly ascending (default: 8..=1024)
    pub size_classes: [usize; NUM_SIZE_CLASSES],

    /// System memory budget in bytes (default: 1 GB, 0 = unlimited)
    pub max_total_memory: usize,

    /// How `max_total_memory` is applied
    pub budget_policy: BudgetPolicy,

    /// Alignment of every user pointer, a power of two (default: 8)
    pub alignment: usize,

    /// Enable per-thread block caches
    pub enable_tls: bool,

    /// Blocks cached per thread per size class (default: 16)
    pub tls_cache_size: usize,

    /// Run the background maintenance thread
    pub enable_maintenance: bool,

    /// Wake-up interval of the maintenance thread (default: 30 s)
    pub maintenance_interval: Duration,

    /// Idle timeout for cached memory (default: 300 s). Reserved; the
    /// maintenance pass does not read it yet.
    pub idle_timeout: Duration,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            size_classes: DEFAULT_SIZE_CLASSES,
            max_total_memory: DEFAULT_MAX_TOTAL_MEMORY,
            budget_policy: BudgetPolicy::Advisory,
            alignment: 8,
            enable_tls: true,
            tls_cache_size: 16,
            enable_maintenance: true,
            maintenance_interval: Duration::from_secs(30),
            idle_timeout: Duration::from_secs(300),
        }
    }
}

impl PoolConfig {
    /// Config without thread caches or background thread.
    ///
    /// Every release goes straight back to its pool, which keeps the
    /// statistics exact.
    pub fn minimal() -> Self {
        Self {
            enable_tls: false,
            enable_maintenance: false,
            ..Self::default()
        }
    }

    /// Config with larger thread caches for same-size churn.
    pub fn high_performance() -> Self {
        Self {
            tls_cache_size: 64,
            max_total_memory: 0,
            ..Self::default()
        }
    }

    /// Check the configuration.
    pub fn validate(&self) -> Result<(), PoolError> {
        if !self.alignment.is_power_of_two() || self.alignment > MAX_ALIGNMENT {
            return Err(PoolError::InvalidConfig(format!(
                "alignment must be a power of two no greater than {}, got {}",
                MAX_ALIGNMENT, self.alignment
            )));
        }
        if self.size_classes[0] == 0 {
            return Err(PoolError::InvalidConfig("size classes must be non-zero".into()));
        }
        if self.size_classes.windows(2).any(|pair| pair[0] >= pair[1]) {
            return Err(PoolError::InvalidConfig(format!(
                "size classes must be strictly ascending, got {:?}",
                self.size_classes
            )));
        }
        if self.enable_maintenance && self.maintenance_interval.is_zero() {
            return Err(PoolError::InvalidConfig(
                "maintenance_interval must be non-zero".into(),
            ));
        }
        Ok(())
    }

    /// Builder pattern: set size classes.
    pub fn with_size_classes(mut self, classes: [usize; NUM_SIZE_CLASSES]) -> Self {
        self.size_classes = classes;
        self
    }

    /// Builder pattern: set the memory budget.
    pub fn with_max_total_memory(mut self, bytes: usize) -> Self {
        self.max_total_memory = bytes;
        self
    }

    /// Builder pattern: set the budget policy.
    pub fn with_budget_policy(mut self, policy: BudgetPolicy) -> Self {
        self.budget_policy = policy;
        self
    }

    /// Builder pattern: set alignment.
    pub fn with_alignment(mut self, alignment: usize) -> Self {
        self.alignment = alignment;
        self
    }

    /// Builder pattern: enable thread caches.
    pub fn with_tls(mut self, enable: bool) -> Self {
        self.enable_tls = enable;
        self
    }

    /// Builder pattern: set thread cache capacity per class.
    pub fn with_tls_cache_size(mut self, blocks: usize) -> Self {
        self.tls_cache_size = blocks;
        self
    }

    /// Builder pattern: enable the maintenance thread.
    pub fn with_maintenance(mut self, enable: bool) -> Self {
        self.enable_maintenance = enable;
        self
    }

    /// Builder pattern: set the maintenance interval.
    pub fn with_maintenance_interval(mut self, interval: Duration) -> Self {
        self.maintenance_interval = interval;
        self
    }

    /// Builder pattern: set the idle timeout.
    pub fn with_idle_timeout(mut self, timeout: Duration) -> Self {
        self.idle_timeout = timeout;
        self
    }
}
