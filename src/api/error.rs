//! Error types.

use thiserror::Error;

/// Reasons an allocator operation fails.
///
/// Raw `allocate`/`reallocate` map these to a null pointer; `try_allocate`,
/// construction and [`ScopedAllocation`](crate::ScopedAllocation) return them.
#[derive(Debug, Error)]
pub enum PoolError {
    /// The system allocator returned no memory.
    #[error("allocation of {size} bytes failed: system memory exhausted")]
    AllocationExhausted {
        /// Requested usable bytes
        size: usize,
    },

    /// Zero-byte requests are never served.
    #[error("zero-size allocation requested")]
    ZeroSizeRequest,

    /// The allocator has been shut down.
    #[error("allocator is shut down")]
    ShutDown,

    /// `max_total_memory` would be exceeded under `BudgetPolicy::Enforce`.
    #[error("memory budget exceeded: {requested} more bytes would pass the {limit} byte limit")]
    BudgetExceeded {
        /// Fresh system bytes the request needed
        requested: usize,
        /// Configured limit
        limit: usize,
    },

    /// The pointer is not a live block of this allocator.
    #[error("pointer is not a live block of this allocator")]
    InvalidRelease,

    /// Configuration rejected at construction.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// The maintenance thread could not be started.
    #[error("failed to spawn maintenance thread: {0}")]
    MaintenanceSpawn(#[source] std::io::Error),
}
