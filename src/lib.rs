//! # classpool
//!
//! A thread-shared memory allocator that puts segregated size-class pools and
//! per-thread caches in front of the system allocator.
//!
//! ## Features
//!
//! - Eight fixed size classes (8 to 1024 bytes by default), one locked free
//!   list each, so contention is scoped per class
//! - Thread-local block caches: same-size alloc/free on one thread takes no
//!   lock at all
//! - Oversized requests delegated to the system allocator
//! - Block headers recovered from bare pointers, with double-release and
//!   foreign-pointer detection
//! - Atomic statistics and an optional system memory budget
//! - Background maintenance thread
//! - [`ScopedAllocation`]: scope-bound allocation that fails explicitly
//!
//! ## Quick Start
//!
//! ```rust
//! use classpool::{PoolAllocator, PoolConfig};
//!
//! let alloc = PoolAllocator::new(PoolConfig::default()).unwrap();
//!
//! let p = alloc.allocate(48); // served by the 64-byte pool
//! assert!(!p.is_null());
//! unsafe {
//!     p.write_bytes(0xAB, 48);
//!     alloc.deallocate(p);
//! }
//!
//! let buf = alloc.scoped(256).unwrap(); // released at end of scope
//! assert_eq!(buf.len(), 256);
//! ```
//!
//! ## Feature flags
//!
//! - `log` (default): diagnostics and lifecycle events through the `log` crate
//! - `parking_lot`: parking_lot mutexes for the pool locks
//! - `diagnostics`: stderr diagnostics in release builds when `log` is off

pub mod api;
pub mod diagnostics;

mod allocators;
mod core;
mod sync;
mod util;

// Re-export public API at crate root for convenience
pub use api::alloc::PoolAllocator;
pub use api::config::{BudgetPolicy, PoolConfig, DEFAULT_SIZE_CLASSES, MAX_ALIGNMENT, NUM_SIZE_CLASSES};
pub use api::error::PoolError;
pub use api::scoped::ScopedAllocation;
pub use api::stats::{ClassStats, PoolStats};

// Diagnostics
pub use diagnostics::{suppress_diagnostics, Diagnostic, DiagnosticKind};

/// Allocate a [`ScopedAllocation`] of `size` bytes from `alloc`.
pub fn scoped_allocate(alloc: &PoolAllocator, size: usize) -> Result<ScopedAllocation<'_>, PoolError> {
    ScopedAllocation::new(alloc, size)
}
