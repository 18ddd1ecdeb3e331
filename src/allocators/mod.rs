//! Memory sources behind the coordinator.
//!
//! - `header`: the block header prefixed to every region, and the only place
//!   that does pointer arithmetic on user pointers
//! - `pool`: one fixed-size free list per size class
//! - `registry`: addresses of pooled blocks, checked before any header read
//! - `heap`: oversized requests served straight from the system allocator

pub(crate) mod header;
pub(crate) mod heap;
pub(crate) mod pool;
pub(crate) mod registry;
