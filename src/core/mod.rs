//! Shared allocator state and the machinery around it.

pub(crate) mod budget;
pub(crate) mod global;
pub(crate) mod maintenance;
pub(crate) mod tls;
