//! Public API for classpool.
//!
//! This module contains all user-facing types.

pub mod alloc;
pub mod config;
pub mod error;
pub mod scoped;
pub mod stats;
