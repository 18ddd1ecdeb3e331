//! Allocator diagnostics.
//!
//! The allocator never fails loudly: invalid releases, budget overruns and
//! system allocation failures are reported here and counted in the stats.
//!
//! ## Diagnostic Codes
//!
//! | Code  | Meaning                        |
//! |-------|--------------------------------|
//! | CP1xx | System memory issues           |
//! | CP2xx | Release validation issues      |
//! | CP3xx | Budget/limit issues            |

pub mod emit;
pub mod kind;

pub use emit::{emit, emit_with_context, is_suppressed, suppress_diagnostics};
pub use kind::{Diagnostic, DiagnosticKind};
pub use kind::{CP101, CP201, CP202, CP301, CP302};
