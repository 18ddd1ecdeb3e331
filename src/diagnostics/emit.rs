//! Diagnostic emission backend.
//!
//! With the `log` feature diagnostics go to the `log` facade. Without it
//! they are written to stderr in debug builds (or with the `diagnostics`
//! feature) and dropped otherwise.

use std::sync::atomic::{AtomicBool, Ordering};

use super::kind::{Diagnostic, DiagnosticKind};

/// Global flag to suppress diagnostic output (for testing).
static DIAGNOSTICS_SUPPRESSED: AtomicBool = AtomicBool::new(false);

/// Suppress all diagnostic output.
pub fn suppress_diagnostics(suppress: bool) {
    DIAGNOSTICS_SUPPRESSED.store(suppress, Ordering::Relaxed);
}

/// Check if diagnostics are suppressed.
pub fn is_suppressed() -> bool {
    DIAGNOSTICS_SUPPRESSED.load(Ordering::Relaxed)
}

/// Emit a diagnostic.
pub fn emit(diag: &Diagnostic) {
    emit_with_context(diag, "");
}

/// Emit a diagnostic with additional runtime context (address, sizes).
pub fn emit_with_context(diag: &Diagnostic, context: &str) {
    if is_suppressed() {
        return;
    }

    #[cfg(feature = "log")]
    emit_to_log(diag, context);

    #[cfg(all(not(feature = "log"), any(debug_assertions, feature = "diagnostics")))]
    emit_to_stderr(diag, context);

    #[cfg(all(not(feature = "log"), not(any(debug_assertions, feature = "diagnostics"))))]
    let _ = (diag, context);
}

#[cfg(feature = "log")]
fn emit_to_log(diag: &Diagnostic, context: &str) {
    let level = match diag.kind {
        DiagnosticKind::Error => log::Level::Error,
        DiagnosticKind::Warning => log::Level::Warn,
    };
    if context.is_empty() {
        log::log!(level, "[{}] {}", diag.code, diag.message);
    } else {
        log::log!(level, "[{}] {} ({})", diag.code, diag.message, context);
    }
    if let Some(help) = diag.help {
        log::debug!("[{}]   help: {}", diag.code, help);
    }
}

#[cfg(all(not(feature = "log"), any(debug_assertions, feature = "diagnostics")))]
fn emit_to_stderr(diag: &Diagnostic, context: &str) {
    use std::io::Write;

    let mut stderr = std::io::stderr();
    let _ = writeln!(
        stderr,
        "[classpool][{}] {}: {}",
        diag.code,
        diag.kind.prefix(),
        diag.message
    );
    if !context.is_empty() {
        let _ = writeln!(stderr, "  context: {}", context);
    }
    if let Some(help) = diag.help {
        let _ = writeln!(stderr, "  help: {}", help);
    }
}
