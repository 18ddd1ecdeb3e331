//! Diagnostic kinds and predefined codes.

/// The severity level of a diagnostic.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DiagnosticKind {
    /// Something is definitely wrong in the caller.
    Error,
    /// Something is probably wrong or suboptimal.
    Warning,
}

impl DiagnosticKind {
    /// Get the display prefix for this kind.
    pub fn prefix(&self) -> &'static str {
        match self {
            DiagnosticKind::Error => "error",
            DiagnosticKind::Warning => "warning",
        }
    }
}

/// A diagnostic message with code, message, and optional help.
#[derive(Debug, Clone, Copy)]
pub struct Diagnostic {
    /// Severity level.
    pub kind: DiagnosticKind,
    /// Diagnostic code (e.g., "CP201").
    pub code: &'static str,
    /// Primary message.
    pub message: &'static str,
    /// Optional fix suggestion.
    pub help: Option<&'static str>,
}

impl Diagnostic {
    /// Create a new error diagnostic.
    pub const fn error(code: &'static str, message: &'static str) -> Self {
        Self {
            kind: DiagnosticKind::Error,
            code,
            message,
            help: None,
        }
    }

    /// Create a new warning diagnostic.
    pub const fn warning(code: &'static str, message: &'static str) -> Self {
        Self {
            kind: DiagnosticKind::Warning,
            code,
            message,
            help: None,
        }
    }

    /// Add a help message to this diagnostic.
    pub const fn with_help(mut self, help: &'static str) -> Self {
        self.help = Some(help);
        self
    }
}

// =============================================================================
// CP1xx - System memory
// =============================================================================

/// CP101: The system allocator refused a request.
pub const CP101: Diagnostic = Diagnostic::warning(
    "CP101",
    "system allocator returned no memory",
)
.with_help("reduce the working set or raise the process memory limit");

// =============================================================================
// CP2xx - Release validation
// =============================================================================

/// CP201: Double release or foreign pointer.
pub const CP201: Diagnostic = Diagnostic::error(
    "CP201",
    "invalid release ignored (double free or pointer not owned by this allocator)",
)
.with_help("release each pointer exactly once, through the allocator that returned it");

/// CP202: Reallocation of a block that is not live.
pub const CP202: Diagnostic = Diagnostic::error(
    "CP202",
    "reallocate called on a block that is not live",
)
.with_help("pass null to reallocate to request a fresh block");

// =============================================================================
// CP3xx - Budgets
// =============================================================================

/// CP301: System memory crossed the configured budget (advisory policy).
pub const CP301: Diagnostic = Diagnostic::warning(
    "CP301",
    "reserved memory exceeds max_total_memory",
)
.with_help("raise max_total_memory or switch to BudgetPolicy::Enforce");

/// CP302: Allocation refused by the enforced budget.
pub const CP302: Diagnostic = Diagnostic::warning(
    "CP302",
    "allocation refused: max_total_memory reached",
)
.with_help("release memory or raise max_total_memory");
