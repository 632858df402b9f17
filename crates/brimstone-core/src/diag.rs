//! Diagnostics sink and severities.
//!
//! Resolution never throws: a failing node writes exactly one diagnostic
//! for its immediate cause and signals failure through its return value.
//! The sink collects everything so one pass over a function can surface
//! several independent errors.

use thiserror::Error;

use crate::span::Span;

/// Diagnostic severity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Severity {
    /// Compiler-debugging trace output.
    Debug,
    Warning,
    /// Recoverable error; the lax dialect downgrades these to warnings.
    Error,
    /// Unconditional error.
    Fatal,
}

/// One reported message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Diagnostic {
    pub severity: Severity,
    pub span: Span,
    pub message: String,
}

impl std::fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let tag = match self.severity {
            Severity::Debug => "debug",
            Severity::Warning => "warning",
            Severity::Error | Severity::Fatal => "error",
        };
        write!(f, "{tag}: {}: {}", self.span, self.message)
    }
}

/// Collects diagnostics for one compilation. Never panics; callers check
/// [`DiagnosticSink::has_errors`] or their own return values.
#[derive(Debug, Default)]
pub struct DiagnosticSink {
    diags: Vec<Diagnostic>,
    errors: usize,
}

impl DiagnosticSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn report(&mut self, severity: Severity, span: Span, message: impl Into<String>) {
        if severity >= Severity::Error {
            self.errors += 1;
        }
        self.diags.push(Diagnostic { severity, span, message: message.into() });
    }

    pub fn fatal(&mut self, span: Span, message: impl Into<String>) {
        self.report(Severity::Fatal, span, message);
    }

    pub fn error(&mut self, span: Span, message: impl Into<String>) {
        self.report(Severity::Error, span, message);
    }

    pub fn warning(&mut self, span: Span, message: impl Into<String>) {
        self.report(Severity::Warning, span, message);
    }

    pub fn debug(&mut self, span: Span, message: impl Into<String>) {
        self.report(Severity::Debug, span, message);
    }

    pub fn has_errors(&self) -> bool {
        self.errors > 0
    }

    pub fn error_count(&self) -> usize {
        self.errors
    }

    pub fn diagnostics(&self) -> &[Diagnostic] {
        &self.diags
    }

    /// Take all collected diagnostics, leaving the sink empty.
    pub fn drain(&mut self) -> Vec<Diagnostic> {
        self.errors = 0;
        std::mem::take(&mut self.diags)
    }
}

/// Top-level compilation failure.
#[derive(Debug, Error)]
pub enum CompileError {
    /// Resolution reported diagnostics; emission was not attempted.
    #[error("resolution failed with {errors} error(s)")]
    ResolveFailed { errors: usize },
}
