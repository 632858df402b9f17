//! Per-function compilation context.
//!
//! One [`CompileContext`] is created per function body and threaded
//! through every resolution call. It bundles the read-only services (type
//! store, symbol table, builtin registry), the diagnostics sink, the
//! options, and the mutable per-function state: local scope, aggregated
//! return types, and the loop/switch nesting used to validate break and
//! continue. Nothing in here is shared between concurrent compilations.

use brimstone_core::{
    DiagnosticSink, FuncFlags, FuncId, NameTable, Span, StateList, SymbolTable, TypeId, TypeStore,
};

use crate::builtins::BuiltinRegistry;
use crate::scope::LocalScope;

/// Marker for a failed resolution. The diagnostic has already been
/// written to the sink; the marker only propagates the failure upward.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Failed;

/// Compiler configuration.
#[derive(Debug, Clone, Copy, Default)]
pub struct CompileOptions {
    /// The legacy lax dialect: several numeric-type mismatches downgrade
    /// to warnings with a best-effort coercion.
    pub lax_dialect: bool,
}

/// Construct kinds tracked for break/continue legality during resolution.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlowKind {
    Loop,
    Switch,
}

/// State threaded through resolution of one function body.
pub struct CompileContext<'a> {
    pub types: &'a mut TypeStore,
    pub names: &'a mut NameTable,
    pub symbols: &'a SymbolTable,
    pub builtins: &'a BuiltinRegistry,
    pub sink: &'a mut DiagnosticSink,
    pub options: CompileOptions,

    /// Enclosing class for methods; `None` for free functions.
    pub class: Option<TypeId>,
    /// Enclosing function being compiled, when registered.
    pub func: Option<FuncId>,
    /// Usage-context and action flags of the enclosing function.
    pub func_flags: FuncFlags,
    /// Return types aggregated across the function's return statements.
    pub return_types: Option<Vec<TypeId>>,
    /// Local declarations and visibility.
    pub locals: LocalScope,
    /// Innermost-last nesting of loops/switches, for jump legality.
    pub flow: Vec<FlowKind>,
    /// Enclosing state list, when compiling inside one.
    pub states: Option<StateList>,
}

impl<'a> CompileContext<'a> {
    pub fn new(
        types: &'a mut TypeStore,
        names: &'a mut NameTable,
        symbols: &'a SymbolTable,
        builtins: &'a BuiltinRegistry,
        sink: &'a mut DiagnosticSink,
        options: CompileOptions,
    ) -> Self {
        Self {
            types,
            names,
            symbols,
            builtins,
            sink,
            options,
            class: None,
            func: None,
            func_flags: FuncFlags::empty(),
            return_types: None,
            locals: LocalScope::new(),
            flow: Vec::new(),
            states: None,
        }
    }

    pub fn lax(&self) -> bool {
        self.options.lax_dialect
    }

    // =========================================================================
    // Diagnostics helpers
    // =========================================================================

    /// Report an unconditional error and produce the failure marker.
    pub fn error(&mut self, span: Span, message: impl Into<String>) -> Failed {
        self.sink.fatal(span, message);
        Failed
    }

    /// Report a recoverable error: downgraded to a warning in the lax
    /// dialect, in which case `None` is returned and the caller coerces.
    pub fn opt_error(&mut self, span: Span, message: impl Into<String>) -> Option<Failed> {
        if self.lax() {
            self.sink.warning(span, message);
            None
        } else {
            self.sink.error(span, message);
            Some(Failed)
        }
    }

    pub fn warn(&mut self, span: Span, message: impl Into<String>) {
        self.sink.warning(span, message);
    }

    /// Human-readable type name for messages.
    pub fn describe(&self, vtype: TypeId) -> String {
        self.types.describe(vtype, self.names)
    }

    // =========================================================================
    // Flow nesting
    // =========================================================================

    pub fn in_loop(&self) -> bool {
        self.flow.iter().any(|f| *f == FlowKind::Loop)
    }

    pub fn in_breakable(&self) -> bool {
        !self.flow.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use brimstone_core::builtin;

    fn with_context(f: impl FnOnce(&mut CompileContext<'_>)) -> DiagnosticSink {
        let mut names = NameTable::new();
        let mut types = TypeStore::new(&mut names);
        let symbols = SymbolTable::new();
        let builtins = BuiltinRegistry::with_defaults();
        let mut sink = DiagnosticSink::new();
        let mut ctx = CompileContext::new(
            &mut types,
            &mut names,
            &symbols,
            &builtins,
            &mut sink,
            CompileOptions::default(),
        );
        f(&mut ctx);
        sink
    }

    #[test]
    fn error_reports_and_marks() {
        let sink = with_context(|ctx| {
            let failed = ctx.error(Span::point(1, 1), "bad operand");
            assert_eq!(failed, Failed);
        });
        assert!(sink.has_errors());
    }

    #[test]
    fn opt_error_downgrades_in_lax() {
        let mut names = NameTable::new();
        let mut types = TypeStore::new(&mut names);
        let symbols = SymbolTable::new();
        let builtins = BuiltinRegistry::with_defaults();
        let mut sink = DiagnosticSink::new();
        let mut ctx = CompileContext::new(
            &mut types,
            &mut names,
            &symbols,
            &builtins,
            &mut sink,
            CompileOptions { lax_dialect: true },
        );
        assert!(ctx.opt_error(Span::point(1, 1), "mismatch").is_none());
        assert!(!sink.has_errors());
        assert_eq!(sink.diagnostics().len(), 1);
    }

    #[test]
    fn flow_nesting_queries() {
        with_context(|ctx| {
            assert!(!ctx.in_breakable());
            ctx.flow.push(FlowKind::Switch);
            assert!(ctx.in_breakable());
            assert!(!ctx.in_loop());
            ctx.flow.push(FlowKind::Loop);
            assert!(ctx.in_loop());
        });
    }

    #[test]
    fn describe_names_types() {
        with_context(|ctx| {
            assert_eq!(ctx.describe(builtin::INT), "int");
        });
    }
}
