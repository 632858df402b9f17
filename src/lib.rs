//! Brimstone: a small game-scripting language compiler core.
//!
//! This facade re-exports the public surface of the workspace crates:
//!
//! - [`brimstone_core`]: spans, names, types, values, symbols, diagnostics
//! - [`brimstone_compiler`]: the typed-AST resolver and register-bytecode
//!   emitter

pub use brimstone_compiler as compiler;
pub use brimstone_core as core;

pub mod prelude {
    pub use brimstone_compiler::{
        BuiltinRegistry, CompileContext, CompileOptions, CompiledFunction, Expr, ExprKind,
        FunctionBuilder, compile_function,
    };
    pub use brimstone_core::{
        DiagnosticSink, NameTable, Severity, Span, SymbolTable, TypeStore, Value, builtin,
    };
}
