//! Brimstone compiler core.
//!
//! Lowers a typed AST for the scripting language into register-based
//! bytecode for the stack-free VM. Each node is taken through two passes
//! over the same tree: *resolution* (type checking, implicit conversions,
//! constant folding, node rewriting) and *emission* (register allocation,
//! instruction emission, jump backpatching).
//!
//! ## Modules
//!
//! - [`bytecode`]: opcodes, instructions, per-kind constant tables
//! - [`emit`]: function builder, register pools, flow scopes
//! - [`conversion`]: numeric promotion and pointer compatibility rules
//! - [`context`]: per-function compilation context
//! - [`scope`]: block-scoped local variable tracking
//! - [`builtins`]: registry of pre-registered native call targets
//! - [`expr`]: expression node family (resolve + emit)
//! - [`stmt`]: statement/control-flow node family
//! - [`function_compiler`]: per-function driver and produced summary

pub mod builtins;
pub mod bytecode;
pub mod context;
pub mod conversion;
pub mod emit;
pub mod expr;
pub mod function_compiler;
pub mod scope;
pub mod stmt;

pub use builtins::{BuiltinId, BuiltinRegistry};
pub use context::{CompileContext, CompileOptions};
pub use emit::{FlowError, FunctionBuilder, JumpLabel, RegHandle, RegKind};
pub use expr::{Expr, ExprKind, Failed, ResolveResult};
pub use function_compiler::{CompiledFunction, compile_function};
pub use scope::{LocalDecl, LocalId, LocalScope};

// Re-export the failure type from core for convenience.
pub use brimstone_core::CompileError;
