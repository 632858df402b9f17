//! Statement and control-flow nodes.
//!
//! Statements are nodes like any other; their `emit` returns a void
//! handle. Sequences resolve every child before failing so one pass can
//! report several diagnostics; loops and switches own the backpatch
//! bookkeeping for the break/continue sites reached inside them.

mod block;
mod do_while_stmt;
mod for_stmt;
mod if_stmt;
mod jump_stmt;
mod return_stmt;
mod switch_stmt;
mod var_decl;
mod while_stmt;

pub use block::Compound;
pub use for_stmt::ForStmt;
pub use if_stmt::IfStmt;
pub use jump_stmt::JumpKind;
pub use return_stmt::ReturnStmt;
pub use switch_stmt::{CaseLabel, SwitchStmt};
pub use var_decl::LocalVarDecl;
pub use while_stmt::LoopStmt;

pub(crate) use block::{emit_compound, emit_sequence, resolve_compound, resolve_sequence};
pub(crate) use do_while_stmt::{emit_do_while, resolve_do_while};
pub(crate) use for_stmt::{emit_for, resolve_for};
pub(crate) use if_stmt::{emit_if, resolve_if};
pub(crate) use jump_stmt::{emit_jump, resolve_jump};
pub(crate) use return_stmt::{emit_return, resolve_return};
pub(crate) use switch_stmt::{emit_switch, resolve_case_label, resolve_switch};
pub(crate) use var_decl::{emit_local_var_decl, resolve_local_var_decl};
pub(crate) use while_stmt::{emit_while, resolve_while};
