//! Break and continue.
//!
//! Legality is checked during resolution against the context's loop/switch
//! nesting; emission registers a forward jump on the innermost matching
//! flow frame, backpatched when the owning construct closes.

use brimstone_core::builtin;

use crate::context::CompileContext;
use crate::emit::{FunctionBuilder, RegHandle};
use crate::expr::{Expr, ExprKind, ResolveResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JumpKind {
    Break,
    Continue,
}

pub(crate) fn resolve_jump(mut e: Box<Expr>, ctx: &mut CompileContext<'_>) -> ResolveResult {
    let ExprKind::Jump(kind) = &e.kind else {
        unreachable!()
    };
    let kind = *kind;
    match kind {
        JumpKind::Break if !ctx.in_breakable() => {
            Err(ctx.error(e.span, "break statement not inside a loop or switch"))
        }
        JumpKind::Continue if !ctx.in_loop() => {
            Err(ctx.error(e.span, "continue statement not inside a loop"))
        }
        _ => {
            e.vtype = Some(builtin::VOID);
            e.need_result = false;
            Ok(e)
        }
    }
}

pub(crate) fn emit_jump(kind: JumpKind, build: &mut FunctionBuilder) -> RegHandle {
    let result = match kind {
        JumpKind::Break => build.emit_break(),
        JumpKind::Continue => build.emit_continue(),
    };
    debug_assert!(result.is_ok(), "jump validated during resolution");
    RegHandle::void()
}
