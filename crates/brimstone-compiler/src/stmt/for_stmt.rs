//! For loops.
//!
//! Init, condition, and iteration are each independently optional. A
//! constant-false condition leaves only the init part; a missing or
//! constant-true condition loops without a test. Continue sites target
//! the iteration part, not the test.

use brimstone_core::builtin;

use crate::bytecode::OpCode;
use crate::context::CompileContext;
use crate::emit::{FunctionBuilder, RegHandle};
use crate::expr::cast::cast_to_bool;
use crate::expr::{Expr, ExprKind, Failed, ResolveResult};

use super::while_stmt::resolve_loop_body;

#[derive(Debug)]
pub struct ForStmt {
    pub init: Option<Box<Expr>>,
    pub cond: Option<Box<Expr>>,
    pub iter: Option<Box<Expr>>,
    pub body: Option<Box<Expr>>,
}

impl ForStmt {
    pub fn new(
        init: Option<Box<Expr>>,
        cond: Option<Box<Expr>>,
        iter: Option<Box<Expr>>,
        body: Option<Box<Expr>>,
    ) -> Box<Self> {
        Box::new(Self { init, cond, iter, body })
    }
}

fn resolve_part(
    part: Option<Box<Expr>>,
    ctx: &mut CompileContext<'_>,
) -> Result<Option<Box<Expr>>, Failed> {
    match part {
        None => Ok(None),
        Some(mut node) => {
            node.need_result = false;
            node.resolve(ctx).map(Some)
        }
    }
}

pub(crate) fn resolve_for(mut e: Box<Expr>, ctx: &mut CompileContext<'_>) -> ResolveResult {
    let ExprKind::For(c) = std::mem::replace(&mut e.kind, ExprKind::Nop) else {
        unreachable!()
    };
    let ForStmt { init, cond, iter, body } = *c;

    let init = resolve_part(init, ctx);
    let cond = match cond {
        None => Ok(None),
        Some(node) => node
            .resolve(ctx)
            .and_then(|n| cast_to_bool(n, ctx))
            .map(Some),
    };
    let iter = resolve_part(iter, ctx);
    let body = resolve_loop_body(body, ctx);
    let (init, cond, iter, body) = (init?, cond?, iter?, body?);

    // A never-true condition leaves only the init part.
    if let Some(cond) = &cond
        && cond.constant_value().is_some_and(|v| !v.as_bool())
    {
        return Ok(init.unwrap_or_else(|| Expr::nop(e.span)));
    }

    e.kind = ExprKind::For(Box::new(ForStmt { init, cond, iter, body }));
    e.vtype = Some(builtin::VOID);
    e.need_result = false;
    Ok(e)
}

pub(crate) fn emit_for(f: &ForStmt, build: &mut FunctionBuilder) -> RegHandle {
    if let Some(init) = &f.init {
        let reg = init.emit(build);
        build.free(&reg);
    }

    build.enter_loop();
    let test = build.next_offset();
    let exit_jump = match &f.cond {
        Some(cond) if !cond.is_constant() => {
            let reg = cond.emit(build);
            let reg = build.materialize(reg);
            let label = build.emit_jump(OpCode::JumpIfFalse, reg.num);
            build.free(&reg);
            Some(label)
        }
        _ => None,
    };

    if let Some(body) = &f.body {
        let reg = body.emit(build);
        build.free(&reg);
    }

    // Continue lands on the iteration part.
    let continue_target = build.next_offset();
    if let Some(iter) = &f.iter {
        let reg = iter.emit(build);
        build.free(&reg);
    }
    build.emit_backward_jump(test);

    let exit = build.next_offset();
    if let Some(label) = exit_jump {
        build.patch_to(label, exit);
    }
    build.exit_loop(exit, continue_target);
    RegHandle::void()
}
