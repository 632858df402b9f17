//! If/else statements.
//!
//! A constant condition folds to the chosen branch (or a no-op when that
//! branch is absent). Emission tests the condition, jumps over the true
//! branch on false, and skips the end-jump when the true branch cannot
//! fall through.

use brimstone_core::builtin;

use crate::bytecode::OpCode;
use crate::context::CompileContext;
use crate::emit::{FunctionBuilder, RegHandle};
use crate::expr::cast::{Cast1, cast_to_bool};
use crate::expr::{Expr, ExprKind, ResolveResult};

#[derive(Debug)]
pub struct IfStmt {
    pub cond: Box<Expr>,
    pub when_true: Option<Box<Expr>>,
    pub when_false: Option<Box<Expr>>,
}

impl IfStmt {
    pub fn new(cond: Box<Expr>, when_true: Option<Box<Expr>>, when_false: Option<Box<Expr>>) -> Box<Self> {
        Box::new(Self { cond, when_true, when_false })
    }
}

pub(crate) fn resolve_if(mut e: Box<Expr>, ctx: &mut CompileContext<'_>) -> ResolveResult {
    let ExprKind::If(c) = std::mem::replace(&mut e.kind, ExprKind::Nop) else {
        unreachable!()
    };
    let IfStmt { cond, when_true, when_false } = *c;

    let cond = cond.resolve(ctx).and_then(|n| cast_to_bool(n, ctx));
    let when_true = resolve_branch(when_true, ctx);
    let when_false = resolve_branch(when_false, ctx);
    let (cond, mut when_true, mut when_false) = (cond?, when_true?, when_false?);

    // A constant condition keeps only the chosen branch.
    if let Some(v) = cond.constant_value() {
        let chosen = if v.as_bool() { when_true } else { when_false };
        return Ok(chosen.unwrap_or_else(|| Expr::nop(e.span)));
    }

    // Normalize an else-only statement into a negated then-only one.
    let cond = if when_true.is_none() && when_false.is_some() {
        when_true = when_false.take();
        Expr::new(cond.span, ExprKind::BoolNot(Cast1::new(cond))).resolve(ctx)?
    } else {
        cond
    };

    e.kind = ExprKind::If(IfStmt::new(cond, when_true, when_false));
    e.vtype = Some(builtin::VOID);
    e.need_result = false;
    Ok(e)
}

fn resolve_branch(
    branch: Option<Box<Expr>>,
    ctx: &mut CompileContext<'_>,
) -> Result<Option<Box<Expr>>, crate::expr::Failed> {
    match branch {
        None => Ok(None),
        Some(mut node) => {
            node.need_result = false;
            node.resolve(ctx).map(Some)
        }
    }
}

pub(crate) fn emit_if(i: &IfStmt, build: &mut FunctionBuilder) -> RegHandle {
    let cond = i.cond.emit(build);
    let cond = build.materialize(cond);

    let Some(when_true) = &i.when_true else {
        // Both branches folded away; the condition runs for its effects.
        build.free(&cond);
        return RegHandle::void();
    };

    let over_true = build.emit_jump(OpCode::JumpIfFalse, cond.num);
    build.free(&cond);

    let reg = when_true.emit(build);
    build.free(&reg);

    match &i.when_false {
        Some(when_false) => {
            // No jump over the else branch when the true branch returns
            // on every path.
            let over_false = if when_true.ends_with_return() {
                None
            } else {
                Some(build.emit_jump(OpCode::Jmp, 0))
            };
            build.patch(over_true);
            let reg = when_false.emit(build);
            build.free(&reg);
            if let Some(label) = over_false {
                build.patch(label);
            }
        }
        None => build.patch(over_true),
    }
    RegHandle::void()
}
