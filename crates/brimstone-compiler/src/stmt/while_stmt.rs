//! While loops.
//!
//! A constant-false condition eliminates the loop entirely; a
//! constant-true condition drops the per-iteration test. Break sites
//! patch to the exit, continue sites to the re-test.

use brimstone_core::builtin;

use crate::bytecode::OpCode;
use crate::context::{CompileContext, FlowKind};
use crate::emit::{FunctionBuilder, RegHandle};
use crate::expr::cast::cast_to_bool;
use crate::expr::{Expr, ExprKind, Failed, ResolveResult};

/// Shared payload of while and do-while loops.
#[derive(Debug)]
pub struct LoopStmt {
    pub cond: Box<Expr>,
    pub body: Option<Box<Expr>>,
}

impl LoopStmt {
    pub fn new(cond: Box<Expr>, body: Option<Box<Expr>>) -> Box<Self> {
        Box::new(Self { cond, body })
    }
}

/// Resolve a loop body inside a loop flow frame.
pub(crate) fn resolve_loop_body(
    body: Option<Box<Expr>>,
    ctx: &mut CompileContext<'_>,
) -> Result<Option<Box<Expr>>, Failed> {
    match body {
        None => Ok(None),
        Some(mut node) => {
            node.need_result = false;
            ctx.flow.push(FlowKind::Loop);
            let result = node.resolve(ctx);
            ctx.flow.pop();
            result.map(Some)
        }
    }
}

pub(crate) fn resolve_while(mut e: Box<Expr>, ctx: &mut CompileContext<'_>) -> ResolveResult {
    let ExprKind::While(c) = std::mem::replace(&mut e.kind, ExprKind::Nop) else {
        unreachable!()
    };
    let LoopStmt { cond, body } = *c;

    let cond = cond.resolve(ctx).and_then(|n| cast_to_bool(n, ctx));
    let body = resolve_loop_body(body, ctx);
    let (cond, body) = (cond?, body?);

    // A never-true condition removes the dead loop.
    if cond.constant_value().is_some_and(|v| !v.as_bool()) {
        return Ok(Expr::nop(e.span));
    }

    e.kind = ExprKind::While(Box::new(LoopStmt { cond, body }));
    e.vtype = Some(builtin::VOID);
    e.need_result = false;
    Ok(e)
}

pub(crate) fn emit_while(w: &LoopStmt, build: &mut FunctionBuilder) -> RegHandle {
    build.enter_loop();
    let retest = build.next_offset();

    // A constant-true condition needs no per-iteration test.
    let exit_jump = if w.cond.is_constant() {
        None
    } else {
        let cond = w.cond.emit(build);
        let cond = build.materialize(cond);
        let label = build.emit_jump(OpCode::JumpIfFalse, cond.num);
        build.free(&cond);
        Some(label)
    };

    if let Some(body) = &w.body {
        let reg = body.emit(build);
        build.free(&reg);
    }
    build.emit_backward_jump(retest);

    let exit = build.next_offset();
    if let Some(label) = exit_jump {
        build.patch_to(label, exit);
    }
    build.exit_loop(exit, retest);
    RegHandle::void()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::expr::testutil::Fixture;
    use crate::stmt::JumpKind;
    use brimstone_core::{Span, Value};

    fn konst_bool(v: bool) -> Box<Expr> {
        Expr::konst(Span::default(), builtin::BOOL, Value::Int(v as i32))
    }

    #[test]
    fn false_condition_removes_the_loop() {
        let mut fixture = Fixture::new();
        let mut ctx = fixture.ctx();
        let node = Expr::new(
            Span::default(),
            ExprKind::While(LoopStmt::new(konst_bool(false), None)),
        )
        .resolve(&mut ctx)
        .unwrap();
        assert!(matches!(node.kind, ExprKind::Nop));
    }

    #[test]
    fn constant_true_loop_has_no_test() {
        let mut fixture = Fixture::new();
        let mut ctx = fixture.ctx();
        let body = Expr::new(Span::default(), ExprKind::Jump(JumpKind::Break));
        let node = Expr::new(
            Span::default(),
            ExprKind::While(LoopStmt::new(konst_bool(true), Some(body))),
        )
        .resolve(&mut ctx)
        .unwrap();

        let mut build = FunctionBuilder::new();
        let reg = node.emit(&mut build);
        assert!(reg.is_void());
        let (chunk, _, _) = build.finish();
        // break jump + backward jump, no conditional test.
        chunk.assert_ops(&[OpCode::Jmp, OpCode::Jmp]);
        // The break targets the instruction after the loop.
        assert_eq!(chunk.get(0).unwrap().imm, 2);
        // The backward jump targets the loop head.
        assert_eq!(chunk.get(1).unwrap().imm, 0);
    }

    #[test]
    fn break_outside_loop_fails_resolution() {
        let mut fixture = Fixture::new();
        let mut ctx = fixture.ctx();
        let node = Expr::new(Span::default(), ExprKind::Jump(JumpKind::Break));
        assert!(node.resolve(&mut ctx).is_err());
    }
}
