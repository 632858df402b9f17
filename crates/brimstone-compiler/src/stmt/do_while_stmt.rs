//! Do-while loops.
//!
//! The body always runs once; the test sits at the bottom. A
//! constant-false condition keeps the body but drops the backward jump;
//! continue sites patch to the test position either way.

use brimstone_core::builtin;

use crate::bytecode::OpCode;
use crate::context::CompileContext;
use crate::emit::{FunctionBuilder, RegHandle};
use crate::expr::cast::cast_to_bool;
use crate::expr::{Expr, ExprKind, ResolveResult};

use super::while_stmt::{LoopStmt, resolve_loop_body};

pub(crate) fn resolve_do_while(mut e: Box<Expr>, ctx: &mut CompileContext<'_>) -> ResolveResult {
    let ExprKind::DoWhile(c) = std::mem::replace(&mut e.kind, ExprKind::Nop) else {
        unreachable!()
    };
    let LoopStmt { cond, body } = *c;

    let body = resolve_loop_body(body, ctx);
    let cond = cond.resolve(ctx).and_then(|n| cast_to_bool(n, ctx));
    let (cond, body) = (cond?, body?);

    e.kind = ExprKind::DoWhile(Box::new(LoopStmt { cond, body }));
    e.vtype = Some(builtin::VOID);
    e.need_result = false;
    Ok(e)
}

pub(crate) fn emit_do_while(w: &LoopStmt, build: &mut FunctionBuilder) -> RegHandle {
    build.enter_loop();
    let top = build.next_offset();

    if let Some(body) = &w.body {
        let reg = body.emit(build);
        build.free(&reg);
    }

    let retest = build.next_offset();
    match w.cond.constant_value() {
        Some(v) if v.as_bool() => build.emit_backward_jump(top),
        Some(_) => {}
        None => {
            let cond = w.cond.emit(build);
            let cond = build.materialize(cond);
            build.emit_imm(OpCode::JumpIfTrue, cond.num, 0, 0, top as i32);
            build.free(&cond);
        }
    }

    let exit = build.next_offset();
    build.exit_loop(exit, retest);
    RegHandle::void()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::expr::cast::Cast1;
    use crate::expr::testutil::Fixture;
    use brimstone_core::{Span, Value};

    fn runtime_bool() -> Box<Expr> {
        let mut node = Expr::new(
            Span::default(),
            ExprKind::BoolCast(Box::new(Cast1 {
                operand: Expr::konst(Span::default(), builtin::INT, Value::Int(1)),
                op: Some(OpCode::BoolI),
            })),
        );
        node.vtype = Some(builtin::BOOL);
        node.resolved = true;
        node
    }

    fn marker() -> Box<Expr> {
        Expr::new(
            Span::default(),
            ExprKind::Sequence(vec![Expr::konst(Span::default(), builtin::INT, Value::Int(1))]),
        )
    }

    #[test]
    fn body_precedes_test() {
        let mut fixture = Fixture::new();
        let mut ctx = fixture.ctx();
        let node = Expr::new(
            Span::default(),
            ExprKind::DoWhile(LoopStmt::new(runtime_bool(), Some(marker()))),
        )
        .resolve(&mut ctx)
        .unwrap();

        let mut build = FunctionBuilder::new();
        let reg = node.emit(&mut build);
        assert!(reg.is_void());
        let (chunk, _, _) = build.finish();
        chunk.assert_ops(&[OpCode::BoolI, OpCode::JumpIfTrue]);
        // The bottom test jumps back to the top.
        assert_eq!(chunk.get(1).unwrap().imm, 0);
    }

    #[test]
    fn constant_false_condition_runs_body_once() {
        let mut fixture = Fixture::new();
        let mut ctx = fixture.ctx();
        let node = Expr::new(
            Span::default(),
            ExprKind::DoWhile(LoopStmt::new(
                Expr::konst(Span::default(), builtin::BOOL, Value::Int(0)),
                Some(marker()),
            )),
        )
        .resolve(&mut ctx)
        .unwrap();

        let mut build = FunctionBuilder::new();
        node.emit(&mut build);
        let (chunk, _, _) = build.finish();
        // No test, no backward jump.
        assert!(chunk.is_empty());
    }
}
