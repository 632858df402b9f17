//! Return statements.
//!
//! Each return contributes its value shape to the function's aggregated
//! prototype; later returns cast to the established type, and every pair
//! of returns must agree under the prefix rule. A value that is itself a
//! function call emits as a VM tail call, signalled by the final marker.

use brimstone_core::{builtin, merge_return_types};

use crate::bytecode::OpCode;
use crate::context::CompileContext;
use crate::emit::{FunctionBuilder, RegHandle};
use crate::expr::cast::cast_to;
use crate::expr::{Expr, ExprKind, ResolveResult, calls};

#[derive(Debug)]
pub struct ReturnStmt {
    pub value: Option<Box<Expr>>,
}

impl ReturnStmt {
    pub fn new(value: Option<Box<Expr>>) -> Box<Self> {
        Box::new(Self { value })
    }
}

pub(crate) fn resolve_return(mut e: Box<Expr>, ctx: &mut CompileContext<'_>) -> ResolveResult {
    let ExprKind::Return(r) = std::mem::replace(&mut e.kind, ExprKind::Nop) else {
        unreachable!()
    };
    let mut value = match r.value {
        None => None,
        Some(v) => Some(v.resolve(ctx)?),
    };

    let rets = value.as_ref().map(|v| v.return_types()).unwrap_or_default();
    let established = ctx.return_types.clone();
    let merged = match established {
        None => rets,
        Some(established) => {
            // Cast a single value to the previously inferred type.
            if let (Some(&want), 1) = (established.first(), rets.len())
                && rets[0] != want
                && let Some(v) = value.take()
            {
                value = Some(cast_to(v, want, ctx, false)?);
            }
            let rets = value.as_ref().map(|v| v.return_types()).unwrap_or_default();
            match merge_return_types(&established, &rets) {
                Some(merged) => merged,
                None => {
                    return Err(ctx.error(
                        e.span,
                        "return value disagrees with an earlier return statement",
                    ));
                }
            }
        }
    };
    ctx.return_types = Some(merged);

    e.kind = ExprKind::Return(Box::new(ReturnStmt { value }));
    e.vtype = Some(builtin::VOID);
    e.need_result = false;
    Ok(e)
}

pub(crate) fn emit_return(r: &ReturnStmt, build: &mut FunctionBuilder) -> RegHandle {
    let Some(value) = &r.value else {
        build.emit(OpCode::RetVoid, 0, 0, 0);
        return RegHandle::void();
    };

    // A call in return position becomes a tail call; nothing further is
    // emitted for this statement.
    if let ExprKind::VMCall(call) = &value.kind {
        return calls::emit_vm_call(call, true, build);
    }

    let reg = value.emit(build);
    build.emit_imm(
        OpCode::Ret,
        0,
        reg.class.index() as u16,
        reg.operand(),
        i32::from(reg.width.max(1)),
    );
    build.free(&reg);
    RegHandle::void()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::expr::testutil::Fixture;
    use brimstone_core::{FuncDef, FuncFlags, Span, Value};

    fn ret(value: Option<Box<Expr>>) -> Box<Expr> {
        Expr::new(Span::default(), ExprKind::Return(ReturnStmt::new(value)))
    }

    fn konst_int(v: i32) -> Box<Expr> {
        Expr::konst(Span::default(), builtin::INT, Value::Int(v))
    }

    #[test]
    fn first_return_establishes_the_prototype() {
        let mut fixture = Fixture::new();
        let mut ctx = fixture.ctx();
        ret(Some(konst_int(1))).resolve(&mut ctx).unwrap();
        assert_eq!(ctx.return_types, Some(vec![builtin::INT]));
    }

    #[test]
    fn later_return_casts_to_established_type() {
        let mut fixture = Fixture::new();
        let mut ctx = fixture.ctx();
        ret(Some(Expr::konst(Span::default(), builtin::FLOAT, Value::Float(1.5))))
            .resolve(&mut ctx)
            .unwrap();
        let node = ret(Some(konst_int(2))).resolve(&mut ctx).unwrap();
        let ExprKind::Return(r) = &node.kind else {
            panic!("expected a return");
        };
        assert_eq!(
            r.value.as_ref().unwrap().constant_value(),
            Some(&Value::Float(2.0))
        );
        assert_eq!(ctx.return_types, Some(vec![builtin::FLOAT]));
    }

    #[test]
    fn void_and_value_returns_disagree() {
        let mut fixture = Fixture::new();
        let mut ctx = fixture.ctx();
        ret(None).resolve(&mut ctx).unwrap();
        assert!(ret(Some(konst_int(1))).resolve(&mut ctx).is_err());
    }

    #[test]
    fn void_return_emits_ret_void() {
        let mut fixture = Fixture::new();
        let mut ctx = fixture.ctx();
        let node = ret(None).resolve(&mut ctx).unwrap();
        let mut build = FunctionBuilder::new();
        node.emit(&mut build);
        let (chunk, _, _) = build.finish();
        chunk.assert_ops(&[OpCode::RetVoid]);
    }

    #[test]
    fn call_in_return_position_becomes_a_tail_call() {
        let mut fixture = Fixture::new();
        let class = fixture.types.add_class(fixture.names.intern("Actor"), None, vec![]);
        let name = fixture.names.intern("Other");
        let func = fixture.symbols.add_function(FuncDef {
            name,
            owner: Some(class),
            flags: FuncFlags::empty(),
            params: vec![],
            rets: vec![builtin::INT],
        });
        fixture.types.add_class_method(class, func);

        let call = Expr::new(
            Span::default(),
            ExprKind::FunctionCall(Box::new(calls::FunctionCall {
                name,
                rng: None,
                args: vec![],
            })),
        );
        let mut ctx = fixture.ctx();
        ctx.class = Some(class);
        let node = ret(Some(call)).resolve(&mut ctx).unwrap();

        let mut build = FunctionBuilder::new();
        let reg = node.emit(&mut build);
        assert!(reg.is_final());
        let (chunk, _, _) = build.finish();
        chunk.assert_ops(&[OpCode::Param, OpCode::Tail]);
    }
}
