//! Assignment expressions.
//!
//! The target must be a writable location; the value casts implicitly to
//! the target's type. Plain locals take a register-to-register fast path,
//! everything else goes through an address and a store.

use brimstone_core::{RegClass, builtin};

use crate::bytecode::OpCode;
use crate::context::CompileContext;
use crate::emit::{FunctionBuilder, RegHandle};

use super::cast::cast_to;
use super::unary::require_writable;
use super::{Expr, ExprKind, ResolveResult, member};

#[derive(Debug)]
pub struct Assign {
    pub target: Box<Expr>,
    pub value: Box<Expr>,
    pub(crate) local_fast: bool,
    pub(crate) store: Option<(OpCode, RegClass, u8)>,
}

impl Assign {
    pub fn new(target: Box<Expr>, value: Box<Expr>) -> Box<Self> {
        Box::new(Self { target, value, local_fast: false, store: None })
    }
}

pub(crate) fn resolve_assign(mut e: Box<Expr>, ctx: &mut CompileContext<'_>) -> ResolveResult {
    let ExprKind::Assign(mut a) = std::mem::replace(&mut e.kind, ExprKind::Nop) else {
        unreachable!()
    };
    let target = a.target.resolve(ctx);
    let value = a.value.resolve(ctx);
    let (mut target, value) = (target?, value?);

    a.local_fast = require_writable(&mut target, ctx)?;
    let vtype = target.ty();
    let value = cast_to(value, vtype, ctx, false)?;

    if !a.local_fast {
        let Some((_, store, class, width)) = member::mem_ops(ctx.types, vtype) else {
            return Err(ctx.error(e.span, "expression is not a modifiable value"));
        };
        a.store = Some((store, class, width));
    }

    a.target = target;
    a.value = value;
    e.kind = ExprKind::Assign(a);
    e.vtype = Some(vtype);
    Ok(e)
}

pub(crate) fn emit_assign(a: &Assign, need_result: bool, build: &mut FunctionBuilder) -> RegHandle {
    if a.local_fast {
        let reg = a.target.emit(build);
        let value = a.value.emit(build);
        build.move_to(&reg, &value);
        build.free(&value);
        return reg;
    }

    let (store, _, _) = a.store.expect("store ops chosen at resolve");
    let addr = a.target.emit(build);
    let value = a.value.emit(build);
    let value = build.materialize(value);
    build.emit(store, value.num, addr.operand(), 0);
    build.free(&addr);
    if need_result {
        value
    } else {
        build.free(&value);
        RegHandle::void()
    }
}
