//! Unary operators: negation, bitwise/boolean not, increment/decrement,
//! size/alignment queries.

use brimstone_core::{RegClass, TypeId, Value, builtin};

use crate::bytecode::OpCode;
use crate::context::CompileContext;
use crate::emit::{FunctionBuilder, RegHandle};

use super::cast::{Cast1, cast_to_bool, cast_to_int};
use super::{Expr, ExprKind, Failed, ResolveResult, member};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IncDecOp {
    Inc,
    Dec,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SizeAlignOp {
    Size,
    Align,
}

/// Pre/post increment or decrement of an addressable numeric location.
#[derive(Debug)]
pub struct IncDec {
    pub op: IncDecOp,
    pub postfix: bool,
    pub operand: Box<Expr>,
    /// Fast path: the operand is a plain local register.
    pub(crate) local: bool,
    pub(crate) class: RegClass,
    pub(crate) step_op: OpCode,
    pub(crate) mem: Option<(OpCode, OpCode)>,
}

impl IncDec {
    pub fn new(op: IncDecOp, postfix: bool, operand: Box<Expr>) -> Box<Self> {
        Box::new(Self {
            op,
            postfix,
            operand,
            local: false,
            class: RegClass::Int,
            step_op: OpCode::AddI,
            mem: None,
        })
    }
}

/// Compile-time size/alignment query.
#[derive(Debug)]
pub struct SizeAlign {
    pub op: SizeAlignOp,
    pub operand: Box<Expr>,
}

/// Check that a resolved node denotes a writable location and mark it to
/// emit an address. Returns true for the plain-local fast path, where the
/// fixed register is mutated directly instead of going through memory.
pub(crate) fn require_writable(
    operand: &mut Expr,
    ctx: &mut CompileContext<'_>,
) -> Result<bool, Failed> {
    if let ExprKind::LocalRef(l) = &operand.kind {
        if ctx.locals.decl(l.id).constant {
            return Err(ctx.error(operand.span, "expression is read-only"));
        }
        return Ok(true);
    }
    match operand.request_address(ctx) {
        Some(true) => Ok(false),
        Some(false) => Err(ctx.error(operand.span, "expression is read-only")),
        None => Err(ctx.error(operand.span, "expression is not a modifiable value")),
    }
}

// =============================================================================
// Resolution
// =============================================================================

pub(crate) fn resolve_minus(mut e: Box<Expr>, ctx: &mut CompileContext<'_>) -> ResolveResult {
    let ExprKind::MinusSign(mut c) = std::mem::replace(&mut e.kind, ExprKind::Nop) else {
        unreachable!()
    };
    c.operand = c.operand.resolve(ctx)?;
    let t = c.operand.ty();

    if let Some(v) = c.operand.constant_value() {
        let folded = match v {
            Value::Int(i) => Value::Int(i.wrapping_neg()),
            Value::Uint(u) => Value::Uint(u.wrapping_neg()),
            Value::Float(f) => Value::Float(-f),
            _ => {
                let msg = format!("cannot negate {}", ctx.describe(t));
                return Err(ctx.error(e.span, msg));
            }
        };
        return Ok(Expr::konst(e.span, t, folded));
    }

    c.op = if ctx.types.is_integral(t) {
        Some(OpCode::NegI)
    } else if ctx.types.is_float(t) {
        Some(OpCode::NegF)
    } else if t == builtin::VEC2 {
        Some(OpCode::NegV2)
    } else if t == builtin::VEC3 {
        Some(OpCode::NegV3)
    } else {
        let msg = format!("cannot negate {}", ctx.describe(t));
        return Err(ctx.error(e.span, msg));
    };
    e.kind = ExprKind::MinusSign(c);
    e.vtype = Some(t);
    Ok(e)
}

pub(crate) fn resolve_unary_not(mut e: Box<Expr>, ctx: &mut CompileContext<'_>) -> ResolveResult {
    let ExprKind::UnaryNot(mut c) = std::mem::replace(&mut e.kind, ExprKind::Nop) else {
        unreachable!()
    };
    let operand = c.operand.resolve(ctx)?;
    let t = operand.ty();

    // Bitwise not is integer-only; the lax dialect truncates floats.
    let operand = if ctx.types.is_integral(t) {
        operand
    } else if ctx.types.is_float(t) {
        cast_to_int(operand, false, ctx)?
    } else {
        let msg = format!("integer operand expected, got {}", ctx.describe(t));
        return Err(ctx.error(e.span, msg));
    };

    if let Some(v) = operand.constant_value() {
        let folded = match v {
            Value::Uint(u) => Value::Uint(!u),
            v => Value::Int(!v.int_bits().unwrap_or(0)),
        };
        return Ok(Expr::konst(e.span, operand.ty(), folded));
    }

    let vtype = operand.ty();
    c.operand = operand;
    c.op = Some(OpCode::NotI);
    e.kind = ExprKind::UnaryNot(c);
    e.vtype = Some(vtype);
    Ok(e)
}

pub(crate) fn resolve_bool_not(mut e: Box<Expr>, ctx: &mut CompileContext<'_>) -> ResolveResult {
    let ExprKind::BoolNot(mut c) = std::mem::replace(&mut e.kind, ExprKind::Nop) else {
        unreachable!()
    };
    let operand = cast_to_bool(c.operand.resolve(ctx)?, ctx)?;

    if let Some(v) = operand.constant_value() {
        return Ok(Expr::konst(e.span, builtin::BOOL, Value::Int(!v.as_bool() as i32)));
    }

    c.operand = operand;
    c.op = Some(OpCode::XorI);
    e.kind = ExprKind::BoolNot(c);
    e.vtype = Some(builtin::BOOL);
    Ok(e)
}

pub(crate) fn resolve_abs(mut e: Box<Expr>, ctx: &mut CompileContext<'_>) -> ResolveResult {
    let ExprKind::Abs(mut c) = std::mem::replace(&mut e.kind, ExprKind::Nop) else {
        unreachable!()
    };
    let operand = c.operand.resolve(ctx)?;
    let t = operand.ty();

    if !ctx.types.is_numeric(t) {
        let msg = format!("numeric operand expected, got {}", ctx.describe(t));
        return Err(ctx.error(e.span, msg));
    }
    if let Some(v) = operand.constant_value() {
        let folded = match v {
            Value::Int(i) => Value::Int(i.wrapping_abs()),
            Value::Uint(u) => Value::Uint(*u),
            Value::Float(f) => Value::Float(f.abs()),
            _ => unreachable!("numeric constant"),
        };
        return Ok(Expr::konst(e.span, t, folded));
    }
    // Absolute value of an unsigned is the value itself.
    if ctx.types.is_unsigned(t) {
        return Ok(operand);
    }
    if ctx.types.is_float(t) {
        let flop = super::calls::FlopCall { op: crate::bytecode::FlopOp::Abs, operand };
        let mut node = Expr::new(e.span, ExprKind::Flop(Box::new(flop)));
        node.vtype = Some(builtin::FLOAT);
        node.resolved = true;
        return Ok(node);
    }

    c.operand = operand;
    c.op = Some(OpCode::AbsI);
    e.kind = ExprKind::Abs(c);
    e.vtype = Some(builtin::INT);
    Ok(e)
}

pub(crate) fn resolve_inc_dec(mut e: Box<Expr>, ctx: &mut CompileContext<'_>) -> ResolveResult {
    let ExprKind::IncDec(mut d) = std::mem::replace(&mut e.kind, ExprKind::Nop) else {
        unreachable!()
    };
    let mut operand = d.operand.resolve(ctx)?;
    let t = operand.ty();

    if !ctx.types.is_numeric(t) || t == builtin::BOOL {
        let msg = format!("numeric operand expected, got {}", ctx.describe(t));
        return Err(ctx.error(e.span, msg));
    }
    d.local = require_writable(&mut operand, ctx)?;

    d.class = if ctx.types.is_float(t) { RegClass::Float } else { RegClass::Int };
    d.step_op = match (d.op, d.class) {
        (IncDecOp::Inc, RegClass::Float) => OpCode::AddF,
        (IncDecOp::Dec, RegClass::Float) => OpCode::SubF,
        (IncDecOp::Inc, _) => OpCode::AddI,
        (IncDecOp::Dec, _) => OpCode::SubI,
    };
    if !d.local {
        let Some((load, store, _, _)) = member::mem_ops(ctx.types, t) else {
            return Err(ctx.error(e.span, "expression is not a modifiable value"));
        };
        d.mem = Some((load, store));
    }

    d.operand = operand;
    e.kind = ExprKind::IncDec(d);
    e.vtype = Some(t);
    Ok(e)
}

pub(crate) fn resolve_size_align(mut e: Box<Expr>, ctx: &mut CompileContext<'_>) -> ResolveResult {
    let ExprKind::SizeAlign(s) = std::mem::replace(&mut e.kind, ExprKind::Nop) else {
        unreachable!()
    };
    let mut operand = s.operand.resolve(ctx)?;

    // The query needs an addressable operand; it never evaluates it.
    if operand.request_address(ctx).is_none() {
        return Err(ctx.error(e.span, "size query on a non-addressable operand"));
    }

    let size = ctx.types.size_of(operand.ty());
    let value = match s.op {
        SizeAlignOp::Size => size,
        SizeAlignOp::Align => match size {
            0 => 1,
            1 => 1,
            2..=3 => 2,
            4..=7 => 4,
            _ => 8,
        },
    };
    Ok(Expr::konst(e.span, builtin::UINT, Value::Uint(value)))
}

// =============================================================================
// Emission
// =============================================================================

fn emit_unary(c: &Cast1, class: RegClass, build: &mut FunctionBuilder) -> RegHandle {
    let src = c.operand.emit(build);
    let op = c.op.expect("unary op chosen at resolve");
    let width = src.width.max(1);
    let src = build.materialize(src);
    let dst = build.acquire(class, width);
    build.emit(op, dst.num, src.num, 0);
    build.free(&src);
    dst
}

pub(crate) fn emit_minus(c: &Cast1, build: &mut FunctionBuilder) -> RegHandle {
    let class = match c.op {
        Some(OpCode::NegI) => RegClass::Int,
        _ => RegClass::Float,
    };
    emit_unary(c, class, build)
}

pub(crate) fn emit_unary_not(c: &Cast1, build: &mut FunctionBuilder) -> RegHandle {
    emit_unary(c, RegClass::Int, build)
}

pub(crate) fn emit_abs(c: &Cast1, build: &mut FunctionBuilder) -> RegHandle {
    emit_unary(c, RegClass::Int, build)
}

pub(crate) fn emit_bool_not(c: &Cast1, build: &mut FunctionBuilder) -> RegHandle {
    let src = c.operand.emit(build);
    let dst = build.acquire(RegClass::Int, 1);
    let one = build.konst_int(1);
    build.emit(OpCode::XorI, dst.num, src.operand(), one.operand());
    build.free(&src);
    dst
}

pub(crate) fn emit_inc_dec(
    d: &IncDec,
    need_result: bool,
    build: &mut FunctionBuilder,
) -> RegHandle {
    let step = match d.class {
        RegClass::Float => build.konst_float(1.0),
        _ => build.konst_int(1),
    };

    if d.local {
        let reg = d.operand.emit(build);
        if d.postfix && need_result {
            // Preserve the pre-mutation value.
            let old = build.acquire(d.class, 1);
            build.move_to(&old, &reg);
            build.emit(d.step_op, reg.num, reg.num, step.operand());
            return old;
        }
        build.emit(d.step_op, reg.num, reg.num, step.operand());
        return reg;
    }

    let (load, store) = d.mem.expect("memory ops chosen at resolve");
    let addr = d.operand.emit(build);
    let addr = build.materialize(addr);
    let value = build.acquire(d.class, 1);
    build.emit(load, value.num, addr.num, 0);

    let result = if d.postfix && need_result {
        let old = build.acquire(d.class, 1);
        build.move_to(&old, &value);
        build.emit(d.step_op, value.num, value.num, step.operand());
        build.emit(store, value.num, addr.num, 0);
        build.free(&value);
        old
    } else {
        build.emit(d.step_op, value.num, value.num, step.operand());
        build.emit(store, value.num, addr.num, 0);
        value
    };
    build.free(&addr);
    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::expr::testutil::Fixture;
    use brimstone_core::Span;

    fn konst_int(v: i32) -> Box<Expr> {
        Expr::konst(Span::default(), builtin::INT, Value::Int(v))
    }

    fn konst_uint(v: u32) -> Box<Expr> {
        Expr::konst(Span::default(), builtin::UINT, Value::Uint(v))
    }

    fn konst_float(v: f64) -> Box<Expr> {
        Expr::konst(Span::default(), builtin::FLOAT, Value::Float(v))
    }

    #[test]
    fn minus_folds_with_wraparound() {
        let mut fixture = Fixture::new();
        let mut ctx = fixture.ctx();
        let node = Expr::new(
            Span::default(),
            ExprKind::MinusSign(Cast1::new(konst_int(i32::MIN))),
        )
        .resolve(&mut ctx)
        .unwrap();
        assert_eq!(node.constant_value(), Some(&Value::Int(i32::MIN)));

        let node = Expr::new(Span::default(), ExprKind::MinusSign(Cast1::new(konst_float(2.5))))
            .resolve(&mut ctx)
            .unwrap();
        assert_eq!(node.constant_value(), Some(&Value::Float(-2.5)));
    }

    #[test]
    fn bitwise_not_requires_integer() {
        let mut fixture = Fixture::new();
        let mut ctx = fixture.ctx();
        let node = Expr::new(Span::default(), ExprKind::UnaryNot(Cast1::new(konst_uint(1))))
            .resolve(&mut ctx)
            .unwrap();
        assert_eq!(node.constant_value(), Some(&Value::Uint(!1u32)));

        // Constant float folds through the inserted int cast even in the
        // strict dialect (the cast itself is implicit but constant).
        let err = Expr::new(
            Span::default(),
            ExprKind::UnaryNot(Cast1::new(Expr::konst(
                Span::default(),
                builtin::STRING,
                Value::Str("x".into()),
            ))),
        )
        .resolve(&mut ctx);
        assert!(err.is_err());
    }

    #[test]
    fn bool_not_folds() {
        let mut fixture = Fixture::new();
        let mut ctx = fixture.ctx();
        let node = Expr::new(Span::default(), ExprKind::BoolNot(Cast1::new(konst_int(0))))
            .resolve(&mut ctx)
            .unwrap();
        assert_eq!(node.ty(), builtin::BOOL);
        assert_eq!(node.constant_value(), Some(&Value::Int(1)));
    }

    #[test]
    fn inc_dec_rejects_non_addressable() {
        let mut fixture = Fixture::new();
        let mut ctx = fixture.ctx();
        let node = Expr::new(
            Span::default(),
            ExprKind::IncDec(IncDec::new(IncDecOp::Inc, false, konst_int(3))),
        )
        .resolve(&mut ctx);
        assert!(node.is_err());
        assert!(fixture.sink.has_errors());
    }

    #[test]
    fn size_query_rejects_non_addressable() {
        let mut fixture = Fixture::new();
        let mut ctx = fixture.ctx();
        let node = Expr::new(
            Span::default(),
            ExprKind::SizeAlign(Box::new(SizeAlign { op: SizeAlignOp::Size, operand: konst_int(1) })),
        )
        .resolve(&mut ctx);
        assert!(node.is_err());
    }
}
