//! Binary arithmetic, bitwise, shift, and concatenation operators.
//!
//! Operand types promote per the numeric promotion rule; every operator
//! folds when both operands are compile-time constants, with division and
//! modulo by a constant zero divisor a hard resolution error.

use brimstone_core::{RegClass, TypeId, Value, builtin};

use crate::bytecode::OpCode;
use crate::context::CompileContext;
use crate::conversion::numeric_promotion;
use crate::emit::{FunctionBuilder, RegHandle};

use super::cast::{cast_to, cast_to_int, cast_to_string};
use super::{Expr, ExprKind, Failed, ResolveResult, resolve_both};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArithOp {
    Add,
    Sub,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MulDivOp {
    Mul,
    Div,
    Mod,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BitwiseOp {
    And,
    Or,
    Xor,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShiftOp {
    Shl,
    Shr,
}

/// Shared binary payload. The emission opcode is chosen at resolve time;
/// `scale` carries the element size for state-pointer arithmetic.
#[derive(Debug)]
pub struct Binary<Op> {
    pub op: Op,
    pub left: Box<Expr>,
    pub right: Box<Expr>,
    pub(crate) emit_op: Option<OpCode>,
    pub(crate) scale: u32,
}

impl<Op> Binary<Op> {
    pub fn new(op: Op, left: Box<Expr>, right: Box<Expr>) -> Box<Self> {
        Box::new(Self { op, left, right, emit_op: None, scale: 0 })
    }
}

// =============================================================================
// Resolution
// =============================================================================

pub(crate) fn resolve_add_sub(mut e: Box<Expr>, ctx: &mut CompileContext<'_>) -> ResolveResult {
    let ExprKind::AddSub(mut b) = std::mem::replace(&mut e.kind, ExprKind::Nop) else {
        unreachable!()
    };
    let (left, right) = resolve_both(b.left, b.right, ctx)?;
    let (lt, rt) = (left.ty(), right.ty());

    // Raw pointer arithmetic over state tables, scaled by the record size.
    if lt == builtin::STATE_PTR && ctx.types.is_integral(rt) {
        b.left = left;
        b.right = cast_to_int(right, false, ctx)?;
        b.scale = ctx.types.size_of(builtin::STATE);
        e.kind = ExprKind::AddSub(b);
        e.vtype = Some(builtin::STATE_PTR);
        return Ok(e);
    }

    // Vectors: identical types, or a vector3 ± vector2 mix with the z
    // component passed through unchanged.
    if ctx.types.is_vector(lt) && ctx.types.is_vector(rt) {
        let vtype = if lt == rt {
            lt
        } else {
            builtin::VEC3
        };
        b.emit_op = Some(match (b.op, vtype == builtin::VEC3) {
            (ArithOp::Add, false) => OpCode::AddV2,
            (ArithOp::Sub, false) => OpCode::SubV2,
            (ArithOp::Add, true) => OpCode::AddV3,
            (ArithOp::Sub, true) => OpCode::SubV3,
        });
        b.left = left;
        b.right = right;
        e.kind = ExprKind::AddSub(b);
        e.vtype = Some(vtype);
        return Ok(e);
    }

    if !ctx.types.is_numeric(lt) || !ctx.types.is_numeric(rt) {
        let msg = format!(
            "cannot {} {} and {}",
            if b.op == ArithOp::Add { "add" } else { "subtract" },
            ctx.describe(lt),
            ctx.describe(rt)
        );
        return Err(ctx.error(e.span, msg));
    }

    let vtype = numeric_promotion(ctx.types, lt, rt);
    let left = cast_to(left, vtype, ctx, false)?;
    let right = cast_to(right, vtype, ctx, false)?;

    if let (Some(lv), Some(rv)) = (left.constant_value(), right.constant_value()) {
        let folded = fold_add_sub(b.op, lv, rv, vtype);
        return Ok(Expr::konst(e.span, vtype, folded));
    }

    b.emit_op = Some(match (b.op, vtype == builtin::FLOAT) {
        (ArithOp::Add, false) => OpCode::AddI,
        (ArithOp::Sub, false) => OpCode::SubI,
        (ArithOp::Add, true) => OpCode::AddF,
        (ArithOp::Sub, true) => OpCode::SubF,
    });
    b.left = left;
    b.right = right;
    e.kind = ExprKind::AddSub(b);
    e.vtype = Some(vtype);
    Ok(e)
}

fn fold_add_sub(op: ArithOp, l: &Value, r: &Value, vtype: TypeId) -> Value {
    if vtype == builtin::FLOAT {
        let (a, b) = (l.as_float().unwrap_or(0.0), r.as_float().unwrap_or(0.0));
        return Value::Float(if op == ArithOp::Add { a + b } else { a - b });
    }
    let (a, b) = (l.int_bits().unwrap_or(0), r.int_bits().unwrap_or(0));
    let bits = if op == ArithOp::Add { a.wrapping_add(b) } else { a.wrapping_sub(b) };
    if vtype == builtin::UINT { Value::Uint(bits as u32) } else { Value::Int(bits) }
}

pub(crate) fn resolve_mul_div(mut e: Box<Expr>, ctx: &mut CompileContext<'_>) -> ResolveResult {
    let ExprKind::MulDiv(mut b) = std::mem::replace(&mut e.kind, ExprKind::Nop) else {
        unreachable!()
    };
    let b_left = std::mem::replace(&mut b.left, Expr::nop(e.span));
    let b_right = std::mem::replace(&mut b.right, Expr::nop(e.span));
    let (left, right) = resolve_both(b_left, b_right, ctx)?;
    let (lt, rt) = (left.ty(), right.ty());

    // Vector * scalar (either side) and vector / scalar (vector left only).
    if ctx.types.is_vector(lt) || ctx.types.is_vector(rt) {
        return resolve_vector_scale(e.span, b, left, right, ctx);
    }

    if !ctx.types.is_numeric(lt) || !ctx.types.is_numeric(rt) {
        let msg = format!(
            "numeric operands expected, got {} and {}",
            ctx.describe(lt),
            ctx.describe(rt)
        );
        return Err(ctx.error(e.span, msg));
    }

    let vtype = numeric_promotion(ctx.types, lt, rt);
    let left = cast_to(left, vtype, ctx, false)?;
    let right = cast_to(right, vtype, ctx, false)?;

    // A constant zero divisor is a resolution-time error, never a runtime
    // fault.
    if b.op != MulDivOp::Mul
        && right
            .constant_value()
            .is_some_and(|v| v.as_float() == Some(0.0))
    {
        return Err(ctx.error(e.span, "division by zero"));
    }

    if let (Some(lv), Some(rv)) = (left.constant_value(), right.constant_value()) {
        let folded = fold_mul_div(b.op, lv, rv, vtype);
        return Ok(Expr::konst(e.span, vtype, folded));
    }

    let unsigned = vtype == builtin::UINT;
    b.emit_op = Some(match (b.op, vtype == builtin::FLOAT) {
        (MulDivOp::Mul, false) => OpCode::MulI,
        (MulDivOp::Div, false) if unsigned => OpCode::DivU,
        (MulDivOp::Div, false) => OpCode::DivI,
        (MulDivOp::Mod, false) if unsigned => OpCode::ModU,
        (MulDivOp::Mod, false) => OpCode::ModI,
        (MulDivOp::Mul, true) => OpCode::MulF,
        (MulDivOp::Div, true) => OpCode::DivF,
        (MulDivOp::Mod, true) => OpCode::ModF,
    });
    b.left = left;
    b.right = right;
    e.kind = ExprKind::MulDiv(b);
    e.vtype = Some(vtype);
    Ok(e)
}

fn fold_mul_div(op: MulDivOp, l: &Value, r: &Value, vtype: TypeId) -> Value {
    if vtype == builtin::FLOAT {
        let (a, b) = (l.as_float().unwrap_or(0.0), r.as_float().unwrap_or(0.0));
        return Value::Float(match op {
            MulDivOp::Mul => a * b,
            MulDivOp::Div => a / b,
            MulDivOp::Mod => a % b,
        });
    }
    if vtype == builtin::UINT {
        let (a, b) = (
            l.int_bits().unwrap_or(0) as u32,
            r.int_bits().unwrap_or(0) as u32,
        );
        return Value::Uint(match op {
            MulDivOp::Mul => a.wrapping_mul(b),
            MulDivOp::Div => a / b,
            MulDivOp::Mod => a % b,
        });
    }
    let (a, b) = (l.int_bits().unwrap_or(0), r.int_bits().unwrap_or(0));
    Value::Int(match op {
        MulDivOp::Mul => a.wrapping_mul(b),
        MulDivOp::Div => a.wrapping_div(b),
        MulDivOp::Mod => a.wrapping_rem(b),
    })
}

fn resolve_vector_scale(
    span: brimstone_core::Span,
    mut b: Box<Binary<MulDivOp>>,
    left: Box<Expr>,
    right: Box<Expr>,
    ctx: &mut CompileContext<'_>,
) -> ResolveResult {
    let (lt, rt) = (left.ty(), right.ty());

    if ctx.types.is_vector(lt) && ctx.types.is_vector(rt) {
        return Err(ctx.error(span, "vector by vector multiplication is not defined"));
    }
    if b.op == MulDivOp::Mod {
        return Err(ctx.error(span, "modulo is not defined on vectors"));
    }
    // Division only with the vector on the left.
    if b.op == MulDivOp::Div && !ctx.types.is_vector(lt) {
        return Err(ctx.error(span, "cannot divide by a vector"));
    }

    // Normalize to vector-left, scalar-right.
    let (vec, scalar) = if ctx.types.is_vector(lt) { (left, right) } else { (right, left) };
    let vtype = vec.ty();
    let scalar = cast_to(scalar, builtin::FLOAT, ctx, false)?;

    // A constant zero divisor is just as fatal for vectors.
    if b.op == MulDivOp::Div
        && scalar
            .constant_value()
            .is_some_and(|v| v.as_float() == Some(0.0))
    {
        return Err(ctx.error(span, "division by zero"));
    }

    b.emit_op = Some(match (b.op, vtype == builtin::VEC3) {
        (MulDivOp::Div, false) => OpCode::DivV2,
        (MulDivOp::Div, true) => OpCode::DivV3,
        (_, false) => OpCode::ScaleV2,
        (_, true) => OpCode::ScaleV3,
    });
    b.left = vec;
    b.right = scalar;
    let mut e = Expr::new(span, ExprKind::MulDiv(b));
    e.vtype = Some(vtype);
    e.resolved = true;
    Ok(e)
}

pub(crate) fn resolve_pow(mut e: Box<Expr>, ctx: &mut CompileContext<'_>) -> ResolveResult {
    let ExprKind::Pow(mut b) = std::mem::replace(&mut e.kind, ExprKind::Nop) else {
        unreachable!()
    };
    let (left, right) = resolve_both(b.left, b.right, ctx)?;
    let left = cast_to(left, builtin::FLOAT, ctx, false)?;
    let right = cast_to(right, builtin::FLOAT, ctx, false)?;

    if let (Some(Value::Float(a)), Some(Value::Float(x))) =
        (left.constant_value(), right.constant_value())
    {
        return Ok(Expr::konst(e.span, builtin::FLOAT, Value::Float(a.powf(*x))));
    }

    b.left = left;
    b.right = right;
    b.emit_op = Some(OpCode::PowF);
    e.kind = ExprKind::Pow(b);
    e.vtype = Some(builtin::FLOAT);
    Ok(e)
}

pub(crate) fn resolve_bitwise(mut e: Box<Expr>, ctx: &mut CompileContext<'_>) -> ResolveResult {
    let ExprKind::Bitwise(mut b) = std::mem::replace(&mut e.kind, ExprKind::Nop) else {
        unreachable!()
    };
    let (left, right) = resolve_both(b.left, b.right, ctx)?;

    // Integer-only context: floats are rejected, or truncated with a
    // diagnostic in the lax dialect.
    let left = require_integer(left, ctx)?;
    let right = require_integer(right, ctx)?;

    let vtype = if left.ty() == builtin::UINT && right.ty() == builtin::UINT {
        builtin::UINT
    } else {
        builtin::INT
    };

    if let (Some(lv), Some(rv)) = (left.constant_value(), right.constant_value()) {
        let (a, x) = (lv.int_bits().unwrap_or(0), rv.int_bits().unwrap_or(0));
        let bits = match b.op {
            BitwiseOp::And => a & x,
            BitwiseOp::Or => a | x,
            BitwiseOp::Xor => a ^ x,
        };
        let folded = if vtype == builtin::UINT { Value::Uint(bits as u32) } else { Value::Int(bits) };
        return Ok(Expr::konst(e.span, vtype, folded));
    }

    b.emit_op = Some(match b.op {
        BitwiseOp::And => OpCode::AndI,
        BitwiseOp::Or => OpCode::OrI,
        BitwiseOp::Xor => OpCode::XorI,
    });
    b.left = left;
    b.right = right;
    e.kind = ExprKind::Bitwise(b);
    e.vtype = Some(vtype);
    Ok(e)
}

fn require_integer(operand: Box<Expr>, ctx: &mut CompileContext<'_>) -> ResolveResult {
    let t = operand.ty();
    if ctx.types.is_integral(t) {
        Ok(operand)
    } else if ctx.types.is_float(t) {
        cast_to_int(operand, false, ctx)
    } else {
        let msg = format!("integer operand expected, got {}", ctx.describe(t));
        Err(ctx.error(operand.span, msg))
    }
}

pub(crate) fn resolve_shift(mut e: Box<Expr>, ctx: &mut CompileContext<'_>) -> ResolveResult {
    let ExprKind::Shift(mut b) = std::mem::replace(&mut e.kind, ExprKind::Nop) else {
        unreachable!()
    };
    let (left, right) = resolve_both(b.left, b.right, ctx)?;
    let left = require_integer(left, ctx)?;
    let right = require_integer(right, ctx)?;

    let vtype = if left.ty() == builtin::UINT { builtin::UINT } else { builtin::INT };
    let unsigned = vtype == builtin::UINT;

    if let (Some(lv), Some(rv)) = (left.constant_value(), right.constant_value()) {
        let amount = (rv.int_bits().unwrap_or(0) as u32) & 31;
        let bits = lv.int_bits().unwrap_or(0);
        let folded = match (b.op, unsigned) {
            (ShiftOp::Shl, true) => Value::Uint((bits as u32) << amount),
            (ShiftOp::Shl, false) => Value::Int(bits.wrapping_shl(amount)),
            (ShiftOp::Shr, true) => Value::Uint((bits as u32) >> amount),
            (ShiftOp::Shr, false) => Value::Int(bits >> amount),
        };
        return Ok(Expr::konst(e.span, vtype, folded));
    }

    b.emit_op = Some(match (b.op, unsigned) {
        (ShiftOp::Shl, _) => OpCode::ShlI,
        (ShiftOp::Shr, true) => OpCode::ShrU,
        (ShiftOp::Shr, false) => OpCode::ShrI,
    });
    b.left = left;
    b.right = right;
    e.kind = ExprKind::Shift(b);
    e.vtype = Some(vtype);
    Ok(e)
}

pub(crate) fn resolve_concat(mut e: Box<Expr>, ctx: &mut CompileContext<'_>) -> ResolveResult {
    let ExprKind::Concat(mut b) = std::mem::replace(&mut e.kind, ExprKind::Nop) else {
        unreachable!()
    };
    let (left, right) = resolve_both(b.left, b.right, ctx)?;

    // Both operands must occupy a register.
    for side in [&left, &right] {
        if ctx.types.reg_class(side.ty()).is_none() {
            let msg = format!("cannot concatenate {}", ctx.describe(side.ty()));
            return Err(ctx.error(side.span, msg));
        }
    }

    // Constant text on both sides folds immediately.
    let both_text = [&left, &right].iter().all(|side| {
        matches!(
            side.constant_value(),
            Some(Value::Str(_) | Value::Name(_))
        )
    });
    if both_text {
        let mut text = left
            .constant_value()
            .map(|v| v.to_text(ctx.names))
            .unwrap_or_default();
        text.push_str(
            &right
                .constant_value()
                .map(|v| v.to_text(ctx.names))
                .unwrap_or_default(),
        );
        return Ok(Expr::konst(e.span, builtin::STRING, Value::Str(text)));
    }

    // Each side converts through its type-specific cast-to-string.
    b.left = cast_to_string(left, ctx)?;
    b.right = cast_to_string(right, ctx)?;
    b.emit_op = Some(OpCode::ConcatS);
    e.kind = ExprKind::Concat(b);
    e.vtype = Some(builtin::STRING);
    Ok(e)
}

// =============================================================================
// Emission
// =============================================================================

fn emit_simple<Op>(
    b: &Binary<Op>,
    class: RegClass,
    width: u8,
    build: &mut FunctionBuilder,
) -> RegHandle {
    let op = b.emit_op.expect("emission op chosen at resolve");
    let l = b.left.emit(build);
    let r = b.right.emit(build);
    let dst = build.acquire(class, width);
    build.emit(op, dst.num, l.operand(), r.operand());
    build.free(&l);
    build.free(&r);
    dst
}

pub(crate) fn emit_add_sub(b: &Binary<ArithOp>, build: &mut FunctionBuilder) -> RegHandle {
    // State-pointer plus integer, scaled by the record size.
    if b.scale > 0 {
        let base = b.left.emit(build);
        let index = b.right.emit(build);
        let scaled = build.acquire(RegClass::Int, 1);
        let scale = build.konst_int(b.scale as i32);
        build.emit(OpCode::MulI, scaled.num, index.operand(), scale.operand());
        if b.op == ArithOp::Sub {
            build.emit(OpCode::NegI, scaled.num, scaled.num, 0);
        }
        let base = build.materialize(base);
        let dst = build.acquire(RegClass::Address, 1);
        build.emit(OpCode::AddrOffset, dst.num, base.num, scaled.num);
        build.free(&index);
        build.free(&scaled);
        build.free(&base);
        return dst;
    }

    let (lw, rw) = (b.left.ty_width(), b.right.ty_width());
    if lw > 1 || rw > 1 {
        return emit_vector_add_sub(b, build);
    }

    let class = match b.emit_op {
        Some(OpCode::AddF | OpCode::SubF) => RegClass::Float,
        _ => RegClass::Int,
    };
    emit_simple(b, class, 1, build)
}

/// Vector add/sub, including the vector3 ± vector2 mix where the z
/// component passes through (negated for vec2 - vec3).
fn emit_vector_add_sub(b: &Binary<ArithOp>, build: &mut FunctionBuilder) -> RegHandle {
    let (lw, rw) = (b.left.ty_width(), b.right.ty_width());
    let width = lw.max(rw);
    let l = b.left.emit(build);
    let r = b.right.emit(build);
    let dst = build.acquire(RegClass::Float, width);

    if lw == rw {
        let op = b.emit_op.expect("emission op chosen at resolve");
        build.emit(op, dst.num, l.num, r.num);
    } else {
        let narrow_op = if b.op == ArithOp::Add { OpCode::AddV2 } else { OpCode::SubV2 };
        build.emit(narrow_op, dst.num, l.num, r.num);
        if lw == 3 {
            build.emit(OpCode::MoveF, dst.num + 2, l.num + 2, 0);
        } else if b.op == ArithOp::Add {
            build.emit(OpCode::MoveF, dst.num + 2, r.num + 2, 0);
        } else {
            build.emit(OpCode::NegF, dst.num + 2, r.num + 2, 0);
        }
    }
    build.free(&l);
    build.free(&r);
    dst
}

pub(crate) fn emit_mul_div(b: &Binary<MulDivOp>, build: &mut FunctionBuilder) -> RegHandle {
    match b.emit_op {
        Some(OpCode::ScaleV2 | OpCode::DivV2) => emit_vector_scale(b, 2, build),
        Some(OpCode::ScaleV3 | OpCode::DivV3) => emit_vector_scale(b, 3, build),
        Some(OpCode::MulF | OpCode::DivF | OpCode::ModF) => {
            emit_simple(b, RegClass::Float, 1, build)
        }
        _ => emit_simple(b, RegClass::Int, 1, build),
    }
}

fn emit_vector_scale(
    b: &Binary<MulDivOp>,
    width: u8,
    build: &mut FunctionBuilder,
) -> RegHandle {
    let op = b.emit_op.expect("emission op chosen at resolve");
    let vec = b.left.emit(build);
    let scalar = b.right.emit(build);
    let dst = build.acquire(RegClass::Float, width);
    build.emit(op, dst.num, vec.num, scalar.operand());
    build.free(&vec);
    build.free(&scalar);
    dst
}

pub(crate) fn emit_pow(b: &Binary<()>, build: &mut FunctionBuilder) -> RegHandle {
    emit_simple(b, RegClass::Float, 1, build)
}

pub(crate) fn emit_bitwise(b: &Binary<BitwiseOp>, build: &mut FunctionBuilder) -> RegHandle {
    emit_simple(b, RegClass::Int, 1, build)
}

pub(crate) fn emit_shift(b: &Binary<ShiftOp>, build: &mut FunctionBuilder) -> RegHandle {
    emit_simple(b, RegClass::Int, 1, build)
}

pub(crate) fn emit_concat(b: &Binary<()>, build: &mut FunctionBuilder) -> RegHandle {
    emit_simple(b, RegClass::String, 1, build)
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

    fn konst_str(s: &str) -> Box<Expr> {
        Expr::konst(Span::default(), builtin::STRING, Value::Str(s.into()))
    }

    fn add(l: Box<Expr>, r: Box<Expr>) -> Box<Expr> {
        Expr::new(Span::default(), ExprKind::AddSub(Binary::new(ArithOp::Add, l, r)))
    }

    fn mul(l: Box<Expr>, r: Box<Expr>) -> Box<Expr> {
        Expr::new(Span::default(), ExprKind::MulDiv(Binary::new(MulDivOp::Mul, l, r)))
    }

    fn div(l: Box<Expr>, r: Box<Expr>) -> Box<Expr> {
        Expr::new(Span::default(), ExprKind::MulDiv(Binary::new(MulDivOp::Div, l, r)))
    }

    #[test]
    fn constant_addition_folds() {
        let mut fixture = Fixture::new();
        let mut ctx = fixture.ctx();
        let node = add(konst_int(2), konst_int(3)).resolve(&mut ctx).unwrap();
        assert_eq!(node.constant_value(), Some(&Value::Int(5)));
        assert_eq!(node.ty(), builtin::INT);
    }

    #[test]
    fn nested_constant_expression_folds_to_one_constant() {
        // 2 + 3 * 4 resolves to the single constant 14.
        let mut fixture = Fixture::new();
        let mut ctx = fixture.ctx();
        let node = add(konst_int(2), mul(konst_int(3), konst_int(4)))
            .resolve(&mut ctx)
            .unwrap();
        assert_eq!(node.constant_value(), Some(&Value::Int(14)));
    }

    #[test]
    fn signed_overflow_wraps() {
        let mut fixture = Fixture::new();
        let mut ctx = fixture.ctx();
        let node = add(konst_int(i32::MAX), konst_int(1)).resolve(&mut ctx).unwrap();
        assert_eq!(node.constant_value(), Some(&Value::Int(i32::MIN)));
    }

    #[test]
    fn unsigned_promotion_only_when_both_unsigned() {
        let mut fixture = Fixture::new();
        let mut ctx = fixture.ctx();
        let node = add(konst_uint(3), konst_uint(4)).resolve(&mut ctx).unwrap();
        assert_eq!(node.ty(), builtin::UINT);

        let node = add(konst_uint(3), konst_int(4)).resolve(&mut ctx).unwrap();
        assert_eq!(node.ty(), builtin::INT);
    }

    #[test]
    fn mixed_float_promotes_to_float() {
        let mut fixture = Fixture::new();
        let mut ctx = fixture.ctx();
        let node = add(konst_int(1), konst_float(0.5)).resolve(&mut ctx).unwrap();
        assert_eq!(node.ty(), builtin::FLOAT);
        assert_eq!(node.constant_value(), Some(&Value::Float(1.5)));
    }

    #[test]
    fn division_by_constant_zero_is_fatal() {
        let mut fixture = Fixture::new();
        let mut ctx = fixture.ctx();
        assert!(div(konst_int(5), konst_int(0)).resolve(&mut ctx).is_err());
        assert!(fixture.sink.has_errors());
    }

    #[test]
    fn modulo_by_constant_zero_is_fatal() {
        let mut fixture = Fixture::new();
        let mut ctx = fixture.ctx();
        let node = Expr::new(
            Span::default(),
            ExprKind::MulDiv(Binary::new(MulDivOp::Mod, konst_int(5), konst_int(0))),
        );
        assert!(node.resolve(&mut ctx).is_err());
    }

    #[test]
    fn constant_division_folds() {
        let mut fixture = Fixture::new();
        let mut ctx = fixture.ctx();
        let node = div(konst_int(14), konst_int(4)).resolve(&mut ctx).unwrap();
        assert_eq!(node.constant_value(), Some(&Value::Int(3)));

        let node = div(konst_uint(14), konst_uint(4)).resolve(&mut ctx).unwrap();
        assert_eq!(node.constant_value(), Some(&Value::Uint(3)));
    }

    #[test]
    fn shift_folds_and_keeps_signedness() {
        let mut fixture = Fixture::new();
        let mut ctx = fixture.ctx();
        let node = Expr::new(
            Span::default(),
            ExprKind::Shift(Binary::new(ShiftOp::Shr, konst_int(-8), konst_int(1))),
        )
        .resolve(&mut ctx)
        .unwrap();
        assert_eq!(node.constant_value(), Some(&Value::Int(-4)));

        let node = Expr::new(
            Span::default(),
            ExprKind::Shift(Binary::new(ShiftOp::Shr, konst_uint(0x8000_0000), konst_int(1))),
        )
        .resolve(&mut ctx)
        .unwrap();
        assert_eq!(node.constant_value(), Some(&Value::Uint(0x4000_0000)));
    }

    #[test]
    fn bitwise_rejects_strings() {
        let mut fixture = Fixture::new();
        let mut ctx = fixture.ctx();
        let node = Expr::new(
            Span::default(),
            ExprKind::Bitwise(Binary::new(BitwiseOp::And, konst_str("a"), konst_int(1))),
        );
        assert!(node.resolve(&mut ctx).is_err());
    }

    #[test]
    fn constant_concat_folds() {
        let mut fixture = Fixture::new();
        let mut ctx = fixture.ctx();
        let node = Expr::new(
            Span::default(),
            ExprKind::Concat(Binary::new((), konst_str("a"), konst_str("b"))),
        )
        .resolve(&mut ctx)
        .unwrap();
        assert_eq!(node.constant_value(), Some(&Value::Str("ab".into())));
    }

    #[test]
    fn concat_of_int_goes_through_string_cast() {
        let mut fixture = Fixture::new();
        let mut ctx = fixture.ctx();
        let node = Expr::new(
            Span::default(),
            ExprKind::Concat(Binary::new((), konst_str("hp: "), konst_int(100))),
        )
        .resolve(&mut ctx)
        .unwrap();
        assert_eq!(node.ty(), builtin::STRING);

        let mut build = FunctionBuilder::new();
        let reg = node.emit(&mut build);
        build.free(&reg);
        let (chunk, _, _) = build.finish();
        chunk.assert_contains_ops(&[OpCode::IntToStr, OpCode::ConcatS]);
    }

    #[test]
    fn runtime_division_emits_divide() {
        let mut fixture = Fixture::new();
        let mut ctx = fixture.ctx();
        // 5 / x with non-constant x resolves and emits a divide.
        let x = {
            let mut n = Expr::new(
                Span::default(),
                ExprKind::IntCast(Box::new(super::super::cast::IntCast {
                    operand: konst_int(1),
                    unsigned: false,
                    explicit: true,
                    op: Some(OpCode::FloatToInt),
                })),
            );
            n.vtype = Some(builtin::INT);
            n.resolved = true;
            n
        };
        let node = div(konst_int(5), x).resolve(&mut ctx).unwrap();
        assert!(!node.is_constant());

        let mut build = FunctionBuilder::new();
        let reg = node.emit(&mut build);
        build.free(&reg);
        let (chunk, _, _) = build.finish();
        chunk.assert_contains_ops(&[OpCode::DivI]);
    }

    #[test]
    fn pow_computes_as_float() {
        let mut fixture = Fixture::new();
        let mut ctx = fixture.ctx();
        let node = Expr::new(
            Span::default(),
            ExprKind::Pow(Binary::new((), konst_int(2), konst_int(10))),
        )
        .resolve(&mut ctx)
        .unwrap();
        assert_eq!(node.constant_value(), Some(&Value::Float(1024.0)));
    }
}
