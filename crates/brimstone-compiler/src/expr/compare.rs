//! Relational, equality, and three-way comparison operators.
//!
//! Numeric operands promote like arithmetic but the pre-bool value type is
//! remembered so signed, unsigned, and float comparisons pick different
//! opcodes. String operands force both sides through string casts and
//! compare lexicographically byte-wise; approximate equality is
//! case-insensitive for strings and epsilon-based for floats.

use brimstone_core::{PtrConst, RegClass, TypeId, TypeKind, Value, builtin, value};

use crate::bytecode::OpCode;
use crate::context::CompileContext;
use crate::conversion::{numeric_promotion, pointer_compatible};
use crate::emit::{FunctionBuilder, RegHandle};

use super::cast::{Cast1, cast_to, cast_to_float, cast_to_string};
use super::{Binary, Expr, ExprKind, Failed, ResolveResult, resolve_both};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RelOp {
    Lt,
    Le,
    Gt,
    Ge,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EqOp {
    Eq,
    Neq,
    ApproxEq,
    ApproxNeq,
}

impl EqOp {
    fn approx(self) -> bool {
        matches!(self, EqOp::ApproxEq | EqOp::ApproxNeq)
    }

    fn negated(self) -> bool {
        matches!(self, EqOp::Neq | EqOp::ApproxNeq)
    }
}

/// Comparison payload. `swap` emulates > and >= by swapping the operands
/// of < and <=; `negate` emulates != by inverting the equality result.
#[derive(Debug)]
pub struct Compare<Op> {
    pub op: Op,
    pub left: Box<Expr>,
    pub right: Box<Expr>,
    pub(crate) emit_op: Option<OpCode>,
    pub(crate) swap: bool,
    pub(crate) negate: bool,
    pub(crate) approx: bool,
}

impl<Op> Compare<Op> {
    pub fn new(op: Op, left: Box<Expr>, right: Box<Expr>) -> Box<Self> {
        Box::new(Self { op, left, right, emit_op: None, swap: false, negate: false, approx: false })
    }
}

// =============================================================================
// Relational
// =============================================================================

pub(crate) fn resolve_rel(mut e: Box<Expr>, ctx: &mut CompileContext<'_>) -> ResolveResult {
    let ExprKind::CompareRel(mut c) = std::mem::replace(&mut e.kind, ExprKind::Nop) else {
        unreachable!()
    };
    let (left, right) = resolve_both(c.left, c.right, ctx)?;
    let (lt, rt) = (left.ty(), right.ty());

    let (left, right, compare_type) = if lt == builtin::STRING || rt == builtin::STRING {
        let left = cast_to_string(left, ctx)?;
        let right = cast_to_string(right, ctx)?;
        (left, right, builtin::STRING)
    } else if ctx.types.is_numeric(lt) && ctx.types.is_numeric(rt) {
        let promoted = numeric_promotion(ctx.types, lt, rt);
        let left = cast_to(left, promoted, ctx, false)?;
        let right = cast_to(right, promoted, ctx, false)?;
        (left, right, promoted)
    } else {
        let msg = format!(
            "cannot compare {} with {}",
            ctx.describe(lt),
            ctx.describe(rt)
        );
        return Err(ctx.error(e.span, msg));
    };

    if let (Some(lv), Some(rv)) = (left.constant_value(), right.constant_value()) {
        let result = fold_rel(c.op, lv, rv, compare_type);
        return Ok(Expr::konst(e.span, builtin::BOOL, Value::Int(result as i32)));
    }

    c.swap = matches!(c.op, RelOp::Gt | RelOp::Ge);
    let le = matches!(c.op, RelOp::Le | RelOp::Ge);
    c.emit_op = Some(if compare_type == builtin::STRING {
        if le { OpCode::LeS } else { OpCode::LtS }
    } else if compare_type == builtin::FLOAT {
        if le { OpCode::LeF } else { OpCode::LtF }
    } else if compare_type == builtin::UINT {
        if le { OpCode::LeU } else { OpCode::LtU }
    } else if le {
        OpCode::LeI
    } else {
        OpCode::LtI
    });
    c.left = left;
    c.right = right;
    e.kind = ExprKind::CompareRel(c);
    e.vtype = Some(builtin::BOOL);
    Ok(e)
}

fn fold_rel(op: RelOp, l: &Value, r: &Value, compare_type: TypeId) -> bool {
    // Gt/Ge fold as swapped Lt/Le, mirroring emission.
    let (l, r, le) = match op {
        RelOp::Lt => (l, r, false),
        RelOp::Le => (l, r, true),
        RelOp::Gt => (r, l, false),
        RelOp::Ge => (r, l, true),
    };
    let less = if compare_type == builtin::STRING {
        let (Value::Str(a), Value::Str(b)) = (l, r) else { return false };
        if le {
            return a.as_bytes() <= b.as_bytes();
        }
        return a.as_bytes() < b.as_bytes();
    } else if compare_type == builtin::FLOAT {
        let (a, b) = (l.as_float().unwrap_or(0.0), r.as_float().unwrap_or(0.0));
        if le { a <= b } else { a < b }
    } else if compare_type == builtin::UINT {
        let (a, b) = (l.int_bits().unwrap_or(0) as u32, r.int_bits().unwrap_or(0) as u32);
        if le { a <= b } else { a < b }
    } else {
        let (a, b) = (l.int_bits().unwrap_or(0), r.int_bits().unwrap_or(0));
        if le { a <= b } else { a < b }
    };
    less
}

// =============================================================================
// Equality
// =============================================================================

pub(crate) fn resolve_eq(mut e: Box<Expr>, ctx: &mut CompileContext<'_>) -> ResolveResult {
    let ExprKind::CompareEq(mut c) = std::mem::replace(&mut e.kind, ExprKind::Nop) else {
        unreachable!()
    };
    let (left, right) = resolve_both(c.left, c.right, ctx)?;
    c.approx = c.op.approx();
    c.negate = c.op.negated();

    let (left, right) = unify_eq_operands(e.span, left, right, ctx)?;
    let t = left.ty();

    if c.approx
        && !(t == builtin::FLOAT
            || t == builtin::STRING
            || ctx.types.is_vector(t))
    {
        let msg = format!("approximate comparison is not defined for {}", ctx.describe(t));
        return Err(ctx.error(e.span, msg));
    }

    if let (Some(lv), Some(rv)) = (left.constant_value(), right.constant_value()) {
        let equal = fold_eq(lv, rv, c.approx, ctx);
        let result = equal != c.negate;
        return Ok(Expr::konst(e.span, builtin::BOOL, Value::Int(result as i32)));
    }

    // A constant zero/null against a non-constant operand degenerates to
    // a plain bool test instead of a full comparison.
    if !c.approx && is_zero_const(&left) && !right.is_constant() {
        let wrapped = if c.negate {
            ExprKind::BoolCast(Cast1::new(right))
        } else {
            ExprKind::BoolNot(Cast1::new(right))
        };
        return Expr::new(e.span, wrapped).resolve(ctx);
    }
    if !c.approx && is_zero_const(&right) && !left.is_constant() {
        let wrapped = if c.negate {
            ExprKind::BoolCast(Cast1::new(left))
        } else {
            ExprKind::BoolNot(Cast1::new(left))
        };
        return Expr::new(e.span, wrapped).resolve(ctx);
    }
    (c.left, c.right) = (left, right);

    c.emit_op = Some(match ctx.types.kind(t) {
        TypeKind::Float { .. } => {
            if c.approx { OpCode::ApproxEqF } else { OpCode::EqF }
        }
        TypeKind::String => {
            if c.approx { OpCode::ApproxEqS } else { OpCode::EqS }
        }
        TypeKind::Vector2 => OpCode::EqV2,
        TypeKind::Vector3 => OpCode::EqV3,
        TypeKind::Pointer { .. } | TypeKind::ClassPtr { .. } => OpCode::EqA,
        _ => OpCode::EqI,
    });
    e.kind = ExprKind::CompareEq(c);
    e.vtype = Some(builtin::BOOL);
    Ok(e)
}

/// Bring equality operands to one common type: strings pull the other
/// side through a string cast; name/sound/color/class-pointer/state-label
/// pull the other side to themselves; numerics promote; compatible
/// pointers compare as-is.
fn unify_eq_operands(
    span: brimstone_core::Span,
    left: Box<Expr>,
    right: Box<Expr>,
    ctx: &mut CompileContext<'_>,
) -> Result<(Box<Expr>, Box<Expr>), Failed> {
    let (lt, rt) = (left.ty(), right.ty());
    if lt == rt {
        return Ok((left, right));
    }

    if lt == builtin::STRING {
        let right = cast_to_string(right, ctx)?;
        return Ok((left, right));
    }
    if rt == builtin::STRING {
        let left = cast_to_string(left, ctx)?;
        return Ok((left, right));
    }

    let magnet = |t: TypeId, types: &brimstone_core::TypeStore| {
        t == builtin::NAME
            || t == builtin::SOUND
            || t == builtin::COLOR
            || t == builtin::STATE_LABEL
            || matches!(types.kind(t), TypeKind::ClassPtr { .. })
    };
    if magnet(lt, ctx.types) {
        let right = cast_to(right, lt, ctx, false)?;
        return Ok((left, right));
    }
    if magnet(rt, ctx.types) {
        let left = cast_to(left, rt, ctx, false)?;
        return Ok((left, right));
    }

    if ctx.types.is_numeric(lt) && ctx.types.is_numeric(rt) {
        let promoted = numeric_promotion(ctx.types, lt, rt);
        let left = cast_to(left, promoted, ctx, false)?;
        let right = cast_to(right, promoted, ctx, false)?;
        return Ok((left, right));
    }

    if ctx.types.is_pointer(lt) && ctx.types.is_pointer(rt) {
        if pointer_compatible(ctx.types, lt, rt, true) {
            return Ok((left, right));
        }
        let msg = format!(
            "pointer types {} and {} are unrelated",
            ctx.describe(lt),
            ctx.describe(rt)
        );
        return Err(ctx.error(span, msg));
    }

    let msg = format!(
        "cannot compare {} with {}",
        ctx.describe(lt),
        ctx.describe(rt)
    );
    Err(ctx.error(span, msg))
}

fn is_zero_const(e: &Expr) -> bool {
    match e.constant_value() {
        Some(Value::Int(0) | Value::Uint(0)) => true,
        Some(Value::Float(f)) => *f == 0.0,
        Some(Value::Ptr(PtrConst::Null)) => true,
        _ => false,
    }
}

fn fold_eq(l: &Value, r: &Value, approx: bool, ctx: &CompileContext<'_>) -> bool {
    match (l, r) {
        (Value::Float(a), Value::Float(b)) => {
            if approx {
                value::approx_eq(*a, *b)
            } else {
                a == b
            }
        }
        (Value::Str(a), Value::Str(b)) => {
            if approx {
                a.eq_ignore_ascii_case(b)
            } else {
                a == b
            }
        }
        (Value::Name(a), Value::Name(b)) => {
            a == b
                || ctx
                    .names
                    .resolve(*a)
                    .eq_ignore_ascii_case(ctx.names.resolve(*b))
        }
        (Value::Ptr(a), Value::Ptr(b)) => a == b,
        _ => l.int_bits() == r.int_bits(),
    }
}

// =============================================================================
// Three-way comparison
// =============================================================================

pub(crate) fn resolve_three_way(mut e: Box<Expr>, ctx: &mut CompileContext<'_>) -> ResolveResult {
    let ExprKind::ThreeWay(mut b) = std::mem::replace(&mut e.kind, ExprKind::Nop) else {
        unreachable!()
    };
    let (left, right) = resolve_both(b.left, b.right, ctx)?;
    // Always compares as float, yields -1/0/1.
    let left = cast_to_float(left, ctx)?;
    let right = cast_to_float(right, ctx)?;

    if let (Some(Value::Float(a)), Some(Value::Float(x))) =
        (left.constant_value(), right.constant_value())
    {
        let result = if a < x {
            -1
        } else if a > x {
            1
        } else {
            0
        };
        return Ok(Expr::konst(e.span, builtin::INT, Value::Int(result)));
    }

    b.left = left;
    b.right = right;
    b.emit_op = Some(OpCode::CmpF);
    e.kind = ExprKind::ThreeWay(b);
    e.vtype = Some(builtin::INT);
    Ok(e)
}

// =============================================================================
// Emission
// =============================================================================

pub(crate) fn emit_rel(c: &Compare<RelOp>, build: &mut FunctionBuilder) -> RegHandle {
    let op = c.emit_op.expect("emission op chosen at resolve");
    let l = c.left.emit(build);
    let r = c.right.emit(build);
    let (first, second) = if c.swap { (&r, &l) } else { (&l, &r) };
    let dst = build.acquire(RegClass::Int, 1);
    build.emit(op, dst.num, first.operand(), second.operand());
    build.free(&l);
    build.free(&r);
    dst
}

pub(crate) fn emit_eq(c: &Compare<EqOp>, build: &mut FunctionBuilder) -> RegHandle {
    let op = c.emit_op.expect("emission op chosen at resolve");
    let l = c.left.emit(build);
    let r = c.right.emit(build);
    let dst = build.acquire(RegClass::Int, 1);
    match op {
        // Vector equality takes the approximate flag as an immediate.
        OpCode::EqV2 | OpCode::EqV3 => {
            build.emit_imm(op, dst.num, l.num, r.num, c.approx as i32);
        }
        _ => {
            build.emit(op, dst.num, l.operand(), r.operand());
        }
    }
    build.free(&l);
    build.free(&r);
    if c.negate {
        let one = build.konst_int(1);
        build.emit(OpCode::XorI, dst.num, dst.num, one.operand());
    }
    dst
}

pub(crate) fn emit_three_way(b: &Binary<()>, build: &mut FunctionBuilder) -> RegHandle {
    let l = b.left.emit(build);
    let r = b.right.emit(build);
    let dst = build.acquire(RegClass::Int, 1);
    build.emit(OpCode::CmpF, dst.num, l.operand(), r.operand());
    build.free(&l);
    build.free(&r);
    dst
}
