//! Conditional (ternary) expressions.
//!
//! The result type unifies the branch types; a constant condition folds
//! the node away to the selected branch. Emission shares one destination
//! register between the branches.

use brimstone_core::{RegClass, TypeId, builtin};

use crate::bytecode::OpCode;
use crate::context::CompileContext;
use crate::emit::{FunctionBuilder, RegHandle, RegKind};

use super::cast::{cast_to, cast_to_bool};
use super::{Expr, ExprKind, Failed, ResolveResult};

#[derive(Debug)]
pub struct Conditional {
    pub cond: Box<Expr>,
    pub when_true: Box<Expr>,
    pub when_false: Box<Expr>,
    pub(crate) class: RegClass,
    pub(crate) width: u8,
}

impl Conditional {
    pub fn new(cond: Box<Expr>, when_true: Box<Expr>, when_false: Box<Expr>) -> Box<Self> {
        Box::new(Self { cond, when_true, when_false, class: RegClass::Int, width: 1 })
    }
}

/// Unify the two branch types: identical, both bool, both integral
/// (signed 32), both numeric (float), or one-side-null pointer adopting
/// the other side's pointer type.
fn unify_branch_types(
    left: TypeId,
    right: TypeId,
    ctx: &CompileContext<'_>,
) -> Option<TypeId> {
    if left == right {
        return Some(left);
    }
    if left == builtin::BOOL && right == builtin::BOOL {
        return Some(builtin::BOOL);
    }
    if ctx.types.is_integral(left) && ctx.types.is_integral(right) {
        return Some(builtin::INT);
    }
    if ctx.types.is_numeric(left) && ctx.types.is_numeric(right) {
        return Some(builtin::FLOAT);
    }
    if left == builtin::NULL_PTR && ctx.types.is_pointer(right) {
        return Some(right);
    }
    if right == builtin::NULL_PTR && ctx.types.is_pointer(left) {
        return Some(left);
    }
    None
}

pub(crate) fn resolve_conditional(mut e: Box<Expr>, ctx: &mut CompileContext<'_>) -> ResolveResult {
    let ExprKind::Conditional(mut c) = std::mem::replace(&mut e.kind, ExprKind::Nop) else {
        unreachable!()
    };

    let cond = c.cond.resolve(ctx).and_then(|n| cast_to_bool(n, ctx));
    let when_true = c.when_true.resolve(ctx);
    let when_false = c.when_false.resolve(ctx);
    let (cond, when_true, when_false) = (cond?, when_true?, when_false?);

    let Some(vtype) = unify_branch_types(when_true.ty(), when_false.ty(), ctx) else {
        let msg = format!(
            "incompatible conditional branches: {} and {}",
            ctx.describe(when_true.ty()),
            ctx.describe(when_false.ty())
        );
        return Err(ctx.error(e.span, msg));
    };
    let when_true = cast_to(when_true, vtype, ctx, false)?;
    let when_false = cast_to(when_false, vtype, ctx, false)?;

    // A constant condition folds away to the selected branch.
    if let Some(v) = cond.constant_value() {
        return Ok(if v.as_bool() { when_true } else { when_false });
    }

    c.class = ctx
        .types
        .reg_class(vtype)
        .ok_or_else(|| ctx.error(e.span, "conditional branches produce no value"))?;
    c.width = ctx.types.reg_width(vtype);
    c.cond = cond;
    c.when_true = when_true;
    c.when_false = when_false;
    e.kind = ExprKind::Conditional(c);
    e.vtype = Some(vtype);
    Ok(e)
}

/// The "true" branch's destination register is reused for the "false"
/// branch's result so the node yields exactly one register.
pub(crate) fn emit_conditional(c: &Conditional, build: &mut FunctionBuilder) -> RegHandle {
    let cond = c.cond.emit(build);
    let cond = build.materialize(cond);
    let to_false = build.emit_jump(OpCode::JumpIfFalse, cond.num);
    build.free(&cond);

    let t = c.when_true.emit(build);
    let dst = if t.kind == RegKind::Temp && t.class == c.class {
        t
    } else {
        let dst = build.acquire(c.class, c.width);
        build.move_to(&dst, &t);
        build.free(&t);
        dst
    };
    let to_end = build.emit_jump(OpCode::Jmp, 0);

    build.patch(to_false);
    // Release the shared destination so the false branch can settle into
    // the same register.
    build.free(&dst);
    let f = c.when_false.emit(build);
    let result = if f.kind == RegKind::Temp && f.num == dst.num && f.class == dst.class {
        f
    } else {
        build.reuse(&dst);
        build.move_to(&dst, &f);
        build.free(&f);
        dst
    };
    build.patch(to_end);
    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::expr::cast::Cast1;
    use crate::expr::testutil::Fixture;
    use brimstone_core::{Span, Value};

    fn konst_int(v: i32) -> Box<Expr> {
        Expr::konst(Span::default(), builtin::INT, Value::Int(v))
    }

    fn konst_float(v: f64) -> Box<Expr> {
        Expr::konst(Span::default(), builtin::FLOAT, Value::Float(v))
    }

    fn runtime_bool() -> Box<Expr> {
        let mut node = Expr::new(
            Span::default(),
            ExprKind::BoolCast(Box::new(Cast1 {
                operand: konst_int(1),
                op: Some(OpCode::BoolI),
            })),
        );
        node.vtype = Some(builtin::BOOL);
        node.resolved = true;
        node
    }

    fn ternary(cond: Box<Expr>, t: Box<Expr>, f: Box<Expr>) -> Box<Expr> {
        Expr::new(Span::default(), ExprKind::Conditional(Conditional::new(cond, t, f)))
    }

    #[test]
    fn constant_condition_folds_to_branch() {
        let mut fixture = Fixture::new();
        let mut ctx = fixture.ctx();
        // A non-bool constant condition works through the bool cast.
        let node = ternary(konst_int(7), konst_int(1), konst_int(2))
            .resolve(&mut ctx)
            .unwrap();
        assert_eq!(node.constant_value(), Some(&Value::Int(1)));

        let node = ternary(konst_int(0), konst_int(1), konst_int(2))
            .resolve(&mut ctx)
            .unwrap();
        assert_eq!(node.constant_value(), Some(&Value::Int(2)));
    }

    #[test]
    fn mixed_numeric_branches_unify_to_float() {
        let mut fixture = Fixture::new();
        let mut ctx = fixture.ctx();
        let node = ternary(runtime_bool(), konst_int(1), konst_float(0.5))
            .resolve(&mut ctx)
            .unwrap();
        assert_eq!(node.ty(), builtin::FLOAT);
    }

    #[test]
    fn incompatible_branches_error() {
        let mut fixture = Fixture::new();
        let mut ctx = fixture.ctx();
        let s = Expr::konst(Span::default(), builtin::STRING, Value::Str("x".into()));
        assert!(ternary(runtime_bool(), konst_int(1), s).resolve(&mut ctx).is_err());
    }

    #[test]
    fn branches_share_one_result_register() {
        let mut fixture = Fixture::new();
        let mut ctx = fixture.ctx();
        let node = ternary(runtime_bool(), konst_int(1), konst_int(2))
            .resolve(&mut ctx)
            .unwrap();

        let mut build = FunctionBuilder::new();
        let reg = node.emit(&mut build);
        assert_eq!(reg.width, 1);
        build.free(&reg);
        assert_eq!(build.total_in_use(), 0);
        let (chunk, _, _) = build.finish();
        chunk.assert_contains_ops(&[OpCode::JumpIfFalse, OpCode::LoadKI, OpCode::Jmp, OpCode::LoadKI]);
    }
}
