//! Constant emission and vector literal construction.

use brimstone_core::{PtrConst, RegClass, Value, builtin};

use crate::bytecode::{AddrConst, OpCode};
use crate::context::CompileContext;
use crate::emit::{FunctionBuilder, RegHandle};

use super::{Expr, ExprKind, ResolveResult};

/// Emit a folded constant as a constant-backed handle; no instructions.
pub(crate) fn emit_constant(value: &Value, build: &mut FunctionBuilder) -> RegHandle {
    match value {
        Value::Int(v) => build.konst_int(*v),
        Value::Uint(v) => build.konst_uint(*v),
        Value::Float(v) => build.konst_float(*v),
        Value::Name(n) => build.konst_name(*n),
        Value::Str(s) => {
            let s = s.clone();
            build.konst_string(&s)
        }
        Value::Ptr(PtrConst::Null) => build.konst_addr(AddrConst::Null),
        Value::Ptr(PtrConst::Class(t)) => build.konst_addr(AddrConst::Class(*t)),
    }
}

/// A vector literal: components packed into contiguous float registers.
/// Accepts `(x, y)`, `(x, y, z)`, and `(xy, z)` with an existing vector2.
#[derive(Debug)]
pub struct VectorValue {
    pub parts: Vec<Box<Expr>>,
}

pub(crate) fn resolve_vector(mut e: Box<Expr>, ctx: &mut CompileContext<'_>) -> ResolveResult {
    let ExprKind::VectorValue(payload) = std::mem::replace(&mut e.kind, ExprKind::Nop) else {
        unreachable!()
    };
    let span = e.span;

    let mut failed = false;
    let mut resolved = Vec::with_capacity(payload.parts.len());
    for part in payload.parts {
        match part.resolve(ctx) {
            Ok(part) => resolved.push(part),
            Err(_) => failed = true,
        }
    }
    if failed {
        return Err(super::Failed);
    }

    let mut width = 0u8;
    let mut parts = Vec::with_capacity(resolved.len());
    for part in resolved {
        let t = part.ty();
        if ctx.types.is_vector(t) {
            width += ctx.types.reg_width(t);
            parts.push(part);
        } else if ctx.types.is_numeric(t) {
            width += 1;
            parts.push(super::cast::cast_to(part, builtin::FLOAT, ctx, false)?);
        } else {
            let msg = format!("'{}' is not a valid vector component", ctx.describe(t));
            return Err(ctx.error(part.span, msg));
        }
    }

    let vtype = match width {
        2 => builtin::VEC2,
        3 => builtin::VEC3,
        _ => {
            return Err(ctx.error(span, format!("vector of {width} components")));
        }
    };

    e.kind = ExprKind::VectorValue(Box::new(VectorValue { parts }));
    e.vtype = Some(vtype);
    Ok(e)
}

pub(crate) fn emit_vector(v: &VectorValue, build: &mut FunctionBuilder) -> RegHandle {
    let width: u8 = v.parts.iter().map(|p| p.ty_width()).sum();
    let dst = build.acquire(RegClass::Float, width);

    let mut slot = dst.num;
    for part in &v.parts {
        let src = part.emit(build);
        let pw = if src.width == 0 { 1 } else { src.width };
        let dst_part = RegHandle::temp(slot, RegClass::Float, pw);
        build.move_to(&dst_part, &src);
        build.free(&src);
        slot += u16::from(pw);
    }
    dst
}

impl Expr {
    /// Register width of this node's resolved type without a store lookup;
    /// vectors are the only multi-slot values.
    pub(crate) fn ty_width(&self) -> u8 {
        if self.ty() == builtin::VEC2 {
            2
        } else if self.ty() == builtin::VEC3 {
            3
        } else {
            1
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::expr::testutil::Fixture;
    use brimstone_core::{Span, Value};

    fn fconst(v: f64) -> Box<Expr> {
        Expr::konst(Span::default(), builtin::FLOAT, Value::Float(v))
    }

    #[test]
    fn constant_emission_interns() {
        let mut build = FunctionBuilder::new();
        let a = emit_constant(&Value::Int(5), &mut build);
        let b = emit_constant(&Value::Int(5), &mut build);
        assert_eq!(a, b);
        assert!(a.is_konst());
        let (chunk, _, _) = build.finish();
        assert!(chunk.is_empty());
    }

    #[test]
    fn two_scalars_make_a_vec2() {
        let mut fixture = Fixture::new();
        let mut ctx = fixture.ctx();
        let node = Expr::new(
            Span::default(),
            ExprKind::VectorValue(Box::new(VectorValue {
                parts: vec![fconst(1.0), fconst(2.0)],
            })),
        );
        let node = node.resolve(&mut ctx).unwrap();
        assert_eq!(node.ty(), builtin::VEC2);
    }

    #[test]
    fn vec2_plus_scalar_makes_a_vec3() {
        let mut fixture = Fixture::new();
        let mut ctx = fixture.ctx();
        let xy = Expr::new(
            Span::default(),
            ExprKind::VectorValue(Box::new(VectorValue {
                parts: vec![fconst(1.0), fconst(2.0)],
            })),
        );
        let node = Expr::new(
            Span::default(),
            ExprKind::VectorValue(Box::new(VectorValue { parts: vec![xy, fconst(3.0)] })),
        );
        let node = node.resolve(&mut ctx).unwrap();
        assert_eq!(node.ty(), builtin::VEC3);
    }

    #[test]
    fn int_components_are_cast_to_float() {
        let mut fixture = Fixture::new();
        let mut ctx = fixture.ctx();
        let node = Expr::new(
            Span::default(),
            ExprKind::VectorValue(Box::new(VectorValue {
                parts: vec![
                    Expr::konst(Span::default(), builtin::INT, Value::Int(1)),
                    fconst(2.0),
                ],
            })),
        );
        let node = node.resolve(&mut ctx).unwrap();
        assert_eq!(node.ty(), builtin::VEC2);
    }

    #[test]
    fn four_components_are_rejected() {
        let mut fixture = Fixture::new();
        let mut ctx = fixture.ctx();
        let node = Expr::new(
            Span::default(),
            ExprKind::VectorValue(Box::new(VectorValue {
                parts: vec![fconst(1.0), fconst(2.0), fconst(3.0), fconst(4.0)],
            })),
        );
        assert!(node.resolve(&mut ctx).is_err());
        assert!(fixture.sink.has_errors());
    }

    #[test]
    fn vector_emission_packs_contiguous_registers() {
        let mut fixture = Fixture::new();
        let mut ctx = fixture.ctx();
        let node = Expr::new(
            Span::default(),
            ExprKind::VectorValue(Box::new(VectorValue {
                parts: vec![fconst(1.0), fconst(2.0), fconst(3.0)],
            })),
        );
        let node = node.resolve(&mut ctx).unwrap();

        let mut build = FunctionBuilder::new();
        let reg = node.emit(&mut build);
        assert_eq!(reg.width, 3);
        build.free(&reg);
        let (chunk, _, _) = build.finish();
        chunk.assert_ops(&[OpCode::LoadKF, OpCode::LoadKF, OpCode::LoadKF]);
    }
}
