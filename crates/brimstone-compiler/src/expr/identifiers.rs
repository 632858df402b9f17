//! Identifier resolution and storage references.
//!
//! The lookup order is fixed: block-local variable, the class-default
//! pseudo-object, self-class field, owning-class constant, global
//! constant/field, line-special name, console variable. An unresolved
//! identifier never survives resolution; it rewrites into one of the
//! reference nodes below or fails.

use brimstone_core::{FieldFlags, NameId, RegClass, Symbol, TypeId, Value, builtin};

use crate::builtins::{BuiltinId, well_known};
use crate::bytecode::{AddrConst, OpCode};
use crate::context::CompileContext;
use crate::emit::{FunctionBuilder, RegHandle};
use crate::scope::LocalId;

use super::{Expr, ExprKind, ResolveResult, member};

/// Reference to a declared local; emits its fixed register.
#[derive(Debug)]
pub struct LocalRef {
    pub id: LocalId,
    pub(crate) class: RegClass,
    pub(crate) width: u8,
    pub addr_req: bool,
}

/// Reference to a global variable at a known address.
#[derive(Debug)]
pub struct GlobalRef {
    pub name: NameId,
    pub vtype: TypeId,
    pub addr: u32,
    pub flags: FieldFlags,
    pub addr_req: bool,
    pub(crate) load: Option<(OpCode, RegClass, u8)>,
}

/// Console-variable read; goes through the runtime helper.
#[derive(Debug)]
pub struct CVarRead {
    pub name: NameId,
    pub vtype: TypeId,
    pub(crate) class: RegClass,
    pub(crate) helper: BuiltinId,
}

pub(crate) fn resolve_identifier(e: Box<Expr>, ctx: &mut CompileContext<'_>) -> ResolveResult {
    let ExprKind::Identifier(name) = e.kind else {
        unreachable!()
    };
    let span = e.span;

    // Block-local variable.
    if let Some(id) = ctx.locals.lookup(name) {
        let decl = ctx.locals.decl(id);
        let vtype = decl.vtype;
        let class = ctx.types.reg_class(vtype).unwrap_or(RegClass::Int);
        let width = ctx.types.reg_width(vtype);
        let mut node = Expr::new(
            span,
            ExprKind::LocalRef(Box::new(LocalRef { id, class, width, addr_req: false })),
        );
        node.vtype = Some(vtype);
        node.resolved = true;
        return Ok(node);
    }

    // The class-default pseudo-object.
    if ctx.names.resolve(name).eq_ignore_ascii_case("default") {
        if ctx.class.is_none() {
            return Err(ctx.error(span, "'default' outside a class"));
        }
        let node = Expr::new(span, ExprKind::ClassDefaults(Expr::new(span, ExprKind::SelfRef)));
        return node.resolve(ctx);
    }

    if let Some(class) = ctx.class {
        // Self-class field.
        if let Some(field) = ctx.types.find_field(class, name) {
            let field = field.clone();
            if ctx.func_flags.contains(brimstone_core::FuncFlags::STATIC) {
                let msg = format!(
                    "field '{}' requires a self pointer",
                    ctx.names.resolve(name)
                );
                return Err(ctx.error(span, msg));
            }
            let self_node = Expr::new(span, ExprKind::SelfRef).resolve(ctx)?;
            return member::member_of(span, self_node, field, ctx);
        }
        // Owning-class constant.
        if let Some((value, vtype)) = ctx.types.find_class_constant(class, name) {
            return Ok(Expr::konst(span, *vtype, value.clone()));
        }
    }

    // Global constant, variable, or class name.
    if let Some(symbol) = ctx.symbols.lookup(name) {
        match symbol {
            Symbol::Constant { value, vtype } => {
                return Ok(Expr::konst(span, *vtype, value.clone()));
            }
            Symbol::Global { vtype, addr, flags } => {
                let (vtype, addr, flags) = (*vtype, *addr, *flags);
                return Ok(global_ref(span, name, vtype, addr, flags, ctx));
            }
            Symbol::Class(class) => {
                let class = *class;
                let vtype = ctx.types.class_ptr_of(class);
                return Ok(Expr::konst(
                    span,
                    vtype,
                    Value::Ptr(brimstone_core::PtrConst::Class(class)),
                ));
            }
            Symbol::Function(_) => {
                let msg = format!(
                    "function '{}' used as a value",
                    ctx.names.resolve(name)
                );
                return Err(ctx.error(span, msg));
            }
            // Line-special names double as integer constants.
            Symbol::LineSpecial(special) => {
                return Ok(Expr::konst(span, builtin::INT, Value::Int(*special)));
            }
            Symbol::CVar { vtype } => {
                let vtype = *vtype;
                let class = ctx.types.reg_class(vtype).unwrap_or(RegClass::Int);
                let Some(helper) = ctx.builtins.lookup(well_known::GET_CVAR) else {
                    return Err(ctx.error(span, "console-variable helper not registered"));
                };
                let mut node = Expr::new(
                    span,
                    ExprKind::CVarRead(Box::new(CVarRead { name, vtype, class, helper })),
                );
                node.vtype = Some(vtype);
                node.resolved = true;
                return Ok(node);
            }
        }
    }

    let msg = format!("unknown identifier '{}'", ctx.names.resolve(name));
    Err(ctx.error(span, msg))
}

pub(crate) fn global_ref(
    span: brimstone_core::Span,
    name: NameId,
    vtype: TypeId,
    addr: u32,
    flags: FieldFlags,
    ctx: &mut CompileContext<'_>,
) -> Box<Expr> {
    let load = member::mem_ops(ctx.types, vtype).map(|(l, _, c, w)| (l, c, w));
    let mut node = Expr::new(
        span,
        ExprKind::GlobalRef(Box::new(GlobalRef { name, vtype, addr, flags, addr_req: false, load })),
    );
    node.vtype = Some(vtype);
    node.resolved = true;
    node
}

pub(crate) fn resolve_self(mut e: Box<Expr>, ctx: &mut CompileContext<'_>) -> ResolveResult {
    let Some(class) = ctx.class else {
        return Err(ctx.error(e.span, "'self' outside a class method"));
    };
    if ctx.func_flags.contains(brimstone_core::FuncFlags::STATIC) {
        return Err(ctx.error(e.span, "'self' in a static function"));
    }
    e.vtype = Some(ctx.types.pointer_to(class, false));
    Ok(e)
}

pub(crate) fn resolve_class_defaults(mut e: Box<Expr>, ctx: &mut CompileContext<'_>) -> ResolveResult {
    let ExprKind::ClassDefaults(obj) = std::mem::replace(&mut e.kind, ExprKind::Nop) else {
        unreachable!()
    };
    let obj = obj.resolve(ctx)?;
    let Some(class) = ctx.types.pointed_class(obj.ty()) else {
        let msg = format!("no defaults for {}", ctx.describe(obj.ty()));
        return Err(ctx.error(e.span, msg));
    };
    // Default instances are read-only.
    e.vtype = Some(ctx.types.pointer_to(class, true));
    e.kind = ExprKind::ClassDefaults(obj);
    Ok(e)
}

// =============================================================================
// Emission
// =============================================================================

pub(crate) fn emit_local_ref(l: &LocalRef, build: &mut FunctionBuilder) -> RegHandle {
    let reg = build.local_reg(l.id);
    if !l.addr_req {
        return reg;
    }
    let dst = build.acquire_target();
    build.emit_imm(
        OpCode::RefLocal,
        dst.num,
        l.class.index() as u16,
        reg.num,
        0,
    );
    dst
}

/// The self pointer lives in the first address register of every method.
pub(crate) fn emit_self_ref(_build: &mut FunctionBuilder) -> RegHandle {
    RegHandle::fixed(0, RegClass::Address, 1)
}

pub(crate) fn emit_class_defaults(obj: &Expr, build: &mut FunctionBuilder) -> RegHandle {
    let obj_reg = obj.emit(build);
    let obj_reg = build.materialize(obj_reg);
    let class = build.acquire(RegClass::Address, 1);
    build.emit(OpCode::ClassOf, class.num, obj_reg.num, 0);
    build.free(&obj_reg);
    let dst = build.acquire(RegClass::Address, 1);
    build.emit(OpCode::LoadDefaults, dst.num, class.num, 0);
    build.free(&class);
    dst
}

pub(crate) fn emit_global_ref(g: &GlobalRef, build: &mut FunctionBuilder) -> RegHandle {
    let base = build.konst_addr(AddrConst::Global(g.addr));
    if g.addr_req {
        return base;
    }
    let Some((load, class, width)) = g.load else {
        // Aggregate globals are their address.
        return base;
    };
    let dst = build.acquire(class, width);
    build.emit(load, dst.num, base.operand(), 0);
    dst
}

pub(crate) fn emit_cvar_read(c: &CVarRead, build: &mut FunctionBuilder) -> RegHandle {
    let name = build.konst_name(c.name);
    build.emit(OpCode::Param, RegClass::Int.index() as u16, name.operand(), 1);
    let target = build.konst_addr(AddrConst::Builtin(c.helper));
    build.emit(OpCode::Call, target.num, 1, 1);
    let dst = build.acquire(c.class, 1);
    build.emit(OpCode::Result, c.class.index() as u16, dst.num, 1);
    dst
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::expr::testutil::Fixture;
    use brimstone_core::Span;

    fn ident(fixture: &mut Fixture, name: &str) -> Box<Expr> {
        let name = fixture.names.intern(name);
        Expr::new(Span::default(), ExprKind::Identifier(name))
    }

    #[test]
    fn unknown_identifier_reports() {
        let mut fixture = Fixture::new();
        let node = ident(&mut fixture, "missing");
        let mut ctx = fixture.ctx();
        assert!(node.resolve(&mut ctx).is_err());
        assert!(fixture.sink.has_errors());
    }

    #[test]
    fn local_wins_over_global() {
        let mut fixture = Fixture::new();
        let name = fixture.names.intern("health");
        fixture.symbols.define(
            name,
            Symbol::Constant { value: Value::Int(99), vtype: builtin::INT },
        );
        let node = Expr::new(Span::default(), ExprKind::Identifier(name));
        let mut ctx = fixture.ctx();
        ctx.locals.push_block();
        ctx.locals
            .declare(name, builtin::FLOAT, Span::default(), false)
            .unwrap();
        let node = node.resolve(&mut ctx).unwrap();
        assert!(matches!(node.kind, ExprKind::LocalRef(_)));
        assert_eq!(node.ty(), builtin::FLOAT);
    }

    #[test]
    fn global_constant_becomes_constant_node() {
        let mut fixture = Fixture::new();
        let name = fixture.names.intern("MAXHEALTH");
        fixture.symbols.define(
            name,
            Symbol::Constant { value: Value::Int(200), vtype: builtin::INT },
        );
        let node = Expr::new(Span::default(), ExprKind::Identifier(name));
        let mut ctx = fixture.ctx();
        let node = node.resolve(&mut ctx).unwrap();
        assert_eq!(node.constant_value(), Some(&Value::Int(200)));
    }

    #[test]
    fn line_special_name_is_an_int_constant() {
        let mut fixture = Fixture::new();
        let name = fixture.names.intern("Door_Open");
        fixture.symbols.define(name, Symbol::LineSpecial(11));
        let node = Expr::new(Span::default(), ExprKind::Identifier(name));
        let mut ctx = fixture.ctx();
        let node = node.resolve(&mut ctx).unwrap();
        assert_eq!(node.constant_value(), Some(&Value::Int(11)));
        assert_eq!(node.ty(), builtin::INT);
    }

    #[test]
    fn self_field_resolves_through_member() {
        let mut fixture = Fixture::new();
        let f_health = fixture.names.intern("health");
        let class = fixture.types.add_class(
            fixture.names.intern("Actor"),
            None,
            vec![(f_health, builtin::INT, FieldFlags::empty())],
        );
        let node = Expr::new(Span::default(), ExprKind::Identifier(f_health));
        let mut ctx = fixture.ctx();
        ctx.class = Some(class);
        let node = node.resolve(&mut ctx).unwrap();
        assert!(matches!(node.kind, ExprKind::Member(_)));
        assert_eq!(node.ty(), builtin::INT);
    }

    #[test]
    fn cvar_read_goes_through_helper() {
        let mut fixture = Fixture::new();
        let name = fixture.names.intern("sv_gravity");
        fixture.symbols.define(name, Symbol::CVar { vtype: builtin::FLOAT });
        let node = Expr::new(Span::default(), ExprKind::Identifier(name));
        let mut ctx = fixture.ctx();
        let node = node.resolve(&mut ctx).unwrap();
        assert!(matches!(node.kind, ExprKind::CVarRead(_)));

        let mut build = FunctionBuilder::new();
        let reg = node.emit(&mut build);
        build.free(&reg);
        let (chunk, _, _) = build.finish();
        chunk.assert_ops(&[OpCode::Param, OpCode::Call, OpCode::Result]);
    }
}
