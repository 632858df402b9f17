//! Local variable declarations.
//!
//! Declarations register the name during resolution; the fixed register
//! is allocated at emission and released by the owning compound block.

use brimstone_core::{NameId, RegClass, TypeId, builtin};

use crate::context::CompileContext;
use crate::emit::{FunctionBuilder, RegHandle};
use crate::expr::cast::cast_to;
use crate::expr::{Expr, ExprKind, ResolveResult};
use crate::scope::LocalId;

#[derive(Debug)]
pub struct LocalVarDecl {
    pub name: NameId,
    pub vtype: TypeId,
    pub constant: bool,
    pub init: Option<Box<Expr>>,
    pub(crate) id: Option<LocalId>,
    pub(crate) class: RegClass,
    pub(crate) width: u8,
}

impl LocalVarDecl {
    pub fn new(name: NameId, vtype: TypeId, constant: bool, init: Option<Box<Expr>>) -> Box<Self> {
        Box::new(Self { name, vtype, constant, init, id: None, class: RegClass::Int, width: 1 })
    }
}

pub(crate) fn resolve_local_var_decl(mut e: Box<Expr>, ctx: &mut CompileContext<'_>) -> ResolveResult {
    let ExprKind::LocalVarDecl(mut d) = std::mem::replace(&mut e.kind, ExprKind::Nop) else {
        unreachable!()
    };

    let id = match ctx.locals.declare(d.name, d.vtype, e.span, d.constant) {
        Ok(id) => id,
        Err(_) => {
            let msg = format!(
                "'{}' is already declared in this block",
                ctx.names.resolve(d.name)
            );
            return Err(ctx.error(e.span, msg));
        }
    };
    d.id = Some(id);
    d.class = ctx.types.reg_class(d.vtype).unwrap_or(RegClass::Address);
    d.width = ctx.types.reg_width(d.vtype);

    if let Some(init) = d.init.take() {
        let init = init.resolve(ctx)?;
        d.init = Some(cast_to(init, d.vtype, ctx, false)?);
    }

    e.kind = ExprKind::LocalVarDecl(d);
    e.vtype = Some(builtin::VOID);
    e.need_result = false;
    Ok(e)
}

pub(crate) fn emit_local_var_decl(d: &LocalVarDecl, build: &mut FunctionBuilder) -> RegHandle {
    let id = d.id.expect("declaration resolved");
    let temp = build.acquire(d.class, d.width);
    let reg = RegHandle::fixed(temp.num, d.class, d.width);
    build.set_local_reg(id, reg);

    if let Some(init) = &d.init {
        let value = init.emit(build);
        build.move_to(&reg, &value);
        build.free(&value);
    }
    RegHandle::void()
}
