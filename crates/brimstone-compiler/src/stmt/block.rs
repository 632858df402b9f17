//! Sequences and compound blocks.
//!
//! A sequence is a plain statement list; a compound block additionally
//! owns the locals declared inside it and releases their registers after
//! the whole block has emitted (not after each statement).

use brimstone_core::builtin;

use crate::context::CompileContext;
use crate::emit::{FunctionBuilder, RegHandle};
use crate::expr::{Expr, ExprKind, Failed, ResolveResult};
use crate::scope::LocalId;

/// A block with its own local scope.
#[derive(Debug)]
pub struct Compound {
    pub body: Vec<Box<Expr>>,
    /// Locals declared in this block, released after emission.
    pub(crate) locals: Vec<LocalId>,
}

impl Compound {
    pub fn new(body: Vec<Box<Expr>>) -> Box<Self> {
        Box::new(Self { body, locals: Vec::new() })
    }
}

/// Resolve a statement list, attempting every child so one pass surfaces
/// several diagnostics, but failing overall if any child failed.
pub(crate) fn resolve_statements(
    stmts: Vec<Box<Expr>>,
    ctx: &mut CompileContext<'_>,
) -> Result<Vec<Box<Expr>>, Failed> {
    let mut failed = false;
    let mut resolved = Vec::with_capacity(stmts.len());
    for mut stmt in stmts {
        stmt.need_result = false;
        match stmt.resolve(ctx) {
            Ok(stmt) => resolved.push(stmt),
            Err(Failed) => failed = true,
        }
    }
    if failed { Err(Failed) } else { Ok(resolved) }
}

pub(crate) fn resolve_sequence(mut e: Box<Expr>, ctx: &mut CompileContext<'_>) -> ResolveResult {
    let ExprKind::Sequence(stmts) = std::mem::replace(&mut e.kind, ExprKind::Nop) else {
        unreachable!()
    };
    let stmts = resolve_statements(stmts, ctx)?;
    e.kind = ExprKind::Sequence(stmts);
    e.vtype = Some(builtin::VOID);
    e.need_result = false;
    Ok(e)
}

pub(crate) fn resolve_compound(mut e: Box<Expr>, ctx: &mut CompileContext<'_>) -> ResolveResult {
    let ExprKind::Compound(mut c) = std::mem::replace(&mut e.kind, ExprKind::Nop) else {
        unreachable!()
    };
    ctx.locals.push_block();
    let result = resolve_statements(std::mem::take(&mut c.body), ctx);
    c.locals = ctx.locals.pop_block();
    c.body = result?;
    e.kind = ExprKind::Compound(c);
    e.vtype = Some(builtin::VOID);
    e.need_result = false;
    Ok(e)
}

/// Emit statements in order, discarding each child's result register.
pub(crate) fn emit_statements(stmts: &[Box<Expr>], build: &mut FunctionBuilder) {
    for stmt in stmts {
        let reg = stmt.emit(build);
        build.free(&reg);
    }
}

pub(crate) fn emit_sequence(stmts: &[Box<Expr>], build: &mut FunctionBuilder) -> RegHandle {
    emit_statements(stmts, build);
    RegHandle::void()
}

pub(crate) fn emit_compound(c: &Compound, build: &mut FunctionBuilder) -> RegHandle {
    emit_statements(&c.body, build);
    for &local in &c.locals {
        build.release_local(local);
    }
    RegHandle::void()
}
