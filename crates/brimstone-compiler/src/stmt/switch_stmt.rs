//! Switch statements.
//!
//! The condition casts to integer unless it is already a name. Case
//! labels must be compile-time constants, are order-independent, and must
//! be unique. A constant condition reduces the whole switch at resolve
//! time to the statements between the matching case (or default) and the
//! next break; all other cases disappear from the tree.

use brimstone_core::{RegClass, Value, builtin};
use rustc_hash::FxHashSet;

use crate::bytecode::OpCode;
use crate::context::{CompileContext, FlowKind};
use crate::emit::{FunctionBuilder, JumpLabel, RegHandle};
use crate::expr::cast::cast_to_int;
use crate::expr::{Expr, ExprKind, Failed, ResolveResult};

use super::block::resolve_statements;

#[derive(Debug)]
pub struct SwitchStmt {
    pub cond: Box<Expr>,
    /// Case labels and statements, interleaved in source order.
    pub content: Vec<Box<Expr>>,
}

impl SwitchStmt {
    pub fn new(cond: Box<Expr>, content: Vec<Box<Expr>>) -> Box<Self> {
        Box::new(Self { cond, content })
    }
}

/// A case label; `None` is the default case.
#[derive(Debug)]
pub struct CaseLabel {
    pub value: Option<Box<Expr>>,
}

impl CaseLabel {
    pub fn case(value: Box<Expr>) -> Box<Self> {
        Box::new(Self { value: Some(value) })
    }

    pub fn default() -> Box<Self> {
        Box::new(Self { value: None })
    }
}

pub(crate) fn resolve_case_label(mut e: Box<Expr>, ctx: &mut CompileContext<'_>) -> ResolveResult {
    let ExprKind::CaseLabel(mut c) = std::mem::replace(&mut e.kind, ExprKind::Nop) else {
        unreachable!()
    };
    if let Some(value) = c.value.take() {
        let value = value.resolve(ctx)?;
        if !value.is_constant() {
            return Err(ctx.error(e.span, "case label is not a compile-time constant"));
        }
        c.value = Some(value);
    }
    e.kind = ExprKind::CaseLabel(c);
    e.vtype = Some(builtin::VOID);
    e.need_result = false;
    Ok(e)
}

/// Runtime comparison key of a case constant.
fn case_key(value: &Value) -> i32 {
    match value {
        Value::Name(n) => n.0 as i32,
        v => v.int_bits().unwrap_or(0),
    }
}

pub(crate) fn resolve_switch(mut e: Box<Expr>, ctx: &mut CompileContext<'_>) -> ResolveResult {
    let ExprKind::Switch(mut s) = std::mem::replace(&mut e.kind, ExprKind::Nop) else {
        unreachable!()
    };

    let cond = s.cond.resolve(ctx)?;
    let name_switch = cond.ty() == builtin::NAME;
    let cond = if name_switch { cond } else { cast_to_int(cond, false, ctx)? };

    ctx.flow.push(FlowKind::Switch);
    let content = resolve_statements(std::mem::take(&mut s.content), ctx);
    ctx.flow.pop();
    let content = content?;

    // Validate the labels: constant, type-matched, unique.
    let mut seen = FxHashSet::default();
    let mut have_default = false;
    for stmt in &content {
        let ExprKind::CaseLabel(label) = &stmt.kind else {
            continue;
        };
        let Some(value) = &label.value else {
            if have_default {
                return Err(ctx.error(stmt.span, "multiple default cases in switch"));
            }
            have_default = true;
            continue;
        };
        let konst = value.constant_value().expect("validated case constant");
        let is_name = matches!(konst, Value::Name(_));
        if is_name != name_switch {
            return Err(ctx.error(stmt.span, "case label type does not match switch condition"));
        }
        if !seen.insert(case_key(konst)) {
            let msg = format!("duplicate case value '{}'", konst.to_text(ctx.names));
            return Err(ctx.error(stmt.span, msg));
        }
    }

    // A constant condition reduces the switch to the matching slice.
    if let Some(v) = cond.constant_value() {
        let key = case_key(v);
        return Ok(fold_constant_switch(e.span, key, content));
    }

    s.cond = cond;
    s.content = content;
    e.kind = ExprKind::Switch(s);
    e.vtype = Some(builtin::VOID);
    e.need_result = false;
    Ok(e)
}

/// Keep exactly the statements between the matching case (or default)
/// label and the next top-level break.
fn fold_constant_switch(span: brimstone_core::Span, key: i32, content: Vec<Box<Expr>>) -> Box<Expr> {
    let find = |want_default: bool| {
        content.iter().position(|stmt| match &stmt.kind {
            ExprKind::CaseLabel(label) => match &label.value {
                None => want_default,
                Some(v) => {
                    !want_default
                        && v.constant_value().is_some_and(|konst| case_key(konst) == key)
                }
            },
            _ => false,
        })
    };
    let Some(start) = find(false).or_else(|| find(true)) else {
        return Expr::nop(span);
    };

    let mut stmts = Vec::new();
    for stmt in content.into_iter().skip(start + 1) {
        match &stmt.kind {
            // Further labels just mark fall-through points.
            ExprKind::CaseLabel(_) => {}
            ExprKind::Jump(super::JumpKind::Break) => break,
            _ => stmts.push(stmt),
        }
    }
    let mut node = Expr::new(span, ExprKind::Sequence(stmts));
    node.vtype = Some(builtin::VOID);
    node.resolved = true;
    node.need_result = false;
    node
}

pub(crate) fn emit_switch(s: &SwitchStmt, build: &mut FunctionBuilder) -> RegHandle {
    let cond = s.cond.emit(build);
    let cond = build.materialize(cond);
    build.enter_switch();

    // One test-and-jump per case value, in content order.
    let mut case_jumps: Vec<(usize, JumpLabel)> = Vec::new();
    let mut default_index = None;
    for (i, stmt) in s.content.iter().enumerate() {
        let ExprKind::CaseLabel(label) = &stmt.kind else {
            continue;
        };
        let Some(value) = &label.value else {
            default_index = Some(i);
            continue;
        };
        let key = case_key(value.constant_value().expect("constant case"));
        let jump = if (0..=i32::from(u16::MAX)).contains(&key) {
            // Small in-range values use the compact test.
            build.emit_jump_eq_imm(cond.num, key as u16)
        } else {
            let k = build.konst_int(key);
            let tmp = build.acquire(RegClass::Int, 1);
            build.emit(OpCode::EqI, tmp.num, cond.num, k.operand());
            let jump = build.emit_jump(OpCode::JumpIfTrue, tmp.num);
            build.free(&tmp);
            jump
        };
        case_jumps.push((i, jump));
    }
    build.free(&cond);

    // Fall through to the default case, or past the switch entirely.
    let default_jump = build.emit_jump(OpCode::Jmp, 0);
    let mut default_patched = false;

    for (i, stmt) in s.content.iter().enumerate() {
        if let ExprKind::CaseLabel(_) = &stmt.kind {
            for (case_i, jump) in &case_jumps {
                if *case_i == i {
                    build.patch(*jump);
                }
            }
            if default_index == Some(i) {
                build.patch(default_jump);
                default_patched = true;
            }
            continue;
        }
        let reg = stmt.emit(build);
        build.free(&reg);
    }

    let end = build.next_offset();
    if !default_patched {
        build.patch_to(default_jump, end);
    }
    build.exit_switch(end);
    RegHandle::void()
}
