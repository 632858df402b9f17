//! Short-circuit logical and/or.
//!
//! Chains of the same operator flatten into one n-ary list node instead of
//! a deep binary tree. Constant operands are eliminated unconditionally at
//! resolve time, matching the source semantics; the test suite documents
//! the discarded-side-effect assumption rather than changing it.

use brimstone_core::{RegClass, Value, builtin};

use crate::bytecode::OpCode;
use crate::context::CompileContext;
use crate::emit::{FunctionBuilder, RegHandle};

use super::cast::cast_to_bool;
use super::{Expr, ExprKind, Failed, ResolveResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogicalOp {
    And,
    Or,
}

/// Flattened n-ary logical chain.
#[derive(Debug)]
pub struct Logical {
    pub op: LogicalOp,
    pub list: Vec<Box<Expr>>,
}

impl Logical {
    pub fn new(op: LogicalOp, left: Box<Expr>, right: Box<Expr>) -> Box<Self> {
        Box::new(Self { op, list: vec![left, right] })
    }
}

pub(crate) fn resolve_logical(mut e: Box<Expr>, ctx: &mut CompileContext<'_>) -> ResolveResult {
    let ExprKind::Logical(mut l) = std::mem::replace(&mut e.kind, ExprKind::Nop) else {
        unreachable!()
    };

    // Flatten nested chains of the same operator into this node's list.
    let mut flat = Vec::with_capacity(l.list.len());
    let mut pending = std::mem::take(&mut l.list);
    pending.reverse();
    while let Some(mut node) = pending.pop() {
        match &mut node.kind {
            ExprKind::Logical(inner) if inner.op == l.op && !node.resolved => {
                for child in std::mem::take(&mut inner.list).into_iter().rev() {
                    pending.push(child);
                }
            }
            _ => flat.push(node),
        }
    }

    // Resolve every operand through a bool cast, attempting all of them
    // before giving up.
    let mut failed = false;
    let mut list = Vec::with_capacity(flat.len());
    for node in flat {
        match node.resolve(ctx).and_then(|n| cast_to_bool(n, ctx)) {
            Ok(node) => list.push(node),
            Err(Failed) => failed = true,
        }
    }
    if failed {
        return Err(Failed);
    }

    // Unconditional constant elimination: a decided operand folds the
    // whole chain, a neutral operand drops out.
    let (deciding, neutral) = match l.op {
        LogicalOp::And => (false, true),
        LogicalOp::Or => (true, false),
    };
    let mut kept = Vec::with_capacity(list.len());
    for node in list {
        match node.constant_value() {
            Some(v) if v.as_bool() == deciding => {
                return Ok(Expr::konst(e.span, builtin::BOOL, Value::Int(deciding as i32)));
            }
            Some(v) if v.as_bool() == neutral => {}
            _ => kept.push(node),
        }
    }
    match kept.len() {
        0 => return Ok(Expr::konst(e.span, builtin::BOOL, Value::Int(neutral as i32))),
        1 => return Ok(kept.into_iter().next().expect("one element")),
        _ => {}
    }

    l.list = kept;
    e.kind = ExprKind::Logical(l);
    e.vtype = Some(builtin::BOOL);
    Ok(e)
}

/// Test each operand in sequence, jumping to a shared decided-result path
/// as soon as one settles the chain.
pub(crate) fn emit_logical(l: &Logical, build: &mut FunctionBuilder) -> RegHandle {
    let (jump_op, decided, neutral) = match l.op {
        LogicalOp::And => (OpCode::JumpIfFalse, 0, 1),
        LogicalOp::Or => (OpCode::JumpIfTrue, 1, 0),
    };

    let mut decided_jumps = Vec::with_capacity(l.list.len());
    for node in &l.list {
        let r = node.emit(build);
        let r = build.materialize(r);
        decided_jumps.push(build.emit_jump(jump_op, r.num));
        build.free(&r);
    }

    let dst = build.acquire(RegClass::Int, 1);
    let neutral_k = build.konst_int(neutral);
    build.emit(OpCode::LoadKI, dst.num, neutral_k.num, 0);
    let done = build.emit_jump(OpCode::Jmp, 0);
    for jump in decided_jumps {
        build.patch(jump);
    }
    let decided_k = build.konst_int(decided);
    build.emit(OpCode::LoadKI, dst.num, decided_k.num, 0);
    build.patch(done);
    dst
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::expr::cast::Cast1;
    use crate::expr::testutil::Fixture;
    use brimstone_core::Span;

    fn konst_bool(v: bool) -> Box<Expr> {
        Expr::konst(Span::default(), builtin::BOOL, Value::Int(v as i32))
    }

    /// A resolved, non-constant bool-typed node.
    fn runtime_bool() -> Box<Expr> {
        let mut node = Expr::new(
            Span::default(),
            ExprKind::BoolCast(Box::new(Cast1 {
                operand: Expr::konst(Span::default(), builtin::INT, Value::Int(1)),
                op: Some(OpCode::BoolI),
            })),
        );
        node.vtype = Some(builtin::BOOL);
        node.resolved = true;
        node
    }

    fn logical(op: LogicalOp, l: Box<Expr>, r: Box<Expr>) -> Box<Expr> {
        Expr::new(Span::default(), ExprKind::Logical(Logical::new(op, l, r)))
    }

    #[test]
    fn and_false_folds_to_false() {
        let mut fixture = Fixture::new();
        let mut ctx = fixture.ctx();
        // The non-constant side is discarded entirely; this mirrors the
        // source's unconditional elimination even for operands that could
        // carry side effects.
        let node = logical(LogicalOp::And, runtime_bool(), konst_bool(false))
            .resolve(&mut ctx)
            .unwrap();
        assert_eq!(node.constant_value(), Some(&Value::Int(0)));

        let node = logical(LogicalOp::And, konst_bool(false), runtime_bool())
            .resolve(&mut ctx)
            .unwrap();
        assert_eq!(node.constant_value(), Some(&Value::Int(0)));
    }

    #[test]
    fn or_true_folds_to_true() {
        let mut fixture = Fixture::new();
        let mut ctx = fixture.ctx();
        let node = logical(LogicalOp::Or, runtime_bool(), konst_bool(true))
            .resolve(&mut ctx)
            .unwrap();
        assert_eq!(node.constant_value(), Some(&Value::Int(1)));
    }

    #[test]
    fn neutral_operand_drops_out() {
        let mut fixture = Fixture::new();
        let mut ctx = fixture.ctx();
        // true && x degenerates to x itself.
        let node = logical(LogicalOp::And, konst_bool(true), runtime_bool())
            .resolve(&mut ctx)
            .unwrap();
        assert!(!node.is_constant());
        assert!(matches!(node.kind, ExprKind::BoolCast(_)));
    }

    #[test]
    fn chains_flatten_into_one_list() {
        let mut fixture = Fixture::new();
        let mut ctx = fixture.ctx();
        let inner = logical(LogicalOp::And, runtime_bool(), runtime_bool());
        let node = logical(LogicalOp::And, inner, runtime_bool())
            .resolve(&mut ctx)
            .unwrap();
        let ExprKind::Logical(l) = &node.kind else {
            panic!("expected a logical chain");
        };
        assert_eq!(l.list.len(), 3);
    }

    #[test]
    fn emission_short_circuits() {
        let mut fixture = Fixture::new();
        let mut ctx = fixture.ctx();
        let node = logical(LogicalOp::And, runtime_bool(), runtime_bool())
            .resolve(&mut ctx)
            .unwrap();

        let mut build = FunctionBuilder::new();
        let reg = node.emit(&mut build);
        build.free(&reg);
        assert_eq!(build.total_in_use(), 0);
        let (chunk, _, _) = build.finish();
        chunk.assert_contains_ops(&[
            OpCode::JumpIfFalse,
            OpCode::JumpIfFalse,
            OpCode::LoadKI,
            OpCode::Jmp,
            OpCode::LoadKI,
        ]);
    }
}
