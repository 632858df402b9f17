//! End-to-end compilation scenarios over the public API.
//!
//! These build small typed ASTs by hand (the parser is a separate
//! concern), resolve them, and check either the folded tree or the
//! emitted bytecode.

use brimstone::prelude::*;
use brimstone_compiler::bytecode::OpCode;
use brimstone_compiler::expr::{
    ArithOp, Binary, CallArg, Cast1, FunctionCall, MulDivOp,
};
use brimstone_compiler::stmt::{CaseLabel, Compound, JumpKind, LocalVarDecl, SwitchStmt};
use brimstone_core::{RegClass, builtin};

/// Owns everything the compile context borrows.
struct Host {
    names: NameTable,
    types: TypeStore,
    symbols: SymbolTable,
    builtins: BuiltinRegistry,
    sink: DiagnosticSink,
}

impl Host {
    fn new() -> Self {
        let mut names = NameTable::new();
        let types = TypeStore::new(&mut names);
        Self {
            names,
            types,
            symbols: SymbolTable::new(),
            builtins: BuiltinRegistry::with_defaults(),
            sink: DiagnosticSink::new(),
        }
    }

    fn ctx(&mut self) -> CompileContext<'_> {
        CompileContext::new(
            &mut self.types,
            &mut self.names,
            &self.symbols,
            &self.builtins,
            &mut self.sink,
            CompileOptions::default(),
        )
    }
}

fn konst_int(v: i32) -> Box<Expr> {
    Expr::konst(Span::default(), builtin::INT, Value::Int(v))
}

fn konst_str(s: &str) -> Box<Expr> {
    Expr::konst(Span::default(), builtin::STRING, Value::Str(s.into()))
}

/// A resolved non-constant int: the compiler cannot see through it.
fn opaque_int() -> Box<Expr> {
    let mut node = Expr::new(
        Span::default(),
        ExprKind::BoolCast(Box::new(Cast1 { operand: konst_int(1), op: Some(OpCode::BoolI) })),
    );
    node.vtype = Some(builtin::INT);
    node.resolved = true;
    node
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
fn scenario_a_constant_arithmetic_folds_to_fourteen() {
    // 2 + 3 * 4 resolves to the single constant 14.
    let mut host = Host::new();
    let mut ctx = host.ctx();
    let tree = add(konst_int(2), mul(konst_int(3), konst_int(4)));
    let node = tree.resolve(&mut ctx).unwrap();
    assert_eq!(node.constant_value(), Some(&Value::Int(14)));
}

#[test]
fn scenario_b_constant_concat_folds() {
    // "a" .. "b" resolves to the constant string "ab".
    let mut host = Host::new();
    let mut ctx = host.ctx();
    let tree = Expr::new(
        Span::default(),
        ExprKind::Concat(Binary::new((), konst_str("a"), konst_str("b"))),
    );
    let node = tree.resolve(&mut ctx).unwrap();
    assert_eq!(node.constant_value(), Some(&Value::Str("ab".into())));
}

#[test]
fn scenario_c_constant_switch_keeps_only_matching_case() {
    // switch (1) { 0: X; break; 1: Y; break; default: Z; break; } -> Y
    let mut host = Host::new();
    let mut ctx = host.ctx();
    let marker = |v| Expr::new(Span::default(), ExprKind::Sequence(vec![konst_int(v)]));
    let case = |v| Expr::new(Span::default(), ExprKind::CaseLabel(CaseLabel::case(konst_int(v))));
    let brk = || Expr::new(Span::default(), ExprKind::Jump(JumpKind::Break));
    let tree = Expr::new(
        Span::default(),
        ExprKind::Switch(SwitchStmt::new(
            konst_int(1),
            vec![
                case(0),
                marker(100),
                brk(),
                case(1),
                marker(200),
                brk(),
                Expr::new(Span::default(), ExprKind::CaseLabel(CaseLabel::default())),
                marker(300),
                brk(),
            ],
        )),
    );
    let node = tree.resolve(&mut ctx).unwrap();

    let ExprKind::Sequence(stmts) = &node.kind else {
        panic!("switch should fold to a plain sequence");
    };
    assert_eq!(stmts.len(), 1);
    let ExprKind::Sequence(inner) = &stmts[0].kind else {
        panic!("expected the selected statement");
    };
    assert_eq!(inner[0].constant_value(), Some(&Value::Int(200)));
}

#[test]
fn scenario_d_division_by_zero() {
    // 5 / 0 fails resolution with a diagnostic; 5 / x emits a divide.
    let mut host = Host::new();
    let mut ctx = host.ctx();
    assert!(div(konst_int(5), konst_int(0)).resolve(&mut ctx).is_err());
    assert!(host.sink.has_errors());

    let mut host = Host::new();
    let mut ctx = host.ctx();
    let node = div(konst_int(5), opaque_int()).resolve(&mut ctx).unwrap();
    assert!(!node.is_constant());

    let mut build = FunctionBuilder::new();
    let reg = node.emit(&mut build);
    build.free(&reg);
    let (chunk, _, _) = build.finish();
    chunk.assert_contains_ops(&[OpCode::DivI]);
    assert!(!host.sink.has_errors());
}

#[test]
fn register_pool_balances_across_a_full_function() {
    // Locals, arithmetic, a loop with break, and a call all lease and
    // return registers; the pools must be empty when the function ends.
    let mut host = Host::new();
    let x = host.names.intern("x");
    let mut ctx = host.ctx();

    let body = Expr::new(
        Span::default(),
        ExprKind::Compound(Compound::new(vec![
            Expr::new(
                Span::default(),
                ExprKind::LocalVarDecl(LocalVarDecl::new(
                    x,
                    builtin::INT,
                    false,
                    Some(add(opaque_int(), konst_int(3))),
                )),
            ),
            Expr::new(
                Span::default(),
                ExprKind::While(brimstone_compiler::stmt::LoopStmt::new(
                    Expr::konst(Span::default(), builtin::BOOL, Value::Int(1)),
                    Some(Expr::new(Span::default(), ExprKind::Jump(JumpKind::Break))),
                )),
            ),
        ])),
    );
    let compiled = compile_function(None, body, &mut ctx).unwrap();
    // finish() already asserts balance; spot-check the high-water marks.
    assert!(compiled.max_regs[RegClass::Int.index()] >= 1);
}

#[test]
fn resolve_is_idempotent_without_duplicate_diagnostics() {
    let mut host = Host::new();
    let mut ctx = host.ctx();
    let node = add(konst_int(1), konst_int(2)).resolve(&mut ctx).unwrap();
    let before = host.sink.diagnostics().len();
    let mut ctx = host.ctx();
    let node = node.resolve(&mut ctx).unwrap();
    assert_eq!(node.constant_value(), Some(&Value::Int(3)));
    assert_eq!(host.sink.diagnostics().len(), before);
}

#[test]
fn truncation_warning_only_for_non_integral_floats() {
    let mut host = Host::new();
    let name = host.names.intern("int");
    let call = move |v: f64| {
        Expr::new(
            Span::default(),
            ExprKind::FunctionCall(Box::new(FunctionCall {
                name,
                rng: None,
                args: vec![CallArg::positional(Expr::konst(
                    Span::default(),
                    builtin::FLOAT,
                    Value::Float(v),
                ))],
            })),
        )
    };

    let mut ctx = host.ctx();
    let node = call(4.0).resolve(&mut ctx).unwrap();
    assert_eq!(node.constant_value(), Some(&Value::Int(4)));
    assert_eq!(host.sink.diagnostics().len(), 0);

    let mut ctx = host.ctx();
    let node = call(4.5).resolve(&mut ctx).unwrap();
    assert_eq!(node.constant_value(), Some(&Value::Int(4)));
    assert_eq!(host.sink.diagnostics().len(), 1);
    assert_eq!(host.sink.diagnostics()[0].severity, Severity::Warning);
}

#[test]
fn short_circuit_folding_is_unconditional() {
    // The source drops the unevaluated operand even when it could carry
    // side effects (here: a call-shaped operand). This is a documented
    // assumption, not a guarantee worth "fixing" silently.
    use brimstone_compiler::expr::{Logical, LogicalOp};
    let mut host = Host::new();
    let mut ctx = host.ctx();

    let side_effecty = {
        let mut node = Expr::new(
            Span::default(),
            ExprKind::BoolCast(Box::new(Cast1 { operand: konst_int(1), op: Some(OpCode::BoolI) })),
        );
        node.vtype = Some(builtin::BOOL);
        node.resolved = true;
        node
    };
    let konst_false = Expr::konst(Span::default(), builtin::BOOL, Value::Int(0));
    let tree = Expr::new(
        Span::default(),
        ExprKind::Logical(Logical::new(LogicalOp::And, side_effecty, konst_false)),
    );
    let node = tree.resolve(&mut ctx).unwrap();
    assert_eq!(node.constant_value(), Some(&Value::Int(0)));
}
