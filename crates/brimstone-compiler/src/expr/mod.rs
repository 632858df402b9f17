//! The expression/statement node family.
//!
//! Every node in the typed AST is an [`Expr`]: a span, a resolved value
//! type, the resolved/need-result flags, and a variant payload. The same
//! objects are taken through two passes:
//!
//! - **resolve** consumes the node and returns either the node itself
//!   (typed and validated), a *different* node (constant folding, operand
//!   degeneration, delegation to a specialized cast), or the [`Failed`]
//!   marker after writing exactly one diagnostic for the immediate cause.
//! - **emit** walks the resolved tree immutably, allocates registers,
//!   emits instructions, and returns a handle describing where the result
//!   lives (a void handle for statements).
//!
//! Emission facts that would need the type store (load/store opcodes,
//! register classes) are precomputed during resolution and carried on the
//! node, so `emit` only needs the [`FunctionBuilder`].

pub mod assignment;
pub mod binary;
pub mod calls;
pub mod cast;
pub mod compare;
pub mod identifiers;
pub mod literals;
pub mod logical;
pub mod member;
pub mod ternary;
pub mod unary;

use brimstone_core::{NameId, Span, TypeId, Value, builtin};
use tracing::trace;

use crate::context::CompileContext;
use crate::emit::{FunctionBuilder, RegHandle};
use crate::stmt;

pub use crate::context::Failed;

pub use assignment::Assign;
pub use binary::{ArithOp, Binary, BitwiseOp, MulDivOp, ShiftOp};
pub use calls::{
    ATan2, BuiltinCall, CallArg, FlopCall, FunctionCall, MemberCall, MinMax, MinMaxOp, Random,
    Random2, RandomPick, TexBuiltin, TexOp, VMCall, VectorBuiltin, VectorOp,
};
pub use cast::{Cast1, ClassCast, DynCast, IntCast, NamedStateLabel, StateByIndex, TypeCast};
pub use compare::{Compare, EqOp, RelOp};
pub use identifiers::{CVarRead, GlobalRef, LocalRef};
pub use literals::VectorValue;
pub use logical::{Logical, LogicalOp};
pub use member::{ArrayAccess, Member};
pub use crate::stmt::{
    CaseLabel, Compound, ForStmt, IfStmt, JumpKind, LocalVarDecl, LoopStmt, ReturnStmt, SwitchStmt,
};
pub use ternary::Conditional;
pub use unary::{IncDec, IncDecOp, SizeAlign, SizeAlignOp};

/// Result of resolving a node: the (possibly different) node, or failure.
pub type ResolveResult = Result<Box<Expr>, Failed>;

/// Variant payload identifying a node's concrete kind.
#[derive(Debug)]
pub enum ExprKind {
    /// Resolved no-op; the residue of folded-away statements.
    Nop,
    /// A compile-time constant.
    Const(Value),
    VectorValue(Box<VectorValue>),

    // Casts
    BoolCast(Box<Cast1>),
    IntCast(Box<IntCast>),
    FloatCast(Box<Cast1>),
    NameCast(Box<Cast1>),
    StringCast(Box<Cast1>),
    ColorCast(Box<Cast1>),
    SoundCast(Box<Cast1>),
    /// Generic cast request; delegates to a concrete cast at resolve time.
    TypeCast(Box<TypeCast>),
    ClassCast(Box<ClassCast>),
    DynCast(Box<DynCast>),
    NamedStateLabel(Box<NamedStateLabel>),
    /// Runtime-computed state-index jump.
    StateByIndex(Box<StateByIndex>),

    // Unary
    MinusSign(Box<Cast1>),
    UnaryNot(Box<Cast1>),
    BoolNot(Box<Cast1>),
    Abs(Box<Cast1>),
    IncDec(Box<IncDec>),
    SizeAlign(Box<SizeAlign>),

    // Binary
    AddSub(Box<Binary<ArithOp>>),
    MulDiv(Box<Binary<MulDivOp>>),
    Pow(Box<Binary<()>>),
    Bitwise(Box<Binary<BitwiseOp>>),
    Shift(Box<Binary<ShiftOp>>),
    Concat(Box<Binary<()>>),
    CompareRel(Box<Compare<RelOp>>),
    CompareEq(Box<Compare<EqOp>>),
    ThreeWay(Box<Binary<()>>),
    Logical(Box<Logical>),
    Conditional(Box<Conditional>),

    // Identifiers and storage
    Identifier(NameId),
    LocalRef(Box<LocalRef>),
    SelfRef,
    ClassDefaults(Box<Expr>),
    GlobalRef(Box<GlobalRef>),
    CVarRead(Box<CVarRead>),
    Member(Box<Member>),
    ArrayAccess(Box<ArrayAccess>),
    Assign(Box<Assign>),

    // Calls
    FunctionCall(Box<FunctionCall>),
    MemberCall(Box<MemberCall>),
    VMCall(Box<VMCall>),
    BuiltinCall(Box<BuiltinCall>),
    Flop(Box<FlopCall>),
    ATan2(Box<ATan2>),
    MinMax(Box<MinMax>),
    Random(Box<Random>),
    RandomPick(Box<RandomPick>),
    Random2(Box<Random2>),
    VectorBuiltin(Box<VectorBuiltin>),
    TexBuiltin(Box<TexBuiltin>),
    /// Class descriptor of a live object (the GetClass builtin).
    ClassOf(Box<Expr>),

    // Statements
    Sequence(Vec<Box<Expr>>),
    Compound(Box<Compound>),
    LocalVarDecl(Box<LocalVarDecl>),
    If(Box<IfStmt>),
    While(Box<LoopStmt>),
    DoWhile(Box<LoopStmt>),
    For(Box<ForStmt>),
    Switch(Box<SwitchStmt>),
    CaseLabel(Box<CaseLabel>),
    Jump(JumpKind),
    Return(Box<ReturnStmt>),
}

/// One node of the typed AST.
#[derive(Debug)]
pub struct Expr {
    pub span: Span,
    /// Resolved value type; `None` until resolution.
    pub vtype: Option<TypeId>,
    pub resolved: bool,
    /// Cleared when a statement discards the node's value.
    pub need_result: bool,
    pub kind: ExprKind,
}

impl Expr {
    /// Fresh unresolved node.
    pub fn new(span: Span, kind: ExprKind) -> Box<Self> {
        Box::new(Self { span, vtype: None, resolved: false, need_result: true, kind })
    }

    /// Already-resolved constant node. The value tag must agree with the
    /// type's register class.
    pub fn konst(span: Span, vtype: TypeId, value: Value) -> Box<Self> {
        Box::new(Self {
            span,
            vtype: Some(vtype),
            resolved: true,
            need_result: true,
            kind: ExprKind::Const(value),
        })
    }

    /// Resolved no-op statement.
    pub fn nop(span: Span) -> Box<Self> {
        Box::new(Self {
            span,
            vtype: Some(builtin::VOID),
            resolved: true,
            need_result: false,
            kind: ExprKind::Nop,
        })
    }

    /// The resolved type. Only valid post-resolution.
    pub fn ty(&self) -> TypeId {
        self.vtype.unwrap_or(builtin::ERROR)
    }

    pub fn is_constant(&self) -> bool {
        matches!(self.kind, ExprKind::Const(_))
    }

    pub fn constant_value(&self) -> Option<&Value> {
        match &self.kind {
            ExprKind::Const(v) => Some(v),
            _ => None,
        }
    }

    // =========================================================================
    // Resolution
    // =========================================================================

    /// Resolve this node. Idempotent: an already-resolved node returns
    /// itself unchanged with no duplicate diagnostics.
    pub fn resolve(mut self: Box<Self>, ctx: &mut CompileContext<'_>) -> ResolveResult {
        if self.resolved {
            return Ok(self);
        }
        // Set before descending so a cyclic re-entry cannot recurse.
        self.resolved = true;
        trace!(span = %self.span, "resolve");

        match &self.kind {
            ExprKind::Nop | ExprKind::Const(_) => Ok(self),
            ExprKind::VectorValue(_) => literals::resolve_vector(self, ctx),

            ExprKind::BoolCast(_) => cast::resolve_bool_cast(self, ctx),
            ExprKind::IntCast(_) => cast::resolve_int_cast(self, ctx),
            ExprKind::FloatCast(_) => cast::resolve_float_cast(self, ctx),
            ExprKind::NameCast(_) => cast::resolve_name_cast(self, ctx),
            ExprKind::StringCast(_) => cast::resolve_string_cast(self, ctx),
            ExprKind::ColorCast(_) => cast::resolve_color_cast(self, ctx),
            ExprKind::SoundCast(_) => cast::resolve_sound_cast(self, ctx),
            ExprKind::TypeCast(_) => cast::resolve_type_cast(self, ctx),
            ExprKind::ClassCast(_) => cast::resolve_class_cast(self, ctx),
            ExprKind::DynCast(_) => cast::resolve_dyn_cast(self, ctx),
            ExprKind::NamedStateLabel(_) => cast::resolve_named_state_label(self, ctx),
            ExprKind::StateByIndex(_) => cast::resolve_state_by_index(self, ctx),

            ExprKind::MinusSign(_) => unary::resolve_minus(self, ctx),
            ExprKind::UnaryNot(_) => unary::resolve_unary_not(self, ctx),
            ExprKind::BoolNot(_) => unary::resolve_bool_not(self, ctx),
            ExprKind::Abs(_) => unary::resolve_abs(self, ctx),
            ExprKind::IncDec(_) => unary::resolve_inc_dec(self, ctx),
            ExprKind::SizeAlign(_) => unary::resolve_size_align(self, ctx),

            ExprKind::AddSub(_) => binary::resolve_add_sub(self, ctx),
            ExprKind::MulDiv(_) => binary::resolve_mul_div(self, ctx),
            ExprKind::Pow(_) => binary::resolve_pow(self, ctx),
            ExprKind::Bitwise(_) => binary::resolve_bitwise(self, ctx),
            ExprKind::Shift(_) => binary::resolve_shift(self, ctx),
            ExprKind::Concat(_) => binary::resolve_concat(self, ctx),
            ExprKind::CompareRel(_) => compare::resolve_rel(self, ctx),
            ExprKind::CompareEq(_) => compare::resolve_eq(self, ctx),
            ExprKind::ThreeWay(_) => compare::resolve_three_way(self, ctx),
            ExprKind::Logical(_) => logical::resolve_logical(self, ctx),
            ExprKind::Conditional(_) => ternary::resolve_conditional(self, ctx),

            ExprKind::Identifier(_) => identifiers::resolve_identifier(self, ctx),
            ExprKind::LocalRef(_) | ExprKind::GlobalRef(_) | ExprKind::CVarRead(_) => Ok(self),
            ExprKind::SelfRef => identifiers::resolve_self(self, ctx),
            ExprKind::ClassDefaults(_) => identifiers::resolve_class_defaults(self, ctx),
            ExprKind::Member(_) => member::resolve_member(self, ctx),
            ExprKind::ArrayAccess(_) => member::resolve_array_access(self, ctx),
            ExprKind::Assign(_) => assignment::resolve_assign(self, ctx),

            ExprKind::FunctionCall(_) => calls::resolve_function_call(self, ctx),
            ExprKind::MemberCall(_) => calls::resolve_member_call(self, ctx),
            ExprKind::VMCall(_) => calls::resolve_vm_call(self, ctx),
            ExprKind::BuiltinCall(_) => Ok(self),
            ExprKind::Flop(_) => calls::resolve_flop(self, ctx),
            ExprKind::ATan2(_) => calls::resolve_atan2(self, ctx),
            ExprKind::MinMax(_) => calls::resolve_min_max(self, ctx),
            ExprKind::Random(_) => calls::resolve_random(self, ctx),
            ExprKind::RandomPick(_) => calls::resolve_random_pick(self, ctx),
            ExprKind::Random2(_) => calls::resolve_random2(self, ctx),
            ExprKind::VectorBuiltin(_) => calls::resolve_vector_builtin(self, ctx),
            ExprKind::TexBuiltin(_) => calls::resolve_tex_builtin(self, ctx),
            ExprKind::ClassOf(_) => calls::resolve_class_of(self, ctx),

            ExprKind::Sequence(_) => stmt::resolve_sequence(self, ctx),
            ExprKind::Compound(_) => stmt::resolve_compound(self, ctx),
            ExprKind::LocalVarDecl(_) => stmt::resolve_local_var_decl(self, ctx),
            ExprKind::If(_) => stmt::resolve_if(self, ctx),
            ExprKind::While(_) => stmt::resolve_while(self, ctx),
            ExprKind::DoWhile(_) => stmt::resolve_do_while(self, ctx),
            ExprKind::For(_) => stmt::resolve_for(self, ctx),
            ExprKind::Switch(_) => stmt::resolve_switch(self, ctx),
            ExprKind::CaseLabel(_) => stmt::resolve_case_label(self, ctx),
            ExprKind::Jump(_) => stmt::resolve_jump(self, ctx),
            ExprKind::Return(_) => stmt::resolve_return(self, ctx),
        }
    }

    // =========================================================================
    // Emission
    // =========================================================================

    /// Emit this node's instructions. Valid only after a successful
    /// resolve of the whole tree.
    pub fn emit(&self, build: &mut FunctionBuilder) -> RegHandle {
        debug_assert!(self.resolved, "emit before resolve");
        build.set_span(self.span);

        match &self.kind {
            ExprKind::Nop => RegHandle::void(),
            ExprKind::Const(v) => literals::emit_constant(v, build),
            ExprKind::VectorValue(v) => literals::emit_vector(v, build),

            ExprKind::BoolCast(c) => cast::emit_bool_cast(c, build),
            ExprKind::IntCast(c) => cast::emit_int_cast(c, build),
            ExprKind::FloatCast(c) => cast::emit_float_cast(c, build),
            ExprKind::NameCast(c) => cast::emit_name_cast(c, build),
            ExprKind::StringCast(c) => cast::emit_string_cast(c, build),
            ExprKind::ColorCast(c) => cast::emit_identity_cast(c, build),
            ExprKind::SoundCast(c) => cast::emit_identity_cast(c, build),
            ExprKind::TypeCast(_) => unreachable!("generic cast survives resolution"),
            ExprKind::ClassCast(c) => cast::emit_class_cast(c, build),
            ExprKind::DynCast(c) => cast::emit_dyn_cast(c, build),
            ExprKind::NamedStateLabel(l) => cast::emit_named_state_label(l, build),
            ExprKind::StateByIndex(c) => cast::emit_state_by_index(c, build),

            ExprKind::MinusSign(u) => unary::emit_minus(u, build),
            ExprKind::UnaryNot(u) => unary::emit_unary_not(u, build),
            ExprKind::BoolNot(u) => unary::emit_bool_not(u, build),
            ExprKind::Abs(u) => unary::emit_abs(u, build),
            ExprKind::IncDec(u) => unary::emit_inc_dec(u, self.need_result, build),
            ExprKind::SizeAlign(_) => unreachable!("size query folds at resolve"),

            ExprKind::AddSub(b) => binary::emit_add_sub(b, build),
            ExprKind::MulDiv(b) => binary::emit_mul_div(b, build),
            ExprKind::Pow(b) => binary::emit_pow(b, build),
            ExprKind::Bitwise(b) => binary::emit_bitwise(b, build),
            ExprKind::Shift(b) => binary::emit_shift(b, build),
            ExprKind::Concat(b) => binary::emit_concat(b, build),
            ExprKind::CompareRel(c) => compare::emit_rel(c, build),
            ExprKind::CompareEq(c) => compare::emit_eq(c, build),
            ExprKind::ThreeWay(b) => compare::emit_three_way(b, build),
            ExprKind::Logical(l) => logical::emit_logical(l, build),
            ExprKind::Conditional(c) => ternary::emit_conditional(c, build),

            ExprKind::Identifier(_) => unreachable!("identifier survives resolution"),
            ExprKind::LocalRef(l) => identifiers::emit_local_ref(l, build),
            ExprKind::SelfRef => identifiers::emit_self_ref(build),
            ExprKind::ClassDefaults(obj) => identifiers::emit_class_defaults(obj, build),
            ExprKind::GlobalRef(g) => identifiers::emit_global_ref(g, build),
            ExprKind::CVarRead(c) => identifiers::emit_cvar_read(c, build),
            ExprKind::Member(m) => member::emit_member(m, build),
            ExprKind::ArrayAccess(a) => member::emit_array_access(a, build),
            ExprKind::Assign(a) => assignment::emit_assign(a, self.need_result, build),

            ExprKind::FunctionCall(_) | ExprKind::MemberCall(_) => {
                unreachable!("unresolved call survives resolution")
            }
            ExprKind::VMCall(c) => calls::emit_vm_call(c, false, build),
            ExprKind::BuiltinCall(c) => calls::emit_builtin_call(c, build),
            ExprKind::Flop(f) => calls::emit_flop(f, build),
            ExprKind::ATan2(a) => calls::emit_atan2(a, build),
            ExprKind::MinMax(m) => calls::emit_min_max(m, build),
            ExprKind::Random(r) => calls::emit_random(r, build),
            ExprKind::RandomPick(r) => calls::emit_random_pick(r, build),
            ExprKind::Random2(r) => calls::emit_random2(r, build),
            ExprKind::VectorBuiltin(v) => calls::emit_vector_builtin(v, build),
            ExprKind::TexBuiltin(t) => calls::emit_tex_builtin(t, build),
            ExprKind::ClassOf(obj) => calls::emit_class_of(obj, build),

            ExprKind::Sequence(stmts) => stmt::emit_sequence(stmts, build),
            ExprKind::Compound(c) => stmt::emit_compound(c, build),
            ExprKind::LocalVarDecl(d) => stmt::emit_local_var_decl(d, build),
            ExprKind::If(i) => stmt::emit_if(i, build),
            ExprKind::While(w) => stmt::emit_while(w, build),
            ExprKind::DoWhile(w) => stmt::emit_do_while(w, build),
            ExprKind::For(f) => stmt::emit_for(f, build),
            ExprKind::Switch(s) => stmt::emit_switch(s, build),
            ExprKind::CaseLabel(_) => RegHandle::void(),
            ExprKind::Jump(j) => stmt::emit_jump(*j, build),
            ExprKind::Return(r) => stmt::emit_return(r, build),
        }
    }

    // =========================================================================
    // Addressability
    // =========================================================================

    /// Ask whether this node denotes a location whose address can be
    /// taken. Returns `Some(writable)` when addressable; marks the node
    /// to emit an address. The default answer is "no".
    pub fn request_address(&mut self, ctx: &CompileContext<'_>) -> Option<bool> {
        match &mut self.kind {
            ExprKind::LocalRef(l) => {
                l.addr_req = true;
                Some(!ctx.locals.decl(l.id).constant)
            }
            ExprKind::GlobalRef(g) => {
                g.addr_req = true;
                Some(!g.flags.contains(brimstone_core::FieldFlags::READONLY))
            }
            ExprKind::Member(m) => {
                m.addr_req = true;
                Some(m.writable)
            }
            ExprKind::ArrayAccess(a) => {
                a.addr_req = true;
                Some(a.writable)
            }
            _ => None,
        }
    }

    // =========================================================================
    // Return shape
    // =========================================================================

    /// The return-type list this node contributes when used as the value
    /// of a return statement.
    pub fn return_types(&self) -> Vec<TypeId> {
        match &self.kind {
            ExprKind::VMCall(c) => c.rets.clone(),
            _ if self.ty() == builtin::VOID => vec![],
            _ => vec![self.ty()],
        }
    }

    /// True when control cannot flow past this statement (it returns on
    /// every path). Drives the if/else end-jump elision.
    pub fn ends_with_return(&self) -> bool {
        match &self.kind {
            ExprKind::Return(_) => true,
            ExprKind::Sequence(stmts) => {
                stmts.last().is_some_and(|s| s.ends_with_return())
            }
            ExprKind::Compound(c) => c.body.last().is_some_and(|s| s.ends_with_return()),
            ExprKind::If(i) => {
                i.when_true.as_ref().is_some_and(|t| t.ends_with_return())
                    && i.when_false.as_ref().is_some_and(|f| f.ends_with_return())
            }
            _ => false,
        }
    }
}

/// Resolve two sibling children, attempting both before failing so one
/// pass can report several diagnostics.
pub(crate) fn resolve_both(
    left: Box<Expr>,
    right: Box<Expr>,
    ctx: &mut CompileContext<'_>,
) -> Result<(Box<Expr>, Box<Expr>), Failed> {
    let left = left.resolve(ctx);
    let right = right.resolve(ctx);
    Ok((left?, right?))
}

#[cfg(test)]
pub(crate) mod testutil {
    //! Shared fixtures for the expression/statement tests.

    use brimstone_core::{
        DiagnosticSink, NameTable, SymbolTable, TypeStore,
    };

    use crate::builtins::BuiltinRegistry;
    use crate::context::{CompileContext, CompileOptions};

    /// Owns everything a `CompileContext` borrows.
    pub struct Fixture {
        pub names: NameTable,
        pub types: TypeStore,
        pub symbols: SymbolTable,
        pub builtins: BuiltinRegistry,
        pub sink: DiagnosticSink,
        pub options: CompileOptions,
    }

    impl Fixture {
        pub fn new() -> Self {
            let mut names = NameTable::new();
            let types = TypeStore::new(&mut names);
            Self {
                names,
                types,
                symbols: SymbolTable::new(),
                builtins: BuiltinRegistry::with_defaults(),
                sink: DiagnosticSink::new(),
                options: CompileOptions::default(),
            }
        }

        pub fn lax() -> Self {
            let mut fixture = Self::new();
            fixture.options.lax_dialect = true;
            fixture
        }

        pub fn ctx(&mut self) -> CompileContext<'_> {
            CompileContext::new(
                &mut self.types,
                &mut self.names,
                &self.symbols,
                &self.builtins,
                &mut self.sink,
                self.options,
            )
        }
    }
}
