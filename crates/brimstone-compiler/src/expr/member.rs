//! Member and array access.
//!
//! A chain of plain field dereferences folds into one access node with an
//! accumulated byte offset, computed once at resolution time; field
//! descriptors themselves stay immutable. Array indexing with a constant
//! index folds into the same offset when the base is offset-foldable;
//! runtime indices are range-checked and scaled (a shift when the element
//! size is a power of two).

use brimstone_core::{FieldDef, FieldFlags, NameId, RegClass, Span, TypeId, TypeKind, Value, builtin};

use crate::bytecode::OpCode;
use crate::context::CompileContext;
use crate::emit::{FunctionBuilder, RegHandle};

use super::cast::cast_to_int;
use super::{Expr, ExprKind, ResolveResult, identifiers};

/// A (possibly folded) field access: base object plus cumulative offset.
#[derive(Debug)]
pub struct Member {
    pub obj: Box<Expr>,
    pub name: NameId,
    pub vtype: TypeId,
    pub offset: u32,
    pub writable: bool,
    pub addr_req: bool,
    pub(crate) load: Option<(OpCode, RegClass, u8)>,
}

impl Member {
    /// Unresolved access as the parser builds it.
    pub fn unresolved(obj: Box<Expr>, name: NameId) -> Box<Self> {
        Box::new(Self {
            obj,
            name,
            vtype: builtin::ERROR,
            offset: 0,
            writable: false,
            addr_req: false,
            load: None,
        })
    }
}

/// Array element access.
#[derive(Debug)]
pub struct ArrayAccess {
    pub base: Box<Expr>,
    pub index: Box<Expr>,
    pub elem: TypeId,
    pub count: u32,
    pub writable: bool,
    pub addr_req: bool,
    pub(crate) elem_size: u32,
    pub(crate) shift: Option<u16>,
    pub(crate) load: Option<(OpCode, RegClass, u8)>,
}

impl ArrayAccess {
    pub fn unresolved(base: Box<Expr>, index: Box<Expr>) -> Box<Self> {
        Box::new(Self {
            base,
            index,
            elem: builtin::ERROR,
            count: 0,
            writable: false,
            addr_req: false,
            elem_size: 0,
            shift: None,
            load: None,
        })
    }
}

/// Memory access opcodes for a value of type `t`: (load, store, register
/// class, width). `None` for aggregates, which are accessed by address.
pub(crate) fn mem_ops(
    types: &brimstone_core::TypeStore,
    t: TypeId,
) -> Option<(OpCode, OpCode, RegClass, u8)> {
    use OpCode::*;
    Some(match types.kind(t) {
        TypeKind::Bool => (Load8U, Store8, RegClass::Int, 1),
        TypeKind::Int { signed, bits: 8 } => {
            (if *signed { Load8 } else { Load8U }, Store8, RegClass::Int, 1)
        }
        TypeKind::Int { signed, bits: 16 } => {
            (if *signed { Load16 } else { Load16U }, Store16, RegClass::Int, 1)
        }
        TypeKind::Int { .. }
        | TypeKind::Name
        | TypeKind::Sound
        | TypeKind::Color
        | TypeKind::SpriteId
        | TypeKind::TextureId
        | TypeKind::StateLabel => (Load32, Store32, RegClass::Int, 1),
        TypeKind::Float { bits: 32 } => (LoadF32, StoreF32, RegClass::Float, 1),
        TypeKind::Float { .. } => (LoadF64, StoreF64, RegClass::Float, 1),
        TypeKind::String => (LoadS, StoreS, RegClass::String, 1),
        TypeKind::Pointer { .. } | TypeKind::ClassPtr { .. } => (LoadA, StoreA, RegClass::Address, 1),
        TypeKind::Vector2 => (LoadV2, StoreV2, RegClass::Float, 2),
        TypeKind::Vector3 => (LoadV3, StoreV3, RegClass::Float, 3),
        _ => return None,
    })
}

/// Build the access node for `field` on a resolved base object, folding
/// through foldable bases.
pub(crate) fn member_of(
    span: Span,
    obj: Box<Expr>,
    field: FieldDef,
    ctx: &mut CompileContext<'_>,
) -> ResolveResult {
    let base_readonly = matches!(
        ctx.types.kind(obj.ty()),
        TypeKind::Pointer { readonly: true, .. }
    );
    let writable = !field.flags.contains(FieldFlags::READONLY) && !base_readonly;
    fold_offset(span, obj, field.offset, field.vtype, field.name, writable, ctx)
}

/// Produce an access to `base + offset` of type `vtype`, collapsing into
/// the base when it is itself a plain field access or a global.
fn fold_offset(
    span: Span,
    base: Box<Expr>,
    offset: u32,
    vtype: TypeId,
    name: NameId,
    writable: bool,
    ctx: &mut CompileContext<'_>,
) -> ResolveResult {
    let mut base = base;
    match std::mem::replace(&mut base.kind, ExprKind::Nop) {
        // Member-of-member: one access with the summed offset.
        ExprKind::Member(inner) => {
            let writable = writable && inner.writable;
            return fold_offset(span, inner.obj, inner.offset + offset, vtype, name, writable, ctx);
        }
        // Member-of-global: just a global at a bigger address.
        ExprKind::GlobalRef(g) => {
            let mut flags = g.flags;
            if !writable {
                flags |= FieldFlags::READONLY;
            }
            return Ok(identifiers::global_ref(span, name, vtype, g.addr + offset, flags, ctx));
        }
        other => base.kind = other,
    }

    let load = mem_ops(ctx.types, vtype).map(|(l, _, c, w)| (l, c, w));
    let mut node = Expr::new(
        span,
        ExprKind::Member(Box::new(Member {
            obj: base,
            name,
            vtype,
            offset,
            writable,
            addr_req: false,
            load,
        })),
    );
    node.vtype = Some(vtype);
    node.resolved = true;
    Ok(node)
}

pub(crate) fn resolve_member(mut e: Box<Expr>, ctx: &mut CompileContext<'_>) -> ResolveResult {
    let ExprKind::Member(m) = std::mem::replace(&mut e.kind, ExprKind::Nop) else {
        unreachable!()
    };
    let obj = m.obj.resolve(ctx)?;
    let t = obj.ty();

    // Find the aggregate the access goes through.
    let record = match ctx.types.kind(t) {
        TypeKind::Pointer { pointed, .. } => *pointed,
        TypeKind::Struct(_) | TypeKind::Class(_) => t,
        _ => {
            let msg = format!("{} has no members", ctx.describe(t));
            return Err(ctx.error(e.span, msg));
        }
    };
    let Some(field) = ctx.types.find_field(record, m.name) else {
        let msg = format!(
            "unknown field '{}' in {}",
            ctx.names.resolve(m.name),
            ctx.describe(record)
        );
        return Err(ctx.error(e.span, msg));
    };
    let field = field.clone();
    if field.flags.contains(FieldFlags::DEPRECATED) {
        let msg = format!("field '{}' is deprecated", ctx.names.resolve(m.name));
        ctx.warn(e.span, msg);
    }
    member_of(e.span, obj, field, ctx)
}

pub(crate) fn resolve_array_access(mut e: Box<Expr>, ctx: &mut CompileContext<'_>) -> ResolveResult {
    let ExprKind::ArrayAccess(mut a) = std::mem::replace(&mut e.kind, ExprKind::Nop) else {
        unreachable!()
    };
    let base = a.base.resolve(ctx);
    let index = a.index.resolve(ctx);
    let (base, index) = (base?, index?);
    let index = cast_to_int(index, false, ctx)?;

    let TypeKind::Array { element, count } = ctx.types.kind(base.ty()) else {
        let msg = format!("{} is not an array", ctx.describe(base.ty()));
        return Err(ctx.error(e.span, msg));
    };
    let (element, count) = (*element, *count);
    let elem_size = ctx.types.size_of(element);
    let writable = match &base.kind {
        ExprKind::Member(m) => m.writable,
        ExprKind::GlobalRef(g) => !g.flags.contains(FieldFlags::READONLY),
        ExprKind::LocalRef(l) => !ctx.locals.decl(l.id).constant,
        _ => false,
    };

    // A constant index folds into an offset-adjusted access when the base
    // folds; out-of-range constants are a resolution error either way.
    if let Some(idx) = index.constant_value().and_then(Value::int_bits) {
        if idx < 0 || idx as u32 >= count {
            let msg = format!("array index {idx} out of bounds (size {count})");
            return Err(ctx.error(e.span, msg));
        }
        let name = match &base.kind {
            ExprKind::Member(m) => m.name,
            ExprKind::GlobalRef(g) => g.name,
            _ => NameId::NONE,
        };
        let offset = idx as u32 * elem_size;
        return fold_offset(e.span, base, offset, element, name, writable, ctx);
    }

    a.base = base;
    a.index = index;
    a.elem = element;
    a.count = count;
    a.elem_size = elem_size;
    a.writable = writable;
    a.shift = (elem_size.is_power_of_two()).then(|| elem_size.trailing_zeros() as u16);
    a.load = mem_ops(ctx.types, element).map(|(l, _, c, w)| (l, c, w));
    e.kind = ExprKind::ArrayAccess(a);
    e.vtype = Some(element);
    Ok(e)
}

// =============================================================================
// Emission
// =============================================================================

pub(crate) fn emit_member(m: &Member, build: &mut FunctionBuilder) -> RegHandle {
    let base = m.obj.emit(build);

    if m.addr_req || m.load.is_none() {
        if m.offset == 0 {
            return base;
        }
        let base = build.materialize(base);
        let offset = build.konst_int(m.offset as i32);
        let dst = build.acquire_target();
        build.emit(OpCode::AddrOffset, dst.num, base.num, offset.operand());
        build.free(&base);
        return dst;
    }

    let (load, class, width) = m.load.expect("scalar member access");
    let dst = build.acquire(class, width);
    build.emit(load, dst.num, base.operand(), m.offset as u16);
    build.free(&base);
    dst
}

pub(crate) fn emit_array_access(a: &ArrayAccess, build: &mut FunctionBuilder) -> RegHandle {
    let base = a.base.emit(build);
    let index = a.index.emit(build);
    let index = build.materialize(index);

    // Instructions abort execution when the index is out of range.
    build.emit_imm(OpCode::BoundCheck, index.num, 0, 0, a.count as i32);

    let scaled = build.acquire(RegClass::Int, 1);
    match a.shift {
        Some(0) => build.move_to(&scaled, &index),
        Some(shift) => {
            let shift = build.konst_int(i32::from(shift));
            build.emit(OpCode::ShlI, scaled.num, index.num, shift.operand());
        }
        None => {
            let size = build.konst_int(a.elem_size as i32);
            build.emit(OpCode::MulI, scaled.num, index.num, size.operand());
        }
    }
    build.free(&index);

    let base = build.materialize(base);
    let addr = build.acquire_target();
    build.emit(OpCode::AddrOffset, addr.num, base.num, scaled.num);
    build.free(&scaled);
    build.free(&base);

    if a.addr_req || a.load.is_none() {
        return addr;
    }
    let (load, class, width) = a.load.expect("scalar element access");
    let dst = build.acquire(class, width);
    build.emit(load, dst.num, addr.num, 0);
    build.free(&addr);
    dst
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::expr::testutil::Fixture;
    use brimstone_core::Symbol;

    /// Class with an int field, a struct field, and an int array.
    fn class_fixture(fixture: &mut Fixture) -> (TypeId, NameId, NameId, NameId, NameId) {
        let f_health = fixture.names.intern("health");
        let f_pos = fixture.names.intern("pos");
        let f_x = fixture.names.intern("x");
        let f_args = fixture.names.intern("args");

        let pos_struct = fixture.types.add_struct(
            fixture.names.intern("Coord"),
            vec![
                (f_x, builtin::FLOAT, FieldFlags::empty()),
                (fixture.names.intern("y"), builtin::FLOAT, FieldFlags::empty()),
            ],
        );
        let args_array = fixture.types.array_of(builtin::INT, 5);
        let class = fixture.types.add_class(
            fixture.names.intern("Actor"),
            None,
            vec![
                (f_health, builtin::INT, FieldFlags::empty()),
                (f_pos, pos_struct, FieldFlags::empty()),
                (f_args, args_array, FieldFlags::empty()),
            ],
        );
        (class, f_health, f_pos, f_x, f_args)
    }

    fn self_member(fixture: &mut Fixture, class: TypeId, name: NameId) -> Box<Expr> {
        let obj = Expr::new(Span::default(), ExprKind::SelfRef);
        let node = Expr::new(Span::default(), ExprKind::Member(Member::unresolved(obj, name)));
        let mut ctx = fixture.ctx();
        ctx.class = Some(class);
        node.resolve(&mut ctx).unwrap()
    }

    #[test]
    fn member_chain_folds_to_one_offset() {
        let mut fixture = Fixture::new();
        let (class, _, f_pos, f_x, _) = class_fixture(&mut fixture);

        // self.pos.x collapses into a single access at offset(pos)+offset(x).
        let obj = Expr::new(Span::default(), ExprKind::SelfRef);
        let pos = Expr::new(Span::default(), ExprKind::Member(Member::unresolved(obj, f_pos)));
        let x = Expr::new(Span::default(), ExprKind::Member(Member::unresolved(pos, f_x)));
        let mut ctx = fixture.ctx();
        ctx.class = Some(class);
        let node = x.resolve(&mut ctx).unwrap();

        let ExprKind::Member(m) = &node.kind else {
            panic!("expected a member access");
        };
        assert!(matches!(m.obj.kind, ExprKind::SelfRef));
        assert_eq!(m.offset, 4); // health:int(4) then pos.x at +0
        assert_eq!(node.ty(), builtin::FLOAT);
    }

    #[test]
    fn member_of_global_folds_into_global() {
        let mut fixture = Fixture::new();
        let f_x = fixture.names.intern("x");
        let coord = fixture.types.add_struct(
            fixture.names.intern("Coord"),
            vec![
                (f_x, builtin::FLOAT, FieldFlags::empty()),
                (fixture.names.intern("y"), builtin::FLOAT, FieldFlags::empty()),
            ],
        );
        let g = fixture.names.intern("origin");
        fixture.symbols.define(
            g,
            Symbol::Global { vtype: coord, addr: 0x100, flags: FieldFlags::empty() },
        );

        let base = Expr::new(Span::default(), ExprKind::Identifier(g));
        let node = Expr::new(Span::default(), ExprKind::Member(Member::unresolved(base, f_x)));
        let mut ctx = fixture.ctx();
        let node = node.resolve(&mut ctx).unwrap();

        let ExprKind::GlobalRef(g) = &node.kind else {
            panic!("expected a folded global");
        };
        assert_eq!(g.addr, 0x100);
        assert_eq!(node.ty(), builtin::FLOAT);
    }

    #[test]
    fn unknown_field_reports() {
        let mut fixture = Fixture::new();
        let (class, ..) = class_fixture(&mut fixture);
        let missing = fixture.names.intern("missing");
        let obj = Expr::new(Span::default(), ExprKind::SelfRef);
        let node = Expr::new(Span::default(), ExprKind::Member(Member::unresolved(obj, missing)));
        let mut ctx = fixture.ctx();
        ctx.class = Some(class);
        assert!(node.resolve(&mut ctx).is_err());
    }

    #[test]
    fn member_emits_single_load() {
        let mut fixture = Fixture::new();
        let (class, f_health, ..) = class_fixture(&mut fixture);
        let node = self_member(&mut fixture, class, f_health);

        let mut build = FunctionBuilder::new();
        let reg = node.emit(&mut build);
        build.free(&reg);
        let (chunk, _, _) = build.finish();
        chunk.assert_ops(&[OpCode::Load32]);
        assert_eq!(chunk.get(0).unwrap().c, 0);
    }

    #[test]
    fn constant_array_index_folds_to_offset() {
        let mut fixture = Fixture::new();
        let (class, _, _, _, f_args) = class_fixture(&mut fixture);

        let obj = Expr::new(Span::default(), ExprKind::SelfRef);
        let arr = Expr::new(Span::default(), ExprKind::Member(Member::unresolved(obj, f_args)));
        let idx = Expr::konst(Span::default(), builtin::INT, Value::Int(2));
        let node = Expr::new(
            Span::default(),
            ExprKind::ArrayAccess(ArrayAccess::unresolved(arr, idx)),
        );
        let mut ctx = fixture.ctx();
        ctx.class = Some(class);
        let node = node.resolve(&mut ctx).unwrap();

        let ExprKind::Member(m) = &node.kind else {
            panic!("expected a folded member access");
        };
        // args starts after health(4) + pos(16); element 2 adds 8.
        assert_eq!(m.offset, 4 + 16 + 8);
    }

    #[test]
    fn constant_index_out_of_bounds_is_an_error() {
        let mut fixture = Fixture::new();
        let (class, _, _, _, f_args) = class_fixture(&mut fixture);
        let obj = Expr::new(Span::default(), ExprKind::SelfRef);
        let arr = Expr::new(Span::default(), ExprKind::Member(Member::unresolved(obj, f_args)));
        let idx = Expr::konst(Span::default(), builtin::INT, Value::Int(5));
        let node = Expr::new(
            Span::default(),
            ExprKind::ArrayAccess(ArrayAccess::unresolved(arr, idx)),
        );
        let mut ctx = fixture.ctx();
        ctx.class = Some(class);
        assert!(node.resolve(&mut ctx).is_err());
    }

    #[test]
    fn runtime_index_bound_checks_and_shifts() {
        let mut fixture = Fixture::new();
        let (class, _, _, _, f_args) = class_fixture(&mut fixture);
        let obj = Expr::new(Span::default(), ExprKind::SelfRef);
        let arr = Expr::new(Span::default(), ExprKind::Member(Member::unresolved(obj, f_args)));
        // Runtime index: a resolved non-constant int node.
        let idx = {
            let mut n = Expr::new(
                Span::default(),
                ExprKind::BoolCast(Box::new(super::super::cast::Cast1 {
                    operand: Expr::konst(Span::default(), builtin::INT, Value::Int(1)),
                    op: Some(OpCode::BoolI),
                })),
            );
            n.vtype = Some(builtin::INT);
            n.resolved = true;
            n
        };
        let node = Expr::new(
            Span::default(),
            ExprKind::ArrayAccess(ArrayAccess::unresolved(arr, idx)),
        );
        let mut ctx = fixture.ctx();
        ctx.class = Some(class);
        let node = node.resolve(&mut ctx).unwrap();

        let mut build = FunctionBuilder::new();
        let reg = node.emit(&mut build);
        build.free(&reg);
        assert_eq!(build.total_in_use(), 0);
        let (chunk, _, _) = build.finish();
        // Element size 4: scale by shift, not multiply.
        chunk.assert_contains_ops(&[
            OpCode::BoundCheck,
            OpCode::ShlI,
            OpCode::AddrOffset,
            OpCode::Load32,
        ]);
    }
}
