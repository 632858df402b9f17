//! Cast nodes.
//!
//! Each target type gets a single-purpose node; the generic [`TypeCast`]
//! only dispatches to one of them at resolve time. Every concrete cast
//! folds itself away when its operand is already constant.

use brimstone_core::{NameId, PtrConst, RegClass, Span, TypeId, TypeKind, Value, builtin};

use crate::bytecode::{AddrConst, OpCode};
use crate::context::CompileContext;
use crate::conversion::pointer_compatible;
use crate::emit::{FunctionBuilder, RegHandle};

use super::{Expr, ExprKind, Failed, ResolveResult};

/// Shared payload for single-operand casts: the operand plus the
/// conversion opcode picked at resolve time (`None` = identity).
#[derive(Debug)]
pub struct Cast1 {
    pub operand: Box<Expr>,
    pub op: Option<OpCode>,
}

impl Cast1 {
    pub fn new(operand: Box<Expr>) -> Box<Self> {
        Box::new(Self { operand, op: None })
    }
}

/// Cast to signed or unsigned 32-bit integer.
#[derive(Debug)]
pub struct IntCast {
    pub operand: Box<Expr>,
    pub unsigned: bool,
    /// Explicit casts accept float operands without a dialect check.
    pub explicit: bool,
    pub op: Option<OpCode>,
}

/// Generic cast request: delegates to a concrete cast node.
#[derive(Debug)]
pub struct TypeCast {
    pub target: TypeId,
    pub explicit: bool,
    pub operand: Box<Expr>,
}

/// Cast to a class-descriptor pointer, by name or from another
/// class-descriptor value.
#[derive(Debug)]
pub struct ClassCast {
    pub target_class: TypeId,
    pub operand: Box<Expr>,
}

/// Runtime downcast; yields null instead of aborting when the object is
/// not of the target class.
#[derive(Debug)]
pub struct DynCast {
    pub target_class: TypeId,
    pub operand: Box<Expr>,
}

/// A state label resolved from a compile-time string: interned label
/// path, encoded by the host at jump time.
#[derive(Debug)]
pub struct NamedStateLabel {
    pub path: Vec<NameId>,
}

/// Runtime-computed state-index jump: packs a clamped offset and the
/// enclosing label symbol into one negative integer.
#[derive(Debug)]
pub struct StateByIndex {
    pub operand: Box<Expr>,
    pub label_sym: u32,
}

// =============================================================================
// Wrapping helpers used by other node families
// =============================================================================

/// Wrap a resolved node in a bool cast and resolve it.
pub(crate) fn cast_to_bool(operand: Box<Expr>, ctx: &mut CompileContext<'_>) -> ResolveResult {
    let span = operand.span;
    Expr::new(span, ExprKind::BoolCast(Cast1::new(operand))).resolve(ctx)
}

/// Wrap a resolved node in a float cast and resolve it.
pub(crate) fn cast_to_float(operand: Box<Expr>, ctx: &mut CompileContext<'_>) -> ResolveResult {
    let span = operand.span;
    Expr::new(span, ExprKind::FloatCast(Cast1::new(operand))).resolve(ctx)
}

/// Wrap a resolved node in an implicit int cast and resolve it.
pub(crate) fn cast_to_int(
    operand: Box<Expr>,
    unsigned: bool,
    ctx: &mut CompileContext<'_>,
) -> ResolveResult {
    let span = operand.span;
    let cast = IntCast { operand, unsigned, explicit: false, op: None };
    Expr::new(span, ExprKind::IntCast(Box::new(cast))).resolve(ctx)
}

/// Wrap a resolved node in a string cast and resolve it.
pub(crate) fn cast_to_string(operand: Box<Expr>, ctx: &mut CompileContext<'_>) -> ResolveResult {
    let span = operand.span;
    Expr::new(span, ExprKind::StringCast(Cast1::new(operand))).resolve(ctx)
}

/// Convert a resolved node to `target`, following the generic cast
/// resolution order. Identity is a pass-through; a null pointer constant
/// adopts any pointer target; numeric/bool/string/name/sound/color
/// targets delegate to their concrete casts; class-pointer and
/// state-label targets get their special handling; anything else is a
/// conversion error.
pub(crate) fn cast_to(
    value: Box<Expr>,
    target: TypeId,
    ctx: &mut CompileContext<'_>,
    explicit: bool,
) -> ResolveResult {
    let span = value.span;
    let from = value.ty();

    if from == target {
        return Ok(value);
    }
    if from == builtin::ERROR {
        // The operand already reported; do not spam.
        return Err(Failed);
    }

    // Null adopts any pointer-shaped target.
    if value.constant_value().is_some_and(Value::is_null_ptr)
        && matches!(
            ctx.types.kind(target),
            TypeKind::Pointer { .. } | TypeKind::ClassPtr { .. }
        )
    {
        return Ok(Expr::konst(span, target, Value::Ptr(PtrConst::Null)));
    }

    if target == builtin::FLOAT {
        return cast_to_float(value, ctx);
    }
    if target == builtin::INT || target == builtin::UINT {
        let cast = IntCast {
            operand: value,
            unsigned: target == builtin::UINT,
            explicit,
            op: None,
        };
        return Expr::new(span, ExprKind::IntCast(Box::new(cast))).resolve(ctx);
    }
    if target == builtin::BOOL {
        return cast_to_bool(value, ctx);
    }
    // Narrow storage types compute at full register width; the store
    // instruction truncates.
    if matches!(ctx.types.kind(target), TypeKind::Int { bits: 8 | 16, .. }) {
        let unsigned = ctx.types.is_unsigned(target);
        let mut value = if explicit {
            let cast = IntCast { operand: value, unsigned, explicit: true, op: None };
            Expr::new(span, ExprKind::IntCast(Box::new(cast))).resolve(ctx)?
        } else {
            cast_to_int(value, unsigned, ctx)?
        };
        value.vtype = Some(target);
        return Ok(value);
    }
    if target == builtin::FLOAT32 {
        let mut value = cast_to_float(value, ctx)?;
        value.vtype = Some(target);
        return Ok(value);
    }
    if target == builtin::STRING {
        return cast_to_string(value, ctx);
    }
    if target == builtin::NAME {
        return Expr::new(span, ExprKind::NameCast(Cast1::new(value))).resolve(ctx);
    }
    if target == builtin::SOUND {
        return Expr::new(span, ExprKind::SoundCast(Cast1::new(value))).resolve(ctx);
    }
    if target == builtin::COLOR {
        return Expr::new(span, ExprKind::ColorCast(Cast1::new(value))).resolve(ctx);
    }
    if let TypeKind::ClassPtr { class } = ctx.types.kind(target) {
        let cast = ClassCast { target_class: *class, operand: value };
        return Expr::new(span, ExprKind::ClassCast(Box::new(cast))).resolve(ctx);
    }
    if target == builtin::STATE_LABEL {
        return cast_to_state_label(value, ctx);
    }
    if let TypeKind::Pointer { .. } = ctx.types.kind(target) {
        if ctx.types.is_pointer(from) {
            if pointer_compatible(ctx.types, from, target, false) {
                let mut value = value;
                value.vtype = Some(target);
                return Ok(value);
            }
            // Downcast: explicit casts get the soft runtime check.
            if explicit
                && let Some(dest_class) = ctx.types.pointed_class(target)
                && ctx
                    .types
                    .pointed_class(from)
                    .is_some_and(|sc| ctx.types.descends_from(dest_class, sc))
            {
                let cast = DynCast { target_class: dest_class, operand: value };
                return Expr::new(span, ExprKind::DynCast(Box::new(cast))).resolve(ctx);
            }
        }
    }

    let msg = format!(
        "cannot convert {} to {}",
        ctx.describe(from),
        ctx.describe(target)
    );
    Err(ctx.error(span, msg))
}

/// State-label conversion: compile-time strings parse into a label path;
/// positive constant indices resolve against the enclosing state list;
/// non-constant indices defer to a runtime-encoded jump value.
fn cast_to_state_label(value: Box<Expr>, ctx: &mut CompileContext<'_>) -> ResolveResult {
    let span = value.span;
    let from = value.ty();

    if from == builtin::STRING || from == builtin::NAME {
        let Some(konst) = value.constant_value() else {
            return Err(ctx.error(span, "state label must be a compile-time string"));
        };
        let text = konst.to_text(ctx.names);
        let path: Vec<NameId> = text
            .split("::")
            .flat_map(|part| part.split('.'))
            .filter(|part| !part.is_empty())
            .map(|part| ctx.names.intern(part))
            .collect();
        if path.is_empty() {
            return Err(ctx.error(span, "empty state label"));
        }
        let label = NamedStateLabel { path };
        let mut node = Expr::new(span, ExprKind::NamedStateLabel(Box::new(label)));
        node.vtype = Some(builtin::STATE_LABEL);
        node.resolved = true;
        return Ok(node);
    }

    if ctx.types.is_integral(from) {
        let Some(states) = ctx.states else {
            return Err(ctx.error(span, "state jump by index outside a state list"));
        };
        if let Some(index) = value.constant_value().and_then(Value::int_bits) {
            if index <= 0 {
                return Err(ctx.error(span, "state index must be positive"));
            }
            if index as u32 > states.count {
                let msg = format!("state index {index} out of range");
                return Err(ctx.error(span, msg));
            }
            return Ok(Expr::konst(span, builtin::STATE_LABEL, Value::Int(index)));
        }
        let by_index = StateByIndex { operand: value, label_sym: states.label_sym };
        let mut node = Expr::new(span, ExprKind::StateByIndex(Box::new(by_index)));
        node.vtype = Some(builtin::STATE_LABEL);
        node.resolved = true;
        return Ok(node);
    }

    let msg = format!("cannot convert {} to a state label", ctx.describe(from));
    Err(ctx.error(span, msg))
}

// =============================================================================
// Resolution
// =============================================================================

fn take_cast1(e: &mut Expr) -> Box<Cast1> {
    match std::mem::replace(&mut e.kind, ExprKind::Nop) {
        ExprKind::BoolCast(c)
        | ExprKind::FloatCast(c)
        | ExprKind::NameCast(c)
        | ExprKind::StringCast(c)
        | ExprKind::ColorCast(c)
        | ExprKind::SoundCast(c)
        | ExprKind::MinusSign(c)
        | ExprKind::UnaryNot(c)
        | ExprKind::BoolNot(c) => c,
        _ => unreachable!("not a single-operand cast"),
    }
}

pub(crate) fn resolve_bool_cast(mut e: Box<Expr>, ctx: &mut CompileContext<'_>) -> ResolveResult {
    let mut c = take_cast1(&mut e);
    c.operand = c.operand.resolve(ctx)?;
    let t = c.operand.ty();

    if t == builtin::BOOL {
        return Ok(c.operand);
    }
    if let Some(v) = c.operand.constant_value() {
        return Ok(Expr::konst(e.span, builtin::BOOL, Value::Int(v.as_bool() as i32)));
    }
    if ctx.types.is_vector(t) {
        let msg = format!("cannot convert {} to bool", ctx.describe(t));
        return Err(ctx.error(e.span, msg));
    }
    c.op = match ctx.types.reg_class(t) {
        Some(RegClass::Int) => Some(OpCode::BoolI),
        Some(RegClass::Float) => Some(OpCode::BoolF),
        Some(RegClass::String) => Some(OpCode::BoolS),
        Some(RegClass::Address) => Some(OpCode::BoolA),
        None => {
            let msg = format!("cannot convert {} to bool", ctx.describe(t));
            return Err(ctx.error(e.span, msg));
        }
    };
    e.kind = ExprKind::BoolCast(c);
    e.vtype = Some(builtin::BOOL);
    Ok(e)
}

pub(crate) fn resolve_int_cast(mut e: Box<Expr>, ctx: &mut CompileContext<'_>) -> ResolveResult {
    let ExprKind::IntCast(mut c) = std::mem::replace(&mut e.kind, ExprKind::Nop) else {
        unreachable!()
    };
    c.operand = c.operand.resolve(ctx)?;
    let t = c.operand.ty();
    let target = if c.unsigned { builtin::UINT } else { builtin::INT };

    if ctx.types.is_integral(t) {
        if let Some(v) = c.operand.constant_value() {
            let bits = v.int_bits().unwrap_or(0);
            let value = if c.unsigned { Value::Uint(bits as u32) } else { Value::Int(bits) };
            return Ok(Expr::konst(e.span, target, value));
        }
        // Narrow integers are already widened in registers.
        let mut operand = c.operand;
        operand.vtype = Some(target);
        return Ok(operand);
    }

    if ctx.types.is_float(t) {
        if let Some(Value::Float(f)) = c.operand.constant_value() {
            let f = *f;
            let trunc = f.trunc();
            if trunc != f {
                let msg = format!("truncation of constant value {f}");
                ctx.warn(e.span, msg);
            }
            let value = if c.unsigned {
                Value::Uint(trunc as u32)
            } else {
                Value::Int(trunc as i32)
            };
            return Ok(Expr::konst(e.span, target, value));
        }
        if !c.explicit
            && let Some(failed) = ctx.opt_error(e.span, "integer type expected")
        {
            return Err(failed);
        }
        c.op = Some(if c.unsigned { OpCode::FloatToUint } else { OpCode::FloatToInt });
        e.kind = ExprKind::IntCast(c);
        e.vtype = Some(target);
        return Ok(e);
    }

    let msg = format!("cannot convert {} to an integer", ctx.describe(t));
    Err(ctx.error(e.span, msg))
}

pub(crate) fn resolve_float_cast(mut e: Box<Expr>, ctx: &mut CompileContext<'_>) -> ResolveResult {
    let mut c = take_cast1(&mut e);
    c.operand = c.operand.resolve(ctx)?;
    let t = c.operand.ty();

    if t == builtin::FLOAT {
        return Ok(c.operand);
    }
    if t == builtin::FLOAT32 {
        // Narrow float storage widens on load.
        let mut operand = c.operand;
        operand.vtype = Some(builtin::FLOAT);
        return Ok(operand);
    }
    if ctx.types.is_integral(t) {
        if let Some(v) = c.operand.constant_value() {
            let f = v.as_float().unwrap_or(0.0);
            return Ok(Expr::konst(e.span, builtin::FLOAT, Value::Float(f)));
        }
        c.op = Some(if ctx.types.is_unsigned(t) {
            OpCode::UintToFloat
        } else {
            OpCode::IntToFloat
        });
        e.kind = ExprKind::FloatCast(c);
        e.vtype = Some(builtin::FLOAT);
        return Ok(e);
    }

    let msg = format!("cannot convert {} to a float", ctx.describe(t));
    Err(ctx.error(e.span, msg))
}

pub(crate) fn resolve_name_cast(mut e: Box<Expr>, ctx: &mut CompileContext<'_>) -> ResolveResult {
    let mut c = take_cast1(&mut e);
    c.operand = c.operand.resolve(ctx)?;
    let t = c.operand.ty();

    if t == builtin::NAME {
        return Ok(c.operand);
    }
    if let Some(Value::Str(s)) = c.operand.constant_value() {
        let name = ctx.names.intern(&s.clone());
        return Ok(Expr::konst(e.span, builtin::NAME, Value::Name(name)));
    }
    if t == builtin::STRING {
        c.op = Some(OpCode::StrToName);
        e.kind = ExprKind::NameCast(c);
        e.vtype = Some(builtin::NAME);
        return Ok(e);
    }

    let msg = format!("cannot convert {} to a name", ctx.describe(t));
    Err(ctx.error(e.span, msg))
}

pub(crate) fn resolve_string_cast(mut e: Box<Expr>, ctx: &mut CompileContext<'_>) -> ResolveResult {
    let mut c = take_cast1(&mut e);
    c.operand = c.operand.resolve(ctx)?;
    let t = c.operand.ty();

    if t == builtin::STRING {
        return Ok(c.operand);
    }
    if let Some(Value::Name(n)) = c.operand.constant_value() {
        let text = ctx.names.resolve(*n).to_string();
        return Ok(Expr::konst(e.span, builtin::STRING, Value::Str(text)));
    }

    // Conversion instruction chosen by the operand's concrete type.
    c.op = Some(match ctx.types.kind(t) {
        TypeKind::Int { signed: false, .. } => OpCode::UintToStr,
        TypeKind::Bool | TypeKind::Int { .. } => OpCode::IntToStr,
        TypeKind::Float { .. } => OpCode::FloatToStr,
        TypeKind::Name => OpCode::NameToStr,
        TypeKind::Sound => OpCode::SoundToStr,
        TypeKind::Color => OpCode::ColorToStr,
        TypeKind::SpriteId => OpCode::SpriteToStr,
        TypeKind::TextureId => OpCode::TextureToStr,
        TypeKind::Vector2 => OpCode::V2ToStr,
        TypeKind::Vector3 => OpCode::V3ToStr,
        TypeKind::Pointer { .. } | TypeKind::ClassPtr { .. } => OpCode::PtrToStr,
        _ => {
            let msg = format!("cannot convert {} to a string", ctx.describe(t));
            return Err(ctx.error(e.span, msg));
        }
    });
    e.kind = ExprKind::StringCast(c);
    e.vtype = Some(builtin::STRING);
    Ok(e)
}

fn resolve_host_id_cast(
    mut e: Box<Expr>,
    target: TypeId,
    ctx: &mut CompileContext<'_>,
) -> ResolveResult {
    let mut c = take_cast1(&mut e);
    c.operand = c.operand.resolve(ctx)?;
    let t = c.operand.ty();

    if t == target {
        return Ok(c.operand);
    }
    // Sounds and colors are interned host ids; constant text coerces to
    // the id of its interned name, integers retag.
    if let Some(v) = c.operand.constant_value() {
        if matches!(v, Value::Str(_) | Value::Name(_)) {
            let id = ctx.names.intern(&v.to_text(ctx.names));
            return Ok(Expr::konst(e.span, target, Value::Int(id.0 as i32)));
        }
        if let Some(bits) = v.int_bits() {
            return Ok(Expr::konst(e.span, target, Value::Int(bits)));
        }
    }
    if ctx.types.is_integral(t) {
        let mut operand = c.operand;
        operand.vtype = Some(target);
        return Ok(operand);
    }

    let msg = format!("cannot convert {} to {}", ctx.describe(t), ctx.describe(target));
    Err(ctx.error(e.span, msg))
}

pub(crate) fn resolve_color_cast(e: Box<Expr>, ctx: &mut CompileContext<'_>) -> ResolveResult {
    resolve_host_id_cast(e, builtin::COLOR, ctx)
}

pub(crate) fn resolve_sound_cast(e: Box<Expr>, ctx: &mut CompileContext<'_>) -> ResolveResult {
    resolve_host_id_cast(e, builtin::SOUND, ctx)
}

pub(crate) fn resolve_type_cast(mut e: Box<Expr>, ctx: &mut CompileContext<'_>) -> ResolveResult {
    let ExprKind::TypeCast(c) = std::mem::replace(&mut e.kind, ExprKind::Nop) else {
        unreachable!()
    };
    let operand = c.operand.resolve(ctx)?;
    cast_to(operand, c.target, ctx, c.explicit)
}

pub(crate) fn resolve_class_cast(mut e: Box<Expr>, ctx: &mut CompileContext<'_>) -> ResolveResult {
    let ExprKind::ClassCast(c) = std::mem::replace(&mut e.kind, ExprKind::Nop) else {
        unreachable!()
    };
    let operand = c.operand.resolve(ctx)?;
    let t = operand.ty();
    let target_ptr = ctx.types.class_ptr_of(c.target_class);

    // Compile-time class name: resolve against the symbol table.
    if let Some(v) = operand.constant_value()
        && matches!(v, Value::Str(_) | Value::Name(_))
    {
        let name = ctx.names.intern(&v.to_text(ctx.names));
        let Some(brimstone_core::Symbol::Class(class)) = ctx.symbols.lookup(name) else {
            let msg = format!("unknown class name '{}'", ctx.names.resolve(name));
            return Err(ctx.error(e.span, msg));
        };
        let class = *class;
        if !ctx.types.descends_from(class, c.target_class) {
            let msg = format!(
                "class '{}' is not a descendant of '{}'",
                ctx.describe(class),
                ctx.describe(c.target_class)
            );
            return Err(ctx.error(e.span, msg));
        }
        return Ok(Expr::konst(e.span, target_ptr, Value::Ptr(PtrConst::Class(class))));
    }

    match ctx.types.kind(t) {
        TypeKind::ClassPtr { class } => {
            let class = *class;
            if ctx.types.descends_from(class, c.target_class) {
                let mut operand = operand;
                operand.vtype = Some(target_ptr);
                Ok(operand)
            } else if ctx.types.descends_from(c.target_class, class) {
                // Downcast: soft runtime check.
                let cast = DynCast { target_class: c.target_class, operand };
                Expr::new(e.span, ExprKind::DynCast(Box::new(cast))).resolve(ctx)
            } else {
                let msg = format!(
                    "class '{}' is unrelated to '{}'",
                    ctx.describe(class),
                    ctx.describe(c.target_class)
                );
                Err(ctx.error(e.span, msg))
            }
        }
        TypeKind::Name | TypeKind::String => {
            // Runtime class lookup by name.
            let Some(builtin_id) = ctx.builtins.lookup(crate::builtins::well_known::NAME_TO_CLASS)
            else {
                return Err(ctx.error(e.span, "class lookup helper not registered"));
            };
            let name_arg = super::cast::cast_to(operand, builtin::NAME, ctx, false)?;
            let marker = Expr::konst(
                e.span,
                target_ptr,
                Value::Ptr(PtrConst::Class(c.target_class)),
            );
            let call = super::calls::BuiltinCall {
                builtin: builtin_id,
                args: vec![name_arg, marker],
                ret: target_ptr,
            };
            let mut node = Expr::new(e.span, ExprKind::BuiltinCall(Box::new(call)));
            node.vtype = Some(target_ptr);
            node.resolved = true;
            Ok(node)
        }
        _ => {
            let msg = format!("cannot convert {} to a class", ctx.describe(t));
            Err(ctx.error(e.span, msg))
        }
    }
}

pub(crate) fn resolve_dyn_cast(mut e: Box<Expr>, ctx: &mut CompileContext<'_>) -> ResolveResult {
    let ExprKind::DynCast(mut c) = std::mem::replace(&mut e.kind, ExprKind::Nop) else {
        unreachable!()
    };
    c.operand = c.operand.resolve(ctx)?;
    let vtype = match ctx.types.kind(c.operand.ty()) {
        TypeKind::ClassPtr { .. } => ctx.types.class_ptr_of(c.target_class),
        _ => ctx.types.pointer_to(c.target_class, false),
    };
    e.kind = ExprKind::DynCast(c);
    e.vtype = Some(vtype);
    Ok(e)
}

pub(crate) fn resolve_named_state_label(
    mut e: Box<Expr>,
    _ctx: &mut CompileContext<'_>,
) -> ResolveResult {
    e.vtype = Some(builtin::STATE_LABEL);
    Ok(e)
}

pub(crate) fn resolve_state_by_index(
    mut e: Box<Expr>,
    ctx: &mut CompileContext<'_>,
) -> ResolveResult {
    // Built pre-resolved by the state-label conversion; a hand-built node
    // goes through the full conversion path instead.
    let ExprKind::StateByIndex(c) = std::mem::replace(&mut e.kind, ExprKind::Nop) else {
        unreachable!()
    };
    let operand = c.operand.resolve(ctx)?;
    cast_to_state_label(operand, ctx)
}

// =============================================================================
// Emission
// =============================================================================

fn emit_conversion(c: &Cast1, class: RegClass, build: &mut FunctionBuilder) -> RegHandle {
    let src = c.operand.emit(build);
    let Some(op) = c.op else {
        return src;
    };
    let src = build.materialize(src);
    let dst = build.acquire(class, 1);
    build.emit(op, dst.num, src.num, 0);
    build.free(&src);
    dst
}

pub(crate) fn emit_bool_cast(c: &Cast1, build: &mut FunctionBuilder) -> RegHandle {
    emit_conversion(c, RegClass::Int, build)
}

pub(crate) fn emit_int_cast(c: &IntCast, build: &mut FunctionBuilder) -> RegHandle {
    let src = c.operand.emit(build);
    let Some(op) = c.op else {
        return src;
    };
    let src = build.materialize(src);
    let dst = build.acquire(RegClass::Int, 1);
    build.emit(op, dst.num, src.num, 0);
    build.free(&src);
    dst
}

pub(crate) fn emit_float_cast(c: &Cast1, build: &mut FunctionBuilder) -> RegHandle {
    emit_conversion(c, RegClass::Float, build)
}

pub(crate) fn emit_name_cast(c: &Cast1, build: &mut FunctionBuilder) -> RegHandle {
    emit_conversion(c, RegClass::Int, build)
}

pub(crate) fn emit_string_cast(c: &Cast1, build: &mut FunctionBuilder) -> RegHandle {
    emit_conversion(c, RegClass::String, build)
}

/// Sound/color casts that survive resolution are register-identity.
pub(crate) fn emit_identity_cast(c: &Cast1, build: &mut FunctionBuilder) -> RegHandle {
    c.operand.emit(build)
}

pub(crate) fn emit_class_cast(_c: &ClassCast, _build: &mut FunctionBuilder) -> RegHandle {
    unreachable!("class cast rewrites itself during resolution")
}

pub(crate) fn emit_dyn_cast(c: &DynCast, build: &mut FunctionBuilder) -> RegHandle {
    let src = c.operand.emit(build);
    let src = build.materialize(src);
    let class = build.konst_addr(AddrConst::Class(c.target_class));
    let dst = build.acquire(RegClass::Address, 1);
    build.emit(OpCode::DynCast, dst.num, src.num, class.operand());
    build.free(&src);
    dst
}

pub(crate) fn emit_named_state_label(
    l: &NamedStateLabel,
    build: &mut FunctionBuilder,
) -> RegHandle {
    let path = build.konst_addr(AddrConst::StateLabel(l.path.clone()));
    let dst = build.acquire(RegClass::Int, 1);
    build.emit(OpCode::LoadLabel, dst.num, path.num, 0);
    dst
}

pub(crate) fn emit_state_by_index(c: &StateByIndex, build: &mut FunctionBuilder) -> RegHandle {
    let src = c.operand.emit(build);
    let dst = build.acquire(RegClass::Int, 1);

    // out = (clamp(index, 0, 32767) << 16) | label_sym | sign bit; the
    // sign bit distinguishes encoded jumps from plain state numbers.
    let zero = build.konst_int(0);
    build.emit(OpCode::MaxI, dst.num, src.operand(), zero.operand());
    build.free(&src);
    let limit = build.konst_int(32767);
    build.emit(OpCode::MinI, dst.num, dst.num, limit.operand());
    let shift = build.konst_int(16);
    build.emit(OpCode::ShlI, dst.num, dst.num, shift.operand());
    let marker = build.konst_int((c.label_sym | 0x8000_0000) as i32);
    build.emit(OpCode::OrI, dst.num, dst.num, marker.operand());
    dst
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::expr::testutil::Fixture;
    use brimstone_core::StateList;

    fn konst_int(v: i32) -> Box<Expr> {
        Expr::konst(Span::default(), builtin::INT, Value::Int(v))
    }

    fn konst_float(v: f64) -> Box<Expr> {
        Expr::konst(Span::default(), builtin::FLOAT, Value::Float(v))
    }

    fn konst_str(s: &str) -> Box<Expr> {
        Expr::konst(Span::default(), builtin::STRING, Value::Str(s.into()))
    }

    #[test]
    fn int_cast_truncates_toward_zero() {
        let mut fixture = Fixture::new();
        let mut ctx = fixture.ctx();
        let node = cast_to(konst_float(-2.75), builtin::INT, &mut ctx, true).unwrap();
        assert_eq!(node.constant_value(), Some(&Value::Int(-2)));
        // Non-integral constant warns.
        assert_eq!(fixture.sink.diagnostics().len(), 1);
    }

    #[test]
    fn integral_float_cast_does_not_warn() {
        let mut fixture = Fixture::new();
        let mut ctx = fixture.ctx();
        let node = cast_to(konst_float(4.0), builtin::INT, &mut ctx, true).unwrap();
        assert_eq!(node.constant_value(), Some(&Value::Int(4)));
        assert!(fixture.sink.diagnostics().is_empty());
    }

    /// A resolved, non-constant float-typed node.
    fn runtime_float() -> Box<Expr> {
        let mut node = Expr::new(
            Span::default(),
            ExprKind::FloatCast(Box::new(Cast1 {
                operand: konst_int(1),
                op: Some(OpCode::IntToFloat),
            })),
        );
        node.vtype = Some(builtin::FLOAT);
        node.resolved = true;
        node
    }

    #[test]
    fn implicit_float_to_int_is_strict_error_lax_warning() {
        let mut strict = Fixture::new();
        let mut ctx = strict.ctx();
        assert!(cast_to_int(runtime_float(), false, &mut ctx).is_err());
        assert!(strict.sink.has_errors());

        let mut lax = Fixture::lax();
        let mut ctx = lax.ctx();
        let node = cast_to_int(runtime_float(), false, &mut ctx).unwrap();
        assert_eq!(node.ty(), builtin::INT);
        assert!(!lax.sink.has_errors());
        assert_eq!(lax.sink.diagnostics().len(), 1);
    }

    #[test]
    fn bool_cast_folds_constants() {
        let mut fixture = Fixture::new();
        let mut ctx = fixture.ctx();
        let node = cast_to_bool(konst_int(7), &mut ctx).unwrap();
        assert_eq!(node.ty(), builtin::BOOL);
        assert_eq!(node.constant_value(), Some(&Value::Int(1)));
    }

    #[test]
    fn string_to_name_folds() {
        let mut fixture = Fixture::new();
        let mut ctx = fixture.ctx();
        let node = cast_to(konst_str("Spawn"), builtin::NAME, &mut ctx, false).unwrap();
        let Some(Value::Name(n)) = node.constant_value() else {
            panic!("expected name constant");
        };
        assert_eq!(fixture.names.resolve(*n), "Spawn");
    }

    #[test]
    fn identical_type_passes_through() {
        let mut fixture = Fixture::new();
        let mut ctx = fixture.ctx();
        let node = cast_to(konst_int(3), builtin::INT, &mut ctx, false).unwrap();
        assert_eq!(node.constant_value(), Some(&Value::Int(3)));
    }

    #[test]
    fn null_adopts_pointer_targets() {
        let mut fixture = Fixture::new();
        let actor = fixture.types.add_class(fixture.names.intern("Actor"), None, vec![]);
        let mut ctx = fixture.ctx();
        let ptr = ctx.types.pointer_to(actor, false);
        let null = Expr::konst(Span::default(), builtin::NULL_PTR, Value::Ptr(PtrConst::Null));
        let node = cast_to(null, ptr, &mut ctx, false).unwrap();
        assert_eq!(node.ty(), ptr);
    }

    #[test]
    fn unknown_conversion_reports() {
        let mut fixture = Fixture::new();
        let mut ctx = fixture.ctx();
        let node = cast_to(konst_str("x"), builtin::VEC2, &mut ctx, false);
        assert!(node.is_err());
        assert!(fixture.sink.has_errors());
    }

    #[test]
    fn constant_state_index_resolves_against_state_list() {
        let mut fixture = Fixture::new();
        let mut ctx = fixture.ctx();
        ctx.states = Some(StateList { count: 4, label_sym: 9 });
        let node = cast_to(konst_int(3), builtin::STATE_LABEL, &mut ctx, false).unwrap();
        assert_eq!(node.ty(), builtin::STATE_LABEL);
        assert_eq!(node.constant_value(), Some(&Value::Int(3)));

        assert!(cast_to(konst_int(9), builtin::STATE_LABEL, &mut ctx, false).is_err());
    }

    #[test]
    fn state_label_from_string_parses_path() {
        let mut fixture = Fixture::new();
        let mut ctx = fixture.ctx();
        let node = cast_to(konst_str("Super::Spawn.Fire"), builtin::STATE_LABEL, &mut ctx, false)
            .unwrap();
        let ExprKind::NamedStateLabel(label) = &node.kind else {
            panic!("expected a named state label");
        };
        assert_eq!(label.path.len(), 3);
    }

    #[test]
    fn runtime_state_index_encoding() {
        let mut fixture = Fixture::new();
        let mut ctx = fixture.ctx();
        ctx.states = Some(StateList { count: 4, label_sym: 2 });
        // A resolved, non-constant int-typed node.
        let idx = {
            let mut node = Expr::new(
                Span::default(),
                ExprKind::BoolCast(Box::new(Cast1 {
                    operand: konst_int(1),
                    op: Some(OpCode::BoolI),
                })),
            );
            node.vtype = Some(builtin::INT);
            node.resolved = true;
            node
        };
        let node = cast_to(idx, builtin::STATE_LABEL, &mut ctx, false).unwrap();

        let mut build = FunctionBuilder::new();
        let reg = node.emit(&mut build);
        build.free(&reg);
        let (chunk, consts, _) = build.finish();
        chunk.assert_contains_ops(&[
            OpCode::MaxI,
            OpCode::MinI,
            OpCode::ShlI,
            OpCode::OrI,
        ]);
        // The OR marker carries the label symbol and the sign bit.
        assert!(consts.ints().contains(&((2u32 | 0x8000_0000) as i32)));
    }
}
