//! The call family: script function calls, float intrinsics, line
//! specials, class casts by name, and the named builtins.
//!
//! A free-style call resolves, in order, against: a member function of
//! the enclosing class, the float intrinsic table, a line-special
//! pseudo-call, a class-cast-by-name, then the fixed set of named
//! builtins. A member-style call first recognizes value-type methods
//! (texture-id queries/mutators, vector Length/Unit) before real method
//! lookup.

use brimstone_core::{
    FuncDef, FuncFlags, NameId, ParamFlags, RegClass, Span, TypeId, TypeKind, Value, builtin,
};

use crate::builtins::{BuiltinId, well_known};
use crate::bytecode::{AddrConst, FlopOp, OpCode};
use crate::context::CompileContext;
use crate::emit::{FunctionBuilder, RegHandle};

use super::cast::{Cast1, cast_to, cast_to_float, cast_to_int};
use super::unary::require_writable;
use super::{Expr, ExprKind, Failed, ResolveResult};

/// One argument at a call site; named arguments reorder at resolve time.
#[derive(Debug)]
pub struct CallArg {
    pub name: Option<NameId>,
    pub value: Box<Expr>,
}

impl CallArg {
    pub fn positional(value: Box<Expr>) -> Self {
        Self { name: None, value }
    }

    pub fn named(name: NameId, value: Box<Expr>) -> Self {
        Self { name: Some(name), value }
    }
}

/// Free-style call, unresolved.
#[derive(Debug)]
pub struct FunctionCall {
    pub name: NameId,
    /// Named RNG stream for the random builtins.
    pub rng: Option<NameId>,
    pub args: Vec<CallArg>,
}

/// Member-style call, unresolved.
#[derive(Debug)]
pub struct MemberCall {
    pub obj: Box<Expr>,
    pub name: NameId,
    pub args: Vec<CallArg>,
}

/// A resolved call to a registered script/native function.
#[derive(Debug)]
pub struct VMCall {
    pub func: brimstone_core::FuncId,
    pub selfexpr: Option<Box<Expr>>,
    pub args: Vec<Box<Expr>>,
    pub rets: Vec<TypeId>,
    pub(crate) arg_classes: Vec<(RegClass, u8)>,
    pub(crate) implicit_self: bool,
    pub(crate) forward_action: bool,
    pub(crate) action_nulls: bool,
    pub(crate) virtual_call: bool,
    /// Zero-argument non-virtual calls may be used as direct function
    /// pointers by the host.
    pub direct: bool,
    pub(crate) ret_class: Option<(RegClass, u8)>,
}

/// A call to a pre-registered native helper.
#[derive(Debug)]
pub struct BuiltinCall {
    pub builtin: BuiltinId,
    pub args: Vec<Box<Expr>>,
    pub ret: TypeId,
}

/// Single-operand float intrinsic.
#[derive(Debug)]
pub struct FlopCall {
    pub op: FlopOp,
    pub operand: Box<Expr>,
}

/// `atan2(y, x)` in degrees; with `x` absent, `y` is a vector and the
/// angle comes from its components (the VectorAngle builtin).
#[derive(Debug)]
pub struct ATan2 {
    pub y: Box<Expr>,
    pub x: Option<Box<Expr>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MinMaxOp {
    Min,
    Max,
}

/// N-ary min/max with partial constant folding.
#[derive(Debug)]
pub struct MinMax {
    pub op: MinMaxOp,
    pub list: Vec<Box<Expr>>,
    pub(crate) emit_op: Option<OpCode>,
    pub(crate) class: RegClass,
}

/// `Random[stream](min, max)` / `FRandom[stream](min, max)`.
#[derive(Debug)]
pub struct Random {
    pub rng: Option<NameId>,
    pub min: Option<Box<Expr>>,
    pub max: Option<Box<Expr>>,
    pub float: bool,
    pub(crate) helper: BuiltinId,
}

/// `RandomPick[stream](a, b, ...)` selects one operand at runtime.
#[derive(Debug)]
pub struct RandomPick {
    pub rng: Option<NameId>,
    pub choices: Vec<Box<Expr>>,
    pub float: bool,
    pub(crate) helper: BuiltinId,
}

/// `Random2[stream](mask)`.
#[derive(Debug)]
pub struct Random2 {
    pub rng: Option<NameId>,
    pub mask: Option<Box<Expr>>,
    pub(crate) helper: BuiltinId,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VectorOp {
    Length,
    Unit,
}

/// Vector value-type methods.
#[derive(Debug)]
pub struct VectorBuiltin {
    pub op: VectorOp,
    pub vec: Box<Expr>,
    pub(crate) wide: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TexOp {
    IsValid,
    IsNull,
    SetInvalid,
    SetNull,
}

/// Texture-id value-type methods. The mutators need a writable location.
#[derive(Debug)]
pub struct TexBuiltin {
    pub op: TexOp,
    pub obj: Box<Expr>,
    pub(crate) local: bool,
}

const FLOPS: &[(&str, FlopOp)] = &[
    ("exp", FlopOp::Exp),
    ("log", FlopOp::Log),
    ("log10", FlopOp::Log10),
    ("sqrt", FlopOp::Sqrt),
    ("ceil", FlopOp::Ceil),
    ("floor", FlopOp::Floor),
    ("round", FlopOp::Round),
    ("acos", FlopOp::ACos),
    ("asin", FlopOp::ASin),
    ("atan", FlopOp::ATan),
    ("cos", FlopOp::Cos),
    ("sin", FlopOp::Sin),
    ("tan", FlopOp::Tan),
    ("cosh", FlopOp::CosH),
    ("sinh", FlopOp::SinH),
    ("tanh", FlopOp::TanH),
];

// =============================================================================
// Free-style call resolution
// =============================================================================

pub(crate) fn resolve_function_call(mut e: Box<Expr>, ctx: &mut CompileContext<'_>) -> ResolveResult {
    let ExprKind::FunctionCall(call) = std::mem::replace(&mut e.kind, ExprKind::Nop) else {
        unreachable!()
    };
    let span = e.span;
    let FunctionCall { name, rng, args } = *call;
    let text = ctx.names.resolve(name).to_ascii_lowercase();

    // A real member function of the enclosing class wins.
    if let Some(class) = ctx.class
        && let Some(func) = ctx.symbols.find_method(ctx.types, class, name)
    {
        return resolve_call_to(span, func, None, args, ctx);
    }

    // Float intrinsics.
    if let Some(&(_, op)) = FLOPS.iter().find(|(n, _)| *n == text) {
        let [arg] = try_arity::<1>(span, args, &text, ctx)?;
        let operand = cast_to_float(arg.resolve(ctx)?, ctx)?;
        if let Some(Value::Float(v)) = operand.constant_value() {
            return Ok(Expr::konst(span, builtin::FLOAT, Value::Float(fold_flop(op, *v))));
        }
        let mut node = Expr::new(span, ExprKind::Flop(Box::new(FlopCall { op, operand })));
        node.vtype = Some(builtin::FLOAT);
        node.resolved = true;
        return Ok(node);
    }

    // Line-special pseudo-call.
    if let Some(brimstone_core::Symbol::LineSpecial(special)) = ctx.symbols.lookup(name) {
        let special = *special;
        let Some(helper) = ctx.builtins.lookup(well_known::CALL_LINE_SPECIAL) else {
            return Err(ctx.error(span, "line-special helper not registered"));
        };
        let mut resolved = vec![Expr::konst(span, builtin::INT, Value::Int(special))];
        for arg in args {
            let value = cast_to_int(arg.value.resolve(ctx)?, false, ctx)?;
            resolved.push(value);
        }
        let call = BuiltinCall { builtin: helper, args: resolved, ret: builtin::INT };
        let mut node = Expr::new(span, ExprKind::BuiltinCall(Box::new(call)));
        node.vtype = Some(builtin::INT);
        node.resolved = true;
        return Ok(node);
    }

    // Class-cast-by-name: `ClassName(expr)` is a dynamic cast.
    if let Some(brimstone_core::Symbol::Class(class)) = ctx.symbols.lookup(name) {
        let target = ctx.types.pointer_to(*class, false);
        let [arg] = try_arity::<1>(span, args, &text, ctx)?;
        return cast_to(arg.resolve(ctx)?, target, ctx, true);
    }

    // Conversion constructors.
    let conversion_target = match text.as_str() {
        "bool" => Some(builtin::BOOL),
        "int" => Some(builtin::INT),
        "uint" => Some(builtin::UINT),
        "double" | "float" => Some(builtin::FLOAT),
        "name" => Some(builtin::NAME),
        "string" => Some(builtin::STRING),
        "color" => Some(builtin::COLOR),
        "sound" => Some(builtin::SOUND),
        "statelabel" => Some(builtin::STATE_LABEL),
        _ => None,
    };
    if let Some(target) = conversion_target {
        let [arg] = try_arity::<1>(span, args, &text, ctx)?;
        return cast_to(arg.resolve(ctx)?, target, ctx, true);
    }

    match text.as_str() {
        "getclass" => {
            if !args.is_empty() {
                return Err(ctx.error(span, "GetClass takes no arguments"));
            }
            let obj = Expr::new(span, ExprKind::SelfRef).resolve(ctx)?;
            Expr::new(span, ExprKind::ClassOf(obj)).resolve(ctx)
        }
        "getdefaults" => {
            if !args.is_empty() {
                return Err(ctx.error(span, "GetDefaults takes no arguments"));
            }
            let obj = Expr::new(span, ExprKind::SelfRef);
            Expr::new(span, ExprKind::ClassDefaults(obj)).resolve(ctx)
        }
        "getdefaultbytype" => {
            let [arg] = try_arity::<1>(span, args, &text, ctx)?;
            let arg = arg.resolve(ctx)?;
            let TypeKind::ClassPtr { class } = ctx.types.kind(arg.ty()) else {
                let msg = format!("class expected, got {}", ctx.describe(arg.ty()));
                return Err(ctx.error(span, msg));
            };
            let class = *class;
            let Some(helper) = ctx.builtins.lookup(well_known::GET_DEFAULT) else {
                return Err(ctx.error(span, "defaults helper not registered"));
            };
            let ret = ctx.types.pointer_to(class, true);
            let call = BuiltinCall { builtin: helper, args: vec![arg], ret };
            let mut node = Expr::new(span, ExprKind::BuiltinCall(Box::new(call)));
            node.vtype = Some(ret);
            node.resolved = true;
            Ok(node)
        }
        "random" | "frandom" => {
            let float = text.as_str() == "frandom";
            let helper_name = if float { well_known::FRANDOM } else { well_known::RANDOM };
            let Some(helper) = ctx.builtins.lookup(helper_name) else {
                return Err(ctx.error(span, "random helper not registered"));
            };
            let (min, max) = match args.len() {
                0 => (None, None),
                2 => {
                    let mut it = args.into_iter();
                    let min = it.next().expect("two args").value.resolve(ctx)?;
                    let max = it.next().expect("two args").value.resolve(ctx)?;
                    let (min, max) = if float {
                        (cast_to_float(min, ctx)?, cast_to_float(max, ctx)?)
                    } else {
                        (cast_to_int(min, false, ctx)?, cast_to_int(max, false, ctx)?)
                    };
                    (Some(min), Some(max))
                }
                n => {
                    let msg = format!("random expects 0 or 2 arguments, got {n}");
                    return Err(ctx.error(span, msg));
                }
            };
            let vtype = if float { builtin::FLOAT } else { builtin::INT };
            let random = Random { rng, min, max, float, helper };
            let mut node = Expr::new(span, ExprKind::Random(Box::new(random)));
            node.vtype = Some(vtype);
            node.resolved = true;
            Ok(node)
        }
        "randompick" | "frandompick" => {
            let float = text.as_str() == "frandompick";
            let Some(helper) = ctx.builtins.lookup(well_known::RANDOM) else {
                return Err(ctx.error(span, "random helper not registered"));
            };
            if args.is_empty() {
                return Err(ctx.error(span, "RandomPick needs at least one choice"));
            }
            let mut choices = Vec::with_capacity(args.len());
            for arg in args {
                let value = arg.value.resolve(ctx)?;
                choices.push(if float {
                    cast_to_float(value, ctx)?
                } else {
                    cast_to_int(value, false, ctx)?
                });
            }
            let vtype = if float { builtin::FLOAT } else { builtin::INT };
            let pick = RandomPick { rng, choices, float, helper };
            let mut node = Expr::new(span, ExprKind::RandomPick(Box::new(pick)));
            node.vtype = Some(vtype);
            node.resolved = true;
            Ok(node)
        }
        "random2" => {
            let Some(helper) = ctx.builtins.lookup(well_known::RANDOM2) else {
                return Err(ctx.error(span, "random helper not registered"));
            };
            let mask = match args.len() {
                0 => None,
                1 => {
                    let mut it = args.into_iter();
                    Some(cast_to_int(it.next().expect("one arg").value.resolve(ctx)?, false, ctx)?)
                }
                n => {
                    let msg = format!("random2 expects 0 or 1 arguments, got {n}");
                    return Err(ctx.error(span, msg));
                }
            };
            let mut node = Expr::new(
                span,
                ExprKind::Random2(Box::new(Random2 { rng, mask, helper })),
            );
            node.vtype = Some(builtin::INT);
            node.resolved = true;
            Ok(node)
        }
        "min" | "max" => {
            let op = if text.as_str() == "min" { MinMaxOp::Min } else { MinMaxOp::Max };
            if args.len() < 2 {
                return Err(ctx.error(span, "min/max need at least two arguments"));
            }
            let list = args.into_iter().map(|a| a.value).collect();
            resolve_min_max_list(span, op, list, ctx)
        }
        "clamp" => {
            // clamp(x, lo, hi) = min(max(x, lo), hi)
            let [x, lo, hi] = try_arity::<3>(span, args, &text, ctx)?;
            let inner = resolve_min_max_list(span, MinMaxOp::Max, vec![x, lo], ctx)?;
            resolve_min_max_list(span, MinMaxOp::Min, vec![inner, hi], ctx)
        }
        "abs" => {
            let [arg] = try_arity::<1>(span, args, &text, ctx)?;
            Expr::new(span, ExprKind::Abs(Cast1::new(arg))).resolve(ctx)
        }
        "atan2" | "vectorangle" => {
            if text.as_str() == "atan2" {
                let [y, x] = try_arity::<2>(span, args, &text, ctx)?;
                let y = cast_to_float(y.resolve(ctx)?, ctx)?;
                let x = cast_to_float(x.resolve(ctx)?, ctx)?;
                if let (Some(Value::Float(a)), Some(Value::Float(b))) =
                    (y.constant_value(), x.constant_value())
                {
                    let degrees = a.atan2(*b).to_degrees();
                    return Ok(Expr::konst(span, builtin::FLOAT, Value::Float(degrees)));
                }
                let mut node = Expr::new(span, ExprKind::ATan2(Box::new(ATan2 { y, x: Some(x) })));
                node.vtype = Some(builtin::FLOAT);
                node.resolved = true;
                Ok(node)
            } else {
                let [v] = try_arity::<1>(span, args, &text, ctx)?;
                let v = v.resolve(ctx)?;
                if !ctx.types.is_vector(v.ty()) {
                    let msg = format!("vector expected, got {}", ctx.describe(v.ty()));
                    return Err(ctx.error(span, msg));
                }
                let mut node = Expr::new(span, ExprKind::ATan2(Box::new(ATan2 { y: v, x: None })));
                node.vtype = Some(builtin::FLOAT);
                node.resolved = true;
                Ok(node)
            }
        }
        _ => {
            let msg = format!("unknown function '{}'", ctx.names.resolve(name));
            Err(ctx.error(span, msg))
        }
    }
}

/// Unpack exactly `N` positional arguments.
fn try_arity<const N: usize>(
    span: Span,
    args: Vec<CallArg>,
    what: &str,
    ctx: &mut CompileContext<'_>,
) -> Result<[Box<Expr>; N], Failed> {
    if args.len() != N || args.iter().any(|a| a.name.is_some()) {
        let msg = format!("{what} expects {} argument(s), got {}", N, args.len());
        return Err(ctx.error(span, msg));
    }
    let values: Vec<Box<Expr>> = args.into_iter().map(|a| a.value).collect();
    Ok(values.try_into().expect("checked length"))
}

fn fold_flop(op: FlopOp, v: f64) -> f64 {
    match op {
        FlopOp::Abs => v.abs(),
        FlopOp::Exp => v.exp(),
        FlopOp::Log => v.ln(),
        FlopOp::Log10 => v.log10(),
        FlopOp::Sqrt => v.sqrt(),
        FlopOp::Ceil => v.ceil(),
        FlopOp::Floor => v.floor(),
        FlopOp::Round => v.round(),
        FlopOp::ACos => v.acos().to_degrees(),
        FlopOp::ASin => v.asin().to_degrees(),
        FlopOp::ATan => v.atan().to_degrees(),
        FlopOp::Cos => v.to_radians().cos(),
        FlopOp::Sin => v.to_radians().sin(),
        FlopOp::Tan => v.to_radians().tan(),
        FlopOp::CosRad => v.cos(),
        FlopOp::SinRad => v.sin(),
        FlopOp::TanRad => v.tan(),
        FlopOp::CosH => v.cosh(),
        FlopOp::SinH => v.sinh(),
        FlopOp::TanH => v.tanh(),
    }
}

// =============================================================================
// Member-style call resolution
// =============================================================================

pub(crate) fn resolve_member_call(mut e: Box<Expr>, ctx: &mut CompileContext<'_>) -> ResolveResult {
    let ExprKind::MemberCall(call) = std::mem::replace(&mut e.kind, ExprKind::Nop) else {
        unreachable!()
    };
    let span = e.span;
    let MemberCall { obj, name, args } = *call;
    let mut obj = obj.resolve(ctx)?;
    let t = obj.ty();
    let text = ctx.names.resolve(name).to_ascii_lowercase();

    // Built-in methods on specific value types come before real method
    // lookup.
    if t == builtin::TEXTURE_ID {
        let op = match text.as_str() {
            "isvalid" => Some(TexOp::IsValid),
            "isnull" => Some(TexOp::IsNull),
            "setinvalid" => Some(TexOp::SetInvalid),
            "setnull" => Some(TexOp::SetNull),
            _ => None,
        };
        if let Some(op) = op {
            if !args.is_empty() {
                return Err(ctx.error(span, "texture-id methods take no arguments"));
            }
            let local = if matches!(op, TexOp::SetInvalid | TexOp::SetNull) {
                require_writable(&mut obj, ctx)?
            } else {
                false
            };
            let vtype = match op {
                TexOp::IsValid | TexOp::IsNull => builtin::BOOL,
                _ => builtin::VOID,
            };
            let mut node = Expr::new(span, ExprKind::TexBuiltin(Box::new(TexBuiltin { op, obj, local })));
            node.vtype = Some(vtype);
            node.resolved = true;
            return Ok(node);
        }
    }
    if ctx.types.is_vector(t) {
        let op = match text.as_str() {
            "length" => Some(VectorOp::Length),
            "unit" => Some(VectorOp::Unit),
            _ => None,
        };
        if let Some(op) = op {
            if !args.is_empty() {
                return Err(ctx.error(span, "vector methods take no arguments"));
            }
            let wide = t == builtin::VEC3;
            let vtype = if op == VectorOp::Length { builtin::FLOAT } else { t };
            let mut node =
                Expr::new(span, ExprKind::VectorBuiltin(Box::new(VectorBuiltin { op, vec: obj, wide })));
            node.vtype = Some(vtype);
            node.resolved = true;
            return Ok(node);
        }
    }

    // Real member function on the pointed class.
    let Some(class) = ctx.types.pointed_class(t) else {
        let msg = format!("{} has no methods", ctx.describe(t));
        return Err(ctx.error(span, msg));
    };
    let Some(func) = ctx.symbols.find_method(ctx.types, class, name) else {
        let msg = format!(
            "unknown method '{}' in {}",
            ctx.names.resolve(name),
            ctx.describe(class)
        );
        return Err(ctx.error(span, msg));
    };
    resolve_call_to(span, func, Some(obj), args, ctx)
}

// =============================================================================
// Script function calls
// =============================================================================

/// Build and validate the resolved call node: context-flag compatibility,
/// self checks, named-argument reordering, defaults, out params, varargs.
pub(crate) fn resolve_call_to(
    span: Span,
    func: brimstone_core::FuncId,
    selfexpr: Option<Box<Expr>>,
    args: Vec<CallArg>,
    ctx: &mut CompileContext<'_>,
) -> ResolveResult {
    let def = ctx.symbols.function(func).clone();

    // A callee restricted to a narrower usage context cannot be called.
    if !def.callable_from(ctx.func_flags) {
        let msg = format!(
            "cannot call '{}' from this context",
            ctx.names.resolve(def.name)
        );
        return Err(ctx.error(span, msg));
    }

    let is_static = def.flags.contains(FuncFlags::STATIC);
    let selfexpr = match (is_static, selfexpr) {
        (true, _) => None,
        (false, Some(obj)) => {
            // The receiver's class must descend from the method's owner.
            let owner = def.owner.unwrap_or(builtin::VOID);
            let ok = ctx
                .types
                .pointed_class(obj.ty())
                .is_some_and(|c| ctx.types.descends_from(c, owner));
            if !ok {
                let msg = format!(
                    "'{}' is not a method of {}",
                    ctx.names.resolve(def.name),
                    ctx.describe(obj.ty())
                );
                return Err(ctx.error(span, msg));
            }
            Some(obj)
        }
        (false, None) => {
            let in_class = ctx
                .class
                .zip(def.owner)
                .is_some_and(|(c, o)| ctx.types.descends_from(c, o));
            if !in_class || ctx.func_flags.contains(FuncFlags::STATIC) {
                let msg = format!(
                    "call to '{}' requires a self pointer",
                    ctx.names.resolve(def.name)
                );
                return Err(ctx.error(span, msg));
            }
            None
        }
    };

    let explicit_count = args.len();
    let args = reorder_arguments(span, &def, args, ctx)?;

    // Resolve and convert each argument against its parameter.
    let mut resolved = Vec::with_capacity(args.len());
    let mut arg_classes = Vec::with_capacity(args.len());
    let vararg_type = def.params.last().map(|p| p.vtype);
    for (i, arg) in args.into_iter().enumerate() {
        let param = def.params.get(i);
        let (want, out) = match param {
            Some(p) => (p.vtype, p.flags.contains(ParamFlags::OUT)),
            // Trailing varargs share the last named parameter's type.
            None => (vararg_type.unwrap_or(builtin::INT), false),
        };
        let mut value = arg.resolve(ctx)?;
        if out {
            // Reference parameters: exact type, addressable, writable.
            if value.ty() != want {
                let msg = format!(
                    "reference argument type mismatch: expected {}, got {}",
                    ctx.describe(want),
                    ctx.describe(value.ty())
                );
                return Err(ctx.error(value.span, msg));
            }
            require_writable(&mut value, ctx)?;
            // Locals still pass an address for write-back.
            if let ExprKind::LocalRef(l) = &mut value.kind {
                l.addr_req = true;
            }
            arg_classes.push((RegClass::Address, 1));
        } else {
            value = cast_to(value, want, ctx, false)?;
            let class = ctx.types.reg_class(want).unwrap_or(RegClass::Int);
            arg_classes.push((class, ctx.types.reg_width(want)));
        }
        resolved.push(value);
    }

    let forward_action = def.flags.contains(FuncFlags::ACTION)
        && selfexpr.is_none()
        && ctx.func_flags.contains(FuncFlags::ACTION);
    let action_nulls = def.flags.contains(FuncFlags::ACTION) && !forward_action;
    let virtual_call = def.flags.contains(FuncFlags::VIRTUAL);
    let direct = explicit_count == 0
        && !virtual_call
        && def
            .params
            .iter()
            .all(|p| p.flags.contains(ParamFlags::OPTIONAL));

    let vtype = def.rets.first().copied().unwrap_or(builtin::VOID);
    let ret_class = ctx
        .types
        .reg_class(vtype)
        .map(|c| (c, ctx.types.reg_width(vtype)));
    let call = VMCall {
        func,
        selfexpr,
        args: resolved,
        rets: def.rets.clone(),
        arg_classes,
        implicit_self: !is_static,
        forward_action,
        action_nulls,
        virtual_call,
        direct,
        ret_class,
    };
    let mut node = Expr::new(span, ExprKind::VMCall(Box::new(call)));
    node.vtype = Some(vtype);
    node.resolved = true;
    Ok(node)
}

/// Rebuild the argument list in parameter order: positional arguments
/// first, named arguments matched by parameter name, skipped optional
/// slots filled from their registered defaults.
fn reorder_arguments(
    span: Span,
    def: &FuncDef,
    args: Vec<CallArg>,
    ctx: &mut CompileContext<'_>,
) -> Result<Vec<Box<Expr>>, Failed> {
    let vararg = def.flags.contains(FuncFlags::VARARG);
    if !vararg && args.len() > def.params.len() {
        let msg = format!(
            "too many arguments to '{}' ({} > {})",
            ctx.names.resolve(def.name),
            args.len(),
            def.params.len()
        );
        return Err(ctx.error(span, msg));
    }

    let mut positional: Vec<Option<Box<Expr>>> = Vec::new();
    let mut named: Vec<(NameId, Box<Expr>)> = Vec::new();
    for arg in args {
        match arg.name {
            None if !named.is_empty() => {
                return Err(ctx.error(span, "positional argument after named argument"));
            }
            None => positional.push(Some(arg.value)),
            Some(name) => named.push((name, arg.value)),
        }
    }

    let explicit = positional.len();
    let mut out: Vec<Option<Box<Expr>>> = positional;
    out.resize_with(out.len().max(def.params.len()), || None);

    for (name, value) in named {
        let Some(index) = def.params.iter().position(|p| p.name == name) else {
            let msg = format!("unknown argument name '{}'", ctx.names.resolve(name));
            return Err(ctx.error(span, msg));
        };
        if index < explicit || out[index].is_some() {
            let msg = format!("argument '{}' specified twice", ctx.names.resolve(name));
            return Err(ctx.error(span, msg));
        }
        out[index] = Some(value);
    }

    // Fill skipped slots with default-valued placeholders.
    let mut result = Vec::with_capacity(out.len());
    for (i, slot) in out.into_iter().enumerate() {
        match slot {
            Some(value) => result.push(value),
            None => {
                let param = &def.params[i];
                if !param.flags.contains(ParamFlags::OPTIONAL) {
                    let msg = format!(
                        "missing argument '{}' to '{}'",
                        ctx.names.resolve(param.name),
                        ctx.names.resolve(def.name)
                    );
                    return Err(ctx.error(span, msg));
                }
                let default = param.default.clone().unwrap_or(Value::Int(0));
                result.push(Expr::konst(span, param.vtype, default));
            }
        }
    }
    Ok(result)
}

pub(crate) fn resolve_vm_call(mut e: Box<Expr>, ctx: &mut CompileContext<'_>) -> ResolveResult {
    // Calls built by the resolution paths above are created resolved; a
    // hand-built node only needs its children brought along. Defaults are
    // never re-inserted because the resolved flag short-circuits first.
    let ExprKind::VMCall(mut c) = std::mem::replace(&mut e.kind, ExprKind::Nop) else {
        unreachable!()
    };
    if let Some(obj) = c.selfexpr.take() {
        c.selfexpr = Some(obj.resolve(ctx)?);
    }
    let mut args = Vec::with_capacity(c.args.len());
    for arg in c.args {
        args.push(arg.resolve(ctx)?);
    }
    c.args = args;
    e.vtype = Some(c.rets.first().copied().unwrap_or(builtin::VOID));
    e.kind = ExprKind::VMCall(c);
    Ok(e)
}

pub(crate) fn resolve_flop(mut e: Box<Expr>, ctx: &mut CompileContext<'_>) -> ResolveResult {
    let ExprKind::Flop(mut f) = std::mem::replace(&mut e.kind, ExprKind::Nop) else {
        unreachable!()
    };
    f.operand = cast_to_float(f.operand.resolve(ctx)?, ctx)?;
    if let Some(Value::Float(v)) = f.operand.constant_value() {
        return Ok(Expr::konst(e.span, builtin::FLOAT, Value::Float(fold_flop(f.op, *v))));
    }
    e.kind = ExprKind::Flop(f);
    e.vtype = Some(builtin::FLOAT);
    Ok(e)
}

pub(crate) fn resolve_atan2(mut e: Box<Expr>, ctx: &mut CompileContext<'_>) -> ResolveResult {
    let ExprKind::ATan2(mut a) = std::mem::replace(&mut e.kind, ExprKind::Nop) else {
        unreachable!()
    };
    a.y = a.y.resolve(ctx)?;
    if let Some(x) = a.x.take() {
        a.y = cast_to_float(a.y, ctx)?;
        a.x = Some(cast_to_float(x.resolve(ctx)?, ctx)?);
    } else if !ctx.types.is_vector(a.y.ty()) {
        let msg = format!("vector expected, got {}", ctx.describe(a.y.ty()));
        return Err(ctx.error(e.span, msg));
    }
    e.kind = ExprKind::ATan2(a);
    e.vtype = Some(builtin::FLOAT);
    Ok(e)
}

fn resolve_min_max_list(
    span: Span,
    op: MinMaxOp,
    list: Vec<Box<Expr>>,
    ctx: &mut CompileContext<'_>,
) -> ResolveResult {
    let node = Expr::new(
        span,
        ExprKind::MinMax(Box::new(MinMax { op, list, emit_op: None, class: RegClass::Int })),
    );
    node.resolve(ctx)
}

pub(crate) fn resolve_min_max(mut e: Box<Expr>, ctx: &mut CompileContext<'_>) -> ResolveResult {
    let ExprKind::MinMax(mut m) = std::mem::replace(&mut e.kind, ExprKind::Nop) else {
        unreachable!()
    };

    let mut failed = false;
    let mut list = Vec::with_capacity(m.list.len());
    for node in std::mem::take(&mut m.list) {
        match node.resolve(ctx) {
            Ok(node) => list.push(node),
            Err(Failed) => failed = true,
        }
    }
    if failed {
        return Err(Failed);
    }

    let mut any_float = false;
    let mut all_unsigned = true;
    for node in &list {
        let t = node.ty();
        if !ctx.types.is_numeric(t) {
            let msg = format!("numeric operand expected, got {}", ctx.describe(t));
            return Err(ctx.error(node.span, msg));
        }
        any_float |= ctx.types.is_float(t);
        all_unsigned &= t == builtin::UINT;
    }
    let vtype = if any_float {
        builtin::FLOAT
    } else if all_unsigned {
        builtin::UINT
    } else {
        builtin::INT
    };
    let mut converted = Vec::with_capacity(list.len());
    for node in list {
        converted.push(cast_to(node, vtype, ctx, false)?);
    }

    // Fold the constant operands into a single representative.
    let mut constant: Option<Value> = None;
    let mut rest = Vec::with_capacity(converted.len());
    for node in converted {
        if let Some(v) = node.constant_value() {
            constant = Some(match constant {
                None => v.clone(),
                Some(acc) => fold_min_max(m.op, &acc, v, vtype),
            });
        } else {
            rest.push(node);
        }
    }
    if rest.is_empty() {
        let value = constant.expect("at least one operand");
        return Ok(Expr::konst(e.span, vtype, value));
    }
    if let Some(v) = constant {
        rest.push(Expr::konst(e.span, vtype, v));
    }
    if rest.len() == 1 {
        return Ok(rest.into_iter().next().expect("one element"));
    }

    m.class = if vtype == builtin::FLOAT { RegClass::Float } else { RegClass::Int };
    m.emit_op = Some(match (m.op, vtype) {
        (MinMaxOp::Min, t) if t == builtin::FLOAT => OpCode::MinF,
        (MinMaxOp::Max, t) if t == builtin::FLOAT => OpCode::MaxF,
        (MinMaxOp::Min, t) if t == builtin::UINT => OpCode::MinU,
        (MinMaxOp::Max, t) if t == builtin::UINT => OpCode::MaxU,
        (MinMaxOp::Min, _) => OpCode::MinI,
        (MinMaxOp::Max, _) => OpCode::MaxI,
    });
    m.list = rest;
    e.kind = ExprKind::MinMax(m);
    e.vtype = Some(vtype);
    Ok(e)
}

fn fold_min_max(op: MinMaxOp, a: &Value, b: &Value, vtype: TypeId) -> Value {
    if vtype == builtin::FLOAT {
        let (x, y) = (a.as_float().unwrap_or(0.0), b.as_float().unwrap_or(0.0));
        return Value::Float(if op == MinMaxOp::Min { x.min(y) } else { x.max(y) });
    }
    if vtype == builtin::UINT {
        let (x, y) = (a.int_bits().unwrap_or(0) as u32, b.int_bits().unwrap_or(0) as u32);
        return Value::Uint(if op == MinMaxOp::Min { x.min(y) } else { x.max(y) });
    }
    let (x, y) = (a.int_bits().unwrap_or(0), b.int_bits().unwrap_or(0));
    Value::Int(if op == MinMaxOp::Min { x.min(y) } else { x.max(y) })
}

pub(crate) fn resolve_random(mut e: Box<Expr>, ctx: &mut CompileContext<'_>) -> ResolveResult {
    let ExprKind::Random(mut r) = std::mem::replace(&mut e.kind, ExprKind::Nop) else {
        unreachable!()
    };
    if let Some(min) = r.min.take() {
        let min = min.resolve(ctx)?;
        r.min = Some(if r.float { cast_to_float(min, ctx)? } else { cast_to_int(min, false, ctx)? });
    }
    if let Some(max) = r.max.take() {
        let max = max.resolve(ctx)?;
        r.max = Some(if r.float { cast_to_float(max, ctx)? } else { cast_to_int(max, false, ctx)? });
    }
    e.vtype = Some(if r.float { builtin::FLOAT } else { builtin::INT });
    e.kind = ExprKind::Random(r);
    Ok(e)
}

pub(crate) fn resolve_random_pick(mut e: Box<Expr>, ctx: &mut CompileContext<'_>) -> ResolveResult {
    let ExprKind::RandomPick(mut r) = std::mem::replace(&mut e.kind, ExprKind::Nop) else {
        unreachable!()
    };
    let mut choices = Vec::with_capacity(r.choices.len());
    for choice in std::mem::take(&mut r.choices) {
        let choice = choice.resolve(ctx)?;
        choices.push(if r.float {
            cast_to_float(choice, ctx)?
        } else {
            cast_to_int(choice, false, ctx)?
        });
    }
    r.choices = choices;
    e.vtype = Some(if r.float { builtin::FLOAT } else { builtin::INT });
    e.kind = ExprKind::RandomPick(r);
    Ok(e)
}

pub(crate) fn resolve_random2(mut e: Box<Expr>, ctx: &mut CompileContext<'_>) -> ResolveResult {
    let ExprKind::Random2(mut r) = std::mem::replace(&mut e.kind, ExprKind::Nop) else {
        unreachable!()
    };
    if let Some(mask) = r.mask.take() {
        r.mask = Some(cast_to_int(mask.resolve(ctx)?, false, ctx)?);
    }
    e.vtype = Some(builtin::INT);
    e.kind = ExprKind::Random2(r);
    Ok(e)
}

pub(crate) fn resolve_vector_builtin(mut e: Box<Expr>, ctx: &mut CompileContext<'_>) -> ResolveResult {
    let ExprKind::VectorBuiltin(mut v) = std::mem::replace(&mut e.kind, ExprKind::Nop) else {
        unreachable!()
    };
    v.vec = v.vec.resolve(ctx)?;
    let t = v.vec.ty();
    if !ctx.types.is_vector(t) {
        let msg = format!("vector expected, got {}", ctx.describe(t));
        return Err(ctx.error(e.span, msg));
    }
    v.wide = t == builtin::VEC3;
    e.vtype = Some(if v.op == VectorOp::Length { builtin::FLOAT } else { t });
    e.kind = ExprKind::VectorBuiltin(v);
    Ok(e)
}

pub(crate) fn resolve_tex_builtin(mut e: Box<Expr>, ctx: &mut CompileContext<'_>) -> ResolveResult {
    let ExprKind::TexBuiltin(mut t) = std::mem::replace(&mut e.kind, ExprKind::Nop) else {
        unreachable!()
    };
    t.obj = t.obj.resolve(ctx)?;
    if t.obj.ty() != builtin::TEXTURE_ID {
        let msg = format!("texture id expected, got {}", ctx.describe(t.obj.ty()));
        return Err(ctx.error(e.span, msg));
    }
    e.vtype = Some(match t.op {
        TexOp::IsValid | TexOp::IsNull => builtin::BOOL,
        _ => builtin::VOID,
    });
    e.kind = ExprKind::TexBuiltin(t);
    Ok(e)
}

pub(crate) fn resolve_class_of(mut e: Box<Expr>, ctx: &mut CompileContext<'_>) -> ResolveResult {
    let ExprKind::ClassOf(obj) = std::mem::replace(&mut e.kind, ExprKind::Nop) else {
        unreachable!()
    };
    let obj = obj.resolve(ctx)?;
    let Some(class) = ctx.types.pointed_class(obj.ty()) else {
        let msg = format!("{} has no class descriptor", ctx.describe(obj.ty()));
        return Err(ctx.error(e.span, msg));
    };
    e.vtype = Some(ctx.types.class_ptr_of(class));
    e.kind = ExprKind::ClassOf(obj);
    Ok(e)
}

// =============================================================================
// Emission
// =============================================================================

/// Emit one Param instruction for an argument register and free it.
fn emit_param(build: &mut FunctionBuilder, reg: &RegHandle, class: RegClass, width: u8) {
    build.emit(OpCode::Param, class.index() as u16, reg.operand(), u16::from(width));
    build.free(reg);
}

pub(crate) fn emit_vm_call(c: &VMCall, tail: bool, build: &mut FunctionBuilder) -> RegHandle {
    let mut argc: u16 = 0;

    if c.implicit_self {
        match &c.selfexpr {
            Some(obj) => {
                let reg = obj.emit(build);
                let reg = build.materialize(reg);
                emit_param(build, &reg, RegClass::Address, 1);
            }
            None => {
                let this = RegHandle::fixed(0, RegClass::Address, 1);
                emit_param(build, &this, RegClass::Address, 1);
            }
        }
        argc += 1;
    }
    if c.forward_action {
        // The two action-context pointers ride in the fixed registers
        // right after self and forward verbatim.
        for num in [1, 2] {
            let reg = RegHandle::fixed(num, RegClass::Address, 1);
            emit_param(build, &reg, RegClass::Address, 1);
        }
        argc += 2;
    } else if c.action_nulls {
        for _ in 0..2 {
            let null = build.konst_addr(AddrConst::Null);
            emit_param(build, &null, RegClass::Address, 1);
        }
        argc += 2;
    }

    for (arg, (class, width)) in c.args.iter().zip(&c.arg_classes) {
        let reg = arg.emit(build);
        emit_param(build, &reg, *class, *width);
        argc += u16::from(*width);
    }

    let target = build.konst_addr(AddrConst::Function(c.func));
    if tail {
        build.emit(OpCode::Tail, target.num, argc, 0);
        return RegHandle::final_marker();
    }

    let Some((class, width)) = c.ret_class else {
        build.emit(OpCode::Call, target.num, argc, 0);
        return RegHandle::void();
    };
    build.emit(OpCode::Call, target.num, argc, 1);
    let dst = build.acquire(class, width);
    build.emit(OpCode::Result, class.index() as u16, dst.num, u16::from(width));
    dst
}

pub(crate) fn emit_builtin_call(c: &BuiltinCall, build: &mut FunctionBuilder) -> RegHandle {
    let mut argc: u16 = 0;
    for arg in &c.args {
        let reg = arg.emit(build);
        let width = reg.width.max(1);
        emit_param(build, &reg, reg.class, width);
        argc += u16::from(width);
    }
    let target = build.konst_addr(AddrConst::Builtin(c.builtin));
    if c.ret == builtin::VOID {
        build.emit(OpCode::Call, target.num, argc, 0);
        return RegHandle::void();
    }
    build.emit(OpCode::Call, target.num, argc, 1);
    // Builtin results are scalar.
    let class = match c.ret {
        t if t == builtin::FLOAT => RegClass::Float,
        t if t == builtin::STRING => RegClass::String,
        t if t == builtin::INT => RegClass::Int,
        _ => RegClass::Address,
    };
    let dst = build.acquire(class, 1);
    build.emit(OpCode::Result, class.index() as u16, dst.num, 1);
    dst
}

pub(crate) fn emit_flop(f: &FlopCall, build: &mut FunctionBuilder) -> RegHandle {
    let src = f.operand.emit(build);
    let src = build.materialize(src);
    let dst = build.acquire(RegClass::Float, 1);
    build.emit(OpCode::Flop, dst.num, src.num, u8::from(f.op) as u16);
    build.free(&src);
    dst
}

pub(crate) fn emit_atan2(a: &ATan2, build: &mut FunctionBuilder) -> RegHandle {
    let dst = build.acquire(RegClass::Float, 1);
    match &a.x {
        Some(x) => {
            let y = a.y.emit(build);
            let y = build.materialize(y);
            let x = x.emit(build);
            let x = build.materialize(x);
            build.emit(OpCode::ATan2, dst.num, y.num, x.num);
            build.free(&y);
            build.free(&x);
        }
        None => {
            let v = a.y.emit(build);
            build.emit(OpCode::ATan2, dst.num, v.num + 1, v.num);
            build.free(&v);
        }
    }
    dst
}

pub(crate) fn emit_min_max(m: &MinMax, build: &mut FunctionBuilder) -> RegHandle {
    let op = m.emit_op.expect("emission op chosen at resolve");
    let first = m.list.first().expect("non-empty list").emit(build);
    let dst = build.acquire(m.class, 1);
    build.move_to(&dst, &first);
    build.free(&first);
    for node in &m.list[1..] {
        let reg = node.emit(build);
        build.emit(op, dst.num, dst.num, reg.operand());
        build.free(&reg);
    }
    dst
}

fn emit_rng_stream(rng: Option<NameId>, build: &mut FunctionBuilder) {
    let stream = build.konst_name(rng.unwrap_or(NameId::NONE));
    build.emit(OpCode::Param, RegClass::Int.index() as u16, stream.operand(), 1);
}

pub(crate) fn emit_random(r: &Random, build: &mut FunctionBuilder) -> RegHandle {
    emit_rng_stream(r.rng, build);
    let class = if r.float { RegClass::Float } else { RegClass::Int };
    let (lo, hi) = match (&r.min, &r.max) {
        (Some(min), Some(max)) => (min.emit(build), max.emit(build)),
        // Bare Random() rolls the classic 0..255 byte.
        _ if !r.float => (build.konst_int(0), build.konst_int(255)),
        _ => (build.konst_float(0.0), build.konst_float(1.0)),
    };
    emit_param(build, &lo, class, 1);
    emit_param(build, &hi, class, 1);
    let target = build.konst_addr(AddrConst::Builtin(r.helper));
    build.emit(OpCode::Call, target.num, 3, 1);
    let dst = build.acquire(class, 1);
    build.emit(OpCode::Result, class.index() as u16, dst.num, 1);
    dst
}

pub(crate) fn emit_random2(r: &Random2, build: &mut FunctionBuilder) -> RegHandle {
    emit_rng_stream(r.rng, build);
    let mask = match &r.mask {
        Some(mask) => mask.emit(build),
        None => build.konst_int(-1),
    };
    emit_param(build, &mask, RegClass::Int, 1);
    let target = build.konst_addr(AddrConst::Builtin(r.helper));
    build.emit(OpCode::Call, target.num, 2, 1);
    let dst = build.acquire(RegClass::Int, 1);
    build.emit(OpCode::Result, RegClass::Int.index() as u16, dst.num, 1);
    dst
}

/// Roll an index, then test-and-jump per choice into a shared result
/// register.
pub(crate) fn emit_random_pick(r: &RandomPick, build: &mut FunctionBuilder) -> RegHandle {
    emit_rng_stream(r.rng, build);
    let lo = build.konst_int(0);
    emit_param(build, &lo, RegClass::Int, 1);
    let hi = build.konst_int(r.choices.len() as i32 - 1);
    emit_param(build, &hi, RegClass::Int, 1);
    let target = build.konst_addr(AddrConst::Builtin(r.helper));
    build.emit(OpCode::Call, target.num, 3, 1);
    let index = build.acquire(RegClass::Int, 1);
    build.emit(OpCode::Result, RegClass::Int.index() as u16, index.num, 1);

    let mut tests = Vec::with_capacity(r.choices.len());
    for i in 0..r.choices.len() {
        tests.push(build.emit_jump_eq_imm(index.num, i as u16));
    }
    build.free(&index);

    let class = if r.float { RegClass::Float } else { RegClass::Int };
    let dst = build.acquire(class, 1);
    let mut exits = Vec::with_capacity(r.choices.len());
    for (i, choice) in r.choices.iter().enumerate() {
        build.patch(tests[i]);
        let reg = choice.emit(build);
        build.move_to(&dst, &reg);
        build.free(&reg);
        if i + 1 < r.choices.len() {
            exits.push(build.emit_jump(OpCode::Jmp, 0));
        }
    }
    for exit in exits {
        build.patch(exit);
    }
    dst
}

pub(crate) fn emit_vector_builtin(v: &VectorBuiltin, build: &mut FunctionBuilder) -> RegHandle {
    let src = v.vec.emit(build);
    let dst = match v.op {
        VectorOp::Length => build.acquire(RegClass::Float, 1),
        VectorOp::Unit => build.acquire(RegClass::Float, if v.wide { 3 } else { 2 }),
    };
    let op = match (v.op, v.wide) {
        (VectorOp::Length, false) => OpCode::LenV2,
        (VectorOp::Length, true) => OpCode::LenV3,
        (VectorOp::Unit, false) => OpCode::UnitV2,
        (VectorOp::Unit, true) => OpCode::UnitV3,
    };
    build.emit(op, dst.num, src.num, 0);
    build.free(&src);
    dst
}

pub(crate) fn emit_tex_builtin(t: &TexBuiltin, build: &mut FunctionBuilder) -> RegHandle {
    match t.op {
        TexOp::IsValid | TexOp::IsNull => {
            let src = t.obj.emit(build);
            let dst = build.acquire(RegClass::Int, 1);
            let zero = build.konst_int(0);
            match t.op {
                // Valid texture ids are strictly positive.
                TexOp::IsValid => build.emit(OpCode::LtI, dst.num, zero.operand(), src.operand()),
                _ => build.emit(OpCode::EqI, dst.num, src.operand(), zero.operand()),
            };
            build.free(&src);
            dst
        }
        TexOp::SetInvalid | TexOp::SetNull => {
            let value = if t.op == TexOp::SetInvalid { -1 } else { 0 };
            if t.local {
                let reg = t.obj.emit(build);
                let k = build.konst_int(value);
                build.emit(OpCode::LoadKI, reg.num, k.num, 0);
            } else {
                let addr = t.obj.emit(build);
                let k = build.konst_int(value);
                let tmp = build.materialize(k);
                build.emit(OpCode::Store32, tmp.num, addr.operand(), 0);
                build.free(&tmp);
                build.free(&addr);
            }
            RegHandle::void()
        }
    }
}

pub(crate) fn emit_class_of(obj: &Expr, build: &mut FunctionBuilder) -> RegHandle {
    let src = obj.emit(build);
    let src = build.materialize(src);
    let dst = build.acquire(RegClass::Address, 1);
    build.emit(OpCode::ClassOf, dst.num, src.num, 0);
    build.free(&src);
    dst
}
