//! Per-function compilation driver.
//!
//! Resolution and emission are two distinct passes over the same node
//! tree. Emission never runs when resolution reported any failure; on
//! success the builder verifies that every jump site was backpatched and
//! every temporary register returned.

use brimstone_core::{CompileError, FuncFlags, FuncId, TypeId};
use tracing::debug;

use crate::bytecode::{CodeChunk, ConstantTables};
use crate::context::CompileContext;
use crate::emit::{FunctionBuilder, RegHandle};
use crate::expr::Expr;
use crate::scope::LocalId;

/// The produced summary of one compiled function.
#[derive(Debug)]
pub struct CompiledFunction {
    pub code: CodeChunk,
    pub consts: ConstantTables,
    /// Register file sizes (int, float, string, address).
    pub max_regs: [u16; 4],
    /// Return shape inferred from the function's return statements.
    pub return_types: Vec<TypeId>,
}

/// Compile one function body against a prepared context.
///
/// When `func` is given, its signature is installed into the context:
/// parameters become scoped locals backed by fixed registers, and the
/// enclosing-class/flags fields drive self and usage-context checks.
pub fn compile_function(
    func: Option<FuncId>,
    body: Box<Expr>,
    ctx: &mut CompileContext<'_>,
) -> Result<CompiledFunction, CompileError> {
    let mut params: Vec<LocalId> = Vec::new();
    ctx.locals.push_block();
    if let Some(func) = func {
        let def = ctx.symbols.function(func).clone();
        ctx.func = Some(func);
        ctx.class = def.owner;
        ctx.func_flags = def.flags;
        for param in &def.params {
            match ctx.locals.declare(param.name, param.vtype, Default::default(), false) {
                Ok(id) => params.push(id),
                Err(_) => {
                    ctx.sink.fatal(
                        Default::default(),
                        format!("duplicate parameter '{}'", ctx.names.resolve(param.name)),
                    );
                }
            }
        }
    }

    let resolved = body.resolve(ctx);
    ctx.locals.pop_block();
    let body = match resolved {
        Ok(body) if !ctx.sink.has_errors() => body,
        _ => {
            let errors = ctx.sink.error_count().max(1);
            debug!(errors, "resolution failed; skipping emission");
            return Err(CompileError::ResolveFailed { errors });
        }
    };

    let mut build = FunctionBuilder::new();
    // Methods reserve address register 0 for self; action functions also
    // hold the two action-context pointers.
    let implicit_addrs: u16 = match (ctx.class.is_some(), ctx.func_flags.contains(FuncFlags::ACTION)) {
        (false, _) => 0,
        (true, false) => 1,
        (true, true) => 3,
    };
    for _ in 0..implicit_addrs {
        let reg = build.acquire(brimstone_core::RegClass::Address, 1);
        // Pinned for the whole function; accounted for at the end.
        let _ = reg;
    }
    // Parameters land in fixed registers in declaration order.
    if let Some(func) = func {
        let def = ctx.symbols.function(func);
        for (id, param) in params.iter().zip(&def.params) {
            let class = ctx.types.reg_class(param.vtype).unwrap_or(brimstone_core::RegClass::Int);
            let width = ctx.types.reg_width(param.vtype);
            let temp = build.acquire(class, width);
            build.set_local_reg(*id, RegHandle::fixed(temp.num, class, width));
        }
    }

    let reg = body.emit(&mut build);
    build.free(&reg);

    // Release parameter and implicit registers before the leak check.
    for id in params {
        build.release_local(id);
    }
    for num in 0..implicit_addrs {
        build.free(&RegHandle::temp(num, brimstone_core::RegClass::Address, 1));
    }

    let (code, consts, max_regs) = build.finish();
    Ok(CompiledFunction {
        code,
        consts,
        max_regs,
        return_types: ctx.return_types.clone().unwrap_or_default(),
    })
}
