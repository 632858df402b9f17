//! Registry of pre-registered native call targets.
//!
//! Compiler-synthesized helper calls (random number generation, line
//! specials, console-variable reads, class lookup by name) go through
//! stable named entries in this registry. It is an explicit object handed
//! to the compilation context at construction, populated once during
//! setup, and read-only afterwards.

use brimstone_core::{TypeId, builtin};
use rustc_hash::FxHashMap;

/// Handle to a registered native helper.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BuiltinId(pub u32);

/// Descriptor of one native helper.
#[derive(Debug, Clone)]
pub struct NativeFn {
    pub name: &'static str,
    /// Result type; `builtin::VOID` for helpers with no result.
    pub ret: TypeId,
}

/// Names of the helpers the compiler synthesizes calls to.
pub mod well_known {
    /// `random(stream, min, max) -> int`
    pub const RANDOM: &str = "random";
    /// `frandom(stream, min, max) -> double`
    pub const FRANDOM: &str = "frandom";
    /// `random2(stream, mask) -> int`
    pub const RANDOM2: &str = "random2";
    /// `name_to_class(name) -> class` (null when no such class)
    pub const NAME_TO_CLASS: &str = "name_to_class";
    /// `call_line_special(special, args...) -> int`
    pub const CALL_LINE_SPECIAL: &str = "call_line_special";
    /// `get_default(class) -> object`
    pub const GET_DEFAULT: &str = "get_default";
    /// `get_cvar(name) -> value` (typed per console variable)
    pub const GET_CVAR: &str = "get_cvar";
}

/// Name → descriptor registry.
#[derive(Debug, Default)]
pub struct BuiltinRegistry {
    by_name: FxHashMap<&'static str, BuiltinId>,
    fns: Vec<NativeFn>,
}

impl BuiltinRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with every helper the compiler core synthesizes calls to.
    pub fn with_defaults() -> Self {
        let mut registry = Self::new();
        registry.register(well_known::RANDOM, builtin::INT);
        registry.register(well_known::FRANDOM, builtin::FLOAT);
        registry.register(well_known::RANDOM2, builtin::INT);
        registry.register(well_known::NAME_TO_CLASS, builtin::VOID);
        registry.register(well_known::CALL_LINE_SPECIAL, builtin::INT);
        registry.register(well_known::GET_DEFAULT, builtin::VOID);
        registry.register(well_known::GET_CVAR, builtin::VOID);
        registry
    }

    /// Register a helper; idempotent per name.
    pub fn register(&mut self, name: &'static str, ret: TypeId) -> BuiltinId {
        if let Some(&id) = self.by_name.get(name) {
            return id;
        }
        let id = BuiltinId(self.fns.len() as u32);
        self.fns.push(NativeFn { name, ret });
        self.by_name.insert(name, id);
        id
    }

    pub fn lookup(&self, name: &str) -> Option<BuiltinId> {
        self.by_name.get(name).copied()
    }

    pub fn get(&self, id: BuiltinId) -> &NativeFn {
        &self.fns[id.0 as usize]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_registered() {
        let registry = BuiltinRegistry::with_defaults();
        assert!(registry.lookup(well_known::RANDOM).is_some());
        assert!(registry.lookup(well_known::CALL_LINE_SPECIAL).is_some());
        assert!(registry.lookup("missing").is_none());
    }

    #[test]
    fn register_is_idempotent() {
        let mut registry = BuiltinRegistry::new();
        let a = registry.register("helper", builtin::INT);
        let b = registry.register("helper", builtin::INT);
        assert_eq!(a, b);
        assert_eq!(registry.get(a).name, "helper");
    }
}
