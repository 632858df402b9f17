//! Functions, prototypes, and the global symbol table.
//!
//! The symbol table is the compiler's read-only name-resolution service:
//! it maps identifiers to constants, globals, functions, classes, line
//! specials, and console variables. It is populated during a single-threaded
//! setup phase and never mutated during compilation.

use bitflags::bitflags;
use rustc_hash::FxHashMap;

use crate::names::NameId;
use crate::types::{FieldFlags, TypeId, TypeStore};
use crate::value::Value;

/// Handle to a registered function.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FuncId(pub u32);

bitflags! {
    /// Function qualifiers and usage-context restrictions.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct FuncFlags: u32 {
        const STATIC  = 1 << 0;
        const VIRTUAL = 1 << 1;
        /// Carries the two implicit action-context pointers.
        const ACTION  = 1 << 2;
        /// Trailing arguments beyond the last named parameter are accepted.
        const VARARG  = 1 << 3;
        const NATIVE  = 1 << 4;
        /// Callable only from play context.
        const PLAY    = 1 << 5;
        /// Callable only from UI context.
        const UI      = 1 << 6;
    }
}

bitflags! {
    /// Parameter passing qualifiers.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct ParamFlags: u32 {
        /// Passed by reference; the argument must be addressable and
        /// writable, and its type must match exactly.
        const OUT      = 1 << 0;
        /// May be omitted; filled from the registered default.
        const OPTIONAL = 1 << 1;
    }
}

/// One declared parameter.
#[derive(Debug, Clone)]
pub struct ParamDef {
    pub name: NameId,
    pub vtype: TypeId,
    pub flags: ParamFlags,
    /// Default value for optional parameters.
    pub default: Option<Value>,
}

/// A function signature registered with the symbol table.
#[derive(Debug, Clone)]
pub struct FuncDef {
    pub name: NameId,
    /// Declaring class for methods; `None` for free functions.
    pub owner: Option<TypeId>,
    pub flags: FuncFlags,
    pub params: Vec<ParamDef>,
    pub rets: Vec<TypeId>,
}

impl FuncDef {
    pub fn proto(&self) -> Prototype {
        Prototype {
            args: self.params.iter().map(|p| p.vtype).collect(),
            rets: self.rets.clone(),
        }
    }

    /// A method restricted to a narrower usage context than `caller_flags`
    /// cannot be called from it. Unrestricted functions are callable from
    /// anywhere.
    pub fn callable_from(&self, caller_flags: FuncFlags) -> bool {
        let restriction = FuncFlags::PLAY | FuncFlags::UI;
        let callee = self.flags & restriction;
        callee.is_empty() || callee == caller_flags & restriction
    }
}

/// Argument/return shape of a callable; return statements aggregate one
/// per function.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Prototype {
    pub args: Vec<TypeId>,
    pub rets: Vec<TypeId>,
}

/// Merge the return-type lists of two return statements in one function.
///
/// A shorter list is compatible with a longer one only as an exact prefix;
/// the merged result keeps the longer list. A void return (empty list)
/// forces every other return to be void as well.
pub fn merge_return_types(a: &[TypeId], b: &[TypeId]) -> Option<Vec<TypeId>> {
    if a.is_empty() != b.is_empty() {
        return None;
    }
    let (short, long) = if a.len() <= b.len() { (a, b) } else { (b, a) };
    if long[..short.len()] == *short {
        Some(long.to_vec())
    } else {
        None
    }
}

/// What a name can resolve to outside local scope.
#[derive(Debug, Clone)]
pub enum Symbol {
    /// A named compile-time constant.
    Constant { value: Value, vtype: TypeId },
    /// A global variable at a known address.
    Global { vtype: TypeId, addr: u32, flags: FieldFlags },
    Function(FuncId),
    Class(TypeId),
    /// A line-special number usable as a constant or pseudo-call.
    LineSpecial(i32),
    /// A console variable; reads go through a runtime helper.
    CVar { vtype: TypeId },
}

/// Description of the state table enclosing the function being compiled;
/// constant state-label indices resolve against it.
#[derive(Debug, Clone, Copy)]
pub struct StateList {
    /// Number of states defined so far in the enclosing list.
    pub count: u32,
    /// Symbol id mixed into runtime-computed index jumps.
    pub label_sym: u32,
}

/// Global name-resolution service. Read-only during compilation.
#[derive(Debug, Default)]
pub struct SymbolTable {
    funcs: Vec<FuncDef>,
    globals: FxHashMap<NameId, Symbol>,
}

impl SymbolTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn define(&mut self, name: NameId, symbol: Symbol) {
        self.globals.insert(name, symbol);
    }

    pub fn lookup(&self, name: NameId) -> Option<&Symbol> {
        self.globals.get(&name)
    }

    pub fn add_function(&mut self, def: FuncDef) -> FuncId {
        let id = FuncId(self.funcs.len() as u32);
        if def.owner.is_none() {
            self.globals.insert(def.name, Symbol::Function(id));
        }
        self.funcs.push(def);
        id
    }

    pub fn function(&self, id: FuncId) -> &FuncDef {
        &self.funcs[id.0 as usize]
    }

    /// Find a method by name on `class` or any of its ancestors.
    pub fn find_method(&self, types: &TypeStore, class: TypeId, name: NameId) -> Option<FuncId> {
        let mut cur = Some(class);
        while let Some(id) = cur {
            let def = types.class_def(id)?;
            if let Some(&fid) = def
                .methods
                .iter()
                .find(|&&fid| self.function(fid).name == name)
            {
                return Some(fid);
            }
            cur = def.parent;
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::names::NameTable;
    use crate::types::builtin;

    #[test]
    fn return_merge_prefix_rule() {
        let a = vec![builtin::INT];
        let b = vec![builtin::INT, builtin::FLOAT];
        assert_eq!(merge_return_types(&a, &b), Some(b.clone()));
        assert_eq!(merge_return_types(&b, &a), Some(b.clone()));

        let c = vec![builtin::FLOAT];
        assert_eq!(merge_return_types(&a, &c), None);
    }

    #[test]
    fn void_return_forces_void() {
        let void: Vec<TypeId> = vec![];
        let int = vec![builtin::INT];
        assert_eq!(merge_return_types(&void, &void), Some(vec![]));
        assert_eq!(merge_return_types(&void, &int), None);
    }

    #[test]
    fn context_restriction() {
        let mut names = NameTable::new();
        let def = FuncDef {
            name: names.intern("Ticker"),
            owner: None,
            flags: FuncFlags::PLAY,
            params: vec![],
            rets: vec![],
        };
        assert!(def.callable_from(FuncFlags::PLAY));
        assert!(!def.callable_from(FuncFlags::UI));
        assert!(!def.callable_from(FuncFlags::empty()));

        let open = FuncDef { flags: FuncFlags::empty(), ..def.clone() };
        assert!(open.callable_from(FuncFlags::UI));
    }

    #[test]
    fn method_lookup_walks_parents() {
        let mut names = NameTable::new();
        let mut types = TypeStore::new(&mut names);
        let mut symbols = SymbolTable::new();

        let base = types.add_class(names.intern("Base"), None, vec![]);
        let derived = types.add_class(names.intern("Derived"), Some(base), vec![]);

        let tick = names.intern("Tick");
        let fid = symbols.add_function(FuncDef {
            name: tick,
            owner: Some(base),
            flags: FuncFlags::VIRTUAL,
            params: vec![],
            rets: vec![],
        });
        types.add_class_method(base, fid);

        assert_eq!(symbols.find_method(&types, derived, tick), Some(fid));
        assert_eq!(symbols.find_method(&types, base, tick), Some(fid));
        assert_eq!(
            symbols.find_method(&types, base, names.intern("Missing")),
            None
        );
    }
}
