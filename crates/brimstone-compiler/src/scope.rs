//! Block-scoped local variable tracking during resolution.
//!
//! Each function keeps one [`LocalScope`]: a declaration table indexed by
//! [`LocalId`] plus a name→id binding map with shadow restoration. Blocks
//! save and restore bindings on the way in and out; the ids that go out of
//! scope are handed to the owning compound statement so it can release
//! their registers after its body emits.

use brimstone_core::{NameId, Span, TypeId};
use rustc_hash::FxHashMap;

/// Handle to a local declaration within one function.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct LocalId(pub u32);

/// One declared local.
#[derive(Debug, Clone)]
pub struct LocalDecl {
    pub name: NameId,
    pub vtype: TypeId,
    pub span: Span,
    /// Declared read-only; assignment and address-taking for writing are
    /// rejected.
    pub constant: bool,
}

/// Journal entry: a declaration made at some block depth, remembering the
/// binding it shadowed.
#[derive(Debug)]
struct Binding {
    depth: u32,
    name: NameId,
    id: LocalId,
    shadowed: Option<LocalId>,
}

/// Local scope of the function being resolved.
#[derive(Debug, Default)]
pub struct LocalScope {
    decls: Vec<LocalDecl>,
    visible: FxHashMap<NameId, LocalId>,
    journal: Vec<Binding>,
    depth: u32,
}

impl LocalScope {
    pub fn new() -> Self {
        Self::default()
    }

    /// Enter a block.
    pub fn push_block(&mut self) {
        self.depth += 1;
    }

    /// Leave a block, restoring shadowed bindings. Returns the ids that
    /// just went out of scope (their registers are released by the block's
    /// emission).
    pub fn pop_block(&mut self) -> Vec<LocalId> {
        let mut released = Vec::new();
        while let Some(last) = self.journal.last() {
            if last.depth < self.depth {
                break;
            }
            let entry = self.journal.pop().expect("journal entry");
            released.push(entry.id);
            match entry.shadowed {
                Some(prev) => {
                    self.visible.insert(entry.name, prev);
                }
                None => {
                    self.visible.remove(&entry.name);
                }
            }
        }
        self.depth -= 1;
        released.reverse();
        released
    }

    /// Declare a local in the current block. Fails with the existing id
    /// when the name was already declared in this same block.
    pub fn declare(
        &mut self,
        name: NameId,
        vtype: TypeId,
        span: Span,
        constant: bool,
    ) -> Result<LocalId, LocalId> {
        if let Some(prior) = self
            .journal
            .iter()
            .rev()
            .take_while(|b| b.depth == self.depth)
            .find(|b| b.name == name)
        {
            return Err(prior.id);
        }
        let id = LocalId(self.decls.len() as u32);
        self.decls.push(LocalDecl { name, vtype, span, constant });
        let shadowed = self.visible.insert(name, id);
        self.journal.push(Binding { depth: self.depth, name, id, shadowed });
        Ok(id)
    }

    /// Resolve a name against the visible bindings.
    pub fn lookup(&self, name: NameId) -> Option<LocalId> {
        self.visible.get(&name).copied()
    }

    pub fn decl(&self, id: LocalId) -> &LocalDecl {
        &self.decls[id.0 as usize]
    }

    /// Total declarations made in this function so far.
    pub fn decl_count(&self) -> usize {
        self.decls.len()
    }
}
