//! Type descriptors and the type store.
//!
//! Every value shape in the language is described by a [`TypeDef`] held in
//! the [`TypeStore`] and referred to by [`TypeId`]. Ids are the identity:
//! two expressions have "the same type" exactly when their ids are equal.
//! Descriptors are immutable once registered; derived types (pointers,
//! arrays, class-descriptor pointers) are deduplicated on creation.
//!
//! The [`builtin`] module pins ids for the primitive types registered by
//! [`TypeStore::new`], so they can be compared without a store lookup.

use bitflags::bitflags;
use rustc_hash::FxHashMap;

use crate::names::{NameId, NameTable};
use crate::value::Value;

/// Handle to a registered type. Identity comparison is type equality.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TypeId(pub u32);

/// Register file a value of some type occupies at runtime.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RegClass {
    /// Integers, bools, names, colors, sounds, sprite/texture ids,
    /// encoded state labels.
    Int,
    /// Floats and vector components.
    Float,
    /// Dynamic strings.
    String,
    /// Object, struct, and state pointers.
    Address,
}

impl RegClass {
    /// Index into per-class tables (register pools, constant tables).
    #[inline]
    pub fn index(self) -> usize {
        match self {
            RegClass::Int => 0,
            RegClass::Float => 1,
            RegClass::String => 2,
            RegClass::Address => 3,
        }
    }
}

bitflags! {
    /// Storage qualifiers on a field or global.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct FieldFlags: u32 {
        const READONLY   = 1 << 0;
        const STATIC     = 1 << 1;
        const META       = 1 << 2;
        const PRIVATE    = 1 << 3;
        const DEPRECATED = 1 << 4;
        const NATIVE     = 1 << 5;
    }
}

/// A named field inside a class or struct. Offsets are fixed at
/// registration; member-access folding accumulates them on the access node
/// rather than mutating the descriptor.
#[derive(Debug, Clone)]
pub struct FieldDef {
    pub name: NameId,
    pub vtype: TypeId,
    pub offset: u32,
    pub flags: FieldFlags,
}

/// Class metadata: parent link, instance fields, symbolic constants, and
/// method handles (indices into the symbol table's function list).
#[derive(Debug, Clone, Default)]
pub struct ClassDef {
    pub parent: Option<TypeId>,
    pub fields: Vec<FieldDef>,
    pub constants: FxHashMap<NameId, (Value, TypeId)>,
    pub methods: Vec<crate::symbols::FuncId>,
    /// Instance size in bytes, including inherited fields.
    pub size: u32,
}

/// Plain-aggregate metadata.
#[derive(Debug, Clone)]
pub struct StructDef {
    pub fields: Vec<FieldDef>,
    pub size: u32,
}

/// The shape of a type.
#[derive(Debug, Clone)]
pub enum TypeKind {
    Void,
    /// Sentinel for a failed resolution. Short-circuits further checks.
    Error,
    Bool,
    Int { signed: bool, bits: u8 },
    Float { bits: u8 },
    Name,
    String,
    Sound,
    Color,
    SpriteId,
    TextureId,
    /// Encoded state-jump value (int-backed at runtime).
    StateLabel,
    Vector2,
    Vector3,
    /// One record of the host's state table; only ever seen through a
    /// pointer, but its size drives state-pointer arithmetic.
    State,
    Pointer { pointed: TypeId, readonly: bool },
    /// Pointer to a class descriptor ("class<X>" values).
    ClassPtr { class: TypeId },
    Class(ClassDef),
    Struct(StructDef),
    Array { element: TypeId, count: u32 },
}

/// A registered type.
#[derive(Debug, Clone)]
pub struct TypeDef {
    pub name: NameId,
    pub kind: TypeKind,
}

/// Ids of the primitive types pre-registered by [`TypeStore::new`], in
/// registration order.
pub mod builtin {
    use super::TypeId;

    pub const VOID: TypeId = TypeId(0);
    pub const ERROR: TypeId = TypeId(1);
    pub const BOOL: TypeId = TypeId(2);
    pub const INT: TypeId = TypeId(3);
    pub const UINT: TypeId = TypeId(4);
    pub const INT8: TypeId = TypeId(5);
    pub const UINT8: TypeId = TypeId(6);
    pub const INT16: TypeId = TypeId(7);
    pub const UINT16: TypeId = TypeId(8);
    /// The 64-bit float every float expression computes in.
    pub const FLOAT: TypeId = TypeId(9);
    /// Narrow float storage for fields; widened to [`FLOAT`] on load.
    pub const FLOAT32: TypeId = TypeId(10);
    pub const NAME: TypeId = TypeId(11);
    pub const STRING: TypeId = TypeId(12);
    pub const SOUND: TypeId = TypeId(13);
    pub const COLOR: TypeId = TypeId(14);
    pub const SPRITE_ID: TypeId = TypeId(15);
    pub const TEXTURE_ID: TypeId = TypeId(16);
    pub const STATE_LABEL: TypeId = TypeId(17);
    pub const VEC2: TypeId = TypeId(18);
    pub const VEC3: TypeId = TypeId(19);
    pub const STATE: TypeId = TypeId(20);
    /// Pointer to a state record; supports scaled pointer arithmetic.
    pub const STATE_PTR: TypeId = TypeId(21);
    /// Type of the `null` constant, compatible with any pointer.
    pub const NULL_PTR: TypeId = TypeId(22);

    pub(super) const COUNT: u32 = 23;
}

/// Append-only registry of type descriptors.
#[derive(Debug)]
pub struct TypeStore {
    defs: Vec<TypeDef>,
    pointers: FxHashMap<(TypeId, bool), TypeId>,
    class_ptrs: FxHashMap<TypeId, TypeId>,
    arrays: FxHashMap<(TypeId, u32), TypeId>,
}

impl TypeStore {
    /// Create a store with all primitive types registered at their
    /// [`builtin`] ids.
    pub fn new(names: &mut NameTable) -> Self {
        let mut store = Self {
            defs: Vec::new(),
            pointers: FxHashMap::default(),
            class_ptrs: FxHashMap::default(),
            arrays: FxHashMap::default(),
        };
        let prims: &[(&str, TypeKind)] = &[
            ("void", TypeKind::Void),
            ("<error>", TypeKind::Error),
            ("bool", TypeKind::Bool),
            ("int", TypeKind::Int { signed: true, bits: 32 }),
            ("uint", TypeKind::Int { signed: false, bits: 32 }),
            ("int8", TypeKind::Int { signed: true, bits: 8 }),
            ("uint8", TypeKind::Int { signed: false, bits: 8 }),
            ("int16", TypeKind::Int { signed: true, bits: 16 }),
            ("uint16", TypeKind::Int { signed: false, bits: 16 }),
            ("double", TypeKind::Float { bits: 64 }),
            ("float", TypeKind::Float { bits: 32 }),
            ("name", TypeKind::Name),
            ("string", TypeKind::String),
            ("sound", TypeKind::Sound),
            ("color", TypeKind::Color),
            ("spriteid", TypeKind::SpriteId),
            ("textureid", TypeKind::TextureId),
            ("statelabel", TypeKind::StateLabel),
            ("vector2", TypeKind::Vector2),
            ("vector3", TypeKind::Vector3),
            ("state", TypeKind::State),
            (
                "state&",
                TypeKind::Pointer { pointed: builtin::STATE, readonly: false },
            ),
            ("null", TypeKind::Pointer { pointed: builtin::VOID, readonly: true }),
        ];
        for (name, kind) in prims {
            let name = names.intern(name);
            store.defs.push(TypeDef { name, kind: kind.clone() });
        }
        debug_assert_eq!(store.defs.len() as u32, builtin::COUNT);
        store
            .pointers
            .insert((builtin::STATE, false), builtin::STATE_PTR);
        store
    }

    pub fn get(&self, id: TypeId) -> &TypeDef {
        &self.defs[id.0 as usize]
    }

    pub fn kind(&self, id: TypeId) -> &TypeKind {
        &self.get(id).kind
    }

    pub fn name(&self, id: TypeId) -> NameId {
        self.get(id).name
    }

    /// Human-readable type name for diagnostics.
    pub fn describe(&self, id: TypeId, names: &NameTable) -> String {
        match self.kind(id) {
            TypeKind::Pointer { pointed, .. } => {
                format!("{}&", self.describe(*pointed, names))
            }
            TypeKind::ClassPtr { class } => {
                format!("class<{}>", self.describe(*class, names))
            }
            TypeKind::Array { element, count } => {
                format!("{}[{}]", self.describe(*element, names), count)
            }
            _ => names.resolve(self.get(id).name).to_string(),
        }
    }

    // =========================================================================
    // Registration
    // =========================================================================

    fn add(&mut self, def: TypeDef) -> TypeId {
        let id = TypeId(self.defs.len() as u32);
        self.defs.push(def);
        id
    }

    /// Register (or find) the pointer type to `pointed`.
    pub fn pointer_to(&mut self, pointed: TypeId, readonly: bool) -> TypeId {
        if let Some(&id) = self.pointers.get(&(pointed, readonly)) {
            return id;
        }
        let name = self.get(pointed).name;
        let id = self.add(TypeDef { name, kind: TypeKind::Pointer { pointed, readonly } });
        self.pointers.insert((pointed, readonly), id);
        id
    }

    /// Register (or find) the class-descriptor pointer type for `class`.
    pub fn class_ptr_of(&mut self, class: TypeId) -> TypeId {
        if let Some(&id) = self.class_ptrs.get(&class) {
            return id;
        }
        let name = self.get(class).name;
        let id = self.add(TypeDef { name, kind: TypeKind::ClassPtr { class } });
        self.class_ptrs.insert(class, id);
        id
    }

    /// Register (or find) the fixed-size array type `element[count]`.
    pub fn array_of(&mut self, element: TypeId, count: u32) -> TypeId {
        if let Some(&id) = self.arrays.get(&(element, count)) {
            return id;
        }
        let name = self.get(element).name;
        let id = self.add(TypeDef { name, kind: TypeKind::Array { element, count } });
        self.arrays.insert((element, count), id);
        id
    }

    /// Register a struct; field offsets are assigned sequentially from the
    /// field types' sizes.
    pub fn add_struct(&mut self, name: NameId, fields: Vec<(NameId, TypeId, FieldFlags)>) -> TypeId {
        let (fields, size) = self.layout(fields, 0);
        self.add(TypeDef { name, kind: TypeKind::Struct(StructDef { fields, size }) })
    }

    /// Register a class; own fields are laid out after the parent's.
    pub fn add_class(
        &mut self,
        name: NameId,
        parent: Option<TypeId>,
        fields: Vec<(NameId, TypeId, FieldFlags)>,
    ) -> TypeId {
        let base = parent
            .and_then(|p| self.class_def(p))
            .map(|c| c.size)
            .unwrap_or(0);
        let (fields, size) = self.layout(fields, base);
        self.add(TypeDef {
            name,
            kind: TypeKind::Class(ClassDef {
                parent,
                fields,
                constants: FxHashMap::default(),
                methods: Vec::new(),
                size,
            }),
        })
    }

    fn layout(
        &self,
        fields: Vec<(NameId, TypeId, FieldFlags)>,
        base: u32,
    ) -> (Vec<FieldDef>, u32) {
        let mut offset = base;
        let mut defs = Vec::with_capacity(fields.len());
        for (name, vtype, flags) in fields {
            defs.push(FieldDef { name, vtype, offset, flags });
            offset += self.size_of(vtype);
        }
        (defs, offset)
    }

    /// Attach a symbolic constant to a class.
    pub fn add_class_constant(&mut self, class: TypeId, name: NameId, value: Value, vtype: TypeId) {
        if let TypeKind::Class(def) = &mut self.defs[class.0 as usize].kind {
            def.constants.insert(name, (value, vtype));
        }
    }

    /// Attach a method handle to a class.
    pub fn add_class_method(&mut self, class: TypeId, func: crate::symbols::FuncId) {
        if let TypeKind::Class(def) = &mut self.defs[class.0 as usize].kind {
            def.methods.push(func);
        }
    }

    // =========================================================================
    // Queries
    // =========================================================================

    pub fn class_def(&self, id: TypeId) -> Option<&ClassDef> {
        match self.kind(id) {
            TypeKind::Class(def) => Some(def),
            _ => None,
        }
    }

    /// Find a field by name, walking class parents for inherited fields.
    pub fn find_field(&self, id: TypeId, name: NameId) -> Option<&FieldDef> {
        match self.kind(id) {
            TypeKind::Struct(def) => def.fields.iter().find(|f| f.name == name),
            TypeKind::Class(def) => def
                .fields
                .iter()
                .find(|f| f.name == name)
                .or_else(|| def.parent.and_then(|p| self.find_field(p, name))),
            _ => None,
        }
    }

    /// Find a class constant by name, walking parents.
    pub fn find_class_constant(&self, id: TypeId, name: NameId) -> Option<&(Value, TypeId)> {
        let def = self.class_def(id)?;
        def.constants
            .get(&name)
            .or_else(|| def.parent.and_then(|p| self.find_class_constant(p, name)))
    }

    /// True when `a` is `b` or a class derived from `b`.
    pub fn descends_from(&self, a: TypeId, b: TypeId) -> bool {
        let mut cur = Some(a);
        while let Some(id) = cur {
            if id == b {
                return true;
            }
            cur = self.class_def(id).and_then(|c| c.parent);
        }
        false
    }

    /// Size in bytes a value of this type occupies in aggregate storage.
    pub fn size_of(&self, id: TypeId) -> u32 {
        match self.kind(id) {
            TypeKind::Void | TypeKind::Error => 0,
            TypeKind::Bool => 1,
            TypeKind::Int { bits, .. } => u32::from(*bits) / 8,
            TypeKind::Float { bits } => u32::from(*bits) / 8,
            TypeKind::Name
            | TypeKind::Sound
            | TypeKind::Color
            | TypeKind::SpriteId
            | TypeKind::TextureId
            | TypeKind::StateLabel => 4,
            TypeKind::String => 16,
            TypeKind::Vector2 => 16,
            TypeKind::Vector3 => 24,
            TypeKind::State => 40,
            TypeKind::Pointer { .. } | TypeKind::ClassPtr { .. } => 8,
            TypeKind::Class(def) => def.size,
            TypeKind::Struct(def) => def.size,
            TypeKind::Array { element, count } => self.size_of(*element) * count,
        }
    }

    /// The register file a value of this type lives in, if it occupies
    /// registers at all.
    pub fn reg_class(&self, id: TypeId) -> Option<RegClass> {
        match self.kind(id) {
            TypeKind::Void | TypeKind::Error | TypeKind::State => None,
            TypeKind::Bool
            | TypeKind::Int { .. }
            | TypeKind::Name
            | TypeKind::Sound
            | TypeKind::Color
            | TypeKind::SpriteId
            | TypeKind::TextureId
            | TypeKind::StateLabel => Some(RegClass::Int),
            TypeKind::Float { .. } | TypeKind::Vector2 | TypeKind::Vector3 => {
                Some(RegClass::Float)
            }
            TypeKind::String => Some(RegClass::String),
            TypeKind::Pointer { .. } | TypeKind::ClassPtr { .. } => Some(RegClass::Address),
            // Aggregates are manipulated through pointers.
            TypeKind::Class(_) | TypeKind::Struct(_) | TypeKind::Array { .. } => {
                Some(RegClass::Address)
            }
        }
    }

    /// Number of contiguous registers a value occupies (vectors span 2/3).
    pub fn reg_width(&self, id: TypeId) -> u8 {
        match self.kind(id) {
            TypeKind::Vector2 => 2,
            TypeKind::Vector3 => 3,
            _ => 1,
        }
    }

    pub fn is_integral(&self, id: TypeId) -> bool {
        matches!(self.kind(id), TypeKind::Int { .. } | TypeKind::Bool)
    }

    pub fn is_unsigned(&self, id: TypeId) -> bool {
        matches!(self.kind(id), TypeKind::Int { signed: false, .. })
    }

    pub fn is_float(&self, id: TypeId) -> bool {
        matches!(self.kind(id), TypeKind::Float { .. })
    }

    pub fn is_numeric(&self, id: TypeId) -> bool {
        self.is_integral(id) || self.is_float(id)
    }

    pub fn is_vector(&self, id: TypeId) -> bool {
        matches!(self.kind(id), TypeKind::Vector2 | TypeKind::Vector3)
    }

    pub fn is_pointer(&self, id: TypeId) -> bool {
        matches!(
            self.kind(id),
            TypeKind::Pointer { .. } | TypeKind::ClassPtr { .. }
        )
    }

    /// The class a pointer type points at, if it points at a class.
    pub fn pointed_class(&self, id: TypeId) -> Option<TypeId> {
        match self.kind(id) {
            TypeKind::Pointer { pointed, .. } if self.class_def(*pointed).is_some() => {
                Some(*pointed)
            }
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store() -> (NameTable, TypeStore) {
        let mut names = NameTable::new();
        let types = TypeStore::new(&mut names);
        (names, types)
    }

    #[test]
    fn builtin_ids_line_up() {
        let (names, types) = store();
        assert!(matches!(types.kind(builtin::VOID), TypeKind::Void));
        assert!(matches!(types.kind(builtin::ERROR), TypeKind::Error));
        assert!(matches!(
            types.kind(builtin::UINT),
            TypeKind::Int { signed: false, bits: 32 }
        ));
        assert!(matches!(types.kind(builtin::FLOAT), TypeKind::Float { bits: 64 }));
        assert_eq!(names.resolve(types.name(builtin::INT)), "int");
    }

    #[test]
    fn pointer_types_dedupe() {
        let (mut names, mut types) = store();
        let cls = types.add_class(names.intern("Actor"), None, vec![]);
        let a = types.pointer_to(cls, false);
        let b = types.pointer_to(cls, false);
        let ro = types.pointer_to(cls, true);
        assert_eq!(a, b);
        assert_ne!(a, ro);
    }

    #[test]
    fn state_pointer_is_preinterned() {
        let (_, mut types) = store();
        assert_eq!(types.pointer_to(builtin::STATE, false), builtin::STATE_PTR);
    }

    #[test]
    fn class_layout_extends_parent() {
        let (mut names, mut types) = store();
        let f_health = names.intern("health");
        let f_armor = names.intern("armor");
        let base = types.add_class(names.intern("Thinker"), None, vec![(
            f_health,
            builtin::INT,
            FieldFlags::empty(),
        )]);
        let derived = types.add_class(names.intern("Actor"), Some(base), vec![(
            f_armor,
            builtin::INT,
            FieldFlags::empty(),
        )]);

        assert_eq!(types.find_field(base, f_health).unwrap().offset, 0);
        let armor = types.find_field(derived, f_armor).unwrap();
        assert_eq!(armor.offset, 4);
        // Inherited lookup walks the parent.
        assert!(types.find_field(derived, f_health).is_some());
        assert!(types.descends_from(derived, base));
        assert!(!types.descends_from(base, derived));
    }

    #[test]
    fn reg_mapping() {
        let (_, types) = store();
        assert_eq!(types.reg_class(builtin::INT), Some(RegClass::Int));
        assert_eq!(types.reg_class(builtin::NAME), Some(RegClass::Int));
        assert_eq!(types.reg_class(builtin::FLOAT), Some(RegClass::Float));
        assert_eq!(types.reg_class(builtin::STRING), Some(RegClass::String));
        assert_eq!(types.reg_class(builtin::STATE_PTR), Some(RegClass::Address));
        assert_eq!(types.reg_class(builtin::VOID), None);
        assert_eq!(types.reg_width(builtin::VEC3), 3);
        assert_eq!(types.reg_width(builtin::INT), 1);
    }

    #[test]
    fn array_size() {
        let (_, mut types) = store();
        let arr = types.array_of(builtin::INT, 8);
        assert_eq!(types.size_of(arr), 32);
    }
}
