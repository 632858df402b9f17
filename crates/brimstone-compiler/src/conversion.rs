//! Numeric promotion and pointer compatibility rules.
//!
//! These predicates decide how binary operands unify and when a pointer
//! value may stand in for another pointer type. Insertion of the actual
//! cast nodes happens in the expression family; this module only answers
//! the type questions.

use brimstone_core::{TypeId, TypeKind, TypeStore, builtin};

/// Promotion target of two numeric operand types.
///
/// Both unsigned-32 → unsigned-32; both integer-family → signed-32
/// (narrower integer subtypes always widen, never stay narrow); any float
/// → 64-bit float.
pub fn numeric_promotion(types: &TypeStore, left: TypeId, right: TypeId) -> TypeId {
    if left == builtin::UINT && right == builtin::UINT {
        builtin::UINT
    } else if types.is_integral(left) && types.is_integral(right) {
        builtin::INT
    } else {
        builtin::FLOAT
    }
}

/// Whether `source` may be used where a pointer of type `dest` is needed.
///
/// Identical pointers always match; a null constant matches any pointer;
/// when comparing for equality either side may be a descendant of the
/// other; as a value, the source's pointed class must descend from the
/// destination's.
pub fn pointer_compatible(
    types: &TypeStore,
    source: TypeId,
    dest: TypeId,
    for_equality: bool,
) -> bool {
    if source == dest {
        return true;
    }
    if source == builtin::NULL_PTR || dest == builtin::NULL_PTR {
        return true;
    }
    match (types.kind(source), types.kind(dest)) {
        (
            TypeKind::Pointer { pointed: sp, .. },
            TypeKind::Pointer { pointed: dp, .. },
        ) => {
            let (sp, dp) = (*sp, *dp);
            if for_equality {
                types.descends_from(sp, dp) || types.descends_from(dp, sp)
            } else {
                types.descends_from(sp, dp)
            }
        }
        (TypeKind::ClassPtr { class: sc }, TypeKind::ClassPtr { class: dc }) => {
            let (sc, dc) = (*sc, *dc);
            if for_equality {
                types.descends_from(sc, dc) || types.descends_from(dc, sc)
            } else {
                types.descends_from(sc, dc)
            }
        }
        _ => false,
    }
}

/// Whether a readonly-qualified pointer would be written through by using
/// `source` where `dest` is expected.
pub fn loses_readonly(types: &TypeStore, source: TypeId, dest: TypeId) -> bool {
    matches!(
        (types.kind(source), types.kind(dest)),
        (
            TypeKind::Pointer { readonly: true, .. },
            TypeKind::Pointer { readonly: false, .. }
        )
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use brimstone_core::NameTable;

    fn fixture() -> (NameTable, TypeStore, TypeId, TypeId) {
        let mut names = NameTable::new();
        let mut types = TypeStore::new(&mut names);
        let base = types.add_class(names.intern("Actor"), None, vec![]);
        let derived = types.add_class(names.intern("Imp"), Some(base), vec![]);
        (names, types, base, derived)
    }

    #[test]
    fn promotion_table() {
        let (_, types, _, _) = fixture();
        use builtin::*;
        assert_eq!(numeric_promotion(&types, UINT, UINT), UINT);
        assert_eq!(numeric_promotion(&types, INT, UINT), INT);
        assert_eq!(numeric_promotion(&types, INT8, UINT16), INT);
        assert_eq!(numeric_promotion(&types, BOOL, INT), INT);
        assert_eq!(numeric_promotion(&types, INT, FLOAT), FLOAT);
        assert_eq!(numeric_promotion(&types, FLOAT, FLOAT), FLOAT);
        // A lone unsigned operand does not keep the expression unsigned.
        assert_eq!(numeric_promotion(&types, UINT, INT8), INT);
    }

    #[test]
    fn pointer_value_compatibility_is_directional() {
        let (_, mut types, base, derived) = fixture();
        let base_ptr = types.pointer_to(base, false);
        let derived_ptr = types.pointer_to(derived, false);

        assert!(pointer_compatible(&types, derived_ptr, base_ptr, false));
        assert!(!pointer_compatible(&types, base_ptr, derived_ptr, false));
        // Equality comparison accepts either direction.
        assert!(pointer_compatible(&types, base_ptr, derived_ptr, true));
    }

    #[test]
    fn null_matches_any_pointer() {
        let (_, mut types, base, _) = fixture();
        let base_ptr = types.pointer_to(base, false);
        assert!(pointer_compatible(&types, builtin::NULL_PTR, base_ptr, false));
        assert!(pointer_compatible(&types, base_ptr, builtin::NULL_PTR, true));
    }

    #[test]
    fn readonly_loss_detected() {
        let (_, mut types, base, _) = fixture();
        let ro = types.pointer_to(base, true);
        let rw = types.pointer_to(base, false);
        assert!(loses_readonly(&types, ro, rw));
        assert!(!loses_readonly(&types, rw, ro));
    }
}
