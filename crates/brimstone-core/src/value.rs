//! Compile-time constant values.
//!
//! Constant folding produces a [`Value`]; the tag must always agree with
//! the owning node's resolved type's register class
//! ([`Value::reg_class`]).

use std::fmt;

use crate::names::{NameId, NameTable};
use crate::types::{RegClass, TypeId};

/// Epsilon for approximate float equality (`~==`).
pub const APPROX_EPSILON: f64 = 1.0 / 65536.0;

/// A pointer-valued constant with its type tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PtrConst {
    /// The null pointer, compatible with every pointer type.
    Null,
    /// Address of a class descriptor.
    Class(TypeId),
}

/// Tagged compile-time value.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Int(i32),
    Uint(u32),
    Float(f64),
    /// Short text; interned, compared by id.
    Name(NameId),
    Str(String),
    Ptr(PtrConst),
}

impl Value {
    /// The register file this value's tag belongs to. Must match the
    /// owning node's resolved type.
    pub fn reg_class(&self) -> RegClass {
        match self {
            Value::Int(_) | Value::Uint(_) | Value::Name(_) => RegClass::Int,
            Value::Float(_) => RegClass::Float,
            Value::Str(_) => RegClass::String,
            Value::Ptr(_) => RegClass::Address,
        }
    }

    /// Integer bits regardless of signedness tag; `None` for non-integers.
    pub fn int_bits(&self) -> Option<i32> {
        match self {
            Value::Int(v) => Some(*v),
            Value::Uint(v) => Some(*v as i32),
            _ => None,
        }
    }

    /// Numeric value widened to float; integers convert exactly within
    /// 2^53.
    pub fn as_float(&self) -> Option<f64> {
        match self {
            Value::Int(v) => Some(f64::from(*v)),
            Value::Uint(v) => Some(f64::from(*v)),
            Value::Float(v) => Some(*v),
            _ => None,
        }
    }

    /// Truthiness used by bool folding: nonzero / non-empty / non-null.
    pub fn as_bool(&self) -> bool {
        match self {
            Value::Int(v) => *v != 0,
            Value::Uint(v) => *v != 0,
            Value::Float(v) => *v != 0.0,
            Value::Name(n) => !n.is_none(),
            Value::Str(s) => !s.is_empty(),
            Value::Ptr(p) => *p != PtrConst::Null,
        }
    }

    pub fn is_null_ptr(&self) -> bool {
        matches!(self, Value::Ptr(PtrConst::Null))
    }

    /// Render the value as source text for string folding/diagnostics.
    pub fn to_text(&self, names: &NameTable) -> String {
        match self {
            Value::Int(v) => v.to_string(),
            Value::Uint(v) => v.to_string(),
            Value::Float(v) => {
                if v.fract() == 0.0 && v.is_finite() {
                    format!("{v:.1}")
                } else {
                    v.to_string()
                }
            }
            Value::Name(n) => names.resolve(*n).to_string(),
            Value::Str(s) => s.clone(),
            Value::Ptr(PtrConst::Null) => "null".to_string(),
            Value::Ptr(PtrConst::Class(_)) => "<class>".to_string(),
        }
    }
}

/// Approximate float equality with the fixed [`APPROX_EPSILON`].
#[inline]
pub fn approx_eq(a: f64, b: f64) -> bool {
    (a - b).abs() < APPROX_EPSILON
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Int(v) => write!(f, "{v}"),
            Value::Uint(v) => write!(f, "{v}u"),
            Value::Float(v) => write!(f, "{v}"),
            Value::Name(n) => write!(f, "'name#{}'", n.0),
            Value::Str(s) => write!(f, "{s:?}"),
            Value::Ptr(PtrConst::Null) => write!(f, "null"),
            Value::Ptr(PtrConst::Class(t)) => write!(f, "class#{}", t.0),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tag_maps_to_reg_class() {
        assert_eq!(Value::Int(-1).reg_class(), RegClass::Int);
        assert_eq!(Value::Uint(1).reg_class(), RegClass::Int);
        assert_eq!(Value::Name(NameId(3)).reg_class(), RegClass::Int);
        assert_eq!(Value::Float(0.5).reg_class(), RegClass::Float);
        assert_eq!(Value::Str("x".into()).reg_class(), RegClass::String);
        assert_eq!(Value::Ptr(PtrConst::Null).reg_class(), RegClass::Address);
    }

    #[test]
    fn truthiness() {
        assert!(!Value::Int(0).as_bool());
        assert!(Value::Int(-1).as_bool());
        assert!(!Value::Str(String::new()).as_bool());
        assert!(Value::Str("x".into()).as_bool());
        assert!(!Value::Ptr(PtrConst::Null).as_bool());
    }

    #[test]
    fn approx_equality_uses_fixed_epsilon() {
        assert!(approx_eq(1.0, 1.0 + APPROX_EPSILON / 2.0));
        assert!(!approx_eq(1.0, 1.0 + APPROX_EPSILON * 2.0));
    }

    #[test]
    fn float_text_keeps_a_fraction_digit() {
        let names = NameTable::new();
        assert_eq!(Value::Float(2.0).to_text(&names), "2.0");
        assert_eq!(Value::Int(7).to_text(&names), "7");
    }
}
