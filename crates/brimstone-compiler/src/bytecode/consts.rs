//! Per-kind constant tables with dedup-by-value.
//!
//! Constant-backed register handles index one of four tables, matching the
//! four register files. Integer-backed host values (names, colors, sounds,
//! sprite/texture ids) share the int table; addresses carry a tag telling
//! the runtime what the raw value points at.

use brimstone_core::{FuncId, NameId, TypeId};
use ordered_float::OrderedFloat;
use rustc_hash::FxHashMap;

use crate::builtins::BuiltinId;

/// A tagged address constant.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum AddrConst {
    Null,
    /// Class descriptor address.
    Class(TypeId),
    /// A global variable's storage address.
    Global(u32),
    /// Script or native function entry point.
    Function(FuncId),
    /// Pre-registered builtin helper.
    Builtin(BuiltinId),
    /// A state-label path (`scope.label.sublabel`), resolved by the host
    /// at state-jump time.
    StateLabel(Vec<NameId>),
}

/// The four constant tables of one function, deduplicated by value.
#[derive(Debug, Default)]
pub struct ConstantTables {
    ints: Vec<i32>,
    floats: Vec<f64>,
    strings: Vec<String>,
    addrs: Vec<AddrConst>,
    int_index: FxHashMap<i32, u16>,
    float_index: FxHashMap<OrderedFloat<f64>, u16>,
    string_index: FxHashMap<String, u16>,
    addr_index: FxHashMap<AddrConst, u16>,
}

impl ConstantTables {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn intern_int(&mut self, value: i32) -> u16 {
        if let Some(&idx) = self.int_index.get(&value) {
            return idx;
        }
        let idx = self.ints.len() as u16;
        self.ints.push(value);
        self.int_index.insert(value, idx);
        idx
    }

    pub fn intern_float(&mut self, value: f64) -> u16 {
        if let Some(&idx) = self.float_index.get(&OrderedFloat(value)) {
            return idx;
        }
        let idx = self.floats.len() as u16;
        self.floats.push(value);
        self.float_index.insert(OrderedFloat(value), idx);
        idx
    }

    pub fn intern_string(&mut self, value: &str) -> u16 {
        if let Some(&idx) = self.string_index.get(value) {
            return idx;
        }
        let idx = self.strings.len() as u16;
        self.strings.push(value.to_string());
        self.string_index.insert(value.to_string(), idx);
        idx
    }

    pub fn intern_addr(&mut self, value: AddrConst) -> u16 {
        if let Some(&idx) = self.addr_index.get(&value) {
            return idx;
        }
        let idx = self.addrs.len() as u16;
        self.addr_index.insert(value.clone(), idx);
        self.addrs.push(value);
        idx
    }

    pub fn ints(&self) -> &[i32] {
        &self.ints
    }

    pub fn floats(&self) -> &[f64] {
        &self.floats
    }

    pub fn strings(&self) -> &[String] {
        &self.strings
    }

    pub fn addrs(&self) -> &[AddrConst] {
        &self.addrs
    }
}
