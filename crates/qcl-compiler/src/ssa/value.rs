//! SSA values and the value generator.

use std::fmt;

use ahash::{HashMap, HashMapExt};
use num_bigint::BigInt;
use num_traits::{One, Signed, Zero};
use qcl::Type;

/// Globally unique SSA value identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ValueId(pub u64);

impl fmt::Display for ValueId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "v{}", self.0)
    }
}

/// Compile-time constant payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Const {
    Int(BigInt),
    Bool(bool),
    Str(String),
}

impl Const {
    /// The constant's bit at the given position, LSB first, two's
    /// complement for negative integers at unbounded width.
    pub fn bit(&self, bit: u32) -> bool {
        match self {
            Const::Bool(b) => bit == 0 && *b,
            Const::Int(v) => {
                if v.is_negative() {
                    // Two's complement: !(|v| - 1) bitwise.
                    !(v.magnitude() - 1u8).bit(u64::from(bit))
                } else {
                    v.magnitude().bit(u64::from(bit))
                }
            }
            Const::Str(s) => {
                let byte = (bit / 8) as usize;
                byte < s.len() && s.as_bytes()[byte] & (1 << (bit % 8)) != 0
            }
        }
    }

    /// Rendered literal, used as the constant's value name.
    pub fn literal(&self) -> String {
        match self {
            Const::Int(v) => format!("${v}"),
            Const::Bool(b) => format!("${b}"),
            Const::Str(s) => format!("${s:?}"),
        }
    }
}

/// Pointer payload: where in which container the value points.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PtrInfo {
    /// Binding key of the container in the enclosing bindings.
    pub name: String,
    pub scope: u32,
    pub container_type: Type,
    /// Bit offset of the pointed-to element inside the container.
    pub offset: u32,
}

/// An SSA value: a (name, scope) pair at a concrete version, a type,
/// and optionally a compile-time constant or pointer payload.
#[derive(Debug, Clone)]
pub struct Value {
    pub name: String,
    pub scope: u32,
    pub typ: Type,
    pub id: ValueId,
    pub konst: Option<Const>,
    pub ptr: Option<PtrInfo>,
}

impl Value {
    pub fn is_const(&self) -> bool {
        self.konst.is_some()
    }

    /// Value equality: constants compare by literal and type, variables
    /// by SSA id.
    pub fn equal(&self, other: &Value) -> bool {
        match (&self.konst, &other.konst) {
            (Some(a), Some(b)) => a == b && self.typ == other.typ,
            (None, None) => self.id == other.id,
            _ => false,
        }
    }

    /// Constant integer payload, if any.
    pub fn const_int(&self) -> Option<BigInt> {
        match &self.konst {
            Some(Const::Int(v)) => Some(v.clone()),
            Some(Const::Bool(b)) => Some(if *b { BigInt::one() } else { BigInt::zero() }),
            _ => None,
        }
    }

    /// The constant's bit at the given position.
    pub fn bit(&self, bit: u32) -> bool {
        self.konst.as_ref().is_some_and(|k| k.bit(bit))
    }

    /// Binding key of the value in a bindings map.
    pub fn binding_key(&self) -> String {
        format!("{}@{}", self.name, self.scope)
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(konst) = &self.konst {
            write!(f, "{}/{}", konst.literal(), self.typ)
        } else {
            write!(f, "{}{{{}}}{}/{}", self.name, self.scope, self.id, self.typ)
        }
    }
}

/// Produces SSA values with globally unique, monotonically increasing
/// ids, and tracks the constants a program uses.
pub struct Generator {
    next_id: u64,
    next_anon: u64,
    constants: HashMap<String, Value>,
}

impl Default for Generator {
    fn default() -> Generator {
        Generator::new()
    }
}

impl Generator {
    pub fn new() -> Generator {
        Generator {
            next_id: 0,
            next_anon: 0,
            constants: HashMap::new(),
        }
    }

    fn next_id(&mut self) -> ValueId {
        let id = ValueId(self.next_id);
        self.next_id += 1;
        id
    }

    /// A new version of the named variable.
    pub fn new_val(&mut self, name: impl Into<String>, typ: Type, scope: u32) -> Value {
        Value {
            name: name.into(),
            scope,
            typ,
            id: self.next_id(),
            konst: None,
            ptr: None,
        }
    }

    /// A fresh anonymous value.
    pub fn anon_val(&mut self, typ: Type) -> Value {
        let name = format!("%_{}", self.next_anon);
        self.next_anon += 1;
        self.new_val(name, typ, 0)
    }

    /// A constant value. The type is fixed from the literal unless the
    /// caller supplies one.
    pub fn constant(&mut self, konst: Const, typ: Type) -> Value {
        let name = konst.literal();
        Value {
            name,
            scope: 0,
            typ,
            id: self.next_id(),
            konst: Some(konst),
            ptr: None,
        }
    }

    /// Record a constant in the program's constant table.
    pub fn add_constant(&mut self, value: &Value) {
        debug_assert!(value.is_const());
        self.constants
            .entry(value.name.clone())
            .or_insert_with(|| value.clone());
    }

    pub fn remove_constant(&mut self, value: &Value) {
        self.constants.remove(&value.name);
    }

    /// The used constants, sorted by name for deterministic wire
    /// definition order.
    pub fn constants(&self) -> Vec<Value> {
        let mut consts: Vec<Value> = self.constants.values().cloned().collect();
        consts.sort_by(|a, b| a.name.cmp(&b.name));
        consts
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ids_are_unique_and_increasing() {
        let mut gen = Generator::new();
        let a = gen.new_val("x", Type::Uint(8), 1);
        let b = gen.new_val("x", Type::Uint(8), 1);
        assert!(a.id < b.id);
        assert!(!a.equal(&b));
    }

    #[test]
    fn constants_compare_by_literal() {
        let mut gen = Generator::new();
        let a = gen.constant(Const::Int(BigInt::from(7)), Type::Uint(4));
        let b = gen.constant(Const::Int(BigInt::from(7)), Type::Uint(4));
        assert!(a.equal(&b));
        let c = gen.constant(Const::Int(BigInt::from(7)), Type::Uint(8));
        assert!(!a.equal(&c));
    }

    #[test]
    fn negative_constant_bits_are_twos_complement() {
        let konst = Const::Int(BigInt::from(-2));
        // ...11110 at any width.
        assert!(!konst.bit(0));
        assert!(konst.bit(1));
        assert!(konst.bit(2));
        assert!(konst.bit(31));
    }

    #[test]
    fn string_constant_bits() {
        let konst = Const::Str("A".to_string()); // 0x41
        assert!(konst.bit(0));
        assert!(!konst.bit(1));
        assert!(konst.bit(6));
        assert!(!konst.bit(9));
    }

    #[test]
    fn constant_table_sorted() {
        let mut gen = Generator::new();
        let b = gen.constant(Const::Int(BigInt::from(2)), Type::Uint(2));
        let a = gen.constant(Const::Int(BigInt::from(1)), Type::Uint(2));
        gen.add_constant(&b);
        gen.add_constant(&a);
        let consts = gen.constants();
        assert_eq!(consts.len(), 2);
        assert!(consts[0].name < consts[1].name);
    }
}
