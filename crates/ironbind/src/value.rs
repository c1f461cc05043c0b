use std::fmt;

use crate::{
    heap::HeapId,
    types::{PrimValue, Type},
};

/// A Python value as seen by the dispatch engine.
///
/// Immediate values (None, bools, machine-word ints, floats, typed managed primitives,
/// type objects) are stored inline; everything else is a [`HeapId`] into the runtime's
/// heap. Values are `Copy`: the heap never frees, so copies of a `Ref` stay valid.
///
/// Python's `int` uses `Int(i64)` whenever the value fits and a heap `LongInt`
/// otherwise; every operation demotes results back to `Int` when possible.
#[derive(Clone, Copy)]
pub enum Value {
    None,
    NotImplemented,
    Bool(bool),
    Int(i64),
    Float(f64),
    /// A typed managed primitive other than Int32/Double/Boolean/String, which are
    /// plain `int`/`float`/`bool`/`str` values.
    Prim(PrimValue),
    /// A type object: a builtin type, a managed primitive type, or a declared class.
    Type(Type),
    Ref(HeapId),
}

impl Value {
    /// Python `is`: identity for heap objects, value identity for immediates.
    #[must_use]
    pub fn is(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::None, Self::None) | (Self::NotImplemented, Self::NotImplemented) => true,
            (Self::Bool(a), Self::Bool(b)) => a == b,
            (Self::Int(a), Self::Int(b)) => a == b,
            (Self::Float(a), Self::Float(b)) => a.to_bits() == b.to_bits(),
            (Self::Prim(a), Self::Prim(b)) => a == b,
            (Self::Type(a), Self::Type(b)) => a == b,
            (Self::Ref(a), Self::Ref(b)) => a == b,
            _ => false,
        }
    }

    #[must_use]
    pub fn is_none(&self) -> bool {
        matches!(self, Self::None)
    }

    #[must_use]
    pub fn ref_id(&self) -> Option<HeapId> {
        match self {
            Self::Ref(id) => Some(*id),
            _ => None,
        }
    }

    /// Small-integer view of immediate integer values (bool counts as int).
    #[must_use]
    pub fn as_small_int(&self) -> Option<i64> {
        match self {
            Self::Int(i) => Some(*i),
            Self::Bool(b) => Some(i64::from(*b)),
            _ => None,
        }
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Self::Bool(b)
    }
}

impl From<i64> for Value {
    fn from(i: i64) -> Self {
        Self::Int(i)
    }
}

impl From<f64> for Value {
    fn from(f: f64) -> Self {
        Self::Float(f)
    }
}

impl fmt::Debug for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::None => f.write_str("None"),
            Self::NotImplemented => f.write_str("NotImplemented"),
            Self::Bool(b) => write!(f, "Bool({b})"),
            Self::Int(i) => write!(f, "Int({i})"),
            Self::Float(v) => write!(f, "Float({v:?})"),
            Self::Prim(p) => write!(f, "Prim({p:?})"),
            Self::Type(t) => write!(f, "Type({t:?})"),
            Self::Ref(id) => write!(f, "Ref({})", id.index()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identity() {
        assert!(Value::None.is(&Value::None));
        assert!(Value::Int(3).is(&Value::Int(3)));
        assert!(!Value::Int(1).is(&Value::Bool(true)));
        let nan = Value::Float(f64::NAN);
        assert!(nan.is(&nan));
        assert_eq!(Value::Bool(true).as_small_int(), Some(1));
    }
}
