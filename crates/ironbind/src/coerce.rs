//! Numeric coercion kernel.
//!
//! Pure, value-level conversions between Python scalars and managed primitives.
//! Nothing here calls hooks or consults the overload rules: the conversion layer
//! decides *whether* a conversion is allowed in a context, this module decides
//! whether a particular value survives it.

use std::collections::VecDeque;

use num_bigint::BigInt;
use num_traits::{ToPrimitive, Zero};

use crate::{
    exception::{ExcType, RunError},
    heap::{Heap, HeapData},
    types::{Decimal, EnumId, PrimKind, PrimTarget, PrimValue, Primitive, PrimitiveRegistry},
    value::Value,
};

/// A scalar extracted from a Python or managed value.
#[derive(Debug, Clone, PartialEq)]
pub enum Scalar {
    Int(BigInt),
    Float(f64),
    Bool(bool),
    /// A managed `Char` (UTF-16 code unit).
    Char(u16),
    Str(String),
    Decimal(Decimal),
    Enum(EnumId, i64),
}

/// Why a coercion failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CoerceError {
    /// The value lies outside the target's range.
    Overflow,
    /// The source kind never converts to the target.
    TypeMismatch,
    /// NaN to an integer.
    NaN,
    /// An infinity to an integer.
    Infinity,
}

impl CoerceError {
    /// Converts to the Python exception for a coercion to `target` of a value of type `source`.
    #[must_use]
    pub fn into_run_error(self, registry: &PrimitiveRegistry, target: PrimTarget, source: &str) -> RunError {
        let desc = registry.target(target);
        match self {
            Self::Overflow => ExcType::overflow_primitive(&desc.name),
            Self::TypeMismatch => ExcType::type_error_expected_got(&desc.name, source),
            Self::NaN => ExcType::value_error_nan_to_integer(),
            Self::Infinity => ExcType::overflow_infinity_to_integer(),
        }
    }
}

/// Converts `scalar` to `target`.
///
/// The heap is only touched when the result is a string.
pub fn coerce(heap: &mut Heap, registry: &PrimitiveRegistry, scalar: &Scalar, target: PrimTarget) -> Result<Value, CoerceError> {
    let desc = registry.target(target);
    match desc.kind {
        PrimKind::Integer => {
            let PrimTarget::Primitive(p) = target else {
                return Err(CoerceError::TypeMismatch);
            };
            let v = integral_value(scalar)?;
            if !desc.in_range(&v) {
                return Err(CoerceError::Overflow);
            }
            integer_value(p, &v).ok_or(CoerceError::Overflow)
        }
        PrimKind::Float => {
            let f = match scalar {
                Scalar::Int(v) => big_to_f64(v),
                Scalar::Float(f) => *f,
                Scalar::Bool(b) => f64::from(u8::from(*b)),
                Scalar::Decimal(d) => d.to_f64(),
                Scalar::Enum(_, v) => *v as f64,
                Scalar::Char(_) | Scalar::Str(_) => return Err(CoerceError::TypeMismatch),
            };
            Ok(match target {
                PrimTarget::Primitive(Primitive::Single) => Value::Prim(PrimValue::Single(narrow_f32(f))),
                _ => Value::Float(f),
            })
        }
        PrimKind::Decimal => {
            let d = match scalar {
                Scalar::Int(v) => Decimal::from_bigint(v).ok_or(CoerceError::Overflow)?,
                Scalar::Float(f) if f.is_nan() => return Err(CoerceError::NaN),
                Scalar::Float(f) => Decimal::from_f64(*f).ok_or(CoerceError::Overflow)?,
                Scalar::Bool(b) => Decimal::from(i64::from(*b)),
                Scalar::Decimal(d) => *d,
                Scalar::Enum(_, v) => Decimal::from(*v),
                Scalar::Char(c) => Decimal::from(i64::from(*c)),
                Scalar::Str(_) => return Err(CoerceError::TypeMismatch),
            };
            Ok(Value::Prim(PrimValue::Decimal(d)))
        }
        PrimKind::Boolean => Ok(Value::Bool(match scalar {
            Scalar::Int(v) => !v.is_zero(),
            Scalar::Float(f) => *f != 0.0,
            Scalar::Bool(b) => *b,
            Scalar::Decimal(d) => !d.is_zero(),
            Scalar::Enum(_, v) => *v != 0,
            Scalar::Char(_) | Scalar::Str(_) => return Err(CoerceError::TypeMismatch),
        })),
        PrimKind::Char => match scalar {
            Scalar::Char(c) => Ok(Value::Prim(PrimValue::Char(*c))),
            Scalar::Int(v) => v.to_u16().map(|c| Value::Prim(PrimValue::Char(c))).ok_or(CoerceError::Overflow),
            _ => Err(CoerceError::TypeMismatch),
        },
        PrimKind::String => match scalar {
            Scalar::Str(s) => Ok(Value::Ref(heap.allocate(HeapData::Str(s.clone())))),
            Scalar::Char(c) => {
                let text = String::from_utf16_lossy(&[*c]);
                Ok(Value::Ref(heap.allocate(HeapData::Str(text))))
            }
            _ => Err(CoerceError::TypeMismatch),
        },
        PrimKind::Enum(id) => match scalar {
            Scalar::Enum(other, v) if *other == id => Ok(Value::Prim(PrimValue::Enum(id, *v))),
            Scalar::Int(v) => {
                if !desc.in_range(v) {
                    return Err(CoerceError::Overflow);
                }
                v.to_i64()
                    .map(|v| Value::Prim(PrimValue::Enum(id, v)))
                    .ok_or(CoerceError::Overflow)
            }
            _ => Err(CoerceError::TypeMismatch),
        },
    }
}

/// The integer an integral-target coercion works from.
fn integral_value(scalar: &Scalar) -> Result<BigInt, CoerceError> {
    match scalar {
        Scalar::Int(v) => Ok(v.clone()),
        Scalar::Bool(b) => Ok(BigInt::from(u8::from(*b))),
        Scalar::Enum(_, v) => Ok(BigInt::from(*v)),
        Scalar::Float(f) => float_to_bigint(*f),
        Scalar::Decimal(d) => Ok(d.trunc()),
        Scalar::Char(_) | Scalar::Str(_) => Err(CoerceError::TypeMismatch),
    }
}

/// Truncates a float toward zero.
pub fn float_to_bigint(f: f64) -> Result<BigInt, CoerceError> {
    if f.is_nan() {
        return Err(CoerceError::NaN);
    }
    if f.is_infinite() {
        return Err(CoerceError::Infinity);
    }
    num_traits::FromPrimitive::from_f64(f.trunc()).ok_or(CoerceError::Overflow)
}

/// Converts a big integer to the nearest float; huge magnitudes give ±∞.
#[must_use]
pub fn big_to_f64(v: &BigInt) -> f64 {
    match v.to_f64() {
        Some(f) => f,
        None if v.sign() == num_bigint::Sign::Minus => f64::NEG_INFINITY,
        None => f64::INFINITY,
    }
}

#[expect(clippy::cast_possible_truncation, reason = "Single holds the nearest f32")]
fn narrow_f32(f: f64) -> f32 {
    f as f32
}

/// Builds the value of an in-range integer for an integer primitive.
fn integer_value(p: Primitive, v: &BigInt) -> Option<Value> {
    if p == Primitive::Int32 {
        return v.to_i64().map(Value::Int);
    }
    PrimValue::from_integer(p, v).map(Value::Prim)
}

/// Value-preserving widening edges between integer primitives.
const WIDENING_EDGES: [(Primitive, Primitive); 10] = [
    (Primitive::SByte, Primitive::Int16),
    (Primitive::Byte, Primitive::Int16),
    (Primitive::Byte, Primitive::UInt16),
    (Primitive::Int16, Primitive::Int32),
    (Primitive::UInt16, Primitive::Int32),
    (Primitive::UInt16, Primitive::UInt32),
    (Primitive::Int32, Primitive::Int64),
    (Primitive::UInt32, Primitive::Int64),
    (Primitive::UInt32, Primitive::UInt64),
    (Primitive::Char, Primitive::UInt16),
];

/// Minimum number of widening steps from `from` to `to`, or `None` if no chain exists.
#[must_use]
pub fn widening_chain(from: Primitive, to: Primitive) -> Option<u32> {
    if from == to {
        return Some(0);
    }
    let mut queue = VecDeque::from([(from, 0u32)]);
    let mut seen = vec![from];
    while let Some((current, steps)) = queue.pop_front() {
        for (src, dst) in WIDENING_EDGES {
            if src != current || seen.contains(&dst) {
                continue;
            }
            if dst == to {
                return Some(steps + 1);
            }
            seen.push(dst);
            queue.push_back((dst, steps + 1));
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    fn run(scalar: Scalar, target: Primitive) -> Result<Value, CoerceError> {
        let mut heap = Heap::new();
        let registry = PrimitiveRegistry::new();
        coerce(&mut heap, &registry, &scalar, PrimTarget::Primitive(target))
    }

    #[test]
    fn integer_ranges() {
        let huge = -num_traits::pow(BigInt::from(2), 777);
        assert_eq!(run(Scalar::Int(huge), Primitive::Int32).unwrap_err(), CoerceError::Overflow);
        assert!(matches!(
            run(Scalar::Int(BigInt::from(65535)), Primitive::Char),
            Ok(Value::Prim(PrimValue::Char(65535)))
        ));
        assert_eq!(
            run(Scalar::Int(BigInt::from(65536)), Primitive::Char).unwrap_err(),
            CoerceError::Overflow
        );
        assert!(matches!(
            run(Scalar::Int(BigInt::from(-128)), Primitive::SByte),
            Ok(Value::Prim(PrimValue::SByte(-128)))
        ));
        assert!(matches!(
            run(Scalar::Int(BigInt::from(7)), Primitive::Int32),
            Ok(Value::Int(7))
        ));
        assert!(matches!(run(Scalar::Bool(true), Primitive::Byte), Ok(Value::Prim(PrimValue::Byte(1)))));
    }

    #[test]
    fn floats() {
        assert_eq!(run(Scalar::Float(f64::NAN), Primitive::Int32).unwrap_err(), CoerceError::NaN);
        assert_eq!(
            run(Scalar::Float(f64::INFINITY), Primitive::Int64).unwrap_err(),
            CoerceError::Infinity
        );
        assert!(matches!(run(Scalar::Float(-1.9), Primitive::Int16), Ok(Value::Prim(PrimValue::Int16(-1)))));
        assert!(matches!(
            run(Scalar::Float(1e300), Primitive::Single),
            Ok(Value::Prim(PrimValue::Single(f))) if f.is_infinite()
        ));
        let big = num_traits::pow(BigInt::from(10), 400);
        assert!(matches!(run(Scalar::Int(big), Primitive::Double), Ok(Value::Float(f)) if f == f64::INFINITY));
        assert!(matches!(run(Scalar::Float(0.0), Primitive::Boolean), Ok(Value::Bool(false))));
    }

    #[test]
    fn decimals_and_strings() {
        assert!(matches!(
            run(Scalar::Float(10.2), Primitive::Decimal),
            Ok(Value::Prim(PrimValue::Decimal(d))) if d.to_string() == "10.2"
        ));
        assert_eq!(run(Scalar::Float(1e30), Primitive::Decimal).unwrap_err(), CoerceError::Overflow);
        assert_eq!(
            run(Scalar::Str("1".to_owned()), Primitive::Int32).unwrap_err(),
            CoerceError::TypeMismatch
        );
        assert_eq!(run(Scalar::Char(65), Primitive::Int32).unwrap_err(), CoerceError::TypeMismatch);
        assert!(matches!(run(Scalar::Char(65), Primitive::String), Ok(Value::Ref(_))));
    }

    #[test]
    fn enums() {
        let mut heap = Heap::new();
        let mut registry = PrimitiveRegistry::new();
        let color = registry.define_enum("Color", Primitive::Byte, [("Red".to_owned(), 1)]);
        let target = PrimTarget::Enum(color);
        assert!(matches!(
            coerce(&mut heap, &registry, &Scalar::Int(BigInt::from(200)), target),
            Ok(Value::Prim(PrimValue::Enum(id, 200))) if id == color
        ));
        assert_eq!(
            coerce(&mut heap, &registry, &Scalar::Int(BigInt::from(256)), target).unwrap_err(),
            CoerceError::Overflow
        );
        assert!(matches!(
            coerce(&mut heap, &registry, &Scalar::Enum(color, 1), PrimTarget::Primitive(Primitive::Int64)),
            Ok(Value::Prim(PrimValue::Int64(1)))
        ));
    }

    #[test]
    fn widening() {
        assert_eq!(widening_chain(Primitive::Byte, Primitive::Int64), Some(3));
        assert_eq!(widening_chain(Primitive::Int32, Primitive::Int32), Some(0));
        assert_eq!(widening_chain(Primitive::Char, Primitive::UInt64), Some(3));
        assert_eq!(widening_chain(Primitive::Int64, Primitive::Int32), None);
        assert_eq!(widening_chain(Primitive::SByte, Primitive::UInt16), None);
    }
}
