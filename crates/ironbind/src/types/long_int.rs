//! Arbitrary precision integers.
//!
//! Python has one `int` type. The engine stores values that fit in an `i64` inline
//! as `Value::Int` and promotes to a heap [`LongInt`] only on overflow; every producer
//! goes through [`LongInt::into_value`] so results demote again when they fit.

use std::fmt;

use num_bigint::BigInt;
use num_traits::{Signed, ToPrimitive, Zero};

use crate::{
    heap::{Heap, HeapData},
    value::Value,
};

/// Wrapper around `num_bigint::BigInt` for integers outside the `i64` range.
///
/// Named `LongInt` to avoid confusion with the external `BigInt` type.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, serde::Serialize, serde::Deserialize)]
pub struct LongInt(pub BigInt);

impl LongInt {
    pub fn new(bi: BigInt) -> Self {
        Self(bi)
    }

    /// Converts to a `Value`, demoting to `Value::Int` if it fits.
    pub fn into_value(self, heap: &mut Heap) -> Value {
        if let Some(i) = self.0.to_i64() {
            Value::Int(i)
        } else {
            Value::Ref(heap.allocate(HeapData::LongInt(self)))
        }
    }

    pub fn inner(&self) -> &BigInt {
        &self.0
    }

    pub fn is_zero(&self) -> bool {
        self.0.is_zero()
    }

    pub fn is_negative(&self) -> bool {
        self.0.is_negative()
    }

    pub fn to_i64(&self) -> Option<i64> {
        self.0.to_i64()
    }

    /// Returns `None` if the value is too large to be represented as an `f64`.
    pub fn to_f64(&self) -> Option<f64> {
        self.0.to_f64().filter(|f| f.is_finite())
    }

    /// Number of significant bits; zero has 0 bits.
    pub fn bits(&self) -> u64 {
        self.0.bits()
    }

    /// Estimates the size of `base ** exponent` in bits.
    ///
    /// Returns `None` on overflow, which indicates an astronomically large result.
    /// Callers special-case bases 0, 1 and -1 first.
    pub fn estimate_pow_bits(base_bits: u64, exponent: u64) -> Option<u64> {
        base_bits.checked_mul(exponent)
    }

    /// Estimates the size of `value << shift` in bits.
    pub fn estimate_lshift_bits(value_bits: u64, shift: u64) -> Option<u64> {
        value_bits.checked_add(shift)
    }
}

impl fmt::Display for LongInt {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl From<BigInt> for LongInt {
    fn from(bi: BigInt) -> Self {
        Self(bi)
    }
}

impl From<i64> for LongInt {
    fn from(i: i64) -> Self {
        Self(BigInt::from(i))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn demotes_when_it_fits() {
        let mut heap = Heap::new();
        assert!(matches!(LongInt::from(42).into_value(&mut heap), Value::Int(42)));
        assert!(heap.is_empty());
        let big = LongInt::new(BigInt::from(i64::MAX) + 1);
        assert!(matches!(big.into_value(&mut heap), Value::Ref(_)));
        assert_eq!(heap.len(), 1);
    }

    #[test]
    fn size_estimates() {
        assert_eq!(LongInt::estimate_pow_bits(10, 3), Some(30));
        assert_eq!(LongInt::estimate_pow_bits(u64::MAX, 2), None);
        assert_eq!(LongInt::estimate_lshift_bits(1, 64), Some(65));
    }
}
