//! Conversion-hook resolution: `__index__`, `__int__`, `__float__`, `__complex__`,
//! `__bool__`, `__bytes__` and `__length_hint__`.
//!
//! Hooks are found on the class only (see [`Runtime::lookup_hook`]). Instances of
//! builtin subclasses answer from their builtin payload before any hook is tried,
//! the way `PyNumber_Index` accepts every `int` subclass as-is.

use num_bigint::BigInt;
use num_traits::{Signed, ToPrimitive, Zero};

use crate::{
    args::ArgValues,
    coerce::{CoerceError, big_to_f64, float_to_bigint},
    exception::{ExcType, RunResult},
    heap::HeapData,
    runtime::Runtime,
    types::{Complex, PrimValue, Type},
    value::Value,
};

/// Whether `__length_hint__` is consulted while sizing a new sequence.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LengthHintPolicy {
    /// The hint is called and a bad result raises.
    Strict,
    /// The hint is never called.
    Advisory,
}

impl Runtime {
    /// `operator.index(obj)`.
    pub fn to_index(&mut self, obj: Value) -> RunResult<BigInt> {
        self.index_with_origin(obj).map(|(v, _)| v)
    }

    /// Like [`Runtime::to_index`], also naming the type that produced the value: the
    /// object itself, including when its `__index__` hook ran.
    fn index_with_origin(&mut self, obj: Value) -> RunResult<(BigInt, String)> {
        if let Some(v) = self.int_payload(obj) {
            return Ok((v, self.type_name(obj)));
        }
        if let Some(result) = self.call_hook(obj, "__index__", ArgValues::Empty)? {
            return match self.int_payload(result) {
                Some(v) => Ok((v, self.type_name(obj))),
                None => Err(ExcType::type_error_not_integer(&self.type_name(obj))),
            };
        }
        Err(ExcType::type_error_not_integer(&self.type_name(obj)))
    }

    /// The integer an object *is*: ints, bools, typed integer primitives, enums and
    /// int subclasses. Never runs a hook.
    pub(crate) fn int_payload(&self, obj: Value) -> Option<BigInt> {
        match obj {
            Value::Prim(p) => p.integer(),
            _ => {
                let base = self.unwrap_base(obj);
                self.as_bigint(base)
            }
        }
    }

    /// True if `to_index` can succeed without raising a type error.
    pub(crate) fn has_index(&self, obj: Value) -> bool {
        self.int_payload(obj).is_some() || self.lookup_hook(obj, "__index__").is_some()
    }

    /// `to_index` fitted into a machine index.
    ///
    /// Overflow names the type of the integer that did not fit.
    pub fn index_sized(&mut self, obj: Value) -> RunResult<i64> {
        let (value, origin) = self.index_with_origin(obj)?;
        value.to_i64().ok_or_else(|| ExcType::overflow_index_sized(&origin))
    }

    /// Converts an optional slice or search bound; `None` stays `None`, huge values
    /// saturate.
    pub(crate) fn optional_index(&mut self, obj: Option<Value>) -> RunResult<Option<i64>> {
        match obj {
            None | Some(Value::None) => Ok(None),
            Some(v) => {
                let n = self.to_index(v)?;
                Ok(Some(n.to_i64().unwrap_or(if n.is_negative() { i64::MIN } else { i64::MAX })))
            }
        }
    }

    /// `int(obj)` for non-string objects: `__int__`, then `__index__`; floats truncate.
    pub fn to_int(&mut self, obj: Value) -> RunResult<Value> {
        if let Some(v) = self.int_payload(obj) {
            return Ok(self.new_int(v));
        }
        let base = self.unwrap_base(obj);
        match base {
            Value::Float(f) => return self.float_to_int(f),
            Value::Prim(PrimValue::Single(f)) => return self.float_to_int(f64::from(f)),
            Value::Prim(PrimValue::Decimal(d)) => return Ok(self.new_int(d.trunc())),
            _ => {}
        }
        if let Some(result) = self.call_hook(obj, "__int__", ArgValues::Empty)? {
            return match self.int_payload(result) {
                Some(v) => Ok(self.new_int(v)),
                None => Err(ExcType::type_error_hook_result(
                    "__int__",
                    "int",
                    &self.type_name(result),
                )),
            };
        }
        if self.lookup_hook(obj, "__index__").is_some() {
            let v = self.to_index(obj)?;
            return Ok(self.new_int(v));
        }
        Err(ExcType::type_error_int_conversion(&self.type_name(obj)))
    }

    fn float_to_int(&mut self, f: f64) -> RunResult<Value> {
        match float_to_bigint(f) {
            Ok(v) => Ok(self.new_int(v)),
            Err(CoerceError::NaN) => Err(ExcType::value_error_nan_to_integer()),
            Err(_) => Err(ExcType::overflow_infinity_to_integer()),
        }
    }

    /// `float(obj)` for non-string objects: `__float__`, then `__index__`.
    pub fn to_float(&mut self, obj: Value) -> RunResult<f64> {
        if let Some(f) = self.float_payload(obj)? {
            return Ok(f);
        }
        if let Some(result) = self.call_hook(obj, "__float__", ArgValues::Empty)? {
            return match self.unwrap_base(result) {
                Value::Float(f) => Ok(f),
                _ => Err(ExcType::type_error_hook_result(
                    "__float__",
                    "float",
                    &self.type_name(result),
                )),
            };
        }
        if self.lookup_hook(obj, "__index__").is_some() {
            let v = self.to_index(obj)?;
            return int_to_f64(&v);
        }
        Err(ExcType::type_error_float_conversion(&self.type_name(obj)))
    }

    /// The float an object *is*, with ints converted; never runs a hook.
    fn float_payload(&self, obj: Value) -> RunResult<Option<f64>> {
        match self.unwrap_base(obj) {
            Value::Float(f) => Ok(Some(f)),
            Value::Prim(PrimValue::Single(f)) => Ok(Some(f64::from(f))),
            Value::Prim(PrimValue::Decimal(d)) => Ok(Some(d.to_f64())),
            _ => match self.int_payload(obj) {
                Some(v) => int_to_f64(&v).map(Some),
                None => Ok(None),
            },
        }
    }

    /// `complex(obj)`: `__complex__`, falling back to the float conversion.
    pub fn to_complex(&mut self, obj: Value) -> RunResult<Complex> {
        if let Value::Ref(id) = self.unwrap_base(obj)
            && let HeapData::Complex(c) = self.heap.get(id)
        {
            return Ok(*c);
        }
        if let Some(result) = self.call_hook(obj, "__complex__", ArgValues::Empty)? {
            if let Value::Ref(id) = self.unwrap_base(result)
                && let HeapData::Complex(c) = self.heap.get(id)
            {
                return Ok(*c);
            }
            return Err(ExcType::type_error_hook_result(
                "__complex__",
                "complex",
                &self.type_name(result),
            ));
        }
        match self.to_float(obj) {
            Ok(re) => Ok(Complex::new(re, 0.0)),
            Err(err) if err.matches(ExcType::TypeError) => {
                Err(ExcType::type_error_complex_conversion(&self.type_name(obj)))
            }
            Err(err) => Err(err),
        }
    }

    /// Truth value: `__bool__`, then `__len__`, else true.
    pub fn to_bool(&mut self, obj: Value) -> RunResult<bool> {
        match obj {
            Value::None => return Ok(false),
            Value::NotImplemented | Value::Type(_) => return Ok(true),
            Value::Bool(b) => return Ok(b),
            Value::Int(i) => return Ok(i != 0),
            Value::Float(f) => return Ok(f != 0.0),
            Value::Prim(PrimValue::Single(f)) => return Ok(f != 0.0),
            Value::Prim(PrimValue::Decimal(d)) => return Ok(!d.is_zero()),
            Value::Prim(PrimValue::Char(c)) => return Ok(c != 0),
            Value::Prim(p) => return Ok(p.integer().is_some_and(|v| !v.is_zero())),
            Value::Ref(_) => {}
        }
        if let Some(result) = self.call_hook(obj, "__bool__", ArgValues::Empty)? {
            return match result {
                Value::Bool(b) => Ok(b),
                other => Err(ExcType::type_error_bool_result(&self.type_name(other))),
            };
        }
        if let Some(result) = self.call_hook(obj, "__len__", ArgValues::Empty)? {
            let len = self.to_index(result)?;
            if len.is_negative() {
                return Err(ExcType::value_error_negative_len());
            }
            return Ok(!len.is_zero());
        }
        let target = self.unwrap_base(obj);
        if !target.is(&obj) {
            return self.to_bool(target);
        }
        let Value::Ref(id) = obj else {
            return Ok(true);
        };
        Ok(match self.heap.get(id) {
            HeapData::Str(s) => !s.is_empty(),
            HeapData::LongInt(li) => !li.is_zero(),
            HeapData::Complex(c) => c.re != 0.0 || c.im != 0.0,
            HeapData::Bytes(b) => !b.is_empty(),
            HeapData::ByteArray(b) => !b.is_empty(),
            HeapData::Array(arr) => !arr.is_empty(),
            HeapData::ManagedArray(arr) => !arr.items.is_empty(),
            HeapData::Tuple(items) | HeapData::List(items) => !items.is_empty(),
            HeapData::Dict(map) => !map.is_empty(),
            HeapData::MemoryView(view) => view.len > 0,
            _ => true,
        })
    }

    /// `__bytes__`, validated: the result must be `bytes` or an instance of a
    /// `bytes` subclass. `Ok(None)` when the class has no hook.
    pub fn to_bytes(&mut self, obj: Value) -> RunResult<Option<Value>> {
        let Some(result) = self.call_hook(obj, "__bytes__", ArgValues::Empty)? else {
            return Ok(None);
        };
        if self.isinstance(result, Type::Bytes) {
            Ok(Some(result))
        } else {
            Err(ExcType::type_error_hook_result(
                "__bytes__",
                "bytes",
                &self.type_name(result),
            ))
        }
    }

    /// Size estimate of an iterable before it is consumed.
    ///
    /// Builtin sized objects report their length. Under [`LengthHintPolicy::Strict`]
    /// an instance's `__len__` or `__length_hint__` is called; a `NotImplemented`
    /// hint means "unknown", a non-integer raises `TypeError`, a negative one
    /// `ValueError`. [`LengthHintPolicy::Advisory`] never calls user code.
    pub fn length_hint(&mut self, obj: Value, policy: LengthHintPolicy) -> RunResult<Option<usize>> {
        let Value::Ref(id) = obj else {
            return Ok(None);
        };
        match self.heap.get(id) {
            HeapData::Bytes(b) => return Ok(Some(b.len())),
            HeapData::ByteArray(b) => return Ok(Some(b.len())),
            HeapData::Tuple(items) | HeapData::List(items) => return Ok(Some(items.len())),
            HeapData::Iter(_) => return Ok(Some(self.iterator_length_hint(id))),
            HeapData::Instance(_) => {}
            _ => return Ok(None),
        }
        if policy == LengthHintPolicy::Advisory {
            return Ok(None);
        }
        if let Some(len) = self.call_hook(obj, "__len__", ArgValues::Empty)? {
            let len = self.index_sized(len)?;
            return Ok(usize::try_from(len).ok());
        }
        let Some(hint) = self.call_hook(obj, "__length_hint__", ArgValues::Empty)? else {
            return Ok(None);
        };
        if matches!(hint, Value::NotImplemented) {
            return Ok(None);
        }
        let Some(n) = self.int_payload(hint) else {
            return Err(ExcType::type_error_length_hint(&self.type_name(hint)));
        };
        if n.is_negative() {
            return Err(ExcType::value_error_negative_length_hint());
        }
        Ok(n.to_usize())
    }
}

fn int_to_f64(v: &BigInt) -> RunResult<f64> {
    let f = big_to_f64(v);
    if f.is_finite() {
        Ok(f)
    } else {
        Err(ExcType::overflow_int_to_float())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{EngineConfig, signature::Signature, types::ClassBuilder};

    fn with_hook(rt: &mut Runtime, hook: &str, result: Value) -> Value {
        let func = rt
            .new_function(hook, Signature::plain(["self"], []), Vec::new(), move |_, _| Ok(result))
            .unwrap();
        let class = rt.define_class(ClassBuilder::python("C").method(hook, func));
        rt.new_instance(class)
    }

    #[test]
    fn index_hook_result_must_be_int() {
        let mut rt = Runtime::new(EngineConfig::default());
        let good = with_hook(&mut rt, "__index__", Value::Int(7));
        assert_eq!(rt.to_index(good).unwrap(), BigInt::from(7));
        let text = rt.new_str("7");
        let bad = with_hook(&mut rt, "__index__", text);
        let err = rt.to_index(bad).unwrap_err();
        assert_eq!(err.message(), Some("'C' object cannot be interpreted as an integer"));
    }

    #[test]
    fn index_sized_names_the_hook_owner() {
        let mut rt = Runtime::new(EngineConfig::default());
        let big = rt.new_int(BigInt::from(2) << 222);
        let obj = with_hook(&mut rt, "__index__", big);
        let err = rt.index_sized(obj).unwrap_err();
        assert_eq!(err.message(), Some("cannot fit 'C' into an index-sized integer"));
        let err = rt.index_sized(big).unwrap_err();
        assert_eq!(err.message(), Some("cannot fit 'int' into an index-sized integer"));
    }

    #[test]
    fn instance_attributes_are_not_hooks() {
        let mut rt = Runtime::new(EngineConfig::default());
        let class = rt.define_class(ClassBuilder::python("Plain"));
        let obj = rt.new_instance(class);
        let func = rt
            .new_function("__index__", Signature::plain(Vec::<String>::new(), []), Vec::new(), |_, _| {
                Ok(Value::Int(1))
            })
            .unwrap();
        rt.setattr(obj, "__index__", func).unwrap();
        assert!(rt.to_index(obj).is_err());
    }

    #[test]
    fn advisory_hint_never_calls() {
        let mut rt = Runtime::new(EngineConfig::default());
        let text = rt.new_str("bad");
        let obj = with_hook(&mut rt, "__length_hint__", text);
        assert_eq!(rt.length_hint(obj, LengthHintPolicy::Advisory).unwrap(), None);
        let err = rt.length_hint(obj, LengthHintPolicy::Strict).unwrap_err();
        assert_eq!(err.message(), Some("__length_hint__ must be an integer, not str"));
        let unknown = with_hook(&mut rt, "__length_hint__", Value::NotImplemented);
        assert_eq!(rt.length_hint(unknown, LengthHintPolicy::Strict).unwrap(), None);
    }

    #[test]
    fn conversions_fall_back_to_index() {
        let mut rt = Runtime::new(EngineConfig::default());
        let obj = with_hook(&mut rt, "__index__", Value::Int(3));
        assert!(matches!(rt.to_int(obj).unwrap(), Value::Int(3)));
        assert!((rt.to_float(obj).unwrap() - 3.0).abs() < f64::EPSILON);
        assert_eq!(rt.to_complex(obj).unwrap(), Complex::new(3.0, 0.0));
        assert!(matches!(rt.to_int(Value::Float(-2.7)).unwrap(), Value::Int(-2)));
        let err = rt.to_int(Value::Float(f64::NAN)).unwrap_err();
        assert_eq!(err.exc_type(), Some(ExcType::ValueError));
    }
}
