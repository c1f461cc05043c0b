//! Argument conversions: how a value of one runtime type reaches a managed parameter.
//!
//! [`Runtime::conversion_kind`] classifies a `(from, to, context)` triple without
//! looking at values and caches the answer. [`Runtime::apply_conversion`] then runs
//! the classified conversion on a value; value-dependent kinds (narrowing, array
//! covariance) may still fail at that point.

use ahash::AHashMap;
use num_bigint::BigInt;

use super::ParamType;
use crate::{
    coerce::{CoerceError, Scalar, coerce, widening_chain},
    exception::{ExcType, RunError, RunResult},
    heap::HeapData,
    runtime::Runtime,
    types::{ImplicitRef, ManagedArray, PrimKind, PrimTarget, PrimValue, Primitive, Type},
    value::Value,
};

/// Cache of classified conversions keyed by source type, target and context.
pub(crate) type ConversionCache = AHashMap<(Type, ParamType, ConversionContext), ConversionKind>;

/// Where a conversion happens.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ConversionContext {
    /// Overload selection and parameter passing.
    Implicit,
    /// A cast: `Int32(x)`, `Char(65)`.
    Explicit,
}

/// Which Python hook a hook-driven conversion calls.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HookKind {
    Index,
    Int,
    Float,
    Truthiness,
}

/// Outcome of classifying a `(from, to)` pair.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConversionKind {
    Identity,
    /// Reference conversion to an ancestor, `n` steps up.
    Subtype(u32),
    /// Value-preserving numeric conversion; the detail orders competing targets.
    Widening(u32),
    /// Range-checked numeric conversion.
    Narrowing(u32),
    /// An `op_Implicit` declared on the source or target class.
    UserImplicit(ImplicitRef),
    /// A value type passed as the object root.
    Boxing,
    Hook(HookKind),
    /// Conversion to the payload of a `Nullable<T>`.
    NullableWrap(Box<Self>),
    /// A managed array passed where an array of an ancestor element type is expected.
    ArrayCovariance,
    /// A buffer copied into a fresh `Byte[]`.
    BufferCopy,
    /// `None` to a reference type.
    NoneToRef,
    Incompatible,
}

/// Detail added to every conversion to the object root, so that any specific
/// parameter type beats `object`.
const OBJECT_ROOT: u32 = 1 << 16;

/// Detail added when the source is `bool` rather than `int`.
const FROM_BOOL: u32 = 512;

/// Detail of conversions that are only allowed as casts.
const CAST_ONLY: u32 = 1024;

/// Detail of truncating float-to-integer conversions, after every float target.
const TRUNCATING: u32 = 100;

impl ConversionKind {
    /// Position in the preference order; lower is better. Compared lexicographically.
    #[must_use]
    pub fn rank(&self) -> (u8, u32) {
        match self {
            Self::Identity | Self::NoneToRef => (0, 0),
            Self::Subtype(d) => (1, *d),
            Self::ArrayCovariance => (1, 0),
            Self::BufferCopy => (1, 100),
            Self::Widening(d) => (2, *d),
            Self::Narrowing(d) => (3, *d),
            Self::UserImplicit(_) => (4, 0),
            Self::Boxing => (5, 0),
            Self::Hook(_) => (6, 0),
            Self::NullableWrap(inner) => {
                let (class, detail) = inner.rank();
                (class, detail + 1000)
            }
            Self::Incompatible => (u8::MAX, 0),
        }
    }

    #[must_use]
    pub fn is_compatible(&self) -> bool {
        !matches!(self, Self::Incompatible)
    }

    /// True if applying the conversion can still fail for particular values, which
    /// makes a selection depending on it uncacheable.
    #[must_use]
    pub fn is_value_dependent(&self) -> bool {
        match self {
            Self::Narrowing(_) | Self::ArrayCovariance => true,
            Self::NullableWrap(inner) => inner.is_value_dependent(),
            _ => false,
        }
    }

    /// True for conversions that run user code; they are applied only to the winner.
    #[must_use]
    pub fn is_deferred(&self) -> bool {
        match self {
            Self::Hook(_) | Self::UserImplicit(_) => true,
            Self::NullableWrap(inner) => inner.is_deferred(),
            _ => false,
        }
    }

    #[must_use]
    pub fn label(&self) -> String {
        match self {
            Self::Identity => "identity".to_owned(),
            Self::Subtype(d) => format!("subtype({d})"),
            Self::Widening(d) => format!("widening({d})"),
            Self::Narrowing(d) => format!("narrowing({d})"),
            Self::UserImplicit(_) => "implicit".to_owned(),
            Self::Boxing => "boxing".to_owned(),
            Self::Hook(h) => format!("hook({h:?})"),
            Self::NullableWrap(inner) => format!("nullable({})", inner.label()),
            Self::ArrayCovariance => "array-covariance".to_owned(),
            Self::BufferCopy => "buffer-copy".to_owned(),
            Self::NoneToRef => "none".to_owned(),
            Self::Incompatible => "incompatible".to_owned(),
        }
    }
}

/// Why applying a conversion failed.
#[derive(Debug)]
pub(crate) enum ConvertFailure {
    /// The value is not of a convertible kind; the candidate does not apply.
    Mismatch,
    /// The value is of the right kind but out of range.
    Range(RunError),
    /// User code raised.
    Raised(RunError),
}

/// Preference among integer targets for a Python int: narrowest first, signed before
/// unsigned at equal width.
fn int_target_rank(p: Primitive) -> u32 {
    u32::from(p.bit_width()) * 2 + u32::from(!p.is_signed())
}

impl Runtime {
    /// Classifies how a value of type `from` converts to `to`, consulting the cache.
    pub fn conversion_kind(&mut self, from: Type, to: &ParamType, ctx: ConversionContext) -> ConversionKind {
        let key = (from, to.clone(), ctx);
        if let Some(kind) = self.conversions.get(&key) {
            let kind = kind.clone();
            self.trace_conversion(from, to, &kind, true);
            return kind;
        }
        let kind = self.classify(from, to, ctx);
        if self.conversions.len() >= self.config.conversion_cache_capacity {
            self.conversions.clear();
        }
        self.conversions.insert(key, kind.clone());
        self.trace_conversion(from, to, &kind, false);
        kind
    }

    fn trace_conversion(&mut self, from: Type, to: &ParamType, kind: &ConversionKind, cached: bool) {
        let from = self.name_of_type(from);
        let to = self.param_type_name(to);
        self.tracer.on_conversion(&from, &to, &kind.label(), cached);
    }

    fn classify(&self, from: Type, to: &ParamType, ctx: ConversionContext) -> ConversionKind {
        let structural = self.classify_structural(from, to, ctx);
        if matches!(structural, ConversionKind::Incompatible | ConversionKind::Hook(_))
            && let Some(found) = self.types.find_implicit(from, to)
        {
            return ConversionKind::UserImplicit(found);
        }
        structural
    }

    fn classify_structural(&self, from: Type, to: &ParamType, ctx: ConversionContext) -> ConversionKind {
        if let ParamType::Generic(_) = to {
            return ConversionKind::Identity;
        }
        if from == Type::NoneType {
            return if to.is_reference(self) {
                ConversionKind::NoneToRef
            } else {
                ConversionKind::Incompatible
            };
        }
        match to {
            ParamType::Object => {
                if self.is_value_type(from) {
                    ConversionKind::Boxing
                } else {
                    let depth = self.types.type_distance(from, Type::Object).unwrap_or(1);
                    ConversionKind::Subtype(OBJECT_ROOT + depth)
                }
            }
            ParamType::Primitive(p) => self.classify_primitive(from, *p, ctx),
            ParamType::Enum(id) => match from {
                Type::Enum(other) if other == *id => ConversionKind::Identity,
                Type::Int => ConversionKind::Narrowing(0),
                Type::Bool => ConversionKind::Narrowing(FROM_BOOL),
                Type::Class(class) => match self.types.class(class).builtin_base {
                    Some(base) => self.classify_structural(base, to, ctx),
                    None => ConversionKind::Incompatible,
                },
                _ => ConversionKind::Incompatible,
            },
            ParamType::BigInteger => self.classify_big_integer(from, ctx),
            ParamType::Class(target) => match from {
                Type::Class(source) => match self.types.class_distance(source, *target) {
                    Some(0) => ConversionKind::Identity,
                    Some(d) => ConversionKind::Subtype(d),
                    None => ConversionKind::Incompatible,
                },
                _ => ConversionKind::Incompatible,
            },
            ParamType::Nullable(inner) => match self.classify_structural(from, inner, ctx) {
                ConversionKind::Incompatible => ConversionKind::Incompatible,
                kind => ConversionKind::NullableWrap(Box::new(kind)),
            },
            ParamType::Array(elem) => self.classify_array(from, elem),
            ParamType::Builtin(t) => match self.types.type_distance(from, *t) {
                Some(0) => ConversionKind::Identity,
                Some(d) => ConversionKind::Subtype(d),
                None => ConversionKind::Incompatible,
            },
            ParamType::Generic(_) => ConversionKind::Identity,
        }
    }

    fn is_value_type(&self, t: Type) -> bool {
        match t {
            Type::Class(id) => self.types.class(id).is_value_type(),
            other => other.is_builtin_value_type(),
        }
    }

    fn classify_primitive(&self, from: Type, p: Primitive, ctx: ConversionContext) -> ConversionKind {
        use ConversionKind::{Hook, Identity, Incompatible, Narrowing};
        let cast_only = |kind: ConversionKind| if ctx == ConversionContext::Explicit { kind } else { Incompatible };
        match from {
            Type::Int => match p {
                Primitive::Boolean => Hook(HookKind::Truthiness),
                Primitive::Char => cast_only(Narrowing(CAST_ONLY)),
                Primitive::String => Incompatible,
                Primitive::Double => Narrowing(200),
                Primitive::Single => Narrowing(201),
                Primitive::Decimal => Narrowing(300),
                int => Narrowing(int_target_rank(int)),
            },
            Type::Bool => match p {
                Primitive::Boolean => Identity,
                Primitive::Char | Primitive::String => Incompatible,
                other => match self.classify_primitive(Type::Int, other, ctx) {
                    Narrowing(d) => Narrowing(d + FROM_BOOL),
                    kind => kind,
                },
            },
            Type::Float => match p {
                Primitive::Double => Identity,
                Primitive::Single => Narrowing(1),
                Primitive::Decimal => Narrowing(2),
                Primitive::Boolean => Hook(HookKind::Truthiness),
                Primitive::Char | Primitive::String => Incompatible,
                int => Narrowing(TRUNCATING + int_target_rank(int)),
            },
            Type::Str => match p {
                Primitive::String => Identity,
                Primitive::Char => Narrowing(1),
                _ => Incompatible,
            },
            Type::Primitive(q) => self.classify_typed(q, p, ctx),
            Type::Enum(_) => match p {
                Primitive::Boolean => Hook(HookKind::Truthiness),
                int if int.is_integer() => cast_only(Narrowing(CAST_ONLY + int_target_rank(int))),
                _ => Incompatible,
            },
            Type::Class(id) => {
                let class = self.types.class(id);
                if let Some(base) = class.builtin_base {
                    let kind = self.classify_primitive(base, p, ctx);
                    if kind.is_compatible() && !matches!(kind, Hook(_)) {
                        return kind;
                    }
                }
                let has = |hook: &str| self.types.lookup_method(id, hook).is_some();
                if p.is_integer() && has("__index__") {
                    Hook(HookKind::Index)
                } else if p == Primitive::Int32 && has("__int__") {
                    Hook(HookKind::Int)
                } else if matches!(p, Primitive::Double | Primitive::Single) && has("__float__") {
                    Hook(HookKind::Float)
                } else if p == Primitive::Boolean && class.builtin_base != Some(Type::Str) {
                    Hook(HookKind::Truthiness)
                } else {
                    Incompatible
                }
            }
            Type::NoneType => Incompatible,
            _ if p == Primitive::Boolean => Hook(HookKind::Truthiness),
            _ => Incompatible,
        }
    }

    /// Typed primitive to primitive. `q` is never Int32, Double, Boolean or String:
    /// values of those are Python builtins.
    fn classify_typed(&self, q: Primitive, p: Primitive, ctx: ConversionContext) -> ConversionKind {
        use ConversionKind::{Hook, Identity, Incompatible, Narrowing, Widening};
        let cast_only = |kind: ConversionKind| if ctx == ConversionContext::Explicit { kind } else { Incompatible };
        if q == p {
            return Identity;
        }
        match (q, p) {
            (_, Primitive::Boolean) => Hook(HookKind::Truthiness),
            (Primitive::Char, Primitive::String) => Widening(1),
            (_, Primitive::String) => Incompatible,
            (Primitive::Char, Primitive::Decimal) => Widening(13),
            (Primitive::Char, int) if int.is_integer() => cast_only(Narrowing(CAST_ONLY + int_target_rank(int))),
            (Primitive::Char, _) => Incompatible,
            (int, Primitive::Char) if int.is_integer() => cast_only(Narrowing(CAST_ONLY)),
            (from, to) if from.is_integer() && to.is_integer() => match widening_chain(from, to) {
                Some(steps) => Widening(steps),
                None => Narrowing(CAST_ONLY + int_target_rank(to)),
            },
            (from, Primitive::Single) if from.is_integer() => Widening(10),
            (from, Primitive::Double) if from.is_integer() => Widening(11),
            (from, Primitive::Decimal) if from.is_integer() => Widening(12),
            (Primitive::Single, Primitive::Double) => Widening(1),
            (Primitive::Single, Primitive::Decimal) => Narrowing(2),
            (Primitive::Decimal, Primitive::Single | Primitive::Double) => Narrowing(1),
            (Primitive::Single | Primitive::Decimal, int) if int.is_integer() => {
                Narrowing(TRUNCATING + int_target_rank(int))
            }
            _ => Incompatible,
        }
    }

    fn classify_big_integer(&self, from: Type, ctx: ConversionContext) -> ConversionKind {
        match from {
            Type::Int => ConversionKind::Narrowing(190),
            Type::Bool => ConversionKind::Narrowing(190 + FROM_BOOL),
            Type::Primitive(q) if q.is_integer() && q != Primitive::Char => ConversionKind::Widening(20),
            Type::Enum(_) if ctx == ConversionContext::Explicit => ConversionKind::Narrowing(CAST_ONLY),
            Type::Class(id) => {
                let class = self.types.class(id);
                if let Some(base) = class.builtin_base {
                    let kind = self.classify_big_integer(base, ctx);
                    if kind.is_compatible() {
                        return kind;
                    }
                }
                if self.types.lookup_method(id, "__int__").is_some() {
                    ConversionKind::Hook(HookKind::Int)
                } else if self.types.lookup_method(id, "__index__").is_some() {
                    ConversionKind::Hook(HookKind::Index)
                } else {
                    ConversionKind::Incompatible
                }
            }
            _ => ConversionKind::Incompatible,
        }
    }

    fn classify_array(&self, from: Type, elem: &ParamType) -> ConversionKind {
        let is_bytes_target = *elem == ParamType::Primitive(Primitive::Byte);
        match from {
            Type::ManagedArray => ConversionKind::ArrayCovariance,
            Type::Bytes | Type::Bytearray | Type::MemoryView | Type::Array if is_bytes_target => {
                ConversionKind::BufferCopy
            }
            Type::Class(id) if is_bytes_target => match self.types.class(id).builtin_base {
                Some(base) if base.is_byte_sequence() => ConversionKind::BufferCopy,
                _ => ConversionKind::Incompatible,
            },
            _ => ConversionKind::Incompatible,
        }
    }

    /// Runs a classified conversion on `v`.
    pub(crate) fn apply_conversion(
        &mut self,
        v: Value,
        kind: &ConversionKind,
        to: &ParamType,
        ctx: ConversionContext,
    ) -> Result<Value, ConvertFailure> {
        match kind {
            ConversionKind::Identity => Ok(match to {
                ParamType::Primitive(_) | ParamType::Enum(_) | ParamType::BigInteger => self.unwrap_base(v),
                _ => v,
            }),
            ConversionKind::Subtype(_) | ConversionKind::Boxing | ConversionKind::NoneToRef => Ok(v),
            ConversionKind::Widening(_) | ConversionKind::Narrowing(_) => {
                let base = self.unwrap_base(v);
                let Some(scalar) = self.scalar_of(base) else {
                    return Err(ConvertFailure::Mismatch);
                };
                self.coerce_scalar(scalar, to, ctx, &self.type_name(v))
            }
            ConversionKind::UserImplicit(r) => {
                let op = self.types.implicit(*r).convert.clone();
                op(self, v).map_err(ConvertFailure::Raised)
            }
            ConversionKind::Hook(hook) => {
                let scalar = match hook {
                    HookKind::Index => self.to_index(v).map(Scalar::Int),
                    HookKind::Int => self
                        .to_int(v)
                        .map(|i| Scalar::Int(self.int_payload(i).unwrap_or_default())),
                    HookKind::Float => self.to_float(v).map(Scalar::Float),
                    HookKind::Truthiness => self.to_bool(v).map(Scalar::Bool),
                }
                .map_err(ConvertFailure::Raised)?;
                self.coerce_scalar(scalar, to, ctx, &self.type_name(v))
            }
            ConversionKind::NullableWrap(inner) => {
                let inner_ty = match to {
                    ParamType::Nullable(inner_ty) => inner_ty.as_ref(),
                    other => other,
                };
                self.apply_conversion(v, inner, inner_ty, ctx)
            }
            ConversionKind::ArrayCovariance => {
                let Value::Ref(id) = v else {
                    return Err(ConvertFailure::Mismatch);
                };
                let (HeapData::ManagedArray(arr), ParamType::Array(target)) = (self.heap.get(id), to) else {
                    return Err(ConvertFailure::Mismatch);
                };
                if self.elem_assignable(&arr.elem, target) {
                    Ok(v)
                } else {
                    Err(ConvertFailure::Mismatch)
                }
            }
            ConversionKind::BufferCopy => {
                let data = self
                    .buffer_data(v)
                    .map_err(ConvertFailure::Raised)?
                    .ok_or(ConvertFailure::Mismatch)?;
                Ok(self.alloc(HeapData::ManagedArray(ManagedArray::from_bytes(&data))))
            }
            ConversionKind::Incompatible => Err(ConvertFailure::Mismatch),
        }
    }

    /// Array covariance: same element type, or reference elements with an ancestor target.
    fn elem_assignable(&self, elem: &ParamType, target: &ParamType) -> bool {
        if elem == target {
            return true;
        }
        match (elem, target) {
            (ParamType::Class(a), ParamType::Class(b)) => {
                !self.types.class(*a).is_value_type() && self.types.class_distance(*a, *b).is_some()
            }
            (elem, ParamType::Object) => elem.is_reference(self),
            (_, ParamType::Generic(_)) => true,
            _ => false,
        }
    }

    fn scalar_of(&self, v: Value) -> Option<Scalar> {
        Some(match v {
            Value::Bool(b) => Scalar::Bool(b),
            Value::Int(i) => Scalar::Int(BigInt::from(i)),
            Value::Float(f) => Scalar::Float(f),
            Value::Prim(PrimValue::Single(f)) => Scalar::Float(f64::from(f)),
            Value::Prim(PrimValue::Decimal(d)) => Scalar::Decimal(d),
            Value::Prim(PrimValue::Char(c)) => Scalar::Char(c),
            Value::Prim(PrimValue::Enum(id, n)) => Scalar::Enum(id, n),
            Value::Prim(p) => Scalar::Int(p.integer()?),
            Value::Ref(id) => match self.heap.get(id) {
                HeapData::LongInt(li) => Scalar::Int(li.inner().clone()),
                HeapData::Str(s) => Scalar::Str(s.clone()),
                _ => return None,
            },
            _ => return None,
        })
    }

    fn coerce_scalar(
        &mut self,
        scalar: Scalar,
        to: &ParamType,
        ctx: ConversionContext,
        source: &str,
    ) -> Result<Value, ConvertFailure> {
        let target = match to {
            ParamType::Primitive(p) => PrimTarget::Primitive(*p),
            ParamType::Enum(id) => PrimTarget::Enum(*id),
            ParamType::BigInteger => {
                return match scalar {
                    Scalar::Int(v) => Ok(self.new_int(v)),
                    Scalar::Bool(b) => Ok(self.new_int(BigInt::from(u8::from(b)))),
                    Scalar::Enum(_, n) => Ok(self.new_int(BigInt::from(n))),
                    _ => Err(ConvertFailure::Mismatch),
                };
            }
            ParamType::Nullable(inner) => return self.coerce_scalar(scalar, inner, ctx, source),
            _ => return Err(ConvertFailure::Mismatch),
        };
        let kind = self.types.primitives.target(target).kind;
        let scalar = match (scalar, kind) {
            (Scalar::Str(s), PrimKind::Char) => {
                let mut units = s.encode_utf16();
                match (units.next(), units.next()) {
                    (Some(c), None) => Scalar::Char(c),
                    _ => return Err(ConvertFailure::Mismatch),
                }
            }
            (Scalar::Char(c), PrimKind::Integer) => Scalar::Int(BigInt::from(c)),
            (scalar, _) => scalar,
        };
        let member_check = match (&scalar, target) {
            (Scalar::Int(v), PrimTarget::Enum(_)) if ctx == ConversionContext::Implicit => Some(v.clone()),
            (Scalar::Bool(b), PrimTarget::Enum(_)) if ctx == ConversionContext::Implicit => {
                Some(BigInt::from(u8::from(*b)))
            }
            _ => None,
        };
        if let Some(v) = member_check
            && !self.types.primitives.is_compatible(target, &v)
        {
            return Err(ConvertFailure::Mismatch);
        }
        let scalar = match (scalar, target) {
            (Scalar::Bool(b), PrimTarget::Enum(_)) => Scalar::Int(BigInt::from(u8::from(b))),
            (scalar, _) => scalar,
        };
        coerce(&mut self.heap, &self.types.primitives, &scalar, target).map_err(|err| match err {
            CoerceError::TypeMismatch => ConvertFailure::Mismatch,
            err => ConvertFailure::Range(err.into_run_error(&self.types.primitives, target, source)),
        })
    }

    /// Converts `v` to a managed parameter type as a call would.
    pub fn convert(&mut self, v: Value, to: &ParamType) -> RunResult<Value> {
        self.convert_in(v, to, ConversionContext::Implicit)
    }

    /// Converts `v` as an explicit cast (`Int32(2.5)`, `Char(65)`).
    pub fn convert_explicit(&mut self, v: Value, to: &ParamType) -> RunResult<Value> {
        self.convert_in(v, to, ConversionContext::Explicit)
    }

    fn convert_in(&mut self, v: Value, to: &ParamType, ctx: ConversionContext) -> RunResult<Value> {
        let from = self.type_of(v);
        let kind = self.conversion_kind(from, to, ctx);
        match self.apply_conversion(v, &kind, to, ctx) {
            Ok(converted) => Ok(converted),
            Err(ConvertFailure::Mismatch) => Err(ExcType::type_error_expected_got(
                &self.param_type_name(to),
                &self.type_name(v),
            )),
            Err(ConvertFailure::Range(err) | ConvertFailure::Raised(err)) => Err(err),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{EngineConfig, signature::Signature, types::ClassBuilder};

    fn rt() -> Runtime {
        Runtime::new(EngineConfig::default())
    }

    #[test]
    fn int_targets_prefer_narrowest_signed() {
        let mut rt = rt();
        let ctx = ConversionContext::Implicit;
        let byte = rt.conversion_kind(Type::Int, &ParamType::Primitive(Primitive::Byte), ctx);
        let sbyte = rt.conversion_kind(Type::Int, &ParamType::Primitive(Primitive::SByte), ctx);
        let int32 = rt.conversion_kind(Type::Int, &ParamType::Primitive(Primitive::Int32), ctx);
        let double = rt.conversion_kind(Type::Int, &ParamType::Primitive(Primitive::Double), ctx);
        assert!(sbyte.rank() < byte.rank());
        assert!(byte.rank() < int32.rank());
        assert!(int32.rank() < double.rank());
        assert!(int32.rank() < ConversionKind::Boxing.rank());
    }

    #[test]
    fn conversion_kinds_are_cached() {
        let recorder = crate::tracer::RecordingTracer::new();
        let mut rt = Runtime::with_tracer(EngineConfig::default(), recorder.clone());
        let target = ParamType::Primitive(Primitive::Int64);
        rt.conversion_kind(Type::Int, &target, ConversionContext::Implicit);
        rt.conversion_kind(Type::Int, &target, ConversionContext::Implicit);
        let cached: Vec<bool> = recorder
            .events()
            .iter()
            .filter_map(|e| match e {
                crate::tracer::TraceEvent::Conversion { cached, .. } => Some(*cached),
                _ => None,
            })
            .collect();
        assert_eq!(cached, vec![false, true]);
    }

    #[test]
    fn none_reaches_references_only() {
        let mut rt = rt();
        assert!(rt.convert(Value::None, &ParamType::Object).is_ok());
        assert!(rt.convert(Value::None, &ParamType::nullable(ParamType::Primitive(Primitive::Int32))).is_ok());
        let err = rt.convert(Value::None, &ParamType::Primitive(Primitive::Int32)).unwrap_err();
        assert_eq!(err.message(), Some("expected int, got NoneType"));
    }

    #[test]
    fn chars_and_casts() {
        let mut rt = rt();
        let a = rt.new_str("a");
        let char_ty = ParamType::Primitive(Primitive::Char);
        assert!(matches!(rt.convert(a, &char_ty).unwrap(), Value::Prim(PrimValue::Char(97))));
        let ab = rt.new_str("ab");
        assert!(rt.convert(ab, &char_ty).is_err());
        assert!(rt.convert(Value::Int(65), &char_ty).is_err());
        assert!(matches!(
            rt.convert_explicit(Value::Int(65), &char_ty).unwrap(),
            Value::Prim(PrimValue::Char(65))
        ));
        let int_ty = ParamType::Primitive(Primitive::Int32);
        assert!(matches!(rt.convert(Value::Float(2.5), &int_ty).unwrap(), Value::Int(2)));
        assert!(matches!(rt.convert_explicit(Value::Float(-2.5), &int_ty).unwrap(), Value::Int(-2)));
    }

    #[test]
    fn chars_reach_integers_only_by_cast() {
        let mut rt = rt();
        let letter = Value::Prim(PrimValue::Char(65));
        for p in [Primitive::UInt16, Primitive::Int32, Primitive::UInt64] {
            let err = rt.convert(letter, &ParamType::Primitive(p)).unwrap_err();
            assert_eq!(err.exc_type(), Some(ExcType::TypeError), "{p:?}");
        }
        assert!(matches!(
            rt.convert_explicit(letter, &ParamType::Primitive(Primitive::Int32)).unwrap(),
            Value::Int(65)
        ));
        let d = rt.convert(letter, &ParamType::Primitive(Primitive::Decimal)).unwrap();
        assert!(matches!(d, Value::Prim(PrimValue::Decimal(d)) if d == crate::types::Decimal::from(65)));
    }

    #[test]
    fn float_targets_beat_truncation() {
        let mut rt = rt();
        let ctx = ConversionContext::Implicit;
        let single = rt.conversion_kind(Type::Float, &ParamType::Primitive(Primitive::Single), ctx);
        let int64 = rt.conversion_kind(Type::Float, &ParamType::Primitive(Primitive::Int64), ctx);
        assert!(int64.is_value_dependent());
        assert!(single.rank() < int64.rank());
    }

    #[test]
    fn index_hook_feeds_integer_targets() {
        let mut rt = rt();
        let func = rt
            .new_function("__index__", Signature::plain(["self"], []), Vec::new(), |_, _| Ok(Value::Int(300)))
            .unwrap();
        let class = rt.define_class(ClassBuilder::python("Idx").method("__index__", func));
        let obj = rt.new_instance(class);
        assert!(matches!(
            rt.convert(obj, &ParamType::Primitive(Primitive::Int16)).unwrap(),
            Value::Prim(PrimValue::Int16(300))
        ));
        let err = rt.convert(obj, &ParamType::Primitive(Primitive::Byte)).unwrap_err();
        assert_eq!(err.exc_type(), Some(ExcType::OverflowError));
    }

    #[test]
    fn bytes_copy_into_byte_arrays() {
        let mut rt = rt();
        let b = rt.new_bytes(vec![1, 2, 3]);
        let arr = rt.convert(b, &ParamType::byte_array()).unwrap();
        let Value::Ref(id) = arr else { panic!("expected array") };
        let HeapData::ManagedArray(arr) = rt.heap().get(id) else { panic!("expected array") };
        assert_eq!(arr.byte_buffer(), Some(vec![1, 2, 3]));
        let kind = rt.conversion_kind(Type::BytesIterator, &ParamType::byte_array(), ConversionContext::Implicit);
        assert_eq!(kind, ConversionKind::Incompatible);
    }
}
