//! Primitive type registry.
//!
//! Enumerates the fixed-width managed primitives with their bounds, and the enums
//! declared by the host. Int32, Double, Boolean and String values *are* Python
//! `int`, `float`, `bool` and `str`; every other primitive has a typed
//! [`PrimValue`] representation so its identity survives a round trip through Python.

use std::fmt;

use indexmap::IndexMap;
use num_bigint::BigInt;
use num_traits::{FromPrimitive, Zero};
use serde::{Deserialize, Serialize};
use strum::{EnumString, IntoStaticStr};

use super::decimal::{Decimal, MAX_MANTISSA};

/// A managed-runtime primitive type.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, EnumString, IntoStaticStr, Serialize, Deserialize,
)]
pub enum Primitive {
    SByte,
    Byte,
    Int16,
    UInt16,
    Int32,
    UInt32,
    Int64,
    UInt64,
    Single,
    Double,
    Decimal,
    Boolean,
    Char,
    String,
}

impl Primitive {
    pub const ALL: [Self; 14] = [
        Self::SByte,
        Self::Byte,
        Self::Int16,
        Self::UInt16,
        Self::Int32,
        Self::UInt32,
        Self::Int64,
        Self::UInt64,
        Self::Single,
        Self::Double,
        Self::Decimal,
        Self::Boolean,
        Self::Char,
        Self::String,
    ];

    /// The eight fixed-width integer primitives, narrowest first.
    pub const INTEGERS: [Self; 8] = [
        Self::SByte,
        Self::Byte,
        Self::Int16,
        Self::UInt16,
        Self::Int32,
        Self::UInt32,
        Self::Int64,
        Self::UInt64,
    ];

    /// Managed name, e.g. `UInt16`.
    #[must_use]
    pub fn managed_name(self) -> &'static str {
        self.into()
    }

    /// Name as Python code sees it: the four primitives that are Python builtins use
    /// the builtin name.
    #[must_use]
    pub fn python_name(self) -> &'static str {
        match self {
            Self::Int32 => "int",
            Self::Double => "float",
            Self::Boolean => "bool",
            Self::String => "str",
            other => other.managed_name(),
        }
    }

    #[must_use]
    pub fn is_integer(self) -> bool {
        Self::INTEGERS.contains(&self)
    }

    #[must_use]
    pub fn is_float(self) -> bool {
        matches!(self, Self::Single | Self::Double)
    }

    /// True for primitives whose values are plain Python builtins.
    #[must_use]
    pub fn is_python_builtin(self) -> bool {
        matches!(self, Self::Int32 | Self::Double | Self::Boolean | Self::String)
    }

    #[must_use]
    pub fn bit_width(self) -> u8 {
        match self {
            Self::SByte | Self::Byte | Self::Boolean => 8,
            Self::Int16 | Self::UInt16 | Self::Char => 16,
            Self::Int32 | Self::UInt32 | Self::Single => 32,
            Self::Int64 | Self::UInt64 | Self::Double => 64,
            Self::Decimal => 128,
            Self::String => 0,
        }
    }

    #[must_use]
    pub fn is_signed(self) -> bool {
        matches!(
            self,
            Self::SByte | Self::Int16 | Self::Int32 | Self::Int64 | Self::Single | Self::Double | Self::Decimal
        )
    }

    /// Integer bounds; float bounds are the largest finite magnitude.
    fn bounds(self) -> (BigInt, BigInt) {
        match self {
            Self::SByte => (i8::MIN.into(), i8::MAX.into()),
            Self::Byte => (u8::MIN.into(), u8::MAX.into()),
            Self::Int16 => (i16::MIN.into(), i16::MAX.into()),
            Self::UInt16 | Self::Char => (u16::MIN.into(), u16::MAX.into()),
            Self::Int32 => (i32::MIN.into(), i32::MAX.into()),
            Self::UInt32 => (u32::MIN.into(), u32::MAX.into()),
            Self::Int64 => (i64::MIN.into(), i64::MAX.into()),
            Self::UInt64 => (u64::MIN.into(), u64::MAX.into()),
            Self::Single => float_bounds(f64::from(f32::MAX)),
            Self::Double => float_bounds(f64::MAX),
            Self::Decimal => (BigInt::from(-MAX_MANTISSA), BigInt::from(MAX_MANTISSA)),
            Self::Boolean => (BigInt::zero(), BigInt::from(1)),
            Self::String => (BigInt::zero(), BigInt::zero()),
        }
    }
}

fn float_bounds(max: f64) -> (BigInt, BigInt) {
    let max = BigInt::from_f64(max).unwrap_or_default();
    (-max.clone(), max)
}

impl fmt::Display for Primitive {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.python_name())
    }
}

/// Identifier of a declared managed enum.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct EnumId(pub(crate) u32);

/// Target of a numeric coercion: a primitive or a declared enum.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PrimTarget {
    Primitive(Primitive),
    Enum(EnumId),
}

impl From<Primitive> for PrimTarget {
    fn from(p: Primitive) -> Self {
        Self::Primitive(p)
    }
}

/// What kind of values a descriptor describes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PrimKind {
    Integer,
    Float,
    Decimal,
    Boolean,
    Char,
    String,
    Enum(EnumId),
}

/// Static facts about one primitive or enum.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PrimitiveDescriptor {
    pub name: String,
    pub kind: PrimKind,
    pub bit_width: u8,
    pub signed: bool,
    pub min: BigInt,
    pub max: BigInt,
    /// For enums, the underlying integer primitive.
    pub underlying: Option<Primitive>,
}

impl PrimitiveDescriptor {
    fn for_primitive(p: Primitive) -> Self {
        let (min, max) = p.bounds();
        let kind = match p {
            Primitive::Single | Primitive::Double => PrimKind::Float,
            Primitive::Decimal => PrimKind::Decimal,
            Primitive::Boolean => PrimKind::Boolean,
            Primitive::Char => PrimKind::Char,
            Primitive::String => PrimKind::String,
            _ => PrimKind::Integer,
        };
        Self {
            name: p.managed_name().to_owned(),
            kind,
            bit_width: p.bit_width(),
            signed: p.is_signed(),
            min,
            max,
            underlying: None,
        }
    }

    #[must_use]
    pub fn is_enum(&self) -> bool {
        matches!(self.kind, PrimKind::Enum(_))
    }

    #[must_use]
    pub fn is_char(&self) -> bool {
        self.kind == PrimKind::Char
    }

    #[must_use]
    pub fn is_bool(&self) -> bool {
        self.kind == PrimKind::Boolean
    }

    /// True if `v` lies within `[min, max]`.
    #[must_use]
    pub fn in_range(&self, v: &BigInt) -> bool {
        &self.min <= v && v <= &self.max
    }
}

/// A managed enum declared by the host.
#[derive(Debug, Clone)]
pub struct EnumDef {
    pub name: String,
    pub underlying: Primitive,
    pub members: IndexMap<String, i64>,
    descriptor: PrimitiveDescriptor,
}

impl EnumDef {
    /// Member name for a value, if one is declared.
    #[must_use]
    pub fn member_name(&self, value: i64) -> Option<&str> {
        self.members.iter().find(|(_, v)| **v == value).map(|(k, _)| k.as_str())
    }
}

/// A typed managed primitive value.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum PrimValue {
    SByte(i8),
    Byte(u8),
    Int16(i16),
    UInt16(u16),
    UInt32(u32),
    Int64(i64),
    UInt64(u64),
    Single(f32),
    Decimal(Decimal),
    /// A UTF-16 code unit.
    Char(u16),
    /// An enum value carrying its underlying integer.
    Enum(EnumId, i64),
}

impl PrimValue {
    /// Which primitive this value is, or `None` for enums.
    #[must_use]
    pub fn primitive(self) -> Option<Primitive> {
        Some(match self {
            Self::SByte(_) => Primitive::SByte,
            Self::Byte(_) => Primitive::Byte,
            Self::Int16(_) => Primitive::Int16,
            Self::UInt16(_) => Primitive::UInt16,
            Self::UInt32(_) => Primitive::UInt32,
            Self::Int64(_) => Primitive::Int64,
            Self::UInt64(_) => Primitive::UInt64,
            Self::Single(_) => Primitive::Single,
            Self::Decimal(_) => Primitive::Decimal,
            Self::Char(_) => Primitive::Char,
            Self::Enum(..) => return None,
        })
    }

    /// Integer value of integer primitives and enums.
    #[must_use]
    pub fn integer(self) -> Option<BigInt> {
        Some(match self {
            Self::SByte(v) => v.into(),
            Self::Byte(v) => v.into(),
            Self::Int16(v) => v.into(),
            Self::UInt16(v) => v.into(),
            Self::UInt32(v) => v.into(),
            Self::Int64(v) => v.into(),
            Self::UInt64(v) => v.into(),
            Self::Enum(_, v) => v.into(),
            Self::Single(_) | Self::Decimal(_) | Self::Char(_) => return None,
        })
    }

    /// Builds a typed integer primitive from an in-range value.
    ///
    /// Returns `None` when `p` is not a typed integer primitive or `v` does not fit.
    #[must_use]
    pub fn from_integer(p: Primitive, v: &BigInt) -> Option<Self> {
        use num_traits::ToPrimitive;
        Some(match p {
            Primitive::SByte => Self::SByte(v.to_i8()?),
            Primitive::Byte => Self::Byte(v.to_u8()?),
            Primitive::Int16 => Self::Int16(v.to_i16()?),
            Primitive::UInt16 => Self::UInt16(v.to_u16()?),
            Primitive::UInt32 => Self::UInt32(v.to_u32()?),
            Primitive::Int64 => Self::Int64(v.to_i64()?),
            Primitive::UInt64 => Self::UInt64(v.to_u64()?),
            Primitive::Char => Self::Char(v.to_u16()?),
            _ => return None,
        })
    }
}

/// Registry of primitive descriptors and declared enums.
#[derive(Debug, Clone)]
pub struct PrimitiveRegistry {
    builtin: Vec<PrimitiveDescriptor>,
    enums: Vec<EnumDef>,
}

impl Default for PrimitiveRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl PrimitiveRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self {
            builtin: Primitive::ALL.iter().map(|p| PrimitiveDescriptor::for_primitive(*p)).collect(),
            enums: Vec::new(),
        }
    }

    #[must_use]
    pub fn descriptor(&self, p: Primitive) -> &PrimitiveDescriptor {
        &self.builtin[p as usize]
    }

    #[must_use]
    pub fn target(&self, target: PrimTarget) -> &PrimitiveDescriptor {
        match target {
            PrimTarget::Primitive(p) => self.descriptor(p),
            PrimTarget::Enum(id) => &self.enum_def(id).descriptor,
        }
    }

    #[must_use]
    pub fn enum_def(&self, id: EnumId) -> &EnumDef {
        &self.enums[id.0 as usize]
    }

    /// Declares an enum over an integer primitive.
    ///
    /// Member values outside the underlying range are clamped out of the member table.
    pub fn define_enum(
        &mut self,
        name: impl Into<String>,
        underlying: Primitive,
        members: impl IntoIterator<Item = (String, i64)>,
    ) -> EnumId {
        let id = EnumId(u32::try_from(self.enums.len()).unwrap_or(u32::MAX));
        let base = PrimitiveDescriptor::for_primitive(underlying);
        let name = name.into();
        let members = members
            .into_iter()
            .filter(|(_, v)| base.in_range(&BigInt::from(*v)))
            .collect();
        let descriptor = PrimitiveDescriptor {
            name: name.clone(),
            kind: PrimKind::Enum(id),
            underlying: Some(underlying),
            ..base
        };
        self.enums.push(EnumDef {
            name,
            underlying,
            members,
            descriptor,
        });
        id
    }

    /// A primitive is compatible with an integer iff the value fits and, for an enum,
    /// names a declared member.
    #[must_use]
    pub fn is_compatible(&self, target: PrimTarget, v: &BigInt) -> bool {
        let desc = self.target(target);
        if !desc.in_range(v) {
            return false;
        }
        match target {
            PrimTarget::Enum(id) => {
                use num_traits::ToPrimitive;
                v.to_i64()
                    .is_some_and(|v| self.enum_def(id).members.values().any(|m| *m == v))
            }
            PrimTarget::Primitive(_) => true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn integer_bounds() {
        let reg = PrimitiveRegistry::new();
        let byte = reg.descriptor(Primitive::Byte);
        assert_eq!(byte.min, BigInt::zero());
        assert_eq!(byte.max, BigInt::from(255));
        assert!(!byte.signed);
        let int64 = reg.descriptor(Primitive::Int64);
        assert_eq!(int64.max, BigInt::from(i64::MAX));
        assert!(reg.descriptor(Primitive::Char).is_char());
        assert!(reg.descriptor(Primitive::Boolean).is_bool());
        assert_eq!(reg.descriptor(Primitive::UInt64).bit_width, 64);
    }

    #[test]
    fn enum_compatibility_requires_member() {
        let mut reg = PrimitiveRegistry::new();
        let color = reg.define_enum(
            "Color",
            Primitive::Byte,
            [("Red".to_owned(), 1), ("Green".to_owned(), 2), ("Huge".to_owned(), 300)],
        );
        let target = PrimTarget::Enum(color);
        assert!(reg.is_compatible(target, &BigInt::from(2)));
        assert!(!reg.is_compatible(target, &BigInt::from(3)));
        assert!(!reg.is_compatible(target, &BigInt::from(300)));
        assert!(reg.target(target).is_enum());
        assert_eq!(reg.enum_def(color).member_name(1), Some("Red"));
        assert_eq!(reg.enum_def(color).members.len(), 2);
    }

    #[test]
    fn names() {
        assert_eq!(Primitive::Int32.python_name(), "int");
        assert_eq!(Primitive::UInt16.python_name(), "UInt16");
        assert_eq!("Single".parse::<Primitive>().unwrap(), Primitive::Single);
    }

    #[test]
    fn typed_values() {
        let v = PrimValue::from_integer(Primitive::UInt16, &BigInt::from(65535)).unwrap();
        assert_eq!(v, PrimValue::UInt16(65535));
        assert_eq!(v.integer(), Some(BigInt::from(65535)));
        assert!(PrimValue::from_integer(Primitive::SByte, &BigInt::from(128)).is_none());
        assert_eq!(PrimValue::Char(65).primitive(), Some(Primitive::Char));
    }
}
