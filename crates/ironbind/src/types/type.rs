use super::{
    class::ClassId,
    primitive::{EnumId, Primitive},
};

/// Represents the runtime type of a value.
///
/// Builtin Python types have their own variants. Typed managed primitives, declared
/// enums and declared classes (Python classes and managed classes alike) carry their
/// ids; their names live in the runtime's registry, see `Runtime::type_name`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub enum Type {
    /// The root of every type.
    Object,
    Type,
    NoneType,
    NotImplementedType,
    Bool,
    Int,
    Float,
    Complex,
    Str,
    Bytes,
    Bytearray,
    MemoryView,
    /// `array.array`.
    Array,
    Tuple,
    List,
    Dict,
    Function,
    BuiltinMethod,
    Method,
    /// A managed overload group.
    MethodGroup,
    BytesIterator,
    BytearrayIterator,
    /// Iterator over a list or tuple.
    SeqIterator,
    Generator,
    Slice,
    /// A typed managed primitive (never Int32/Double/Boolean/String).
    Primitive(Primitive),
    Enum(EnumId),
    /// A managed array such as `Array[Byte]`.
    ManagedArray,
    Class(ClassId),
}

impl Type {
    /// Python name of builtin types; `None` for declared classes and enums.
    #[must_use]
    pub fn builtin_name(self) -> Option<&'static str> {
        Some(match self {
            Self::Object => "object",
            Self::Type => "type",
            Self::NoneType => "NoneType",
            Self::NotImplementedType => "NotImplementedType",
            Self::Bool => "bool",
            Self::Int => "int",
            Self::Float => "float",
            Self::Complex => "complex",
            Self::Str => "str",
            Self::Bytes => "bytes",
            Self::Bytearray => "bytearray",
            Self::MemoryView => "memoryview",
            Self::Array => "array",
            Self::Tuple => "tuple",
            Self::List => "list",
            Self::Dict => "dict",
            Self::Function => "function",
            Self::BuiltinMethod => "builtin_function_or_method",
            Self::Method => "method",
            Self::MethodGroup => "method_descriptor",
            Self::BytesIterator => "bytes_iterator",
            Self::BytearrayIterator => "bytearray_iterator",
            Self::SeqIterator => "iterator",
            Self::Generator => "generator",
            Self::Slice => "slice",
            Self::Primitive(p) => p.python_name(),
            Self::ManagedArray => "Array",
            Self::Enum(_) | Self::Class(_) => return None,
        })
    }

    /// The Python type of values of a primitive: the builtin for Int32/Double/Boolean/String.
    #[must_use]
    pub fn of_primitive(p: Primitive) -> Self {
        match p {
            Primitive::Int32 => Self::Int,
            Primitive::Double => Self::Float,
            Primitive::Boolean => Self::Bool,
            Primitive::String => Self::Str,
            other => Self::Primitive(other),
        }
    }

    /// True for `bytes` and `bytearray`.
    #[must_use]
    pub fn is_byte_sequence(self) -> bool {
        matches!(self, Self::Bytes | Self::Bytearray)
    }

    /// True for types whose values are managed value types (box to the object root).
    #[must_use]
    pub fn is_builtin_value_type(self) -> bool {
        matches!(
            self,
            Self::Bool | Self::Int | Self::Float | Self::Complex | Self::Primitive(_) | Self::Enum(_)
        )
    }
}
