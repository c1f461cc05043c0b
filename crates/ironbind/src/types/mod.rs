/// Type definitions for the values the dispatch engine works with.
///
/// This module contains the storage types of heap objects, the primitive and
/// class registries of the managed host, and the runtime type tags.
pub mod buffer;
pub mod bytes;
pub mod class;
pub mod codec;
pub mod complex;
pub mod decimal;
pub mod function;
pub mod iter;
pub mod long_int;
pub mod primitive;
pub mod slice;
pub mod r#type;

pub use buffer::{ArrayItem, ManagedArray, MemoryView, TypedArray};
pub use bytes::{ByteArray, Bytes, SliceIndices, bytes_repr};
pub use class::{ClassBuilder, ClassDef, ClassId, ClassKind, ImplicitRef, Instance, TypeRegistry};
pub use complex::Complex;
pub use decimal::Decimal;
pub use iter::PyIter;
pub use long_int::LongInt;
pub use primitive::{EnumDef, EnumId, PrimKind, PrimTarget, PrimValue, Primitive, PrimitiveDescriptor, PrimitiveRegistry};
pub use slice::Slice;
pub use r#type::Type;
