//! Object arena.
//!
//! Every non-immediate Python object lives in a [`Heap`] slot addressed by a
//! [`HeapId`]. Objects are never freed: the engine has no collector, and ids stay
//! valid for the lifetime of the runtime. Identity (`is`) is id equality.

use indexmap::IndexMap;

use crate::{
    overload::OverloadSet,
    types::{
        ByteArray, Bytes, Complex, Instance, LongInt, ManagedArray, MemoryView, PyIter, Slice, TypedArray,
        function::{BoundMethod, BuiltinMethod, PyFunction},
    },
    value::Value,
};

/// Index of an object in the [`Heap`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, serde::Serialize, serde::Deserialize)]
pub struct HeapId(usize);

impl HeapId {
    #[must_use]
    pub fn index(self) -> usize {
        self.0
    }
}

/// Payload of a heap slot.
#[derive(Debug)]
pub enum HeapData {
    Str(String),
    LongInt(LongInt),
    Complex(Complex),
    Bytes(Bytes),
    ByteArray(ByteArray),
    MemoryView(MemoryView),
    /// Typed numeric array (`array.array`).
    Array(TypedArray),
    /// Managed-runtime array such as `Array[Byte]`.
    ManagedArray(ManagedArray),
    Tuple(Vec<Value>),
    List(Vec<Value>),
    /// String-keyed mapping, used for `**kwargs`.
    Dict(IndexMap<String, Value>),
    Iter(PyIter),
    Function(PyFunction),
    BoundMethod(BoundMethod),
    BuiltinMethod(BuiltinMethod),
    /// A group of managed overloads resolved by the overload selector.
    MethodGroup(OverloadSet),
    Instance(Instance),
    Slice(Slice),
}

impl HeapData {
    /// Variant name, for diagnostics.
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Str(_) => "Str",
            Self::LongInt(_) => "LongInt",
            Self::Complex(_) => "Complex",
            Self::Bytes(_) => "Bytes",
            Self::ByteArray(_) => "ByteArray",
            Self::MemoryView(_) => "MemoryView",
            Self::Array(_) => "Array",
            Self::ManagedArray(_) => "ManagedArray",
            Self::Tuple(_) => "Tuple",
            Self::List(_) => "List",
            Self::Dict(_) => "Dict",
            Self::Iter(_) => "Iter",
            Self::Function(_) => "Function",
            Self::BoundMethod(_) => "BoundMethod",
            Self::BuiltinMethod(_) => "BuiltinMethod",
            Self::MethodGroup(_) => "MethodGroup",
            Self::Instance(_) => "Instance",
            Self::Slice(_) => "Slice",
        }
    }
}

/// Arena of heap objects.
#[derive(Debug, Default)]
pub struct Heap {
    entries: Vec<HeapData>,
}

impl Heap {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn allocate(&mut self, data: HeapData) -> HeapId {
        let id = HeapId(self.entries.len());
        self.entries.push(data);
        id
    }

    /// Returns the object stored at `id`.
    ///
    /// Ids are only handed out by [`Heap::allocate`] and slots are never freed, so
    /// every id is in bounds.
    #[must_use]
    pub fn get(&self, id: HeapId) -> &HeapData {
        &self.entries[id.0]
    }

    pub fn get_mut(&mut self, id: HeapId) -> &mut HeapData {
        &mut self.entries[id.0]
    }

    /// Number of objects ever allocated.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
