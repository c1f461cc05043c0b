//! Builtin methods of builtin objects, item access, `len()` and `hash()`.
//!
//! `getattr` on a builtin object (or on an instance of a builtin subclass) produces a
//! builtin method object when [`Runtime::has_builtin_method`] knows the name; calling
//! it lands in [`Runtime::call_builtin_method`] with the original receiver. Methods
//! operate on the builtin payload, so subclass instances share them.

use std::hash::BuildHasher;

use num_bigint::BigInt;
use num_traits::{Signed, ToPrimitive};

use crate::{
    args::ArgValues,
    coerce::float_to_bigint,
    exception::{ExcType, RunError, RunResult},
    heap::{HeapData, HeapId},
    hooks::LengthHintPolicy,
    runtime::Runtime,
    types::{
        ManagedArray, PrimValue, SliceIndices, Type, TypedArray,
        bytes::{self, normalize_index},
        codec,
    },
    value::Value,
};

const BYTES_METHODS: &[&str] = &[
    "find",
    "rfind",
    "index",
    "rindex",
    "count",
    "startswith",
    "endswith",
    "partition",
    "rpartition",
    "translate",
    "decode",
    "hex",
    "__len__",
    "__contains__",
    "__hash__",
    "__repr__",
    "__reduce__",
    "__iter__",
    "__getitem__",
];

/// Methods only `bytearray` has, on top of [`BYTES_METHODS`].
const BYTEARRAY_METHODS: &[&str] = &[
    "append",
    "extend",
    "insert",
    "pop",
    "remove",
    "reverse",
    "clear",
    "copy",
    "__init__",
    "__setitem__",
    "__delitem__",
];

const MEMORYVIEW_METHODS: &[&str] = &["release", "tobytes", "tolist", "__len__", "__getitem__", "__setitem__"];

const ITERATOR_METHODS: &[&str] = &["__next__", "__iter__", "__length_hint__", "__setstate__", "__reduce__"];

const SEQUENCE_METHODS: &[&str] = &["__len__", "__getitem__", "__iter__"];

/// Bounds of a slice key after `__index__` conversion.
type SliceBounds = (Option<i64>, Option<i64>, Option<i64>);

fn int_value(n: usize) -> Value {
    Value::Int(i64::try_from(n).unwrap_or(i64::MAX))
}

impl Runtime {
    /// True if objects of type `t` have the builtin method `name`.
    #[must_use]
    pub(crate) fn has_builtin_method(&self, t: Type, name: &str) -> bool {
        match t {
            Type::Bytes => BYTES_METHODS.contains(&name),
            Type::Bytearray => BYTES_METHODS.contains(&name) || BYTEARRAY_METHODS.contains(&name),
            Type::MemoryView => MEMORYVIEW_METHODS.contains(&name),
            Type::BytesIterator | Type::BytearrayIterator | Type::SeqIterator => ITERATOR_METHODS.contains(&name),
            Type::Generator => matches!(name, "__next__" | "__iter__"),
            Type::List => name == "append" || SEQUENCE_METHODS.contains(&name),
            Type::Str => name == "encode" || SEQUENCE_METHODS.contains(&name),
            Type::Tuple => SEQUENCE_METHODS.contains(&name),
            _ => false,
        }
    }

    /// Calls builtin method `name` on `receiver` or on its builtin payload.
    pub(crate) fn call_builtin_method(&mut self, receiver: Value, name: &str, args: ArgValues) -> RunResult<Value> {
        let target = self.unwrap_base(receiver);
        let Value::Ref(id) = target else {
            return Err(ExcType::attribute_error(&self.type_name(receiver), name));
        };
        match self.type_of(target) {
            Type::Bytes | Type::Bytearray => self.call_bytes_method(receiver, id, name, args),
            Type::MemoryView => self.call_memoryview_method(id, name, args),
            Type::BytesIterator | Type::BytearrayIterator | Type::SeqIterator | Type::Generator => {
                self.call_iterator_method(target, id, name, args)
            }
            Type::List | Type::Tuple | Type::Str => self.call_sequence_method(target, id, name, args),
            _ => Err(ExcType::attribute_error(&self.type_name(receiver), name)),
        }
    }

    fn byte_slice(&self, id: HeapId) -> &[u8] {
        self.byte_data(Value::Ref(id)).unwrap_or_default()
    }

    fn new_byte_sequence(&mut self, mutable: bool, data: Vec<u8>) -> Value {
        if mutable {
            self.new_bytearray(data)
        } else {
            self.new_bytes(data)
        }
    }

    fn call_bytes_method(&mut self, receiver: Value, id: HeapId, name: &str, args: ArgValues) -> RunResult<Value> {
        let target = Value::Ref(id);
        let mutable = matches!(self.heap.get(id), HeapData::ByteArray(_));
        if !mutable && BYTEARRAY_METHODS.contains(&name) {
            return Err(ExcType::attribute_error(&self.type_name(receiver), name));
        }
        match name {
            "find" | "rfind" | "index" | "rindex" => {
                let (needle, start, end) = self.search_args(name, args)?;
                let data = self.byte_slice(id);
                let found = if name.starts_with('r') {
                    bytes::rfind(data, &needle, start, end)
                } else {
                    bytes::find(data, &needle, start, end)
                };
                match found {
                    Some(i) => Ok(int_value(i)),
                    None if name.ends_with("find") => Ok(Value::Int(-1)),
                    None => Err(ExcType::value_error_subsection_not_found()),
                }
            }
            "count" => {
                let (needle, start, end) = self.search_args(name, args)?;
                Ok(int_value(bytes::count(self.byte_slice(id), &needle, start, end)))
            }
            "startswith" | "endswith" => {
                let args = args.get_positional_range(name, 1, 3)?;
                let affixes = self.affix_arg(name, args[0])?;
                let start = self.optional_index(args.get(1).copied())?;
                let end = self.optional_index(args.get(2).copied())?;
                let data = self.byte_slice(id);
                let suffix = name == "endswith";
                Ok(Value::Bool(
                    affixes
                        .iter()
                        .any(|affix| bytes::has_affix(data, affix, start, end, suffix)),
                ))
            }
            "partition" | "rpartition" => {
                let sep = args.get_one_arg(name)?;
                let Some(sep) = self.buffer_data(sep)? else {
                    return Err(ExcType::type_error_bytes_like(&self.type_name(sep)));
                };
                let data = self.byte_slice(id);
                let (head, mid, tail) = if name == "partition" {
                    bytes::partition(data, &sep)?
                } else {
                    bytes::rpartition(data, &sep)?
                };
                let (head, mid, tail) = (head.to_vec(), mid.to_vec(), tail.to_vec());
                let parts = vec![
                    self.new_byte_sequence(mutable, head),
                    self.new_byte_sequence(mutable, mid),
                    self.new_byte_sequence(mutable, tail),
                ];
                Ok(self.new_tuple(parts))
            }
            "translate" => {
                let mut bound = args.bind_names(name, &["table", "delete"])?.into_iter();
                let table = match bound.next().flatten() {
                    None | Some(Value::None) => None,
                    Some(table) => match self.buffer_data(table)? {
                        Some(table) => Some(table),
                        None => return Err(ExcType::type_error_bytes_like(&self.type_name(table))),
                    },
                };
                let delete = match bound.next().flatten() {
                    None => Vec::new(),
                    Some(delete) => match self.buffer_data(delete)? {
                        Some(delete) => delete,
                        None => return Err(ExcType::type_error_bytes_like(&self.type_name(delete))),
                    },
                };
                let data = bytes::translate(self.byte_slice(id), table.as_deref(), &delete)?;
                Ok(self.new_byte_sequence(mutable, data))
            }
            "decode" => {
                let mut bound = args.bind_names(name, &["encoding", "errors"])?.into_iter();
                let encoding = self.optional_str_arg(name, "encoding", bound.next().flatten())?;
                let errors = self.optional_str_arg(name, "errors", bound.next().flatten())?;
                let text = codec::decode(
                    self.byte_slice(id),
                    encoding.as_deref().unwrap_or("utf-8"),
                    errors.as_deref(),
                )?;
                Ok(self.new_str(text))
            }
            "hex" => {
                let mut bound = args.bind_names(name, &["sep", "bytes_per_sep"])?.into_iter();
                let sep = match bound.next().flatten() {
                    None | Some(Value::None) => None,
                    Some(sep) => Some(self.hex_separator(sep)?),
                };
                let group = match bound.next().flatten() {
                    Some(group) => self.index_sized(group)?,
                    None => 1,
                };
                let group = usize::try_from(group.unsigned_abs()).unwrap_or(usize::MAX);
                let sep = if group == 0 { None } else { sep };
                let text = bytes::hex(self.byte_slice(id), sep, group);
                Ok(self.new_str(text))
            }
            "append" => {
                let item = args.get_one_arg(name)?;
                let byte = self.byte_value(item)?;
                let len = self.bytearray_mut(id)?.len();
                self.config.limits.check_sequence_len(len + 1)?;
                self.bytearray_mut(id)?.resizable()?.push(byte);
                Ok(Value::None)
            }
            "extend" => {
                let iterable = args.get_one_arg(name)?;
                let data = self.extension_bytes(iterable)?;
                let len = self.bytearray_mut(id)?.len();
                self.config.limits.check_sequence_len(len + data.len())?;
                self.bytearray_mut(id)?.resizable()?.extend(data);
                Ok(Value::None)
            }
            "insert" => {
                let (index, item) = args.get_two_args(name)?;
                let index = self.index_sized(index)?;
                let byte = self.byte_value(item)?;
                let array = self.bytearray_mut(id)?;
                let len = i64::try_from(array.len()).unwrap_or(i64::MAX);
                let position = if index < 0 { (index + len).max(0) } else { index.min(len) };
                let position = usize::try_from(position).unwrap_or(0);
                array.resizable()?.insert(position, byte);
                Ok(Value::None)
            }
            "pop" => {
                let index = match args.get_zero_one_arg(name)? {
                    Some(index) => self.index_sized(index)?,
                    None => -1,
                };
                let array = self.bytearray_mut(id)?;
                if array.is_empty() {
                    return Err(ExcType::index_error_pop_empty("bytearray"));
                }
                let Some(position) = normalize_index(index, array.len()) else {
                    return Err(ExcType::index_error_pop_range());
                };
                let byte = array.resizable()?.remove(position);
                Ok(Value::Int(i64::from(byte)))
            }
            "remove" => {
                let item = args.get_one_arg(name)?;
                let byte = self.byte_value(item)?;
                let array = self.bytearray_mut(id)?;
                let Some(position) = array.as_slice().iter().position(|b| *b == byte) else {
                    return Err(ExcType::value_error_not_in_bytearray());
                };
                array.resizable()?.remove(position);
                Ok(Value::None)
            }
            "reverse" => {
                args.check_zero_args(name)?;
                self.bytearray_mut(id)?.as_mut_slice().reverse();
                Ok(Value::None)
            }
            "clear" => {
                args.check_zero_args(name)?;
                self.bytearray_mut(id)?.resizable()?.clear();
                Ok(Value::None)
            }
            "copy" => {
                args.check_zero_args(name)?;
                let data = self.byte_slice(id).to_vec();
                Ok(self.new_bytearray(data))
            }
            "__init__" => {
                self.init_bytearray(id, args)?;
                Ok(Value::None)
            }
            "__len__" => {
                args.check_zero_args(name)?;
                Ok(int_value(self.byte_slice(id).len()))
            }
            "__contains__" => {
                let item = args.get_one_arg(name)?;
                Ok(Value::Bool(self.byte_contains(id, item)?))
            }
            "__hash__" => {
                args.check_zero_args(name)?;
                self.hash(target).map(Value::Int)
            }
            "__repr__" => {
                args.check_zero_args(name)?;
                let text = self.repr(target)?;
                Ok(self.new_str(text))
            }
            "__reduce__" => {
                args.check_zero_args(name)?;
                let cls = Value::Type(self.type_of(receiver));
                let data = self.byte_slice(id).to_vec();
                let data = self.new_bytes(data);
                let ctor_args = self.new_tuple(vec![data]);
                Ok(self.new_tuple(vec![cls, ctor_args]))
            }
            "__iter__" => {
                args.check_zero_args(name)?;
                self.iter(target)
            }
            "__getitem__" => {
                let key = args.get_one_arg(name)?;
                self.get_item(target, key)
            }
            "__setitem__" => {
                let (key, value) = args.get_two_args(name)?;
                self.set_item(target, key, value)?;
                Ok(Value::None)
            }
            "__delitem__" => {
                let key = args.get_one_arg(name)?;
                self.del_item(target, key)?;
                Ok(Value::None)
            }
            _ => Err(ExcType::attribute_error(&self.type_name(receiver), name)),
        }
    }

    /// `(sub, start=None, end=None)` of the search methods.
    fn search_args(&mut self, name: &str, args: ArgValues) -> RunResult<(Vec<u8>, Option<i64>, Option<i64>)> {
        let args = args.get_positional_range(name, 1, 3)?;
        let needle = self.needle(args[0])?;
        let start = self.optional_index(args.get(1).copied())?;
        let end = self.optional_index(args.get(2).copied())?;
        Ok((needle, start, end))
    }

    /// A search needle: a bytes-like object, or an int naming one byte.
    fn needle(&mut self, v: Value) -> RunResult<Vec<u8>> {
        if let Some(data) = self.buffer_data(v)? {
            return Ok(data);
        }
        if self.has_index(v) {
            return Ok(vec![self.byte_value(v)?]);
        }
        Err(ExcType::type_error_needle(&self.type_name(v)))
    }

    fn affix_arg(&self, name: &str, v: Value) -> RunResult<Vec<Vec<u8>>> {
        if let Some(data) = self.buffer_data(v)? {
            return Ok(vec![data]);
        }
        if self.type_of(v) != Type::Tuple {
            return Err(ExcType::type_error_affix(name, &self.type_name(v)));
        }
        let items = self.sequence_items(v).unwrap_or_default();
        let mut affixes = Vec::with_capacity(items.len());
        for item in items {
            match self.buffer_data(*item)? {
                Some(data) => affixes.push(data),
                None => return Err(ExcType::type_error_bytes_like(&self.type_name(*item))),
            }
        }
        Ok(affixes)
    }

    fn optional_str_arg(&self, func: &str, arg: &str, v: Option<Value>) -> RunResult<Option<String>> {
        match v {
            None => Ok(None),
            Some(v) => match self.as_str(self.unwrap_base(v)) {
                Some(s) => Ok(Some(s.to_owned())),
                None => Err(ExcType::type_error_str_argument(func, arg, &self.type_name(v))),
            },
        }
    }

    fn hex_separator(&self, sep: Value) -> RunResult<char> {
        let text = match self.as_str(self.unwrap_base(sep)) {
            Some(s) => s.to_owned(),
            None => match self.byte_data(sep) {
                Some(data) => data.iter().map(|b| char::from(*b)).collect(),
                None => return Err(ExcType::value_error_hex_separator()),
            },
        };
        let mut chars = text.chars();
        match (chars.next(), chars.next()) {
            (Some(c), None) if c.is_ascii() => Ok(c),
            _ => Err(ExcType::value_error_hex_separator()),
        }
    }

    /// Bytes for `bytearray.extend`. The length hint is consulted strictly, and the
    /// whole iterable is consumed before the array changes.
    fn extension_bytes(&mut self, iterable: Value) -> RunResult<Vec<u8>> {
        if let Some(data) = self.buffer_data(iterable)? {
            return Ok(data);
        }
        let hint = self.length_hint(iterable, LengthHintPolicy::Strict)?;
        let Some(iterator) = self.try_iter(iterable)? else {
            return Err(ExcType::type_error_cannot_extend(&self.type_name(iterable)));
        };
        let mut data = Vec::with_capacity(hint.unwrap_or(0).min(self.config.limits.max_sequence_len));
        while let Some(item) = self.iter_next(iterator)? {
            data.push(self.byte_value(item)?);
        }
        Ok(data)
    }

    fn byte_contains(&mut self, id: HeapId, item: Value) -> RunResult<bool> {
        if let Some(needle) = self.buffer_data(item)? {
            return Ok(bytes::find(self.byte_slice(id), &needle, None, None).is_some());
        }
        if self.has_index(item) {
            let byte = self.byte_value(item)?;
            return Ok(self.byte_slice(id).contains(&byte));
        }
        Err(ExcType::type_error_needle(&self.type_name(item)))
    }

    fn call_memoryview_method(&mut self, id: HeapId, name: &str, args: ArgValues) -> RunResult<Value> {
        let target = Value::Ref(id);
        match name {
            "release" => {
                args.check_zero_args(name)?;
                let HeapData::MemoryView(view) = self.heap.get_mut(id) else {
                    return Err(RunError::internal("memoryview method on non-view"));
                };
                let first = view.release();
                let source = view.source;
                if first && let HeapData::ByteArray(array) = self.heap.get_mut(source) {
                    array.release_export();
                }
                Ok(Value::None)
            }
            "tobytes" => {
                args.check_zero_args(name)?;
                let data = self.buffer_data(target)?.unwrap_or_default();
                Ok(self.new_bytes(data))
            }
            "tolist" => {
                args.check_zero_args(name)?;
                let len = self.view_len(id)?;
                let mut items = Vec::with_capacity(len);
                for i in 0..len {
                    items.push(self.memoryview_item(id, i)?);
                }
                Ok(self.new_list(items))
            }
            "__len__" => {
                args.check_zero_args(name)?;
                self.view_len(id).map(int_value)
            }
            "__getitem__" => {
                let key = args.get_one_arg(name)?;
                self.get_item(target, key)
            }
            "__setitem__" => {
                let (key, value) = args.get_two_args(name)?;
                self.set_item(target, key, value)?;
                Ok(Value::None)
            }
            _ => Err(ExcType::attribute_error("memoryview", name)),
        }
    }

    fn view_len(&self, id: HeapId) -> RunResult<usize> {
        match self.heap.get(id) {
            HeapData::MemoryView(view) => {
                view.check_live()?;
                Ok(view.len)
            }
            _ => Err(RunError::internal("expected a memoryview")),
        }
    }

    fn call_iterator_method(&mut self, target: Value, id: HeapId, name: &str, args: ArgValues) -> RunResult<Value> {
        match name {
            "__next__" => {
                args.check_zero_args(name)?;
                self.iter_next(target)?.ok_or_else(ExcType::stop_iteration)
            }
            "__iter__" => {
                args.check_zero_args(name)?;
                Ok(target)
            }
            "__length_hint__" => {
                args.check_zero_args(name)?;
                Ok(int_value(self.iterator_length_hint(id)))
            }
            "__setstate__" => {
                let state = args.get_one_arg(name)?;
                let state = self.to_index(state)?;
                let state = state
                    .to_i64()
                    .unwrap_or(if state.is_negative() { i64::MIN } else { i64::MAX });
                self.iterator_setstate(id, state);
                Ok(Value::None)
            }
            "__reduce__" => {
                args.check_zero_args(name)?;
                self.iterator_reduce(id)
            }
            _ => Err(ExcType::attribute_error(&self.type_name(target), name)),
        }
    }

    fn call_sequence_method(&mut self, target: Value, id: HeapId, name: &str, args: ArgValues) -> RunResult<Value> {
        match name {
            "append" => {
                let item = args.get_one_arg(name)?;
                match self.heap.get_mut(id) {
                    HeapData::List(items) => items.push(item),
                    _ => return Err(ExcType::attribute_error(&self.type_name(target), name)),
                }
                Ok(Value::None)
            }
            "encode" => {
                let mut bound = args.bind_names(name, &["encoding", "errors"])?.into_iter();
                let encoding = self.optional_str_arg(name, "encoding", bound.next().flatten())?;
                let errors = self.optional_str_arg(name, "errors", bound.next().flatten())?;
                let Some(text) = self.as_str(target) else {
                    return Err(ExcType::attribute_error(&self.type_name(target), name));
                };
                let data = codec::encode(text, encoding.as_deref().unwrap_or("utf-8"), errors.as_deref())?;
                Ok(self.new_bytes(data))
            }
            "__len__" => {
                args.check_zero_args(name)?;
                self.len(target).map(int_value)
            }
            "__getitem__" => {
                let key = args.get_one_arg(name)?;
                self.get_item(target, key)
            }
            "__iter__" => {
                args.check_zero_args(name)?;
                self.iter(target)
            }
            _ => Err(ExcType::attribute_error(&self.type_name(target), name)),
        }
    }

    // --- item access ---

    /// Current length of a sized builtin object.
    fn container_len(&self, id: HeapId) -> Option<usize> {
        Some(match self.heap.get(id) {
            HeapData::Str(s) => s.chars().count(),
            HeapData::Bytes(b) => b.len(),
            HeapData::ByteArray(b) => b.len(),
            HeapData::Tuple(items) | HeapData::List(items) => items.len(),
            HeapData::Dict(map) => map.len(),
            HeapData::Array(arr) => arr.len(),
            HeapData::ManagedArray(arr) => arr.items.len(),
            HeapData::MemoryView(view) => view.len,
            _ => return None,
        })
    }

    /// Converted bounds of a `slice` key; `None` for other keys.
    fn slice_bounds(&mut self, key: Value) -> RunResult<Option<SliceBounds>> {
        let Value::Ref(id) = key else {
            return Ok(None);
        };
        let HeapData::Slice(slice) = self.heap.get(id) else {
            return Ok(None);
        };
        let slice = *slice;
        let start = self.optional_index(Some(slice.start))?;
        let stop = self.optional_index(Some(slice.stop))?;
        let step = self.optional_index(Some(slice.step))?;
        Ok(Some((start, stop, step)))
    }

    /// Resolves an integer key against a container of `len` items.
    fn item_index(&mut self, container: Value, key: Value, len: usize) -> RunResult<usize> {
        if !self.has_index(key) {
            return Err(ExcType::type_error_indices(
                &self.type_name(container),
                &self.type_name(key),
            ));
        }
        let index = self.index_sized(key)?;
        normalize_index(index, len).ok_or_else(|| ExcType::index_error_out_of_range(&self.type_name(container)))
    }

    /// `obj[key]`.
    pub fn get_item(&mut self, obj: Value, key: Value) -> RunResult<Value> {
        if let Some(result) = self.call_hook(obj, "__getitem__", ArgValues::One(key))? {
            return Ok(result);
        }
        let target = self.unwrap_base(obj);
        let Some((id, len)) = target.ref_id().and_then(|id| Some((id, self.container_len(id)?))) else {
            return Err(ExcType::type_error_not_subscriptable(&self.type_name(obj)));
        };
        if let HeapData::Dict(map) = self.heap.get(id) {
            let found = self.as_str(key).and_then(|k| map.get(k).copied());
            return match found {
                Some(v) => Ok(v),
                None => Err(ExcType::key_error(&self.repr(key)?)),
            };
        }
        if let Some(bounds) = self.slice_bounds(key)? {
            return self.get_slice(id, len, bounds);
        }
        let index = self.item_index(target, key, len)?;
        self.item_at(id, index)
    }

    fn item_at(&mut self, id: HeapId, index: usize) -> RunResult<Value> {
        let item = match self.heap.get(id) {
            HeapData::Bytes(b) => b.as_slice().get(index).map(|b| Value::Int(i64::from(*b))),
            HeapData::ByteArray(b) => b.as_slice().get(index).map(|b| Value::Int(i64::from(*b))),
            HeapData::Tuple(items) | HeapData::List(items) => items.get(index).copied(),
            HeapData::ManagedArray(arr) => arr.items.get(index).copied(),
            HeapData::Str(s) => {
                let ch = s.chars().nth(index);
                return Ok(match ch {
                    Some(ch) => self.new_str(ch.to_string()),
                    None => Value::None,
                });
            }
            HeapData::Array(arr) => match arr.item(index) {
                Some(item) => return Ok(self.array_item_value(item)),
                None => None,
            },
            HeapData::MemoryView(_) => return self.memoryview_item(id, index),
            _ => None,
        };
        item.ok_or_else(|| RunError::internal("normalized index out of range"))
    }

    fn get_slice(&mut self, id: HeapId, len: usize, (start, stop, step): SliceBounds) -> RunResult<Value> {
        let indices = SliceIndices::adjust(len, start, stop, step)?;
        match self.heap.get(id) {
            HeapData::Bytes(b) => {
                let data = indices.select(b.as_slice());
                Ok(self.new_bytes(data))
            }
            HeapData::ByteArray(b) => {
                let data = indices.select(b.as_slice());
                Ok(self.new_bytearray(data))
            }
            HeapData::Tuple(items) => {
                let picked = indices.positions().filter_map(|i| items.get(i).copied()).collect();
                Ok(self.new_tuple(picked))
            }
            HeapData::List(items) => {
                let picked = indices.positions().filter_map(|i| items.get(i).copied()).collect();
                Ok(self.new_list(picked))
            }
            HeapData::Str(s) => {
                let chars: Vec<char> = s.chars().collect();
                let picked: String = indices.positions().filter_map(|i| chars.get(i).copied()).collect();
                Ok(self.new_str(picked))
            }
            HeapData::ManagedArray(arr) => {
                let elem = arr.elem.clone();
                let picked = indices.positions().filter_map(|i| arr.items.get(i).copied()).collect();
                Ok(self.alloc(HeapData::ManagedArray(ManagedArray::new(elem, picked))))
            }
            HeapData::Array(arr) => {
                let typecode = arr.typecode();
                let picked: Vec<_> = indices.positions().filter_map(|i| arr.item(i)).collect();
                let values: Vec<Value> = picked.into_iter().map(|item| self.array_item_value(item)).collect();
                self.new_array(typecode, &values)
            }
            HeapData::MemoryView(view) => {
                view.check_live()?;
                let first = usize::try_from(indices.start).unwrap_or(0);
                let step = isize::try_from(indices.step).unwrap_or(1);
                let sub = view.subview(first, step, indices.len);
                if let HeapData::ByteArray(array) = self.heap.get_mut(sub.source) {
                    array.add_export();
                }
                Ok(self.alloc(HeapData::MemoryView(sub)))
            }
            _ => Err(ExcType::type_error_not_subscriptable(&self.type_name(Value::Ref(id)))),
        }
    }

    /// `obj[key] = value`.
    ///
    /// Same-length writes into a `bytearray` stay allowed while views are exported;
    /// a slice assignment that changes the length does not.
    pub fn set_item(&mut self, obj: Value, key: Value, value: Value) -> RunResult<()> {
        if self.call_hook(obj, "__setitem__", ArgValues::Two(key, value))?.is_some() {
            return Ok(());
        }
        let target = self.unwrap_base(obj);
        let Value::Ref(id) = target else {
            return Err(ExcType::type_error_item_assignment(&self.type_name(obj)));
        };
        let bounds = self.slice_bounds(key)?;
        match (self.type_of(target), bounds) {
            (Type::Bytearray, Some(bounds)) => self.assign_bytearray_slice(id, bounds, value),
            (Type::Bytearray, None) => {
                let len = self.bytearray_mut(id)?.len();
                let index = self.item_index(target, key, len)?;
                let byte = self.byte_value(value)?;
                self.bytearray_mut(id)?.as_mut_slice()[index] = byte;
                Ok(())
            }
            (Type::List, None) => {
                let len = self.container_len(id).unwrap_or(0);
                let index = self.item_index(target, key, len)?;
                if let HeapData::List(items) = self.heap.get_mut(id) {
                    items[index] = value;
                }
                Ok(())
            }
            (Type::ManagedArray, None) => {
                let len = self.container_len(id).unwrap_or(0);
                let index = self.item_index(target, key, len)?;
                let HeapData::ManagedArray(arr) = self.heap.get(id) else {
                    return Err(RunError::internal("expected a managed array"));
                };
                let elem = arr.elem.clone();
                let converted = self.convert(value, &elem)?;
                if let HeapData::ManagedArray(arr) = self.heap.get_mut(id) {
                    arr.items[index] = converted;
                }
                Ok(())
            }
            (Type::MemoryView, bounds) => self.assign_view(id, key, bounds, value),
            (Type::Dict, None) => {
                let Some(k) = self.as_str(key).map(str::to_owned) else {
                    return Err(ExcType::type_error_item_assignment(&self.type_name(obj)));
                };
                if let HeapData::Dict(map) = self.heap.get_mut(id) {
                    map.insert(k, value);
                }
                Ok(())
            }
            _ => Err(ExcType::type_error_item_assignment(&self.type_name(obj))),
        }
    }

    /// Bytes for a slice assignment: a buffer, or any iterable of ints except an int
    /// or a str. The length hint is never consulted.
    fn slice_source(&mut self, value: Value) -> RunResult<Vec<u8>> {
        if let Some(data) = self.buffer_data(value)? {
            return Ok(data);
        }
        if self.has_index(value) || self.as_str(self.unwrap_base(value)).is_some() {
            return Err(ExcType::type_error_slice_assign());
        }
        let Some(iterator) = self.try_iter(value)? else {
            return Err(ExcType::type_error_slice_assign());
        };
        let mut data = Vec::new();
        while let Some(item) = self.iter_next(iterator)? {
            data.push(self.byte_value(item)?);
        }
        Ok(data)
    }

    fn assign_bytearray_slice(&mut self, id: HeapId, (start, stop, step): SliceBounds, value: Value) -> RunResult<()> {
        let data = self.slice_source(value)?;
        let array = self.bytearray_mut(id)?;
        let indices = SliceIndices::adjust(array.len(), start, stop, step)?;
        if indices.step == 1 {
            let start = usize::try_from(indices.start).unwrap_or(0);
            let stop = usize::try_from(indices.stop).unwrap_or(0).max(start);
            if stop - start == data.len() {
                array.as_mut_slice()[start..stop].copy_from_slice(&data);
            } else {
                array.resizable()?.splice(start..stop, data);
            }
            return Ok(());
        }
        if data.len() != indices.len {
            return Err(ExcType::value_error_extended_slice(data.len(), indices.len));
        }
        let slots = array.as_mut_slice();
        for (position, byte) in indices.positions().zip(data) {
            slots[position] = byte;
        }
        Ok(())
    }

    fn assign_view(&mut self, id: HeapId, key: Value, bounds: Option<SliceBounds>, value: Value) -> RunResult<()> {
        let HeapData::MemoryView(view) = self.heap.get(id) else {
            return Err(RunError::internal("expected a memoryview"));
        };
        view.check_live()?;
        if view.readonly {
            return Err(ExcType::type_error_read_only());
        }
        let view = view.clone();
        let (targets, data) = match bounds {
            Some((start, stop, step)) => {
                let indices = SliceIndices::adjust(view.len, start, stop, step)?;
                let data = match self.buffer_data(value)? {
                    Some(data) => data,
                    None => return Err(ExcType::type_error_bytes_like(&self.type_name(value))),
                };
                if data.len() != indices.len * view.itemsize {
                    return Err(ExcType::value_error(
                        "memoryview assignment: lvalue and rvalue have different structures",
                    ));
                }
                (indices.positions().collect::<Vec<_>>(), data)
            }
            None => {
                let index = self.item_index(Value::Ref(id), key, view.len)?;
                let mut item = TypedArray::new(view.format)?;
                if item.is_float() {
                    let f = self.to_float(value)?;
                    item.push_float(f)?;
                } else {
                    let n = self.to_index(value)?;
                    item.push_int(&n)?;
                }
                (vec![index], item.as_bytes().to_vec())
            }
        };
        let Some(raw) = self.raw_bytes_mut(view.source) else {
            return Err(ExcType::type_error_read_only());
        };
        for (i, chunk) in targets.into_iter().zip(data.chunks(view.itemsize)) {
            if let Some(range) = view.item_range(i)
                && let Some(slot) = raw.get_mut(range)
            {
                slot.copy_from_slice(chunk);
            }
        }
        Ok(())
    }

    /// `del obj[key]`.
    pub fn del_item(&mut self, obj: Value, key: Value) -> RunResult<()> {
        if self.call_hook(obj, "__delitem__", ArgValues::One(key))?.is_some() {
            return Ok(());
        }
        let target = self.unwrap_base(obj);
        let Value::Ref(id) = target else {
            return Err(ExcType::type_error_item_deletion(&self.type_name(obj)));
        };
        let t = self.type_of(target);
        if t == Type::Dict {
            let removed = match (self.as_str(key).map(str::to_owned), self.heap.get_mut(id)) {
                (Some(k), HeapData::Dict(map)) => map.shift_remove(&k).is_some(),
                _ => false,
            };
            return if removed {
                Ok(())
            } else {
                Err(ExcType::key_error(&self.repr(key)?))
            };
        }
        if t != Type::Bytearray && t != Type::List {
            return Err(ExcType::type_error_item_deletion(&self.type_name(obj)));
        }
        let len = self.container_len(id).unwrap_or(0);
        let mut positions: Vec<usize> = match self.slice_bounds(key)? {
            Some((start, stop, step)) => SliceIndices::adjust(len, start, stop, step)?.positions().collect(),
            None => vec![self.item_index(target, key, len)?],
        };
        if positions.is_empty() {
            return Ok(());
        }
        positions.sort_unstable_by(|a, b| b.cmp(a));
        match self.heap.get_mut(id) {
            HeapData::ByteArray(array) => {
                let data = array.resizable()?;
                for position in positions {
                    data.remove(position);
                }
            }
            HeapData::List(items) => {
                for position in positions {
                    items.remove(position);
                }
            }
            _ => {}
        }
        Ok(())
    }

    /// `len(obj)`.
    pub fn len(&mut self, obj: Value) -> RunResult<usize> {
        if let Some(result) = self.call_hook(obj, "__len__", ArgValues::Empty)? {
            let n = self.index_sized(result)?;
            return usize::try_from(n).map_err(|_| ExcType::value_error_negative_len());
        }
        let target = self.unwrap_base(obj);
        if let Value::Ref(id) = target
            && let Some(len) = self.container_len(id)
        {
            return Ok(len);
        }
        Err(ExcType::type_error_no_len(&self.type_name(obj)))
    }

    /// `hash(obj)`.
    ///
    /// Numbers that compare equal hash equal across int, float and the typed
    /// primitives; `bytes` hashes its contents. Mutable builtins are unhashable.
    pub fn hash(&mut self, obj: Value) -> RunResult<i64> {
        if let Some(result) = self.call_hook(obj, "__hash__", ArgValues::Empty)? {
            return self.index_sized(result);
        }
        let target = self.unwrap_base(obj);
        let id = match target {
            Value::None => return Ok(0x0dd0_f00d),
            Value::NotImplemented => return Ok(0x0dd0_f00e),
            Value::Bool(b) => return Ok(i64::from(b)),
            Value::Int(i) => return Ok(int_hash(&BigInt::from(i))),
            Value::Float(f) => return Ok(float_hash(f)),
            Value::Prim(PrimValue::Single(f)) => return Ok(float_hash(f64::from(f))),
            Value::Prim(PrimValue::Decimal(d)) => return Ok(float_hash(d.to_f64())),
            Value::Prim(PrimValue::Char(c)) => return Ok(i64::from(c)),
            Value::Prim(p) => return Ok(p.integer().map_or(0, |v| int_hash(&v))),
            Value::Type(t) => return Ok(seeded_hash(t)),
            Value::Ref(id) => id,
        };
        let items = match self.heap.get(id) {
            HeapData::Str(s) => return Ok(seeded_hash(s.as_str())),
            HeapData::LongInt(li) => return Ok(int_hash(li.inner())),
            HeapData::Bytes(b) => return Ok(seeded_hash(b.as_slice())),
            HeapData::Complex(c) => {
                let (re, im) = (c.re, c.im);
                return Ok(float_hash(re).wrapping_add(float_hash(im).wrapping_mul(1_000_003)));
            }
            HeapData::ByteArray(_) | HeapData::List(_) | HeapData::Dict(_) => {
                return Err(ExcType::type_error_unhashable(&self.type_name(target)));
            }
            HeapData::Tuple(items) => items.clone(),
            _ => return Ok(i64::try_from(id.index()).unwrap_or(i64::MAX)),
        };
        let mut acc: i64 = 0x0034_5678;
        for item in items {
            acc = (acc ^ self.hash(item)?).wrapping_mul(1_000_003);
        }
        Ok(if acc == -1 { -2 } else { acc })
    }
}

/// Python's integer hash: the value modulo 2**61 - 1, keeping the sign; -1 maps to -2.
fn int_hash(v: &BigInt) -> i64 {
    const MODULUS: u64 = (1 << 61) - 1;
    let reduced = (v.magnitude() % MODULUS).to_i64().unwrap_or(0);
    let h = if v.is_negative() { -reduced } else { reduced };
    if h == -1 { -2 } else { h }
}

fn float_hash(f: f64) -> i64 {
    if f.is_finite()
        && f.fract() == 0.0
        && let Ok(v) = float_to_bigint(f)
    {
        return int_hash(&v);
    }
    seeded_hash(f.to_bits())
}

fn seeded_hash(value: impl std::hash::Hash) -> i64 {
    let state = ahash::RandomState::with_seeds(0x243f_6a88, 0x85a3_08d3, 0x1319_8a2e, 0x0370_7344);
    let h = i64::from_ne_bytes(BuildHasher::hash_one(&state, value).to_ne_bytes());
    if h == -1 { -2 } else { h }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;
    use crate::EngineConfig;

    fn call(rt: &mut Runtime, obj: Value, name: &str, args: Vec<Value>) -> RunResult<Value> {
        rt.call_method(obj, name, ArgValues::positional(args))
    }

    #[test]
    fn find_clamps_bounds() {
        let mut rt = Runtime::new(EngineConfig::default());
        let b = rt.new_bytes(b"abc".to_vec());
        let empty = rt.new_bytes(Vec::new());
        let found = call(&mut rt, b, "find", vec![empty, Value::Int(3), Value::Int(0)]).unwrap();
        assert!(matches!(found, Value::Int(-1)));
        let found = call(&mut rt, b, "find", vec![empty, Value::Int(-10), Value::Int(3)]).unwrap();
        assert!(matches!(found, Value::Int(0)));
        let found = call(&mut rt, b, "find", vec![empty, Value::Int(4)]).unwrap();
        assert!(matches!(found, Value::Int(-1)));
        let found = call(&mut rt, b, "find", vec![Value::Int(99)]).unwrap();
        assert!(matches!(found, Value::Int(2)));
        let err = call(&mut rt, b, "index", vec![Value::Int(120)]).unwrap_err();
        assert_eq!(err.message(), Some("subsection not found"));
    }

    #[test]
    fn bytearray_lookup_errors() {
        let mut rt = Runtime::new(EngineConfig::default());
        let ba = rt.new_bytearray(Vec::new());
        let err = call(&mut rt, ba, "pop", vec![]).unwrap_err();
        assert_eq!(err.message(), Some("pop from empty bytearray"));
        let err = call(&mut rt, ba, "remove", vec![Value::Int(1)]).unwrap_err();
        assert_eq!(err.message(), Some("value not found in bytearray"));
        let b = rt.new_bytes(b"x".to_vec());
        let err = call(&mut rt, b, "append", vec![Value::Int(1)]).unwrap_err();
        assert_eq!(err.exc_type(), Some(ExcType::AttributeError));
    }

    #[test]
    fn slice_assignment_rules() {
        let mut rt = Runtime::new(EngineConfig::default());
        let ba = rt.new_bytearray(b"abcdef".to_vec());
        let view = rt.new_memoryview(ba).unwrap();
        let all = rt.new_slice(Value::Int(0), Value::Int(2), Value::None);
        let same = rt.new_bytes(b"XY".to_vec());
        rt.set_item(ba, all, same).unwrap();
        assert_eq!(rt.buffer_data(view).unwrap(), Some(b"XYcdef".to_vec()));

        let longer = rt.new_bytes(b"XYZ".to_vec());
        let err = rt.set_item(ba, all, longer).unwrap_err();
        assert_eq!(err.exc_type(), Some(ExcType::BufferError));

        let err = rt.set_item(ba, all, Value::Int(3)).unwrap_err();
        assert_eq!(
            err.message(),
            Some("can assign only bytes, buffers, or iterables of ints in range(0, 256)")
        );

        let every_other = rt.new_slice(Value::None, Value::None, Value::Int(2));
        let err = rt.set_item(ba, every_other, same).unwrap_err();
        assert_eq!(
            err.message(),
            Some("attempt to assign bytes of size 2 to extended slice of size 3")
        );
        call(&mut rt, view, "release", vec![]).unwrap();
        rt.set_item(ba, all, longer).unwrap();
        assert_eq!(rt.byte_data(ba), Some(&b"XYZcdef"[..]));
    }

    #[test]
    fn hashes_agree_across_numeric_types() {
        let mut rt = Runtime::new(EngineConfig::default());
        assert_eq!(rt.hash(Value::Int(5)).unwrap(), rt.hash(Value::Float(5.0)).unwrap());
        assert_eq!(
            rt.hash(Value::Int(7)).unwrap(),
            rt.hash(Value::Prim(PrimValue::Byte(7))).unwrap()
        );
        assert_eq!(rt.hash(Value::Int(-1)).unwrap(), -2);
        let a = rt.new_bytes(b"abc".to_vec());
        let b = rt.new_bytes(b"abc".to_vec());
        assert_eq!(rt.hash(a).unwrap(), rt.hash(b).unwrap());
        let ba = rt.new_bytearray(b"abc".to_vec());
        let err = rt.hash(ba).unwrap_err();
        assert_eq!(err.message(), Some("unhashable type: 'bytearray'"));
    }

    #[test]
    fn item_access() {
        let mut rt = Runtime::new(EngineConfig::default());
        let b = rt.new_bytes(b"abc".to_vec());
        assert!(matches!(rt.get_item(b, Value::Int(-1)).unwrap(), Value::Int(99)));
        let err = rt.get_item(b, Value::Int(3)).unwrap_err();
        assert_eq!(err.message(), Some("index out of range"));
        let key = rt.new_str("x");
        let err = rt.get_item(b, key).unwrap_err();
        assert_eq!(err.message(), Some("bytes indices must be integers or slices, not str"));
        let reversed = rt.new_slice(Value::None, Value::None, Value::Int(-1));
        let r = rt.get_item(b, reversed).unwrap();
        assert_eq!(rt.byte_data(r), Some(&b"cba"[..]));
        let ba = rt.new_bytearray(b"abcd".to_vec());
        let odd = rt.new_slice(Value::Int(1), Value::None, Value::Int(2));
        rt.del_item(ba, odd).unwrap();
        assert_eq!(rt.byte_data(ba), Some(&b"ac"[..]));
        assert_eq!(rt.len(ba).unwrap(), 2);
    }
}
