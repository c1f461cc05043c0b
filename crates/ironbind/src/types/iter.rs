//! Iterators and the iteration protocol.
//!
//! Byte and sequence iterators store an index into a source instead of a Rust
//! iterator, so stepping can take `&mut Runtime` and the state survives
//! `__reduce__`/`__setstate__`. The state is one integer plus the source reference;
//! exhaustion drops the reference, after which the iterator never produces again.

use std::{cell::RefCell, fmt, rc::Rc};

use crate::{
    exception::{ExcType, RunResult},
    heap::{HeapData, HeapId},
    runtime::Runtime,
    types::{ArrayItem, Type},
    value::Value,
};

/// Body of a generator: produces the next item, or `None` when finished.
pub type GeneratorFn = Rc<RefCell<dyn FnMut(&mut Runtime) -> RunResult<Option<Value>>>>;

/// Iteration state stored on the heap.
pub enum PyIter {
    /// Over a `bytes` or `bytearray`; yields ints.
    Bytes {
        source: Option<Value>,
        index: usize,
        mutable: bool,
    },
    /// Over a list, tuple, str, typed array, managed array or memoryview.
    Seq { source: Option<Value>, index: usize },
    /// A native generator.
    Generator {
        name: String,
        step: GeneratorFn,
        finished: bool,
    },
}

impl PyIter {
    #[must_use]
    pub fn py_type(&self) -> Type {
        match self {
            Self::Bytes { mutable: false, .. } => Type::BytesIterator,
            Self::Bytes { mutable: true, .. } => Type::BytearrayIterator,
            Self::Seq { .. } => Type::SeqIterator,
            Self::Generator { .. } => Type::Generator,
        }
    }

    /// The source and position of an index-based iterator.
    fn cursor(&self) -> Option<(Option<Value>, usize)> {
        match self {
            Self::Bytes { source, index, .. } | Self::Seq { source, index } => Some((*source, *index)),
            Self::Generator { .. } => None,
        }
    }
}

impl fmt::Debug for PyIter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Bytes { source, index, mutable } => f
                .debug_struct("Bytes")
                .field("source", source)
                .field("index", index)
                .field("mutable", mutable)
                .finish(),
            Self::Seq { source, index } => f
                .debug_struct("Seq")
                .field("source", source)
                .field("index", index)
                .finish(),
            Self::Generator { name, finished, .. } => f
                .debug_struct("Generator")
                .field("name", name)
                .field("finished", finished)
                .finish_non_exhaustive(),
        }
    }
}

impl Runtime {
    /// `iter(obj)`.
    pub fn iter(&mut self, obj: Value) -> RunResult<Value> {
        match self.try_iter(obj)? {
            Some(iterator) => Ok(iterator),
            None => Err(ExcType::type_error_not_iterable(&self.type_name(obj))),
        }
    }

    /// Like [`Runtime::iter`], with `Ok(None)` for objects that are not iterable.
    pub(crate) fn try_iter(&mut self, obj: Value) -> RunResult<Option<Value>> {
        if let Value::Ref(id) = obj {
            match self.heap.get(id) {
                HeapData::Iter(_) => return Ok(Some(obj)),
                HeapData::Bytes(_) | HeapData::ByteArray(_) => {
                    let mutable = matches!(self.heap.get(id), HeapData::ByteArray(_));
                    return Ok(Some(self.alloc(HeapData::Iter(PyIter::Bytes {
                        source: Some(obj),
                        index: 0,
                        mutable,
                    }))));
                }
                HeapData::Str(_)
                | HeapData::Tuple(_)
                | HeapData::List(_)
                | HeapData::Array(_)
                | HeapData::ManagedArray(_)
                | HeapData::MemoryView(_) => {
                    return Ok(Some(self.alloc(HeapData::Iter(PyIter::Seq {
                        source: Some(obj),
                        index: 0,
                    }))));
                }
                HeapData::Dict(map) => {
                    let keys: Vec<String> = map.keys().cloned().collect();
                    let keys = keys.into_iter().map(|k| self.new_str(k)).collect();
                    let list = self.new_list(keys);
                    return self.try_iter(list);
                }
                HeapData::Instance(instance) => {
                    let base = instance.base;
                    if let Some(result) = self.call_hook(obj, "__iter__", crate::ArgValues::Empty)? {
                        return Ok(Some(result));
                    }
                    if let Some(base) = base {
                        return self.try_iter(base);
                    }
                }
                _ => {}
            }
        }
        Ok(None)
    }

    /// Advances an iterator; `Ok(None)` means it is exhausted.
    pub fn iter_next(&mut self, iterator: Value) -> RunResult<Option<Value>> {
        let Value::Ref(id) = iterator else {
            return Err(ExcType::type_error_not_iterator(&self.type_name(iterator)));
        };
        let cursor = match self.heap.get(id) {
            HeapData::Iter(PyIter::Generator { step, finished, .. }) => {
                if *finished {
                    return Ok(None);
                }
                let step = Rc::clone(step);
                return self.generator_next(id, &step);
            }
            HeapData::Iter(it) => it.cursor(),
            HeapData::Instance(_) => {
                return match self.call_hook(iterator, "__next__", crate::ArgValues::Empty) {
                    Ok(Some(item)) => Ok(Some(item)),
                    Ok(None) => Err(ExcType::type_error_not_iterator(&self.type_name(iterator))),
                    Err(err) if err.matches(ExcType::StopIteration) => Ok(None),
                    Err(err) => Err(err),
                };
            }
            _ => None,
        };
        let Some((source, index)) = cursor else {
            return Err(ExcType::type_error_not_iterator(&self.type_name(iterator)));
        };
        let Some(source) = source else {
            return Ok(None);
        };
        let item = self.sequence_item(source, index)?;
        if let HeapData::Iter(PyIter::Bytes { source: slot, index: pos, .. } | PyIter::Seq { source: slot, index: pos }) =
            self.heap.get_mut(id)
        {
            if item.is_some() {
                *pos += 1;
            } else {
                *slot = None;
            }
        }
        Ok(item)
    }

    fn generator_next(&mut self, id: HeapId, step: &GeneratorFn) -> RunResult<Option<Value>> {
        let Ok(mut body) = step.try_borrow_mut() else {
            return Err(ExcType::value_error_generator_running());
        };
        let result = (&mut *body)(self);
        drop(body);
        if !matches!(result, Ok(Some(_)))
            && let HeapData::Iter(PyIter::Generator { finished, .. }) = self.heap.get_mut(id)
        {
            *finished = true;
        }
        result
    }

    /// Item `index` of an indexable source, or `None` past its current end.
    fn sequence_item(&mut self, source: Value, index: usize) -> RunResult<Option<Value>> {
        let Value::Ref(id) = source else {
            return Ok(None);
        };
        let item = match self.heap.get(id) {
            HeapData::Bytes(b) => b.as_slice().get(index).map(|b| Value::Int(i64::from(*b))),
            HeapData::ByteArray(b) => b.as_slice().get(index).map(|b| Value::Int(i64::from(*b))),
            HeapData::Tuple(items) | HeapData::List(items) => items.get(index).copied(),
            HeapData::ManagedArray(arr) => arr.items.get(index).copied(),
            HeapData::Str(s) => {
                let Some(ch) = s.chars().nth(index) else {
                    return Ok(None);
                };
                return Ok(Some(self.new_str(ch.to_string())));
            }
            HeapData::Array(arr) => match arr.item(index) {
                Some(item) => return Ok(Some(self.array_item_value(item))),
                None => None,
            },
            HeapData::MemoryView(view) => {
                view.check_live()?;
                if index >= view.len {
                    return Ok(None);
                }
                return self.memoryview_item(id, index).map(Some);
            }
            _ => None,
        };
        Ok(item)
    }

    pub(crate) fn array_item_value(&mut self, item: ArrayItem) -> Value {
        match item {
            ArrayItem::Int(v) => self.new_int(v.into()),
            ArrayItem::Float(f) => Value::Float(f),
        }
    }

    /// Current length of an iterator's source, if it has one.
    fn source_len(&self, source: Value) -> usize {
        let Value::Ref(id) = source else {
            return 0;
        };
        match self.heap.get(id) {
            HeapData::Bytes(b) => b.len(),
            HeapData::ByteArray(b) => b.len(),
            HeapData::Tuple(items) | HeapData::List(items) => items.len(),
            HeapData::ManagedArray(arr) => arr.items.len(),
            HeapData::Str(s) => s.chars().count(),
            HeapData::Array(arr) => arr.len(),
            HeapData::MemoryView(view) => view.len,
            _ => 0,
        }
    }

    /// `it.__length_hint__()`: items left, 0 once exhausted.
    pub(crate) fn iterator_length_hint(&self, id: HeapId) -> usize {
        let HeapData::Iter(it) = self.heap.get(id) else {
            return 0;
        };
        match it.cursor() {
            Some((Some(source), index)) => self.source_len(source).saturating_sub(index),
            _ => 0,
        }
    }

    /// `it.__setstate__(state)`: negative clamps to 0, past the end clamps to the
    /// length. An exhausted iterator stays exhausted.
    pub(crate) fn iterator_setstate(&mut self, id: HeapId, state: i64) {
        let len = match self.heap.get(id) {
            HeapData::Iter(it) => match it.cursor() {
                Some((Some(source), _)) => self.source_len(source),
                _ => return,
            },
            _ => return,
        };
        let position = usize::try_from(state.max(0)).unwrap_or(usize::MAX).min(len);
        if let HeapData::Iter(PyIter::Bytes { index, .. } | PyIter::Seq { index, .. }) = self.heap.get_mut(id) {
            *index = position;
        }
    }

    /// `it.__reduce__()`: `(iter, (source,), index)`, or `(iter, ((),))` once exhausted.
    pub(crate) fn iterator_reduce(&mut self, id: HeapId) -> RunResult<Value> {
        let cursor = match self.heap.get(id) {
            HeapData::Iter(it) => it.cursor(),
            _ => None,
        };
        let Some((source, index)) = cursor else {
            return Err(ExcType::type_error_unpicklable(&self.type_name(Value::Ref(id))));
        };
        let iter_fn = self.builtin_iter();
        Ok(match source {
            Some(source) => {
                let args = self.new_tuple(vec![source]);
                let index = i64::try_from(index).unwrap_or(i64::MAX);
                self.new_tuple(vec![iter_fn, args, Value::Int(index)])
            }
            None => {
                let empty = self.new_tuple(Vec::new());
                let args = self.new_tuple(vec![empty]);
                self.new_tuple(vec![iter_fn, args])
            }
        })
    }

    /// Drains an iterable into a vector.
    pub fn collect_iter(&mut self, iterable: Value) -> RunResult<Vec<Value>> {
        let iterator = self.iter(iterable)?;
        let mut items = Vec::new();
        while let Some(item) = self.iter_next(iterator)? {
            items.push(item);
        }
        Ok(items)
    }
}

#[cfg(test)]
mod tests {
    use crate::{EngineConfig, Runtime, value::Value};

    #[test]
    fn byte_iterator_drops_source_when_exhausted() {
        let mut rt = Runtime::new(EngineConfig::default());
        let b = rt.new_bytes(b"ab".to_vec());
        let it = rt.iter(b).unwrap();
        assert!(matches!(rt.iter_next(it).unwrap(), Some(Value::Int(97))));
        let Value::Ref(id) = it else { panic!("iterator is a heap object") };
        assert_eq!(rt.iterator_length_hint(id), 1);
        assert!(matches!(rt.iter_next(it).unwrap(), Some(Value::Int(98))));
        assert!(rt.iter_next(it).unwrap().is_none());
        rt.iterator_setstate(id, 0);
        assert!(rt.iter_next(it).unwrap().is_none());
        assert_eq!(rt.iterator_length_hint(id), 0);
    }

    #[test]
    fn setstate_clamps() {
        let mut rt = Runtime::new(EngineConfig::default());
        let b = rt.new_bytes(b"abc".to_vec());
        let it = rt.iter(b).unwrap();
        let Value::Ref(id) = it else { panic!("iterator is a heap object") };
        rt.iterator_setstate(id, -5);
        assert!(matches!(rt.iter_next(it).unwrap(), Some(Value::Int(97))));
        rt.iterator_setstate(id, 10);
        assert!(rt.iter_next(it).unwrap().is_none());
    }

    #[test]
    fn reentrant_generator_is_rejected() {
        let mut rt = Runtime::new(EngineConfig::default());
        let slot = std::rc::Rc::new(std::cell::Cell::new(Value::None));
        let inner = std::rc::Rc::clone(&slot);
        let generator = rt.new_generator("gen", move |rt| {
            let me = inner.get();
            rt.iter_next(me).map(|_| Some(Value::Int(1)))
        });
        slot.set(generator);
        let err = rt.iter_next(generator).unwrap_err();
        assert_eq!(err.message(), Some("generator already executing"));
        assert!(rt.iter_next(generator).unwrap().is_none());
    }
}
