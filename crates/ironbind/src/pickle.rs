//! `pickle.dumps`/`pickle.loads` for byte sequences and the values around them.
//!
//! Values are reduced to a [`PickleValue`] graph and encoded with `postcard` behind
//! a magic header; the format is this crate's own, not CPython's opcode stream.
//! Supported: `None`, `bool`, `int`, `float`, `str`, `bytes`, `bytearray`, tuples,
//! lists, dicts, instances of declared classes (including `bytes`/`bytearray`
//! subclasses, restored by class name) and index-based iterators, which come back
//! as `iter(source)` advanced to the saved position.
//!
//! Object identity is not preserved: a value reachable twice is pickled twice.

use ahash::AHashSet;
use indexmap::IndexMap;
use num_bigint::BigInt;

use crate::{
    exception::{ExcType, RunResult},
    heap::{HeapData, HeapId},
    runtime::Runtime,
    types::{Instance, LongInt, PyIter},
    value::Value,
};

/// Magic header of a pickle payload.
const PICKLE_MAGIC: &[u8; 8] = b"IRONPKL1";
/// Highest supported pickle protocol number.
pub const HIGHEST_PROTOCOL: i64 = 5;
/// Default pickle protocol number.
pub const DEFAULT_PROTOCOL: i64 = 5;

#[derive(Debug, serde::Serialize, serde::Deserialize)]
struct PicklePayload {
    protocol: i64,
    value: PickleValue,
}

#[derive(Debug, serde::Serialize, serde::Deserialize)]
enum PickleValue {
    None,
    Bool(bool),
    Int(i64),
    BigInt(BigInt),
    Float(f64),
    Str(String),
    Bytes(Vec<u8>),
    ByteArray(Vec<u8>),
    Tuple(Vec<Self>),
    List(Vec<Self>),
    Dict(Vec<(String, Self)>),
    /// An instance of a declared class, restored by name.
    Instance {
        class: String,
        base: Option<Box<Self>>,
        attrs: Vec<(String, Self)>,
    },
    /// An index-based iterator; `source` is `None` once exhausted.
    Iterator { source: Option<Box<Self>>, index: u64 },
}

/// Serializes `value`. `protocol` defaults to [`DEFAULT_PROTOCOL`]; negative
/// selects [`HIGHEST_PROTOCOL`].
pub fn dumps(rt: &Runtime, value: Value, protocol: Option<i64>) -> RunResult<Vec<u8>> {
    let protocol = resolve_protocol(protocol)?;
    let mut visited = AHashSet::new();
    let value = value_to_pickle(rt, value, &mut visited)?;
    let payload = PicklePayload { protocol, value };
    let encoded = postcard::to_allocvec(&payload).map_err(ExcType::value_error_pickle_data)?;
    let mut out = Vec::with_capacity(PICKLE_MAGIC.len() + encoded.len());
    out.extend_from_slice(PICKLE_MAGIC);
    out.extend_from_slice(&encoded);
    Ok(out)
}

/// Rebuilds a value serialized by [`dumps`].
pub fn loads(rt: &mut Runtime, data: &[u8]) -> RunResult<Value> {
    let Some(body) = data.strip_prefix(PICKLE_MAGIC.as_slice()) else {
        return Err(ExcType::value_error_pickle_data("missing header"));
    };
    let payload: PicklePayload = postcard::from_bytes(body).map_err(ExcType::value_error_pickle_data)?;
    pickle_to_value(rt, payload.value)
}

fn resolve_protocol(protocol: Option<i64>) -> RunResult<i64> {
    match protocol {
        None => Ok(DEFAULT_PROTOCOL),
        Some(p) if p < 0 => Ok(HIGHEST_PROTOCOL),
        Some(p) if p > HIGHEST_PROTOCOL => Err(ExcType::value_error(format!(
            "pickle protocol must be <= {HIGHEST_PROTOCOL}"
        ))),
        Some(p) => Ok(p),
    }
}

fn value_to_pickle(rt: &Runtime, value: Value, visited: &mut AHashSet<HeapId>) -> RunResult<PickleValue> {
    match value {
        Value::None => Ok(PickleValue::None),
        Value::Bool(b) => Ok(PickleValue::Bool(b)),
        Value::Int(i) => Ok(PickleValue::Int(i)),
        Value::Float(f) => Ok(PickleValue::Float(f)),
        Value::Ref(id) => {
            if !visited.insert(id) {
                return Err(ExcType::value_error("cannot pickle recursive objects"));
            }
            let result = ref_to_pickle(rt, id, visited);
            visited.remove(&id);
            result
        }
        other => Err(ExcType::type_error_unpicklable(&rt.type_name(other))),
    }
}

fn items_to_pickle(rt: &Runtime, items: &[Value], visited: &mut AHashSet<HeapId>) -> RunResult<Vec<PickleValue>> {
    items.iter().map(|item| value_to_pickle(rt, *item, visited)).collect()
}

fn ref_to_pickle(rt: &Runtime, id: HeapId, visited: &mut AHashSet<HeapId>) -> RunResult<PickleValue> {
    Ok(match rt.heap.get(id) {
        HeapData::Str(s) => PickleValue::Str(s.clone()),
        HeapData::LongInt(li) => PickleValue::BigInt(li.inner().clone()),
        HeapData::Bytes(b) => PickleValue::Bytes(b.as_slice().to_vec()),
        HeapData::ByteArray(b) => PickleValue::ByteArray(b.as_slice().to_vec()),
        HeapData::Tuple(items) => PickleValue::Tuple(items_to_pickle(rt, items, visited)?),
        HeapData::List(items) => PickleValue::List(items_to_pickle(rt, items, visited)?),
        HeapData::Dict(map) => {
            let mut entries = Vec::with_capacity(map.len());
            for (key, value) in map {
                entries.push((key.clone(), value_to_pickle(rt, *value, visited)?));
            }
            PickleValue::Dict(entries)
        }
        HeapData::Instance(inst) => {
            let class = rt.types.class(inst.class).name.clone();
            let base = match inst.base {
                Some(base) => Some(Box::new(value_to_pickle(rt, base, visited)?)),
                None => None,
            };
            let mut names: Vec<&String> = inst.attrs.keys().collect();
            names.sort();
            let mut attrs = Vec::with_capacity(names.len());
            for name in names {
                attrs.push((name.clone(), value_to_pickle(rt, inst.attrs[name], visited)?));
            }
            PickleValue::Instance { class, base, attrs }
        }
        HeapData::Iter(PyIter::Bytes { source, index, .. } | PyIter::Seq { source, index }) => {
            let source = match source {
                Some(source) => Some(Box::new(value_to_pickle(rt, *source, visited)?)),
                None => None,
            };
            PickleValue::Iterator {
                source,
                index: u64::try_from(*index).unwrap_or(u64::MAX),
            }
        }
        _ => return Err(ExcType::type_error_unpicklable(&rt.type_name(Value::Ref(id)))),
    })
}

fn pickle_to_value(rt: &mut Runtime, value: PickleValue) -> RunResult<Value> {
    Ok(match value {
        PickleValue::None => Value::None,
        PickleValue::Bool(b) => Value::Bool(b),
        PickleValue::Int(i) => Value::Int(i),
        PickleValue::BigInt(i) => LongInt::new(i).into_value(&mut rt.heap),
        PickleValue::Float(f) => Value::Float(f),
        PickleValue::Str(s) => rt.new_str(s),
        PickleValue::Bytes(data) => rt.new_bytes(data),
        PickleValue::ByteArray(data) => rt.new_bytearray(data),
        PickleValue::Tuple(items) => {
            let items = pickles_to_values(rt, items)?;
            rt.new_tuple(items)
        }
        PickleValue::List(items) => {
            let items = pickles_to_values(rt, items)?;
            rt.new_list(items)
        }
        PickleValue::Dict(entries) => {
            let mut map = IndexMap::with_capacity(entries.len());
            for (key, value) in entries {
                let value = pickle_to_value(rt, value)?;
                map.insert(key, value);
            }
            rt.new_dict(map)
        }
        PickleValue::Instance { class, base, attrs } => {
            let Some(class_id) = rt.types.find_class(&class) else {
                return Err(ExcType::value_error_pickle_data(format!("unknown class '{class}'")));
            };
            let base = match base {
                Some(base) => Some(pickle_to_value(rt, *base)?),
                None => None,
            };
            let mut instance = Instance::new(class_id, base);
            for (name, value) in attrs {
                let value = pickle_to_value(rt, value)?;
                instance.attrs.insert(name, value);
            }
            rt.alloc(HeapData::Instance(instance))
        }
        PickleValue::Iterator { source, index } => {
            let source = match source {
                Some(source) => pickle_to_value(rt, *source)?,
                None => rt.new_tuple(Vec::new()),
            };
            let iterator = rt.iter(source)?;
            if let Value::Ref(id) = iterator
                && matches!(rt.heap.get(id), HeapData::Iter(_))
            {
                rt.iterator_setstate(id, i64::try_from(index).unwrap_or(i64::MAX));
            }
            iterator
        }
    })
}

fn pickles_to_values(rt: &mut Runtime, items: Vec<PickleValue>) -> RunResult<Vec<Value>> {
    items.into_iter().map(|item| pickle_to_value(rt, item)).collect()
}
