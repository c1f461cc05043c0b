//! `repr()` and `str()`.
//!
//! Containers are rendered recursively; a heap id already on the rendering stack
//! prints as `[...]`/`(...)` instead of recursing forever.

use std::fmt::Write;

use ahash::AHashSet;

use crate::{
    args::ArgValues,
    exception::{ExcType, RunResult},
    format::float_repr,
    heap::{HeapData, HeapId},
    runtime::Runtime,
    types::{PrimValue, PyIter, bytes_repr},
    value::Value,
};

/// Python's repr of a string: single quotes unless the text contains `'` and no `"`.
#[must_use]
pub(crate) fn str_repr(s: &str) -> String {
    let quote = if s.contains('\'') && !s.contains('"') { '"' } else { '\'' };
    let mut out = String::with_capacity(s.len() + 2);
    out.push(quote);
    for ch in s.chars() {
        match ch {
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            c if c == quote => {
                out.push('\\');
                out.push(c);
            }
            c if (c as u32) < 0x20 || c as u32 == 0x7f => {
                let _ = write!(out, "\\x{:02x}", c as u32);
            }
            c => out.push(c),
        }
    }
    out.push(quote);
    out
}

impl Runtime {
    /// `repr(v)`.
    pub fn repr(&mut self, v: Value) -> RunResult<String> {
        let mut seen = AHashSet::new();
        self.repr_in(v, &mut seen)
    }

    /// `str(v)`.
    ///
    /// Byte sequences go through the `BytesWarning` check unless a subclass overrides
    /// `__str__`.
    pub fn str(&mut self, v: Value) -> RunResult<String> {
        if let Some(s) = self.as_str(v) {
            return Ok(s.to_owned());
        }
        if let Value::Prim(PrimValue::Char(c)) = v {
            return Ok(char::decode_utf16([c]).map(|r| r.unwrap_or('\u{fffd}')).collect());
        }
        if let Some(result) = self.call_hook(v, "__str__", ArgValues::Empty)? {
            return self.hook_string("__str__", result);
        }
        let target = self.unwrap_base(v);
        if let Value::Ref(id) = target {
            match self.heap.get(id) {
                HeapData::Str(s) => return Ok(s.clone()),
                HeapData::Bytes(_) => self.check_bytes_warning("str() on a bytes instance")?,
                HeapData::ByteArray(_) => self.check_bytes_warning("str() on a bytearray instance")?,
                _ => {}
            }
        }
        self.repr(v)
    }

    fn hook_string(&self, hook: &str, result: Value) -> RunResult<String> {
        match self.as_str(result) {
            Some(s) => Ok(s.to_owned()),
            None => Err(ExcType::type_error_hook_str(hook, &self.type_name(result))),
        }
    }

    fn repr_in(&mut self, v: Value, seen: &mut AHashSet<HeapId>) -> RunResult<String> {
        let id = match v {
            Value::None => return Ok("None".to_owned()),
            Value::NotImplemented => return Ok("NotImplemented".to_owned()),
            Value::Bool(true) => return Ok("True".to_owned()),
            Value::Bool(false) => return Ok("False".to_owned()),
            Value::Int(i) => return Ok(i.to_string()),
            Value::Float(f) => return Ok(float_repr(f)),
            Value::Prim(p) => return Ok(self.prim_repr(p)),
            Value::Type(t) => return Ok(format!("<class '{}'>", self.name_of_type(t))),
            Value::Ref(id) => id,
        };
        if let HeapData::Instance(inst) = self.heap.get(id) {
            let base = inst.base;
            if let Some(result) = self.call_hook(v, "__repr__", ArgValues::Empty)? {
                return self.hook_string("__repr__", result);
            }
            return match base {
                Some(base) => self.repr_in(base, seen),
                None => Ok(format!("<{} object>", self.type_name(v))),
            };
        }
        if !seen.insert(id) {
            return Ok(match self.heap.get(id) {
                HeapData::Tuple(_) => "(...)",
                HeapData::Dict(_) => "{...}",
                _ => "[...]",
            }
            .to_owned());
        }
        let out = self.heap_repr(id, seen);
        seen.remove(&id);
        out
    }

    fn heap_repr(&mut self, id: HeapId, seen: &mut AHashSet<HeapId>) -> RunResult<String> {
        let items = match self.heap.get(id) {
            HeapData::Str(s) => return Ok(str_repr(s)),
            HeapData::LongInt(li) => return Ok(li.to_string()),
            HeapData::Complex(c) => return Ok(c.to_string()),
            HeapData::Bytes(b) => return Ok(bytes_repr(b.as_slice())),
            HeapData::ByteArray(b) => return Ok(format!("bytearray({})", bytes_repr(b.as_slice()))),
            HeapData::MemoryView(_) => return Ok(format!("<memory at {:#x}>", id.index())),
            HeapData::Iter(it) => {
                let name = match it {
                    PyIter::Generator { name, .. } => format!("<generator object {name}>"),
                    other => format!("<{} object>", self.name_of_type(other.py_type())),
                };
                return Ok(name);
            }
            HeapData::Function(f) => return Ok(format!("<function {}>", f.name)),
            HeapData::BoundMethod(_) => return Ok("<bound method>".to_owned()),
            HeapData::BuiltinMethod(m) => return Ok(format!("<built-in method {}>", m.name)),
            HeapData::MethodGroup(set) => return Ok(format!("<method group {}>", set.name)),
            HeapData::Array(arr) => {
                let typecode = arr.typecode();
                let count = arr.len();
                let mut parts = Vec::with_capacity(count);
                for i in 0..count {
                    if let Some(item) = self.array_item(id, i) {
                        parts.push(item);
                    }
                }
                if parts.is_empty() {
                    return Ok(format!("array('{typecode}')"));
                }
                return Ok(format!("array('{typecode}', [{}])", parts.join(", ")));
            }
            HeapData::Slice(s) => {
                let s = *s;
                let start = self.repr_in(s.start, seen)?;
                let stop = self.repr_in(s.stop, seen)?;
                let step = self.repr_in(s.step, seen)?;
                return Ok(format!("slice({start}, {stop}, {step})"));
            }
            HeapData::Dict(map) => {
                let entries: Vec<(String, Value)> = map.iter().map(|(k, v)| (k.clone(), *v)).collect();
                let mut parts = Vec::with_capacity(entries.len());
                for (key, value) in entries {
                    parts.push(format!("{}: {}", str_repr(&key), self.repr_in(value, seen)?));
                }
                return Ok(format!("{{{}}}", parts.join(", ")));
            }
            HeapData::Tuple(items) | HeapData::List(items) => items.clone(),
            HeapData::ManagedArray(arr) => arr.items.clone(),
            HeapData::Instance(_) => Vec::new(),
        };
        let mut parts = Vec::with_capacity(items.len());
        for item in items {
            parts.push(self.repr_in(item, seen)?);
        }
        Ok(match self.heap.get(id) {
            HeapData::Tuple(_) if parts.len() == 1 => format!("({},)", parts[0]),
            HeapData::Tuple(_) => format!("({})", parts.join(", ")),
            HeapData::ManagedArray(arr) => {
                let elem = arr.elem.clone();
                format!("Array[{}]([{}])", self.managed_elem_name(&elem), parts.join(", "))
            }
            _ => format!("[{}]", parts.join(", ")),
        })
    }

    fn array_item(&self, id: HeapId, index: usize) -> Option<String> {
        let HeapData::Array(arr) = self.heap.get(id) else {
            return None;
        };
        Some(match arr.item(index)? {
            crate::types::ArrayItem::Int(v) => v.to_string(),
            crate::types::ArrayItem::Float(f) => float_repr(f),
        })
    }

    fn prim_repr(&self, p: PrimValue) -> String {
        match p {
            PrimValue::Single(f) => {
                if f.is_finite() && f.fract() == 0.0 && f.abs() < 1e16 {
                    format!("{f:.1}")
                } else {
                    f.to_string()
                }
            }
            PrimValue::Decimal(d) => d.to_string(),
            PrimValue::Char(c) => {
                let text: String = char::decode_utf16([c]).map(|r| r.unwrap_or('\u{fffd}')).collect();
                str_repr(&text)
            }
            PrimValue::Enum(id, value) => {
                let def = self.types.primitives.enum_def(id);
                match def.member_name(value) {
                    Some(member) => format!("{}.{member}", def.name),
                    None => format!("{}({value})", def.name),
                }
            }
            other => other.integer().map(|v| v.to_string()).unwrap_or_default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;
    use crate::{BytesWarningPolicy, EngineConfig};

    #[test]
    fn string_quoting() {
        assert_eq!(str_repr("abc"), "'abc'");
        assert_eq!(str_repr("it's"), "\"it's\"");
        assert_eq!(str_repr("'\""), "'\\'\"'");
        assert_eq!(str_repr("a\nb\x01"), "'a\\nb\\x01'");
    }

    #[test]
    fn containers_and_cycles() {
        let mut rt = Runtime::new(EngineConfig::default());
        let b = rt.new_bytes(b"x".to_vec());
        let one = rt.new_tuple(vec![b]);
        assert_eq!(rt.repr(one).unwrap(), "(b'x',)");
        let list = rt.new_list(vec![Value::Int(1), Value::None]);
        if let Value::Ref(id) = list
            && let HeapData::List(items) = rt.heap.get_mut(id)
        {
            items.push(list);
        }
        assert_eq!(rt.repr(list).unwrap(), "[1, None, [...]]");
        let ba = rt.new_bytearray(b"ab".to_vec());
        assert_eq!(rt.repr(ba).unwrap(), "bytearray(b'ab')");
    }

    #[test]
    fn str_of_bytes_warns() {
        let config = EngineConfig::default().with_bytes_warning(BytesWarningPolicy::Default);
        let mut rt = Runtime::new(config);
        let b = rt.new_bytes(b"ab".to_vec());
        assert_eq!(rt.str(b).unwrap(), "b'ab'");
        let ba = rt.new_bytearray(Vec::new());
        assert_eq!(rt.str(ba).unwrap(), "bytearray(b'')");
        let messages: Vec<String> = rt.take_warnings().into_iter().map(|w| w.message).collect();
        assert_eq!(
            messages,
            vec!["str() on a bytes instance".to_owned(), "str() on a bytearray instance".to_owned()]
        );
    }
}
