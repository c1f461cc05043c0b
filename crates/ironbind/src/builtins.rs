//! Calling type objects: `int(x)`, `bytes(...)`, `Int32(x)`, `MyClass(...)`.

use indexmap::IndexMap;
use num_bigint::BigInt;

use crate::{
    args::ArgValues,
    exception::{ExcType, RunError, RunResult},
    overload::ParamType,
    repr::str_repr,
    runtime::Runtime,
    types::{ClassId, ClassKind, Complex, Primitive, Type, codec},
    value::Value,
};

impl Runtime {
    /// `t(*args, **kwargs)`.
    pub(crate) fn call_type(&mut self, t: Type, args: ArgValues) -> RunResult<Value> {
        match t {
            Type::Bytes => self.construct_bytes(Type::Bytes, args),
            Type::Bytearray => {
                let array = self.new_bytearray(Vec::new());
                let id = array.ref_id().ok_or_else(|| RunError::internal("bytearray not on heap"))?;
                self.init_bytearray(id, args)?;
                Ok(array)
            }
            Type::Int => self.call_int(args),
            Type::Float => self.call_float(args),
            Type::Bool => match args.get_zero_one_arg("bool")? {
                None => Ok(Value::Bool(false)),
                Some(v) => self.to_bool(v).map(Value::Bool),
            },
            Type::Str => self.call_str(args),
            Type::Complex => {
                let c = match args.get_positional_range("complex", 0, 2)?.as_slice() {
                    [] => Complex::new(0.0, 0.0),
                    [real] => self.to_complex(*real)?,
                    [real, imag, ..] => {
                        let re = self.to_complex(*real)?;
                        let im = self.to_complex(*imag)?;
                        Complex::new(re.re - im.im, re.im + im.re)
                    }
                };
                Ok(self.new_complex(c.re, c.im))
            }
            Type::MemoryView => {
                let source = args.get_one_arg("memoryview")?;
                self.new_memoryview(source)
            }
            Type::Tuple | Type::List => {
                let name = if t == Type::Tuple { "tuple" } else { "list" };
                let items = match args.get_zero_one_arg(name)? {
                    Some(iterable) => self.collect_iter(iterable)?,
                    None => Vec::new(),
                };
                Ok(if t == Type::Tuple {
                    self.new_tuple(items)
                } else {
                    self.new_list(items)
                })
            }
            Type::Dict => {
                let (positional, kwargs) = args.into_parts();
                if !positional.as_slice().is_empty() {
                    return Err(ExcType::type_error_at_most("dict", 0, positional.len()));
                }
                let map: IndexMap<String, Value> = kwargs.into_iter().collect();
                Ok(self.new_dict(map))
            }
            Type::Slice => {
                let bounds = args.get_positional_range("slice", 1, 3)?;
                Ok(match bounds.as_slice() {
                    [stop] => self.new_slice(Value::None, *stop, Value::None),
                    [start, stop] => self.new_slice(*start, *stop, Value::None),
                    [start, stop, step, ..] => self.new_slice(*start, *stop, *step),
                    [] => return Err(ExcType::type_error_at_least("slice", 1, 0)),
                })
            }
            Type::Array => {
                let (code, init) = args.get_one_two_args("array")?;
                let typecode = match self.as_str(code) {
                    Some(s) if s.chars().count() == 1 => s.chars().next().unwrap_or('B'),
                    _ => {
                        return Err(ExcType::type_error(format!(
                            "array() argument 1 must be a unicode character, not {}",
                            self.type_name(code)
                        )));
                    }
                };
                let items = match init {
                    Some(init) => self.collect_iter(init)?,
                    None => Vec::new(),
                };
                self.new_array(typecode, &items)
            }
            Type::Type => {
                let v = args.get_one_arg("type")?;
                Ok(Value::Type(self.type_of(v)))
            }
            Type::Primitive(p) => {
                let v = args.get_one_arg(p.managed_name())?;
                self.convert_explicit(v, &ParamType::Primitive(p))
            }
            Type::Enum(id) => {
                let name = self.types.primitives.enum_def(id).name.clone();
                let v = args.get_one_arg(&name)?;
                self.convert_explicit(v, &ParamType::Enum(id))
            }
            Type::ManagedArray => {
                let (elem, init) = args.get_one_two_args("Array")?;
                let elem = match elem {
                    Value::Type(t) => self.param_type_of(t),
                    other => return Err(ExcType::type_error_expected_got("type", &self.type_name(other))),
                };
                let items = match init {
                    Some(init) => self.collect_iter(init)?,
                    None => Vec::new(),
                };
                self.new_managed_array(elem, &items)
            }
            Type::Class(id) => self.instantiate(id, args),
            other => Err(ExcType::type_error_no_instances(&self.name_of_type(other))),
        }
    }

    /// The managed parameter type naming a runtime type.
    fn param_type_of(&self, t: Type) -> ParamType {
        match t {
            Type::Object => ParamType::Object,
            Type::Int => ParamType::Primitive(Primitive::Int32),
            Type::Float => ParamType::Primitive(Primitive::Double),
            Type::Bool => ParamType::Primitive(Primitive::Boolean),
            Type::Str => ParamType::Primitive(Primitive::String),
            Type::Primitive(p) => ParamType::Primitive(p),
            Type::Enum(id) => ParamType::Enum(id),
            Type::Class(id) => ParamType::Class(id),
            other => ParamType::Builtin(other),
        }
    }

    fn call_int(&mut self, args: ArgValues) -> RunResult<Value> {
        let mut bound = args.bind_names("int", &["x", "base"])?.into_iter();
        let (x, base) = (bound.next().flatten(), bound.next().flatten());
        let Some(x) = x else {
            if base.is_some() {
                return Err(ExcType::type_error("int() missing string argument"));
            }
            return Ok(Value::Int(0));
        };
        let text = {
            let target = self.unwrap_base(x);
            self.as_str(target)
                .map(str::to_owned)
                .or_else(|| self.byte_data(target).map(|b| String::from_utf8_lossy(b).into_owned()))
        };
        match (text, base) {
            (Some(text), base) => {
                let base = match base {
                    Some(b) => self.index_sized(b)?,
                    None => 10,
                };
                let base = u32::try_from(base)
                    .ok()
                    .filter(|b| *b == 0 || (2..=36).contains(b))
                    .ok_or_else(|| ExcType::value_error("int() base must be >= 2 and <= 36, or 0"))?;
                match parse_int(&text, base) {
                    Some(v) => Ok(self.new_int(v)),
                    None => Err(ExcType::value_error_int_literal(base, &str_repr(&text))),
                }
            }
            (None, Some(_)) => Err(ExcType::type_error("int() can't convert non-string with explicit base")),
            (None, None) => self.to_int(x),
        }
    }

    fn call_float(&mut self, args: ArgValues) -> RunResult<Value> {
        let Some(x) = args.get_zero_one_arg("float")? else {
            return Ok(Value::Float(0.0));
        };
        if let Some(text) = self.as_str(self.unwrap_base(x)) {
            return match parse_float(text) {
                Some(f) => Ok(Value::Float(f)),
                None => Err(ExcType::value_error_float_literal(&str_repr(text))),
            };
        }
        self.to_float(x).map(Value::Float)
    }

    fn call_str(&mut self, args: ArgValues) -> RunResult<Value> {
        let mut bound = args.bind_names("str", &["object", "encoding", "errors"])?.into_iter();
        let (object, encoding, errors) = (bound.next().flatten(), bound.next().flatten(), bound.next().flatten());
        let Some(object) = object else {
            return Ok(self.new_str(""));
        };
        if encoding.is_none() && errors.is_none() {
            let text = self.str(object)?;
            return Ok(self.new_str(text));
        }
        let Some(data) = self.buffer_data(object)? else {
            return Err(ExcType::type_error(format!(
                "decoding to str: need a bytes-like object, {} found",
                self.type_name(object)
            )));
        };
        let name_of = |rt: &Self, arg: &str, v: Option<Value>| -> RunResult<Option<String>> {
            match v {
                None => Ok(None),
                Some(v) => rt
                    .as_str(v)
                    .map(|s| Some(s.to_owned()))
                    .ok_or_else(|| ExcType::type_error_str_argument("str", arg, &rt.type_name(v))),
            }
        };
        let encoding = name_of(self, "encoding", encoding)?;
        let errors = name_of(self, "errors", errors)?;
        let text = codec::decode(&data, encoding.as_deref().unwrap_or("utf-8"), errors.as_deref())?;
        Ok(self.new_str(text))
    }

    /// `Class(*args)`: `__new__` if declared, then `__init__`. Builtin subclasses get
    /// their payload from the builtin constructor.
    fn instantiate(&mut self, class: ClassId, args: ArgValues) -> RunResult<Value> {
        let def = self.types.class(class);
        if def.kind == ClassKind::Interface {
            return Err(ExcType::type_error_no_instances(&def.name));
        }
        let builtin = def.builtin_base;
        let name = def.name.clone();
        if let Some(new) = self.types.lookup_method(class, "__new__") {
            let obj = self.call(new, args.clone().prepend(Value::Type(Type::Class(class))))?;
            if self.isinstance(obj, Type::Class(class)) {
                self.run_init(obj, class, args)?;
            }
            return Ok(obj);
        }
        let has_init = self.types.lookup_method(class, "__init__").is_some();
        let obj = match builtin {
            Some(Type::Bytes) => self.construct_bytes(Type::Class(class), args.clone())?,
            Some(Type::Bytearray) => {
                let base = self.new_bytearray(Vec::new());
                let obj = self.new_instance_with_base(class, base);
                if !has_init {
                    let id = base.ref_id().ok_or_else(|| RunError::internal("bytearray not on heap"))?;
                    self.init_bytearray(id, args)?;
                    return Ok(obj);
                }
                obj
            }
            Some(other) => {
                let base = self.call_type(other, args.clone())?;
                self.new_instance_with_base(class, base)
            }
            None => {
                if !has_init && args.count() > 0 {
                    return Err(ExcType::type_error_object_no_args(&name));
                }
                self.new_instance(class)
            }
        };
        self.run_init(obj, class, args)?;
        Ok(obj)
    }

    fn run_init(&mut self, obj: Value, class: ClassId, args: ArgValues) -> RunResult<()> {
        if self.types.lookup_method(class, "__init__").is_some() {
            let result = self.call_method(obj, "__init__", args)?;
            if !result.is_none() {
                return Err(ExcType::type_error(format!(
                    "__init__() should return None, not '{}'",
                    self.type_name(result)
                )));
            }
        }
        Ok(())
    }
}

/// Parses an `int()` literal: optional sign, base prefix, `_` between digits.
fn parse_int(text: &str, base: u32) -> Option<BigInt> {
    let s = text.trim();
    let (negative, s) = match s.as_bytes().first() {
        Some(b'-') => (true, &s[1..]),
        Some(b'+') => (false, &s[1..]),
        _ => (false, s),
    };
    let prefix = s.get(..2).map(str::to_ascii_lowercase);
    let prefixed = match prefix.as_deref() {
        Some("0x") => Some(16),
        Some("0o") => Some(8),
        Some("0b") => Some(2),
        _ => None,
    };
    let (base, digits, after_prefix) = match (base, prefixed) {
        (0, Some(p)) => (p, &s[2..], true),
        (0, None) => {
            let stripped: String = s.chars().filter(|c| *c != '_').collect();
            if stripped.len() > 1 && stripped.starts_with('0') && stripped.chars().any(|c| c != '0') {
                return None;
            }
            (10, s, false)
        }
        (b, Some(p)) if b == p => (b, &s[2..], true),
        (b, _) => (b, s, false),
    };
    let digits = if after_prefix { digits.strip_prefix('_').unwrap_or(digits) } else { digits };
    if digits.is_empty() || digits.starts_with('_') || digits.ends_with('_') || digits.contains("__") {
        return None;
    }
    let cleaned: String = digits.chars().filter(|c| *c != '_').collect();
    if !cleaned.chars().all(|c| c.is_digit(base)) {
        return None;
    }
    let magnitude = BigInt::parse_bytes(cleaned.as_bytes(), base)?;
    Some(if negative { -magnitude } else { magnitude })
}

/// Parses a `float()` literal, including `inf`, `infinity` and `nan` in any case.
fn parse_float(text: &str) -> Option<f64> {
    let s = text.trim();
    let (sign, body) = match s.as_bytes().first() {
        Some(b'-') => (-1.0, &s[1..]),
        Some(b'+') => (1.0, &s[1..]),
        _ => (1.0, s),
    };
    match body.to_ascii_lowercase().as_str() {
        "inf" | "infinity" => return Some(sign * f64::INFINITY),
        "nan" => return Some(f64::NAN),
        _ => {}
    }
    if body.is_empty() || !body.chars().all(|c| c.is_ascii_digit() || matches!(c, '.' | 'e' | 'E' | '+' | '-' | '_')) {
        return None;
    }
    let bytes = body.as_bytes();
    for (i, b) in bytes.iter().enumerate() {
        if *b == b'_' {
            let before = i.checked_sub(1).and_then(|j| bytes.get(j));
            let after = bytes.get(i + 1);
            if !(before.is_some_and(u8::is_ascii_digit) && after.is_some_and(u8::is_ascii_digit)) {
                return None;
            }
        }
    }
    let cleaned: String = body.chars().filter(|c| *c != '_').collect();
    cleaned.parse::<f64>().ok().map(|f| sign * f)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn int_literals() {
        assert_eq!(parse_int(" 42 ", 10), Some(BigInt::from(42)));
        assert_eq!(parse_int("-0x_ff", 0), Some(BigInt::from(-255)));
        assert_eq!(parse_int("1_000", 10), Some(BigInt::from(1000)));
        assert_eq!(parse_int("ff", 16), Some(BigInt::from(255)));
        assert_eq!(parse_int("010", 0), None);
        assert_eq!(parse_int("1__0", 10), None);
        assert_eq!(parse_int("12a", 10), None);
        assert_eq!(parse_int("", 10), None);
    }

    #[test]
    fn float_literals() {
        assert_eq!(parse_float("1.5e3"), Some(1500.0));
        assert_eq!(parse_float("-Infinity"), Some(f64::NEG_INFINITY));
        assert!(parse_float("nan").is_some_and(f64::is_nan));
        assert_eq!(parse_float("1_0.5"), Some(10.5));
        assert_eq!(parse_float("1._5"), None);
        assert_eq!(parse_float("abc"), None);
    }

    #[test]
    fn int_call_reports_base() {
        let mut rt = Runtime::new(crate::EngineConfig::default());
        let text = rt.new_str("zz");
        let err = rt.call(Value::Type(Type::Int), vec![text]).unwrap_err();
        assert_eq!(err.message(), Some("invalid literal for int() with base 10: 'zz'"));
        let text = rt.new_str("zz");
        assert!(matches!(rt.call(Value::Type(Type::Int), vec![text, Value::Int(36)]).unwrap(), Value::Int(1295)));
    }
}
