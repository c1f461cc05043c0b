//! `bytes(...)` and `bytearray.__init__(...)`.
//!
//! Both accept the same source shapes but differ in details: `bytes` honors
//! `__bytes__` and consults `__length_hint__` strictly, `bytearray` does neither and
//! appends straight into its target, so an iterator that mutates the array while it
//! is being filled sees its own writes interleaved with the constructor's.

use num_traits::ToPrimitive;

use crate::{
    args::ArgValues,
    exception::{ExcType, RunError, RunResult},
    heap::HeapId,
    hooks::LengthHintPolicy,
    runtime::Runtime,
    types::{Type, codec},
    value::Value,
};

/// Arguments after the `(source, encoding, errors)` combination was checked.
enum Prepared {
    /// Nothing left to inspect: no source, or an encoded string.
    Done(Vec<u8>),
    Object(Value),
}

enum Plan {
    Data(Vec<u8>),
    Iterate(Value),
}

impl Runtime {
    /// `cls(source=b"", encoding=None, errors=None)` for `bytes` and its subclasses.
    pub fn construct_bytes(&mut self, cls: Type, args: ArgValues) -> RunResult<Value> {
        let (source, encoding, errors) = bind_source(args, "bytes")?;
        let source = match self.prepare("bytes", source, encoding, errors)? {
            Prepared::Done(data) => return self.finish_bytes(cls, data),
            Prepared::Object(source) => source,
        };
        if matches!(source, Value::None) {
            return Err(ExcType::type_error_cannot_convert("NoneType", "bytes"));
        }
        if cls == Type::Bytes && self.type_of(source) == Type::Bytes {
            return Ok(source);
        }
        if let Some(result) = self.to_bytes(source)? {
            if cls == Type::Bytes {
                return Ok(result);
            }
            let data = self.byte_data(result).map(<[u8]>::to_vec).unwrap_or_default();
            return self.finish_bytes(cls, data);
        }
        if let Some(data) = self.buffer_data(source)? {
            return self.finish_bytes(cls, data);
        }
        if self.has_index(source) {
            let data = self.zero_filled(source)?;
            return self.finish_bytes(cls, data);
        }
        let hint = self.length_hint(source, LengthHintPolicy::Strict)?;
        let Some(iterator) = self.try_iter(source)? else {
            return Err(ExcType::type_error_cannot_convert(&self.type_name(source), "bytes"));
        };
        let mut data = Vec::with_capacity(hint.unwrap_or(0).min(self.config.limits.max_sequence_len));
        while let Some(item) = self.iter_next(iterator)? {
            let byte = self.to_index(item)?.to_u8().ok_or_else(ExcType::value_error_bytes_range)?;
            data.push(byte);
            self.config.limits.check_sequence_len(data.len())?;
        }
        self.finish_bytes(cls, data)
    }

    fn finish_bytes(&mut self, cls: Type, data: Vec<u8>) -> RunResult<Value> {
        let value = self.new_bytes(data);
        match cls {
            Type::Bytes => Ok(value),
            Type::Class(id) => Ok(self.new_instance_with_base(id, value)),
            _ => Err(RunError::internal("bytes constructor called for a non-bytes type")),
        }
    }

    /// `bytearray.__init__(target, source=None, encoding=None, errors=None)`.
    ///
    /// Arguments are validated before the target is touched; a failure while
    /// consuming an iterable leaves the array empty.
    pub(crate) fn init_bytearray(&mut self, target: HeapId, args: ArgValues) -> RunResult<()> {
        let (source, encoding, errors) = bind_source(args, "bytearray")?;
        let plan = match self.prepare("bytearray", source, encoding, errors)? {
            Prepared::Done(data) => Plan::Data(data),
            Prepared::Object(Value::None) => {
                return Err(ExcType::type_error_cannot_convert("NoneType", "bytearray"));
            }
            Prepared::Object(source) => {
                if let Some(data) = self.buffer_data(source)? {
                    Plan::Data(data)
                } else if self.has_index(source) {
                    Plan::Data(self.zero_filled(source)?)
                } else {
                    match self.try_iter(source)? {
                        Some(iterator) => Plan::Iterate(iterator),
                        None => return Err(ExcType::type_error_not_iterable(&self.type_name(source))),
                    }
                }
            }
        };
        self.bytearray_mut(target)?.resizable()?.clear();
        match plan {
            Plan::Data(data) => self.bytearray_mut(target)?.resizable()?.extend(data),
            Plan::Iterate(iterator) => {
                if let Err(err) = self.append_each(target, iterator) {
                    let array = self.bytearray_mut(target)?;
                    if array.exports() == 0 {
                        array.resizable()?.clear();
                    }
                    return Err(err);
                }
            }
        }
        Ok(())
    }

    /// Appends every item of `iterator` to the bytearray at `target`, one at a time.
    pub(crate) fn append_each(&mut self, target: HeapId, iterator: Value) -> RunResult<()> {
        while let Some(item) = self.iter_next(iterator)? {
            let byte = self.byte_value(item)?;
            let data = self.bytearray_mut(target)?.resizable()?;
            data.push(byte);
            let len = data.len();
            self.config.limits.check_sequence_len(len)?;
        }
        Ok(())
    }

    /// A single byte for `bytearray` element operations.
    pub(crate) fn byte_value(&mut self, item: Value) -> RunResult<u8> {
        self.to_index(item)?.to_u8().ok_or_else(ExcType::value_error_byte_range)
    }

    fn zero_filled(&mut self, count: Value) -> RunResult<Vec<u8>> {
        let n = self.index_sized(count)?;
        let n = usize::try_from(n).map_err(|_| ExcType::value_error_negative_count())?;
        self.config.limits.check_sequence_len(n)?;
        Ok(vec![0; n])
    }

    /// Checks the `source`/`encoding`/`errors` combination and encodes strings.
    fn prepare(
        &self,
        func: &str,
        source: Option<Value>,
        encoding: Option<Value>,
        errors: Option<Value>,
    ) -> RunResult<Prepared> {
        let encoding = self.str_argument(func, "encoding", encoding)?;
        let errors = self.str_argument(func, "errors", errors)?;
        let Some(source) = source else {
            check_no_codec(encoding, errors)?;
            return Ok(Prepared::Done(Vec::new()));
        };
        match self.as_str(self.unwrap_base(source)) {
            Some(text) => {
                let Some(encoding) = encoding else {
                    return Err(ExcType::type_error_string_without_encoding());
                };
                codec::encode(text, encoding, errors).map(Prepared::Done)
            }
            None => {
                check_no_codec(encoding, errors)?;
                Ok(Prepared::Object(source))
            }
        }
    }

    fn str_argument(&self, func: &str, arg: &str, value: Option<Value>) -> RunResult<Option<&str>> {
        match value {
            None => Ok(None),
            Some(v) => match self.as_str(self.unwrap_base(v)) {
                Some(s) => Ok(Some(s)),
                None => Err(ExcType::type_error_str_argument(func, arg, &self.type_name(v))),
            },
        }
    }
}

fn bind_source(args: ArgValues, func: &str) -> RunResult<(Option<Value>, Option<Value>, Option<Value>)> {
    let mut bound = args.bind_names(func, &["source", "encoding", "errors"])?.into_iter();
    Ok((bound.next().flatten(), bound.next().flatten(), bound.next().flatten()))
}

fn check_no_codec(encoding: Option<&str>, errors: Option<&str>) -> RunResult<()> {
    if encoding.is_some() {
        return Err(ExcType::type_error_encoding_without_string());
    }
    if errors.is_some() {
        return Err(ExcType::type_error_errors_without_string());
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::EngineConfig;

    #[test]
    fn exact_bytes_is_returned_itself() {
        let mut rt = Runtime::new(EngineConfig::default());
        let b = rt.new_bytes(b"abc".to_vec());
        let again = rt.construct_bytes(Type::Bytes, ArgValues::One(b)).unwrap();
        assert!(again.is(&b));
    }

    #[test]
    fn codec_arguments_need_a_string() {
        let mut rt = Runtime::new(EngineConfig::default());
        let utf8 = rt.new_str("utf-8");
        let err = rt
            .construct_bytes(Type::Bytes, ArgValues::Two(Value::Int(3), utf8))
            .unwrap_err();
        assert_eq!(err.message(), Some("encoding without a string argument"));
        let text = rt.new_str("abc");
        let err = rt.construct_bytes(Type::Bytes, ArgValues::One(text)).unwrap_err();
        assert_eq!(err.message(), Some("string argument without an encoding"));
        let err = rt
            .construct_bytes(Type::Bytes, ArgValues::Two(text, Value::None))
            .unwrap_err();
        assert_eq!(err.exc_type(), Some(ExcType::TypeError));
    }

    #[test]
    fn failed_init_leaves_array_empty() {
        let mut rt = Runtime::new(EngineConfig::default());
        let array = rt.new_bytearray(b"xyz".to_vec());
        let Value::Ref(id) = array else { panic!("expected heap value") };
        let items = rt.new_list(vec![Value::Int(1), Value::Int(256)]);
        let err = rt.init_bytearray(id, ArgValues::One(items)).unwrap_err();
        assert_eq!(err.message(), Some("byte must be in range(0, 256)"));
        assert_eq!(rt.byte_data(array), Some(&[][..]));
    }

    #[test]
    fn limits_cap_zero_fill() {
        let mut limits = crate::ResourceLimits::unlimited();
        limits.max_sequence_len = 16;
        let mut rt = Runtime::new(EngineConfig::default().with_limits(limits));
        let err = rt.construct_bytes(Type::Bytes, ArgValues::One(Value::Int(17))).unwrap_err();
        assert_eq!(err.exc_type(), Some(ExcType::MemoryError));
        assert!(rt.construct_bytes(Type::Bytes, ArgValues::One(Value::Int(16))).is_ok());
    }
}
