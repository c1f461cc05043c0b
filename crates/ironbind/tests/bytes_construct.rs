/// Tests for `bytes(...)` and `bytearray(...)` construction through the public call
/// entry point.
use ironbind::{ArgValues, EngineConfig, ExcType, Runtime, Signature, Value, types::ClassBuilder, types::Type};
use pretty_assertions::assert_eq;

fn bytes_of(rt: &mut Runtime, args: Vec<Value>) -> Value {
    rt.call(Value::Type(Type::Bytes), args).expect("bytes() should succeed")
}

fn ints(rt: &mut Runtime, v: Value) -> Vec<i64> {
    rt.collect_iter(v)
        .expect("iterable")
        .iter()
        .map(|item| item.as_small_int().unwrap_or(-1))
        .collect()
}

/// `__bytes__` method that returns `payload`.
fn bytes_hook(rt: &mut Runtime, payload: Value) -> Value {
    rt.new_function("__bytes__", Signature::plain(["self"], []), vec![], move |_, _| Ok(payload))
        .expect("valid function")
}

#[test]
fn integer_length_zero_fills() {
    let mut rt = Runtime::new(EngineConfig::default());
    let b = bytes_of(&mut rt, vec![Value::Int(5)]);
    assert_eq!(ints(&mut rt, b), vec![0, 0, 0, 0, 0]);

    let err = rt.call(Value::Type(Type::Bytes), vec![Value::Int(-1)]).unwrap_err();
    assert_eq!(err.exc_type(), Some(ExcType::ValueError));
    assert_eq!(err.message(), Some("negative count"));
}

#[test]
fn out_of_range_elements() {
    let mut rt = Runtime::new(EngineConfig::default());
    let items = rt.new_list(vec![Value::Int(256)]);
    let err = rt.call(Value::Type(Type::Bytearray), vec![items]).unwrap_err();
    assert_eq!(err.exc_type(), Some(ExcType::ValueError));

    let items = rt.new_list(vec![Value::Int(1), Value::Float(2.0)]);
    let err = rt.call(Value::Type(Type::Bytes), vec![items]).unwrap_err();
    assert_eq!(err.exc_type(), Some(ExcType::TypeError));
}

#[test]
fn list_of_bytes_rebuilds_the_sequence() {
    let mut rt = Runtime::new(EngineConfig::default());
    let original = rt.new_bytes((0..=255).collect());
    let items = rt.collect_iter(original).unwrap();
    let list = rt.new_list(items);
    let rebuilt = bytes_of(&mut rt, vec![list]);
    assert!(rt.equality(original, rebuilt).unwrap());
}

#[test]
fn identity_and_copies() {
    let mut rt = Runtime::new(EngineConfig::default());
    let b = rt.new_bytes(b"abc".to_vec());
    let same = bytes_of(&mut rt, vec![b]);
    assert!(same.is(&b));

    let ba = rt.new_bytearray(b"abc".to_vec());
    let copy = rt.call(Value::Type(Type::Bytearray), vec![ba]).unwrap();
    assert!(!copy.is(&ba));
    assert_eq!(rt.byte_data(copy), Some(&b"abc"[..]));

    let from_array = bytes_of(&mut rt, vec![ba]);
    assert_eq!(rt.type_of(from_array), Type::Bytes);
}

#[test]
fn strings_need_an_encoding() {
    let mut rt = Runtime::new(EngineConfig::default());
    let text = rt.new_str("héllo");
    let err = rt.call(Value::Type(Type::Bytes), vec![text]).unwrap_err();
    assert_eq!(err.message(), Some("string argument without an encoding"));

    let encoding = rt.new_str("utf-8");
    let encoded = bytes_of(&mut rt, vec![text, encoding]);
    assert_eq!(rt.byte_data(encoded), Some("héllo".as_bytes()));

    let err = rt.call(Value::Type(Type::Bytes), vec![text, Value::None]).unwrap_err();
    assert_eq!(err.exc_type(), Some(ExcType::TypeError));

    let err = rt.call(Value::Type(Type::Bytes), vec![Value::None]).unwrap_err();
    assert_eq!(err.message(), Some("cannot convert 'NoneType' object to bytes"));
}

#[test]
fn dunder_bytes_keeps_exact_type_for_base_constructor() {
    let mut rt = Runtime::new(EngineConfig::default());
    let sub = rt.define_class(ClassBuilder::python("MyBytes").builtin_base(Type::Bytes));
    let payload = rt.call(Value::Type(Type::Class(sub)), vec![Value::Int(2)]).unwrap();
    let hook = bytes_hook(&mut rt, payload);
    let provider = rt.define_class(ClassBuilder::python("Provider").method("__bytes__", hook));
    let obj = rt.new_instance(provider);

    let result = bytes_of(&mut rt, vec![obj]);
    assert!(result.is(&payload));
    assert_eq!(rt.type_of(result), Type::Class(sub));

    let other = rt.define_class(ClassBuilder::python("OtherBytes").builtin_base(Type::Bytes));
    let result = rt.call(Value::Type(Type::Class(other)), vec![obj]).unwrap();
    assert_eq!(rt.type_of(result), Type::Class(other));
    assert_eq!(rt.byte_data(result), Some(&[0u8, 0][..]));

    let err = rt.call(Value::Type(Type::Bytearray), vec![obj]).unwrap_err();
    assert_eq!(err.message(), Some("'Provider' object is not iterable"));
}

#[test]
fn reentrant_bytearray_init_sees_its_own_appends() {
    let mut rt = Runtime::new(EngineConfig::default());
    let target = rt.new_bytearray(Vec::new());
    let mut step = 0_i64;
    let generator = rt.new_generator("gen", move |rt| {
        step += 1;
        if step > 1 {
            let marker = if step <= 6 { 100 } else { 101 };
            rt.call_method(target, "append", ArgValues::One(Value::Int(marker)))?;
        }
        Ok(match step {
            1..=5 => Some(Value::Int(250 + step)),
            6..=10 => Some(Value::Int(step - 5)),
            _ => None,
        })
    });
    rt.call_method(target, "__init__", ArgValues::One(generator)).unwrap();
    assert_eq!(
        rt.byte_data(target),
        Some(&[251, 100, 252, 100, 253, 100, 254, 100, 255, 100, 1, 101, 2, 101, 3, 101, 4, 101, 5, 101][..])
    );
}

#[test]
fn oversized_index_names_the_hook_owner() {
    let mut rt = Runtime::new(EngineConfig::default());
    let huge = rt.new_int(num_bigint::BigInt::from(2) << 222);
    let index = rt
        .new_function("__index__", Signature::plain(["self"], []), vec![], move |_, _| Ok(huge))
        .unwrap();
    let class = rt.define_class(ClassBuilder::python("IndexableOC").method("__index__", index));
    let obj = rt.new_instance(class);
    let err = rt.call(Value::Type(Type::Bytes), vec![obj]).unwrap_err();
    assert_eq!(err.exc_type(), Some(ExcType::OverflowError));
    assert_eq!(err.message(), Some("cannot fit 'IndexableOC' into an index-sized integer"));

    let err = rt.call(Value::Type(Type::Bytes), vec![huge]).unwrap_err();
    assert_eq!(err.message(), Some("cannot fit 'int' into an index-sized integer"));
}
