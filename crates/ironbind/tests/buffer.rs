/// Tests for the buffer-export rules of `bytearray` and for building byte sequences
/// out of other buffers.
use ironbind::{ArgValues, BinaryOp, EngineConfig, ExcType, Runtime, Value, types::Type};
use pretty_assertions::assert_eq;

fn method(rt: &mut Runtime, obj: Value, name: &str, args: Vec<Value>) -> ironbind::RunResult<Value> {
    rt.call_method(obj, name, ArgValues::positional(args))
}

#[test]
fn resizing_fails_while_a_view_is_live() {
    let mut rt = Runtime::new(EngineConfig::default());
    let ba = rt.new_bytearray(b"abc".to_vec());
    let view = rt.call(Value::Type(Type::MemoryView), vec![ba]).unwrap();

    let more = rt.new_bytes(b"de".to_vec());
    let err = method(&mut rt, ba, "extend", vec![more]).unwrap_err();
    assert_eq!(err.exc_type(), Some(ExcType::BufferError));
    assert_eq!(err.message(), Some("Existing exports of data: object cannot be re-sized"));

    for (name, args) in [
        ("append", vec![Value::Int(1)]),
        ("pop", vec![]),
        ("clear", vec![]),
        ("__init__", vec![Value::Int(2)]),
    ] {
        let err = method(&mut rt, ba, name, args).unwrap_err();
        assert_eq!(err.exc_type(), Some(ExcType::BufferError), "{name}");
    }
    let err = rt.inplace_op(BinaryOp::Mul, ba, Value::Int(2)).unwrap_err();
    assert_eq!(err.exc_type(), Some(ExcType::BufferError));
    let tail = rt.new_slice(Value::Int(1), Value::None, Value::None);
    let err = rt.del_item(ba, tail).unwrap_err();
    assert_eq!(err.exc_type(), Some(ExcType::BufferError));
    assert_eq!(rt.byte_data(ba), Some(&b"abc"[..]));

    rt.set_item(ba, Value::Int(0), Value::Int(i64::from(b'z'))).unwrap();
    method(&mut rt, ba, "reverse", vec![]).unwrap();
    assert_eq!(rt.buffer_data(view).unwrap(), Some(b"cbz".to_vec()));

    method(&mut rt, view, "release", vec![]).unwrap();
    method(&mut rt, ba, "extend", vec![more]).unwrap();
    assert_eq!(rt.byte_data(ba), Some(&b"cbzde"[..]));
    let err = rt.buffer_data(view).unwrap_err();
    assert_eq!(err.message(), Some("operation forbidden on released memoryview object"));
}

#[test]
fn every_view_must_be_released() {
    let mut rt = Runtime::new(EngineConfig::default());
    let ba = rt.new_bytearray(b"ab".to_vec());
    let first = rt.new_memoryview(ba).unwrap();
    let second = rt.new_memoryview(first).unwrap();
    method(&mut rt, first, "release", vec![]).unwrap();
    method(&mut rt, first, "release", vec![]).unwrap();
    assert!(method(&mut rt, ba, "append", vec![Value::Int(1)]).is_err());
    method(&mut rt, second, "release", vec![]).unwrap();
    method(&mut rt, ba, "append", vec![Value::Int(1)]).unwrap();
    assert_eq!(rt.byte_data(ba), Some(&b"ab\x01"[..]));
}

#[test]
fn strided_views_and_typed_arrays_copy_their_bytes() {
    let mut rt = Runtime::new(EngineConfig::default());
    let b = rt.new_bytes(b"abcdef".to_vec());
    let view = rt.new_memoryview(b).unwrap();
    let every_other = rt.new_slice(Value::None, Value::None, Value::Int(2));
    let strided = rt.get_item(view, every_other).unwrap();
    let copy = rt.call(Value::Type(Type::Bytes), vec![strided]).unwrap();
    assert_eq!(rt.byte_data(copy), Some(&b"ace"[..]));

    let array = rt.new_array('H', &[Value::Int(1), Value::Int(0x0203)]).unwrap();
    let copy = rt.call(Value::Type(Type::Bytearray), vec![array]).unwrap();
    assert_eq!(rt.byte_data(copy), Some(&[1u8, 0, 3, 2][..]));
}

#[test]
fn same_length_inplace_concat_is_allowed() {
    let mut rt = Runtime::new(EngineConfig::default());
    let ba = rt.new_bytearray(b"ab".to_vec());
    let _view = rt.new_memoryview(ba).unwrap();
    let empty = rt.new_bytes(Vec::new());
    let result = rt.inplace_op(BinaryOp::Add, ba, empty).unwrap();
    assert!(result.is(&ba));
    let more = rt.new_bytes(b"c".to_vec());
    let err = rt.inplace_op(BinaryOp::Add, ba, more).unwrap_err();
    assert_eq!(err.exc_type(), Some(ExcType::BufferError));
}
