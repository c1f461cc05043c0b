/// Tests for byte-sequence iterators: state save/restore, `__reduce__` and pickling.
use ironbind::{ArgValues, EngineConfig, ExcType, Runtime, Value, pickle, types::Type};
use pretty_assertions::assert_eq;

fn rest(rt: &mut Runtime, it: Value) -> Vec<i64> {
    rt.collect_iter(it)
        .unwrap()
        .iter()
        .map(|v| v.as_small_int().unwrap_or(-1))
        .collect()
}

#[test]
fn setstate_resumes_from_clamped_position() {
    let mut rt = Runtime::new(EngineConfig::default());
    let data: Vec<u8> = b"hello".to_vec();
    let expected: Vec<i64> = data.iter().map(|b| i64::from(*b)).collect();
    for source in [rt.new_bytes(data.clone()), rt.new_bytearray(data.clone())] {
        for state in [-3, 0, 2, 5, 9] {
            let it = rt.iter(source).unwrap();
            rt.call_method(it, "__setstate__", ArgValues::One(Value::Int(state))).unwrap();
            let start = usize::try_from(state.max(0)).unwrap().min(expected.len());
            assert_eq!(rest(&mut rt, it), expected[start..].to_vec(), "state {state}");
        }
    }
}

#[test]
fn length_hint_counts_down() {
    let mut rt = Runtime::new(EngineConfig::default());
    let b = rt.new_bytearray(b"abc".to_vec());
    let it = rt.iter(b).unwrap();
    assert_eq!(rt.type_of(it), Type::BytearrayIterator);
    rt.iter_next(it).unwrap();
    let hint = rt.call_method(it, "__length_hint__", ArgValues::Empty).unwrap();
    assert_eq!(hint.as_small_int(), Some(2));
    rt.call_method(b, "append", ArgValues::One(Value::Int(1))).unwrap();
    let hint = rt.call_method(it, "__length_hint__", ArgValues::Empty).unwrap();
    assert_eq!(hint.as_small_int(), Some(3));
}

#[test]
fn reduce_rebuilds_an_equivalent_iterator() {
    let mut rt = Runtime::new(EngineConfig::default());
    let b = rt.new_bytes(b"xyz".to_vec());
    let it = rt.iter(b).unwrap();
    rt.iter_next(it).unwrap();
    let reduced = rt.call_method(it, "__reduce__", ArgValues::Empty).unwrap();
    let parts = rt.sequence_items(reduced).unwrap().to_vec();
    assert_eq!(parts.len(), 3);
    let ctor_args = rt.sequence_items(parts[1]).unwrap().to_vec();
    let rebuilt = rt.call(parts[0], ctor_args).unwrap();
    rt.call_method(rebuilt, "__setstate__", ArgValues::One(parts[2])).unwrap();
    assert_eq!(rest(&mut rt, rebuilt), vec![i64::from(b'y'), i64::from(b'z')]);

    rest(&mut rt, it);
    let reduced = rt.call_method(it, "__reduce__", ArgValues::Empty).unwrap();
    assert_eq!(rt.repr(reduced).unwrap(), "(<built-in method iter>, ((),))");
}

#[test]
fn pickle_round_trips_byte_sequences() {
    let mut rt = Runtime::new(EngineConfig::default());
    let data: Vec<u8> = (0..=255).collect();
    for original in [rt.new_bytes(data.clone()), rt.new_bytearray(data.clone())] {
        for protocol in 0..=pickle::HIGHEST_PROTOCOL {
            let payload = pickle::dumps(&rt, original, Some(protocol)).unwrap();
            let restored = pickle::loads(&mut rt, &payload).unwrap();
            assert_eq!(rt.type_of(restored), rt.type_of(original));
            assert_eq!(rt.byte_data(restored), Some(data.as_slice()));
        }
    }

    let err = pickle::loads(&mut rt, b"IRONPKL1\xff").unwrap_err();
    assert_eq!(err.exc_type(), Some(ExcType::ValueError));
}
