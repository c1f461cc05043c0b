/// Tests for converting Python numbers to managed primitives and back.
use ironbind::{
    EngineConfig, ExcType, ParamType, Runtime, Value,
    types::{PrimValue, Primitive},
};
use num_bigint::BigInt;
use pretty_assertions::assert_eq;

fn boundary_values(min: &BigInt, max: &BigInt) -> Vec<BigInt> {
    let one = BigInt::from(1);
    vec![
        min - &one,
        min.clone(),
        min + &one,
        BigInt::from(0),
        max - &one,
        max.clone(),
        max + &one,
        BigInt::from(1u8) << 70,
    ]
}

#[test]
fn integer_primitives_accept_exactly_their_range() {
    let mut rt = Runtime::new(EngineConfig::default());
    for p in Primitive::INTEGERS {
        let descriptor = rt.types().primitives.descriptor(p);
        let (min, max) = (descriptor.min.clone(), descriptor.max.clone());
        for v in boundary_values(&min, &max) {
            let value = rt.new_int(v.clone());
            let converted = rt.convert(value, &ParamType::Primitive(p));
            if v >= min && v <= max {
                let converted = converted.unwrap();
                let back = rt.convert(converted, &ParamType::BigInteger).unwrap();
                assert_eq!(rt.as_bigint(back), Some(v), "{p:?}");
            } else {
                let err = converted.unwrap_err();
                assert_eq!(err.exc_type(), Some(ExcType::OverflowError), "{p:?} {v}");
            }
        }
    }
}

#[test]
fn floats_truncate_into_integer_parameters() {
    let mut rt = Runtime::new(EngineConfig::default());
    let int32 = ParamType::Primitive(Primitive::Int32);
    let converted = rt.convert(Value::Float(10.2), &int32).unwrap();
    assert_eq!(converted.as_small_int(), Some(10));
    let converted = rt.convert(Value::Float(-7.9), &int32).unwrap();
    assert_eq!(converted.as_small_int(), Some(-7));

    let err = rt.convert(Value::Float(f64::NAN), &int32).unwrap_err();
    assert_eq!(err.exc_type(), Some(ExcType::ValueError));
    assert_eq!(err.message(), Some("cannot convert float NaN to integer"));
    let err = rt.convert(Value::Float(f64::INFINITY), &int32).unwrap_err();
    assert_eq!(err.exc_type(), Some(ExcType::OverflowError));
    for p in [Primitive::SByte, Primitive::Int16, Primitive::Int32, Primitive::UInt64] {
        let err = rt.convert(Value::Float(f64::MAX), &ParamType::Primitive(p)).unwrap_err();
        assert_eq!(err.exc_type(), Some(ExcType::OverflowError), "{p:?}");
    }

    let single = Value::Prim(PrimValue::Single(2.5));
    let converted = rt.convert(single, &ParamType::Primitive(Primitive::Int64)).unwrap();
    let back = rt.convert(converted, &ParamType::BigInteger).unwrap();
    assert_eq!(rt.as_bigint(back), Some(BigInt::from(2)));
    let decimal = rt.convert(Value::Int(41), &ParamType::Primitive(Primitive::Decimal)).unwrap();
    let converted = rt.convert(decimal, &ParamType::Primitive(Primitive::Int16)).unwrap();
    assert!(rt.equality(converted, Value::Int(41)).unwrap());
}

#[test]
fn chars_do_not_widen_to_integers() {
    let mut rt = Runtime::new(EngineConfig::default());
    let letter = Value::Prim(PrimValue::Char(u16::from(b'A')));
    let err = rt.convert(letter, &ParamType::Primitive(Primitive::Int32)).unwrap_err();
    assert_eq!(err.message(), Some("expected int, got Char"));
    assert!(rt.convert(letter, &ParamType::Primitive(Primitive::UInt16)).is_err());
    let decimal = rt.convert(letter, &ParamType::Primitive(Primitive::Decimal)).unwrap();
    assert!(rt.equality(decimal, Value::Int(65)).unwrap());
}
