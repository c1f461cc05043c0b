/// Tests for binary operator resolution, comparison and equality.
use ironbind::{
    BinaryOp, BytesWarningPolicy, Candidate, CompareOp, Comparison, EngineConfig, ExcType, OverloadSet, Param,
    ParamType, RecordingTracer, Runtime, Signature, TraceEvent, Value,
    types::{ClassBuilder, ClassId, Primitive},
};
use num_bigint::BigInt;
use pretty_assertions::assert_eq;

/// `def name(self, other): return result`.
fn returning(rt: &mut Runtime, name: &str, result: Value) -> Value {
    rt.new_function(name, Signature::plain(["self", "other"], []), vec![], move |_, _| Ok(result))
        .unwrap()
}

fn int(rt: &mut Runtime, v: Value) -> i64 {
    rt.as_bigint(v)
        .and_then(|b| i64::try_from(b).ok())
        .expect("an integer result")
}

#[test]
fn reflected_method_runs_when_left_declines() {
    let tracer = RecordingTracer::new();
    let mut rt = Runtime::with_tracer(EngineConfig::default(), tracer.clone());
    let add = returning(&mut rt, "__add__", Value::NotImplemented);
    let left = rt.define_class(ClassBuilder::python("Left").method("__add__", add));
    let marker = rt.new_str("radd");
    let radd = returning(&mut rt, "__radd__", marker);
    let right = rt.define_class(ClassBuilder::python("Right").method("__radd__", radd));
    let (a, b) = (rt.new_instance(left), rt.new_instance(right));

    let result = rt.binary_op(BinaryOp::Add, a, b).unwrap();
    assert!(result.is(&marker));
    assert!(tracer.events().contains(&TraceEvent::Operator {
        op: "+",
        type_name: "Right".to_owned(),
        reflected: true,
    }));

    let err = rt.binary_op(BinaryOp::Add, b, a).unwrap_err();
    assert_eq!(err.message(), Some("unsupported operand type(s) for +: 'Right' and 'Left'"));
    let err = rt.binary_op(BinaryOp::Sub, Value::Int(1), a).unwrap_err();
    assert_eq!(err.message(), Some("unsupported operand type(s) for -: 'int' and 'Left'"));
}

fn money_class(rt: &mut Runtime) -> ClassId {
    let money = rt.define_class(ClassBuilder::managed("Money"));
    let group = rt.define_overloads(OverloadSet::new("op_Addition").with(Candidate::new(
        vec![
            Param::new("left", ParamType::Class(money)),
            Param::new("right", ParamType::Primitive(Primitive::Int32)),
        ],
        |rt, args| {
            let cents = rt.getattr(args[0], "cents")?;
            rt.binary_op(BinaryOp::Add, cents, args[1])
        },
    )));
    rt.add_method(money, "op_Addition", group);
    money
}

#[test]
fn managed_operator_overloads_take_both_operands() {
    let mut rt = Runtime::new(EngineConfig::default());
    let money = money_class(&mut rt);
    let m = rt.new_instance(money);
    rt.setattr(m, "cents", Value::Int(250)).unwrap();
    let sum = rt.binary_op(BinaryOp::Add, m, Value::Int(5)).unwrap();
    assert_eq!(int(&mut rt, sum), 255);

    let err = rt.binary_op(BinaryOp::Add, Value::Int(5), m).unwrap_err();
    assert_eq!(err.exc_type(), Some(ExcType::TypeError));
}

#[test]
fn integer_and_float_arithmetic() {
    let mut rt = Runtime::new(EngineConfig::default());
    let cases = [
        (BinaryOp::FloorDiv, -7, 2, -4),
        (BinaryOp::Mod, -7, 2, 1),
        (BinaryOp::Mod, 7, -2, -1),
        (BinaryOp::RShift, -9, 1, -5),
        (BinaryOp::Xor, 6, 3, 5),
    ];
    for (op, a, b, expected) in cases {
        let result = rt.binary_op(op, Value::Int(a), Value::Int(b)).unwrap();
        assert_eq!(int(&mut rt, result), expected, "{} {a} {b}", op.symbol());
    }

    let big = rt.binary_op(BinaryOp::Pow, Value::Int(2), Value::Int(100)).unwrap();
    assert_eq!(rt.as_bigint(big), Some(BigInt::from(1u8) << 100));
    let big = rt.binary_op(BinaryOp::Mul, Value::Int(i64::MAX), Value::Int(2)).unwrap();
    assert_eq!(rt.as_bigint(big), Some(BigInt::from(i64::MAX) * 2));

    let half = rt.binary_op(BinaryOp::TrueDiv, Value::Int(1), Value::Int(2)).unwrap();
    assert!(matches!(half, Value::Float(f) if f == 0.5));
    let err = rt.binary_op(BinaryOp::TrueDiv, Value::Float(1.0), Value::Int(0)).unwrap_err();
    assert_eq!(err.exc_type(), Some(ExcType::ZeroDivisionError));
    let err = rt.binary_op(BinaryOp::Mod, Value::Int(1), Value::Int(0)).unwrap_err();
    assert_eq!(err.exc_type(), Some(ExcType::ZeroDivisionError));

    let inf = rt.binary_op(BinaryOp::Mul, Value::Float(1e308), Value::Int(10)).unwrap();
    assert!(matches!(inf, Value::Float(f) if f.is_infinite()));
}

#[test]
fn none_and_nan_comparisons() {
    let mut rt = Runtime::new(EngineConfig::default());
    assert!(!rt.equality(Value::Int(0), Value::None).unwrap());
    assert!(rt.equality(Value::None, Value::None).unwrap());
    assert!(rt.compare_op(CompareOp::Ne, Value::None, Value::Int(1)).unwrap());
    let err = rt.compare_op(CompareOp::Lt, Value::Int(1), Value::None).unwrap_err();
    assert_eq!(
        err.message(),
        Some("'<' not supported between instances of 'int' and 'NoneType'")
    );
    assert!(rt.compare(Value::None, Value::Int(1)).is_err());

    let nan = Value::Float(f64::NAN);
    assert!(!rt.equality(nan, nan).unwrap());
    assert_eq!(rt.compare(nan, Value::Float(1.0)).unwrap(), Comparison::Unordered);
    assert_eq!(rt.compare(Value::Int(2), Value::Float(1.5)).unwrap(), Comparison::Greater);
    assert!(rt.equality(Value::Int(1), Value::Float(1.0)).unwrap());
}

#[test]
fn byte_sequence_concatenation_and_ordering() {
    let mut rt = Runtime::new(EngineConfig::default());
    let x = rt.new_bytes(b"ab".to_vec());
    let y = rt.new_bytearray(b"cde".to_vec());
    let joined = rt.binary_op(BinaryOp::Add, x, y).unwrap();
    assert_eq!(rt.byte_data(joined), Some(&b"abcde"[..]));
    let joined = rt.binary_op(BinaryOp::Add, y, x).unwrap();
    assert_eq!(rt.repr(joined).unwrap(), "bytearray(b'cdeab')");

    let err = rt.binary_op(BinaryOp::Add, x, Value::Int(1)).unwrap_err();
    assert_eq!(err.message(), Some("can't concat int to bytes"));

    assert!(rt.compare_op(CompareOp::Lt, x, y).unwrap());
    assert!(rt.equality(x, joined).is_ok_and(|eq| !eq));
    let ab = rt.new_bytearray(b"ab".to_vec());
    assert!(rt.equality(x, ab).unwrap());
}

#[test]
fn mixed_bytes_equality_warns() {
    let config = EngineConfig::default().with_bytes_warning(BytesWarningPolicy::Default);
    let mut rt = Runtime::new(config);
    let b = rt.new_bytes(b"a".to_vec());
    let s = rt.new_str("a");
    assert!(!rt.equality(b, s).unwrap());
    assert!(!rt.equality(Value::Int(97), b).unwrap());
    let messages: Vec<String> = rt.take_warnings().into_iter().map(|w| w.message).collect();
    assert_eq!(
        messages,
        vec![
            "Comparison between bytes and string".to_owned(),
            "Comparison between bytes and int".to_owned(),
        ]
    );

    let mut rt = Runtime::new(EngineConfig::default().with_bytes_warning(BytesWarningPolicy::Error));
    let b = rt.new_bytes(b"a".to_vec());
    let s = rt.new_str("a");
    let err = rt.equality(b, s).unwrap_err();
    assert_eq!(err.exc_type(), Some(ExcType::BytesWarning));
}
