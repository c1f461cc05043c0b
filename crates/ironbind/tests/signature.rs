/// Tests for binding Python calls through function signatures.
use ironbind::{
    ArgValues, BindPath, EngineConfig, ExcType, RecordingTracer, Runtime, Signature, TraceEvent, Value,
};
use pretty_assertions::assert_eq;

/// `def f(p0..pP, kw1=1..kwK=K): return (positional, keywords)`.
fn shape_function(rt: &mut Runtime, positional: usize, keyword: usize) -> Value {
    let pos_names: Vec<String> = (0..positional).map(|i| format!("p{i}")).collect();
    let kw_names: Vec<String> = (1..=keyword).map(|i| format!("kw{i}")).collect();
    let defaults: Vec<Value> = (1..=keyword).map(|i| Value::Int(i64::try_from(i).unwrap())).collect();
    rt.new_function("f", Signature::plain(pos_names, kw_names), defaults, move |rt, slots| {
        let (pos, kw) = slots.split_at(positional);
        let pos = rt.new_tuple(pos.to_vec());
        let kw = rt.new_tuple(kw.to_vec());
        Ok(rt.new_tuple(vec![pos, kw]))
    })
    .unwrap()
}

fn kwargs(names: impl IntoIterator<Item = String>, value: Value) -> Vec<(String, Value)> {
    names.into_iter().map(|name| (name, value)).collect()
}

#[test]
fn three_positional_fourteen_defaults() {
    let mut rt = Runtime::new(EngineConfig::default());
    let f = shape_function(&mut rt, 3, 14);
    let args = ArgValues::new(
        vec![Value::Int(1), Value::Int(2), Value::Int(3)],
        kwargs((1..=3).map(|i| format!("kw{i}")), Value::None),
    );
    let result = rt.call(f, args).unwrap();
    assert_eq!(
        rt.repr(result).unwrap(),
        "((1, 2, 3), (None, None, None, 4, 5, 6, 7, 8, 9, 10, 11, 12, 13, 14))"
    );
}

#[test]
fn every_shape_overrides_a_prefix_of_defaults() {
    let tracer = RecordingTracer::new();
    let mut rt = Runtime::with_tracer(EngineConfig::default(), tracer.clone());
    let sentinel = rt.new_str("sentinel");
    for positional in 0..=14 {
        for keyword in 0..=14 {
            let f = shape_function(&mut rt, positional, keyword);
            for overridden in 0..=keyword {
                let args: Vec<Value> = (0..positional).map(|i| Value::Int(i64::try_from(i).unwrap())).collect();
                let kw = kwargs((1..=overridden).map(|i| format!("kw{i}")), sentinel);
                let result = rt.call(f, ArgValues::new(args, kw)).unwrap();
                let parts = rt.sequence_items(result).unwrap().to_vec();
                let keywords = rt.sequence_items(parts[1]).unwrap().to_vec();
                assert_eq!(keywords.len(), keyword);
                for (i, value) in keywords.iter().enumerate() {
                    if i < overridden {
                        assert!(value.is(&sentinel));
                    } else {
                        assert_eq!(value.as_small_int(), Some(i64::try_from(i + 1).unwrap()));
                    }
                }
            }
            assert!(tracer.events().iter().any(|e| *e
                == TraceEvent::Bind {
                    function: "f".to_owned(),
                    path: BindPath::Specialized { positional, keyword },
                }));
            tracer.clear();
        }
    }
}

#[test]
fn binding_errors() {
    let mut rt = Runtime::new(EngineConfig::default());
    let f = shape_function(&mut rt, 2, 1);
    let err = rt
        .call(f, ArgValues::new(vec![Value::Int(1)], vec![("p0".to_owned(), Value::Int(2))]))
        .unwrap_err();
    assert_eq!(err.message(), Some("f() got multiple values for argument 'p0'"));

    let err = rt
        .call(
            f,
            ArgValues::new(vec![Value::Int(1), Value::Int(2)], vec![("nope".to_owned(), Value::None)]),
        )
        .unwrap_err();
    assert_eq!(err.exc_type(), Some(ExcType::TypeError));

    let err = rt.call(f, vec![Value::Int(1)]).unwrap_err();
    assert_eq!(err.message(), Some("f() missing 1 required positional argument: 'p1'"));
}

#[test]
fn wider_functions_use_the_general_path() {
    let tracer = RecordingTracer::new();
    let config = EngineConfig::from_json(r#"{"max_positional": 2, "max_keyword": 20}"#).unwrap();
    assert_eq!(config.max_positional, 14);
    assert_eq!(config.max_keyword, 20);
    let mut rt = Runtime::with_tracer(config, tracer.clone());
    let f = shape_function(&mut rt, 15, 2);
    let args: Vec<Value> = (0..15).map(Value::Int).collect();
    let result = rt.call(f, args).unwrap();
    let parts = rt.sequence_items(result).unwrap().to_vec();
    assert_eq!(rt.repr(parts[1]).unwrap(), "(1, 2)");
    assert_eq!(
        tracer.events(),
        vec![TraceEvent::Bind {
            function: "f".to_owned(),
            path: BindPath::General,
        }]
    );
}
