/// Tests for overload selection over managed method groups.
use std::{cell::Cell, rc::Rc};

use ironbind::{
    Candidate, EngineConfig, ExcType, OverloadSet, Param, ParamType, RecordingTracer, Runtime, RunResult, Signature,
    SimpleException, TraceEvent, Value,
    types::{ClassBuilder, ClassId, PrimValue, Primitive, Type},
};
use pretty_assertions::assert_eq;

fn echo(_: &mut Runtime, args: Vec<Value>) -> RunResult<Value> {
    Ok(args[0])
}

fn tag(label: &'static str) -> impl Fn(&mut Runtime, Vec<Value>) -> RunResult<Value> {
    move |rt, _| Ok(rt.new_str(label))
}

#[test]
fn derived_argument_binds_to_base_parameter_unchanged() {
    let mut rt = Runtime::new(EngineConfig::default());
    let base = rt.define_class(ClassBuilder::managed("Base"));
    let derived = rt.define_class(ClassBuilder::managed("Derived").base(base));
    let group = rt.define_overloads(
        OverloadSet::new("Take").with(Candidate::new(vec![Param::new("x", ParamType::Class(base))], echo)),
    );
    let obj = rt.new_instance(derived);
    let result = rt.call(group, vec![obj]).unwrap();
    assert!(result.is(&obj));
    assert_eq!(rt.type_of(result), Type::Class(derived));
}

#[test]
fn implicit_operator_on_struct_wrapper() {
    let tracer = RecordingTracer::new();
    let mut rt = Runtime::with_tracer(EngineConfig::default(), tracer.clone());
    let calls = std::rc::Rc::new(std::cell::Cell::new(0));
    let counter = std::rc::Rc::clone(&calls);
    let wrapper = rt.define_class(
        ClassBuilder::value_type("ByteWrapper").implicit_to(ParamType::Primitive(Primitive::Byte), move |_, _| {
            counter.set(counter.get() + 1);
            Ok(Value::Prim(PrimValue::Byte(1)))
        }),
    );
    let group = rt.define_overloads(
        OverloadSet::new("TakeByte")
            .with(Candidate::new(vec![Param::new("b", ParamType::Primitive(Primitive::Byte))], echo)),
    );
    let obj = rt.new_instance(wrapper);
    let result = rt.call(group, vec![obj]).unwrap();
    assert!(rt.equality(result, Value::Int(1)).unwrap());
    assert_eq!(calls.get(), 1);
    assert!(tracer.events().iter().any(|e| matches!(
        e,
        TraceEvent::OverloadSelected { group, from_cache: false, .. } if group == "TakeByte"
    )));
}

#[test]
fn implicit_only_candidates_are_ambiguous() {
    let mut rt = Runtime::new(EngineConfig::default());
    let left = rt.define_class(ClassBuilder::managed("Left"));
    let right = rt.define_class(ClassBuilder::managed("Right"));
    let source = rt.define_class(
        ClassBuilder::managed("Source")
            .implicit_to(ParamType::Class(left), move |rt, _| Ok(rt.new_instance(left)))
            .implicit_to(ParamType::Class(right), move |rt, _| Ok(rt.new_instance(right))),
    );
    let group = rt.define_overloads(
        OverloadSet::new("Pick")
            .with(Candidate::new(vec![Param::new("x", ParamType::Class(left))], tag("left")))
            .with(Candidate::new(vec![Param::new("x", ParamType::Class(right))], tag("right"))),
    );
    let obj = rt.new_instance(source);
    let err = rt.call(group, vec![obj]).unwrap_err();
    assert_eq!(err.exc_type(), Some(ExcType::AmbiguousMatchError));
    assert!(err.matches(ExcType::TypeError));
}

#[test]
fn mismatch_names_expected_and_actual_types() {
    let mut rt = Runtime::new(EngineConfig::default());
    let group = rt.define_overloads(
        OverloadSet::new("TakeInt")
            .with(Candidate::new(vec![Param::new("x", ParamType::Primitive(Primitive::Int32))], echo)),
    );
    let text = rt.new_str("nope");
    let err = rt.call(group, vec![text]).unwrap_err();
    assert_eq!(err.message(), Some("expected int, got str"));

    let err = rt.call(group, vec![Value::Int(1 << 40)]).unwrap_err();
    assert_eq!(err.exc_type(), Some(ExcType::OverflowError));
}

#[test]
fn none_never_reaches_value_types() {
    let mut rt = Runtime::new(EngineConfig::default());
    let group = rt.define_overloads(
        OverloadSet::new("M")
            .with(Candidate::new(vec![Param::new("x", ParamType::Primitive(Primitive::Int32))], tag("int")))
            .with(Candidate::new(
                vec![Param::new("x", ParamType::nullable(ParamType::Primitive(Primitive::Int32)))],
                tag("nullable"),
            )),
    );
    let result = rt.call(group, vec![Value::None]).unwrap();
    assert_eq!(rt.as_str(result), Some("nullable"));
    let result = rt.call(group, vec![Value::Int(3)]).unwrap();
    assert_eq!(rt.as_str(result), Some("int"));
}

#[test]
fn byte_sequences_copy_into_byte_arrays_but_iterators_do_not() {
    let mut rt = Runtime::new(EngineConfig::default());
    let group = rt.define_overloads(
        OverloadSet::new("Write").with(Candidate::new(vec![Param::new("data", ParamType::byte_array())], echo)),
    );
    let b = rt.new_bytes(b"xy".to_vec());
    let array = rt.call(group, vec![b]).unwrap();
    assert!(!array.is(&b));
    assert_eq!(rt.buffer_data(array).unwrap(), Some(b"xy".to_vec()));

    let iterator = rt.iter(b).unwrap();
    let err = rt.call(group, vec![iterator]).unwrap_err();
    assert_eq!(err.exc_type(), Some(ExcType::TypeError));
}

#[test]
fn value_types_box_only_when_nothing_closer_fits() {
    let mut rt = Runtime::new(EngineConfig::default());
    let group = rt.define_overloads(
        OverloadSet::new("M")
            .with(Candidate::new(vec![Param::new("x", ParamType::Object)], tag("object")))
            .with(Candidate::new(vec![Param::new("x", ParamType::Primitive(Primitive::Double))], tag("double"))),
    );
    let result = rt.call(group, vec![Value::Float(1.5)]).unwrap();
    assert_eq!(rt.as_str(result), Some("double"));
    let text = rt.new_str("s");
    let result = rt.call(group, vec![text]).unwrap();
    assert_eq!(rt.as_str(result), Some("object"));
}

fn int32_pair(rt: &mut Runtime) -> Value {
    let int32 = ParamType::Primitive(Primitive::Int32);
    rt.define_overloads(OverloadSet::new("Pair").with(Candidate::new(
        vec![Param::new("a", int32.clone()), Param::new("b", int32)],
        |rt, args| Ok(rt.new_tuple(args)),
    )))
}

/// A Python class whose `__index__` bumps `counter` and returns the new count.
fn counting_index(rt: &mut Runtime, counter: &Rc<Cell<i64>>) -> ClassId {
    let counter = Rc::clone(counter);
    let index = rt
        .new_function("__index__", Signature::plain(["self"], []), vec![], move |_, _| {
            counter.set(counter.get() + 1);
            Ok(Value::Int(counter.get()))
        })
        .unwrap();
    rt.define_class(ClassBuilder::python("Counting").method("__index__", index))
}

#[test]
fn argument_hooks_run_left_to_right() {
    let mut rt = Runtime::new(EngineConfig::default());
    let counter = Rc::new(Cell::new(0));
    let class = counting_index(&mut rt, &counter);
    let (a, b) = (rt.new_instance(class), rt.new_instance(class));
    let group = int32_pair(&mut rt);

    let result = rt.call(group, vec![a, b]).unwrap();
    let seen: Vec<Option<i64>> = rt.sequence_items(result).unwrap().iter().map(Value::as_small_int).collect();
    assert_eq!(seen, vec![Some(1), Some(2)]);
    let result = rt.call(group, vec![b, a]).unwrap();
    let seen: Vec<Option<i64>> = rt.sequence_items(result).unwrap().iter().map(Value::as_small_int).collect();
    assert_eq!(seen, vec![Some(3), Some(4)]);
}

#[test]
fn errors_raised_by_conversions_propagate_unchanged() {
    let mut rt = Runtime::new(EngineConfig::default());
    let raising = rt
        .new_function("__index__", Signature::plain(["self"], []), vec![], |_, _| {
            Err(SimpleException::new_msg(ExcType::ValueError, "index refused").into())
        })
        .unwrap();
    let refusing = rt.define_class(ClassBuilder::python("Refusing").method("__index__", raising));
    let counter = Rc::new(Cell::new(0));
    let counting = counting_index(&mut rt, &counter);
    let group = int32_pair(&mut rt);

    let (bad, good) = (rt.new_instance(refusing), rt.new_instance(counting));
    let err = rt.call(group, vec![bad, good]).unwrap_err();
    assert_eq!(err.exc_type(), Some(ExcType::ValueError));
    assert_eq!(err.message(), Some("index refused"));
    assert_eq!(counter.get(), 0);

    let source = rt.define_class(ClassBuilder::managed("Source").implicit_to(
        ParamType::Primitive(Primitive::Int32),
        |_, _| Err(SimpleException::new_msg(ExcType::KeyError, "no conversion today").into()),
    ));
    let obj = rt.new_instance(source);
    let err = rt.call(group, vec![Value::Int(1), obj]).unwrap_err();
    assert_eq!(err.exc_type(), Some(ExcType::KeyError));
    assert!(!err.matches(ExcType::TypeError));
    let err = rt.convert(obj, &ParamType::Primitive(Primitive::Int32)).unwrap_err();
    assert_eq!(err.message(), Some("no conversion today"));
}
