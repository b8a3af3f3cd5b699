//! End-to-end integration tests for the polar host layer.
//!
//! These tests drive a host session through the same calls the engine
//! makes: wire terms in, callbacks dispatched, wire terms out.

use std::collections::{BTreeMap, HashMap};

use polar_host::class::Class;
use polar_host::config::HostConfig;
use polar_host::error::{ClassError, HostError, InstanceError, OperatorError, TermError};
use polar_host::events::{CallbackAnswer, HostEvent};
use polar_host::host::Host;
use polar_host::terms::{Numeric, Operator, Term, Value};
use polar_host::value::{HostObject, HostValue, Predicate};

#[derive(Debug, Default)]
struct Counter;

#[derive(Debug, Default)]
struct Object;

#[derive(Debug, Default)]
struct Animal;

#[derive(Debug, Default)]
struct Dog;

#[derive(Debug)]
struct Point {
    x: i32,
    y: i32,
}

fn zoo() -> Host {
    let host = Host::default();
    host.register_class(Class::builder::<Object>("Object").default_constructor().build())
        .unwrap();
    host.register_class(Class::builder::<Animal>("Animal").default_constructor().build())
        .unwrap();
    host.register_class(Class::builder::<Dog>("Dog").default_constructor().build())
        .unwrap();
    host.register_mro("Animal", vec!["Object".into()]).unwrap();
    host.register_mro("Dog", vec!["Animal".into(), "Object".into()])
        .unwrap();
    host
}

fn int(i: i32) -> Term {
    Term::new(Value::Number(Numeric::Integer(i)))
}

fn list(items: Vec<Term>) -> Term {
    Term::new(Value::List(items))
}

#[test]
fn integer_encodes_to_exact_wire_text() {
    let host = Host::default();
    let term = host.to_polar(&HostValue::Integer(5)).unwrap();
    assert_eq!(
        term.to_string(),
        r#"{"id":0,"offset":0,"value":{"Number":{"Integer":5}}}"#
    );
    assert_eq!(host.to_host(&term).unwrap(), HostValue::Integer(5));
}

#[test]
fn non_finite_floats_use_sentinels() {
    let host = Host::default();
    for (value, sentinel) in [
        (f64::INFINITY, "Infinity"),
        (f64::NEG_INFINITY, "-Infinity"),
        (f64::NAN, "NaN"),
    ] {
        let term = host.to_polar(&HostValue::Float(value)).unwrap();
        assert_eq!(term.to_json()["value"]["Number"]["Float"], sentinel);
    }

    let back = host
        .to_host(&Term::parse(r#"{"value":{"Number":{"Float":"-Infinity"}}}"#).unwrap())
        .unwrap();
    assert_eq!(back, HostValue::Float(f64::NEG_INFINITY));
    let nan = host
        .to_host(&Term::parse(r#"{"value":{"Number":{"Float":"NaN"}}}"#).unwrap())
        .unwrap();
    assert!(nan.as_f64().unwrap().is_nan());
}

#[test]
fn dictionary_decodes_to_map() {
    let host = Host::default();
    let term =
        Term::parse(r#"{"value":{"Dictionary":{"fields":{"x":{"value":{"Boolean":true}}}}}}"#)
            .unwrap();
    let mut expected = BTreeMap::new();
    expected.insert("x".to_string(), HostValue::Boolean(true));
    assert_eq!(host.to_host(&term).unwrap(), HostValue::Dictionary(expected));
}

#[test]
fn make_instance_then_lookup() {
    let host = Host::default();
    host.register_class(Class::builder::<Counter>("Counter").default_constructor().build())
        .unwrap();
    let made = host.make_instance("Counter", &list(vec![]), 42).unwrap();
    assert!(host.has_instance(42));
    let fetched = host.get_instance(42).unwrap();
    assert!(fetched.is::<Counter>());
    assert!(fetched.ptr_eq(&made));
}

#[test]
fn ancestry_chain() {
    let host = zoo();
    assert!(host.is_subclass("Dog", "Animal").unwrap());
    assert!(host.is_subclass("Dog", "Object").unwrap());
    assert!(!host.is_subclass("Animal", "Dog").unwrap());
    assert!(host.is_subclass("Animal", "Animal").unwrap());
}

#[test]
fn expression_requires_acceptance() {
    let text = r#"{"id":3,"offset":9,"value":{"Expression":{"operator":"And","args":[{"id":0,"offset":0,"value":{"Variable":"x"}}]}}}"#;
    let term = Term::parse(text).unwrap();

    let strict = Host::default();
    assert!(matches!(
        strict.to_host(&term),
        Err(HostError::Term(TermError::ExpressionNotAllowed))
    ));

    let lenient = Host::new(HostConfig {
        accept_expression: true,
        ..Default::default()
    });
    let value = lenient.to_host(&term).unwrap();
    let HostValue::Expression(expr) = &value else {
        panic!("expected expression, got {value:?}");
    };
    assert_eq!(expr.operator, Operator::And);
    assert_eq!(lenient.to_polar(&value).unwrap().value, term.value);
}

#[test]
fn round_trip_primitives_and_containers() {
    let host = Host::default();
    let mut fields = BTreeMap::new();
    fields.insert("name".to_string(), HostValue::from("rex"));
    fields.insert("age".to_string(), HostValue::from(3));
    let values = vec![
        HostValue::from(true),
        HostValue::from(-7),
        HostValue::from(2.5),
        HostValue::from("hello"),
        HostValue::from(vec![1, 2, 3]),
        HostValue::List(vec![HostValue::from("a"), HostValue::from(false)]),
        HostValue::Dictionary(fields),
        HostValue::Variable("x".into()),
        HostValue::Predicate(Predicate::new("f", vec![HostValue::from(1)])),
    ];
    for value in values {
        let term = host.to_polar(&value).unwrap();
        assert_eq!(host.to_host(&term).unwrap(), value);
    }
}

#[test]
fn re_encoding_preserves_wire_value() {
    let host = Host::default();
    let texts = [
        r#"{"value":{"String":"s"}}"#,
        r#"{"value":{"List":[{"value":{"Number":{"Float":1.5}}},{"value":{"Boolean":false}}]}}"#,
        r#"{"value":{"Call":{"name":"g","args":[{"value":{"Variable":"y"}}]}}}"#,
        r#"{"value":{"Pattern":{"Instance":{"tag":"User","fields":{"fields":{"id":{"value":{"Number":{"Integer":1}}}}}}}}}"#,
        r#"{"value":{"Pattern":{"Dictionary":{"fields":{}}}}}"#,
    ];
    for text in texts {
        let term = Term::parse(text).unwrap();
        let again = host.to_polar(&host.to_host(&term).unwrap()).unwrap();
        assert_eq!(again.value, term.value, "{text}");
    }
}

#[test]
fn unknown_tag_and_wrong_kind() {
    let err = Term::parse(r#"{"value":{"Set":[]}}"#).unwrap_err();
    assert!(matches!(err, TermError::UnrecognizedTag { ref tag, .. } if tag == "Set"));

    let err = Term::parse(r#"{"value":{"Boolean":"yes"}}"#).unwrap_err();
    assert!(matches!(err, TermError::Decode { .. }));
}

#[test]
fn oversized_integer_is_rejected() {
    let err = Term::parse(r#"{"value":{"Number":{"Integer":4294967296}}}"#).unwrap_err();
    assert!(err.to_string().contains("32-bit integer"));
}

#[test]
fn objects_are_cached_by_identity() {
    let host = Host::default();
    let point = HostObject::new(Point { x: 1, y: 2 });
    let first = host.to_polar(&HostValue::Object(point.clone())).unwrap();
    let second = host.to_polar(&HostValue::Object(point.clone())).unwrap();
    assert_eq!(first.value, second.value);

    let Value::ExternalInstance(ext) = &first.value else {
        panic!("expected instance");
    };
    assert!(host.has_instance(ext.instance_id));
    assert_eq!(ext.class_repr, None);

    let resolved = host.to_host_resolved(&first).unwrap();
    let object = resolved.as_object().unwrap();
    let p = object.downcast_ref::<Point>().unwrap();
    assert_eq!((p.x, p.y), (1, 2));
}

#[test]
fn unregistered_instance_is_a_hard_error() {
    let host = zoo();
    let term = Term::parse(
        r#"{"value":{"ExternalInstance":{"instance_id":999,"repr":null,"class_repr":null}}}"#,
    )
    .unwrap();
    assert!(matches!(
        host.isa(&term, "Dog"),
        Err(HostError::Instance(InstanceError::Unregistered { instance_id: 999 }))
    ));
}

#[test]
fn isa_and_subspecializer_follow_ancestry() {
    let host = zoo();
    host.make_instance("Dog", &list(vec![]), 10).unwrap();
    let dog = host
        .to_polar(&HostValue::Object(host.get_instance(10).unwrap()))
        .unwrap();

    assert!(host.isa(&dog, "Dog").unwrap());
    assert!(host.isa(&dog, "Animal").unwrap());
    assert!(matches!(
        host.isa(&dog, "Counter"),
        Err(HostError::Class(ClassError::UnknownClass { .. }))
    ));

    assert!(host.subspecializer(10, "Dog", "Animal").unwrap());
    assert!(!host.subspecializer(10, "Object", "Animal").unwrap());
}

#[test]
fn unknown_class_fails_construction() {
    let host = Host::default();
    assert!(matches!(
        host.make_instance("Ghost", &list(vec![]), 1),
        Err(HostError::Class(ClassError::UnknownClass { .. }))
    ));
}

#[test]
fn duplicate_id_is_rejected() {
    let host = zoo();
    host.make_instance("Dog", &list(vec![]), 5).unwrap();
    assert!(matches!(
        host.make_instance("Dog", &list(vec![]), 5),
        Err(HostError::Instance(InstanceError::Duplicate { .. }))
    ));
}

#[test]
fn constructor_receives_decoded_args() {
    let host = Host::default();
    host.register_class(
        Class::builder::<Point>("Point")
            .constructor(2, |args| {
                let x = args[0].as_i32().ok_or("x must be an integer")?;
                let y = args[1].as_i32().ok_or("y must be an integer")?;
                Ok(Point { x, y })
            })
            .build(),
    )
    .unwrap();
    let made = host
        .make_instance("Point", &list(vec![int(3), int(4)]), 1)
        .unwrap();
    let p = made.downcast_ref::<Point>().unwrap();
    assert_eq!((p.x, p.y), (3, 4));

    let bad = list(vec![Term::new(Value::String("a".into())), int(4)]);
    assert!(matches!(
        host.make_instance("Point", &bad, 2),
        Err(HostError::Class(ClassError::Constructor { .. }))
    ));
}

#[test]
fn eq_operator_semantics() {
    let host = Host::default();
    let nil = host.to_polar(&HostValue::Null).unwrap();

    assert!(host.operator("Eq", &list(vec![int(1), int(1)])).unwrap());
    assert!(!host.operator("Eq", &list(vec![int(1), int(2)])).unwrap());
    assert!(host.operator("Eq", &list(vec![nil.clone(), nil.clone()])).unwrap());
    assert!(!host.operator("Eq", &list(vec![nil, int(0)])).unwrap());

    assert!(matches!(
        host.operator("Lt", &list(vec![int(1), int(2)])),
        Err(HostError::Operator(OperatorError::Unimplemented { ref operator })) if operator == "Lt"
    ));
}

#[test]
fn non_string_keys_fail_encode() {
    let host = Host::default();
    let mut map = HashMap::new();
    map.insert(1, "one");
    let value = HostValue::from(map);
    assert!(matches!(
        host.to_polar(&value),
        Err(HostError::Term(TermError::NonStringKey { .. }))
    ));
}

#[test]
fn event_stream_round() {
    let host = zoo();
    let make = HostEvent::parse(
        r#"{"MakeExternal":{"instance_id":77,"constructor":{"value":{"Call":{"name":"Dog","args":[]}}}}}"#,
    )
    .unwrap();
    assert_eq!(host.handle_event(&make).unwrap(), None);

    let isa = HostEvent::parse(
        r#"{"ExternalIsa":{"call_id":4,"instance":{"value":{"ExternalInstance":{"instance_id":77,"repr":null,"class_repr":"Dog"}}},"class_tag":"Animal"}}"#,
    )
    .unwrap();
    assert_eq!(
        host.handle_event(&isa).unwrap(),
        Some(CallbackAnswer {
            call_id: 4,
            result: true
        })
    );

    let narrower = HostEvent::parse(
        r#"{"ExternalIsSubSpecializer":{"call_id":5,"instance_id":77,"left_class_tag":"Animal","right_class_tag":"Dog"}}"#,
    )
    .unwrap();
    assert_eq!(
        host.handle_event(&narrower).unwrap(),
        Some(CallbackAnswer {
            call_id: 5,
            result: false
        })
    );
}

#[test]
fn optional_elements_encode_as_nil() {
    let host = Host::default();
    let value = HostValue::from(vec![Some(1), None]);
    let term = host.to_polar(&value).unwrap();
    assert_eq!(
        host.to_host_resolved(&term).unwrap(),
        HostValue::List(vec![HostValue::Integer(1), HostValue::Null])
    );
}

#[test]
fn end_session_forgets_instances() {
    let host = zoo();
    host.make_instance("Dog", &list(vec![]), 3).unwrap();
    host.end_session();
    assert!(!host.has_instance(3));
    // nil still encodes after the reset
    assert!(host.to_polar(&HostValue::Null).is_ok());
}
