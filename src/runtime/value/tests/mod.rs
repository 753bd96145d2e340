//! Value 单元测试

use crate::runtime::value::{Action, Value};
use indexmap::IndexMap;

#[test]
fn test_action_end_is_recognised() {
    assert!(Action::end().is_end());
    assert!(!Action::new("INCREMENT").is_end());
}

#[test]
fn test_action_display() {
    assert_eq!(Action::new("PING").to_string(), "{PING}");
    assert_eq!(
        Action::with_payload("ADD", Value::Int(2)).to_string(),
        "{ADD: 2}"
    );
}

#[test]
fn test_value_accessors() {
    assert_eq!(Value::Int(7).as_int(), Some(7));
    assert_eq!(Value::Bool(true).as_bool(), Some(true));
    assert_eq!(Value::from("x").as_str(), Some("x"));
    assert!(Value::Unit.is_unit());
    assert_eq!(Value::Int(7).as_str(), None);
}

#[test]
fn test_value_display_nested() {
    let mut map = IndexMap::new();
    map.insert("a".to_string(), Value::List(vec![Value::Int(1), Value::Unit]));
    assert_eq!(Value::Map(map).to_string(), "{a: [1, unit]}");
}

#[test]
fn test_value_structural_eq() {
    assert_eq!(
        Value::List(vec![Value::from("a"), Value::Int(1)]),
        Value::List(vec![Value::from("a"), Value::Int(1)])
    );
    assert_ne!(Value::Int(1), Value::Float(1.0));
    assert_eq!(Value::Int(1).type_name(), "int");
}
