//! Integration tests for Value
//!
//! Tests construction, projection, equality, and display.

use std::collections::HashSet;

use syncline_foundation::{ErrorKind, Fields, Name, Type, Value};

// =============================================================================
// Construction
// =============================================================================

#[test]
fn conversions_pick_the_right_variant() {
    assert_eq!(Value::from(true), Value::Bool(true));
    assert_eq!(Value::from(3_i32), Value::Int(3));
    assert_eq!(Value::from("x").as_str(), Some("x"));
    assert_eq!(Value::from(None::<i64>), Value::Nil);
    assert_eq!(Value::from(Some(2_i64)), Value::Int(2));
}

#[test]
fn list_and_record_builders() {
    let list = Value::list([1_i64, 2, 3]);
    assert_eq!(list.as_list().map(|l| l.len()), Some(3));
    assert_eq!(list.value_type(), Type::List);

    let record = Value::record([("id", Value::from("u1")), ("age", Value::Int(30))]);
    assert_eq!(record.value_type(), Type::Record);
    assert_eq!(record.as_record().map(Fields::len), Some(2));
}

// =============================================================================
// Projection
// =============================================================================

#[test]
fn field_projects_records() {
    let user = Value::record([("name", "ada")]);
    assert_eq!(user.field("name").unwrap().as_str(), Some("ada"));
}

#[test]
fn field_on_missing_name_is_not_found() {
    let user = Value::record([("name", "ada")]);
    let err = user.field("email").unwrap_err();
    assert!(matches!(err.kind, ErrorKind::FieldNotFound(ref f) if f == "email"));
}

#[test]
fn field_on_non_record_is_type_mismatch() {
    let err = Value::Int(1).field("x").unwrap_err();
    assert!(matches!(
        err.kind,
        ErrorKind::TypeMismatch {
            expected: Type::Record,
            actual: Type::Int
        }
    ));
}

// =============================================================================
// Equality and Hashing
// =============================================================================

#[test]
fn records_compare_structurally() {
    let a = Value::record([("x", 1_i64), ("y", 2_i64)]);
    let b = Value::record([("y", 2_i64), ("x", 1_i64)]);
    assert_eq!(a, b);
}

#[test]
fn int_and_float_are_distinct_values() {
    assert_ne!(Value::Int(1), Value::Float(1.0));
}

#[test]
fn values_are_usable_as_set_keys() {
    let set: HashSet<Value> = [
        Value::Float(f64::NAN),
        Value::Float(f64::NAN),
        Value::from("a"),
        Value::from("a"),
    ]
    .into_iter()
    .collect();
    assert_eq!(set.len(), 2);
}

#[test]
fn truthiness() {
    assert!(!Value::Nil.is_truthy());
    assert!(!Value::Bool(false).is_truthy());
    assert!(Value::Int(0).is_truthy());
    assert!(Value::from("").is_truthy());
}

// =============================================================================
// Display
// =============================================================================

#[test]
fn display_renders_nested_values() {
    let fields: Fields = [(Name::from("ids"), Value::list([1_i64, 2]))]
        .into_iter()
        .collect();
    assert_eq!(Value::Record(fields).to_string(), "{ids: [1 2]}");
    assert_eq!(Value::Nil.to_string(), "nil");
}
