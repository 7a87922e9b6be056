//! Integration tests for the unifier
//!
//! Tests literal, variable, wildcard, and nested record terms.

use syncline_engine::{ActionPattern, FieldPattern, Frame, unify, var, wildcard};
use syncline_foundation::{Fields, Name, Value};
use syncline_log::{ActionKey, ActionLog, FlowId, Outcome, RecordDraft};

fn fields(pairs: &[(&str, Value)]) -> Fields {
    pairs
        .iter()
        .map(|(k, v)| (Name::from(*k), v.clone()))
        .collect()
}

fn empty() -> Frame {
    Frame::new(FlowId::new(1))
}

// =============================================================================
// Terms
// =============================================================================

#[test]
fn literal_must_match_structurally() {
    let record = fields(&[("tags", Value::list(["a", "b"]))]);
    let same = FieldPattern::new().field("tags", Value::list(["a", "b"]));
    let other = FieldPattern::new().field("tags", Value::list(["b", "a"]));

    assert!(unify(&same, &record, &empty()).is_some());
    assert!(unify(&other, &record, &empty()).is_none());
}

#[test]
fn fresh_variable_binds_into_a_copy() {
    let record = fields(&[("id", Value::Int(3))]);
    let pattern = FieldPattern::new().field("id", var("x"));
    let frame = empty();

    let extended = unify(&pattern, &record, &frame).unwrap();
    assert_eq!(extended.get("x"), Some(&Value::Int(3)));
    assert!(frame.is_empty());
}

#[test]
fn bound_variable_must_agree() {
    let record = fields(&[("id", Value::Int(3))]);
    let pattern = FieldPattern::new().field("id", var("x"));
    let bound = empty().bind(var("x"), Value::Int(4)).unwrap();

    assert!(unify(&pattern, &record, &bound).is_none());
}

#[test]
fn repeated_variable_within_one_pattern_must_agree() {
    let pattern = FieldPattern::new().field("a", var("x")).field("b", var("x"));
    let same = fields(&[("a", Value::Int(1)), ("b", Value::Int(1))]);
    let differ = fields(&[("a", Value::Int(1)), ("b", Value::Int(2))]);

    assert!(unify(&pattern, &same, &empty()).is_some());
    assert!(unify(&pattern, &differ, &empty()).is_none());
}

#[test]
fn patterns_are_open_but_required_fields_must_exist() {
    let record = fields(&[("id", Value::Int(1)), ("extra", Value::Bool(true))]);

    let subset = FieldPattern::new().field("id", wildcard());
    assert!(unify(&subset, &record, &empty()).is_some());

    let missing = FieldPattern::new().field("owner", wildcard());
    assert!(unify(&missing, &record, &empty()).is_none());
}

#[test]
fn nested_records_destructure() {
    let record = fields(&[(
        "user",
        Value::record([("id", Value::from("u1")), ("role", Value::from("admin"))]),
    )]);
    let pattern = FieldPattern::new().field(
        "user",
        FieldPattern::new().field("id", var("uid")).field("role", "admin"),
    );

    let frame = unify(&pattern, &record, &empty()).unwrap();
    assert_eq!(frame.get("uid").and_then(Value::as_str), Some("u1"));

    let scalar = fields(&[("user", Value::from("u1"))]);
    assert!(unify(&pattern, &scalar, &empty()).is_none());
}

// =============================================================================
// Action Patterns
// =============================================================================

#[test]
fn action_pattern_selects_outcome() {
    let log = ActionLog::new();
    let (log, ok) = log.append(RecordDraft::success(
        ActionKey::new("A", "go"),
        fields(&[("id", Value::Int(1))]),
        fields(&[("v", Value::Int(2))]),
    ));
    let (_, failed) = log.append(RecordDraft::new(
        ActionKey::new("A", "go"),
        fields(&[("id", Value::Int(1))]),
        Outcome::error("nope"),
    ));

    let success = ActionPattern::new("A", "go").output("v", var("v"));
    let failure = ActionPattern::new("A", "go").failed().output("error", var("e"));
    let either = ActionPattern::new("A", "go").input("id", var("id")).either();

    let frame = Frame::new(ok.flow);
    assert!(success.match_record(&ok, &frame).is_some());
    assert!(success.match_record(&failed, &frame).is_none());
    assert!(failure.match_record(&ok, &frame).is_none());
    assert!(failure.match_record(&failed, &frame).is_some());
    assert!(either.match_record(&ok, &frame).is_some());
    assert!(either.match_record(&failed, &frame).is_some());

    let other_action = ActionPattern::new("A", "stop");
    assert!(other_action.match_record(&ok, &frame).is_none());
}
