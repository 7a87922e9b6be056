//! Query-then-filter authorization, and the explicit denial policy.

use syncline_engine::{Engine, OutputClause, Query, Rule, var};
use syncline_foundation::Value;
use syncline_log::ActionKey;

use crate::support::{Fake, fields, init_tracing};

const CURRENT_USER: &str = "u1";

fn authorized_rule() -> Rule {
    Rule::builder("foo-then-baz")
        .when(syncline_engine::ActionPattern::new("A", "foo").input("id", var("id")))
        .query(
            Query::new("B", "bar")
                .input("id", var("id"))
                .output("owner", var("owner")),
        )
        .filter(&["owner"], |f| {
            f.get("owner").and_then(Value::as_str) == Some(CURRENT_USER)
        })
        .then(OutputClause::new("C", "baz").input("id", var("id")))
        .build()
        .unwrap()
}

fn engine(rows: Vec<syncline_foundation::Fields>) -> Engine {
    Engine::builder()
        .concept(Fake::new("A"))
        .concept(Fake::new("B").rows("bar", rows))
        .concept(Fake::new("C"))
        .rule(authorized_rule())
        .build()
        .unwrap()
}

#[tokio::test]
async fn owner_match_dispatches_once() {
    init_tracing();
    let engine = engine(vec![fields([
        ("id", Value::Int(1)),
        ("owner", Value::from("u1")),
    ])]);

    let report = engine
        .invoke(ActionKey::new("A", "foo"), fields([("id", Value::Int(1))]))
        .await
        .unwrap();

    assert_eq!(report.dispatched.len(), 1);
    assert_eq!(report.dispatched_to(&ActionKey::new("C", "baz")), 1);
    assert_eq!(report.dispatched[0].inputs.get("id"), Some(&Value::Int(1)));
    assert!(report.is_clean());
}

#[tokio::test]
async fn empty_query_result_dispatches_nothing_and_raises_nothing() {
    init_tracing();
    let engine = engine(Vec::new());

    let report = engine
        .invoke(ActionKey::new("A", "foo"), fields([("id", Value::Int(1))]))
        .await
        .unwrap();

    assert!(report.dispatched.is_empty());
    assert!(report.is_clean());
    assert_eq!(report.activations, 1);
    assert_eq!(engine.log().await.len(), 1);
}

#[tokio::test]
async fn other_owner_is_filtered_silently() {
    let engine = engine(vec![fields([
        ("id", Value::Int(1)),
        ("owner", Value::from("u2")),
    ])]);

    let report = engine
        .invoke(ActionKey::new("A", "foo"), fields([("id", Value::Int(1))]))
        .await
        .unwrap();

    assert!(report.dispatched.is_empty());
    assert!(report.is_clean());
}

/// Denial is opt-in: a second rule turns the empty case into a response.
#[tokio::test]
async fn explicit_denial_rule_answers_when_nothing_is_owned() {
    init_tracing();
    let deny = Rule::builder("foo-denied")
        .when(syncline_engine::ActionPattern::new("A", "foo").input("id", var("id")))
        .query(
            Query::new("B", "bar")
                .input("id", var("id"))
                .output("owner", var("owner"))
                .or_bind("owner", Value::Nil),
        )
        .filter(&["owner"], |f| {
            f.get("owner").and_then(Value::as_str) != Some(CURRENT_USER)
        })
        .then(
            OutputClause::new("C", "deny")
                .input("id", var("id"))
                .input("error", "not authorized"),
        )
        .build()
        .unwrap();

    let engine = Engine::builder()
        .concept(Fake::new("A"))
        .concept(Fake::new("B").rows("bar", Vec::new()))
        .concept(Fake::new("C"))
        .rule(authorized_rule())
        .rule(deny)
        .build()
        .unwrap();

    let report = engine
        .invoke(ActionKey::new("A", "foo"), fields([("id", Value::Int(1))]))
        .await
        .unwrap();

    assert_eq!(report.dispatched.len(), 1);
    assert_eq!(report.dispatched_to(&ActionKey::new("C", "deny")), 1);
    assert_eq!(
        report.dispatched[0].frame.get("owner"),
        Some(&Value::Nil)
    );
}
