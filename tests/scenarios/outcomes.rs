//! Failure outcomes and faults that stay local to one frame.

use std::time::Duration;

use syncline_engine::{ActionPattern, Engine, EngineConfig, OutputClause, Query, Rule, var};
use syncline_foundation::{ErrorKind, Value};
use syncline_log::ActionKey;

use crate::support::{Fake, fields, init_tracing};

fn respond_on(outcome: &str) -> Rule {
    let clause = ActionPattern::new("Items", "delete").input("item", var("i"));
    let (clause, status) = match outcome {
        "failure" => (clause.failed().output("error", var("e")), 500),
        _ => (clause, 200),
    };
    Rule::builder(format!("respond-{outcome}"))
        .when(clause)
        .then(
            OutputClause::new("Web", "respond")
                .input("item", var("i"))
                .input("status", status),
        )
        .build()
        .unwrap()
}

#[tokio::test]
async fn failed_actions_are_matched_like_any_other_record() {
    init_tracing();
    let items = Fake::new("Items").failing("delete").shared();
    let engine = Engine::builder()
        .concept_shared(items.clone())
        .concept(Fake::new("Web"))
        .rule(respond_on("success"))
        .rule(respond_on("failure"))
        .build()
        .unwrap();

    let report = engine
        .invoke(ActionKey::new("Items", "delete"), fields([("item", Value::Int(9))]))
        .await
        .unwrap();

    assert!(!report.root().unwrap().succeeded());
    assert_eq!(items.calls().len(), 1);
    assert_eq!(report.dispatched.len(), 1);
    assert_eq!(report.dispatched[0].rule().map(|r| &**r), Some("respond-failure"));
    assert_eq!(report.dispatched[0].inputs.get("status"), Some(&Value::Int(500)));
    let error = report.dispatched[0].frame.get("e").and_then(Value::as_str).unwrap();
    assert!(error.contains("refused"));
}

#[tokio::test]
async fn dispatch_to_a_slow_concept_records_a_timeout_failure() {
    let engine = Engine::builder()
        .config(EngineConfig::default().with_action_timeout(Duration::from_millis(10)))
        .concept(Fake::new("Web"))
        .concept(Fake::new("Mail").slow_by("delay"))
        .rule(
            Rule::builder("notify")
                .when(ActionPattern::new("Web", "signup").input("delay", var("d")))
                .then(OutputClause::new("Mail", "send").input("delay", var("d")))
                .build()
                .unwrap(),
        )
        .build()
        .unwrap();

    let report = engine
        .invoke(ActionKey::new("Web", "signup"), fields([("delay", Value::Int(500))]))
        .await
        .unwrap();

    let sent = &report.derived()[0];
    assert!(!sent.succeeded());
    let error = sent.outputs().get("error").and_then(Value::as_str).unwrap();
    assert!(error.contains("timed out"));
}

#[tokio::test]
async fn unknown_action_is_recorded_as_a_failure() {
    init_tracing();
    let engine = Engine::builder()
        .concept(Fake::new("Web"))
        .concept(Fake::new("Mail").without("send"))
        .rule(
            Rule::builder("notify")
                .when(ActionPattern::new("Web", "signup").input("user", var("u")))
                .then(OutputClause::new("Mail", "send").input("to", var("u")))
                .build()
                .unwrap(),
        )
        .build()
        .unwrap();

    let report = engine
        .invoke(ActionKey::new("Web", "signup"), fields([("user", Value::from("ann"))]))
        .await
        .unwrap();

    assert_eq!(report.dispatched_to(&ActionKey::new("Mail", "send")), 1);
    let sent = &report.derived()[0];
    assert!(!sent.succeeded());
    let error = sent.outputs().get("error").and_then(Value::as_str).unwrap();
    assert_eq!(error, "unknown action: Mail.send");
}

#[tokio::test]
async fn query_fault_drops_only_its_frame() {
    init_tracing();
    let engine = Engine::builder()
        .concept(Fake::new("Web"))
        .concept(Fake::new("Users").rows(
            "profile",
            vec![fields([("user", Value::from("ann")), ("email", Value::from("a@x"))])],
        ))
        .concept(Fake::new("Mail"))
        .rule(
            Rule::builder("welcome")
                .when(ActionPattern::new("Web", "signup").input("user", var("u")))
                .query(
                    Query::new("Users", "profile")
                        .input("user", var("u"))
                        .output("email", var("email")),
                )
                .then(OutputClause::new("Mail", "send").input("to", var("email")))
                .build()
                .unwrap(),
        )
        .rule(
            Rule::builder("audit")
                .when(ActionPattern::new("Web", "signup").input("user", var("u")))
                .query(Query::new("Users", "missing").input("user", var("u")))
                .then(OutputClause::new("Mail", "audit").input("user", var("u")))
                .build()
                .unwrap(),
        )
        .build()
        .unwrap();

    let report = engine
        .invoke(ActionKey::new("Web", "signup"), fields([("user", Value::from("ann"))]))
        .await
        .unwrap();

    assert_eq!(report.dispatched_to(&ActionKey::new("Mail", "send")), 1);
    assert_eq!(report.dispatched_to(&ActionKey::new("Mail", "audit")), 0);
    assert_eq!(report.faults.len(), 1);
    assert_eq!(&*report.faults[0].rule, "audit");
    assert!(matches!(report.faults[0].error.kind, ErrorKind::UnknownQuery { .. }));
}

#[tokio::test]
async fn unknown_concepts_are_rejected_when_building() {
    let result = Engine::builder()
        .concept(Fake::new("Web"))
        .rule(respond_on("success"))
        .build();
    let err = result.map(|_| ()).unwrap_err();
    assert!(matches!(err.kind, ErrorKind::UnknownConcept(ref c) if c == "Items"));
}
