//! Rule output triggering further rules, and the kill switches.

use std::time::Duration;

use syncline_engine::{ActionPattern, Engine, EngineConfig, OutputClause, Query, Rule, var};
use syncline_foundation::{ErrorKind, SemanticLimit, Value};
use syncline_log::ActionKey;

use crate::support::{Fake, fields, init_tracing};

fn ping_forever() -> Rule {
    Rule::builder("ping-forever")
        .when(ActionPattern::new("P", "ping").input("n", var("n")))
        .then(OutputClause::new("P", "ping").input("n", var("n")))
        .build()
        .unwrap()
}

#[tokio::test]
async fn runaway_cascade_hits_generation_limit() {
    init_tracing();
    let engine = Engine::builder()
        .config(EngineConfig::default().with_max_generation_depth(5))
        .concept(Fake::new("P"))
        .rule(ping_forever())
        .build()
        .unwrap();

    let err = engine
        .invoke(ActionKey::new("P", "ping"), fields([("n", Value::Int(0))]))
        .await
        .unwrap_err();

    match err.kind {
        ErrorKind::LimitExceeded(SemanticLimit::MaxGenerationDepth { limit, rule }) => {
            assert_eq!(limit, 5);
            assert_eq!(rule.as_deref(), Some("ping-forever"));
        }
        other => panic!("unexpected error {other}"),
    }
    // The root plus one record per permitted generation.
    assert_eq!(engine.log().await.len(), 6);
}

#[tokio::test]
async fn chained_rules_share_the_root_flow() {
    let engine = Engine::builder()
        .concept(Fake::new("Web"))
        .concept(Fake::new("Items"))
        .rule(
            Rule::builder("delete-on-request")
                .when(
                    ActionPattern::new("Web", "request")
                        .input("path", "/items/delete")
                        .input("item", var("i")),
                )
                .then(OutputClause::new("Items", "delete").input("item", var("i")))
                .build()
                .unwrap(),
        )
        .rule(
            Rule::builder("respond-on-delete")
                .when(ActionPattern::new("Items", "delete").input("item", var("i")))
                .then(
                    OutputClause::new("Web", "respond")
                        .input("status", 200)
                        .input("item", var("i")),
                )
                .scoped_to_flow()
                .build()
                .unwrap(),
        )
        .build()
        .unwrap();

    let report = engine
        .invoke(
            ActionKey::new("Web", "request"),
            fields([("path", Value::from("/items/delete")), ("item", Value::Int(4))]),
        )
        .await
        .unwrap();

    let keys: Vec<_> = report.appended.iter().map(|r| r.key.to_string()).collect();
    assert_eq!(keys, vec!["Web.request", "Items.delete", "Web.respond"]);
    let root = report.root().unwrap();
    assert!(report.appended.iter().all(|r| r.flow == root.flow));

    let respond = &report.derived()[1];
    let provenance = engine.provenance().await;
    let chain = provenance.chain(respond.seq, 10);
    let rules: Vec<_> = chain.iter().map(|(_, d)| d.rule.to_string()).collect();
    assert_eq!(rules, vec!["respond-on-delete", "delete-on-request"]);
}

/// Completions are sequenced in dispatch order, not completion order.
#[tokio::test]
async fn sequence_follows_dispatch_order() {
    init_tracing();
    let jobs = Fake::new("Jobs").rows(
        "pending",
        vec![
            fields([("batch", Value::Int(1)), ("delay", Value::Int(30))]),
            fields([("batch", Value::Int(1)), ("delay", Value::Int(15))]),
            fields([("batch", Value::Int(1)), ("delay", Value::Int(1))]),
        ],
    );
    let engine = Engine::builder()
        .config(
            EngineConfig::default()
                .with_action_concurrency(8)
                .with_action_timeout(Duration::from_secs(5)),
        )
        .concept(jobs)
        .concept(Fake::new("Workers").slow_by("delay"))
        .rule(
            Rule::builder("fan-out")
                .when(ActionPattern::new("Jobs", "start").input("batch", var("b")))
                .query(
                    Query::new("Jobs", "pending")
                        .input("batch", var("b"))
                        .output("delay", var("d")),
                )
                .then(OutputClause::new("Workers", "run").input("delay", var("d")))
                .build()
                .unwrap(),
        )
        .build()
        .unwrap();

    let report = engine
        .invoke(ActionKey::new("Jobs", "start"), fields([("batch", Value::Int(1))]))
        .await
        .unwrap();

    let delays: Vec<_> = report
        .derived()
        .iter()
        .map(|r| r.inputs.get("delay").and_then(Value::as_int))
        .collect();
    assert_eq!(delays, vec![Some(30), Some(15), Some(1)]);
    let seqs: Vec<_> = report.derived().iter().map(|r| r.seq.get()).collect();
    assert_eq!(seqs, vec![2, 3, 4]);
}
