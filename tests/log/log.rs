//! Integration tests for `ActionLog`
//!
//! Tests sequencing, snapshots, and per-action lookup.

use syncline_foundation::{Fields, Name, Value};
use syncline_log::{ActionKey, ActionLog, Origin, Outcome, RecordDraft, Seq};

fn fields(pairs: &[(&str, i64)]) -> Fields {
    pairs
        .iter()
        .map(|(k, v)| (Name::from(*k), Value::Int(*v)))
        .collect()
}

fn draft(concept: &str, action: &str, id: i64) -> RecordDraft {
    RecordDraft::success(ActionKey::new(concept, action), fields(&[("id", id)]), Fields::new())
}

// =============================================================================
// Sequencing
// =============================================================================

#[test]
fn sequence_numbers_are_dense_and_start_at_one() {
    let mut log = ActionLog::new();
    assert_eq!(log.next_seq(), Seq::FIRST);
    for i in 0..5 {
        let (next, record) = log.append(draft("A", "go", i));
        assert_eq!(record.seq, Seq::new(i as u64 + 1));
        log = next;
    }
    assert_eq!(log.len(), 5);
    assert_eq!(log.last_seq(), Some(Seq::new(5)));
}

#[test]
fn get_by_sequence() {
    let log = ActionLog::new().append(draft("A", "go", 1)).0;
    assert_eq!(log.get(Seq::FIRST).map(|r| r.key.to_string()), Some("A.go".into()));
    assert!(log.get(Seq::new(2)).is_none());
}

// =============================================================================
// Snapshots
// =============================================================================

#[test]
fn append_leaves_snapshot_untouched() {
    let before = ActionLog::new().append(draft("A", "go", 1)).0;
    let after = before.append(draft("A", "go", 2)).0;

    assert_eq!(before.len(), 1);
    assert_eq!(after.len(), 2);
    assert_eq!(before.records_for(&ActionKey::new("A", "go")).count(), 1);
}

// =============================================================================
// Lookup
// =============================================================================

#[test]
fn records_for_filters_by_action() {
    let mut log = ActionLog::new();
    for (concept, action) in [("A", "go"), ("A", "stop"), ("B", "go"), ("A", "go")] {
        log = log.append(draft(concept, action, 0)).0;
    }

    let seqs: Vec<_> = log
        .records_for(&ActionKey::new("A", "go"))
        .map(|r| r.seq)
        .collect();
    assert_eq!(seqs, vec![Seq::new(1), Seq::new(4)]);
    assert_eq!(log.concept_len("A"), 3);
    assert_eq!(log.concept_len("Missing"), 0);

    let concepts: Vec<_> = log.concepts().map(ToString::to_string).collect();
    assert_eq!(concepts, vec!["A", "B"]);
}

#[test]
fn records_for_until_stops_at_bound() {
    let mut log = ActionLog::new();
    for i in 0..6 {
        log = log.append(draft("A", "go", i)).0;
    }
    let count = log
        .records_for_until(&ActionKey::new("A", "go"), Seq::new(3))
        .count();
    assert_eq!(count, 3);
}

// =============================================================================
// Records
// =============================================================================

#[test]
fn failures_are_recorded_with_their_outputs() {
    let failed = RecordDraft::new(ActionKey::new("A", "go"), Fields::new(), Outcome::error("nope"));
    let (_, record) = ActionLog::new().append(failed);

    assert!(!record.succeeded());
    assert_eq!(record.outputs().get("error").and_then(Value::as_str), Some("nope"));
}

#[test]
fn to_draft_keeps_flow_and_origin() {
    let (_, record) = ActionLog::new().append(draft("A", "go", 1));
    let copy = record.to_draft();
    assert_eq!(copy.flow, Some(record.flow));
    assert_eq!(copy.origin, Origin::External);
    assert_eq!(copy.inputs, record.inputs);
}

#[test]
fn record_display() {
    let (_, record) = ActionLog::new().append(draft("A", "go", 7));
    assert_eq!(record.to_string(), "#1 flow1 A.go({id: 7}) -> ok {}");
}
