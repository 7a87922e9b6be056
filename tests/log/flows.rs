//! Integration tests for flows
//!
//! Tests flow assignment, flow membership, and replayed flow ids.

use syncline_foundation::Fields;
use syncline_log::{ActionKey, ActionLog, FlowId, RecordDraft};

fn draft() -> RecordDraft {
    RecordDraft::success(ActionKey::new("A", "go"), Fields::new(), Fields::new())
}

#[test]
fn drafts_without_flow_start_new_flows() {
    let (log, first) = ActionLog::new().append(draft());
    let (_, second) = log.append(draft());
    assert_ne!(first.flow, second.flow);
}

#[test]
fn drafts_in_flow_share_lineage() {
    let (log, first) = ActionLog::new().append(draft());
    let (log, second) = log.append(draft().in_flow(first.flow));
    let (log, _) = log.append(draft());

    let members: Vec<_> = log.in_flow(first.flow).map(|r| r.seq).collect();
    assert_eq!(members, vec![first.seq, second.seq]);
}

#[test]
fn open_flow_reserves_an_id() {
    let (log, reserved) = ActionLog::new().open_flow();
    let (log, record) = log.append(draft().in_flow(reserved));
    let (_, fresh) = log.append(draft());

    assert_eq!(record.flow, reserved);
    assert_ne!(fresh.flow, reserved);
}

#[test]
fn replayed_flow_ids_advance_the_counter() {
    let (log, replayed) = ActionLog::new().append(draft().in_flow(FlowId::new(10)));
    let (_, fresh) = log.append(draft());

    assert_eq!(replayed.flow, FlowId::new(10));
    assert_eq!(fresh.flow, FlowId::new(11));
}

#[test]
fn unknown_flow_is_empty() {
    let log = ActionLog::new().append(draft()).0;
    assert_eq!(log.in_flow(FlowId::new(99)).count(), 0);
}
