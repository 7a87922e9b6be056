//! The action log with immutable snapshots.
//!
//! Records are never modified or removed. The log is sharded by concept and
//! indexed per action inside each shard, so trigger matching only walks the
//! records of the actions a rule mentions. Every structure is persistent:
//! cloning the log is O(1) and yields a snapshot that later appends do not
//! disturb.

use std::sync::Arc;

use syncline_foundation::{Name, SlMap, SlVec};

use crate::record::{ActionKey, ActionRecord, FlowId, RecordDraft, Seq};

/// Records of one concept, indexed by action name.
#[derive(Clone, Debug, Default)]
struct ConceptShard {
    actions: SlMap<Name, SlVec<Arc<ActionRecord>>>,
    count: usize,
}

impl ConceptShard {
    fn with_record(&self, record: Arc<ActionRecord>) -> Self {
        let action = record.key.action.clone();
        let records = self
            .actions
            .get(&action)
            .cloned()
            .unwrap_or_default()
            .push_back(record);
        Self {
            actions: self.actions.insert(action, records),
            count: self.count + 1,
        }
    }
}

/// Immutable snapshot of the action log.
///
/// Clone is O(1) due to structural sharing. [`ActionLog::append`] returns a
/// new log; the receiver is left untouched.
#[derive(Clone, Debug, Default)]
pub struct ActionLog {
    /// All records in sequence order; `records[seq - 1]`.
    records: SlVec<Arc<ActionRecord>>,
    /// Per-concept shards.
    shards: SlMap<Name, ConceptShard>,
    /// Sequence numbers of each flow, ascending.
    flows: SlMap<FlowId, SlVec<Seq>>,
    /// Next flow id to hand out.
    next_flow: u64,
}

impl ActionLog {
    /// Creates an empty log.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a draft, assigning the next sequence number and, when the
    /// draft names none, a fresh flow.
    ///
    /// Returns the new log and the sequenced record.
    #[must_use]
    pub fn append(&self, draft: RecordDraft) -> (Self, Arc<ActionRecord>) {
        let seq = self.next_seq();
        let mut next_flow = self.next_flow;
        let flow = draft.flow.unwrap_or_else(|| {
            next_flow += 1;
            FlowId::new(next_flow)
        });
        // A caller-supplied flow may be ahead of our counter (replay).
        next_flow = next_flow.max(flow.get());

        let record = Arc::new(ActionRecord {
            seq,
            flow,
            key: draft.key,
            inputs: draft.inputs,
            outcome: draft.outcome,
            origin: draft.origin,
        });

        let shard = self
            .shards
            .get(&record.key.concept)
            .cloned()
            .unwrap_or_default()
            .with_record(Arc::clone(&record));
        let flow_seqs = self
            .flows
            .get(&flow)
            .cloned()
            .unwrap_or_default()
            .push_back(seq);

        let log = Self {
            records: self.records.push_back(Arc::clone(&record)),
            shards: self.shards.insert(record.key.concept.clone(), shard),
            flows: self.flows.insert(flow, flow_seqs),
            next_flow,
        };
        (log, record)
    }

    /// Reserves a fresh flow id without appending anything.
    #[must_use]
    pub fn open_flow(&self) -> (Self, FlowId) {
        let mut log = self.clone();
        log.next_flow += 1;
        let flow = FlowId::new(log.next_flow);
        (log, flow)
    }

    /// Returns the number of records.
    #[must_use]
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// Returns true if nothing has been appended.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Returns the sequence number the next append will receive.
    #[must_use]
    pub fn next_seq(&self) -> Seq {
        self.last_seq().map_or(Seq::FIRST, Seq::next)
    }

    /// Returns the sequence number of the newest record.
    #[must_use]
    pub fn last_seq(&self) -> Option<Seq> {
        self.records.last().map(|r| r.seq)
    }

    /// Looks up a record by sequence number.
    #[must_use]
    pub fn get(&self, seq: Seq) -> Option<&Arc<ActionRecord>> {
        if seq < Seq::FIRST {
            return None;
        }
        self.records.get(seq.index())
    }

    /// Iterates all records in sequence order.
    pub fn iter(&self) -> impl Iterator<Item = &Arc<ActionRecord>> {
        self.records.iter()
    }

    /// Iterates the records of one action in sequence order.
    pub fn records_for<'a>(
        &'a self,
        key: &ActionKey,
    ) -> impl Iterator<Item = &'a Arc<ActionRecord>> + 'a {
        self.shards
            .get(&key.concept)
            .and_then(|shard| shard.actions.get(&key.action))
            .into_iter()
            .flat_map(|records| records.iter())
    }

    /// Iterates the records of one action up to and including `until`.
    pub fn records_for_until<'a>(
        &'a self,
        key: &ActionKey,
        until: Seq,
    ) -> impl Iterator<Item = &'a Arc<ActionRecord>> + 'a {
        self.records_for(key).take_while(move |r| r.seq <= until)
    }

    /// Iterates the records of one flow in sequence order.
    pub fn in_flow(&self, flow: FlowId) -> impl Iterator<Item = &Arc<ActionRecord>> {
        self.flows
            .get(&flow)
            .into_iter()
            .flat_map(|records| records.iter())
            .filter_map(|seq| self.get(*seq))
    }

    /// Number of records filed under a concept.
    #[must_use]
    pub fn concept_len(&self, concept: &str) -> usize {
        self.shards.get(concept).map_or(0, |s| s.count)
    }

    /// Names of every concept that has at least one record.
    pub fn concepts(&self) -> impl Iterator<Item = &Name> {
        self.shards.keys()
    }
}
