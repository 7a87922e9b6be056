//! Multi-clause trigger matching over the action log.
//!
//! When a record is appended, every rule with a clause on its action is
//! joined: the new record seeds a frame through each clause it satisfies,
//! and the remaining clauses are unified, in declaration order, against
//! records already in the log. Bindings made by earlier clauses constrain
//! later ones, so candidates are filtered as soon as they are unified rather
//! than after a full cross product.
//!
//! Only records at or before the trigger are considered. Every combination
//! of records is therefore discovered exactly once, when its newest member
//! is appended; [`Refraction`] guards against the same combination being
//! reported through two clause positions.

use std::collections::HashSet;

use syncline_log::{ActionLog, ActionRecord, Seq};
use tracing::trace;

use crate::frame::Frame;
use crate::pattern::ActionPattern;

/// Which log records a rule's other clauses may join with.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum Scope {
    /// Any record in the log.
    #[default]
    Global,
    /// Only records in the trigger's flow.
    Flow,
}

/// One satisfying combination of records for a rule's clauses.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Match {
    /// Bindings from unifying every clause.
    pub frame: Frame,
    /// `records[i]` satisfied clause `i`.
    pub records: Vec<Seq>,
}

/// Combinations a rule has already activated on.
///
/// A record tuple, once seen, is never activated again for the same rule.
#[derive(Clone, Debug, Default)]
pub struct Refraction {
    seen: HashSet<Vec<Seq>>,
}

impl Refraction {
    /// Creates an empty refraction set.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Marks a combination as seen. Returns false if it was already seen.
    pub fn insert(&mut self, records: &[Seq]) -> bool {
        if self.seen.contains(records) {
            return false;
        }
        self.seen.insert(records.to_vec())
    }

    /// Returns true if the combination was already seen.
    #[must_use]
    pub fn contains(&self, records: &[Seq]) -> bool {
        self.seen.contains(records)
    }

    /// Number of combinations seen.
    #[must_use]
    pub fn len(&self) -> usize {
        self.seen.len()
    }

    /// Returns true if nothing has been seen.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.seen.is_empty()
    }
}

struct Partial {
    frame: Frame,
    records: Vec<Option<Seq>>,
}

/// Finds every combination of log records, one per clause, that includes
/// `trigger` and unifies consistently.
///
/// `log` must already contain `trigger`. Matches are produced grouped by
/// the clause the trigger filled, then in ascending sequence order of the
/// records filling the remaining clauses. Each frame's lineage is the
/// trigger's flow.
#[must_use]
pub fn join(
    clauses: &[ActionPattern],
    scope: Scope,
    log: &ActionLog,
    trigger: &ActionRecord,
) -> Vec<Match> {
    let mut matches = Vec::new();

    for (position, clause) in clauses.iter().enumerate() {
        let Some(seed) = clause.match_record(trigger, &Frame::new(trigger.flow)) else {
            continue;
        };
        let mut records = vec![None; clauses.len()];
        records[position] = Some(trigger.seq);
        let mut partials = vec![Partial {
            frame: seed,
            records,
        }];

        for (other, pattern) in clauses.iter().enumerate() {
            if other == position {
                continue;
            }
            let mut next = Vec::new();
            for partial in &partials {
                let candidates = log
                    .records_for_until(&pattern.key, trigger.seq)
                    .filter(|r| scope == Scope::Global || r.flow == trigger.flow);
                for candidate in candidates {
                    if let Some(frame) = pattern.match_record(candidate, &partial.frame) {
                        let mut records = partial.records.clone();
                        records[other] = Some(candidate.seq);
                        next.push(Partial { frame, records });
                    }
                }
            }
            partials = next;
            if partials.is_empty() {
                break;
            }
        }

        trace!(
            trigger = %trigger.seq,
            clause = position,
            matches = partials.len(),
            "joined trigger clause"
        );

        matches.extend(partials.into_iter().map(|p| Match {
            frame: p.frame,
            records: p.records.into_iter().flatten().collect(),
        }));
    }

    matches
}
