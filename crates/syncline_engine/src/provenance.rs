//! Provenance tracking for Syncline.
//!
//! This module records why each rule-produced record exists, supporting:
//! - The rule and trigger records behind any derived record
//! - Multi-hop "why did this happen" chains back to external records
//! - Configurable verbosity (Minimal/Standard)

use std::collections::{HashMap, HashSet, VecDeque};

use syncline_foundation::{Name, Value};
use syncline_log::Seq;

// =============================================================================
// Verbosity Levels
// =============================================================================

/// Verbosity level for provenance tracking.
///
/// Higher verbosity captures more information but uses more memory.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum ProvenanceVerbosity {
    /// Minimal: rule, triggers, and generation only.
    #[default]
    Minimal,

    /// Standard: also keeps the frame bindings the invocation was resolved
    /// from.
    Standard,
}

// =============================================================================
// Derivation
// =============================================================================

/// Why a rule-produced record exists.
#[derive(Clone, Debug, PartialEq)]
pub struct Derivation {
    /// The rule that dispatched the invocation.
    pub rule: Name,
    /// Records that satisfied the rule's clauses, in clause order.
    pub triggers: Vec<Seq>,
    /// Cascade generation of the derived record.
    pub generation: u32,
    /// Bindings at dispatch time (None at Minimal verbosity).
    pub bindings: Option<Vec<(String, Value)>>,
}

impl Derivation {
    /// Creates a derivation with minimal information.
    #[must_use]
    pub fn new(rule: Name, triggers: Vec<Seq>, generation: u32) -> Self {
        Self {
            rule,
            triggers,
            generation,
            bindings: None,
        }
    }

    /// Sets the bindings snapshot.
    #[must_use]
    pub fn with_bindings(mut self, bindings: Vec<(String, Value)>) -> Self {
        self.bindings = Some(bindings);
        self
    }
}

// =============================================================================
// Provenance Tracker
// =============================================================================

/// Tracks the derivation of every rule-produced record.
///
/// External records have no derivation; a chain ends there.
#[derive(Clone, Debug, Default)]
pub struct ProvenanceTracker {
    derived: HashMap<Seq, Derivation>,
    verbosity: ProvenanceVerbosity,
}

impl ProvenanceTracker {
    /// Creates a tracker with Minimal verbosity.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a tracker with the specified verbosity.
    #[must_use]
    pub fn with_verbosity(verbosity: ProvenanceVerbosity) -> Self {
        Self {
            derived: HashMap::new(),
            verbosity,
        }
    }

    /// Returns the current verbosity level.
    #[must_use]
    pub fn verbosity(&self) -> ProvenanceVerbosity {
        self.verbosity
    }

    /// Records the derivation of a record.
    ///
    /// Bindings are dropped at Minimal verbosity.
    pub fn record(&mut self, seq: Seq, mut derivation: Derivation) {
        if self.verbosity == ProvenanceVerbosity::Minimal {
            derivation.bindings = None;
        }
        self.derived.insert(seq, derivation);
    }

    /// Answers "why does this record exist?"
    ///
    /// Returns None for external records and unknown sequence numbers.
    #[must_use]
    pub fn why(&self, seq: Seq) -> Option<&Derivation> {
        self.derived.get(&seq)
    }

    /// Walks derivations breadth-first from `seq`, up to `depth` hops.
    ///
    /// Each derived ancestor appears once, nearest first; external records
    /// end the walk along their branch.
    #[must_use]
    pub fn chain(&self, seq: Seq, depth: usize) -> Vec<(Seq, &Derivation)> {
        let mut out = Vec::new();
        let mut seen = HashSet::new();
        let mut queue = VecDeque::from([(seq, 0usize)]);

        while let Some((current, hops)) = queue.pop_front() {
            if hops >= depth || !seen.insert(current) {
                continue;
            }
            let Some(derivation) = self.derived.get(&current) else {
                continue;
            };
            out.push((current, derivation));
            for trigger in &derivation.triggers {
                queue.push_back((*trigger, hops + 1));
            }
        }

        out
    }

    /// Returns every record derived by a rule, in sequence order.
    #[must_use]
    pub fn derived_by(&self, rule: &str) -> Vec<Seq> {
        let mut seqs: Vec<_> = self
            .derived
            .iter()
            .filter(|(_, d)| &*d.rule == rule)
            .map(|(seq, _)| *seq)
            .collect();
        seqs.sort_unstable();
        seqs
    }

    /// Number of derived records tracked.
    #[must_use]
    pub fn len(&self) -> usize {
        self.derived.len()
    }

    /// Returns true if nothing has been derived.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.derived.is_empty()
    }

    /// Clears all provenance data.
    pub fn clear(&mut self) {
        self.derived.clear();
    }
}

// =============================================================================
// Tests
// =============================================================================
