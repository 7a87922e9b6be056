//! Action records: what the log stores.

use std::fmt;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use syncline_foundation::{Fields, Name, Value};

// =============================================================================
// Identifiers
// =============================================================================

/// Position of a record in the action log.
///
/// Sequence numbers start at 1 and grow by one per append.
#[derive(Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Seq(u64);

impl Seq {
    /// The first sequence number handed out by an empty log.
    pub const FIRST: Seq = Seq(1);

    /// Creates a sequence number from its raw value.
    #[must_use]
    pub const fn new(raw: u64) -> Self {
        Self(raw)
    }

    /// Returns the raw value.
    #[must_use]
    pub const fn get(self) -> u64 {
        self.0
    }

    /// Returns the following sequence number.
    #[must_use]
    pub const fn next(self) -> Self {
        Self(self.0 + 1)
    }

    /// Zero-based position in the log's record vector.
    #[must_use]
    #[allow(clippy::cast_possible_truncation)]
    pub(crate) const fn index(self) -> usize {
        (self.0 - 1) as usize
    }
}

impl fmt::Debug for Seq {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

impl fmt::Display for Seq {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Lineage tag grouping the records caused by one external action.
///
/// Every externally appended record starts a new flow; records produced by
/// rule dispatch inherit the flow of the frame that produced them.
#[derive(Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct FlowId(u64);

impl FlowId {
    /// Creates a flow id from its raw value.
    #[must_use]
    pub const fn new(raw: u64) -> Self {
        Self(raw)
    }

    /// Returns the raw value.
    #[must_use]
    pub const fn get(self) -> u64 {
        self.0
    }
}

impl fmt::Debug for FlowId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "flow{}", self.0)
    }
}

impl fmt::Display for FlowId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "flow{}", self.0)
    }
}

/// Identifies one action of one concept, e.g. `Sessioning.start`.
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct ActionKey {
    /// Concept (module) name.
    pub concept: Name,
    /// Action name within the concept.
    pub action: Name,
}

impl ActionKey {
    /// Creates a new action key.
    pub fn new(concept: impl Into<Name>, action: impl Into<Name>) -> Self {
        Self {
            concept: concept.into(),
            action: action.into(),
        }
    }
}

impl fmt::Debug for ActionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.concept, self.action)
    }
}

impl fmt::Display for ActionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.concept, self.action)
    }
}

// =============================================================================
// Outcome & Origin
// =============================================================================

/// How an action completed.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum Outcome {
    /// The action succeeded with these outputs.
    Success(Fields),
    /// The action failed; outputs usually carry an `error` field.
    Failure(Fields),
}

impl Outcome {
    /// Builds a failure outcome carrying a single `error` message.
    pub fn error(message: impl Into<String>) -> Self {
        let fields: Fields = [(Name::from("error"), Value::from(message.into()))]
            .into_iter()
            .collect();
        Self::Failure(fields)
    }

    /// Returns the output fields regardless of outcome.
    #[must_use]
    pub fn outputs(&self) -> &Fields {
        match self {
            Self::Success(f) | Self::Failure(f) => f,
        }
    }

    /// Returns true for a successful completion.
    #[must_use]
    pub const fn is_success(&self) -> bool {
        matches!(self, Self::Success(_))
    }
}

/// What caused a record to be appended.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum Origin {
    /// Appended from outside the engine (transport, replay, tests).
    External,
    /// Completion of an invocation dispatched by a rule.
    Rule {
        /// The rule that dispatched the invocation.
        rule: Name,
        /// Records that satisfied the rule's trigger clauses, in clause order.
        triggers: Vec<Seq>,
        /// Distance from the external record that started the cascade.
        generation: u32,
    },
}

impl Origin {
    /// Returns the cascade generation (0 for external records).
    #[must_use]
    pub fn generation(&self) -> u32 {
        match self {
            Self::External => 0,
            Self::Rule { generation, .. } => *generation,
        }
    }

    /// Returns the dispatching rule, if any.
    #[must_use]
    pub fn rule(&self) -> Option<&Name> {
        match self {
            Self::External => None,
            Self::Rule { rule, .. } => Some(rule),
        }
    }
}

// =============================================================================
// Records
// =============================================================================

/// A completed action that has not been sequenced yet.
#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct RecordDraft {
    /// Which action completed.
    pub key: ActionKey,
    /// Inputs the action was invoked with.
    pub inputs: Fields,
    /// How it completed.
    pub outcome: Outcome,
    /// Flow to file the record under; `None` starts a new flow.
    pub flow: Option<FlowId>,
    /// What caused it.
    pub origin: Origin,
}

impl RecordDraft {
    /// Creates an external draft.
    #[must_use]
    pub fn new(key: ActionKey, inputs: Fields, outcome: Outcome) -> Self {
        Self {
            key,
            inputs,
            outcome,
            flow: None,
            origin: Origin::External,
        }
    }

    /// Creates an external draft for a successful completion.
    #[must_use]
    pub fn success(key: ActionKey, inputs: Fields, outputs: Fields) -> Self {
        Self::new(key, inputs, Outcome::Success(outputs))
    }

    /// Creates an external draft for a failed completion.
    #[must_use]
    pub fn failure(key: ActionKey, inputs: Fields, outputs: Fields) -> Self {
        Self::new(key, inputs, Outcome::Failure(outputs))
    }

    /// Files the record under an existing flow.
    #[must_use]
    pub fn in_flow(mut self, flow: FlowId) -> Self {
        self.flow = Some(flow);
        self
    }

    /// Sets the origin.
    #[must_use]
    pub fn with_origin(mut self, origin: Origin) -> Self {
        self.origin = origin;
        self
    }
}

/// An immutable, sequenced action completion.
#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct ActionRecord {
    /// Position in the log.
    pub seq: Seq,
    /// Lineage tag.
    pub flow: FlowId,
    /// Which action completed.
    pub key: ActionKey,
    /// Inputs the action was invoked with.
    pub inputs: Fields,
    /// How it completed.
    pub outcome: Outcome,
    /// What caused it.
    pub origin: Origin,
}

impl ActionRecord {
    /// Returns the output fields regardless of outcome.
    #[must_use]
    pub fn outputs(&self) -> &Fields {
        self.outcome.outputs()
    }

    /// Returns true for a successful completion.
    #[must_use]
    pub fn succeeded(&self) -> bool {
        self.outcome.is_success()
    }

    /// Strips the sequence number, e.g. to replay the record elsewhere.
    #[must_use]
    pub fn to_draft(&self) -> RecordDraft {
        RecordDraft {
            key: self.key.clone(),
            inputs: self.inputs.clone(),
            outcome: self.outcome.clone(),
            flow: Some(self.flow),
            origin: self.origin.clone(),
        }
    }
}

impl fmt::Display for ActionRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let tag = if self.succeeded() { "ok" } else { "err" };
        write!(
            f,
            "{} {} {}({}) -> {tag} {}",
            self.seq,
            self.flow,
            self.key,
            Value::Record(self.inputs.clone()),
            Value::Record(self.outputs().clone())
        )
    }
}
