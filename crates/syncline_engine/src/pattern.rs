//! Field patterns and the unifier.
//!
//! A pattern describes the shape of a record's inputs or outputs: each named
//! field is a literal that must be equal, a variable that binds (or must
//! agree with an existing binding), a wildcard that only requires presence,
//! or a nested pattern for record-valued fields.
//!
//! Unification is pure: it either returns an extended copy of the input
//! frame or `None`. A field named by the pattern but missing from the
//! record is a failed match, never an error.

use std::fmt;

use syncline_foundation::{Fields, Name, Value};
use syncline_log::{ActionKey, ActionRecord, Outcome};

use crate::frame::{Frame, Variable};

// =============================================================================
// Term
// =============================================================================

/// One position in a field pattern.
#[derive(Clone, PartialEq)]
pub enum Term {
    /// Matches only an equal value.
    Literal(Value),
    /// Binds the value, or checks it against an existing binding.
    Var(Variable),
    /// Matches any value; the field must still be present.
    Wildcard,
    /// Matches a record value field by field.
    Record(FieldPattern),
}

/// Shorthand for [`Term::Wildcard`].
#[must_use]
pub fn wildcard() -> Term {
    Term::Wildcard
}

impl Term {
    /// Collects every variable this term mentions, in pattern order.
    pub fn variables_into(&self, out: &mut Vec<Variable>) {
        match self {
            Self::Var(v) => out.push(v.clone()),
            Self::Record(pattern) => pattern.variables_into(out),
            Self::Literal(_) | Self::Wildcard => {}
        }
    }
}

impl fmt::Debug for Term {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Literal(v) => write!(f, "{v}"),
            Self::Var(v) => write!(f, "{v}"),
            Self::Wildcard => write!(f, "_"),
            Self::Record(p) => write!(f, "{p:?}"),
        }
    }
}

impl From<Variable> for Term {
    fn from(v: Variable) -> Self {
        Self::Var(v)
    }
}

impl From<Value> for Term {
    fn from(v: Value) -> Self {
        Self::Literal(v)
    }
}

impl From<FieldPattern> for Term {
    fn from(p: FieldPattern) -> Self {
        Self::Record(p)
    }
}

macro_rules! literal_terms {
    ($($ty:ty),*) => {
        $(
            impl From<$ty> for Term {
                fn from(v: $ty) -> Self {
                    Self::Literal(Value::from(v))
                }
            }
        )*
    };
}

literal_terms!(bool, i64, i32, f64, &str, String);

// =============================================================================
// FieldPattern
// =============================================================================

/// An ordered list of `field: term` constraints.
///
/// Fields the pattern does not name are ignored.
#[derive(Clone, Default, PartialEq)]
pub struct FieldPattern {
    fields: Vec<(Name, Term)>,
}

impl FieldPattern {
    /// Creates an empty pattern, which matches any record.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a field constraint.
    #[must_use]
    pub fn field(mut self, name: impl Into<Name>, term: impl Into<Term>) -> Self {
        self.fields.push((name.into(), term.into()));
        self
    }

    /// Adds a field constraint in place.
    pub fn push(&mut self, name: impl Into<Name>, term: impl Into<Term>) {
        self.fields.push((name.into(), term.into()));
    }

    /// Returns the number of constrained fields.
    #[must_use]
    pub fn len(&self) -> usize {
        self.fields.len()
    }

    /// Returns true if no field is constrained.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Iterates constraints in order.
    pub fn iter(&self) -> impl Iterator<Item = (&Name, &Term)> {
        self.fields.iter().map(|(n, t)| (n, t))
    }

    /// Every variable mentioned, in pattern order, including nested ones.
    #[must_use]
    pub fn variables(&self) -> Vec<Variable> {
        let mut out = Vec::new();
        self.variables_into(&mut out);
        out
    }

    fn variables_into(&self, out: &mut Vec<Variable>) {
        for (_, term) in &self.fields {
            term.variables_into(out);
        }
    }
}

impl<N: Into<Name>, T: Into<Term>> FromIterator<(N, T)> for FieldPattern {
    fn from_iter<I: IntoIterator<Item = (N, T)>>(iter: I) -> Self {
        Self {
            fields: iter
                .into_iter()
                .map(|(n, t)| (n.into(), t.into()))
                .collect(),
        }
    }
}

impl fmt::Debug for FieldPattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{{")?;
        for (i, (name, term)) in self.fields.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{name}: {term:?}")?;
        }
        write!(f, "}}")
    }
}

// =============================================================================
// Unification
// =============================================================================

/// Unifies a pattern with a record's fields under an existing frame.
///
/// Returns the extended frame, or `None` when a literal differs, a variable
/// conflicts with its binding (including a variable repeated within the
/// pattern), a nested pattern meets a non-record, or a named field is absent.
/// The input frame is never modified.
#[must_use]
pub fn unify(pattern: &FieldPattern, fields: &Fields, frame: &Frame) -> Option<Frame> {
    let mut current = frame.clone();
    for (name, term) in &pattern.fields {
        let value = fields.get(name)?;
        current = unify_term(term, value, current)?;
    }
    Some(current)
}

fn unify_term(term: &Term, value: &Value, frame: Frame) -> Option<Frame> {
    match term {
        Term::Literal(expected) => (expected == value).then_some(frame),
        Term::Wildcard => Some(frame),
        Term::Var(variable) => frame.extend(variable, value),
        Term::Record(pattern) => unify(pattern, value.as_record()?, &frame),
    }
}

// =============================================================================
// Action Patterns
// =============================================================================

/// Which outcomes a clause accepts, and the pattern for their outputs.
#[derive(Clone, Debug, PartialEq)]
pub enum OutputMatch {
    /// Successful completions only.
    Success(FieldPattern),
    /// Failed completions only.
    Failure(FieldPattern),
    /// Either outcome.
    Either(FieldPattern),
}

impl OutputMatch {
    /// Returns the output pattern.
    #[must_use]
    pub fn pattern(&self) -> &FieldPattern {
        match self {
            Self::Success(p) | Self::Failure(p) | Self::Either(p) => p,
        }
    }

    fn pattern_mut(&mut self) -> &mut FieldPattern {
        match self {
            Self::Success(p) | Self::Failure(p) | Self::Either(p) => p,
        }
    }

    /// Returns the outputs to unify against if the outcome is accepted.
    fn accepts<'a>(&self, outcome: &'a Outcome) -> Option<&'a Fields> {
        match (self, outcome) {
            (Self::Success(_) | Self::Either(_), Outcome::Success(fields))
            | (Self::Failure(_) | Self::Either(_), Outcome::Failure(fields)) => Some(fields),
            _ => None,
        }
    }
}

impl Default for OutputMatch {
    fn default() -> Self {
        Self::Success(FieldPattern::new())
    }
}

/// A trigger clause: an action key with input and output patterns.
///
/// ```text
/// Sessioning.start { session: ?s } => { user: ?u }
/// ```
#[derive(Clone, Debug, PartialEq)]
pub struct ActionPattern {
    /// The action this clause matches.
    pub key: ActionKey,
    /// Constraints on the record's inputs.
    pub inputs: FieldPattern,
    /// Accepted outcome and constraints on its outputs.
    pub outputs: OutputMatch,
}

impl ActionPattern {
    /// Creates a clause matching any successful completion of an action.
    pub fn new(concept: impl Into<Name>, action: impl Into<Name>) -> Self {
        Self {
            key: ActionKey::new(concept, action),
            inputs: FieldPattern::new(),
            outputs: OutputMatch::default(),
        }
    }

    /// Constrains an input field.
    #[must_use]
    pub fn input(mut self, name: impl Into<Name>, term: impl Into<Term>) -> Self {
        self.inputs.push(name, term);
        self
    }

    /// Constrains an output field.
    #[must_use]
    pub fn output(mut self, name: impl Into<Name>, term: impl Into<Term>) -> Self {
        self.outputs.pattern_mut().push(name, term);
        self
    }

    /// Matches failed completions instead of successful ones.
    #[must_use]
    pub fn failed(mut self) -> Self {
        let pattern = std::mem::take(self.outputs.pattern_mut());
        self.outputs = OutputMatch::Failure(pattern);
        self
    }

    /// Matches completions regardless of outcome.
    #[must_use]
    pub fn either(mut self) -> Self {
        let pattern = std::mem::take(self.outputs.pattern_mut());
        self.outputs = OutputMatch::Either(pattern);
        self
    }

    /// Every variable mentioned by inputs and outputs, in pattern order.
    #[must_use]
    pub fn variables(&self) -> Vec<Variable> {
        let mut out = self.inputs.variables();
        out.extend(self.outputs.pattern().variables());
        out
    }

    /// Unifies a record with this clause under an existing frame.
    #[must_use]
    pub fn match_record(&self, record: &ActionRecord, frame: &Frame) -> Option<Frame> {
        if record.key != self.key {
            return None;
        }
        let outputs = self.outputs.accepts(&record.outcome)?;
        let frame = unify(&self.inputs, &record.inputs, frame)?;
        unify(self.outputs.pattern(), outputs, &frame)
    }
}
