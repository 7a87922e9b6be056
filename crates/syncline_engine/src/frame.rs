//! Frames: immutable variable bindings carried through a rule activation.
//!
//! A frame maps variables to values and remembers the flow it descends from.
//! Every operation that adds a binding returns a new frame; the original is
//! never touched, so a frame can fan out into many refinements without any
//! of them observing the others.

use std::borrow::Borrow;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use syncline_foundation::{Error, Name, Result, SlMap, Value};
use syncline_log::FlowId;

// =============================================================================
// Variable
// =============================================================================

/// A named placeholder bound by unification, queries, or derivations.
///
/// Displayed as `?name`.
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Variable(Name);

impl Variable {
    /// Creates a variable.
    pub fn new(name: impl Into<Name>) -> Self {
        Self(name.into())
    }

    /// Returns the variable's name without the `?` sigil.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.0
    }
}

/// Shorthand for [`Variable::new`].
pub fn var(name: impl Into<Name>) -> Variable {
    Variable::new(name)
}

impl Borrow<str> for Variable {
    fn borrow(&self) -> &str {
        &self.0
    }
}

impl From<&str> for Variable {
    fn from(name: &str) -> Self {
        Self::new(name)
    }
}

impl From<Arc<str>> for Variable {
    fn from(name: Arc<str>) -> Self {
        Self(name)
    }
}

impl fmt::Debug for Variable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "?{}", self.0)
    }
}

impl fmt::Display for Variable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "?{}", self.0)
    }
}

// =============================================================================
// Frame
// =============================================================================

/// Variable bindings plus the flow they were derived from.
///
/// Clone is O(1). Once a variable is bound in a frame, no frame derived from
/// it holds a different value for that variable.
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct Frame {
    bindings: SlMap<Variable, Value>,
    lineage: FlowId,
}

impl Frame {
    /// Creates an empty frame tagged with a flow.
    #[must_use]
    pub fn new(lineage: FlowId) -> Self {
        Self {
            bindings: SlMap::new(),
            lineage,
        }
    }

    /// Returns the flow this frame descends from.
    #[must_use]
    pub fn lineage(&self) -> FlowId {
        self.lineage
    }

    /// Returns the number of bound variables.
    #[must_use]
    pub fn len(&self) -> usize {
        self.bindings.len()
    }

    /// Returns true if nothing is bound.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.bindings.is_empty()
    }

    /// Gets the value bound to a variable.
    #[must_use]
    pub fn get<Q>(&self, variable: &Q) -> Option<&Value>
    where
        Q: Ord + ?Sized,
        Variable: Borrow<Q>,
    {
        self.bindings.get(variable)
    }

    /// Gets a bound value by name, failing with `UnboundVariable` otherwise.
    ///
    /// Intended for filter predicates and derivations, which only ever read
    /// variables the rule declared as inputs.
    pub fn value(&self, name: &str) -> Result<&Value> {
        self.bindings
            .get(name)
            .ok_or_else(|| Error::unbound_variable(name))
    }

    /// Returns true if the variable is bound.
    #[must_use]
    pub fn contains<Q>(&self, variable: &Q) -> bool
    where
        Q: Ord + ?Sized,
        Variable: Borrow<Q>,
    {
        self.bindings.contains_key(variable)
    }

    /// Iterates bindings in variable order.
    pub fn iter(&self) -> impl Iterator<Item = (&Variable, &Value)> {
        self.bindings.iter()
    }

    /// Iterates bound variables in order.
    pub fn variables(&self) -> impl Iterator<Item = &Variable> {
        self.bindings.keys()
    }

    /// Unifies a variable with a value.
    ///
    /// Returns a frame with the binding added when the variable is free, the
    /// same frame when it is already bound to an equal value, and `None` on
    /// a conflicting binding.
    #[must_use]
    pub fn extend(&self, variable: &Variable, value: &Value) -> Option<Frame> {
        match self.bindings.get(variable) {
            Some(existing) if existing == value => Some(self.clone()),
            Some(_) => None,
            None => Some(Self {
                bindings: self.bindings.insert(variable.clone(), value.clone()),
                lineage: self.lineage,
            }),
        }
    }

    /// Binds a fresh variable.
    ///
    /// # Errors
    ///
    /// Returns `Rebinding` if the variable is already bound, even to an equal
    /// value: derivations and aggregates introduce new names only.
    pub fn bind(&self, variable: Variable, value: Value) -> Result<Frame> {
        if self.bindings.contains_key(&variable) {
            return Err(Error::rebinding(variable.name()));
        }
        Ok(Self {
            bindings: self.bindings.insert(variable, value),
            lineage: self.lineage,
        })
    }

    /// Returns a frame without the given variables.
    #[must_use]
    pub fn without(&self, variables: &[Variable]) -> Frame {
        let mut bindings = self.bindings.clone();
        for variable in variables {
            bindings = bindings.remove(variable);
        }
        Self {
            bindings,
            lineage: self.lineage,
        }
    }

    /// Returns a frame holding only the given variables.
    #[must_use]
    pub fn project(&self, variables: &[Variable]) -> Frame {
        let bindings = variables
            .iter()
            .filter_map(|v| self.bindings.get(v).map(|value| (v.clone(), value.clone())))
            .collect();
        Self {
            bindings,
            lineage: self.lineage,
        }
    }

    /// The value a collect or gather step takes from this frame: the
    /// variable's value for a single variable, a record keyed by variable
    /// name for several. Unbound variables contribute `nil`.
    #[must_use]
    pub fn collected_item(&self, collected: &[Variable]) -> Value {
        match collected {
            [single] => self.get(single).cloned().unwrap_or(Value::Nil),
            _ => Value::record(
                collected
                    .iter()
                    .map(|v| (v.name(), self.get(v).cloned().unwrap_or(Value::Nil))),
            ),
        }
    }

    /// Bindings as owned `(name, value)` pairs, e.g. for provenance snapshots.
    #[must_use]
    pub fn snapshot(&self) -> Vec<(String, Value)> {
        self.iter()
            .map(|(v, value)| (v.name().to_string(), value.clone()))
            .collect()
    }
}

impl fmt::Debug for Frame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{{")?;
        for (i, (variable, value)) in self.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{variable}: {value}")?;
        }
        write!(f, "}} @{}", self.lineage)
    }
}

// =============================================================================
// FrameSet
// =============================================================================

/// An ordered collection of frames.
///
/// Order is the order frames were produced in and is preserved by every
/// refinement stage. An empty set is a valid, silent result.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct FrameSet(Vec<Frame>);

impl FrameSet {
    /// Creates an empty set.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a set holding one frame.
    #[must_use]
    pub fn single(frame: Frame) -> Self {
        Self(vec![frame])
    }

    /// Returns the number of frames.
    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Returns true if the set holds no frames.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Iterates frames in order.
    pub fn iter(&self) -> std::slice::Iter<'_, Frame> {
        self.0.iter()
    }

    /// Appends a frame.
    pub fn push(&mut self, frame: Frame) {
        self.0.push(frame);
    }

    /// Keeps only the frames satisfying the predicate.
    #[must_use]
    pub fn filter(mut self, mut predicate: impl FnMut(&Frame) -> bool) -> Self {
        self.0.retain(|frame| predicate(frame));
        self
    }

    /// Transforms every frame in order.
    #[must_use]
    pub fn map(self, f: impl FnMut(Frame) -> Frame) -> Self {
        Self(self.0.into_iter().map(f).collect())
    }

    /// Groups frames by everything except `collected` and gathers the
    /// collected values of each group into a list bound to `into`.
    ///
    /// Groups appear in the order their first member was encountered; list
    /// items keep encounter order. A single collected variable contributes
    /// its value directly, several contribute a record keyed by variable
    /// name. An empty input produces an empty output.
    ///
    /// # Errors
    ///
    /// Returns `Rebinding` if a group key already binds `into`.
    pub fn collect(&self, collected: &[Variable], into: &Variable) -> Result<FrameSet> {
        let mut groups: Vec<(Frame, Vec<Value>)> = Vec::new();
        let mut index: HashMap<Frame, usize> = HashMap::new();

        for frame in &self.0 {
            let item = frame.collected_item(collected);
            let key = frame.without(collected);
            let slot = *index.entry(key.clone()).or_insert_with(|| {
                groups.push((key, Vec::new()));
                groups.len() - 1
            });
            groups[slot].1.push(item);
        }

        groups
            .into_iter()
            .map(|(key, items)| key.bind(into.clone(), Value::from(items)))
            .collect()
    }

    /// Consumes the set, returning its frames.
    #[must_use]
    pub fn into_vec(self) -> Vec<Frame> {
        self.0
    }
}

impl From<Vec<Frame>> for FrameSet {
    fn from(frames: Vec<Frame>) -> Self {
        Self(frames)
    }
}

impl FromIterator<Frame> for FrameSet {
    fn from_iter<I: IntoIterator<Item = Frame>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

impl IntoIterator for FrameSet {
    type Item = Frame;
    type IntoIter = std::vec::IntoIter<Frame>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.into_iter()
    }
}

impl<'a> IntoIterator for &'a FrameSet {
    type Item = &'a Frame;
    type IntoIter = std::slice::Iter<'a, Frame>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}
