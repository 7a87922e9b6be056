//! Rules (synchronizations) and the rule registry.
//!
//! A rule reads as "when these actions have completed, where these
//! refinements hold, then invoke these actions":
//!
//! ```text
//! when   Requesting.request { path: "/items/delete", session: ?s, item: ?i }
//! where  Sessioning._getUser { session: ?s } => { user: ?u }
//!        Items._getOwner { item: ?i } => { owner: ?u }
//! then   Items.delete { item: ?i }
//! ```
//!
//! Rules are built and checked by [`RuleBuilder`], then registered once at
//! startup. There is no unregistration.

pub mod builder;

pub use builder::RuleBuilder;

use std::collections::{BTreeSet, HashMap};
use std::fmt;
use std::sync::Arc;

use syncline_foundation::{Error, ErrorKind, Name, Result};
use syncline_log::ActionKey;

use crate::expr::Expr;
use crate::join::Scope;
use crate::pattern::ActionPattern;
use crate::refine::{Pipeline, Stage};

// =============================================================================
// Output Clause
// =============================================================================

/// An action to invoke once per surviving frame.
#[derive(Clone, Debug, PartialEq)]
pub struct OutputClause {
    /// The action to invoke.
    pub key: ActionKey,
    /// Input fields, resolved against the frame.
    pub inputs: Vec<(Name, Expr)>,
}

impl OutputClause {
    /// Creates an output clause with no inputs.
    pub fn new(concept: impl Into<Name>, action: impl Into<Name>) -> Self {
        Self {
            key: ActionKey::new(concept, action),
            inputs: Vec::new(),
        }
    }

    /// Adds an input field.
    #[must_use]
    pub fn input(mut self, name: impl Into<Name>, expr: impl Into<Expr>) -> Self {
        self.inputs.push((name.into(), expr.into()));
        self
    }
}

// =============================================================================
// Rule
// =============================================================================

/// Identifier of a registered rule (its registration index).
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RuleId(u32);

impl RuleId {
    /// Returns the registration index.
    #[must_use]
    pub const fn index(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Display for RuleId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "rule#{}", self.0)
    }
}

/// Where a rule is in its evaluation cycle.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub enum RuleState {
    /// Waiting for a matching append.
    #[default]
    Idle,
    /// Being joined, refined, or dispatched for the current generation.
    Evaluating,
}

/// A validated rule.
#[derive(Clone, Debug)]
pub struct Rule {
    pub(crate) name: Name,
    pub(crate) triggers: Vec<ActionPattern>,
    pub(crate) pipeline: Pipeline,
    pub(crate) outputs: Vec<OutputClause>,
    pub(crate) scope: Scope,
}

impl Rule {
    /// Starts building a rule.
    pub fn builder(name: impl Into<Name>) -> RuleBuilder {
        RuleBuilder::new(name)
    }

    /// The rule's name.
    #[must_use]
    pub fn name(&self) -> &Name {
        &self.name
    }

    /// Trigger clauses, in declaration order.
    #[must_use]
    pub fn triggers(&self) -> &[ActionPattern] {
        &self.triggers
    }

    /// The refinement pipeline.
    #[must_use]
    pub fn pipeline(&self) -> &Pipeline {
        &self.pipeline
    }

    /// Output clauses, in declaration order.
    #[must_use]
    pub fn outputs(&self) -> &[OutputClause] {
        &self.outputs
    }

    /// Which records non-trigger clauses may join with.
    #[must_use]
    pub fn scope(&self) -> Scope {
        self.scope
    }

    /// Every concept the rule triggers on, queries, or invokes.
    #[must_use]
    pub fn concepts(&self) -> BTreeSet<&str> {
        let mut names = BTreeSet::new();
        for clause in &self.triggers {
            names.insert(&*clause.key.concept);
        }
        collect_query_concepts(&self.pipeline, &mut names);
        for clause in &self.outputs {
            names.insert(&*clause.key.concept);
        }
        names
    }
}

fn collect_query_concepts<'a>(pipeline: &'a Pipeline, names: &mut BTreeSet<&'a str>) {
    for stage in pipeline.stages() {
        match stage {
            Stage::Query(q) => {
                names.insert(&*q.concept);
            }
            Stage::Gather { stages, .. } => collect_query_concepts(stages, names),
            _ => {}
        }
    }
}

// =============================================================================
// Rule Registry
// =============================================================================

/// Registered rules, indexed by the actions that trigger them.
#[derive(Clone, Debug, Default)]
pub struct RuleRegistry {
    rules: Vec<Arc<Rule>>,
    by_name: HashMap<Name, RuleId>,
    by_trigger: HashMap<ActionKey, Vec<RuleId>>,
}

impl RuleRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a rule.
    ///
    /// # Errors
    ///
    /// Returns `DuplicateRule` if a rule with the same name exists.
    pub fn register(&mut self, rule: Rule) -> Result<RuleId> {
        if self.by_name.contains_key(&rule.name) {
            return Err(Error::new(ErrorKind::DuplicateRule(rule.name.to_string())));
        }
        let raw = u32::try_from(self.rules.len())
            .map_err(|_| Error::new(ErrorKind::Internal("too many rules".to_string())))?;
        let id = RuleId(raw);

        for clause in &rule.triggers {
            let ids = self.by_trigger.entry(clause.key.clone()).or_default();
            // A rule with two clauses on one action is indexed once.
            if ids.last() != Some(&id) {
                ids.push(id);
            }
        }
        self.by_name.insert(rule.name.clone(), id);
        self.rules.push(Arc::new(rule));
        Ok(id)
    }

    /// Gets a rule by id.
    #[must_use]
    pub fn get(&self, id: RuleId) -> Option<&Arc<Rule>> {
        self.rules.get(id.index())
    }

    /// Looks up a rule id by name.
    #[must_use]
    pub fn id_of(&self, name: &str) -> Option<RuleId> {
        self.by_name.get(name).copied()
    }

    /// Rules with a clause on `key`, in registration order.
    #[must_use]
    pub fn rules_for(&self, key: &ActionKey) -> &[RuleId] {
        self.by_trigger.get(key).map(Vec::as_slice).unwrap_or_default()
    }

    /// Iterates rules in registration order.
    #[allow(clippy::cast_possible_truncation)]
    pub fn iter(&self) -> impl Iterator<Item = (RuleId, &Arc<Rule>)> {
        self.rules
            .iter()
            .enumerate()
            .map(|(i, rule)| (RuleId(i as u32), rule))
    }

    /// Number of registered rules.
    #[must_use]
    pub fn len(&self) -> usize {
        self.rules.len()
    }

    /// Returns true if no rule is registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }
}
