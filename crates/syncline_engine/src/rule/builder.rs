//! Rule builder - assembles and checks rules before registration.
//!
//! Checking walks the rule in evaluation order, tracking which variables
//! are bound after each step:
//!
//! - trigger clauses bind every variable in their patterns;
//! - a query must only read bound variables and binds its output variables
//!   (plus its fallback variable, if any, which must not be bound before
//!   the query);
//! - a filter must only read bound variables;
//! - a map must only read bound variables and must bind a fresh one;
//! - a collect must collect bound variables into a fresh one, after which
//!   the collected variables are no longer bound;
//! - a gather checks its nested pipeline against the outer bindings and
//!   adds only its list variable;
//! - output clauses must only read bound variables.

use std::collections::BTreeSet;

use syncline_foundation::{Error, Name, Result, Value};

use crate::frame::{Frame, Variable};
use crate::join::Scope;
use crate::pattern::ActionPattern;
use crate::refine::{OnEmpty, Pipeline, Query, Refinement, Stage};

use super::{OutputClause, Rule};

/// Builds a [`Rule`].
#[derive(Clone, Debug)]
#[must_use]
pub struct RuleBuilder {
    name: Name,
    triggers: Vec<ActionPattern>,
    pipeline: Pipeline,
    outputs: Vec<OutputClause>,
    scope: Scope,
}

impl RuleBuilder {
    /// Starts a rule with the given name.
    pub fn new(name: impl Into<Name>) -> Self {
        Self {
            name: name.into(),
            triggers: Vec::new(),
            pipeline: Pipeline::new(),
            outputs: Vec::new(),
            scope: Scope::Global,
        }
    }

    /// Adds a trigger clause.
    pub fn when(mut self, clause: ActionPattern) -> Self {
        self.triggers.push(clause);
        self
    }

    /// Adds a query stage.
    pub fn query(mut self, query: Query) -> Self {
        self.pipeline = self.pipeline.query(query);
        self
    }

    /// Adds a filter stage.
    pub fn filter(
        mut self,
        reads: &[&str],
        predicate: impl Fn(&Frame) -> bool + Send + Sync + 'static,
    ) -> Self {
        self.pipeline = self.pipeline.filter(reads, predicate);
        self
    }

    /// Adds a map stage binding `target`.
    pub fn map(
        mut self,
        target: &str,
        reads: &[&str],
        derive: impl Fn(&Frame) -> Value + Send + Sync + 'static,
    ) -> Self {
        self.pipeline = self.pipeline.map(target, reads, derive);
        self
    }

    /// Adds a collect stage.
    pub fn collect(mut self, collected: &[&str], into: &str) -> Self {
        self.pipeline = self.pipeline.collect(collected, into);
        self
    }

    /// Adds a gather stage running `stages` per frame.
    pub fn gather(mut self, stages: Pipeline, collected: &[&str], into: &str) -> Self {
        self.pipeline = self.pipeline.gather(stages, collected, into);
        self
    }

    /// Adds a user-supplied stage.
    pub fn refine(mut self, refinement: impl Refinement + 'static) -> Self {
        self.pipeline = self.pipeline.refine(refinement);
        self
    }

    /// Adds an output clause.
    pub fn then(mut self, clause: OutputClause) -> Self {
        self.outputs.push(clause);
        self
    }

    /// Restricts joins to records in the trigger's flow.
    pub fn scoped_to_flow(mut self) -> Self {
        self.scope = Scope::Flow;
        self
    }

    /// Checks and builds the rule.
    ///
    /// # Errors
    ///
    /// Returns `MalformedRule` when the rule has no trigger or output
    /// clauses, reads a variable before any step binds it, or rebinds a
    /// variable through a map, collect, gather, or query fallback.
    pub fn build(self) -> Result<Rule> {
        let rule = Rule {
            name: self.name,
            triggers: self.triggers,
            pipeline: self.pipeline,
            outputs: self.outputs,
            scope: self.scope,
        };
        check(&rule)?;
        Ok(rule)
    }
}

type Bound = BTreeSet<Variable>;

fn check(rule: &Rule) -> Result<()> {
    let malformed = |message: String| Error::malformed_rule(rule.name.to_string(), message);

    if rule.triggers.is_empty() {
        return Err(malformed("no trigger clauses".to_string()));
    }
    if rule.outputs.is_empty() {
        return Err(malformed("no output clauses".to_string()));
    }

    let mut bound: Bound = rule
        .triggers
        .iter()
        .flat_map(ActionPattern::variables)
        .collect();

    check_pipeline(&rule.pipeline, &mut bound).map_err(malformed)?;

    for clause in &rule.outputs {
        let mut reads = Vec::new();
        for (_, expr) in &clause.inputs {
            expr.variables_into(&mut reads);
        }
        require_bound(&bound, &reads, &format!("output {}", clause.key)).map_err(malformed)?;
    }
    Ok(())
}

fn check_pipeline(pipeline: &Pipeline, bound: &mut Bound) -> std::result::Result<(), String> {
    for stage in pipeline.stages() {
        let label = stage.label();
        match stage {
            Stage::Query(q) => {
                let mut reads = Vec::new();
                for (_, expr) in &q.inputs {
                    expr.variables_into(&mut reads);
                }
                require_bound(bound, &reads, &label)?;
                // The fallback may share a name with this query's outputs,
                // but not with anything bound before the query.
                if let OnEmpty::Bind(variable, _) = &q.on_empty {
                    require_fresh(bound, variable, &label)?;
                }
                bound.extend(q.outputs.variables());
                if let OnEmpty::Bind(variable, _) = &q.on_empty {
                    bound.insert(variable.clone());
                }
            }
            Stage::Filter { reads, .. } => require_bound(bound, reads, &label)?,
            Stage::Map { target, reads, .. } => {
                require_bound(bound, reads, &label)?;
                require_fresh(bound, target, &label)?;
                bound.insert(target.clone());
            }
            Stage::Collect { collected, into } => {
                require_bound(bound, collected, &label)?;
                require_fresh(bound, into, &label)?;
                for variable in collected {
                    bound.remove(variable);
                }
                bound.insert(into.clone());
            }
            Stage::Gather {
                stages,
                collected,
                into,
            } => {
                let mut inner = bound.clone();
                check_pipeline(stages, &mut inner)?;
                require_bound(&inner, collected, &label)?;
                require_fresh(bound, into, &label)?;
                bound.insert(into.clone());
            }
            Stage::Custom(refinement) => {
                require_bound(bound, &refinement.reads(), &label)?;
                for variable in refinement.binds() {
                    require_fresh(bound, &variable, &label)?;
                    bound.insert(variable);
                }
            }
        }
    }
    Ok(())
}

fn require_bound(
    bound: &Bound,
    reads: &[Variable],
    step: &str,
) -> std::result::Result<(), String> {
    match reads.iter().find(|v| !bound.contains(*v)) {
        Some(variable) => Err(format!("{step} reads unbound {variable}")),
        None => Ok(()),
    }
}

fn require_fresh(
    bound: &Bound,
    variable: &Variable,
    step: &str,
) -> std::result::Result<(), String> {
    if bound.contains(variable) {
        Err(format!("{step} rebinds {variable}"))
    } else {
        Ok(())
    }
}
