//! Dispatch: turning refined frames into concept invocations.
//!
//! Every output clause is resolved against every surviving frame, giving
//! one invocation per (frame, clause) pair in frame-then-clause order.
//! Invocations carry the frame's lineage as their flow and the activation's
//! trigger records as their origin. Running an invocation always yields a
//! record draft: concept errors and timeouts become failure outcomes.

use syncline_foundation::{Fields, Name};
use syncline_log::{ActionKey, FlowId, Origin, Outcome, RecordDraft, Seq};
use tracing::{debug, warn};

use crate::concept::ConceptRegistry;
use crate::config::EngineConfig;
use crate::expr::resolve_fields;
use crate::frame::{Frame, FrameSet};
use crate::refine::Fault;
use crate::rule::Rule;

/// A resolved call to a concept action.
#[derive(Clone, Debug, PartialEq)]
pub struct Invocation {
    /// The action to invoke.
    pub key: ActionKey,
    /// Fully resolved inputs.
    pub inputs: Fields,
    /// Flow the completion is filed under.
    pub flow: FlowId,
    /// Rule, triggers, and generation of the completion.
    pub origin: Origin,
    /// Bindings the inputs were resolved from.
    pub frame: Frame,
}

impl Invocation {
    /// The rule that produced this invocation, if any.
    #[must_use]
    pub fn rule(&self) -> Option<&Name> {
        self.origin.rule()
    }
}

/// Resolves and runs invocations.
#[derive(Clone, Copy, Debug, Default)]
pub struct Dispatcher;

impl Dispatcher {
    /// Resolves every output clause of `rule` against every frame.
    ///
    /// A clause that cannot be resolved against a frame (an unbound
    /// variable) is reported as a fault for that frame only; the frame's
    /// other clauses and the other frames still dispatch.
    #[must_use]
    pub fn resolve(
        rule: &Rule,
        triggers: &[Seq],
        frames: &FrameSet,
        generation: u32,
    ) -> (Vec<Invocation>, Vec<Fault>) {
        let mut invocations = Vec::new();
        let mut faults = Vec::new();

        for frame in frames {
            for clause in rule.outputs() {
                match resolve_fields(&clause.inputs, frame) {
                    Ok(inputs) => invocations.push(Invocation {
                        key: clause.key.clone(),
                        inputs,
                        flow: frame.lineage(),
                        origin: Origin::Rule {
                            rule: rule.name().clone(),
                            triggers: triggers.to_vec(),
                            generation,
                        },
                        frame: frame.clone(),
                    }),
                    Err(e) => {
                        warn!(rule = %rule.name(), clause = %clause.key, error = %e, "unresolvable output");
                        faults.push(Fault::new(rule.name(), format!("output {}", clause.key), e));
                    }
                }
            }
        }

        (invocations, faults)
    }

    /// Runs an invocation, producing the draft of its completion record.
    ///
    /// Never fails: an unknown concept, an error from the concept, or a
    /// timeout is recorded as a failure outcome with an `error` field.
    pub async fn execute(
        invocation: &Invocation,
        concepts: &ConceptRegistry,
        config: &EngineConfig,
    ) -> RecordDraft {
        let outcome = run_action(
            &invocation.key,
            invocation.inputs.clone(),
            concepts,
            config,
        )
        .await;
        RecordDraft::new(invocation.key.clone(), invocation.inputs.clone(), outcome)
            .in_flow(invocation.flow)
            .with_origin(invocation.origin.clone())
    }
}

/// Invokes an action, folding every error into a failure outcome.
pub(crate) async fn run_action(
    key: &ActionKey,
    inputs: Fields,
    concepts: &ConceptRegistry,
    config: &EngineConfig,
) -> Outcome {
    let concept = match concepts.require(&key.concept) {
        Ok(concept) => concept,
        Err(e) => return Outcome::error(e.to_string()),
    };

    let call = concept.invoke(&key.action, inputs);
    let result = match config.action_timeout {
        Some(limit) => match tokio::time::timeout(limit, call).await {
            Ok(result) => result,
            Err(_) => {
                warn!(action = %key, ?limit, "action timed out");
                return Outcome::error(format!("{key} timed out after {limit:?}"));
            }
        },
        None => call.await,
    };

    match result {
        Ok(outcome) => {
            debug!(action = %key, success = outcome.is_success(), "action completed");
            outcome
        }
        Err(e) => {
            warn!(action = %key, error = %e, "action raised an error");
            Outcome::error(e.to_string())
        }
    }
}
