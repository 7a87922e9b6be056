//! The scheduler: append, match, refine, dispatch, repeat until settled.
//!
//! Every append runs a pass. The pass is breadth first by generation: the
//! appended record is generation 0, completions of invocations it caused
//! are generation 1, and so on. Within a generation:
//!
//! 1. each record is joined against the rules that mention its action,
//!    skipping record combinations a rule has already seen;
//! 2. activations are refined concurrently;
//! 3. surviving frames are resolved into invocations, which run
//!    concurrently;
//! 4. completions are appended in dispatch order, so sequence numbers do
//!    not depend on which invocation finished first.
//!
//! Appends are serialized: one pass holds the engine state until it
//! settles, and rules only ever see records up to the one being processed.
//! Rule states live outside that lock so they can be read mid-pass.

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use futures::{StreamExt, stream};
use syncline_foundation::{Error, Fields, Name, Result, SemanticLimit};
use syncline_log::{ActionKey, ActionLog, ActionRecord, Origin, RecordDraft, Seq};
use tokio::sync::Mutex;
use tracing::{debug, info, instrument};

use crate::concept::{Concept, ConceptRegistry};
use crate::config::EngineConfig;
use crate::dispatch::{Dispatcher, Invocation, run_action};
use crate::frame::{Frame, FrameSet};
use crate::join::{Refraction, join};
use crate::provenance::{Derivation, ProvenanceTracker, ProvenanceVerbosity};
use crate::refine::{Fault, RefineContext, Refined};
use crate::rule::{Rule, RuleId, RuleRegistry, RuleState};

// =============================================================================
// Pass Report
// =============================================================================

/// What one pass did.
#[derive(Debug, Default)]
pub struct PassReport {
    /// Records appended, starting with the one that began the pass.
    pub appended: Vec<Arc<ActionRecord>>,
    /// Rule activations (new record combinations) evaluated.
    pub activations: usize,
    /// Invocations dispatched, in dispatch order.
    pub dispatched: Vec<Invocation>,
    /// Per-frame faults; none of them stopped the pass.
    pub faults: Vec<Fault>,
    /// Generations processed, including the root's.
    pub generations: u32,
}

impl PassReport {
    /// The record that began the pass.
    #[must_use]
    pub fn root(&self) -> Option<&Arc<ActionRecord>> {
        self.appended.first()
    }

    /// Records appended by rule dispatch.
    #[must_use]
    pub fn derived(&self) -> &[Arc<ActionRecord>] {
        self.appended.get(1..).unwrap_or_default()
    }

    /// Number of invocations dispatched to an action.
    #[must_use]
    pub fn dispatched_to(&self, key: &ActionKey) -> usize {
        self.dispatched.iter().filter(|i| &i.key == key).count()
    }

    /// Returns true if no fault was recorded.
    #[must_use]
    pub fn is_clean(&self) -> bool {
        self.faults.is_empty()
    }
}

// =============================================================================
// Engine State
// =============================================================================

#[derive(Debug)]
struct EngineState {
    log: ActionLog,
    refraction: HashMap<RuleId, Refraction>,
    provenance: ProvenanceTracker,
}

struct Activation {
    rule: Arc<Rule>,
    records: Vec<Seq>,
    frame: Frame,
}

// =============================================================================
// Engine
// =============================================================================

/// The synchronization engine.
///
/// Share it behind an `Arc`; every method takes `&self`.
#[derive(Debug)]
pub struct Engine {
    rules: RuleRegistry,
    concepts: ConceptRegistry,
    config: EngineConfig,
    evaluating: Vec<AtomicBool>,
    state: Mutex<EngineState>,
}

impl Engine {
    /// Starts building an engine.
    pub fn builder() -> EngineBuilder {
        EngineBuilder::new()
    }

    /// Registered rules.
    #[must_use]
    pub fn rules(&self) -> &RuleRegistry {
        &self.rules
    }

    /// Registered concepts.
    #[must_use]
    pub fn concepts(&self) -> &ConceptRegistry {
        &self.concepts
    }

    /// The engine's configuration.
    #[must_use]
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Runs an action in a new flow, appends its completion, and settles.
    ///
    /// Concept errors and timeouts are recorded as failure outcomes.
    ///
    /// # Errors
    ///
    /// Returns `LimitExceeded` if the cascade trips a kill switch. Records
    /// appended before the limit was hit stay in the log.
    pub async fn invoke(&self, key: ActionKey, inputs: Fields) -> Result<PassReport> {
        let outcome = run_action(&key, inputs.clone(), &self.concepts, &self.config).await;
        self.record(RecordDraft::new(key, inputs, outcome)).await
    }

    /// Appends an externally completed record and settles.
    ///
    /// # Errors
    ///
    /// Returns `LimitExceeded` if the cascade trips a kill switch.
    pub async fn record(&self, draft: RecordDraft) -> Result<PassReport> {
        let mut state = self.state.lock().await;
        let (log, record) = state.log.append(draft);
        state.log = log;
        let result = self.settle(&mut state, record).await;
        self.idle_all();
        result
    }

    /// Re-appends the external records of another log, in order.
    ///
    /// Rule-produced records are skipped: replaying their causes
    /// regenerates them.
    ///
    /// # Errors
    ///
    /// Stops at the first pass that trips a kill switch.
    pub async fn replay(
        &self,
        records: impl IntoIterator<Item = RecordDraft>,
    ) -> Result<Vec<PassReport>> {
        let mut reports = Vec::new();
        for draft in records {
            if draft.origin == Origin::External {
                reports.push(self.record(draft).await?);
            }
        }
        Ok(reports)
    }

    /// A snapshot of the action log.
    pub async fn log(&self) -> ActionLog {
        self.state.lock().await.log.clone()
    }

    /// A snapshot of provenance.
    pub async fn provenance(&self) -> ProvenanceTracker {
        self.state.lock().await.provenance.clone()
    }

    /// Why a rule-produced record exists.
    pub async fn why(&self, seq: Seq) -> Option<Derivation> {
        self.state.lock().await.provenance.why(seq).cloned()
    }

    /// Each rule's evaluation state, in registration order.
    ///
    /// Does not wait for a running pass. A rule is `Evaluating` from the
    /// moment a record of the current generation triggers it until the
    /// next generation starts or the pass ends.
    #[must_use]
    pub fn rule_states(&self) -> Vec<(Name, RuleState)> {
        self.rules
            .iter()
            .map(|(id, rule)| {
                let evaluating = self
                    .evaluating
                    .get(id.index())
                    .is_some_and(|e| e.load(Ordering::Acquire));
                let s = if evaluating {
                    RuleState::Evaluating
                } else {
                    RuleState::Idle
                };
                (rule.name().clone(), s)
            })
            .collect()
    }

    fn idle_all(&self) {
        for e in &self.evaluating {
            e.store(false, Ordering::Release);
        }
    }

    #[instrument(skip_all, fields(root = %root.seq, key = %root.key))]
    async fn settle(&self, state: &mut EngineState, root: Arc<ActionRecord>) -> Result<PassReport> {
        let mut report = PassReport::default();
        report.appended.push(Arc::clone(&root));
        let mut queue = VecDeque::from([root]);
        let mut generation = 0u32;

        while !queue.is_empty() {
            self.idle_all();
            report.generations += 1;
            let batch: Vec<_> = queue.drain(..).collect();

            let activations = self.activate(state, &batch);
            report.activations += activations.len();

            let refined = self.refine_all(&activations).await;

            let next_generation = generation + 1;
            let mut invocations = Vec::new();
            for (activation, refined) in activations.iter().zip(refined) {
                report.faults.extend(refined.faults);
                if refined.frames.is_empty() {
                    debug!(rule = %activation.rule.name(), "activation refined to no frames");
                    continue;
                }
                let (resolved, faults) = Dispatcher::resolve(
                    &activation.rule,
                    &activation.records,
                    &refined.frames,
                    next_generation,
                );
                report.faults.extend(faults);
                invocations.extend(resolved);
            }

            if invocations.is_empty() {
                break;
            }
            self.check_limits(&report, &invocations, next_generation)?;

            let drafts: Vec<RecordDraft> = stream::iter(
                invocations
                    .iter()
                    .map(|inv| Dispatcher::execute(inv, &self.concepts, &self.config)),
            )
            .buffered(self.config.action_concurrency.max(1))
            .collect()
            .await;

            for (invocation, draft) in invocations.into_iter().zip(drafts) {
                let (log, record) = state.log.append(draft);
                state.log = log;
                if let Origin::Rule {
                    rule,
                    triggers,
                    generation,
                } = &record.origin
                {
                    let mut derivation = Derivation::new(rule.clone(), triggers.clone(), *generation);
                    if state.provenance.verbosity() == ProvenanceVerbosity::Standard {
                        derivation = derivation.with_bindings(invocation.frame.snapshot());
                    }
                    state.provenance.record(record.seq, derivation);
                }
                debug!(seq = %record.seq, key = %record.key, ok = record.succeeded(), "appended completion");
                report.appended.push(Arc::clone(&record));
                report.dispatched.push(invocation);
                queue.push_back(record);
            }
            generation = next_generation;
        }

        info!(
            appended = report.appended.len(),
            activations = report.activations,
            dispatched = report.dispatched.len(),
            faults = report.faults.len(),
            generations = report.generations,
            "pass settled"
        );
        Ok(report)
    }

    /// Joins every record of a generation against the rules it triggers.
    fn activate(&self, state: &mut EngineState, batch: &[Arc<ActionRecord>]) -> Vec<Activation> {
        let mut activations = Vec::new();
        for record in batch {
            for &id in self.rules.rules_for(&record.key) {
                let Some(rule) = self.rules.get(id) else {
                    continue;
                };
                if let Some(e) = self.evaluating.get(id.index()) {
                    e.store(true, Ordering::Release);
                }
                let matches = join(rule.triggers(), rule.scope(), &state.log, record);
                let refraction = state.refraction.entry(id).or_default();
                for m in matches {
                    if refraction.insert(&m.records) {
                        debug!(rule = %rule.name(), records = ?m.records, "activation");
                        activations.push(Activation {
                            rule: Arc::clone(rule),
                            records: m.records,
                            frame: m.frame,
                        });
                    }
                }
            }
        }
        activations
    }

    async fn refine_all(&self, activations: &[Activation]) -> Vec<Refined> {
        stream::iter(activations.iter().map(|activation| async move {
            let ctx = RefineContext {
                concepts: &self.concepts,
                config: &self.config,
                rule: activation.rule.name(),
            };
            activation
                .rule
                .pipeline()
                .run(FrameSet::single(activation.frame.clone()), &ctx)
                .await
        }))
        .buffered(self.config.activation_concurrency.max(1))
        .collect()
        .await
    }

    fn check_limits(
        &self,
        report: &PassReport,
        invocations: &[Invocation],
        next_generation: u32,
    ) -> Result<()> {
        if next_generation > self.config.max_generation_depth {
            return Err(Error::limit_exceeded(SemanticLimit::MaxGenerationDepth {
                limit: self.config.max_generation_depth,
                rule: invocations
                    .first()
                    .and_then(Invocation::rule)
                    .map(ToString::to_string),
            }));
        }
        if report.dispatched.len() + invocations.len() > self.config.max_dispatches_per_pass {
            return Err(Error::limit_exceeded(SemanticLimit::MaxDispatches {
                limit: self.config.max_dispatches_per_pass,
            }));
        }
        Ok(())
    }
}

// =============================================================================
// Engine Builder
// =============================================================================

/// Builds an [`Engine`] from concepts, rules, and configuration.
#[must_use]
pub struct EngineBuilder {
    concepts: Vec<Arc<dyn Concept>>,
    rules: Vec<Rule>,
    config: EngineConfig,
}

impl Default for EngineBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl EngineBuilder {
    /// Creates an empty builder with the default configuration.
    pub fn new() -> Self {
        Self {
            concepts: Vec::new(),
            rules: Vec::new(),
            config: EngineConfig::default(),
        }
    }

    /// Sets the configuration.
    pub fn config(mut self, config: EngineConfig) -> Self {
        self.config = config;
        self
    }

    /// Adds a concept.
    pub fn concept(mut self, concept: impl Concept + 'static) -> Self {
        self.concepts.push(Arc::new(concept));
        self
    }

    /// Adds a shared concept.
    pub fn concept_shared(mut self, concept: Arc<dyn Concept>) -> Self {
        self.concepts.push(concept);
        self
    }

    /// Adds a rule.
    pub fn rule(mut self, rule: Rule) -> Self {
        self.rules.push(rule);
        self
    }

    /// Registers everything and builds the engine.
    ///
    /// # Errors
    ///
    /// Returns `DuplicateConcept` or `DuplicateRule` on name clashes, and
    /// `UnknownConcept` (tagged with the rule) when a rule mentions a
    /// concept that was not added.
    pub fn build(self) -> Result<Engine> {
        let mut concepts = ConceptRegistry::new();
        for concept in self.concepts {
            concepts.register_shared(concept)?;
        }

        let mut rules = RuleRegistry::new();
        for rule in self.rules {
            if let Some(missing) = rule.concepts().into_iter().find(|c| !concepts.contains(c)) {
                return Err(Error::unknown_concept(missing).in_rule(rule.name().to_string()));
            }
            rules.register(rule)?;
        }

        let state = EngineState {
            log: ActionLog::new(),
            refraction: HashMap::new(),
            provenance: ProvenanceTracker::with_verbosity(self.config.provenance),
        };

        Ok(Engine {
            evaluating: (0..rules.len()).map(|_| AtomicBool::new(false)).collect(),
            rules,
            concepts,
            config: self.config,
            state: Mutex::new(state),
        })
    }
}
