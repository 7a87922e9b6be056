//! Frame refinement: the stages between trigger matching and dispatch.
//!
//! A rule's pipeline is an ordered list of stages, each mapping a frame set
//! to a frame set:
//!
//! - **Query** calls a concept query per frame and joins the result tuples
//!   back in. Zero tuples removes the frame; it is not an error.
//! - **Filter** keeps frames satisfying a predicate.
//! - **Map** binds a new variable to a value derived from the frame.
//! - **Collect** groups the whole set and gathers values into lists.
//! - **Gather** runs a nested pipeline per frame and collects its results
//!   into a list bound on that frame, empty when nothing matched.
//! - **Custom** hands the set to a user [`Refinement`].
//!
//! Frames are independent: a query fault drops the frame it happened in and
//! is reported as a [`Fault`]; sibling frames continue. Output order follows
//! input order even though queries run concurrently.

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use futures::future::BoxFuture;
use futures::{FutureExt, StreamExt, stream};
use syncline_foundation::{Error, Name, Result, SlVec, Value};
use tracing::{debug, warn};

use crate::concept::ConceptRegistry;
use crate::config::EngineConfig;
use crate::expr::{Expr, resolve_fields};
use crate::frame::{Frame, FrameSet, Variable};
use crate::pattern::{FieldPattern, Term, unify};

// =============================================================================
// Context & Results
// =============================================================================

/// What a stage can see while refining.
#[derive(Clone, Copy, Debug)]
pub struct RefineContext<'a> {
    /// Concepts available to query.
    pub concepts: &'a ConceptRegistry,
    /// Concurrency and timeout settings.
    pub config: &'a EngineConfig,
    /// The rule being refined, for fault attribution.
    pub rule: &'a str,
}

/// A per-frame failure that dropped a frame (or, for custom stages, a set).
#[derive(Debug)]
pub struct Fault {
    /// The rule whose activation faulted.
    pub rule: Name,
    /// The stage or step that faulted.
    pub stage: String,
    /// What went wrong.
    pub error: Error,
}

impl Fault {
    /// Creates a fault, attaching the rule and stage to the error context.
    #[must_use]
    pub fn new(rule: &str, stage: impl Into<String>, error: Error) -> Self {
        let stage = stage.into();
        let context = error
            .context
            .clone()
            .unwrap_or_default()
            .with_source(rule)
            .with_frame(stage.clone());
        Self {
            rule: rule.into(),
            stage,
            error: error.with_context(context),
        }
    }
}

impl fmt::Display for Fault {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} in {}: {}", self.rule, self.stage, self.error)
    }
}

/// The outcome of running a pipeline.
#[derive(Debug, Default)]
pub struct Refined {
    /// Surviving frames, in order.
    pub frames: FrameSet,
    /// Faults encountered along the way.
    pub faults: Vec<Fault>,
}

// =============================================================================
// Stages
// =============================================================================

/// What a query stage does when a frame gets no result tuples.
#[derive(Clone, Debug, Default, PartialEq)]
pub enum OnEmpty {
    /// Drop the frame silently.
    #[default]
    Drop,
    /// Keep the frame with a variable bound to a fallback value.
    Bind(Variable, Value),
}

/// A concept query joined into each frame.
///
/// ```text
/// Sessioning._getUser { session: ?s } => { user: ?u }
/// ```
#[derive(Clone, Debug)]
pub struct Query {
    /// Concept to query.
    pub concept: Name,
    /// Query name within the concept.
    pub query: Name,
    /// Input fields, resolved against each frame.
    pub inputs: Vec<(Name, Expr)>,
    /// Pattern each result tuple is unified with.
    pub outputs: FieldPattern,
    /// Behaviour on zero result tuples.
    pub on_empty: OnEmpty,
}

impl Query {
    /// Creates a query stage with no inputs or outputs.
    pub fn new(concept: impl Into<Name>, query: impl Into<Name>) -> Self {
        Self {
            concept: concept.into(),
            query: query.into(),
            inputs: Vec::new(),
            outputs: FieldPattern::new(),
            on_empty: OnEmpty::Drop,
        }
    }

    /// Adds an input field.
    #[must_use]
    pub fn input(mut self, name: impl Into<Name>, expr: impl Into<Expr>) -> Self {
        self.inputs.push((name.into(), expr.into()));
        self
    }

    /// Constrains an output field of each result tuple.
    #[must_use]
    pub fn output(mut self, name: impl Into<Name>, term: impl Into<Term>) -> Self {
        self.outputs.push(name, term);
        self
    }

    /// Keeps frames with no results, binding `variable` to `fallback`.
    #[must_use]
    pub fn or_bind(mut self, variable: impl Into<Variable>, fallback: impl Into<Value>) -> Self {
        self.on_empty = OnEmpty::Bind(variable.into(), fallback.into());
        self
    }

    fn label(&self) -> String {
        format!("query {}.{}", self.concept, self.query)
    }
}

/// A frame predicate.
pub type Predicate = Arc<dyn Fn(&Frame) -> bool + Send + Sync>;

/// A value derived from a frame. Derivations cannot fail.
pub type Derive = Arc<dyn Fn(&Frame) -> Value + Send + Sync>;

/// A user-supplied stage operating on a whole frame set.
///
/// Declares the variables it reads and binds so the rule can be checked
/// when it is built.
#[async_trait]
pub trait Refinement: Send + Sync {
    /// Name used in faults and traces.
    fn name(&self) -> &str;

    /// Variables this stage reads.
    fn reads(&self) -> Vec<Variable> {
        Vec::new()
    }

    /// Variables this stage adds to every surviving frame.
    fn binds(&self) -> Vec<Variable> {
        Vec::new()
    }

    /// Refines the frame set.
    ///
    /// Returning an error drops the whole set and records a fault.
    async fn refine(&self, frames: FrameSet, ctx: &RefineContext<'_>) -> Result<FrameSet>;
}

/// One step of a pipeline.
#[derive(Clone)]
pub enum Stage {
    /// Concept query joined per frame.
    Query(Query),
    /// Keep frames satisfying a predicate.
    Filter {
        /// Variables the predicate reads.
        reads: Vec<Variable>,
        /// The predicate.
        predicate: Predicate,
    },
    /// Bind a new variable to a derived value.
    ///
    /// Keeps every frame. The one exception is a target that is already
    /// bound, which [`RuleBuilder`](crate::RuleBuilder) rejects; an unchecked
    /// pipeline reports it as a fault and drops that frame.
    Map {
        /// The variable to bind.
        target: Variable,
        /// Variables the derivation reads.
        reads: Vec<Variable>,
        /// The derivation.
        derive: Derive,
    },
    /// Group the set and gather values into lists.
    Collect {
        /// Variables gathered into each list.
        collected: Vec<Variable>,
        /// The list variable.
        into: Variable,
    },
    /// Run a nested pipeline per frame and gather its results.
    Gather {
        /// The nested pipeline.
        stages: Pipeline,
        /// Variables gathered from each nested result.
        collected: Vec<Variable>,
        /// The list variable.
        into: Variable,
    },
    /// A user-supplied stage.
    Custom(Arc<dyn Refinement>),
}

impl Stage {
    /// Short description for traces and faults.
    #[must_use]
    pub fn label(&self) -> String {
        match self {
            Self::Query(q) => q.label(),
            Self::Filter { .. } => "filter".to_string(),
            Self::Map { target, .. } => format!("map {target}"),
            Self::Collect { into, .. } => format!("collect {into}"),
            Self::Gather { into, .. } => format!("gather {into}"),
            Self::Custom(r) => r.name().to_string(),
        }
    }

    async fn apply(
        &self,
        frames: FrameSet,
        ctx: &RefineContext<'_>,
        faults: &mut Vec<Fault>,
    ) -> FrameSet {
        match self {
            Self::Query(q) => apply_query(q, frames, ctx, faults).await,
            Self::Filter { predicate, .. } => frames.filter(|f| predicate(f)),
            Self::Map { target, derive, .. } => {
                let mut out = FrameSet::new();
                for frame in frames {
                    let value = derive(&frame);
                    match frame.bind(target.clone(), value) {
                        Ok(frame) => out.push(frame),
                        Err(e) => faults.push(fault(ctx, self.label(), e)),
                    }
                }
                out
            }
            Self::Collect { collected, into } => match frames.collect(collected, into) {
                Ok(out) => out,
                Err(e) => {
                    faults.push(fault(ctx, self.label(), e));
                    FrameSet::new()
                }
            },
            Self::Gather {
                stages,
                collected,
                into,
            } => apply_gather(stages, collected, into, frames, ctx, faults).await,
            Self::Custom(r) => match r.refine(frames, ctx).await {
                Ok(out) => out,
                Err(e) => {
                    faults.push(fault(ctx, self.label(), e));
                    FrameSet::new()
                }
            },
        }
    }
}

impl fmt::Debug for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Query(q) => write!(
                f,
                "{}.{} {:?} => {:?}",
                q.concept, q.query, q.inputs, q.outputs
            ),
            Self::Filter { reads, .. } => write!(f, "filter {reads:?}"),
            Self::Map { target, reads, .. } => write!(f, "map {reads:?} -> {target}"),
            Self::Collect { collected, into } => write!(f, "collect {collected:?} -> {into}"),
            Self::Gather {
                stages,
                collected,
                into,
            } => write!(f, "gather {stages:?} {collected:?} -> {into}"),
            Self::Custom(r) => write!(f, "custom {}", r.name()),
        }
    }
}

fn fault(ctx: &RefineContext<'_>, stage: String, error: Error) -> Fault {
    warn!(rule = ctx.rule, stage = %stage, error = %error, "refinement fault");
    Fault::new(ctx.rule, stage, error)
}

async fn apply_query(
    q: &Query,
    frames: FrameSet,
    ctx: &RefineContext<'_>,
    faults: &mut Vec<Fault>,
) -> FrameSet {
    let results: Vec<Result<Vec<Frame>>> = stream::iter(
        frames
            .into_iter()
            .map(|frame| query_frame(q, frame, ctx)),
    )
    .buffered(ctx.config.query_concurrency.max(1))
    .collect()
    .await;

    let mut out = FrameSet::new();
    for result in results {
        match result {
            Ok(frames) => {
                for frame in frames {
                    out.push(frame);
                }
            }
            Err(e) => faults.push(fault(ctx, q.label(), e)),
        }
    }
    out
}

async fn query_frame(q: &Query, frame: Frame, ctx: &RefineContext<'_>) -> Result<Vec<Frame>> {
    let inputs = resolve_fields(&q.inputs, &frame)?;
    let concept = ctx.concepts.require(&q.concept)?;
    let call = concept.query(&q.query, inputs);

    let tuples = match ctx.config.query_timeout {
        Some(limit) => tokio::time::timeout(limit, call)
            .await
            .map_err(|_| Error::timeout(q.label(), limit))??,
        None => call.await?,
    };

    let joined: Vec<Frame> = tuples
        .iter()
        .filter_map(|tuple| unify(&q.outputs, tuple, &frame))
        .collect();

    if joined.is_empty() {
        return match &q.on_empty {
            OnEmpty::Drop => {
                debug!(rule = ctx.rule, stage = %q.label(), "no results; frame dropped");
                Ok(Vec::new())
            }
            OnEmpty::Bind(variable, fallback) => {
                Ok(vec![frame.bind(variable.clone(), fallback.clone())?])
            }
        };
    }
    Ok(joined)
}

async fn apply_gather(
    stages: &Pipeline,
    collected: &[Variable],
    into: &Variable,
    frames: FrameSet,
    ctx: &RefineContext<'_>,
    faults: &mut Vec<Fault>,
) -> FrameSet {
    let results: Vec<(Frame, Refined)> = stream::iter(frames.into_iter().map(|frame| async move {
        let inner = stages.run(FrameSet::single(frame.clone()), ctx).await;
        (frame, inner)
    }))
    .buffered(ctx.config.query_concurrency.max(1))
    .collect()
    .await;

    let mut out = FrameSet::new();
    for (frame, inner) in results {
        // A faulted nested pipeline must not look like an empty result.
        if inner.frames.is_empty() && !inner.faults.is_empty() {
            faults.extend(inner.faults);
            continue;
        }
        faults.extend(inner.faults);
        let items: SlVec<Value> = inner
            .frames
            .iter()
            .map(|f| f.collected_item(collected))
            .collect();
        match frame.bind(into.clone(), Value::List(items)) {
            Ok(frame) => out.push(frame),
            Err(e) => faults.push(fault(ctx, format!("gather {into}"), e)),
        }
    }
    out
}

// =============================================================================
// Pipeline
// =============================================================================

/// An ordered list of refinement stages.
#[derive(Clone, Debug, Default)]
pub struct Pipeline {
    stages: Vec<Stage>,
}

impl Pipeline {
    /// Creates an empty pipeline, which passes frames through unchanged.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a stage.
    #[must_use]
    pub fn stage(mut self, stage: Stage) -> Self {
        self.stages.push(stage);
        self
    }

    /// Appends a query stage.
    #[must_use]
    pub fn query(self, query: Query) -> Self {
        self.stage(Stage::Query(query))
    }

    /// Appends a filter stage.
    #[must_use]
    pub fn filter(
        self,
        reads: &[&str],
        predicate: impl Fn(&Frame) -> bool + Send + Sync + 'static,
    ) -> Self {
        self.stage(Stage::Filter {
            reads: reads.iter().map(|r| Variable::new(*r)).collect(),
            predicate: Arc::new(predicate),
        })
    }

    /// Appends a map stage binding `target`.
    #[must_use]
    pub fn map(
        self,
        target: &str,
        reads: &[&str],
        derive: impl Fn(&Frame) -> Value + Send + Sync + 'static,
    ) -> Self {
        self.stage(Stage::Map {
            target: Variable::new(target),
            reads: reads.iter().map(|r| Variable::new(*r)).collect(),
            derive: Arc::new(derive),
        })
    }

    /// Appends a collect stage.
    #[must_use]
    pub fn collect(self, collected: &[&str], into: &str) -> Self {
        self.stage(Stage::Collect {
            collected: collected.iter().map(|c| Variable::new(*c)).collect(),
            into: Variable::new(into),
        })
    }

    /// Appends a gather stage running `stages` per frame.
    #[must_use]
    pub fn gather(self, stages: Pipeline, collected: &[&str], into: &str) -> Self {
        self.stage(Stage::Gather {
            stages,
            collected: collected.iter().map(|c| Variable::new(*c)).collect(),
            into: Variable::new(into),
        })
    }

    /// Appends a user-supplied stage.
    #[must_use]
    pub fn refine(self, refinement: impl Refinement + 'static) -> Self {
        self.stage(Stage::Custom(Arc::new(refinement)))
    }

    /// The stages in order.
    #[must_use]
    pub fn stages(&self) -> &[Stage] {
        &self.stages
    }

    /// Returns the number of stages.
    #[must_use]
    pub fn len(&self) -> usize {
        self.stages.len()
    }

    /// Returns true if the pipeline has no stages.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.stages.is_empty()
    }

    /// Runs every stage in order.
    ///
    /// Stops early once no frames remain.
    pub fn run<'a>(
        &'a self,
        frames: FrameSet,
        ctx: &'a RefineContext<'a>,
    ) -> BoxFuture<'a, Refined> {
        async move {
            let mut frames = frames;
            let mut faults = Vec::new();
            for stage in &self.stages {
                if frames.is_empty() {
                    break;
                }
                frames = stage.apply(frames, ctx, &mut faults).await;
            }
            Refined { frames, faults }
        }
        .boxed()
    }
}
