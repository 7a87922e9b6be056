//! Rule matching, frame refinement, dispatch, and scheduling for Syncline.
//!
//! This crate provides:
//! - [`ActionPattern`] and [`unify`] - Matching records against field patterns
//! - [`Frame`] and [`FrameSet`] - Variable bindings carried through a rule
//! - [`join`] - Multi-clause trigger matching over the action log
//! - [`Pipeline`] - Query, filter, map, and aggregate refinement stages
//! - [`Rule`], [`RuleBuilder`], [`RuleRegistry`] - Declarative synchronizations
//! - [`Dispatcher`] - Turning refined frames into concept invocations
//! - [`Engine`] - The scheduler that settles every append
//! - [`ProvenanceTracker`] - Why a rule-produced record exists

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]

pub mod concept;
pub mod config;
pub mod dispatch;
pub mod expr;
pub mod frame;
pub mod join;
pub mod pattern;
pub mod provenance;
pub mod refine;
pub mod rule;
pub mod scheduler;

pub use concept::{Concept, ConceptRegistry};
pub use config::EngineConfig;
pub use dispatch::{Dispatcher, Invocation};
pub use expr::Expr;
pub use frame::{Frame, FrameSet, Variable, var};
pub use join::{Match, Refraction, Scope, join};
pub use pattern::{ActionPattern, FieldPattern, OutputMatch, Term, unify, wildcard};
pub use provenance::{Derivation, ProvenanceTracker, ProvenanceVerbosity};
pub use refine::{Fault, OnEmpty, Pipeline, Query, RefineContext, Refined, Refinement, Stage};
pub use rule::{OutputClause, Rule, RuleBuilder, RuleId, RuleRegistry, RuleState};
pub use scheduler::{Engine, EngineBuilder, PassReport};
