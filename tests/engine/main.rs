//! Integration tests for Layer 2: Engine
//!
//! Tests for unification, frames, refinement pipelines, and rule checking.

mod pipeline;
mod unify;
