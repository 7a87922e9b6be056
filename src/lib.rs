//! Syncline - Declarative synchronization between independent concepts
//!
//! This crate re-exports all layers of the Syncline system for convenient access.
//! For detailed documentation, see the individual layer crates.
//!
//! # Architecture
//!
//! ```text
//! Layer 2: syncline_engine     - Rules, frames, refinement, dispatch, scheduling
//! Layer 1: syncline_log        - Action records, flows, the append-only log
//! Layer 0: syncline_foundation - Core types (Value, Fields, Error)
//! ```

pub use syncline_engine as engine;
pub use syncline_foundation as foundation;
pub use syncline_log as log;
