//! Action records and the append-only action log for Syncline.
//!
//! This crate provides:
//! - [`ActionRecord`] - An immutable, sequenced action completion
//! - [`RecordDraft`] - A completion waiting to be sequenced
//! - [`ActionLog`] - Persistent log sharded by concept and indexed by action

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]

pub mod log;
pub mod record;

pub use log::ActionLog;
pub use record::{ActionKey, ActionRecord, FlowId, Origin, Outcome, RecordDraft, Seq};
