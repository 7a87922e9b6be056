//! Core values, persistent collections, and errors for Syncline.
//!
//! This crate provides:
//! - [`Value`] - The uniform value representation shared by every concept
//! - [`Name`] and [`Fields`] - Field names and named-field records
//! - [`Type`] - Type descriptors for error reporting
//! - [`Error`] - Rich error types with context
//! - Persistent collections ([`SlVec`], [`SlMap`])

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]

pub mod collections;
pub mod error;
pub mod types;
pub mod value;

pub use collections::{SlMap, SlVec};
pub use error::{Error, ErrorContext, ErrorKind, SemanticLimit};
pub use types::Type;
pub use value::{Fields, Name, Value};

/// Result type for Syncline operations.
pub type Result<T> = std::result::Result<T, Error>;
