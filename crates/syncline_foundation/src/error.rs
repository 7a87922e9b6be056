//! Error types for the Syncline system.
//!
//! Uses `thiserror` for ergonomic error definition with rich context.
//! Unification failures and empty frame sets are not errors and never
//! appear here.

use std::fmt;
use std::time::Duration;

use thiserror::Error;

use crate::types::Type;

/// The main error type for Syncline operations.
#[derive(Debug, Error)]
#[error("{kind}")]
pub struct Error {
    /// The kind of error that occurred.
    pub kind: ErrorKind,
    /// Optional context about where the error occurred.
    pub context: Option<ErrorContext>,
}

impl Error {
    /// Creates a new error with the given kind.
    #[must_use]
    pub fn new(kind: ErrorKind) -> Self {
        Self {
            kind,
            context: None,
        }
    }

    /// Adds context to this error.
    #[must_use]
    pub fn with_context(mut self, context: ErrorContext) -> Self {
        self.context = Some(context);
        self
    }

    /// Tags the error with the rule it came from, creating context if needed.
    #[must_use]
    pub fn in_rule(mut self, rule: impl Into<String>) -> Self {
        let context = self.context.take().unwrap_or_default();
        self.context = Some(context.with_source(rule));
        self
    }

    /// Creates a type mismatch error.
    #[must_use]
    pub fn type_mismatch(expected: Type, actual: Type) -> Self {
        Self::new(ErrorKind::TypeMismatch { expected, actual })
    }

    /// Creates a field not found error.
    #[must_use]
    pub fn field_not_found(field: impl Into<String>) -> Self {
        Self::new(ErrorKind::FieldNotFound(field.into()))
    }

    /// Creates an unbound variable error.
    #[must_use]
    pub fn unbound_variable(variable: impl Into<String>) -> Self {
        Self::new(ErrorKind::UnboundVariable(variable.into()))
    }

    /// Creates a rebinding error.
    #[must_use]
    pub fn rebinding(variable: impl Into<String>) -> Self {
        Self::new(ErrorKind::Rebinding(variable.into()))
    }

    /// Creates a malformed rule error.
    #[must_use]
    pub fn malformed_rule(rule: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(ErrorKind::MalformedRule {
            rule: rule.into(),
            message: message.into(),
        })
    }

    /// Creates an unknown concept error.
    #[must_use]
    pub fn unknown_concept(concept: impl Into<String>) -> Self {
        Self::new(ErrorKind::UnknownConcept(concept.into()))
    }

    /// Creates an unknown action error.
    #[must_use]
    pub fn unknown_action(concept: impl Into<String>, action: impl Into<String>) -> Self {
        Self::new(ErrorKind::UnknownAction {
            concept: concept.into(),
            action: action.into(),
        })
    }

    /// Creates an unknown query error.
    #[must_use]
    pub fn unknown_query(concept: impl Into<String>, query: impl Into<String>) -> Self {
        Self::new(ErrorKind::UnknownQuery {
            concept: concept.into(),
            query: query.into(),
        })
    }

    /// Creates a query failure error.
    #[must_use]
    pub fn query_failed(
        concept: impl Into<String>,
        query: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self::new(ErrorKind::QueryFailed {
            concept: concept.into(),
            query: query.into(),
            message: message.into(),
        })
    }

    /// Creates a timeout error.
    #[must_use]
    pub fn timeout(operation: impl Into<String>, after: Duration) -> Self {
        Self::new(ErrorKind::Timeout {
            operation: operation.into(),
            after,
        })
    }

    /// Creates a semantic limit exceeded error.
    #[must_use]
    pub fn limit_exceeded(limit: SemanticLimit) -> Self {
        Self::new(ErrorKind::LimitExceeded(limit))
    }

    /// Returns true if this error came from a rule-authoring mistake.
    #[must_use]
    pub fn is_authoring_error(&self) -> bool {
        matches!(
            self.kind,
            ErrorKind::MalformedRule { .. }
                | ErrorKind::DuplicateRule(_)
                | ErrorKind::UnboundVariable(_)
                | ErrorKind::Rebinding(_)
        )
    }
}

/// Categorized error kinds for pattern matching.
#[derive(Debug, Error)]
pub enum ErrorKind {
    /// A value had the wrong type.
    #[error("type mismatch: expected {expected}, got {actual}")]
    TypeMismatch {
        /// The expected type.
        expected: Type,
        /// The actual type encountered.
        actual: Type,
    },

    /// A record had no field with this name.
    #[error("field not found: {0}")]
    FieldNotFound(String),

    /// A variable was read before any step bound it.
    #[error("unbound variable: ?{0}")]
    UnboundVariable(String),

    /// A step tried to bind a variable the frame already holds.
    #[error("variable ?{0} is already bound")]
    Rebinding(String),

    /// Rule failed validation at registration.
    #[error("malformed rule {rule}: {message}")]
    MalformedRule {
        /// The offending rule.
        rule: String,
        /// What is wrong with it.
        message: String,
    },

    /// Two rules were registered under the same name.
    #[error("duplicate rule: {0}")]
    DuplicateRule(String),

    /// No concept is registered under this name.
    #[error("unknown concept: {0}")]
    UnknownConcept(String),

    /// Two concepts were registered under the same name.
    #[error("duplicate concept: {0}")]
    DuplicateConcept(String),

    /// The concept does not expose this action.
    #[error("unknown action: {concept}.{action}")]
    UnknownAction {
        /// The concept that was invoked.
        concept: String,
        /// The action name.
        action: String,
    },

    /// The concept does not expose this query.
    #[error("unknown query: {concept}.{query}")]
    UnknownQuery {
        /// The concept that was queried.
        concept: String,
        /// The query name.
        query: String,
    },

    /// A concept query raised a fault.
    #[error("query {concept}.{query} failed: {message}")]
    QueryFailed {
        /// The concept that was queried.
        concept: String,
        /// The query name.
        query: String,
        /// The concept's error message.
        message: String,
    },

    /// An action or query did not complete in time.
    #[error("{operation} timed out after {after:?}")]
    Timeout {
        /// What was running.
        operation: String,
        /// The configured limit.
        after: Duration,
    },

    /// Semantic limit exceeded (kill switch triggered).
    #[error("limit exceeded: {0}")]
    LimitExceeded(SemanticLimit),

    /// Internal error (should not happen).
    #[error("internal error: {0}")]
    Internal(String),
}

/// Semantic limits (kill switches) that can be exceeded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SemanticLimit {
    /// Rule output kept triggering rules past the generation bound.
    MaxGenerationDepth {
        /// The configured limit.
        limit: u32,
        /// The rule whose dispatch crossed the bound.
        rule: Option<String>,
    },
    /// Too many invocations dispatched while settling one append.
    MaxDispatches {
        /// The configured limit.
        limit: usize,
    },
}

impl fmt::Display for SemanticLimit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::MaxGenerationDepth { limit, rule } => {
                write!(f, "max generation depth ({limit}) exceeded")?;
                if let Some(rule) = rule {
                    write!(f, " by rule {rule}")?;
                }
                Ok(())
            }
            Self::MaxDispatches { limit } => {
                write!(f, "max dispatches per pass ({limit}) exceeded")
            }
        }
    }
}

/// Context about where an error occurred.
#[derive(Debug, Clone, Default)]
pub struct ErrorContext {
    /// Rule name or other source.
    pub source: Option<String>,
    /// Sequence number of the record being processed, if any.
    pub seq: Option<u64>,
    /// Stack of evaluation steps (stage names, clause positions).
    pub stack: Vec<String>,
}

impl ErrorContext {
    /// Creates a new empty context.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the source.
    #[must_use]
    pub fn with_source(mut self, source: impl Into<String>) -> Self {
        self.source = Some(source.into());
        self
    }

    /// Sets the record sequence number.
    #[must_use]
    pub fn with_seq(mut self, seq: u64) -> Self {
        self.seq = Some(seq);
        self
    }

    /// Adds a stack frame.
    #[must_use]
    pub fn with_frame(mut self, frame: impl Into<String>) -> Self {
        self.stack.push(frame.into());
        self
    }
}

impl fmt::Display for ErrorContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(source) = &self.source {
            write!(f, "in {source}")?;
            if let Some(seq) = self.seq {
                write!(f, " at #{seq}")?;
            }
        }
        if !self.stack.is_empty() {
            writeln!(f)?;
            for frame in &self.stack {
                writeln!(f, "  in {frame}")?;
            }
        }
        Ok(())
    }
}
