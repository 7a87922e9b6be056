//! Concepts: the independent modules rules coordinate.
//!
//! The engine never looks inside a concept. It invokes actions, whose
//! completions become log records, and calls read-only queries, whose
//! results refine frames. Concept state and storage are the concept's own
//! business.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use syncline_foundation::{Error, ErrorKind, Fields, Name, Result};
use syncline_log::Outcome;

/// A concept the engine can invoke and query.
///
/// Implementations must not call back into the engine that invokes them:
/// the engine holds its log for the duration of a pass.
#[async_trait]
pub trait Concept: Send + Sync {
    /// The name rules refer to this concept by.
    fn name(&self) -> &str;

    /// Runs an action.
    ///
    /// A domain-level failure (e.g. "no such user") is reported as
    /// `Ok(Outcome::Failure(..))`. An `Err` means the action could not run
    /// at all; the engine records it as a failure carrying the error text.
    async fn invoke(&self, action: &str, inputs: Fields) -> Result<Outcome>;

    /// Runs a read-only query, returning zero or more result tuples.
    ///
    /// An empty result is a normal answer, not an error.
    async fn query(&self, query: &str, inputs: Fields) -> Result<Vec<Fields>>;
}

/// Registry of concepts by name.
#[derive(Clone, Default)]
pub struct ConceptRegistry {
    concepts: HashMap<Name, Arc<dyn Concept>>,
}

impl ConceptRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a concept.
    ///
    /// # Errors
    ///
    /// Returns `DuplicateConcept` if the name is taken.
    pub fn register(&mut self, concept: impl Concept + 'static) -> Result<()> {
        self.register_shared(Arc::new(concept))
    }

    /// Registers a shared concept, e.g. one a test also holds on to.
    ///
    /// # Errors
    ///
    /// Returns `DuplicateConcept` if the name is taken.
    pub fn register_shared(&mut self, concept: Arc<dyn Concept>) -> Result<()> {
        let name: Name = concept.name().into();
        if self.concepts.contains_key(&name) {
            return Err(Error::new(ErrorKind::DuplicateConcept(name.to_string())));
        }
        self.concepts.insert(name, concept);
        Ok(())
    }

    /// Looks up a concept.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&Arc<dyn Concept>> {
        self.concepts.get(name)
    }

    /// Looks up a concept, failing with `UnknownConcept`.
    ///
    /// # Errors
    ///
    /// Returns `UnknownConcept` if nothing is registered under `name`.
    pub fn require(&self, name: &str) -> Result<&Arc<dyn Concept>> {
        self.get(name).ok_or_else(|| Error::unknown_concept(name))
    }

    /// Returns true if a concept is registered under `name`.
    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.concepts.contains_key(name)
    }

    /// Number of registered concepts.
    #[must_use]
    pub fn len(&self) -> usize {
        self.concepts.len()
    }

    /// Returns true if no concept is registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.concepts.is_empty()
    }

    /// Registered names, sorted.
    #[must_use]
    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<_> = self.concepts.keys().map(|n| &**n).collect();
        names.sort_unstable();
        names
    }
}

impl fmt::Debug for ConceptRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConceptRegistry")
            .field("concepts", &self.names())
            .finish()
    }
}
