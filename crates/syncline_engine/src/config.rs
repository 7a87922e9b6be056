//! Engine configuration.

use std::time::Duration;

use crate::provenance::ProvenanceVerbosity;

/// Configuration for the engine.
///
/// Controls kill switches, concurrency, timeouts, and provenance.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct EngineConfig {
    /// Deepest rule-dispatch generation allowed while settling one append
    /// (kill switch for rules that keep re-triggering each other).
    pub max_generation_depth: u32,

    /// Most invocations dispatched while settling one append (kill switch).
    pub max_dispatches_per_pass: usize,

    /// Frames queried concurrently by a single query stage.
    pub query_concurrency: usize,

    /// Activations refined concurrently within one generation.
    pub activation_concurrency: usize,

    /// Invocations executed concurrently within one generation.
    pub action_concurrency: usize,

    /// Upper bound on a single action invocation; `None` waits forever.
    pub action_timeout: Option<Duration>,

    /// Upper bound on a single query call; `None` waits forever.
    pub query_timeout: Option<Duration>,

    /// What provenance keeps for rule-produced records.
    pub provenance: ProvenanceVerbosity,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_generation_depth: 64,
            max_dispatches_per_pass: 10_000,
            query_concurrency: 16,
            activation_concurrency: 16,
            action_concurrency: 16,
            action_timeout: None,
            query_timeout: None,
            provenance: ProvenanceVerbosity::Minimal,
        }
    }
}

impl EngineConfig {
    /// Creates the default configuration.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a configuration with tight limits and timeouts, suited to
    /// tests and development.
    #[must_use]
    pub fn strict() -> Self {
        Self {
            max_generation_depth: 16,
            max_dispatches_per_pass: 1_000,
            action_timeout: Some(Duration::from_secs(5)),
            query_timeout: Some(Duration::from_secs(5)),
            provenance: ProvenanceVerbosity::Standard,
            ..Self::default()
        }
    }

    /// Builder method to set the generation depth limit.
    #[must_use]
    pub fn with_max_generation_depth(mut self, depth: u32) -> Self {
        self.max_generation_depth = depth;
        self
    }

    /// Builder method to set the per-pass dispatch limit.
    #[must_use]
    pub fn with_max_dispatches_per_pass(mut self, max: usize) -> Self {
        self.max_dispatches_per_pass = max;
        self
    }

    /// Builder method to set query concurrency (at least 1).
    #[must_use]
    pub fn with_query_concurrency(mut self, n: usize) -> Self {
        self.query_concurrency = n.max(1);
        self
    }

    /// Builder method to set activation concurrency (at least 1).
    #[must_use]
    pub fn with_activation_concurrency(mut self, n: usize) -> Self {
        self.activation_concurrency = n.max(1);
        self
    }

    /// Builder method to set action concurrency (at least 1).
    #[must_use]
    pub fn with_action_concurrency(mut self, n: usize) -> Self {
        self.action_concurrency = n.max(1);
        self
    }

    /// Builder method to set the action timeout.
    #[must_use]
    pub fn with_action_timeout(mut self, timeout: Duration) -> Self {
        self.action_timeout = Some(timeout);
        self
    }

    /// Builder method to set the query timeout.
    #[must_use]
    pub fn with_query_timeout(mut self, timeout: Duration) -> Self {
        self.query_timeout = Some(timeout);
        self
    }

    /// Builder method to set provenance verbosity.
    #[must_use]
    pub fn with_provenance(mut self, verbosity: ProvenanceVerbosity) -> Self {
        self.provenance = verbosity;
        self
    }
}
