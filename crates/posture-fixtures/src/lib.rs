//! Fixture-backed action registry.
//!
//! Serves canned responses in place of live provider calls, so rule
//! sets can be developed and tested offline. Fixtures are plain JSON
//! files: a list of entries matching an action name (and optionally a
//! subset of its parameters) to a response or a simulated error.
//!
//! ```json
//! [
//!   { "action": "s3:ListBuckets",
//!     "response": { "Buckets": [{ "Name": "data" }] } },
//!   { "action": "s3:GetBucketVersioning",
//!     "params": { "Bucket": "data" },
//!     "response": { "Status": "Enabled" } },
//!   { "action": "s3:GetBucketPolicy",
//!     "error": "AccessDenied" }
//! ]
//! ```

use async_trait::async_trait;
use parking_lot::RwLock;
use posture_core::{ActionError, ActionRegistry, ActionResult, Error, Result};
use serde::Deserialize;
use serde_json::{Map, Value};
use std::fs;
use std::path::Path;
use tracing::debug;

/// One canned provider response
#[derive(Debug, Clone, Deserialize)]
pub struct Fixture {
    /// Action name this fixture answers, e.g. `"s3:ListBuckets"`
    pub action: String,

    /// Parameters that must be present (with equal values) in the
    /// invocation for this fixture to match. Empty matches any call.
    #[serde(default)]
    pub params: Map<String, Value>,

    /// The response to return
    #[serde(default)]
    pub response: Option<Value>,

    /// A simulated provider error returned instead of a response
    #[serde(default)]
    pub error: Option<String>,
}

impl Fixture {
    /// Whether this fixture's params are a subset of the invocation's
    fn matches(&self, params: &Map<String, Value>) -> bool {
        self.params
            .iter()
            .all(|(key, expected)| params.get(key) == Some(expected))
    }
}

/// A recorded invocation, for asserting on call traffic in tests
#[derive(Debug, Clone, PartialEq)]
pub struct RecordedCall {
    /// Action name as invoked
    pub action: String,

    /// Rendered parameters the engine passed
    pub params: Map<String, Value>,
}

/// An [`ActionRegistry`] serving fixtures instead of live calls.
///
/// Matching prefers the fixture with the most matched parameters, so a
/// generic entry can coexist with per-resource overrides. Every
/// invocation is recorded and retrievable via [`calls`](Self::calls).
#[derive(Debug, Default)]
pub struct FixtureRegistry {
    fixtures: Vec<Fixture>,
    log: RwLock<Vec<RecordedCall>>,
}

impl FixtureRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Load every `.json` fixture file in a directory (sorted by path,
    /// so matching precedence is stable)
    pub fn from_dir(dir: impl AsRef<Path>) -> Result<Self> {
        let dir = dir.as_ref();
        let mut paths: Vec<_> = fs::read_dir(dir)?
            .filter_map(|entry| entry.ok().map(|e| e.path()))
            .filter(|path| path.extension().is_some_and(|ext| ext == "json"))
            .collect();
        paths.sort();

        let mut registry = Self::new();
        for path in &paths {
            let text = fs::read_to_string(path)?;
            let fixtures: Vec<Fixture> = serde_json::from_str(&text)?;
            for fixture in &fixtures {
                if fixture.response.is_none() && fixture.error.is_none() {
                    return Err(Error::internal(format!(
                        "fixture for '{}' in {} has neither response nor error",
                        fixture.action,
                        path.display()
                    )));
                }
            }
            debug!(path = %path.display(), count = fixtures.len(), "fixtures loaded");
            registry.fixtures.extend(fixtures);
        }
        Ok(registry)
    }

    /// Register a fixture programmatically
    pub fn register(&mut self, fixture: Fixture) -> &mut Self {
        self.fixtures.push(fixture);
        self
    }

    /// Shorthand: an unconditional response for an action
    pub fn respond(&mut self, action: impl Into<String>, response: Value) -> &mut Self {
        self.register(Fixture {
            action: action.into(),
            params: Map::new(),
            response: Some(response),
            error: None,
        })
    }

    /// Every invocation made through this registry, in call order
    pub fn calls(&self) -> Vec<RecordedCall> {
        self.log.read().clone()
    }

    /// Number of invocations made through this registry
    pub fn call_count(&self) -> usize {
        self.log.read().len()
    }

    fn best_match(&self, action: &str, params: &Map<String, Value>) -> Option<&Fixture> {
        self.fixtures
            .iter()
            .filter(|f| f.action == action && f.matches(params))
            .max_by_key(|f| f.params.len())
    }
}

#[async_trait]
impl ActionRegistry for FixtureRegistry {
    async fn invoke(&self, action: &str, params: &Map<String, Value>) -> ActionResult {
        self.log.write().push(RecordedCall {
            action: action.to_string(),
            params: params.clone(),
        });

        let Some(fixture) = self.best_match(action, params) else {
            if self.fixtures.iter().any(|f| f.action == action) {
                return Err(ActionError::call(
                    action,
                    format!("no fixture matches params {}", Value::Object(params.clone())),
                ));
            }
            return Err(ActionError::UnknownAction(action.to_string()));
        };

        match (&fixture.response, &fixture.error) {
            (_, Some(error)) => Err(ActionError::call(action, error.clone())),
            (Some(response), None) => Ok(response.clone()),
            (None, None) => Err(ActionError::call(action, "empty fixture")),
        }
    }

    fn contains(&self, action: &str) -> bool {
        self.fixtures.iter().any(|f| f.action == action)
    }

    fn action_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.fixtures.iter().map(|f| f.action.clone()).collect();
        names.sort();
        names.dedup();
        names
    }
}
