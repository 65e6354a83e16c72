//! Action registry: the indirection layer between the engine and provider SDKs
//!
//! The engine never talks to a cloud SDK directly. Every provider operation
//! is named, and the registry maps that name to a callable returning a
//! structured JSON response. Concrete bindings (live SDK clients, fixture
//! replays) implement [`ActionRegistry`]; the engine only depends on the
//! trait plus the capability query.

use async_trait::async_trait;
use serde_json::{Map, Value};

/// Errors surfaced by an action invocation
#[derive(Debug, thiserror::Error)]
pub enum ActionError {
    /// The action name is not registered
    #[error("unknown action '{0}'")]
    UnknownAction(String),

    /// A required parameter was missing or malformed
    #[error("action '{action}': invalid parameter '{param}': {message}")]
    InvalidParam {
        /// Action being invoked
        action: String,

        /// Offending parameter name
        param: String,

        /// What was wrong with it
        message: String,
    },

    /// The underlying provider call failed
    #[error("action '{action}' failed: {message}")]
    Call {
        /// Action being invoked
        action: String,

        /// Provider-reported failure
        message: String,
    },
}

impl ActionError {
    /// Create a provider-call failure
    pub fn call(action: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Call {
            action: action.into(),
            message: message.into(),
        }
    }
}

/// Result of one action invocation
pub type ActionResult = std::result::Result<Value, ActionError>;

/// Lookup table from action names to provider API operations.
///
/// Implementations may pool or share underlying SDK clients across
/// concurrently executing discovery steps, but must be stateless with
/// respect to the engine: a returned response is read-only from the
/// moment it is handed back.
#[async_trait]
pub trait ActionRegistry: Send + Sync {
    /// Invoke the named action with resolved parameters
    async fn invoke(&self, action: &str, params: &Map<String, Value>) -> ActionResult;

    /// Capability query: is this action name registered?
    fn contains(&self, action: &str) -> bool;

    /// Names of all registered actions (for diagnostics)
    fn action_names(&self) -> Vec<String>;
}
