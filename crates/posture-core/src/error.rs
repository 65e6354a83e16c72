//! Error types for Posture

/// Result type alias using Posture's Error type
pub type Result<T> = std::result::Result<T, Error>;

/// Core error type for Posture operations
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Malformed rule set rejected at load time, before any provider call
    #[error("load error in service '{service}' at {location}: {message}")]
    Load {
        /// Service the offending rule set belongs to
        service: String,

        /// Precise location: a discovery_id, rule_id, or file path
        location: String,

        /// What was wrong
        message: String,
    },

    /// A discovery step failed and was not marked `on_error: continue`
    #[error("discovery step '{discovery_id}' failed: {message}")]
    Discovery {
        /// The step that failed
        discovery_id: String,

        /// Root cause description
        message: String,
    },

    /// Condition evaluation could not reconcile types or paths
    #[error("evaluation error: {0}")]
    Evaluation(String),

    /// Network/IO errors
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization errors
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// A provider call exceeded its per-call timeout
    #[error("operation timed out")]
    Timeout,

    /// The run-level cancellation signal fired
    #[error("run cancelled")]
    Cancelled,

    /// Generic internal errors
    #[error("internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Create a new load error with a precise location
    pub fn load(
        service: impl Into<String>,
        location: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self::Load {
            service: service.into(),
            location: location.into(),
            message: message.into(),
        }
    }

    /// Create a new discovery failure
    pub fn discovery(discovery_id: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Discovery {
            discovery_id: discovery_id.into(),
            message: message.into(),
        }
    }

    /// Create a new evaluation error
    pub fn evaluation(msg: impl Into<String>) -> Self {
        Self::Evaluation(msg.into())
    }

    /// Create a new internal error
    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }

    /// Whether this error is fatal at load time (run never starts)
    pub fn is_load_error(&self) -> bool {
        matches!(self, Self::Load { .. })
    }
}
