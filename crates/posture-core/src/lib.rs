//! Posture Core
//!
//! Core types, traits, and utilities shared across Posture components.
//!
//! This crate provides:
//! - The result and report types every component emits
//! - Error types and result handling
//! - The [`ActionRegistry`] trait that decouples the engine from
//!   provider SDKs

pub mod error;
pub mod registry;
pub mod report;

pub use error::{Error, Result};
pub use registry::{ActionError, ActionRegistry, ActionResult};
pub use report::{CheckResult, RunReport, RunSummary, Severity, Status};

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::error::{Error, Result};
    pub use crate::registry::{ActionError, ActionRegistry, ActionResult};
    pub use crate::report::{CheckResult, RunReport, RunSummary, Severity, Status};
}
