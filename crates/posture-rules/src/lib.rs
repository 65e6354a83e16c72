//! Posture Rules
//!
//! The on-disk rule model for the Posture CSPM engine.
//!
//! Rule sets are defined in YAML, one per cloud service, and specify:
//! - Discovery steps (provider calls + item projections, optionally
//!   chained with `for_each`)
//! - Checks (condition trees over discovered items, with severity and
//!   remediation metadata)
//!
//! Operator names and structural references are validated at load time;
//! a malformed rule set is rejected before any provider call is made.

pub mod check;
pub mod condition;
pub mod loader;
pub mod ruleset;

pub use check::{CheckDef, Conditions, Logic};
pub use condition::{BaseOp, Condition, Leaf, OpSpec, Quantifier, UnknownOperator};
pub use loader::{load_dir, validate, validate_actions, validate_all};
pub use ruleset::{ActionCall, DiscoveryStep, Emit, OnError, RuleSet, Scope};

/// Prelude for convenient imports
pub mod prelude {
    pub use crate::check::{CheckDef, Conditions, Logic};
    pub use crate::condition::{BaseOp, Condition, Leaf, OpSpec, Quantifier};
    pub use crate::ruleset::{ActionCall, DiscoveryStep, Emit, OnError, RuleSet, Scope};
}
