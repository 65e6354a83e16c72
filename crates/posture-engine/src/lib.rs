//! Posture evaluation engine.
//!
//! Turns validated rule sets into check results: plans the discovery
//! dependency graph, executes it against an [`ActionRegistry`] under a
//! bounded worker pool, and evaluates each check's condition tree over
//! the discovered item streams.
//!
//! ```no_run
//! use posture_engine::{Engine, EngineConfig};
//! use posture_rules::loader;
//! use std::sync::Arc;
//!
//! # async fn example(registry: Arc<dyn posture_core::ActionRegistry>) -> posture_core::Result<()> {
//! let rulesets = loader::load_dir("rules", None)?;
//! let engine = Engine::with_config(registry, EngineConfig::default());
//! let report = engine.run(&rulesets).await?;
//! println!("{} findings", report.summary.failed);
//! # Ok(())
//! # }
//! ```

pub mod checks;
pub mod discovery;
pub mod eval;
pub mod item;
pub mod orchestrator;
pub mod planner;
pub mod template;

pub use discovery::{DiscoveryExecutor, DiscoveryOutcome, StepOutcome, StepState};
pub use eval::{evaluate, Verdict};
pub use item::Item;
pub use orchestrator::{Engine, EngineConfig};
pub use planner::{plan, Plan, PlanError};
pub use template::{resolve_path, Context, Resolved, TemplateResolver};

/// Commonly used engine types
pub mod prelude {
    pub use crate::discovery::{DiscoveryOutcome, StepState};
    pub use crate::item::Item;
    pub use crate::orchestrator::{Engine, EngineConfig};
    pub use posture_core::prelude::*;
}
