//! Command-line scanner for the posture engine.
//!
//! `posture scan` loads rule sets, serves provider responses from a
//! fixture directory, and renders the run report; `posture validate`
//! checks rule sets structurally without executing anything.

pub mod cli;
pub mod output;
