//! Run orchestration: plan, discover, evaluate, aggregate
//!
//! `Engine::run` is the one entry point callers need. It plans every
//! rule set up front, so a structural defect in any file rejects the
//! whole run before a single provider call is made.

use posture_core::{ActionRegistry, Error, Result, RunReport};
use posture_rules::RuleSet;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::checks;
use crate::discovery::{DiscoveryExecutor, StepState};
use crate::planner::{self, Plan};

/// Tunables for a run
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Width of the shared provider-call worker pool
    pub workers: usize,

    /// Per-call timeout; a slow provider call fails, it does not hang
    /// the run
    pub call_timeout: Duration,

    /// Optional wall-clock budget for the whole run. When it elapses the
    /// run is cancelled and not-yet-started steps are skipped.
    pub run_deadline: Option<Duration>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            workers: 8,
            call_timeout: Duration::from_secs(30),
            run_deadline: None,
        }
    }
}

/// The posture engine: evaluates rule sets against an action registry
pub struct Engine {
    registry: Arc<dyn ActionRegistry>,
    config: EngineConfig,
    cancel: CancellationToken,
}

impl Engine {
    /// Create an engine with default configuration
    pub fn new(registry: Arc<dyn ActionRegistry>) -> Self {
        Self::with_config(registry, EngineConfig::default())
    }

    /// Create an engine with explicit configuration
    pub fn with_config(registry: Arc<dyn ActionRegistry>, config: EngineConfig) -> Self {
        Self {
            registry,
            config,
            cancel: CancellationToken::new(),
        }
    }

    /// Token callers can cancel to stop the run early (e.g. on SIGINT)
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Execute every rule set and aggregate one report.
    ///
    /// Rule sets run sequentially; within a rule set, discovery steps
    /// run concurrently under the shared worker pool. Given identical
    /// registry responses, two runs produce the same results in the
    /// same order (execution timings aside).
    pub async fn run(&self, rulesets: &[RuleSet]) -> Result<RunReport> {
        let started = Instant::now();

        // Plan everything first: a cycle or dangling reference anywhere
        // means zero provider calls
        let mut plans: Vec<Plan> = Vec::with_capacity(rulesets.len());
        for ruleset in rulesets {
            let plan = planner::plan(ruleset)
                .map_err(|err| Error::load(&ruleset.service, "discovery", err.to_string()))?;
            plans.push(plan);
        }

        let services: Vec<String> = rulesets.iter().map(|r| r.service.clone()).collect();
        let mut report = RunReport::new(services);

        let cancel = self.cancel.child_token();
        let deadline_guard = self.config.run_deadline.map(|budget| {
            let deadline_cancel = cancel.clone();
            tokio::spawn(async move {
                tokio::time::sleep(budget).await;
                warn!(?budget, "run deadline elapsed, cancelling");
                deadline_cancel.cancel();
            })
        });

        let executor = DiscoveryExecutor::new(
            Arc::clone(&self.registry),
            self.config.workers,
            self.config.call_timeout,
            cancel.clone(),
        );

        for (ruleset, plan) in rulesets.iter().zip(&plans) {
            info!(
                service = %ruleset.service,
                steps = plan.len(),
                checks = ruleset.checks.len(),
                "evaluating rule set"
            );

            let outcome = executor.execute(ruleset, plan).await;
            report.summary.suppressed_failures += outcome.suppressed_failures();
            for step in outcome.steps() {
                if step.state == StepState::Failed {
                    if let Some(reason) = &step.failure {
                        report.summary.discovery_failures.push(format!(
                            "{}/{}: {reason}",
                            ruleset.service, step.discovery_id
                        ));
                    }
                }
            }

            for result in checks::run_checks(ruleset, &outcome)? {
                report.push(result);
            }
        }

        if let Some(guard) = deadline_guard {
            guard.abort();
        }

        report.duration_ms = started.elapsed().as_millis() as u64;
        info!(
            run_id = %report.run_id,
            total = report.summary.total(),
            passed = report.summary.passed,
            failed = report.summary.failed,
            errors = report.summary.errors,
            skipped = report.summary.skipped,
            duration_ms = report.duration_ms,
            "run complete"
        );
        Ok(report)
    }
}
