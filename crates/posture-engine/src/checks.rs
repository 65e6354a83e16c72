//! Check executor: condition trees applied to item streams

use posture_core::{CheckResult, Error, Result, Status};
use posture_rules::RuleSet;
use std::time::Instant;
use tracing::debug;

use crate::discovery::{DiscoveryOutcome, StepState};
use crate::eval;

/// Evaluate every check in the rule set against the discovery outcome.
///
/// An empty item stream produces zero results for its checks: the
/// absence of resources is not a finding. A skipped or failed discovery
/// step produces one SKIP result per dependent check, so the gap is
/// visible without repeating the root cause per resource.
pub fn run_checks(ruleset: &RuleSet, outcome: &DiscoveryOutcome) -> Result<Vec<CheckResult>> {
    let mut results = Vec::new();

    for check in &ruleset.checks {
        let stream = outcome.stream(&check.for_each).ok_or_else(|| {
            Error::load(
                &ruleset.service,
                &check.rule_id,
                format!(
                    "for_each references unknown discovery target '{}'",
                    check.for_each
                ),
            )
        })?;

        match stream.state {
            StepState::Skipped | StepState::Failed => {
                let reason = stream
                    .failure
                    .clone()
                    .unwrap_or_else(|| "discovery did not complete".to_string());
                let result = CheckResult::new(
                    &check.rule_id,
                    &check.for_each,
                    Status::Skip,
                    check.severity,
                )
                .with_explanation(format!(
                    "discovery step '{}' did not produce items: {reason}",
                    check.for_each
                ));
                results.push(result);
            }

            StepState::Succeeded | StepState::PartiallySucceeded => {
                let tree = check.condition_tree();
                for item in &stream.items {
                    let started = Instant::now();
                    let (status, explanation) = match eval::evaluate(&tree, item) {
                        Ok(verdict) if verdict.passed => (Status::Pass, verdict.detail),
                        Ok(verdict) => (Status::Fail, verdict.detail),
                        // Never silently dropped: a type mismatch is a
                        // visible ERROR result for that resource
                        Err(err) => (Status::Error, err.to_string()),
                    };

                    let mut result =
                        CheckResult::new(&check.rule_id, item.resource_id(), status, check.severity)
                            .with_explanation(explanation);
                    if let Some(metadata) = check.result_metadata() {
                        result = result.with_metadata(metadata);
                    }
                    result.execution_time_us = started.elapsed().as_micros() as u64;
                    results.push(result);
                }

                debug!(
                    rule = %check.rule_id,
                    target = %check.for_each,
                    items = stream.items.len(),
                    "check evaluated"
                );
            }
        }
    }

    Ok(results)
}
