//! Check results and run-level reporting types

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Verdict for one (rule, resource) pair
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Status {
    /// The resource satisfied every condition
    Pass,
    /// At least one condition was falsified
    Fail,
    /// The check never ran (cancelled or upstream discovery skipped)
    Skip,
    /// The evaluator could not produce a verdict for this resource
    Error,
}

impl std::fmt::Display for Status {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let tag = match self {
            Self::Pass => "PASS",
            Self::Fail => "FAIL",
            Self::Skip => "SKIP",
            Self::Error => "ERROR",
        };
        f.write_str(tag)
    }
}

/// Severity declared on the check definition, copied onto every result
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Informational,
    Low,
    #[default]
    Medium,
    High,
    Critical,
}

impl std::fmt::Display for Severity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Informational => "informational",
            Self::Low => "low",
            Self::Medium => "medium",
            Self::High => "high",
            Self::Critical => "critical",
        };
        f.write_str(name)
    }
}

/// One check outcome for one discovered resource.
///
/// Created once per (check, item) pair and never mutated afterwards.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CheckResult {
    /// Globally unique rule identifier
    pub rule_id: String,

    /// Human-readable identity chain for the resource
    /// (e.g. "bucket my-data / policy statement 2")
    pub resource_id: String,

    /// Pass/fail/skip/error verdict
    pub status: Status,

    /// Severity from the check definition, not derived at runtime
    pub severity: Severity,

    /// Human explanation of the verdict, including observed values
    pub status_extended: String,

    /// Free-form metadata carried from the check definition
    /// (remediation text, framework references, ...)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metadata: Option<serde_json::Value>,

    /// Wall-clock time spent evaluating this result, in microseconds
    pub execution_time_us: u64,
}

impl CheckResult {
    /// Create a new result with empty explanation and metadata
    pub fn new(
        rule_id: impl Into<String>,
        resource_id: impl Into<String>,
        status: Status,
        severity: Severity,
    ) -> Self {
        Self {
            rule_id: rule_id.into(),
            resource_id: resource_id.into(),
            status,
            severity,
            status_extended: String::new(),
            metadata: None,
            execution_time_us: 0,
        }
    }

    /// Attach a human explanation
    pub fn with_explanation(mut self, text: impl Into<String>) -> Self {
        self.status_extended = text.into();
        self
    }

    /// Attach free-form metadata
    pub fn with_metadata(mut self, metadata: serde_json::Value) -> Self {
        self.metadata = Some(metadata);
        self
    }
}

/// Aggregated counters for one engine run
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RunSummary {
    /// Results with status PASS
    pub passed: usize,

    /// Results with status FAIL
    pub failed: usize,

    /// Results with status ERROR
    pub errors: usize,

    /// Results with status SKIP
    pub skipped: usize,

    /// Fan-out branches suppressed by `on_error: continue`
    pub suppressed_failures: usize,

    /// Discovery failures, one message per root cause
    pub discovery_failures: Vec<String>,
}

impl RunSummary {
    /// Create a new empty summary
    pub fn new() -> Self {
        Self::default()
    }

    /// Record one result status
    pub fn record(&mut self, status: Status) {
        match status {
            Status::Pass => self.passed += 1,
            Status::Fail => self.failed += 1,
            Status::Error => self.errors += 1,
            Status::Skip => self.skipped += 1,
        }
    }

    /// Total number of results recorded
    pub fn total(&self) -> usize {
        self.passed + self.failed + self.errors + self.skipped
    }

    /// Merge another summary into this one
    pub fn merge(&mut self, other: RunSummary) {
        self.passed += other.passed;
        self.failed += other.failed;
        self.errors += other.errors;
        self.skipped += other.skipped;
        self.suppressed_failures += other.suppressed_failures;
        self.discovery_failures.extend(other.discovery_failures);
    }
}

/// Complete output of one engine run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunReport {
    /// Unique id for this run
    pub run_id: String,

    /// Services that were scanned
    pub services: Vec<String>,

    /// When the run started
    pub started_at: DateTime<Utc>,

    /// Total run duration in milliseconds
    pub duration_ms: u64,

    /// Every result the run could produce
    pub results: Vec<CheckResult>,

    /// Aggregated counters
    pub summary: RunSummary,
}

impl RunReport {
    /// Create an empty report for the given services
    pub fn new(services: Vec<String>) -> Self {
        Self {
            run_id: uuid::Uuid::new_v4().to_string(),
            services,
            started_at: Utc::now(),
            duration_ms: 0,
            results: Vec::new(),
            summary: RunSummary::new(),
        }
    }

    /// Append a result, keeping the summary counters in sync
    pub fn push(&mut self, result: CheckResult) {
        self.summary.record(result.status);
        self.results.push(result);
    }
}
