//! Rule set and discovery step definitions

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

use crate::CheckDef;

/// A complete rule set for one cloud service
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RuleSet {
    /// Service identifier, e.g. `s3` or `compute`
    pub service: String,

    /// Whether the service is global or per-region
    #[serde(default)]
    pub scope: Scope,

    /// Discovery steps, in declaration order
    #[serde(default)]
    pub discovery: Vec<DiscoveryStep>,

    /// Checks evaluated against discovered items
    #[serde(default)]
    pub checks: Vec<CheckDef>,
}

impl RuleSet {
    /// Load a rule set from a YAML string
    pub fn from_yaml(yaml: &str) -> Result<Self, serde_yaml::Error> {
        serde_yaml::from_str(yaml)
    }

    /// Load a rule set from a file
    pub fn from_file(
        path: impl AsRef<std::path::Path>,
    ) -> Result<Self, Box<dyn std::error::Error>> {
        let content = std::fs::read_to_string(path)?;
        Ok(Self::from_yaml(&content)?)
    }

    /// Look up a discovery step by id
    pub fn step(&self, discovery_id: &str) -> Option<&DiscoveryStep> {
        self.discovery.iter().find(|s| s.discovery_id == discovery_id)
    }
}

/// Service scope
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Scope {
    /// One instance of the service per account
    Global,
    /// One instance per region
    #[default]
    Regional,
}

/// A named unit of discovery: one or more provider calls plus a projection
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DiscoveryStep {
    /// Unique key within the rule set
    pub discovery_id: String,

    /// Provider calls executed in order
    pub calls: Vec<ActionCall>,

    /// Parent discovery id; makes this a chained (fan-out) step
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub for_each: Option<String>,

    /// Name bound to the parent item inside call parameter templates
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub param: Option<String>,

    /// Projection turning raw responses into items
    pub emit: Emit,
}

impl DiscoveryStep {
    /// Whether this step fans out over a parent stream
    pub fn is_chained(&self) -> bool {
        self.for_each.is_some()
    }
}

/// One provider API operation within a discovery step
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActionCall {
    /// Action registry key, e.g. `s3:GetBucketVersioning`
    pub action: String,

    /// Parameter templates; string values may contain `{{ expr }}`
    #[serde(default)]
    pub params: BTreeMap<String, Value>,

    /// Context variable the raw response is stored under
    pub save_as: String,

    /// What to do when the call fails
    #[serde(default)]
    pub on_error: OnError,
}

/// Failure policy for one action call
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum OnError {
    /// Skip the affected emission, log, and keep going
    Continue,
    /// Abort the step and everything downstream of it
    #[default]
    Fail,
}

/// Projection from raw responses to emitted items
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Emit {
    /// A path yielding a list; each element is bound as `resource` and
    /// projected through the field templates
    ItemsFor {
        /// Path into a saved response that yields a list
        items_for: String,

        /// Named field -> path/template per element; when empty, object
        /// elements are emitted with their own fields
        #[serde(default)]
        fields: BTreeMap<String, String>,
    },

    /// A single item projected directly from saved responses
    Item {
        /// Named field -> path into a saved response
        item: BTreeMap<String, String>,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ruleset_deserialization() {
        let yaml = r#"
service: s3
scope: global
discovery:
  - discovery_id: buckets
    calls:
      - action: "s3:ListBuckets"
        save_as: listing
    emit:
      items_for: "listing.Buckets"
      fields:
        name: "resource.Name"
checks:
  - rule_id: s3_bucket_exists
    for_each: buckets
    severity: low
    conditions:
      var: item.name
      op: not_empty
"#;
        let ruleset = RuleSet::from_yaml(yaml).unwrap();
        assert_eq!(ruleset.service, "s3");
        assert_eq!(ruleset.scope, Scope::Global);
        assert_eq!(ruleset.discovery.len(), 1);
        assert_eq!(ruleset.checks.len(), 1);
        assert!(!ruleset.discovery[0].is_chained());
    }

    #[test]
    fn test_chained_step_deserialization() {
        let yaml = r#"
discovery_id: bucket_versioning
for_each: buckets
param: bucket
calls:
  - action: "s3:GetBucketVersioning"
    params:
      Bucket: "{{ bucket.name }}"
    save_as: versioning
    on_error: continue
emit:
  item:
    name: "bucket.name"
    status: "versioning.Status"
"#;
        let step: DiscoveryStep = serde_yaml::from_str(yaml).unwrap();
        assert!(step.is_chained());
        assert_eq!(step.param.as_deref(), Some("bucket"));
        assert_eq!(step.calls[0].on_error, OnError::Continue);
        assert!(matches!(step.emit, Emit::Item { .. }));
    }

    #[test]
    fn test_on_error_defaults_to_fail() {
        let yaml = r#"
action: "iam:ListUsers"
save_as: users
"#;
        let call: ActionCall = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(call.on_error, OnError::Fail);
        assert!(call.params.is_empty());
    }
}
