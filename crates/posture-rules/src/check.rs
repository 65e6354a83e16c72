//! Check definitions

use posture_core::Severity;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::Condition;

/// A check evaluated against every item of one discovery id
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CheckDef {
    /// Globally unique rule identifier
    pub rule_id: String,

    /// Discovery id whose item stream this check iterates
    pub for_each: String,

    /// Short human title
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,

    /// Severity copied onto every result of this check
    #[serde(default)]
    pub severity: Severity,

    /// Combinator applied when `conditions` is a bare list
    #[serde(default)]
    pub logic: Logic,

    /// Condition tree, or a list combined with `logic`
    pub conditions: Conditions,

    /// Remediation guidance carried into result metadata
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub remediation: Option<String>,

    /// Free-form metadata passed through to results
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<Value>,
}

impl CheckDef {
    /// The condition tree, with a bare list folded under `logic`
    pub fn condition_tree(&self) -> Condition {
        match &self.conditions {
            Conditions::One(cond) => cond.clone(),
            Conditions::Many(list) => match self.logic {
                Logic::And => Condition::All { all: list.clone() },
                Logic::Or => Condition::Any { any: list.clone() },
            },
        }
    }

    /// Result metadata: declared metadata plus remediation, if any
    pub fn result_metadata(&self) -> Option<Value> {
        match (&self.metadata, &self.remediation) {
            (None, None) => None,
            (Some(meta), None) => Some(meta.clone()),
            (meta, Some(remediation)) => {
                let mut map = match meta {
                    Some(Value::Object(map)) => map.clone(),
                    Some(other) => {
                        let mut map = serde_json::Map::new();
                        map.insert("metadata".to_string(), other.clone());
                        map
                    }
                    None => serde_json::Map::new(),
                };
                map.insert(
                    "remediation".to_string(),
                    Value::String(remediation.clone()),
                );
                Some(Value::Object(map))
            }
        }
    }
}

/// Top-level combinator for multiple conditions given without nesting
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "UPPERCASE")]
pub enum Logic {
    #[default]
    And,
    Or,
}

/// Either a single condition tree or a bare list of conditions
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Conditions {
    /// A bare list, combined with the check's `logic`
    Many(Vec<Condition>),

    /// A single tree
    One(Condition),
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::condition::{BaseOp, OpSpec};

    #[test]
    fn test_single_condition_check() {
        let yaml = r#"
rule_id: ec2_instance_no_public_ip
for_each: instances
severity: high
conditions:
  var: item.PublicIpAddress
  op: is_empty
remediation: Remove the public IP association or move the instance.
"#;
        let check: CheckDef = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(check.rule_id, "ec2_instance_no_public_ip");
        assert_eq!(check.severity, Severity::High);

        match check.condition_tree() {
            Condition::Leaf(leaf) => {
                assert_eq!(leaf.op, OpSpec::plain(BaseOp::IsEmpty));
            }
            _ => panic!("expected leaf"),
        }

        let meta = check.result_metadata().unwrap();
        assert!(meta["remediation"].as_str().unwrap().contains("public IP"));
    }

    #[test]
    fn test_condition_list_with_or_logic() {
        let yaml = r#"
rule_id: kms_key_rotation
for_each: keys
logic: OR
conditions:
  - var: item.KeyManager
    op: equals
    expected: AWS
  - var: item.RotationEnabled
    op: equals
    expected: true
"#;
        let check: CheckDef = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(check.logic, Logic::Or);
        assert!(matches!(check.condition_tree(), Condition::Any { any } if any.len() == 2));
    }

    #[test]
    fn test_default_logic_is_and() {
        let yaml = r#"
rule_id: r
for_each: d
conditions:
  - var: item.a
    op: not_empty
  - var: item.b
    op: not_empty
"#;
        let check: CheckDef = serde_yaml::from_str(yaml).unwrap();
        assert!(matches!(check.condition_tree(), Condition::All { .. }));
    }

    #[test]
    fn test_default_severity_is_medium() {
        let yaml = r#"
rule_id: r
for_each: d
conditions:
  var: item.a
  op: not_empty
"#;
        let check: CheckDef = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(check.severity, Severity::Medium);
    }
}
