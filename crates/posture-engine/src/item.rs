//! Discovered items: the unit checks are evaluated against

use serde_json::{Map, Value};

use crate::template::lookup_field;

/// Field names probed, in order, when deriving an item's display identity
const IDENTITY_FIELDS: &[&str] = &["name", "id", "arn", "resource_id", "key"];

/// One discovered resource (or sub-resource) projected into named fields.
///
/// Items are ephemeral: produced by a discovery step, consumed by checks
/// within the same run, never persisted.
#[derive(Debug, Clone, PartialEq)]
pub struct Item {
    /// Extracted fields, as projected by the step's `emit`
    pub fields: Map<String, Value>,

    /// Identity chain from the root resource down to this item,
    /// e.g. `["bucket my-data", "policy statement 2"]`
    pub identity: Vec<String>,
}

impl Item {
    /// Create a root item (no parent identity)
    pub fn new(fields: Map<String, Value>) -> Self {
        Self {
            fields,
            identity: Vec::new(),
        }
    }

    /// Create an item tagged with its parent's identity chain
    pub fn with_parent(fields: Map<String, Value>, parent: &Item) -> Self {
        Self {
            fields,
            identity: parent.identity.clone(),
        }
    }

    /// Append this item's own identity segment, derived from its fields.
    /// A segment repeating the chain's tail (a child re-projecting its
    /// parent's name) is not appended twice.
    pub fn push_identity(&mut self, discovery_id: &str, ordinal: usize) {
        let segment = self.own_identity(discovery_id, ordinal);
        if self.identity.last() != Some(&segment) {
            self.identity.push(segment);
        }
    }

    /// Human-readable resource id: the identity chain joined with " / "
    pub fn resource_id(&self) -> String {
        if self.identity.is_empty() {
            "unknown".to_string()
        } else {
            self.identity.join(" / ")
        }
    }

    /// The item as a JSON object, for binding into template contexts
    pub fn as_value(&self) -> Value {
        Value::Object(self.fields.clone())
    }

    /// The item's own identity, if any field provides one
    pub fn identity_hint(&self) -> Option<String> {
        for probe in IDENTITY_FIELDS {
            if let Some(value) = lookup_field(&self.fields, probe) {
                match value {
                    Value::String(s) if !s.is_empty() => return Some(s.clone()),
                    Value::Number(n) => return Some(n.to_string()),
                    _ => {}
                }
            }
        }
        None
    }

    fn own_identity(&self, discovery_id: &str, ordinal: usize) -> String {
        self.identity_hint()
            .unwrap_or_else(|| format!("{discovery_id} #{ordinal}"))
    }
}
