//! Condition DSL: leaf operators, quantified list operators, and combinators
//!
//! Operator names are resolved into a closed [`OpSpec`] during
//! deserialization, so an unknown operator is a load-time error rather
//! than a runtime crash.

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::Value;
use std::fmt;
use std::str::FromStr;

/// Base comparison operators applicable to a single operand
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BaseOp {
    /// Structural equality, with `""` normalized to absent
    Equals,
    /// Negated structural equality
    NotEquals,
    /// Present and non-empty (absent, null, `""`, `[]`, `{}` all fail)
    NotEmpty,
    /// Absent or empty
    IsEmpty,
    /// Substring test on strings; any-element test on lists
    Contains,
    /// Numeric / date greater-than
    Gt,
    /// Numeric / date less-than
    Lt,
    /// Numeric / date greater-or-equal
    Gte,
    /// Numeric / date less-or-equal
    Lte,
    /// Scalar membership in the expected list
    In,
}

impl BaseOp {
    /// Canonical operator name as written in rule files
    pub fn name(&self) -> &'static str {
        match self {
            Self::Equals => "equals",
            Self::NotEquals => "not_equals",
            Self::NotEmpty => "not_empty",
            Self::IsEmpty => "is_empty",
            Self::Contains => "contains",
            Self::Gt => "gt",
            Self::Lt => "lt",
            Self::Gte => "gte",
            Self::Lte => "lte",
            Self::In => "in",
        }
    }
}

/// Quantifier prefix for list-aware operators (`all_equals`, `any_contains`, ...)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Quantifier {
    /// Every element must satisfy the base operator
    All,
    /// At least one element must satisfy the base operator
    Any,
}

/// A fully resolved operator: an optional quantifier plus a base operator
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OpSpec {
    /// `all_` / `any_` prefix, if any
    pub quantifier: Option<Quantifier>,

    /// The element-level operator
    pub base: BaseOp,
}

impl OpSpec {
    /// Plain (unquantified) operator
    pub fn plain(base: BaseOp) -> Self {
        Self {
            quantifier: None,
            base,
        }
    }

    /// Quantified operator over a list operand
    pub fn quantified(quantifier: Quantifier, base: BaseOp) -> Self {
        Self {
            quantifier: Some(quantifier),
            base,
        }
    }
}

/// Error for operator names not in the registered set
#[derive(Debug, thiserror::Error)]
#[error("unknown operator '{0}'")]
pub struct UnknownOperator(pub String);

impl FromStr for OpSpec {
    type Err = UnknownOperator;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (quantifier, rest) = if let Some(rest) = s.strip_prefix("all_") {
            (Some(Quantifier::All), rest)
        } else if let Some(rest) = s.strip_prefix("any_") {
            (Some(Quantifier::Any), rest)
        } else {
            (None, s)
        };

        let base = match rest {
            "equals" => BaseOp::Equals,
            "not_equals" => BaseOp::NotEquals,
            // `exists` is an accepted spelling of `not_empty`
            "exists" | "not_empty" => BaseOp::NotEmpty,
            "is_empty" => BaseOp::IsEmpty,
            "contains" => BaseOp::Contains,
            "gt" => BaseOp::Gt,
            "lt" => BaseOp::Lt,
            "gte" => BaseOp::Gte,
            "lte" => BaseOp::Lte,
            "in" => BaseOp::In,
            _ => return Err(UnknownOperator(s.to_string())),
        };

        Ok(Self { quantifier, base })
    }
}

impl fmt::Display for OpSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.quantifier {
            Some(Quantifier::All) => write!(f, "all_{}", self.base.name()),
            Some(Quantifier::Any) => write!(f, "any_{}", self.base.name()),
            None => write!(f, "{}", self.base.name()),
        }
    }
}

impl Serialize for OpSpec {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for OpSpec {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let name = String::deserialize(deserializer)?;
        name.parse().map_err(serde::de::Error::custom)
    }
}

/// A condition tree: a leaf comparison or an `all`/`any` combinator
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Condition {
    /// Every child must hold
    All {
        /// Nested conditions, all of which must pass
        all: Vec<Condition>,
    },

    /// At least one child must hold
    Any {
        /// Nested conditions, one of which must pass
        any: Vec<Condition>,
    },

    /// A single `{var, op, expected}` comparison
    Leaf(Leaf),
}

/// A leaf condition comparing one extracted value against an expectation
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Leaf {
    /// Path into the item, e.g. `item.SecurityGroups[].GroupId`
    pub var: String,

    /// Registered operator name
    pub op: OpSpec,

    /// Expected operand; omitted for presence operators
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expected: Option<Value>,
}
