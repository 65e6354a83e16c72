//! Condition evaluator
//!
//! Turns a condition tree plus one discovered item into a pass/fail
//! verdict, carrying the observed operand values for diagnostics. Type
//! mismatches the evaluator cannot reconcile surface as errors (mapped
//! to ERROR results by the check executor), never as panics.

use chrono::{DateTime, Duration, NaiveDate, NaiveDateTime, Utc};
use posture_core::{Error, Result};
use posture_rules::{BaseOp, Condition, Leaf, Quantifier};
use serde_json::Value;

use crate::item::Item;
use crate::template::{resolve_path, Resolved};

/// Outcome of evaluating a condition against one item
#[derive(Debug, Clone, PartialEq)]
pub struct Verdict {
    /// Whether the condition held
    pub passed: bool,

    /// Human diagnostics including the operand values used
    pub detail: String,
}

impl Verdict {
    fn new(passed: bool, detail: impl Into<String>) -> Self {
        Self {
            passed,
            detail: detail.into(),
        }
    }
}

/// Evaluate a condition tree against an item.
///
/// Combinators short-circuit (first falsifying child for `all`, first
/// satisfying child for `any`); evaluation has no side effects, so this
/// changes no semantics.
pub fn evaluate(condition: &Condition, item: &Item) -> Result<Verdict> {
    match condition {
        Condition::All { all } => {
            for child in all {
                let verdict = evaluate(child, item)?;
                if !verdict.passed {
                    return Ok(Verdict::new(false, verdict.detail));
                }
            }
            Ok(Verdict::new(
                true,
                format!("all {} conditions satisfied", all.len()),
            ))
        }

        Condition::Any { any } => {
            let mut details = Vec::with_capacity(any.len());
            for child in any {
                let verdict = evaluate(child, item)?;
                if verdict.passed {
                    return Ok(Verdict::new(true, verdict.detail));
                }
                details.push(verdict.detail);
            }
            Ok(Verdict::new(
                false,
                format!("no alternative satisfied: {}", details.join("; ")),
            ))
        }

        Condition::Leaf(leaf) => eval_leaf(leaf, item),
    }
}

/// Resolve a check's `var` path against the item fields.
///
/// The leading `item.` / `resource.` alias is optional; both name the
/// item itself.
fn resolve_var(item: &Item, var: &str) -> Resolved {
    let root = item.as_value();
    if var == "item" || var == "resource" {
        return Resolved::One(root);
    }
    let path = var
        .strip_prefix("item.")
        .or_else(|| var.strip_prefix("resource."))
        .unwrap_or(var);
    resolve_path(&root, path)
}

fn eval_leaf(leaf: &Leaf, item: &Item) -> Result<Verdict> {
    let observed = resolve_var(item, &leaf.var);
    let expected = leaf.expected.as_ref();

    match leaf.op.quantifier {
        None => {
            let passed = apply_base(leaf.op.base, &observed, expected, &leaf.var)?;
            Ok(Verdict::new(
                passed,
                describe(&leaf.var, &leaf.op.to_string(), expected, &observed),
            ))
        }

        Some(quantifier) => {
            let elements: Vec<Value> = match &observed {
                Resolved::Many(list) => list.clone(),
                Resolved::One(Value::Array(list)) => list.clone(),
                // A missing list is treated as empty: all_* holds
                // vacuously, any_* does not
                Resolved::Absent => Vec::new(),
                Resolved::One(other) => {
                    return Err(Error::evaluation(format!(
                        "operator '{}' requires a list at '{}', found {}",
                        leaf.op, leaf.var, other
                    )))
                }
            };

            // Every element is evaluated; no early exit, so diagnostics
            // always report the full pass count
            let mut passes = 0usize;
            for element in &elements {
                let one = Resolved::One(element.clone());
                if apply_base(leaf.op.base, &one, expected, &leaf.var)? {
                    passes += 1;
                }
            }

            let passed = match quantifier {
                Quantifier::All => passes == elements.len(),
                Quantifier::Any => passes > 0,
            };
            Ok(Verdict::new(
                passed,
                format!(
                    "{} {} {}: {}/{} elements satisfied",
                    leaf.var,
                    leaf.op,
                    expectation(expected),
                    passes,
                    elements.len()
                ),
            ))
        }
    }
}

fn describe(var: &str, op: &str, expected: Option<&Value>, observed: &Resolved) -> String {
    format!(
        "{var} {op} {} (observed {})",
        expectation(expected),
        observed.describe()
    )
}

fn expectation(expected: Option<&Value>) -> String {
    match expected {
        Some(v) => v.to_string(),
        None => "<none>".to_string(),
    }
}

fn apply_base(
    base: BaseOp,
    observed: &Resolved,
    expected: Option<&Value>,
    var: &str,
) -> Result<bool> {
    match base {
        BaseOp::Equals => Ok(equals(observed, expected)),
        BaseOp::NotEquals => Ok(!equals(observed, expected)),
        BaseOp::NotEmpty => Ok(!is_empty(observed)),
        BaseOp::IsEmpty => Ok(is_empty(observed)),
        BaseOp::Contains => contains(observed, required(expected, "contains", var)?, var),
        BaseOp::In => member_of(observed, required(expected, "in", var)?, var),
        BaseOp::Gt | BaseOp::Lt | BaseOp::Gte | BaseOp::Lte => {
            let expected = required(expected, "ordering operators", var)?;
            let left = comparable(observed, var)?;
            let right = comparable_value(expected, var)?;
            Ok(match base {
                BaseOp::Gt => left > right,
                BaseOp::Lt => left < right,
                BaseOp::Gte => left >= right,
                BaseOp::Lte => left <= right,
                _ => unreachable!(),
            })
        }
    }
}

fn required<'a>(expected: Option<&'a Value>, op: &str, var: &str) -> Result<&'a Value> {
    expected.ok_or_else(|| Error::evaluation(format!("{op} on '{var}' needs an expected value")))
}

/// Structural equality with `""` normalized to absent, so a legitimately
/// empty field compares equal to an omitted expectation instead of
/// raising a type error
fn equals(observed: &Resolved, expected: Option<&Value>) -> bool {
    let left = match observed {
        Resolved::Absent => None,
        Resolved::One(Value::String(s)) if s.is_empty() => None,
        Resolved::One(v) => Some(v.clone()),
        Resolved::Many(list) => Some(Value::Array(list.clone())),
    };
    let right = match expected {
        None => None,
        Some(Value::String(s)) if s.is_empty() => None,
        Some(v) => Some(v.clone()),
    };
    left == right
}

/// Absent, null, `""`, `[]`, and `{}` are all empty; they stay
/// distinguishable in diagnostics via [`Resolved::describe`]
fn is_empty(observed: &Resolved) -> bool {
    match observed {
        Resolved::Absent => true,
        Resolved::Many(list) => list.is_empty(),
        Resolved::One(v) => match v {
            Value::Null => true,
            Value::String(s) => s.is_empty(),
            Value::Array(a) => a.is_empty(),
            Value::Object(o) => o.is_empty(),
            _ => false,
        },
    }
}

fn contains(observed: &Resolved, expected: &Value, var: &str) -> Result<bool> {
    match observed {
        Resolved::Absent => Ok(false),
        Resolved::One(Value::String(s)) => Ok(s.contains(&value_text(expected))),
        Resolved::One(Value::Array(list)) => Ok(list.iter().any(|el| element_contains(el, expected))),
        Resolved::Many(list) => Ok(list.iter().any(|el| element_contains(el, expected))),
        Resolved::One(other) => Err(Error::evaluation(format!(
            "contains on '{var}' needs a string or list, found {other}"
        ))),
    }
}

/// Element-level test used by list-aware `contains`: substring for
/// strings, structural equality otherwise
fn element_contains(element: &Value, expected: &Value) -> bool {
    match element {
        Value::String(s) => s.contains(&value_text(expected)),
        other => other == expected,
    }
}

fn member_of(observed: &Resolved, expected: &Value, var: &str) -> Result<bool> {
    let Value::Array(candidates) = expected else {
        return Err(Error::evaluation(format!(
            "in on '{var}' needs a list of expected values"
        )));
    };
    match observed {
        Resolved::Absent => Ok(false),
        Resolved::One(v) => Ok(candidates.contains(v)),
        Resolved::Many(_) => Err(Error::evaluation(format!(
            "in on '{var}' needs a scalar, found a list"
        ))),
    }
}

fn value_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

fn comparable(observed: &Resolved, var: &str) -> Result<f64> {
    match observed {
        Resolved::One(v) => comparable_value(v, var),
        Resolved::Absent => Err(Error::evaluation(format!(
            "cannot order '{var}': value is absent"
        ))),
        Resolved::Many(_) => Err(Error::evaluation(format!(
            "cannot order '{var}': value is a list"
        ))),
    }
}

/// Numbers compare as themselves; strings are parsed as numbers, then as
/// absolute dates, then as relative-date expressions ("90 days ago"),
/// which resolve to epoch-second timestamps before comparison
fn comparable_value(value: &Value, var: &str) -> Result<f64> {
    match value {
        Value::Number(n) => n
            .as_f64()
            .ok_or_else(|| Error::evaluation(format!("non-finite number at '{var}'"))),
        Value::String(s) => {
            if let Ok(n) = s.trim().parse::<f64>() {
                return Ok(n);
            }
            if let Some(ts) = parse_timestamp(s) {
                return Ok(ts);
            }
            Err(Error::evaluation(format!(
                "cannot order '{var}': '{s}' is neither a number nor a date"
            )))
        }
        other => Err(Error::evaluation(format!(
            "cannot order '{var}': found {other}"
        ))),
    }
}

/// Epoch seconds for an absolute or relative date string
fn parse_timestamp(text: &str) -> Option<f64> {
    let text = text.trim();

    if let Some(ts) = parse_relative(text) {
        return Some(ts);
    }
    if let Ok(dt) = DateTime::parse_from_rfc3339(text) {
        return Some(dt.timestamp() as f64);
    }
    if let Ok(dt) = NaiveDateTime::parse_from_str(text, "%Y-%m-%dT%H:%M:%S") {
        return Some(dt.and_utc().timestamp() as f64);
    }
    if let Ok(d) = NaiveDate::parse_from_str(text, "%Y-%m-%d") {
        return Some(d.and_hms_opt(0, 0, 0)?.and_utc().timestamp() as f64);
    }
    None
}

/// "N <unit>s ago" relative to now
fn parse_relative(text: &str) -> Option<f64> {
    let mut words = text.split_whitespace();
    let amount: i64 = words.next()?.parse().ok()?;
    let unit = words.next()?;
    if words.next()? != "ago" || words.next().is_some() {
        return None;
    }

    let delta = match unit.trim_end_matches('s') {
        "second" => Duration::seconds(amount),
        "minute" => Duration::minutes(amount),
        "hour" => Duration::hours(amount),
        "day" => Duration::days(amount),
        "week" => Duration::weeks(amount),
        _ => return None,
    };
    Some((Utc::now() - delta).timestamp() as f64)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn item(value: Value) -> Item {
        match value {
            Value::Object(map) => Item::new(map),
            _ => panic!("expected object"),
        }
    }

    fn leaf(var: &str, op: &str, expected: Option<Value>) -> Condition {
        Condition::Leaf(Leaf {
            var: var.to_string(),
            op: op.parse().unwrap(),
            expected,
        })
    }

    #[test]
    fn test_equals_pass_and_fail() {
        let it = item(json!({"status": "ACTIVE"}));
        assert!(evaluate(&leaf("item.status", "equals", Some(json!("ACTIVE"))), &it)
            .unwrap()
            .passed);
        assert!(!evaluate(&leaf("item.status", "equals", Some(json!("DOWN"))), &it)
            .unwrap()
            .passed);
    }

    #[test]
    fn test_equals_normalizes_empty_string_to_absent() {
        let it = item(json!({"kms_key": ""}));
        // "" vs absent expectation: equal after normalization
        assert!(evaluate(&leaf("item.kms_key", "equals", None), &it)
            .unwrap()
            .passed);
        // "" vs "" : both normalize to absent
        assert!(evaluate(&leaf("item.kms_key", "equals", Some(json!(""))), &it)
            .unwrap()
            .passed);
        // missing field vs "" : also equal
        assert!(evaluate(&leaf("item.other", "equals", Some(json!(""))), &it)
            .unwrap()
            .passed);
    }

    #[test]
    fn test_not_empty_distinguishes_diagnostics() {
        let empty_list = item(json!({"tags": []}));
        let verdict = evaluate(&leaf("item.tags", "not_empty", None), &empty_list).unwrap();
        assert!(!verdict.passed);
        assert!(verdict.detail.contains("[]"));

        let absent = item(json!({}));
        let verdict = evaluate(&leaf("item.tags", "not_empty", None), &absent).unwrap();
        assert!(!verdict.passed);
        assert!(verdict.detail.contains("absent"));

        let populated = item(json!({"tags": ["x"]}));
        assert!(evaluate(&leaf("item.tags", "not_empty", None), &populated)
            .unwrap()
            .passed);
    }

    #[test]
    fn test_exists_spelling() {
        let it = item(json!({"arn": "arn:aws:x"}));
        assert!(evaluate(&leaf("item.arn", "exists", None), &it).unwrap().passed);
    }

    #[test]
    fn test_contains_on_string() {
        let it = item(json!({"policy": "\"Principal\": \"*\""}));
        assert!(
            evaluate(&leaf("item.policy", "contains", Some(json!("\"*\""))), &it)
                .unwrap()
                .passed
        );
    }

    #[test]
    fn test_contains_on_list_is_any_element() {
        // Regression: contains on a list must not be a type error
        let it = item(json!({"actions": ["s3:GetObject", "s3:PutObject"]}));
        assert!(
            evaluate(&leaf("item.actions", "contains", Some(json!("Put"))), &it)
                .unwrap()
                .passed
        );
        assert!(
            !evaluate(&leaf("item.actions", "contains", Some(json!("Delete"))), &it)
                .unwrap()
                .passed
        );
    }

    #[test]
    fn test_contains_on_number_is_eval_error() {
        let it = item(json!({"port": 22}));
        assert!(evaluate(&leaf("item.port", "contains", Some(json!("2"))), &it).is_err());
    }

    #[test]
    fn test_numeric_ordering() {
        let it = item(json!({"max_age_days": 120}));
        assert!(evaluate(&leaf("item.max_age_days", "gt", Some(json!(90))), &it)
            .unwrap()
            .passed);
        assert!(!evaluate(&leaf("item.max_age_days", "lte", Some(json!(90))), &it)
            .unwrap()
            .passed);
    }

    #[test]
    fn test_relative_date_comparison() {
        let recent = (Utc::now() - Duration::days(10)).to_rfc3339();
        let it = item(json!({"last_rotated": recent}));
        // Rotated within the last 90 days: last_rotated > "90 days ago"
        assert!(evaluate(
            &leaf("item.last_rotated", "gt", Some(json!("90 days ago"))),
            &it
        )
        .unwrap()
        .passed);

        let stale = (Utc::now() - Duration::days(200)).to_rfc3339();
        let it = item(json!({"last_rotated": stale}));
        assert!(!evaluate(
            &leaf("item.last_rotated", "gt", Some(json!("90 days ago"))),
            &it
        )
        .unwrap()
        .passed);
    }

    #[test]
    fn test_in_membership() {
        let it = item(json!({"region": "eu-west-1"}));
        assert!(evaluate(
            &leaf("item.region", "in", Some(json!(["eu-west-1", "eu-west-2"]))),
            &it
        )
        .unwrap()
        .passed);
        assert!(!evaluate(
            &leaf("item.region", "in", Some(json!(["us-east-1"]))),
            &it
        )
        .unwrap()
        .passed);
    }

    #[test]
    fn test_all_quantifier_checks_every_element() {
        // Regression for the "only first container checked" defect
        let it = item(json!({
            "containers": [
                {"privileged": false},
                {"privileged": false},
                {"privileged": true}
            ]
        }));
        let cond = leaf(
            "item.containers[].privileged",
            "all_equals",
            Some(json!(false)),
        );
        let verdict = evaluate(&cond, &it).unwrap();
        assert!(!verdict.passed);
        assert!(verdict.detail.contains("2/3"));
    }

    #[test]
    fn test_any_quantifier() {
        let it = item(json!({"ports": [80, 443, 22]}));
        assert!(evaluate(&leaf("item.ports", "any_equals", Some(json!(22))), &it)
            .unwrap()
            .passed);
        assert!(!evaluate(&leaf("item.ports", "any_equals", Some(json!(3389))), &it)
            .unwrap()
            .passed);
    }

    #[test]
    fn test_quantifier_over_absent_list() {
        let it = item(json!({}));
        // Vacuous truth for all_*, falsity for any_*
        assert!(evaluate(&leaf("item.rules", "all_equals", Some(json!("x"))), &it)
            .unwrap()
            .passed);
        assert!(!evaluate(&leaf("item.rules", "any_equals", Some(json!("x"))), &it)
            .unwrap()
            .passed);
    }

    #[test]
    fn test_quantifier_on_scalar_is_eval_error() {
        let it = item(json!({"name": "web"}));
        assert!(evaluate(&leaf("item.name", "all_equals", Some(json!("web"))), &it).is_err());
    }

    #[test]
    fn test_all_combinator_short_circuits_on_failure() {
        let it = item(json!({"a": 1, "b": 2}));
        let cond = Condition::All {
            all: vec![
                leaf("item.a", "equals", Some(json!(0))),
                // This child would error, but the first already failed
                leaf("item.b", "contains", Some(json!("x"))),
            ],
        };
        let verdict = evaluate(&cond, &it).unwrap();
        assert!(!verdict.passed);
    }

    #[test]
    fn test_any_combinator_first_success_wins() {
        let it = item(json!({"encryption": "aws:kms"}));
        let cond = Condition::Any {
            any: vec![
                leaf("item.encryption", "equals", Some(json!("aws:kms"))),
                leaf("item.encryption", "equals", Some(json!("AES256"))),
            ],
        };
        let verdict = evaluate(&cond, &it).unwrap();
        assert!(verdict.passed);
        assert!(verdict.detail.contains("aws:kms"));
    }

    #[test]
    fn test_var_alias_and_case_drift() {
        // snake_case var against PascalCase emitted field
        let it = item(json!({"PublicIpAddress": "1.2.3.4"}));
        assert!(evaluate(&leaf("item.public_ip_address", "not_empty", None), &it)
            .unwrap()
            .passed);
        assert!(evaluate(&leaf("resource.PublicIpAddress", "not_empty", None), &it)
            .unwrap()
            .passed);
    }
}
