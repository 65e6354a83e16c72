//! Rule set loading and load-time validation
//!
//! Every structural problem (duplicate ids, missing `for_each` targets,
//! unknown action names) is rejected here, before the engine makes any
//! provider call. Unknown operators never reach this point: they already
//! fail during deserialization.

use posture_core::{ActionRegistry, Error, Result};
use std::collections::HashSet;
use std::path::Path;
use tracing::{debug, info};

use crate::RuleSet;

/// Load every rule set in a directory, optionally filtered by service.
///
/// Files must end in `.yaml` or `.yml`; anything else is ignored. Files
/// are visited in sorted order so runs are deterministic.
pub fn load_dir(dir: impl AsRef<Path>, services: Option<&[String]>) -> Result<Vec<RuleSet>> {
    let dir = dir.as_ref();
    let mut paths: Vec<_> = std::fs::read_dir(dir)?
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|path| {
            matches!(
                path.extension().and_then(|e| e.to_str()),
                Some("yaml") | Some("yml")
            )
        })
        .collect();
    paths.sort();

    let mut rulesets = Vec::new();
    for path in paths {
        let ruleset = RuleSet::from_file(&path).map_err(|e| {
            Error::load("unknown", path.display().to_string(), e.to_string())
        })?;

        if let Some(wanted) = services {
            if !wanted.iter().any(|s| s == &ruleset.service) {
                debug!(service = %ruleset.service, "skipping unselected service");
                continue;
            }
        }

        debug!(
            service = %ruleset.service,
            path = %path.display(),
            steps = ruleset.discovery.len(),
            checks = ruleset.checks.len(),
            "loaded rule set"
        );
        rulesets.push(ruleset);
    }

    validate_all(&rulesets)?;
    info!(count = rulesets.len(), "rule sets loaded");
    Ok(rulesets)
}

/// Validate a collection of rule sets, including cross-set rule id uniqueness
pub fn validate_all(rulesets: &[RuleSet]) -> Result<()> {
    let mut seen_rules: HashSet<&str> = HashSet::new();

    for ruleset in rulesets {
        validate(ruleset)?;

        for check in &ruleset.checks {
            if !seen_rules.insert(&check.rule_id) {
                return Err(Error::load(
                    &ruleset.service,
                    &check.rule_id,
                    "duplicate rule_id across rule sets",
                ));
            }
        }
    }

    Ok(())
}

/// Validate one rule set's internal references
pub fn validate(ruleset: &RuleSet) -> Result<()> {
    let mut step_ids: HashSet<&str> = HashSet::new();
    for step in &ruleset.discovery {
        if !step_ids.insert(&step.discovery_id) {
            return Err(Error::load(
                &ruleset.service,
                &step.discovery_id,
                "duplicate discovery_id",
            ));
        }

        if step.calls.is_empty() {
            return Err(Error::load(
                &ruleset.service,
                &step.discovery_id,
                "discovery step has no calls",
            ));
        }

        if step.for_each.is_some() && step.param.is_none() {
            return Err(Error::load(
                &ruleset.service,
                &step.discovery_id,
                "chained step must name a param for the loop variable",
            ));
        }
    }

    for step in &ruleset.discovery {
        if let Some(target) = &step.for_each {
            if !step_ids.contains(target.as_str()) {
                return Err(Error::load(
                    &ruleset.service,
                    &step.discovery_id,
                    format!("for_each references unknown discovery target '{target}'"),
                ));
            }
        }
    }

    for check in &ruleset.checks {
        if !step_ids.contains(check.for_each.as_str()) {
            return Err(Error::load(
                &ruleset.service,
                &check.rule_id,
                format!("for_each references unknown discovery target '{}'", check.for_each),
            ));
        }
    }

    Ok(())
}

/// Reject rule sets that name actions the registry does not provide
pub fn validate_actions(ruleset: &RuleSet, registry: &dyn ActionRegistry) -> Result<()> {
    for step in &ruleset.discovery {
        for call in &step.calls {
            if !registry.contains(&call.action) {
                return Err(Error::load(
                    &ruleset.service,
                    &step.discovery_id,
                    format!("unknown action '{}'", call.action),
                ));
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    const VALID: &str = r#"
service: s3
discovery:
  - discovery_id: buckets
    calls:
      - action: "s3:ListBuckets"
        save_as: listing
    emit:
      items_for: "listing.Buckets"
checks:
  - rule_id: s3_bucket_named
    for_each: buckets
    conditions:
      var: item.Name
      op: not_empty
"#;

    #[test]
    fn test_valid_ruleset_passes() {
        let ruleset = RuleSet::from_yaml(VALID).unwrap();
        validate(&ruleset).unwrap();
    }

    #[test]
    fn test_duplicate_discovery_id_rejected() {
        let yaml = r#"
service: s3
discovery:
  - discovery_id: buckets
    calls:
      - action: "s3:ListBuckets"
        save_as: a
    emit:
      items_for: "a.Buckets"
  - discovery_id: buckets
    calls:
      - action: "s3:ListBuckets"
        save_as: b
    emit:
      items_for: "b.Buckets"
"#;
        let ruleset = RuleSet::from_yaml(yaml).unwrap();
        let err = validate(&ruleset).unwrap_err();
        assert!(err.to_string().contains("duplicate discovery_id"));
    }

    #[test]
    fn test_check_with_unknown_target_rejected() {
        let yaml = r#"
service: s3
discovery:
  - discovery_id: buckets
    calls:
      - action: "s3:ListBuckets"
        save_as: listing
    emit:
      items_for: "listing.Buckets"
checks:
  - rule_id: r1
    for_each: nonexistent
    conditions:
      var: item.Name
      op: not_empty
"#;
        let ruleset = RuleSet::from_yaml(yaml).unwrap();
        let err = validate(&ruleset).unwrap_err();
        assert!(err.to_string().contains("unknown discovery target 'nonexistent'"));
        assert!(err.to_string().contains("r1"));
    }

    #[test]
    fn test_chained_step_without_param_rejected() {
        let yaml = r#"
service: s3
discovery:
  - discovery_id: buckets
    calls:
      - action: "s3:ListBuckets"
        save_as: listing
    emit:
      items_for: "listing.Buckets"
  - discovery_id: versioning
    for_each: buckets
    calls:
      - action: "s3:GetBucketVersioning"
        save_as: v
    emit:
      item:
        status: "v.Status"
"#;
        let ruleset = RuleSet::from_yaml(yaml).unwrap();
        assert!(validate(&ruleset).is_err());
    }

    #[test]
    fn test_load_dir_is_sorted_and_filtered() {
        let dir = tempfile::tempdir().unwrap();
        for (name, service) in [("b_iam.yaml", "iam"), ("a_s3.yaml", "s3")] {
            let mut file = std::fs::File::create(dir.path().join(name)).unwrap();
            let body = VALID.replace("service: s3", &format!("service: {service}"));
            // Rule ids must stay unique across sets
            let body = body.replace("s3_bucket_named", &format!("{service}_named"));
            file.write_all(body.as_bytes()).unwrap();
        }

        let all = load_dir(dir.path(), None).unwrap();
        assert_eq!(all.len(), 2);
        assert_eq!(all[0].service, "s3");

        let only_iam = load_dir(dir.path(), Some(&["iam".to_string()])).unwrap();
        assert_eq!(only_iam.len(), 1);
        assert_eq!(only_iam[0].service, "iam");
    }
}
