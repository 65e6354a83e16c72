//! Discovery planner: dependency validation and topological ordering
//!
//! A `for_each` reference from step B to step A is a dependency edge
//! A -> B. Planning validates every edge and produces a deterministic
//! execution order (Kahn's algorithm, ties broken by declaration order).
//! This runs at load time: a malformed rule set is rejected before any
//! provider call is made.

use posture_rules::RuleSet;
use std::collections::HashMap;

/// Planning failures
#[derive(Debug, thiserror::Error)]
pub enum PlanError {
    /// A step's `for_each` names a discovery id that does not exist
    #[error("step '{step}' references unknown discovery target '{target}'")]
    UnknownDiscoveryTarget {
        /// The offending step
        step: String,

        /// The missing target
        target: String,
    },

    /// The `for_each` references form a cycle
    #[error("cyclic dependency among discovery steps: {}", cycle.join(" -> "))]
    CyclicDependency {
        /// The cycle, starting and ending at the same step
        cycle: Vec<String>,
    },

    /// The same discovery id is declared twice
    #[error("duplicate discovery id '{0}'")]
    DuplicateDiscoveryId(String),
}

/// A validated, totally ordered execution plan
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Plan {
    /// Indices into `ruleset.discovery`, in execution order
    order: Vec<usize>,
}

impl Plan {
    /// Step indices in execution order
    pub fn order(&self) -> &[usize] {
        &self.order
    }

    /// Number of planned steps
    pub fn len(&self) -> usize {
        self.order.len()
    }

    /// Whether the plan contains no steps
    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }
}

/// Build an execution plan for a rule set's discovery steps
pub fn plan(ruleset: &RuleSet) -> Result<Plan, PlanError> {
    let steps = &ruleset.discovery;

    let mut index_of: HashMap<&str, usize> = HashMap::with_capacity(steps.len());
    for (i, step) in steps.iter().enumerate() {
        if index_of.insert(&step.discovery_id, i).is_some() {
            return Err(PlanError::DuplicateDiscoveryId(step.discovery_id.clone()));
        }
    }

    // parent index per step, plus child adjacency
    let mut parent: Vec<Option<usize>> = vec![None; steps.len()];
    let mut children: Vec<Vec<usize>> = vec![Vec::new(); steps.len()];
    for (i, step) in steps.iter().enumerate() {
        if let Some(target) = &step.for_each {
            let Some(&p) = index_of.get(target.as_str()) else {
                return Err(PlanError::UnknownDiscoveryTarget {
                    step: step.discovery_id.clone(),
                    target: target.clone(),
                });
            };
            parent[i] = Some(p);
            children[p].push(i);
        }
    }

    // Kahn's algorithm; the ready set is scanned in declaration order so
    // the resulting order is deterministic for a given file
    let mut remaining: Vec<bool> = steps.iter().map(|s| s.for_each.is_some()).collect();
    let mut order = Vec::with_capacity(steps.len());
    let mut placed = vec![false; steps.len()];

    loop {
        let mut progressed = false;
        for i in 0..steps.len() {
            if placed[i] || remaining[i] {
                continue;
            }
            placed[i] = true;
            order.push(i);
            progressed = true;
            for &child in &children[i] {
                remaining[child] = false;
            }
        }
        if !progressed {
            break;
        }
    }

    if order.len() != steps.len() {
        // Walk parent edges from any unplaced step until one repeats,
        // then report the loop itself without the lead-in tail
        let start = (0..steps.len()).find(|&i| !placed[i]).unwrap_or(0);
        let mut path: Vec<usize> = Vec::new();
        let mut first_seen_at: HashMap<usize, usize> = HashMap::new();
        let mut at = start;
        while !first_seen_at.contains_key(&at) {
            first_seen_at.insert(at, path.len());
            path.push(at);
            at = parent[at].unwrap_or(at);
        }
        let begin = first_seen_at[&at];
        let mut cycle: Vec<String> = path[begin..]
            .iter()
            .map(|&i| steps[i].discovery_id.clone())
            .collect();
        cycle.push(steps[at].discovery_id.clone());
        return Err(PlanError::CyclicDependency { cycle });
    }

    Ok(Plan { order })
}
