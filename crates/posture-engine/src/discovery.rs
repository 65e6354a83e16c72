//! Discovery executor
//!
//! Walks a validated plan, invokes the action registry per step, and
//! turns raw responses into named item streams. Independent steps run in
//! parallel under one bounded worker pool; a chained step fans out over
//! its parent's items, also bounded. Every provider call is capped by a
//! per-call timeout and the run-level cancellation token.

use posture_rules::{ActionCall, DiscoveryStep, Emit, OnError, RuleSet};
use posture_core::ActionRegistry;
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio::time::timeout;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::item::Item;
use crate::planner::Plan;
use crate::template::{Context, Resolved, TemplateResolver};

/// Per-step execution state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepState {
    /// Every call and emission succeeded
    Succeeded,
    /// `on_error: continue` suppressed at least one branch failure, but
    /// a usable stream was still produced
    PartiallySucceeded,
    /// A call failed without `on_error: continue`; downstream steps skip
    Failed,
    /// Never ran: cancelled, or downstream of a failed step
    Skipped,
}

/// Result of executing one discovery step
#[derive(Debug, Clone)]
pub struct StepOutcome {
    /// The step this outcome belongs to
    pub discovery_id: String,

    /// Terminal state of the step
    pub state: StepState,

    /// Emitted items, in parent order (deterministic across runs)
    pub items: Vec<Item>,

    /// Branch failures suppressed by `on_error: continue`
    pub suppressed_failures: usize,

    /// Root-cause message when the step failed or was skipped
    pub failure: Option<String>,
}

impl StepOutcome {
    fn skipped(discovery_id: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            discovery_id: discovery_id.into(),
            state: StepState::Skipped,
            items: Vec::new(),
            suppressed_failures: 0,
            failure: Some(reason.into()),
        }
    }

    fn failed(discovery_id: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            discovery_id: discovery_id.into(),
            state: StepState::Failed,
            items: Vec::new(),
            suppressed_failures: 0,
            failure: Some(reason.into()),
        }
    }

    /// Whether this step produced a usable item stream
    pub fn is_usable(&self) -> bool {
        matches!(
            self.state,
            StepState::Succeeded | StepState::PartiallySucceeded
        )
    }
}

/// All item streams produced by one run, keyed by discovery id
#[derive(Debug, Clone, Default)]
pub struct DiscoveryOutcome {
    /// Step outcomes in plan order
    steps: Vec<StepOutcome>,
}

impl DiscoveryOutcome {
    /// Outcome for one discovery id
    pub fn stream(&self, discovery_id: &str) -> Option<&StepOutcome> {
        self.steps.iter().find(|s| s.discovery_id == discovery_id)
    }

    /// All step outcomes, in plan order
    pub fn steps(&self) -> &[StepOutcome] {
        &self.steps
    }

    /// Total branch failures suppressed by `on_error: continue`
    pub fn suppressed_failures(&self) -> usize {
        self.steps.iter().map(|s| s.suppressed_failures).sum()
    }

    /// Root-cause failures, once per failed step (skipped descendants
    /// do not repeat their ancestor's failure)
    pub fn failures(&self) -> Vec<String> {
        self.steps
            .iter()
            .filter(|s| s.state == StepState::Failed)
            .filter_map(|s| s.failure.clone())
            .collect()
    }
}

/// How one provider call ended
enum CallFailure {
    /// The run-level cancellation signal fired
    Cancelled,
    /// Timeout or provider error
    Failed(String),
}

/// Executes discovery plans against an action registry
pub struct DiscoveryExecutor {
    registry: Arc<dyn ActionRegistry>,
    resolver: Arc<TemplateResolver>,
    pool: Arc<Semaphore>,
    call_timeout: Duration,
    cancel: CancellationToken,
}

impl DiscoveryExecutor {
    /// Create an executor with a worker pool of the given width
    pub fn new(
        registry: Arc<dyn ActionRegistry>,
        workers: usize,
        call_timeout: Duration,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            registry,
            resolver: Arc::new(TemplateResolver::new()),
            pool: Arc::new(Semaphore::new(workers.max(1))),
            call_timeout,
            cancel,
        }
    }

    /// Execute a plan, producing one item stream per discovery id.
    ///
    /// A fresh run re-executes from scratch; outcomes are not reusable
    /// across runs.
    pub async fn execute(&self, ruleset: &RuleSet, plan: &Plan) -> DiscoveryOutcome {
        let mut completed: HashMap<String, StepOutcome> = HashMap::new();
        let mut pending: Vec<usize> = plan.order().to_vec();
        let mut in_flight: JoinSet<StepOutcome> = JoinSet::new();

        loop {
            // Spawn everything currently actionable. Pending is in
            // topological order, so a skip recorded here is visible to
            // descendants later in the same pass.
            let mut waiting = Vec::new();
            for idx in pending.drain(..) {
                let step = &ruleset.discovery[idx];
                let id = step.discovery_id.clone();

                if self.cancel.is_cancelled() {
                    completed.insert(id.clone(), StepOutcome::skipped(id, "run cancelled"));
                    continue;
                }

                let parents = match &step.for_each {
                    None => None,
                    Some(target) => match completed.get(target) {
                        None => {
                            waiting.push(idx);
                            continue;
                        }
                        Some(parent) if !parent.is_usable() => {
                            completed.insert(
                                id.clone(),
                                StepOutcome::skipped(
                                    id,
                                    format!("upstream step '{target}' did not complete"),
                                ),
                            );
                            continue;
                        }
                        Some(parent) => Some(parent.items.clone()),
                    },
                };

                let task = StepTask {
                    service: ruleset.service.clone(),
                    step: step.clone(),
                    parents,
                    registry: Arc::clone(&self.registry),
                    resolver: Arc::clone(&self.resolver),
                    pool: Arc::clone(&self.pool),
                    call_timeout: self.call_timeout,
                    cancel: self.cancel.clone(),
                };
                in_flight.spawn(task.run());
            }
            pending = waiting;

            match in_flight.join_next().await {
                Some(Ok(outcome)) => {
                    completed.insert(outcome.discovery_id.clone(), outcome);
                }
                Some(Err(join_err)) => {
                    // A panicked step must not take the run down; the
                    // step id is unknown here, so it surfaces when its
                    // descendants report the missing upstream
                    warn!(error = %join_err, "discovery task panicked");
                }
                None => {
                    if pending.is_empty() {
                        break;
                    }
                    // Nothing running and nothing became ready: only
                    // reachable when a panicked task left a hole
                    for idx in pending.drain(..) {
                        let id = ruleset.discovery[idx].discovery_id.clone();
                        completed.insert(
                            id.clone(),
                            StepOutcome::skipped(id, "upstream step did not complete"),
                        );
                    }
                    break;
                }
            }
        }

        // Assemble in plan order for deterministic output
        let steps = plan
            .order()
            .iter()
            .filter_map(|&idx| completed.remove(&ruleset.discovery[idx].discovery_id))
            .collect();
        DiscoveryOutcome { steps }
    }
}

/// Owned state for one spawned step execution
struct StepTask {
    service: String,
    step: DiscoveryStep,
    parents: Option<Vec<Item>>,
    registry: Arc<dyn ActionRegistry>,
    resolver: Arc<TemplateResolver>,
    pool: Arc<Semaphore>,
    call_timeout: Duration,
    cancel: CancellationToken,
}

impl StepTask {
    async fn run(self) -> StepOutcome {
        let id = self.step.discovery_id.clone();
        debug!(service = %self.service, step = %id, "discovery step running");

        let outcome = match &self.parents {
            None => self.run_root().await,
            Some(parents) => self.run_chained(parents.clone()).await,
        };

        debug!(
            service = %self.service,
            step = %id,
            state = ?outcome.state,
            items = outcome.items.len(),
            suppressed = outcome.suppressed_failures,
            "discovery step finished"
        );
        outcome
    }

    async fn run_root(&self) -> StepOutcome {
        let id = &self.step.discovery_id;
        let mut ctx = Context::new();
        let mut suppressed = 0usize;

        for call in &self.step.calls {
            match self.invoke(call, &ctx).await {
                Ok(response) => ctx.set(call.save_as.clone(), response),
                Err(CallFailure::Cancelled) => {
                    return StepOutcome::skipped(id.clone(), "run cancelled");
                }
                Err(CallFailure::Failed(reason)) => match call.on_error {
                    OnError::Continue => {
                        warn!(step = %id, action = %call.action, %reason, "call failed, continuing");
                        suppressed += 1;
                        ctx.set(call.save_as.clone(), Value::Null);
                    }
                    OnError::Fail => return StepOutcome::failed(id.clone(), reason),
                },
            }
        }

        match self.emit(&ctx, None) {
            Ok(items) => StepOutcome {
                discovery_id: id.clone(),
                state: if suppressed > 0 {
                    StepState::PartiallySucceeded
                } else {
                    StepState::Succeeded
                },
                items,
                suppressed_failures: suppressed,
                failure: None,
            },
            Err(reason) => StepOutcome::failed(id.clone(), reason),
        }
    }

    async fn run_chained(&self, parents: Vec<Item>) -> StepOutcome {
        let id = &self.step.discovery_id;
        let param = self
            .step
            .param
            .clone()
            .unwrap_or_else(|| "item".to_string());

        enum Branch {
            Emitted(Vec<Item>),
            Suppressed(String),
            Fatal(String),
            Cancelled,
        }

        let mut branches: Vec<Option<Branch>> = (0..parents.len()).map(|_| None).collect();
        let mut tasks: JoinSet<(usize, Branch)> = JoinSet::new();

        for (index, parent) in parents.into_iter().enumerate() {
            let step = self.step.clone();
            let param = param.clone();
            let registry = Arc::clone(&self.registry);
            let resolver = Arc::clone(&self.resolver);
            let pool = Arc::clone(&self.pool);
            let call_timeout = self.call_timeout;
            let cancel = self.cancel.clone();

            tasks.spawn(async move {
                let mut ctx = Context::new();
                ctx.set(param, parent.as_value());
                ctx.set("item", parent.as_value());

                for call in &step.calls {
                    let failure = match invoke_call(
                        &registry, &resolver, &pool, call_timeout, &cancel, call, &ctx,
                    )
                    .await
                    {
                        Ok(response) => {
                            ctx.set(call.save_as.clone(), response);
                            continue;
                        }
                        Err(f) => f,
                    };
                    return match failure {
                        CallFailure::Cancelled => (index, Branch::Cancelled),
                        CallFailure::Failed(reason) => {
                            let reason =
                                format!("{} (while processing '{}')", reason, parent.resource_id());
                            match call.on_error {
                                OnError::Continue => (index, Branch::Suppressed(reason)),
                                OnError::Fail => (index, Branch::Fatal(reason)),
                            }
                        }
                    };
                }

                match emit_items(&step, &resolver, &ctx, Some(&parent)) {
                    Ok(items) => (index, Branch::Emitted(items)),
                    Err(reason) => (index, Branch::Fatal(reason)),
                }
            });
        }

        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok((index, branch)) => branches[index] = Some(branch),
                Err(join_err) => warn!(step = %id, error = %join_err, "fan-out branch panicked"),
            }
        }

        // Scan in parent order so the reported root cause and the item
        // order are deterministic
        let mut items = Vec::new();
        let mut suppressed = 0usize;
        let mut cancelled = false;
        for branch in branches.into_iter().flatten() {
            match branch {
                Branch::Emitted(emitted) => items.extend(emitted),
                Branch::Suppressed(reason) => {
                    warn!(step = %id, %reason, "branch suppressed");
                    suppressed += 1;
                }
                Branch::Fatal(reason) => return StepOutcome::failed(id.clone(), reason),
                Branch::Cancelled => cancelled = true,
            }
        }

        if cancelled {
            return StepOutcome::skipped(id.clone(), "run cancelled");
        }

        StepOutcome {
            discovery_id: id.clone(),
            state: if suppressed > 0 {
                StepState::PartiallySucceeded
            } else {
                StepState::Succeeded
            },
            items,
            suppressed_failures: suppressed,
            failure: None,
        }
    }

    async fn invoke(&self, call: &ActionCall, ctx: &Context) -> Result<Value, CallFailure> {
        invoke_call(
            &self.registry,
            &self.resolver,
            &self.pool,
            self.call_timeout,
            &self.cancel,
            call,
            ctx,
        )
        .await
    }

    fn emit(&self, ctx: &Context, parent: Option<&Item>) -> Result<Vec<Item>, String> {
        emit_items(&self.step, &self.resolver, ctx, parent)
    }
}

/// One bounded, timed, cancellable provider call
async fn invoke_call(
    registry: &Arc<dyn ActionRegistry>,
    resolver: &TemplateResolver,
    pool: &Semaphore,
    call_timeout: Duration,
    cancel: &CancellationToken,
    call: &ActionCall,
    ctx: &Context,
) -> Result<Value, CallFailure> {
    let params = resolver.render_params(&call.params, ctx);

    let _permit = tokio::select! {
        _ = cancel.cancelled() => return Err(CallFailure::Cancelled),
        permit = pool.acquire() => match permit {
            Ok(p) => p,
            Err(_) => return Err(CallFailure::Cancelled),
        },
    };

    tokio::select! {
        _ = cancel.cancelled() => Err(CallFailure::Cancelled),
        result = timeout(call_timeout, registry.invoke(&call.action, &params)) => match result {
            Err(_) => Err(CallFailure::Failed(format!(
                "action '{}' timed out after {:?}",
                call.action, call_timeout
            ))),
            Ok(Ok(response)) => Ok(response),
            Ok(Err(err)) => Err(CallFailure::Failed(err.to_string())),
        },
    }
}

/// Apply the step's `emit` projection to the saved responses
fn emit_items(
    step: &DiscoveryStep,
    resolver: &TemplateResolver,
    ctx: &Context,
    parent: Option<&Item>,
) -> Result<Vec<Item>, String> {
    let discovery_id = &step.discovery_id;

    match &step.emit {
        Emit::ItemsFor { items_for, fields } => {
            let elements = match ctx.resolve(items_for) {
                Resolved::One(Value::Array(list)) => list,
                Resolved::Many(list) => list,
                // A response legitimately missing the collection yields
                // zero items, not an error
                Resolved::Absent | Resolved::One(Value::Null) => Vec::new(),
                Resolved::One(other) => {
                    return Err(format!(
                        "emit items_for '{items_for}' did not yield a list (found {other})"
                    ))
                }
            };

            let mut items = Vec::with_capacity(elements.len());
            for (ordinal, element) in elements.into_iter().enumerate() {
                let mut element_ctx = ctx.clone();
                element_ctx.set("resource", element.clone());
                element_ctx.set("item", element.clone());

                let projected = if fields.is_empty() {
                    match element {
                        Value::Object(map) => map,
                        other => {
                            let mut map = Map::new();
                            map.insert("value".to_string(), other);
                            map
                        }
                    }
                } else {
                    project_fields(fields, resolver, &element_ctx)
                };

                // Sibling sub-items must stay distinguishable, so every
                // element gets its own segment; the ordinal stands in
                // when the element carries no identity field
                let mut item = build_item(projected, parent);
                item.push_identity(discovery_id, ordinal);
                items.push(item);
            }
            Ok(items)
        }

        Emit::Item { item: fields } => {
            let projected = project_fields(fields, resolver, ctx);
            let mut item = build_item(projected, parent);
            // A single projection without an identity field of its own
            // inherits the parent chain instead of appending a
            // placeholder ordinal
            if parent.is_none() || item.identity_hint().is_some() {
                item.push_identity(discovery_id, 0);
            }
            Ok(vec![item])
        }
    }
}

/// Resolve each named field; absent paths are omitted so the evaluator
/// can still tell absent from null
fn project_fields(
    fields: &std::collections::BTreeMap<String, String>,
    resolver: &TemplateResolver,
    ctx: &Context,
) -> Map<String, Value> {
    let mut projected = Map::new();
    for (name, expr) in fields {
        if expr.contains("{{") {
            projected.insert(name.clone(), resolver.render(expr, ctx));
            continue;
        }
        match ctx.resolve(expr) {
            Resolved::Absent => {}
            resolved => {
                if let Some(value) = resolved.into_value() {
                    projected.insert(name.clone(), value);
                }
            }
        }
    }
    projected
}

fn build_item(fields: Map<String, Value>, parent: Option<&Item>) -> Item {
    match parent {
        Some(parent) => Item::with_parent(fields, parent),
        None => Item::new(fields),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use posture_core::{ActionError, ActionResult};
    use serde_json::json;
    /// Fixture registry: action name -> response, with optional
    /// per-parameter failures
    struct TestRegistry {
        responses: HashMap<String, Value>,
        fail_when: Vec<(String, String)>,
    }

    impl TestRegistry {
        fn new(responses: Vec<(&str, Value)>) -> Self {
            Self {
                responses: responses
                    .into_iter()
                    .map(|(k, v)| (k.to_string(), v))
                    .collect(),
                fail_when: Vec::new(),
            }
        }

        /// Fail an invocation whose rendered params contain the value
        fn fail_when(mut self, action: &str, param_value: &str) -> Self {
            self.fail_when
                .push((action.to_string(), param_value.to_string()));
            self
        }
    }

    #[async_trait]
    impl ActionRegistry for TestRegistry {
        async fn invoke(&self, action: &str, params: &Map<String, Value>) -> ActionResult {
            for (fail_action, fail_value) in &self.fail_when {
                if action == fail_action
                    && params.values().any(|v| v.as_str() == Some(fail_value))
                {
                    return Err(ActionError::call(action, "simulated provider error"));
                }
            }
            // Per-parameter response lookup: "action::value" overrides
            for value in params.values() {
                if let Some(text) = value.as_str() {
                    if let Some(resp) = self.responses.get(&format!("{action}::{text}")) {
                        return Ok(resp.clone());
                    }
                }
            }
            self.responses
                .get(action)
                .cloned()
                .ok_or_else(|| ActionError::UnknownAction(action.to_string()))
        }

        fn contains(&self, action: &str) -> bool {
            self.responses.keys().any(|k| k == action || k.starts_with(&format!("{action}::")))
        }

        fn action_names(&self) -> Vec<String> {
            self.responses.keys().cloned().collect()
        }
    }

    fn executor(registry: TestRegistry) -> DiscoveryExecutor {
        DiscoveryExecutor::new(
            Arc::new(registry),
            4,
            Duration::from_secs(5),
            CancellationToken::new(),
        )
    }

    fn ruleset(yaml: &str) -> RuleSet {
        RuleSet::from_yaml(yaml).unwrap()
    }

    const CHAINED: &str = r#"
service: s3
discovery:
  - discovery_id: buckets
    calls:
      - action: "s3:ListBuckets"
        save_as: listing
    emit:
      items_for: "listing.Buckets"
      fields:
        name: "resource.Name"
  - discovery_id: versioning
    for_each: buckets
    param: bucket
    calls:
      - action: "s3:GetBucketVersioning"
        params:
          Bucket: "{{ bucket.name }}"
        save_as: v
        on_error: continue
    emit:
      item:
        name: "bucket.name"
        status: "v.Status"
"#;

    #[tokio::test]
    async fn test_root_step_emits_items() {
        let registry = TestRegistry::new(vec![(
            "s3:ListBuckets",
            json!({"Buckets": [{"Name": "a"}, {"Name": "b"}]}),
        )]);
        let rs = ruleset(
            r#"
service: s3
discovery:
  - discovery_id: buckets
    calls:
      - action: "s3:ListBuckets"
        save_as: listing
    emit:
      items_for: "listing.Buckets"
"#,
        );
        let plan = crate::planner::plan(&rs).unwrap();
        let outcome = executor(registry).execute(&rs, &plan).await;

        let stream = outcome.stream("buckets").unwrap();
        assert_eq!(stream.state, StepState::Succeeded);
        assert_eq!(stream.items.len(), 2);
        assert_eq!(stream.items[0].resource_id(), "a");
    }

    #[tokio::test]
    async fn test_chained_step_fans_out_per_parent() {
        let registry = TestRegistry::new(vec![
            (
                "s3:ListBuckets",
                json!({"Buckets": [{"Name": "a"}, {"Name": "b"}]}),
            ),
            ("s3:GetBucketVersioning::a", json!({"Status": "Enabled"})),
            ("s3:GetBucketVersioning::b", json!({"Status": "Suspended"})),
        ]);
        let rs = ruleset(CHAINED);
        let plan = crate::planner::plan(&rs).unwrap();
        let outcome = executor(registry).execute(&rs, &plan).await;

        let stream = outcome.stream("versioning").unwrap();
        assert_eq!(stream.state, StepState::Succeeded);
        assert_eq!(stream.items.len(), 2);
        // Parent order preserved regardless of task completion order
        assert_eq!(stream.items[0].fields["status"], json!("Enabled"));
        assert_eq!(stream.items[1].fields["status"], json!("Suspended"));
    }

    #[tokio::test]
    async fn test_on_error_continue_suppresses_failed_branches() {
        let buckets: Vec<Value> = (1..=5).map(|i| json!({"Name": format!("b{i}")})).collect();
        let mut responses = vec![("s3:ListBuckets", json!({"Buckets": buckets}))];
        for i in 1..=5 {
            responses.push((
                Box::leak(format!("s3:GetBucketVersioning::b{i}").into_boxed_str()),
                json!({"Status": "Enabled"}),
            ));
        }
        let registry = TestRegistry::new(responses)
            .fail_when("s3:GetBucketVersioning", "b2")
            .fail_when("s3:GetBucketVersioning", "b4");

        let rs = ruleset(CHAINED);
        let plan = crate::planner::plan(&rs).unwrap();
        let outcome = executor(registry).execute(&rs, &plan).await;

        let stream = outcome.stream("versioning").unwrap();
        assert_eq!(stream.state, StepState::PartiallySucceeded);
        assert_eq!(stream.items.len(), 3);
        assert_eq!(stream.suppressed_failures, 2);
        assert_eq!(outcome.suppressed_failures(), 2);

        let names: Vec<&str> = stream
            .items
            .iter()
            .map(|i| i.fields["name"].as_str().unwrap())
            .collect();
        assert_eq!(names, vec!["b1", "b3", "b5"]);
    }

    #[tokio::test]
    async fn test_on_error_fail_aborts_step_and_descendants() {
        let yaml = CHAINED.replace("on_error: continue", "on_error: fail");
        let registry = TestRegistry::new(vec![
            (
                "s3:ListBuckets",
                json!({"Buckets": [{"Name": "a"}, {"Name": "b"}]}),
            ),
            ("s3:GetBucketVersioning::a", json!({"Status": "Enabled"})),
        ])
        .fail_when("s3:GetBucketVersioning", "b");

        let rs = ruleset(&yaml);
        let plan = crate::planner::plan(&rs).unwrap();
        let outcome = executor(registry).execute(&rs, &plan).await;

        let stream = outcome.stream("versioning").unwrap();
        assert_eq!(stream.state, StepState::Failed);
        assert!(stream.failure.as_ref().unwrap().contains("simulated"));
        // One root cause, not one per descendant
        assert_eq!(outcome.failures().len(), 1);
    }

    #[tokio::test]
    async fn test_failed_root_skips_descendants() {
        let registry = TestRegistry::new(vec![]);
        let rs = ruleset(CHAINED);
        let plan = crate::planner::plan(&rs).unwrap();
        let outcome = executor(registry).execute(&rs, &plan).await;

        assert_eq!(outcome.stream("buckets").unwrap().state, StepState::Failed);
        assert_eq!(
            outcome.stream("versioning").unwrap().state,
            StepState::Skipped
        );
        assert_eq!(outcome.failures().len(), 1);
    }

    #[tokio::test]
    async fn test_cancellation_skips_not_yet_started_steps() {
        let registry = TestRegistry::new(vec![(
            "s3:ListBuckets",
            json!({"Buckets": [{"Name": "a"}]}),
        )]);
        let cancel = CancellationToken::new();
        cancel.cancel();
        let exec = DiscoveryExecutor::new(
            Arc::new(registry),
            4,
            Duration::from_secs(5),
            cancel,
        );

        let rs = ruleset(CHAINED);
        let plan = crate::planner::plan(&rs).unwrap();
        let outcome = exec.execute(&rs, &plan).await;

        for step in outcome.steps() {
            assert_eq!(step.state, StepState::Skipped);
        }
        assert!(outcome.failures().is_empty());
    }

    #[tokio::test]
    async fn test_anonymous_sub_items_get_distinct_identities() {
        let registry = TestRegistry::new(vec![
            ("s3:ListBuckets", json!({"Buckets": [{"Name": "data"}]})),
            (
                "s3:GetBucketPolicy::data",
                json!({"Statements": [
                    {"Effect": "Allow", "Principal": "*"},
                    {"Effect": "Deny", "Principal": "acct"},
                    {"Effect": "Allow", "Principal": "acct"}
                ]}),
            ),
        ]);
        let rs = ruleset(
            r#"
service: s3
discovery:
  - discovery_id: buckets
    calls:
      - action: "s3:ListBuckets"
        save_as: listing
    emit:
      items_for: "listing.Buckets"
      fields:
        name: "resource.Name"
  - discovery_id: statements
    for_each: buckets
    param: bucket
    calls:
      - action: "s3:GetBucketPolicy"
        params:
          Bucket: "{{ bucket.name }}"
        save_as: p
    emit:
      items_for: "p.Statements"
      fields:
        effect: "resource.Effect"
        principal: "resource.Principal"
"#,
        );
        let plan = crate::planner::plan(&rs).unwrap();
        let outcome = executor(registry).execute(&rs, &plan).await;

        // Statements have no name/id field; each sibling still gets its
        // own chain segment instead of collapsing to the bucket's id
        let ids: Vec<String> = outcome
            .stream("statements")
            .unwrap()
            .items
            .iter()
            .map(|i| i.resource_id())
            .collect();
        assert_eq!(
            ids,
            vec![
                "data / statements #0",
                "data / statements #1",
                "data / statements #2"
            ]
        );
        let unique: std::collections::HashSet<&String> = ids.iter().collect();
        assert_eq!(unique.len(), ids.len());
    }

    #[tokio::test]
    async fn test_single_object_emit() {
        let registry = TestRegistry::new(vec![(
            "iam:GetAccountSummary",
            json!({"SummaryMap": {"MFADevices": 1}}),
        )]);
        let rs = ruleset(
            r#"
service: iam
discovery:
  - discovery_id: summary
    calls:
      - action: "iam:GetAccountSummary"
        save_as: summary
    emit:
      item:
        mfa_devices: "summary.SummaryMap.MFADevices"
"#,
        );
        let plan = crate::planner::plan(&rs).unwrap();
        let outcome = executor(registry).execute(&rs, &plan).await;

        let stream = outcome.stream("summary").unwrap();
        assert_eq!(stream.items.len(), 1);
        assert_eq!(stream.items[0].fields["mfa_devices"], json!(1));
    }

    #[tokio::test]
    async fn test_absent_emit_path_yields_zero_items() {
        let registry = TestRegistry::new(vec![("x:List", json!({"Other": []}))]);
        let rs = ruleset(
            r#"
service: x
discovery:
  - discovery_id: things
    calls:
      - action: "x:List"
        save_as: r
    emit:
      items_for: "r.Things"
"#,
        );
        let plan = crate::planner::plan(&rs).unwrap();
        let outcome = executor(registry).execute(&rs, &plan).await;

        let stream = outcome.stream("things").unwrap();
        assert_eq!(stream.state, StepState::Succeeded);
        assert!(stream.items.is_empty());
    }
}
