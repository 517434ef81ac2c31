//! Rule definitions and registry
//!
//! A rule binds a trigger to a remediation action, a retry policy, and an
//! optional rollback. Rules are built through [`RuleSpec`], which makes a
//! missing action unrepresentable: the only registration-time contract that
//! can be violated is handled by the type system.

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use futures::future::BoxFuture;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};
use ulid::Ulid;

use reflex_core::ActionContext;

/// Boxed async remediation action: context in, JSON result or error out
pub type ActionFn =
    dyn Fn(ActionContext) -> BoxFuture<'static, anyhow::Result<serde_json::Value>> + Send + Sync;

/// Boxed async rollback: undoes partial side effects of a failed action
pub type RollbackFn = dyn Fn(ActionContext) -> BoxFuture<'static, anyhow::Result<()>> + Send + Sync;

/// Bounded attempts with a constant inter-attempt delay
///
/// The delay elapses only between attempts, never after the final one.
/// Callers wanting backoff compute a larger delay themselves.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetryPolicy {
    /// Total attempts allowed, at least 1
    pub max_retries: u32,

    /// Constant delay between consecutive attempts
    pub delay: Duration,
}

impl RetryPolicy {
    /// Create a policy; `max_retries` is clamped to at least one attempt
    pub fn new(max_retries: u32, delay: Duration) -> Self {
        Self {
            max_retries: max_retries.max(1),
            delay,
        }
    }

    /// Exactly one attempt, no retry
    pub fn once() -> Self {
        Self::new(1, Duration::ZERO)
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::once()
    }
}

/// A prioritized binding from a trigger to a remediation action
#[derive(Clone)]
pub struct Rule {
    /// Unique identifier (ULID if not supplied)
    pub id: String,

    /// Logical reference to a trigger; a dangling reference makes the rule
    /// unreachable, never an error
    pub trigger_id: String,

    /// Label describing what the action does, recorded on every execution
    pub action_type: String,

    /// Higher priority executes first
    pub priority: i32,

    /// Retry policy for the action
    pub retry: RetryPolicy,

    /// Whether the rollback runs after exhausted failure
    pub rollback_enabled: bool,

    /// Optional bound on a single action invocation; `None` lets the action
    /// run unbounded
    pub action_timeout: Option<Duration>,

    /// Disabled rules are never selected
    pub enabled: bool,

    /// Registration sequence stamped by the registry; the tie-break key for
    /// equal priorities
    pub seq: u64,

    /// The remediation action
    pub action: Arc<ActionFn>,

    /// Compensating action invoked after retries are exhausted
    pub rollback: Option<Arc<RollbackFn>>,
}

impl fmt::Debug for Rule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Rule")
            .field("id", &self.id)
            .field("trigger_id", &self.trigger_id)
            .field("action_type", &self.action_type)
            .field("priority", &self.priority)
            .field("retry", &self.retry)
            .field("rollback_enabled", &self.rollback_enabled)
            .field("action_timeout", &self.action_timeout)
            .field("enabled", &self.enabled)
            .field("seq", &self.seq)
            .field("rollback", &self.rollback.as_ref().map(|_| ".."))
            .finish_non_exhaustive()
    }
}

/// Builder for a [`Rule`]
///
/// ```
/// use reflex_automation::{RetryPolicy, RuleSpec};
/// use std::time::Duration;
///
/// let spec = RuleSpec::new("high_cpu", "scale_out", |_ctx| async {
///     Ok(serde_json::json!({"added_workers": 2}))
/// })
/// .with_priority(9)
/// .with_retry(RetryPolicy::new(3, Duration::from_millis(250)));
/// ```
pub struct RuleSpec {
    id: String,
    trigger_id: String,
    action_type: String,
    priority: i32,
    retry: RetryPolicy,
    rollback_enabled: bool,
    action_timeout: Option<Duration>,
    enabled: bool,
    action: Arc<ActionFn>,
    rollback: Option<Arc<RollbackFn>>,
}

impl RuleSpec {
    /// Start a rule bound to `trigger_id` with the given action
    pub fn new<F, Fut>(
        trigger_id: impl Into<String>,
        action_type: impl Into<String>,
        action: F,
    ) -> Self
    where
        F: Fn(ActionContext) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<serde_json::Value>> + Send + 'static,
    {
        Self {
            id: Ulid::new().to_string(),
            trigger_id: trigger_id.into(),
            action_type: action_type.into(),
            priority: 0,
            retry: RetryPolicy::default(),
            rollback_enabled: false,
            action_timeout: None,
            enabled: true,
            action: Arc::new(move |ctx| Box::pin(action(ctx))),
            rollback: None,
        }
    }

    /// Use a specific id
    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = id.into();
        self
    }

    /// Set the priority (higher executes first)
    pub fn with_priority(mut self, priority: i32) -> Self {
        self.priority = priority;
        self
    }

    /// Set the retry policy
    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Attach a rollback and enable it
    pub fn with_rollback<F, Fut>(mut self, rollback: F) -> Self
    where
        F: Fn(ActionContext) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
    {
        self.rollback = Some(Arc::new(move |ctx| Box::pin(rollback(ctx))));
        self.rollback_enabled = true;
        self
    }

    /// Override the rollback flag (a disabled rollback is kept but not run)
    pub fn with_rollback_enabled(mut self, enabled: bool) -> Self {
        self.rollback_enabled = enabled;
        self
    }

    /// Bound a single action invocation; a timeout counts as a failed
    /// attempt and is retried like any other failure
    pub fn with_action_timeout(mut self, timeout: Duration) -> Self {
        self.action_timeout = Some(timeout);
        self
    }

    /// Start out disabled
    pub fn disabled(mut self) -> Self {
        self.enabled = false;
        self
    }

    fn into_rule(self, seq: u64) -> Rule {
        Rule {
            id: self.id,
            trigger_id: self.trigger_id,
            action_type: self.action_type,
            priority: self.priority,
            retry: self.retry,
            rollback_enabled: self.rollback_enabled,
            action_timeout: self.action_timeout,
            enabled: self.enabled,
            seq,
            action: self.action,
            rollback: self.rollback,
        }
    }
}

/// Holds all registered rules
///
/// Mirrors [`crate::TriggerRegistry`]: unknown and duplicate ids are
/// logged no-ops.
pub struct RuleRegistry {
    rules: DashMap<String, Rule>,
    next_seq: AtomicU64,
}

impl RuleRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self {
            rules: DashMap::new(),
            next_seq: AtomicU64::new(0),
        }
    }

    /// Register a rule, returning its id
    ///
    /// A duplicate id leaves the existing rule untouched.
    pub fn add(&self, spec: RuleSpec) -> String {
        let id = spec.id.clone();
        match self.rules.entry(id.clone()) {
            Entry::Occupied(_) => {
                warn!(rule_id = %id, "Ignoring duplicate rule registration");
            }
            Entry::Vacant(entry) => {
                let rule = spec.into_rule(self.next_seq.fetch_add(1, Ordering::SeqCst));
                info!(
                    rule_id = %id,
                    trigger_id = %rule.trigger_id,
                    action_type = %rule.action_type,
                    priority = rule.priority,
                    "Registered rule"
                );
                entry.insert(rule);
            }
        }
        id
    }

    /// Enable or disable a rule; unknown ids are a no-op
    pub fn set_enabled(&self, id: &str, enabled: bool) {
        match self.rules.get_mut(id) {
            Some(mut rule) => {
                rule.enabled = enabled;
                debug!(rule_id = %id, enabled, "Set rule enabled");
            }
            None => warn!(rule_id = %id, "Ignoring enable toggle for unknown rule"),
        }
    }

    /// Flip a rule's enabled flag, returning the new state
    pub fn toggle(&self, id: &str) -> Option<bool> {
        let mut rule = self.rules.get_mut(id)?;
        rule.enabled = !rule.enabled;
        debug!(rule_id = %id, enabled = rule.enabled, "Toggled rule");
        Some(rule.enabled)
    }

    /// Remove a rule; unknown ids are a no-op
    pub fn remove(&self, id: &str) -> Option<Rule> {
        let removed = self.rules.remove(id).map(|(_, r)| r);
        match &removed {
            Some(r) => info!(rule_id = %id, action_type = %r.action_type, "Removed rule"),
            None => warn!(rule_id = %id, "Ignoring removal of unknown rule"),
        }
        removed
    }

    /// Get a rule by id
    pub fn get(&self, id: &str) -> Option<Rule> {
        self.rules.get(id).map(|r| r.clone())
    }

    /// Read-only snapshot of all rules in registration order
    pub fn snapshot(&self) -> Vec<Rule> {
        let mut rules: Vec<Rule> = self.rules.iter().map(|r| r.clone()).collect();
        rules.sort_by_key(|r| r.seq);
        rules
    }

    /// Enabled rules bound to any of the given triggers, in registration
    /// order (the coordinator applies priority ordering)
    pub fn rules_for_triggers(&self, trigger_ids: &[&str]) -> Vec<Rule> {
        let mut rules: Vec<Rule> = self
            .rules
            .iter()
            .filter(|r| r.enabled && trigger_ids.contains(&r.trigger_id.as_str()))
            .map(|r| r.clone())
            .collect();
        rules.sort_by_key(|r| r.seq);
        rules
    }

    /// Number of registered rules
    pub fn len(&self) -> usize {
        self.rules.len()
    }

    /// Whether the registry is empty
    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }
}

impl Default for RuleRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn noop_spec(trigger_id: &str) -> RuleSpec {
        RuleSpec::new(trigger_id, "noop", |_ctx| async {
            Ok(serde_json::Value::Null)
        })
    }

    #[test]
    fn test_spec_defaults() {
        let registry = RuleRegistry::new();
        let id = registry.add(noop_spec("t1"));
        let rule = registry.get(&id).unwrap();

        assert_eq!(rule.id.len(), 26); // ULID
        assert!(rule.enabled);
        assert_eq!(rule.priority, 0);
        assert_eq!(rule.retry, RetryPolicy::once());
        assert!(!rule.rollback_enabled);
        assert!(rule.rollback.is_none());
        assert!(rule.action_timeout.is_none());
    }

    #[test]
    fn test_retry_policy_clamps_to_one_attempt() {
        let policy = RetryPolicy::new(0, Duration::from_millis(50));
        assert_eq!(policy.max_retries, 1);
    }

    #[test]
    fn test_with_rollback_enables_flag() {
        let registry = RuleRegistry::new();
        let id = registry.add(noop_spec("t1").with_rollback(|_ctx| async { Ok(()) }));
        let rule = registry.get(&id).unwrap();

        assert!(rule.rollback_enabled);
        assert!(rule.rollback.is_some());
    }

    #[test]
    fn test_rollback_flag_override() {
        let registry = RuleRegistry::new();
        let id = registry.add(
            noop_spec("t1")
                .with_rollback(|_ctx| async { Ok(()) })
                .with_rollback_enabled(false),
        );
        let rule = registry.get(&id).unwrap();

        assert!(!rule.rollback_enabled);
        assert!(rule.rollback.is_some());
    }

    #[test]
    fn test_duplicate_add_is_noop() {
        let registry = RuleRegistry::new();
        registry.add(noop_spec("t1").with_id("fixed").with_priority(5));
        registry.add(noop_spec("t2").with_id("fixed").with_priority(7));

        assert_eq!(registry.len(), 1);
        let rule = registry.get("fixed").unwrap();
        assert_eq!(rule.trigger_id, "t1");
        assert_eq!(rule.priority, 5);
    }

    #[test]
    fn test_unknown_id_noops() {
        let registry = RuleRegistry::new();
        registry.set_enabled("ghost", true);
        assert!(registry.remove("ghost").is_none());
        assert!(registry.toggle("ghost").is_none());
        assert!(registry.is_empty());
    }

    #[test]
    fn test_rules_for_triggers_filters_enabled_and_bound() {
        let registry = RuleRegistry::new();
        let bound = registry.add(noop_spec("t1").with_id("bound"));
        registry.add(noop_spec("t2").with_id("other"));
        let disabled = registry.add(noop_spec("t1").with_id("off").disabled());
        registry.add(noop_spec("dangling").with_id("unreachable"));

        let selected = registry.rules_for_triggers(&["t1"]);
        assert_eq!(selected.len(), 1);
        assert_eq!(selected[0].id, bound);
        assert_ne!(selected[0].id, disabled);
    }

    #[test]
    fn test_rules_for_triggers_registration_order() {
        let registry = RuleRegistry::new();
        registry.add(noop_spec("t1").with_id("first"));
        registry.add(noop_spec("t1").with_id("second"));
        registry.add(noop_spec("t1").with_id("third"));

        let ids: Vec<String> = registry
            .rules_for_triggers(&["t1"])
            .into_iter()
            .map(|r| r.id)
            .collect();
        assert_eq!(ids, vec!["first", "second", "third"]);
    }

    #[tokio::test]
    async fn test_action_invocation() {
        use reflex_core::{ActionContext, EngineEvent};

        let registry = RuleRegistry::new();
        let id = registry.add(RuleSpec::new("t1", "echo", |ctx: ActionContext| async move {
            Ok(serde_json::json!({ "trigger": ctx.trigger_id }))
        }));
        let rule = registry.get(&id).unwrap();

        let ctx = ActionContext::new(
            EngineEvent::threshold(10.0, 5.0, "cpu"),
            "t1",
            "cpu high",
            chrono::Utc::now(),
        );
        let result = (rule.action)(ctx).await.unwrap();
        assert_eq!(result["trigger"], "t1");
    }
}
