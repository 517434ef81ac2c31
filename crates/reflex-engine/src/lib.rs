//! Reflex engine
//!
//! The execution half of Reflex: a coordinator that matches runtime events
//! against registered triggers, runs the bound remediation rules in priority
//! order with retry/rollback semantics, and records every run in a bounded
//! audit history.
//!
//! # Architecture
//!
//! ```text
//! submit_event → TriggerEvaluator → ExecutionCoordinator → ExecutionHistory
//!                     │                     │
//!               TriggerRegistry        RuleRegistry
//! ```
//!
//! The [`Engine`] is an explicit value, not a process-wide singleton:
//! construct as many independent instances as needed (isolated test runs
//! included), or share registries between instances by injecting them
//! through the [`EngineBuilder`].
//!
//! # Example
//!
//! ```
//! use reflex_engine::{Condition, Engine, EngineEvent, RuleSpec, Trigger, TriggerKind};
//!
//! # async fn demo() {
//! let engine = Engine::new();
//!
//! let trigger_id = engine.register_trigger(Trigger::new(
//!     TriggerKind::Threshold,
//!     "Queue backlog",
//!     Condition::ThresholdExceeded,
//! ));
//!
//! engine.register_rule(RuleSpec::new(&trigger_id, "drain_queue", |_ctx| async {
//!     Ok(serde_json::json!({"drained": true}))
//! }));
//!
//! let records = engine
//!     .submit_event(EngineEvent::threshold(120.0, 50.0, "queue_depth"))
//!     .await;
//! assert_eq!(records.len(), 1);
//! # }
//! ```

mod config;
mod coordinator;
mod history;

pub use config::{ConditionConfig, ConfigError, ConfigResult, EngineConfig, TriggerConfig};
pub use coordinator::ExecutionCoordinator;
pub use history::{ExecutionHistory, DEFAULT_HISTORY_CAPACITY};

// Facade re-exports so embedders depend on one crate
pub use reflex_automation::{
    ActionFn, Condition, ConditionError, RetryPolicy, RollbackFn, Rule, RuleRegistry, RuleSpec,
    Trigger, TriggerEvaluator, TriggerMatch, TriggerRegistry,
};
pub use reflex_core::{
    ActionContext, Context, EngineEvent, EngineNotice, EventPayload, ExecutionRecord,
    ExecutionStatus, NoticeBus, Severity, TriggerKind,
};

use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::debug;

/// The reactive remediation engine
///
/// A cheap `Clone`-able handle over shared internals. All operational
/// failures surface through [`ExecutionRecord`]s and [`EngineNotice`]s;
/// nothing on the evaluate/execute path returns an error.
#[derive(Clone)]
pub struct Engine {
    triggers: Arc<TriggerRegistry>,
    rules: Arc<RuleRegistry>,
    evaluator: Arc<TriggerEvaluator>,
    coordinator: Arc<ExecutionCoordinator>,
    history: Arc<ExecutionHistory>,
    notices: Arc<NoticeBus>,
}

impl Engine {
    /// Create an engine with default capacities and fresh registries
    pub fn new() -> Self {
        EngineBuilder::new().build()
    }

    /// Start building an engine
    pub fn builder() -> EngineBuilder {
        EngineBuilder::new()
    }

    /// Build an engine from a configuration, registering its trigger seeds
    pub fn from_config(config: EngineConfig) -> Self {
        let engine = Self::builder()
            .history_capacity(config.history_capacity)
            .notice_capacity(config.notice_capacity)
            .build();
        for seed in config.triggers {
            engine.register_trigger(seed.into_trigger());
        }
        engine
    }

    // --- Trigger operations ---

    /// Register a trigger, returning its id
    pub fn register_trigger(&self, trigger: Trigger) -> String {
        self.triggers.add(trigger)
    }

    /// Enable or disable a trigger; unknown ids are a no-op
    pub fn set_trigger_enabled(&self, id: &str, enabled: bool) {
        self.triggers.set_enabled(id, enabled);
    }

    /// Flip a trigger's enabled flag, returning the new state
    pub fn toggle_trigger(&self, id: &str) -> Option<bool> {
        self.triggers.toggle(id)
    }

    /// Remove a trigger; unknown ids are a no-op
    pub fn remove_trigger(&self, id: &str) -> Option<Trigger> {
        self.triggers.remove(id)
    }

    /// Snapshot of all registered triggers in registration order
    pub fn triggers(&self) -> Vec<Trigger> {
        self.triggers.snapshot()
    }

    // --- Rule operations ---

    /// Register a rule, returning its id
    pub fn register_rule(&self, spec: RuleSpec) -> String {
        self.rules.add(spec)
    }

    /// Enable or disable a rule; unknown ids are a no-op
    pub fn set_rule_enabled(&self, id: &str, enabled: bool) {
        self.rules.set_enabled(id, enabled);
    }

    /// Flip a rule's enabled flag, returning the new state
    pub fn toggle_rule(&self, id: &str) -> Option<bool> {
        self.rules.toggle(id)
    }

    /// Remove a rule; unknown ids are a no-op
    pub fn remove_rule(&self, id: &str) -> Option<Rule> {
        self.rules.remove(id)
    }

    /// Read-only snapshot of all registered rules in registration order
    pub fn rules(&self) -> Vec<Rule> {
        self.rules.snapshot()
    }

    // --- Event dispatch ---

    /// Submit one event: evaluate triggers, then run the bound rules
    ///
    /// Returns the terminal execution records of every rule that ran.
    /// Trigger and rule sets are snapshotted once for the whole cycle, so
    /// concurrent toggles cannot change behavior mid-flight.
    pub async fn submit_event(&self, event: EngineEvent) -> Vec<ExecutionRecord> {
        debug!(kind = %event.kind(), context_id = %event.context.id, "Event submitted");

        let matches = self.evaluator.check_triggers(&event);
        if matches.is_empty() {
            return Vec::new();
        }
        for matched in &matches {
            self.triggers.mark_matched(&matched.trigger_id);
        }

        self.coordinator
            .execute_triggered_rules(&matches, &event)
            .await
    }

    // --- Introspection ---

    /// Completed execution records, most recent first
    pub fn execution_history(&self, limit: Option<usize>) -> Vec<ExecutionRecord> {
        self.history.recent(limit)
    }

    /// Records currently in flight
    pub fn active_executions(&self) -> Vec<ExecutionRecord> {
        self.history.active()
    }

    /// Drop all completed records; in-flight executions are unaffected
    pub fn clear_history(&self) {
        self.history.clear();
    }

    /// Subscribe to engine-internal failure notices
    pub fn subscribe_notices(&self) -> broadcast::Receiver<EngineNotice> {
        self.notices.subscribe()
    }
}

impl Default for Engine {
    fn default() -> Self {
        Self::new()
    }
}

/// Builder for [`Engine`]
///
/// Registries can be injected to share trigger/rule sets between engine
/// instances; by default each engine gets fresh ones.
pub struct EngineBuilder {
    history_capacity: usize,
    notice_capacity: usize,
    triggers: Option<Arc<TriggerRegistry>>,
    rules: Option<Arc<RuleRegistry>>,
    seed_triggers: Vec<Trigger>,
    seed_rules: Vec<RuleSpec>,
}

impl EngineBuilder {
    /// Start with defaults
    pub fn new() -> Self {
        Self {
            history_capacity: DEFAULT_HISTORY_CAPACITY,
            notice_capacity: reflex_core::DEFAULT_NOTICE_CAPACITY,
            triggers: None,
            rules: None,
            seed_triggers: Vec::new(),
            seed_rules: Vec::new(),
        }
    }

    /// Capacity of the completed-record ring
    pub fn history_capacity(mut self, capacity: usize) -> Self {
        self.history_capacity = capacity;
        self
    }

    /// Capacity of the notice broadcast channel
    pub fn notice_capacity(mut self, capacity: usize) -> Self {
        self.notice_capacity = capacity;
        self
    }

    /// Inject a shared trigger registry
    pub fn trigger_registry(mut self, registry: Arc<TriggerRegistry>) -> Self {
        self.triggers = Some(registry);
        self
    }

    /// Inject a shared rule registry
    pub fn rule_registry(mut self, registry: Arc<RuleRegistry>) -> Self {
        self.rules = Some(registry);
        self
    }

    /// Seed a trigger at build time
    pub fn with_trigger(mut self, trigger: Trigger) -> Self {
        self.seed_triggers.push(trigger);
        self
    }

    /// Seed a rule at build time
    pub fn with_rule(mut self, spec: RuleSpec) -> Self {
        self.seed_rules.push(spec);
        self
    }

    /// Build the engine
    pub fn build(self) -> Engine {
        let triggers = self
            .triggers
            .unwrap_or_else(|| Arc::new(TriggerRegistry::new()));
        let rules = self.rules.unwrap_or_else(|| Arc::new(RuleRegistry::new()));
        let notices = Arc::new(NoticeBus::with_capacity(self.notice_capacity));
        let history = Arc::new(ExecutionHistory::with_capacity(self.history_capacity));

        for trigger in self.seed_triggers {
            triggers.add(trigger);
        }
        for spec in self.seed_rules {
            rules.add(spec);
        }

        let evaluator = Arc::new(TriggerEvaluator::new(triggers.clone(), notices.clone()));
        let coordinator = Arc::new(ExecutionCoordinator::new(
            rules.clone(),
            history.clone(),
            notices.clone(),
        ));

        Engine {
            triggers,
            rules,
            evaluator,
            coordinator,
            history,
            notices,
        }
    }
}

impl Default for EngineBuilder {
    fn default() -> Self {
        Self::new()
    }
}
