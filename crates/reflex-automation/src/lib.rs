//! Trigger and rule layer for the Reflex engine
//!
//! This crate provides the declarative half of the engine: named trigger
//! predicates over incoming events, and prioritized rules binding triggers
//! to remediation actions.
//!
//! # Architecture
//!
//! ```text
//! EVENT → TRIGGERS (match) → RULES (priority order) → ACTIONS
//! ```
//!
//! - **Triggers**: named predicates deciding whether remediation should be
//!   considered for an event
//! - **Rules**: prioritized bindings from a trigger to an action, retry
//!   policy, and optional rollback
//! - **Evaluator**: matches one event against the trigger registry with
//!   per-trigger error isolation
//!
//! # Key Types
//!
//! - [`Trigger`] / [`TriggerRegistry`] - trigger definitions and storage
//! - [`Condition`] - declarative and custom predicates
//! - [`TriggerEvaluator`] - event matching
//! - [`Rule`] / [`RuleSpec`] / [`RuleRegistry`] - rule definitions and storage
//! - [`RetryPolicy`] - bounded attempts with constant inter-attempt delay

pub mod evaluator;
pub mod rule;
pub mod trigger;

pub use evaluator::{TriggerEvaluator, TriggerMatch};
pub use rule::{ActionFn, RetryPolicy, RollbackFn, Rule, RuleRegistry, RuleSpec};
pub use trigger::{Condition, ConditionError, ConditionResult, Trigger, TriggerRegistry};
