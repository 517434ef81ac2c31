//! Event types for the Reflex engine
//!
//! Events are the input to the engine. Each event carries a typed payload
//! (one shape per trigger kind) plus free-form attributes, so conditions
//! receive validated fields instead of an untyped blob.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

use crate::Context;

/// Severity attached to failure events
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Info,
    Warning,
    Error,
    Critical,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Severity::Info => "info",
            Severity::Warning => "warning",
            Severity::Error => "error",
            Severity::Critical => "critical",
        };
        write!(f, "{}", s)
    }
}

/// The categories of runtime signals the engine reacts to
///
/// Every trigger declares one kind and only considers events whose payload
/// carries that kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TriggerKind {
    Failure,
    Anomaly,
    Deadline,
    Threshold,
}

impl fmt::Display for TriggerKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            TriggerKind::Failure => "failure",
            TriggerKind::Anomaly => "anomaly",
            TriggerKind::Deadline => "deadline",
            TriggerKind::Threshold => "threshold",
        };
        write!(f, "{}", s)
    }
}

/// Typed event payload, one variant per trigger kind
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum EventPayload {
    /// Something broke: a crash, a failed job, a rejected request
    Failure {
        severity: Severity,
        message: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        source: Option<String>,
    },

    /// A metric drifted from its learned baseline
    Anomaly { score: f64, metric: String },

    /// A tracked task is approaching or past its due time
    Deadline { due: DateTime<Utc>, task: String },

    /// A measured value compared against its configured limit
    Threshold {
        value: f64,
        threshold: f64,
        metric: String,
    },
}

impl EventPayload {
    /// The trigger kind this payload belongs to
    pub fn kind(&self) -> TriggerKind {
        match self {
            EventPayload::Failure { .. } => TriggerKind::Failure,
            EventPayload::Anomaly { .. } => TriggerKind::Anomaly,
            EventPayload::Deadline { .. } => TriggerKind::Deadline,
            EventPayload::Threshold { .. } => TriggerKind::Threshold,
        }
    }
}

/// A runtime event submitted to the engine by an external producer
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineEvent {
    /// The typed payload
    pub payload: EventPayload,

    /// Additional producer-specific fields
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub attributes: HashMap<String, serde_json::Value>,

    /// When the engine received the event
    pub received_at: DateTime<Utc>,

    /// Context tracking the origin and causality
    pub context: Context,
}

impl EngineEvent {
    /// Create a new event with current timestamp and a fresh context
    pub fn new(payload: EventPayload) -> Self {
        Self {
            payload,
            attributes: HashMap::new(),
            received_at: Utc::now(),
            context: Context::new(),
        }
    }

    /// Shorthand for a failure event
    pub fn failure(severity: Severity, message: impl Into<String>) -> Self {
        Self::new(EventPayload::Failure {
            severity,
            message: message.into(),
            source: None,
        })
    }

    /// Shorthand for an anomaly event
    pub fn anomaly(score: f64, metric: impl Into<String>) -> Self {
        Self::new(EventPayload::Anomaly {
            score,
            metric: metric.into(),
        })
    }

    /// Shorthand for a deadline event
    pub fn deadline(due: DateTime<Utc>, task: impl Into<String>) -> Self {
        Self::new(EventPayload::Deadline {
            due,
            task: task.into(),
        })
    }

    /// Shorthand for a threshold event
    pub fn threshold(value: f64, threshold: f64, metric: impl Into<String>) -> Self {
        Self::new(EventPayload::Threshold {
            value,
            threshold,
            metric: metric.into(),
        })
    }

    /// Attach a specific context
    pub fn with_context(mut self, context: Context) -> Self {
        self.context = context;
        self
    }

    /// Add a producer-specific attribute
    pub fn with_attr(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.attributes.insert(key.into(), value);
        self
    }

    /// The trigger kind of this event's payload
    pub fn kind(&self) -> TriggerKind {
        self.payload.kind()
    }
}

/// Everything a remediation action (or rollback) receives
///
/// All data an action needs is passed explicitly through this value rather
/// than captured from the surrounding scope, so callbacks stay free of
/// shared mutable state.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActionContext {
    /// Child of the triggering event's context
    pub context: Context,

    /// Snapshot of the triggering event
    pub event: EngineEvent,

    /// The trigger that matched
    pub trigger_id: String,

    /// Human-readable trigger name
    pub trigger_name: String,

    /// When the trigger matched
    pub matched_at: DateTime<Utc>,

    /// Extra variables supplied at dispatch time
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub variables: HashMap<String, serde_json::Value>,
}

impl ActionContext {
    /// Build the context handed to a rule's action for one matched trigger
    pub fn new(
        event: EngineEvent,
        trigger_id: impl Into<String>,
        trigger_name: impl Into<String>,
        matched_at: DateTime<Utc>,
    ) -> Self {
        Self {
            context: event.context.child(),
            event,
            trigger_id: trigger_id.into(),
            trigger_name: trigger_name.into(),
            matched_at,
            variables: HashMap::new(),
        }
    }

    /// Add a variable
    pub fn with_var(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.variables.insert(key.into(), value);
        self
    }

    /// Get a variable
    pub fn get_var(&self, key: &str) -> Option<&serde_json::Value> {
        self.variables.get(key)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_payload_kind_mapping() {
        assert_eq!(
            EngineEvent::failure(Severity::Error, "disk full").kind(),
            TriggerKind::Failure
        );
        assert_eq!(
            EngineEvent::anomaly(0.97, "latency_p99").kind(),
            TriggerKind::Anomaly
        );
        assert_eq!(
            EngineEvent::deadline(Utc::now(), "nightly_export").kind(),
            TriggerKind::Deadline
        );
        assert_eq!(
            EngineEvent::threshold(10.0, 5.0, "queue_depth").kind(),
            TriggerKind::Threshold
        );
    }

    #[test]
    fn test_severity_ordering() {
        assert!(Severity::Info < Severity::Warning);
        assert!(Severity::Warning < Severity::Error);
        assert!(Severity::Error < Severity::Critical);
    }

    #[test]
    fn test_payload_serde_tag() {
        let event = EngineEvent::threshold(10.0, 5.0, "cpu");
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["payload"]["type"], "threshold");
        assert_eq!(json["payload"]["value"], 10.0);

        let back: EngineEvent = serde_json::from_value(json).unwrap();
        assert_eq!(back.kind(), TriggerKind::Threshold);
    }

    #[test]
    fn test_event_attributes() {
        let event = EngineEvent::failure(Severity::Critical, "oom")
            .with_attr("host", serde_json::json!("worker-3"));
        assert_eq!(event.attributes["host"], "worker-3");
    }

    #[test]
    fn test_action_context_derives_child() {
        let event = EngineEvent::anomaly(0.9, "error_rate");
        let event_ctx_id = event.context.id.clone();
        let ctx = ActionContext::new(event, "t1", "error spike", Utc::now());

        assert_eq!(ctx.context.parent_id.as_deref(), Some(event_ctx_id.as_str()));
        assert_eq!(ctx.trigger_id, "t1");
    }

    #[test]
    fn test_action_context_variables() {
        let event = EngineEvent::anomaly(0.9, "error_rate");
        let ctx = ActionContext::new(event, "t1", "error spike", Utc::now())
            .with_var("region", serde_json::json!("eu-west-1"));

        assert_eq!(ctx.get_var("region"), Some(&serde_json::json!("eu-west-1")));
        assert_eq!(ctx.get_var("missing"), None);
    }
}
