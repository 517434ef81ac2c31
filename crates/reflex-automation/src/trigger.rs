//! Trigger definitions and registry
//!
//! A trigger is a named predicate over incoming events. Triggers are pure
//! data: evaluation lives in [`crate::evaluator`], dispatch in the engine
//! crate.

use chrono::{DateTime, Utc};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, info, warn};
use ulid::Ulid;

use reflex_core::{EngineEvent, EventPayload, Severity, TriggerKind};

/// Condition evaluation errors
#[derive(Debug, Error)]
pub enum ConditionError {
    #[error("condition expects a {expected} payload, got {actual}")]
    PayloadMismatch {
        expected: TriggerKind,
        actual: TriggerKind,
    },

    #[error("invalid condition parameter: {0}")]
    InvalidParameter(String),

    #[error("predicate failed: {0}")]
    Predicate(String),
}

/// Result type for condition evaluation
pub type ConditionResult<T> = Result<T, ConditionError>;

type PredicateFn = dyn Fn(&EngineEvent) -> ConditionResult<bool> + Send + Sync;

/// Predicate deciding whether a trigger matches an event
///
/// Declarative variants evaluate against the payload shape of their kind; a
/// mismatched payload is an error, which the evaluator isolates to the
/// offending trigger.
#[derive(Clone)]
pub enum Condition {
    /// Threshold events whose value exceeds their configured threshold
    ThresholdExceeded,

    /// Anomaly events with a score at or above the given limit
    AnomalyAbove { score: f64 },

    /// Failure events at or above the given severity
    SeverityAtLeast { severity: Severity },

    /// Deadline events due within the window (or already overdue)
    DeadlineWithin { within: Duration },

    /// Matches every event of the trigger's kind
    Always,

    /// Arbitrary predicate over the full event
    Predicate(Arc<PredicateFn>),
}

impl Condition {
    /// Wrap a closure as a custom predicate condition
    pub fn predicate<F>(f: F) -> Self
    where
        F: Fn(&EngineEvent) -> ConditionResult<bool> + Send + Sync + 'static,
    {
        Condition::Predicate(Arc::new(f))
    }

    /// Evaluate this condition against an event
    pub fn evaluate(&self, event: &EngineEvent) -> ConditionResult<bool> {
        match self {
            Condition::ThresholdExceeded => match &event.payload {
                EventPayload::Threshold {
                    value, threshold, ..
                } => Ok(value > threshold),
                other => Err(mismatch(TriggerKind::Threshold, other)),
            },

            Condition::AnomalyAbove { score } => match &event.payload {
                EventPayload::Anomaly { score: actual, .. } => Ok(actual >= score),
                other => Err(mismatch(TriggerKind::Anomaly, other)),
            },

            Condition::SeverityAtLeast { severity } => match &event.payload {
                EventPayload::Failure {
                    severity: actual, ..
                } => Ok(actual >= severity),
                other => Err(mismatch(TriggerKind::Failure, other)),
            },

            Condition::DeadlineWithin { within } => match &event.payload {
                EventPayload::Deadline { due, .. } => {
                    let within = chrono::Duration::from_std(*within)
                        .map_err(|e| ConditionError::InvalidParameter(e.to_string()))?;
                    Ok(*due <= Utc::now() + within)
                }
                other => Err(mismatch(TriggerKind::Deadline, other)),
            },

            Condition::Always => Ok(true),

            Condition::Predicate(f) => f(event),
        }
    }
}

fn mismatch(expected: TriggerKind, actual: &EventPayload) -> ConditionError {
    ConditionError::PayloadMismatch {
        expected,
        actual: actual.kind(),
    }
}

impl fmt::Debug for Condition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Condition::ThresholdExceeded => f.write_str("ThresholdExceeded"),
            Condition::AnomalyAbove { score } => {
                f.debug_struct("AnomalyAbove").field("score", score).finish()
            }
            Condition::SeverityAtLeast { severity } => f
                .debug_struct("SeverityAtLeast")
                .field("severity", severity)
                .finish(),
            Condition::DeadlineWithin { within } => f
                .debug_struct("DeadlineWithin")
                .field("within", within)
                .finish(),
            Condition::Always => f.write_str("Always"),
            Condition::Predicate(_) => f.write_str("Predicate(..)"),
        }
    }
}

/// A named predicate over incoming events
#[derive(Debug, Clone)]
pub struct Trigger {
    /// Unique identifier (ULID if not supplied)
    pub id: String,

    /// The payload kind this trigger considers
    pub kind: TriggerKind,

    /// Human-readable name
    pub name: String,

    /// Predicate deciding whether the trigger matches
    pub condition: Condition,

    /// Disabled triggers never match
    pub enabled: bool,

    /// Registration sequence stamped by the registry; the deterministic
    /// tie-break key wherever registration order matters
    pub seq: u64,

    /// Last time this trigger matched an event
    pub last_matched: Option<DateTime<Utc>>,
}

impl Trigger {
    /// Create an enabled trigger with a generated id
    pub fn new(kind: TriggerKind, name: impl Into<String>, condition: Condition) -> Self {
        Self {
            id: Ulid::new().to_string(),
            kind,
            name: name.into(),
            condition,
            enabled: true,
            seq: 0,
            last_matched: None,
        }
    }

    /// Use a specific id
    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = id.into();
        self
    }

    /// Start out disabled
    pub fn disabled(mut self) -> Self {
        self.enabled = false;
        self
    }
}

/// Holds all registered triggers
///
/// All mutating calls tolerate unknown or duplicate ids as no-ops: registry
/// misuse is logged, never fatal.
pub struct TriggerRegistry {
    triggers: DashMap<String, Trigger>,
    next_seq: AtomicU64,
}

impl TriggerRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self {
            triggers: DashMap::new(),
            next_seq: AtomicU64::new(0),
        }
    }

    /// Register a trigger, returning its id
    ///
    /// A duplicate id leaves the existing trigger untouched.
    pub fn add(&self, mut trigger: Trigger) -> String {
        let id = trigger.id.clone();
        match self.triggers.entry(id.clone()) {
            Entry::Occupied(_) => {
                warn!(trigger_id = %id, "Ignoring duplicate trigger registration");
            }
            Entry::Vacant(entry) => {
                trigger.seq = self.next_seq.fetch_add(1, Ordering::SeqCst);
                info!(trigger_id = %id, name = %trigger.name, kind = %trigger.kind, "Registered trigger");
                entry.insert(trigger);
            }
        }
        id
    }

    /// Enable or disable a trigger; unknown ids are a no-op
    pub fn set_enabled(&self, id: &str, enabled: bool) {
        match self.triggers.get_mut(id) {
            Some(mut trigger) => {
                trigger.enabled = enabled;
                debug!(trigger_id = %id, enabled, "Set trigger enabled");
            }
            None => warn!(trigger_id = %id, "Ignoring enable toggle for unknown trigger"),
        }
    }

    /// Flip a trigger's enabled flag, returning the new state
    pub fn toggle(&self, id: &str) -> Option<bool> {
        let mut trigger = self.triggers.get_mut(id)?;
        trigger.enabled = !trigger.enabled;
        debug!(trigger_id = %id, enabled = trigger.enabled, "Toggled trigger");
        Some(trigger.enabled)
    }

    /// Remove a trigger; unknown ids are a no-op
    pub fn remove(&self, id: &str) -> Option<Trigger> {
        let removed = self.triggers.remove(id).map(|(_, t)| t);
        match &removed {
            Some(t) => info!(trigger_id = %id, name = %t.name, "Removed trigger"),
            None => warn!(trigger_id = %id, "Ignoring removal of unknown trigger"),
        }
        removed
    }

    /// Record that a trigger just matched an event
    pub fn mark_matched(&self, id: &str) {
        if let Some(mut trigger) = self.triggers.get_mut(id) {
            trigger.last_matched = Some(Utc::now());
        }
    }

    /// Get a trigger by id
    pub fn get(&self, id: &str) -> Option<Trigger> {
        self.triggers.get(id).map(|t| t.clone())
    }

    /// Snapshot of all triggers in registration order
    pub fn snapshot(&self) -> Vec<Trigger> {
        let mut triggers: Vec<Trigger> = self.triggers.iter().map(|t| t.clone()).collect();
        triggers.sort_by_key(|t| t.seq);
        triggers
    }

    /// Number of registered triggers
    pub fn len(&self) -> usize {
        self.triggers.len()
    }

    /// Whether the registry is empty
    pub fn is_empty(&self) -> bool {
        self.triggers.is_empty()
    }
}

impl Default for TriggerRegistry {
    fn default() -> Self {
        Self::new()
    }
}
