//! Trigger evaluation and matching logic
//!
//! Matches one event against the trigger registry. Evaluation is isolated
//! per trigger: a condition error is reported and treated as a non-match
//! without aborting evaluation of the remaining triggers.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{trace, warn};

use reflex_core::{EngineEvent, EngineNotice, NoticeBus, TriggerKind};

use crate::trigger::TriggerRegistry;

/// A trigger that matched an event
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TriggerMatch {
    /// The matched trigger's id
    pub trigger_id: String,

    /// The matched trigger's name
    pub trigger_name: String,

    /// The trigger's kind
    pub kind: TriggerKind,

    /// When the match was made
    pub matched_at: DateTime<Utc>,
}

/// Evaluates events against the trigger registry
pub struct TriggerEvaluator {
    registry: Arc<TriggerRegistry>,
    notices: Arc<NoticeBus>,
}

impl TriggerEvaluator {
    /// Create an evaluator over a shared registry
    pub fn new(registry: Arc<TriggerRegistry>, notices: Arc<NoticeBus>) -> Self {
        Self { registry, notices }
    }

    /// Match one event against all enabled triggers
    ///
    /// Works on a snapshot of the registry taken once per call, so a
    /// concurrent enable/disable cannot change behavior mid-evaluation.
    /// Matches come back in registration order; callers must not rely on
    /// any stronger ordering.
    pub fn check_triggers(&self, event: &EngineEvent) -> Vec<TriggerMatch> {
        let mut matches = Vec::new();

        for trigger in self.registry.snapshot() {
            if !trigger.enabled || trigger.kind != event.kind() {
                continue;
            }

            match trigger.condition.evaluate(event) {
                Ok(true) => {
                    trace!(trigger_id = %trigger.id, name = %trigger.name, "Trigger matched");
                    matches.push(TriggerMatch {
                        trigger_id: trigger.id,
                        trigger_name: trigger.name,
                        kind: trigger.kind,
                        matched_at: Utc::now(),
                    });
                }
                Ok(false) => {}
                Err(e) => {
                    warn!(trigger_id = %trigger.id, error = %e, "Trigger condition failed to evaluate");
                    self.notices.publish(EngineNotice::ConditionEvaluationFailed {
                        trigger_id: trigger.id,
                        error: e.to_string(),
                    });
                }
            }
        }

        matches
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::trigger::{Condition, ConditionError, Trigger};
    use reflex_core::Severity;

    fn evaluator_with(triggers: Vec<Trigger>) -> (TriggerEvaluator, Arc<NoticeBus>) {
        let registry = Arc::new(TriggerRegistry::new());
        for trigger in triggers {
            registry.add(trigger);
        }
        let notices = Arc::new(NoticeBus::new());
        (TriggerEvaluator::new(registry, notices.clone()), notices)
    }

    #[test]
    fn test_matches_exactly_the_enabled_true_conditions() {
        let (evaluator, _notices) = evaluator_with(vec![
            Trigger::new(TriggerKind::Threshold, "breach", Condition::ThresholdExceeded)
                .with_id("breach"),
            Trigger::new(TriggerKind::Threshold, "never", Condition::predicate(|_| Ok(false)))
                .with_id("never"),
            Trigger::new(TriggerKind::Threshold, "off", Condition::Always)
                .with_id("off")
                .disabled(),
            Trigger::new(TriggerKind::Failure, "wrong_kind", Condition::Always)
                .with_id("wrong_kind"),
        ]);

        let matches = evaluator.check_triggers(&EngineEvent::threshold(10.0, 5.0, "cpu"));
        let ids: Vec<&str> = matches.iter().map(|m| m.trigger_id.as_str()).collect();
        assert_eq!(ids, vec!["breach"]);
    }

    #[test]
    fn test_throwing_condition_is_isolated() {
        let (evaluator, notices) = evaluator_with(vec![
            Trigger::new(
                TriggerKind::Failure,
                "broken",
                Condition::predicate(|_| Err(ConditionError::Predicate("boom".into()))),
            )
            .with_id("broken"),
            Trigger::new(TriggerKind::Failure, "healthy", Condition::Always).with_id("healthy"),
        ]);
        let mut rx = notices.subscribe();

        let matches = evaluator.check_triggers(&EngineEvent::failure(Severity::Error, "crash"));

        // the healthy trigger still matched
        let ids: Vec<&str> = matches.iter().map(|m| m.trigger_id.as_str()).collect();
        assert_eq!(ids, vec!["healthy"]);

        // and the broken one was reported
        match rx.try_recv().unwrap() {
            EngineNotice::ConditionEvaluationFailed { trigger_id, error } => {
                assert_eq!(trigger_id, "broken");
                assert!(error.contains("boom"));
            }
            other => panic!("unexpected notice: {:?}", other),
        }
    }

    #[test]
    fn test_payload_mismatch_reported_not_fatal() {
        // Kind gating passes (trigger kind == event kind) but the condition
        // was written for a different payload shape.
        let (evaluator, notices) = evaluator_with(vec![Trigger::new(
            TriggerKind::Failure,
            "misconfigured",
            Condition::ThresholdExceeded,
        )
        .with_id("misconfigured")]);
        let mut rx = notices.subscribe();

        let matches = evaluator.check_triggers(&EngineEvent::failure(Severity::Error, "crash"));
        assert!(matches.is_empty());
        assert!(matches!(
            rx.try_recv().unwrap(),
            EngineNotice::ConditionEvaluationFailed { .. }
        ));
    }

    #[test]
    fn test_matches_in_registration_order() {
        let (evaluator, _notices) = evaluator_with(vec![
            Trigger::new(TriggerKind::Anomaly, "first", Condition::Always).with_id("first"),
            Trigger::new(TriggerKind::Anomaly, "second", Condition::Always).with_id("second"),
            Trigger::new(TriggerKind::Anomaly, "third", Condition::Always).with_id("third"),
        ]);

        let matches = evaluator.check_triggers(&EngineEvent::anomaly(0.5, "latency"));
        let ids: Vec<&str> = matches.iter().map(|m| m.trigger_id.as_str()).collect();
        assert_eq!(ids, vec!["first", "second", "third"]);
    }

    #[test]
    fn test_no_triggers_no_matches() {
        let (evaluator, _notices) = evaluator_with(vec![]);
        assert!(evaluator
            .check_triggers(&EngineEvent::anomaly(0.5, "latency"))
            .is_empty());
    }
}
