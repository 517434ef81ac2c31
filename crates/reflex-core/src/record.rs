//! Execution records: the audit entry for a single rule run

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use ulid::Ulid;

use crate::ActionContext;

/// Lifecycle status of a rule execution
///
/// Transitions are strictly monotonic: `Pending → Running → Success`, or
/// `Pending → Running → Failed → RolledBack`. No other transition is valid.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionStatus {
    Pending,
    Running,
    Success,
    Failed,
    RolledBack,
}

impl ExecutionStatus {
    /// Whether this status ends the record's lifecycle
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            ExecutionStatus::Success | ExecutionStatus::Failed | ExecutionStatus::RolledBack
        )
    }

    /// Whether a record in this status is still in flight
    pub fn is_in_flight(&self) -> bool {
        matches!(self, ExecutionStatus::Pending | ExecutionStatus::Running)
    }

    /// Whether moving to `next` is a valid forward transition
    pub fn can_transition_to(&self, next: ExecutionStatus) -> bool {
        use ExecutionStatus::*;
        matches!(
            (self, next),
            (Pending, Running) | (Running, Success) | (Running, Failed) | (Failed, RolledBack)
        )
    }
}

impl fmt::Display for ExecutionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ExecutionStatus::Pending => "pending",
            ExecutionStatus::Running => "running",
            ExecutionStatus::Success => "success",
            ExecutionStatus::Failed => "failed",
            ExecutionStatus::RolledBack => "rolled_back",
        };
        write!(f, "{}", s)
    }
}

/// The audit entry describing a single rule's run against one triggering
/// context
///
/// Records are mutated only by the coordinator while in flight and are
/// immutable once terminal.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionRecord {
    /// Unique identifier (ULID)
    pub id: String,

    /// The rule that ran
    pub rule_id: String,

    /// The trigger that selected the rule
    pub trigger_id: String,

    /// The rule's action type label
    pub action_type: String,

    /// When the run began
    pub started_at: DateTime<Utc>,

    /// Set exactly once, the moment a terminal status is reached
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ended_at: Option<DateTime<Utc>>,

    /// Current lifecycle status
    pub status: ExecutionStatus,

    /// Attempts made so far; never exceeds the rule's max_retries
    pub attempts: u32,

    /// Present only on success
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<serde_json::Value>,

    /// Present only on failed / rolled_back
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,

    /// Snapshot of the triggering event and dispatch context
    pub context: ActionContext,
}

impl ExecutionRecord {
    /// Create a fresh pending record
    pub fn new(
        rule_id: impl Into<String>,
        trigger_id: impl Into<String>,
        action_type: impl Into<String>,
        context: ActionContext,
    ) -> Self {
        Self {
            id: Ulid::new().to_string(),
            rule_id: rule_id.into(),
            trigger_id: trigger_id.into(),
            action_type: action_type.into(),
            started_at: Utc::now(),
            ended_at: None,
            status: ExecutionStatus::Pending,
            attempts: 0,
            result: None,
            error: None,
            context,
        }
    }

    /// Advance the status, stamping `ended_at` on the first terminal state
    ///
    /// Returns false and leaves the record untouched if the transition is
    /// not a valid forward move.
    pub fn transition(&mut self, next: ExecutionStatus) -> bool {
        if !self.status.can_transition_to(next) {
            tracing::warn!(
                record_id = %self.id,
                from = %self.status,
                to = %next,
                "Rejected invalid execution status transition"
            );
            return false;
        }

        self.status = next;
        if next.is_terminal() && self.ended_at.is_none() {
            self.ended_at = Some(Utc::now());
        }
        true
    }

    /// Whether the record has reached a terminal status
    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    /// Whether the record is still in flight
    pub fn is_in_flight(&self) -> bool {
        self.status.is_in_flight()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{EngineEvent, Severity};

    fn test_record() -> ExecutionRecord {
        let event = EngineEvent::failure(Severity::Error, "boom");
        let ctx = ActionContext::new(event, "t1", "failures", Utc::now());
        ExecutionRecord::new("r1", "t1", "restart_service", ctx)
    }

    #[test]
    fn test_happy_path_transitions() {
        let mut record = test_record();
        assert_eq!(record.status, ExecutionStatus::Pending);
        assert!(record.is_in_flight());

        assert!(record.transition(ExecutionStatus::Running));
        assert!(record.ended_at.is_none());

        assert!(record.transition(ExecutionStatus::Success));
        assert!(record.is_terminal());
        assert!(record.ended_at.is_some());
    }

    #[test]
    fn test_failure_then_rollback_transitions() {
        let mut record = test_record();
        assert!(record.transition(ExecutionStatus::Running));
        assert!(record.transition(ExecutionStatus::Failed));
        assert!(record.transition(ExecutionStatus::RolledBack));
        assert!(record.is_terminal());
    }

    #[test]
    fn test_invalid_transitions_rejected() {
        let mut record = test_record();
        assert!(!record.transition(ExecutionStatus::Success));
        assert_eq!(record.status, ExecutionStatus::Pending);

        record.transition(ExecutionStatus::Running);
        record.transition(ExecutionStatus::Success);
        assert!(!record.transition(ExecutionStatus::Failed));
        assert_eq!(record.status, ExecutionStatus::Success);
    }

    #[test]
    fn test_ended_at_set_once() {
        let mut record = test_record();
        record.transition(ExecutionStatus::Running);
        record.transition(ExecutionStatus::Failed);
        let first = record.ended_at;
        assert!(first.is_some());

        record.transition(ExecutionStatus::RolledBack);
        assert_eq!(record.ended_at, first);
    }

    #[test]
    fn test_status_predicates() {
        assert!(ExecutionStatus::Pending.is_in_flight());
        assert!(ExecutionStatus::Running.is_in_flight());
        assert!(ExecutionStatus::Success.is_terminal());
        assert!(ExecutionStatus::Failed.is_terminal());
        assert!(ExecutionStatus::RolledBack.is_terminal());
        assert!(!ExecutionStatus::Running.is_terminal());
    }

    #[test]
    fn test_record_serde_status_names() {
        let mut record = test_record();
        record.transition(ExecutionStatus::Running);
        record.transition(ExecutionStatus::Failed);
        record.transition(ExecutionStatus::RolledBack);

        let json = serde_json::to_value(&record).unwrap();
        assert_eq!(json["status"], "rolled_back");
    }
}
