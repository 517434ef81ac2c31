//! Structured reporting channel for engine-internal failures
//!
//! Failures the engine swallows by design (condition errors, retried action
//! attempts, rollback errors) are published here so collaborators can route
//! them into their own observability pipeline instead of relying on log
//! scraping. Delivery is lossy broadcast: sends with no active receivers
//! are silently dropped.

use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use tracing::debug;

/// Default channel capacity for notice subscriptions
pub const DEFAULT_NOTICE_CAPACITY: usize = 256;

/// A report of a failure the engine handled internally
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "notice", rename_all = "snake_case")]
pub enum EngineNotice {
    /// A trigger's condition returned an error while evaluating an event;
    /// the trigger was treated as a non-match
    ConditionEvaluationFailed { trigger_id: String, error: String },

    /// One attempt of a rule's action failed (it may still be retried)
    ActionAttemptFailed {
        rule_id: String,
        record_id: String,
        attempt: u32,
        error: String,
    },

    /// A rollback failed; the record keeps its `failed` status
    RollbackFailed {
        rule_id: String,
        record_id: String,
        error: String,
    },
}

/// Broadcast bus for [`EngineNotice`] values
pub struct NoticeBus {
    sender: broadcast::Sender<EngineNotice>,
}

impl NoticeBus {
    /// Create a bus with the default capacity
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_NOTICE_CAPACITY)
    }

    /// Create a bus with a specific channel capacity
    pub fn with_capacity(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Publish a notice to all subscribers
    pub fn publish(&self, notice: EngineNotice) {
        debug!(?notice, "Publishing engine notice");
        // Send errors just mean no active receivers
        let _ = self.sender.send(notice);
    }

    /// Subscribe to notices published after this call
    pub fn subscribe(&self) -> broadcast::Receiver<EngineNotice> {
        self.sender.subscribe()
    }
}

impl Default for NoticeBus {
    fn default() -> Self {
        Self::new()
    }
}
