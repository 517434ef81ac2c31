//! Bounded execution history and in-flight tracking
//!
//! Finished records live in a bounded FIFO ring; records still executing
//! live in a concurrent map keyed by record id. One lock guards the ring so
//! concurrent finishes cannot corrupt the eviction bookkeeping.

use dashmap::DashMap;
use std::collections::VecDeque;
use std::sync::{Mutex, MutexGuard};
use tracing::{debug, trace};

use reflex_core::ExecutionRecord;

/// Default capacity of the completed-record ring
pub const DEFAULT_HISTORY_CAPACITY: usize = 1000;

/// Bounded, append-only audit log plus the live map of in-flight executions
pub struct ExecutionHistory {
    capacity: usize,
    completed: Mutex<VecDeque<ExecutionRecord>>,
    in_flight: DashMap<String, ExecutionRecord>,
}

impl ExecutionHistory {
    /// Create a history with the default capacity
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_HISTORY_CAPACITY)
    }

    /// Create a history holding at most `capacity` completed records
    pub fn with_capacity(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            capacity,
            completed: Mutex::new(VecDeque::with_capacity(capacity)),
            in_flight: DashMap::new(),
        }
    }

    fn completed_lock(&self) -> MutexGuard<'_, VecDeque<ExecutionRecord>> {
        // the ring stays structurally valid across a poisoned lock
        self.completed
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Start tracking an in-flight record
    pub fn track(&self, record: ExecutionRecord) {
        trace!(record_id = %record.id, "Tracking execution");
        self.in_flight.insert(record.id.clone(), record);
    }

    /// Refresh the in-flight copy of a record
    pub fn update(&self, record: ExecutionRecord) {
        self.in_flight.insert(record.id.clone(), record);
    }

    /// Move a terminal record from the in-flight map into the bounded ring,
    /// evicting the oldest record once full
    pub fn finish(&self, record: ExecutionRecord) {
        self.in_flight.remove(&record.id);

        let mut completed = self.completed_lock();
        completed.push_back(record);
        while completed.len() > self.capacity {
            if let Some(evicted) = completed.pop_front() {
                debug!(record_id = %evicted.id, "Evicted oldest execution record");
            }
        }
    }

    /// Completed records, most recent first
    pub fn recent(&self, limit: Option<usize>) -> Vec<ExecutionRecord> {
        let completed = self.completed_lock();
        let limit = limit.unwrap_or(completed.len());
        completed.iter().rev().take(limit).cloned().collect()
    }

    /// Records currently in flight, oldest first
    pub fn active(&self) -> Vec<ExecutionRecord> {
        let mut records: Vec<ExecutionRecord> =
            self.in_flight.iter().map(|r| r.clone()).collect();
        records.sort_by_key(|r| r.started_at);
        records
    }

    /// Drop all completed records; in-flight executions are unaffected
    pub fn clear(&self) {
        let mut completed = self.completed_lock();
        debug!(dropped = completed.len(), "Cleared execution history");
        completed.clear();
    }

    /// Number of completed records currently held
    pub fn len(&self) -> usize {
        self.completed_lock().len()
    }

    /// Whether no completed records are held
    pub fn is_empty(&self) -> bool {
        self.completed_lock().is_empty()
    }

    /// Maximum number of completed records held
    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

impl Default for ExecutionHistory {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use reflex_core::{ActionContext, EngineEvent, ExecutionStatus};

    fn finished_record(tag: &str) -> ExecutionRecord {
        let event = EngineEvent::anomaly(0.9, "latency");
        let ctx = ActionContext::new(event, "t1", "anomaly", Utc::now());
        let mut record = ExecutionRecord::new(tag, "t1", "noop", ctx);
        record.transition(ExecutionStatus::Running);
        record.transition(ExecutionStatus::Success);
        record
    }

    #[test]
    fn test_fifo_eviction_at_capacity() {
        let history = ExecutionHistory::with_capacity(3);
        for i in 0..5 {
            history.finish(finished_record(&format!("r{}", i)));
        }

        assert_eq!(history.len(), 3);
        let ids: Vec<String> = history.recent(None).into_iter().map(|r| r.rule_id).collect();
        // most recent first, oldest two evicted
        assert_eq!(ids, vec!["r4", "r3", "r2"]);
    }

    #[test]
    fn test_recent_respects_limit() {
        let history = ExecutionHistory::with_capacity(10);
        for i in 0..4 {
            history.finish(finished_record(&format!("r{}", i)));
        }

        let ids: Vec<String> = history
            .recent(Some(2))
            .into_iter()
            .map(|r| r.rule_id)
            .collect();
        assert_eq!(ids, vec!["r3", "r2"]);
    }

    #[test]
    fn test_track_finish_moves_record() {
        let history = ExecutionHistory::new();
        let record = finished_record("r1");
        let id = record.id.clone();

        let mut pending = record.clone();
        pending.status = ExecutionStatus::Running;
        history.track(pending);
        assert_eq!(history.active().len(), 1);
        assert_eq!(history.len(), 0);

        history.finish(record);
        assert!(history.active().is_empty());
        assert_eq!(history.len(), 1);
        assert_eq!(history.recent(None)[0].id, id);
    }

    #[test]
    fn test_clear_leaves_in_flight() {
        let history = ExecutionHistory::new();
        let record = finished_record("r1");
        history.track(record.clone());
        history.finish(record);
        history.track(finished_record("r2"));

        history.clear();
        assert_eq!(history.len(), 0);
        assert_eq!(history.active().len(), 1);
    }

    #[test]
    fn test_capacity_clamped_to_one() {
        let history = ExecutionHistory::with_capacity(0);
        assert_eq!(history.capacity(), 1);
        history.finish(finished_record("r1"));
        history.finish(finished_record("r2"));
        assert_eq!(history.len(), 1);
    }
}
