//! Execution coordination
//!
//! Selects the rules bound to matched triggers, orders them, and runs each
//! through the retry/rollback state machine. Rules within one dispatch run
//! strictly sequentially so remediation never compounds resource contention
//! and the audit trail has a single causal order.

use std::sync::Arc;
use tracing::{debug, warn};

use reflex_automation::{Rule, RuleRegistry, TriggerMatch};
use reflex_core::{
    ActionContext, EngineEvent, EngineNotice, ExecutionRecord, ExecutionStatus, NoticeBus,
};

use crate::history::ExecutionHistory;

/// Runs rules selected by matched triggers
pub struct ExecutionCoordinator {
    rules: Arc<RuleRegistry>,
    history: Arc<ExecutionHistory>,
    notices: Arc<NoticeBus>,
}

impl ExecutionCoordinator {
    /// Create a coordinator over shared registries and history
    pub fn new(
        rules: Arc<RuleRegistry>,
        history: Arc<ExecutionHistory>,
        notices: Arc<NoticeBus>,
    ) -> Self {
        Self {
            rules,
            history,
            notices,
        }
    }

    /// Run every enabled rule bound to a matched trigger
    ///
    /// Ordering is a hard guarantee: descending priority, ties broken by
    /// registration sequence. Execution is strictly sequential; rule N
    /// reaches a terminal record before rule N+1 begins. No action or
    /// rollback error propagates out of this call.
    pub async fn execute_triggered_rules(
        &self,
        matches: &[TriggerMatch],
        event: &EngineEvent,
    ) -> Vec<ExecutionRecord> {
        let trigger_ids: Vec<&str> = matches.iter().map(|m| m.trigger_id.as_str()).collect();
        let mut selected = self.rules.rules_for_triggers(&trigger_ids);
        selected.sort_by(|a, b| b.priority.cmp(&a.priority).then(a.seq.cmp(&b.seq)));

        debug!(
            matched = matches.len(),
            selected = selected.len(),
            "Dispatching triggered rules"
        );

        let mut records = Vec::with_capacity(selected.len());
        for rule in &selected {
            let Some(matched) = matches.iter().find(|m| m.trigger_id == rule.trigger_id) else {
                continue;
            };
            let ctx = ActionContext::new(
                event.clone(),
                matched.trigger_id.clone(),
                matched.trigger_name.clone(),
                matched.matched_at,
            );
            records.push(self.execute_rule(rule, ctx).await);
        }
        records
    }

    /// Run one rule through its retry/rollback state machine
    ///
    /// Always returns a terminal record.
    pub async fn execute_rule(&self, rule: &Rule, ctx: ActionContext) -> ExecutionRecord {
        let mut record =
            ExecutionRecord::new(&rule.id, &rule.trigger_id, &rule.action_type, ctx.clone());
        self.history.track(record.clone());

        record.transition(ExecutionStatus::Running);
        self.history.update(record.clone());

        let mut last_error: Option<String> = None;
        for attempt in 1..=rule.retry.max_retries {
            record.attempts = attempt;
            self.history.update(record.clone());

            match self.invoke_action(rule, ctx.clone()).await {
                Ok(value) => {
                    debug!(rule_id = %rule.id, attempt, "Rule action succeeded");
                    record.result = Some(value);
                    record.transition(ExecutionStatus::Success);
                    break;
                }
                Err(e) => {
                    let error = e.to_string();
                    warn!(rule_id = %rule.id, attempt, error = %error, "Rule action attempt failed");
                    self.notices.publish(EngineNotice::ActionAttemptFailed {
                        rule_id: rule.id.clone(),
                        record_id: record.id.clone(),
                        attempt,
                        error: error.clone(),
                    });
                    last_error = Some(error);
                    // the delay elapses only between attempts
                    if attempt < rule.retry.max_retries {
                        tokio::time::sleep(rule.retry.delay).await;
                    }
                }
            }
        }

        if record.status != ExecutionStatus::Success {
            record.error = last_error;
            record.transition(ExecutionStatus::Failed);

            if rule.rollback_enabled {
                if let Some(rollback) = &rule.rollback {
                    match rollback(ctx).await {
                        Ok(()) => {
                            debug!(rule_id = %rule.id, "Rollback completed");
                            record.transition(ExecutionStatus::RolledBack);
                        }
                        Err(e) => {
                            // a failing rollback must not produce a
                            // misleading terminal state
                            let error = e.to_string();
                            warn!(rule_id = %rule.id, error = %error, "Rollback failed; record stays failed");
                            self.notices.publish(EngineNotice::RollbackFailed {
                                rule_id: rule.id.clone(),
                                record_id: record.id.clone(),
                                error,
                            });
                        }
                    }
                }
            }
        }

        self.history.finish(record.clone());
        record
    }

    async fn invoke_action(
        &self,
        rule: &Rule,
        ctx: ActionContext,
    ) -> anyhow::Result<serde_json::Value> {
        match rule.action_timeout {
            Some(timeout) => match tokio::time::timeout(timeout, (rule.action)(ctx)).await {
                Ok(result) => result,
                Err(_) => Err(anyhow::anyhow!("action timed out after {:?}", timeout)),
            },
            None => (rule.action)(ctx).await,
        }
    }
}
