//! Task Scheduler data model (spec §3 "ScheduledTask"/"TaskExecution", §4.6).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::ids::{ExecutionUid, TaskUid};

/// A cron/one-shot task definition. `cron_expr` is empty for one-shot tasks
/// (spec §3: "cron-expr (empty for one-shot)").
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScheduledTask {
    pub uid: TaskUid,
    pub name: String,
    pub handler_type: String,
    pub cron_expr: String,
    pub recurring: bool,
    pub enabled: bool,
    pub max_concurrent: u32,
    pub max_retries: u32,
    pub backoff_base_secs: u64,
    pub max_duration_secs: u64,
    pub timeout_grace_secs: u64,
    pub input_data: String,
    pub stats: TaskStatistics,
    pub created_at: DateTime<Utc>,
}

impl ScheduledTask {
    pub fn new(name: impl Into<String>, handler_type: impl Into<String>, cron_expr: impl Into<String>) -> Self {
        let cron_expr = cron_expr.into();
        Self {
            uid: TaskUid::new(),
            name: name.into(),
            handler_type: handler_type.into(),
            recurring: !cron_expr.is_empty(),
            cron_expr,
            enabled: true,
            max_concurrent: 1,
            max_retries: 0,
            backoff_base_secs: 5,
            max_duration_secs: 300,
            timeout_grace_secs: 10,
            input_data: String::new(),
            stats: TaskStatistics::default(),
            created_at: Utc::now(),
        }
    }

    pub fn backoff_cap(&self, cap: std::time::Duration) -> std::time::Duration {
        cap
    }
}

/// Running totals maintained on every terminal transition (spec §4.6
/// "Statistics").
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TaskStatistics {
    pub total_executions: u64,
    pub success_count: u64,
    pub failure_count: u64,
    pub consecutive_failures: u32,
    pub last_executed_at: Option<DateTime<Utc>>,
}

impl TaskStatistics {
    pub fn record_terminal(&mut self, state: ExecutionState, at: DateTime<Utc>) {
        self.total_executions += 1;
        self.last_executed_at = Some(at);
        match state {
            ExecutionState::Success => {
                self.success_count += 1;
                self.consecutive_failures = 0;
            }
            ExecutionState::Failure | ExecutionState::Timeout => {
                self.failure_count += 1;
                self.consecutive_failures += 1;
            }
            ExecutionState::Canceled => {}
            ExecutionState::Pending | ExecutionState::Running => {
                unreachable!("record_terminal called with a non-terminal state")
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TriggerType {
    Scheduled,
    Manual,
    Retry,
}

/// State machine position (spec §4.6 diagram). Transitions are enforced by
/// [`super::scheduler::TaskScheduler`]; this type only records where an
/// execution currently is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionState {
    Pending,
    Running,
    Success,
    Failure,
    Timeout,
    Canceled,
}

impl ExecutionState {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            ExecutionState::Success | ExecutionState::Failure | ExecutionState::Timeout | ExecutionState::Canceled
        )
    }
}

/// Durable record of one task firing (spec §3 "TaskExecution"). Never
/// deleted except by the retention sweeper (ambient, see [`super::retention`]).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskExecution {
    pub uid: ExecutionUid,
    pub task_uid: TaskUid,
    pub task_name: String,
    pub trigger_type: TriggerType,
    pub trigger_by: Option<String>,
    pub run_by: String,
    pub state: ExecutionState,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
    pub duration_ms: Option<i64>,
    pub retry_count: u32,
    pub result: Option<String>,
    pub error_message: Option<String>,
    pub error_stack: Option<String>,
}

impl TaskExecution {
    pub fn new(task: &ScheduledTask, trigger_type: TriggerType, trigger_by: Option<String>, run_by: impl Into<String>) -> Self {
        Self {
            uid: ExecutionUid::new(),
            task_uid: task.uid.clone(),
            task_name: task.name.clone(),
            trigger_type,
            trigger_by,
            run_by: run_by.into(),
            state: ExecutionState::Pending,
            started_at: Utc::now(),
            finished_at: None,
            duration_ms: None,
            retry_count: 0,
            result: None,
            error_message: None,
            error_stack: None,
        }
    }

    /// Applies a terminal transition, recording duration. Panics if `state`
    /// is not terminal — callers should only reach this via
    /// [`super::scheduler::TaskScheduler`]'s state machine.
    pub fn finish(&mut self, state: ExecutionState, result: Option<String>, error_message: Option<String>, error_stack: Option<String>) {
        assert!(state.is_terminal(), "finish() requires a terminal state");
        let now = Utc::now();
        self.state = state;
        self.finished_at = Some(now);
        self.duration_ms = Some((now - self.started_at).num_milliseconds().max(0));
        self.result = result;
        self.error_message = error_message;
        self.error_stack = error_stack;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn one_shot_task_is_not_recurring() {
        let task = ScheduledTask::new("once", "noop", "");
        assert!(!task.recurring);
    }

    #[test]
    fn cron_task_is_recurring() {
        let task = ScheduledTask::new("daily", "noop", "0 2 * * *");
        assert!(task.recurring);
    }

    #[test]
    fn statistics_reset_consecutive_failures_on_success() {
        let mut stats = TaskStatistics::default();
        stats.record_terminal(ExecutionState::Failure, Utc::now());
        stats.record_terminal(ExecutionState::Failure, Utc::now());
        assert_eq!(stats.consecutive_failures, 2);
        stats.record_terminal(ExecutionState::Success, Utc::now());
        assert_eq!(stats.consecutive_failures, 0);
        assert_eq!(stats.total_executions, 3);
    }
}
