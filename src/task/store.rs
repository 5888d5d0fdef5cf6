//! Durable `ScheduledTask` + `TaskExecution` store (spec §3, §4.6).

use async_trait::async_trait;
use std::collections::HashMap;
use tokio::sync::RwLock;

use super::model::{ExecutionState, ScheduledTask, TaskExecution, TriggerType};
use crate::error::Result;
use crate::ids::{ExecutionUid, TaskUid};

#[async_trait]
pub trait TaskStore: Send + Sync {
    async fn find_by_id(&self, uid: &TaskUid) -> Result<Option<ScheduledTask>>;
    async fn find_by_name(&self, name: &str) -> Result<Option<ScheduledTask>>;
    async fn list(&self) -> Result<Vec<ScheduledTask>>;
    async fn upsert(&self, task: &ScheduledTask) -> Result<()>;
    async fn delete(&self, uid: &TaskUid) -> Result<bool>;

    async fn create_execution(&self, execution: &TaskExecution) -> Result<()>;
    async fn update_execution(&self, execution: &TaskExecution) -> Result<()>;
    async fn find_execution(&self, uid: &ExecutionUid) -> Result<Option<TaskExecution>>;
    async fn list_executions(&self, task_uid: &TaskUid, limit: usize) -> Result<Vec<TaskExecution>>;
    async fn count_running(&self, task_uid: &TaskUid) -> Result<u32>;

    /// Retention sweep: delete terminal executions older than `before`
    /// (ambient — spec §3 "Durable: never deleted except by retention
    /// sweeper"). Returns the number of rows removed.
    async fn sweep_executions_before(&self, before: chrono::DateTime<chrono::Utc>) -> Result<u64>;
}

#[derive(Default)]
pub struct InMemoryTaskStore {
    tasks: RwLock<HashMap<TaskUid, ScheduledTask>>,
    executions: RwLock<HashMap<ExecutionUid, TaskExecution>>,
}

impl InMemoryTaskStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl TaskStore for InMemoryTaskStore {
    async fn find_by_id(&self, uid: &TaskUid) -> Result<Option<ScheduledTask>> {
        Ok(self.tasks.read().await.get(uid).cloned())
    }

    async fn find_by_name(&self, name: &str) -> Result<Option<ScheduledTask>> {
        Ok(self.tasks.read().await.values().find(|t| t.name == name).cloned())
    }

    async fn list(&self) -> Result<Vec<ScheduledTask>> {
        Ok(self.tasks.read().await.values().cloned().collect())
    }

    async fn upsert(&self, task: &ScheduledTask) -> Result<()> {
        self.tasks.write().await.insert(task.uid.clone(), task.clone());
        Ok(())
    }

    async fn delete(&self, uid: &TaskUid) -> Result<bool> {
        Ok(self.tasks.write().await.remove(uid).is_some())
    }

    async fn create_execution(&self, execution: &TaskExecution) -> Result<()> {
        self.executions.write().await.insert(execution.uid.clone(), execution.clone());
        Ok(())
    }

    async fn update_execution(&self, execution: &TaskExecution) -> Result<()> {
        self.executions.write().await.insert(execution.uid.clone(), execution.clone());
        Ok(())
    }

    async fn find_execution(&self, uid: &ExecutionUid) -> Result<Option<TaskExecution>> {
        Ok(self.executions.read().await.get(uid).cloned())
    }

    async fn list_executions(&self, task_uid: &TaskUid, limit: usize) -> Result<Vec<TaskExecution>> {
        let mut rows: Vec<TaskExecution> = self
            .executions
            .read()
            .await
            .values()
            .filter(|e| &e.task_uid == task_uid)
            .cloned()
            .collect();
        rows.sort_by(|a, b| b.started_at.cmp(&a.started_at));
        rows.truncate(limit);
        Ok(rows)
    }

    async fn count_running(&self, task_uid: &TaskUid) -> Result<u32> {
        Ok(self
            .executions
            .read()
            .await
            .values()
            .filter(|e| &e.task_uid == task_uid && e.state == ExecutionState::Running)
            .count() as u32)
    }

    async fn sweep_executions_before(&self, before: chrono::DateTime<chrono::Utc>) -> Result<u64> {
        let mut executions = self.executions.write().await;
        let before_count = executions.len();
        executions.retain(|_, e| e.finished_at.map(|f| f >= before).unwrap_or(true));
        Ok((before_count - executions.len()) as u64)
    }
}

pub struct PgTaskStore {
    pool: sqlx::PgPool,
}

impl PgTaskStore {
    pub fn new(pool: sqlx::PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl TaskStore for PgTaskStore {
    async fn find_by_id(&self, uid: &TaskUid) -> Result<Option<ScheduledTask>> {
        let row = sqlx::query_as::<_, TaskRow>("SELECT * FROM scheduled_tasks WHERE uid = $1")
            .bind(uid.as_str())
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.map(Into::into))
    }

    async fn find_by_name(&self, name: &str) -> Result<Option<ScheduledTask>> {
        let row = sqlx::query_as::<_, TaskRow>("SELECT * FROM scheduled_tasks WHERE name = $1")
            .bind(name)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.map(Into::into))
    }

    async fn list(&self) -> Result<Vec<ScheduledTask>> {
        let rows = sqlx::query_as::<_, TaskRow>("SELECT * FROM scheduled_tasks").fetch_all(&self.pool).await?;
        Ok(rows.into_iter().map(Into::into).collect())
    }

    async fn upsert(&self, task: &ScheduledTask) -> Result<()> {
        sqlx::query(
            "INSERT INTO scheduled_tasks (uid, name, handler_type, cron_expr, recurring, enabled, max_concurrent, \
             max_retries, backoff_base_secs, max_duration_secs, timeout_grace_secs, input_data, total_executions, \
             success_count, failure_count, consecutive_failures, last_executed_at, created_at) \
             VALUES ($1,$2,$3,$4,$5,$6,$7,$8,$9,$10,$11,$12,$13,$14,$15,$16,$17,$18) \
             ON CONFLICT (uid) DO UPDATE SET name=$2, handler_type=$3, cron_expr=$4, recurring=$5, enabled=$6, \
             max_concurrent=$7, max_retries=$8, backoff_base_secs=$9, max_duration_secs=$10, timeout_grace_secs=$11, \
             input_data=$12, total_executions=$13, success_count=$14, failure_count=$15, consecutive_failures=$16, \
             last_executed_at=$17",
        )
        .bind(task.uid.as_str())
        .bind(&task.name)
        .bind(&task.handler_type)
        .bind(&task.cron_expr)
        .bind(task.recurring)
        .bind(task.enabled)
        .bind(task.max_concurrent as i32)
        .bind(task.max_retries as i32)
        .bind(task.backoff_base_secs as i64)
        .bind(task.max_duration_secs as i64)
        .bind(task.timeout_grace_secs as i64)
        .bind(&task.input_data)
        .bind(task.stats.total_executions as i64)
        .bind(task.stats.success_count as i64)
        .bind(task.stats.failure_count as i64)
        .bind(task.stats.consecutive_failures as i32)
        .bind(task.stats.last_executed_at)
        .bind(task.created_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn delete(&self, uid: &TaskUid) -> Result<bool> {
        let result = sqlx::query("DELETE FROM scheduled_tasks WHERE uid = $1")
            .bind(uid.as_str())
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn create_execution(&self, execution: &TaskExecution) -> Result<()> {
        self.write_execution(execution).await
    }

    async fn update_execution(&self, execution: &TaskExecution) -> Result<()> {
        self.write_execution(execution).await
    }

    async fn find_execution(&self, uid: &ExecutionUid) -> Result<Option<TaskExecution>> {
        let row = sqlx::query_as::<_, ExecutionRow>("SELECT * FROM task_executions WHERE uid = $1")
            .bind(uid.as_str())
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.map(Into::into))
    }

    async fn list_executions(&self, task_uid: &TaskUid, limit: usize) -> Result<Vec<TaskExecution>> {
        let rows = sqlx::query_as::<_, ExecutionRow>(
            "SELECT * FROM task_executions WHERE task_uid = $1 ORDER BY started_at DESC LIMIT $2",
        )
        .bind(task_uid.as_str())
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.into_iter().map(Into::into).collect())
    }

    async fn count_running(&self, task_uid: &TaskUid) -> Result<u32> {
        let row: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM task_executions WHERE task_uid = $1 AND state = 'running'")
            .bind(task_uid.as_str())
            .fetch_one(&self.pool)
            .await?;
        Ok(row.0 as u32)
    }

    async fn sweep_executions_before(&self, before: chrono::DateTime<chrono::Utc>) -> Result<u64> {
        let result = sqlx::query(
            "DELETE FROM task_executions WHERE finished_at IS NOT NULL AND finished_at < $1",
        )
        .bind(before)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected())
    }
}

impl PgTaskStore {
    async fn write_execution(&self, execution: &TaskExecution) -> Result<()> {
        sqlx::query(
            "INSERT INTO task_executions (uid, task_uid, task_name, trigger_type, trigger_by, run_by, state, \
             started_at, finished_at, duration_ms, retry_count, result, error_message, error_stack) \
             VALUES ($1,$2,$3,$4,$5,$6,$7,$8,$9,$10,$11,$12,$13,$14) \
             ON CONFLICT (uid) DO UPDATE SET state=$7, finished_at=$9, duration_ms=$10, retry_count=$11, \
             result=$12, error_message=$13, error_stack=$14",
        )
        .bind(execution.uid.as_str())
        .bind(execution.task_uid.as_str())
        .bind(&execution.task_name)
        .bind(match execution.trigger_type {
            TriggerType::Scheduled => "scheduled",
            TriggerType::Manual => "manual",
            TriggerType::Retry => "retry",
        })
        .bind(&execution.trigger_by)
        .bind(&execution.run_by)
        .bind(match execution.state {
            ExecutionState::Pending => "pending",
            ExecutionState::Running => "running",
            ExecutionState::Success => "success",
            ExecutionState::Failure => "failure",
            ExecutionState::Timeout => "timeout",
            ExecutionState::Canceled => "canceled",
        })
        .bind(execution.started_at)
        .bind(execution.finished_at)
        .bind(execution.duration_ms)
        .bind(execution.retry_count as i32)
        .bind(&execution.result)
        .bind(&execution.error_message)
        .bind(&execution.error_stack)
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}

#[derive(sqlx::FromRow)]
struct TaskRow {
    uid: String,
    name: String,
    handler_type: String,
    cron_expr: String,
    recurring: bool,
    enabled: bool,
    max_concurrent: i32,
    max_retries: i32,
    backoff_base_secs: i64,
    max_duration_secs: i64,
    timeout_grace_secs: i64,
    input_data: String,
    total_executions: i64,
    success_count: i64,
    failure_count: i64,
    consecutive_failures: i32,
    last_executed_at: Option<chrono::DateTime<chrono::Utc>>,
    created_at: chrono::DateTime<chrono::Utc>,
}

impl From<TaskRow> for ScheduledTask {
    fn from(row: TaskRow) -> Self {
        ScheduledTask {
            uid: row.uid.parse().unwrap_or_else(|_| TaskUid::new()),
            name: row.name,
            handler_type: row.handler_type,
            cron_expr: row.cron_expr,
            recurring: row.recurring,
            enabled: row.enabled,
            max_concurrent: row.max_concurrent as u32,
            max_retries: row.max_retries as u32,
            backoff_base_secs: row.backoff_base_secs as u64,
            max_duration_secs: row.max_duration_secs as u64,
            timeout_grace_secs: row.timeout_grace_secs as u64,
            input_data: row.input_data,
            stats: super::model::TaskStatistics {
                total_executions: row.total_executions as u64,
                success_count: row.success_count as u64,
                failure_count: row.failure_count as u64,
                consecutive_failures: row.consecutive_failures as u32,
                last_executed_at: row.last_executed_at,
            },
            created_at: row.created_at,
        }
    }
}

#[derive(sqlx::FromRow)]
struct ExecutionRow {
    uid: String,
    task_uid: String,
    task_name: String,
    trigger_type: String,
    trigger_by: Option<String>,
    run_by: String,
    state: String,
    started_at: chrono::DateTime<chrono::Utc>,
    finished_at: Option<chrono::DateTime<chrono::Utc>>,
    duration_ms: Option<i64>,
    retry_count: i32,
    result: Option<String>,
    error_message: Option<String>,
    error_stack: Option<String>,
}

impl From<ExecutionRow> for TaskExecution {
    fn from(row: ExecutionRow) -> Self {
        TaskExecution {
            uid: row.uid.parse().unwrap_or_else(|_| ExecutionUid::new()),
            task_uid: row.task_uid.parse().unwrap_or_else(|_| TaskUid::new()),
            task_name: row.task_name,
            trigger_type: match row.trigger_type.as_str() {
                "manual" => TriggerType::Manual,
                "retry" => TriggerType::Retry,
                _ => TriggerType::Scheduled,
            },
            trigger_by: row.trigger_by,
            run_by: row.run_by,
            state: match row.state.as_str() {
                "running" => ExecutionState::Running,
                "success" => ExecutionState::Success,
                "failure" => ExecutionState::Failure,
                "timeout" => ExecutionState::Timeout,
                "canceled" => ExecutionState::Canceled,
                _ => ExecutionState::Pending,
            },
            started_at: row.started_at,
            finished_at: row.finished_at,
            duration_ms: row.duration_ms,
            retry_count: row.retry_count as u32,
            result: row.result,
            error_message: row.error_message,
            error_stack: row.error_stack,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn upsert_then_find_by_name() {
        let store = InMemoryTaskStore::new();
        let task = ScheduledTask::new("daily-cleanup", "cleanup", "0 2 * * *");
        store.upsert(&task).await.unwrap();
        let found = store.find_by_name("daily-cleanup").await.unwrap();
        assert_eq!(found.unwrap().uid, task.uid);
    }

    #[tokio::test]
    async fn sweep_only_removes_finished_before_cutoff() {
        let store = InMemoryTaskStore::new();
        let task = ScheduledTask::new("t", "noop", "");
        let mut exec = TaskExecution::new(&task, TriggerType::Manual, None, "n1");
        exec.finish(ExecutionState::Success, None, None, None);
        store.create_execution(&exec).await.unwrap();

        let removed = store.sweep_executions_before(chrono::Utc::now() + chrono::Duration::seconds(1)).await.unwrap();
        assert_eq!(removed, 1);
        assert!(store.find_execution(&exec.uid).await.unwrap().is_none());
    }
}
