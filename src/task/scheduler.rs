//! Cron/manual dispatch, retry/backoff, timeout+grace, and the leader-gated
//! state machine for task executions (spec §4.6).

use std::collections::HashMap;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use futures::FutureExt;
use rand::Rng;
use tokio::sync::{oneshot, Mutex, RwLock};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use super::lease::TaskLease;
use super::model::{ExecutionState, ScheduledTask, TaskExecution, TriggerType};
use super::store::TaskStore;
use crate::config::SchedulerConfig;
use crate::error::{Error, Result};
use crate::ids::{ExecutionUid, TaskUid};

/// A task's business logic. `run` is given the effective input (override or
/// the task's stored `input_data`) and a [`CancellationToken`] that is
/// cancelled when `max-duration-seconds` elapses — cooperative cancellation
/// is the handler's responsibility; the scheduler force-finalizes the
/// execution as `timeout` if the handler ignores it past the grace period.
#[async_trait]
pub trait TaskHandler: Send + Sync {
    async fn run(&self, execution: &TaskExecution, input: &str, cancel: CancellationToken) -> std::result::Result<String, String>;
}

enum AttemptOutcome {
    Success(String),
    Failure { message: String, stack: Option<String> },
    Timeout { stack: Option<String> },
}

struct TaskTicker {
    handle: JoinHandle<()>,
    cron_expr: String,
}

struct TriggerRequest {
    task_uid: TaskUid,
    override_input: Option<String>,
    triggered_by: String,
    respond_to: oneshot::Sender<Result<ExecutionUid>>,
}

pub struct TaskScheduler {
    store: Arc<dyn TaskStore>,
    lease: TaskLease,
    config: SchedulerConfig,
    handlers: RwLock<HashMap<String, Arc<dyn TaskHandler>>>,
    tickers: Mutex<HashMap<TaskUid, TaskTicker>>,
    trigger_tx: tokio::sync::mpsc::Sender<TriggerRequest>,
    trigger_rx: Mutex<Option<tokio::sync::mpsc::Receiver<TriggerRequest>>>,
}

impl TaskScheduler {
    pub fn new(store: Arc<dyn TaskStore>, lease: TaskLease, config: SchedulerConfig) -> Arc<Self> {
        let (trigger_tx, trigger_rx) = tokio::sync::mpsc::channel(config.trigger_queue_depth);
        Arc::new(Self {
            store,
            lease,
            config,
            handlers: RwLock::new(HashMap::new()),
            tickers: Mutex::new(HashMap::new()),
            trigger_tx,
            trigger_rx: Mutex::new(Some(trigger_rx)),
        })
    }

    pub async fn register_handler(&self, handler_type: impl Into<String>, handler: Arc<dyn TaskHandler>) {
        self.handlers.write().await.insert(handler_type.into(), handler);
    }

    /// Starts the reconcile loop (spawns/tears down per-task cron tickers)
    /// and the manual-trigger dispatch worker. Mirrors the probe
    /// scheduler's reconcile-plus-ticker shape.
    pub fn spawn(self: Arc<Self>) -> Vec<JoinHandle<()>> {
        let reconcile = Arc::clone(&self).spawn_reconcile_loop();
        let trigger_worker = Arc::clone(&self).spawn_trigger_worker();
        vec![reconcile, trigger_worker]
    }

    fn spawn_reconcile_loop(self: Arc<Self>) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(Duration::from_secs(5));
            loop {
                interval.tick().await;
                if let Err(error) = self.reconcile().await {
                    tracing::warn!(%error, "task scheduler reconcile failed");
                }
            }
        })
    }

    async fn reconcile(self: &Arc<Self>) -> Result<()> {
        let tasks = self.store.list().await?;
        let mut tickers = self.tickers.lock().await;

        let due: HashMap<TaskUid, &ScheduledTask> = tasks
            .iter()
            .filter(|t| t.enabled && t.recurring)
            .map(|t| (t.uid.clone(), t))
            .collect();

        tickers.retain(|uid, ticker| match due.get(uid) {
            Some(t) if t.cron_expr == ticker.cron_expr => true,
            _ => {
                ticker.handle.abort();
                false
            }
        });

        for (uid, task) in due {
            if !tickers.contains_key(&uid) {
                let handle = Arc::clone(self).spawn_ticker(task.clone());
                tickers.insert(uid, TaskTicker { handle, cron_expr: task.cron_expr.clone() });
            }
        }

        Ok(())
    }

    fn spawn_ticker(self: Arc<Self>, task: ScheduledTask) -> JoinHandle<()> {
        tokio::spawn(async move {
            let schedule = match cron::Schedule::from_str(&task.cron_expr) {
                Ok(schedule) => schedule,
                Err(error) => {
                    tracing::warn!(task = %task.name, %error, "invalid cron expression, ticker will not run");
                    return;
                }
            };

            loop {
                let now = Utc::now();
                let Some(next) = schedule.after(&now).next() else {
                    return;
                };
                let wait = (next - now).to_std().unwrap_or(Duration::from_millis(100));
                tokio::time::sleep(wait).await;

                let current = match self.store.find_by_id(&task.uid).await {
                    Ok(Some(t)) if t.enabled => t,
                    Ok(_) => return, // deleted or disabled; reconcile tears this ticker down
                    Err(error) => {
                        tracing::warn!(%error, "failed to reload task before tick, skipping fire");
                        continue;
                    }
                };
                self.try_run_scheduled(current).await;
            }
        })
    }

    async fn try_run_scheduled(self: &Arc<Self>, task: ScheduledTask) {
        match self.lease.try_acquire(&task.name).await {
            Ok(true) => {}
            Ok(false) => {
                tracing::debug!(task = %task.name, "not leader for this task, recording nothing");
                return;
            }
            Err(error) => {
                tracing::warn!(task = %task.name, %error, "lease acquisition failed, skipping tick");
                return;
            }
        }

        match self.store.count_running(&task.uid).await {
            Ok(running) if running >= task.max_concurrent => {
                tracing::debug!(task = %task.name, running, "at max-concurrent capacity, scheduled tick skipped");
                return;
            }
            Err(error) => {
                tracing::warn!(%error, "failed to check running execution count");
                return;
            }
            _ => {}
        }

        let execution = TaskExecution::new(&task, TriggerType::Scheduled, None, self.lease.node_id());
        if let Err(error) = self.store.create_execution(&execution).await {
            tracing::warn!(%error, "failed to persist new scheduled execution");
            return;
        }

        let input = task.input_data.clone();
        tokio::spawn(Arc::clone(self).run_execution(task, execution, input));
    }

    fn spawn_trigger_worker(self: Arc<Self>) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut rx = self.trigger_rx.lock().await.take().expect("trigger worker started twice");
            while let Some(request) = rx.recv().await {
                let outcome = self.dispatch_trigger(request.task_uid, request.override_input, request.triggered_by).await;
                let _ = request.respond_to.send(outcome);
            }
        })
    }

    async fn dispatch_trigger(
        self: &Arc<Self>,
        task_uid: TaskUid,
        override_input: Option<String>,
        triggered_by: String,
    ) -> Result<ExecutionUid> {
        let task = self
            .store
            .find_by_id(&task_uid)
            .await?
            .ok_or_else(|| Error::NotFound(format!("task {task_uid} not found")))?;

        let running = self.store.count_running(&task_uid).await?;
        if running >= task.max_concurrent {
            return Err(Error::conflict_already_running());
        }

        let execution = TaskExecution::new(&task, TriggerType::Manual, Some(triggered_by.clone()), triggered_by);
        self.store.create_execution(&execution).await?;
        let execution_uid = execution.uid.clone();

        let input = override_input.unwrap_or_else(|| task.input_data.clone());
        tokio::spawn(Arc::clone(self).run_execution(task, execution, input));

        Ok(execution_uid)
    }

    /// Enqueues a manual trigger. Returns the new execution's id once it has
    /// been durably recorded as `pending`/`running`; the handler itself
    /// keeps running in the background. A full trigger queue (the bounded
    /// channel backing this call) yields `409 trigger-queue-full`
    /// immediately rather than blocking.
    pub async fn trigger_manual(self: &Arc<Self>, task_uid: TaskUid, override_input: Option<String>, triggered_by: impl Into<String>) -> Result<ExecutionUid> {
        let (respond_to, rx) = oneshot::channel();
        self.trigger_tx
            .try_send(TriggerRequest { task_uid, override_input, triggered_by: triggered_by.into(), respond_to })
            .map_err(|_| Error::conflict_trigger_queue_full())?;

        rx.await.map_err(|_| Error::Internal("trigger dispatch worker dropped the response channel".into()))?
    }

    async fn run_execution(self: Arc<Self>, task: ScheduledTask, mut execution: TaskExecution, input: String) {
        let handler = self.handlers.read().await.get(&task.handler_type).cloned();
        let Some(handler) = handler else {
            execution.finish(ExecutionState::Failure, None, Some(format!("no handler registered for type '{}'", task.handler_type)), None);
            self.persist_terminal(&task, &execution).await;
            return;
        };

        let max_duration = Duration::from_secs(task.max_duration_secs.max(1));
        let grace = Duration::from_secs(task.timeout_grace_secs);
        let mut retry_count = 0u32;

        loop {
            execution.state = ExecutionState::Running;
            execution.retry_count = retry_count;
            if let Err(error) = self.store.update_execution(&execution).await {
                tracing::warn!(%error, task = %task.name, "failed to persist running execution state");
            }

            let outcome = run_one_attempt(Arc::clone(&handler), execution.clone(), input.clone(), max_duration, grace).await;

            match outcome {
                AttemptOutcome::Success(output) => {
                    execution.finish(ExecutionState::Success, Some(output), None, None);
                    break;
                }
                AttemptOutcome::Timeout { stack } => {
                    execution.finish(ExecutionState::Timeout, None, Some("max-duration elapsed and grace period expired".into()), stack);
                    break;
                }
                AttemptOutcome::Failure { message, stack } => {
                    if retry_count < task.max_retries {
                        let delay = self.backoff_delay(task.backoff_base_secs, retry_count);
                        tracing::debug!(task = %task.name, retry_count, ?delay, %message, "task attempt failed, retrying after backoff");
                        retry_count += 1;
                        tokio::time::sleep(delay).await;
                        continue;
                    }
                    execution.finish(ExecutionState::Failure, None, Some(message), stack);
                    break;
                }
            }
        }

        self.persist_terminal(&task, &execution).await;
    }

    async fn persist_terminal(&self, task: &ScheduledTask, execution: &TaskExecution) {
        if let Err(error) = self.store.update_execution(execution).await {
            tracing::warn!(%error, task = %task.name, "failed to persist terminal execution state");
        }

        match self.store.find_by_id(&task.uid).await {
            Ok(Some(mut latest)) => {
                latest.stats.record_terminal(execution.state, execution.finished_at.unwrap_or_else(Utc::now));
                if let Err(error) = self.store.upsert(&latest).await {
                    tracing::warn!(%error, task = %task.name, "failed to persist task statistics");
                }
            }
            Ok(None) => tracing::warn!(task = %task.name, "task deleted mid-execution, statistics not updated"),
            Err(error) => tracing::warn!(%error, task = %task.name, "failed to reload task for statistics update"),
        }
    }

    fn backoff_delay(&self, base_secs: u64, retry_count: u32) -> Duration {
        let exponential = base_secs.saturating_mul(1u64.checked_shl(retry_count).unwrap_or(u64::MAX).max(1));
        let capped_secs = exponential.min(self.config.retry_backoff_cap_secs.max(base_secs.max(1)));
        let jitter_ms = rand::rng().random_range(0..250);
        Duration::from_secs(capped_secs) + Duration::from_millis(jitter_ms)
    }
}

async fn run_one_attempt(handler: Arc<dyn TaskHandler>, execution: TaskExecution, input: String, max_duration: Duration, grace: Duration) -> AttemptOutcome {
    let cancel = CancellationToken::new();
    let cancel_for_handler = cancel.clone();

    let mut task_handle = tokio::spawn(async move {
        std::panic::AssertUnwindSafe(handler.run(&execution, &input, cancel_for_handler))
            .catch_unwind()
            .await
    });

    match tokio::time::timeout(max_duration, &mut task_handle).await {
        Ok(join_result) => outcome_from_join(join_result),
        Err(_elapsed) => {
            // max-duration elapsed: request cooperative cancellation ("canceling")
            // and allow the grace period before force-finalizing as timeout.
            cancel.cancel();
            match tokio::time::timeout(grace, &mut task_handle).await {
                Ok(join_result) => match outcome_from_join(join_result) {
                    AttemptOutcome::Success(output) => AttemptOutcome::Success(output),
                    AttemptOutcome::Failure { message, stack } => AttemptOutcome::Timeout { stack: stack.or(Some(message)) },
                    AttemptOutcome::Timeout { stack } => AttemptOutcome::Timeout { stack },
                },
                Err(_grace_elapsed) => {
                    task_handle.abort();
                    AttemptOutcome::Timeout { stack: None }
                }
            }
        }
    }
}

fn outcome_from_join(join_result: std::result::Result<std::result::Result<std::result::Result<String, String>, Box<dyn std::any::Any + Send>>, tokio::task::JoinError>) -> AttemptOutcome {
    match join_result {
        Ok(Ok(Ok(output))) => AttemptOutcome::Success(output),
        Ok(Ok(Err(message))) => AttemptOutcome::Failure { message, stack: None },
        Ok(Err(panic_payload)) => AttemptOutcome::Failure { message: "handler panicked".into(), stack: Some(panic_message(panic_payload)) },
        Err(join_error) => AttemptOutcome::Failure { message: format!("handler task join error: {join_error}"), stack: None },
    }
}

fn panic_message(payload: Box<dyn std::any::Any + Send>) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::task::store::InMemoryTaskStore;

    struct AlwaysOk;

    #[async_trait]
    impl TaskHandler for AlwaysOk {
        async fn run(&self, _execution: &TaskExecution, input: &str, _cancel: CancellationToken) -> std::result::Result<String, String> {
            Ok(format!("ok:{input}"))
        }
    }

    struct FailTwiceThenOk {
        calls: std::sync::atomic::AtomicU32,
    }

    #[async_trait]
    impl TaskHandler for FailTwiceThenOk {
        async fn run(&self, _execution: &TaskExecution, _input: &str, _cancel: CancellationToken) -> std::result::Result<String, String> {
            let n = self.calls.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
            if n < 2 {
                Err("not yet".into())
            } else {
                Ok("eventually".into())
            }
        }
    }

    struct AlwaysSleeps;

    #[async_trait]
    impl TaskHandler for AlwaysSleeps {
        async fn run(&self, _execution: &TaskExecution, _input: &str, _cancel: CancellationToken) -> std::result::Result<String, String> {
            tokio::time::sleep(Duration::from_secs(10)).await;
            Ok("too late".into())
        }
    }

    fn test_config() -> SchedulerConfig {
        SchedulerConfig { lease_ttl_secs: 10, lease_renew_secs: 3, trigger_queue_depth: 4, retry_backoff_cap_secs: 30 }
    }

    #[tokio::test]
    async fn retries_then_succeeds_on_single_execution_row() {
        let store: Arc<dyn TaskStore> = Arc::new(InMemoryTaskStore::new());
        let mut task = ScheduledTask::new("retry-me", "retrying", "");
        task.max_retries = 3;
        task.backoff_base_secs = 0;
        store.upsert(&task).await.unwrap();

        let redis_pool = crate::test_support::fake_redis_pool();
        let lease = TaskLease::new(redis_pool, "node-test", 10);
        let scheduler = TaskScheduler::new(store.clone(), lease, test_config());
        scheduler
            .register_handler("retrying", Arc::new(FailTwiceThenOk { calls: std::sync::atomic::AtomicU32::new(0) }))
            .await;

        let execution = TaskExecution::new(&task, TriggerType::Manual, None, "test");
        store.create_execution(&execution).await.unwrap();
        scheduler.clone().run_execution(task.clone(), execution.clone(), task.input_data.clone()).await;

        let finished = store.find_execution(&execution.uid).await.unwrap().unwrap();
        assert_eq!(finished.state, ExecutionState::Success);
        assert_eq!(finished.retry_count, 2);

        let updated_task = store.find_by_id(&task.uid).await.unwrap().unwrap();
        assert_eq!(updated_task.stats.total_executions, 1);
        assert_eq!(updated_task.stats.success_count, 1);
        assert_eq!(updated_task.stats.consecutive_failures, 0);
    }

    #[tokio::test]
    async fn exceeding_max_duration_finalizes_as_timeout() {
        let store: Arc<dyn TaskStore> = Arc::new(InMemoryTaskStore::new());
        let mut task = ScheduledTask::new("sleepy", "sleeper", "");
        task.max_duration_secs = 1;
        task.timeout_grace_secs = 1;
        store.upsert(&task).await.unwrap();

        let redis_pool = crate::test_support::fake_redis_pool();
        let lease = TaskLease::new(redis_pool, "node-test", 10);
        let scheduler = TaskScheduler::new(store.clone(), lease, test_config());
        scheduler.register_handler("sleeper", Arc::new(AlwaysSleeps)).await;

        let execution = TaskExecution::new(&task, TriggerType::Manual, None, "test");
        store.create_execution(&execution).await.unwrap();
        scheduler.clone().run_execution(task.clone(), execution.clone(), task.input_data.clone()).await;

        let finished = store.find_execution(&execution.uid).await.unwrap().unwrap();
        assert_eq!(finished.state, ExecutionState::Timeout);
    }

    #[tokio::test]
    async fn trigger_queue_rejects_once_full() {
        let store: Arc<dyn TaskStore> = Arc::new(InMemoryTaskStore::new());
        let task = ScheduledTask::new("quick", "quick", "");
        store.upsert(&task).await.unwrap();

        let redis_pool = crate::test_support::fake_redis_pool();
        let lease = TaskLease::new(redis_pool, "node-test", 10);
        let mut config = test_config();
        config.trigger_queue_depth = 0;
        let scheduler = TaskScheduler::new(store.clone(), lease, config);
        scheduler.register_handler("quick", Arc::new(AlwaysOk)).await;

        let result = scheduler.trigger_manual(task.uid.clone(), None, "tester").await;
        assert!(matches!(result, Err(Error::Conflict(_))));
    }
}
