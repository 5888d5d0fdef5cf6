//! Per-monitor ticker, target selection, dispatch and result aggregation
//! (spec §4.5).

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::sync::Mutex;
use tokio::task::JoinHandle;

use super::executor;
use super::model::{AvailabilityWindow, ProbeType, ServiceMonitor, TargetSelection};
use super::store::MonitorStore;
use crate::agent::proto::pb::{downstream, Downstream, ProbeTask};
use crate::agent::registry::AgentRegistry;
use crate::alert::engine::AlertEngine;
use crate::alert::model::AlertEvent;
use crate::config::ProbeConfig;
use crate::ids::{AgentId, MonitorId};

type TargetKey = Option<AgentId>;

struct PendingDispatch {
    deadline: DateTime<Utc>,
}

#[derive(Default)]
struct ConsecutiveState {
    consecutive_down: u32,
    firing: bool,
}

struct MonitorTicker {
    handle: JoinHandle<()>,
    interval_secs: u32,
}

pub struct ProbeScheduler {
    store: Arc<dyn MonitorStore>,
    registry: Arc<AgentRegistry>,
    alert: Arc<AlertEngine>,
    failure_threshold: u32,
    late_result_multiplier: u32,
    windows: Mutex<HashMap<MonitorId, AvailabilityWindow>>,
    pending: Mutex<HashMap<(MonitorId, TargetKey), PendingDispatch>>,
    consecutive: Mutex<HashMap<(MonitorId, TargetKey), ConsecutiveState>>,
    tickers: Mutex<HashMap<MonitorId, MonitorTicker>>,
}

impl ProbeScheduler {
    pub fn new(store: Arc<dyn MonitorStore>, registry: Arc<AgentRegistry>, alert: Arc<AlertEngine>, config: &ProbeConfig) -> Arc<Self> {
        Arc::new(Self {
            store,
            registry,
            alert,
            failure_threshold: config.failure_threshold,
            late_result_multiplier: config.late_result_multiplier,
            windows: Mutex::new(HashMap::new()),
            pending: Mutex::new(HashMap::new()),
            consecutive: Mutex::new(HashMap::new()),
            tickers: Mutex::new(HashMap::new()),
        })
    }

    /// Reconcile loop: every 5s, diff the enabled monitor set against the
    /// running tickers so edits in the store ("scheduler picks up changes
    /// within one tick", spec §3) take effect without a restart.
    pub fn spawn(self: Arc<Self>) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(Duration::from_secs(5));
            loop {
                interval.tick().await;
                if let Err(error) = self.reconcile().await {
                    tracing::warn!(%error, "probe scheduler reconcile failed");
                }
            }
        })
    }

    async fn reconcile(self: &Arc<Self>) -> crate::error::Result<()> {
        let monitors = self.store.list().await?;
        let mut tickers = self.tickers.lock().await;

        let enabled: HashMap<MonitorId, &ServiceMonitor> = monitors
            .iter()
            .filter(|m| m.enabled)
            .map(|m| (m.id.clone(), m))
            .collect();

        tickers.retain(|id, ticker| match enabled.get(id) {
            Some(m) if m.interval_secs == ticker.interval_secs => true,
            _ => {
                ticker.handle.abort();
                false
            }
        });

        for (id, monitor) in enabled {
            if !tickers.contains_key(&id) {
                let handle = Arc::clone(self).spawn_ticker(monitor.clone());
                tickers.insert(id, MonitorTicker { handle, interval_secs: monitor.interval_secs });
            }
        }

        Ok(())
    }

    fn spawn_ticker(self: Arc<Self>, monitor: ServiceMonitor) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(Duration::from_secs(u64::from(monitor.interval_secs.max(1))));
            loop {
                interval.tick().await;
                let current = match self.store.find_by_id(&monitor.id).await {
                    Ok(Some(m)) if m.enabled => m,
                    _ => return, // deleted or disabled; reconcile will tear this ticker down
                };
                self.tick(&current).await;
            }
        })
    }

    async fn tick(self: &Arc<Self>, monitor: &ServiceMonitor) {
        let targets = self.select_targets(monitor).await;

        if targets.is_empty() {
            tracing::debug!(monitor = %monitor.id, "no matching online agent, recording no-target result");
            self.record_local_result(monitor.id.clone(), None, false, 0, Some("no-target".to_string())).await;
            return;
        }

        for target in targets {
            match target {
                None => {
                    let outcome = executor::execute(monitor.probe_type, &monitor.target, monitor.timeout_ms).await;
                    self.record_local_result(monitor.id.clone(), None, outcome.up, outcome.latency_ms, outcome.error).await;
                }
                Some(agent_id) => self.dispatch_to_agent(monitor, agent_id).await,
            }
        }
    }

    /// `None` in the returned list means "execute locally" (`Server`
    /// selection); otherwise each entry is an online agent to dispatch to.
    async fn select_targets(&self, monitor: &ServiceMonitor) -> Vec<Option<AgentId>> {
        match &monitor.selection {
            TargetSelection::Server => vec![None],
            TargetSelection::Include { agent_ids } => {
                let online = self.registry.online_ids().await;
                agent_ids
                    .iter()
                    .filter(|id| online.contains(id))
                    .cloned()
                    .map(Some)
                    .collect()
            }
            TargetSelection::Exclude { agent_ids } => self
                .registry
                .online_ids()
                .await
                .into_iter()
                .filter(|id| !agent_ids.contains(id))
                .map(Some)
                .collect(),
            TargetSelection::Group { group } => self
                .registry
                .online_ids_in_group(group)
                .await
                .into_iter()
                .map(Some)
                .collect(),
        }
    }

    async fn dispatch_to_agent(&self, monitor: &ServiceMonitor, agent_id: AgentId) {
        let Some(slot) = self.registry.slot(&agent_id).await else {
            tracing::debug!(agent = %agent_id, "agent went offline before probe dispatch");
            return;
        };

        let deadline = Utc::now() + chrono::Duration::seconds(i64::from(monitor.interval_secs) * i64::from(self.late_result_multiplier));
        self.pending
            .lock()
            .await
            .insert((monitor.id.clone(), Some(agent_id.clone())), PendingDispatch { deadline });

        slot.downstream
            .push(Downstream {
                payload: Some(downstream::Payload::ProbeTask(ProbeTask {
                    monitor_id: monitor.id.to_string(),
                    probe_type: monitor.probe_type.as_str().to_string(),
                    target: monitor.target.clone(),
                    timeout_ms: monitor.timeout_ms,
                })),
            })
            .await;
    }

    /// A probe result reported by an agent over the Stream Mux. Discards
    /// anything not matching a live dispatch (late result or one this
    /// scheduler never sent — spec §4.5 point 3).
    pub async fn on_agent_result(&self, agent_id: AgentId, monitor_id: MonitorId, up: bool, latency_ms: u32, error: Option<String>) {
        let key = (monitor_id.clone(), Some(agent_id.clone()));
        let dispatch = self.pending.lock().await.remove(&key);
        match dispatch {
            Some(d) if Utc::now() <= d.deadline => {
                self.apply_result(monitor_id, Some(agent_id), up, latency_ms, error).await;
            }
            Some(_) => tracing::debug!(%monitor_id, %agent_id, "discarding late probe result"),
            None => tracing::debug!(%monitor_id, %agent_id, "discarding unexpected probe result"),
        }
    }

    /// A result this scheduler computed itself (`Server` selection, or a
    /// synthetic "no-target" tie) — no pending-dispatch bookkeeping needed.
    async fn record_local_result(&self, monitor_id: MonitorId, target: Option<AgentId>, up: bool, latency_ms: u32, error: Option<String>) {
        self.apply_result(monitor_id, target, up, latency_ms, error).await;
    }

    /// Agent went offline (spec §4.2 point 4): any outstanding dispatch to
    /// it is marked agent-gone rather than silently discarded.
    pub async fn on_agent_offline(&self, agent_id: AgentId) {
        let mut pending = self.pending.lock().await;
        let keys: Vec<_> = pending
            .keys()
            .filter(|(_, target)| target.as_ref() == Some(&agent_id))
            .cloned()
            .collect();
        for key in keys {
            pending.remove(&key);
            drop(pending);
            self.apply_result(key.0, key.1, false, 0, Some("agent-gone".to_string())).await;
            pending = self.pending.lock().await;
        }
    }

    async fn apply_result(&self, monitor_id: MonitorId, target: Option<AgentId>, up: bool, latency_ms: u32, error: Option<String>) {
        {
            let mut windows = self.windows.lock().await;
            let window = match windows.get_mut(&monitor_id) {
                Some(w) => w,
                None => {
                    let loaded = self.store.load_window(&monitor_id).await.unwrap_or_default();
                    windows.entry(monitor_id.clone()).or_insert(loaded)
                }
            };
            window.record(up, latency_ms, Utc::now());
            let snapshot = window.clone();
            let store = self.store.clone();
            let id = monitor_id.clone();
            tokio::spawn(async move {
                if let Err(error) = store.save_window(&id, &snapshot).await {
                    tracing::warn!(%error, "failed to persist availability window");
                }
            });
        }

        if let Some(error) = &error {
            tracing::debug!(%monitor_id, ?target, %error, "probe result");
        }

        self.update_consecutive(monitor_id, target, up).await;
    }

    async fn update_consecutive(&self, monitor_id: MonitorId, target: Option<AgentId>, up: bool) {
        let key = (monitor_id.clone(), target.clone());
        let mut consecutive = self.consecutive.lock().await;
        let state = consecutive.entry(key).or_default();

        if up {
            let was_firing = state.firing;
            state.consecutive_down = 0;
            state.firing = false;
            if was_firing {
                drop(consecutive);
                self.alert.handle(AlertEvent::ProbeUp { monitor_id, target }).await;
            }
        } else {
            state.consecutive_down += 1;
            let should_fire = state.consecutive_down >= self.failure_threshold && !state.firing;
            if should_fire {
                state.firing = true;
            }
            drop(consecutive);
            if should_fire {
                self.alert.handle(AlertEvent::ProbeDown { monitor_id, target }).await;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agent::store::InMemoryAgentStore;
    use crate::audit::{AuditLogger, AuditPipeline};
    use crate::probe::store::InMemoryMonitorStore;

    async fn scheduler() -> Arc<ProbeScheduler> {
        let monitor_store = Arc::new(InMemoryMonitorStore::new());
        let registry = Arc::new(AgentRegistry::new(Arc::new(InMemoryAgentStore::new()), 16, Duration::from_secs(30)));
        let storage = Arc::new(crate::audit::storage::memory::MemoryAuditStorage::new());
        let (_pipeline, handle) = AuditPipeline::start(Default::default(), storage).await.unwrap();
        let logger = AuditLogger::new(handle, Default::default());
        let alert = AlertEngine::new(Arc::new(crate::alert::store::InMemoryAlertStore::new()), logger, None);
        ProbeScheduler::new(monitor_store, registry, alert, &ProbeConfig::default())
    }

    #[tokio::test]
    async fn unexpected_result_is_discarded() {
        let scheduler = scheduler().await;
        let monitor_id = MonitorId::new();
        scheduler
            .on_agent_result(AgentId::new(), monitor_id.clone(), true, 5, None)
            .await;
        assert!(scheduler.windows.lock().await.get(&monitor_id).is_none());
    }

    #[tokio::test]
    async fn consecutive_failures_trip_firing_state() {
        let scheduler = scheduler().await;
        let monitor_id = MonitorId::new();
        for _ in 0..3 {
            scheduler.record_local_result(monitor_id.clone(), None, false, 1, None).await;
        }
        let consecutive = scheduler.consecutive.lock().await;
        let state = consecutive.get(&(monitor_id, None)).unwrap();
        assert!(state.firing);
        assert_eq!(state.consecutive_down, 3);
    }
}
