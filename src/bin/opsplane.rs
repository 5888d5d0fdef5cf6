//! `opsplane` binary: wires the core subsystems (spec §2) to a gRPC agent
//! listener and an HTTP health surface, and drives graceful shutdown.
//!
//! This is the only place in the crate that knows about every subsystem at
//! once — everything else depends on traits and is unit-testable on its
//! own. The wiring here resolves the spec §9 "circular dependency between
//! state cache and agent manager" redesign flag concretely: [`Mediator`]
//! is the small trait-object both sides talk through.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use opsplane::agent::model::HostState;
use opsplane::agent::mux::{AgentEventSink, AgentRpcService};
use opsplane::agent::registry::AgentRegistry;
use opsplane::agent::store::{InMemoryAgentStore, PgAgentStore};
use opsplane::alert::engine::AlertEngine;
use opsplane::alert::model::AlertEvent;
use opsplane::alert::store::InMemoryAlertStore;
use opsplane::audit::pipeline::AuditPipeline;
use opsplane::audit::storage::{memory::MemoryAuditStorage, pg::PgAuditStorage, AuditStorage};
use opsplane::audit::AuditLogger;
use opsplane::auth_support::SecretHasher;
use opsplane::config::Config;
use opsplane::grpc::GrpcServer;
use opsplane::ids::{AgentId, MonitorId, SessionUid};
use opsplane::observability::init_tracing;
use opsplane::probe::scheduler::ProbeScheduler;
use opsplane::probe::store::{InMemoryMonitorStore, PgMonitorStore};
use opsplane::server::{shutdown_signal, Server};
use opsplane::service_builder::router;
use opsplane::state::AppState;
use opsplane::state_cache::store::{InMemoryStateArchive, PgStateArchive};
use opsplane::state_cache::StateCache;
use opsplane::task::lease::{generate_node_id, TaskLease};
use opsplane::task::scheduler::TaskScheduler;
use opsplane::task::store::{InMemoryTaskStore, PgTaskStore};
use opsplane::terminal::broker::TerminalBroker;
use opsplane::terminal::store::{InMemoryTerminalStore, PgTerminalStore};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = Config::load()?;
    init_tracing(&config)?;

    tracing::info!(
        http_port = config.server.http_port,
        rpc_port = config.server.rpc_port,
        "starting opsplane"
    );

    let (state, agent_runtime) = AppState::bootstrap(config.clone()).await?;

    // Ambient pools connect in the background (spec §7: startup failures of
    // an `optional` pool must not abort the boot sequence). Give them a
    // short window to come up before falling back to in-memory stores, so a
    // dev run with no database configured still produces a fully working
    // (if non-durable) control plane.
    let db_pool = wait_for_pool(&state, Duration::from_secs(5)).await;

    let audit_storage: Arc<dyn AuditStorage> = match &db_pool {
        Some(pool) => Arc::new(PgAuditStorage::new(pool.clone())),
        None => {
            tracing::warn!("no database pool available, audit events will not survive a restart");
            Arc::new(MemoryAuditStorage::new())
        }
    };
    let (audit_pipeline, audit_handle) = AuditPipeline::start(config.audit.clone(), audit_storage).await?;
    let audit = AuditLogger::new(audit_handle, config.audit.clone());

    let agent_store: Arc<dyn opsplane::agent::store::AgentStore> = match &db_pool {
        Some(pool) => Arc::new(PgAgentStore::new(pool.clone())),
        None => Arc::new(InMemoryAgentStore::new()),
    };
    let registry = Arc::new(AgentRegistry::new(
        agent_store,
        config.agent.downstream_queue_depth,
        config.agent.offline_after(),
    ));

    let monitor_store: Arc<dyn opsplane::probe::store::MonitorStore> = match &db_pool {
        Some(pool) => Arc::new(PgMonitorStore::new(pool.clone())),
        None => Arc::new(InMemoryMonitorStore::new()),
    };
    let terminal_store: Arc<dyn opsplane::terminal::store::TerminalStore> = match &db_pool {
        Some(pool) => Arc::new(PgTerminalStore::new(pool.clone())),
        None => Arc::new(InMemoryTerminalStore::new()),
    };
    let archive_store: Arc<dyn opsplane::state_cache::store::StateArchive> = match &db_pool {
        Some(pool) => Arc::new(PgStateArchive::new(pool.clone())),
        None => Arc::new(InMemoryStateArchive::new()),
    };
    // No Postgres-backed AlertStore exists yet (see DESIGN.md) — alert
    // dedup state is process-local either way.
    let alert_store = Arc::new(InMemoryAlertStore::new());

    let nats = state.nats().await;
    let alert_engine = AlertEngine::new(alert_store, audit.clone(), nats);

    let probe_scheduler = ProbeScheduler::new(monitor_store, registry.clone(), alert_engine.clone(), &config.probe);
    let probe_handle = probe_scheduler.clone().spawn();

    let terminal_broker = TerminalBroker::new(terminal_store, audit.clone());

    let state_cache = StateCache::new(archive_store, registry.clone());
    let archive_handle = state_cache.clone().spawn_archival(config.agent.archive_interval());

    let task_handles = match state.redis().await {
        Some(redis_pool) => {
            let node_id = generate_node_id();
            tracing::info!(%node_id, "task scheduler leader lease node identity");
            let lease = TaskLease::new(redis_pool, node_id, config.scheduler.lease_ttl_secs);
            let task_store: Arc<dyn opsplane::task::store::TaskStore> = match &db_pool {
                Some(pool) => Arc::new(PgTaskStore::new(pool.clone())),
                None => Arc::new(InMemoryTaskStore::new()),
            };
            let scheduler = TaskScheduler::new(task_store, lease, config.scheduler.clone());
            Some(scheduler.spawn())
        }
        None => {
            tracing::warn!("no redis pool available, task scheduler leader election is disabled and no tasks will run");
            None
        }
    };

    let hasher = SecretHasher::new();
    let sink: Arc<dyn AgentEventSink> = Arc::new(Mediator {
        state_cache: state_cache.clone(),
        probe_scheduler: probe_scheduler.clone(),
        terminal_broker: terminal_broker.clone(),
        alert_engine: alert_engine.clone(),
    });

    let agent_service = Arc::new(AgentRpcService::new(
        registry.clone(),
        sink.clone(),
        audit.clone(),
        hasher,
        config.agent.tick_interval_secs as u32,
    ));

    let watchdog_handle = spawn_watchdog(registry.clone(), sink.clone(), config.agent.tick_interval());

    let grpc = GrpcServer::new(&config.server, agent_service);
    let grpc_handle = tokio::spawn(grpc.serve(shutdown_signal()));

    let http_server = Server::new(config.clone());
    let app = router(state.clone());
    let http_handle = tokio::spawn(http_server.serve(app));

    let (http_result, grpc_result) = tokio::join!(http_handle, grpc_handle);
    match http_result {
        Ok(Ok(())) => {}
        Ok(Err(error)) => tracing::error!(%error, "http server exited with error"),
        Err(error) => tracing::error!(%error, "http server task panicked"),
    }
    match grpc_result {
        Ok(Ok(())) => {}
        Ok(Err(error)) => tracing::error!(%error, "grpc server exited with error"),
        Err(error) => tracing::error!(%error, "grpc server task panicked"),
    }

    watchdog_handle.abort();
    probe_handle.abort();
    archive_handle.abort();
    if let Some(handles) = task_handles {
        for handle in handles {
            handle.abort();
        }
    }

    tracing::info!("flushing audit pipeline before exit");
    drop(audit);
    match audit_pipeline.shutdown(Duration::from_secs(30)).await {
        Ok(()) => tracing::info!("audit pipeline drained cleanly"),
        Err(error) => tracing::error!(%error, "audit pipeline shutdown incomplete, some events may be lost"),
    }

    if let Err(error) = agent_runtime.shutdown_all().await {
        tracing::error!("agent runtime shutdown error: {error}");
    }

    Ok(())
}

/// Poll `state`'s database pool slot until it's populated or `timeout`
/// elapses. The pool agent connects in the background (spec §7 "a
/// connection failure at startup is logged and the pool is left unset
/// rather than aborting the boot sequence" for `optional` pools).
async fn wait_for_pool(state: &AppState, timeout: Duration) -> Option<sqlx::PgPool> {
    if state.config().database.is_none() {
        return None;
    }
    let deadline = tokio::time::Instant::now() + timeout;
    loop {
        if let Some(pool) = state.db().await {
            return Some(pool);
        }
        if tokio::time::Instant::now() >= deadline {
            tracing::warn!("timed out waiting for database pool, falling back to in-memory stores");
            return None;
        }
        tokio::time::sleep(Duration::from_millis(100)).await;
    }
}

/// Periodically sweeps stale agent connections (spec §4.2 point 4) and fans
/// the offline transition out through the same [`AgentEventSink`] the mux
/// uses, so the probe scheduler, terminal broker, and Alert Engine all see
/// it uniformly regardless of whether the agent disconnected cleanly or
/// went stale.
fn spawn_watchdog(registry: Arc<AgentRegistry>, sink: Arc<dyn AgentEventSink>, tick_interval: Duration) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(tick_interval);
        loop {
            interval.tick().await;
            let gone = registry.sweep_stale().await;
            for (agent_id, _slot) in gone {
                tracing::info!(%agent_id, "agent watchdog: marking offline");
                sink.on_agent_offline(agent_id).await;
            }
        }
    })
}

/// Resolves the spec §9 "circular dependency between state cache and agent
/// manager" redesign flag: the Stream Mux only knows about this small
/// trait, not the concrete state cache / probe scheduler / terminal broker
/// it ultimately feeds.
struct Mediator {
    state_cache: Arc<StateCache>,
    probe_scheduler: Arc<ProbeScheduler>,
    terminal_broker: Arc<TerminalBroker>,
    alert_engine: Arc<AlertEngine>,
}

#[async_trait]
impl AgentEventSink for Mediator {
    async fn on_host_state(&self, state: HostState) {
        self.state_cache.record(state).await;
    }

    async fn on_probe_result(&self, agent_id: AgentId, monitor_id: MonitorId, up: bool, latency_ms: u32, error: Option<String>) {
        self.probe_scheduler.on_agent_result(agent_id, monitor_id, up, latency_ms, error).await;
    }

    async fn on_terminal_data(&self, session_uid: SessionUid, data: Vec<u8>) {
        self.terminal_broker.on_upstream_data(&session_uid, data).await;
    }

    async fn on_docker_event(&self, _agent_id: AgentId, _payload_json: String) {
        // Docker event stream has no subscriber in this core (terminal
        // broker only reacts to docker-exec I/O, not lifecycle events);
        // logged for operator visibility only.
        tracing::trace!("docker event received, no subscriber wired");
    }

    async fn on_agent_online(&self, agent_id: AgentId) {
        self.alert_engine.handle(AlertEvent::HostOnline { agent_id }).await;
    }

    async fn on_agent_offline(&self, agent_id: AgentId) {
        self.probe_scheduler.on_agent_offline(agent_id.clone()).await;
        self.terminal_broker.on_agent_offline(&agent_id).await;
        self.alert_engine.handle(AlertEvent::HostOffline { agent_id }).await;
    }
}
