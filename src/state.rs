//! Ambient application state: configuration plus shared infrastructure pools
//! (database/cache/events), used by the health surface and by whatever thin
//! HTTP layer is wired up outside this crate (spec.md §1 non-goal). The core
//! subsystems (agent registry, audit pipeline, probe scheduler, task
//! scheduler, terminal broker, alert engine, state cache) are constructed
//! and wired independently in the `opsplane` binary — they don't live on
//! this struct, since nothing in spec.md's scope hangs HTTP handlers off
//! them directly.

use std::sync::Arc;

use tokio::sync::RwLock;

#[cfg(feature = "database")]
use sqlx::PgPool;

#[cfg(feature = "cache")]
use deadpool_redis::Pool as RedisPool;

#[cfg(feature = "events")]
use async_nats::Client as NatsClient;

use acton_reactive::prelude::{ActonApp, AgentHandle, AgentRuntime};

use crate::{config::Config, error::Result};

/// Application state shared across handlers.
#[derive(Clone)]
pub struct AppState {
    config: Arc<Config>,

    #[cfg(feature = "database")]
    db_pool: Arc<RwLock<Option<PgPool>>>,

    #[cfg(feature = "cache")]
    redis_pool: Arc<RwLock<Option<RedisPool>>>,

    #[cfg(feature = "events")]
    nats_client: Arc<RwLock<Option<NatsClient>>>,

    /// Pool-health broadcast handle, set once `bootstrap` has spawned the
    /// `acton_reactive` pool-supervision agents (crate::agents).
    broker: Option<AgentHandle>,
}

impl AppState {
    /// Construct an `AppState` with no connection pools initialized — used
    /// by tests and by callers that manage pools themselves.
    pub fn new(config: Config) -> Self {
        Self {
            config: Arc::new(config),
            #[cfg(feature = "database")]
            db_pool: Arc::new(RwLock::new(None)),
            #[cfg(feature = "cache")]
            redis_pool: Arc::new(RwLock::new(None)),
            #[cfg(feature = "events")]
            nats_client: Arc::new(RwLock::new(None)),
            broker: None,
        }
    }

    /// Bring up the ambient pools declared in `config` via the
    /// `acton_reactive` pool-supervision agents (`crate::agents`) and return
    /// the resulting state plus the agent runtime the caller must shut down
    /// on exit. Pools that fail to connect and aren't marked `optional` are
    /// left as `None` and surfaced as unready by `health::readiness`; the
    /// pool agents keep retrying with backoff in the background.
    pub async fn bootstrap(config: Config) -> Result<(Self, AgentRuntime)> {
        let mut runtime = ActonApp::launch();

        #[cfg(any(feature = "database", feature = "cache", feature = "events"))]
        if let Err(e) = crate::agents::HealthMonitorAgent::spawn(&mut runtime).await {
            tracing::warn!("failed to spawn health monitor agent: {e}");
        }

        #[cfg(feature = "database")]
        let db_pool: Arc<RwLock<Option<PgPool>>> = Arc::new(RwLock::new(None));
        #[cfg(feature = "database")]
        if let Some(db_config) = &config.database {
            if let Err(e) = crate::agents::DatabasePoolAgent::spawn(&mut runtime, db_config.clone(), Some(db_pool.clone())).await {
                tracing::warn!("failed to spawn database pool agent: {e}");
            }
        }

        #[cfg(feature = "cache")]
        let redis_pool: Arc<RwLock<Option<RedisPool>>> = Arc::new(RwLock::new(None));
        #[cfg(feature = "cache")]
        if let Some(redis_config) = &config.redis {
            if let Err(e) = crate::agents::RedisPoolAgent::spawn(&mut runtime, redis_config.clone(), Some(redis_pool.clone())).await {
                tracing::warn!("failed to spawn redis pool agent: {e}");
            }
        }

        #[cfg(feature = "events")]
        let nats_client: Arc<RwLock<Option<NatsClient>>> = Arc::new(RwLock::new(None));
        #[cfg(feature = "events")]
        if let Some(nats_config) = &config.nats {
            if let Err(e) = crate::agents::NatsPoolAgent::spawn(&mut runtime, nats_config.clone(), Some(nats_client.clone())).await {
                tracing::warn!("failed to spawn nats pool agent: {e}");
            }
        }

        let broker = Some(runtime.broker());

        let state = Self {
            config: Arc::new(config),
            #[cfg(feature = "database")]
            db_pool,
            #[cfg(feature = "cache")]
            redis_pool,
            #[cfg(feature = "events")]
            nats_client,
            broker,
        };

        Ok((state, runtime))
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    #[cfg(feature = "database")]
    pub async fn db(&self) -> Option<PgPool> {
        self.db_pool.read().await.clone()
    }

    #[cfg(feature = "cache")]
    pub async fn redis(&self) -> Option<RedisPool> {
        self.redis_pool.read().await.clone()
    }

    #[cfg(feature = "events")]
    pub async fn nats(&self) -> Option<NatsClient> {
        self.nats_client.read().await.clone()
    }

    pub fn broker(&self) -> Option<&AgentHandle> {
        self.broker.as_ref()
    }

    /// Pool health metrics for all configured pools (database/redis/nats).
    pub async fn pool_health(&self) -> crate::pool_health::PoolHealthSummary {
        let mut summary = crate::pool_health::PoolHealthSummary::new();

        #[cfg(feature = "database")]
        if let Some(pool) = self.db().await {
            if let Some(db_config) = &self.config.database {
                summary.database = Some(crate::pool_health::DatabasePoolHealth::from_pool(&pool, db_config));
            }
        }

        #[cfg(feature = "cache")]
        if let Some(pool) = self.redis().await {
            if let Some(redis_config) = &self.config.redis {
                summary.redis = Some(crate::pool_health::RedisPoolHealth::from_pool(&pool, redis_config));
            }
        }

        #[cfg(feature = "events")]
        if let Some(client) = self.nats().await {
            if let Some(nats_config) = &self.config.nats {
                summary.nats = Some(crate::pool_health::NatsClientHealth::from_client(&client, nats_config));
            }
        }

        summary.healthy = summary.is_healthy();
        summary
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_state_has_no_pools() {
        let state = AppState::new(Config::default());
        assert_eq!(state.config().server.http_port, 12306);
        assert!(state.broker().is_none());
    }
}
