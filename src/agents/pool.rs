//! Pool agent implementations for reactive connection management
//!
//! ## Pattern: Spawn and Send Message
//!
//! `acton-reactive` handlers must be `Send + Sync`, but the futures that
//! establish database/cache/NATS connections are typically only `Send`. So
//! each pool agent spawns the connection work with `tokio::spawn` and sends
//! itself a message when it completes, handled in a `mutate_on` handler that
//! updates agent state.

use std::sync::Arc;
use tokio::sync::RwLock;

use acton_reactive::prelude::*;

use super::messages::{
    DatabasePoolConnected, DatabasePoolConnectionFailed, HealthStatus, NatsClientConnected,
    NatsClientConnectionFailed, PoolHealthUpdate, RedisPoolConnected, RedisPoolConnectionFailed,
};

// ============================================================================
// Database Pool Agent
// ============================================================================

pub type SharedDbPool = Arc<RwLock<Option<sqlx::PgPool>>>;

#[derive(Debug, Default)]
pub struct DatabasePoolState {
    pub pool: Option<sqlx::PgPool>,
    pub config: Option<crate::config::DatabaseConfig>,
    pub connecting: bool,
    pub shared_pool: Option<SharedDbPool>,
}

pub struct DatabasePoolAgent;

impl DatabasePoolAgent {
    pub async fn spawn(
        runtime: &mut AgentRuntime,
        config: crate::config::DatabaseConfig,
        shared_pool: Option<SharedDbPool>,
    ) -> anyhow::Result<AgentHandle> {
        let mut agent = runtime.new_agent::<DatabasePoolState>();
        agent.model.config = Some(config);
        agent.model.connecting = true;
        agent.model.shared_pool = shared_pool;

        agent.mutate_on::<DatabasePoolConnected>(|agent, envelope| {
            let pool = envelope.message().pool.clone();
            agent.model.pool = Some(pool.clone());
            agent.model.connecting = false;
            let shared_pool = agent.model.shared_pool.clone();
            let broker = agent.handle().clone();

            AgentReply::from_async(async move {
                if let Some(shared) = shared_pool {
                    *shared.write().await = Some(pool);
                }
                broker
                    .broadcast(PoolHealthUpdate {
                        pool_type: "database".to_string(),
                        status: HealthStatus::Healthy,
                        message: "connected".to_string(),
                    })
                    .await;
                tracing::info!("database pool connected");
            })
        });

        agent.mutate_on::<DatabasePoolConnectionFailed>(|agent, envelope| {
            let error_msg = envelope.message().error.clone();
            agent.model.connecting = false;
            let broker = agent.handle().clone();

            tracing::error!("database pool connection failed: {error_msg}");
            AgentReply::from_async(async move {
                broker
                    .broadcast(PoolHealthUpdate {
                        pool_type: "database".to_string(),
                        status: HealthStatus::Unhealthy,
                        message: error_msg,
                    })
                    .await;
            })
        });

        agent.after_start(|agent| {
            let config = agent.model.config.clone();
            let self_handle = agent.handle().clone();

            AgentReply::from_async(async move {
                if let Some(cfg) = config {
                    tracing::info!("database pool agent starting, connecting...");
                    let result = tokio::spawn(async move { crate::database::create_pool(&cfg).await }).await;

                    match result {
                        Ok(Ok(pool)) => {
                            self_handle.send(DatabasePoolConnected { pool }).await;
                        }
                        Ok(Err(e)) => {
                            self_handle.send(DatabasePoolConnectionFailed { error: e.to_string() }).await;
                        }
                        Err(e) => {
                            self_handle
                                .send(DatabasePoolConnectionFailed { error: format!("connection task panicked: {e}") })
                                .await;
                        }
                    }
                }
            })
        });

        agent.before_stop(|agent| {
            let pool = agent.model.pool.clone();
            AgentReply::from_async(async move {
                if let Some(p) = pool {
                    p.close().await;
                    tracing::info!("database pool closed");
                }
            })
        });

        Ok(agent.start().await)
    }
}

// ============================================================================
// Redis Pool Agent
// ============================================================================

pub type SharedRedisPool = Arc<RwLock<Option<deadpool_redis::Pool>>>;

#[derive(Debug, Default)]
pub struct RedisPoolState {
    pub pool: Option<deadpool_redis::Pool>,
    pub config: Option<crate::config::RedisConfig>,
    pub connecting: bool,
    pub shared_pool: Option<SharedRedisPool>,
}

pub struct RedisPoolAgent;

impl RedisPoolAgent {
    pub async fn spawn(
        runtime: &mut AgentRuntime,
        config: crate::config::RedisConfig,
        shared_pool: Option<SharedRedisPool>,
    ) -> anyhow::Result<AgentHandle> {
        let mut agent = runtime.new_agent::<RedisPoolState>();
        agent.model.config = Some(config);
        agent.model.connecting = true;
        agent.model.shared_pool = shared_pool;

        agent.mutate_on::<RedisPoolConnected>(|agent, envelope| {
            let pool = envelope.message().pool.clone();
            agent.model.pool = Some(pool.clone());
            agent.model.connecting = false;
            let shared_pool = agent.model.shared_pool.clone();
            let broker = agent.handle().clone();

            AgentReply::from_async(async move {
                if let Some(shared) = shared_pool {
                    *shared.write().await = Some(pool);
                }
                broker
                    .broadcast(PoolHealthUpdate {
                        pool_type: "redis".to_string(),
                        status: HealthStatus::Healthy,
                        message: "connected".to_string(),
                    })
                    .await;
                tracing::info!("redis pool connected");
            })
        });

        agent.mutate_on::<RedisPoolConnectionFailed>(|agent, envelope| {
            let error_msg = envelope.message().error.clone();
            agent.model.connecting = false;
            let broker = agent.handle().clone();

            tracing::error!("redis pool connection failed: {error_msg}");
            AgentReply::from_async(async move {
                broker
                    .broadcast(PoolHealthUpdate {
                        pool_type: "redis".to_string(),
                        status: HealthStatus::Unhealthy,
                        message: error_msg,
                    })
                    .await;
            })
        });

        agent.after_start(|agent| {
            let config = agent.model.config.clone();
            let self_handle = agent.handle().clone();

            AgentReply::from_async(async move {
                if let Some(cfg) = config {
                    tracing::info!("redis pool agent starting, connecting...");
                    let result = tokio::spawn(async move { crate::cache::create_pool(&cfg).await }).await;

                    match result {
                        Ok(Ok(pool)) => {
                            self_handle.send(RedisPoolConnected { pool }).await;
                        }
                        Ok(Err(e)) => {
                            self_handle.send(RedisPoolConnectionFailed { error: e.to_string() }).await;
                        }
                        Err(e) => {
                            self_handle
                                .send(RedisPoolConnectionFailed { error: format!("connection task panicked: {e}") })
                                .await;
                        }
                    }
                }
            })
        });

        agent.before_stop(|_agent| AgentReply::from_async(async move { tracing::info!("redis pool agent stopping") }));

        Ok(agent.start().await)
    }
}

// ============================================================================
// NATS Pool Agent
// ============================================================================

pub type SharedNatsClient = Arc<RwLock<Option<async_nats::Client>>>;

#[derive(Debug, Default)]
pub struct NatsPoolState {
    pub client: Option<async_nats::Client>,
    pub config: Option<crate::config::NatsConfig>,
    pub connecting: bool,
    pub shared_client: Option<SharedNatsClient>,
}

pub struct NatsPoolAgent;

impl NatsPoolAgent {
    pub async fn spawn(
        runtime: &mut AgentRuntime,
        config: crate::config::NatsConfig,
        shared_client: Option<SharedNatsClient>,
    ) -> anyhow::Result<AgentHandle> {
        let mut agent = runtime.new_agent::<NatsPoolState>();
        agent.model.config = Some(config);
        agent.model.connecting = true;
        agent.model.shared_client = shared_client;

        agent.mutate_on::<NatsClientConnected>(|agent, envelope| {
            let client = envelope.message().client.clone();
            agent.model.client = Some(client.clone());
            agent.model.connecting = false;
            let shared_client = agent.model.shared_client.clone();
            let broker = agent.handle().clone();

            AgentReply::from_async(async move {
                if let Some(shared) = shared_client {
                    *shared.write().await = Some(client);
                }
                broker
                    .broadcast(PoolHealthUpdate {
                        pool_type: "nats".to_string(),
                        status: HealthStatus::Healthy,
                        message: "connected".to_string(),
                    })
                    .await;
                tracing::info!("nats client connected");
            })
        });

        agent.mutate_on::<NatsClientConnectionFailed>(|agent, envelope| {
            let error_msg = envelope.message().error.clone();
            agent.model.connecting = false;
            let broker = agent.handle().clone();

            tracing::error!("nats client connection failed: {error_msg}");
            AgentReply::from_async(async move {
                broker
                    .broadcast(PoolHealthUpdate {
                        pool_type: "nats".to_string(),
                        status: HealthStatus::Unhealthy,
                        message: error_msg,
                    })
                    .await;
            })
        });

        agent.after_start(|agent| {
            let config = agent.model.config.clone();
            let self_handle = agent.handle().clone();

            AgentReply::from_async(async move {
                if let Some(cfg) = config {
                    tracing::info!("nats pool agent starting, connecting...");
                    let result = tokio::spawn(async move { crate::events::create_client(&cfg).await }).await;

                    match result {
                        Ok(Ok(client)) => {
                            self_handle.send(NatsClientConnected { client }).await;
                        }
                        Ok(Err(e)) => {
                            self_handle.send(NatsClientConnectionFailed { error: e.to_string() }).await;
                        }
                        Err(e) => {
                            self_handle
                                .send(NatsClientConnectionFailed { error: format!("connection task panicked: {e}") })
                                .await;
                        }
                    }
                }
            })
        });

        agent.before_stop(|agent| {
            let client = agent.model.client.clone();
            AgentReply::from_async(async move {
                if let Some(c) = client {
                    drop(c);
                    tracing::info!("nats client closed");
                }
            })
        });

        Ok(agent.start().await)
    }
}
