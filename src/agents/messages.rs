//! Message types for the connection-pool agents (database, redis, nats) and
//! the health monitor that aggregates their status.

/// Health status of a pool.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub enum HealthStatus {
    Healthy,
    Degraded,
    #[default]
    Unhealthy,
    Connecting,
}

#[derive(Clone, Debug, Default)]
pub struct AggregatedHealthResponse {
    pub overall_healthy: bool,
    pub components: Vec<ComponentHealth>,
}

#[derive(Clone, Debug, Default)]
pub struct ComponentHealth {
    pub name: String,
    pub status: HealthStatus,
    pub message: String,
}

/// Sent by a pool agent to the health monitor whenever its status changes.
#[derive(Clone, Debug, Default)]
pub struct PoolHealthUpdate {
    pub pool_type: String,
    pub status: HealthStatus,
    pub message: String,
}

/// Query for the current aggregated health snapshot.
#[derive(Clone, Debug, Default)]
pub struct GetAggregatedHealth;

// Internal messages sent by spawned connection tasks back to their owning agent.

#[derive(Clone, Debug)]
pub(crate) struct DatabasePoolConnected {
    pub pool: sqlx::PgPool,
}

#[derive(Clone, Debug, Default)]
pub(crate) struct DatabasePoolConnectionFailed {
    pub error: String,
}

#[derive(Clone, Debug)]
pub(crate) struct RedisPoolConnected {
    pub pool: deadpool_redis::Pool,
}

#[derive(Clone, Debug, Default)]
pub(crate) struct RedisPoolConnectionFailed {
    pub error: String,
}

#[derive(Clone, Debug)]
pub(crate) struct NatsClientConnected {
    pub client: async_nats::Client,
}

#[derive(Clone, Debug, Default)]
pub(crate) struct NatsClientConnectionFailed {
    pub error: String,
}
