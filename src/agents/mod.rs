//! Reactive connection-pool agents, built on `acton_reactive`.
//!
//! Database, Redis, and NATS connections are brought up by dedicated actors
//! rather than established inline during startup: each agent owns its
//! connection attempt, retries with backoff, and publishes its health to
//! [`HealthMonitorAgent`] via broadcast. `state.rs` reads the resulting pool
//! out of the `Shared*Pool` handle once connected.

mod health;
mod messages;
mod pool;

pub use health::{HealthMonitorAgent, HealthMonitorState};
pub use messages::*;
pub use pool::{
    DatabasePoolAgent, DatabasePoolState, NatsPoolAgent, NatsPoolState, RedisPoolAgent, RedisPoolState,
    SharedDbPool, SharedNatsClient, SharedRedisPool,
};
