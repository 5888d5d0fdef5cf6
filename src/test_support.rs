//! Test-only helpers shared across module test suites.

use deadpool_redis::{Config as RedisPoolConfig, Pool as RedisPool, Runtime};

/// A `deadpool_redis::Pool` that's constructed lazily and never actually
/// connects — `deadpool_redis::Config::create_pool` only builds the pool
/// object, it doesn't dial Redis until something calls `.get()`. Tests that
/// exercise code paths which never touch the pool (e.g. task scheduler
/// retry/timeout logic that doesn't take the leader lease) can use this
/// instead of spinning up a real Redis instance.
pub fn fake_redis_pool() -> RedisPool {
    RedisPoolConfig::from_url("redis://127.0.0.1:1")
        .create_pool(Some(Runtime::Tokio1))
        .expect("pool construction does not connect")
}
