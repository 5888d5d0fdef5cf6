//! Distributed leader lease for the Task Scheduler (spec §4.6 "Leader
//! election"), grounded in the teacher's `lockout::LoginLockout` Redis
//! command idiom (`redis::cmd` against a `deadpool_redis` pool).

use std::ops::DerefMut;

use deadpool_redis::Pool as RedisPool;
use uuid::Uuid;

use crate::error::Result;

/// A coarse distributed lock keyed on task name. At most one node holds the
/// lease for a given task at a given instant; holding it is what makes a
/// node "the leader" for that task's current firing.
#[derive(Clone)]
pub struct TaskLease {
    redis_pool: RedisPool,
    node_id: String,
    ttl_secs: u64,
}

impl TaskLease {
    pub fn new(redis_pool: RedisPool, node_id: impl Into<String>, ttl_secs: u64) -> Self {
        Self { redis_pool, node_id: node_id.into(), ttl_secs }
    }

    fn key(task_name: &str) -> String {
        format!("opsplane:scheduler:lease:{task_name}")
    }

    /// Attempts to acquire (or renew, if already held by this node) the
    /// lease for `task_name`. Returns `true` if this node is the leader.
    pub async fn try_acquire(&self, task_name: &str) -> Result<bool> {
        let mut conn = self.redis_pool.get().await?;
        let key = Self::key(task_name);

        let acquired: Option<String> = redis::cmd("SET")
            .arg(&key)
            .arg(&self.node_id)
            .arg("NX")
            .arg("PX")
            .arg(self.ttl_secs * 1000)
            .query_async(conn.deref_mut())
            .await?;

        if acquired.is_some() {
            return Ok(true);
        }

        // Already held — check whether it's held by us, and if so renew it.
        let holder: Option<String> = redis::cmd("GET").arg(&key).query_async(conn.deref_mut()).await?;
        if holder.as_deref() == Some(self.node_id.as_str()) {
            let _: () = redis::cmd("PEXPIRE")
                .arg(&key)
                .arg(self.ttl_secs * 1000)
                .query_async(conn.deref_mut())
                .await?;
            return Ok(true);
        }

        Ok(false)
    }

    /// Releases the lease early (e.g. on graceful shutdown), but only if
    /// this node currently holds it — a Lua-free compare-and-delete using
    /// GETDEL semantics approximated by GET+DEL, acceptable because a lost
    /// race here just means the lease expires on its own TTL instead.
    pub async fn release(&self, task_name: &str) -> Result<()> {
        let mut conn = self.redis_pool.get().await?;
        let key = Self::key(task_name);
        let holder: Option<String> = redis::cmd("GET").arg(&key).query_async(conn.deref_mut()).await?;
        if holder.as_deref() == Some(self.node_id.as_str()) {
            let _: () = redis::cmd("DEL").arg(&key).query_async(conn.deref_mut()).await?;
        }
        Ok(())
    }

    pub fn node_id(&self) -> &str {
        &self.node_id
    }
}

/// Generates a stable-enough per-process node identity for lease ownership
/// when the operator hasn't configured one explicitly.
pub fn generate_node_id() -> String {
    format!("node-{}", Uuid::new_v4())
}
