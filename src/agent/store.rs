//! Durable agent metadata store (spec §4.2 "durable metadata in the store").
//!
//! Separate from the in-memory connection table owned by [`super::registry`]
//! — per spec §4.2, "every operation is guarded by a read-write lock on the
//! map alone; the durable store is updated outside the lock."

use async_trait::async_trait;
use std::collections::HashMap;
use std::str::FromStr;
use tokio::sync::RwLock;

use super::model::Agent;
use crate::error::Result;
use crate::ids::AgentId;

#[async_trait]
pub trait AgentStore: Send + Sync {
    async fn find_by_id(&self, id: &AgentId) -> Result<Option<Agent>>;
    async fn upsert(&self, agent: &Agent) -> Result<()>;
    async fn list(&self) -> Result<Vec<Agent>>;
    async fn list_in_group(&self, group: &str) -> Result<Vec<Agent>>;
    /// Administrative delete — the only way an `Agent` is ever removed
    /// (spec §3 "removed only by administrative delete").
    async fn delete(&self, id: &AgentId) -> Result<bool>;
}

#[derive(Default)]
pub struct InMemoryAgentStore {
    agents: RwLock<HashMap<AgentId, Agent>>,
}

impl InMemoryAgentStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl AgentStore for InMemoryAgentStore {
    async fn find_by_id(&self, id: &AgentId) -> Result<Option<Agent>> {
        Ok(self.agents.read().await.get(id).cloned())
    }

    async fn upsert(&self, agent: &Agent) -> Result<()> {
        self.agents.write().await.insert(agent.id.clone(), agent.clone());
        Ok(())
    }

    async fn list(&self) -> Result<Vec<Agent>> {
        Ok(self.agents.read().await.values().cloned().collect())
    }

    async fn list_in_group(&self, group: &str) -> Result<Vec<Agent>> {
        Ok(self
            .agents
            .read()
            .await
            .values()
            .filter(|a| a.group.as_deref() == Some(group))
            .cloned()
            .collect())
    }

    async fn delete(&self, id: &AgentId) -> Result<bool> {
        Ok(self.agents.write().await.remove(id).is_some())
    }
}

pub struct PgAgentStore {
    pool: sqlx::PgPool,
}

impl PgAgentStore {
    pub fn new(pool: sqlx::PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl AgentStore for PgAgentStore {
    async fn find_by_id(&self, id: &AgentId) -> Result<Option<Agent>> {
        let row = sqlx::query_as::<_, AgentRow>(
            "SELECT id, hostname, platform, secret_hash, version, tags, \"group\", status, last_seen_at, created_at \
             FROM agents WHERE id = $1",
        )
        .bind(id.as_str())
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(Into::into))
    }

    async fn upsert(&self, agent: &Agent) -> Result<()> {
        sqlx::query(
            "INSERT INTO agents (id, hostname, platform, secret_hash, version, tags, \"group\", status, last_seen_at, created_at) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10) \
             ON CONFLICT (id) DO UPDATE SET hostname = $2, platform = $3, secret_hash = $4, version = $5, \
             tags = $6, \"group\" = $7, status = $8, last_seen_at = $9",
        )
        .bind(agent.id.as_str())
        .bind(&agent.hostname)
        .bind(&agent.platform)
        .bind(&agent.secret_hash)
        .bind(&agent.version)
        .bind(&agent.tags)
        .bind(&agent.group)
        .bind(match agent.status {
            super::model::AgentStatus::Online => "online",
            super::model::AgentStatus::Offline => "offline",
        })
        .bind(agent.last_seen_at)
        .bind(agent.created_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn list(&self) -> Result<Vec<Agent>> {
        let rows = sqlx::query_as::<_, AgentRow>(
            "SELECT id, hostname, platform, secret_hash, version, tags, \"group\", status, last_seen_at, created_at FROM agents",
        )
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.into_iter().map(Into::into).collect())
    }

    async fn list_in_group(&self, group: &str) -> Result<Vec<Agent>> {
        let rows = sqlx::query_as::<_, AgentRow>(
            "SELECT id, hostname, platform, secret_hash, version, tags, \"group\", status, last_seen_at, created_at \
             FROM agents WHERE \"group\" = $1",
        )
        .bind(group)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.into_iter().map(Into::into).collect())
    }

    async fn delete(&self, id: &AgentId) -> Result<bool> {
        let result = sqlx::query("DELETE FROM agents WHERE id = $1")
            .bind(id.as_str())
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }
}

#[derive(sqlx::FromRow)]
struct AgentRow {
    id: String,
    hostname: String,
    platform: String,
    secret_hash: String,
    version: String,
    tags: Vec<String>,
    group: Option<String>,
    status: String,
    last_seen_at: Option<chrono::DateTime<chrono::Utc>>,
    created_at: chrono::DateTime<chrono::Utc>,
}

impl From<AgentRow> for Agent {
    fn from(row: AgentRow) -> Self {
        Agent {
            id: row.id.parse().unwrap_or_else(|_| AgentId::new()),
            hostname: row.hostname,
            platform: row.platform,
            secret_hash: row.secret_hash,
            version: row.version,
            tags: row.tags,
            group: row.group,
            status: match row.status.as_str() {
                "online" => super::model::AgentStatus::Online,
                _ => super::model::AgentStatus::Offline,
            },
            last_seen_at: row.last_seen_at,
            created_at: row.created_at,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn upsert_then_find() {
        let store = InMemoryAgentStore::new();
        let agent = Agent::new("host-1", "linux/amd64", "hash".into());
        store.upsert(&agent).await.unwrap();
        let found = store.find_by_id(&agent.id).await.unwrap();
        assert_eq!(found.unwrap().hostname, "host-1");
    }

    #[tokio::test]
    async fn delete_removes_admin_only() {
        let store = InMemoryAgentStore::new();
        let agent = Agent::new("host-1", "linux/amd64", "hash".into());
        store.upsert(&agent).await.unwrap();
        assert!(store.delete(&agent.id).await.unwrap());
        assert!(store.find_by_id(&agent.id).await.unwrap().is_none());
    }
}
