//! Time-series archive for `HostState` samples (spec §4.3 "Archival").
//!
//! A background ticker (default 60s, [`crate::config::AgentConfig::archive_interval`])
//! copies the current state of every *online* agent into this store. An
//! agent that's offline at tick time contributes a `None` sample — a gap,
//! not an interpolated value (spec §4.3: "Gaps... are recorded as nulls,
//! not interpolated").

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::Mutex;

use crate::agent::model::HostState;
use crate::error::Result;
use crate::ids::AgentId;

#[async_trait]
pub trait StateArchive: Send + Sync {
    /// Record one archival sample for `agent_id` at `at`. `state` is `None`
    /// for an agent that was offline at tick time.
    async fn record_sample(&self, agent_id: &AgentId, state: Option<&HostState>, at: DateTime<Utc>) -> Result<()>;
}

#[derive(Debug, Clone)]
pub struct ArchivedSample {
    pub agent_id: AgentId,
    pub state: Option<HostState>,
    pub at: DateTime<Utc>,
}

#[derive(Default)]
pub struct InMemoryStateArchive {
    samples: Mutex<Vec<ArchivedSample>>,
}

impl InMemoryStateArchive {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn samples_for(&self, agent_id: &AgentId) -> Vec<ArchivedSample> {
        self.samples
            .lock()
            .await
            .iter()
            .filter(|s| &s.agent_id == agent_id)
            .cloned()
            .collect()
    }
}

#[async_trait]
impl StateArchive for InMemoryStateArchive {
    async fn record_sample(&self, agent_id: &AgentId, state: Option<&HostState>, at: DateTime<Utc>) -> Result<()> {
        self.samples.lock().await.push(ArchivedSample {
            agent_id: agent_id.clone(),
            state: state.cloned(),
            at,
        });
        Ok(())
    }
}

pub struct PgStateArchive {
    pool: sqlx::PgPool,
}

impl PgStateArchive {
    pub fn new(pool: sqlx::PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl StateArchive for PgStateArchive {
    async fn record_sample(&self, agent_id: &AgentId, state: Option<&HostState>, at: DateTime<Utc>) -> Result<()> {
        let state_json = state.map(|s| serde_json::to_value(s)).transpose().map_err(|e| crate::error::Error::Internal(e.to_string()))?;

        sqlx::query("INSERT INTO host_state_samples (agent_id, sampled_at, state) VALUES ($1, $2, $3)")
            .bind(agent_id.as_str())
            .bind(at)
            .bind(state_json)
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn gap_samples_are_stored_as_none() {
        let archive = InMemoryStateArchive::new();
        let agent_id = AgentId::new();
        archive.record_sample(&agent_id, None, Utc::now()).await.unwrap();
        let samples = archive.samples_for(&agent_id).await;
        assert_eq!(samples.len(), 1);
        assert!(samples[0].state.is_none());
    }
}
