//! Durable `TerminalSession` store (spec §3 "TerminalSession" lifecycle).

use async_trait::async_trait;
use std::collections::HashMap;
use std::str::FromStr;
use tokio::sync::RwLock;

use super::model::{TerminalDimensions, TerminalKind, TerminalSession, TerminalTarget};
use crate::error::Result;
use crate::ids::SessionUid;

#[async_trait]
pub trait TerminalStore: Send + Sync {
    async fn find_by_id(&self, id: &SessionUid) -> Result<Option<TerminalSession>>;
    async fn upsert(&self, session: &TerminalSession) -> Result<()>;
    async fn list_active(&self) -> Result<Vec<TerminalSession>>;
}

#[derive(Default)]
pub struct InMemoryTerminalStore {
    sessions: RwLock<HashMap<SessionUid, TerminalSession>>,
}

impl InMemoryTerminalStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl TerminalStore for InMemoryTerminalStore {
    async fn find_by_id(&self, id: &SessionUid) -> Result<Option<TerminalSession>> {
        Ok(self.sessions.read().await.get(id).cloned())
    }

    async fn upsert(&self, session: &TerminalSession) -> Result<()> {
        self.sessions.write().await.insert(session.session_uid.clone(), session.clone());
        Ok(())
    }

    async fn list_active(&self) -> Result<Vec<TerminalSession>> {
        Ok(self.sessions.read().await.values().filter(|s| s.is_active()).cloned().collect())
    }
}

pub struct PgTerminalStore {
    pool: sqlx::PgPool,
}

impl PgTerminalStore {
    pub fn new(pool: sqlx::PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl TerminalStore for PgTerminalStore {
    async fn find_by_id(&self, id: &SessionUid) -> Result<Option<TerminalSession>> {
        let row = sqlx::query_as::<_, TerminalSessionRow>(
            "SELECT session_uid, owner, target, kind, rows, cols, started_at, ended_at, recording_ref \
             FROM terminal_sessions WHERE session_uid = $1",
        )
        .bind(id.as_str())
        .fetch_optional(&self.pool)
        .await?;
        row.map(TryInto::try_into).transpose()
    }

    async fn upsert(&self, session: &TerminalSession) -> Result<()> {
        let target = serde_json::to_value(&session.target).map_err(|e| crate::error::Error::Internal(e.to_string()))?;
        let kind = match session.kind {
            TerminalKind::HostSsh => "host_ssh",
            TerminalKind::DockerExec => "docker_exec",
            TerminalKind::K8sPod => "k8s_pod",
            TerminalKind::K8sNode => "k8s_node",
        };

        sqlx::query(
            "INSERT INTO terminal_sessions (session_uid, owner, target, kind, rows, cols, started_at, ended_at, recording_ref) \
             VALUES ($1,$2,$3,$4,$5,$6,$7,$8,$9) \
             ON CONFLICT (session_uid) DO UPDATE SET ended_at = $8, recording_ref = $9",
        )
        .bind(session.session_uid.as_str())
        .bind(&session.owner)
        .bind(target)
        .bind(kind)
        .bind(session.dimensions.rows as i32)
        .bind(session.dimensions.cols as i32)
        .bind(session.started_at)
        .bind(session.ended_at)
        .bind(&session.recording_ref)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn list_active(&self) -> Result<Vec<TerminalSession>> {
        let rows = sqlx::query_as::<_, TerminalSessionRow>(
            "SELECT session_uid, owner, target, kind, rows, cols, started_at, ended_at, recording_ref \
             FROM terminal_sessions WHERE ended_at IS NULL",
        )
        .fetch_all(&self.pool)
        .await?;
        rows.into_iter().map(TryInto::try_into).collect()
    }
}

#[derive(sqlx::FromRow)]
struct TerminalSessionRow {
    session_uid: String,
    owner: String,
    target: serde_json::Value,
    kind: String,
    rows: i32,
    cols: i32,
    started_at: chrono::DateTime<chrono::Utc>,
    ended_at: Option<chrono::DateTime<chrono::Utc>>,
    recording_ref: Option<String>,
}

impl TryFrom<TerminalSessionRow> for TerminalSession {
    type Error = crate::error::Error;

    fn try_from(row: TerminalSessionRow) -> Result<Self> {
        let target: TerminalTarget = serde_json::from_value(row.target).map_err(|e| crate::error::Error::Internal(e.to_string()))?;
        let kind = match row.kind.as_str() {
            "host_ssh" => TerminalKind::HostSsh,
            "docker_exec" => TerminalKind::DockerExec,
            "k8s_pod" => TerminalKind::K8sPod,
            "k8s_node" => TerminalKind::K8sNode,
            other => return Err(crate::error::Error::Internal(format!("unknown terminal kind '{other}'"))),
        };
        Ok(TerminalSession {
            session_uid: SessionUid::from_str(&row.session_uid).map_err(|e| crate::error::Error::Internal(e.to_string()))?,
            owner: row.owner,
            target,
            kind,
            dimensions: TerminalDimensions { rows: row.rows as u32, cols: row.cols as u32 },
            started_at: row.started_at,
            ended_at: row.ended_at,
            recording_ref: row.recording_ref,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ids::AgentId;

    #[tokio::test]
    async fn upsert_then_find() {
        let store = InMemoryTerminalStore::new();
        let session = TerminalSession::new("user-1", TerminalTarget::Agent { agent_id: AgentId::new() }, TerminalKind::HostSsh, 24, 80);
        store.upsert(&session).await.unwrap();
        let found = store.find_by_id(&session.session_uid).await.unwrap();
        assert_eq!(found.unwrap().owner, "user-1");
    }

    #[tokio::test]
    async fn list_active_excludes_ended() {
        let store = InMemoryTerminalStore::new();
        let mut session = TerminalSession::new("user-1", TerminalTarget::Agent { agent_id: AgentId::new() }, TerminalKind::HostSsh, 24, 80);
        store.upsert(&session).await.unwrap();
        assert_eq!(store.list_active().await.unwrap().len(), 1);

        session.ended_at = Some(chrono::Utc::now());
        store.upsert(&session).await.unwrap();
        assert!(store.list_active().await.unwrap().is_empty());
    }
}
