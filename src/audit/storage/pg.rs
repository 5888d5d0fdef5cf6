//! PostgreSQL audit storage backend
//!
//! Enforces immutability with `CREATE RULE ... DO INSTEAD NOTHING` so that an
//! UPDATE or DELETE against `audit_events` silently does nothing rather than
//! mutating history.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;

use super::AuditStorage;
use crate::audit::event::{AuditEvent, ObjectDiff, Principal, PrincipalKind, Resource};
use crate::error::Error;
use crate::ids::EventId;

pub struct PgAuditStorage {
    pool: PgPool,
}

impl PgAuditStorage {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Create the audit_events table and immutability rules. Called once at
    /// startup.
    pub async fn initialize(&self) -> Result<(), Error> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS audit_events (
                id TEXT PRIMARY KEY,
                timestamp TIMESTAMPTZ NOT NULL,
                actor_id TEXT NOT NULL,
                actor_kind TEXT NOT NULL,
                action TEXT NOT NULL,
                resource_type TEXT NOT NULL,
                resource_identifier TEXT NOT NULL,
                resource_metadata JSONB,
                subsystem TEXT NOT NULL,
                object_diff JSONB,
                client_ip TEXT,
                request_id TEXT,
                data JSONB,
                sequence BIGINT NOT NULL UNIQUE,
                hash TEXT,
                previous_hash TEXT
            )
            "#,
        )
        .execute(&self.pool)
        .await
        .map_err(|e| Error::Internal(format!("failed to create audit_events table: {e}")))?;

        sqlx::query("CREATE INDEX IF NOT EXISTS idx_audit_events_sequence ON audit_events (sequence)")
            .execute(&self.pool)
            .await
            .map_err(|e| Error::Internal(format!("failed to create audit sequence index: {e}")))?;

        sqlx::query("CREATE INDEX IF NOT EXISTS idx_audit_events_timestamp ON audit_events (timestamp)")
            .execute(&self.pool)
            .await
            .map_err(|e| Error::Internal(format!("failed to create audit timestamp index: {e}")))?;

        sqlx::query(
            r#"
            DO $$
            BEGIN
                IF NOT EXISTS (
                    SELECT 1 FROM pg_rules WHERE rulename = 'audit_no_update' AND tablename = 'audit_events'
                ) THEN
                    CREATE RULE audit_no_update AS ON UPDATE TO audit_events DO INSTEAD NOTHING;
                END IF;
                IF NOT EXISTS (
                    SELECT 1 FROM pg_rules WHERE rulename = 'audit_no_delete' AND tablename = 'audit_events'
                ) THEN
                    CREATE RULE audit_no_delete AS ON DELETE TO audit_events DO INSTEAD NOTHING;
                END IF;
            END
            $$;
            "#,
        )
        .execute(&self.pool)
        .await
        .map_err(|e| Error::Internal(format!("failed to create audit immutability rules: {e}")))?;

        Ok(())
    }

    async fn insert_one(&self, event: &AuditEvent) -> Result<(), Error> {
        sqlx::query(
            r#"
            INSERT INTO audit_events (
                id, timestamp, actor_id, actor_kind, action,
                resource_type, resource_identifier, resource_metadata, subsystem,
                object_diff, client_ip, request_id, data, sequence, hash, previous_hash
            ) VALUES ($1,$2,$3,$4,$5,$6,$7,$8,$9,$10,$11,$12,$13,$14,$15,$16)
            ON CONFLICT (id) DO NOTHING
            "#,
        )
        .bind(event.id.as_str())
        .bind(event.timestamp)
        .bind(&event.actor.id)
        .bind(principal_kind_str(event.actor.kind))
        .bind(&event.action)
        .bind(&event.resource.resource_type)
        .bind(&event.resource.identifier)
        .bind(serde_json::to_value(&event.resource.metadata).ok())
        .bind(&event.subsystem)
        .bind(serde_json::to_value(&event.object_diff).ok())
        .bind(&event.client_ip)
        .bind(&event.request_id)
        .bind(serde_json::to_value(&event.data).ok())
        .bind(event.sequence as i64)
        .bind(&event.hash)
        .bind(&event.previous_hash)
        .execute(&self.pool)
        .await
        .map_err(|e| Error::Internal(format!("failed to append audit event: {e}")))?;

        Ok(())
    }
}

#[async_trait]
impl AuditStorage for PgAuditStorage {
    async fn append_batch(&self, events: &[AuditEvent]) -> Result<(), Error> {
        if events.is_empty() {
            return Ok(());
        }

        let mut tx = match self.pool.begin().await {
            Ok(tx) => tx,
            Err(e) => return Err(Error::Internal(format!("failed to begin audit batch transaction: {e}"))),
        };

        for event in events {
            let result = sqlx::query(
                r#"
                INSERT INTO audit_events (
                    id, timestamp, actor_id, actor_kind, action,
                    resource_type, resource_identifier, resource_metadata, subsystem,
                    object_diff, client_ip, request_id, data, sequence, hash, previous_hash
                ) VALUES ($1,$2,$3,$4,$5,$6,$7,$8,$9,$10,$11,$12,$13,$14,$15,$16)
                ON CONFLICT (id) DO NOTHING
                "#,
            )
            .bind(event.id.as_str())
            .bind(event.timestamp)
            .bind(&event.actor.id)
            .bind(principal_kind_str(event.actor.kind))
            .bind(&event.action)
            .bind(&event.resource.resource_type)
            .bind(&event.resource.identifier)
            .bind(serde_json::to_value(&event.resource.metadata).ok())
            .bind(&event.subsystem)
            .bind(serde_json::to_value(&event.object_diff).ok())
            .bind(&event.client_ip)
            .bind(&event.request_id)
            .bind(serde_json::to_value(&event.data).ok())
            .bind(event.sequence as i64)
            .bind(&event.hash)
            .bind(&event.previous_hash)
            .execute(&mut *tx)
            .await;

            if result.is_err() {
                // Batch insert hit a bad row; abort the transaction and fall
                // back to inserting each event individually so one poison
                // pill doesn't drop the whole batch.
                drop(tx);
                for event in events {
                    let _ = self.insert_one(event).await;
                }
                return Ok(());
            }
        }

        tx.commit()
            .await
            .map_err(|e| Error::Internal(format!("failed to commit audit batch: {e}")))?;

        Ok(())
    }

    async fn latest(&self) -> Result<Option<AuditEvent>, Error> {
        let row = sqlx::query_as::<_, AuditEventRow>(
            "SELECT * FROM audit_events ORDER BY sequence DESC LIMIT 1",
        )
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| Error::Internal(format!("failed to fetch latest audit event: {e}")))?;

        Ok(row.map(Into::into))
    }

    async fn query_range(
        &self,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
        limit: usize,
    ) -> Result<Vec<AuditEvent>, Error> {
        let rows = sqlx::query_as::<_, AuditEventRow>(
            "SELECT * FROM audit_events WHERE timestamp >= $1 AND timestamp <= $2 ORDER BY sequence ASC LIMIT $3",
        )
        .bind(from)
        .bind(to)
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| Error::Internal(format!("failed to query audit events: {e}")))?;

        Ok(rows.into_iter().map(Into::into).collect())
    }

    async fn verify_chain(&self, from_sequence: u64) -> Result<Option<u64>, Error> {
        let rows = sqlx::query_as::<_, AuditEventRow>(
            "SELECT * FROM audit_events WHERE sequence >= $1 ORDER BY sequence ASC",
        )
        .bind(from_sequence as i64)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| Error::Internal(format!("failed to fetch audit events for verification: {e}")))?;

        let events: Vec<AuditEvent> = rows.into_iter().map(Into::into).collect();
        match crate::audit::chain::verify_chain(&events) {
            Ok(()) => Ok(None),
            Err(e) => Ok(Some(e.sequence)),
        }
    }
}

fn principal_kind_str(kind: PrincipalKind) -> &'static str {
    match kind {
        PrincipalKind::User => "user",
        PrincipalKind::System => "system",
        PrincipalKind::Agent => "agent",
    }
}

#[derive(sqlx::FromRow)]
struct AuditEventRow {
    id: String,
    timestamp: DateTime<Utc>,
    actor_id: String,
    actor_kind: String,
    action: String,
    resource_type: String,
    resource_identifier: String,
    resource_metadata: Option<serde_json::Value>,
    subsystem: String,
    object_diff: Option<serde_json::Value>,
    client_ip: Option<String>,
    request_id: Option<String>,
    data: Option<serde_json::Value>,
    sequence: i64,
    hash: Option<String>,
    previous_hash: Option<String>,
}

impl From<AuditEventRow> for AuditEvent {
    fn from(row: AuditEventRow) -> Self {
        let kind = match row.actor_kind.as_str() {
            "system" => PrincipalKind::System,
            "agent" => PrincipalKind::Agent,
            _ => PrincipalKind::User,
        };

        AuditEvent {
            id: row.id.parse::<EventId>().unwrap_or_default(),
            timestamp: row.timestamp,
            actor: Principal { id: row.actor_id, kind },
            action: row.action,
            resource: Resource {
                resource_type: row.resource_type,
                identifier: row.resource_identifier,
                metadata: row
                    .resource_metadata
                    .and_then(|v| serde_json::from_value(v).ok())
                    .unwrap_or_default(),
            },
            subsystem: row.subsystem,
            object_diff: row.object_diff.and_then(|v| serde_json::from_value::<Option<ObjectDiff>>(v).ok()).flatten(),
            client_ip: row.client_ip,
            request_id: row.request_id,
            data: row.data.and_then(|v| serde_json::from_value(v).ok()).unwrap_or_default(),
            sequence: row.sequence as u64,
            hash: row.hash,
            previous_hash: row.previous_hash,
        }
    }
}
