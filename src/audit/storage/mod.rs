//! Audit event storage trait and backend implementations
//!
//! The `AuditStorage` trait defines the interface for persisting sealed audit
//! events. The PostgreSQL backend enforces append-only semantics at the
//! database level (via `CREATE RULE`), not just in the application.

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use super::event::AuditEvent;
use crate::error::Error;

pub mod memory;
pub mod pg;

#[async_trait]
pub trait AuditStorage: Send + Sync {
    /// Persist a batch of already-sealed events in one round-trip. Falls
    /// back to per-row inserts on partial failure so one bad row doesn't
    /// drop the rest of the batch.
    async fn append_batch(&self, events: &[AuditEvent]) -> Result<(), Error>;

    /// Most recently persisted event, used to resume the hash chain.
    async fn latest(&self) -> Result<Option<AuditEvent>, Error>;

    async fn query_range(
        &self,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
        limit: usize,
    ) -> Result<Vec<AuditEvent>, Error>;

    /// Verify chain integrity from a given sequence number onward. Returns
    /// `Some(sequence)` of the first broken link, or `None` if intact.
    async fn verify_chain(&self, from_sequence: u64) -> Result<Option<u64>, Error>;
}
