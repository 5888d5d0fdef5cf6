//! In-memory audit storage, used by tests and by deployments that run the
//! audit pipeline without a configured database.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::Mutex;

use super::AuditStorage;
use crate::audit::event::AuditEvent;
use crate::error::Error;

#[derive(Default)]
pub struct MemoryAuditStorage {
    events: Mutex<Vec<AuditEvent>>,
}

impl MemoryAuditStorage {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl AuditStorage for MemoryAuditStorage {
    async fn append_batch(&self, events: &[AuditEvent]) -> Result<(), Error> {
        self.events.lock().await.extend_from_slice(events);
        Ok(())
    }

    async fn latest(&self) -> Result<Option<AuditEvent>, Error> {
        Ok(self.events.lock().await.last().cloned())
    }

    async fn query_range(
        &self,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
        limit: usize,
    ) -> Result<Vec<AuditEvent>, Error> {
        let events = self.events.lock().await;
        Ok(events
            .iter()
            .filter(|e| e.timestamp >= from && e.timestamp <= to)
            .take(limit)
            .cloned()
            .collect())
    }

    async fn verify_chain(&self, from_sequence: u64) -> Result<Option<u64>, Error> {
        let events = self.events.lock().await;
        let slice: Vec<AuditEvent> = events
            .iter()
            .filter(|e| e.sequence >= from_sequence)
            .cloned()
            .collect();
        match crate::audit::chain::verify_chain(&slice) {
            Ok(()) => Ok(None),
            Err(e) => Ok(Some(e.sequence)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audit::event::{Principal, Resource};

    #[tokio::test]
    async fn append_and_latest_round_trip() {
        let storage = MemoryAuditStorage::new();
        let event = AuditEvent::new(Principal::system(), "test", Resource::new("thing", "1"), "test");
        storage.append_batch(&[event.clone()]).await.unwrap();
        let latest = storage.latest().await.unwrap().unwrap();
        assert_eq!(latest.id, event.id);
    }
}
