//! Alert Engine (spec §4.7): dedups typed events into firing/resolved
//! alerts and fans firings out over NATS.

use std::sync::Arc;

use async_nats::Client;

use super::model::{Alert, AlertEvent};
use super::store::AlertStore;
use crate::audit::{AuditLogger, Principal, Resource};
use crate::error::Result;
use crate::events;

pub struct AlertEngine {
    store: Arc<dyn AlertStore>,
    audit: AuditLogger,
    nats: Option<Client>,
}

impl AlertEngine {
    pub fn new(store: Arc<dyn AlertStore>, audit: AuditLogger, nats: Option<Client>) -> Arc<Self> {
        Arc::new(Self { store, audit, nats })
    }

    /// Apply a typed event, raising or resolving an alert per the
    /// rule+target dedup key. Never surfaces an error to the caller — a
    /// failed publish or persist is logged and dropped, matching the rest
    /// of the event-handling path (spec §4.2 point 5: event consumers must
    /// not block the stream mux on downstream failures).
    pub async fn handle(&self, event: AlertEvent) {
        if let Err(error) = self.try_handle(event).await {
            tracing::warn!(%error, "alert engine failed to process event");
        }
    }

    async fn try_handle(&self, event: AlertEvent) -> Result<()> {
        let (rule_id, target_id) = event.dedup_key();
        let existing = self.store.find_firing(&rule_id, &target_id).await?;

        if event.is_resolution() {
            if let Some(mut alert) = existing {
                alert.resolve();
                self.store.upsert(&alert).await?;
                self.publish(&alert).await;
                self.audit
                    .log_change(
                        Principal::system(),
                        "alert.resolve",
                        Resource::new("alert", alert.id.as_str()),
                        "alert",
                        None,
                        Some(serde_json::json!({"rule_id": rule_id, "target_id": target_id})),
                    )
                    .await;
            }
            return Ok(());
        }

        if existing.is_some() {
            // Already firing: duplicate raises are suppressed until resolved.
            return Ok(());
        }

        let alert = Alert::fire(rule_id.clone(), target_id.clone(), event.kind());
        self.store.upsert(&alert).await?;
        self.publish(&alert).await;
        self.audit
            .log_change(
                Principal::system(),
                "alert.fire",
                Resource::new("alert", alert.id.as_str()),
                "alert",
                None,
                Some(serde_json::json!({"rule_id": rule_id, "target_id": target_id, "kind": alert.kind})),
            )
            .await;

        Ok(())
    }

    async fn publish(&self, alert: &Alert) {
        let Some(client) = &self.nats else { return };
        let subject = format!("alerts.{}", alert.rule_id);
        if let Err(error) = events::publish_json(client, &subject, alert).await {
            tracing::warn!(%error, %subject, "failed to publish alert");
        }
    }

    /// Metadata-only acknowledgement; never changes firing/resolved state
    /// (spec §4.7).
    pub async fn acknowledge(&self, id: &str, by: impl Into<String>, note: Option<String>) -> Result<bool> {
        let Some(mut alert) = self.store.find_by_id(id).await? else {
            return Ok(false);
        };
        alert.acknowledge(by, note);
        self.store.upsert(&alert).await?;
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::alert::store::InMemoryAlertStore;
    use crate::audit::storage::memory::MemoryAuditStorage;
    use crate::audit::AuditPipeline;
    use crate::ids::MonitorId;

    async fn engine() -> Arc<AlertEngine> {
        let storage = Arc::new(MemoryAuditStorage::new());
        let (_pipeline, handle) = AuditPipeline::start(Default::default(), storage).await.unwrap();
        let audit = AuditLogger::new(handle, Default::default());
        AlertEngine::new(Arc::new(InMemoryAlertStore::new()), audit, None)
    }

    #[tokio::test]
    async fn duplicate_probe_down_is_suppressed() {
        let engine = engine().await;
        let monitor_id = MonitorId::new();
        engine.handle(AlertEvent::ProbeDown { monitor_id: monitor_id.clone(), target: None }).await;
        engine.handle(AlertEvent::ProbeDown { monitor_id: monitor_id.clone(), target: None }).await;

        let firing = engine.store.list_firing().await.unwrap();
        assert_eq!(firing.len(), 1);
    }

    #[tokio::test]
    async fn probe_up_resolves_firing_alert() {
        let engine = engine().await;
        let monitor_id = MonitorId::new();
        engine.handle(AlertEvent::ProbeDown { monitor_id: monitor_id.clone(), target: None }).await;
        engine.handle(AlertEvent::ProbeUp { monitor_id: monitor_id.clone(), target: None }).await;

        assert!(engine.store.list_firing().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn acknowledge_does_not_change_firing_state() {
        let engine = engine().await;
        let monitor_id = MonitorId::new();
        engine.handle(AlertEvent::ProbeDown { monitor_id: monitor_id.clone(), target: None }).await;
        let firing = engine.store.list_firing().await.unwrap();
        let alert = &firing[0];

        let acked = engine.acknowledge(alert.id.as_str(), "oncall", Some("investigating".into())).await.unwrap();
        assert!(acked);

        let still_firing = engine.store.list_firing().await.unwrap();
        assert_eq!(still_firing.len(), 1);
        assert_eq!(still_firing[0].acknowledged_by.as_deref(), Some("oncall"));
    }
}
