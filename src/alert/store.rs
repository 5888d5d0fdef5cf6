//! Alert store (spec §4.7).

use async_trait::async_trait;
use std::collections::HashMap;
use tokio::sync::RwLock;

use super::model::Alert;
use crate::error::Result;

#[async_trait]
pub trait AlertStore: Send + Sync {
    async fn find_firing(&self, rule_id: &str, target_id: &str) -> Result<Option<Alert>>;
    async fn upsert(&self, alert: &Alert) -> Result<()>;
    async fn list_firing(&self) -> Result<Vec<Alert>>;
    async fn find_by_id(&self, id: &str) -> Result<Option<Alert>>;
}

#[derive(Default)]
pub struct InMemoryAlertStore {
    alerts: RwLock<HashMap<String, Alert>>,
}

impl InMemoryAlertStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn key(rule_id: &str, target_id: &str) -> String {
        format!("{rule_id}:{target_id}")
    }
}

#[async_trait]
impl AlertStore for InMemoryAlertStore {
    async fn find_firing(&self, rule_id: &str, target_id: &str) -> Result<Option<Alert>> {
        Ok(self.alerts.read().await.get(&Self::key(rule_id, target_id)).cloned())
    }

    async fn upsert(&self, alert: &Alert) -> Result<()> {
        self.alerts
            .write()
            .await
            .insert(Self::key(&alert.rule_id, &alert.target_id), alert.clone());
        Ok(())
    }

    async fn list_firing(&self) -> Result<Vec<Alert>> {
        use super::model::AlertState;
        Ok(self
            .alerts
            .read()
            .await
            .values()
            .filter(|a| a.state == AlertState::Firing)
            .cloned()
            .collect())
    }

    async fn find_by_id(&self, id: &str) -> Result<Option<Alert>> {
        Ok(self.alerts.read().await.values().find(|a| a.id.as_str() == id).cloned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::alert::model::Alert;

    #[tokio::test]
    async fn upsert_and_find_firing_round_trips() {
        let store = InMemoryAlertStore::new();
        let alert = Alert::fire("rule-1".to_string(), "agt_1".to_string(), "probe-down");
        store.upsert(&alert).await.unwrap();
        let found = store.find_firing("rule-1", "agt_1").await.unwrap();
        assert!(found.is_some());
    }
}
