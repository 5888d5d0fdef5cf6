//! Durable `ServiceMonitor` + availability-window store (spec §4.5).

use async_trait::async_trait;
use std::collections::HashMap;
use std::str::FromStr;
use tokio::sync::RwLock;

use super::model::{AvailabilityWindow, ServiceMonitor, TargetSelection};
use crate::error::Result;
use crate::ids::MonitorId;

#[async_trait]
pub trait MonitorStore: Send + Sync {
    async fn find_by_id(&self, id: &MonitorId) -> Result<Option<ServiceMonitor>>;
    async fn list(&self) -> Result<Vec<ServiceMonitor>>;
    async fn upsert(&self, monitor: &ServiceMonitor) -> Result<()>;
    async fn delete(&self, id: &MonitorId) -> Result<bool>;

    async fn load_window(&self, id: &MonitorId) -> Result<AvailabilityWindow>;
    async fn save_window(&self, id: &MonitorId, window: &AvailabilityWindow) -> Result<()>;
}

#[derive(Default)]
pub struct InMemoryMonitorStore {
    monitors: RwLock<HashMap<MonitorId, ServiceMonitor>>,
    windows: RwLock<HashMap<MonitorId, AvailabilityWindow>>,
}

impl InMemoryMonitorStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl MonitorStore for InMemoryMonitorStore {
    async fn find_by_id(&self, id: &MonitorId) -> Result<Option<ServiceMonitor>> {
        Ok(self.monitors.read().await.get(id).cloned())
    }

    async fn list(&self) -> Result<Vec<ServiceMonitor>> {
        Ok(self.monitors.read().await.values().cloned().collect())
    }

    async fn upsert(&self, monitor: &ServiceMonitor) -> Result<()> {
        self.monitors.write().await.insert(monitor.id.clone(), monitor.clone());
        Ok(())
    }

    async fn delete(&self, id: &MonitorId) -> Result<bool> {
        self.windows.write().await.remove(id);
        Ok(self.monitors.write().await.remove(id).is_some())
    }

    async fn load_window(&self, id: &MonitorId) -> Result<AvailabilityWindow> {
        Ok(self.windows.read().await.get(id).cloned().unwrap_or_default())
    }

    async fn save_window(&self, id: &MonitorId, window: &AvailabilityWindow) -> Result<()> {
        self.windows.write().await.insert(id.clone(), window.clone());
        Ok(())
    }
}

pub struct PgMonitorStore {
    pool: sqlx::PgPool,
}

impl PgMonitorStore {
    pub fn new(pool: sqlx::PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl MonitorStore for PgMonitorStore {
    async fn find_by_id(&self, id: &MonitorId) -> Result<Option<ServiceMonitor>> {
        let row = sqlx::query_as::<_, MonitorRow>("SELECT id, name, probe_type, target, interval_secs, timeout_ms, selection, enabled, notify_on_failure, created_at FROM service_monitors WHERE id = $1")
            .bind(id.as_str())
            .fetch_optional(&self.pool)
            .await?;
        row.map(TryInto::try_into).transpose()
    }

    async fn list(&self) -> Result<Vec<ServiceMonitor>> {
        let rows = sqlx::query_as::<_, MonitorRow>("SELECT id, name, probe_type, target, interval_secs, timeout_ms, selection, enabled, notify_on_failure, created_at FROM service_monitors")
            .fetch_all(&self.pool)
            .await?;
        rows.into_iter().map(TryInto::try_into).collect()
    }

    async fn upsert(&self, monitor: &ServiceMonitor) -> Result<()> {
        let probe_type = monitor.probe_type.as_str();
        let selection = serde_json::to_value(&monitor.selection).map_err(|e| crate::error::Error::Internal(e.to_string()))?;

        sqlx::query(
            "INSERT INTO service_monitors (id, name, probe_type, target, interval_secs, timeout_ms, selection, enabled, notify_on_failure, created_at) \
             VALUES ($1,$2,$3,$4,$5,$6,$7,$8,$9,$10) \
             ON CONFLICT (id) DO UPDATE SET name=$2, probe_type=$3, target=$4, interval_secs=$5, timeout_ms=$6, selection=$7, enabled=$8, notify_on_failure=$9",
        )
        .bind(monitor.id.as_str())
        .bind(&monitor.name)
        .bind(probe_type)
        .bind(&monitor.target)
        .bind(monitor.interval_secs as i32)
        .bind(monitor.timeout_ms as i32)
        .bind(selection)
        .bind(monitor.enabled)
        .bind(monitor.notify_on_failure)
        .bind(monitor.created_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn delete(&self, id: &MonitorId) -> Result<bool> {
        sqlx::query("DELETE FROM probe_availability_days WHERE monitor_id = $1")
            .bind(id.as_str())
            .execute(&self.pool)
            .await?;
        let result = sqlx::query("DELETE FROM service_monitors WHERE id = $1")
            .bind(id.as_str())
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn load_window(&self, id: &MonitorId) -> Result<AvailabilityWindow> {
        let rows = sqlx::query_as::<_, DayRow>(
            "SELECT day, up, down, latency_sum_ms, latency_count FROM probe_availability_days WHERE monitor_id = $1 ORDER BY day ASC",
        )
        .bind(id.as_str())
        .fetch_all(&self.pool)
        .await?;

        let days = rows
            .into_iter()
            .map(|row| super::model::DayBucket::from_persisted(row.day, row.up as u32, row.down as u32, row.latency_sum_ms as u64, row.latency_count as u32))
            .collect();
        Ok(AvailabilityWindow::restore(days))
    }

    async fn save_window(&self, id: &MonitorId, window: &AvailabilityWindow) -> Result<()> {
        sqlx::query("DELETE FROM probe_availability_days WHERE monitor_id = $1")
            .bind(id.as_str())
            .execute(&self.pool)
            .await?;

        for bucket in window.days_for_persistence() {
            sqlx::query(
                "INSERT INTO probe_availability_days (monitor_id, day, up, down, latency_sum_ms, latency_count) VALUES ($1,$2,$3,$4,$5,$6)",
            )
            .bind(id.as_str())
            .bind(bucket.date)
            .bind(bucket.up as i32)
            .bind(bucket.down as i32)
            .bind(bucket.latency_sum_ms as i64)
            .bind(bucket.latency_count as i32)
            .execute(&self.pool)
            .await?;
        }
        Ok(())
    }
}

#[derive(sqlx::FromRow)]
struct MonitorRow {
    id: String,
    name: String,
    probe_type: String,
    target: String,
    interval_secs: i32,
    timeout_ms: i32,
    selection: serde_json::Value,
    enabled: bool,
    notify_on_failure: bool,
    created_at: chrono::DateTime<chrono::Utc>,
}

impl TryFrom<MonitorRow> for ServiceMonitor {
    type Error = crate::error::Error;

    fn try_from(row: MonitorRow) -> std::result::Result<Self, Self::Error> {
        let probe_type = row.probe_type.parse()?;
        let selection: TargetSelection =
            serde_json::from_value(row.selection).map_err(|e| crate::error::Error::Internal(e.to_string()))?;
        Ok(ServiceMonitor {
            id: MonitorId::from_str(&row.id).map_err(|e| crate::error::Error::Internal(e.to_string()))?,
            name: row.name,
            probe_type,
            target: row.target,
            interval_secs: row.interval_secs as u32,
            timeout_ms: row.timeout_ms as u32,
            selection,
            enabled: row.enabled,
            notify_on_failure: row.notify_on_failure,
            created_at: row.created_at,
        })
    }
}

#[derive(sqlx::FromRow)]
struct DayRow {
    day: chrono::NaiveDate,
    up: i32,
    down: i32,
    latency_sum_ms: i64,
    latency_count: i32,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::probe::model::ProbeType;

    #[tokio::test]
    async fn upsert_then_list() {
        let store = InMemoryMonitorStore::new();
        let monitor = ServiceMonitor::new("api", ProbeType::Http, "https://example.com", TargetSelection::Server);
        store.upsert(&monitor).await.unwrap();
        assert_eq!(store.list().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn window_persists_between_load_and_save() {
        let store = InMemoryMonitorStore::new();
        let monitor = ServiceMonitor::new("api", ProbeType::Tcp, "db:5432", TargetSelection::Server);
        let mut window = store.load_window(&monitor.id).await.unwrap();
        window.record(true, 15, chrono::Utc::now());
        store.save_window(&monitor.id, &window).await.unwrap();
        let reloaded = store.load_window(&monitor.id).await.unwrap();
        assert_eq!(reloaded.day_count(), 1);
    }
}
