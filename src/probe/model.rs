//! Service Probe Scheduler data model (spec §3, §4.5).

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::ids::{AgentId, MonitorId};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProbeType {
    Tcp,
    Http,
    Icmp,
    Dns,
    Tls,
}

impl ProbeType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProbeType::Tcp => "tcp",
            ProbeType::Http => "http",
            ProbeType::Icmp => "icmp",
            ProbeType::Dns => "dns",
            ProbeType::Tls => "tls",
        }
    }
}

impl std::str::FromStr for ProbeType {
    type Err = crate::error::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "tcp" => Ok(ProbeType::Tcp),
            "http" => Ok(ProbeType::Http),
            "icmp" => Ok(ProbeType::Icmp),
            "dns" => Ok(ProbeType::Dns),
            "tls" => Ok(ProbeType::Tls),
            other => Err(crate::error::Error::Invalid(format!("unknown probe type: {other}"))),
        }
    }
}

/// Which agents (or the control plane itself) a monitor's probes run from.
///
/// `Server` runs the probe locally in the control plane rather than
/// dispatching it to any agent — spec's resolution for monitors that watch
/// infrastructure no agent fronts (e.g. a managed database endpoint).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "strategy", rename_all = "snake_case")]
pub enum TargetSelection {
    Server,
    Include { agent_ids: Vec<AgentId> },
    Exclude { agent_ids: Vec<AgentId> },
    Group { group: String },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceMonitor {
    pub id: MonitorId,
    pub name: String,
    pub probe_type: ProbeType,
    pub target: String,
    pub interval_secs: u32,
    pub timeout_ms: u32,
    pub selection: TargetSelection,
    pub enabled: bool,
    pub notify_on_failure: bool,
    pub created_at: DateTime<Utc>,
}

impl ServiceMonitor {
    pub fn new(
        name: impl Into<String>,
        probe_type: ProbeType,
        target: impl Into<String>,
        selection: TargetSelection,
    ) -> Self {
        Self {
            id: MonitorId::new(),
            name: name.into(),
            probe_type,
            target: target.into(),
            interval_secs: 30,
            timeout_ms: 5_000,
            selection,
            enabled: true,
            notify_on_failure: true,
            created_at: Utc::now(),
        }
    }
}

/// A single probe outcome, either executed locally (`Server` selection) or
/// reported by an agent via `Upstream::ProbeResult`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProbeResult {
    pub monitor_id: MonitorId,
    /// `None` when the control plane executed the probe itself.
    pub agent_id: Option<AgentId>,
    pub up: bool,
    pub latency_ms: u32,
    pub error: Option<String>,
    pub observed_at: DateTime<Utc>,
}

/// One UTC day's worth of up/down/latency tallies in a monitor's rolling
/// 30-day availability window (spec §4.5).
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct DayBucket {
    pub date: NaiveDate,
    pub up: u32,
    pub down: u32,
    pub latency_sum_ms: u64,
    pub latency_count: u32,
}

impl DayBucket {
    fn new(date: NaiveDate) -> Self {
        Self {
            date,
            up: 0,
            down: 0,
            latency_sum_ms: 0,
            latency_count: 0,
        }
    }

    fn record(&mut self, up: bool, latency_ms: u32) {
        if up {
            self.up += 1;
        } else {
            self.down += 1;
        }
        self.latency_sum_ms += u64::from(latency_ms);
        self.latency_count += 1;
    }

    pub fn checks(&self) -> u32 {
        self.up + self.down
    }

    /// Rebuild a bucket from already-aggregated persisted columns.
    pub fn from_persisted(date: NaiveDate, up: u32, down: u32, latency_sum_ms: u64, latency_count: u32) -> Self {
        Self {
            date,
            up,
            down,
            latency_sum_ms,
            latency_count,
        }
    }

    pub fn average_latency_ms(&self) -> Option<f64> {
        if self.latency_count == 0 {
            None
        } else {
            Some(self.latency_sum_ms as f64 / f64::from(self.latency_count))
        }
    }

    pub fn status(&self) -> DayStatus {
        day_status(self.up, self.down)
    }
}

/// Status derivation per spec §4.5: `good` > 95%, `low` > 80%, `down`
/// otherwise, `no-data` if no checks landed that day.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum DayStatus {
    Good,
    Low,
    Down,
    NoData,
}

fn day_status(up: u32, down: u32) -> DayStatus {
    let total = up + down;
    if total == 0 {
        return DayStatus::NoData;
    }
    let uptime = f64::from(up) / f64::from(total);
    if uptime > 0.95 {
        DayStatus::Good
    } else if uptime > 0.80 {
        DayStatus::Low
    } else {
        DayStatus::Down
    }
}

/// Ring of day buckets, oldest evicted once the window exceeds 30 entries.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AvailabilityWindow {
    days: std::collections::VecDeque<DayBucket>,
}

const WINDOW_DAYS: usize = 30;

/// Exposed as three arrays of length 30, index 0 = today, index 29 = 29
/// days ago (spec §4.5).
pub struct WindowSnapshot {
    pub up: Vec<u32>,
    pub down: Vec<u32>,
    pub average_latency_ms: Vec<Option<f64>>,
    pub status: Vec<DayStatus>,
}

impl AvailabilityWindow {
    pub fn record(&mut self, up: bool, latency_ms: u32, at: DateTime<Utc>) {
        let today = at.date_naive();
        match self.days.back_mut() {
            Some(bucket) if bucket.date == today => bucket.record(up, latency_ms),
            _ => {
                let mut bucket = DayBucket::new(today);
                bucket.record(up, latency_ms);
                self.days.push_back(bucket);
                while self.days.len() > WINDOW_DAYS {
                    self.days.pop_front();
                }
            }
        }
    }

    /// Fraction of checks that were `up` across the whole window, `1.0` if
    /// nothing has been recorded yet.
    pub fn availability(&self) -> f64 {
        let (up, down) = self
            .days
            .iter()
            .fold((0u32, 0u32), |(u, d), b| (u + b.up, d + b.down));
        if up + down == 0 {
            1.0
        } else {
            f64::from(up) / f64::from(up + down)
        }
    }

    pub fn day_count(&self) -> usize {
        self.days.len()
    }

    /// Buckets in persistence order (oldest first) for a store's `save_window`.
    pub fn days_for_persistence(&self) -> Vec<DayBucket> {
        self.days.iter().copied().collect()
    }

    pub fn restore(days: Vec<DayBucket>) -> Self {
        let mut window = Self::default();
        for bucket in days {
            window.days.push_back(bucket);
        }
        while window.days.len() > WINDOW_DAYS {
            window.days.pop_front();
        }
        window
    }

    /// Length-30 arrays aligned so index 0 is `today`, per spec §4.5.
    pub fn snapshot(&self, today: NaiveDate) -> WindowSnapshot {
        let mut by_date: std::collections::HashMap<NaiveDate, DayBucket> =
            std::collections::HashMap::new();
        for bucket in &self.days {
            by_date.insert(bucket.date, *bucket);
        }

        let mut up = Vec::with_capacity(WINDOW_DAYS);
        let mut down = Vec::with_capacity(WINDOW_DAYS);
        let mut average_latency_ms = Vec::with_capacity(WINDOW_DAYS);
        let mut status = Vec::with_capacity(WINDOW_DAYS);

        for offset in 0..WINDOW_DAYS as i64 {
            let date = today - chrono::Duration::days(offset);
            match by_date.get(&date) {
                Some(bucket) => {
                    up.push(bucket.up);
                    down.push(bucket.down);
                    average_latency_ms.push(bucket.average_latency_ms());
                    status.push(bucket.status());
                }
                None => {
                    up.push(0);
                    down.push(0);
                    average_latency_ms.push(None);
                    status.push(DayStatus::NoData);
                }
            }
        }

        WindowSnapshot {
            up,
            down,
            average_latency_ms,
            status,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn window_evicts_oldest_past_thirty_days() {
        let mut window = AvailabilityWindow::default();
        let base = Utc::now();
        for day in 0..40 {
            window.record(true, 10, base + chrono::Duration::days(day));
        }
        assert_eq!(window.day_count(), WINDOW_DAYS);
    }

    #[test]
    fn availability_is_fraction_of_up_checks() {
        let mut window = AvailabilityWindow::default();
        let now = Utc::now();
        window.record(true, 10, now);
        window.record(true, 12, now);
        window.record(false, 999, now);
        assert!((window.availability() - (2.0 / 3.0)).abs() < 1e-9);
    }

    #[test]
    fn status_thresholds_match_spec() {
        assert_eq!(day_status(96, 4), DayStatus::Good);
        assert_eq!(day_status(90, 10), DayStatus::Low);
        assert_eq!(day_status(10, 90), DayStatus::Down);
        assert_eq!(day_status(0, 0), DayStatus::NoData);
    }

    #[test]
    fn snapshot_aligns_index_zero_to_today() {
        let mut window = AvailabilityWindow::default();
        let today = Utc::now();
        window.record(true, 20, today);
        window.record(false, 0, today - chrono::Duration::days(1));
        let snapshot = window.snapshot(today.date_naive());
        assert_eq!(snapshot.up[0], 1);
        assert_eq!(snapshot.down[0], 0);
        assert_eq!(snapshot.down[1], 1);
        assert_eq!(snapshot.status[2], DayStatus::NoData);
    }

    #[test]
    fn days_for_persistence_round_trips_through_restore() {
        let mut window = AvailabilityWindow::default();
        window.record(true, 5, Utc::now());
        let days = window.days_for_persistence();
        let restored = AvailabilityWindow::restore(days);
        assert_eq!(restored.day_count(), 1);
    }
}
