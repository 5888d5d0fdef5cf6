//! Service Probe Scheduler (spec §4.5): per-monitor tickers that select
//! targets, dispatch probes, and roll results into a 30-day availability
//! window, fanning failures out to the Alert Engine.

pub mod executor;
pub mod model;
pub mod scheduler;
pub mod store;

pub use model::{AvailabilityWindow, DayBucket, DayStatus, ProbeResult, ProbeType, ServiceMonitor, TargetSelection};
pub use scheduler::ProbeScheduler;
pub use store::{InMemoryMonitorStore, MonitorStore, PgMonitorStore};
