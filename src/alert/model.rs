//! Alert Engine data model (spec §4.7).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::ids::{AgentId, EventId, MonitorId};

/// Typed events the engine consumes from the rest of the service. `target`
/// is the monitor's dispatch target (`None` for a locally-executed probe or
/// a host-level event scoped to the agent itself).
#[derive(Debug, Clone)]
pub enum AlertEvent {
    HostOffline { agent_id: AgentId },
    HostOnline { agent_id: AgentId },
    ProbeDown { monitor_id: MonitorId, target: Option<AgentId> },
    ProbeUp { monitor_id: MonitorId, target: Option<AgentId> },
    ThresholdCrossed { rule_id: String, target_id: String, value: f64, threshold: f64 },
}

impl AlertEvent {
    /// `(rule_id, target_id)` dedup key (spec §4.7: "dedup by rule+target;
    /// firing state suppresses duplicate firings until resolved").
    pub fn dedup_key(&self) -> (String, String) {
        match self {
            AlertEvent::HostOffline { agent_id } | AlertEvent::HostOnline { agent_id } => {
                ("host-offline".to_string(), agent_id.to_string())
            }
            AlertEvent::ProbeDown { monitor_id, target } | AlertEvent::ProbeUp { monitor_id, target } => {
                (monitor_id.to_string(), target.as_ref().map(ToString::to_string).unwrap_or_else(|| "server".to_string()))
            }
            AlertEvent::ThresholdCrossed { rule_id, target_id, .. } => (rule_id.clone(), target_id.clone()),
        }
    }

    /// Whether this event resolves a previously firing alert rather than
    /// raising a new one.
    pub fn is_resolution(&self) -> bool {
        matches!(self, AlertEvent::HostOnline { .. } | AlertEvent::ProbeUp { .. })
    }

    pub fn kind(&self) -> &'static str {
        match self {
            AlertEvent::HostOffline { .. } => "host-offline",
            AlertEvent::HostOnline { .. } => "host-online",
            AlertEvent::ProbeDown { .. } => "probe-down",
            AlertEvent::ProbeUp { .. } => "probe-up",
            AlertEvent::ThresholdCrossed { .. } => "threshold-crossed",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AlertState {
    Firing,
    Resolved,
}

/// A rule+target alert instance. Acknowledgement is metadata-only: it never
/// changes `state` (spec §4.7).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Alert {
    pub id: EventId,
    pub rule_id: String,
    pub target_id: String,
    pub kind: String,
    pub state: AlertState,
    pub fired_at: DateTime<Utc>,
    pub resolved_at: Option<DateTime<Utc>>,
    pub acknowledged_by: Option<String>,
    pub acknowledged_note: Option<String>,
}

impl Alert {
    pub fn fire(rule_id: String, target_id: String, kind: &str) -> Self {
        Self {
            id: EventId::new(),
            rule_id,
            target_id,
            kind: kind.to_string(),
            state: AlertState::Firing,
            fired_at: Utc::now(),
            resolved_at: None,
            acknowledged_by: None,
            acknowledged_note: None,
        }
    }

    pub fn resolve(&mut self) {
        self.state = AlertState::Resolved;
        self.resolved_at = Some(Utc::now());
    }

    pub fn acknowledge(&mut self, by: impl Into<String>, note: Option<String>) {
        self.acknowledged_by = Some(by.into());
        self.acknowledged_note = note;
    }
}
