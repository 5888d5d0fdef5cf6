//! Agent and HostState data model (spec §3)

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::ids::AgentId;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AgentStatus {
    Online,
    Offline,
}

/// Durable agent identity + metadata. The secret is stored as an Argon2id
/// hash (`secret_hash`), never in plaintext.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Agent {
    pub id: AgentId,
    pub hostname: String,
    pub platform: String,
    #[serde(skip_serializing)]
    pub secret_hash: String,
    pub version: String,
    pub tags: Vec<String>,
    pub group: Option<String>,
    pub status: AgentStatus,
    pub last_seen_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl Agent {
    pub fn new(hostname: impl Into<String>, platform: impl Into<String>, secret_hash: String) -> Self {
        Self {
            id: AgentId::new(),
            hostname: hostname.into(),
            platform: platform.into(),
            secret_hash,
            version: String::new(),
            tags: Vec::new(),
            group: None,
            status: AgentStatus::Offline,
            last_seen_at: None,
            created_at: Utc::now(),
        }
    }
}

/// Per-agent monotonic system snapshot, overwritten on every report.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HostState {
    pub agent_id: AgentId,
    pub sequence: u64,
    pub reported_at: DateTime<Utc>,
    pub cpu_percent: f64,
    pub load_1: f64,
    pub load_5: f64,
    pub load_15: f64,
    pub memory_used_bytes: u64,
    pub memory_total_bytes: u64,
    pub swap_used_bytes: u64,
    pub swap_total_bytes: u64,
    pub disk_used_bytes: u64,
    pub disk_total_bytes: u64,
    pub net_in_bytes_per_sec: u64,
    pub net_out_bytes_per_sec: u64,
    pub tcp_connections: u32,
    pub udp_connections: u32,
    pub process_count: u32,
    pub uptime_seconds: u64,
    pub temperature_celsius: Option<f64>,
    pub gpu_percent: Option<f64>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_agent_starts_offline() {
        let agent = Agent::new("host-1", "linux/amd64", "hash".to_string());
        assert_eq!(agent.status, AgentStatus::Offline);
        assert!(agent.last_seen_at.is_none());
    }
}
