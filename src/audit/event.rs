//! Audit event types (spec §3 "AuditEvent")

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::ids::EventId;

/// A single, immutable-once-persisted audit trail event.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditEvent {
    pub id: EventId,
    pub timestamp: DateTime<Utc>,
    pub actor: Principal,
    pub action: String,
    pub resource: Resource,
    /// Which core subsystem produced this event (`agent`, `probe`,
    /// `scheduler`, `terminal`, `alert`, ...).
    pub subsystem: String,
    pub object_diff: Option<ObjectDiff>,
    pub client_ip: Option<String>,
    pub request_id: Option<String>,
    #[serde(default)]
    pub data: HashMap<String, serde_json::Value>,

    /// BLAKE3 hash chain fields, set by [`super::chain::AuditChain::seal`].
    pub sequence: u64,
    pub hash: Option<String>,
    pub previous_hash: Option<String>,
}

impl AuditEvent {
    pub fn new(
        actor: Principal,
        action: impl Into<String>,
        resource: Resource,
        subsystem: impl Into<String>,
    ) -> Self {
        Self {
            id: EventId::new(),
            timestamp: Utc::now(),
            actor,
            action: action.into(),
            resource,
            subsystem: subsystem.into(),
            object_diff: None,
            client_ip: None,
            request_id: None,
            data: HashMap::new(),
            sequence: 0,
            hash: None,
            previous_hash: None,
        }
    }

    pub fn with_diff(mut self, diff: ObjectDiff) -> Self {
        self.object_diff = Some(diff);
        self
    }

    pub fn with_request(mut self, client_ip: Option<String>, request_id: Option<String>) -> Self {
        self.client_ip = client_ip;
        self.request_id = request_id;
        self
    }

    pub fn with_data(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.data.insert(key.into(), value);
        self
    }
}

/// The principal that performed an action.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Principal {
    pub id: String,
    pub kind: PrincipalKind,
}

impl Principal {
    pub fn user(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            kind: PrincipalKind::User,
        }
    }

    pub fn system() -> Self {
        Self {
            id: "system".into(),
            kind: PrincipalKind::System,
        }
    }

    pub fn agent(agent_id: impl Into<String>) -> Self {
        Self {
            id: agent_id.into(),
            kind: PrincipalKind::Agent,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PrincipalKind {
    User,
    System,
    Agent,
}

/// Resource a given audit event is about.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Resource {
    pub resource_type: String,
    pub identifier: String,
    #[serde(default)]
    pub metadata: HashMap<String, String>,
}

impl Resource {
    pub fn new(resource_type: impl Into<String>, identifier: impl Into<String>) -> Self {
        Self {
            resource_type: resource_type.into(),
            identifier: identifier.into(),
            metadata: HashMap::new(),
        }
    }
}

/// (old-json, new-json) pair with truncation metadata, per §4.1.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ObjectDiff {
    pub old_json: Option<serde_json::Value>,
    pub new_json: Option<serde_json::Value>,
    pub truncation: Option<super::truncation::TruncationResult>,
}
