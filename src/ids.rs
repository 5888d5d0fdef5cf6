//! Type-safe, prefix-enhanced identifiers built on the TypeID specification
//! (UUIDv7 for time-sortability). Every domain entity in spec §3 gets one:
//! `agt_…` for agents, `mon_…` for monitors, `tsk_…` for scheduled tasks,
//! `exe_…` for task executions, `ses_…` for terminal sessions, `evt_…` for
//! audit events, `req_…` for HTTP request ids.

use mti::prelude::*;
use std::fmt;
use std::str::FromStr;

use http::Request;
use tower_http::request_id::{MakeRequestId, RequestId as TowerRequestId};

macro_rules! typed_id {
    ($name:ident, $prefix:literal) => {
        #[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, serde::Serialize, serde::Deserialize)]
        #[serde(transparent)]
        pub struct $name(
            #[serde(with = "mti_serde")]
            MagicTypeId,
        );

        impl $name {
            pub const PREFIX: &'static str = $prefix;

            #[must_use]
            pub fn new() -> Self {
                Self(Self::PREFIX.create_type_id::<V7>())
            }

            #[must_use]
            pub fn as_str(&self) -> &str {
                self.0.as_str()
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::new()
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl FromStr for $name {
            type Err = IdError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                let mti = MagicTypeId::from_str(s).map_err(IdError::Parse)?;
                if mti.prefix().as_str() != Self::PREFIX {
                    return Err(IdError::InvalidPrefix {
                        expected: Self::PREFIX.to_string(),
                        actual: mti.prefix().as_str().to_string(),
                    });
                }
                Ok(Self(mti))
            }
        }
    };
}

mod mti_serde {
    use mti::prelude::*;
    use serde::{Deserialize, Deserializer, Serializer};
    use std::str::FromStr;

    pub fn serialize<S: Serializer>(id: &MagicTypeId, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_str(id.as_str())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<MagicTypeId, D::Error> {
        let s = String::deserialize(d)?;
        MagicTypeId::from_str(&s).map_err(serde::de::Error::custom)
    }
}

typed_id!(RequestId, "req");
typed_id!(AgentId, "agt");
typed_id!(MonitorId, "mon");
typed_id!(TaskUid, "tsk");
typed_id!(ExecutionUid, "exe");
typed_id!(SessionUid, "ses");
typed_id!(EventId, "evt");

#[derive(Debug, thiserror::Error)]
pub enum IdError {
    #[error("failed to parse id: {0}")]
    Parse(MagicTypeIdError),
    #[error("invalid prefix: expected '{expected}', got '{actual}'")]
    InvalidPrefix { expected: String, actual: String },
}

/// A `MakeRequestId` implementation producing type-safe [`RequestId`]s for
/// `tower_http::request_id::SetRequestIdLayer`.
#[derive(Debug, Clone, Copy, Default)]
pub struct MakeTypedRequestId;

impl MakeRequestId for MakeTypedRequestId {
    fn make_request_id<B>(&mut self, _request: &Request<B>) -> Option<TowerRequestId> {
        let id = RequestId::new();
        let header_value = http::HeaderValue::from_str(id.as_str()).ok()?;
        Some(TowerRequestId::new(header_value))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn agent_id_has_expected_prefix() {
        let id = AgentId::new();
        assert!(id.as_str().starts_with("agt_"));
        assert_eq!(AgentId::from_str(id.as_str()).unwrap(), id);
    }

    #[test]
    fn prefix_mismatch_is_rejected() {
        let id = AgentId::new();
        assert!(TaskUid::from_str(id.as_str()).is_err());
    }
}
