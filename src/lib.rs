//! # opsplane
//!
//! Control plane for fleets of remote agents: registration and stream
//! multiplexing, service probing, distributed task scheduling, terminal
//! session brokering, alerting, and a tamper-evident audit trail.
//!
//! The HTTP/REST surface, authentication flow, and UI are treated as
//! external collaborators (see spec §1 Non-goals) — this crate exposes the
//! core subsystems as a library plus a thin `opsplane` binary that wires
//! them to an HTTP health surface and a gRPC agent-facing service.
//!
//! ## Example
//!
//! ```rust,no_run
//! use opsplane::prelude::*;
//!
//! #[tokio::main]
//! async fn main() -> Result<()> {
//!     let config = Config::load()?;
//!     init_tracing(&config)?;
//!
//!     let (state, _agent_runtime) = AppState::bootstrap(config).await?;
//!     let app = opsplane::service_builder::router(state.clone());
//!
//!     Server::new(state.config().clone()).serve(app).await?;
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod error;
pub mod ids;
pub mod middleware;
pub mod health;
pub mod pool_health;
pub mod responses;
pub mod server;
pub mod service_builder;
pub mod state;

pub mod database;
pub mod cache;
pub mod events;

pub mod observability;

pub mod grpc;
pub mod websocket;

pub mod auth_support;

/// Connection-pool supervision agents (spec §5 "resource ownership"); not
/// per-agent session actors — see [`agent`] for the per-agent connection
/// table and [`agent::mux`] for the RPC itself.
pub mod agents;

/// Agent Manager + Stream Mux (spec §4.2).
pub mod agent;

/// Async Audit Pipeline (spec §4.1).
pub mod audit;

/// Service Probe Scheduler (spec §4.5).
pub mod probe;

/// Distributed Task Scheduler (spec §4.6).
pub mod task;

/// Terminal Broker (spec §4.4).
pub mod terminal;

/// Alert Engine (spec §4.7).
pub mod alert;

/// State Cache (spec §4.3).
pub mod state_cache;

/// Ambient REST-CRUD toolkit carried from the teacher framework. The exact
/// URL surface is an explicit spec non-goal; these stay as general-purpose
/// scaffolding for whatever thin HTTP layer is built outside this crate.
pub mod repository;
pub mod handlers;

/// Build-time utilities for compiling protocol buffers
///
/// These are used in `build.rs` scripts, not at runtime.
pub mod build_utils;

#[cfg(test)]
pub mod test_support;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::config::Config;
    pub use crate::error::{Error, Result};
    pub use crate::health::{health, readiness, pool_metrics};
    pub use crate::ids::{AgentId, MonitorId, TaskUid, ExecutionUid, SessionUid, EventId, RequestId};
    pub use crate::pool_health::{PoolHealthSummary, DatabasePoolHealth, RedisPoolHealth, NatsClientHealth};
    pub use crate::middleware::{
        RequestTrackingConfig, PROPAGATE_HEADERS, SENSITIVE_HEADERS,
        request_id_layer, request_id_propagation_layer, sensitive_headers_layer,
    };
    pub use crate::server::Server;
    pub use crate::service_builder::router;
    pub use crate::state::AppState;
    pub use crate::responses::{Accepted, Conflict, Created, FieldError, NoContent, Success, ValidationError};

    pub use crate::observability::init_tracing;

    pub use crate::grpc::GrpcServer;
    pub use tonic::{Code, Request, Response, Status};

    pub use crate::websocket::{
        RoomConfig, WebSocketConfig, ConnectionId, WebSocketConnection, RoomManager, Room,
        RoomId, RoomMember, Broadcaster, BroadcastTarget,
    };

    pub use crate::agent::model::{Agent, AgentStatus, HostState};
    pub use crate::agent::registry::AgentRegistry;
    pub use crate::audit::{AuditEvent, AuditLogger, Principal, Resource};
    pub use crate::probe::model::{ProbeType, ServiceMonitor, TargetSelection, AvailabilityWindow};
    pub use crate::task::model::{ScheduledTask, TaskExecution, ExecutionState, TriggerType};
    pub use crate::terminal::model::{TerminalSession, TerminalKind};
    pub use crate::alert::model::{Alert, AlertEvent};

    pub use axum::{
        extract::{Path, Query, State},
        http::{HeaderMap, HeaderValue, StatusCode},
        response::{IntoResponse, Json, Response},
        routing::{delete, get, patch, post, put},
        Extension, Router,
    };

    pub use serde::{Deserialize, Serialize};

    // Re-export tracing macros and types
    pub use tracing::{debug, error, info, instrument, trace, warn, Level, Span};

    // Re-export tokio for async runtime
    pub use tokio;

    // Re-export async-trait for async trait definitions
    pub use async_trait::async_trait;

    // Re-export error handling utilities
    pub use thiserror::Error;
    pub use anyhow::{self, Context as AnyhowContext};

    // Re-export time utilities
    pub use chrono::{DateTime, Duration as ChronoDuration, NaiveDateTime, Utc};

    // Re-export UUID
    pub use uuid::Uuid;

    // Re-export futures utilities
    pub use futures::{future, stream, Future, Stream, StreamExt, TryFutureExt, TryStreamExt};

    // Re-export HTTP types
    pub use http::{Method, Uri};

    // Re-export acton-reactive prelude for the pool-supervision agents
    pub use acton_reactive::prelude::*;
}
