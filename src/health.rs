//! Health check handlers

use axum::{extract::State, http::StatusCode, response::IntoResponse, Json};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::{error::Error, state::AppState};

/// Service name reported in health responses; this crate ships a single
/// opinionated binary, not a template, so it isn't configurable.
const SERVICE_NAME: &str = "opsplane";

/// Health check response
#[derive(Debug, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub service: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
}

/// Readiness check response with dependency status
#[derive(Debug, Serialize, Deserialize)]
pub struct ReadinessResponse {
    pub ready: bool,
    pub service: String,
    pub dependencies: HashMap<String, DependencyStatus>,
}

/// Individual dependency status
#[derive(Debug, Serialize, Deserialize)]
pub struct DependencyStatus {
    pub healthy: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

/// Simple health check (liveness probe). Always 200 if the process is running.
pub async fn health(State(state): State<AppState>) -> impl IntoResponse {
    let _ = &state;
    let response = HealthResponse {
        status: "healthy".to_string(),
        service: SERVICE_NAME.to_string(),
        version: Some(env!("CARGO_PKG_VERSION").to_string()),
    };

    (StatusCode::OK, Json(response))
}

/// Readiness check with dependency validation (readiness probe).
///
/// Returns 503 if a configured, non-optional dependency is unavailable.
pub async fn readiness(State(state): State<AppState>) -> Result<impl IntoResponse, Error> {
    #[allow(unused_mut)]
    let mut dependencies = HashMap::new();
    #[allow(unused_mut)]
    let mut all_ready = true;

    #[cfg(feature = "database")]
    if let Some(db_config) = &state.config().database {
        match state.db().await {
            Some(pool) => match sqlx::query("SELECT 1").fetch_one(&pool).await {
                Ok(_) => {
                    dependencies.insert(
                        "database".to_string(),
                        DependencyStatus { healthy: true, message: Some("connected".into()) },
                    );
                }
                Err(e) => {
                    tracing::error!("database health check failed: {e}");
                    if !db_config.optional {
                        all_ready = false;
                    }
                    dependencies.insert(
                        "database".to_string(),
                        DependencyStatus { healthy: false, message: Some(format!("connection failed: {e}")) },
                    );
                }
            },
            None => {
                if !db_config.optional {
                    all_ready = false;
                }
                let message = if db_config.lazy_init { "connecting (lazy)" } else { "not connected" };
                dependencies.insert(
                    "database".to_string(),
                    DependencyStatus { healthy: false, message: Some(message.into()) },
                );
            }
        }
    }

    #[cfg(feature = "cache")]
    if let Some(redis_config) = &state.config().redis {
        match state.redis().await {
            Some(pool) => match pool.get().await {
                Ok(mut conn) => {
                    use std::ops::DerefMut;
                    match redis::cmd("PING").query_async::<String>(conn.deref_mut()).await {
                        Ok(_) => {
                            dependencies.insert(
                                "redis".to_string(),
                                DependencyStatus { healthy: true, message: Some("connected".into()) },
                            );
                        }
                        Err(e) => {
                            tracing::error!("redis ping failed: {e}");
                            if !redis_config.optional {
                                all_ready = false;
                            }
                            dependencies.insert(
                                "redis".to_string(),
                                DependencyStatus { healthy: false, message: Some(format!("ping failed: {e}")) },
                            );
                        }
                    }
                }
                Err(e) => {
                    tracing::error!("failed to get redis connection: {e}");
                    if !redis_config.optional {
                        all_ready = false;
                    }
                    dependencies.insert(
                        "redis".to_string(),
                        DependencyStatus { healthy: false, message: Some(format!("pool error: {e}")) },
                    );
                }
            },
            None => {
                if !redis_config.optional {
                    all_ready = false;
                }
                let message = if redis_config.lazy_init { "connecting (lazy)" } else { "not connected" };
                dependencies.insert(
                    "redis".to_string(),
                    DependencyStatus { healthy: false, message: Some(message.into()) },
                );
            }
        }
    }

    #[cfg(feature = "events")]
    if let Some(nats_config) = &state.config().nats {
        match state.nats().await {
            Some(client) => match client.connection_state() {
                async_nats::connection::State::Connected => {
                    dependencies.insert(
                        "nats".to_string(),
                        DependencyStatus { healthy: true, message: Some("connected".into()) },
                    );
                }
                conn_state => {
                    tracing::warn!("nats connection state: {conn_state:?}");
                    if !nats_config.optional {
                        all_ready = false;
                    }
                    dependencies.insert(
                        "nats".to_string(),
                        DependencyStatus { healthy: false, message: Some(format!("state: {conn_state:?}")) },
                    );
                }
            },
            None => {
                if !nats_config.optional {
                    all_ready = false;
                }
                let message = if nats_config.lazy_init { "connecting (lazy)" } else { "not connected" };
                dependencies.insert(
                    "nats".to_string(),
                    DependencyStatus { healthy: false, message: Some(message.into()) },
                );
            }
        }
    }

    let response = ReadinessResponse {
        ready: all_ready,
        service: SERVICE_NAME.to_string(),
        dependencies,
    };

    let status = if all_ready { StatusCode::OK } else { StatusCode::SERVICE_UNAVAILABLE };

    Ok((status, Json(response)))
}

/// Pool health metrics endpoint: database/redis/nats utilization and status.
pub async fn pool_metrics(State(state): State<AppState>) -> impl IntoResponse {
    let health = state.pool_health().await;
    let status = if health.healthy { StatusCode::OK } else { StatusCode::SERVICE_UNAVAILABLE };
    (status, Json(health))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_health_response() {
        let response = HealthResponse {
            status: "healthy".to_string(),
            service: "opsplane".to_string(),
            version: Some("1.0.0".to_string()),
        };

        assert_eq!(response.status, "healthy");
        assert_eq!(response.service, "opsplane");
    }

    #[test]
    fn test_dependency_status() {
        let status = DependencyStatus { healthy: true, message: Some("OK".to_string()) };
        assert!(status.healthy);
    }
}
