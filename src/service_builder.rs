//! HTTP router assembly: health/readiness/pool-metrics endpoints plus the
//! ambient middleware stack.
//!
//! spec.md §1 calls out the exact REST URL surface and the HTTP
//! authentication flow as non-goals — the core subsystems (agent manager,
//! probe scheduler, task scheduler, audit pipeline, terminal broker, state
//! cache, alert engine) don't hang their operations off this router. What's
//! here is the thin ambient surface: liveness/readiness for orchestrators
//! and the middleware stack every handler runs behind, built the way the
//! teacher's service builder assembles it, minus the type-versioned routing
//! and Cedar/JWT layers that have no counterpart in this crate's scope.

use crate::config::Config;
use crate::middleware::{request_id_layer, request_id_propagation_layer, sensitive_headers_layer};
use crate::state::AppState;
use axum::{routing::get, Router};
use std::time::Duration;
use tower_http::{
    catch_panic::CatchPanicLayer,
    compression::CompressionLayer,
    cors::CorsLayer,
    limit::RequestBodyLimitLayer,
    timeout::TimeoutLayer,
    trace::{DefaultMakeSpan, DefaultOnResponse, TraceLayer},
};

/// Build the full application router: health surface plus the ambient
/// middleware stack, over the given [`AppState`].
pub fn router(state: AppState) -> Router {
    let config = state.config().clone();

    let app = Router::new()
        .route("/health", get(crate::health::health))
        .route("/ready", get(crate::health::readiness))
        .route("/metrics/pools", get(crate::health::pool_metrics))
        .with_state(state);

    apply_middleware(app, &config)
}

/// Apply the ambient middleware stack (CORS, compression, timeout, body
/// limit, tracing, request tracking, panic recovery) in the teacher's order
/// — outermost first, panic recovery innermost.
fn apply_middleware(app: Router, config: &Config) -> Router {
    let server = &config.server;
    let body_limit = (server.body_limit_mb * 1024 * 1024) as usize;

    let mut app = app;

    let cors_layer = match server.cors_mode.as_str() {
        "permissive" => CorsLayer::permissive(),
        "restrictive" | "disabled" => CorsLayer::new(),
        other => {
            tracing::warn!("unknown cors_mode {other:?}, defaulting to permissive");
            CorsLayer::permissive()
        }
    };
    app = app.layer(cors_layer);

    app = app.layer(CompressionLayer::new());

    app = app.layer(TimeoutLayer::with_status_code(
        http::StatusCode::REQUEST_TIMEOUT,
        Duration::from_secs(server.request_timeout_secs),
    ));

    app = app.layer(RequestBodyLimitLayer::new(body_limit));

    app = app.layer(
        TraceLayer::new_for_http()
            .make_span_with(DefaultMakeSpan::new().include_headers(true))
            .on_response(DefaultOnResponse::new().include_headers(true)),
    );

    app = app.layer(sensitive_headers_layer());
    app = app.layer(request_id_propagation_layer());
    app = app.layer(request_id_layer());

    app = app.layer(CatchPanicLayer::new());

    app
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn router_builds_with_default_config() {
        let state = AppState::new(Config::default());
        let _app = router(state);
    }
}
