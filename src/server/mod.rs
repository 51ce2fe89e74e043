//! Demo RPC server guarded by per-method circuit breakers

use crate::circuit_breaker::BreakerSnapshot;
use crate::config::AdmissionConfig;
use crate::error::{AdmissionError, Result};
use crate::interceptor::{admission_middleware, AdmissionState, ServerErrorClassifier};
use crate::metrics::{metrics_handler, MetricsService};
use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    middleware::from_fn_with_state,
    response::{IntoResponse, Response},
    routing::{any, get},
    Json, Router,
};
use serde::Deserialize;
use serde_json::json;
use tower_http::trace::TraceLayer;
use tracing::info;

/// Knobs the demo handler uses to simulate an unhealthy backend
#[derive(Debug, Default, Deserialize)]
pub struct CallQuery {
    #[serde(default)]
    pub fail: bool,
    #[serde(default)]
    pub timeout: bool,
}

/// Echo handler standing in for a real RPC method
pub async fn rpc_handler(Path(method): Path<String>, Query(query): Query<CallQuery>) -> Response {
    if query.fail {
        return (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(json!({ "method": method, "error": "simulated failure" })),
        )
            .into_response();
    }

    if query.timeout {
        return (
            StatusCode::GATEWAY_TIMEOUT,
            Json(json!({ "method": method, "error": "simulated timeout" })),
        )
            .into_response();
    }

    Json(json!({ "method": method, "status": "ok" })).into_response()
}

/// Current state of every breaker
pub async fn breakers_handler(State(state): State<AdmissionState>) -> Json<Vec<BreakerSnapshot>> {
    Json(state.registry().snapshot())
}

/// Build the application router.
///
/// Only `/rpc/:method` runs through the admission middleware; the
/// introspection endpoints are never rejected.
pub fn build_router(state: AdmissionState, metrics: Option<MetricsService>) -> Router {
    let rpc = Router::new()
        .route("/rpc/:method", any(rpc_handler))
        .route_layer(from_fn_with_state(state.clone(), admission_middleware));

    let mut app = Router::new()
        .merge(rpc)
        .route("/breakers", get(breakers_handler))
        .with_state(state);

    if let Some(metrics) = metrics {
        app = app.merge(
            Router::new()
                .route("/metrics", get(metrics_handler))
                .with_state(metrics),
        );
    }

    app.layer(TraceLayer::new_for_http())
}

/// Run the demo server until it fails
pub async fn serve(config: AdmissionConfig) -> Result<()> {
    let registry = config.registry()?;
    let classifier = ServerErrorClassifier::from(&config.classifier);

    info!("Starting RPC admission server");
    info!(
        "Server listening on {}:{}",
        config.server.host, config.server.port
    );
    info!(
        "Loaded {} target overrides, default cooldown {}ms",
        config.targets.len(),
        config.breaker.cooldown_ms
    );

    let metrics = MetricsService::new()?;
    let app = build_router(AdmissionState::new(registry, classifier), Some(metrics));

    let addr = format!("{}:{}", config.server.host, config.server.port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .map_err(AdmissionError::Io)?;

    info!("Server ready to accept connections");

    axum::serve(listener, app)
        .await
        .map_err(|e| AdmissionError::Internal(format!("Server error: {}", e)))?;

    Ok(())
}
