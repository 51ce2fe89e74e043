use crate::circuit_breaker::{BreakerState, Outcome};
use crate::error::{AdmissionError, RejectReason, Result};
use axum::{extract::State, http::header, response::IntoResponse};
use metrics::{counter, describe_counter, describe_gauge, gauge};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use std::sync::Arc;
use tracing::{debug, info};

/// Metrics service for collecting and exposing Prometheus metrics
#[derive(Clone)]
pub struct MetricsService {
    handle: Arc<PrometheusHandle>,
}

impl MetricsService {
    /// Install the Prometheus recorder. Only one recorder may exist per process.
    pub fn new() -> Result<Self> {
        let handle = PrometheusBuilder::new().install_recorder().map_err(|e| {
            AdmissionError::Internal(format!("Failed to install metrics recorder: {}", e))
        })?;

        register_metrics();

        info!("Metrics service initialized successfully");

        Ok(Self {
            handle: Arc::new(handle),
        })
    }

    /// Get the Prometheus metrics handle
    pub fn handle(&self) -> Arc<PrometheusHandle> {
        self.handle.clone()
    }

    /// Render metrics in Prometheus format
    pub fn render(&self) -> String {
        self.handle.render()
    }
}

/// Register all metrics with descriptions
pub fn register_metrics() {
    describe_gauge!(
        "admission_breaker_state",
        "Circuit breaker state (0 = closed, 1 = open, 2 = half-open)"
    );
    describe_counter!(
        "admission_breaker_transitions_total",
        "Total number of circuit breaker state transitions"
    );
    describe_counter!(
        "admission_rejected_total",
        "Calls rejected by a circuit breaker without reaching the handler"
    );
    describe_counter!(
        "admission_outcomes_total",
        "Call outcomes applied to a circuit breaker"
    );
    describe_counter!(
        "admission_stale_outcomes_total",
        "Outcomes discarded because their permit generation was superseded"
    );

    debug!("All metrics registered with descriptions");
}

/// Metrics endpoint handler
pub async fn metrics_handler(State(service): State<MetricsService>) -> impl IntoResponse {
    (
        [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
        service.render(),
    )
}

/// Record circuit breaker state
pub fn record_breaker_state(target: &str, state: BreakerState) {
    let labels = [("target", target.to_string())];
    gauge!("admission_breaker_state", &labels).set(state.as_gauge());
}

/// Record circuit breaker transition and the resulting state
pub fn record_breaker_transition(target: &str, from: BreakerState, to: BreakerState) {
    let labels = [
        ("target", target.to_string()),
        ("from", from.to_string()),
        ("to", to.to_string()),
    ];
    counter!("admission_breaker_transitions_total", &labels).increment(1);
    record_breaker_state(target, to);
}

/// Record a rejected call
pub fn record_rejection(target: &str, reason: RejectReason) {
    let reason = match reason {
        RejectReason::CircuitOpen => "circuit_open",
        RejectReason::ProbeBudgetExhausted => "probe_budget_exhausted",
    };
    let labels = [("target", target.to_string()), ("reason", reason.to_string())];
    counter!("admission_rejected_total", &labels).increment(1);
}

/// Record an applied outcome
pub fn record_outcome(target: &str, outcome: Outcome) {
    let outcome = match outcome {
        Outcome::Success => "success",
        Outcome::Failure => "failure",
    };
    let labels = [
        ("target", target.to_string()),
        ("outcome", outcome.to_string()),
    ];
    counter!("admission_outcomes_total", &labels).increment(1);
}

/// Record an outcome dropped for carrying a stale generation
pub fn record_stale_outcome(target: &str) {
    let labels = [("target", target.to_string())];
    counter!("admission_stale_outcomes_total", &labels).increment(1);
}
