use super::{AdmissionInterceptor, ServerErrorClassifier};
use crate::circuit_breaker::BreakerRegistry;
use crate::error::InterceptError;
use axum::{
    extract::{MatchedPath, Request, State},
    middleware::Next,
    response::{IntoResponse, Response},
};
use std::convert::Infallible;
use std::sync::Arc;
use tracing::warn;

/// Admission middleware state
#[derive(Clone)]
pub struct AdmissionState {
    /// Breakers, one per request path
    registry: BreakerRegistry,
    /// Shared response classifier
    classifier: Arc<ServerErrorClassifier>,
}

impl AdmissionState {
    pub fn new(registry: BreakerRegistry, classifier: ServerErrorClassifier) -> Self {
        Self {
            registry,
            classifier: Arc::new(classifier),
        }
    }

    pub fn registry(&self) -> &BreakerRegistry {
        &self.registry
    }
}

/// Target used when a request carries no matched route
const UNMATCHED_TARGET: &str = "*";

/// Axum middleware guarding each request path with its own breaker.
///
/// Once the registry holds `max_targets` breakers, requests for new paths
/// share the breaker of the route pattern they matched, so the number of
/// breakers stays bounded by the limit plus the number of routes.
///
/// Rejected requests get a 503 JSON body; admitted requests are forwarded and
/// their response status is reported back to the breaker.
pub async fn admission_middleware(
    State(state): State<AdmissionState>,
    request: Request,
    next: Next,
) -> Response {
    let breaker = match state.registry.try_get_or_create(request.uri().path()) {
        Some(breaker) => breaker,
        None => {
            let route = request
                .extensions()
                .get::<MatchedPath>()
                .map(|matched| matched.as_str())
                .unwrap_or(UNMATCHED_TARGET);
            state.registry.get_or_create(route)
        }
    };
    let interceptor = AdmissionInterceptor::from_shared(breaker, state.classifier.clone());

    let result = interceptor
        .intercept(request, |req| async move {
            Ok::<_, Infallible>(next.run(req).await)
        })
        .await;

    match result {
        Ok(response) => response,
        Err(InterceptError::Rejected(rejection)) => {
            warn!(
                target_name = %rejection.target,
                reason = %rejection.reason,
                "Request rejected by circuit breaker"
            );
            rejection.into_response()
        }
        Err(InterceptError::Handler(never)) => match never {},
    }
}
