//! Admission interceptor
//!
//! Sits between the dispatch layer and a handler. Each call asks the
//! breaker for a permit; rejected calls fail fast with
//! [`InterceptError::Rejected`] without touching the handler, admitted calls
//! run and report exactly one outcome as judged by a [`FailureClassifier`].
//! Handler results are returned unchanged.
//!
//! Three entry points share that protocol:
//!
//! - [`AdmissionInterceptor::intercept`] for any async handler
//! - [`AdmissionLayer`] for tower services
//! - [`admission_middleware`] for axum routers

pub mod classifier;
pub mod layer;
pub mod middleware;

pub use classifier::{
    ErrorsAreFailures, FailureClassifier, PredicateClassifier, ServerErrorClassifier,
};
pub use layer::{AdmissionLayer, AdmissionService};
pub use middleware::{admission_middleware, AdmissionState};

use crate::circuit_breaker::{BreakerCore, Disposition, Outcome, Permit};
use crate::error::InterceptError;
use std::future::Future;
use std::sync::Arc;

/// Adapter that runs handlers under a circuit breaker
pub struct AdmissionInterceptor<C = ErrorsAreFailures> {
    breaker: Arc<BreakerCore>,
    classifier: Arc<C>,
}

impl AdmissionInterceptor<ErrorsAreFailures> {
    /// Interceptor that counts every handler error as a failure
    pub fn new(breaker: Arc<BreakerCore>) -> Self {
        Self::with_classifier(breaker, ErrorsAreFailures)
    }
}

impl<C> AdmissionInterceptor<C> {
    pub fn with_classifier(breaker: Arc<BreakerCore>, classifier: C) -> Self {
        Self::from_shared(breaker, Arc::new(classifier))
    }

    /// Build from a classifier already shared with other interceptors
    pub fn from_shared(breaker: Arc<BreakerCore>, classifier: Arc<C>) -> Self {
        Self {
            breaker,
            classifier,
        }
    }

    pub fn breaker(&self) -> &Arc<BreakerCore> {
        &self.breaker
    }

    pub fn classifier(&self) -> &Arc<C> {
        &self.classifier
    }

    /// Run `handler(call)` if the breaker admits it.
    ///
    /// If the returned future is dropped before the handler finishes, no
    /// outcome is recorded and the permit is released.
    pub async fn intercept<Req, F, Fut, T, E>(
        &self,
        call: Req,
        handler: F,
    ) -> Result<T, InterceptError<E>>
    where
        F: FnOnce(Req) -> Fut,
        Fut: Future<Output = Result<T, E>>,
        C: FailureClassifier<T, E>,
    {
        let permit = self.breaker.allow()?;
        let guard = PermitGuard::new(self.breaker.clone(), permit);

        let result = handler(call).await;
        guard.complete(Outcome::from_failure(self.classifier.is_failure(&result)));

        result.map_err(InterceptError::Handler)
    }
}

impl<C> Clone for AdmissionInterceptor<C> {
    fn clone(&self) -> Self {
        Self {
            breaker: self.breaker.clone(),
            classifier: self.classifier.clone(),
        }
    }
}

impl<C> std::fmt::Debug for AdmissionInterceptor<C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AdmissionInterceptor")
            .field("breaker", &self.breaker.name())
            .finish()
    }
}

/// Holds a permit while the handler runs; releases it if never completed
pub(crate) struct PermitGuard {
    breaker: Arc<BreakerCore>,
    permit: Option<Permit>,
}

impl PermitGuard {
    pub(crate) fn new(breaker: Arc<BreakerCore>, permit: Permit) -> Self {
        Self {
            breaker,
            permit: Some(permit),
        }
    }

    pub(crate) fn complete(mut self, outcome: Outcome) -> Disposition {
        match self.permit.take() {
            Some(permit) => self.breaker.record_outcome(permit, outcome),
            None => Disposition::StaleDiscarded,
        }
    }
}

impl Drop for PermitGuard {
    fn drop(&mut self) {
        if let Some(permit) = self.permit.take() {
            self.breaker.release(permit);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::circuit_breaker::{BreakerConfig, BreakerState};
    use crate::error::RejectReason;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn breaker(min_samples: u64) -> Arc<BreakerCore> {
        let config = BreakerConfig {
            min_samples,
            cooldown_ms: 60_000,
            ..Default::default()
        };
        Arc::new(BreakerCore::new("test-target", config).unwrap())
    }

    #[tokio::test]
    async fn test_success_passes_through() {
        let interceptor = AdmissionInterceptor::new(breaker(5));

        let result = interceptor
            .intercept(21, |n| async move { Ok::<_, String>(n * 2) })
            .await;

        assert_eq!(result.unwrap(), 42);
        assert_eq!(interceptor.breaker().metrics().successes, 1);
    }

    #[tokio::test]
    async fn test_handler_error_is_unchanged() {
        let interceptor = AdmissionInterceptor::new(breaker(5));

        let result = interceptor
            .intercept((), |_| async { Err::<(), _>("db down".to_string()) })
            .await;

        match result {
            Err(InterceptError::Handler(e)) => assert_eq!(e, "db down"),
            other => panic!("unexpected result: {:?}", other),
        }
        assert_eq!(interceptor.breaker().metrics().failures, 1);
    }

    #[tokio::test]
    async fn test_rejected_call_skips_handler() {
        let interceptor = AdmissionInterceptor::new(breaker(1));
        let _ = interceptor
            .intercept((), |_| async { Err::<(), _>("boom") })
            .await;
        assert_eq!(interceptor.breaker().state(), BreakerState::Open);

        let calls = AtomicU32::new(0);
        let result = interceptor
            .intercept((), |_| async {
                calls.fetch_add(1, Ordering::SeqCst);
                Ok::<_, &str>(())
            })
            .await;

        let err = result.unwrap_err();
        assert_eq!(
            err.rejection().map(|r| r.reason),
            Some(RejectReason::CircuitOpen)
        );
        assert_eq!(calls.load(Ordering::SeqCst), 0);

        // Rejections are not outcome samples
        let metrics = interceptor.breaker().metrics();
        assert_eq!(metrics.successes + metrics.failures, 1);
        assert_eq!(metrics.rejected, 1);
    }

    #[tokio::test]
    async fn test_classifier_decides_outcome() {
        let classifier = PredicateClassifier::new(|result: &Result<u16, u16>| {
            matches!(result, Err(code) if *code >= 500)
        });
        let interceptor = AdmissionInterceptor::with_classifier(breaker(1), classifier);

        let result = interceptor
            .intercept(404u16, |code| async move { Err::<u16, u16>(code) })
            .await;
        assert_eq!(result.unwrap_err().into_handler_error(), Some(404));
        assert_eq!(interceptor.breaker().state(), BreakerState::Closed);
        assert_eq!(interceptor.breaker().metrics().successes, 1);

        let _ = interceptor
            .intercept(503u16, |code| async move { Err::<u16, u16>(code) })
            .await;
        assert_eq!(interceptor.breaker().state(), BreakerState::Open);
    }

    #[tokio::test]
    async fn test_cancelled_call_records_nothing() {
        let interceptor = AdmissionInterceptor::new(breaker(1));

        let mut task = tokio_test::task::spawn(interceptor.intercept((), |_| {
            futures::future::pending::<Result<(), String>>()
        }));
        tokio_test::assert_pending!(task.poll());
        drop(task);

        let metrics = interceptor.breaker().metrics();
        assert_eq!(metrics.admitted, 1);
        assert_eq!(metrics.released, 1);
        assert_eq!(metrics.successes + metrics.failures, 0);
        assert_eq!(interceptor.breaker().state(), BreakerState::Closed);
    }
}
