//! Failure classification
//!
//! Decides which handler results count as failures for the breaker. Callers
//! differ on which errors say the dependency is unhealthy and which are the
//! caller's own fault, so the policy is injected rather than fixed.

use http::StatusCode;

/// Decides whether a handler result counts as a failure
pub trait FailureClassifier<T, E>: Send + Sync {
    fn is_failure(&self, result: &Result<T, E>) -> bool;
}

/// Every `Err` is a failure, every `Ok` a success
#[derive(Debug, Clone, Copy, Default)]
pub struct ErrorsAreFailures;

impl<T, E> FailureClassifier<T, E> for ErrorsAreFailures {
    fn is_failure(&self, result: &Result<T, E>) -> bool {
        result.is_err()
    }
}

/// Classifier built from a closure
pub struct PredicateClassifier<F> {
    predicate: F,
}

impl<F> PredicateClassifier<F> {
    pub fn new(predicate: F) -> Self {
        Self { predicate }
    }
}

impl<T, E, F> FailureClassifier<T, E> for PredicateClassifier<F>
where
    F: Fn(&Result<T, E>) -> bool + Send + Sync,
{
    fn is_failure(&self, result: &Result<T, E>) -> bool {
        (self.predicate)(result)
    }
}

impl<F> std::fmt::Debug for PredicateClassifier<F> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PredicateClassifier")
            .field("predicate", &"<closure>")
            .finish()
    }
}

/// Classifier for HTTP responses: transport errors and 5xx count.
///
/// 408 and 504 count only when `timeouts_are_failures` is set; 4xx otherwise
/// never do.
#[derive(Debug, Clone, Copy)]
pub struct ServerErrorClassifier {
    pub timeouts_are_failures: bool,
}

impl ServerErrorClassifier {
    pub fn is_failure_status(&self, status: StatusCode) -> bool {
        if status == StatusCode::REQUEST_TIMEOUT || status == StatusCode::GATEWAY_TIMEOUT {
            return self.timeouts_are_failures;
        }
        status.is_server_error()
    }
}

impl Default for ServerErrorClassifier {
    fn default() -> Self {
        Self {
            timeouts_are_failures: true,
        }
    }
}

impl<B, E> FailureClassifier<http::Response<B>, E> for ServerErrorClassifier {
    fn is_failure(&self, result: &Result<http::Response<B>, E>) -> bool {
        match result {
            Ok(response) => self.is_failure_status(response.status()),
            Err(_) => true,
        }
    }
}
