use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::fmt;
use thiserror::Error;

/// Result type for admission operations
pub type Result<T> = std::result::Result<T, AdmissionError>;

/// Errors raised while configuring or starting the admission layer
#[derive(Error, Debug)]
pub enum AdmissionError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Internal server error: {0}")]
    Internal(String),
}

impl AdmissionError {
    /// Get the HTTP status code for this error
    pub fn status_code(&self) -> StatusCode {
        match self {
            AdmissionError::Config(_) => StatusCode::INTERNAL_SERVER_ERROR,
            AdmissionError::Io(_) => StatusCode::INTERNAL_SERVER_ERROR,
            AdmissionError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for AdmissionError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let body = Json(json!({
            "error": self.to_string(),
            "status": status.as_u16(),
        }));

        (status, body).into_response()
    }
}

/// Why a call was refused admission
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RejectReason {
    /// The breaker is open and its cooldown has not elapsed
    CircuitOpen,
    /// The breaker is half-open and every probe slot is taken
    ProbeBudgetExhausted,
}

impl fmt::Display for RejectReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RejectReason::CircuitOpen => write!(f, "is open"),
            RejectReason::ProbeBudgetExhausted => write!(f, "has no probe budget left"),
        }
    }
}

/// Fail-fast admission rejection.
///
/// Carries no retry-after hint; callers rely on the transport's own
/// conventions for backing off.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("Service unavailable: circuit '{target}' {reason}")]
pub struct Rejection {
    /// Protected target whose breaker refused the call
    pub target: String,
    /// Reason for the refusal
    pub reason: RejectReason,
}

impl Rejection {
    pub fn new(target: impl Into<String>, reason: RejectReason) -> Self {
        Self {
            target: target.into(),
            reason,
        }
    }

    /// Rejections always surface as unavailable
    pub fn status_code(&self) -> StatusCode {
        StatusCode::SERVICE_UNAVAILABLE
    }
}

impl IntoResponse for Rejection {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let body = Json(json!({
            "error": self.to_string(),
            "status": status.as_u16(),
            "reason": self.reason,
            "target": self.target,
        }));

        (status, body).into_response()
    }
}

/// Error returned by an intercepted call: either the breaker refused it or
/// the handler itself failed. Handler errors are carried untouched.
#[derive(Debug)]
pub enum InterceptError<E> {
    /// Admission was denied; the handler never ran
    Rejected(Rejection),
    /// The handler ran and returned this error
    Handler(E),
}

impl<E> InterceptError<E> {
    pub fn is_rejected(&self) -> bool {
        matches!(self, InterceptError::Rejected(_))
    }

    pub fn rejection(&self) -> Option<&Rejection> {
        match self {
            InterceptError::Rejected(rejection) => Some(rejection),
            InterceptError::Handler(_) => None,
        }
    }

    /// Unwrap the handler's own error, if that is what this is
    pub fn into_handler_error(self) -> Option<E> {
        match self {
            InterceptError::Rejected(_) => None,
            InterceptError::Handler(e) => Some(e),
        }
    }
}

impl<E> From<Rejection> for InterceptError<E> {
    fn from(rejection: Rejection) -> Self {
        InterceptError::Rejected(rejection)
    }
}

impl<E: fmt::Display> fmt::Display for InterceptError<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            InterceptError::Rejected(rejection) => write!(f, "{}", rejection),
            InterceptError::Handler(e) => write!(f, "{}", e),
        }
    }
}

impl<E: std::error::Error + 'static> std::error::Error for InterceptError<E> {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            InterceptError::Rejected(rejection) => Some(rejection),
            InterceptError::Handler(e) => Some(e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_status_codes() {
        assert_eq!(
            AdmissionError::Config("test".to_string()).status_code(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
        assert_eq!(
            Rejection::new("svc", RejectReason::CircuitOpen).status_code(),
            StatusCode::SERVICE_UNAVAILABLE
        );
    }

    #[test]
    fn test_error_display() {
        let err = AdmissionError::Config("bad threshold".to_string());
        assert_eq!(err.to_string(), "Configuration error: bad threshold");

        let rejection = Rejection::new("/rpc/charge", RejectReason::CircuitOpen);
        assert_eq!(
            rejection.to_string(),
            "Service unavailable: circuit '/rpc/charge' is open"
        );

        let rejection = Rejection::new("/rpc/charge", RejectReason::ProbeBudgetExhausted);
        assert_eq!(
            rejection.to_string(),
            "Service unavailable: circuit '/rpc/charge' has no probe budget left"
        );
    }

    #[test]
    fn test_intercept_error_keeps_handler_error() {
        let err: InterceptError<String> = InterceptError::Handler("db down".to_string());
        assert!(!err.is_rejected());
        assert!(err.rejection().is_none());
        assert_eq!(err.to_string(), "db down");
        assert_eq!(err.into_handler_error(), Some("db down".to_string()));

        let err: InterceptError<String> =
            Rejection::new("svc", RejectReason::ProbeBudgetExhausted).into();
        assert!(err.is_rejected());
        assert_eq!(
            err.rejection().map(|r| r.reason),
            Some(RejectReason::ProbeBudgetExhausted)
        );
        assert!(err.into_handler_error().is_none());
    }

    #[test]
    fn test_rejection_response() {
        let response = Rejection::new("svc", RejectReason::CircuitOpen).into_response();
        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
    }
}
