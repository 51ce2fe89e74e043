pub mod circuit_breaker;
pub mod config;
pub mod error;
pub mod interceptor;
pub mod metrics;
pub mod server;

pub use circuit_breaker::{BreakerConfig, BreakerCore, BreakerRegistry, BreakerState, Outcome};
pub use error::{AdmissionError, InterceptError, Rejection, Result};
pub use interceptor::AdmissionInterceptor;

/// Initialize tracing/logging
pub fn init_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "rpc_admission=debug,tower_http=debug".into()),
        )
        .with_target(false)
        .compact()
        .init();
}
