//! Request-admission circuit breaker
//!
//! A [`BreakerCore`] tracks call outcomes for one protected target in a
//! rolling window and moves through three states:
//!
//! - **Closed**: every call is admitted; the breaker trips once the window
//!   holds at least `min_samples` outcomes and the failure ratio reaches
//!   `failure_ratio_threshold`
//! - **Open**: every call is rejected until the cooldown elapses
//! - **HalfOpen**: up to `probe_budget` probes are admitted; one failure
//!   reopens, `required_successes` successes close
//!
//! # Example
//!
//! ```rust
//! use rpc_admission::circuit_breaker::{BreakerConfig, BreakerCore, Outcome};
//!
//! let breaker = BreakerCore::new("payments", BreakerConfig::default()).unwrap();
//!
//! match breaker.allow() {
//!     Ok(permit) => {
//!         // forward the call, then report how it went
//!         breaker.record_outcome(permit, Outcome::Success);
//!     }
//!     Err(rejection) => eprintln!("{}", rejection),
//! }
//! ```

pub mod breaker;
pub mod registry;
pub mod types;
pub mod window;

pub use breaker::BreakerCore;
pub use registry::{BreakerRegistry, DEFAULT_MAX_TARGETS};
pub use types::{
    BreakerConfig, BreakerMetrics, BreakerSnapshot, BreakerState, Disposition, Outcome, Permit,
};
pub use window::{OutcomeWindow, WindowStats};
