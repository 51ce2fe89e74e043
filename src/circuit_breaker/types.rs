use crate::error::{AdmissionError, Result};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Circuit breaker state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BreakerState {
    /// Circuit is closed, calls flow normally
    Closed,
    /// Circuit is open, calls are rejected
    Open,
    /// Circuit is half-open, admitting a limited number of probes
    HalfOpen,
}

impl BreakerState {
    /// Gauge encoding: 0 = Closed, 1 = Open, 2 = HalfOpen
    pub fn as_gauge(&self) -> f64 {
        match self {
            BreakerState::Closed => 0.0,
            BreakerState::Open => 1.0,
            BreakerState::HalfOpen => 2.0,
        }
    }
}

impl std::fmt::Display for BreakerState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BreakerState::Closed => write!(f, "closed"),
            BreakerState::Open => write!(f, "open"),
            BreakerState::HalfOpen => write!(f, "half_open"),
        }
    }
}

/// Circuit breaker configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BreakerConfig {
    /// Failure ratio at or above which the circuit trips, in (0, 1]
    #[serde(default = "default_failure_ratio_threshold")]
    pub failure_ratio_threshold: f64,

    /// Outcomes that must be in the window before the ratio is trusted
    #[serde(default = "default_min_samples")]
    pub min_samples: u64,

    /// Length of the rolling outcome window in milliseconds
    #[serde(default = "default_window_ms")]
    pub window_ms: u64,

    /// Number of buckets the window is split into
    #[serde(default = "default_window_buckets")]
    pub window_buckets: usize,

    /// Time spent open before probes are admitted, in milliseconds
    #[serde(default = "default_cooldown_ms")]
    pub cooldown_ms: u64,

    /// Probes admitted per half-open episode
    #[serde(default = "default_probe_budget")]
    pub probe_budget: u32,

    /// Consecutive probe successes needed to close the circuit
    #[serde(default = "default_required_successes")]
    pub required_successes: u32,
}

fn default_failure_ratio_threshold() -> f64 {
    0.5
}

fn default_min_samples() -> u64 {
    20
}

fn default_window_ms() -> u64 {
    10_000
}

fn default_window_buckets() -> usize {
    10
}

fn default_cooldown_ms() -> u64 {
    30_000
}

fn default_probe_budget() -> u32 {
    3
}

fn default_required_successes() -> u32 {
    2
}

impl Default for BreakerConfig {
    fn default() -> Self {
        Self {
            failure_ratio_threshold: default_failure_ratio_threshold(),
            min_samples: default_min_samples(),
            window_ms: default_window_ms(),
            window_buckets: default_window_buckets(),
            cooldown_ms: default_cooldown_ms(),
            probe_budget: default_probe_budget(),
            required_successes: default_required_successes(),
        }
    }
}

impl BreakerConfig {
    pub fn cooldown(&self) -> Duration {
        Duration::from_millis(self.cooldown_ms)
    }

    pub fn window(&self) -> Duration {
        Duration::from_millis(self.window_ms)
    }

    /// Reject configurations the state machine cannot honor
    pub fn validate(&self) -> Result<()> {
        let threshold = self.failure_ratio_threshold;
        if !threshold.is_finite() || threshold <= 0.0 || threshold > 1.0 {
            return Err(AdmissionError::Config(format!(
                "failure_ratio_threshold must be in (0, 1], got {}",
                threshold
            )));
        }

        if self.min_samples == 0 {
            return Err(AdmissionError::Config(
                "min_samples must be > 0".to_string(),
            ));
        }

        if self.window_buckets == 0 {
            return Err(AdmissionError::Config(
                "window_buckets must be > 0".to_string(),
            ));
        }

        if self.window_ms < self.window_buckets as u64 {
            return Err(AdmissionError::Config(format!(
                "window_ms ({}) must be at least window_buckets ({})",
                self.window_ms, self.window_buckets
            )));
        }

        if self.probe_budget == 0 {
            return Err(AdmissionError::Config(
                "probe_budget must be > 0".to_string(),
            ));
        }

        // A half-open episode can only close if enough probes are admitted
        if self.required_successes == 0 || self.required_successes > self.probe_budget {
            return Err(AdmissionError::Config(format!(
                "required_successes must be between 1 and probe_budget ({}), got {}",
                self.probe_budget, self.required_successes
            )));
        }

        Ok(())
    }
}

/// Result of a forwarded call as far as the breaker is concerned
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Success,
    Failure,
}

impl Outcome {
    pub fn from_failure(failed: bool) -> Self {
        if failed {
            Outcome::Failure
        } else {
            Outcome::Success
        }
    }

    pub fn is_failure(&self) -> bool {
        matches!(self, Outcome::Failure)
    }
}

/// Proof that a call was admitted.
///
/// Tagged with the generation it was granted in. Consumed by
/// `record_outcome` or `release`, so a permit reports at most once.
#[must_use = "a permit must be reported with record_outcome or release"]
#[derive(Debug, PartialEq, Eq)]
pub struct Permit {
    generation: u64,
    state: BreakerState,
}

impl Permit {
    pub(crate) fn new(generation: u64, state: BreakerState) -> Self {
        Self { generation, state }
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// State the permit was granted in (Closed or HalfOpen)
    pub fn state(&self) -> BreakerState {
        self.state
    }

    pub fn is_probe(&self) -> bool {
        self.state == BreakerState::HalfOpen
    }
}

/// What the breaker did with a reported outcome
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Disposition {
    /// Counted, no state change
    Applied,
    /// Counted and moved the breaker into the given state
    Transitioned(BreakerState),
    /// The permit belonged to a superseded generation; ignored
    StaleDiscarded,
}

/// Circuit breaker metrics
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct BreakerMetrics {
    /// Calls admitted (including probes)
    pub admitted: u64,
    /// Successful outcomes applied
    pub successes: u64,
    /// Failed outcomes applied
    pub failures: u64,
    /// Calls rejected without reaching the handler
    pub rejected: u64,
    /// Outcomes dropped because their generation was superseded
    pub stale_discarded: u64,
    /// Permits given back without an outcome
    pub released: u64,
    /// Number of times the circuit opened
    pub opened_count: u64,
    /// Number of times the circuit half-opened
    pub half_opened_count: u64,
    /// Number of times the circuit closed
    pub closed_count: u64,
}

/// Point-in-time view of one breaker
#[derive(Debug, Clone, Serialize)]
pub struct BreakerSnapshot {
    pub target: String,
    pub state: BreakerState,
    pub generation: u64,
    pub metrics: BreakerMetrics,
}
