use super::types::{
    BreakerConfig, BreakerMetrics, BreakerSnapshot, BreakerState, Disposition, Outcome, Permit,
};
use super::window::{OutcomeWindow, WindowStats};
use crate::error::{RejectReason, Rejection, Result};
use crate::metrics;
use std::sync::{Mutex, MutexGuard, PoisonError};
use tokio::time::Instant;
use tracing::{debug, info, warn};

/// Circuit breaker guarding a single protected target.
///
/// All mutable state lives in one bundle behind a short mutex, so a
/// transition and the counter resets that go with it are observed together.
/// Every transition bumps a generation counter; permits carry the generation
/// they were granted in and outcomes from older generations are discarded.
#[derive(Debug)]
pub struct BreakerCore {
    /// Configuration
    config: BreakerConfig,
    /// State bundle
    inner: Mutex<Inner>,
    /// Target identifier
    name: String,
}

#[derive(Debug, Clone, Copy)]
enum Phase {
    Closed,
    Open {
        /// Cooldown deadline
        until: Instant,
    },
    HalfOpen {
        /// Probes admitted in this episode
        admitted: u32,
        /// Consecutive probe successes in this episode
        successes: u32,
    },
}

impl Phase {
    fn state(&self) -> BreakerState {
        match self {
            Phase::Closed => BreakerState::Closed,
            Phase::Open { .. } => BreakerState::Open,
            Phase::HalfOpen { .. } => BreakerState::HalfOpen,
        }
    }
}

#[derive(Debug)]
struct Inner {
    phase: Phase,
    generation: u64,
    window: OutcomeWindow,
    metrics: BreakerMetrics,
}

impl BreakerCore {
    /// Create a new circuit breaker, validating the configuration first
    pub fn new(name: impl Into<String>, config: BreakerConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self::with_validated_config(name.into(), config))
    }

    pub(crate) fn with_validated_config(name: String, config: BreakerConfig) -> Self {
        info!(
            breaker = %name,
            failure_ratio_threshold = config.failure_ratio_threshold,
            min_samples = config.min_samples,
            cooldown_ms = config.cooldown_ms,
            probe_budget = config.probe_budget,
            required_successes = config.required_successes,
            "Creating circuit breaker"
        );
        metrics::record_breaker_state(&name, BreakerState::Closed);

        let window = OutcomeWindow::new(config.window(), config.window_buckets, Instant::now());

        Self {
            config,
            inner: Mutex::new(Inner {
                phase: Phase::Closed,
                generation: 0,
                window,
                metrics: BreakerMetrics::default(),
            }),
            name,
        }
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        // State is only mutated through whole-value assignments, so it is
        // consistent even if a holder panicked.
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Ask for permission to forward a call
    pub fn allow(&self) -> std::result::Result<Permit, Rejection> {
        let mut inner = self.lock();

        let phase = inner.phase;
        let reason = match phase {
            Phase::Closed => {
                inner.metrics.admitted += 1;
                return Ok(Permit::new(inner.generation, BreakerState::Closed));
            }
            Phase::Open { until } => {
                let now = Instant::now();
                if now >= until {
                    self.transition_to_half_open(&mut inner);
                    inner.metrics.admitted += 1;
                    return Ok(Permit::new(inner.generation, BreakerState::HalfOpen));
                }

                debug!(
                    breaker = %self.name,
                    time_remaining = ?until - now,
                    "Circuit breaker open, rejecting call"
                );
                RejectReason::CircuitOpen
            }
            Phase::HalfOpen {
                admitted,
                successes,
            } => {
                if admitted < self.config.probe_budget {
                    inner.phase = Phase::HalfOpen {
                        admitted: admitted + 1,
                        successes,
                    };
                    inner.metrics.admitted += 1;
                    debug!(
                        breaker = %self.name,
                        probes_admitted = admitted + 1,
                        max = self.config.probe_budget,
                        "Allowing half-open probe"
                    );
                    return Ok(Permit::new(inner.generation, BreakerState::HalfOpen));
                }

                debug!(breaker = %self.name, "Probe budget exhausted, rejecting call");
                RejectReason::ProbeBudgetExhausted
            }
        };

        inner.metrics.rejected += 1;
        drop(inner);

        metrics::record_rejection(&self.name, reason);
        Err(Rejection::new(self.name.clone(), reason))
    }

    /// Report the outcome of a call admitted with `permit`
    pub fn record_outcome(&self, permit: Permit, outcome: Outcome) -> Disposition {
        let mut inner = self.lock();

        if self.is_stale(&inner, &permit) {
            inner.metrics.stale_discarded += 1;
            let current = inner.generation;
            drop(inner);

            debug!(
                breaker = %self.name,
                permit_generation = permit.generation(),
                current_generation = current,
                outcome = ?outcome,
                "Discarding outcome from superseded generation"
            );
            metrics::record_stale_outcome(&self.name);
            return Disposition::StaleDiscarded;
        }

        match outcome {
            Outcome::Success => inner.metrics.successes += 1,
            Outcome::Failure => inner.metrics.failures += 1,
        }

        let phase = inner.phase;
        let disposition = match phase {
            Phase::Closed => {
                let now = Instant::now();
                inner.window.record(outcome, now);
                let stats = inner.window.stats(now);

                if stats.total() >= self.config.min_samples
                    && stats.failure_ratio() >= self.config.failure_ratio_threshold
                {
                    self.transition_to_open(&mut inner, now, stats);
                    Disposition::Transitioned(BreakerState::Open)
                } else {
                    Disposition::Applied
                }
            }
            Phase::HalfOpen {
                admitted,
                successes,
            } => match outcome {
                Outcome::Failure => {
                    warn!(
                        breaker = %self.name,
                        "Half-open probe failed, reopening circuit"
                    );
                    let now = Instant::now();
                    let stats = inner.window.stats(now);
                    self.transition_to_open(&mut inner, now, stats);
                    Disposition::Transitioned(BreakerState::Open)
                }
                Outcome::Success => {
                    let successes = successes + 1;
                    debug!(
                        breaker = %self.name,
                        consecutive_successes = successes,
                        threshold = self.config.required_successes,
                        "Half-open probe succeeded"
                    );

                    if successes >= self.config.required_successes {
                        self.transition_to_closed(&mut inner, successes);
                        Disposition::Transitioned(BreakerState::Closed)
                    } else {
                        inner.phase = Phase::HalfOpen {
                            admitted,
                            successes,
                        };
                        Disposition::Applied
                    }
                }
            },
            // Permits are never granted while open and every transition
            // bumps the generation, so `is_stale` has already caught this.
            Phase::Open { .. } => Disposition::StaleDiscarded,
        };
        drop(inner);

        metrics::record_outcome(&self.name, outcome);
        disposition
    }

    /// Give back a permit whose call never produced an outcome.
    ///
    /// The call is treated as if it never happened: a current half-open
    /// probe slot is returned to the budget, nothing else changes.
    pub fn release(&self, permit: Permit) {
        let mut inner = self.lock();
        if self.is_stale(&inner, &permit) {
            return;
        }

        inner.metrics.released += 1;
        if let Phase::HalfOpen { admitted, .. } = &mut inner.phase {
            *admitted = admitted.saturating_sub(1);
        }

        debug!(
            breaker = %self.name,
            generation = permit.generation(),
            "Permit released without outcome"
        );
    }

    fn is_stale(&self, inner: &Inner, permit: &Permit) -> bool {
        permit.generation() != inner.generation || permit.state() != inner.phase.state()
    }

    /// Get current state
    pub fn state(&self) -> BreakerState {
        self.lock().phase.state()
    }

    /// Current generation token
    pub fn generation(&self) -> u64 {
        self.lock().generation
    }

    /// Get metrics
    pub fn metrics(&self) -> BreakerMetrics {
        self.lock().metrics.clone()
    }

    /// Tallies currently in the rolling window
    pub fn window_stats(&self) -> WindowStats {
        self.lock().window.stats(Instant::now())
    }

    pub fn snapshot(&self) -> BreakerSnapshot {
        let inner = self.lock();
        BreakerSnapshot {
            target: self.name.clone(),
            state: inner.phase.state(),
            generation: inner.generation,
            metrics: inner.metrics.clone(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn config(&self) -> &BreakerConfig {
        &self.config
    }

    fn enter(&self, inner: &mut Inner, next: Phase) {
        let from = inner.phase.state();
        inner.phase = next;
        inner.generation += 1;
        metrics::record_breaker_transition(&self.name, from, next.state());
    }

    /// Transition to open state
    fn transition_to_open(&self, inner: &mut Inner, now: Instant, stats: WindowStats) {
        info!(
            breaker = %self.name,
            successes = stats.successes,
            failures = stats.failures,
            failure_ratio = stats.failure_ratio(),
            cooldown_ms = self.config.cooldown_ms,
            "Circuit breaker opening"
        );

        self.enter(
            inner,
            Phase::Open {
                until: now + self.config.cooldown(),
            },
        );
        inner.metrics.opened_count += 1;
    }

    /// Transition to half-open state; the caller holds the first probe
    fn transition_to_half_open(&self, inner: &mut Inner) {
        info!(
            breaker = %self.name,
            cooldown = ?self.config.cooldown(),
            "Circuit breaker transitioning to half-open"
        );

        self.enter(
            inner,
            Phase::HalfOpen {
                admitted: 1,
                successes: 0,
            },
        );
        inner.metrics.half_opened_count += 1;
    }

    /// Transition to closed state with a fresh window
    fn transition_to_closed(&self, inner: &mut Inner, successes: u32) {
        info!(
            breaker = %self.name,
            consecutive_successes = successes,
            "Circuit breaker closing"
        );

        self.enter(inner, Phase::Closed);
        inner.window.reset(Instant::now());
        inner.metrics.closed_count += 1;
    }
}
