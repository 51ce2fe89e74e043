use super::breaker::BreakerCore;
use super::types::{BreakerConfig, BreakerMetrics, BreakerSnapshot, BreakerState};
use crate::error::{AdmissionError, Result};
use dashmap::DashMap;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::debug;

/// Breakers a registry creates on demand before [`BreakerRegistry::try_get_or_create`] refuses
pub const DEFAULT_MAX_TARGETS: usize = 1024;

/// One circuit breaker per protected target, created on first use
#[derive(Debug, Clone)]
pub struct BreakerRegistry {
    /// Circuit breakers per target
    breakers: Arc<DashMap<String, Arc<BreakerCore>>>,
    /// Configuration for targets without an override
    defaults: BreakerConfig,
    /// Per-target configuration
    overrides: Arc<HashMap<String, BreakerConfig>>,
    /// Soft cap on breakers for targets without an override
    max_targets: usize,
}

impl BreakerRegistry {
    /// Create a registry where every target uses `defaults`
    pub fn new(defaults: BreakerConfig) -> Result<Self> {
        Self::with_overrides(defaults, HashMap::new())
    }

    /// Create a registry with per-target configuration
    pub fn with_overrides(
        defaults: BreakerConfig,
        overrides: HashMap<String, BreakerConfig>,
    ) -> Result<Self> {
        defaults.validate()?;
        for (target, config) in &overrides {
            config.validate().map_err(|e| {
                AdmissionError::Config(format!("target '{}': {}", target, e))
            })?;
        }

        Ok(Self {
            breakers: Arc::new(DashMap::new()),
            defaults,
            overrides: Arc::new(overrides),
            max_targets: DEFAULT_MAX_TARGETS,
        })
    }

    /// Limit how many breakers [`try_get_or_create`](Self::try_get_or_create) will create
    pub fn with_max_targets(mut self, max_targets: usize) -> Self {
        self.max_targets = max_targets;
        self
    }

    pub fn max_targets(&self) -> usize {
        self.max_targets
    }

    /// Configuration a target's breaker is (or will be) built with
    pub fn config_for(&self, target: &str) -> &BreakerConfig {
        self.overrides.get(target).unwrap_or(&self.defaults)
    }

    /// Get or create the circuit breaker for a target
    pub fn get_or_create(&self, target: &str) -> Arc<BreakerCore> {
        if let Some(breaker) = self.breakers.get(target) {
            return breaker.clone();
        }

        self.breakers
            .entry(target.to_string())
            .or_insert_with(|| {
                debug!(target_name = target, "Creating new circuit breaker");
                Arc::new(BreakerCore::with_validated_config(
                    target.to_string(),
                    self.config_for(target).clone(),
                ))
            })
            .clone()
    }

    /// Like [`get_or_create`](Self::get_or_create), but returns `None` instead
    /// of creating a breaker once the registry holds `max_targets` of them.
    ///
    /// Existing and overridden targets are always served. Concurrent callers
    /// racing on new targets can overshoot the cap by at most their number.
    pub fn try_get_or_create(&self, target: &str) -> Option<Arc<BreakerCore>> {
        if let Some(breaker) = self.breakers.get(target) {
            return Some(breaker.clone());
        }

        if !self.overrides.contains_key(target) && self.breakers.len() >= self.max_targets {
            debug!(
                target_name = target,
                max_targets = self.max_targets,
                "Breaker limit reached, not creating breaker"
            );
            return None;
        }

        Some(self.get_or_create(target))
    }

    /// Register an explicitly constructed breaker, replacing any existing one
    pub fn insert(&self, breaker: Arc<BreakerCore>) {
        self.breakers.insert(breaker.name().to_string(), breaker);
    }

    /// Get the circuit breaker for a target if it exists
    pub fn get(&self, target: &str) -> Option<Arc<BreakerCore>> {
        self.breakers.get(target).map(|b| b.clone())
    }

    /// State of a target's breaker; targets never seen are closed
    pub fn state(&self, target: &str) -> BreakerState {
        self.get(target)
            .map(|b| b.state())
            .unwrap_or(BreakerState::Closed)
    }

    /// Get metrics for a target
    pub fn metrics(&self, target: &str) -> Option<BreakerMetrics> {
        self.get(target).map(|b| b.metrics())
    }

    /// Get all target names with circuit breakers
    pub fn targets(&self) -> Vec<String> {
        self.breakers.iter().map(|e| e.key().clone()).collect()
    }

    /// Snapshot every breaker, sorted by target
    pub fn snapshot(&self) -> Vec<BreakerSnapshot> {
        let breakers: Vec<Arc<BreakerCore>> =
            self.breakers.iter().map(|e| e.value().clone()).collect();

        let mut snapshots: Vec<BreakerSnapshot> = breakers.iter().map(|b| b.snapshot()).collect();
        snapshots.sort_by(|a, b| a.target.cmp(&b.target));
        snapshots
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::circuit_breaker::Outcome;

    fn trip(registry: &BreakerRegistry, target: &str) {
        let breaker = registry.get_or_create(target);
        while breaker.state() == BreakerState::Closed {
            let permit = breaker.allow().unwrap();
            breaker.record_outcome(permit, Outcome::Failure);
        }
    }

    #[test]
    fn test_registry_manages_multiple_targets() {
        let config = BreakerConfig {
            min_samples: 2,
            ..Default::default()
        };
        let registry = BreakerRegistry::new(config).unwrap();

        let first = registry.get_or_create("/rpc/a");
        let permit = first.allow().unwrap();
        first.record_outcome(permit, Outcome::Success);

        trip(&registry, "/rpc/b");

        assert_eq!(registry.state("/rpc/a"), BreakerState::Closed);
        assert_eq!(registry.state("/rpc/b"), BreakerState::Open);

        let targets = registry.targets();
        assert_eq!(targets.len(), 2);
        assert!(targets.contains(&"/rpc/a".to_string()));
        assert!(targets.contains(&"/rpc/b".to_string()));
    }

    #[test]
    fn test_same_target_shares_breaker() {
        let registry = BreakerRegistry::new(BreakerConfig::default()).unwrap();
        let a = registry.get_or_create("svc");
        let b = registry.get_or_create("svc");
        assert!(Arc::ptr_eq(&a, &b));
    }

    #[test]
    fn test_overrides_apply_per_target() {
        let mut overrides = HashMap::new();
        overrides.insert(
            "/rpc/fragile".to_string(),
            BreakerConfig {
                min_samples: 1,
                ..Default::default()
            },
        );
        let registry = BreakerRegistry::with_overrides(BreakerConfig::default(), overrides).unwrap();

        assert_eq!(registry.get_or_create("/rpc/fragile").config().min_samples, 1);
        assert_eq!(registry.get_or_create("/rpc/other").config().min_samples, 20);
    }

    #[test]
    fn test_invalid_override_is_rejected() {
        let mut overrides = HashMap::new();
        overrides.insert(
            "bad".to_string(),
            BreakerConfig {
                failure_ratio_threshold: 2.0,
                ..Default::default()
            },
        );
        let err = BreakerRegistry::with_overrides(BreakerConfig::default(), overrides).unwrap_err();
        assert!(err.to_string().contains("bad"));
    }

    #[test]
    fn test_registry_snapshot() {
        let config = BreakerConfig {
            min_samples: 1,
            ..Default::default()
        };
        let registry = BreakerRegistry::new(config).unwrap();
        registry.get_or_create("b");
        trip(&registry, "a");

        let snapshot = registry.snapshot();
        assert_eq!(snapshot.len(), 2);
        assert_eq!(snapshot[0].target, "a");
        assert_eq!(snapshot[0].state, BreakerState::Open);
        assert_eq!(snapshot[0].metrics.failures, 1);
        assert_eq!(snapshot[1].target, "b");
        assert_eq!(snapshot[1].state, BreakerState::Closed);
    }

    #[test]
    fn test_try_get_or_create_respects_limit() {
        let mut overrides = HashMap::new();
        overrides.insert("pinned".to_string(), BreakerConfig::default());
        let registry = BreakerRegistry::with_overrides(BreakerConfig::default(), overrides)
            .unwrap()
            .with_max_targets(2);

        assert!(registry.try_get_or_create("a").is_some());
        assert!(registry.try_get_or_create("b").is_some());
        assert!(registry.try_get_or_create("c").is_none());
        assert!(registry.get("c").is_none());

        // Known and overridden targets are still served at the limit
        assert!(registry.try_get_or_create("a").is_some());
        assert!(registry.try_get_or_create("pinned").is_some());
        assert_eq!(registry.targets().len(), 3);
    }

    #[test]
    fn test_nonexistent_target() {
        let registry = BreakerRegistry::new(BreakerConfig::default()).unwrap();
        assert_eq!(registry.state("nonexistent"), BreakerState::Closed);
        assert!(registry.metrics("nonexistent").is_none());
        assert!(registry.get("nonexistent").is_none());
    }

    #[test]
    fn test_insert_explicit_breaker() {
        let registry = BreakerRegistry::new(BreakerConfig::default()).unwrap();
        let breaker = Arc::new(BreakerCore::new("custom", BreakerConfig::default()).unwrap());
        registry.insert(breaker.clone());
        assert!(Arc::ptr_eq(&registry.get_or_create("custom"), &breaker));
    }
}
