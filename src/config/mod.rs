use crate::circuit_breaker::{BreakerConfig, BreakerRegistry, DEFAULT_MAX_TARGETS};
use crate::error::{AdmissionError, Result};
use crate::interceptor::ServerErrorClassifier;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;

/// Main admission configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AdmissionConfig {
    /// Server configuration
    #[serde(default)]
    pub server: ServerConfig,
    /// Breaker settings for targets without an override
    #[serde(default)]
    pub breaker: BreakerConfig,
    /// Per-target overrides, keyed by target (the request path for the HTTP middleware)
    #[serde(default)]
    pub targets: HashMap<String, BreakerOverrides>,
    /// Failure classification policy
    #[serde(default)]
    pub classifier: ClassifierConfig,
    /// Upper bound on breakers created for targets without an override
    #[serde(default = "default_max_targets")]
    pub max_targets: usize,
}

/// Server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Server host address
    #[serde(default = "default_host")]
    pub host: String,
    /// Server port
    #[serde(default = "default_port")]
    pub port: u16,
}

/// Partial breaker settings merged over the defaults
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct BreakerOverrides {
    pub failure_ratio_threshold: Option<f64>,
    pub min_samples: Option<u64>,
    pub window_ms: Option<u64>,
    pub window_buckets: Option<usize>,
    pub cooldown_ms: Option<u64>,
    pub probe_budget: Option<u32>,
    pub required_successes: Option<u32>,
}

impl BreakerOverrides {
    /// Apply these overrides on top of `base`
    pub fn apply(&self, base: &BreakerConfig) -> BreakerConfig {
        BreakerConfig {
            failure_ratio_threshold: self
                .failure_ratio_threshold
                .unwrap_or(base.failure_ratio_threshold),
            min_samples: self.min_samples.unwrap_or(base.min_samples),
            window_ms: self.window_ms.unwrap_or(base.window_ms),
            window_buckets: self.window_buckets.unwrap_or(base.window_buckets),
            cooldown_ms: self.cooldown_ms.unwrap_or(base.cooldown_ms),
            probe_budget: self.probe_budget.unwrap_or(base.probe_budget),
            required_successes: self.required_successes.unwrap_or(base.required_successes),
        }
    }
}

/// Which handler results count against a breaker
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClassifierConfig {
    /// Whether 408/504 responses count as failures
    #[serde(default = "default_true")]
    pub timeouts_are_failures: bool,
}

fn default_max_targets() -> usize {
    DEFAULT_MAX_TARGETS
}

fn default_true() -> bool {
    true
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8080
}

impl Default for AdmissionConfig {
    fn default() -> Self {
        Self {
            server: ServerConfig::default(),
            breaker: BreakerConfig::default(),
            targets: HashMap::new(),
            classifier: ClassifierConfig::default(),
            max_targets: default_max_targets(),
        }
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

impl Default for ClassifierConfig {
    fn default() -> Self {
        Self {
            timeouts_are_failures: default_true(),
        }
    }
}

impl From<&ClassifierConfig> for ServerErrorClassifier {
    fn from(config: &ClassifierConfig) -> Self {
        ServerErrorClassifier {
            timeouts_are_failures: config.timeouts_are_failures,
        }
    }
}

impl AdmissionConfig {
    /// Load configuration from a YAML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| AdmissionError::Config(format!("Failed to read config file: {}", e)))?;

        Self::from_yaml(&content)
    }

    /// Parse configuration from YAML string
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        serde_yaml::from_str(yaml)
            .map_err(|e| AdmissionError::Config(format!("Failed to parse config: {}", e)))
    }

    /// Breaker configuration for every overridden target
    pub fn resolved_targets(&self) -> HashMap<String, BreakerConfig> {
        self.targets
            .iter()
            .map(|(target, overrides)| (target.clone(), overrides.apply(&self.breaker)))
            .collect()
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<()> {
        self.breaker.validate()?;

        if self.max_targets == 0 {
            return Err(AdmissionError::Config(
                "max_targets must be > 0".to_string(),
            ));
        }

        for (target, config) in self.resolved_targets() {
            if target.is_empty() {
                return Err(AdmissionError::Config(
                    "Target name cannot be empty".to_string(),
                ));
            }

            config.validate().map_err(|e| {
                AdmissionError::Config(format!("target '{}': {}", target, e))
            })?;
        }

        Ok(())
    }

    /// Build the breaker registry described by this configuration
    pub fn registry(&self) -> Result<BreakerRegistry> {
        self.validate()?;
        Ok(
            BreakerRegistry::with_overrides(self.breaker.clone(), self.resolved_targets())?
                .with_max_targets(self.max_targets),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_parse_valid_config() {
        let yaml = r#"
server:
  host: "127.0.0.1"
  port: 9090

breaker:
  failure_ratio_threshold: 0.4
  min_samples: 50
  cooldown_ms: 5000

targets:
  /rpc/charge:
    min_samples: 5
    probe_budget: 1
    required_successes: 1

classifier:
  timeouts_are_failures: false
"#;

        let config = AdmissionConfig::from_yaml(yaml).unwrap();
        assert_eq!(config.server.host, "127.0.0.1");
        assert_eq!(config.server.port, 9090);
        assert_eq!(config.breaker.failure_ratio_threshold, 0.4);
        assert_eq!(config.breaker.min_samples, 50);
        assert_eq!(config.breaker.probe_budget, 3);
        assert!(!config.classifier.timeouts_are_failures);
        assert!(config.validate().is_ok());

        let targets = config.resolved_targets();
        let charge = &targets["/rpc/charge"];
        assert_eq!(charge.min_samples, 5);
        assert_eq!(charge.probe_budget, 1);
        assert_eq!(charge.failure_ratio_threshold, 0.4);
        assert_eq!(charge.cooldown_ms, 5000);
    }

    #[test]
    fn test_default_values() {
        let config = AdmissionConfig::from_yaml("{}").unwrap();
        assert_eq!(config.server.host, "0.0.0.0");
        assert_eq!(config.server.port, 8080);
        assert_eq!(config.breaker, BreakerConfig::default());
        assert!(config.targets.is_empty());
        assert!(config.classifier.timeouts_are_failures);
        assert_eq!(config.max_targets, DEFAULT_MAX_TARGETS);
        assert_eq!(AdmissionConfig::default().max_targets, DEFAULT_MAX_TARGETS);
    }

    #[test]
    fn test_max_targets() {
        let config = AdmissionConfig::from_yaml("max_targets: 16").unwrap();
        assert_eq!(config.registry().unwrap().max_targets(), 16);

        let config = AdmissionConfig::from_yaml("max_targets: 0").unwrap();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_invalid_override() {
        let yaml = r#"
targets:
  /rpc/charge:
    probe_budget: 1
"#;
        // required_successes defaults to 2 which exceeds the budget
        let config = AdmissionConfig::from_yaml(yaml).unwrap();
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("/rpc/charge"));
        assert!(config.registry().is_err());
    }

    #[test]
    fn test_unknown_override_field_is_rejected() {
        let yaml = r#"
targets:
  /rpc/charge:
    min_sample: 5
"#;
        assert!(AdmissionConfig::from_yaml(yaml).is_err());
    }

    #[test]
    fn test_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "breaker:\n  min_samples: 7").unwrap();

        let config = AdmissionConfig::from_file(file.path()).unwrap();
        assert_eq!(config.breaker.min_samples, 7);

        let registry = config.registry().unwrap();
        assert_eq!(registry.config_for("anything").min_samples, 7);
    }

    #[test]
    fn test_missing_file() {
        let err = AdmissionConfig::from_file("/definitely/not/here.yaml").unwrap_err();
        assert!(matches!(err, AdmissionError::Config(_)));
    }
}
