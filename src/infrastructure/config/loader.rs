use anyhow::{Context, Result};
use figment::providers::{Env, Format, Serialized, Yaml};
use figment::Figment;
use std::path::Path;
use thiserror::Error;

use crate::domain::models::config::{Config, RateLimitConfig, RetryConfig};
use crate::domain::models::MAX_PLAN_LENGTH;

/// Project configuration file.
pub const CONFIG_FILE: &str = "biochat.yaml";

/// Local, uncommitted overrides.
pub const LOCAL_CONFIG_FILE: &str = "biochat.local.yaml";

/// Prefix for environment overrides; `__` separates nested keys.
pub const ENV_PREFIX: &str = "BIOCHAT_";

/// Configuration error types
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Invalid max_concurrency: {0}. Must be at least 1")]
    InvalidConcurrency(usize),

    #[error("Invalid max_rounds: {0}. Must be at least 1")]
    InvalidMaxRounds(u32),

    #[error("Invalid max_sources: {0}. Must be between 1 and {MAX_PLAN_LENGTH}")]
    InvalidMaxSources(usize),

    #[error("Invalid confidence_threshold: {0}. Must be between 0.0 and 1.0")]
    InvalidConfidenceThreshold(f32),

    #[error("Invalid rate limit for {0}: {1}. Must be positive")]
    InvalidRateLimit(String, f64),

    #[error("Invalid burst_size for {0}: {1}. Must be at least 1")]
    InvalidBurstSize(String, u32),

    #[error("Invalid {0} max_attempts: {1}. Cannot be 0")]
    InvalidMaxAttempts(&'static str, u32),

    #[error(
        "Invalid {0} backoff configuration: initial_backoff_ms ({1}) must not exceed max_backoff_ms ({2})"
    )]
    InvalidBackoff(&'static str, u64, u64),

    #[error("Invalid {0} backoff multiplier: {1}. Must be at least 1.0")]
    InvalidMultiplier(&'static str, f64),

    #[error("Invalid log level: {0}. Must be one of: trace, debug, info, warn, error")]
    InvalidLogLevel(String),

    #[error("Configuration validation failed: {0}")]
    ValidationFailed(String),
}

/// Configuration loader with hierarchical merging
pub struct ConfigLoader;

impl ConfigLoader {
    /// Load configuration with hierarchical merging
    ///
    /// Precedence (lowest to highest):
    /// 1. Programmatic defaults (Serialized)
    /// 2. biochat.yaml (project config)
    /// 3. biochat.local.yaml (local overrides, optional)
    /// 4. Environment variables (BIOCHAT_* prefix, highest priority)
    pub fn load() -> Result<Config> {
        let config: Config = Figment::new()
            .merge(Serialized::defaults(Config::default()))
            .merge(Yaml::file(CONFIG_FILE))
            .merge(Yaml::file(LOCAL_CONFIG_FILE))
            .merge(Env::prefixed(ENV_PREFIX).split("__"))
            .extract()
            .context("Failed to extract configuration from figment")?;

        Self::validate(&config)?;
        Ok(config)
    }

    /// Load configuration from a specific file, still honouring environment overrides
    pub fn load_from_file(path: impl AsRef<Path>) -> Result<Config> {
        let path = path.as_ref();
        if !path.exists() {
            anyhow::bail!("Config file not found: {}", path.display());
        }

        let config: Config = Figment::new()
            .merge(Serialized::defaults(Config::default()))
            .merge(Yaml::file(path))
            .merge(Env::prefixed(ENV_PREFIX).split("__"))
            .extract()
            .with_context(|| format!("Failed to load config from {}", path.display()))?;

        Self::validate(&config)?;
        Ok(config)
    }

    /// Validate configuration after loading
    pub fn validate(config: &Config) -> Result<(), ConfigError> {
        if config.executor.max_concurrency == 0 {
            return Err(ConfigError::InvalidConcurrency(config.executor.max_concurrency));
        }

        if config.controller.max_rounds == 0 {
            return Err(ConfigError::InvalidMaxRounds(config.controller.max_rounds));
        }

        if config.routing.max_sources == 0 || config.routing.max_sources > MAX_PLAN_LENGTH {
            return Err(ConfigError::InvalidMaxSources(config.routing.max_sources));
        }

        let threshold = config.analysis.confidence_threshold;
        if !(0.0..=1.0).contains(&threshold) {
            return Err(ConfigError::InvalidConfidenceThreshold(threshold));
        }

        if config.controller.response_reserve_tokens >= config.controller.context_window_tokens {
            return Err(ConfigError::ValidationFailed(format!(
                "response_reserve_tokens ({}) must be smaller than context_window_tokens ({})",
                config.controller.response_reserve_tokens, config.controller.context_window_tokens
            )));
        }

        Self::validate_retry("executor", &config.executor.retry)?;
        Self::validate_retry("llm", &config.llm.retry)?;

        Self::validate_rate_limit("default", &config.rate_limits.default)?;
        for (source, limit) in &config.rate_limits.overrides {
            Self::validate_rate_limit(source, limit)?;
        }

        let valid_log_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_log_levels.contains(&config.logging.level.as_str()) {
            return Err(ConfigError::InvalidLogLevel(config.logging.level.clone()));
        }

        Ok(())
    }

    fn validate_retry(section: &'static str, retry: &RetryConfig) -> Result<(), ConfigError> {
        if retry.max_attempts == 0 {
            return Err(ConfigError::InvalidMaxAttempts(section, retry.max_attempts));
        }
        if retry.initial_backoff_ms > retry.max_backoff_ms {
            return Err(ConfigError::InvalidBackoff(
                section,
                retry.initial_backoff_ms,
                retry.max_backoff_ms,
            ));
        }
        if retry.multiplier < 1.0 {
            return Err(ConfigError::InvalidMultiplier(section, retry.multiplier));
        }
        Ok(())
    }

    fn validate_rate_limit(name: &str, limit: &RateLimitConfig) -> Result<(), ConfigError> {
        if limit.requests_per_second <= 0.0 {
            return Err(ConfigError::InvalidRateLimit(
                name.to_string(),
                limit.requests_per_second,
            ));
        }
        if limit.burst_size == 0 {
            return Err(ConfigError::InvalidBurstSize(name.to_string(), limit.burst_size));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::models::{LogFormat, SourceId};
    use std::io::Write;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.executor.max_concurrency, 4);
        assert_eq!(config.executor.retry.max_attempts, 3);
        assert_eq!(config.executor.retry.initial_backoff_ms, 500);
        assert_eq!(config.executor.retry.max_backoff_ms, 4_000);
        assert_eq!(config.controller.max_rounds, 5);
        assert_eq!(config.routing.max_sources, 5);
        assert!(!config.cache.enabled);
        assert_eq!(config.logging.level, "info");
        ConfigLoader::validate(&config).expect("Default config should be valid");
    }

    #[test]
    fn test_literature_rate_limit_override() {
        let config = Config::default();
        let ncbi = config.rate_limits.for_source(SourceId::Literature);
        assert!((ncbi.requests_per_second - 3.0).abs() < f64::EPSILON);
        let string = config.rate_limits.for_source(SourceId::String);
        assert!((string.requests_per_second - 5.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_yaml_parsing() {
        let yaml = r"
executor:
  max_concurrency: 8
  retry:
    max_attempts: 2
controller:
  max_rounds: 3
rate_limits:
  overrides:
    string:
      requests_per_second: 1.0
      burst_size: 1
logging:
  level: debug
  format: json
";

        let config: Config = serde_yaml::from_str(yaml).expect("YAML should parse");

        assert_eq!(config.executor.max_concurrency, 8);
        assert_eq!(config.executor.retry.max_attempts, 2);
        assert_eq!(config.executor.retry.initial_backoff_ms, 500);
        assert_eq!(config.controller.max_rounds, 3);
        assert_eq!(config.logging.format, LogFormat::Json);
        assert!(config.rate_limits.overrides.contains_key("string"));

        ConfigLoader::validate(&config).expect("Parsed config should be valid");
    }

    #[test]
    fn test_validate_zero_concurrency() {
        let mut config = Config::default();
        config.executor.max_concurrency = 0;
        assert!(matches!(
            ConfigLoader::validate(&config),
            Err(ConfigError::InvalidConcurrency(0))
        ));
    }

    #[test]
    fn test_validate_max_sources_bounds() {
        let mut config = Config::default();
        config.routing.max_sources = 6;
        assert!(matches!(
            ConfigLoader::validate(&config),
            Err(ConfigError::InvalidMaxSources(6))
        ));
        config.routing.max_sources = 0;
        assert!(ConfigLoader::validate(&config).is_err());
    }

    #[test]
    fn test_validate_confidence_threshold() {
        let mut config = Config::default();
        config.analysis.confidence_threshold = 1.5;
        assert!(matches!(
            ConfigLoader::validate(&config),
            Err(ConfigError::InvalidConfidenceThreshold(_))
        ));
    }

    #[test]
    fn test_validate_invalid_backoff() {
        let mut config = Config::default();
        config.executor.retry.initial_backoff_ms = 30_000;
        config.executor.retry.max_backoff_ms = 10_000;
        assert!(matches!(
            ConfigLoader::validate(&config),
            Err(ConfigError::InvalidBackoff("executor", 30_000, 10_000))
        ));
    }

    #[test]
    fn test_validate_zero_rate_limit_override() {
        let mut config = Config::default();
        config.rate_limits.overrides.insert(
            "gwas".to_string(),
            RateLimitConfig {
                requests_per_second: 0.0,
                burst_size: 1,
            },
        );
        match ConfigLoader::validate(&config) {
            Err(ConfigError::InvalidRateLimit(name, _)) => assert_eq!(name, "gwas"),
            other => panic!("Expected InvalidRateLimit, got {other:?}"),
        }
    }

    #[test]
    fn test_validate_invalid_log_level() {
        let mut config = Config::default();
        config.logging.level = "verbose".to_string();
        match ConfigLoader::validate(&config) {
            Err(ConfigError::InvalidLogLevel(level)) => assert_eq!(level, "verbose"),
            other => panic!("Expected InvalidLogLevel, got {other:?}"),
        }
    }

    #[test]
    fn test_load_from_file_with_env_override() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "controller:\n  max_rounds: 2\nexecutor:\n  max_concurrency: 2").unwrap();

        temp_env::with_vars(
            [
                ("BIOCHAT_EXECUTOR__MAX_CONCURRENCY", Some("6")),
                ("BIOCHAT_LOGGING__LEVEL", Some("debug")),
            ],
            || {
                let config = ConfigLoader::load_from_file(file.path()).unwrap();
                assert_eq!(config.controller.max_rounds, 2);
                assert_eq!(config.executor.max_concurrency, 6);
                assert_eq!(config.logging.level, "debug");
            },
        );
    }

    #[test]
    fn test_load_from_missing_file() {
        let result = ConfigLoader::load_from_file("/nonexistent/biochat.yaml");
        assert!(result.is_err());
    }

    #[test]
    fn test_load_from_file_rejects_invalid_values() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "controller:\n  max_rounds: 0").unwrap();
        assert!(ConfigLoader::load_from_file(file.path()).is_err());
    }
}
